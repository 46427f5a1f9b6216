#![allow(missing_docs)]

use std::sync::Arc;

use dsio::container::Container;
use dsio::dataset::{DatasetBuilder, TransferConfig};
use dsio::element_type::{ByteOrder, CompoundMember, CompoundType, ElementType};
use dsio::filter::{FilterPipeline, FILTER_DEFLATE, FILTER_SHUFFLE};
use dsio::registry::Registry;
use dsio::selection::{Dataspace, Extent, Selection};
use dsio::storage::ReadableWritableListableStorage;
use dsio::storage::storage_adapter::performance_metrics::PerformanceMetricsStorageAdapter;

fn dataset_write_read() -> Result<(), Box<dyn std::error::Error>> {
    // Create a store
    let path = tempfile::TempDir::new()?;
    let store = Arc::new(PerformanceMetricsStorageAdapter::new(Arc::new(
        dsio::filesystem::FilesystemStore::new(path.path())?,
    )));
    let storage: ReadableWritableListableStorage = store.clone();

    // Initialise the registry of builtin filters
    let registry = Arc::new(Registry::new());
    registry.init();
    let container = Container::new(storage, registry);

    // Create a chunked, compressed dataset of big-endian 16-bit integers
    let mut dataset = DatasetBuilder::new(
        ElementType::INT16.with_byte_order(ByteOrder::Big),
        Extent::new_with_max(vec![8, 8], vec![None, Some(8)])?,
    )
    .chunk_shape(vec![4, 4])
    .fill_value(-1i16)
    .filters(
        FilterPipeline::new()
            .with_filter(FILTER_SHUFFLE, vec![])
            .with_filter(FILTER_DEFLATE, vec![6]),
    )
    .build(&container, "group/dataset")?;

    // Write native floats to a strided hyperslab, converting them to the dataset element type
    let file_space = dataset.space().select(Selection::hyperslab(
        vec![0, 1],
        vec![2, 3],
        vec![4, 3],
        vec![1, 1],
    )?)?;
    let values = (0..12).map(|value| f64::from(value) * 1.5).collect::<Vec<f64>>();
    dataset.write(
        &ElementType::FLOAT64,
        Some(&Dataspace::new_fixed(vec![12])),
        Some(&file_space),
        &mut TransferConfig::new(),
        bytemuck::cast_slice(&values),
    )?;

    // Extend the dataset and read it back
    dataset.extend(&[10, 8])?;
    let elements: Vec<i16> = dataset.read_elements(&Selection::All)?;
    println!("The dataset elements are:");
    for row in elements.chunks(8) {
        println!("{row:?}");
    }

    // Read a compound view of a dataset of records
    let record = ElementType::Compound(CompoundType::new(
        12,
        vec![
            CompoundMember::new("x", 0, ElementType::UINT32),
            CompoundMember::new("y", 4, ElementType::FLOAT64),
        ],
    )?);
    let x_only = ElementType::Compound(CompoundType::new(
        8,
        vec![CompoundMember::new("x", 0, ElementType::UINT64)],
    )?);
    let mut records = DatasetBuilder::new(record.clone(), Extent::new(vec![3])).build(&container, "records")?;
    let bytes = [(1u32, 0.5f64), (2, 1.5), (3, 2.5)]
        .iter()
        .flat_map(|(x, y)| [x.to_ne_bytes().to_vec(), y.to_ne_bytes().to_vec()].concat())
        .collect::<Vec<u8>>();
    records.write(&record, None, None, &mut TransferConfig::new(), &bytes)?;
    let mut x = vec![0u64; 3];
    records.read(
        &x_only,
        None,
        None,
        &mut TransferConfig::new(),
        bytemuck::cast_slice_mut(&mut x),
    )?;
    println!("The x members are {x:?}");

    records.close()?;
    dataset.close()?;
    println!(
        "{} reads, {} writes, {} bytes written",
        store.reads(),
        store.writes(),
        store.bytes_written()
    );
    Ok(())
}

fn main() {
    if let Err(err) = dataset_write_read() {
        println!("{err:?}");
    }
}
