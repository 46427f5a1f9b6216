#![allow(missing_docs)]

use std::sync::Arc;

use dsio::container::{AccessIntent, Container};
use dsio::dataset::{BackgroundPolicy, Dataset, DatasetBuilder, DatasetError, TransferConfig};
use dsio::element_type::{ByteOrder, CompoundMember, CompoundType, ElementType};
use dsio::registry::Registry;
use dsio::selection::{Dataspace, Extent, Selection};
use dsio::storage::storage_adapter::performance_metrics::PerformanceMetricsStorageAdapter;
use dsio::storage::store::MemoryStore;

type MetricsStore = PerformanceMetricsStorageAdapter<MemoryStore>;

fn container() -> (Container, Arc<MetricsStore>) {
    let store = Arc::new(PerformanceMetricsStorageAdapter::new(Arc::new(
        MemoryStore::new(),
    )));
    let container = Container::new(store.clone(), Arc::new(Registry::new_initialized()));
    (container, store)
}

fn read_bytes(
    dataset: &Dataset,
    element_type: &ElementType,
    memory_space: Option<&Dataspace>,
    file_space: Option<&Dataspace>,
    config: &mut TransferConfig<'_>,
) -> Result<Vec<u8>, DatasetError> {
    let num_elements = memory_space.map_or_else(
        || dataset.space().extent().num_elements(),
        |space| space.extent().num_elements(),
    );
    let mut bytes = vec![0; num_elements as usize * element_type.size()];
    dataset.read(element_type, memory_space, file_space, config, &mut bytes)?;
    Ok(bytes)
}

#[test]
fn dataset_scenario_a() -> Result<(), Box<dyn std::error::Error>> {
    let (container, _) = container();
    let mut dataset = DatasetBuilder::new(ElementType::INT32, Extent::new(vec![100]))
        .build(&container, "a")?;
    dataset.write_elements(&Selection::All, &(0..100).collect::<Vec<i32>>())?;
    let elements: Vec<i32> = dataset.read_elements(&Selection::All)?;
    assert_eq!(elements, (0..100).collect::<Vec<i32>>());
    Ok(())
}

#[test]
fn dataset_scenario_b() -> Result<(), Box<dyn std::error::Error>> {
    let (container, _) = container();
    let mut dataset = DatasetBuilder::new(ElementType::INT32, Extent::new(vec![100]))
        .fill_value(7i32)
        .build(&container, "b")?;
    dataset.write_elements(&Selection::range(&[10..20]), &(10..20).collect::<Vec<i32>>())?;
    let elements: Vec<i32> = dataset.read_elements(&Selection::All)?;
    for (i, element) in elements.into_iter().enumerate() {
        if (10..20).contains(&i) {
            assert_eq!(element, i as i32);
        } else {
            assert_eq!(element, 7);
        }
    }
    Ok(())
}

#[test]
fn dataset_scenario_c() -> Result<(), Box<dyn std::error::Error>> {
    let (container, store) = container();
    let dataset = DatasetBuilder::new(ElementType::INT32, Extent::new(vec![100]))
        .build(&container, "c")?;
    store.reset();

    let file_space = dataset.space().select(Selection::range(&[0..6]))?;
    let memory_space = Dataspace::new_fixed(vec![5]);
    let mut buffer = vec![0x55u8; 5 * 4];
    let result = dataset.read(
        &ElementType::INT32,
        Some(&memory_space),
        Some(&file_space),
        &mut TransferConfig::new(),
        &mut buffer,
    );
    assert!(matches!(
        result,
        Err(DatasetError::SelectionSizeMismatch { file: 6, memory: 5 })
    ));
    assert_eq!(buffer, vec![0x55u8; 5 * 4]);
    assert_eq!(store.reads(), 0);
    assert_eq!(store.writes(), 0);
    Ok(())
}

#[test]
fn dataset_scenario_d() -> Result<(), Box<dyn std::error::Error>> {
    let (container, _) = container();
    let extent = Extent::new_with_max(vec![100], vec![Some(150)])?;
    let mut dataset = DatasetBuilder::new(ElementType::INT32, extent)
        .fill_value(7i32)
        .build(&container, "d")?;
    dataset.write_elements(&Selection::All, &(0..100).collect::<Vec<i32>>())?;
    dataset.extend(&[150])?;
    assert_eq!(dataset.space().extent().dims(), [150]);
    assert_eq!(dataset.storage_size()?, 150 * 4);

    let elements: Vec<i32> = dataset.read_elements(&Selection::All)?;
    assert_eq!(elements[..100], (0..100).collect::<Vec<i32>>());
    assert!(elements[100..].iter().all(|element| *element == 7));

    assert!(dataset.extend(&[151]).is_err());
    let dataset = container.open_dataset("d")?;
    assert_eq!(dataset.space().extent().dims(), [150]);
    assert_eq!(dataset.layout_descriptor().dims(), [150]);
    Ok(())
}

#[test]
fn dataset_selection_symmetry() -> Result<(), Box<dyn std::error::Error>> {
    let (container, store) = container();
    let mut dataset = DatasetBuilder::new(ElementType::UINT16, Extent::new(vec![8, 8]))
        .chunk_shape(vec![4, 4])
        .build(&container, "symmetry")?;
    let pairs = [
        (Selection::range(&[0..2, 0..2]), Selection::range(&[0..3])),
        (Selection::All, Selection::None),
        (
            Selection::points(vec![vec![0, 0], vec![7, 7]]),
            Selection::range(&[0..3]),
        ),
        (
            Selection::hyperslab(vec![0, 0], vec![2, 2], vec![2, 2], vec![1, 1])?,
            Selection::points(vec![vec![1]]),
        ),
    ];
    for (file_selection, memory_selection) in pairs {
        let file_space = dataset.space().select(file_selection)?;
        let memory_space = Dataspace::with_selection(Extent::new(vec![64]), memory_selection)?;
        let mut buffer = vec![0u8; 64 * 2];
        store.reset();
        assert!(matches!(
            dataset.read(
                &ElementType::UINT16,
                Some(&memory_space),
                Some(&file_space),
                &mut TransferConfig::new(),
                &mut buffer,
            ),
            Err(DatasetError::SelectionSizeMismatch { .. })
        ));
        assert!(matches!(
            dataset.write(
                &ElementType::UINT16,
                Some(&memory_space),
                Some(&file_space),
                &mut TransferConfig::new(),
                &buffer,
            ),
            Err(DatasetError::SelectionSizeMismatch { .. })
        ));
        assert_eq!(store.reads(), 0);
        assert_eq!(store.writes(), 0);
    }
    Ok(())
}

#[test]
fn dataset_zero_elements() -> Result<(), Box<dyn std::error::Error>> {
    let (container, store) = container();
    let mut dataset = DatasetBuilder::new(ElementType::FLOAT32, Extent::new(vec![10]))
        .build(&container, "empty")?;
    store.reset();
    let file_space = dataset.space().select(Selection::None)?;
    let memory_space = Dataspace::with_selection(Extent::new(vec![2]), Selection::None)?;
    let mut buffer = vec![1u8; 16];
    dataset.read(
        &ElementType::FLOAT64,
        Some(&memory_space),
        Some(&file_space),
        &mut TransferConfig::new(),
        &mut buffer,
    )?;
    dataset.write(
        &ElementType::INT8,
        Some(&memory_space),
        Some(&file_space),
        &mut TransferConfig::new(),
        &buffer,
    )?;
    assert_eq!(buffer, vec![1u8; 16]);
    assert_eq!(store.reads(), 0);
    assert_eq!(store.writes(), 0);
    Ok(())
}

#[test]
fn dataset_round_trip_element_types() -> Result<(), Box<dyn std::error::Error>> {
    let (container, _) = container();
    let element_types = [
        ElementType::INT8,
        ElementType::INT16,
        ElementType::INT32,
        ElementType::INT64,
        ElementType::UINT8,
        ElementType::UINT16,
        ElementType::UINT32,
        ElementType::UINT64,
        ElementType::FLOAT16,
        ElementType::FLOAT32,
        ElementType::FLOAT64,
        ElementType::INT32.with_byte_order(ByteOrder::Big),
        ElementType::FLOAT64.with_byte_order(ByteOrder::Big),
    ];
    for (i, element_type) in element_types.into_iter().enumerate() {
        for chunked in [false, true] {
            let mut builder = DatasetBuilder::new(element_type.clone(), Extent::new(vec![5, 7]));
            if chunked {
                builder.chunk_shape(vec![2, 3]);
            }
            let mut dataset = builder.build(&container, &format!("round_trip/{i}/{chunked}"))?;
            let file_space = dataset
                .space()
                .select(Selection::range(&[1..4, 2..7]))?;
            let memory_space = Dataspace::new_fixed(vec![15]);
            let bytes = (0..15 * element_type.size())
                .map(|byte| (byte % 251) as u8)
                .collect::<Vec<u8>>();
            dataset.write(
                &element_type,
                Some(&memory_space),
                Some(&file_space),
                &mut TransferConfig::new(),
                &bytes,
            )?;
            let read = read_bytes(
                &dataset,
                &element_type,
                Some(&memory_space),
                Some(&file_space),
                &mut TransferConfig::new(),
            )?;
            assert_eq!(read, bytes, "{element_type} chunked {chunked}");
        }
    }
    Ok(())
}

#[test]
fn dataset_idempotent_read() -> Result<(), Box<dyn std::error::Error>> {
    let (container, _) = container();
    let mut dataset = DatasetBuilder::new(ElementType::INT16, Extent::new(vec![12, 12]))
        .chunk_shape(vec![5, 5])
        .fill_value(-3i16)
        .build(&container, "idempotent")?;
    dataset.write_elements(
        &Selection::hyperslab(vec![1, 1], vec![3, 4], vec![4, 3], vec![2, 2])?,
        &(0..48).collect::<Vec<i16>>(),
    )?;
    let file_space = dataset
        .space()
        .select(Selection::points(vec![vec![11, 0], vec![1, 1], vec![4, 6], vec![2, 2]]))?;
    let memory_space = Dataspace::new_fixed(vec![4]);
    let first = read_bytes(
        &dataset,
        &ElementType::FLOAT64,
        Some(&memory_space),
        Some(&file_space),
        &mut TransferConfig::new(),
    )?;
    let second = read_bytes(
        &dataset,
        &ElementType::FLOAT64,
        Some(&memory_space),
        Some(&file_space),
        &mut TransferConfig::new(),
    )?;
    assert_eq!(first, second);
    let values: Vec<f64> = bytemuck::pod_collect_to_vec(&first);
    assert_eq!(values, [-3.0, 0.0, 15.0, 7.0]);
    Ok(())
}

#[test]
fn dataset_strip_size_invariance() -> Result<(), Box<dyn std::error::Error>> {
    let (container, _) = container();
    for chunked in [false, true] {
        let mut builder = DatasetBuilder::new(ElementType::INT32, Extent::new(vec![30, 40]));
        if chunked {
            builder.chunk_shape(vec![7, 9]);
        }
        let mut dataset = builder.build(&container, &format!("strips/{chunked}"))?;
        let values = (0..1200)
            .map(|value: i32| (value * 3 - 1000) as f32)
            .collect::<Vec<f32>>();
        let mut config = TransferConfig::new();
        config.set_buffer_size(64);
        dataset.write(
            &ElementType::FLOAT32,
            None,
            None,
            &mut config,
            bytemuck::cast_slice(&values),
        )?;

        let mut small = TransferConfig::new();
        small.set_buffer_size(64);
        let mut large = TransferConfig::new();
        large.set_buffer_size(1024 * 1024);
        let bytes_small = read_bytes(&dataset, &ElementType::FLOAT64, None, None, &mut small)?;
        let bytes_large = read_bytes(&dataset, &ElementType::FLOAT64, None, None, &mut large)?;
        assert_eq!(bytes_small, bytes_large);
        let read: Vec<f64> = bytemuck::pod_collect_to_vec(&bytes_large);
        assert_eq!(
            read,
            values.iter().map(|value| f64::from(*value)).collect::<Vec<_>>()
        );
    }
    Ok(())
}

#[test]
fn dataset_buffer_too_small() -> Result<(), Box<dyn std::error::Error>> {
    let (container, _) = container();
    let dataset = DatasetBuilder::new(ElementType::FLOAT64, Extent::new(vec![10]))
        .build(&container, "small")?;
    let mut buffer = vec![0u8; 10 * 8];
    let mut config = TransferConfig::new();
    config.set_buffer_size(4);
    assert!(matches!(
        dataset.read(&ElementType::INT32, None, None, &mut config, &mut buffer),
        Err(DatasetError::BufferTooSmall(_))
    ));
    assert!(matches!(
        dataset.read(
            &ElementType::FLOAT64,
            None,
            None,
            &mut TransferConfig::new(),
            &mut buffer[..79]
        ),
        Err(DatasetError::BufferTooSmall(_))
    ));

    let mut conversion = vec![0u8; 15];
    let mut config = TransferConfig::new();
    config
        .set_buffer_size(16)
        .set_conversion_buffer(Some(conversion.as_mut_slice()));
    assert!(matches!(
        dataset.read(&ElementType::INT32, None, None, &mut config, &mut buffer[..40]),
        Err(DatasetError::BufferTooSmall(_))
    ));
    Ok(())
}

#[test]
fn dataset_caller_buffers() -> Result<(), Box<dyn std::error::Error>> {
    let (container, _) = container();
    let mut dataset = DatasetBuilder::new(ElementType::UINT8, Extent::new(vec![50]))
        .build(&container, "caller")?;
    dataset.write_elements(&Selection::All, &(0..50).collect::<Vec<u8>>())?;

    let mut conversion = vec![0u8; 64];
    let mut background = vec![0u8; 64];
    let mut config = TransferConfig::new();
    config
        .set_buffer_size(32)
        .set_conversion_buffer(Some(conversion.as_mut_slice()))
        .set_background_buffer(Some(background.as_mut_slice()))
        .set_background(BackgroundPolicy::Always);
    let bytes = read_bytes(&dataset, &ElementType::UINT32, None, None, &mut config)?;
    drop(config);
    let read: Vec<u32> = bytemuck::pod_collect_to_vec(&bytes);
    assert_eq!(read, (0..50).collect::<Vec<u32>>());
    assert_ne!(conversion, vec![0u8; 64]);
    Ok(())
}

#[test]
fn dataset_fast_general_equivalence() -> Result<(), Box<dyn std::error::Error>> {
    let (container, _) = container();
    for chunked in [false, true] {
        let mut builder = DatasetBuilder::new(ElementType::UINT16, Extent::new(vec![9, 11]));
        builder.fill_value(1u16);
        if chunked {
            builder.chunk_shape(vec![4, 3]);
        }
        let mut fast = builder.build(&container, &format!("fast/{chunked}"))?;
        let mut general = builder.build(&container, &format!("general/{chunked}"))?;

        let file_space = fast.space().select(Selection::hyperslab(
            vec![1, 0],
            vec![3, 4],
            vec![3, 3],
            vec![2, 3],
        )?)?;
        let memory_space =
            Dataspace::with_selection(Extent::new(vec![6, 10]), Selection::range(&[0..6, 1..10]))?;
        let values = (0..60).map(|value| value * 11).collect::<Vec<u16>>();
        let bytes: &[u8] = bytemuck::cast_slice(&values);

        fast.write(
            &ElementType::UINT16,
            Some(&memory_space),
            Some(&file_space),
            &mut TransferConfig::new(),
            bytes,
        )?;
        let mut config = TransferConfig::new();
        config.set_force_general_path(true).set_buffer_size(10);
        general.write(
            &ElementType::UINT16,
            Some(&memory_space),
            Some(&file_space),
            &mut config,
            bytes,
        )?;

        let read_fast = read_bytes(
            &fast,
            &ElementType::UINT16,
            Some(&memory_space),
            Some(&file_space),
            &mut TransferConfig::new(),
        )?;
        let read_general = read_bytes(
            &general,
            &ElementType::UINT16,
            Some(&memory_space),
            Some(&file_space),
            &mut config,
        )?;
        assert_eq!(read_fast, read_general);
        let full_fast = read_bytes(&fast, &ElementType::UINT16, None, None, &mut TransferConfig::new())?;
        let full_general = read_bytes(&general, &ElementType::UINT16, None, None, &mut config)?;
        assert_eq!(full_fast, full_general);

        let read: Vec<u16> = bytemuck::pod_collect_to_vec(&read_fast);
        for (i, value) in read.iter().enumerate() {
            if i % 10 == 0 {
                assert_eq!(*value, 0);
            } else {
                assert_eq!(*value, values[i]);
            }
        }
    }
    Ok(())
}

fn record_type() -> Result<ElementType, Box<dyn std::error::Error>> {
    Ok(ElementType::Compound(CompoundType::new(
        8,
        vec![
            CompoundMember::new("a", 0, ElementType::INT32),
            CompoundMember::new("b", 4, ElementType::FLOAT32),
        ],
    )?))
}

fn partial_record_type() -> Result<ElementType, Box<dyn std::error::Error>> {
    Ok(ElementType::Compound(CompoundType::new(
        16,
        vec![
            CompoundMember::new("b", 0, ElementType::FLOAT64),
            CompoundMember::new("c", 8, ElementType::UINT32),
        ],
    )?))
}

fn records(values: &[(i32, f32)]) -> Vec<u8> {
    values
        .iter()
        .flat_map(|(a, b)| [a.to_ne_bytes(), b.to_ne_bytes()].concat())
        .collect()
}

#[test]
fn dataset_background_read() -> Result<(), Box<dyn std::error::Error>> {
    let (container, _) = container();
    let record = record_type()?;
    let partial = partial_record_type()?;
    let mut dataset = DatasetBuilder::new(record.clone(), Extent::new(vec![4]))
        .build(&container, "records")?;
    dataset.write(
        &record,
        None,
        None,
        &mut TransferConfig::new(),
        &records(&[(0, 0.5), (1, 1.5), (2, 2.5), (3, 3.5)]),
    )?;

    let memory_space = Dataspace::with_selection(Extent::new(vec![6]), Selection::range(&[1..5]))?;
    let mut buffer = vec![0xabu8; 6 * 16];
    let mut config = TransferConfig::new();
    config.set_buffer_size(32);
    dataset.read(&partial, Some(&memory_space), None, &mut config, &mut buffer)?;

    assert!(buffer[..16].iter().all(|byte| *byte == 0xab));
    assert!(buffer[5 * 16..].iter().all(|byte| *byte == 0xab));
    for (i, element) in buffer[16..5 * 16].chunks_exact(16).enumerate() {
        let b = f64::from_ne_bytes(element[..8].try_into()?);
        assert_eq!(b, i as f64 + 0.5);
        assert!(element[8..].iter().all(|byte| *byte == 0xab));
    }
    Ok(())
}

#[test]
fn dataset_background_write() -> Result<(), Box<dyn std::error::Error>> {
    let (container, _) = container();
    let record = record_type()?;
    let partial = partial_record_type()?;
    let mut dataset = DatasetBuilder::new(record.clone(), Extent::new(vec![4]))
        .chunk_shape(vec![3])
        .build(&container, "records")?;
    dataset.write(
        &record,
        None,
        None,
        &mut TransferConfig::new(),
        &records(&[(10, 0.0), (11, 0.0), (12, 0.0), (13, 0.0)]),
    )?;

    let partial_records = [6.25f64, 7.25]
        .iter()
        .flat_map(|b| {
            let mut record = b.to_ne_bytes().to_vec();
            record.extend([0; 8]);
            record
        })
        .collect::<Vec<u8>>();
    let file_space = dataset.space().select(Selection::range(&[2..4]))?;
    dataset.write(
        &partial,
        Some(&Dataspace::new_fixed(vec![2])),
        Some(&file_space),
        &mut TransferConfig::new(),
        &partial_records,
    )?;

    let stored = read_bytes(&dataset, &record, None, None, &mut TransferConfig::new())?;
    assert_eq!(
        stored,
        records(&[(10, 0.0), (11, 0.0), (12, 6.25), (13, 7.25)])
    );
    Ok(())
}

#[test]
fn dataset_unsupported_conversion() -> Result<(), Box<dyn std::error::Error>> {
    let (container, store) = container();
    let dataset = DatasetBuilder::new(record_type()?, Extent::new(vec![4]))
        .build(&container, "records")?;
    store.reset();
    let mut buffer = vec![0u8; 16];
    assert!(matches!(
        dataset.read(&ElementType::INT32, None, None, &mut TransferConfig::new(), &mut buffer),
        Err(DatasetError::UnsupportedConversion { .. })
    ));
    assert_eq!(store.reads(), 0);
    Ok(())
}

#[test]
fn dataset_modification_time_single_update() -> Result<(), Box<dyn std::error::Error>> {
    let (container, store) = container();
    let mut dataset = DatasetBuilder::new(ElementType::INT32, Extent::new(vec![100]))
        .build(&container, "mtime")?;
    let created = dataset.modification_time();
    store.reset();

    let mut config = TransferConfig::new();
    config.set_buffer_size(64).set_force_general_path(true);
    let values = (0..100).collect::<Vec<i32>>();
    dataset.write(
        &ElementType::INT32,
        None,
        None,
        &mut config,
        bytemuck::cast_slice(&values),
    )?;
    // 7 strips of at most 16 elements and one metadata update
    assert_eq!(store.writes(), 8);
    assert!(dataset.modification_time() >= created);
    Ok(())
}

#[test]
fn dataset_points_and_conversion() -> Result<(), Box<dyn std::error::Error>> {
    let (container, _) = container();
    let mut dataset = DatasetBuilder::new(ElementType::UINT8, Extent::new(vec![4, 4]))
        .build(&container, "points")?;
    let file_space = dataset
        .space()
        .select(Selection::points(vec![vec![3, 3], vec![0, 1], vec![2, 0]]))?;
    let values = [300.0f32, -5.5, 42.9];
    dataset.write(
        &ElementType::FLOAT32,
        Some(&Dataspace::new_fixed(vec![3])),
        Some(&file_space),
        &mut TransferConfig::new(),
        bytemuck::cast_slice(&values),
    )?;
    let elements: Vec<u8> = dataset.read_elements(&Selection::All)?;
    let mut expected = vec![0u8; 16];
    expected[15] = 255;
    expected[1] = 0;
    expected[8] = 42;
    assert_eq!(elements, expected);
    Ok(())
}

#[test]
fn dataset_read_only() -> Result<(), Box<dyn std::error::Error>> {
    let (container, _) = container();
    let mut dataset = DatasetBuilder::new(ElementType::INT64, Extent::new(vec![3]))
        .build(&container, "read_only")?;
    dataset.write_elements(&Selection::All, &[1i64, 2, 3])?;
    dataset.close()?;

    let container = container.with_intent(AccessIntent::ReadOnly);
    let mut dataset = container.open_dataset("read_only")?;
    assert_eq!(dataset.read_elements::<i64>(&Selection::All)?, [1, 2, 3]);
    assert!(matches!(
        dataset.write_elements(&Selection::All, &[4i64, 5, 6]),
        Err(DatasetError::WriteDenied)
    ));
    dataset.close()?;
    Ok(())
}

#[test]
fn dataset_file_space_mismatch() -> Result<(), Box<dyn std::error::Error>> {
    let (container, _) = container();
    let dataset = DatasetBuilder::new(ElementType::INT8, Extent::new(vec![3, 3]))
        .build(&container, "mismatch")?;
    let mut buffer = vec![0u8; 9];
    let file_space = Dataspace::new_fixed(vec![9]);
    assert!(matches!(
        dataset.read(
            &ElementType::INT8,
            None,
            Some(&file_space),
            &mut TransferConfig::new(),
            &mut buffer
        ),
        Err(DatasetError::InvalidArgument(_))
    ));
    Ok(())
}
