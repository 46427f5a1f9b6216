//! Datasets.
//!
//! A [`Dataset`] is a named, typed, shaped array held in a [`Container`].
//! Its metadata record is stored as JSON at `{name}/.dataset`, and its elements are stored according to its [`Layout`]:
//!  - contiguous: `{name}/data`, or the [external files](ExternalFile) of the dataset,
//!  - chunked: `{name}/c/{i}/{j}/...`, each chunk prefixed with a filter mask and encoded through the [filter pipeline](crate::filter::FilterPipeline).
//!
//! Use [`Dataset::read`] and [`Dataset::write`] to transfer elements between a dataset and a memory buffer with element type conversion.
//! [`Dataset::read_elements`] and [`Dataset::write_elements`] are convenience methods for native element types.
//!
//! ## Example
//! ```
//! # use std::sync::Arc;
//! use dsio::{
//!     container::Container,
//!     dataset::DatasetBuilder,
//!     element_type::ElementType,
//!     registry::Registry,
//!     selection::{Extent, Selection},
//!     storage::store::MemoryStore,
//! };
//!
//! let registry = Arc::new(Registry::new_initialized());
//! let container = Container::new(Arc::new(MemoryStore::new()), registry);
//! let mut dataset = DatasetBuilder::new(ElementType::INT32, Extent::new(vec![100]))
//!     .fill_value(7i32)
//!     .build(&container, "values")?;
//! dataset.write_elements(&Selection::range(&[10..20]), &(10..20).collect::<Vec<i32>>())?;
//! let elements: Vec<i32> = dataset.read_elements(&Selection::All)?;
//! assert_eq!(elements[9], 7);
//! assert_eq!(elements[10], 10);
//! # Ok::<_, Box<dyn std::error::Error>>(())
//! ```

mod adapter;
mod creation_params;
mod dataset_builder;
mod dataset_errors;
mod iterate_selection;
mod layout;
mod transfer;

use std::time::{SystemTime, UNIX_EPOCH};

pub use creation_params::{DatasetCreationParams, ExternalFile, FillTime, Layout};
pub use dataset_builder::DatasetBuilder;
pub use dataset_errors::DatasetError;
pub use iterate_selection::iterate_selection;
pub use layout::{LayoutDescriptor, LayoutKind};
pub use transfer::{BackgroundPolicy, TransferConfig, TransferMode, DEFAULT_BTREE_SPLIT_RATIOS};

use dsio_storage::{ReadableStorageTraits, StorageError, StoreKey, WritableStorageTraits};
use serde::{Deserialize, Serialize};

use crate::{
    config::global_config,
    container::{CollectiveDriver, Container, TransferModeOverride},
    element_type::{ConversionPath, Element, ElementType, FillValue},
    filter::FilterPipeline,
    selection::{Dataspace, Extent, Selection},
};

use adapter::{MemoryBuffer, MemoryGather};
use layout::{ChunkedIo, ContiguousIo, LayoutIo};
use transfer::TransferSession;

/// The persisted dataset metadata record.
#[derive(Clone, Debug, Serialize, Deserialize)]
struct DatasetMetadata {
    element_type: ElementType,
    extent: Extent,
    layout: LayoutDescriptor,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    fill_value: Option<FillValue>,
    #[serde(default)]
    fill_time: FillTime,
    #[serde(default, skip_serializing_if = "FilterPipeline::is_empty")]
    filters: FilterPipeline,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    external_files: Vec<ExternalFile>,
    modification_time: u64,
}

impl DatasetMetadata {
    /// Returns true if allocated storage is initialised with the fill value.
    fn fill_on_alloc(&self) -> bool {
        match self.fill_time {
            FillTime::Alloc => true,
            FillTime::IfSet => self.fill_value.is_some(),
            FillTime::Never => false,
        }
    }

    /// The element written when storage is allocated.
    fn alloc_fill(&self) -> Vec<u8> {
        self.fill_value.as_ref().map_or_else(
            || vec![0; self.element_type.size()],
            |fill_value| fill_value.as_bytes().to_vec(),
        )
    }

    /// The element read where storage has not been written.
    fn read_fill(&self) -> Vec<u8> {
        if self.fill_time == FillTime::Never {
            vec![0; self.element_type.size()]
        } else {
            self.alloc_fill()
        }
    }
}

fn metadata_key(name: &str) -> Result<StoreKey, DatasetError> {
    if name.is_empty() || name.starts_with('/') || name.ends_with('/') {
        return Err(DatasetError::InvalidArgument(format!(
            "invalid dataset name {name:?}"
        )));
    }
    Ok(StoreKey::new(format!("{name}/.dataset"))?)
}

fn now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |duration| duration.as_secs())
}

fn storage_init_failed(err: DatasetError) -> DatasetError {
    match err {
        DatasetError::StorageError(err) => DatasetError::StorageInitFailed(err),
        err => err,
    }
}

/// Establish the effective transfer mode of a transfer.
///
/// Returns a guard holding the effective mode for the duration of the transfer, and whether the direct path may be used.
fn collective_access<'a>(
    driver: Option<&'a CollectiveDriver>,
    name: &str,
    config: &TransferConfig<'_>,
    direct: bool,
    contiguous: bool,
) -> Result<(Option<TransferModeOverride<'a>>, bool), DatasetError> {
    match (config.mode(), driver) {
        (TransferMode::Independent, None) => Ok((None, direct)),
        (TransferMode::Collective, None) => Err(DatasetError::InvalidArgument(
            "a collective transfer requires a container with a collective backend".to_string(),
        )),
        (TransferMode::Independent, Some(driver)) => {
            let guard = TransferModeOverride::new(driver, TransferMode::Independent);
            driver.record_operation();
            Ok((Some(guard), direct))
        }
        (TransferMode::Collective, Some(driver)) => {
            if direct && contiguous {
                let guard = TransferModeOverride::new(driver, TransferMode::Collective);
                driver.record_operation();
                Ok((Some(guard), true))
            } else {
                log::debug!("collective transfer of dataset {name} downgraded to independent");
                let guard = TransferModeOverride::new(driver, TransferMode::Independent);
                driver.record_operation();
                Ok((Some(guard), false))
            }
        }
    }
}

/// Check every element of `extent`, or of its maximum if bounded, has a `u64` byte offset.
fn check_storage_bytes(element_type: &ElementType, extent: &Extent) -> Result<(), DatasetError> {
    let elements = extent
        .max_num_elements()
        .unwrap_or_else(|| extent.num_elements());
    match elements.checked_mul(element_type.size() as u64) {
        Some(_) => Ok(()),
        None => Err(DatasetError::InvalidArgument(format!(
            "{elements} elements of {element_type} exceed the addressable bytes of a dataset"
        ))),
    }
}

fn check_buffer(
    space: &Dataspace,
    element_type: &ElementType,
    len: usize,
) -> Result<(), DatasetError> {
    let required = usize::try_from(space.extent().num_elements())
        .ok()
        .and_then(|elements| elements.checked_mul(element_type.size()))
        .ok_or_else(|| {
            DatasetError::BufferTooSmall(format!(
                "the memory extent {:?} of {element_type} overflows the address space",
                space.extent().dims()
            ))
        })?;
    if len < required {
        Err(DatasetError::BufferTooSmall(format!(
            "the memory extent {:?} of {element_type} requires {required} bytes, the buffer has {len} bytes",
            space.extent().dims()
        )))
    } else {
        Ok(())
    }
}

/// A dataset.
///
/// A handle is the only in-memory view of an open dataset, so it is not [`Clone`].
/// Open another handle with [`Container::open_dataset`] to see changes persisted through this one.
///
/// ```compile_fail
/// fn clone_handle(dataset: &dsio::dataset::Dataset) -> dsio::dataset::Dataset {
///     dataset.clone()
/// }
/// ```
pub struct Dataset {
    container: Container,
    name: String,
    metadata: DatasetMetadata,
    io: LayoutIo,
}

impl std::fmt::Debug for Dataset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dataset")
            .field("name", &self.name)
            .field("metadata", &self.metadata)
            .finish_non_exhaustive()
    }
}

impl Dataset {
    /// Create a dataset at `name` in `container`.
    ///
    /// The fill value of `params` is converted to `element_type`.
    /// Contiguous storage is initialised with the fill value if the fill time requires it.
    /// Chunks are allocated on first write, or every chunk is allocated immediately if the container has a collective backend.
    ///
    /// # Errors
    /// Returns
    ///  - [`DatasetError::WriteDenied`] if the container does not have write intent,
    ///  - [`DatasetError::InvalidArgument`] if a dataset exists at `name` or the creation parameters are incompatible with the element type or extent,
    ///  - [`DatasetError::UnsupportedConversion`] if the fill value cannot be converted to `element_type`,
    ///  - [`DatasetError::StorageInitFailed`] if storage initialisation fails, or
    ///  - [`DatasetError::StorageError`] if there is an underlying storage error.
    pub fn create(
        container: &Container,
        name: &str,
        element_type: ElementType,
        extent: Extent,
        params: DatasetCreationParams,
    ) -> Result<Self, DatasetError> {
        if !container.is_writable() {
            return Err(DatasetError::WriteDenied);
        }
        extent.validate()?;
        let key = metadata_key(name)?;
        if container.storage().size_key(&key)?.is_some() {
            return Err(DatasetError::InvalidArgument(format!(
                "a dataset already exists at {name}"
            )));
        }
        Self::validate_params(container, &element_type, &extent, &params)?;
        check_storage_bytes(&element_type, &extent)?;

        let fill_value = params
            .fill_value()
            .map(|fill_value| fill_value.convert_to(&element_type))
            .transpose()?;
        let metadata = DatasetMetadata {
            layout: LayoutDescriptor::new(params.layout(), extent.dims()),
            element_type,
            extent,
            fill_value,
            fill_time: params.fill_time(),
            filters: params.filters().clone(),
            external_files: params.external_files().to_vec(),
            modification_time: now(),
        };
        let io = Self::layout_io(container, name, &metadata)?;
        let dataset = Self {
            container: container.clone(),
            name: name.to_string(),
            metadata,
            io,
        };
        dataset
            .initialize_storage(0, dataset.metadata.extent.num_elements())
            .map_err(storage_init_failed)?;
        dataset.store_metadata()?;
        log::debug!(
            "created dataset {name}: {} {:?}",
            dataset.metadata.element_type,
            dataset.metadata.extent.dims()
        );
        Ok(dataset)
    }

    fn validate_params(
        container: &Container,
        element_type: &ElementType,
        extent: &Extent,
        params: &DatasetCreationParams,
    ) -> Result<(), DatasetError> {
        let invalid = |message: String| Err(DatasetError::InvalidArgument(message));
        match params.layout() {
            Layout::Chunked { chunk_shape } => {
                if extent.rank() == 0 {
                    return invalid("a chunked layout requires at least one dimension".to_string());
                }
                if chunk_shape.len() != extent.rank() {
                    return invalid(format!(
                        "chunk shape {chunk_shape:?} does not match the dimensionality {} of the extent",
                        extent.rank()
                    ));
                }
                if chunk_shape.contains(&0) {
                    return invalid(format!("chunk shape {chunk_shape:?} has a zero dimension"));
                }
                let chunk_bytes = chunk_shape
                    .iter()
                    .try_fold(element_type.size() as u64, |bytes, dim| bytes.checked_mul(*dim))
                    .and_then(|bytes| usize::try_from(bytes).ok());
                if chunk_bytes.is_none() {
                    return invalid(format!(
                        "a chunk of shape {chunk_shape:?} exceeds the address space"
                    ));
                }
                if !params.external_files().is_empty() {
                    return invalid("external files require a contiguous layout".to_string());
                }
                params
                    .filters()
                    .validate(&container.registry().filters())
                    .map_err(|err| DatasetError::InvalidArgument(err.to_string()))?;
            }
            Layout::Contiguous => {
                if !params.filters().is_empty() {
                    return invalid("filters require a chunked layout".to_string());
                }
                if extent.max_dims().iter().skip(1).any(Option::is_none) {
                    return invalid(
                        "a contiguous layout may only be unlimited in dimension 0".to_string(),
                    );
                }
                Self::validate_external_files(element_type, extent, params.external_files())?;
            }
        }
        Ok(())
    }

    fn validate_external_files(
        element_type: &ElementType,
        extent: &Extent,
        external_files: &[ExternalFile],
    ) -> Result<(), DatasetError> {
        let Some((last, others)) = external_files.split_last() else {
            return Ok(());
        };
        if others.iter().any(|external_file| external_file.size.is_none()) {
            return Err(DatasetError::InvalidArgument(
                "only the last external file may be unlimited".to_string(),
            ));
        }
        match (extent.max_num_elements(), last.size) {
            (None, Some(_)) => Err(DatasetError::InvalidArgument(
                "an unlimited extent requires the last external file to be unlimited".to_string(),
            )),
            (Some(max_num_elements), Some(_)) => {
                let capacity = external_files
                    .iter()
                    .filter_map(|external_file| external_file.size)
                    .fold(0u64, u64::saturating_add);
                let required = max_num_elements.saturating_mul(element_type.size() as u64);
                if capacity < required {
                    Err(DatasetError::InvalidArgument(format!(
                        "external files hold {capacity} bytes, the dataset requires {required} bytes"
                    )))
                } else {
                    Ok(())
                }
            }
            (_, None) => Ok(()),
        }
    }

    fn layout_io(
        container: &Container,
        name: &str,
        metadata: &DatasetMetadata,
    ) -> Result<LayoutIo, DatasetError> {
        let element_size = metadata.element_type.size();
        Ok(match metadata.layout.layout()? {
            Layout::Contiguous => LayoutIo::Contiguous(ContiguousIo::new(
                container.storage().clone(),
                name,
                &metadata.external_files,
                element_size,
                metadata.read_fill(),
            )?),
            Layout::Chunked { chunk_shape } => LayoutIo::Chunked(ChunkedIo::new(
                container.storage().clone(),
                name,
                metadata.extent.dims().to_vec(),
                chunk_shape,
                element_size,
                metadata.read_fill(),
                metadata.filters.clone(),
                container.registry().clone(),
            )),
        })
    }

    /// Initialise the storage of the elements with linear indices `start..end`.
    ///
    /// Chunked storage is allocated for the current extent.
    fn initialize_storage(&self, start: u64, end: u64) -> Result<(), DatasetError> {
        match &self.io {
            LayoutIo::Contiguous(io) => {
                let deferred = io.is_external() && self.metadata.fill_value.is_none();
                if self.metadata.fill_on_alloc() && !deferred {
                    io.fill_elements(start, end, &self.metadata.alloc_fill())?;
                }
            }
            LayoutIo::Chunked(io) => {
                if self.container.backend().collective_driver().is_some() {
                    let allocated = io.allocate_missing_chunks()?;
                    log::debug!("allocated {allocated} chunks of dataset {}", self.name);
                }
            }
        }
        Ok(())
    }

    /// Open the dataset at `name` in `container`.
    ///
    /// If the container has a collective backend and write intent, any chunks of a chunked dataset that are not yet stored are allocated.
    ///
    /// # Errors
    /// Returns
    ///  - [`DatasetError::NotFound`] if there is no dataset at `name` or its metadata is invalid,
    ///  - [`DatasetError::StorageInitFailed`] if chunk allocation fails, or
    ///  - [`DatasetError::StorageError`] if there is an underlying storage error.
    pub fn open(container: &Container, name: &str) -> Result<Self, DatasetError> {
        let key = metadata_key(name)?;
        let bytes = container
            .storage()
            .get(&key)?
            .ok_or_else(|| DatasetError::NotFound(format!("dataset {name}")))?;
        let metadata: DatasetMetadata = serde_json::from_slice(&bytes).map_err(|err| {
            DatasetError::NotFound(format!("dataset {name} has invalid metadata: {err}"))
        })?;
        metadata.extent.validate().map_err(|err| {
            DatasetError::NotFound(format!("dataset {name} has invalid metadata: {err}"))
        })?;
        let io = Self::layout_io(container, name, &metadata)?;
        let dataset = Self {
            container: container.clone(),
            name: name.to_string(),
            metadata,
            io,
        };
        if container.is_writable() && !dataset.io.is_contiguous() {
            dataset
                .initialize_storage(0, dataset.metadata.extent.num_elements())
                .map_err(storage_init_failed)?;
        }
        Ok(dataset)
    }

    fn store_metadata(&self) -> Result<(), DatasetError> {
        let bytes = if global_config().metadata_pretty() {
            serde_json::to_vec_pretty(&self.metadata)
        } else {
            serde_json::to_vec(&self.metadata)
        }
        .map_err(|err| StorageError::Other(err.to_string()))?;
        self.container
            .storage()
            .set(&metadata_key(&self.name)?, bytes.into())?;
        Ok(())
    }

    /// The dataset name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The container of the dataset.
    #[must_use]
    pub const fn container(&self) -> &Container {
        &self.container
    }

    /// Returns a dataspace selecting the full extent of the dataset.
    #[must_use]
    pub fn space(&self) -> Dataspace {
        Dataspace::new(self.metadata.extent.clone())
    }

    /// Returns a copy of the element type.
    #[must_use]
    pub fn element_type(&self) -> ElementType {
        self.metadata.element_type.clone()
    }

    /// Returns a copy of the creation parameters, with the fill value converted to the dataset element type.
    #[must_use]
    pub fn creation_params(&self) -> DatasetCreationParams {
        DatasetCreationParams::from_parts(
            self.metadata.layout.layout().unwrap_or_default(),
            self.metadata.fill_value.clone(),
            self.metadata.fill_time,
            self.metadata.filters.clone(),
            self.metadata.external_files.clone(),
        )
    }

    /// The layout descriptor.
    #[must_use]
    pub const fn layout_descriptor(&self) -> &LayoutDescriptor {
        &self.metadata.layout
    }

    /// The modification time in seconds since the Unix epoch.
    #[must_use]
    pub const fn modification_time(&self) -> u64 {
        self.metadata.modification_time
    }

    /// The number of bytes allocated in storage.
    ///
    /// A chunked dataset reports only its stored chunks.
    ///
    /// # Errors
    /// Returns a [`DatasetError`] if there is an underlying storage error.
    pub fn storage_size(&self) -> Result<u64, DatasetError> {
        self.io.storage_size()
    }

    /// Resolve the file and memory dataspaces of a transfer.
    ///
    /// The file dataspace defaults to the full extent of the dataset, and the memory dataspace defaults to the file dataspace.
    fn resolve_spaces(
        &self,
        memory_space: Option<&Dataspace>,
        file_space: Option<&Dataspace>,
    ) -> Result<(Dataspace, Dataspace), DatasetError> {
        let file_space = match file_space {
            Some(file_space) if file_space.extent().dims() != self.metadata.extent.dims() => {
                return Err(DatasetError::InvalidArgument(format!(
                    "file dataspace dimensions {:?} do not match the dataset dimensions {:?}",
                    file_space.extent().dims(),
                    self.metadata.extent.dims()
                )));
            }
            Some(file_space) => file_space.clone(),
            None => self.space(),
        };
        let memory_space = memory_space.map_or_else(|| file_space.clone(), Clone::clone);
        if file_space.num_elements() != memory_space.num_elements() {
            return Err(DatasetError::SelectionSizeMismatch {
                file: file_space.num_elements(),
                memory: memory_space.num_elements(),
            });
        }
        Ok((file_space, memory_space))
    }

    /// Read the elements selected by `file_space` into the elements selected by `memory_space` of `buffer`, converting them to `memory_type`.
    ///
    /// If `file_space` is [`None`], every element of the dataset is read.
    /// If `memory_space` is [`None`], the memory dataspace is the file dataspace.
    /// `buffer` must hold every element of the memory extent.
    ///
    /// # Errors
    /// Returns
    ///  - [`DatasetError::InvalidArgument`] if the file dataspace does not match the dataset extent or a collective transfer is requested without a collective backend,
    ///  - [`DatasetError::SelectionSizeMismatch`] if the selections have a different number of elements,
    ///  - [`DatasetError::BufferTooSmall`] if `buffer` or a buffer of `config` is too small,
    ///  - [`DatasetError::UnsupportedConversion`] if there is no conversion from the dataset element type to `memory_type`, or
    ///  - a [`DatasetError`] on an underlying storage or filter error.
    pub fn read(
        &self,
        memory_type: &ElementType,
        memory_space: Option<&Dataspace>,
        file_space: Option<&Dataspace>,
        config: &mut TransferConfig<'_>,
        buffer: &mut [u8],
    ) -> Result<(), DatasetError> {
        let (file_space, memory_space) = self.resolve_spaces(memory_space, file_space)?;
        check_buffer(&memory_space, memory_type, buffer.len())?;
        let path = ConversionPath::new(&self.metadata.element_type, memory_type)?;
        if file_space.num_elements() == 0 {
            return Ok(());
        }

        let direct = transfer::is_direct_eligible(&self.io, &path, &file_space, &memory_space, config);
        let driver = self.container.backend().collective_driver().cloned();
        let (_guard, direct) = collective_access(
            driver.as_deref(),
            &self.name,
            config,
            direct,
            self.io.is_contiguous(),
        )?;
        if direct {
            transfer::read_direct(&self.io, &file_space, &memory_space, buffer)?;
        } else {
            let mut destination = MemoryBuffer::new(buffer, memory_type.size());
            let mut session = TransferSession::new(&file_space, &memory_space, &path, config)?;
            let strips = session.run(&self.io, &mut destination)?;
            log::debug!("read dataset {} in {strips} strips", self.name);
        }
        Ok(())
    }

    /// Write the elements selected by `memory_space` of `buffer` of `memory_type` to the elements selected by `file_space`, converting them to the dataset element type.
    ///
    /// If `file_space` is [`None`], every element of the dataset is written.
    /// If `memory_space` is [`None`], the memory dataspace is the file dataspace.
    /// The modification time is updated once the elements are written.
    ///
    /// # Errors
    /// Returns [`DatasetError::WriteDenied`] if the container does not have write intent, otherwise see [`Dataset::read`].
    pub fn write(
        &mut self,
        memory_type: &ElementType,
        memory_space: Option<&Dataspace>,
        file_space: Option<&Dataspace>,
        config: &mut TransferConfig<'_>,
        buffer: &[u8],
    ) -> Result<(), DatasetError> {
        if !self.container.is_writable() {
            return Err(DatasetError::WriteDenied);
        }
        let (file_space, memory_space) = self.resolve_spaces(memory_space, file_space)?;
        check_buffer(&memory_space, memory_type, buffer.len())?;
        let path = ConversionPath::new(memory_type, &self.metadata.element_type)?;
        if file_space.num_elements() == 0 {
            return Ok(());
        }

        let direct = transfer::is_direct_eligible(&self.io, &path, &file_space, &memory_space, config);
        let driver = self.container.backend().collective_driver().cloned();
        let (guard, direct) = collective_access(
            driver.as_deref(),
            &self.name,
            config,
            direct,
            self.io.is_contiguous(),
        )?;
        if direct {
            transfer::write_direct(&self.io, &file_space, &memory_space, buffer)?;
        } else {
            let source = MemoryGather::new(buffer, memory_type.size());
            let mut session = TransferSession::new(&memory_space, &file_space, &path, config)?;
            let strips = session.run(&source, &mut self.io)?;
            log::debug!("wrote dataset {} in {strips} strips", self.name);
        }
        drop(guard);

        self.metadata.modification_time = now();
        self.store_metadata()
    }

    /// Read the elements of `selection` as a native element type.
    ///
    /// # Errors
    /// See [`Dataset::read`].
    pub fn read_elements<T: Element>(&self, selection: &Selection) -> Result<Vec<T>, DatasetError> {
        let file_space = self.space().select(selection.clone())?;
        let num_elements = usize::try_from(file_space.num_elements()).map_err(|_| {
            DatasetError::BufferTooSmall(format!(
                "{} elements overflows the address space",
                file_space.num_elements()
            ))
        })?;
        let memory_space = Dataspace::new_fixed(vec![file_space.num_elements()]);
        let mut elements = vec![T::zeroed(); num_elements];
        self.read(
            &T::element_type(),
            Some(&memory_space),
            Some(&file_space),
            &mut TransferConfig::new(),
            bytemuck::cast_slice_mut(&mut elements),
        )?;
        Ok(elements)
    }

    /// Write `elements` of a native element type to `selection`.
    ///
    /// # Errors
    /// See [`Dataset::write`].
    pub fn write_elements<T: Element>(
        &mut self,
        selection: &Selection,
        elements: &[T],
    ) -> Result<(), DatasetError> {
        let file_space = self.space().select(selection.clone())?;
        let memory_space = Dataspace::new_fixed(vec![elements.len() as u64]);
        self.write(
            &T::element_type(),
            Some(&memory_space),
            Some(&file_space),
            &mut TransferConfig::new(),
            bytemuck::cast_slice(elements),
        )
    }

    /// Extend the dataset to `dims`.
    ///
    /// Dimensions never shrink and must not exceed the maximum dimensions.
    /// A contiguous dataset with more than one dimension may only be extended in dimension 0.
    /// The newly exposed elements of a contiguous dataset are initialised with the fill value if the fill time requires it.
    ///
    /// If initialising the new elements fails, the dataset keeps its previous extent.
    ///
    /// # Errors
    /// Returns
    ///  - [`DatasetError::WriteDenied`] if the container does not have write intent,
    ///  - [`DatasetError::InvalidArgument`] if `dims` is an invalid extension,
    ///  - [`DatasetError::StorageInitFailed`] if the new elements cannot be initialised, or
    ///  - a [`DatasetError`] on an underlying storage error.
    pub fn extend(&mut self, dims: &[u64]) -> Result<(), DatasetError> {
        if !self.container.is_writable() {
            return Err(DatasetError::WriteDenied);
        }
        let current = self.metadata.extent.dims();
        if dims.len() != current.len() {
            return Err(DatasetError::InvalidArgument(format!(
                "extent {dims:?} does not match the dimensionality of {current:?}"
            )));
        }
        if dims.iter().zip(current).any(|(dim, current)| dim < current) {
            return Err(DatasetError::InvalidArgument(format!(
                "extent {dims:?} is smaller than {current:?}"
            )));
        }
        if self.io.is_contiguous() && dims.iter().skip(1).ne(current.iter().skip(1)) {
            return Err(DatasetError::InvalidArgument(format!(
                "a contiguous dataset may only be extended in dimension 0, {current:?} to {dims:?}"
            )));
        }
        let extent = self
            .metadata
            .extent
            .with_dims(dims.to_vec())
            .map_err(|err| DatasetError::InvalidArgument(err.to_string()))?;
        check_storage_bytes(&self.metadata.element_type, &extent)?;
        if self.io.is_contiguous() {
            self.initialize_storage(self.metadata.extent.num_elements(), extent.num_elements())
                .map_err(storage_init_failed)?;
        }
        self.metadata.layout = LayoutDescriptor::new(&self.metadata.layout.layout()?, dims);
        self.metadata.extent = extent;
        self.io.set_dims(dims);
        self.metadata.modification_time = now();
        self.store_metadata()
    }

    /// Close the dataset, flushing its metadata if the container has write intent.
    ///
    /// # Errors
    /// Returns a [`DatasetError`] if the metadata cannot be stored.
    pub fn close(self) -> Result<(), DatasetError> {
        if self.container.is_writable() {
            self.store_metadata()?;
        }
        log::debug!("closed dataset {}", self.name);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use dsio_storage::store::MemoryStore;

    use super::*;
    use crate::{
        container::{AccessIntent, Backend},
        filter::FILTER_SHUFFLE,
        registry::Registry,
    };

    fn container() -> Container {
        Container::new(
            Arc::new(MemoryStore::new()),
            Arc::new(Registry::new_initialized()),
        )
    }

    #[test]
    fn dataset_create_open() {
        let container = container();
        let mut params = DatasetCreationParams::new();
        params
            .set_chunk_shape(vec![4, 4])
            .set_fill_value(Some(FillValue::from(1.5f32)))
            .set_filters(FilterPipeline::new().with_filter(FILTER_SHUFFLE, vec![]));
        let dataset = container
            .create_dataset("a/b", ElementType::FLOAT64, Extent::new(vec![8, 6]), params)
            .unwrap();
        assert_eq!(dataset.element_type(), ElementType::FLOAT64);
        assert_eq!(
            dataset.creation_params().fill_value(),
            Some(&FillValue::from(1.5f64))
        );
        let descriptor = dataset.layout_descriptor().clone();
        dataset.close().unwrap();

        let dataset = container.open_dataset("a/b").unwrap();
        assert_eq!(dataset.layout_descriptor(), &descriptor);
        assert_eq!(dataset.space().extent().dims(), [8, 6]);
        assert_eq!(
            dataset.creation_params().layout(),
            &Layout::Chunked { chunk_shape: vec![4, 4] }
        );
        assert_eq!(dataset.storage_size().unwrap(), 0);
        let elements: Vec<f64> = dataset.read_elements(&Selection::All).unwrap();
        assert_eq!(elements, vec![1.5; 48]);
    }

    #[test]
    fn dataset_create_invalid() {
        let container = container();
        let create = |extent: Extent, params: DatasetCreationParams| {
            container.create_dataset("d", ElementType::INT32, extent, params)
        };

        let mut params = DatasetCreationParams::new();
        params.set_filters(FilterPipeline::new().with_filter(FILTER_SHUFFLE, vec![]));
        assert!(matches!(
            create(Extent::new(vec![4]), params),
            Err(DatasetError::InvalidArgument(_))
        ));

        let mut params = DatasetCreationParams::new();
        params.set_chunk_shape(vec![2]);
        assert!(create(Extent::new(vec![4, 4]), params).is_err());

        let mut params = DatasetCreationParams::new();
        params.set_chunk_shape(vec![2, 0]);
        assert!(create(Extent::new(vec![4, 4]), params).is_err());

        let mut params = DatasetCreationParams::new();
        params
            .set_chunk_shape(vec![2])
            .set_filters(FilterPipeline::new().with_filter(999, vec![]));
        assert!(create(Extent::new(vec![4]), params).is_err());

        let extent = Extent::new_with_max(vec![4, 4], vec![Some(4), None]).unwrap();
        assert!(create(extent, DatasetCreationParams::new()).is_err());

        let mut params = DatasetCreationParams::new();
        params.push_external_file(ExternalFile::new("ext", 0, Some(15)));
        assert!(create(Extent::new(vec![4]), params).is_err());

        let mut params = DatasetCreationParams::new();
        params.push_external_file(ExternalFile::new("ext", 0, Some(16)));
        let extent = Extent::new_with_max(vec![4], vec![None]).unwrap();
        assert!(create(extent, params).is_err());

        let mut params = DatasetCreationParams::new();
        params.set_fill_value(Some(FillValue::from(1.0f32)));
        let compound = ElementType::Compound(
            crate::element_type::CompoundType::new(
                4,
                vec![crate::element_type::CompoundMember::new("x", 0, ElementType::INT32)],
            )
            .unwrap(),
        );
        assert!(matches!(
            container.create_dataset("d", compound, Extent::new(vec![4]), params),
            Err(DatasetError::UnsupportedConversion { .. })
        ));

        assert!(create(Extent::new(vec![4]), DatasetCreationParams::new()).is_ok());
        assert!(matches!(
            create(Extent::new(vec![4]), DatasetCreationParams::new()),
            Err(DatasetError::InvalidArgument(_))
        ));
    }

    #[test]
    fn dataset_open_not_found() {
        let container = container();
        assert!(matches!(
            container.open_dataset("missing"),
            Err(DatasetError::NotFound(_))
        ));
        container
            .storage()
            .set(&StoreKey::new("bad/.dataset").unwrap(), vec![b'{'].into())
            .unwrap();
        assert!(matches!(
            container.open_dataset("bad"),
            Err(DatasetError::NotFound(_))
        ));
    }

    #[test]
    fn dataset_write_denied() {
        let container = container();
        container
            .create_dataset("d", ElementType::INT32, Extent::new(vec![4]), DatasetCreationParams::new())
            .unwrap();
        let read_only = container.clone().with_intent(AccessIntent::ReadOnly);
        let mut dataset = read_only.open_dataset("d").unwrap();
        assert!(matches!(
            dataset.write_elements(&Selection::All, &[1i32, 2, 3, 4]),
            Err(DatasetError::WriteDenied)
        ));
        assert!(matches!(dataset.extend(&[5]), Err(DatasetError::WriteDenied)));
        assert!(matches!(
            read_only.create_dataset("e", ElementType::INT32, Extent::new(vec![4]), DatasetCreationParams::new()),
            Err(DatasetError::WriteDenied)
        ));
    }

    #[test]
    fn dataset_extend_invalid() {
        let container = container();
        let extent = Extent::new_with_max(vec![2, 3], vec![Some(4), Some(3)]).unwrap();
        let mut dataset = container
            .create_dataset("d", ElementType::UINT8, extent, DatasetCreationParams::new())
            .unwrap();
        assert!(dataset.extend(&[1, 3]).is_err());
        assert!(dataset.extend(&[5, 3]).is_err());
        assert!(dataset.extend(&[2, 4]).is_err());
        assert!(dataset.extend(&[3]).is_err());
        dataset.extend(&[4, 3]).unwrap();
        assert_eq!(dataset.space().extent().dims(), [4, 3]);
    }

    #[test]
    fn dataset_collective_eager_allocation() {
        let storage = Arc::new(MemoryStore::new());
        let registry = Arc::new(Registry::new_initialized());
        let driver = Arc::new(CollectiveDriver::new(0, 2).unwrap());
        let container = Container::new(storage.clone(), registry.clone())
            .with_backend(Backend::Collective(driver));
        let mut params = DatasetCreationParams::new();
        params.set_chunk_shape(vec![2]).set_fill_value(Some(FillValue::from(3u8)));
        let dataset = container
            .create_dataset("d", ElementType::UINT8, Extent::new(vec![5]), params)
            .unwrap();
        assert_eq!(dataset.storage_size().unwrap(), 3 * (4 + 2));

        // chunks erased behind the back of a collective container are reallocated on open
        storage
            .erase(&StoreKey::new("d/c/1").unwrap())
            .unwrap();
        let serial = Container::new(storage, registry);
        assert_eq!(serial.open_dataset("d").unwrap().storage_size().unwrap(), 2 * 6);
        let dataset = container.open_dataset("d").unwrap();
        assert_eq!(dataset.storage_size().unwrap(), 3 * 6);
    }
}
