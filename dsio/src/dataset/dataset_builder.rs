use crate::{
    container::Container,
    element_type::{ElementType, FillValue},
    filter::FilterPipeline,
    selection::Extent,
};

use super::{Dataset, DatasetCreationParams, DatasetError, ExternalFile, FillTime, Layout};

/// A [`Dataset`] builder.
///
/// The builder is initialised from an element type and extent.
/// The layout defaults to contiguous, with no fill value, [`FillTime::IfSet`], no filters and no external files.
///
/// Use the methods of the builder to change the creation parameters, then call [`build`](DatasetBuilder::build) to create the dataset in a [`Container`].
///
/// ```
/// # use std::sync::Arc;
/// # use dsio::{container::Container, dataset::DatasetBuilder, element_type::ElementType, registry::Registry, selection::Extent, storage::store::MemoryStore};
/// # let container = Container::new(Arc::new(MemoryStore::new()), Arc::new(Registry::new_initialized()));
/// let dataset = DatasetBuilder::new(ElementType::FLOAT32, Extent::new(vec![100, 100]))
///     .chunk_shape(vec![10, 10])
///     .fill_value(f32::NAN)
///     .build(&container, "grid")?;
/// # Ok::<_, dsio::dataset::DatasetError>(())
/// ```
#[derive(Debug, Clone)]
pub struct DatasetBuilder {
    element_type: ElementType,
    extent: Extent,
    params: DatasetCreationParams,
}

impl DatasetBuilder {
    /// Create a new dataset builder for a dataset of `element_type` with `extent`.
    #[must_use]
    pub fn new(element_type: ElementType, extent: Extent) -> Self {
        Self {
            element_type,
            extent,
            params: DatasetCreationParams::new(),
        }
    }

    /// Create a new dataset builder from the properties of an existing dataset.
    #[must_use]
    pub fn from_dataset(dataset: &Dataset) -> Self {
        Self {
            element_type: dataset.element_type(),
            extent: dataset.space().extent().clone(),
            params: dataset.creation_params(),
        }
    }

    /// Set the layout.
    pub fn layout(&mut self, layout: Layout) -> &mut Self {
        self.params.set_layout(layout);
        self
    }

    /// Set a chunked layout with `chunk_shape`.
    pub fn chunk_shape(&mut self, chunk_shape: Vec<u64>) -> &mut Self {
        self.params.set_chunk_shape(chunk_shape);
        self
    }

    /// Set the fill value.
    ///
    /// The fill value is converted to the dataset element type when the dataset is built.
    pub fn fill_value(&mut self, fill_value: impl Into<FillValue>) -> &mut Self {
        self.params.set_fill_value(Some(fill_value.into()));
        self
    }

    /// Set the fill time.
    pub fn fill_time(&mut self, fill_time: FillTime) -> &mut Self {
        self.params.set_fill_time(fill_time);
        self
    }

    /// Set the filter pipeline.
    pub fn filters(&mut self, filters: FilterPipeline) -> &mut Self {
        self.params.set_filters(filters);
        self
    }

    /// Append an external file segment.
    pub fn external_file(&mut self, external_file: ExternalFile) -> &mut Self {
        self.params.push_external_file(external_file);
        self
    }

    /// Build into a [`Dataset`] at `name` in `container`.
    ///
    /// # Errors
    /// See [`Dataset::create`].
    pub fn build(&self, container: &Container, name: &str) -> Result<Dataset, DatasetError> {
        Dataset::create(
            container,
            name,
            self.element_type.clone(),
            self.extent.clone(),
            self.params.clone(),
        )
    }
}
