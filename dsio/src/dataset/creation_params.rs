use serde::{Deserialize, Serialize};

use crate::{element_type::FillValue, filter::FilterPipeline};

/// The storage layout of a dataset.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Layout {
    /// Elements are stored in row-major order in a single value, or across external files.
    #[default]
    Contiguous,
    /// Elements are stored in regular chunks, each encoded through the filter pipeline.
    Chunked {
        /// The shape of a chunk.
        chunk_shape: Vec<u64>,
    },
}

/// When the fill value is written to newly allocated storage.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FillTime {
    /// Write the fill value on allocation only if a fill value is defined.
    #[default]
    IfSet,
    /// Always write the fill value on allocation, zeros if a fill value is not defined.
    Alloc,
    /// Never write the fill value.
    ///
    /// Unwritten elements read as zeros.
    Never,
}

/// A segment of contiguous dataset storage held in an external store value.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExternalFile {
    /// The store key of the external value.
    pub name: String,
    /// The byte offset of the segment within the external value.
    pub offset: u64,
    /// The size in bytes of the segment, [`None`] is unlimited.
    pub size: Option<u64>,
}

impl ExternalFile {
    /// Create a new external file segment.
    #[must_use]
    pub fn new(name: impl Into<String>, offset: u64, size: Option<u64>) -> Self {
        Self {
            name: name.into(),
            offset,
            size,
        }
    }
}

/// Dataset creation parameters.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DatasetCreationParams {
    layout: Layout,
    fill_value: Option<FillValue>,
    fill_time: FillTime,
    filters: FilterPipeline,
    external_files: Vec<ExternalFile>,
}

impl DatasetCreationParams {
    /// Create default creation parameters: contiguous layout, no fill value, [`FillTime::IfSet`], no filters and no external files.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the layout.
    pub fn set_layout(&mut self, layout: Layout) -> &mut Self {
        self.layout = layout;
        self
    }

    /// Set a chunked layout with `chunk_shape`.
    pub fn set_chunk_shape(&mut self, chunk_shape: Vec<u64>) -> &mut Self {
        self.layout = Layout::Chunked { chunk_shape };
        self
    }

    /// Set the fill value.
    pub fn set_fill_value(&mut self, fill_value: Option<FillValue>) -> &mut Self {
        self.fill_value = fill_value;
        self
    }

    /// Set the fill time.
    pub fn set_fill_time(&mut self, fill_time: FillTime) -> &mut Self {
        self.fill_time = fill_time;
        self
    }

    /// Set the filter pipeline.
    pub fn set_filters(&mut self, filters: FilterPipeline) -> &mut Self {
        self.filters = filters;
        self
    }

    /// Append an external file segment.
    pub fn push_external_file(&mut self, external_file: ExternalFile) -> &mut Self {
        self.external_files.push(external_file);
        self
    }

    /// The layout.
    #[must_use]
    pub const fn layout(&self) -> &Layout {
        &self.layout
    }

    /// The fill value.
    #[must_use]
    pub const fn fill_value(&self) -> Option<&FillValue> {
        self.fill_value.as_ref()
    }

    /// The fill time.
    #[must_use]
    pub const fn fill_time(&self) -> FillTime {
        self.fill_time
    }

    /// The filter pipeline.
    #[must_use]
    pub const fn filters(&self) -> &FilterPipeline {
        &self.filters
    }

    /// The external file segments.
    #[must_use]
    pub fn external_files(&self) -> &[ExternalFile] {
        &self.external_files
    }

    pub(crate) fn from_parts(
        layout: Layout,
        fill_value: Option<FillValue>,
        fill_time: FillTime,
        filters: FilterPipeline,
        external_files: Vec<ExternalFile>,
    ) -> Self {
        Self {
            layout,
            fill_value,
            fill_time,
            filters,
            external_files,
        }
    }
}
