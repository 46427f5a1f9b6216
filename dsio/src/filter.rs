//! Filters and filter pipelines.
//!
//! A filter is a reversible bytes to bytes transform applied to each chunk of a chunked dataset, such as compression or a checksum.
//! Filters are looked up by [`FilterId`] in a [`FilterRegistry`].
//!
//! Builtin filters:
//!
//! | id      | name         | feature   | client data             |
//! |---------|--------------|-----------|-------------------------|
//! | `1`     | `deflate`    | `deflate` | `[level]` (optional)    |
//! | `2`     | `shuffle`    |           |                         |
//! | `3`     | `fletcher32` |           |                         |
//! | `32015` | `zstd`       | `zstd`    | `[level]` (optional)    |
//!
//! A [`FilterPipeline`] encodes a chunk by applying its filters in order.
//! The stored chunk is a 4 byte little-endian filter mask followed by the encoded payload.
//! Bit `i` of the mask is set if filter `i` was skipped, which only happens for optional filters.

#[cfg(feature = "deflate")]
mod deflate;
mod fletcher32;
mod shuffle;
#[cfg(feature = "zstd")]
mod zstd;

use std::{collections::HashMap, fmt::Debug, sync::Arc};

#[cfg(feature = "deflate")]
pub use deflate::DeflateFilter;
pub use fletcher32::{fletcher32, Fletcher32Filter};
use serde::{Deserialize, Serialize};
pub use shuffle::ShuffleFilter;
use thiserror::Error;
#[cfg(feature = "zstd")]
pub use self::zstd::ZstdFilter;

/// A filter identifier.
pub type FilterId = u32;

/// The `deflate` filter identifier.
pub const FILTER_DEFLATE: FilterId = 1;
/// The `shuffle` filter identifier.
pub const FILTER_SHUFFLE: FilterId = 2;
/// The `fletcher32` filter identifier.
pub const FILTER_FLETCHER32: FilterId = 3;
/// The `zstd` filter identifier.
pub const FILTER_ZSTD: FilterId = 32015;

/// The maximum number of filters in a [`FilterPipeline`].
pub const MAX_FILTERS: usize = 32;

const FILTER_MASK_SIZE: usize = size_of::<u32>();

/// A filter error.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum FilterError {
    /// The filter is not registered.
    #[error("filter {_0} is not registered")]
    UnknownFilter(FilterId),
    /// The pipeline has too many filters.
    #[error("filter pipeline has {_0} filters, the maximum is {MAX_FILTERS}")]
    TooManyFilters(usize),
    /// A checksum did not match.
    #[error("checksum mismatch: stored {stored:#010x}, computed {computed:#010x}")]
    ChecksumMismatch {
        /// The stored checksum.
        stored: u32,
        /// The computed checksum.
        computed: u32,
    },
    /// The encoded bytes are too short.
    #[error("encoded bytes are truncated: {_0} bytes")]
    Truncated(usize),
    /// An IO error.
    #[error(transparent)]
    IOError(#[from] std::io::Error),
    /// Any other error.
    #[error("{_0}")]
    Other(String),
}

impl From<&str> for FilterError {
    fn from(err: &str) -> Self {
        Self::Other(err.to_string())
    }
}

impl From<String> for FilterError {
    fn from(err: String) -> Self {
        Self::Other(err)
    }
}

/// Filter traits.
pub trait FilterTraits: Send + Sync + Debug {
    /// The filter identifier.
    fn id(&self) -> FilterId;

    /// The filter name.
    fn name(&self) -> &'static str;

    /// Encode `bytes`.
    ///
    /// `client_data` are the pipeline entry parameters and `element_size` is the size of the dataset element type.
    ///
    /// # Errors
    /// Returns a [`FilterError`] if encoding fails.
    fn encode(
        &self,
        bytes: Vec<u8>,
        client_data: &[u32],
        element_size: usize,
    ) -> Result<Vec<u8>, FilterError>;

    /// Decode `bytes`.
    ///
    /// # Errors
    /// Returns a [`FilterError`] if decoding fails or the encoded bytes are invalid.
    fn decode(
        &self,
        bytes: Vec<u8>,
        client_data: &[u32],
        element_size: usize,
    ) -> Result<Vec<u8>, FilterError>;
}

/// A map from [`FilterId`] to filter.
#[derive(Debug, Default, Clone)]
pub struct FilterRegistry {
    filters: HashMap<FilterId, Arc<dyn FilterTraits>>,
}

impl FilterRegistry {
    /// Create an empty filter registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a filter registry with the builtin filters.
    #[must_use]
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        #[cfg(feature = "deflate")]
        registry.register(Arc::new(DeflateFilter));
        registry.register(Arc::new(ShuffleFilter));
        registry.register(Arc::new(Fletcher32Filter));
        #[cfg(feature = "zstd")]
        registry.register(Arc::new(ZstdFilter));
        registry
    }

    /// Register a filter, returning the filter previously registered with the same identifier.
    pub fn register(&mut self, filter: Arc<dyn FilterTraits>) -> Option<Arc<dyn FilterTraits>> {
        self.filters.insert(filter.id(), filter)
    }

    /// Unregister the filter with identifier `id`.
    pub fn unregister(&mut self, id: FilterId) -> Option<Arc<dyn FilterTraits>> {
        self.filters.remove(&id)
    }

    /// Get the filter with identifier `id`.
    #[must_use]
    pub fn get(&self, id: FilterId) -> Option<Arc<dyn FilterTraits>> {
        self.filters.get(&id).cloned()
    }

    /// Returns true if a filter with identifier `id` is registered.
    #[must_use]
    pub fn contains(&self, id: FilterId) -> bool {
        self.filters.contains_key(&id)
    }

    /// The number of registered filters.
    #[must_use]
    pub fn len(&self) -> usize {
        self.filters.len()
    }

    /// Returns true if no filters are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    /// Returns an iterator over the registered filters.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn FilterTraits>> {
        self.filters.values()
    }

    /// Unregister all filters.
    pub fn clear(&mut self) {
        self.filters.clear();
    }
}

/// A [`FilterPipeline`] entry.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FilterPipelineEntry {
    /// The filter identifier.
    pub id: FilterId,
    /// If true, a failure of the filter skips it instead of failing the pipeline.
    #[serde(default)]
    pub optional: bool,
    /// Filter parameters.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub client_data: Vec<u32>,
}

/// An ordered sequence of filters.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FilterPipeline(Vec<FilterPipelineEntry>);

impl FilterPipeline {
    /// Create an empty filter pipeline.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a required filter.
    #[must_use]
    pub fn with_filter(mut self, id: FilterId, client_data: Vec<u32>) -> Self {
        self.0.push(FilterPipelineEntry {
            id,
            optional: false,
            client_data,
        });
        self
    }

    /// Append an optional filter.
    #[must_use]
    pub fn with_optional_filter(mut self, id: FilterId, client_data: Vec<u32>) -> Self {
        self.0.push(FilterPipelineEntry {
            id,
            optional: true,
            client_data,
        });
        self
    }

    /// The pipeline entries.
    #[must_use]
    pub fn entries(&self) -> &[FilterPipelineEntry] {
        &self.0
    }

    /// Returns true if the pipeline has no filters.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Validate the pipeline against `registry`.
    ///
    /// Unregistered optional filters are permitted.
    ///
    /// # Errors
    /// Returns [`FilterError`] if there are too many filters or a required filter is not registered.
    pub fn validate(&self, registry: &FilterRegistry) -> Result<(), FilterError> {
        if self.0.len() > MAX_FILTERS {
            return Err(FilterError::TooManyFilters(self.0.len()));
        }
        match self
            .0
            .iter()
            .find(|entry| !entry.optional && !registry.contains(entry.id))
        {
            Some(entry) => Err(FilterError::UnknownFilter(entry.id)),
            None => Ok(()),
        }
    }

    /// Encode `bytes` into a stored chunk value.
    ///
    /// # Errors
    /// Returns [`FilterError`] if a required filter is not registered or fails.
    pub fn encode(
        &self,
        registry: &FilterRegistry,
        bytes: Vec<u8>,
        element_size: usize,
    ) -> Result<Vec<u8>, FilterError> {
        let mut mask = 0u32;
        let mut bytes = bytes;
        for (i, entry) in self.0.iter().enumerate() {
            let filter = registry.get(entry.id);
            if entry.optional {
                let encoded = filter
                    .ok_or(FilterError::UnknownFilter(entry.id))
                    .and_then(|filter| filter.encode(bytes.clone(), &entry.client_data, element_size));
                match encoded {
                    Ok(encoded) => bytes = encoded,
                    Err(err) => {
                        log::warn!("skipping optional filter {}: {err}", entry.id);
                        mask |= 1 << i;
                    }
                }
            } else {
                let filter = filter.ok_or(FilterError::UnknownFilter(entry.id))?;
                bytes = filter.encode(bytes, &entry.client_data, element_size)?;
            }
        }
        let mut stored = Vec::with_capacity(FILTER_MASK_SIZE + bytes.len());
        stored.extend_from_slice(&mask.to_le_bytes());
        stored.extend_from_slice(&bytes);
        Ok(stored)
    }

    /// Decode a stored chunk value.
    ///
    /// Filters are applied in reverse order, skipping those set in the filter mask.
    ///
    /// # Errors
    /// Returns [`FilterError`] if the stored value is truncated, a filter is not registered, or a filter fails.
    pub fn decode(
        &self,
        registry: &FilterRegistry,
        stored: &[u8],
        element_size: usize,
    ) -> Result<Vec<u8>, FilterError> {
        let (mask, payload) = stored
            .split_first_chunk::<FILTER_MASK_SIZE>()
            .ok_or(FilterError::Truncated(stored.len()))?;
        let mask = u32::from_le_bytes(*mask);
        let mut bytes = payload.to_vec();
        for (i, entry) in self.0.iter().enumerate().rev() {
            if mask & (1 << i) != 0 {
                continue;
            }
            let filter = registry
                .get(entry.id)
                .ok_or(FilterError::UnknownFilter(entry.id))?;
            bytes = filter.decode(bytes, &entry.client_data, element_size)?;
        }
        Ok(bytes)
    }
}

impl From<Vec<FilterPipelineEntry>> for FilterPipeline {
    fn from(entries: Vec<FilterPipelineEntry>) -> Self {
        Self(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct FailingFilter;

    impl FilterTraits for FailingFilter {
        fn id(&self) -> FilterId {
            300
        }

        fn name(&self) -> &'static str {
            "failing"
        }

        fn encode(&self, _: Vec<u8>, _: &[u32], _: usize) -> Result<Vec<u8>, FilterError> {
            Err("always fails".into())
        }

        fn decode(&self, bytes: Vec<u8>, _: &[u32], _: usize) -> Result<Vec<u8>, FilterError> {
            Ok(bytes)
        }
    }

    fn bytes() -> Vec<u8> {
        (0..400u32).flat_map(|i| (i % 7).to_le_bytes()).collect()
    }

    #[test]
    fn filter_pipeline_empty() {
        let registry = FilterRegistry::builtin();
        let pipeline = FilterPipeline::new();
        let stored = pipeline.encode(&registry, vec![1, 2, 3], 1).unwrap();
        assert_eq!(stored, [0, 0, 0, 0, 1, 2, 3]);
        assert_eq!(pipeline.decode(&registry, &stored, 1).unwrap(), [1, 2, 3]);
    }

    #[test]
    fn filter_pipeline_shuffle_fletcher32() {
        let registry = FilterRegistry::builtin();
        let pipeline = FilterPipeline::new()
            .with_filter(FILTER_SHUFFLE, vec![])
            .with_filter(FILTER_FLETCHER32, vec![]);
        let stored = pipeline.encode(&registry, bytes(), 4).unwrap();
        assert_eq!(stored.len(), 4 + 1600 + 4);
        assert_eq!(pipeline.decode(&registry, &stored, 4).unwrap(), bytes());
    }

    #[cfg(feature = "deflate")]
    #[test]
    fn filter_pipeline_deflate() {
        let registry = FilterRegistry::builtin();
        let pipeline = FilterPipeline::new()
            .with_filter(FILTER_SHUFFLE, vec![])
            .with_filter(FILTER_DEFLATE, vec![9]);
        let stored = pipeline.encode(&registry, bytes(), 4).unwrap();
        assert!(stored.len() < 1600);
        assert_eq!(pipeline.decode(&registry, &stored, 4).unwrap(), bytes());
    }

    #[test]
    fn filter_pipeline_optional_failure_masked() {
        let mut registry = FilterRegistry::builtin();
        registry.register(Arc::new(FailingFilter));
        let pipeline = FilterPipeline::new()
            .with_filter(FILTER_SHUFFLE, vec![])
            .with_optional_filter(300, vec![])
            .with_optional_filter(301, vec![]);
        pipeline.validate(&registry).unwrap();
        let stored = pipeline.encode(&registry, bytes(), 4).unwrap();
        assert_eq!(stored[..4], 0b110u32.to_le_bytes());
        assert_eq!(pipeline.decode(&registry, &stored, 4).unwrap(), bytes());
    }

    #[test]
    fn filter_pipeline_required_failure() {
        let mut registry = FilterRegistry::builtin();
        registry.register(Arc::new(FailingFilter));
        let pipeline = FilterPipeline::new().with_filter(300, vec![]);
        assert!(pipeline.encode(&registry, bytes(), 4).is_err());

        let pipeline = FilterPipeline::new().with_filter(301, vec![]);
        assert!(matches!(
            pipeline.validate(&registry),
            Err(FilterError::UnknownFilter(301))
        ));
    }

    #[test]
    fn filter_pipeline_truncated() {
        let registry = FilterRegistry::builtin();
        assert!(matches!(
            FilterPipeline::new().decode(&registry, &[0, 0], 1),
            Err(FilterError::Truncated(2))
        ));
    }

    #[test]
    fn filter_pipeline_too_many() {
        let registry = FilterRegistry::builtin();
        let pipeline = FilterPipeline::from(vec![
            FilterPipelineEntry {
                id: FILTER_SHUFFLE,
                optional: false,
                client_data: vec![],
            };
            MAX_FILTERS + 1
        ]);
        assert!(pipeline.validate(&registry).is_err());
    }

    #[test]
    fn filter_registry() {
        let mut registry = FilterRegistry::builtin();
        assert!(registry.contains(FILTER_SHUFFLE));
        assert_eq!(registry.get(FILTER_FLETCHER32).unwrap().name(), "fletcher32");
        assert!(registry.unregister(FILTER_SHUFFLE).is_some());
        assert!(registry.get(FILTER_SHUFFLE).is_none());
        registry.clear();
        assert!(registry.is_empty());
    }
}
