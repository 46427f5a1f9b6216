//! Containers.
//!
//! A [`Container`] is a storage handle with an access intent, an access backend, and a filter [`Registry`].
//! Datasets are created and opened within a container.

use std::{
    fmt::Debug,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

use dsio_storage::ReadableWritableListableStorage;
use parking_lot::Mutex;

use crate::{
    dataset::{Dataset, DatasetCreationParams, DatasetError, TransferMode},
    element_type::ElementType,
    registry::Registry,
    selection::Extent,
};

/// The access intent of a [`Container`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum AccessIntent {
    /// Datasets can be read but not created or written.
    ReadOnly,
    /// Datasets can be created, read, and written.
    #[default]
    ReadWrite,
}

/// The driver of a collective backend.
///
/// Holds the process rank and size and the effective transfer mode shared by every dataset of a container.
#[derive(Debug)]
pub struct CollectiveDriver {
    rank: u32,
    size: u32,
    mode: Mutex<TransferMode>,
    collective_operations: AtomicU64,
    independent_operations: AtomicU64,
}

impl CollectiveDriver {
    /// Create a new collective driver for process `rank` of `size` processes.
    ///
    /// The effective transfer mode is initially [`TransferMode::Collective`].
    ///
    /// # Errors
    /// Returns [`DatasetError::InvalidArgument`] if `size` is zero or `rank` is not less than `size`.
    pub fn new(rank: u32, size: u32) -> Result<Self, DatasetError> {
        if rank >= size {
            return Err(DatasetError::InvalidArgument(format!(
                "rank {rank} is not less than the number of processes {size}"
            )));
        }
        Ok(Self {
            rank,
            size,
            mode: Mutex::new(TransferMode::Collective),
            collective_operations: AtomicU64::new(0),
            independent_operations: AtomicU64::new(0),
        })
    }

    /// The process rank.
    #[must_use]
    pub const fn rank(&self) -> u32 {
        self.rank
    }

    /// The number of processes.
    #[must_use]
    pub const fn size(&self) -> u32 {
        self.size
    }

    /// The effective transfer mode.
    #[must_use]
    pub fn mode(&self) -> TransferMode {
        *self.mode.lock()
    }

    /// The number of transfers performed in collective mode.
    #[must_use]
    pub fn collective_operations(&self) -> u64 {
        self.collective_operations.load(Ordering::Relaxed)
    }

    /// The number of transfers performed in independent mode.
    #[must_use]
    pub fn independent_operations(&self) -> u64 {
        self.independent_operations.load(Ordering::Relaxed)
    }

    /// Record a transfer performed in the effective transfer mode.
    pub(crate) fn record_operation(&self) {
        match self.mode() {
            TransferMode::Collective => &self.collective_operations,
            TransferMode::Independent => &self.independent_operations,
        }
        .fetch_add(1, Ordering::Relaxed);
    }

    fn replace_mode(&self, mode: TransferMode) -> TransferMode {
        std::mem::replace(&mut *self.mode.lock(), mode)
    }
}

/// Overrides the effective transfer mode of a [`CollectiveDriver`] until dropped.
#[must_use]
pub struct TransferModeOverride<'a> {
    driver: &'a CollectiveDriver,
    previous: TransferMode,
}

impl<'a> TransferModeOverride<'a> {
    /// Set the effective transfer mode of `driver` to `mode`, restoring the previous mode when dropped.
    pub fn new(driver: &'a CollectiveDriver, mode: TransferMode) -> Self {
        let previous = driver.replace_mode(mode);
        log::debug!("transfer mode overridden from {previous:?} to {mode:?}");
        Self { driver, previous }
    }
}

impl Drop for TransferModeOverride<'_> {
    fn drop(&mut self) {
        self.driver.replace_mode(self.previous);
        log::debug!("transfer mode restored to {:?}", self.previous);
    }
}

/// The storage access backend of a [`Container`].
#[derive(Clone, Debug, Default)]
pub enum Backend {
    /// A single process.
    #[default]
    Serial,
    /// Multiple processes accessing storage collectively.
    Collective(Arc<CollectiveDriver>),
}

impl Backend {
    /// Returns the collective driver of a collective backend.
    #[must_use]
    pub fn collective_driver(&self) -> Option<&Arc<CollectiveDriver>> {
        match self {
            Self::Serial => None,
            Self::Collective(driver) => Some(driver),
        }
    }
}

/// A container of datasets.
#[derive(Clone)]
pub struct Container {
    storage: ReadableWritableListableStorage,
    intent: AccessIntent,
    backend: Backend,
    registry: Arc<Registry>,
}

impl Debug for Container {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Container")
            .field("intent", &self.intent)
            .field("backend", &self.backend)
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}

impl Container {
    /// Create a read-write container with a serial backend.
    #[must_use]
    pub fn new(storage: ReadableWritableListableStorage, registry: Arc<Registry>) -> Self {
        Self {
            storage,
            intent: AccessIntent::ReadWrite,
            backend: Backend::Serial,
            registry,
        }
    }

    /// Set the access intent.
    #[must_use]
    pub fn with_intent(mut self, intent: AccessIntent) -> Self {
        self.intent = intent;
        self
    }

    /// Set the access backend.
    #[must_use]
    pub fn with_backend(mut self, backend: Backend) -> Self {
        self.backend = backend;
        self
    }

    /// The underlying storage.
    #[must_use]
    pub fn storage(&self) -> &ReadableWritableListableStorage {
        &self.storage
    }

    /// The access intent.
    #[must_use]
    pub const fn intent(&self) -> AccessIntent {
        self.intent
    }

    /// Returns true if the container has write intent.
    #[must_use]
    pub fn is_writable(&self) -> bool {
        self.intent == AccessIntent::ReadWrite
    }

    /// The access backend.
    #[must_use]
    pub const fn backend(&self) -> &Backend {
        &self.backend
    }

    /// The filter registry.
    #[must_use]
    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Create a dataset at `name`.
    ///
    /// # Errors
    /// See [`Dataset::create`].
    pub fn create_dataset(
        &self,
        name: &str,
        element_type: ElementType,
        extent: Extent,
        params: DatasetCreationParams,
    ) -> Result<Dataset, DatasetError> {
        Dataset::create(self, name, element_type, extent, params)
    }

    /// Open the dataset at `name`.
    ///
    /// # Errors
    /// See [`Dataset::open`].
    pub fn open_dataset(&self, name: &str) -> Result<Dataset, DatasetError> {
        Dataset::open(self, name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collective_driver_override() {
        let driver = CollectiveDriver::new(1, 4).unwrap();
        assert_eq!(driver.mode(), TransferMode::Collective);
        driver.record_operation();
        {
            let _guard = TransferModeOverride::new(&driver, TransferMode::Independent);
            assert_eq!(driver.mode(), TransferMode::Independent);
            driver.record_operation();
            driver.record_operation();
        }
        assert_eq!(driver.mode(), TransferMode::Collective);
        assert_eq!(driver.collective_operations(), 1);
        assert_eq!(driver.independent_operations(), 2);
        assert!(CollectiveDriver::new(4, 4).is_err());
    }

    #[test]
    fn collective_driver_override_restored_on_error() {
        fn fails(driver: &CollectiveDriver) -> Result<(), DatasetError> {
            let _guard = TransferModeOverride::new(driver, TransferMode::Independent);
            Err(DatasetError::WriteDenied)
        }
        let driver = CollectiveDriver::new(0, 2).unwrap();
        assert!(fails(&driver).is_err());
        assert_eq!(driver.mode(), TransferMode::Collective);
    }
}
