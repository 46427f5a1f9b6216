//! The process level registry of filters.
//!
//! A [`Registry`] starts empty.
//! [`Registry::init`] registers the builtin filters and [`Registry::shutdown`] unregisters every filter, and both are idempotent.
//! A registry is shared between containers as an [`Arc<Registry>`](std::sync::Arc).

use std::sync::Arc;

use parking_lot::{RwLock, RwLockReadGuard};

use crate::filter::{FilterId, FilterRegistry, FilterTraits};

#[derive(Debug, Default)]
struct RegistryState {
    initialized: bool,
    filters: FilterRegistry,
}

/// A filter registry with explicit initialisation and shutdown.
#[derive(Debug, Default)]
pub struct Registry {
    state: RwLock<RegistryState>,
}

impl Registry {
    /// Create a new uninitialised registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new initialised registry.
    #[must_use]
    pub fn new_initialized() -> Self {
        let registry = Self::new();
        registry.init();
        registry
    }

    /// Register the builtin filters.
    ///
    /// Does nothing if the registry is already initialised.
    /// Filters registered with [`Registry::register_filter`] before initialisation are retained.
    pub fn init(&self) {
        let mut state = self.state.write();
        if state.initialized {
            return;
        }
        for filter in FilterRegistry::builtin().iter() {
            if !state.filters.contains(filter.id()) {
                state.filters.register(filter.clone());
            }
        }
        state.initialized = true;
        log::debug!("registry initialised with {} filters", state.filters.len());
    }

    /// Unregister every filter.
    ///
    /// Does nothing if the registry is not initialised.
    pub fn shutdown(&self) {
        let mut state = self.state.write();
        if !state.initialized {
            return;
        }
        state.filters.clear();
        state.initialized = false;
        log::debug!("registry shut down");
    }

    /// Returns true if the registry is initialised.
    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.state.read().initialized
    }

    /// Get the filter with identifier `id`.
    #[must_use]
    pub fn filter(&self, id: FilterId) -> Option<Arc<dyn FilterTraits>> {
        self.state.read().filters.get(id)
    }

    /// Register a filter, returning the filter previously registered with the same identifier.
    pub fn register_filter(&self, filter: Arc<dyn FilterTraits>) -> Option<Arc<dyn FilterTraits>> {
        self.state.write().filters.register(filter)
    }

    /// Unregister the filter with identifier `id`.
    pub fn unregister_filter(&self, id: FilterId) -> Option<Arc<dyn FilterTraits>> {
        self.state.write().filters.unregister(id)
    }

    /// Lock the registry for reading and return its filters.
    pub fn filters(&self) -> impl std::ops::Deref<Target = FilterRegistry> + '_ {
        RwLockReadGuard::map(self.state.read(), |state| &state.filters)
    }
}
