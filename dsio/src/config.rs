//! `dsio` global configuration options.

use std::sync::{OnceLock, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Global configuration options for the `dsio` crate.
///
/// Retrieve the global [`Config`] with [`global_config`] and modify it with [`global_config_mut`].
///
/// ## Transfer Buffer Size
/// > default: `1048576` (1 MiB)
///
/// The default strip buffer size in bytes of a [`TransferConfig`](crate::dataset::TransferConfig).
/// A transfer processes at most `transfer_buffer_size / max(source element size, destination element size)` elements per strip.
///
/// ## Validate Checksums
/// > default: [`true`]
///
/// If enabled, the `fletcher32` filter validates that decoded chunks match their stored checksums, otherwise validation is skipped.
///
/// ## Metadata Pretty
/// > default: [`false`]
///
/// If enabled, dataset metadata records are written as indented JSON.
///
/// ## Deflate Level
/// > default: `6`
///
/// The compression level of the `deflate` filter when a pipeline entry does not carry a level in its client data.
#[derive(Debug)]
pub struct Config {
    transfer_buffer_size: usize,
    validate_checksums: bool,
    metadata_pretty: bool,
    deflate_level: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            transfer_buffer_size: 1024 * 1024,
            validate_checksums: true,
            metadata_pretty: false,
            deflate_level: 6,
        }
    }
}

impl Config {
    /// Get the [transfer buffer size](#transfer-buffer-size) configuration.
    #[must_use]
    pub fn transfer_buffer_size(&self) -> usize {
        self.transfer_buffer_size
    }

    /// Set the [transfer buffer size](#transfer-buffer-size) configuration.
    pub fn set_transfer_buffer_size(&mut self, transfer_buffer_size: usize) -> &mut Self {
        self.transfer_buffer_size = transfer_buffer_size;
        self
    }

    /// Get the [validate checksums](#validate-checksums) configuration.
    #[must_use]
    pub fn validate_checksums(&self) -> bool {
        self.validate_checksums
    }

    /// Set the [validate checksums](#validate-checksums) configuration.
    pub fn set_validate_checksums(&mut self, validate_checksums: bool) -> &mut Self {
        self.validate_checksums = validate_checksums;
        self
    }

    /// Get the [metadata pretty](#metadata-pretty) configuration.
    #[must_use]
    pub fn metadata_pretty(&self) -> bool {
        self.metadata_pretty
    }

    /// Set the [metadata pretty](#metadata-pretty) configuration.
    pub fn set_metadata_pretty(&mut self, metadata_pretty: bool) -> &mut Self {
        self.metadata_pretty = metadata_pretty;
        self
    }

    /// Get the [deflate level](#deflate-level) configuration.
    #[must_use]
    pub fn deflate_level(&self) -> u32 {
        self.deflate_level
    }

    /// Set the [deflate level](#deflate-level) configuration.
    ///
    /// Levels above 9 are clamped to 9.
    pub fn set_deflate_level(&mut self, deflate_level: u32) -> &mut Self {
        self.deflate_level = deflate_level.min(9);
        self
    }
}

static CONFIG: OnceLock<RwLock<Config>> = OnceLock::new();

/// Returns a reference to the global `dsio` configuration.
///
/// # Panics
/// This function panics if the underlying lock has been poisoned and might panic if the global config is already held by the current thread.
pub fn global_config() -> RwLockReadGuard<'static, Config> {
    CONFIG
        .get_or_init(|| RwLock::new(Config::default()))
        .read()
        .unwrap()
}

/// Returns a mutable reference to the global `dsio` configuration.
///
/// # Panics
/// This function panics if the underlying lock has been poisoned and might panic if the global config is already held by the current thread.
pub fn global_config_mut() -> RwLockWriteGuard<'static, Config> {
    CONFIG
        .get_or_init(|| RwLock::new(Config::default()))
        .write()
        .unwrap()
}
