//! Acquisition configuration.
//!
//! [`LocationConfig`] is an immutable value built once per request and shared
//! read-only (behind an `Arc`) by every component. It can be assembled in
//! code through [`LocationConfig::builder`] or loaded from an INI file through
//! [`ConfigFile`].
//!
//! # File Format
//!
//! ```ini
//! [location]
//! keep_tracking = false
//! update_interval_ms = 5000
//! acceptable_accuracy_m = 5.0
//!
//! [default]
//! enabled = true
//! gnss_wait_ms = 20000
//!
//! [vendor]
//! enabled = true
//! wait_ms = 20000
//! fallback_to_default = true
//! ```

mod defaults;
mod file;
mod parser;
mod settings;
mod writer;

pub use defaults::*;
pub use file::{config_directory, config_file_path, ConfigFile, ConfigFileError};
pub use settings::{
    ConfigError, DefaultBackendConfig, LocationConfig, LocationConfigBuilder, LoggingSettings,
    PermissionConfig, VendorBackendConfig,
};
pub use writer::to_config_string;
