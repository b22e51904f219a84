//! Configuration file handling for ~/.locus/config.ini.
//!
//! Loads and saves user configuration with sensible defaults.
//! Parsing lives in [`super::parser`], serialization in [`super::writer`].

use std::path::{Path, PathBuf};

use ini::Ini;
use thiserror::Error;

use super::settings::{ConfigError, LocationConfig, LoggingSettings};

/// Everything stored in the config file.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ConfigFile {
    /// Acquisition settings.
    pub location: LocationConfig,
    /// Diagnostic output settings.
    pub logging: LoggingSettings,
}

/// Configuration file errors.
#[derive(Debug, Error)]
pub enum ConfigFileError {
    /// Failed to read config file
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] ini::Error),

    /// Failed to write config file
    #[error("Failed to write config file: {0}")]
    WriteError(String),

    /// Invalid configuration value
    #[error("Invalid configuration: {section}.{key} = '{value}' - {reason}")]
    InvalidValue {
        section: String,
        key: String,
        value: String,
        reason: String,
    },

    /// Values parse but do not form a usable configuration
    #[error("Invalid configuration: {0}")]
    Invalid(#[from] ConfigError),

    /// Failed to create config directory
    #[error("Failed to create config directory: {0}")]
    DirectoryError(std::io::Error),
}

impl ConfigFile {
    /// Load configuration from the default path (~/.locus/config.ini).
    pub fn load() -> Result<Self, ConfigFileError> {
        let path = config_file_path();
        Self::load_from(&path)
    }

    /// Load configuration from a specific path.
    ///
    /// If the file doesn't exist, returns defaults.
    pub fn load_from(path: &Path) -> Result<Self, ConfigFileError> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "No config file, using defaults");
            return Ok(Self::default());
        }

        let ini = Ini::load_from_file(path)?;
        super::parser::parse_ini(&ini)
    }

    /// Save configuration to the default path.
    pub fn save(&self) -> Result<(), ConfigFileError> {
        let path = config_file_path();
        self.save_to(&path)
    }

    /// Save configuration to a specific path.
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigFileError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(ConfigFileError::DirectoryError)?;
        }

        let content = super::writer::to_config_string(self);
        std::fs::write(path, content).map_err(|e| ConfigFileError::WriteError(e.to_string()))
    }

    /// Create the default config file if it doesn't exist.
    ///
    /// Returns the path to the config file.
    pub fn ensure_exists() -> Result<PathBuf, ConfigFileError> {
        let path = config_file_path();
        if !path.exists() {
            Self::default().save_to(&path)?;
        }
        Ok(path)
    }
}

/// Get the path to the config directory (~/.locus).
pub fn config_directory() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".locus")
}

/// Get the path to the config file (~/.locus/config.ini).
pub fn config_file_path() -> PathBuf {
    config_directory().join("config.ini")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DefaultBackendConfig, PermissionConfig, VendorBackendConfig};
    use crate::platform::UpdatePriority;
    use std::time::Duration;
    use tempfile::TempDir;

    #[test]
    fn test_load_nonexistent_returns_defaults() {
        let dir = TempDir::new().unwrap();
        let config = ConfigFile::load_from(&dir.path().join("missing.ini")).unwrap();
        assert_eq!(config, ConfigFile::default());
    }

    #[test]
    fn test_save_creates_parent_directory() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.ini");
        ConfigFile::default().save_to(&path).unwrap();
        assert!(path.exists());
    }

    #[test]
    fn test_save_and_reload() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.ini");

        let location = LocationConfig::builder()
            .keep_tracking(true)
            .required_update_interval(Duration::from_millis(2500))
            .acceptable_accuracy(25.0)
            .permissions(
                PermissionConfig::new(["fine_location"]).with_rationale("Needed for maps"),
            )
            .use_default_backend(
                DefaultBackendConfig::default()
                    .with_gnss_wait(Duration::from_secs(8))
                    .with_ask_to_enable_gnss(false),
            )
            .use_vendor_backend(
                VendorBackendConfig::default()
                    .with_vendor_wait(Duration::from_secs(5))
                    .with_connection_suspension(false, 3)
                    .with_priority(UpdatePriority::BalancedPower),
            )
            .build()
            .unwrap();
        let config = ConfigFile {
            location,
            logging: LoggingSettings {
                enabled: false,
                level: "debug".to_string(),
                file: Some(dir.path().join("locus.log")),
            },
        };

        config.save_to(&path).unwrap();
        let loaded = ConfigFile::load_from(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_vendor_disabled_round_trips() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.ini");
        let config = ConfigFile::default();
        assert!(config.location.vendor_backend.is_none());

        config.save_to(&path).unwrap();
        let loaded = ConfigFile::load_from(&path).unwrap();
        assert!(loaded.location.vendor_backend.is_none());
        assert!(loaded.location.default_backend.is_some());
    }

    #[test]
    fn test_invalid_file_is_reported() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.ini");
        std::fs::write(&path, "[location]\nupdate_interval_ms = soon\n").unwrap();
        let err = ConfigFile::load_from(&path).unwrap_err();
        assert!(err.to_string().contains("location.update_interval_ms"));
    }

    #[test]
    fn test_config_file_path_location() {
        let path = config_file_path();
        assert!(path.ends_with(".locus/config.ini"));
    }
}
