//! Configuration value objects and validation.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use super::defaults::*;
use crate::event::SourceKind;
use crate::fix::FixAcceptance;
use crate::platform::{DialogContent, UpdatePriority, UpdateRequest};

/// Configuration validation errors.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    /// Neither backend is configured.
    #[error("at least one of the default or vendor backends must be configured")]
    NoBackend,

    /// No permission identifiers are required.
    #[error("at least one required permission must be configured")]
    NoPermissions,

    /// A numeric value is out of range.
    #[error("invalid value for {field}: {reason}")]
    InvalidValue {
        /// Offending field.
        field: &'static str,
        /// Why it was rejected.
        reason: String,
    },
}

/// Permissions that must be granted before any backend starts.
#[derive(Debug, Clone, PartialEq)]
pub struct PermissionConfig {
    /// Permission identifiers, all of which must be granted.
    pub required: Vec<String>,
    /// Explanation shown before the OS request when the platform recommends it.
    pub rationale: Option<DialogContent>,
}

impl Default for PermissionConfig {
    fn default() -> Self {
        Self {
            required: DEFAULT_REQUIRED_PERMISSIONS
                .iter()
                .map(|p| p.to_string())
                .collect(),
            rationale: None,
        }
    }
}

impl PermissionConfig {
    /// Require exactly `permissions`.
    pub fn new<I, S>(permissions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            required: permissions.into_iter().map(Into::into).collect(),
            rationale: None,
        }
    }

    /// Show a rationale with `message` before requesting.
    pub fn with_rationale(mut self, message: impl Into<String>) -> Self {
        self.rationale = Some(DialogContent::new(DEFAULT_RATIONALE_TITLE, message));
        self
    }
}

/// Configuration of the GNSS ↔ network backend.
#[derive(Debug, Clone, PartialEq)]
pub struct DefaultBackendConfig {
    /// How long GNSS gets before falling back to network.
    pub gnss_wait: Duration,
    /// How long network gets before timing out.
    pub network_wait: Duration,
    /// Offer to open GNSS settings when GNSS is off.
    pub ask_to_enable_gnss: bool,
    /// Content of the enable dialog.
    pub enable_gnss_dialog: DialogContent,
}

impl Default for DefaultBackendConfig {
    fn default() -> Self {
        Self {
            gnss_wait: DEFAULT_WAIT_PERIOD,
            network_wait: DEFAULT_WAIT_PERIOD,
            ask_to_enable_gnss: true,
            enable_gnss_dialog: DialogContent::new(
                DEFAULT_ENABLE_GNSS_TITLE,
                DEFAULT_ENABLE_GNSS_MESSAGE,
            ),
        }
    }
}

impl DefaultBackendConfig {
    /// Wait period for `source`.
    pub fn wait_for(&self, source: SourceKind) -> Duration {
        match source {
            SourceKind::Gnss => self.gnss_wait,
            SourceKind::Network => self.network_wait,
        }
    }

    /// Set the GNSS wait period.
    pub fn with_gnss_wait(mut self, wait: Duration) -> Self {
        self.gnss_wait = wait;
        self
    }

    /// Set the network wait period.
    pub fn with_network_wait(mut self, wait: Duration) -> Self {
        self.network_wait = wait;
        self
    }

    /// Whether to offer enabling GNSS.
    pub fn with_ask_to_enable_gnss(mut self, ask: bool) -> Self {
        self.ask_to_enable_gnss = ask;
        self
    }

    /// Replace the enable dialog message.
    pub fn with_enable_gnss_message(mut self, message: impl Into<String>) -> Self {
        self.enable_gnss_dialog.message = message.into();
        self
    }
}

/// Configuration of the vendor fused-service backend.
#[derive(Debug, Clone, PartialEq)]
pub struct VendorBackendConfig {
    /// Backstop after which the dispatcher abandons the vendor backend.
    pub vendor_wait: Duration,
    /// Offer a device-level resolution when the service is unavailable.
    pub ask_to_resolve_vendor_service: bool,
    /// Run a settings check before requesting updates.
    pub ask_to_change_settings: bool,
    /// Treat any connection suspension as a failure.
    pub fail_on_connection_suspended: bool,
    /// Reconnect attempts allowed after suspension.
    pub suspended_connection_retry_limit: u32,
    /// Fail instead of requesting updates anyway when settings cannot be fixed.
    pub fail_on_settings_resolution_failure: bool,
    /// Route terminal failures to the default backend.
    pub fallback_to_default_on_vendor_failure: bool,
    /// Skip the cached last-known fix.
    pub ignore_last_known_fix: bool,
    /// Priority of live-update requests.
    pub priority: UpdatePriority,
}

impl Default for VendorBackendConfig {
    fn default() -> Self {
        Self {
            vendor_wait: DEFAULT_WAIT_PERIOD,
            ask_to_resolve_vendor_service: false,
            ask_to_change_settings: true,
            fail_on_connection_suspended: true,
            suspended_connection_retry_limit: DEFAULT_SUSPENDED_CONNECTION_RETRY_LIMIT,
            fail_on_settings_resolution_failure: false,
            fallback_to_default_on_vendor_failure: true,
            ignore_last_known_fix: false,
            priority: UpdatePriority::HighAccuracy,
        }
    }
}

impl VendorBackendConfig {
    /// Set the vendor-wide wait period.
    pub fn with_vendor_wait(mut self, wait: Duration) -> Self {
        self.vendor_wait = wait;
        self
    }

    /// Whether to offer resolving an unavailable service.
    pub fn with_ask_to_resolve_vendor_service(mut self, ask: bool) -> Self {
        self.ask_to_resolve_vendor_service = ask;
        self
    }

    /// Whether to run the settings check.
    pub fn with_ask_to_change_settings(mut self, ask: bool) -> Self {
        self.ask_to_change_settings = ask;
        self
    }

    /// Suspension handling: fail immediately, or retry up to `retry_limit` times.
    pub fn with_connection_suspension(mut self, fail: bool, retry_limit: u32) -> Self {
        self.fail_on_connection_suspended = fail;
        self.suspended_connection_retry_limit = retry_limit;
        self
    }

    /// Whether settings resolution failures are terminal.
    pub fn with_fail_on_settings_resolution_failure(mut self, fail: bool) -> Self {
        self.fail_on_settings_resolution_failure = fail;
        self
    }

    /// Whether terminal failures fall back to the default backend.
    pub fn with_fallback_to_default(mut self, fallback: bool) -> Self {
        self.fallback_to_default_on_vendor_failure = fallback;
        self
    }

    /// Whether to skip the cached last-known fix.
    pub fn with_ignore_last_known_fix(mut self, ignore: bool) -> Self {
        self.ignore_last_known_fix = ignore;
        self
    }

    /// Set the update priority.
    pub fn with_priority(mut self, priority: UpdatePriority) -> Self {
        self.priority = priority;
        self
    }
}

/// Complete acquisition configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct LocationConfig {
    /// Keep delivering fixes after the first one.
    pub keep_tracking: bool,
    /// Interval of continuous updates.
    pub required_update_interval: Duration,
    /// Minimum displacement (meters) of continuous updates.
    pub required_update_distance: f32,
    /// Usability thresholds for cached fixes.
    pub acceptance: FixAcceptance,
    /// Permissions gating every backend.
    pub permissions: PermissionConfig,
    /// GNSS ↔ network backend, if used.
    pub default_backend: Option<DefaultBackendConfig>,
    /// Vendor fused-service backend, if used.
    pub vendor_backend: Option<VendorBackendConfig>,
}

impl Default for LocationConfig {
    fn default() -> Self {
        Self {
            keep_tracking: false,
            required_update_interval: DEFAULT_UPDATE_INTERVAL,
            required_update_distance: DEFAULT_UPDATE_DISTANCE_M,
            acceptance: FixAcceptance::default(),
            permissions: PermissionConfig::default(),
            default_backend: Some(DefaultBackendConfig::default()),
            vendor_backend: None,
        }
    }
}

impl LocationConfig {
    /// Start building a configuration with no backend selected.
    pub fn builder() -> LocationConfigBuilder {
        LocationConfigBuilder::new()
    }

    /// Check the invariants every consumer relies on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.default_backend.is_none() && self.vendor_backend.is_none() {
            return Err(ConfigError::NoBackend);
        }
        if self.permissions.required.is_empty() {
            return Err(ConfigError::NoPermissions);
        }
        check_non_negative("required_update_distance", self.required_update_distance)?;
        check_non_negative("acceptable_accuracy", self.acceptance.max_accuracy)?;
        Ok(())
    }

    /// Request used for continuous tracking with `priority`.
    pub fn continuous_request(&self, priority: UpdatePriority) -> UpdateRequest {
        UpdateRequest {
            interval: self.required_update_interval,
            distance: self.required_update_distance,
            priority,
        }
    }
}

fn check_non_negative(field: &'static str, value: f32) -> Result<(), ConfigError> {
    if !value.is_finite() || value < 0.0 {
        return Err(ConfigError::InvalidValue {
            field,
            reason: format!("must be a finite non-negative number, got {}", value),
        });
    }
    Ok(())
}

/// Builder for [`LocationConfig`].
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use locus::config::{DefaultBackendConfig, LocationConfig};
///
/// let config = LocationConfig::builder()
///     .keep_tracking(true)
///     .acceptable_accuracy(20.0)
///     .use_default_backend(DefaultBackendConfig::default().with_gnss_wait(Duration::from_secs(10)))
///     .build()
///     .unwrap();
/// assert!(config.keep_tracking);
/// ```
#[derive(Debug, Clone)]
pub struct LocationConfigBuilder {
    config: LocationConfig,
}

impl LocationConfigBuilder {
    fn new() -> Self {
        Self {
            config: LocationConfig {
                default_backend: None,
                ..LocationConfig::default()
            },
        }
    }

    /// Keep delivering fixes after the first one.
    pub fn keep_tracking(mut self, keep: bool) -> Self {
        self.config.keep_tracking = keep;
        self
    }

    /// Interval of continuous updates.
    pub fn required_update_interval(mut self, interval: Duration) -> Self {
        self.config.required_update_interval = interval;
        self
    }

    /// Minimum displacement of continuous updates.
    pub fn required_update_distance(mut self, meters: f32) -> Self {
        self.config.required_update_distance = meters;
        self
    }

    /// Maximum accuracy radius of a usable cached fix.
    pub fn acceptable_accuracy(mut self, meters: f32) -> Self {
        self.config.acceptance.max_accuracy = meters;
        self
    }

    /// Maximum age of a usable cached fix.
    pub fn acceptable_age(mut self, age: Duration) -> Self {
        self.config.acceptance.max_age = age;
        self
    }

    /// Required permissions.
    pub fn permissions(mut self, permissions: PermissionConfig) -> Self {
        self.config.permissions = permissions;
        self
    }

    /// Enable the GNSS ↔ network backend.
    pub fn use_default_backend(mut self, backend: DefaultBackendConfig) -> Self {
        self.config.default_backend = Some(backend);
        self
    }

    /// Enable the vendor backend.
    pub fn use_vendor_backend(mut self, backend: VendorBackendConfig) -> Self {
        self.config.vendor_backend = Some(backend);
        self
    }

    /// Validate and return the configuration.
    pub fn build(self) -> Result<LocationConfig, ConfigError> {
        self.config.validate()?;
        Ok(self.config)
    }
}

/// Diagnostic output settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingSettings {
    /// Master switch for diagnostics.
    pub enabled: bool,
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    pub level: String,
    /// Optional log file.
    pub file: Option<PathBuf>,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            level: DEFAULT_LOG_LEVEL.to_string(),
            file: None,
        }
    }
}
