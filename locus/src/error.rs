//! Error types.
//!
//! [`FailReason`] is the terminal outcome reported to the caller. The other
//! errors are returned by collaborator calls and are always folded into the
//! fallback chain rather than surfaced directly.

use serde::Serialize;
use thiserror::Error;

use crate::event::SourceKind;

/// Terminal failure reported through `LocationListener::on_location_failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailReason {
    /// Failure with no more specific classification.
    #[error("unknown failure")]
    Unknown,

    /// The wait period elapsed with no usable fix.
    #[error("timed out waiting for a position fix")]
    Timeout,

    /// A required permission was not granted.
    #[error("location permission denied")]
    PermissionDenied,

    /// Network positioning was needed but there is no connectivity.
    #[error("network unavailable")]
    NetworkUnavailable,

    /// The vendor service cannot be used and no default backend is configured.
    #[error("vendor location service unavailable")]
    VendorServiceUnavailable,

    /// Connecting to the vendor service failed.
    #[error("vendor location service connection failed")]
    VendorConnectionFailed,

    /// The settings resolution surface could not be shown or failed.
    #[error("vendor settings resolution could not be displayed")]
    VendorSettingsDialogFailed,

    /// The user declined the settings resolution.
    #[error("vendor settings resolution declined")]
    VendorSettingsDenied,

    /// No context was available where one was mandatory.
    #[error("no platform context attached")]
    ContextDetached,

    /// A context was available but cannot launch result-returning surfaces.
    #[error("attached context cannot launch result-returning surfaces")]
    ContextWrongType,
}

impl FailReason {
    /// Short machine-readable name.
    pub fn as_str(&self) -> &'static str {
        match self {
            FailReason::Unknown => "unknown",
            FailReason::Timeout => "timeout",
            FailReason::PermissionDenied => "permission_denied",
            FailReason::NetworkUnavailable => "network_unavailable",
            FailReason::VendorServiceUnavailable => "vendor_service_unavailable",
            FailReason::VendorConnectionFailed => "vendor_connection_failed",
            FailReason::VendorSettingsDialogFailed => "vendor_settings_dialog_failed",
            FailReason::VendorSettingsDenied => "vendor_settings_denied",
            FailReason::ContextDetached => "context_detached",
            FailReason::ContextWrongType => "context_wrong_type",
        }
    }
}

/// Errors returned by platform position collaborators.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlatformError {
    /// The source is disabled or missing on this device.
    #[error("position source {0} is unavailable")]
    SourceUnavailable(SourceKind),

    /// The vendor client is not connected.
    #[error("vendor service is not connected")]
    NotConnected,

    /// The platform refused the registration.
    #[error("registration rejected: {0}")]
    Rejected(String),
}

/// Errors returned when a user-facing surface cannot be launched.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LaunchError {
    /// No foreground context is available.
    #[error("no foreground context")]
    Detached,

    /// The foreground context cannot return results.
    #[error("context cannot launch result-returning surfaces")]
    WrongContext,

    /// The platform failed to start the surface.
    #[error("failed to launch surface: {0}")]
    Failed(String),
}

impl From<LaunchError> for FailReason {
    fn from(e: LaunchError) -> Self {
        match e {
            LaunchError::Detached => FailReason::ContextDetached,
            LaunchError::WrongContext => FailReason::ContextWrongType,
            LaunchError::Failed(_) => FailReason::VendorSettingsDialogFailed,
        }
    }
}
