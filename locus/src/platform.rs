//! Collaborator interfaces wrapped by the orchestrator.
//!
//! The orchestrator never talks to radios, vendor SDKs, permission systems or
//! UI toolkits directly. It depends on the four traits below, bundled into a
//! [`Platform`]:
//!
//! - [`PositionSources`] - the two built-in sources (GNSS, network)
//! - [`VendorService`] - a fused-location service with its own connection
//! - [`PermissionService`] - grant queries and OS-level requests
//! - [`UiHost`] - the foreground context that shows dialogs and launches
//!   result-returning surfaces
//!
//! Calls are fire-and-forget: anything asynchronous comes back later as an
//! [`Event`](crate::event::Event) tagged with the [`Ticket`] passed in.

use std::sync::Arc;
use std::time::Duration;

use crate::error::{LaunchError, PlatformError};
use crate::event::{DialogKind, RequestCode, SourceKind, Surface, Ticket};
use crate::fix::Fix;

/// What kind of context the host can currently provide.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UiContext {
    /// No context at all.
    Detached,
    /// A platform context exists but nothing can be shown to the user.
    Background,
    /// A foreground context that can show dialogs.
    Foreground {
        /// Whether result-returning surfaces can be launched from it.
        can_launch_for_result: bool,
    },
}

impl UiContext {
    /// Any platform context is available.
    pub fn is_attached(&self) -> bool {
        !matches!(self, UiContext::Detached)
    }

    /// Dialogs can be shown.
    pub fn has_foreground(&self) -> bool {
        matches!(self, UiContext::Foreground { .. })
    }

    /// Result-returning surfaces can be launched.
    pub fn can_launch_for_result(&self) -> bool {
        matches!(
            self,
            UiContext::Foreground {
                can_launch_for_result: true
            }
        )
    }
}

/// Result of a vendor service availability check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Availability {
    /// The service can be used.
    Available,
    /// The service cannot be used right now.
    Unavailable {
        /// Vendor error code.
        code: i32,
        /// Whether a device-level resolution exists.
        resolvable: bool,
    },
}

/// Power/accuracy trade-off requested from the vendor service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum UpdatePriority {
    /// Most accurate fix available.
    #[default]
    HighAccuracy,
    /// Block-level accuracy.
    BalancedPower,
    /// City-level accuracy.
    LowPower,
    /// Only fixes computed for other clients.
    Passive,
}

impl UpdatePriority {
    /// Config-file spelling.
    pub fn as_str(&self) -> &'static str {
        match self {
            UpdatePriority::HighAccuracy => "high_accuracy",
            UpdatePriority::BalancedPower => "balanced_power",
            UpdatePriority::LowPower => "low_power",
            UpdatePriority::Passive => "passive",
        }
    }
}

impl std::str::FromStr for UpdatePriority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "high_accuracy" => Ok(UpdatePriority::HighAccuracy),
            "balanced_power" => Ok(UpdatePriority::BalancedPower),
            "low_power" => Ok(UpdatePriority::LowPower),
            "passive" => Ok(UpdatePriority::Passive),
            other => Err(format!("unknown priority '{}'", other)),
        }
    }
}

/// Parameters of a live-update registration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UpdateRequest {
    /// Minimum time between updates.
    pub interval: Duration,
    /// Minimum displacement (meters) between updates.
    pub distance: f32,
    /// Vendor priority hint.
    pub priority: UpdatePriority,
}

impl UpdateRequest {
    /// Deliver as soon as possible (used while waiting for a first fix).
    pub fn immediate(priority: UpdatePriority) -> Self {
        Self {
            interval: Duration::ZERO,
            distance: 0.0,
            priority,
        }
    }
}

/// Text of a dialog presented through [`UiHost::show_dialog`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DialogContent {
    /// Dialog title.
    pub title: String,
    /// Body text.
    pub message: String,
    /// Positive button label.
    pub positive: String,
    /// Negative button label.
    pub negative: String,
}

impl DialogContent {
    /// Dialog with default button labels.
    pub fn new(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            message: message.into(),
            positive: "OK".to_string(),
            negative: "Cancel".to_string(),
        }
    }
}

/// The two built-in position sources.
pub trait PositionSources: Send + Sync {
    /// Whether the source is switched on.
    fn is_enabled(&self, source: SourceKind) -> bool;

    /// Whether network positioning currently has connectivity.
    fn is_network_connected(&self) -> bool;

    /// Cached last fix of the source.
    fn last_known_fix(&self, source: SourceKind) -> Option<Fix>;

    /// Register for live updates. Fixes arrive as `Event::FixDelivered`
    /// tagged with `ticket`. Replaces any existing registration for `ticket`.
    fn request_updates(
        &self,
        ticket: Ticket,
        source: SourceKind,
        request: &UpdateRequest,
    ) -> Result<(), PlatformError>;

    /// Drop the registration for `ticket`, if any.
    fn remove_updates(&self, ticket: Ticket);
}

/// Vendor fused-location client.
pub trait VendorService: Send + Sync {
    /// Device-level availability of the service.
    fn check_availability(&self) -> Availability;

    /// Start connecting. Outcome arrives as an `Event::Vendor`.
    fn connect(&self, ticket: Ticket);

    /// Drop the connection.
    fn disconnect(&self);

    /// Whether the client is connected.
    fn is_connected(&self) -> bool;

    /// Cached last fix of the service.
    fn last_known_fix(&self) -> Option<Fix>;

    /// Check device settings against `request`. Outcome arrives as
    /// `VendorEvent::SettingsChecked`.
    fn check_settings(&self, ticket: Ticket, request: &UpdateRequest);

    /// Register for live updates. Fixes arrive as `VendorEvent::Fix`.
    fn request_updates(&self, ticket: Ticket, request: &UpdateRequest)
        -> Result<(), PlatformError>;

    /// Drop the registration for `ticket`, if any.
    fn remove_updates(&self, ticket: Ticket);
}

/// Permission subsystem.
pub trait PermissionService: Send + Sync {
    /// Whether `permission` is currently granted.
    fn is_granted(&self, permission: &str) -> bool;

    /// Whether the platform recommends explaining `permission` first.
    fn should_show_rationale(&self, permission: &str) -> bool;

    /// Issue the OS-level request. Outcome arrives as `Event::PermissionResult`.
    fn request(&self, request_code: RequestCode, permissions: &[String]);
}

/// Foreground UI context provider.
pub trait UiHost: Send + Sync {
    /// Context currently available.
    fn context(&self) -> UiContext;

    /// Present a dialog. The answer arrives as `Event::DialogResult`.
    fn show_dialog(&self, dialog: DialogKind, content: &DialogContent);

    /// Dismiss a dialog without producing a result.
    fn dismiss_dialog(&self, dialog: DialogKind);

    /// Launch a result-returning surface. The outcome arrives as
    /// `Event::PlatformResult` keyed by `request_code`.
    fn launch(&self, surface: Surface, request_code: RequestCode) -> Result<(), LaunchError>;
}

/// All collaborators needed by an acquisition.
#[derive(Clone)]
pub struct Platform {
    /// Built-in sources.
    pub sources: Arc<dyn PositionSources>,
    /// Vendor service, if the device has one.
    pub vendor: Option<Arc<dyn VendorService>>,
    /// Permission subsystem.
    pub permissions: Arc<dyn PermissionService>,
    /// Foreground UI context provider.
    pub ui: Arc<dyn UiHost>,
}

impl Platform {
    /// Bundle collaborators without a vendor service.
    pub fn new(
        sources: Arc<dyn PositionSources>,
        permissions: Arc<dyn PermissionService>,
        ui: Arc<dyn UiHost>,
    ) -> Self {
        Self {
            sources,
            vendor: None,
            permissions,
            ui,
        }
    }

    /// Attach a vendor service.
    pub fn with_vendor(mut self, vendor: Arc<dyn VendorService>) -> Self {
        self.vendor = Some(vendor);
        self
    }
}

impl std::fmt::Debug for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Platform")
            .field("vendor", &self.vendor.is_some())
            .finish_non_exhaustive()
    }
}
