//! Events consumed by the acquisition state machine.
//!
//! Every external stimulus (host lifecycle, permission and platform results,
//! dialog answers, timer firings, fixes and vendor callbacks) is expressed as
//! an [`Event`] and funnelled through `LocationManager::handle`. Events that
//! originate from a backend registration carry the [`Ticket`] the backend was
//! activated with, so late deliveries from a replaced backend can be dropped.
//!
//! ```text
//! host ──┐
//! timers ─┼──► EventSender ──► LocationSession ──► LocationManager::handle
//! platform┘                                          └─► Dispatcher ─► backend
//! ```

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;
use tokio::sync::mpsc;

use crate::error::FailReason;
use crate::fix::Fix;
use crate::scheduler::TimerFired;

/// Built-in platform position sources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    /// Satellite receiver.
    Gnss,
    /// Cell/Wi-Fi network positioning.
    Network,
}

impl SourceKind {
    /// Short lowercase name.
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Gnss => "gnss",
            SourceKind::Network => "network",
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity of one backend activation.
///
/// Issued by the dispatcher; echoed by collaborators on every event they
/// produce for a registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Ticket(u64);

impl Ticket {
    /// Reserved for timers owned by the dispatcher itself.
    pub const ORCHESTRATOR: Ticket = Ticket(0);

    /// Wrap a raw ticket value.
    pub const fn new(raw: u64) -> Self {
        Ticket(raw)
    }
}

impl fmt::Display for Ticket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Issues fresh tickets, starting after [`Ticket::ORCHESTRATOR`].
#[derive(Debug)]
pub(crate) struct TicketIssuer {
    next: AtomicU64,
}

impl TicketIssuer {
    pub(crate) fn new() -> Self {
        Self {
            next: AtomicU64::new(1),
        }
    }

    pub(crate) fn issue(&self) -> Ticket {
        Ticket(self.next.fetch_add(1, Ordering::Relaxed))
    }
}

/// Request codes correlating asynchronous host results with their request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestCode {
    /// OS-level permission request.
    Permission,
    /// GNSS enable settings screen.
    EnableGnss,
    /// Device-level vendor service resolution.
    VendorServiceResolution,
    /// Vendor location settings resolution.
    VendorSettings,
}

impl RequestCode {
    /// Numeric code for hosts that key results by integer.
    pub fn code(&self) -> i32 {
        match self {
            RequestCode::Permission => 23,
            RequestCode::EnableGnss => 24,
            RequestCode::VendorServiceResolution => 25,
            RequestCode::VendorSettings => 26,
        }
    }

    /// Reverse of [`RequestCode::code`].
    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            23 => Some(RequestCode::Permission),
            24 => Some(RequestCode::EnableGnss),
            25 => Some(RequestCode::VendorServiceResolution),
            26 => Some(RequestCode::VendorSettings),
            _ => None,
        }
    }
}

/// Outcome of a result-returning surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultOutcome {
    /// The surface completed successfully.
    Ok,
    /// The user backed out or the surface failed.
    Cancelled,
}

/// Dialogs presented through `UiHost::show_dialog`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DialogKind {
    /// Explanation shown before the OS permission request.
    PermissionRationale,
    /// Offer to open the GNSS settings screen.
    EnableGnss,
}

/// Result-returning surfaces launched through `UiHost::launch`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Surface {
    /// Platform settings screen that enables a source.
    SourceSettings(SourceKind),
    /// Device-level resolution for an unavailable vendor service.
    VendorServiceResolution {
        /// Vendor availability error code being resolved.
        error_code: i32,
    },
    /// Vendor location settings resolution.
    VendorSettingsResolution,
}

/// Informational progress stages reported to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessStage {
    /// Waiting on the permission flow.
    AskingPermission,
    /// Acquiring through the vendor fused service.
    UsingVendorService,
    /// Acquiring through GNSS.
    UsingGnss,
    /// Acquiring through network positioning.
    UsingNetwork,
}

impl fmt::Display for ProcessStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ProcessStage::AskingPermission => "asking permission",
            ProcessStage::UsingVendorService => "using vendor service",
            ProcessStage::UsingGnss => "using gnss",
            ProcessStage::UsingNetwork => "using network",
        };
        f.write_str(s)
    }
}

/// Pass-through source status notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum SourceStatus {
    /// The source was switched on.
    Enabled {
        /// Affected source.
        source: SourceKind,
    },
    /// The source was switched off.
    Disabled {
        /// Affected source.
        source: SourceKind,
    },
    /// Platform-specific status change.
    Changed {
        /// Affected source.
        source: SourceKind,
        /// Platform status code.
        code: i32,
    },
}

/// Outcome of a vendor settings check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingsOutcome {
    /// Device settings already satisfy the request.
    Satisfied,
    /// Settings can be fixed through a resolution surface.
    Resolvable,
    /// Settings cannot be changed.
    Unresolvable,
}

/// Callbacks from the vendor fused-location client.
#[derive(Debug, Clone, PartialEq)]
pub enum VendorEvent {
    /// The client connected.
    Connected,
    /// The connection was suspended by the service.
    ConnectionSuspended {
        /// Vendor cause code.
        cause: i32,
    },
    /// The connection attempt failed.
    ConnectionFailed {
        /// Vendor error code.
        code: i32,
    },
    /// A settings check completed.
    SettingsChecked(SettingsOutcome),
    /// A live fix arrived.
    Fix(Fix),
}

/// Every stimulus the state machine reacts to.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// Caller asks for a fix.
    Get,
    /// Caller abandons the current request.
    Cancel,
    /// Host went to the background.
    Pause,
    /// Host returned to the foreground.
    Resume,
    /// Host is being torn down.
    Destroy,
    /// OS permission request completed.
    PermissionResult {
        /// Code the request was issued with.
        request_code: RequestCode,
        /// Permissions granted.
        granted: Vec<String>,
        /// Permissions denied.
        denied: Vec<String>,
    },
    /// A result-returning surface completed.
    PlatformResult {
        /// Code the surface was launched with.
        request_code: RequestCode,
        /// How it ended.
        outcome: ResultOutcome,
    },
    /// The user answered a dialog. `accepted == false` covers cancel and dismiss.
    DialogResult {
        /// Dialog answered.
        dialog: DialogKind,
        /// Positive answer.
        accepted: bool,
    },
    /// A delayed task fired.
    TimerFired(TimerFired),
    /// A platform source delivered a fix.
    FixDelivered {
        /// Registration ticket.
        ticket: Ticket,
        /// The reading.
        fix: Fix,
    },
    /// A platform source changed status.
    SourceStatus {
        /// Registration ticket.
        ticket: Ticket,
        /// New status.
        status: SourceStatus,
    },
    /// Vendor client callback.
    Vendor {
        /// Registration ticket.
        ticket: Ticket,
        /// Callback payload.
        event: VendorEvent,
    },
    /// A collaborator broke a registration it had accepted.
    BackendFailed {
        /// Registration ticket.
        ticket: Ticket,
        /// Failure to report.
        reason: FailReason,
    },
}

impl Event {
    /// Short event name for logging.
    pub fn event_type(&self) -> &'static str {
        match self {
            Event::Get => "get",
            Event::Cancel => "cancel",
            Event::Pause => "pause",
            Event::Resume => "resume",
            Event::Destroy => "destroy",
            Event::PermissionResult { .. } => "permission_result",
            Event::PlatformResult { .. } => "platform_result",
            Event::DialogResult { .. } => "dialog_result",
            Event::TimerFired(_) => "timer_fired",
            Event::FixDelivered { .. } => "fix_delivered",
            Event::SourceStatus { .. } => "source_status",
            Event::Vendor { .. } => "vendor",
            Event::BackendFailed { .. } => "backend_failed",
        }
    }

    /// Ticket carried by backend-originated events.
    pub fn ticket(&self) -> Option<Ticket> {
        match self {
            Event::TimerFired(fired) => Some(fired.ticket),
            Event::FixDelivered { ticket, .. }
            | Event::SourceStatus { ticket, .. }
            | Event::Vendor { ticket, .. }
            | Event::BackendFailed { ticket, .. } => Some(*ticket),
            _ => None,
        }
    }
}

/// Create the event channel feeding a `LocationSession`.
pub fn event_channel() -> (EventSender, mpsc::UnboundedReceiver<Event>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (EventSender { tx }, rx)
}

/// Owning handle for posting events.
#[derive(Debug, Clone)]
pub struct EventSender {
    tx: mpsc::UnboundedSender<Event>,
}

impl EventSender {
    /// Post an event. Returns false if the session is gone.
    pub fn post(&self, event: Event) -> bool {
        self.tx.send(event).is_ok()
    }

    /// Non-owning handle that does not keep the channel open.
    pub fn downgrade(&self) -> WeakEventSender {
        WeakEventSender {
            tx: Some(self.tx.downgrade()),
        }
    }
}

/// Non-owning handle for posting events.
///
/// Posting through a handle whose channel has closed is a silent no-op.
#[derive(Debug, Clone, Default)]
pub struct WeakEventSender {
    tx: Option<mpsc::WeakUnboundedSender<Event>>,
}

impl WeakEventSender {
    /// A handle that is never connected.
    pub fn detached() -> Self {
        Self { tx: None }
    }

    /// Post an event if the channel still exists.
    pub fn post(&self, event: Event) -> bool {
        match self.tx.as_ref().and_then(|tx| tx.upgrade()) {
            Some(tx) => tx.send(event).is_ok(),
            None => false,
        }
    }
}
