//! Caller-facing callbacks and the report queue feeding them.
//!
//! Backends and the dispatcher never invoke the caller directly. They push
//! [`Report`]s into an [`Outbox`]; the manager drains it into the registered
//! [`LocationListener`] once the current event has been fully handled, so no
//! caller code ever runs while a state transition is half done.

use std::collections::VecDeque;

use crate::error::FailReason;
use crate::event::{ProcessStage, SourceStatus};
use crate::fix::Fix;

/// Receives acquisition outcomes and progress.
///
/// Only `on_location_changed` and `on_location_failed` are required; the
/// informational callbacks default to no-ops.
pub trait LocationListener: Send {
    /// A usable fix arrived.
    fn on_location_changed(&mut self, fix: Fix);

    /// The request ended without a fix.
    fn on_location_failed(&mut self, reason: FailReason);

    /// The acquisition moved to another stage.
    fn on_process_stage_changed(&mut self, _stage: ProcessStage) {}

    /// Permissions are in place. `already_had` is false when the user was
    /// asked during this request.
    fn on_permission_granted(&mut self, _already_had: bool) {}

    /// A position source changed status.
    fn on_source_status(&mut self, _status: SourceStatus) {}
}

/// Something a backend wants the orchestrator to know.
#[derive(Debug, Clone, PartialEq)]
pub enum Report {
    /// A fix for the caller.
    Fix(Fix),
    /// A terminal failure for the caller.
    Failed(FailReason),
    /// Progress for the caller.
    Stage(ProcessStage),
    /// Permission flow completed successfully.
    PermissionGranted {
        /// Whether every permission was granted before the request.
        already_had: bool,
    },
    /// Pass-through source status.
    Status(SourceStatus),
    /// The vendor backend gave up; the dispatcher decides what happens next.
    Fallback {
        /// Why the backend gave up.
        reason: FailReason,
    },
}

impl Report {
    /// Whether the report ends a request. Fixes end it only when not tracking.
    pub fn is_terminal(&self, keep_tracking: bool) -> bool {
        match self {
            Report::Failed(_) => true,
            Report::Fix(_) => !keep_tracking,
            _ => false,
        }
    }
}

/// Ordered queue of reports produced while handling one event.
#[derive(Debug, Default)]
pub struct Outbox {
    reports: VecDeque<Report>,
}

impl Outbox {
    /// Empty outbox.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a report.
    pub fn push(&mut self, report: Report) {
        self.reports.push_back(report);
    }

    /// Queue a fix.
    pub fn fix(&mut self, fix: Fix) {
        self.push(Report::Fix(fix));
    }

    /// Queue a terminal failure.
    pub fn failed(&mut self, reason: FailReason) {
        self.push(Report::Failed(reason));
    }

    /// Queue a stage change.
    pub fn stage(&mut self, stage: ProcessStage) {
        self.push(Report::Stage(stage));
    }

    /// Number of queued reports.
    pub fn len(&self) -> usize {
        self.reports.len()
    }

    /// Whether nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.reports.is_empty()
    }

    /// Remove and return the oldest report.
    pub fn pop(&mut self) -> Option<Report> {
        self.reports.pop_front()
    }

    /// Remove every queued report, oldest first.
    pub fn drain(&mut self) -> impl Iterator<Item = Report> + '_ {
        self.reports.drain(..)
    }
}

/// Forward `report` to `listener`. `Fallback` is internal and never reaches it.
pub(crate) fn deliver(listener: &mut dyn LocationListener, report: Report) {
    match report {
        Report::Fix(fix) => listener.on_location_changed(fix),
        Report::Failed(reason) => listener.on_location_failed(reason),
        Report::Stage(stage) => listener.on_process_stage_changed(stage),
        Report::PermissionGranted { already_had } => listener.on_permission_granted(already_had),
        Report::Status(status) => listener.on_source_status(status),
        Report::Fallback { reason } => {
            tracing::warn!(reason = reason.as_str(), "Unhandled fallback report dropped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fix::FixSource;

    #[derive(Default)]
    struct Counting {
        fixes: usize,
        failures: Vec<FailReason>,
        stages: Vec<ProcessStage>,
    }

    impl LocationListener for Counting {
        fn on_location_changed(&mut self, _fix: Fix) {
            self.fixes += 1;
        }

        fn on_location_failed(&mut self, reason: FailReason) {
            self.failures.push(reason);
        }

        fn on_process_stage_changed(&mut self, stage: ProcessStage) {
            self.stages.push(stage);
        }
    }

    #[test]
    fn test_outbox_preserves_order() {
        let mut outbox = Outbox::new();
        outbox.stage(ProcessStage::UsingGnss);
        outbox.fix(Fix::new(1.0, 2.0, 3.0, FixSource::Gnss));
        outbox.failed(FailReason::Timeout);
        assert_eq!(outbox.len(), 3);

        let drained: Vec<_> = outbox.drain().collect();
        assert!(matches!(drained[0], Report::Stage(ProcessStage::UsingGnss)));
        assert!(matches!(drained[1], Report::Fix(_)));
        assert!(drained[2].is_terminal(true));
        assert!(outbox.is_empty());
    }

    #[test]
    fn test_fix_is_terminal_only_when_not_tracking() {
        let fix = Report::Fix(Fix::new(1.0, 2.0, 3.0, FixSource::Gnss));
        assert!(fix.is_terminal(false));
        assert!(!fix.is_terminal(true));
        assert!(!Report::Stage(ProcessStage::UsingNetwork).is_terminal(false));
        assert!(!Report::Fallback {
            reason: FailReason::Timeout
        }
        .is_terminal(false));
    }

    #[test]
    fn test_deliver_routes_callbacks() {
        let mut listener = Counting::default();
        deliver(&mut listener, Report::Stage(ProcessStage::UsingNetwork));
        deliver(&mut listener, Report::Fix(Fix::new(0.0, 0.0, 1.0, FixSource::Network)));
        deliver(&mut listener, Report::Failed(FailReason::NetworkUnavailable));
        deliver(
            &mut listener,
            Report::Fallback {
                reason: FailReason::VendorConnectionFailed,
            },
        );
        // Default no-op callback.
        deliver(&mut listener, Report::PermissionGranted { already_had: true });

        assert_eq!(listener.fixes, 1);
        assert_eq!(listener.failures, vec![FailReason::NetworkUnavailable]);
        assert_eq!(listener.stages, vec![ProcessStage::UsingNetwork]);
    }
}
