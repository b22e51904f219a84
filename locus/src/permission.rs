//! Permission gating.
//!
//! Every acquisition starts here. [`PermissionGate`] answers whether all
//! required permissions are held and, if not, drives the request flow:
//!
//! ```text
//! request_permissions()
//!   ├─ no foreground ───────────────────────► false (caller reports denial)
//!   ├─ rationale needed & configured ─► show rationale dialog
//!   │     ├─ accepted ─► OS request ─► on_result()
//!   │     └─ declined ─────────────────────► Denied
//!   └─ otherwise ─────────► OS request ─► on_result()
//! ```
//!
//! A pending request yields exactly one [`PermissionOutcome`]; answers that
//! arrive when nothing is pending are ignored.

use std::sync::Arc;

use crate::config::PermissionConfig;
use crate::event::{DialogKind, RequestCode};
use crate::platform::{PermissionService, UiHost};

/// Result of a permission request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionOutcome {
    /// Every required permission is now granted.
    Granted,
    /// The user refused, or the request could not complete.
    Denied,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Pending {
    None,
    Rationale,
    Request,
}

/// Checks and requests the permissions every backend depends on.
pub struct PermissionGate {
    config: PermissionConfig,
    permissions: Arc<dyn PermissionService>,
    ui: Arc<dyn UiHost>,
    pending: Pending,
}

impl PermissionGate {
    /// Create a gate for `config`.
    pub fn new(
        config: PermissionConfig,
        permissions: Arc<dyn PermissionService>,
        ui: Arc<dyn UiHost>,
    ) -> Self {
        Self {
            config,
            permissions,
            ui,
            pending: Pending::None,
        }
    }

    /// True iff every required permission is granted.
    pub fn has_permission(&self) -> bool {
        self.config
            .required
            .iter()
            .all(|p| self.permissions.is_granted(p))
    }

    /// Whether the rationale dialog is on screen.
    pub fn is_dialog_showing(&self) -> bool {
        self.pending == Pending::Rationale
    }

    /// Start the request flow.
    ///
    /// Returns false when no foreground context exists and nothing could be
    /// requested. Otherwise the outcome arrives through
    /// [`on_rationale_result`](Self::on_rationale_result) or
    /// [`on_result`](Self::on_result).
    pub fn request_permissions(&mut self) -> bool {
        if !self.ui.context().has_foreground() {
            tracing::info!("No foreground context, cannot request permissions");
            return false;
        }

        let needs_rationale = self
            .config
            .required
            .iter()
            .any(|p| self.permissions.should_show_rationale(p));

        match (&self.config.rationale, needs_rationale) {
            (Some(content), true) => {
                tracing::debug!("Showing permission rationale");
                self.pending = Pending::Rationale;
                self.ui.show_dialog(DialogKind::PermissionRationale, content);
            }
            _ => self.issue_request(),
        }
        true
    }

    /// Answer to the rationale dialog. Returns the outcome if the flow ended.
    pub fn on_rationale_result(&mut self, accepted: bool) -> Option<PermissionOutcome> {
        if self.pending != Pending::Rationale {
            tracing::debug!("Rationale answer with no rationale showing, ignoring");
            return None;
        }
        if accepted {
            self.issue_request();
            None
        } else {
            tracing::info!("Permission rationale declined");
            self.pending = Pending::None;
            Some(PermissionOutcome::Denied)
        }
    }

    /// Answer to the OS-level request.
    ///
    /// Any denial wins over partial grants. An empty or interrupted result
    /// counts as a denial unless the permissions are in fact held.
    pub fn on_result(&mut self, granted: &[String], denied: &[String]) -> Option<PermissionOutcome> {
        if self.pending != Pending::Request {
            tracing::debug!("Permission result with no request pending, ignoring");
            return None;
        }
        self.pending = Pending::None;

        if !denied.is_empty() {
            tracing::info!(denied = ?denied, "Permissions denied");
            return Some(PermissionOutcome::Denied);
        }

        let covered = self
            .config
            .required
            .iter()
            .all(|p| granted.iter().any(|g| g == p) || self.permissions.is_granted(p));
        if covered {
            Some(PermissionOutcome::Granted)
        } else {
            tracing::info!(granted = ?granted, "Permission request ended without a full grant");
            Some(PermissionOutcome::Denied)
        }
    }

    /// Abandon any pending request. Late answers are ignored.
    pub fn cancel(&mut self) {
        if self.pending == Pending::Rationale {
            self.ui.dismiss_dialog(DialogKind::PermissionRationale);
        }
        self.pending = Pending::None;
    }

    fn issue_request(&mut self) {
        let missing: Vec<String> = self
            .config
            .required
            .iter()
            .filter(|p| !self.permissions.is_granted(p))
            .cloned()
            .collect();
        tracing::debug!(permissions = ?missing, "Requesting permissions");
        self.pending = Pending::Request;
        self.permissions.request(RequestCode::Permission, &missing);
    }
}

impl std::fmt::Debug for PermissionGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PermissionGate")
            .field("required", &self.config.required)
            .field("pending", &self.pending)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::UiContext;
    use crate::sim::{Reply, SimCall, SimulatedPlatform};

    fn gate(sim: &Arc<SimulatedPlatform>, config: PermissionConfig) -> PermissionGate {
        PermissionGate::new(config, sim.clone(), sim.clone())
    }

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_has_permission_requires_all() {
        let sim = SimulatedPlatform::new();
        let gate = gate(&sim, PermissionConfig::new(["a", "b"]));
        sim.grant("a");
        assert!(!gate.has_permission());
        sim.grant("b");
        assert!(gate.has_permission());
    }

    #[test]
    fn test_no_foreground_returns_false() {
        let sim = SimulatedPlatform::new();
        sim.set_ui(UiContext::Background);
        let mut gate = gate(&sim, PermissionConfig::new(["a"]));
        assert!(!gate.request_permissions());
        assert!(!gate.is_dialog_showing());
        assert_eq!(sim.count(|c| matches!(c, SimCall::PermissionRequest(_))), 0);
    }

    #[test]
    fn test_requests_only_missing_permissions() {
        let sim = SimulatedPlatform::new();
        sim.set_permission_reply(Reply::Silent);
        sim.grant("a");
        let mut gate = gate(&sim, PermissionConfig::new(["a", "b"]));
        assert!(gate.request_permissions());
        assert!(sim
            .calls()
            .contains(&SimCall::PermissionRequest(strings(&["b"]))));
    }

    #[test]
    fn test_denial_wins_over_partial_grant() {
        let sim = SimulatedPlatform::new();
        sim.set_permission_reply(Reply::Silent);
        let mut gate = gate(&sim, PermissionConfig::new(["a", "b"]));
        gate.request_permissions();
        assert_eq!(
            gate.on_result(&strings(&["a"]), &strings(&["b"])),
            Some(PermissionOutcome::Denied)
        );
    }

    #[test]
    fn test_full_grant() {
        let sim = SimulatedPlatform::new();
        sim.set_permission_reply(Reply::Silent);
        let mut gate = gate(&sim, PermissionConfig::new(["a", "b"]));
        gate.request_permissions();
        assert_eq!(
            gate.on_result(&strings(&["a", "b"]), &[]),
            Some(PermissionOutcome::Granted)
        );
        // Exactly one outcome per request.
        assert_eq!(gate.on_result(&strings(&["a", "b"]), &[]), None);
    }

    #[test]
    fn test_empty_result_is_denial() {
        let sim = SimulatedPlatform::new();
        sim.set_permission_reply(Reply::Silent);
        let mut gate = gate(&sim, PermissionConfig::new(["a"]));
        gate.request_permissions();
        assert_eq!(gate.on_result(&[], &[]), Some(PermissionOutcome::Denied));
    }

    #[test]
    fn test_rationale_flow() {
        let sim = SimulatedPlatform::new();
        sim.set_permission_reply(Reply::Silent);
        sim.set_dialog_reply(DialogKind::PermissionRationale, Reply::Silent);
        sim.set_should_show_rationale(true);
        let mut gate = gate(
            &sim,
            PermissionConfig::new(["a"]).with_rationale("needed"),
        );

        assert!(gate.request_permissions());
        assert!(gate.is_dialog_showing());
        assert_eq!(sim.count(|c| matches!(c, SimCall::PermissionRequest(_))), 0);

        assert_eq!(gate.on_rationale_result(true), None);
        assert!(!gate.is_dialog_showing());
        assert_eq!(sim.count(|c| matches!(c, SimCall::PermissionRequest(_))), 1);
    }

    #[test]
    fn test_rationale_declined_never_requests() {
        let sim = SimulatedPlatform::new();
        sim.set_dialog_reply(DialogKind::PermissionRationale, Reply::Silent);
        sim.set_should_show_rationale(true);
        let mut gate = gate(
            &sim,
            PermissionConfig::new(["a"]).with_rationale("needed"),
        );
        gate.request_permissions();
        assert_eq!(
            gate.on_rationale_result(false),
            Some(PermissionOutcome::Denied)
        );
        assert_eq!(sim.count(|c| matches!(c, SimCall::PermissionRequest(_))), 0);
    }

    #[test]
    fn test_rationale_skipped_without_content() {
        let sim = SimulatedPlatform::new();
        sim.set_permission_reply(Reply::Silent);
        sim.set_should_show_rationale(true);
        let mut gate = gate(&sim, PermissionConfig::new(["a"]));
        gate.request_permissions();
        assert!(!gate.is_dialog_showing());
        assert_eq!(sim.count(|c| matches!(c, SimCall::PermissionRequest(_))), 1);
    }
}
