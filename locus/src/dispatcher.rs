//! Top-level orchestrator.
//!
//! The [`Dispatcher`] gates every request on permissions, then picks a
//! backend and owns it for the rest of the request:
//!
//! ```text
//! Idle ─get─► Permission ─granted─► CheckingAvailability ─available─► UsingVendor
//!                 │                        │                             │
//!                 │ denied                 │ unavailable / no vendor     │ fallback / vendor wait
//!                 ▼                        ▼                             ▼
//!              Finished ◄──────────── UsingDefault ◄────────────────────┘
//! ```
//!
//! At most one backend is active. Each activation gets a fresh [`Ticket`];
//! backend-originated events carrying any other ticket are dropped, which is
//! what keeps a replaced backend from reaching the caller.

use std::sync::Arc;

use crate::backend::{BackendContext, BackendFactory, LocationBackend};
use crate::config::LocationConfig;
use crate::error::FailReason;
use crate::event::{
    DialogKind, Event, ProcessStage, RequestCode, ResultOutcome, Surface, Ticket, TicketIssuer,
    WeakEventSender,
};
use crate::listener::{Outbox, Report};
use crate::permission::{PermissionGate, PermissionOutcome};
use crate::platform::{Availability, Platform};
use crate::scheduler::{DelayedTask, TaskKind, TimerFired};

/// Which backend an activation runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    /// GNSS/network backend.
    Default,
    /// Vendor fused-service backend.
    Vendor,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Idle,
    Permission,
    CheckingAvailability,
    ResolvingService,
    UsingVendor,
    UsingDefault,
    Finished,
}

impl State {
    fn in_flight(&self) -> bool {
        !matches!(self, State::Idle | State::Finished)
    }
}

struct ActiveBackend {
    ticket: Ticket,
    kind: BackendKind,
    backend: Box<dyn LocationBackend>,
}

/// Sequences permission gating and backend selection for one caller.
pub struct Dispatcher {
    config: Arc<LocationConfig>,
    platform: Platform,
    events: WeakEventSender,
    factory: Arc<dyn BackendFactory>,
    tickets: TicketIssuer,
    gate: PermissionGate,
    vendor_switch: DelayedTask,
    active: Option<ActiveBackend>,
    resolution_showing: bool,
    state: State,
}

impl Dispatcher {
    /// Create an idle dispatcher.
    pub fn new(
        config: Arc<LocationConfig>,
        platform: Platform,
        events: WeakEventSender,
        factory: Arc<dyn BackendFactory>,
    ) -> Self {
        let gate = PermissionGate::new(
            config.permissions.clone(),
            platform.permissions.clone(),
            platform.ui.clone(),
        );
        let vendor_switch =
            DelayedTask::new(TaskKind::VendorSwitch, Ticket::ORCHESTRATOR, events.clone());
        Self {
            config,
            platform,
            events,
            factory,
            tickets: TicketIssuer::new(),
            gate,
            vendor_switch,
            active: None,
            resolution_showing: false,
            state: State::Idle,
        }
    }

    /// Whether a request is running (including continuous tracking).
    pub fn is_in_flight(&self) -> bool {
        self.state.in_flight()
    }

    /// Kind of the active backend, if any.
    pub fn active_backend(&self) -> Option<BackendKind> {
        self.active.as_ref().map(|a| a.kind)
    }

    /// Ticket of the active backend, if any.
    pub fn active_ticket(&self) -> Option<Ticket> {
        self.active.as_ref().map(|a| a.ticket)
    }

    fn request_permission(&mut self, out: &mut Outbox) {
        if self.gate.has_permission() {
            out.push(Report::PermissionGranted { already_had: true });
            self.start_acquisition(out);
            return;
        }

        tracing::info!("Permissions missing, asking");
        self.state = State::Permission;
        out.stage(ProcessStage::AskingPermission);
        if !self.gate.request_permissions() {
            self.finish_failed(FailReason::PermissionDenied, out);
        }
    }

    fn on_permission_outcome(&mut self, outcome: PermissionOutcome, out: &mut Outbox) {
        match outcome {
            PermissionOutcome::Granted => {
                tracing::info!("Permissions granted");
                out.push(Report::PermissionGranted { already_had: false });
                self.start_acquisition(out);
            }
            PermissionOutcome::Denied => self.finish_failed(FailReason::PermissionDenied, out),
        }
    }

    fn start_acquisition(&mut self, out: &mut Outbox) {
        if self.config.vendor_backend.is_some() {
            self.check_vendor_availability(true, out);
        } else {
            self.activate_default(out);
        }
    }

    fn check_vendor_availability(&mut self, allow_resolution: bool, out: &mut Outbox) {
        let Some(vendor_config) = self.config.vendor_backend.clone() else {
            self.fall_back(FailReason::VendorServiceUnavailable, out);
            return;
        };
        self.state = State::CheckingAvailability;

        let availability = match &self.platform.vendor {
            Some(service) => service.check_availability(),
            None => Availability::Unavailable {
                code: 0,
                resolvable: false,
            },
        };
        tracing::debug!(?availability, "Vendor availability checked");

        match availability {
            Availability::Available => self.activate_vendor(out),
            Availability::Unavailable { code, resolvable } => {
                let can_ask = allow_resolution
                    && vendor_config.ask_to_resolve_vendor_service
                    && resolvable
                    && self.platform.ui.context().can_launch_for_result();
                if !can_ask {
                    self.fall_back(FailReason::VendorServiceUnavailable, out);
                    return;
                }
                let launched = self.platform.ui.launch(
                    Surface::VendorServiceResolution { error_code: code },
                    RequestCode::VendorServiceResolution,
                );
                match launched {
                    Ok(()) => {
                        tracing::info!(code, "Asking user to resolve vendor service");
                        self.resolution_showing = true;
                        self.state = State::ResolvingService;
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "Could not show vendor service resolution");
                        self.fall_back(FailReason::VendorServiceUnavailable, out);
                    }
                }
            }
        }
    }

    fn context(&self, ticket: Ticket) -> BackendContext {
        BackendContext {
            config: self.config.clone(),
            platform: self.platform.clone(),
            ticket,
            events: self.events.clone(),
        }
    }

    fn activate_vendor(&mut self, out: &mut Outbox) {
        let (Some(vendor_config), Some(service)) =
            (self.config.vendor_backend.clone(), self.platform.vendor.clone())
        else {
            self.fall_back(FailReason::VendorServiceUnavailable, out);
            return;
        };
        self.retire_active();

        let ticket = self.tickets.issue();
        let wait = vendor_config.vendor_wait;
        let backend = self
            .factory
            .create_vendor(self.context(ticket), vendor_config, service);
        tracing::info!(ticket = %ticket, "Activating vendor backend");
        self.active = Some(ActiveBackend {
            ticket,
            kind: BackendKind::Vendor,
            backend,
        });
        self.state = State::UsingVendor;
        out.stage(ProcessStage::UsingVendorService);
        self.vendor_switch.arm(wait);
        self.drive(out, |backend, batch| backend.get(batch));
    }

    fn activate_default(&mut self, out: &mut Outbox) {
        let Some(default_config) = self.config.default_backend.clone() else {
            self.finish_failed(FailReason::VendorServiceUnavailable, out);
            return;
        };
        self.retire_active();

        let ticket = self.tickets.issue();
        let backend = self
            .factory
            .create_default(self.context(ticket), default_config);
        tracing::info!(ticket = %ticket, "Activating default backend");
        self.active = Some(ActiveBackend {
            ticket,
            kind: BackendKind::Default,
            backend,
        });
        self.state = State::UsingDefault;
        self.drive(out, |backend, batch| backend.get(batch));
    }

    /// Abandon the vendor path and continue with the default backend.
    fn fall_back(&mut self, reason: FailReason, out: &mut Outbox) {
        self.vendor_switch.stop();
        self.resolution_showing = false;
        self.retire_active();
        if self.config.default_backend.is_none() {
            tracing::info!(reason = reason.as_str(), "Vendor path failed and no default backend configured");
            self.finish_failed(FailReason::VendorServiceUnavailable, out);
            return;
        }
        tracing::info!(reason = reason.as_str(), "Falling back to default backend");
        self.activate_default(out);
    }

    fn retire_active(&mut self) {
        if let Some(mut active) = self.active.take() {
            tracing::debug!(ticket = %active.ticket, backend = active.backend.name(), "Retiring backend");
            active.backend.cancel();
            active.backend.on_destroy();
        }
    }

    fn finish_failed(&mut self, reason: FailReason, out: &mut Outbox) {
        self.vendor_switch.stop();
        self.state = State::Finished;
        tracing::info!(reason = reason.as_str(), "Request failed");
        out.failed(reason);
    }

    /// Run `op` against the active backend and absorb its reports.
    fn drive<F>(&mut self, out: &mut Outbox, op: F)
    where
        F: FnOnce(&mut dyn LocationBackend, &mut Outbox),
    {
        let Some(active) = self.active.as_mut() else {
            return;
        };
        let ticket = active.ticket;
        let mut batch = Outbox::new();
        op(active.backend.as_mut(), &mut batch);
        self.absorb(ticket, batch, out);
    }

    fn absorb(&mut self, ticket: Ticket, mut batch: Outbox, out: &mut Outbox) {
        while let Some(report) = batch.pop() {
            if self.active_ticket() != Some(ticket) {
                tracing::debug!(
                    ticket = %ticket,
                    dropped = batch.len() + 1,
                    "Backend replaced, discarding remaining reports"
                );
                return;
            }
            match report {
                Report::Fallback { reason } => self.fall_back(reason, out),
                Report::Failed(reason) => {
                    self.vendor_switch.stop();
                    self.state = State::Finished;
                    tracing::info!(ticket = %ticket, reason = reason.as_str(), "Request failed");
                    out.failed(reason);
                }
                Report::Fix(fix) => {
                    self.vendor_switch.stop();
                    if !self.config.keep_tracking {
                        self.state = State::Finished;
                    }
                    tracing::info!(ticket = %ticket, fix = %fix, "Fix acquired");
                    out.fix(fix);
                }
                other => out.push(other),
            }
        }
    }

    fn on_timer(&mut self, fired: &TimerFired, out: &mut Outbox) {
        if !self.vendor_switch.accept(fired) {
            return;
        }
        let vendor_waiting = self.state == State::UsingVendor
            && self
                .active
                .as_ref()
                .is_some_and(|a| a.kind == BackendKind::Vendor && a.backend.is_waiting());
        if vendor_waiting {
            tracing::info!("Vendor wait elapsed, switching to default backend");
            self.fall_back(FailReason::Timeout, out);
        }
    }

    fn forward(&mut self, event: &Event, out: &mut Outbox) {
        let ticket = event.ticket();
        if ticket.is_none() || ticket != self.active_ticket() {
            tracing::debug!(
                event = event.event_type(),
                ticket = ?ticket,
                active = ?self.active_ticket(),
                "Dropping event for inactive backend"
            );
            return;
        }
        self.drive(out, |backend, batch| backend.handle(event, batch));
    }
}

impl LocationBackend for Dispatcher {
    fn name(&self) -> &'static str {
        "dispatcher"
    }

    fn get(&mut self, out: &mut Outbox) {
        if self.state.in_flight() {
            tracing::warn!("Request already in flight, ignoring get");
            return;
        }
        if self.state == State::Finished {
            self.retire_active();
        }
        tracing::info!(
            vendor = self.config.vendor_backend.is_some(),
            default = self.config.default_backend.is_some(),
            keep_tracking = self.config.keep_tracking,
            "Location requested"
        );
        self.request_permission(out);
    }

    fn cancel(&mut self) {
        self.vendor_switch.stop();
        self.gate.cancel();
        self.resolution_showing = false;
        self.retire_active();
        if self.state.in_flight() {
            tracing::info!("Request cancelled");
            self.state = State::Idle;
        }
    }

    fn on_pause(&mut self) {
        self.vendor_switch.pause();
        if let Some(active) = self.active.as_mut() {
            active.backend.on_pause();
        }
    }

    fn on_resume(&mut self, out: &mut Outbox) {
        self.vendor_switch.resume();
        self.drive(out, |backend, batch| backend.on_resume(batch));
    }

    fn on_destroy(&mut self) {
        if let Some(mut active) = self.active.take() {
            active.backend.on_destroy();
        }
        self.vendor_switch.stop();
        self.gate.cancel();
        self.resolution_showing = false;
        self.state = State::Idle;
    }

    fn on_platform_result(
        &mut self,
        request_code: RequestCode,
        outcome: ResultOutcome,
        out: &mut Outbox,
    ) {
        if request_code == RequestCode::VendorServiceResolution {
            if self.state != State::ResolvingService {
                tracing::debug!("Vendor resolution result with none pending, ignoring");
                return;
            }
            self.resolution_showing = false;
            match outcome {
                ResultOutcome::Ok => self.check_vendor_availability(false, out),
                ResultOutcome::Cancelled => {
                    self.fall_back(FailReason::VendorServiceUnavailable, out)
                }
            }
            return;
        }
        self.drive(out, |backend, batch| {
            backend.on_platform_result(request_code, outcome, batch)
        });
    }

    fn handle(&mut self, event: &Event, out: &mut Outbox) {
        tracing::trace!(event = event.event_type(), "Handling event");
        match event {
            Event::Get => self.get(out),
            Event::Cancel => self.cancel(),
            Event::Pause => self.on_pause(),
            Event::Resume => self.on_resume(out),
            Event::Destroy => self.on_destroy(),
            Event::PermissionResult {
                request_code,
                granted,
                denied,
            } => {
                if *request_code != RequestCode::Permission || self.state != State::Permission {
                    tracing::debug!("Unexpected permission result, ignoring");
                    return;
                }
                if let Some(outcome) = self.gate.on_result(granted, denied) {
                    self.on_permission_outcome(outcome, out);
                }
            }
            Event::PlatformResult {
                request_code,
                outcome,
            } => self.on_platform_result(*request_code, *outcome, out),
            Event::DialogResult {
                dialog: DialogKind::PermissionRationale,
                accepted,
            } => {
                if self.state != State::Permission {
                    return;
                }
                if let Some(outcome) = self.gate.on_rationale_result(*accepted) {
                    self.on_permission_outcome(outcome, out);
                }
            }
            Event::DialogResult { .. } => {
                self.drive(out, |backend, batch| backend.handle(event, batch));
            }
            Event::TimerFired(fired) if fired.ticket == Ticket::ORCHESTRATOR => {
                self.on_timer(fired, out)
            }
            Event::TimerFired(_)
            | Event::FixDelivered { .. }
            | Event::SourceStatus { .. }
            | Event::Vendor { .. }
            | Event::BackendFailed { .. } => self.forward(event, out),
        }
    }

    fn is_waiting(&self) -> bool {
        match self.state {
            State::Permission | State::CheckingAvailability | State::ResolvingService => true,
            State::UsingVendor | State::UsingDefault => {
                self.active.as_ref().is_some_and(|a| a.backend.is_waiting())
            }
            State::Idle | State::Finished => false,
        }
    }

    fn is_dialog_showing(&self) -> bool {
        self.resolution_showing
            || self.gate.is_dialog_showing()
            || self
                .active
                .as_ref()
                .is_some_and(|a| a.backend.is_dialog_showing())
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("state", &self.state)
            .field("active", &self.active_backend())
            .field("ticket", &self.active_ticket())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::StandardBackends;
    use crate::config::{DefaultBackendConfig, VendorBackendConfig};
    use crate::event::{SourceKind, VendorEvent};
    use crate::fix::{Fix, FixSource};
    use crate::platform::UiContext;
    use crate::sim::{Reply, SimCall, SimulatedPlatform, VendorConnect};

    fn dispatcher(sim: &Arc<SimulatedPlatform>, config: LocationConfig) -> Dispatcher {
        Dispatcher::new(
            Arc::new(config),
            sim.platform(),
            WeakEventSender::detached(),
            Arc::new(StandardBackends),
        )
    }

    fn vendor_and_default() -> LocationConfig {
        LocationConfig::builder()
            .use_vendor_backend(VendorBackendConfig::default())
            .use_default_backend(DefaultBackendConfig::default())
            .build()
            .unwrap()
    }

    fn reports(out: &mut Outbox) -> Vec<Report> {
        out.drain().collect()
    }

    #[test]
    fn test_default_only_never_checks_vendor() {
        let sim = SimulatedPlatform::new();
        sim.install_vendor();
        sim.grant_all();
        let mut dispatcher = dispatcher(&sim, LocationConfig::default());
        let mut out = Outbox::new();

        dispatcher.get(&mut out);
        assert_eq!(sim.availability_checks(), 0);
        assert_eq!(dispatcher.active_backend(), Some(BackendKind::Default));
        assert_eq!(
            reports(&mut out),
            vec![
                Report::PermissionGranted { already_had: true },
                Report::Stage(ProcessStage::UsingGnss),
            ]
        );
    }

    #[test]
    fn test_permission_short_circuit() {
        let sim = SimulatedPlatform::new();
        sim.set_ui(UiContext::Background);
        let mut dispatcher = dispatcher(&sim, LocationConfig::default());
        let mut out = Outbox::new();

        dispatcher.get(&mut out);
        assert_eq!(
            reports(&mut out),
            vec![
                Report::Stage(ProcessStage::AskingPermission),
                Report::Failed(FailReason::PermissionDenied),
            ]
        );
        assert_eq!(dispatcher.active_backend(), None);
        assert!(!dispatcher.is_in_flight());
    }

    #[test]
    fn test_permission_granted_after_request() {
        let sim = SimulatedPlatform::new();
        sim.set_permission_reply(Reply::Silent);
        let mut dispatcher = dispatcher(&sim, LocationConfig::default());
        let mut out = Outbox::new();

        dispatcher.get(&mut out);
        assert!(dispatcher.is_waiting());
        assert_eq!(dispatcher.active_backend(), None);

        sim.grant_all();
        dispatcher.handle(
            &Event::PermissionResult {
                request_code: RequestCode::Permission,
                granted: vec!["coarse_location".into(), "fine_location".into()],
                denied: vec![],
            },
            &mut out,
        );
        assert_eq!(dispatcher.active_backend(), Some(BackendKind::Default));
        assert!(reports(&mut out).contains(&Report::PermissionGranted { already_had: false }));
    }

    #[test]
    fn test_vendor_available_activates_vendor() {
        let sim = SimulatedPlatform::new();
        sim.install_vendor();
        sim.set_vendor_connect(VendorConnect::Silent);
        sim.grant_all();
        let mut dispatcher = dispatcher(&sim, vendor_and_default());
        let mut out = Outbox::new();

        dispatcher.get(&mut out);
        assert_eq!(sim.availability_checks(), 1);
        assert_eq!(dispatcher.active_backend(), Some(BackendKind::Vendor));
        assert!(reports(&mut out).contains(&Report::Stage(ProcessStage::UsingVendorService)));
    }

    #[test]
    fn test_missing_vendor_service_falls_back() {
        let sim = SimulatedPlatform::new();
        sim.grant_all();
        let mut dispatcher = dispatcher(&sim, vendor_and_default());
        let mut out = Outbox::new();

        dispatcher.get(&mut out);
        assert_eq!(dispatcher.active_backend(), Some(BackendKind::Default));
    }

    #[test]
    fn test_unavailable_vendor_without_default_fails() {
        let sim = SimulatedPlatform::new();
        sim.install_vendor();
        sim.set_vendor_availability(Availability::Unavailable {
            code: 2,
            resolvable: false,
        });
        sim.grant_all();
        let config = LocationConfig::builder()
            .use_vendor_backend(VendorBackendConfig::default())
            .build()
            .unwrap();
        let mut dispatcher = dispatcher(&sim, config);
        let mut out = Outbox::new();

        dispatcher.get(&mut out);
        assert_eq!(
            reports(&mut out).last(),
            Some(&Report::Failed(FailReason::VendorServiceUnavailable))
        );
    }

    #[test]
    fn test_resolvable_vendor_resolution_then_recheck() {
        let sim = SimulatedPlatform::new();
        sim.install_vendor();
        sim.set_vendor_connect(VendorConnect::Silent);
        sim.set_vendor_availability(Availability::Unavailable {
            code: 2,
            resolvable: true,
        });
        sim.set_launch_reply(Reply::Silent);
        sim.grant_all();
        let config = LocationConfig::builder()
            .use_vendor_backend(
                VendorBackendConfig::default().with_ask_to_resolve_vendor_service(true),
            )
            .use_default_backend(DefaultBackendConfig::default())
            .build()
            .unwrap();
        let mut dispatcher = dispatcher(&sim, config);
        let mut out = Outbox::new();

        dispatcher.get(&mut out);
        assert!(dispatcher.is_dialog_showing());
        assert!(sim.calls().contains(&SimCall::Launch(
            Surface::VendorServiceResolution { error_code: 2 },
            RequestCode::VendorServiceResolution
        )));

        sim.set_vendor_availability(Availability::Available);
        dispatcher.on_platform_result(
            RequestCode::VendorServiceResolution,
            ResultOutcome::Ok,
            &mut out,
        );
        assert!(!dispatcher.is_dialog_showing());
        assert_eq!(sim.availability_checks(), 2);
        assert_eq!(dispatcher.active_backend(), Some(BackendKind::Vendor));
    }

    #[test]
    fn test_resolution_cancelled_falls_back() {
        let sim = SimulatedPlatform::new();
        sim.install_vendor();
        sim.set_vendor_availability(Availability::Unavailable {
            code: 2,
            resolvable: true,
        });
        sim.set_launch_reply(Reply::Silent);
        sim.grant_all();
        let config = LocationConfig::builder()
            .use_vendor_backend(
                VendorBackendConfig::default().with_ask_to_resolve_vendor_service(true),
            )
            .use_default_backend(DefaultBackendConfig::default())
            .build()
            .unwrap();
        let mut dispatcher = dispatcher(&sim, config);
        let mut out = Outbox::new();

        dispatcher.get(&mut out);
        dispatcher.on_platform_result(
            RequestCode::VendorServiceResolution,
            ResultOutcome::Cancelled,
            &mut out,
        );
        assert_eq!(dispatcher.active_backend(), Some(BackendKind::Default));
    }

    #[test]
    fn test_vendor_fallback_report_switches_backend() {
        let sim = SimulatedPlatform::new();
        sim.install_vendor();
        sim.set_vendor_connect(VendorConnect::Silent);
        sim.grant_all();
        let mut dispatcher = dispatcher(&sim, vendor_and_default());
        let mut out = Outbox::new();

        dispatcher.get(&mut out);
        let vendor_ticket = dispatcher.active_ticket().unwrap();
        dispatcher.handle(
            &Event::Vendor {
                ticket: vendor_ticket,
                event: VendorEvent::ConnectionFailed { code: 1 },
            },
            &mut out,
        );
        assert_eq!(dispatcher.active_backend(), Some(BackendKind::Default));
        assert_ne!(dispatcher.active_ticket(), Some(vendor_ticket));
        assert!(reports(&mut out)
            .iter()
            .all(|r| !matches!(r, Report::Failed(_) | Report::Fallback { .. })));
    }

    #[test]
    fn test_stale_fix_from_replaced_backend_dropped() {
        let sim = SimulatedPlatform::new();
        sim.install_vendor();
        sim.set_vendor_connect(VendorConnect::Silent);
        sim.grant_all();
        let mut dispatcher = dispatcher(&sim, vendor_and_default());
        let mut out = Outbox::new();

        dispatcher.get(&mut out);
        let vendor_ticket = dispatcher.active_ticket().unwrap();
        dispatcher.handle(
            &Event::Vendor {
                ticket: vendor_ticket,
                event: VendorEvent::ConnectionFailed { code: 1 },
            },
            &mut out,
        );
        out.drain().for_each(drop);

        dispatcher.handle(
            &Event::Vendor {
                ticket: vendor_ticket,
                event: VendorEvent::Fix(Fix::new(1.0, 1.0, 1.0, FixSource::Vendor)),
            },
            &mut out,
        );
        dispatcher.handle(
            &Event::FixDelivered {
                ticket: vendor_ticket,
                fix: Fix::new(1.0, 1.0, 1.0, FixSource::Gnss),
            },
            &mut out,
        );
        assert!(out.is_empty());
    }

    #[test]
    fn test_cancel_retires_backend_and_drops_its_events() {
        let sim = SimulatedPlatform::new();
        sim.grant_all();
        let mut dispatcher = dispatcher(&sim, LocationConfig::default());
        let mut out = Outbox::new();

        dispatcher.get(&mut out);
        let ticket = dispatcher.active_ticket().unwrap();
        out.drain().for_each(drop);

        dispatcher.cancel();
        assert_eq!(dispatcher.active_backend(), None);
        assert_eq!(dispatcher.active_ticket(), None);
        assert_eq!(sim.registration(ticket), None);

        dispatcher.handle(
            &Event::FixDelivered {
                ticket,
                fix: Fix::new(1.0, 1.0, 1.0, FixSource::Gnss),
            },
            &mut out,
        );
        assert!(out.is_empty());
    }

    #[test]
    fn test_destroy_releases_vendor_backend_and_switch_timer() {
        let sim = SimulatedPlatform::new();
        sim.install_vendor();
        sim.set_vendor_connect(VendorConnect::Silent);
        sim.grant_all();
        let mut dispatcher = dispatcher(&sim, vendor_and_default());
        let mut out = Outbox::new();

        dispatcher.get(&mut out);
        assert_eq!(dispatcher.active_backend(), Some(BackendKind::Vendor));
        assert!(dispatcher.vendor_switch.is_armed());

        dispatcher.on_destroy();
        assert_eq!(dispatcher.active_backend(), None);
        assert!(!dispatcher.vendor_switch.is_armed());
        assert_eq!(sim.count(|c| matches!(c, SimCall::VendorDisconnect)), 1);
    }

    #[test]
    fn test_get_in_flight_ignored() {
        let sim = SimulatedPlatform::new();
        sim.grant_all();
        let mut dispatcher = dispatcher(&sim, LocationConfig::default());
        let mut out = Outbox::new();

        dispatcher.get(&mut out);
        let ticket = dispatcher.active_ticket();
        out.drain().for_each(drop);

        dispatcher.get(&mut out);
        assert!(out.is_empty());
        assert_eq!(dispatcher.active_ticket(), ticket);
    }

    #[test]
    fn test_get_after_outcome_starts_fresh() {
        let sim = SimulatedPlatform::new();
        sim.grant_all();
        let mut dispatcher = dispatcher(&sim, LocationConfig::default());
        let mut out = Outbox::new();

        dispatcher.get(&mut out);
        let first = dispatcher.active_ticket().unwrap();
        dispatcher.handle(
            &Event::FixDelivered {
                ticket: first,
                fix: Fix::new(1.0, 1.0, 1.0, FixSource::Gnss),
            },
            &mut out,
        );
        assert!(!dispatcher.is_in_flight());

        dispatcher.get(&mut out);
        let second = dispatcher.active_ticket().unwrap();
        assert!(second > first);
        assert_eq!(sim.registered_source(second), Some(SourceKind::Gnss));
    }

    #[test]
    fn test_destroy_clears_backend_and_is_idempotent() {
        let sim = SimulatedPlatform::new();
        sim.grant_all();
        let mut dispatcher = dispatcher(&sim, LocationConfig::default());
        let mut out = Outbox::new();

        dispatcher.get(&mut out);
        let ticket = dispatcher.active_ticket().unwrap();
        dispatcher.on_destroy();
        dispatcher.on_destroy();
        dispatcher.cancel();

        assert_eq!(dispatcher.active_backend(), None);
        assert_eq!(sim.registration(ticket), None);
        assert!(!dispatcher.is_waiting());
    }
}
