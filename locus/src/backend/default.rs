//! GNSS ↔ network backend.
//!
//! # State Machine
//!
//! ```text
//! Idle ──get──► Trying(Gnss) ──wait elapsed──► Trying(Network) ──wait elapsed──► Failed(Timeout)
//!   │                │                              │
//!   │ gnss off       └────────── fix ───────────────┴──► Succeeded | Tracking(source)
//!   ▼
//! EnablingGnss ──enabled──► Trying(Gnss)
//!        └─────declined / still off──► Trying(Network)
//! ```
//!
//! Network is only attempted when connectivity exists; otherwise the backend
//! fails with `NetworkUnavailable` straight away. A wait period is armed per
//! source and pauses with the host.

use crate::error::FailReason;
use crate::event::{
    DialogKind, Event, ProcessStage, RequestCode, ResultOutcome, SourceKind, Surface,
};
use crate::fix::Fix;
use crate::listener::{Outbox, Report};
use crate::platform::{UpdatePriority, UpdateRequest};
use crate::scheduler::{DelayedTask, TaskKind};

use super::{BackendContext, LocationBackend};
use crate::config::DefaultBackendConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    EnablingGnss,
    Trying(SourceKind),
    Tracking(SourceKind),
    Succeeded,
    Failed,
    Cancelled,
}

impl Phase {
    fn is_finished(&self) -> bool {
        matches!(self, Phase::Succeeded | Phase::Failed | Phase::Cancelled)
    }
}

#[derive(Debug, Clone, Copy)]
struct Registration {
    source: SourceKind,
    request: UpdateRequest,
}

/// Acquires a fix from GNSS, falling back to network positioning.
pub struct DefaultBackend {
    ctx: BackendContext,
    config: DefaultBackendConfig,
    phase: Phase,
    wait: DelayedTask,
    registration: Option<Registration>,
    /// Registration dropped by `on_pause`, restored by `on_resume`.
    suspended: Option<Registration>,
    waiting: bool,
    dialog_showing: bool,
    location_already_available: bool,
}

impl DefaultBackend {
    /// Create an idle backend.
    pub fn new(ctx: BackendContext, config: DefaultBackendConfig) -> Self {
        let wait = DelayedTask::new(TaskKind::SourceWait, ctx.ticket, ctx.events.clone());
        Self {
            ctx,
            config,
            phase: Phase::Idle,
            wait,
            registration: None,
            suspended: None,
            waiting: false,
            dialog_showing: false,
            location_already_available: false,
        }
    }

    /// Whether a cached fix was delivered without waiting for a live one.
    pub fn location_already_available(&self) -> bool {
        self.location_already_available
    }

    /// Source currently being tried or tracked.
    pub fn current_source(&self) -> Option<SourceKind> {
        match self.phase {
            Phase::Trying(source) | Phase::Tracking(source) => Some(source),
            _ => None,
        }
    }

    fn try_source(&mut self, source: SourceKind, out: &mut Outbox) {
        let sources = self.ctx.platform.sources.clone();
        if source == SourceKind::Network && !sources.is_network_connected() {
            tracing::info!(ticket = %self.ctx.ticket, "No network connectivity");
            self.fail(FailReason::NetworkUnavailable, out);
            return;
        }

        tracing::info!(ticket = %self.ctx.ticket, source = %source, "Trying source");
        self.phase = Phase::Trying(source);
        self.waiting = true;
        out.stage(match source {
            SourceKind::Gnss => ProcessStage::UsingGnss,
            SourceKind::Network => ProcessStage::UsingNetwork,
        });

        if let Some(fix) = sources.last_known_fix(source) {
            if self.ctx.config.acceptance.accepts(&fix) {
                tracing::debug!(source = %source, "Using last known fix");
                self.location_already_available = true;
                self.deliver(fix, out);
                return;
            }
            tracing::debug!(source = %source, "Last known fix not usable");
        }

        if self.register(source, UpdateRequest::immediate(UpdatePriority::HighAccuracy), out) {
            self.wait.arm(self.config.wait_for(source));
        }
    }

    /// Register for live updates. Returns false if the acquisition moved on.
    fn register(&mut self, source: SourceKind, request: UpdateRequest, out: &mut Outbox) -> bool {
        match self
            .ctx
            .platform
            .sources
            .request_updates(self.ctx.ticket, source, &request)
        {
            Ok(()) => {
                self.registration = Some(Registration { source, request });
                true
            }
            Err(e) => {
                tracing::warn!(ticket = %self.ctx.ticket, source = %source, error = %e, "Update registration failed");
                self.unregister();
                match source {
                    SourceKind::Gnss => self.try_source(SourceKind::Network, out),
                    SourceKind::Network => self.fail(FailReason::NetworkUnavailable, out),
                }
                false
            }
        }
    }

    fn unregister(&mut self) {
        if self.registration.take().is_some() {
            self.ctx.platform.sources.remove_updates(self.ctx.ticket);
        }
        self.suspended = None;
    }

    fn deliver(&mut self, fix: Fix, out: &mut Outbox) {
        let Some(source) = self.current_source() else {
            return;
        };
        self.wait.stop();
        self.waiting = false;
        out.fix(fix);

        if self.ctx.config.keep_tracking {
            if let Phase::Tracking(_) = self.phase {
                return;
            }
            let request = self.ctx.config.continuous_request(UpdatePriority::HighAccuracy);
            if self.register(source, request, out) {
                self.phase = Phase::Tracking(source);
            }
        } else {
            self.unregister();
            self.phase = Phase::Succeeded;
        }
    }

    fn on_wait_elapsed(&mut self, out: &mut Outbox) {
        let Phase::Trying(source) = self.phase else {
            return;
        };
        self.unregister();
        match source {
            SourceKind::Gnss => {
                tracing::info!(ticket = %self.ctx.ticket, "GNSS wait elapsed, falling back to network");
                self.try_source(SourceKind::Network, out);
            }
            SourceKind::Network => {
                tracing::info!(ticket = %self.ctx.ticket, "Network wait elapsed");
                self.fail(FailReason::Timeout, out);
            }
        }
    }

    fn on_enable_dialog(&mut self, accepted: bool, out: &mut Outbox) {
        if self.phase != Phase::EnablingGnss || !self.dialog_showing {
            return;
        }
        self.dialog_showing = false;
        if !accepted {
            tracing::info!("Enable GNSS declined");
            self.try_source(SourceKind::Network, out);
            return;
        }
        let launched = self
            .ctx
            .platform
            .ui
            .launch(Surface::SourceSettings(SourceKind::Gnss), RequestCode::EnableGnss);
        if let Err(e) = launched {
            tracing::warn!(error = %e, "Could not open GNSS settings");
            self.try_source(SourceKind::Network, out);
        }
    }

    fn fail(&mut self, reason: FailReason, out: &mut Outbox) {
        self.release();
        self.phase = Phase::Failed;
        tracing::info!(ticket = %self.ctx.ticket, reason = reason.as_str(), "Default backend failed");
        out.failed(reason);
    }

    fn release(&mut self) {
        self.wait.stop();
        self.unregister();
        if self.dialog_showing {
            self.ctx.platform.ui.dismiss_dialog(DialogKind::EnableGnss);
            self.dialog_showing = false;
        }
        self.waiting = false;
    }
}

impl LocationBackend for DefaultBackend {
    fn name(&self) -> &'static str {
        "default"
    }

    fn get(&mut self, out: &mut Outbox) {
        if self.phase != Phase::Idle {
            tracing::debug!(ticket = %self.ctx.ticket, "Backend already started, ignoring get");
            return;
        }

        let platform = &self.ctx.platform;
        if platform.sources.is_enabled(SourceKind::Gnss) {
            self.try_source(SourceKind::Gnss, out);
        } else if self.config.ask_to_enable_gnss && platform.ui.context().has_foreground() {
            tracing::info!(ticket = %self.ctx.ticket, "GNSS disabled, asking to enable");
            self.phase = Phase::EnablingGnss;
            self.waiting = true;
            self.dialog_showing = true;
            platform
                .ui
                .show_dialog(DialogKind::EnableGnss, &self.config.enable_gnss_dialog);
        } else {
            tracing::info!(ticket = %self.ctx.ticket, "GNSS disabled, using network");
            self.try_source(SourceKind::Network, out);
        }
    }

    fn cancel(&mut self) {
        if self.phase == Phase::Cancelled {
            return;
        }
        self.release();
        if !self.phase.is_finished() {
            tracing::debug!(ticket = %self.ctx.ticket, "Default backend cancelled");
        }
        self.phase = Phase::Cancelled;
    }

    fn on_pause(&mut self) {
        if let Some(registration) = self.registration.take() {
            self.ctx.platform.sources.remove_updates(self.ctx.ticket);
            self.suspended = Some(registration);
        }
        self.wait.pause();
    }

    fn on_resume(&mut self, out: &mut Outbox) {
        if let Some(Registration { source, request }) = self.suspended.take() {
            if !self.register(source, request, out) {
                return;
            }
        }
        self.wait.resume();

        if self.phase == Phase::EnablingGnss
            && self.dialog_showing
            && self.ctx.platform.sources.is_enabled(SourceKind::Gnss)
        {
            tracing::info!("GNSS enabled while in background");
            self.ctx.platform.ui.dismiss_dialog(DialogKind::EnableGnss);
            self.dialog_showing = false;
            self.try_source(SourceKind::Gnss, out);
        }
    }

    fn on_destroy(&mut self) {
        self.cancel();
    }

    fn on_platform_result(
        &mut self,
        request_code: RequestCode,
        outcome: ResultOutcome,
        out: &mut Outbox,
    ) {
        if request_code != RequestCode::EnableGnss || self.phase != Phase::EnablingGnss {
            return;
        }
        let enabled = self.ctx.platform.sources.is_enabled(SourceKind::Gnss);
        tracing::debug!(?outcome, enabled, "GNSS settings closed");
        if enabled {
            self.try_source(SourceKind::Gnss, out);
        } else {
            self.try_source(SourceKind::Network, out);
        }
    }

    fn handle(&mut self, event: &Event, out: &mut Outbox) {
        match event {
            Event::DialogResult {
                dialog: DialogKind::EnableGnss,
                accepted,
            } => self.on_enable_dialog(*accepted, out),
            Event::TimerFired(fired) => {
                if self.wait.accept(fired) {
                    self.on_wait_elapsed(out);
                }
            }
            Event::FixDelivered { fix, .. } => {
                if self.registration.is_some() && self.current_source().is_some() {
                    self.deliver(fix.clone(), out);
                } else {
                    tracing::debug!(ticket = %self.ctx.ticket, "Fix with no active registration, dropping");
                }
            }
            Event::SourceStatus { status, .. } => {
                if !self.phase.is_finished() {
                    out.push(Report::Status(*status));
                }
            }
            Event::BackendFailed { reason, .. } => {
                if !self.phase.is_finished() {
                    self.fail(*reason, out);
                }
            }
            _ => {}
        }
    }

    fn is_waiting(&self) -> bool {
        self.waiting
    }

    fn is_dialog_showing(&self) -> bool {
        self.dialog_showing
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LocationConfig;
    use crate::event::{event_channel, Ticket, WeakEventSender};
    use crate::fix::FixSource;
    use crate::platform::UiContext;
    use crate::sim::{Reply, SimCall, SimulatedPlatform};
    use std::sync::Arc;
    use std::time::Duration;

    fn backend_with(
        sim: &Arc<SimulatedPlatform>,
        config: LocationConfig,
        events: WeakEventSender,
    ) -> DefaultBackend {
        let backend_config = config.default_backend.clone().unwrap_or_default();
        let ctx = BackendContext {
            config: Arc::new(config),
            platform: sim.platform(),
            ticket: Ticket::new(1),
            events,
        };
        DefaultBackend::new(ctx, backend_config)
    }

    fn backend(sim: &Arc<SimulatedPlatform>) -> DefaultBackend {
        backend_with(sim, LocationConfig::default(), WeakEventSender::detached())
    }

    fn reports(out: &mut Outbox) -> Vec<Report> {
        out.drain().collect()
    }

    #[test]
    fn test_gnss_enabled_tries_gnss() {
        let sim = SimulatedPlatform::new();
        let mut backend = backend(&sim);
        let mut out = Outbox::new();

        backend.get(&mut out);
        assert_eq!(backend.current_source(), Some(SourceKind::Gnss));
        assert!(backend.is_waiting());
        assert_eq!(reports(&mut out), vec![Report::Stage(ProcessStage::UsingGnss)]);
        assert_eq!(sim.registered_source(Ticket::new(1)), Some(SourceKind::Gnss));
    }

    #[test]
    fn test_gnss_disabled_without_asking_goes_to_network() {
        let sim = SimulatedPlatform::new();
        sim.set_source_enabled(SourceKind::Gnss, false);
        let config = LocationConfig::builder()
            .use_default_backend(DefaultBackendConfig::default().with_ask_to_enable_gnss(false))
            .build()
            .unwrap();
        let mut backend = backend_with(&sim, config, WeakEventSender::detached());
        let mut out = Outbox::new();

        backend.get(&mut out);
        assert_eq!(backend.current_source(), Some(SourceKind::Network));
        assert_eq!(
            reports(&mut out),
            vec![Report::Stage(ProcessStage::UsingNetwork)]
        );
        assert_eq!(sim.count(|c| matches!(c, SimCall::ShowDialog(_))), 0);
    }

    #[test]
    fn test_gnss_disabled_background_skips_dialog() {
        let sim = SimulatedPlatform::new();
        sim.set_source_enabled(SourceKind::Gnss, false);
        sim.set_ui(UiContext::Background);
        let mut backend = backend(&sim);
        let mut out = Outbox::new();

        backend.get(&mut out);
        assert_eq!(backend.current_source(), Some(SourceKind::Network));
        assert!(!backend.is_dialog_showing());
    }

    #[test]
    fn test_enable_dialog_declined_falls_to_network() {
        let sim = SimulatedPlatform::new();
        sim.set_source_enabled(SourceKind::Gnss, false);
        let mut backend = backend(&sim);
        let mut out = Outbox::new();

        backend.get(&mut out);
        assert!(backend.is_dialog_showing());
        assert!(out.is_empty());

        backend.handle(
            &Event::DialogResult {
                dialog: DialogKind::EnableGnss,
                accepted: false,
            },
            &mut out,
        );
        assert!(!backend.is_dialog_showing());
        assert_eq!(backend.current_source(), Some(SourceKind::Network));
    }

    #[test]
    fn test_enable_dialog_accepted_then_enabled() {
        let sim = SimulatedPlatform::new();
        sim.set_source_enabled(SourceKind::Gnss, false);
        sim.set_launch_reply(Reply::Silent);
        let mut backend = backend(&sim);
        let mut out = Outbox::new();

        backend.get(&mut out);
        backend.handle(
            &Event::DialogResult {
                dialog: DialogKind::EnableGnss,
                accepted: true,
            },
            &mut out,
        );
        assert!(sim.calls().contains(&SimCall::Launch(
            Surface::SourceSettings(SourceKind::Gnss),
            RequestCode::EnableGnss
        )));

        sim.set_source_enabled(SourceKind::Gnss, true);
        backend.on_platform_result(RequestCode::EnableGnss, ResultOutcome::Ok, &mut out);
        assert_eq!(backend.current_source(), Some(SourceKind::Gnss));
    }

    #[test]
    fn test_settings_closed_still_disabled_uses_network() {
        let sim = SimulatedPlatform::new();
        sim.set_source_enabled(SourceKind::Gnss, false);
        sim.set_launch_reply(Reply::Silent);
        let mut backend = backend(&sim);
        let mut out = Outbox::new();

        backend.get(&mut out);
        backend.handle(
            &Event::DialogResult {
                dialog: DialogKind::EnableGnss,
                accepted: true,
            },
            &mut out,
        );
        backend.on_platform_result(RequestCode::EnableGnss, ResultOutcome::Cancelled, &mut out);
        assert_eq!(backend.current_source(), Some(SourceKind::Network));
    }

    #[test]
    fn test_resume_detects_gnss_enabled_out_of_band() {
        let sim = SimulatedPlatform::new();
        sim.set_source_enabled(SourceKind::Gnss, false);
        let mut backend = backend(&sim);
        let mut out = Outbox::new();

        backend.get(&mut out);
        backend.on_pause();
        sim.set_source_enabled(SourceKind::Gnss, true);
        backend.on_resume(&mut out);

        assert!(!backend.is_dialog_showing());
        assert_eq!(backend.current_source(), Some(SourceKind::Gnss));
        assert!(sim
            .calls()
            .contains(&SimCall::DismissDialog(DialogKind::EnableGnss)));
    }

    #[test]
    fn test_network_without_connectivity_fails_immediately() {
        let sim = SimulatedPlatform::new();
        sim.set_source_enabled(SourceKind::Gnss, false);
        sim.set_network_connected(false);
        sim.set_ui(UiContext::Detached);
        let mut backend = backend(&sim);
        let mut out = Outbox::new();

        backend.get(&mut out);
        assert_eq!(
            reports(&mut out),
            vec![Report::Failed(FailReason::NetworkUnavailable)]
        );
        assert!(!backend.is_waiting());
        assert_eq!(sim.count(|c| matches!(c, SimCall::RequestUpdates(..))), 0);
    }

    #[test]
    fn test_usable_last_known_fix_one_shot() {
        let sim = SimulatedPlatform::new();
        let cached = Fix::new(10.0, 20.0, 3.0, FixSource::Gnss);
        sim.set_last_known(SourceKind::Gnss, Some(cached.clone()));
        let mut backend = backend(&sim);
        let mut out = Outbox::new();

        backend.get(&mut out);
        assert!(backend.location_already_available());
        assert_eq!(
            reports(&mut out),
            vec![Report::Stage(ProcessStage::UsingGnss), Report::Fix(cached)]
        );
        assert!(!backend.is_waiting());
        assert_eq!(sim.count(|c| matches!(c, SimCall::RequestUpdates(..))), 0);
    }

    #[test]
    fn test_inaccurate_last_known_fix_ignored() {
        let sim = SimulatedPlatform::new();
        sim.set_last_known(
            SourceKind::Gnss,
            Some(Fix::new(10.0, 20.0, 50.0, FixSource::Gnss)),
        );
        let mut backend = backend(&sim);
        let mut out = Outbox::new();

        backend.get(&mut out);
        assert!(!backend.location_already_available());
        assert!(backend.is_waiting());
        assert_eq!(sim.registered_source(Ticket::new(1)), Some(SourceKind::Gnss));
    }

    #[test]
    fn test_keep_tracking_reregisters_continuously() {
        let sim = SimulatedPlatform::new();
        let config = LocationConfig::builder()
            .keep_tracking(true)
            .required_update_interval(Duration::from_secs(10))
            .use_default_backend(DefaultBackendConfig::default())
            .build()
            .unwrap();
        let mut backend = backend_with(&sim, config, WeakEventSender::detached());
        let mut out = Outbox::new();

        backend.get(&mut out);
        let fix = Fix::new(1.0, 1.0, 2.0, FixSource::Gnss);
        backend.handle(
            &Event::FixDelivered {
                ticket: Ticket::new(1),
                fix: fix.clone(),
            },
            &mut out,
        );
        let request = sim.registration(Ticket::new(1)).expect("still registered");
        assert_eq!(request.interval, Duration::from_secs(10));

        backend.handle(
            &Event::FixDelivered {
                ticket: Ticket::new(1),
                fix: fix.clone(),
            },
            &mut out,
        );
        let fixes = reports(&mut out)
            .into_iter()
            .filter(|r| matches!(r, Report::Fix(_)))
            .count();
        assert_eq!(fixes, 2);
    }

    #[test]
    fn test_one_shot_fix_unregisters() {
        let sim = SimulatedPlatform::new();
        let mut backend = backend(&sim);
        let mut out = Outbox::new();

        backend.get(&mut out);
        backend.handle(
            &Event::FixDelivered {
                ticket: Ticket::new(1),
                fix: Fix::new(1.0, 1.0, 2.0, FixSource::Gnss),
            },
            &mut out,
        );
        assert_eq!(sim.registration(Ticket::new(1)), None);

        // Late duplicate from the platform.
        out.drain().for_each(drop);
        backend.handle(
            &Event::FixDelivered {
                ticket: Ticket::new(1),
                fix: Fix::new(1.0, 1.0, 2.0, FixSource::Gnss),
            },
            &mut out,
        );
        assert!(out.is_empty());
    }

    #[test]
    fn test_pause_releases_and_resume_restores_registration() {
        let sim = SimulatedPlatform::new();
        let mut backend = backend(&sim);
        let mut out = Outbox::new();

        backend.get(&mut out);
        backend.on_pause();
        assert_eq!(sim.registration(Ticket::new(1)), None);
        assert_eq!(backend.current_source(), Some(SourceKind::Gnss));

        backend.on_resume(&mut out);
        assert_eq!(sim.registered_source(Ticket::new(1)), Some(SourceKind::Gnss));
    }

    #[test]
    fn test_cancel_is_idempotent() {
        let sim = SimulatedPlatform::new();
        let mut backend = backend(&sim);
        let mut out = Outbox::new();

        backend.get(&mut out);
        backend.cancel();
        backend.cancel();
        backend.on_destroy();
        assert_eq!(sim.count(|c| matches!(c, SimCall::RemoveUpdates(_))), 1);
        assert!(!backend.is_waiting());
    }

    #[test]
    fn test_source_status_passes_through() {
        let sim = SimulatedPlatform::new();
        let mut backend = backend(&sim);
        let mut out = Outbox::new();
        backend.get(&mut out);
        out.drain().for_each(drop);

        let status = crate::event::SourceStatus::Disabled {
            source: SourceKind::Gnss,
        };
        backend.handle(
            &Event::SourceStatus {
                ticket: Ticket::new(1),
                status,
            },
            &mut out,
        );
        assert_eq!(reports(&mut out), vec![Report::Status(status)]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_gnss_timeout_then_network_timeout() {
        let sim = SimulatedPlatform::new();
        let (tx, mut rx) = event_channel();
        let config = LocationConfig::builder()
            .use_default_backend(
                DefaultBackendConfig::default()
                    .with_gnss_wait(Duration::from_millis(100))
                    .with_network_wait(Duration::from_millis(200)),
            )
            .build()
            .unwrap();
        let mut backend = backend_with(&sim, config, tx.downgrade());
        let mut out = Outbox::new();

        backend.get(&mut out);
        tokio::time::sleep(Duration::from_millis(100)).await;
        let fired = rx.recv().await.expect("gnss wait fired");
        backend.handle(&fired, &mut out);
        assert_eq!(backend.current_source(), Some(SourceKind::Network));

        tokio::time::sleep(Duration::from_millis(200)).await;
        let fired = rx.recv().await.expect("network wait fired");
        backend.handle(&fired, &mut out);

        let reports = reports(&mut out);
        assert_eq!(
            reports,
            vec![
                Report::Stage(ProcessStage::UsingGnss),
                Report::Stage(ProcessStage::UsingNetwork),
                Report::Failed(FailReason::Timeout),
            ]
        );

        // A duplicate firing never sends the backend back to GNSS.
        backend.handle(&fired, &mut out);
        assert!(out.is_empty());
        assert_eq!(backend.current_source(), None);
    }
}
