//! Vendor fused-location backend.
//!
//! Drives the vendor client through connect → (cached fix) → settings check
//! → (settings resolution) → live updates. Connection problems are handed to
//! the dispatcher as [`Report::Fallback`] rather than reported to the caller,
//! so the dispatcher can switch to the default backend.
//!
//! Suspension and settings failure are handled differently on purpose:
//! suspension has a retry budget (`suspended_connection_retry_limit`), while
//! a failed settings resolution is governed by a single flag.

use std::sync::Arc;

use crate::config::VendorBackendConfig;
use crate::error::FailReason;
use crate::event::{Event, RequestCode, ResultOutcome, SettingsOutcome, Surface, VendorEvent};
use crate::fix::Fix;
use crate::listener::{Outbox, Report};
use crate::platform::{UpdateRequest, VendorService};

use super::{BackendContext, LocationBackend};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    Connecting,
    CheckingSettings,
    ResolvingSettings,
    Requesting,
    Tracking,
    Succeeded,
    Failed,
    Cancelled,
}

impl Phase {
    fn is_finished(&self) -> bool {
        matches!(self, Phase::Succeeded | Phase::Failed | Phase::Cancelled)
    }
}

/// Acquires a fix through a vendor fused-location service.
pub struct VendorBackend {
    ctx: BackendContext,
    config: VendorBackendConfig,
    service: Arc<dyn VendorService>,
    phase: Phase,
    waiting: bool,
    updates_registered: bool,
    /// Disconnected by `on_pause`, reconnect on resume.
    paused: bool,
    suspended_retries: u32,
    location_already_available: bool,
}

impl VendorBackend {
    /// Create an idle backend.
    pub fn new(
        ctx: BackendContext,
        config: VendorBackendConfig,
        service: Arc<dyn VendorService>,
    ) -> Self {
        Self {
            ctx,
            config,
            service,
            phase: Phase::Idle,
            waiting: false,
            updates_registered: false,
            paused: false,
            suspended_retries: 0,
            location_already_available: false,
        }
    }

    /// Whether a cached fix was delivered without waiting for a live one.
    pub fn location_already_available(&self) -> bool {
        self.location_already_available
    }

    /// Reconnects used so far after suspensions.
    pub fn suspended_retries(&self) -> u32 {
        self.suspended_retries
    }

    fn update_request(&self) -> UpdateRequest {
        if self.ctx.config.keep_tracking {
            self.ctx.config.continuous_request(self.config.priority)
        } else {
            UpdateRequest::immediate(self.config.priority)
        }
    }

    fn on_connected(&mut self, out: &mut Outbox) {
        match self.phase {
            Phase::Connecting => {
                tracing::info!(ticket = %self.ctx.ticket, "Vendor service connected");
                if !self.config.ignore_last_known_fix {
                    if let Some(fix) = self.service.last_known_fix() {
                        if self.ctx.config.acceptance.accepts(&fix) {
                            tracing::debug!("Using vendor last known fix");
                            self.location_already_available = true;
                            self.deliver(fix, out);
                            if !self.ctx.config.keep_tracking {
                                return;
                            }
                        }
                    }
                }
                self.location_required(out);
            }
            // Reconnected after a pause or a suspension.
            Phase::CheckingSettings => self.location_required(out),
            Phase::Requesting | Phase::Tracking => self.request_updates(out),
            _ => tracing::debug!(ticket = %self.ctx.ticket, "Connected in {:?}, ignoring", self.phase),
        }
    }

    fn location_required(&mut self, out: &mut Outbox) {
        if self.config.ask_to_change_settings {
            self.phase = Phase::CheckingSettings;
            self.service.check_settings(self.ctx.ticket, &self.update_request());
        } else {
            self.request_updates(out);
        }
    }

    fn request_updates(&mut self, out: &mut Outbox) {
        match self
            .service
            .request_updates(self.ctx.ticket, &self.update_request())
        {
            Ok(()) => {
                self.updates_registered = true;
                if self.phase != Phase::Tracking {
                    self.phase = Phase::Requesting;
                }
                tracing::debug!(ticket = %self.ctx.ticket, "Vendor updates requested");
            }
            Err(e) => {
                tracing::warn!(ticket = %self.ctx.ticket, error = %e, "Vendor update request failed");
                self.terminate(FailReason::VendorConnectionFailed, out);
            }
        }
    }

    fn on_settings_checked(&mut self, outcome: SettingsOutcome, out: &mut Outbox) {
        if self.phase != Phase::CheckingSettings {
            return;
        }
        tracing::debug!(?outcome, "Vendor settings checked");
        match outcome {
            SettingsOutcome::Satisfied => self.request_updates(out),
            SettingsOutcome::Resolvable => {
                let context = self.ctx.platform.ui.context();
                if context.can_launch_for_result() {
                    let launched = self
                        .ctx
                        .platform
                        .ui
                        .launch(Surface::VendorSettingsResolution, RequestCode::VendorSettings);
                    match launched {
                        Ok(()) => self.phase = Phase::ResolvingSettings,
                        Err(e) => {
                            tracing::warn!(error = %e, "Could not show settings resolution");
                            self.settings_failed(e.into(), out);
                        }
                    }
                } else if context.has_foreground() {
                    self.settings_failed(FailReason::ContextWrongType, out);
                } else {
                    self.settings_failed(FailReason::ContextDetached, out);
                }
            }
            SettingsOutcome::Unresolvable => {
                self.settings_failed(FailReason::VendorSettingsDialogFailed, out)
            }
        }
    }

    fn settings_failed(&mut self, reason: FailReason, out: &mut Outbox) {
        tracing::info!(reason = reason.as_str(), "Vendor settings not satisfied");
        if self.config.fail_on_settings_resolution_failure {
            self.terminate(reason, out);
        } else if self.service.is_connected() {
            self.request_updates(out);
        } else {
            self.terminate(reason, out);
        }
    }

    fn on_suspended(&mut self, cause: i32, out: &mut Outbox) {
        if !self.config.fail_on_connection_suspended
            && self.suspended_retries < self.config.suspended_connection_retry_limit
        {
            self.suspended_retries += 1;
            tracing::info!(
                cause,
                attempt = self.suspended_retries,
                limit = self.config.suspended_connection_retry_limit,
                "Vendor connection suspended, reconnecting"
            );
            self.updates_registered = false;
            self.service.connect(self.ctx.ticket);
        } else {
            tracing::info!(cause, "Vendor connection suspended");
            self.fall_back(FailReason::VendorConnectionFailed, out);
        }
    }

    fn deliver(&mut self, fix: Fix, out: &mut Outbox) {
        self.waiting = false;
        out.fix(fix);
        if self.ctx.config.keep_tracking {
            self.phase = Phase::Tracking;
        } else {
            self.release();
            self.phase = Phase::Succeeded;
        }
    }

    /// Terminal failure, routed according to `fallback_to_default_on_vendor_failure`.
    fn terminate(&mut self, reason: FailReason, out: &mut Outbox) {
        if self.config.fallback_to_default_on_vendor_failure {
            self.fall_back(reason, out);
        } else {
            self.release();
            self.phase = Phase::Failed;
            tracing::info!(ticket = %self.ctx.ticket, reason = reason.as_str(), "Vendor backend failed");
            out.failed(reason);
        }
    }

    fn fall_back(&mut self, reason: FailReason, out: &mut Outbox) {
        self.release();
        self.phase = Phase::Failed;
        out.push(Report::Fallback { reason });
    }

    fn release(&mut self) {
        if self.updates_registered {
            self.service.remove_updates(self.ctx.ticket);
            self.updates_registered = false;
        }
        if self.phase != Phase::Idle && !self.phase.is_finished() {
            self.service.disconnect();
        }
        self.waiting = false;
        self.paused = false;
    }
}

impl LocationBackend for VendorBackend {
    fn name(&self) -> &'static str {
        "vendor"
    }

    fn get(&mut self, out: &mut Outbox) {
        if self.phase != Phase::Idle {
            tracing::debug!(ticket = %self.ctx.ticket, "Backend already started, ignoring get");
            return;
        }
        if !self.ctx.platform.ui.context().is_attached() {
            self.terminate(FailReason::ContextDetached, out);
            return;
        }
        self.phase = Phase::Connecting;
        self.waiting = true;
        self.service.connect(self.ctx.ticket);
    }

    fn cancel(&mut self) {
        if self.phase == Phase::Cancelled {
            return;
        }
        self.release();
        self.phase = Phase::Cancelled;
    }

    fn on_pause(&mut self) {
        if self.phase.is_finished() || self.phase == Phase::Idle || self.is_dialog_showing() {
            return;
        }
        if self.updates_registered {
            self.service.remove_updates(self.ctx.ticket);
            self.updates_registered = false;
        }
        self.service.disconnect();
        self.paused = true;
    }

    fn on_resume(&mut self, _out: &mut Outbox) {
        if !self.paused || self.is_dialog_showing() {
            return;
        }
        self.paused = false;
        if self.waiting || self.ctx.config.keep_tracking {
            self.service.connect(self.ctx.ticket);
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
        if request_code != RequestCode::VendorSettings || self.phase != Phase::ResolvingSettings {
            return;
        }
        match outcome {
            ResultOutcome::Ok => self.request_updates(out),
            ResultOutcome::Cancelled => self.settings_failed(FailReason::VendorSettingsDenied, out),
        }
    }

    fn handle(&mut self, event: &Event, out: &mut Outbox) {
        if self.phase.is_finished() {
            tracing::debug!(ticket = %self.ctx.ticket, event = event.event_type(), "Vendor backend finished, dropping event");
            return;
        }
        match event {
            Event::Vendor { event, .. } => match event {
                VendorEvent::Connected => self.on_connected(out),
                VendorEvent::ConnectionSuspended { cause } => self.on_suspended(*cause, out),
                VendorEvent::ConnectionFailed { code } => {
                    tracing::info!(code, "Vendor connection failed");
                    self.fall_back(FailReason::VendorConnectionFailed, out);
                }
                VendorEvent::SettingsChecked(outcome) => self.on_settings_checked(*outcome, out),
                VendorEvent::Fix(fix) => {
                    if self.updates_registered {
                        self.deliver(fix.clone(), out);
                    }
                }
            },
            Event::BackendFailed { reason, .. } => self.terminate(*reason, out),
            _ => {}
        }
    }

    fn is_waiting(&self) -> bool {
        self.waiting
    }

    fn is_dialog_showing(&self) -> bool {
        self.phase == Phase::ResolvingSettings
    }
}
