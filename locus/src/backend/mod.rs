//! Location backends.
//!
//! A backend knows how to obtain a fix from one family of sources:
//!
//! - [`DefaultBackend`] - GNSS first, network as fallback
//! - [`VendorBackend`] - a vendor fused-location service with its own
//!   connection and settings-resolution flow
//!
//! Both implement [`LocationBackend`], as does the
//! [`Dispatcher`](crate::dispatcher::Dispatcher) that sequences them. An
//! instance serves exactly one activation: it is created with a fresh
//! [`Ticket`], asked to `get` once, driven through any number of lifecycle
//! events, and destroyed. Results leave a backend only as [`Report`]s pushed
//! into the [`Outbox`] passed to each call.
//!
//! [`Report`]: crate::listener::Report

mod default;
mod vendor;

use std::sync::Arc;

use crate::config::{DefaultBackendConfig, LocationConfig, VendorBackendConfig};
use crate::event::{Event, RequestCode, ResultOutcome, Ticket, WeakEventSender};
use crate::listener::Outbox;
use crate::platform::{Platform, VendorService};

pub use default::DefaultBackend;
pub use vendor::VendorBackend;

/// Capabilities shared by every backend and by the dispatcher.
pub trait LocationBackend: Send {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    /// Start acquiring. Called at most once per instance.
    fn get(&mut self, out: &mut Outbox);

    /// Abandon the acquisition and release registrations. Idempotent.
    fn cancel(&mut self);

    /// The host went to the background.
    fn on_pause(&mut self);

    /// The host returned to the foreground.
    fn on_resume(&mut self, out: &mut Outbox);

    /// Final teardown. Idempotent.
    fn on_destroy(&mut self);

    /// A result-returning surface completed.
    fn on_platform_result(
        &mut self,
        request_code: RequestCode,
        outcome: ResultOutcome,
        out: &mut Outbox,
    );

    /// Any other event addressed to this backend.
    fn handle(&mut self, event: &Event, out: &mut Outbox);

    /// Still waiting for the first fix.
    fn is_waiting(&self) -> bool;

    /// A dialog or resolution surface owned by this backend is on screen.
    fn is_dialog_showing(&self) -> bool;
}

/// Everything a backend activation needs.
#[derive(Debug, Clone)]
pub struct BackendContext {
    /// Shared, read-only configuration.
    pub config: Arc<LocationConfig>,
    /// Collaborators.
    pub platform: Platform,
    /// Identity of this activation.
    pub ticket: Ticket,
    /// Where this backend's timers post their firings.
    pub events: WeakEventSender,
}

/// Creates backend instances on behalf of the dispatcher.
pub trait BackendFactory: Send + Sync {
    /// Create a GNSS/network backend.
    fn create_default(
        &self,
        ctx: BackendContext,
        config: DefaultBackendConfig,
    ) -> Box<dyn LocationBackend>;

    /// Create a vendor-service backend.
    fn create_vendor(
        &self,
        ctx: BackendContext,
        config: VendorBackendConfig,
        service: Arc<dyn VendorService>,
    ) -> Box<dyn LocationBackend>;
}

/// Factory producing [`DefaultBackend`] and [`VendorBackend`].
#[derive(Debug, Clone, Copy, Default)]
pub struct StandardBackends;

impl BackendFactory for StandardBackends {
    fn create_default(
        &self,
        ctx: BackendContext,
        config: DefaultBackendConfig,
    ) -> Box<dyn LocationBackend> {
        Box::new(DefaultBackend::new(ctx, config))
    }

    fn create_vendor(
        &self,
        ctx: BackendContext,
        config: VendorBackendConfig,
        service: Arc<dyn VendorService>,
    ) -> Box<dyn LocationBackend> {
        Box::new(VendorBackend::new(ctx, config, service))
    }
}
