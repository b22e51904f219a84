//! Host integration surface.
//!
//! [`LocationManager`] is what a host application talks to: it owns the
//! [`Dispatcher`], funnels every stimulus through [`LocationManager::handle`],
//! and forwards the resulting reports to the caller's [`LocationListener`].
//!
//! It also enforces the outcome contract: one terminal outcome per `Get`
//! (a failure, or the first fix when not tracking). Anything a backend
//! produces after that is dropped until the next `Get`.
//!
//! [`LocationSession`] runs a manager on a tokio task fed by an event channel,
//! which is how timers and platform callbacks reach it.

use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::backend::{BackendFactory, LocationBackend, StandardBackends};
use crate::config::{ConfigError, LocationConfig};
use crate::dispatcher::{BackendKind, Dispatcher};
use crate::event::{
    event_channel, DialogKind, Event, EventSender, RequestCode, ResultOutcome, WeakEventSender,
};
use crate::listener::{deliver, LocationListener, Outbox};
use crate::platform::Platform;

/// Facade owning the dispatcher and the caller's listener.
pub struct LocationManager {
    dispatcher: Dispatcher,
    listener: Box<dyn LocationListener>,
    keep_tracking: bool,
    /// Set once the current request delivered its terminal outcome.
    concluded: bool,
}

impl LocationManager {
    /// Create a manager with the standard backends.
    ///
    /// `events` is where timers owned by the request post their firings;
    /// pass [`WeakEventSender::detached`] to drive timers by hand.
    pub fn new(
        config: LocationConfig,
        platform: Platform,
        listener: Box<dyn LocationListener>,
        events: WeakEventSender,
    ) -> Result<Self, ConfigError> {
        Self::with_factory(config, platform, listener, events, Arc::new(StandardBackends))
    }

    /// Create a manager with a custom backend factory.
    pub fn with_factory(
        config: LocationConfig,
        platform: Platform,
        listener: Box<dyn LocationListener>,
        events: WeakEventSender,
        factory: Arc<dyn BackendFactory>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let keep_tracking = config.keep_tracking;
        Ok(Self {
            dispatcher: Dispatcher::new(Arc::new(config), platform, events, factory),
            listener,
            keep_tracking,
            concluded: false,
        })
    }

    /// Central entry point: apply one event and deliver what it produced.
    pub fn handle(&mut self, event: Event) {
        if event == Event::Get && !self.dispatcher.is_in_flight() {
            self.concluded = false;
        }

        let mut out = Outbox::new();
        self.dispatcher.handle(&event, &mut out);
        self.flush(out);
    }

    /// Request a fix.
    pub fn get(&mut self) {
        self.handle(Event::Get);
    }

    /// Abandon the current request.
    pub fn cancel(&mut self) {
        self.handle(Event::Cancel);
    }

    /// Forward the host's pause.
    pub fn on_pause(&mut self) {
        self.handle(Event::Pause);
    }

    /// Forward the host's resume.
    pub fn on_resume(&mut self) {
        self.handle(Event::Resume);
    }

    /// Forward the host's teardown.
    pub fn on_destroy(&mut self) {
        self.handle(Event::Destroy);
    }

    /// Forward the outcome of a result-returning surface.
    pub fn on_platform_result(&mut self, request_code: RequestCode, outcome: ResultOutcome) {
        self.handle(Event::PlatformResult {
            request_code,
            outcome,
        });
    }

    /// Forward the outcome of a permission request.
    pub fn on_permission_result(
        &mut self,
        request_code: RequestCode,
        granted: Vec<String>,
        denied: Vec<String>,
    ) {
        self.handle(Event::PermissionResult {
            request_code,
            granted,
            denied,
        });
    }

    /// Forward the user's answer to a dialog.
    pub fn on_dialog_result(&mut self, dialog: DialogKind, accepted: bool) {
        self.handle(Event::DialogResult { dialog, accepted });
    }

    /// Still waiting for the first fix of the current request.
    pub fn is_waiting_for_location(&self) -> bool {
        self.dispatcher.is_waiting()
    }

    /// A dialog or resolution surface is on screen.
    pub fn is_dialog_showing(&self) -> bool {
        self.dispatcher.is_dialog_showing()
    }

    /// Backend currently active, if any.
    pub fn active_backend(&self) -> Option<BackendKind> {
        self.dispatcher.active_backend()
    }

    fn flush(&mut self, mut out: Outbox) {
        for report in out.drain() {
            if self.concluded {
                tracing::debug!(?report, "Request concluded, suppressing report");
                continue;
            }
            if report.is_terminal(self.keep_tracking) {
                self.concluded = true;
            }
            deliver(self.listener.as_mut(), report);
        }
    }
}

impl std::fmt::Debug for LocationManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocationManager")
            .field("dispatcher", &self.dispatcher)
            .field("keep_tracking", &self.keep_tracking)
            .field("concluded", &self.concluded)
            .finish()
    }
}

/// Snapshot of a running session, published after every event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SessionStatus {
    /// Still waiting for the first fix.
    pub waiting: bool,
    /// A dialog or resolution surface is on screen.
    pub dialog_showing: bool,
}

/// A [`LocationManager`] running on its own tokio task.
///
/// The session keeps the only owning [`EventSender`]; collaborators and timers
/// hold weak handles. Cancelling the token (or calling
/// [`shutdown`](Self::shutdown)) destroys the manager and ends the task.
pub struct LocationSession {
    sender: EventSender,
    cancel: CancellationToken,
    status: watch::Receiver<SessionStatus>,
    handle: JoinHandle<()>,
}

impl LocationSession {
    /// Spawn a session with the standard backends.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(
        config: LocationConfig,
        platform: Platform,
        listener: Box<dyn LocationListener>,
    ) -> Result<Self, ConfigError> {
        Self::spawn_with_factory(config, platform, listener, Arc::new(StandardBackends))
    }

    /// Spawn a session with a custom backend factory.
    pub fn spawn_with_factory(
        config: LocationConfig,
        platform: Platform,
        listener: Box<dyn LocationListener>,
        factory: Arc<dyn BackendFactory>,
    ) -> Result<Self, ConfigError> {
        let (sender, rx) = event_channel();
        let manager =
            LocationManager::with_factory(config, platform, listener, sender.downgrade(), factory)?;
        let cancel = CancellationToken::new();
        let (status_tx, status) = watch::channel(SessionStatus::default());

        let handle = tokio::spawn(run_session(manager, rx, cancel.clone(), status_tx));
        Ok(Self {
            sender,
            cancel,
            status,
            handle,
        })
    }

    /// Owning handle for posting events.
    pub fn sender(&self) -> EventSender {
        self.sender.clone()
    }

    /// Non-owning handle, for collaborators that report back asynchronously.
    pub fn weak_sender(&self) -> WeakEventSender {
        self.sender.downgrade()
    }

    /// Post an event. Returns false once the session has ended.
    pub fn post(&self, event: Event) -> bool {
        self.sender.post(event)
    }

    /// Latest published status.
    pub fn status(&self) -> SessionStatus {
        *self.status.borrow()
    }

    /// Token that ends the session when cancelled.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Destroy the manager and wait for the task to finish.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        if let Err(e) = self.handle.await {
            tracing::warn!(error = %e, "Location session task ended abnormally");
        }
    }
}

async fn run_session(
    mut manager: LocationManager,
    mut rx: mpsc::UnboundedReceiver<Event>,
    cancel: CancellationToken,
    status: watch::Sender<SessionStatus>,
) {
    tracing::debug!("Location session started");
    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            event = rx.recv() => match event {
                Some(event) => {
                    manager.handle(event);
                    status.send_replace(SessionStatus {
                        waiting: manager.is_waiting_for_location(),
                        dialog_showing: manager.is_dialog_showing(),
                    });
                }
                None => break,
            },
        }
    }
    manager.on_destroy();
    status.send_replace(SessionStatus::default());
    tracing::debug!("Location session ended");
}
