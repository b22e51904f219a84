//! Simulated platform.
//!
//! [`SimulatedPlatform`] implements every collaborator trait in memory. It
//! records each call, answers permission requests, dialogs and launched
//! surfaces according to a scripted [`Reply`], and can produce fixes on its
//! own after a configurable delay. Asynchronous answers are posted to the
//! session through the sender given to [`SimulatedPlatform::attach`]; while
//! detached they are dropped, which lets tests drive every event by hand.
//!
//! [`RecordingListener`] captures listener callbacks for later inspection.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{mpsc, Notify};

use crate::config::DEFAULT_REQUIRED_PERMISSIONS;
use crate::error::{FailReason, LaunchError, PlatformError};
use crate::event::{
    DialogKind, Event, ProcessStage, RequestCode, ResultOutcome, SettingsOutcome, SourceKind,
    SourceStatus, Surface, Ticket, VendorEvent, WeakEventSender,
};
use crate::fix::{Fix, FixSource};
use crate::listener::LocationListener;
use crate::platform::{
    Availability, DialogContent, PermissionService, Platform, PositionSources, UiContext, UiHost,
    UpdateRequest, VendorService,
};

/// How the simulation answers a request for user input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reply {
    /// Grant / accept / complete successfully.
    Accept,
    /// Deny / decline / cancel.
    Decline,
    /// Hand the question to the prompt channel.
    Prompt,
    /// Never answer.
    Silent,
}

/// How the simulated vendor client answers `connect`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VendorConnect {
    /// Report `Connected`.
    Connect,
    /// Report `ConnectionFailed` with `code`.
    Fail {
        /// Vendor error code.
        code: i32,
    },
    /// Never answer.
    Silent,
}

/// A question forwarded to the prompt channel under [`Reply::Prompt`].
#[derive(Debug, Clone, PartialEq)]
pub enum Prompt {
    /// OS permission request.
    Permission {
        /// Permissions asked for.
        permissions: Vec<String>,
    },
    /// Dialog shown by the orchestrator.
    Dialog {
        /// Which dialog.
        dialog: DialogKind,
        /// Its text.
        content: DialogContent,
    },
    /// Result-returning surface.
    Launch {
        /// Surface launched.
        surface: Surface,
        /// Code its result is keyed by.
        request_code: RequestCode,
    },
}

/// A recorded collaborator call.
#[derive(Debug, Clone, PartialEq)]
pub enum SimCall {
    RequestUpdates(Ticket, SourceKind, UpdateRequest),
    RemoveUpdates(Ticket),
    PermissionRequest(Vec<String>),
    ShowDialog(DialogKind),
    DismissDialog(DialogKind),
    Launch(Surface, RequestCode),
    VendorAvailability,
    VendorConnect(Ticket),
    VendorDisconnect,
    VendorCheckSettings(Ticket),
    VendorRequestUpdates(Ticket),
    VendorRemoveUpdates(Ticket),
}

#[derive(Debug, Clone, Copy)]
struct Registration {
    source: SourceKind,
    request: UpdateRequest,
    generation: u64,
}

#[derive(Debug)]
struct VendorState {
    availability: Availability,
    connect: VendorConnect,
    connected: bool,
    settings: SettingsOutcome,
    last_known: Option<Fix>,
    fix_after: Option<Duration>,
    registrations: HashMap<Ticket, u64>,
}

impl Default for VendorState {
    fn default() -> Self {
        Self {
            availability: Availability::Available,
            connect: VendorConnect::Connect,
            connected: false,
            settings: SettingsOutcome::Satisfied,
            last_known: None,
            fix_after: None,
            registrations: HashMap::new(),
        }
    }
}

#[derive(Debug)]
struct SimState {
    enabled: HashMap<SourceKind, bool>,
    network_connected: bool,
    last_known: HashMap<SourceKind, Fix>,
    fix_after: HashMap<SourceKind, Duration>,
    position: (f64, f64),
    registrations: HashMap<Ticket, Registration>,
    generation: u64,
    ui: UiContext,
    granted: HashSet<String>,
    should_show_rationale: bool,
    permission_reply: Reply,
    dialog_replies: HashMap<DialogKind, Reply>,
    launch_reply: Reply,
    vendor: Option<VendorState>,
    availability_checks: usize,
    calls: Vec<SimCall>,
    events: WeakEventSender,
    prompts: Option<mpsc::UnboundedSender<Prompt>>,
}

impl Default for SimState {
    fn default() -> Self {
        Self {
            enabled: HashMap::from([(SourceKind::Gnss, true), (SourceKind::Network, true)]),
            network_connected: true,
            last_known: HashMap::new(),
            fix_after: HashMap::new(),
            position: (52.520008, 13.404954),
            registrations: HashMap::new(),
            generation: 0,
            ui: UiContext::Foreground {
                can_launch_for_result: true,
            },
            granted: HashSet::new(),
            should_show_rationale: false,
            permission_reply: Reply::Accept,
            dialog_replies: HashMap::new(),
            launch_reply: Reply::Accept,
            vendor: None,
            availability_checks: 0,
            calls: Vec::new(),
            events: WeakEventSender::detached(),
            prompts: None,
        }
    }
}

impl SimState {
    fn fix(&self, source: FixSource) -> Fix {
        let accuracy = match source {
            FixSource::Gnss => 4.0,
            FixSource::Network => 25.0,
            FixSource::Vendor => 3.0,
        };
        Fix::new(self.position.0, self.position.1, accuracy, source)
    }

    fn next_generation(&mut self) -> u64 {
        self.generation += 1;
        self.generation
    }
}

/// In-memory implementation of every collaborator trait.
#[derive(Debug, Default)]
pub struct SimulatedPlatform {
    state: Arc<Mutex<SimState>>,
}

impl SimulatedPlatform {
    /// New simulation: both sources on, network connected, foreground UI,
    /// no permissions granted, every question answered positively.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Collaborator bundle backed by this simulation.
    pub fn platform(self: &Arc<Self>) -> Platform {
        let platform = Platform::new(self.clone(), self.clone(), self.clone());
        match self.vendor_service() {
            Some(vendor) => platform.with_vendor(vendor),
            None => platform,
        }
    }

    /// The vendor service, if one is installed.
    pub fn vendor_service(self: &Arc<Self>) -> Option<Arc<dyn VendorService>> {
        if self.state.lock().vendor.is_some() {
            Some(self.clone())
        } else {
            None
        }
    }

    /// Route asynchronous answers to a session.
    pub fn attach(&self, events: WeakEventSender) {
        self.state.lock().events = events;
    }

    /// Send questions answered with [`Reply::Prompt`] to `prompts`.
    pub fn set_prompt_channel(&self, prompts: mpsc::UnboundedSender<Prompt>) {
        self.state.lock().prompts = Some(prompts);
    }

    // --- scripting -------------------------------------------------------

    /// Switch a source on or off, notifying any registration on it.
    pub fn set_source_enabled(&self, source: SourceKind, enabled: bool) {
        let (events, tickets) = {
            let mut state = self.state.lock();
            state.enabled.insert(source, enabled);
            let tickets: Vec<Ticket> = state
                .registrations
                .iter()
                .filter(|(_, r)| r.source == source)
                .map(|(t, _)| *t)
                .collect();
            (state.events.clone(), tickets)
        };
        let status = if enabled {
            SourceStatus::Enabled { source }
        } else {
            SourceStatus::Disabled { source }
        };
        for ticket in tickets {
            events.post(Event::SourceStatus { ticket, status });
        }
    }

    /// Whether network positioning has connectivity.
    pub fn set_network_connected(&self, connected: bool) {
        self.state.lock().network_connected = connected;
    }

    /// Cached fix returned for `source`.
    pub fn set_last_known(&self, source: SourceKind, fix: Option<Fix>) {
        let mut state = self.state.lock();
        match fix {
            Some(fix) => state.last_known.insert(source, fix),
            None => state.last_known.remove(&source),
        };
    }

    /// Deliver live fixes for `source` this long after registration.
    /// `None` means the source never produces a fix.
    pub fn set_fix_after(&self, source: SourceKind, delay: Option<Duration>) {
        let mut state = self.state.lock();
        match delay {
            Some(delay) => state.fix_after.insert(source, delay),
            None => state.fix_after.remove(&source),
        };
    }

    /// Position reported by generated fixes.
    pub fn set_position(&self, latitude: f64, longitude: f64) {
        self.state.lock().position = (latitude, longitude);
    }

    /// UI context offered to the orchestrator.
    pub fn set_ui(&self, ui: UiContext) {
        self.state.lock().ui = ui;
    }

    /// Grant one permission.
    pub fn grant(&self, permission: &str) {
        self.state.lock().granted.insert(permission.to_string());
    }

    /// Grant the default required permissions.
    pub fn grant_all(&self) {
        let mut state = self.state.lock();
        for permission in DEFAULT_REQUIRED_PERMISSIONS {
            state.granted.insert(permission.to_string());
        }
    }

    /// Whether the platform recommends a rationale for every permission.
    pub fn set_should_show_rationale(&self, show: bool) {
        self.state.lock().should_show_rationale = show;
    }

    /// Answer to OS permission requests.
    pub fn set_permission_reply(&self, reply: Reply) {
        self.state.lock().permission_reply = reply;
    }

    /// Answer to `dialog`.
    pub fn set_dialog_reply(&self, dialog: DialogKind, reply: Reply) {
        self.state.lock().dialog_replies.insert(dialog, reply);
    }

    /// Outcome of launched surfaces.
    pub fn set_launch_reply(&self, reply: Reply) {
        self.state.lock().launch_reply = reply;
    }

    /// Install a vendor service (available, connects, settings satisfied).
    pub fn install_vendor(&self) {
        let mut state = self.state.lock();
        if state.vendor.is_none() {
            state.vendor = Some(VendorState::default());
        }
    }

    fn with_vendor<F: FnOnce(&mut VendorState)>(&self, f: F) {
        let mut state = self.state.lock();
        let vendor = state.vendor.get_or_insert_with(VendorState::default);
        f(vendor);
    }

    /// Vendor availability answer.
    pub fn set_vendor_availability(&self, availability: Availability) {
        self.with_vendor(|v| v.availability = availability);
    }

    /// Vendor connect behaviour.
    pub fn set_vendor_connect(&self, connect: VendorConnect) {
        self.with_vendor(|v| v.connect = connect);
    }

    /// Vendor settings check answer.
    pub fn set_vendor_settings(&self, settings: SettingsOutcome) {
        self.with_vendor(|v| v.settings = settings);
    }

    /// Vendor cached fix.
    pub fn set_vendor_last_known(&self, fix: Option<Fix>) {
        self.with_vendor(|v| v.last_known = fix);
    }

    /// Deliver vendor fixes this long after registration.
    pub fn set_vendor_fix_after(&self, delay: Option<Duration>) {
        self.with_vendor(|v| v.fix_after = delay);
    }

    /// Force the vendor connection flag.
    pub fn set_vendor_connected(&self, connected: bool) {
        self.with_vendor(|v| v.connected = connected);
    }

    // --- answering -------------------------------------------------------

    /// Complete a permission request.
    pub fn answer_permissions(&self, permissions: Vec<String>, grant: bool) {
        let events = {
            let mut state = self.state.lock();
            if grant {
                state.granted.extend(permissions.iter().cloned());
            }
            state.events.clone()
        };
        let (granted, denied) = if grant {
            (permissions, Vec::new())
        } else {
            (Vec::new(), permissions)
        };
        events.post(Event::PermissionResult {
            request_code: RequestCode::Permission,
            granted,
            denied,
        });
    }

    /// Answer a dialog.
    pub fn answer_dialog(&self, dialog: DialogKind, accepted: bool) {
        let events = self.state.lock().events.clone();
        events.post(Event::DialogResult { dialog, accepted });
    }

    /// Complete a launched surface. A successful surface fixes what it was
    /// launched for.
    pub fn answer_launch(&self, surface: Surface, request_code: RequestCode, accepted: bool) {
        if accepted {
            match surface {
                Surface::SourceSettings(source) => self.set_source_enabled(source, true),
                Surface::VendorServiceResolution { .. } => {
                    self.set_vendor_availability(Availability::Available)
                }
                Surface::VendorSettingsResolution => {
                    self.set_vendor_settings(SettingsOutcome::Satisfied)
                }
            }
        }
        let outcome = if accepted {
            ResultOutcome::Ok
        } else {
            ResultOutcome::Cancelled
        };
        let events = self.state.lock().events.clone();
        events.post(Event::PlatformResult {
            request_code,
            outcome,
        });
    }

    fn prompt(&self, prompt: Prompt) {
        let prompts = self.state.lock().prompts.clone();
        match prompts {
            Some(tx) => {
                if tx.send(prompt).is_err() {
                    tracing::warn!("Prompt channel closed, question left unanswered");
                }
            }
            None => tracing::warn!(?prompt, "No prompt channel, question left unanswered"),
        }
    }

    // --- inspection ------------------------------------------------------

    /// Every recorded call, oldest first.
    pub fn calls(&self) -> Vec<SimCall> {
        self.state.lock().calls.clone()
    }

    /// Number of recorded calls matching `predicate`.
    pub fn count<F: Fn(&SimCall) -> bool>(&self, predicate: F) -> usize {
        self.state.lock().calls.iter().filter(|c| predicate(c)).count()
    }

    /// Number of vendor availability checks.
    pub fn availability_checks(&self) -> usize {
        self.state.lock().availability_checks
    }

    /// Request of the live registration held by `ticket`.
    pub fn registration(&self, ticket: Ticket) -> Option<UpdateRequest> {
        self.state.lock().registrations.get(&ticket).map(|r| r.request)
    }

    /// Source of the live registration held by `ticket`.
    pub fn registered_source(&self, ticket: Ticket) -> Option<SourceKind> {
        self.state.lock().registrations.get(&ticket).map(|r| r.source)
    }

    fn record(&self, call: SimCall) {
        self.state.lock().calls.push(call);
    }

    fn spawn_fixes<F>(&self, first: Duration, period: Duration, make_event: F)
    where
        F: Fn(&SimState) -> Option<Event> + Send + 'static,
    {
        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(runtime) => runtime,
            Err(_) => {
                tracing::warn!("No async runtime available, simulated fixes disabled");
                return;
            }
        };
        let state = self.state.clone();
        let period = period.max(Duration::from_millis(1));
        runtime.spawn(async move {
            let mut delay = first;
            loop {
                tokio::time::sleep(delay).await;
                let (events, event) = {
                    let state = state.lock();
                    match make_event(&state) {
                        Some(event) => (state.events.clone(), event),
                        None => return,
                    }
                };
                if !events.post(event) {
                    return;
                }
                delay = period;
            }
        });
    }
}

fn reply_or(replies: &HashMap<DialogKind, Reply>, dialog: DialogKind) -> Reply {
    replies.get(&dialog).copied().unwrap_or(Reply::Accept)
}

impl PositionSources for SimulatedPlatform {
    fn is_enabled(&self, source: SourceKind) -> bool {
        self.state.lock().enabled.get(&source).copied().unwrap_or(false)
    }

    fn is_network_connected(&self) -> bool {
        self.state.lock().network_connected
    }

    fn last_known_fix(&self, source: SourceKind) -> Option<Fix> {
        self.state.lock().last_known.get(&source).cloned()
    }

    fn request_updates(
        &self,
        ticket: Ticket,
        source: SourceKind,
        request: &UpdateRequest,
    ) -> Result<(), PlatformError> {
        let (generation, fix_after) = {
            let mut state = self.state.lock();
            state
                .calls
                .push(SimCall::RequestUpdates(ticket, source, *request));
            if !state.enabled.get(&source).copied().unwrap_or(false) {
                return Err(PlatformError::SourceUnavailable(source));
            }
            let generation = state.next_generation();
            state.registrations.insert(
                ticket,
                Registration {
                    source,
                    request: *request,
                    generation,
                },
            );
            (generation, state.fix_after.get(&source).copied())
        };

        if let Some(first) = fix_after {
            let period = if request.interval.is_zero() {
                first
            } else {
                request.interval
            };
            self.spawn_fixes(first, period, move |state| {
                match state.registrations.get(&ticket) {
                    Some(r) if r.generation == generation => Some(Event::FixDelivered {
                        ticket,
                        fix: state.fix(FixSource::from(source)),
                    }),
                    _ => None,
                }
            });
        }
        Ok(())
    }

    fn remove_updates(&self, ticket: Ticket) {
        let mut state = self.state.lock();
        state.calls.push(SimCall::RemoveUpdates(ticket));
        state.registrations.remove(&ticket);
    }
}

impl VendorService for SimulatedPlatform {
    fn check_availability(&self) -> Availability {
        let mut state = self.state.lock();
        state.availability_checks += 1;
        state.calls.push(SimCall::VendorAvailability);
        state
            .vendor
            .as_ref()
            .map(|v| v.availability)
            .unwrap_or(Availability::Unavailable {
                code: 1,
                resolvable: false,
            })
    }

    fn connect(&self, ticket: Ticket) {
        let (events, connect) = {
            let mut state = self.state.lock();
            state.calls.push(SimCall::VendorConnect(ticket));
            let events = state.events.clone();
            let Some(vendor) = state.vendor.as_mut() else {
                return;
            };
            if vendor.connect == VendorConnect::Connect {
                vendor.connected = true;
            }
            (events, vendor.connect)
        };
        match connect {
            VendorConnect::Connect => {
                events.post(Event::Vendor {
                    ticket,
                    event: VendorEvent::Connected,
                });
            }
            VendorConnect::Fail { code } => {
                events.post(Event::Vendor {
                    ticket,
                    event: VendorEvent::ConnectionFailed { code },
                });
            }
            VendorConnect::Silent => {}
        }
    }

    fn disconnect(&self) {
        let mut state = self.state.lock();
        state.calls.push(SimCall::VendorDisconnect);
        if let Some(vendor) = state.vendor.as_mut() {
            vendor.connected = false;
            vendor.registrations.clear();
        }
    }

    fn is_connected(&self) -> bool {
        self.state
            .lock()
            .vendor
            .as_ref()
            .is_some_and(|v| v.connected)
    }

    fn last_known_fix(&self) -> Option<Fix> {
        self.state
            .lock()
            .vendor
            .as_ref()
            .and_then(|v| v.last_known.clone())
    }

    fn check_settings(&self, ticket: Ticket, _request: &UpdateRequest) {
        let (events, settings) = {
            let mut state = self.state.lock();
            state.calls.push(SimCall::VendorCheckSettings(ticket));
            let settings = state
                .vendor
                .as_ref()
                .map(|v| v.settings)
                .unwrap_or(SettingsOutcome::Unresolvable);
            (state.events.clone(), settings)
        };
        events.post(Event::Vendor {
            ticket,
            event: VendorEvent::SettingsChecked(settings),
        });
    }

    fn request_updates(&self, ticket: Ticket, request: &UpdateRequest) -> Result<(), PlatformError> {
        let (generation, fix_after) = {
            let mut state = self.state.lock();
            state.calls.push(SimCall::VendorRequestUpdates(ticket));
            let generation = state.next_generation();
            let Some(vendor) = state.vendor.as_mut() else {
                return Err(PlatformError::NotConnected);
            };
            vendor.registrations.insert(ticket, generation);
            (generation, vendor.fix_after)
        };

        if let Some(first) = fix_after {
            let period = if request.interval.is_zero() {
                first
            } else {
                request.interval
            };
            self.spawn_fixes(first, period, move |state| {
                let registered = state
                    .vendor
                    .as_ref()
                    .and_then(|v| v.registrations.get(&ticket))
                    == Some(&generation);
                registered.then(|| Event::Vendor {
                    ticket,
                    event: VendorEvent::Fix(state.fix(FixSource::Vendor)),
                })
            });
        }
        Ok(())
    }

    fn remove_updates(&self, ticket: Ticket) {
        let mut state = self.state.lock();
        state.calls.push(SimCall::VendorRemoveUpdates(ticket));
        if let Some(vendor) = state.vendor.as_mut() {
            vendor.registrations.remove(&ticket);
        }
    }
}

impl PermissionService for SimulatedPlatform {
    fn is_granted(&self, permission: &str) -> bool {
        self.state.lock().granted.contains(permission)
    }

    fn should_show_rationale(&self, permission: &str) -> bool {
        let state = self.state.lock();
        state.should_show_rationale && !state.granted.contains(permission)
    }

    fn request(&self, _request_code: RequestCode, permissions: &[String]) {
        let reply = {
            let mut state = self.state.lock();
            state
                .calls
                .push(SimCall::PermissionRequest(permissions.to_vec()));
            state.permission_reply
        };
        match reply {
            Reply::Accept => self.answer_permissions(permissions.to_vec(), true),
            Reply::Decline => self.answer_permissions(permissions.to_vec(), false),
            Reply::Prompt => self.prompt(Prompt::Permission {
                permissions: permissions.to_vec(),
            }),
            Reply::Silent => {}
        }
    }
}

impl UiHost for SimulatedPlatform {
    fn context(&self) -> UiContext {
        self.state.lock().ui
    }

    fn show_dialog(&self, dialog: DialogKind, content: &DialogContent) {
        let reply = {
            let mut state = self.state.lock();
            state.calls.push(SimCall::ShowDialog(dialog));
            reply_or(&state.dialog_replies, dialog)
        };
        match reply {
            Reply::Accept => self.answer_dialog(dialog, true),
            Reply::Decline => self.answer_dialog(dialog, false),
            Reply::Prompt => self.prompt(Prompt::Dialog {
                dialog,
                content: content.clone(),
            }),
            Reply::Silent => {}
        }
    }

    fn dismiss_dialog(&self, dialog: DialogKind) {
        self.record(SimCall::DismissDialog(dialog));
    }

    fn launch(&self, surface: Surface, request_code: RequestCode) -> Result<(), LaunchError> {
        let reply = {
            let mut state = self.state.lock();
            if !state.ui.has_foreground() {
                return Err(LaunchError::Detached);
            }
            if !state.ui.can_launch_for_result() {
                return Err(LaunchError::WrongContext);
            }
            state.calls.push(SimCall::Launch(surface, request_code));
            state.launch_reply
        };
        match reply {
            Reply::Accept => self.answer_launch(surface, request_code, true),
            Reply::Decline => self.answer_launch(surface, request_code, false),
            Reply::Prompt => self.prompt(Prompt::Launch {
                surface,
                request_code,
            }),
            Reply::Silent => {}
        }
        Ok(())
    }
}

/// A listener callback captured by [`RecordingListener`].
#[derive(Debug, Clone, PartialEq)]
pub enum Callback {
    Location(Fix),
    Failed(FailReason),
    Stage(ProcessStage),
    PermissionGranted { already_had: bool },
    Status(SourceStatus),
}

impl Callback {
    /// Whether this is a fix or failure.
    pub fn is_outcome(&self) -> bool {
        matches!(self, Callback::Location(_) | Callback::Failed(_))
    }
}

#[derive(Debug, Default)]
struct Recording {
    callbacks: Mutex<Vec<Callback>>,
    notify: Notify,
}

/// Listener that records every callback. Clones share the same record.
#[derive(Debug, Clone, Default)]
pub struct RecordingListener {
    inner: Arc<Recording>,
}

impl RecordingListener {
    /// Empty recording.
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, callback: Callback) {
        self.inner.callbacks.lock().push(callback);
        self.inner.notify.notify_waiters();
    }

    /// Every callback, oldest first.
    pub fn callbacks(&self) -> Vec<Callback> {
        self.inner.callbacks.lock().clone()
    }

    /// Delivered fixes.
    pub fn fixes(&self) -> Vec<Fix> {
        self.callbacks()
            .into_iter()
            .filter_map(|c| match c {
                Callback::Location(fix) => Some(fix),
                _ => None,
            })
            .collect()
    }

    /// Delivered failures.
    pub fn failures(&self) -> Vec<FailReason> {
        self.callbacks()
            .into_iter()
            .filter_map(|c| match c {
                Callback::Failed(reason) => Some(reason),
                _ => None,
            })
            .collect()
    }

    /// Reported stages.
    pub fn stages(&self) -> Vec<ProcessStage> {
        self.callbacks()
            .into_iter()
            .filter_map(|c| match c {
                Callback::Stage(stage) => Some(stage),
                _ => None,
            })
            .collect()
    }

    /// Number of fixes plus failures.
    pub fn outcome_count(&self) -> usize {
        self.inner
            .callbacks
            .lock()
            .iter()
            .filter(|c| c.is_outcome())
            .count()
    }

    /// Wait until `predicate` holds for the recorded callbacks.
    pub async fn wait_until<F>(&self, predicate: F)
    where
        F: Fn(&[Callback]) -> bool,
    {
        loop {
            let notified = self.inner.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if predicate(&self.inner.callbacks.lock()) {
                return;
            }
            notified.await;
        }
    }

    /// Wait for the first fix or failure.
    pub async fn wait_for_outcome(&self) {
        self.wait_until(|callbacks| callbacks.iter().any(Callback::is_outcome))
            .await;
    }
}

impl LocationListener for RecordingListener {
    fn on_location_changed(&mut self, fix: Fix) {
        self.push(Callback::Location(fix));
    }

    fn on_location_failed(&mut self, reason: FailReason) {
        self.push(Callback::Failed(reason));
    }

    fn on_process_stage_changed(&mut self, stage: ProcessStage) {
        self.push(Callback::Stage(stage));
    }

    fn on_permission_granted(&mut self, already_had: bool) {
        self.push(Callback::PermissionGranted { already_had });
    }

    fn on_source_status(&mut self, status: SourceStatus) {
        self.push(Callback::Status(status));
    }
}
