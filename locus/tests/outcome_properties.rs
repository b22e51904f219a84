//! Property tests for the outcome contract.
//!
//! Arbitrary interleavings of host, platform and backend events are fed to a
//! manager driven by hand (timers never fire on their own). Whatever the
//! order, a request reports at most one terminal outcome, and once the
//! default backend has taken over the vendor service is never used again
//! for that request.
//!
//! Run with: `cargo test --test outcome_properties`

use proptest::prelude::*;

use locus::config::{DefaultBackendConfig, LocationConfig, VendorBackendConfig};
use locus::error::FailReason;
use locus::event::{
    DialogKind, Event, ProcessStage, RequestCode, ResultOutcome, SettingsOutcome, Ticket,
    VendorEvent, WeakEventSender,
};
use locus::fix::{Fix, FixSource};
use locus::manager::LocationManager;
use locus::sim::{Callback, RecordingListener, SimulatedPlatform};

fn ticket() -> impl Strategy<Value = Ticket> {
    (1u64..4).prop_map(Ticket::new)
}

fn vendor_event() -> impl Strategy<Value = VendorEvent> {
    prop_oneof![
        Just(VendorEvent::Connected),
        (0i32..3).prop_map(|cause| VendorEvent::ConnectionSuspended { cause }),
        (1i32..9).prop_map(|code| VendorEvent::ConnectionFailed { code }),
        Just(VendorEvent::SettingsChecked(SettingsOutcome::Satisfied)),
        Just(VendorEvent::SettingsChecked(SettingsOutcome::Resolvable)),
        Just(VendorEvent::SettingsChecked(SettingsOutcome::Unresolvable)),
        Just(VendorEvent::Fix(Fix::new(1.0, 2.0, 3.0, FixSource::Vendor))),
    ]
}

fn request_code() -> impl Strategy<Value = RequestCode> {
    prop_oneof![
        Just(RequestCode::EnableGnss),
        Just(RequestCode::VendorServiceResolution),
        Just(RequestCode::VendorSettings),
    ]
}

fn event() -> impl Strategy<Value = Event> {
    prop_oneof![
        3 => Just(Event::Get),
        1 => Just(Event::Cancel),
        1 => Just(Event::Destroy),
        1 => Just(Event::Pause),
        1 => Just(Event::Resume),
        3 => ticket().prop_map(|ticket| Event::FixDelivered {
            ticket,
            fix: Fix::new(1.0, 2.0, 3.0, FixSource::Gnss),
        }),
        3 => (ticket(), vendor_event()).prop_map(|(ticket, event)| Event::Vendor { ticket, event }),
        1 => ticket().prop_map(|ticket| Event::BackendFailed {
            ticket,
            reason: FailReason::Unknown,
        }),
        1 => any::<bool>().prop_map(|accepted| Event::DialogResult {
            dialog: DialogKind::EnableGnss,
            accepted,
        }),
        1 => (request_code(), any::<bool>()).prop_map(|(request_code, ok)| Event::PlatformResult {
            request_code,
            outcome: if ok { ResultOutcome::Ok } else { ResultOutcome::Cancelled },
        }),
    ]
}

/// Tracks whether the current request has ended.
///
/// A `Get` only starts a new request once the previous one reported an
/// outcome or was cancelled or destroyed; otherwise it is ignored.
#[derive(Default)]
struct RequestTracker {
    started: bool,
    ended: bool,
}

impl RequestTracker {
    /// Returns true when `event` starts a new request.
    fn before(&mut self, event: &Event) -> bool {
        match event {
            Event::Get if !self.started || self.ended => {
                self.started = true;
                self.ended = false;
                true
            }
            Event::Cancel | Event::Destroy => {
                self.ended = true;
                false
            }
            _ => false,
        }
    }

    fn after(&mut self, new_outcomes: usize) {
        if new_outcomes > 0 {
            self.ended = true;
        }
    }
}

fn manager(listener: &RecordingListener) -> LocationManager {
    let sim = SimulatedPlatform::new();
    sim.grant_all();
    sim.install_vendor();
    let config = LocationConfig::builder()
        .use_vendor_backend(VendorBackendConfig::default())
        .use_default_backend(DefaultBackendConfig::default())
        .build()
        .unwrap();
    LocationManager::new(
        config,
        sim.platform(),
        Box::new(listener.clone()),
        WeakEventSender::detached(),
    )
    .unwrap()
}

proptest! {
    #[test]
    fn test_at_most_one_outcome_per_request(events in prop::collection::vec(event(), 1..40)) {
        let listener = RecordingListener::new();
        let mut manager = manager(&listener);
        let mut tracker = RequestTracker::default();

        let mut outcomes = 0;
        let mut seen = 0;
        for event in events {
            if tracker.before(&event) {
                outcomes = 0;
            }
            manager.handle(event);

            let callbacks = listener.callbacks();
            let new_outcomes = callbacks[seen..].iter().filter(|c| c.is_outcome()).count();
            tracker.after(new_outcomes);
            outcomes += new_outcomes;
            seen = callbacks.len();
            prop_assert!(outcomes <= 1, "callbacks: {:?}", callbacks);
        }
    }

    #[test]
    fn test_vendor_never_resumes_after_fallback(events in prop::collection::vec(event(), 1..40)) {
        let listener = RecordingListener::new();
        let mut manager = manager(&listener);
        let mut tracker = RequestTracker::default();

        let mut on_default = false;
        let mut seen = 0;
        for event in events {
            if tracker.before(&event) {
                on_default = false;
            }
            manager.handle(event);

            let callbacks = listener.callbacks();
            let fresh = &callbacks[seen..];
            tracker.after(fresh.iter().filter(|c| c.is_outcome()).count());
            for callback in fresh {
                match callback {
                    Callback::Stage(ProcessStage::UsingGnss | ProcessStage::UsingNetwork) => {
                        on_default = true;
                    }
                    Callback::Stage(ProcessStage::UsingVendorService) => {
                        prop_assert!(!on_default, "callbacks: {:?}", callbacks);
                    }
                    _ => {}
                }
            }
            seen = callbacks.len();
        }
    }
}
