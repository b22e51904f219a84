//! Locus - position fix acquisition with layered source fallback
//!
//! This library obtains a position fix for a caller by walking an ordered
//! chain of sources: an optional vendor fused-location service first, then
//! GNSS, then network positioning. Along the way it handles permission
//! prompts, "turn on GPS" dialogs, vendor settings resolution, per-source
//! wait timers and host pause/resume, and reports exactly one outcome per
//! request (or a stream of fixes when tracking).
//!
//! # High-Level API
//!
//! [`manager::LocationSession`] owns the event loop:
//!
//! ```ignore
//! use locus::config::LocationConfig;
//! use locus::event::Event;
//! use locus::manager::LocationSession;
//!
//! let session = LocationSession::spawn(LocationConfig::default(), platform, Box::new(listener))?;
//! session.post(Event::Get);
//! ```
//!
//! The platform collaborators are traits in [`platform`]; [`sim`] provides an
//! in-memory implementation used by the tests and the CLI.

pub mod backend;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod event;
pub mod fix;
pub mod listener;
pub mod logging;
pub mod manager;
pub mod permission;
pub mod platform;
pub mod scheduler;
pub mod sim;

pub use config::LocationConfig;
pub use error::FailReason;
pub use event::{Event, ProcessStage, SourceKind, Ticket};
pub use fix::{Fix, FixSource};
pub use listener::LocationListener;
pub use manager::{LocationManager, LocationSession};

/// Version of the Locus library and CLI.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
