//! CLI command implementations.
//!
//! - [`config`] - Configuration management (check, init, path)
//! - [`simulate`] - Run an acquisition against the simulated platform

pub mod config;
pub mod simulate;
