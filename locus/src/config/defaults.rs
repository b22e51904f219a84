//! Default configuration values.

use std::time::Duration;

pub use crate::fix::{DEFAULT_ACCEPTABLE_ACCURACY_M, DEFAULT_ACCEPTABLE_AGE};

/// Default interval between continuous updates.
pub const DEFAULT_UPDATE_INTERVAL: Duration = Duration::from_secs(5);

/// Default minimum displacement between continuous updates (meters).
pub const DEFAULT_UPDATE_DISTANCE_M: f32 = 0.0;

/// Default wait period for every source before it is abandoned.
pub const DEFAULT_WAIT_PERIOD: Duration = Duration::from_secs(20);

/// Default number of reconnects after a suspended vendor connection.
pub const DEFAULT_SUSPENDED_CONNECTION_RETRY_LIMIT: u32 = 2;

/// Permissions required when none are configured.
pub const DEFAULT_REQUIRED_PERMISSIONS: &[&str] = &["coarse_location", "fine_location"];

/// Default log level filter.
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Default log file name (inside the config directory).
pub const DEFAULT_LOG_FILE: &str = "locus.log";

/// Default title of the GNSS enable dialog.
pub const DEFAULT_ENABLE_GNSS_TITLE: &str = "Enable GPS";

/// Default body of the GNSS enable dialog.
pub const DEFAULT_ENABLE_GNSS_MESSAGE: &str =
    "GPS is turned off. Open location settings to turn it on for a more accurate position?";

/// Default title of the permission rationale dialog.
pub const DEFAULT_RATIONALE_TITLE: &str = "Location permission";
