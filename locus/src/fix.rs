//! Position fixes and the usability predicate applied to cached fixes.
//!
//! A [`Fix`] is a single position reading. Fixes delivered live by a
//! registered source are always forwarded; fixes pulled from a source's
//! last-known cache are only forwarded when [`FixAcceptance::is_usable`]
//! accepts them.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::event::SourceKind;

/// Default maximum accuracy radius (meters) for a cached fix to be usable.
pub const DEFAULT_ACCEPTABLE_ACCURACY_M: f32 = 5.0;

/// Default maximum age for a cached fix to be usable (5 minutes).
pub const DEFAULT_ACCEPTABLE_AGE: Duration = Duration::from_secs(5 * 60);

/// Where a fix came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FixSource {
    /// Satellite receiver.
    Gnss,
    /// Cell/Wi-Fi network positioning.
    Network,
    /// Vendor fused-location service.
    Vendor,
}

impl FixSource {
    /// Short lowercase name for logs and CLI output.
    pub fn as_str(&self) -> &'static str {
        match self {
            FixSource::Gnss => "gnss",
            FixSource::Network => "network",
            FixSource::Vendor => "vendor",
        }
    }
}

impl From<SourceKind> for FixSource {
    fn from(kind: SourceKind) -> Self {
        match kind {
            SourceKind::Gnss => FixSource::Gnss,
            SourceKind::Network => FixSource::Network,
        }
    }
}

impl fmt::Display for FixSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single position reading.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Fix {
    /// Latitude in decimal degrees.
    pub latitude: f64,
    /// Longitude in decimal degrees.
    pub longitude: f64,
    /// Accuracy radius in meters (lower is better).
    pub accuracy: f32,
    /// When the reading was taken.
    pub timestamp: DateTime<Utc>,
    /// Source that produced the reading.
    pub source: FixSource,
}

impl Fix {
    /// Create a fix stamped with the current time.
    pub fn new(latitude: f64, longitude: f64, accuracy: f32, source: FixSource) -> Self {
        Self::at(latitude, longitude, accuracy, source, Utc::now())
    }

    /// Create a fix with an explicit timestamp.
    pub fn at(
        latitude: f64,
        longitude: f64,
        accuracy: f32,
        source: FixSource,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            latitude,
            longitude,
            accuracy,
            timestamp,
            source,
        }
    }

    /// Age of the fix relative to `now`.
    ///
    /// Fixes stamped in the future have zero age.
    pub fn age(&self, now: DateTime<Utc>) -> chrono::Duration {
        let age = now.signed_duration_since(self.timestamp);
        if age < chrono::Duration::zero() {
            chrono::Duration::zero()
        } else {
            age
        }
    }
}

impl fmt::Display for Fix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:.6}, {:.6} (±{:.1}m via {})",
            self.latitude, self.longitude, self.accuracy, self.source
        )
    }
}

/// Usability thresholds for cached fixes.
///
/// Both bounds are inclusive: a fix exactly `max_age` old with an accuracy of
/// exactly `max_accuracy` is usable.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FixAcceptance {
    /// Maximum age of a usable fix.
    pub max_age: Duration,
    /// Maximum accuracy radius (meters) of a usable fix.
    pub max_accuracy: f32,
}

impl Default for FixAcceptance {
    fn default() -> Self {
        Self {
            max_age: DEFAULT_ACCEPTABLE_AGE,
            max_accuracy: DEFAULT_ACCEPTABLE_ACCURACY_M,
        }
    }
}

impl FixAcceptance {
    /// Create acceptance thresholds.
    pub fn new(max_age: Duration, max_accuracy: f32) -> Self {
        Self {
            max_age,
            max_accuracy,
        }
    }

    /// Check a fix against the thresholds at the current time.
    pub fn accepts(&self, fix: &Fix) -> bool {
        self.is_usable(fix, Utc::now())
    }

    /// Check a fix against the thresholds at `now`.
    pub fn is_usable(&self, fix: &Fix, now: DateTime<Utc>) -> bool {
        // Durations beyond chrono's range cannot be exceeded by any real fix.
        let fresh = match chrono::Duration::from_std(self.max_age) {
            Ok(max_age) => fix.age(now) <= max_age,
            Err(_) => true,
        };
        fresh && fix.accuracy <= self.max_accuracy
    }
}
