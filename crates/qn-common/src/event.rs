//! Catalog events.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Milliseconds in one day.
pub const MS_PER_DAY: f64 = 86_400_000.0;

/// A single observed earthquake. Immutable once observed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub time: DateTime<Utc>,
    /// Degrees north.
    pub lat: f64,
    /// Degrees east.
    pub lon: f64,
    pub magnitude: f64,
}

impl Event {
    pub fn new(time: DateTime<Utc>, lat: f64, lon: f64, magnitude: f64) -> Self {
        Self {
            time,
            lat,
            lon,
            magnitude,
        }
    }

    /// True when every coordinate and the magnitude are finite.
    pub fn is_finite(&self) -> bool {
        self.lat.is_finite() && self.lon.is_finite() && self.magnitude.is_finite()
    }
}

/// Elapsed days from `earlier` to `later` (negative if `later` precedes it).
pub fn days_between(later: DateTime<Utc>, earlier: DateTime<Utc>) -> f64 {
    (later - earlier).num_milliseconds() as f64 / MS_PER_DAY
}
