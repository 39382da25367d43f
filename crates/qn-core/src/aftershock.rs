//! Kernel probability around a single mainshock.

use std::f64::consts::TAU;

use chrono::{DateTime, Duration, Utc};
use qn_common::{Error, Event, Result};
use qn_config::KernelParams;
use qn_math::{destination_point, LatLon};
use serde::{Deserialize, Serialize};

use crate::catalog::Catalog;
use crate::kernel;

/// Time window of the ring kernel in days.
pub const RING_TIME_WINDOW_DAYS: f64 = 90.0;

/// Ring points sit exactly on the kernel cutoff; this absorbs rounding in
/// the forward geodesic so they are not dropped.
const CUTOFF_SLACK_KM: f64 = 1e-6;

/// The triggering event.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Mainshock {
    pub lat: f64,
    pub lon: f64,
    #[serde(rename = "mag")]
    pub magnitude: f64,
    pub time: DateTime<Utc>,
}

impl Mainshock {
    pub fn as_event(&self) -> Event {
        Event::new(self.time, self.lat, self.lon, self.magnitude)
    }

    /// Instant the ring is evaluated at: one second after the mainshock.
    /// `None` when that instant is past the representable range.
    pub fn evaluation_time(&self) -> Option<DateTime<Utc>> {
        self.time.checked_add_signed(Duration::seconds(1))
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RingSpec {
    pub radius_km: f64,
    pub n_points: usize,
    pub horizon_days: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RingPoint {
    pub lat: f64,
    pub lon: f64,
    pub probability: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RingStatistics {
    pub max_probability: f64,
    pub mean_probability: f64,
    pub min_probability: f64,
}

impl RingStatistics {
    fn over(points: &[RingPoint]) -> Self {
        let n = points.len().max(1) as f64;
        let (mut max, mut min, mut sum) = (f64::NEG_INFINITY, f64::INFINITY, 0.0);
        for p in points {
            max = max.max(p.probability);
            min = min.min(p.probability);
            sum += p.probability;
        }
        if points.is_empty() {
            (max, min) = (0.0, 0.0);
        }
        Self {
            max_probability: max,
            mean_probability: sum / n,
            min_probability: min,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AftershockRing {
    pub center_lambda: f64,
    pub center_probability: f64,
    pub ring: Vec<RingPoint>,
    pub statistics: RingStatistics,
    /// Events fed to the kernel, mainshock included.
    pub events_used: usize,
}

/// `n` points at distance `radius_km` from `center`, bearings `2πi/n`.
pub fn ring_points(center: LatLon, radius_km: f64, n: usize) -> Vec<LatLon> {
    (0..n)
        .map(|i| destination_point(center, TAU * i as f64 / n as f64, radius_km))
        .collect()
}

/// Evaluate the center and ring for `mainshock` given prior `events`.
///
/// Only events strictly before the mainshock are used, plus the mainshock.
/// `base` supplies the kernel shape; its cutoffs are replaced by the ring
/// radius and a 90-day window.
pub fn compute_ring(
    mainshock: &Mainshock,
    events: &[Event],
    spec: &RingSpec,
    base: &KernelParams,
) -> Result<AftershockRing> {
    if spec.n_points == 0 {
        return Err(Error::invalid("nPoints must be at least 1"));
    }
    if !spec.radius_km.is_finite() || spec.radius_km <= 0.0 {
        return Err(Error::invalid("radiusKm must be a positive number"));
    }

    let t = mainshock
        .evaluation_time()
        .ok_or_else(|| Error::invalid("time out of range"))?;

    let prior: Vec<Event> = events
        .iter()
        .filter(|e| e.time < mainshock.time && e.is_finite())
        .copied()
        .collect();
    let catalog = Catalog::new(prior).with_event(mainshock.as_event());
    let causal = catalog.events();

    let params = base.with_cutoffs(RING_TIME_WINDOW_DAYS, spec.radius_km + CUTOFF_SLACK_KM);
    let center = kernel::estimate(
        causal,
        t,
        mainshock.lat,
        mainshock.lon,
        &params,
        spec.horizon_days,
    );

    let ring: Vec<RingPoint> = ring_points(
        LatLon::new(mainshock.lat, mainshock.lon),
        spec.radius_km,
        spec.n_points,
    )
    .into_iter()
    .map(|pt| RingPoint {
        lat: pt.lat,
        lon: pt.lon,
        probability: kernel::estimate(causal, t, pt.lat, pt.lon, &params, spec.horizon_days)
            .probability,
    })
    .collect();

    Ok(AftershockRing {
        center_lambda: center.lambda,
        center_probability: center.probability,
        statistics: RingStatistics::over(&ring),
        ring,
        events_used: causal.len(),
    })
}
