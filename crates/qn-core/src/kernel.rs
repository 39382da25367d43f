//! Space-time triggering kernel (ETAS style).
//!
//! Each past event adds `K · e^{α(M−M0)} · (Δt + c)^{−p} · (r² + d²)^{−q/2}`
//! to the rate at a query point. Rates are in events per day.

use chrono::{DateTime, Utc};
use qn_common::{days_between, Event};
use qn_config::KernelParams;
use qn_math::{clamp_unit, haversine_km};
use serde::{Deserialize, Serialize};

/// Lower bound applied to the Poisson exponent before `exp`.
const MIN_EXPONENT: f64 = -50.0;

/// Rate plus horizon probability at one point.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct KernelEstimate {
    pub lambda: f64,
    pub probability: f64,
}

/// Expected event rate at `(lat0, lon0)` at time `t0`.
///
/// Only events strictly before `t0` and inside both locality cutoffs
/// contribute; an empty slice yields 0.
pub fn intensity(
    events: &[Event],
    t0: DateTime<Utc>,
    lat0: f64,
    lon0: f64,
    params: &KernelParams,
) -> f64 {
    events
        .iter()
        .filter_map(|e| contribution(e, t0, lat0, lon0, params))
        .sum()
}

fn contribution(
    e: &Event,
    t0: DateTime<Utc>,
    lat0: f64,
    lon0: f64,
    params: &KernelParams,
) -> Option<f64> {
    let dt = days_between(t0, e.time);
    if dt <= 0.0 || dt > params.time_window_days {
        return None;
    }
    let r = haversine_km(lat0, lon0, e.lat, e.lon);
    if r > params.radius_km {
        return None;
    }
    let magnitude_term = (params.alpha * (e.magnitude - params.m0)).exp();
    let temporal_term = (dt + params.c).powf(-params.p);
    let spatial_term = (r * r + params.d * params.d).powf(-params.q / 2.0);
    Some(params.k * magnitude_term * temporal_term * spatial_term)
}

/// Poisson probability of at least one event in `horizon_days` at rate `lambda`.
pub fn probability_at_least_one(lambda: f64, horizon_days: f64) -> f64 {
    let exponent = (-lambda * horizon_days).max(MIN_EXPONENT);
    clamp_unit(1.0 - exponent.exp())
}

/// Rate and probability at one point.
pub fn estimate(
    events: &[Event],
    t0: DateTime<Utc>,
    lat0: f64,
    lon0: f64,
    params: &KernelParams,
    horizon_days: f64,
) -> KernelEstimate {
    let lambda = intensity(events, t0, lat0, lon0, params);
    KernelEstimate {
        lambda,
        probability: probability_at_least_one(lambda, horizon_days),
    }
}

/// Re-express a probability over `from_days` as one over `to_days`, treating
/// it as a constant Poisson rate.
pub fn rescale_horizon(p: f64, from_days: f64, to_days: f64) -> f64 {
    if from_days <= 0.0 || (from_days - to_days).abs() < f64::EPSILON {
        return clamp_unit(p);
    }
    let p = clamp_unit(p);
    if p >= 1.0 {
        return 1.0;
    }
    let rate = -(-p).ln_1p() / from_days;
    probability_at_least_one(rate, to_days)
}
