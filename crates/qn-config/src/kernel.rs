//! ETAS kernel parameters.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::validate::{require_finite, require_positive, ValidationResult};

/// Constants of the space-time triggering kernel.
///
/// Serialized with the short physical names (`K`, `alpha`, `p`, ...) used in
/// model artifacts.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct KernelParams {
    /// Overall productivity.
    #[serde(rename = "K")]
    pub k: f64,
    /// Magnitude productivity exponent.
    pub alpha: f64,
    /// Omori decay exponent.
    pub p: f64,
    /// Omori time offset in days.
    pub c: f64,
    /// Spatial decay exponent.
    pub q: f64,
    /// Spatial core radius in km.
    pub d: f64,
    /// Reference magnitude.
    #[serde(rename = "M0")]
    pub m0: f64,
    /// Events older than this many days contribute nothing.
    #[serde(rename = "timeWindowDays")]
    pub time_window_days: f64,
    /// Events farther than this many km contribute nothing.
    #[serde(rename = "radiusKm")]
    pub radius_km: f64,
}

impl Default for KernelParams {
    fn default() -> Self {
        Self {
            k: 0.02,
            alpha: 1.1,
            p: 1.2,
            c: 0.01,
            q: 1.5,
            d: 10.0,
            m0: 3.0,
            time_window_days: 90.0,
            radius_km: 300.0,
        }
    }
}

impl KernelParams {
    /// Copy with a different locality cutoff.
    pub fn with_cutoffs(mut self, time_window_days: f64, radius_km: f64) -> Self {
        self.time_window_days = time_window_days;
        self.radius_km = radius_km;
        self
    }

    pub fn validate(&self) -> ValidationResult {
        require_positive("kernel.K", self.k)?;
        require_finite("kernel.alpha", self.alpha)?;
        require_positive("kernel.p", self.p)?;
        require_positive("kernel.c", self.c)?;
        require_positive("kernel.q", self.q)?;
        require_positive("kernel.d", self.d)?;
        require_finite("kernel.M0", self.m0)?;
        require_positive("kernel.timeWindowDays", self.time_window_days)?;
        require_positive("kernel.radiusKm", self.radius_km)?;
        Ok(())
    }
}
