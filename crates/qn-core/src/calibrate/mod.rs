//! Probability calibration and scoring metrics.

mod metrics;
mod platt;

pub use metrics::{auc, brier, reliability, Metrics, ReliabilityBin, DEFAULT_RELIABILITY_BINS};
pub use platt::{fit, newton_step, Calibration, NewtonStep, MAX_NEWTON_ITERATIONS};
