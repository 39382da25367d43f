//! Clamped logistic primitives.
//!
//! Every function here is total over finite inputs: exponents are clamped
//! before `exp`, and probabilities are pulled away from 0 and 1 before `ln`,
//! so callers never observe NaN or infinities from well-formed data.

/// Bound applied to the logistic exponent.
pub const SIGMOID_CLAMP: f64 = 50.0;

/// Distance kept from 0 and 1 before taking a logit.
pub const LOGIT_EPS: f64 = 1e-10;

/// Logistic function with the argument clamped to `[-50, 50]`.
pub fn sigmoid(z: f64) -> f64 {
    1.0 / (1.0 + (-z.clamp(-SIGMOID_CLAMP, SIGMOID_CLAMP)).exp())
}

/// Clamp a probability into `[LOGIT_EPS, 1 - LOGIT_EPS]`.
pub fn clamp_open_unit(p: f64) -> f64 {
    p.clamp(LOGIT_EPS, 1.0 - LOGIT_EPS)
}

/// `ln(p / (1 - p))` after clamping `p` away from the endpoints.
pub fn logit(p: f64) -> f64 {
    let p = clamp_open_unit(p);
    (p / (1.0 - p)).ln()
}

/// Clamp into the closed unit interval.
pub fn clamp_unit(p: f64) -> f64 {
    if p.is_nan() {
        return 0.0;
    }
    p.clamp(0.0, 1.0)
}

/// Arithmetic mean; `None` for an empty slice.
pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Population mean and standard deviation. A zero (or non-finite) standard
/// deviation is floored to 1 so it can be used as a divisor.
pub fn mean_and_std(values: &[f64]) -> (f64, f64) {
    let Some(m) = mean(values) else {
        return (0.0, 1.0);
    };
    let var = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64;
    let std = var.sqrt();
    if std > 0.0 && std.is_finite() {
        (m, std)
    } else {
        (m, 1.0)
    }
}
