//! Platt scaling: `sigmoid(A · logit(p) + B)` fit by damped Newton steps.

use qn_math::{logit, sigmoid};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::debug;

pub const MAX_NEWTON_ITERATIONS: usize = 100;
const DAMPING: f64 = 0.1;
const TOLERANCE: f64 = 1e-6;
const MIN_DETERMINANT: f64 = 1e-10;

/// Logit-space affine remap. The default is the identity.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Calibration {
    #[serde(rename = "A")]
    pub a: f64,
    #[serde(rename = "B")]
    pub b: f64,
}

impl Default for Calibration {
    fn default() -> Self {
        Self { a: 1.0, b: 0.0 }
    }
}

impl Calibration {
    pub fn apply(&self, p: f64) -> f64 {
        sigmoid(self.a * logit(p) + self.b)
    }

    pub fn is_identity(&self) -> bool {
        *self == Self::default()
    }
}

/// Result of one Newton iteration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NewtonStep {
    pub next: Calibration,
    /// Undamped Newton deltas.
    pub delta_a: f64,
    pub delta_b: f64,
}

impl NewtonStep {
    pub fn converged(&self) -> bool {
        self.delta_a.abs() < TOLERANCE && self.delta_b.abs() < TOLERANCE
    }
}

/// One damped Newton update of `(A, B)`, or `None` if the Hessian is
/// (near) singular.
pub fn newton_step(current: Calibration, predictions: &[f64], labels: &[bool]) -> Option<NewtonStep> {
    let (mut ga, mut gb) = (0.0, 0.0);
    let (mut haa, mut hab, mut hbb) = (0.0, 0.0, 0.0);
    for (p, y) in predictions.iter().zip(labels) {
        let x = logit(*p);
        let q = sigmoid(current.a * x + current.b);
        let diff = q - if *y { 1.0 } else { 0.0 };
        let w = q * (1.0 - q);
        ga += diff * x;
        gb += diff;
        haa += w * x * x;
        hab += w * x;
        hbb += w;
    }

    let det = haa * hbb - hab * hab;
    if det.abs() < MIN_DETERMINANT {
        return None;
    }
    let delta_a = -(hbb * ga - hab * gb) / det;
    let delta_b = -(-hab * ga + haa * gb) / det;
    Some(NewtonStep {
        next: Calibration {
            a: current.a + DAMPING * delta_a,
            b: current.b + DAMPING * delta_b,
        },
        delta_a,
        delta_b,
    })
}

/// Fit `(A, B)` starting from the identity. Stops early on a singular
/// Hessian or when both deltas fall below tolerance.
pub fn fit(predictions: &[f64], labels: &[bool]) -> Calibration {
    let mut cal = Calibration::default();
    for iteration in 0..MAX_NEWTON_ITERATIONS {
        let Some(step) = newton_step(cal, predictions, labels) else {
            debug!(iteration, "platt hessian singular; keeping current parameters");
            break;
        };
        cal = step.next;
        if step.converged() {
            debug!(iteration, a = cal.a, b = cal.b, "platt scaling converged");
            break;
        }
    }
    cal
}
