//! L2-regularized logistic regression trained by batch gradient descent.

mod standardize;

use std::collections::BTreeMap;

use qn_common::{Error, Result};
use qn_config::ClassifierParams;
use qn_math::sigmoid;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::features::{is_known_feature, FeatureVector, LabeledSample, FEATURE_NAMES};

pub use standardize::Standardizer;

/// Added inside the log when reporting loss.
const LOSS_EPS: f64 = 1e-10;
const LOG_EVERY: usize = 100;

/// Exported model operating on raw (unstandardized) features.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Model {
    pub intercept: f64,
    pub coeffs: BTreeMap<String, f64>,
    #[serde(rename = "featureNames")]
    pub feature_names: Vec<String>,
}

impl Model {
    /// Linear score before the sigmoid.
    pub fn decision(&self, features: &FeatureVector) -> f64 {
        self.feature_names.iter().fold(self.intercept, |acc, name| {
            let coeff = self.coeffs.get(name).copied().unwrap_or(0.0);
            acc + coeff * features.get(name).unwrap_or(0.0)
        })
    }

    /// Uncalibrated probability.
    pub fn predict(&self, features: &FeatureVector) -> f64 {
        sigmoid(self.decision(features))
    }

    /// Every named feature must be known and carry a finite coefficient.
    pub fn validate(&self) -> Result<()> {
        if !self.intercept.is_finite() {
            return Err(Error::ModelUnavailable("model intercept is not finite".into()));
        }
        for name in &self.feature_names {
            if !is_known_feature(name) {
                return Err(Error::ModelUnavailable(format!("unknown feature '{name}'")));
            }
            match self.coeffs.get(name) {
                Some(c) if c.is_finite() => {}
                _ => {
                    return Err(Error::ModelUnavailable(format!(
                        "missing or non-finite coefficient for '{name}'"
                    )))
                }
            }
        }
        Ok(())
    }

    /// `(name, coeff)` sorted by absolute coefficient, largest first.
    pub fn importance(&self) -> Vec<(String, f64)> {
        let mut out: Vec<(String, f64)> = self
            .feature_names
            .iter()
            .map(|n| (n.clone(), self.coeffs.get(n).copied().unwrap_or(0.0)))
            .collect();
        out.sort_by(|a, b| b.1.abs().total_cmp(&a.1.abs()));
        out
    }
}

/// Parameters during gradient descent, in standardized space.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingState {
    pub intercept: f64,
    pub weights: Vec<f64>,
    /// Weighted mean log-loss at the parameters before this step.
    pub loss: f64,
}

impl TrainingState {
    pub fn zeros(n_features: usize) -> Self {
        Self {
            intercept: 0.0,
            weights: vec![0.0; n_features],
            loss: f64::NAN,
        }
    }
}

/// Standardized design matrix with targets and per-sample weights.
#[derive(Debug, Clone)]
pub struct Design {
    pub x: Vec<Vec<f64>>,
    pub y: Vec<f64>,
    pub sample_weights: Vec<f64>,
}

/// `negatives / positives`, or 1 when there are no positives.
pub fn positive_class_weight(labels: &[f64]) -> f64 {
    let positives = labels.iter().filter(|y| **y > 0.5).count();
    let negatives = labels.len() - positives;
    if positives == 0 {
        return 1.0;
    }
    negatives as f64 / positives as f64
}

/// One gradient-descent update. No L2 penalty on the intercept.
pub fn step(state: &TrainingState, design: &Design, params: &ClassifierParams) -> TrainingState {
    let n = design.y.len().max(1) as f64;
    let mut grad_b = 0.0;
    let mut grad_w = vec![0.0; state.weights.len()];
    let mut loss = 0.0;

    for ((row, y), weight) in design.x.iter().zip(&design.y).zip(&design.sample_weights) {
        let z = state.intercept
            + row
                .iter()
                .zip(&state.weights)
                .map(|(x, w)| x * w)
                .sum::<f64>();
        let p = sigmoid(z);
        let err = (p - y) * weight;
        grad_b += err;
        for (g, x) in grad_w.iter_mut().zip(row) {
            *g += err * x;
        }
        loss += -weight * (y * (p + LOSS_EPS).ln() + (1.0 - y) * (1.0 - p + LOSS_EPS).ln());
    }

    let weights = state
        .weights
        .iter()
        .zip(&grad_w)
        .map(|(w, g)| w - params.learning_rate * (g / n + params.l2 * w))
        .collect();
    TrainingState {
        intercept: state.intercept - params.learning_rate * grad_b / n,
        weights,
        loss: loss / n,
    }
}

/// Fit a model on `samples` over all known features.
///
/// Always runs `max_iterations` steps; convergence is only observable through
/// the logged loss.
pub fn train(samples: &[LabeledSample], params: &ClassifierParams) -> Result<Model> {
    if samples.is_empty() {
        return Err(Error::InsufficientData("no training samples".into()));
    }
    let raw: Vec<Vec<f64>> = samples.iter().map(|s| s.features.values().to_vec()).collect();
    let y: Vec<f64> = samples.iter().map(LabeledSample::target).collect();
    let standardizer = Standardizer::fit(&raw, FEATURE_NAMES.len());

    let pos_weight = positive_class_weight(&y);
    let positives = y.iter().filter(|v| **v > 0.5).count();
    if positives == 0 {
        warn!(samples = samples.len(), "training set has no positive samples");
    }
    info!(
        samples = samples.len(),
        positives,
        negatives = samples.len() - positives,
        pos_weight,
        "training logistic regression"
    );

    let design = Design {
        x: raw.iter().map(|r| standardizer.transform(r)).collect(),
        sample_weights: y
            .iter()
            .map(|v| if *v > 0.5 { pos_weight } else { 1.0 })
            .collect(),
        y,
    };

    let mut state = TrainingState::zeros(FEATURE_NAMES.len());
    for iteration in 0..params.max_iterations {
        state = step(&state, &design, params);
        if iteration % LOG_EVERY == 0 {
            debug!(iteration, loss = state.loss, "gradient descent");
        }
    }

    let (intercept, coeffs) = standardizer.destandardize(state.intercept, &state.weights);
    Ok(Model {
        intercept,
        coeffs: FEATURE_NAMES
            .iter()
            .map(|n| n.to_string())
            .zip(coeffs)
            .collect(),
        feature_names: FEATURE_NAMES.iter().map(|n| n.to_string()).collect(),
    })
}
