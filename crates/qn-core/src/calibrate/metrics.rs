//! Ranking and calibration metrics.

use serde::{Deserialize, Serialize};

pub const DEFAULT_RELIABILITY_BINS: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Metrics {
    pub auc: f64,
    pub brier: f64,
}

impl Metrics {
    pub fn evaluate(predictions: &[f64], labels: &[bool]) -> Self {
        Self {
            auc: auc(predictions, labels),
            brier: brier(predictions, labels),
        }
    }
}

/// One non-empty reliability-diagram bin.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ReliabilityBin {
    #[serde(rename = "predMean")]
    pub pred_mean: f64,
    #[serde(rename = "obsMean")]
    pub obs_mean: f64,
    pub count: usize,
}

/// Rank-based area under the ROC curve; 0.5 when either class is absent.
pub fn auc(predictions: &[f64], labels: &[bool]) -> f64 {
    let mut pairs: Vec<(f64, bool)> = predictions.iter().copied().zip(labels.iter().copied()).collect();
    pairs.sort_by(|a, b| b.0.total_cmp(&a.0));

    let (mut positives, mut negatives) = (0u64, 0u64);
    let mut acc = 0u64;
    for (_, y) in pairs {
        if y {
            positives += 1;
        } else {
            acc += positives;
            negatives += 1;
        }
    }
    if positives == 0 || negatives == 0 {
        return 0.5;
    }
    acc as f64 / (positives as f64 * negatives as f64)
}

/// Mean squared error against 0/1 outcomes; 0 for an empty set.
pub fn brier(predictions: &[f64], labels: &[bool]) -> f64 {
    let n = predictions.len().min(labels.len());
    if n == 0 {
        return 0.0;
    }
    let sum: f64 = predictions
        .iter()
        .zip(labels)
        .map(|(p, y)| (p - if *y { 1.0 } else { 0.0 }).powi(2))
        .sum();
    sum / n as f64
}

/// Equal-width bins over `[0, 1)`; a prediction of exactly 1 joins the last
/// bin. Empty bins are omitted.
pub fn reliability(predictions: &[f64], labels: &[bool], n_bins: usize) -> Vec<ReliabilityBin> {
    let n_bins = n_bins.max(1);
    let mut sums = vec![(0.0f64, 0.0f64, 0usize); n_bins];
    for (p, y) in predictions.iter().zip(labels) {
        if !(0.0..=1.0).contains(p) {
            continue;
        }
        let idx = ((p * n_bins as f64) as usize).min(n_bins - 1);
        let bin = &mut sums[idx];
        bin.0 += p;
        bin.1 += if *y { 1.0 } else { 0.0 };
        bin.2 += 1;
    }
    sums.into_iter()
        .filter(|(_, _, count)| *count > 0)
        .map(|(p, o, count)| ReliabilityBin {
            pred_mean: p / count as f64,
            obs_mean: o / count as f64,
            count,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auc_perfect_and_inverted() {
        let p = [0.9, 0.8, 0.2, 0.1];
        assert_eq!(auc(&p, &[true, true, false, false]), 1.0);
        assert_eq!(auc(&p, &[false, false, true, true]), 0.0);
        assert_eq!(auc(&p, &[true, false, true, false]), 0.75);
    }

    #[test]
    fn auc_single_class_is_half() {
        assert_eq!(auc(&[0.1, 0.9], &[true, true]), 0.5);
        assert_eq!(auc(&[0.1, 0.9], &[false, false]), 0.5);
        assert_eq!(auc(&[], &[]), 0.5);
    }

    #[test]
    fn brier_basics() {
        assert_eq!(brier(&[1.0, 0.0], &[true, false]), 0.0);
        assert_eq!(brier(&[0.5, 0.5], &[true, false]), 0.25);
        assert_eq!(brier(&[], &[]), 0.0);
    }

    #[test]
    fn reliability_bins_skip_empty() {
        let preds = [0.05, 0.07, 0.55, 1.0];
        let labels = [false, true, true, true];
        let bins = reliability(&preds, &labels, 10);
        assert_eq!(bins.len(), 3);
        assert_eq!(bins[0].count, 2);
        assert!((bins[0].pred_mean - 0.06).abs() < 1e-12);
        assert_eq!(bins[0].obs_mean, 0.5);
        assert_eq!(bins[2].pred_mean, 1.0);
    }

    #[test]
    fn reliability_serde_names() {
        let json = serde_json::to_value(ReliabilityBin {
            pred_mean: 0.1,
            obs_mean: 0.2,
            count: 3,
        })
        .unwrap();
        assert!(json.get("predMean").is_some());
        assert!(json.get("obsMean").is_some());
    }
}
