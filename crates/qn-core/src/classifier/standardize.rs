//! Column standardization and its inverse on linear weights.

use qn_math::mean_and_std;

/// Per-column training-set mean and standard deviation (floored to 1).
#[derive(Debug, Clone, PartialEq)]
pub struct Standardizer {
    pub means: Vec<f64>,
    pub stds: Vec<f64>,
}

impl Standardizer {
    /// Fit on `rows`, each of length `n_features`.
    pub fn fit(rows: &[Vec<f64>], n_features: usize) -> Self {
        let (means, stds) = (0..n_features)
            .map(|j| {
                let column: Vec<f64> = rows.iter().map(|r| r[j]).collect();
                mean_and_std(&column)
            })
            .unzip();
        Self { means, stds }
    }

    pub fn transform(&self, row: &[f64]) -> Vec<f64> {
        row.iter()
            .zip(self.means.iter().zip(&self.stds))
            .map(|(x, (m, s))| (x - m) / s)
            .collect()
    }

    /// Map weights learned on standardized inputs back to raw inputs.
    ///
    /// Returns `(intercept, coefficients)` with `coeff = w / std` and
    /// `intercept = b − Σ w · mean / std`.
    pub fn destandardize(&self, intercept: f64, weights: &[f64]) -> (f64, Vec<f64>) {
        let coeffs: Vec<f64> = weights.iter().zip(&self.stds).map(|(w, s)| w / s).collect();
        let shift: f64 = coeffs.iter().zip(&self.means).map(|(c, m)| c * m).sum();
        (intercept - shift, coeffs)
    }
}
