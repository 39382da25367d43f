//! Persisted model and evaluation artifacts.
//!
//! Both are plain JSON documents written atomically (temp file + rename) so a
//! concurrent reader never observes a partial file.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;

use chrono::{DateTime, Utc};
use qn_common::schema::is_compatible;
use qn_common::{BoundingBox, Error, Result, RunId, ARTIFACT_SCHEMA_VERSION};
use qn_config::{KernelParams, TrainingConfig};
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::calibrate::{Calibration, Metrics, ReliabilityBin};
use crate::classifier::Model;
use crate::features::{FeatureSettings, FeatureVector, FEATURE_NAMES};

pub const MODEL_FILE_NAME: &str = "nowcast.json";
pub const EVAL_FILE_NAME: &str = "nowcast_eval.json";

fn default_feature_radius_km() -> f64 {
    100.0
}

/// Training settings a scorer needs to reproduce features and defaults.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactConfig {
    /// `[minLon, minLat, maxLon, maxLat]`
    #[schemars(with = "[f64; 4]")]
    pub bbox: BoundingBox,
    pub cell_deg: f64,
    #[serde(alias = "M0_label")]
    pub label_magnitude: f64,
    /// Training horizon in days.
    pub horizon: f64,
    #[serde(alias = "Mc_min")]
    pub completeness_magnitude: f64,
    #[serde(default = "default_feature_radius_km")]
    pub feature_radius_km: f64,
}

impl ArtifactConfig {
    pub fn from_training(config: &TrainingConfig) -> Self {
        Self {
            bbox: config.bbox,
            cell_deg: config.cell_deg,
            label_magnitude: config.label_magnitude,
            horizon: config.primary_horizon(),
            completeness_magnitude: config.completeness_magnitude,
            feature_radius_km: config.feature_radius_km,
        }
    }
}

/// A trained, calibrated, versioned model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ModelArtifact {
    pub version: String,
    pub trained: DateTime<Utc>,
    pub config: ArtifactConfig,
    pub model: Model,
    pub calibration: Calibration,
    pub etas_params: KernelParams,
}

impl ModelArtifact {
    /// Calibrated probability over the training horizon.
    pub fn score(&self, features: &FeatureVector) -> f64 {
        self.calibration.apply(self.model.predict(features))
    }

    pub fn feature_settings(&self) -> FeatureSettings {
        FeatureSettings {
            radius_km: self.config.feature_radius_km,
            label_magnitude: self.config.label_magnitude,
            kernel: self.etas_params,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !is_compatible(&self.version) {
            return Err(Error::IncompatibleModel {
                version: self.version.clone(),
            });
        }
        self.model.validate()?;
        self.etas_params.validate()?;
        self.config.bbox.validate()?;
        let cfg = &self.config;
        if !(cfg.cell_deg > 0.0 && cfg.horizon > 0.0 && cfg.feature_radius_km > 0.0) {
            return Err(Error::ModelUnavailable(
                "cellDeg, horizon and featureRadiusKm must be positive".into(),
            ));
        }
        if !(self.calibration.a.is_finite() && self.calibration.b.is_finite()) {
            return Err(Error::ModelUnavailable("calibration is not finite".into()));
        }
        Ok(())
    }

    /// Hand-set coefficients with identity calibration over Southeast Asia.
    ///
    /// Only for demos and smoke tests before a model has been trained.
    pub fn placeholder(trained: DateTime<Utc>) -> Self {
        let coeffs = [0.45, 0.22, 0.15, 0.35, 0.25, 0.18, -0.31, 0.78];
        Self {
            version: ARTIFACT_SCHEMA_VERSION.to_string(),
            trained,
            config: ArtifactConfig {
                bbox: BoundingBox::new(95.0, -12.0, 141.0, 7.0),
                cell_deg: 0.25,
                label_magnitude: 4.5,
                horizon: 7.0,
                completeness_magnitude: 4.0,
                feature_radius_km: default_feature_radius_km(),
            },
            model: Model {
                intercept: -3.12,
                coeffs: FEATURE_NAMES
                    .iter()
                    .map(|n| n.to_string())
                    .zip(coeffs)
                    .collect(),
                feature_names: FEATURE_NAMES.iter().map(|n| n.to_string()).collect(),
            },
            calibration: Calibration::default(),
            etas_params: KernelParams::default(),
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        write_json_atomic(path, self)?;
        info!(path = %path.display(), version = %self.version, "model artifact written");
        Ok(())
    }

    /// Read and validate an artifact.
    pub fn load(path: &Path) -> Result<Self> {
        let artifact: Self = read_json(path).map_err(|e| match e {
            Error::Io(io) => Error::ModelUnavailable(format!("{}: {io}", path.display())),
            other => other,
        })?;
        artifact.validate()?;
        debug!(path = %path.display(), trained = %artifact.trained, "model artifact loaded");
        Ok(artifact)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DatasetStats {
    pub train_samples: usize,
    pub val_samples: usize,
    pub positive_rate: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricsComparison {
    pub raw: Metrics,
    pub calibrated: Metrics,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureImportance {
    pub name: String,
    pub coeff: f64,
}

/// Validation-set diagnostics of one training run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationReport {
    pub version: String,
    pub evaluated: DateTime<Utc>,
    pub run_id: RunId,
    pub dataset: DatasetStats,
    pub metrics: MetricsComparison,
    pub reliability: Vec<ReliabilityBin>,
    /// Sorted by absolute coefficient, largest first.
    pub feature_importance: Vec<FeatureImportance>,
}

impl EvaluationReport {
    pub fn save(&self, path: &Path) -> Result<()> {
        write_json_atomic(path, self)?;
        info!(path = %path.display(), run_id = %self.run_id, "evaluation report written");
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        read_json(path)
    }
}

/// Pretty-print `value` to `path` via a sibling temp file and rename.
pub fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir)?;
    }
    let json = serde_json::to_string_pretty(value)?;
    let tmp_path = path.with_extension("json.tmp");
    {
        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&tmp_path)?;
        file.write_all(json.as_bytes())?;
        file.sync_all()?;
    }
    fs::rename(&tmp_path, path)?;
    Ok(())
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let contents = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&contents)?)
}
