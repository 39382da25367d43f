//! Offline training: catalog → samples → classifier → calibration → artifacts.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use qn_common::{BoundingBox, Error, Result, RunId, ARTIFACT_SCHEMA_VERSION};
use qn_config::TrainingConfig;
use qn_math::EARTH_RADIUS_KM;
use tracing::{debug, info, warn};

use crate::artifact::{
    ArtifactConfig, DatasetStats, EvaluationReport, FeatureImportance, MetricsComparison,
    ModelArtifact, EVAL_FILE_NAME, MODEL_FILE_NAME,
};
use crate::calibrate::{self, Metrics, DEFAULT_RELIABILITY_BINS};
use crate::catalog::{Catalog, CatalogQuery, CatalogSource};
use crate::classifier;
use crate::features::{labeled_sample, FeatureSettings, LabeledSample};
use crate::grid::build_grid;

const PROGRESS_EVERY: usize = 10_000;

/// Artifacts produced by one run.
#[derive(Debug, Clone)]
pub struct TrainingOutcome {
    pub artifact: ModelArtifact,
    pub report: EvaluationReport,
}

/// Where a persisted run landed.
#[derive(Debug, Clone)]
pub struct PersistedPaths {
    pub model: PathBuf,
    pub evaluation: PathBuf,
}

/// Sample instants `first, first + cadence, ...` strictly before `bound`.
pub fn sample_times(
    first: DateTime<Utc>,
    bound: DateTime<Utc>,
    cadence_days: u32,
) -> Vec<DateTime<Utc>> {
    let step = Duration::days(i64::from(cadence_days.max(1)));
    std::iter::successors(Some(first), |t| t.checked_add_signed(step))
        .take_while(|t| *t < bound)
        .collect()
}

/// Catalog region for training: the grid box widened by the larger of the
/// feature radius and the kernel cutoff, so edge cells see their neighbours.
pub fn fetch_region(cfg: &TrainingConfig) -> BoundingBox {
    let reach_km = cfg.feature_radius_km.max(cfg.kernel.radius_km);
    let lat_pad = (reach_km / EARTH_RADIUS_KM).to_degrees();
    let edge_lat = (cfg.bbox.min_lat.abs().max(cfg.bbox.max_lat.abs()) + lat_pad).min(90.0);
    let cos = edge_lat.to_radians().cos();
    let lon_pad = if cos > 1e-6 { lat_pad / cos } else { 360.0 };
    BoundingBox::new(
        (cfg.bbox.min_lon - lon_pad).max(-180.0),
        (cfg.bbox.min_lat - lat_pad).max(-90.0),
        (cfg.bbox.max_lon + lon_pad).min(180.0),
        (cfg.bbox.max_lat + lat_pad).min(90.0),
    )
}

/// Samples before `split` train; the rest validate.
pub fn temporal_split(
    samples: Vec<LabeledSample>,
    split: DateTime<Utc>,
) -> (Vec<LabeledSample>, Vec<LabeledSample>) {
    samples.into_iter().partition(|s| s.time < split)
}

pub struct TrainingPipeline {
    config: TrainingConfig,
    source: Arc<dyn CatalogSource>,
}

impl TrainingPipeline {
    pub fn new(config: TrainingConfig, source: Arc<dyn CatalogSource>) -> Result<Self> {
        config.validate()?;
        Ok(Self { config, source })
    }

    pub fn config(&self) -> &TrainingConfig {
        &self.config
    }

    /// Run every stage and return the artifacts without writing them.
    pub fn run(&self, now: DateTime<Utc>) -> Result<TrainingOutcome> {
        let cfg = &self.config;
        let window = cfg.resolve_window(now)?;
        let horizon = cfg.primary_horizon();
        info!(
            start = %window.start,
            end = %window.end,
            horizon,
            source = self.source.name(),
            "training run started"
        );

        let query = CatalogQuery::since(window.start, cfg.fetch_min_magnitude())
            .until(window.end)
            .within(fetch_region(cfg));
        let catalog = Catalog::new(self.source.fetch(&query)?);
        info!(events = catalog.len(), "catalog loaded");

        let grid = build_grid(&cfg.bbox, cfg.cell_deg)?;
        let bound = window.last_sample_bound(horizon)?;
        let times = sample_times(window.first_sample(cfg.warmup_days)?, bound, cfg.sample_cadence_days);
        info!(cells = grid.cell_count(), time_points = times.len(), "sampling grid");

        let settings = FeatureSettings::from_training(cfg);
        let total = times.len() * grid.cell_count();
        let mut samples = Vec::with_capacity(total);
        for t in &times {
            for c in grid.centers() {
                samples.push(labeled_sample(c.lat, c.lon, *t, horizon, &catalog, &settings));
                if samples.len() % PROGRESS_EVERY == 0 {
                    debug!(done = samples.len(), total, "extracting samples");
                }
            }
        }
        let positives = samples.iter().filter(|s| s.label).count();
        let positive_rate = if samples.is_empty() {
            0.0
        } else {
            positives as f64 / samples.len() as f64
        };
        info!(samples = samples.len(), positives, positive_rate, "samples extracted");

        let split = bound
            .checked_sub_signed(Duration::days(i64::from(cfg.validation_days)))
            .ok_or_else(|| Error::invalid("validation split is out of range"))?;
        let (train, val) = temporal_split(samples, split);
        info!(train = train.len(), validation = val.len(), split = %split, "temporal split");
        if train.is_empty() {
            return Err(Error::InsufficientData(
                "no samples fall before the validation split; widen the training window".into(),
            ));
        }
        if val.is_empty() {
            return Err(Error::InsufficientData(
                "validation split is empty; widen the training window".into(),
            ));
        }

        let model = classifier::train(&train, &cfg.classifier)?;

        let val_labels: Vec<bool> = val.iter().map(|s| s.label).collect();
        let raw_preds: Vec<f64> = val.iter().map(|s| model.predict(&s.features)).collect();
        let raw = Metrics::evaluate(&raw_preds, &val_labels);
        info!(auc = raw.auc, brier = raw.brier, "raw validation metrics");

        let calibration = calibrate::fit(&raw_preds, &val_labels);
        let cal_preds: Vec<f64> = raw_preds.iter().map(|p| calibration.apply(*p)).collect();
        let calibrated = Metrics::evaluate(&cal_preds, &val_labels);
        info!(
            a = calibration.a,
            b = calibration.b,
            auc = calibrated.auc,
            brier = calibrated.brier,
            "calibrated validation metrics"
        );
        if !val_labels.iter().any(|y| *y) {
            warn!("validation split has no positives; AUC is uninformative");
        }

        let reliability = calibrate::reliability(&cal_preds, &val_labels, DEFAULT_RELIABILITY_BINS);
        let feature_importance = model
            .importance()
            .into_iter()
            .map(|(name, coeff)| FeatureImportance { name, coeff })
            .collect();

        let artifact = ModelArtifact {
            version: ARTIFACT_SCHEMA_VERSION.to_string(),
            trained: now,
            config: ArtifactConfig::from_training(cfg),
            model,
            calibration,
            etas_params: cfg.kernel,
        };
        let report = EvaluationReport {
            version: ARTIFACT_SCHEMA_VERSION.to_string(),
            evaluated: now,
            run_id: RunId::new(),
            dataset: DatasetStats {
                train_samples: train.len(),
                val_samples: val.len(),
                positive_rate,
            },
            metrics: MetricsComparison { raw, calibrated },
            reliability,
            feature_importance,
        };
        Ok(TrainingOutcome { artifact, report })
    }

    /// Run and write `nowcast.json` and `nowcast_eval.json` into `out_dir`.
    pub fn run_and_persist(
        &self,
        now: DateTime<Utc>,
        out_dir: &Path,
    ) -> Result<(TrainingOutcome, PersistedPaths)> {
        let outcome = self.run(now)?;
        let paths = PersistedPaths {
            model: out_dir.join(MODEL_FILE_NAME),
            evaluation: out_dir.join(EVAL_FILE_NAME),
        };
        outcome.artifact.save(&paths.model)?;
        outcome.report.save(&paths.evaluation)?;
        Ok((outcome, paths))
    }
}
