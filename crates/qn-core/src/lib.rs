//! Earthquake nowcasting: an ETAS-style intensity kernel, causal features, a
//! calibrated logistic classifier, the offline training pipeline, and the
//! budget-guarded online scoring service.

pub mod aftershock;
pub mod artifact;
pub mod calibrate;
pub mod catalog;
pub mod classifier;
pub mod exit_codes;
pub mod features;
pub mod grid;
pub mod kernel;
pub mod logging;
pub mod service;
pub mod train;

pub use aftershock::{compute_ring, AftershockRing, Mainshock, RingSpec};
pub use artifact::{EvaluationReport, ModelArtifact};
pub use calibrate::Calibration;
pub use catalog::{Catalog, CatalogQuery, CatalogSource, StaticCatalog, UsgsClient};
pub use classifier::Model;
pub use exit_codes::ExitCode;
pub use features::{extract_features, label_for, FeatureSettings, FeatureVector, LabeledSample};
pub use grid::{build_grid, check_budget, evaluate_grid, GridCell, GridSpec};
pub use kernel::{intensity, probability_at_least_one};
pub use service::{NowcastService, PredictionQuery, PredictionResponse};
pub use train::{TrainingOutcome, TrainingPipeline};
