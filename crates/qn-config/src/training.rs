//! Offline training configuration.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use qn_common::BoundingBox;
use serde::{Deserialize, Serialize};

use crate::kernel::KernelParams;
use crate::validate::{
    require_finite, require_positive, require_range, ValidationError, ValidationResult,
};

/// Lowest magnitude ever requested from the upstream catalog.
pub const MIN_FETCH_MAGNITUDE: f64 = 2.5;

/// Longest accepted prediction horizon in days.
pub const MAX_HORIZON_DAYS: f64 = 365.0;

/// Upper bound on any day-count setting (one hundred years).
pub const MAX_DAY_COUNT: u32 = 36_500;

/// Logistic-regression hyper-parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClassifierParams {
    /// L2 penalty on feature weights (not the intercept).
    pub l2: f64,
    pub learning_rate: f64,
    pub max_iterations: usize,
}

impl Default for ClassifierParams {
    fn default() -> Self {
        Self {
            l2: 0.01,
            learning_rate: 0.01,
            max_iterations: 1000,
        }
    }
}

/// Complete configuration of a training run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingConfig {
    pub bbox: BoundingBox,
    pub cell_deg: f64,

    /// Minimum magnitude of a positive label.
    pub label_magnitude: f64,
    /// Prediction horizons in days; the first is used for training.
    pub horizons: Vec<f64>,

    /// ISO date (`2015-01-01`), RFC 3339 timestamp, or `"now"`.
    pub train_start: String,
    pub train_end: String,
    pub holdout_days: u32,

    /// Catalog completeness magnitude (Mc).
    pub completeness_magnitude: f64,

    /// Radius for rate, magnitude, recency and label features.
    #[serde(default = "default_feature_radius_km")]
    pub feature_radius_km: f64,
    #[serde(default = "default_sample_cadence_days")]
    pub sample_cadence_days: u32,
    #[serde(default = "default_warmup_days")]
    pub warmup_days: u32,
    #[serde(default = "default_validation_days")]
    pub validation_days: u32,

    #[serde(default)]
    pub classifier: ClassifierParams,
    #[serde(default)]
    pub kernel: KernelParams,
}

fn default_feature_radius_km() -> f64 {
    100.0
}

fn default_sample_cadence_days() -> u32 {
    7
}

fn default_warmup_days() -> u32 {
    90
}

fn default_validation_days() -> u32 {
    180
}

/// Resolved absolute bounds of the historical catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrainingWindow {
    pub start: DateTime<Utc>,
    /// End of the fetched catalog (`train_end - holdout_days`).
    pub end: DateTime<Utc>,
}

impl TrainingWindow {
    /// First sampled time point, after the feature warm-up.
    pub fn first_sample(&self, warmup_days: u32) -> Result<DateTime<Utc>, ValidationError> {
        self.start
            .checked_add_signed(Duration::days(i64::from(warmup_days)))
            .ok_or_else(|| out_of_range("warmup_days"))
    }

    /// Exclusive upper bound for sampled time points; labels need `horizon` of future.
    pub fn last_sample_bound(&self, horizon_days: f64) -> Result<DateTime<Utc>, ValidationError> {
        let millis = horizon_days * 86_400_000.0;
        if !millis.is_finite() || millis.abs() >= i64::MAX as f64 {
            return Err(out_of_range("horizons"));
        }
        Duration::try_milliseconds(millis.round() as i64)
            .and_then(|d| self.end.checked_sub_signed(d))
            .ok_or_else(|| out_of_range("horizons"))
    }
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            bbox: BoundingBox::new(95.0, -12.0, 141.0, 7.0),
            cell_deg: 0.25,
            label_magnitude: 4.5,
            horizons: vec![1.0, 3.0, 7.0],
            train_start: "2010-01-01".to_string(),
            train_end: "now".to_string(),
            holdout_days: 90,
            completeness_magnitude: 4.0,
            feature_radius_km: default_feature_radius_km(),
            sample_cadence_days: default_sample_cadence_days(),
            warmup_days: default_warmup_days(),
            validation_days: default_validation_days(),
            classifier: ClassifierParams::default(),
            kernel: KernelParams::default(),
        }
    }
}

impl TrainingConfig {
    /// Load a training configuration from a JSON file.
    pub fn from_file(path: &std::path::Path) -> Result<Self, ValidationError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ValidationError::IoError(format!("Failed to read {}: {}", path.display(), e))
        })?;
        Self::parse_json(&content)
    }

    /// Parse a training configuration from a JSON string.
    pub fn parse_json(json: &str) -> Result<Self, ValidationError> {
        serde_json::from_str(json)
            .map_err(|e| ValidationError::ParseError(format!("Invalid JSON: {}", e)))
    }

    /// Horizon used to build labels and train the classifier.
    pub fn primary_horizon(&self) -> f64 {
        self.horizons.first().copied().unwrap_or(7.0)
    }

    /// Magnitude floor for catalog fetches: one unit below Mc, never below 2.5.
    pub fn fetch_min_magnitude(&self) -> f64 {
        (self.completeness_magnitude - 1.0).max(MIN_FETCH_MAGNITUDE)
    }

    /// Resolve `train_start`/`train_end` against `now`.
    ///
    /// `"now"` as an end resolves to the start of yesterday (UTC); as a start it
    /// resolves to one year before the end.
    pub fn resolve_window(&self, now: DateTime<Utc>) -> Result<TrainingWindow, ValidationError> {
        let train_end = if self.train_end.eq_ignore_ascii_case("now") {
            let yesterday = now
                .date_naive()
                .checked_sub_signed(Duration::days(1))
                .ok_or_else(|| out_of_range("train_end"))?;
            midnight(yesterday)
        } else {
            parse_instant("train_end", &self.train_end)?
        };
        let end = train_end
            .checked_sub_signed(Duration::days(i64::from(self.holdout_days)))
            .ok_or_else(|| out_of_range("holdout_days"))?;
        let start = if self.train_start.eq_ignore_ascii_case("now") {
            end.checked_sub_signed(Duration::days(365))
                .ok_or_else(|| out_of_range("train_start"))?
        } else {
            parse_instant("train_start", &self.train_start)?
        };
        if start >= end {
            return Err(ValidationError::invalid(
                "train_start",
                format!("training window is empty: start {start} is not before end {end}"),
            ));
        }
        Ok(TrainingWindow { start, end })
    }

    pub fn validate(&self) -> ValidationResult {
        self.bbox
            .validate()
            .map_err(|e| ValidationError::invalid("bbox", e.to_string()))?;
        require_positive("cell_deg", self.cell_deg)?;
        require_finite("label_magnitude", self.label_magnitude)?;
        require_finite("completeness_magnitude", self.completeness_magnitude)?;
        if self.horizons.is_empty() {
            return Err(ValidationError::invalid("horizons", "at least one horizon is required"));
        }
        for h in &self.horizons {
            require_positive("horizons", *h)?;
            require_range("horizons", *h, 0.0, MAX_HORIZON_DAYS)?;
        }
        require_positive("feature_radius_km", self.feature_radius_km)?;
        if self.sample_cadence_days == 0 {
            return Err(ValidationError::invalid("sample_cadence_days", "must be at least 1"));
        }
        for (field, days) in [
            ("holdout_days", self.holdout_days),
            ("sample_cadence_days", self.sample_cadence_days),
            ("warmup_days", self.warmup_days),
            ("validation_days", self.validation_days),
        ] {
            if days > MAX_DAY_COUNT {
                return Err(ValidationError::invalid(
                    field,
                    format!("must be at most {MAX_DAY_COUNT}, got {days}"),
                ));
            }
        }
        require_range("classifier.l2", self.classifier.l2, 0.0, f64::MAX)?;
        require_positive("classifier.learning_rate", self.classifier.learning_rate)?;
        if self.classifier.max_iterations == 0 {
            return Err(ValidationError::invalid(
                "classifier.max_iterations",
                "must be at least 1",
            ));
        }
        self.kernel.validate()
    }
}

fn out_of_range(field: &'static str) -> ValidationError {
    ValidationError::invalid(field, "time out of range")
}

fn midnight(date: NaiveDate) -> DateTime<Utc> {
    date.and_hms_opt(0, 0, 0).unwrap_or_default().and_utc()
}

fn parse_instant(field: &'static str, value: &str) -> Result<DateTime<Utc>, ValidationError> {
    if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        return Ok(midnight(date));
    }
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| {
            ValidationError::invalid(
                field,
                format!("'{value}' is neither YYYY-MM-DD, RFC 3339, nor \"now\""),
            )
        })
}
