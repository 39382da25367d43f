//! Regional training presets.
//!
//! Each preset adjusts the region, grid resolution, label threshold and
//! completeness magnitude of [`TrainingConfig::default`]. Dense regional
//! networks (California, Japan, New Zealand) use lower label and completeness
//! magnitudes and a shorter history.

use qn_common::BoundingBox;
use serde::Serialize;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::training::TrainingConfig;

/// Known preset names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PresetName {
    Global,
    SoutheastAsia,
    California,
    Japan,
    NewZealand,
}

impl PresetName {
    pub const ALL: [PresetName; 5] = [
        PresetName::Global,
        PresetName::SoutheastAsia,
        PresetName::California,
        PresetName::Japan,
        PresetName::NewZealand,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            PresetName::Global => "global",
            PresetName::SoutheastAsia => "southeast_asia",
            PresetName::California => "california",
            PresetName::Japan => "japan",
            PresetName::NewZealand => "new_zealand",
        }
    }

    fn description(self) -> &'static str {
        match self {
            PresetName::Global => "Whole globe at 0.5 degrees, M4.5+ labels, 7-day horizon",
            PresetName::SoutheastAsia => "Malaysia and Indonesia at 0.25 degrees, M4.5+ labels",
            PresetName::California => "California at 0.25 degrees, M3.5+ labels, dense network",
            PresetName::Japan => "Japan at 0.25 degrees, M3.5+ labels, dense network",
            PresetName::NewZealand => "New Zealand at 0.25 degrees, M3.5+ labels",
        }
    }
}

impl fmt::Display for PresetName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PresetName {
    type Err = PresetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('-', "_");
        PresetName::ALL
            .into_iter()
            .find(|p| p.as_str() == normalized)
            .ok_or_else(|| PresetError::Unknown(s.to_string()))
    }
}

/// Errors from preset lookup.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PresetError {
    #[error("unknown preset '{0}' (expected one of: global, southeast_asia, california, japan, new_zealand)")]
    Unknown(String),
}

impl From<PresetError> for qn_common::Error {
    fn from(err: PresetError) -> Self {
        qn_common::Error::Config(err.to_string())
    }
}

/// Summary row for `list_presets`.
#[derive(Debug, Clone, Serialize)]
pub struct PresetInfo {
    pub name: PresetName,
    pub description: &'static str,
    pub bbox: BoundingBox,
    pub cell_deg: f64,
    pub label_magnitude: f64,
}

/// Build the training configuration for a preset.
pub fn get_preset(name: PresetName) -> TrainingConfig {
    let base = TrainingConfig::default();
    match name {
        PresetName::Global => TrainingConfig {
            bbox: BoundingBox::new(-180.0, -90.0, 180.0, 90.0),
            cell_deg: 0.5,
            horizons: vec![7.0],
            ..base
        },
        PresetName::SoutheastAsia => base,
        PresetName::California => dense_region(base, BoundingBox::new(-125.0, 32.0, -114.0, 42.0)),
        PresetName::Japan => dense_region(base, BoundingBox::new(128.0, 30.0, 146.0, 46.0)),
        PresetName::NewZealand => dense_region(base, BoundingBox::new(165.0, -48.0, 180.0, -34.0)),
    }
}

fn dense_region(base: TrainingConfig, bbox: BoundingBox) -> TrainingConfig {
    TrainingConfig {
        bbox,
        label_magnitude: 3.5,
        completeness_magnitude: 3.0,
        train_start: "2015-01-01".to_string(),
        ..base
    }
}

/// All presets with a short description.
pub fn list_presets() -> Vec<PresetInfo> {
    PresetName::ALL
        .into_iter()
        .map(|name| {
            let cfg = get_preset(name);
            PresetInfo {
                name,
                description: name.description(),
                bbox: cfg.bbox,
                cell_deg: cfg.cell_deg,
                label_magnitude: cfg.label_magnitude,
            }
        })
        .collect()
}
