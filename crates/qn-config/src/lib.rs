//! Quake nowcast configuration loading and validation.
//!
//! This crate provides:
//! - Typed Rust structs for kernel, training, and service configuration
//! - Regional training presets
//! - Config resolution (CLI → env → XDG → defaults)
//! - Semantic validation

pub mod kernel;
pub mod preset;
pub mod resolve;
pub mod service;
pub mod training;
pub mod validate;

pub use kernel::KernelParams;
pub use preset::{get_preset, list_presets, PresetError, PresetInfo, PresetName};
pub use resolve::{resolve_config, ConfigSource, CONFIG_ENV_VAR};
pub use service::{AftershockDefaults, RateLimitConfig, ServiceConfig};
pub use training::{ClassifierParams, TrainingConfig, TrainingWindow, MIN_FETCH_MAGNITUDE};
pub use validate::{ValidationError, ValidationResult};

/// Schema version for configuration files.
pub const CONFIG_SCHEMA_VERSION: &str = "1.0.0";
