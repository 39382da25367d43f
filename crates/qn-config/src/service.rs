//! Online scoring service configuration.

use serde::{Deserialize, Serialize};

use crate::validate::{require_positive, require_range, ValidationError, ValidationResult};

/// Default upstream FDSN event endpoint.
pub const DEFAULT_CATALOG_URL: &str = "https://earthquake.usgs.gov/fdsnws/event/1/query";

/// Token-bucket limits applied per client.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Bucket capacity (burst size).
    pub capacity: u32,
    /// Seconds to refill an empty bucket.
    pub window_secs: u64,
    /// Buckets idle for longer than this are swept.
    pub idle_sweep_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            capacity: 30,
            window_secs: 600,
            idle_sweep_secs: 3600,
        }
    }
}

impl RateLimitConfig {
    /// Tokens added per second.
    pub fn refill_per_sec(&self) -> f64 {
        f64::from(self.capacity) / self.window_secs.max(1) as f64
    }
}

/// Defaults for aftershock ring queries.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AftershockDefaults {
    /// Minimum aftershock magnitude of interest.
    pub m0: f64,
    pub horizon_days: f64,
    pub radius_km: f64,
    pub n_points: usize,
    /// Catalog history fetched before the mainshock.
    pub lookback_days: u32,
    /// Upper bound accepted for `n_points`.
    pub max_points: usize,
}

impl Default for AftershockDefaults {
    fn default() -> Self {
        Self {
            m0: 3.0,
            horizon_days: 3.0,
            radius_km: 150.0,
            n_points: 64,
            lookback_days: 90,
            max_points: 720,
        }
    }
}

/// Resource and collaborator settings for the prediction service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Hard cap on estimated grid cells per request.
    pub cell_budget: usize,
    /// Cells at or below this probability are omitted from responses.
    pub min_probability: f64,
    pub max_cell_deg: f64,
    pub max_horizon_days: f64,
    /// History fetched for online feature extraction.
    pub catalog_lookback_days: u32,
    /// Degrees added around the request bbox when fetching events.
    pub catalog_padding_deg: f64,
    pub catalog_url: String,
    pub fetch_timeout_secs: u64,
    pub cache_ttl_secs: u64,
    pub rate_limit: RateLimitConfig,
    pub aftershock: AftershockDefaults,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            cell_budget: 1000,
            min_probability: 1e-3,
            max_cell_deg: 10.0,
            max_horizon_days: 30.0,
            catalog_lookback_days: 365,
            catalog_padding_deg: 5.0,
            catalog_url: DEFAULT_CATALOG_URL.to_string(),
            fetch_timeout_secs: 30,
            cache_ttl_secs: 900,
            rate_limit: RateLimitConfig::default(),
            aftershock: AftershockDefaults::default(),
        }
    }
}

impl ServiceConfig {
    /// Load service configuration from a JSON file.
    pub fn from_file(path: &std::path::Path) -> Result<Self, ValidationError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ValidationError::IoError(format!("Failed to read {}: {}", path.display(), e))
        })?;
        Self::parse_json(&content)
    }

    pub fn parse_json(json: &str) -> Result<Self, ValidationError> {
        serde_json::from_str(json)
            .map_err(|e| ValidationError::ParseError(format!("Invalid JSON: {}", e)))
    }

    pub fn validate(&self) -> ValidationResult {
        if self.cell_budget == 0 {
            return Err(ValidationError::invalid("cell_budget", "must be at least 1"));
        }
        require_range("min_probability", self.min_probability, 0.0, 1.0)?;
        require_positive("max_cell_deg", self.max_cell_deg)?;
        require_positive("max_horizon_days", self.max_horizon_days)?;
        require_range("catalog_padding_deg", self.catalog_padding_deg, 0.0, 90.0)?;
        if self.fetch_timeout_secs == 0 {
            return Err(ValidationError::invalid("fetch_timeout_secs", "must be at least 1"));
        }
        if self.rate_limit.capacity == 0 || self.rate_limit.window_secs == 0 {
            return Err(ValidationError::invalid(
                "rate_limit",
                "capacity and window_secs must be positive",
            ));
        }
        require_positive("aftershock.radius_km", self.aftershock.radius_km)?;
        require_positive("aftershock.horizon_days", self.aftershock.horizon_days)?;
        if self.aftershock.n_points == 0 || self.aftershock.n_points > self.aftershock.max_points {
            return Err(ValidationError::invalid(
                "aftershock.n_points",
                format!("must lie in [1, {}]", self.aftershock.max_points),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_valid() {
        assert!(ServiceConfig::default().validate().is_ok());
    }

    #[test]
    fn partial_json_fills_defaults() {
        let cfg = ServiceConfig::parse_json(r#"{"cell_budget": 250}"#).unwrap();
        assert_eq!(cfg.cell_budget, 250);
        assert_eq!(cfg.cache_ttl_secs, 900);
        assert_eq!(cfg.rate_limit.capacity, 30);
    }

    #[test]
    fn refill_rate() {
        let rl = RateLimitConfig::default();
        assert!((rl.refill_per_sec() - 0.05).abs() < 1e-12);
    }

    #[test]
    fn rejects_out_of_range_probability() {
        let cfg = ServiceConfig {
            min_probability: 2.0,
            ..ServiceConfig::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn from_file_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        let cfg = ServiceConfig {
            cell_budget: 42,
            ..ServiceConfig::default()
        };
        std::fs::write(&path, serde_json::to_string(&cfg).unwrap()).unwrap();
        assert_eq!(ServiceConfig::from_file(&path).unwrap(), cfg);
    }
}
