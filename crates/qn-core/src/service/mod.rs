//! Online scoring: prediction grids and aftershock rings behind request
//! guards (rate limit, validation, cell budget) and a response cache.

mod cache;
mod model_store;
mod rate_limit;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use qn_common::{BoundingBox, Error, Result};
use qn_config::{KernelParams, ServiceConfig, MIN_FETCH_MAGNITUDE};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::aftershock::{compute_ring, Mainshock, RingPoint, RingSpec, RingStatistics};
use crate::catalog::{Catalog, CatalogQuery, CatalogSource};
use crate::features::extract_features;
use crate::grid::{build_grid, check_budget, GridCell};
use crate::kernel::rescale_horizon;

pub use cache::{prediction_cache_key, MemoryCache, ResponseCache, MEMORY_CACHE_CAPACITY};
pub use model_store::{ModelSource, ModelStore};
pub use rate_limit::{RateDecision, RateLimiter, TokenBucketLimiter};

/// Requests between sweeps of idle rate-limit buckets.
const LIMITER_SWEEP_EVERY: u64 = 256;

pub const DISCLAIMER: &str =
    "EXPERIMENTAL PROBABILITIES - Educational use only. NOT for safety-critical decisions.";

/// Whether a response came from the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CacheStatus {
    Hit,
    Miss,
}

#[derive(Debug, Clone)]
pub struct Served<T> {
    pub response: T,
    pub cache: CacheStatus,
}

/// Grid prediction request. Unset fields fall back to the model's training
/// configuration.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct PredictionQuery {
    pub bbox: Option<BoundingBox>,
    pub cell_deg: Option<f64>,
    pub horizon_days: Option<f64>,
    /// Cells at or below this probability are omitted. Defaults to the
    /// service's `min_probability`.
    pub min_probability: Option<f64>,
    pub include_features: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionResponse {
    #[serde(rename = "type")]
    pub kind: String,
    pub generated: DateTime<Utc>,
    pub model_version: String,
    pub model_trained: DateTime<Utc>,
    pub horizon_days: f64,
    #[serde(rename = "M0_threshold")]
    pub label_magnitude: f64,
    pub bbox: BoundingBox,
    #[serde(rename = "cellDeg")]
    pub cell_deg: f64,
    pub total_cells: usize,
    pub cells: Vec<GridCell>,
    pub max_probability: f64,
    pub mean_probability: f64,
    pub disclaimer: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AftershockQuery {
    pub event_id: Option<String>,
    pub lat: f64,
    pub lon: f64,
    pub magnitude: f64,
    pub time: DateTime<Utc>,
    pub m0: Option<f64>,
    pub horizon_days: Option<f64>,
    pub radius_km: Option<f64>,
    pub n_points: Option<usize>,
}

impl AftershockQuery {
    pub fn new(lat: f64, lon: f64, magnitude: f64, time: DateTime<Utc>) -> Self {
        Self {
            event_id: None,
            lat,
            lon,
            magnitude,
            time,
            m0: None,
            horizon_days: None,
            radius_km: None,
            n_points: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MainshockInfo {
    pub event_id: Option<String>,
    pub lat: f64,
    pub lon: f64,
    pub mag: f64,
    pub time: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AftershockParameters {
    pub m0_threshold: f64,
    pub horizon_days: f64,
    pub radius_km: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AftershockResponse {
    #[serde(rename = "type")]
    pub kind: String,
    pub generated: DateTime<Utc>,
    pub mainshock: MainshockInfo,
    pub parameters: AftershockParameters,
    pub center_probability: f64,
    pub center_lambda: f64,
    pub ring: Vec<RingPoint>,
    pub statistics: RingStatistics,
    pub recent_events_count: usize,
    pub disclaimer: String,
}

/// Request handler over injected collaborators.
pub struct NowcastService {
    config: ServiceConfig,
    models: Arc<ModelStore>,
    catalog: Arc<dyn CatalogSource>,
    cache: Arc<dyn ResponseCache>,
    limiter: Arc<dyn RateLimiter>,
    aftershock_kernel: KernelParams,
    requests: AtomicU64,
}

impl NowcastService {
    /// Service with an in-memory cache and a token-bucket limiter built from
    /// `config`.
    pub fn new(
        config: ServiceConfig,
        models: Arc<ModelStore>,
        catalog: Arc<dyn CatalogSource>,
    ) -> Self {
        let limiter = Arc::new(TokenBucketLimiter::new(&config.rate_limit));
        Self {
            config,
            models,
            catalog,
            cache: Arc::new(MemoryCache::default()),
            limiter,
            aftershock_kernel: KernelParams::default(),
            requests: AtomicU64::new(0),
        }
    }

    pub fn with_cache(mut self, cache: Arc<dyn ResponseCache>) -> Self {
        self.cache = cache;
        self
    }

    pub fn with_rate_limiter(mut self, limiter: Arc<dyn RateLimiter>) -> Self {
        self.limiter = limiter;
        self
    }

    pub fn models(&self) -> &ModelStore {
        &self.models
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    fn admit(&self, client: &str) -> Result<()> {
        if self.requests.fetch_add(1, Ordering::Relaxed) % LIMITER_SWEEP_EVERY == 0 {
            self.limiter.cleanup();
        }
        let decision = self.limiter.check_limit(client);
        if !decision.allowed {
            warn!(client, "rate limit exceeded");
            return Err(Error::RateLimited {
                client: client.to_string(),
            });
        }
        Ok(())
    }

    fn cache_ttl(&self) -> StdDuration {
        StdDuration::from_secs(self.config.cache_ttl_secs)
    }

    fn cached<T: serde::de::DeserializeOwned>(&self, key: &str) -> Option<T> {
        if self.cache.is_stale(key, self.cache_ttl()) {
            return None;
        }
        let value = self.cache.get(key)?;
        match serde_json::from_value(value) {
            Ok(v) => Some(v),
            Err(e) => {
                warn!(error = %e, key, "discarding unreadable cache entry");
                None
            }
        }
    }

    fn store<T: Serialize>(&self, key: &str, value: &T) {
        match serde_json::to_value(value) {
            Ok(v) => self.cache.set(key, v),
            Err(e) => warn!(error = %e, key, "response not cached"),
        }
    }

    fn fetch(&self, query: &CatalogQuery) -> Result<Catalog> {
        match self.catalog.fetch(query) {
            Ok(events) => Ok(Catalog::new(events)),
            Err(e) => {
                warn!(error = %e, source = self.catalog.name(), "catalog fetch failed");
                Err(e)
            }
        }
    }

    pub fn predict(&self, client: &str, query: &PredictionQuery) -> Result<Served<PredictionResponse>> {
        self.predict_at(client, query, Utc::now())
    }

    /// Score a grid as of `now`.
    pub fn predict_at(
        &self,
        client: &str,
        query: &PredictionQuery,
        now: DateTime<Utc>,
    ) -> Result<Served<PredictionResponse>> {
        self.admit(client)?;
        let model = self.models.get()?;

        let bbox = query.bbox.unwrap_or(model.config.bbox);
        let cell_deg = query.cell_deg.unwrap_or(model.config.cell_deg);
        let horizon = query.horizon_days.unwrap_or(model.config.horizon);
        let min_probability = query.min_probability.unwrap_or(self.config.min_probability);
        bbox.validate()?;
        require_in("cellDeg", cell_deg, self.config.max_cell_deg)?;
        require_in("horizon", horizon, self.config.max_horizon_days)?;
        if !(0.0..1.0).contains(&min_probability) {
            return Err(Error::invalid("minProbability must lie in [0, 1)"));
        }
        check_budget(&bbox, cell_deg, self.config.cell_budget)?;

        let key = prediction_cache_key(&bbox, cell_deg, horizon);
        let cacheable = query.min_probability.is_none() && !query.include_features;
        if cacheable {
            if let Some(response) = self.cached::<PredictionResponse>(&key) {
                debug!(key = %key, "prediction cache hit");
                return Ok(Served {
                    response,
                    cache: CacheStatus::Hit,
                });
            }
            debug!(key = %key, "prediction cache miss");
        }

        let start = now
            .checked_sub_signed(Duration::days(i64::from(self.config.catalog_lookback_days)))
            .ok_or_else(|| Error::invalid("time out of range"))?;
        let min_mag = (model.config.completeness_magnitude - 1.0).max(MIN_FETCH_MAGNITUDE);
        let catalog = self.fetch(
            &CatalogQuery::since(start, min_mag)
                .until(now)
                .within(bbox.padded(self.config.catalog_padding_deg)),
        )?;

        let grid = build_grid(&bbox, cell_deg)?;
        let settings = model.feature_settings();
        let all: Vec<GridCell> = grid
            .centers()
            .map(|c| {
                let features = extract_features(c.lat, c.lon, now, &catalog, &settings);
                let p = rescale_horizon(model.score(&features), model.config.horizon, horizon);
                GridCell {
                    lat: c.lat,
                    lon: c.lon,
                    lambda: features.etas,
                    probability: p,
                    features: query.include_features.then_some(features),
                }
            })
            .collect();

        let total_cells = all.len();
        let max_probability = all.iter().map(|c| c.probability).fold(0.0, f64::max);
        let mean_probability = if total_cells == 0 {
            0.0
        } else {
            all.iter().map(|c| c.probability).sum::<f64>() / total_cells as f64
        };
        let cells: Vec<GridCell> = all
            .into_iter()
            .filter(|c| c.probability > min_probability)
            .collect();
        info!(
            total_cells,
            returned = cells.len(),
            events = catalog.len(),
            max_probability,
            "prediction computed"
        );

        let response = PredictionResponse {
            kind: "nowcast".to_string(),
            generated: now,
            model_version: model.version.clone(),
            model_trained: model.trained,
            horizon_days: horizon,
            label_magnitude: model.config.label_magnitude,
            bbox,
            cell_deg,
            total_cells,
            cells,
            max_probability,
            mean_probability,
            disclaimer: DISCLAIMER.to_string(),
        };
        if cacheable {
            self.store(&key, &response);
        }
        Ok(Served {
            response,
            cache: CacheStatus::Miss,
        })
    }

    pub fn aftershock(&self, client: &str, query: &AftershockQuery) -> Result<Served<AftershockResponse>> {
        self.aftershock_at(client, query, Utc::now())
    }

    /// Aftershock ring with catalog context as of `now`.
    pub fn aftershock_at(
        &self,
        client: &str,
        query: &AftershockQuery,
        now: DateTime<Utc>,
    ) -> Result<Served<AftershockResponse>> {
        self.admit(client)?;
        let defaults = &self.config.aftershock;
        let m0 = query.m0.unwrap_or(defaults.m0);
        let horizon = query.horizon_days.unwrap_or(defaults.horizon_days);
        let radius = query.radius_km.unwrap_or(defaults.radius_km);
        let n_points = query.n_points.unwrap_or(defaults.n_points);

        if !(query.lat.is_finite() && (-90.0..=90.0).contains(&query.lat)) {
            return Err(Error::invalid("lat must be a number in [-90, 90]"));
        }
        if !(query.lon.is_finite() && (-180.0..=180.0).contains(&query.lon)) {
            return Err(Error::invalid("lon must be a number in [-180, 180]"));
        }
        if !query.magnitude.is_finite() || !m0.is_finite() {
            return Err(Error::invalid("mag and m0 must be finite numbers"));
        }
        require_in("horizon", horizon, self.config.max_horizon_days)?;
        require_in("radiusKm", radius, f64::MAX)?;
        if n_points == 0 || n_points > defaults.max_points {
            return Err(Error::invalid(format!(
                "nPoints must lie in [1, {}]",
                defaults.max_points
            )));
        }

        let mainshock = Mainshock {
            lat: query.lat,
            lon: query.lon,
            magnitude: query.magnitude,
            time: query.time,
        };
        let end = query.time.min(now);
        let start = end
            .checked_sub_signed(Duration::days(i64::from(defaults.lookback_days)))
            .filter(|_| mainshock.evaluation_time().is_some())
            .ok_or_else(|| Error::invalid("time out of range"))?;

        let key = aftershock_cache_key(query, m0, horizon, radius, n_points);
        if let Some(response) = self.cached::<AftershockResponse>(&key) {
            debug!(key = %key, "aftershock cache hit");
            return Ok(Served {
                response,
                cache: CacheStatus::Hit,
            });
        }

        let region = BoundingBox::new(query.lon, query.lat, query.lon, query.lat)
            .padded(self.config.catalog_padding_deg);
        let catalog = self.fetch(
            &CatalogQuery::since(start, (m0 - 1.0).max(MIN_FETCH_MAGNITUDE))
                .until(end)
                .within(region),
        )?;

        let ring = compute_ring(
            &mainshock,
            catalog.events(),
            &RingSpec {
                radius_km: radius,
                n_points,
                horizon_days: horizon,
            },
            &self.aftershock_kernel,
        )?;
        info!(
            center_probability = ring.center_probability,
            events = ring.events_used,
            "aftershock ring computed"
        );

        let response = AftershockResponse {
            kind: "aftershock".to_string(),
            generated: now,
            mainshock: MainshockInfo {
                event_id: query.event_id.clone(),
                lat: query.lat,
                lon: query.lon,
                mag: query.magnitude,
                time: query.time,
            },
            parameters: AftershockParameters {
                m0_threshold: m0,
                horizon_days: horizon,
                radius_km: radius,
            },
            center_probability: ring.center_probability,
            center_lambda: ring.center_lambda,
            ring: ring.ring,
            statistics: ring.statistics,
            recent_events_count: ring.events_used,
            disclaimer: DISCLAIMER.to_string(),
        };
        self.store(&key, &response);
        Ok(Served {
            response,
            cache: CacheStatus::Miss,
        })
    }
}

/// Positive, finite and at most `max`.
fn require_in(field: &str, value: f64, max: f64) -> Result<()> {
    if !value.is_finite() || value <= 0.0 || value > max {
        return Err(Error::invalid(format!(
            "{field} must be a positive number no greater than {max}, got {value}"
        )));
    }
    Ok(())
}

fn aftershock_cache_key(
    query: &AftershockQuery,
    m0: f64,
    horizon: f64,
    radius: f64,
    n_points: usize,
) -> String {
    let mut hasher = Sha256::new();
    hasher.update(
        format!(
            "{},{},{},{},{},{m0},{horizon},{radius},{n_points}",
            query.event_id.as_deref().unwrap_or(""),
            query.lat,
            query.lon,
            query.magnitude,
            query.time.timestamp_millis(),
        )
        .as_bytes(),
    );
    format!("aftershock:{}", hex::encode(hasher.finalize()))
}
