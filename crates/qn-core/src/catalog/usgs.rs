//! FDSN event-service client (USGS GeoJSON flavour).

use std::time::Duration;

use chrono::{DateTime, Utc};
use qn_common::{Error, Event, Result};
use serde::Deserialize;
use tracing::{debug, info, warn};

use super::{CatalogQuery, CatalogSource};

const USER_AGENT: &str = concat!("quake-nowcast/", env!("CARGO_PKG_VERSION"));
const FDSN_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Blocking client for an FDSN `event/1/query` endpoint.
#[derive(Debug, Clone)]
pub struct UsgsClient {
    agent: ureq::Agent,
    base_url: String,
}

impl UsgsClient {
    /// Create a client; every request is bounded by `timeout`.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build();
        Self {
            agent,
            base_url: base_url.into(),
        }
    }

    fn query_pairs(query: &CatalogQuery) -> Vec<(&'static str, String)> {
        let mut pairs = vec![
            ("format", "geojson".to_string()),
            ("orderby", "time-asc".to_string()),
            ("starttime", query.start.format(FDSN_TIME_FORMAT).to_string()),
            ("minmagnitude", query.min_magnitude.to_string()),
        ];
        if let Some(end) = query.end {
            pairs.push(("endtime", end.format(FDSN_TIME_FORMAT).to_string()));
        }
        if let Some(b) = query.bbox {
            pairs.push(("minlatitude", b.min_lat.to_string()));
            pairs.push(("maxlatitude", b.max_lat.to_string()));
            pairs.push(("minlongitude", b.min_lon.to_string()));
            pairs.push(("maxlongitude", b.max_lon.to_string()));
        }
        pairs
    }
}

impl CatalogSource for UsgsClient {
    fn fetch(&self, query: &CatalogQuery) -> Result<Vec<Event>> {
        let mut request = self.agent.get(&self.base_url);
        for (k, v) in Self::query_pairs(query) {
            request = request.query(k, &v);
        }
        debug!(url = %self.base_url, start = %query.start, "fetching catalog");

        let response = match request.call() {
            Ok(r) => r,
            Err(ureq::Error::Status(status, _)) => {
                warn!(status, "catalog request rejected");
                return Err(Error::UpstreamStatus { status });
            }
            Err(e) => {
                warn!(error = %e, "catalog request failed");
                return Err(Error::Upstream(e.to_string()));
            }
        };

        let value: serde_json::Value = response
            .into_json()
            .map_err(|e| Error::Upstream(format!("malformed catalog response: {e}")))?;
        let events = parse_geojson(&value)?;
        info!(events = events.len(), "catalog fetched");
        Ok(events)
    }

    fn name(&self) -> &str {
        "usgs"
    }
}

#[derive(Debug, Deserialize)]
struct FeatureCollection {
    #[serde(default)]
    features: Vec<Feature>,
}

#[derive(Debug, Deserialize)]
struct Feature {
    #[serde(default)]
    properties: Properties,
    #[serde(default)]
    geometry: Option<Geometry>,
}

#[derive(Debug, Default, Deserialize)]
struct Properties {
    #[serde(default)]
    mag: Option<f64>,
    /// Milliseconds since the epoch.
    #[serde(default)]
    time: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct Geometry {
    /// `[lon, lat, depth]`
    #[serde(default)]
    coordinates: Vec<Option<f64>>,
}

/// Parse a GeoJSON FeatureCollection into events, skipping features whose
/// time, coordinates or magnitude are missing or non-finite.
pub fn parse_geojson(value: &serde_json::Value) -> Result<Vec<Event>> {
    let collection = FeatureCollection::deserialize(value)?;
    let total = collection.features.len();
    let events: Vec<Event> = collection.features.iter().filter_map(to_event).collect();
    if events.len() != total {
        debug!(skipped = total - events.len(), "skipped incomplete features");
    }
    Ok(events)
}

fn to_event(f: &Feature) -> Option<Event> {
    let coords = &f.geometry.as_ref()?.coordinates;
    let lon = (*coords.first()?)?;
    let lat = (*coords.get(1)?)?;
    let magnitude = f.properties.mag?;
    let ms = f.properties.time?;
    if !ms.is_finite() {
        return None;
    }
    let time = DateTime::<Utc>::from_timestamp_millis(ms as i64)?;
    let event = Event::new(time, lat, lon, magnitude);
    event.is_finite().then_some(event)
}
