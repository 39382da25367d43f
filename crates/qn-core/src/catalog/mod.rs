//! Earthquake catalogs: the time-sorted in-memory view used by the models,
//! and the sources that supply raw events.

mod usgs;

use std::path::Path;

use chrono::{DateTime, Utc};
use qn_common::{BoundingBox, Event, Result};
use tracing::debug;

pub use usgs::{parse_geojson, UsgsClient};

/// Immutable, time-ascending collection of events.
///
/// Causal queries (`before`) are binary searches over the sorted slice, so
/// events at or after the query instant are never visible to feature code.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Catalog {
    events: Vec<Event>,
}

impl Catalog {
    /// Build a catalog, dropping non-finite events and sorting by time.
    pub fn new(mut events: Vec<Event>) -> Self {
        let before = events.len();
        events.retain(Event::is_finite);
        if events.len() != before {
            debug!(dropped = before - events.len(), "dropped non-finite events");
        }
        events.sort_by_key(|e| e.time);
        Self { events }
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Events strictly before `t`.
    pub fn before(&self, t: DateTime<Utc>) -> &[Event] {
        let idx = self.events.partition_point(|e| e.time < t);
        &self.events[..idx]
    }

    /// Events with `start <= time < end`.
    pub fn between(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> &[Event] {
        let lo = self.events.partition_point(|e| e.time < start);
        let hi = self.events.partition_point(|e| e.time < end);
        if hi <= lo {
            return &[];
        }
        &self.events[lo..hi]
    }

    /// A new catalog with one more event.
    pub fn with_event(&self, event: Event) -> Self {
        let mut events = self.events.clone();
        events.push(event);
        Self::new(events)
    }
}

impl From<Vec<Event>> for Catalog {
    fn from(events: Vec<Event>) -> Self {
        Self::new(events)
    }
}

/// Filter for an upstream catalog fetch.
#[derive(Debug, Clone, PartialEq)]
pub struct CatalogQuery {
    pub start: DateTime<Utc>,
    pub end: Option<DateTime<Utc>>,
    pub min_magnitude: f64,
    pub bbox: Option<BoundingBox>,
}

impl CatalogQuery {
    pub fn since(start: DateTime<Utc>, min_magnitude: f64) -> Self {
        Self {
            start,
            end: None,
            min_magnitude,
            bbox: None,
        }
    }

    pub fn until(mut self, end: DateTime<Utc>) -> Self {
        self.end = Some(end);
        self
    }

    pub fn within(mut self, bbox: BoundingBox) -> Self {
        self.bbox = Some(bbox);
        self
    }

    /// Whether an event satisfies every filter of this query.
    pub fn matches(&self, e: &Event) -> bool {
        e.time >= self.start
            && self.end.map_or(true, |end| e.time <= end)
            && e.magnitude >= self.min_magnitude
            && self.bbox.map_or(true, |b| b.contains(e.lat, e.lon))
    }
}

/// Supplier of raw events. Implementations must surface failures as errors
/// rather than returning an empty list.
pub trait CatalogSource: Send + Sync {
    fn fetch(&self, query: &CatalogQuery) -> Result<Vec<Event>>;

    /// Short label for logs.
    fn name(&self) -> &str {
        "catalog"
    }
}

/// In-memory source (offline replays and tests).
#[derive(Debug, Clone, Default)]
pub struct StaticCatalog {
    events: Vec<Event>,
}

impl StaticCatalog {
    pub fn new(events: Vec<Event>) -> Self {
        Self { events }
    }

    /// Load a GeoJSON FeatureCollection saved from the FDSN event service.
    pub fn from_geojson_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let value: serde_json::Value = serde_json::from_str(&content)?;
        let events = parse_geojson(&value)?;
        debug!(path = %path.display(), events = events.len(), "loaded catalog file");
        Ok(Self { events })
    }
}

impl CatalogSource for StaticCatalog {
    fn fetch(&self, query: &CatalogQuery) -> Result<Vec<Event>> {
        Ok(self
            .events
            .iter()
            .filter(|e| query.matches(e))
            .copied()
            .collect())
    }

    fn name(&self) -> &str {
        "static"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn t(day: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + Duration::days(day)
    }

    fn ev(day: i64, mag: f64) -> Event {
        Event::new(t(day), 0.0, 0.0, mag)
    }

    #[test]
    fn new_sorts_and_drops_non_finite() {
        let cat = Catalog::new(vec![
            ev(3, 4.0),
            ev(1, 4.0),
            Event::new(t(2), f64::NAN, 0.0, 4.0),
            ev(2, 5.0),
        ]);
        assert_eq!(cat.len(), 3);
        let days: Vec<_> = cat.events().iter().map(|e| e.time).collect();
        assert_eq!(days, vec![t(1), t(2), t(3)]);
    }

    #[test]
    fn before_is_strict() {
        let cat = Catalog::new(vec![ev(1, 4.0), ev(2, 4.0), ev(3, 4.0)]);
        assert_eq!(cat.before(t(2)).len(), 1);
        assert_eq!(cat.before(t(0)).len(), 0);
        assert_eq!(cat.before(t(10)).len(), 3);
    }

    #[test]
    fn between_is_half_open() {
        let cat = Catalog::new(vec![ev(1, 4.0), ev(2, 4.0), ev(3, 4.0)]);
        assert_eq!(cat.between(t(1), t(3)).len(), 2);
        assert!(cat.between(t(3), t(1)).is_empty());
    }

    #[test]
    fn with_event_keeps_order() {
        let cat = Catalog::new(vec![ev(1, 4.0), ev(3, 4.0)]).with_event(ev(2, 6.0));
        assert_eq!(cat.events()[1].magnitude, 6.0);
    }

    #[test]
    fn static_source_applies_query() {
        let src = StaticCatalog::new(vec![
            ev(1, 2.0),
            ev(2, 4.0),
            Event::new(t(3), 50.0, 50.0, 4.0),
            ev(9, 4.0),
        ]);
        let q = CatalogQuery::since(t(0), 3.0)
            .until(t(5))
            .within(BoundingBox::new(-1.0, -1.0, 1.0, 1.0));
        let got = src.fetch(&q).unwrap();
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].time, t(2));
    }
}
