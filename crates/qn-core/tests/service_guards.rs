//! Request guards and caching behaviour of the scoring service.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use qn_common::{BoundingBox, Error, Event, Result};
use qn_config::{RateLimitConfig, ServiceConfig};
use qn_core::artifact::ModelArtifact;
use qn_core::catalog::{CatalogQuery, CatalogSource, StaticCatalog};
use qn_core::service::{
    AftershockQuery, CacheStatus, ModelStore, NowcastService, PredictionQuery,
};
use qn_core::ExitCode;

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 1, 0, 0, 0).unwrap()
}

/// Counts fetches and records the last query.
struct CountingSource {
    inner: StaticCatalog,
    calls: AtomicUsize,
    last: std::sync::Mutex<Option<CatalogQuery>>,
}

impl CountingSource {
    fn new(events: Vec<Event>) -> Self {
        Self {
            inner: StaticCatalog::new(events),
            calls: AtomicUsize::new(0),
            last: std::sync::Mutex::new(None),
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl CatalogSource for CountingSource {
    fn fetch(&self, query: &CatalogQuery) -> Result<Vec<Event>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last.lock().unwrap() = Some(query.clone());
        self.inner.fetch(query)
    }
}

struct FailingSource;

impl CatalogSource for FailingSource {
    fn fetch(&self, _query: &CatalogQuery) -> Result<Vec<Event>> {
        Err(Error::UpstreamStatus { status: 503 })
    }
}

fn active_events() -> Vec<Event> {
    vec![
        Event::new(now() - Duration::days(3), 0.25, 100.25, 5.6),
        Event::new(now() - Duration::days(2), 0.3, 100.2, 4.9),
        Event::new(now() - Duration::hours(5), 0.2, 100.3, 4.6),
    ]
}

fn small_query() -> PredictionQuery {
    PredictionQuery {
        bbox: Some(BoundingBox::new(100.0, 0.0, 102.0, 1.0)),
        cell_deg: Some(0.5),
        ..Default::default()
    }
}

fn service_with(config: ServiceConfig, source: Arc<dyn CatalogSource>) -> NowcastService {
    let models = Arc::new(ModelStore::preloaded(ModelArtifact::placeholder(now())));
    NowcastService::new(config, models, source)
}

#[test]
fn oversized_grid_is_rejected_before_fetching() {
    let source = Arc::new(CountingSource::new(active_events()));
    let svc = service_with(ServiceConfig::default(), source.clone());
    let query = PredictionQuery {
        cell_deg: Some(0.1),
        ..Default::default()
    };

    let err = svc.predict_at("client", &query, now()).unwrap_err();
    match &err {
        Error::GridTooLarge {
            estimated_cells,
            budget,
            suggested_cell_deg,
        } => {
            assert_eq!(*estimated_cells, 87_400);
            assert_eq!(*budget, 1000);
            assert_eq!(*suggested_cell_deg, 1.0);
        }
        other => panic!("expected GridTooLarge, got {other:?}"),
    }
    assert_eq!(err.http_status(), 400);
    assert_eq!(source.calls(), 0);
}

#[test]
fn upstream_failure_surfaces_as_server_error() {
    let svc = service_with(ServiceConfig::default(), Arc::new(FailingSource));
    let err = svc.predict_at("client", &small_query(), now()).unwrap_err();
    assert_eq!(err.http_status(), 500);
    assert_eq!(ExitCode::for_error(&err), ExitCode::UpstreamError);

    let q = AftershockQuery::new(35.0, -120.0, 6.0, now() - Duration::hours(1));
    assert!(matches!(
        svc.aftershock_at("client", &q, now()),
        Err(Error::UpstreamStatus { status: 503 })
    ));
}

#[test]
fn rate_limit_is_per_client() {
    let config = ServiceConfig {
        rate_limit: RateLimitConfig {
            capacity: 1,
            window_secs: 3600,
            idle_sweep_secs: 3600,
        },
        ..ServiceConfig::default()
    };
    let svc = service_with(config, Arc::new(StaticCatalog::new(active_events())));

    assert!(svc.predict_at("a", &small_query(), now()).is_ok());
    let err = svc.predict_at("a", &small_query(), now()).unwrap_err();
    assert!(matches!(err, Error::RateLimited { .. }));
    assert_eq!(err.http_status(), 429);
    assert!(svc.predict_at("b", &small_query(), now()).is_ok());
}

#[test]
fn repeated_prediction_is_served_from_cache() {
    let source = Arc::new(CountingSource::new(active_events()));
    let svc = service_with(ServiceConfig::default(), source.clone());

    let first = svc.predict_at("c", &small_query(), now()).unwrap();
    assert_eq!(first.cache, CacheStatus::Miss);
    let second = svc.predict_at("c", &small_query(), now()).unwrap();
    assert_eq!(second.cache, CacheStatus::Hit);
    assert_eq!(second.response, first.response);
    assert_eq!(source.calls(), 1);
}

#[test]
fn custom_threshold_and_features_bypass_cache() {
    let source = Arc::new(CountingSource::new(active_events()));
    let svc = service_with(ServiceConfig::default(), source.clone());
    let query = PredictionQuery {
        min_probability: Some(0.0),
        include_features: true,
        ..small_query()
    };

    let first = svc.predict_at("c", &query, now()).unwrap();
    let second = svc.predict_at("c", &query, now()).unwrap();
    assert_eq!(first.cache, CacheStatus::Miss);
    assert_eq!(second.cache, CacheStatus::Miss);
    assert_eq!(source.calls(), 2);
    assert!(first.response.cells.iter().all(|c| c.features.is_some()));
}

#[test]
fn fetch_window_covers_lookback_and_padding() {
    let source = Arc::new(CountingSource::new(active_events()));
    let svc = service_with(ServiceConfig::default(), source.clone());
    svc.predict_at("c", &small_query(), now()).unwrap();

    let last = source.last.lock().unwrap().clone().expect("one fetch");
    assert_eq!(last.start, now() - Duration::days(365));
    assert_eq!(last.end, Some(now()));
    assert_eq!(last.min_magnitude, 3.0);
    assert_eq!(last.bbox, Some(BoundingBox::new(95.0, -5.0, 107.0, 6.0)));
}

#[test]
fn shorter_horizon_lowers_probabilities() {
    let svc = service_with(
        ServiceConfig::default(),
        Arc::new(StaticCatalog::new(active_events())),
    );
    let at = |h: f64| {
        let q = PredictionQuery {
            horizon_days: Some(h),
            ..small_query()
        };
        svc.predict_at("c", &q, now()).unwrap().response
    };
    let one_day = at(1.0);
    let week = at(7.0);
    assert_eq!(one_day.total_cells, week.total_cells);
    assert!(one_day.max_probability < week.max_probability);
    assert!(one_day.mean_probability <= week.mean_probability);
}

#[test]
fn missing_model_file_is_model_unavailable() {
    let models = Arc::new(ModelStore::from_path("/nonexistent/nowcast.json"));
    let svc = NowcastService::new(
        ServiceConfig::default(),
        models,
        Arc::new(StaticCatalog::default()),
    );
    let err = svc.predict_at("c", &small_query(), now()).unwrap_err();
    assert!(matches!(err, Error::ModelUnavailable(_)));
    assert_eq!(err.http_status(), 500);
    assert_eq!(ExitCode::for_error(&err), ExitCode::ConfigError);
}

#[test]
fn aftershock_ring_reflects_recent_activity() {
    let mainshock_time = now() - Duration::hours(1);
    let events = vec![
        Event::new(mainshock_time - Duration::days(5), 35.1, -120.1, 4.8),
        Event::new(mainshock_time - Duration::days(1), 34.9, -119.9, 4.2),
    ];
    let svc = service_with(ServiceConfig::default(), Arc::new(StaticCatalog::new(events)));

    let quiet = svc
        .aftershock_at("c", &AftershockQuery::new(35.0, -120.0, 6.0, mainshock_time), now())
        .unwrap()
        .response;
    assert_eq!(quiet.recent_events_count, 3);
    assert!(quiet.center_probability > 0.0 && quiet.center_probability < 1.0);
    assert!(quiet.statistics.max_probability <= quiet.center_probability);
    assert!(quiet.statistics.min_probability <= quiet.statistics.mean_probability);
    assert_eq!(quiet.ring.len(), 64);
}

#[test]
fn mainshock_time_at_calendar_limits_is_invalid_input() {
    let source = Arc::new(CountingSource::new(active_events()));
    let svc = service_with(ServiceConfig::default(), source.clone());

    for time in [DateTime::<Utc>::MAX_UTC, DateTime::<Utc>::MIN_UTC] {
        let q = AftershockQuery::new(35.0, -120.0, 6.0, time);
        let err = svc.aftershock_at("c", &q, now()).unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)), "{time}: {err:?}");
        assert_eq!(err.http_status(), 400);
    }
    assert_eq!(source.calls(), 0);
}
