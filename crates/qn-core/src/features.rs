//! Causal per-location features and look-ahead labels.

use chrono::{DateTime, Duration, Utc};
use qn_common::{days_between, Event};
use qn_config::{KernelParams, TrainingConfig};
use qn_math::haversine_km;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::catalog::Catalog;
use crate::kernel;

/// Value of `time_since_last` when no qualifying event exists; also its cap.
pub const TIME_SINCE_LAST_SENTINEL: f64 = 999.0;

/// Lookback windows in days.
pub const WINDOWS_DAYS: [f64; 3] = [7.0, 30.0, 90.0];

/// Feature names in model order.
pub const FEATURE_NAMES: [&str; 8] = [
    "rate_7",
    "rate_30",
    "rate_90",
    "maxMag_7",
    "maxMag_30",
    "maxMag_90",
    "time_since_last",
    "etas",
];

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct FeatureVector {
    pub rate_7: f64,
    pub rate_30: f64,
    pub rate_90: f64,
    #[serde(rename = "maxMag_7")]
    pub max_mag_7: f64,
    #[serde(rename = "maxMag_30")]
    pub max_mag_30: f64,
    #[serde(rename = "maxMag_90")]
    pub max_mag_90: f64,
    pub time_since_last: f64,
    pub etas: f64,
}

impl FeatureVector {
    /// Look a feature up by its serialized name.
    pub fn get(&self, name: &str) -> Option<f64> {
        let v = match name {
            "rate_7" => self.rate_7,
            "rate_30" => self.rate_30,
            "rate_90" => self.rate_90,
            "maxMag_7" => self.max_mag_7,
            "maxMag_30" => self.max_mag_30,
            "maxMag_90" => self.max_mag_90,
            "time_since_last" => self.time_since_last,
            "etas" => self.etas,
            _ => return None,
        };
        Some(v)
    }

    /// Values in `FEATURE_NAMES` order.
    pub fn values(&self) -> [f64; 8] {
        [
            self.rate_7,
            self.rate_30,
            self.rate_90,
            self.max_mag_7,
            self.max_mag_30,
            self.max_mag_90,
            self.time_since_last,
            self.etas,
        ]
    }
}

pub fn is_known_feature(name: &str) -> bool {
    FEATURE_NAMES.contains(&name)
}

/// Settings shared by the training and online feature paths.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeatureSettings {
    pub radius_km: f64,
    pub label_magnitude: f64,
    pub kernel: KernelParams,
}

impl FeatureSettings {
    pub fn from_training(config: &TrainingConfig) -> Self {
        Self {
            radius_km: config.feature_radius_km,
            label_magnitude: config.label_magnitude,
            kernel: config.kernel,
        }
    }
}

/// A feature vector with its location, time and outcome.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LabeledSample {
    pub lat: f64,
    pub lon: f64,
    pub time: DateTime<Utc>,
    pub features: FeatureVector,
    pub label: bool,
}

impl LabeledSample {
    pub fn target(&self) -> f64 {
        if self.label {
            1.0
        } else {
            0.0
        }
    }
}

/// Features at `(lat, lon)` as of `time`, from events strictly before `time`.
pub fn extract_features(
    lat: f64,
    lon: f64,
    time: DateTime<Utc>,
    catalog: &Catalog,
    settings: &FeatureSettings,
) -> FeatureVector {
    let past = catalog.before(time);
    let nearby: Vec<&Event> = past
        .iter()
        .filter(|e| haversine_km(lat, lon, e.lat, e.lon) <= settings.radius_km)
        .collect();

    let mut counts = [0usize; 3];
    let mut max_mags = [0.0f64; 3];
    let mut last_significant: Option<DateTime<Utc>> = None;
    for e in &nearby {
        let age = days_between(time, e.time);
        for (w, window) in WINDOWS_DAYS.iter().enumerate() {
            if age <= *window {
                counts[w] += 1;
                max_mags[w] = max_mags[w].max(e.magnitude);
            }
        }
        if e.magnitude >= settings.label_magnitude {
            last_significant = Some(last_significant.map_or(e.time, |t| t.max(e.time)));
        }
    }

    let time_since_last = last_significant
        .map_or(TIME_SINCE_LAST_SENTINEL, |t| days_between(time, t))
        .min(TIME_SINCE_LAST_SENTINEL);

    FeatureVector {
        rate_7: counts[0] as f64 / WINDOWS_DAYS[0],
        rate_30: counts[1] as f64 / WINDOWS_DAYS[1],
        rate_90: counts[2] as f64 / WINDOWS_DAYS[2],
        max_mag_7: max_mags[0],
        max_mag_30: max_mags[1],
        max_mag_90: max_mags[2],
        time_since_last,
        etas: kernel::intensity(past, time, lat, lon, &settings.kernel),
    }
}

/// Whether a qualifying event lands within `radius_km` in `[time, time + horizon)`.
pub fn label_for(
    lat: f64,
    lon: f64,
    time: DateTime<Utc>,
    horizon_days: f64,
    catalog: &Catalog,
    settings: &FeatureSettings,
) -> bool {
    let end = time + Duration::milliseconds((horizon_days * qn_common::MS_PER_DAY) as i64);
    catalog.between(time, end).iter().any(|e| {
        e.magnitude >= settings.label_magnitude
            && haversine_km(lat, lon, e.lat, e.lon) <= settings.radius_km
    })
}

/// Features and label for one training sample.
pub fn labeled_sample(
    lat: f64,
    lon: f64,
    time: DateTime<Utc>,
    horizon_days: f64,
    catalog: &Catalog,
    settings: &FeatureSettings,
) -> LabeledSample {
    LabeledSample {
        lat,
        lon,
        time,
        features: extract_features(lat, lon, time, catalog, settings),
        label: label_for(lat, lon, time, horizon_days, catalog, settings),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap()
    }

    fn settings() -> FeatureSettings {
        FeatureSettings {
            radius_km: 100.0,
            label_magnitude: 4.5,
            kernel: KernelParams::default(),
        }
    }

    fn at(days: i64, lat: f64, mag: f64) -> Event {
        Event::new(t0() + Duration::days(days), lat, 0.0, mag)
    }

    #[test]
    fn no_history_gives_sentinel() {
        let f = extract_features(0.0, 0.0, t0(), &Catalog::default(), &settings());
        assert_eq!(f.rate_90, 0.0);
        assert_eq!(f.max_mag_90, 0.0);
        assert_eq!(f.time_since_last, TIME_SINCE_LAST_SENTINEL);
        assert_eq!(f.etas, 0.0);
    }

    #[test]
    fn windows_count_nearby_past_events() {
        let catalog = Catalog::new(vec![
            at(-3, 0.0, 4.0),
            at(-20, 0.1, 5.0),
            at(-60, 0.0, 3.0),
            at(-120, 0.0, 6.0),
            at(-2, 5.0, 7.0), // ~550 km away
        ]);
        let f = extract_features(0.0, 0.0, t0(), &catalog, &settings());
        assert!((f.rate_7 - 1.0 / 7.0).abs() < 1e-12);
        assert!((f.rate_30 - 2.0 / 30.0).abs() < 1e-12);
        assert!((f.rate_90 - 3.0 / 90.0).abs() < 1e-12);
        assert_eq!(f.max_mag_7, 4.0);
        assert_eq!(f.max_mag_30, 5.0);
        assert_eq!(f.max_mag_90, 5.0);
        assert!((f.time_since_last - 20.0).abs() < 1e-9);
        assert!(f.etas > 0.0);
    }

    #[test]
    fn old_significant_event_is_capped() {
        let catalog = Catalog::new(vec![at(-2000, 0.0, 6.0)]);
        let f = extract_features(0.0, 0.0, t0(), &catalog, &settings());
        assert_eq!(f.time_since_last, TIME_SINCE_LAST_SENTINEL);
    }

    #[test]
    fn label_window_is_half_open() {
        let s = settings();
        let at_start = Catalog::new(vec![at(0, 0.0, 5.0)]);
        assert!(label_for(0.0, 0.0, t0(), 7.0, &at_start, &s));
        let at_end = Catalog::new(vec![at(7, 0.0, 5.0)]);
        assert!(!label_for(0.0, 0.0, t0(), 7.0, &at_end, &s));
        let small = Catalog::new(vec![at(1, 0.0, 4.0)]);
        assert!(!label_for(0.0, 0.0, t0(), 7.0, &small, &s));
        let far = Catalog::new(vec![at(1, 3.0, 6.0)]);
        assert!(!label_for(0.0, 0.0, t0(), 7.0, &far, &s));
    }

    #[test]
    fn get_matches_values_order() {
        let f = FeatureVector {
            rate_7: 1.0,
            rate_30: 2.0,
            rate_90: 3.0,
            max_mag_7: 4.0,
            max_mag_30: 5.0,
            max_mag_90: 6.0,
            time_since_last: 7.0,
            etas: 8.0,
        };
        for (name, v) in FEATURE_NAMES.iter().zip(f.values()) {
            assert_eq!(f.get(name), Some(v));
        }
        assert_eq!(f.get("bogus"), None);
    }

    #[test]
    fn serializes_with_model_names() {
        let json = serde_json::to_value(FeatureVector::default()).unwrap();
        for name in FEATURE_NAMES {
            assert!(json.get(name).is_some(), "missing {name}");
        }
    }
}
