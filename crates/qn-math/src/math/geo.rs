//! Spherical-earth geodesy.

use serde::{Deserialize, Serialize};

/// Mean earth radius in kilometres.
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// A latitude/longitude pair in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLon {
    pub lat: f64,
    pub lon: f64,
}

impl LatLon {
    pub const fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }
}

/// Great-circle distance in km (Haversine).
pub fn haversine_km(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let d_lat = (lat2 - lat1).to_radians();
    let d_lon = (lon2 - lon1).to_radians();
    let a = (d_lat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (d_lon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_KM * a.sqrt().min(1.0).asin()
}

/// Point reached by travelling `distance_km` from `origin` along the initial
/// bearing `bearing_rad` (clockwise from north) on a sphere.
///
/// The returned longitude is normalized into `[-180, 180)`.
pub fn destination_point(origin: LatLon, bearing_rad: f64, distance_km: f64) -> LatLon {
    let lat1 = origin.lat.to_radians();
    let lon1 = origin.lon.to_radians();
    let delta = distance_km / EARTH_RADIUS_KM;

    let lat2 = (lat1.sin() * delta.cos() + lat1.cos() * delta.sin() * bearing_rad.cos()).asin();
    let lon2 = lon1
        + (bearing_rad.sin() * delta.sin() * lat1.cos())
            .atan2(delta.cos() - lat1.sin() * lat2.sin());

    LatLon::new(lat2.to_degrees(), normalize_lon(lon2.to_degrees()))
}

/// Wrap a longitude into `[-180, 180)`.
pub fn normalize_lon(lon: f64) -> f64 {
    (lon + 180.0).rem_euclid(360.0) - 180.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    #[test]
    fn la_to_sf() {
        let d = haversine_km(34.05, -118.25, 37.77, -122.42);
        assert!((d - 559.0).abs() < 10.0, "got {d}");
    }

    #[test]
    fn same_point_is_zero() {
        assert_eq!(haversine_km(12.3, 45.6, 12.3, 45.6), 0.0);
    }

    #[test]
    fn antipodal_is_half_circumference() {
        let d = haversine_km(0.0, 0.0, 0.0, 180.0);
        assert!((d - PI * EARTH_RADIUS_KM).abs() < 1e-6);
    }

    #[test]
    fn destination_round_trips_distance() {
        let origin = LatLon::new(35.0, -120.0);
        for i in 0..8 {
            let bearing = 2.0 * PI * i as f64 / 8.0;
            let p = destination_point(origin, bearing, 150.0);
            let d = haversine_km(origin.lat, origin.lon, p.lat, p.lon);
            assert!((d - 150.0).abs() < 1e-6, "bearing {bearing}: {d}");
        }
    }

    #[test]
    fn destination_due_north() {
        let p = destination_point(LatLon::new(0.0, 0.0), 0.0, 111.194_926_6);
        assert!((p.lat - 1.0).abs() < 1e-6);
        assert!(p.lon.abs() < 1e-9);
    }

    #[test]
    fn destination_wraps_dateline() {
        let p = destination_point(LatLon::new(0.0, 179.9), PI / 2.0, 100.0);
        assert!(p.lon < -179.0);
    }
}
