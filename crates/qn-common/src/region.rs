//! Geographic bounding boxes.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::Error;

/// Lat/lon rectangle, serialized as `[minLon, minLat, maxLon, maxLat]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f64; 4]", into = "[f64; 4]")]
pub struct BoundingBox {
    pub min_lon: f64,
    pub min_lat: f64,
    pub max_lon: f64,
    pub max_lat: f64,
}

impl BoundingBox {
    pub const fn new(min_lon: f64, min_lat: f64, max_lon: f64, max_lat: f64) -> Self {
        Self {
            min_lon,
            min_lat,
            max_lon,
            max_lat,
        }
    }

    pub fn width_deg(&self) -> f64 {
        self.max_lon - self.min_lon
    }

    pub fn height_deg(&self) -> f64 {
        self.max_lat - self.min_lat
    }

    /// Area in square degrees.
    pub fn area_deg2(&self) -> f64 {
        self.width_deg() * self.height_deg()
    }

    /// Grow the box by `deg` on every side, clamped to valid coordinates.
    pub fn padded(&self, deg: f64) -> Self {
        Self {
            min_lon: (self.min_lon - deg).max(-180.0),
            min_lat: (self.min_lat - deg).max(-90.0),
            max_lon: (self.max_lon + deg).min(180.0),
            max_lat: (self.max_lat + deg).min(90.0),
        }
    }

    pub fn contains(&self, lat: f64, lon: f64) -> bool {
        lat >= self.min_lat && lat <= self.max_lat && lon >= self.min_lon && lon <= self.max_lon
    }

    /// Check that the box is finite, ordered, and within lat/lon ranges.
    pub fn validate(&self) -> Result<(), Error> {
        let values = [self.min_lon, self.min_lat, self.max_lon, self.max_lat];
        if values.iter().any(|v| !v.is_finite()) {
            return Err(Error::invalid("bbox values must be finite numbers"));
        }
        if self.min_lon < -180.0 || self.max_lon > 180.0 {
            return Err(Error::invalid("bbox longitudes must lie in [-180, 180]"));
        }
        if self.min_lat < -90.0 || self.max_lat > 90.0 {
            return Err(Error::invalid("bbox latitudes must lie in [-90, 90]"));
        }
        if self.min_lon >= self.max_lon || self.min_lat >= self.max_lat {
            return Err(Error::invalid(
                "bbox must satisfy minLon < maxLon and minLat < maxLat",
            ));
        }
        Ok(())
    }
}

impl From<[f64; 4]> for BoundingBox {
    fn from(v: [f64; 4]) -> Self {
        Self::new(v[0], v[1], v[2], v[3])
    }
}

impl From<BoundingBox> for [f64; 4] {
    fn from(b: BoundingBox) -> Self {
        [b.min_lon, b.min_lat, b.max_lon, b.max_lat]
    }
}

impl fmt::Display for BoundingBox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{},{},{},{}",
            self.min_lon, self.min_lat, self.max_lon, self.max_lat
        )
    }
}

impl FromStr for BoundingBox {
    type Err = Error;

    /// Parse `minLon,minLat,maxLon,maxLat`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<f64> = s
            .split(',')
            .map(|p| p.trim().parse::<f64>())
            .collect::<Result<_, _>>()
            .map_err(|_| Error::invalid(format!("bbox '{s}' contains a non-numeric value")))?;
        if parts.len() != 4 {
            return Err(Error::invalid(format!(
                "bbox '{s}' must have exactly 4 comma-separated values"
            )));
        }
        let bbox = Self::new(parts[0], parts[1], parts[2], parts[3]);
        bbox.validate()?;
        Ok(bbox)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serde_uses_array_form() {
        let b = BoundingBox::new(95.0, -12.0, 141.0, 7.0);
        let json = serde_json::to_string(&b).unwrap();
        assert_eq!(json, "[95.0,-12.0,141.0,7.0]");
        let back: BoundingBox = serde_json::from_str(&json).unwrap();
        assert_eq!(back, b);
    }

    #[test]
    fn parse_valid() {
        let b: BoundingBox = "-125,32,-114,42".parse().unwrap();
        assert_eq!(b.width_deg(), 11.0);
        assert_eq!(b.height_deg(), 10.0);
        assert_eq!(b.area_deg2(), 110.0);
    }

    #[test]
    fn parse_rejects_bad_input() {
        assert!("1,2,3".parse::<BoundingBox>().is_err());
        assert!("a,2,3,4".parse::<BoundingBox>().is_err());
        assert!("10,0,5,1".parse::<BoundingBox>().is_err());
        assert!("0,-91,1,1".parse::<BoundingBox>().is_err());
        assert!("0,0,NaN,1".parse::<BoundingBox>().is_err());
    }

    #[test]
    fn padded_is_clamped() {
        let b = BoundingBox::new(-179.0, 88.0, 179.0, 89.0).padded(5.0);
        assert_eq!(b.min_lon, -180.0);
        assert_eq!(b.max_lat, 90.0);
        assert_eq!(b.min_lat, 83.0);
    }
}
