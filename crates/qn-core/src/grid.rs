//! Rectangular lat/lon lattice with a hard cell budget.

use chrono::{DateTime, Utc};
use qn_common::{BoundingBox, Error, Result};
use qn_config::KernelParams;
use qn_math::LatLon;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::catalog::Catalog;
use crate::features::FeatureVector;
use crate::kernel;

/// Default upper bound on cells evaluated per request.
pub const DEFAULT_CELL_BUDGET: usize = 1000;

/// A lattice over a bounding box. Centers sit half a cell in from each edge.
#[derive(Debug, Clone, PartialEq)]
pub struct GridSpec {
    pub bbox: BoundingBox,
    pub cell_deg: f64,
    pub rows: usize,
    pub cols: usize,
}

impl GridSpec {
    pub fn cell_count(&self) -> usize {
        self.rows * self.cols
    }

    /// Cell centers, row-major from the south-west corner.
    pub fn centers(&self) -> impl Iterator<Item = LatLon> + '_ {
        let half = self.cell_deg / 2.0;
        (0..self.rows).flat_map(move |i| {
            let lat = self.bbox.min_lat + i as f64 * self.cell_deg + half;
            (0..self.cols).map(move |j| {
                LatLon::new(lat, self.bbox.min_lon + j as f64 * self.cell_deg + half)
            })
        })
    }
}

/// One scored cell. Lives for a single request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridCell {
    pub lat: f64,
    pub lon: f64,
    pub lambda: f64,
    pub probability: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub features: Option<FeatureVector>,
}

fn validate_cell_deg(cell_deg: f64) -> Result<()> {
    if !cell_deg.is_finite() || cell_deg <= 0.0 {
        return Err(Error::invalid(format!(
            "cellDeg must be a positive number, got {cell_deg}"
        )));
    }
    Ok(())
}

/// `ceil(area / cellDeg²)`, the pre-flight cell estimate.
pub fn estimate_cells(bbox: &BoundingBox, cell_deg: f64) -> usize {
    (bbox.area_deg2() / (cell_deg * cell_deg)).ceil().max(0.0) as usize
}

/// Smallest one-decimal cell size whose estimate fits in `budget`.
pub fn suggest_cell_deg(bbox: &BoundingBox, budget: usize) -> f64 {
    let budget = budget.max(1) as f64;
    ((bbox.area_deg2() / budget).sqrt() * 10.0).ceil() / 10.0
}

/// Reject a request whose estimated cell count exceeds `budget`.
///
/// Runs before any catalog access or kernel evaluation.
pub fn check_budget(bbox: &BoundingBox, cell_deg: f64, budget: usize) -> Result<usize> {
    validate_cell_deg(cell_deg)?;
    let estimated_cells = estimate_cells(bbox, cell_deg);
    if estimated_cells > budget {
        let suggested_cell_deg = suggest_cell_deg(bbox, budget);
        warn!(
            estimated_cells,
            budget, suggested_cell_deg, "grid request over budget"
        );
        return Err(Error::GridTooLarge {
            estimated_cells,
            budget,
            suggested_cell_deg,
        });
    }
    Ok(estimated_cells)
}

/// Lay out the lattice: `rows = max(1, ceil(height / cellDeg))`, likewise cols.
pub fn build_grid(bbox: &BoundingBox, cell_deg: f64) -> Result<GridSpec> {
    bbox.validate()?;
    validate_cell_deg(cell_deg)?;
    let rows = ((bbox.height_deg() / cell_deg).ceil() as usize).max(1);
    let cols = ((bbox.width_deg() / cell_deg).ceil() as usize).max(1);
    Ok(GridSpec {
        bbox: *bbox,
        cell_deg,
        rows,
        cols,
    })
}

/// Kernel rate and probability at every cell center, using events before `t`.
pub fn evaluate_grid(
    grid: &GridSpec,
    catalog: &Catalog,
    t: DateTime<Utc>,
    params: &KernelParams,
    horizon_days: f64,
) -> Vec<GridCell> {
    let past = catalog.before(t);
    let cells: Vec<GridCell> = grid
        .centers()
        .map(|c| {
            let est = kernel::estimate(past, t, c.lat, c.lon, params, horizon_days);
            GridCell {
                lat: c.lat,
                lon: c.lon,
                lambda: est.lambda,
                probability: est.probability,
                features: None,
            }
        })
        .collect();
    debug!(cells = cells.len(), events = past.len(), "grid evaluated");
    cells
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use qn_common::Event;

    #[test]
    fn rows_and_cols_round_up() {
        let g = build_grid(&BoundingBox::new(0.0, 0.0, 1.0, 0.5), 0.3).unwrap();
        assert_eq!((g.rows, g.cols), (2, 4));
        assert_eq!(g.centers().count(), g.cell_count());
    }

    #[test]
    fn centers_offset_by_half_cell() {
        let g = build_grid(&BoundingBox::new(10.0, 20.0, 11.0, 21.0), 0.5).unwrap();
        let c: Vec<_> = g.centers().collect();
        assert_eq!(c.len(), 4);
        assert!((c[0].lat - 20.25).abs() < 1e-12);
        assert!((c[0].lon - 10.25).abs() < 1e-12);
        assert!((c[3].lat - 20.75).abs() < 1e-12);
        assert!((c[3].lon - 10.75).abs() < 1e-12);
    }

    #[test]
    fn tiny_box_still_has_one_cell() {
        let g = build_grid(&BoundingBox::new(0.0, 0.0, 0.01, 0.01), 1.0).unwrap();
        assert_eq!(g.cell_count(), 1);
    }

    #[test]
    fn over_budget_suggests_coarser_cells() {
        let bbox = BoundingBox::new(95.0, -12.0, 141.0, 7.0);
        let err = check_budget(&bbox, 0.1, 1000).unwrap_err();
        match err {
            Error::GridTooLarge {
                estimated_cells,
                budget,
                suggested_cell_deg,
            } => {
                assert_eq!(estimated_cells, 87_400);
                assert_eq!(budget, 1000);
                assert!((suggested_cell_deg - 1.0).abs() < 1e-12);
                assert!(estimate_cells(&bbox, suggested_cell_deg) <= 1000);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn within_budget_passes() {
        let bbox = BoundingBox::new(0.0, 0.0, 2.0, 2.0);
        assert_eq!(check_budget(&bbox, 0.5, 1000).unwrap(), 16);
    }

    #[test]
    fn rejects_bad_cell_size() {
        let bbox = BoundingBox::new(0.0, 0.0, 2.0, 2.0);
        assert!(matches!(
            check_budget(&bbox, 0.0, 1000),
            Err(Error::InvalidInput(_))
        ));
        assert!(build_grid(&bbox, f64::NAN).is_err());
    }

    #[test]
    fn evaluation_peaks_near_event() {
        let t = Utc.with_ymd_and_hms(2024, 1, 10, 0, 0, 0).unwrap();
        let catalog = Catalog::new(vec![Event::new(t - Duration::days(1), 0.25, 0.25, 6.0)]);
        let grid = build_grid(&BoundingBox::new(0.0, 0.0, 2.0, 2.0), 0.5).unwrap();
        let cells = evaluate_grid(&grid, &catalog, t, &KernelParams::default(), 7.0);
        assert_eq!(cells.len(), 16);
        let max = cells
            .iter()
            .max_by(|a, b| a.lambda.total_cmp(&b.lambda))
            .unwrap();
        assert_eq!((max.lat, max.lon), (0.25, 0.25));
        assert!(cells.iter().all(|c| (0.0..=1.0).contains(&c.probability)));
    }
}
