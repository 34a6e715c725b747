//! Geographic tiles and bounding boxes.
//!
//! A [`Tile`] is one circle polled as an independent fetch. The tile set is
//! fixed at startup, either listed explicitly in the configuration or
//! generated by [`cover_region`] so that every point of the target region
//! lies inside at least one tile.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Mean Earth radius in nautical miles.
const EARTH_RADIUS_NM: f64 = 3440.065;

/// Nautical miles per degree of latitude.
const NM_PER_DEGREE: f64 = 60.0;

/// Fraction of the inscribed square used as the grid step, leaving slack for
/// the flat-earth approximation in the grid layout.
const GRID_SAFETY_FACTOR: f64 = 0.9;

/// A rectangular latitude/longitude window.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    /// Southern edge in degrees.
    pub lat_min: f64,
    /// Northern edge in degrees.
    pub lat_max: f64,
    /// Western edge in degrees.
    pub lon_min: f64,
    /// Eastern edge in degrees.
    pub lon_max: f64,
}

impl BoundingBox {
    /// Create a bounding box from its edges.
    #[must_use]
    pub fn new(lat_min: f64, lat_max: f64, lon_min: f64, lon_max: f64) -> Self {
        Self {
            lat_min,
            lat_max,
            lon_min,
            lon_max,
        }
    }

    /// Whether the point lies inside the box, edges included.
    #[must_use]
    pub fn contains(&self, lat: f64, lon: f64) -> bool {
        lat >= self.lat_min && lat <= self.lat_max && lon >= self.lon_min && lon <= self.lon_max
    }

    /// Whether the edges are finite, ordered and within WGS84 range.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        let finite = [self.lat_min, self.lat_max, self.lon_min, self.lon_max]
            .iter()
            .all(|v| v.is_finite());
        finite
            && self.lat_min <= self.lat_max
            && self.lon_min <= self.lon_max
            && self.lat_min >= -90.0
            && self.lat_max <= 90.0
            && self.lon_min >= -180.0
            && self.lon_max <= 180.0
    }
}

impl fmt::Display for BoundingBox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{:.4}, {:.4}] x [{:.4}, {:.4}]",
            self.lat_min, self.lat_max, self.lon_min, self.lon_max
        )
    }
}

/// One polled circle: a center point and a radius in nautical miles.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Tile {
    /// Center latitude in degrees.
    pub lat: f64,
    /// Center longitude in degrees.
    pub lon: f64,
    /// Search radius in nautical miles.
    pub radius_nm: f64,
}

impl Tile {
    /// Create a tile.
    #[must_use]
    pub fn new(lat: f64, lon: f64, radius_nm: f64) -> Self {
        Self {
            lat,
            lon,
            radius_nm,
        }
    }

    /// Whether the point is within the tile's radius.
    #[must_use]
    pub fn contains(&self, lat: f64, lon: f64) -> bool {
        haversine_nm(self.lat, self.lon, lat, lon) <= self.radius_nm
    }

    /// The smallest bounding box enclosing the tile's circle.
    ///
    /// Used by feeds that only accept rectangular queries.
    #[must_use]
    pub fn bounding_box(&self) -> BoundingBox {
        let dlat = self.radius_nm / NM_PER_DEGREE;
        let cos_lat = self.lat.to_radians().cos().max(1e-6);
        let dlon = (self.radius_nm / (NM_PER_DEGREE * cos_lat)).min(180.0);
        BoundingBox::new(
            (self.lat - dlat).max(-90.0),
            (self.lat + dlat).min(90.0),
            (self.lon - dlon).max(-180.0),
            (self.lon + dlon).min(180.0),
        )
    }
}

impl fmt::Display for Tile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.4}, {:.4}) r={}nm", self.lat, self.lon, self.radius_nm)
    }
}

/// Great-circle distance between two points in nautical miles.
#[must_use]
pub fn haversine_nm(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let dlat = (lat2 - lat1).to_radians();
    let dlon = (lon2 - lon1).to_radians();
    let a = (dlat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (dlon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_NM * a.sqrt().asin()
}

/// Generate a grid of tiles of `radius_nm` covering `region` without gaps.
///
/// Tile centers are laid out on a grid whose cells fit inside each tile's
/// circle, so neighbouring tiles overlap. Rows run south to north and tiles
/// within a row west to east; that order is the poller's dedup order.
#[must_use]
pub fn cover_region(region: &BoundingBox, radius_nm: f64) -> Vec<Tile> {
    if !region.is_valid() || radius_nm.is_nan() || radius_nm <= 0.0 {
        return Vec::new();
    }

    let side_nm = radius_nm * std::f64::consts::SQRT_2 * GRID_SAFETY_FACTOR;
    let lat_step = side_nm / NM_PER_DEGREE;
    let rows = grid_count(region.lat_max - region.lat_min, lat_step);

    let mut tiles = Vec::new();
    for row in 0..rows {
        let row_min = region.lat_min + lat_step * f64::from(row);
        let row_max = row_min + lat_step;
        let center_lat = (row_min + lat_step / 2.0).min(90.0);

        // A degree of longitude is widest at the band edge nearest the equator
        let widest_lat = if row_min <= 0.0 && row_max >= 0.0 {
            0.0
        } else {
            row_min.abs().min(row_max.abs())
        };
        let cos_lat = widest_lat.to_radians().cos().max(1e-6);
        let lon_step = side_nm / (NM_PER_DEGREE * cos_lat);
        let cols = grid_count(region.lon_max - region.lon_min, lon_step);

        for col in 0..cols {
            let center_lon = region.lon_min + lon_step * (f64::from(col) + 0.5);
            tiles.push(Tile::new(center_lat, center_lon.min(180.0), radius_nm));
        }
    }
    tiles
}

/// Number of grid cells of `step` needed to span `extent` (at least one).
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn grid_count(extent: f64, step: f64) -> u32 {
    let cells = (extent / step).ceil();
    if cells.is_finite() && cells >= 1.0 {
        cells.min(f64::from(u32::MAX)) as u32
    } else {
        1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bay_area() -> BoundingBox {
        BoundingBox::new(36.5, 39.0, -123.5, -121.0)
    }

    #[test]
    fn test_bounding_box_contains_edges() {
        let bbox = BoundingBox::new(10.0, 20.0, 30.0, 40.0);
        assert!(bbox.contains(10.0, 30.0));
        assert!(bbox.contains(20.0, 40.0));
        assert!(bbox.contains(15.0, 35.0));
        assert!(!bbox.contains(9.99, 35.0));
        assert!(!bbox.contains(15.0, 40.01));
    }

    #[test]
    fn test_bounding_box_validity() {
        assert!(bay_area().is_valid());
        assert!(!BoundingBox::new(20.0, 10.0, 0.0, 1.0).is_valid());
        assert!(!BoundingBox::new(0.0, 91.0, 0.0, 1.0).is_valid());
        assert!(!BoundingBox::new(0.0, 1.0, f64::NAN, 1.0).is_valid());
    }

    #[test]
    fn test_haversine_known_distance() {
        // One degree of latitude is 60 nm
        let d = haversine_nm(0.0, 0.0, 1.0, 0.0);
        assert!((d - 60.0).abs() < 0.1, "got {d}");
        assert!(haversine_nm(37.0, -122.0, 37.0, -122.0).abs() < 1e-9);
    }

    #[test]
    fn test_tile_bounding_box_encloses_circle() {
        let tile = Tile::new(37.6, -122.4, 30.0);
        let bbox = tile.bounding_box();
        assert!(bbox.contains(tile.lat, tile.lon));
        assert!((bbox.lat_max - tile.lat - 0.5).abs() < 1e-9);
        // Longitude half-width grows with latitude
        assert!(bbox.lon_max - tile.lon > 0.5);
    }

    #[test]
    fn test_cover_region_has_no_gaps() {
        let region = bay_area();
        let tiles = cover_region(&region, 40.0);
        assert!(tiles.len() > 1);

        let steps = 40;
        for i in 0..=steps {
            for j in 0..=steps {
                let lat = region.lat_min
                    + (region.lat_max - region.lat_min) * f64::from(i) / f64::from(steps);
                let lon = region.lon_min
                    + (region.lon_max - region.lon_min) * f64::from(j) / f64::from(steps);
                assert!(
                    tiles.iter().any(|t| t.contains(lat, lon)),
                    "point ({lat}, {lon}) is not covered"
                );
            }
        }
    }

    #[test]
    fn test_cover_region_single_tile_for_small_region() {
        let region = BoundingBox::new(37.0, 37.1, -122.1, -122.0);
        let tiles = cover_region(&region, 50.0);
        assert_eq!(tiles.len(), 1);
        assert!(tiles[0].contains(37.05, -122.05));
    }

    #[test]
    fn test_cover_region_order_is_south_to_north() {
        let tiles = cover_region(&bay_area(), 25.0);
        for pair in tiles.windows(2) {
            assert!(pair[0].lat <= pair[1].lat);
        }
    }

    #[test]
    fn test_cover_region_rejects_bad_input() {
        assert!(cover_region(&bay_area(), 0.0).is_empty());
        assert!(cover_region(&BoundingBox::new(5.0, 1.0, 0.0, 1.0), 10.0).is_empty());
    }
}
