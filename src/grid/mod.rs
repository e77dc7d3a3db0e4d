//! Equirectangular spatial index over tile rectangles

use std::collections::HashMap;

use crate::geo::{norm_lon, TileRect};

/// Grid cell size in degrees
pub const CELL_DEG: f64 = 1.0;

// Offset used to keep the upper cell of a wrap-split span below +180.
const WRAP_DELTA: f64 = 1e-9;

/// Grid cell coordinates: rows by latitude, columns by longitude
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CellKey {
    pub row: i32,
    pub col: i32,
}

/// Map geographic coordinates to a grid cell. Latitude is clamped to
/// `[-90, 90]`, longitude normalized to `[-180, 180)`, and the resulting
/// indices clamped to the grid bounds.
pub fn cell_of(lat: f64, lon: f64) -> CellKey {
    let lat = lat.clamp(-90.0, 90.0);
    let l = norm_lon(lon);
    let max_row = (180.0 / CELL_DEG) as i32 - 1;
    let max_col = (360.0 / CELL_DEG) as i32 - 1;
    let row = (((lat + 90.0) / CELL_DEG).floor() as i32).clamp(0, max_row);
    let col = (((l + 180.0) / CELL_DEG).floor() as i32).clamp(0, max_col);
    CellKey { row, col }
}

/// Spatial index mapping grid cells to buckets of rectangle handles.
///
/// Handles are indices into the dataset that owns the rectangles. Buckets may
/// hold a handle twice when a wrap-split rectangle lands both spans in one
/// cell; queries de-duplicate by short-circuiting on the first hit.
#[derive(Debug, Default)]
pub struct SpatialGrid {
    cells: HashMap<CellKey, Vec<usize>>,
}

impl SpatialGrid {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of occupied cells
    pub fn cell_count(&self) -> usize {
        self.cells.len()
    }

    /// Index a rectangle into every cell its bounding box overlaps.
    ///
    /// If the normalized longitude interval wraps (`a > b`) the box is split
    /// into `[a, 180)` and `[-180, b]` so that cell ranges stay monotone in
    /// longitude.
    pub fn insert(&mut self, rect: &TileRect, handle: usize) {
        let a = norm_lon(rect.lon_min);
        let b = norm_lon(rect.lon_max);
        if a <= b {
            self.insert_span(rect.lat_min, rect.lat_max, a, b, handle);
        } else {
            self.insert_span(rect.lat_min, rect.lat_max, a, 180.0 - WRAP_DELTA, handle);
            self.insert_span(rect.lat_min, rect.lat_max, -180.0, b, handle);
        }
    }

    fn insert_span(&mut self, lat_min: f64, lat_max: f64, lon_a: f64, lon_b: f64, handle: usize) {
        let c0 = cell_of(lat_min, lon_a);
        let c1 = cell_of(lat_max, lon_b);
        for row in c0.row..=c1.row {
            for col in c0.col..=c1.col {
                self.cells
                    .entry(CellKey { row, col })
                    .or_default()
                    .push(handle);
            }
        }
    }

    /// Iterate candidate handles from the 3×3 cell neighborhood around a
    /// point. The neighborhood probe absorbs floating-point drift at cell
    /// edges; callers run the exact `contains` test on each candidate and
    /// stop at the first hit.
    pub fn probe(&self, lat: f64, lon: f64) -> impl Iterator<Item = usize> + '_ {
        let key = cell_of(lat, lon);
        const OFFSETS: [(i32, i32); 9] = [
            (-1, -1),
            (-1, 0),
            (-1, 1),
            (0, -1),
            (0, 0),
            (0, 1),
            (1, -1),
            (1, 0),
            (1, 1),
        ];
        OFFSETS.into_iter().flat_map(move |(dr, dc)| {
            self.cells
                .get(&CellKey {
                    row: key.row + dr,
                    col: key.col + dc,
                })
                .map(|bucket| bucket.as_slice())
                .unwrap_or(&[])
                .iter()
                .copied()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::TileRect;

    #[test]
    fn cell_mapping_and_clamping() {
        assert_eq!(cell_of(-90.0, -180.0), CellKey { row: 0, col: 0 });
        assert_eq!(cell_of(89.9, 179.9), CellKey { row: 179, col: 359 });
        // clamped rather than out of range
        assert_eq!(cell_of(95.0, 0.0).row, 179);
        assert_eq!(cell_of(-95.0, 0.0).row, 0);
    }

    #[test]
    fn probe_finds_indexed_rect() {
        let mut grid = SpatialGrid::new();
        let r = TileRect::new(48.0, 49.0, 2.0, 3.0);
        grid.insert(&r, 0);
        let hits: Vec<usize> = grid.probe(48.5, 2.5).collect();
        assert!(hits.contains(&0));
    }

    #[test]
    fn probe_completeness_over_rect_interior() {
        // index completeness: any point inside the rectangle must surface it
        let mut grid = SpatialGrid::new();
        let r = TileRect::new(-3.0, 4.0, 10.0, 17.0);
        grid.insert(&r, 7);
        let mut lat = r.lat_min;
        while lat <= r.lat_max {
            let mut lon = r.lon_min;
            while lon <= r.lon_max {
                if r.contains(lat, lon) {
                    assert!(
                        grid.probe(lat, lon).any(|h| h == 7),
                        "missed at ({}, {})",
                        lat,
                        lon
                    );
                }
                lon += 0.5;
            }
            lat += 0.5;
        }
    }

    #[test]
    fn wrap_split_rect_found_on_both_sides() {
        let mut grid = SpatialGrid::new();
        let r = TileRect::new(-5.0, 5.0, 170.0, -170.0);
        grid.insert(&r, 3);
        assert!(grid.probe(0.0, 175.0).any(|h| h == 3));
        assert!(grid.probe(0.0, -175.0).any(|h| h == 3));
        assert!(!grid.probe(0.0, 0.0).any(|h| h == 3));
    }

    #[test]
    fn empty_grid_probe_is_empty() {
        let grid = SpatialGrid::new();
        assert_eq!(grid.probe(0.0, 0.0).count(), 0);
    }
}
