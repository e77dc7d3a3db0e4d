//! Point-of-interest tile dataset: loading, bounds computation, CSV append

use std::io::Write;
use std::path::Path;

use crate::geo::{norm_lon, TileRect};
use crate::grid::SpatialGrid;

use super::{column_index, open_reader, parse_field, DatasetError};

// Kilometers per degree of latitude used by the append-path bounds
// computation. The loader fallback uses the 110.574/111.320 pair instead;
// both constants match the files this tool has historically produced.
const LAT_KM_PER_DEG: f64 = 111.32;
const LOADER_LAT_KM_PER_DEG: f64 = 110.574;
const LOADER_LON_KM_PER_DEG: f64 = 111.320;

const APPEND_HEADER: &str = "Name,Type,Tile_km,Center_Lat,Center_Lon,Lat_min,Lat_max,Lon_min,Lon_max";

/// One named POI tile
#[derive(Debug, Clone, PartialEq)]
pub struct PoiTile {
    pub rect: TileRect,
    pub name: String,
    pub poi_type: String,
    /// Square side hint in km, present when the tile came from the
    /// center+size layout or an append
    pub tile_km: Option<f64>,
}

/// Collection of POI tiles with a spatial index and per-tile bounding boxes.
///
/// The bounding boxes duplicate the rectangles today; they exist so the
/// query pipeline (bbox pre-check, then exact membership) stays identical to
/// the general-polygon case.
#[derive(Debug, Default)]
pub struct PoiDataset {
    tiles: Vec<PoiTile>,
    bboxes: Vec<TileRect>,
    grid: SpatialGrid,
}

impl PoiDataset {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Load POI tiles from CSV. Preferred columns: `Name`, `Type`,
    /// `Lat_min`/`Lat_max`/`Lon_min`/`Lon_max`. Fallback: `Center_Lat`,
    /// `Center_Lon`, `Tile_km`. Rows without a usable name or coordinates
    /// are skipped.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, DatasetError> {
        let path = path.as_ref();
        let mut reader = open_reader(path)?;
        let headers = reader
            .headers()
            .map_err(|_| DatasetError::MissingHeader {
                path: path.to_path_buf(),
            })?
            .clone();
        if headers.is_empty() {
            return Err(DatasetError::MissingHeader {
                path: path.to_path_buf(),
            });
        }

        let i_name = column_index(&headers, "Name");
        let i_type = column_index(&headers, "Type");
        let bounds = (
            column_index(&headers, "Lat_min"),
            column_index(&headers, "Lat_max"),
            column_index(&headers, "Lon_min"),
            column_index(&headers, "Lon_max"),
        );
        let centers = (
            column_index(&headers, "Center_Lat"),
            column_index(&headers, "Center_Lon"),
            column_index(&headers, "Tile_km"),
        );

        let mut tiles = Vec::new();
        let mut skipped = 0usize;
        for record in reader.records() {
            let record = match record {
                Ok(r) => r,
                Err(_) => {
                    skipped += 1;
                    continue;
                }
            };

            let name = i_name
                .and_then(|i| record.get(i))
                .map(str::trim)
                .unwrap_or("");
            if name.is_empty() {
                skipped += 1;
                continue;
            }
            let poi_type = i_type
                .and_then(|i| record.get(i))
                .map(str::trim)
                .unwrap_or("")
                .to_string();

            let tile = match bounds {
                (Some(ilat0), Some(ilat1), Some(ilon0), Some(ilon1)) => {
                    let tile_km = centers.2.and_then(|i| parse_field(&record, i));
                    bounds_row(&record, ilat0, ilat1, ilon0, ilon1).map(|rect| PoiTile {
                        rect,
                        name: name.to_string(),
                        poi_type,
                        tile_km,
                    })
                }
                _ => match centers {
                    (Some(ilat), Some(ilon), Some(ikm)) => {
                        center_row(&record, ilat, ilon, ikm).map(|(rect, km)| PoiTile {
                            rect,
                            name: name.to_string(),
                            poi_type,
                            tile_km: Some(km),
                        })
                    }
                    _ => None,
                },
            };

            match tile {
                Some(t) => tiles.push(t),
                None => skipped += 1,
            }
        }

        if skipped > 0 {
            log::warn!("POI dataset {:?}: skipped {} malformed rows", path, skipped);
        }
        log::info!("Loaded {} POI tiles from {:?}", tiles.len(), path);
        Ok(Self::from_tiles(tiles))
    }

    /// Build from in-memory tiles, rebuilding the index and bounding boxes
    pub fn from_tiles(tiles: Vec<PoiTile>) -> Self {
        let mut grid = SpatialGrid::new();
        let mut bboxes = Vec::with_capacity(tiles.len());
        for (idx, tile) in tiles.iter().enumerate() {
            grid.insert(&tile.rect, idx);
            bboxes.push(tile.rect);
        }
        Self {
            tiles,
            bboxes,
            grid,
        }
    }

    pub fn tiles(&self) -> &[PoiTile] {
        &self.tiles
    }

    pub fn bbox(&self, idx: usize) -> &TileRect {
        &self.bboxes[idx]
    }

    /// Candidate tile handles around a point (3×3 neighborhood)
    pub fn probe(&self, lat: f64, lon: f64) -> impl Iterator<Item = usize> + '_ {
        self.grid.probe(lat, lon)
    }

    /// Index of the first tile with this exact name
    pub fn find(&self, name: &str) -> Option<usize> {
        self.tiles.iter().position(|t| t.name == name)
    }

    /// Tile names in dataset order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.tiles.iter().map(|t| t.name.as_str())
    }

    /// Tile type labels, parallel to [`names`](Self::names)
    pub fn types(&self) -> impl Iterator<Item = &str> {
        self.tiles.iter().map(|t| t.poi_type.as_str())
    }

    pub fn len(&self) -> usize {
        self.tiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tiles.is_empty()
    }

    /// Append a POI to the persistent CSV and to the in-memory dataset,
    /// rebuilding the index. Writes the 9-column header first when the file
    /// is new or empty. Must not be called while a run is in flight.
    pub fn append(
        &mut self,
        path: impl AsRef<Path>,
        name: &str,
        poi_type: &str,
        tile_km: f64,
        center_lat: f64,
        center_lon: f64,
    ) -> Result<PoiTile, DatasetError> {
        if name.trim().is_empty() {
            return Err(DatasetError::Invalid("POI name is required".into()));
        }
        let rect = compute_bounds(center_lat, center_lon, tile_km)?;

        let path = path.as_ref();
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| DatasetError::Io {
                path: path.to_path_buf(),
                source: e,
            })?;
        let empty = file
            .metadata()
            .map(|m| m.len() == 0)
            .unwrap_or(true);

        let mut row = String::new();
        if empty {
            row.push_str(APPEND_HEADER);
            row.push('\n');
        }
        row.push_str(&format!(
            "{},{},{:.10},{:.10},{:.10},{:.10},{:.10},{:.10},{:.10}\n",
            name.trim(),
            poi_type.trim(),
            tile_km,
            center_lat,
            center_lon,
            rect.lat_min,
            rect.lat_max,
            rect.lon_min,
            rect.lon_max
        ));
        file.write_all(row.as_bytes()).map_err(|e| DatasetError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;

        let tile = PoiTile {
            rect,
            name: name.trim().to_string(),
            poi_type: poi_type.trim().to_string(),
            tile_km: Some(tile_km),
        };
        let idx = self.tiles.len();
        self.grid.insert(&tile.rect, idx);
        self.bboxes.push(tile.rect);
        self.tiles.push(tile.clone());
        log::info!("Appended POI '{}' to {:?}", tile.name, path);
        Ok(tile)
    }
}

fn bounds_row(
    record: &csv::StringRecord,
    ilat0: usize,
    ilat1: usize,
    ilon0: usize,
    ilon1: usize,
) -> Option<TileRect> {
    Some(TileRect::new(
        parse_field(record, ilat0)?,
        parse_field(record, ilat1)?,
        parse_field(record, ilon0)?,
        parse_field(record, ilon1)?,
    ))
}

fn center_row(
    record: &csv::StringRecord,
    ilat: usize,
    ilon: usize,
    ikm: usize,
) -> Option<(TileRect, f64)> {
    let lat_c = parse_field(record, ilat)?;
    let lon_c = parse_field(record, ilon)?;
    let tile_km = parse_field(record, ikm)?;
    if tile_km <= 0.0 {
        return None;
    }
    let half_km = tile_km * 0.5;
    let lat_deg = half_km / LOADER_LAT_KM_PER_DEG;
    let lon_deg = half_km / (LOADER_LON_KM_PER_DEG * lat_c.to_radians().cos());
    // normalized like the explicit-bounds layout; a tile straddling the
    // dateline comes out with lon_min > lon_max and wrap-aware tests apply
    Some((
        TileRect::new(
            lat_c - lat_deg,
            lat_c + lat_deg,
            norm_lon(lon_c - lon_deg),
            norm_lon(lon_c + lon_deg),
        ),
        tile_km,
    ))
}

/// Rectangle bounds for a square tile of side `tile_km` centered at the
/// given point. Guards the cosine singularity near the poles, clamps
/// latitude to ±90°, and swaps a wrapped min/max pair after normalization so
/// appended CSV rows stay simple.
pub fn compute_bounds(
    center_lat: f64,
    center_lon: f64,
    tile_km: f64,
) -> Result<TileRect, DatasetError> {
    if !center_lat.is_finite() || !center_lon.is_finite() || !tile_km.is_finite() || tile_km <= 0.0
    {
        return Err(DatasetError::Invalid(
            "tile bounds require finite center coordinates and tile_km > 0".into(),
        ));
    }

    let mut coslat = center_lat.to_radians().cos();
    if coslat.abs() < 1e-6 {
        coslat = if coslat < 0.0 { -1e-6 } else { 1e-6 };
    }

    let half = tile_km * 0.5;
    let dlat = half / LAT_KM_PER_DEG;
    let dlon = half / (LAT_KM_PER_DEG * coslat);

    let lat_min = (center_lat - dlat).clamp(-90.0, 90.0);
    let lat_max = (center_lat + dlat).clamp(-90.0, 90.0);
    let mut lon_min = norm_lon(center_lon - dlon);
    let mut lon_max = norm_lon(center_lon + dlon);
    if lon_min > lon_max {
        std::mem::swap(&mut lon_min, &mut lon_max);
    }

    Ok(TileRect::new(lat_min, lat_max, lon_min, lon_max))
}
