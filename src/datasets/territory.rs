//! Country tile dataset

use std::path::Path;

use crate::geo::TileRect;
use crate::grid::SpatialGrid;

use super::{column_index, open_reader, parse_field, DatasetError};

// Legacy layout: fixed positions for center/size columns and the label
const LEGACY_LON_CENTER: usize = 3;
const LEGACY_LAT_CENTER: usize = 4;
const LEGACY_WIDTH: usize = 5;
const LEGACY_HEIGHT: usize = 6;
const LEGACY_LABEL: usize = 7;

/// One labeled tile rectangle. The label is an ISO-3166 country name and may
/// be empty when unknown.
#[derive(Debug, Clone, PartialEq)]
pub struct CountryTile {
    pub rect: TileRect,
    pub label: String,
}

/// Collection of country tiles with a spatial index over their rectangles
#[derive(Debug, Default)]
pub struct TerritoryDataset {
    tiles: Vec<CountryTile>,
    grid: SpatialGrid,
}

impl TerritoryDataset {
    /// Load tiles from CSV. Preferred layout carries `Lat_min`, `Lat_max`,
    /// `Lon_min`, `Lon_max` headers with the country label in the trailing
    /// column; the legacy layout is positional (center lon/lat, width,
    /// height, label). Rows missing required fields are skipped.
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

        let named = (
            column_index(&headers, "Lat_min"),
            column_index(&headers, "Lat_max"),
            column_index(&headers, "Lon_min"),
            column_index(&headers, "Lon_max"),
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

            let tile = match named {
                (Some(ilat0), Some(ilat1), Some(ilon0), Some(ilon1)) => {
                    parse_named_row(&record, ilat0, ilat1, ilon0, ilon1)
                }
                _ => parse_legacy_row(&record),
            };

            match tile {
                Some(t) => tiles.push(t),
                None => skipped += 1,
            }
        }

        if skipped > 0 {
            log::warn!("territory dataset {:?}: skipped {} malformed rows", path, skipped);
        }
        log::info!("Loaded {} country tiles from {:?}", tiles.len(), path);
        Ok(Self::from_tiles(tiles))
    }

    /// Build a dataset from in-memory tiles, indexing every rectangle
    pub fn from_tiles(tiles: Vec<CountryTile>) -> Self {
        let mut grid = SpatialGrid::new();
        for (idx, tile) in tiles.iter().enumerate() {
            grid.insert(&tile.rect, idx);
        }
        Self { tiles, grid }
    }

    /// Country label of the first tile containing the point, if any.
    /// Probes the 3×3 cell neighborhood; first hit wins.
    pub fn label_of(&self, lat: f64, lon: f64) -> Option<&str> {
        for handle in self.grid.probe(lat, lon) {
            let tile = &self.tiles[handle];
            if tile.rect.contains(lat, lon) {
                return Some(&tile.label);
            }
        }
        None
    }

    pub fn tiles(&self) -> &[CountryTile] {
        &self.tiles
    }

    pub fn len(&self) -> usize {
        self.tiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tiles.is_empty()
    }
}

fn parse_named_row(
    record: &csv::StringRecord,
    ilat0: usize,
    ilat1: usize,
    ilon0: usize,
    ilon1: usize,
) -> Option<CountryTile> {
    let lat_min = parse_field(record, ilat0)?;
    let lat_max = parse_field(record, ilat1)?;
    let lon_min = parse_field(record, ilon0)?;
    let lon_max = parse_field(record, ilon1)?;
    let label = record
        .get(record.len().checked_sub(1)?)
        .unwrap_or("")
        .trim()
        .to_string();
    Some(CountryTile {
        rect: TileRect::new(lat_min, lat_max, lon_min, lon_max),
        label,
    })
}

fn parse_legacy_row(record: &csv::StringRecord) -> Option<CountryTile> {
    let lon_c = parse_field(record, LEGACY_LON_CENTER)?;
    let lat_c = parse_field(record, LEGACY_LAT_CENTER)?;
    let w = parse_field(record, LEGACY_WIDTH)?;
    let h = parse_field(record, LEGACY_HEIGHT)?;
    let label = record.get(LEGACY_LABEL).unwrap_or("").trim().to_string();
    Some(CountryTile {
        rect: TileRect::new(
            lat_c - h / 2.0,
            lat_c + h / 2.0,
            lon_c - w / 2.0,
            lon_c + w / 2.0,
        ),
        label,
    })
}
