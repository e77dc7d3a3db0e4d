//! Dataset loading: country tiles and POI tiles from CSV
//!
//! Both loaders map columns by header name with a legacy positional
//! fallback, skip malformed rows, and rebuild their spatial index on load.
//! A failed reload never clobbers a previously loaded dataset; the error is
//! surfaced and the caller keeps the old handle.

mod poi;
mod territory;

pub use poi::{compute_bounds, PoiDataset, PoiTile};
pub use territory::{CountryTile, TerritoryDataset};

use std::path::{Path, PathBuf};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("cannot open dataset '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot parse dataset '{path}': {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
    #[error("dataset '{path}' is missing a usable header row")]
    MissingHeader { path: PathBuf },
    #[error("{0}")]
    Invalid(String),
}

/// Case-insensitive lookup of a column index in a header record
fn column_index(headers: &csv::StringRecord, name: &str) -> Option<usize> {
    headers
        .iter()
        .position(|h| h.trim().eq_ignore_ascii_case(name))
}

fn open_reader(path: &Path) -> Result<csv::Reader<std::fs::File>, DatasetError> {
    let file = std::fs::File::open(path).map_err(|e| DatasetError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;
    Ok(csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(file))
}

/// Parse a float field; `None` when the field is absent or not a number
fn parse_field(record: &csv::StringRecord, idx: usize) -> Option<f64> {
    record.get(idx).and_then(|s| s.trim().parse::<f64>().ok())
}
