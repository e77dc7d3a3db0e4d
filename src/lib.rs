//! Overpass - operations planning for Earth-observation satellites
//!
//! Given a two-line element set and a set of geospatial filters, this crate
//! produces the 1 Hz sub-satellite ground track over a chosen horizon,
//! labels it by country of overflight, picks the per-POI closest-approach
//! sample with range and bearing, and exports spreadsheet-ready CSV.

pub mod datasets;
pub mod ephemeris;
pub mod export;
pub mod geo;
pub mod grid;
pub mod poi;
pub mod propagation;
pub mod stream;
pub mod territory;
pub mod time;
