//! Territory overflight labeling
//!
//! Resolves each ground-track sample to the country tile it overflies and
//! filters by a selector: wildcard (any land) or one specific country.
//! Output preserves sample order; non-land samples are dropped.

use crate::datasets::TerritoryDataset;
use crate::ephemeris::EphemBuffer;
use crate::stream::{CancelToken, RunOutcome};
use crate::time::parse_display_time;

/// Wildcard selector accepting any labeled tile
pub const WILDCARD: &str = "*";

/// Consecutive rows further apart than this get a blank separator row
const GAP_SECONDS: i64 = 30;

/// Country filter for a labeling run
#[derive(Debug, Clone, PartialEq)]
pub enum CountrySelector {
    /// Any sample over a labeled tile (`*`)
    AllLand,
    /// Samples whose resolved label equals this country exactly
    Country(String),
}

impl CountrySelector {
    pub fn parse(s: &str) -> Self {
        let trimmed = s.trim();
        if trimmed == WILDCARD {
            CountrySelector::AllLand
        } else {
            CountrySelector::Country(trimmed.to_string())
        }
    }

    fn accepts(&self, label: &str) -> bool {
        match self {
            CountrySelector::AllLand => true,
            CountrySelector::Country(want) => want == label,
        }
    }
}

/// One labeled track row. Owns its strings; blank rows (empty `time_str`,
/// zero coordinates) act as visual gap separators and are never exported.
#[derive(Debug, Clone, PartialEq)]
pub struct TerritoryRow {
    pub time_str: String,
    pub lat: f64,
    pub lon: f64,
    pub country: String,
}

impl TerritoryRow {
    fn gap_marker() -> Self {
        Self {
            time_str: String::new(),
            lat: 0.0,
            lon: 0.0,
            country: String::new(),
        }
    }

    pub fn is_gap_marker(&self) -> bool {
        self.time_str.is_empty()
    }
}

/// Label every buffer sample against the dataset and keep those the
/// selector accepts. The buffer must not be mutated while this runs; the
/// token is polled per sample and a cancelled run emits nothing.
pub fn label_track(
    buffer: &EphemBuffer,
    dataset: &TerritoryDataset,
    selector: &CountrySelector,
    cancel: &CancelToken,
) -> RunOutcome<Vec<TerritoryRow>> {
    let mut rows = Vec::new();
    for (i, sample) in buffer.samples().iter().enumerate() {
        if cancel.is_cancelled() {
            log::debug!("territory labeling cancelled at sample {}", i);
            return RunOutcome::Cancelled;
        }
        if let Some(label) = dataset.label_of(sample.lat, sample.lon) {
            if selector.accepts(label) {
                rows.push(TerritoryRow {
                    time_str: sample.time_str.clone(),
                    lat: sample.lat,
                    lon: sample.lon,
                    country: label.to_string(),
                });
            }
        }
    }
    log::info!(
        "territory labeling matched {} of {} samples",
        rows.len(),
        buffer.len()
    );
    RunOutcome::Complete(rows)
}

/// Insert one blank separator row wherever consecutive rows are more than
/// 30 s apart. Row times are parsed back from the display strings; an
/// unparsable time falls back to the current clock and the walk continues.
pub fn insert_gap_markers(rows: Vec<TerritoryRow>) -> Vec<TerritoryRow> {
    let mut out = Vec::with_capacity(rows.len());
    let mut last_t: Option<i64> = None;
    for row in rows {
        let t = parse_display_time(&row.time_str).unwrap_or_else(|_| {
            log::debug!("unparsable row time '{}', substituting now", row.time_str);
            chrono::Utc::now().timestamp()
        });
        if let Some(prev) = last_t {
            if t - prev > GAP_SECONDS {
                out.push(TerritoryRow::gap_marker());
            }
        }
        last_t = Some(t);
        out.push(row);
    }
    out
}
