//! Per-POI closest-approach selection
//!
//! Scans the ground track against the POI tiles and keeps, for each POI with
//! at least one sample inside its rectangle, the single minimum-range sample
//! with range and bearing from the tile center. The scan runs on a
//! short-lived pool of workers over disjoint contiguous sample slices; each
//! worker fills its own bucket and a single reducer picks the minima.

use std::collections::HashMap;

use rayon::prelude::*;

use crate::datasets::PoiDataset;
use crate::ephemeris::EphemBuffer;
use crate::geo::{bearing_deg, haversine_km, GeoPoint};
use crate::stream::{CancelToken, RunOutcome};

/// Closest-approach record for one POI. Owns its strings.
#[derive(Debug, Clone, PartialEq)]
pub struct PoiPick {
    pub time_str: String,
    pub lat: f64,
    pub lon: f64,
    pub range_km: f64,
    pub bearing_deg: f64,
    pub name: String,
    pub poi_type: String,
}

/// One in-rectangle sample found by a worker
#[derive(Debug, Clone, Copy)]
struct Hit {
    poi: usize,
    sample: usize,
    range_km: f64,
    bearing_deg: f64,
}

/// Worker count when the caller does not override it: one per core,
/// clamped to `[2, 8]`
pub fn default_thread_count() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(2)
        .clamp(2, 8)
}

/// Select the minimum-range sample per POI.
///
/// `filter` restricts the run to one POI by exact name; a name not present
/// in the dataset yields an empty result. With `threads == 1` the output is
/// fully deterministic (POI discovery order); with more threads the order of
/// picks is unspecified but each pick itself is deterministic because ties
/// resolve to the earliest sample.
pub fn select_pois(
    buffer: &EphemBuffer,
    dataset: &PoiDataset,
    filter: Option<&str>,
    threads: usize,
    cancel: &CancelToken,
) -> RunOutcome<Vec<PoiPick>> {
    let samples = buffer.samples();
    if samples.is_empty() || dataset.is_empty() {
        return RunOutcome::Complete(Vec::new());
    }

    let filter_idx = match filter {
        Some(name) => match dataset.find(name) {
            Some(idx) => Some(idx),
            None => {
                log::warn!("POI filter '{}' matches no dataset entry", name);
                return RunOutcome::Complete(Vec::new());
            }
        },
        None => None,
    };

    let threads = threads.max(1);
    let slice_len = samples.len().div_ceil(threads);

    let scan = || {
        samples
            .par_chunks(slice_len)
            .enumerate()
            .map(|(chunk_idx, chunk)| {
                scan_slice(chunk, chunk_idx * slice_len, dataset, filter_idx, cancel)
            })
            .collect::<Vec<Vec<Hit>>>()
    };

    let buckets = match rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build()
    {
        Ok(pool) => pool.install(scan),
        Err(e) => {
            log::warn!("falling back to the global thread pool: {}", e);
            scan()
        }
    };

    if cancel.is_cancelled() {
        log::debug!("POI selection cancelled; discarding partial buckets");
        return RunOutcome::Cancelled;
    }

    // Reduce per POI: minimum range, earliest sample on a tie. Buckets are
    // concatenated in slice order, so discovery order is stable.
    let mut best: HashMap<usize, Hit> = HashMap::new();
    let mut discovery: Vec<usize> = Vec::new();
    for hit in buckets.into_iter().flatten() {
        match best.get_mut(&hit.poi) {
            Some(current) => {
                if hit.range_km < current.range_km
                    || (hit.range_km == current.range_km && hit.sample < current.sample)
                {
                    *current = hit;
                }
            }
            None => {
                discovery.push(hit.poi);
                best.insert(hit.poi, hit);
            }
        }
    }

    let picks: Vec<PoiPick> = discovery
        .into_iter()
        .map(|poi| {
            let hit = best[&poi];
            let tile = &dataset.tiles()[poi];
            let sample = &samples[hit.sample];
            PoiPick {
                time_str: sample.time_str.clone(),
                lat: sample.lat,
                lon: sample.lon,
                range_km: hit.range_km,
                bearing_deg: hit.bearing_deg,
                name: tile.name.clone(),
                poi_type: tile.poi_type.clone(),
            }
        })
        .collect();

    log::info!(
        "POI selection: {} picks from {} samples x {} tiles",
        picks.len(),
        samples.len(),
        dataset.len()
    );
    RunOutcome::Complete(picks)
}

fn scan_slice(
    chunk: &[crate::ephemeris::EphemSample],
    base: usize,
    dataset: &PoiDataset,
    filter_idx: Option<usize>,
    cancel: &CancelToken,
) -> Vec<Hit> {
    let mut out = Vec::new();
    for (offset, sample) in chunk.iter().enumerate() {
        if cancel.is_cancelled() {
            return out;
        }
        let hit = match filter_idx {
            // single-POI mode: only the named tile is ever tested
            Some(poi) => test_tile(dataset, poi, sample, base + offset),
            None => {
                // first containing candidate from the 3x3 probe decides
                let mut found = None;
                for poi in dataset.probe(sample.lat, sample.lon) {
                    if let Some(hit) = test_tile(dataset, poi, sample, base + offset) {
                        found = Some(hit);
                        break;
                    }
                }
                found
            }
        };
        if let Some(hit) = hit {
            out.push(hit);
        }
    }
    out
}

fn test_tile(
    dataset: &PoiDataset,
    poi: usize,
    sample: &crate::ephemeris::EphemSample,
    sample_idx: usize,
) -> Option<Hit> {
    // bounding-box pre-check, then exact membership
    if !dataset.bbox(poi).contains(sample.lat, sample.lon) {
        return None;
    }
    let tile = &dataset.tiles()[poi];
    if !tile.rect.contains(sample.lat, sample.lon) {
        return None;
    }
    let center = tile.rect.center();
    let point = GeoPoint::new(sample.lat, sample.lon);
    Some(Hit {
        poi,
        sample: sample_idx,
        range_km: haversine_km(&center, &point),
        bearing_deg: bearing_deg(&center, &point),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datasets::PoiTile;
    use crate::geo::TileRect;

    fn buffer_from(points: &[(f64, f64)]) -> EphemBuffer {
        use crate::propagation::{PropagationError, Propagator, SubPoint};
        struct Replay(Vec<(f64, f64)>);
        impl Propagator for Replay {
            fn advance(&mut self, jd: f64) -> Result<SubPoint, PropagationError> {
                let idx = ((jd - 2_451_545.0) * 86_400.0).round() as usize;
                let (lat, lon) = self.0[idx.min(self.0.len() - 1)];
                Ok(SubPoint {
                    lat_deg: lat,
                    lon_deg: lon,
                })
            }
        }
        let n = points.len() as u64 - 1;
        match crate::ephemeris::generate_track(
            Replay(points.to_vec()),
            2_451_545.0,
            n,
            1,
            &CancelToken::new(),
        ) {
            RunOutcome::Complete(buf) => buf,
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    fn paris_dataset() -> PoiDataset {
        PoiDataset::from_tiles(vec![PoiTile {
            rect: TileRect::new(48.7566, 48.9566, 2.2522, 2.4522),
            name: "Paris".into(),
            poi_type: "city".into(),
            tile_km: None,
        }])
    }

    #[test]
    fn picks_minimum_range_sample() {
        let buf = buffer_from(&[
            (48.86, 2.30),
            (48.86, 2.34),
            (48.86, 2.36),
            (48.86, 2.40),
        ]);
        let picks = match select_pois(&buf, &paris_dataset(), None, 1, &CancelToken::new()) {
            RunOutcome::Complete(p) => p,
            other => panic!("unexpected outcome {:?}", other),
        };
        assert_eq!(picks.len(), 1);
        let pick = &picks[0];
        assert_eq!(pick.name, "Paris");
        assert_eq!(pick.lon, 2.36);
        assert!((pick.range_km - 0.68).abs() < 0.1, "range {}", pick.range_km);
        assert!(
            pick.bearing_deg >= 45.0 && pick.bearing_deg <= 135.0,
            "bearing {}",
            pick.bearing_deg
        );
    }

    #[test]
    fn zero_hits_produce_no_output() {
        let buf = buffer_from(&[(0.0, 0.0), (10.0, 10.0)]);
        let picks = match select_pois(&buf, &paris_dataset(), None, 1, &CancelToken::new()) {
            RunOutcome::Complete(p) => p,
            other => panic!("unexpected outcome {:?}", other),
        };
        assert!(picks.is_empty());
    }

    #[test]
    fn unknown_filter_name_yields_empty() {
        let buf = buffer_from(&[(48.86, 2.36)]);
        let picks = match select_pois(
            &buf,
            &paris_dataset(),
            Some("Atlantis"),
            1,
            &CancelToken::new(),
        ) {
            RunOutcome::Complete(p) => p,
            other => panic!("unexpected outcome {:?}", other),
        };
        assert!(picks.is_empty());
    }

    #[test]
    fn filter_restricts_to_named_poi() {
        let dataset = PoiDataset::from_tiles(vec![
            PoiTile {
                rect: TileRect::new(-1.0, 1.0, -1.0, 1.0),
                name: "Origin".into(),
                poi_type: "t".into(),
                tile_km: None,
            },
            PoiTile {
                rect: TileRect::new(9.0, 11.0, 9.0, 11.0),
                name: "Ten".into(),
                poi_type: "t".into(),
                tile_km: None,
            },
        ]);
        let buf = buffer_from(&[(0.0, 0.0), (10.0, 10.0)]);
        let picks = match select_pois(&buf, &dataset, Some("Ten"), 1, &CancelToken::new()) {
            RunOutcome::Complete(p) => p,
            other => panic!("unexpected outcome {:?}", other),
        };
        assert_eq!(picks.len(), 1);
        assert_eq!(picks[0].name, "Ten");
    }

    #[test]
    fn tie_resolves_to_earliest_sample() {
        // identical positions give identical ranges; the earlier sample wins
        let buf = buffer_from(&[(48.86, 2.36), (48.86, 2.36)]);
        let picks = match select_pois(&buf, &paris_dataset(), None, 1, &CancelToken::new()) {
            RunOutcome::Complete(p) => p,
            other => panic!("unexpected outcome {:?}", other),
        };
        assert_eq!(picks.len(), 1);
        assert_eq!(picks[0].time_str, buf.samples()[0].time_str);
    }

    #[test]
    fn single_thread_runs_are_bitwise_identical() {
        let buf = buffer_from(&[
            (48.86, 2.30),
            (48.86, 2.36),
            (0.0, 0.0),
            (48.80, 2.40),
        ]);
        let a = match select_pois(&buf, &paris_dataset(), None, 1, &CancelToken::new()) {
            RunOutcome::Complete(p) => p,
            other => panic!("unexpected outcome {:?}", other),
        };
        let b = match select_pois(&buf, &paris_dataset(), None, 1, &CancelToken::new()) {
            RunOutcome::Complete(p) => p,
            other => panic!("unexpected outcome {:?}", other),
        };
        assert_eq!(a, b);
    }

    #[test]
    fn parallel_reduction_matches_sequential() {
        let points: Vec<(f64, f64)> = (0..500)
            .map(|i| (48.7 + (i % 40) as f64 * 0.01, 2.0 + (i % 50) as f64 * 0.01))
            .collect();
        let buf = buffer_from(&points);
        let seq = match select_pois(&buf, &paris_dataset(), None, 1, &CancelToken::new()) {
            RunOutcome::Complete(p) => p,
            other => panic!("unexpected outcome {:?}", other),
        };
        let par = match select_pois(&buf, &paris_dataset(), None, 4, &CancelToken::new()) {
            RunOutcome::Complete(p) => p,
            other => panic!("unexpected outcome {:?}", other),
        };
        assert_eq!(seq, par);
    }

    #[test]
    fn cancelled_selection_discards_everything() {
        let buf = buffer_from(&[(48.86, 2.36)]);
        let cancel = CancelToken::new();
        cancel.cancel();
        assert!(select_pois(&buf, &paris_dataset(), None, 1, &cancel).is_cancelled());
    }

    #[test]
    fn dateline_poi_matches_both_sides() {
        let dataset = PoiDataset::from_tiles(vec![PoiTile {
            rect: TileRect::new(-5.0, 5.0, 170.0, -170.0),
            name: "Fiji".into(),
            poi_type: "islands".into(),
            tile_km: None,
        }]);
        let buf = buffer_from(&[(0.0, 175.0), (0.0, -179.0)]);
        let picks = match select_pois(&buf, &dataset, None, 1, &CancelToken::new()) {
            RunOutcome::Complete(p) => p,
            other => panic!("unexpected outcome {:?}", other),
        };
        assert_eq!(picks.len(), 1);
        assert_eq!(picks[0].name, "Fiji");
        // the tile center unwraps onto the antimeridian, so the sample at
        // -179 (1 degree away) beats the one at 175 (5 degrees away)
        assert_eq!(picks[0].lon, -179.0);
        assert!(picks[0].range_km < 200.0, "range {}", picks[0].range_km);
    }
}
