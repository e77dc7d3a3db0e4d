//! Ground-track ephemeris generation
//!
//! The engine advances a private clone of the orbital state at a fixed step
//! over a finite horizon and fills an ordered buffer of sub-satellite
//! samples. It polls cancellation at every sample and never exposes a
//! partially built buffer.

use std::sync::Arc;

use parking_lot::RwLock;

use crate::propagation::Propagator;
use crate::stream::{CancelToken, RunOutcome};
use crate::time::jd_to_display;

const SECONDS_PER_DAY: f64 = 86_400.0;

/// One ground-track sample. The buffer owns `time_str`; consumers copy on
/// take.
#[derive(Debug, Clone, PartialEq)]
pub struct EphemSample {
    /// Julian date, UTC
    pub jd: f64,
    /// `YYYY/MM/DD HH:MM:SS`, derived from `jd`
    pub time_str: String,
    pub lat: f64,
    pub lon: f64,
}

/// Ordered ground-track buffer; insertion order equals temporal order
#[derive(Debug, Default, Clone)]
pub struct EphemBuffer {
    samples: Vec<EphemSample>,
}

impl EphemBuffer {
    pub fn samples(&self) -> &[EphemSample] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// Swappable handle to the current run's buffer.
///
/// The producer replaces the buffer atomically on completion; consumers take
/// a cheap read-only `Arc` borrow. One buffer is active at a time.
#[derive(Debug, Default, Clone)]
pub struct BufferHandle(Arc<RwLock<Option<Arc<EphemBuffer>>>>);

impl BufferHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the active buffer, dropping the previous one
    pub fn swap(&self, buffer: EphemBuffer) -> Arc<EphemBuffer> {
        let shared = Arc::new(buffer);
        *self.0.write() = Some(shared.clone());
        shared
    }

    /// Current buffer, if a run has completed
    pub fn current(&self) -> Option<Arc<EphemBuffer>> {
        self.0.read().clone()
    }

    pub fn clear(&self) {
        *self.0.write() = None;
    }
}

/// Generate the ground track starting at `start_jd`: exactly
/// `duration_s / step_s + 1` samples at `step_s` spacing, in chronological
/// order. Returns `Cancelled` (discarding the partial buffer) as soon as the
/// token trips, and `Failed` on the first propagation error.
pub fn generate_track<P: Propagator>(
    mut propagator: P,
    start_jd: f64,
    duration_s: u64,
    step_s: u64,
    cancel: &CancelToken,
) -> RunOutcome<EphemBuffer> {
    debug_assert!(step_s > 0);
    let steps = duration_s / step_s;
    let mut samples = Vec::with_capacity(steps as usize + 1);

    for k in 0..=steps {
        if cancel.is_cancelled() {
            log::debug!("ephemeris run cancelled at sample {}", k);
            return RunOutcome::Cancelled;
        }

        let jd = start_jd + (k * step_s) as f64 / SECONDS_PER_DAY;
        let point = match propagator.advance(jd) {
            Ok(p) => p,
            Err(e) => return RunOutcome::Failed(e.into()),
        };

        samples.push(EphemSample {
            jd,
            time_str: jd_to_display(jd),
            lat: point.lat_deg,
            lon: point.lon_deg,
        });
    }

    log::info!(
        "generated {} ground-track samples ({} s horizon at {} s step)",
        samples.len(),
        duration_s,
        step_s
    );
    RunOutcome::Complete(EphemBuffer { samples })
}
