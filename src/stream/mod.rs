//! Concurrency and streaming-result contracts shared by all producers
//!
//! Producers (ephemeris engine, territory labeler, POI selector) run off the
//! main scheduling thread, poll a [`CancelToken`] between samples, and hand
//! back a tagged [`RunOutcome`]. Completed result sets are drained into a
//! [`StreamingSink`] in bounded chunks so a downstream view stays responsive,
//! and [`RunManager`] enforces the single-flight policy: starting a new run
//! cancels the one in flight.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use thiserror::Error;

use crate::propagation::PropagationError;

/// Rows per streamed batch. Large enough to amortize per-batch overhead,
/// small enough that the consumer gets a yield point well under a second.
pub const CHUNK_ROWS: usize = 20_000;

/// Cooperative cancellation flag, cloned into each producer
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Failure kinds a producer can surface
#[derive(Debug, Error)]
pub enum RunError {
    #[error(transparent)]
    Propagation(#[from] PropagationError),
}

/// Tagged producer outcome. Cancellation is not a failure; a cancelled run
/// publishes nothing.
#[derive(Debug)]
pub enum RunOutcome<T> {
    Complete(T),
    Cancelled,
    Failed(RunError),
}

impl<T> RunOutcome<T> {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, RunOutcome::Cancelled)
    }
}

/// Incremental consumer of producer results.
///
/// `begin_bulk` may detach the sink from whatever displays it; `end_bulk`
/// must restore that detachment after the final batch.
pub trait StreamingSink {
    type Row;

    fn begin_bulk(&mut self);
    fn append_batch(&mut self, rows: &[Self::Row]);
    fn end_bulk(&mut self);
}

/// Drain a completed result set into a sink in chunks of [`CHUNK_ROWS`],
/// yielding between chunks.
pub fn drain_into<S: StreamingSink>(sink: &mut S, rows: &[S::Row]) {
    sink.begin_bulk();
    for chunk in rows.chunks(CHUNK_ROWS) {
        sink.append_batch(chunk);
        thread::yield_now();
    }
    sink.end_bulk();
}

/// Simple owning sink: collects rows into a `Vec` while tracking the
/// detach/reattach contract. Used as the downstream view by the CLI and as a
/// probe in tests.
#[derive(Debug, Default)]
pub struct VecSink<R> {
    rows: Vec<R>,
    detached: bool,
}

impl<R> VecSink<R> {
    pub fn new() -> Self {
        Self {
            rows: Vec::new(),
            detached: false,
        }
    }

    pub fn rows(&self) -> &[R] {
        &self.rows
    }

    pub fn into_rows(self) -> Vec<R> {
        self.rows
    }

    pub fn is_detached(&self) -> bool {
        self.detached
    }
}

impl<R: Clone> StreamingSink for VecSink<R> {
    type Row = R;

    fn begin_bulk(&mut self) {
        self.detached = true;
    }

    fn append_batch(&mut self, rows: &[R]) {
        self.rows.extend_from_slice(rows);
    }

    fn end_bulk(&mut self) {
        self.detached = false;
    }
}

/// Single-flight run ownership: at most one producer per consumer.
///
/// Launching cancels the previous run synchronously and detaches from its
/// worker thread rather than joining, so the caller never blocks on worker
/// exit. The manager is shared (`&self` methods) so an interrupt handler can
/// cancel from another thread.
#[derive(Debug, Default)]
pub struct RunManager {
    current: Mutex<Option<ActiveRun>>,
    interrupted: AtomicBool,
}

#[derive(Debug)]
struct ActiveRun {
    token: CancelToken,
    _join: Option<JoinHandle<()>>,
}

impl RunManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancel any in-flight run and start a new one on a background thread.
    /// Returns the new run's token, already tripped if the manager has been
    /// interrupted.
    pub fn launch<F>(&self, work: F) -> CancelToken
    where
        F: FnOnce(CancelToken) + Send + 'static,
    {
        self.cancel_current();
        let token = CancelToken::new();
        if self.interrupted.load(Ordering::Relaxed) {
            token.cancel();
        }
        let worker_token = token.clone();
        let join = thread::spawn(move || work(worker_token));
        *self.current.lock() = Some(ActiveRun {
            token: token.clone(),
            _join: Some(join),
        });
        token
    }

    /// Cancel the in-flight run, if any, without waiting for the worker
    pub fn cancel_current(&self) {
        if let Some(run) = self.current.lock().take() {
            run.token.cancel();
        }
    }

    /// Cancel the in-flight run and mark the manager interrupted: every
    /// later launch starts with a tripped token. Used by the Ctrl-C handler
    /// so an interrupt between producers still stops the pipeline.
    pub fn interrupt(&self) {
        self.interrupted.store(true, Ordering::Relaxed);
        self.cancel_current();
    }

    pub fn is_interrupted(&self) -> bool {
        self.interrupted.load(Ordering::Relaxed)
    }
}

/// Run a producer to completion on a background thread, invoking `tick` with
/// the elapsed whole seconds once per second while it works. The elapsed
/// readout is advisory status only.
pub fn run_to_completion<T, F>(
    manager: &RunManager,
    producer: F,
    mut tick: impl FnMut(u64),
) -> RunOutcome<T>
where
    T: Send + 'static,
    F: FnOnce(&CancelToken) -> RunOutcome<T> + Send + 'static,
{
    let (tx, rx) = mpsc::channel();
    manager.launch(move |token| {
        let outcome = producer(&token);
        // receiver may be gone if a newer run superseded this one
        let _ = tx.send(outcome);
    });

    let started = Instant::now();
    loop {
        match rx.recv_timeout(Duration::from_secs(1)) {
            Ok(outcome) => return outcome,
            Err(RecvTimeoutError::Timeout) => tick(started.elapsed().as_secs()),
            Err(RecvTimeoutError::Disconnected) => return RunOutcome::Cancelled,
        }
    }
}
