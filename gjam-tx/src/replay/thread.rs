//! Replay thread: fills the chunk pool from a sample source
//!
//! **Lifecycle:**
//! - Spawned with a source, the pool's `FillSide`, the readiness signal and a
//!   completion callback.
//! - Prefills every free chunk and marks the pool primed. Afterwards each
//!   readiness request is served by refilling every free chunk; the request is
//!   cleared once no chunk is free, so a tick that drains several chunks gets
//!   all of them back.
//! - A zero-byte read reports `EndOfFile`; a read failure reports `ReadError`.
//!   Either is terminal: the callback fires once and the thread exits.
//! - `cancel()` (or drop) stops it without a notice; `finish()` joins it and
//!   returns the `FillSide` so a successor can keep filling the same pool.
//!
//! Fills may block on storage I/O. That only ever happens here, never on the
//! tick path.

use super::chunk::FillSide;
use super::signal::ReadinessSignal;
use super::source::SampleSource;
use crate::error::{Error, Result};
use gjam_common::events::{CompletionNotice, ReplayState};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Upper bound on how long the thread sleeps between checks of the signal and stop flag
const IDLE_POLL: Duration = Duration::from_millis(5);

/// Terminal notice tagged with the generation of the thread that produced it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplayNotice {
    pub generation: u64,
    pub notice: CompletionNotice,
}

/// Invoked once, from the replay thread, with the terminal notice
pub type CompletionCallback = Box<dyn FnOnce(ReplayNotice) + Send + 'static>;

/// Counters and state readable from the control context
#[derive(Debug)]
struct ReplayShared {
    state: AtomicU8,
    stop: AtomicBool,
    fills: AtomicU64,
    bytes_read: AtomicU64,
}

impl ReplayShared {
    fn set_state(&self, state: ReplayState) {
        self.state.store(state.as_u8(), Ordering::Release);
    }

    fn state(&self) -> ReplayState {
        ReplayState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn stopped(&self) -> bool {
        self.stop.load(Ordering::Acquire)
    }
}

/// What `finish()` hands back to the control surface
#[derive(Debug)]
pub struct ReplayReport {
    pub generation: u64,
    /// Chunks delivered to the consumer
    pub fills: u64,
    /// Bytes read from the source across all fills
    pub bytes_read: u64,
    pub state: ReplayState,
    /// The pool producer, or None if the thread panicked
    pub pool: Option<FillSide>,
}

impl ReplayReport {
    /// Report for a thread whose join could not be awaited
    pub fn lost(generation: u64) -> Self {
        Self {
            generation,
            fills: 0,
            bytes_read: 0,
            state: ReplayState::Stopped,
            pool: None,
        }
    }
}

/// Handle to a running replay thread
pub struct ReplayThread {
    generation: u64,
    shared: Arc<ReplayShared>,
    handle: Option<JoinHandle<FillSide>>,
}

enum FillOutcome {
    Filled,
    NoFreeChunk,
    Terminal(CompletionNotice),
}

impl ReplayThread {
    /// Spawn a replay thread
    ///
    /// # Arguments
    /// * `source` - Opened sample source; released when the thread exits
    /// * `pool` - Producer half of the chunk pool
    /// * `signal` - Readiness signal raised by the tick handler
    /// * `generation` - Tag carried by the completion notice
    /// * `on_complete` - Receives `EndOfFile` or `ReadError`, at most once
    pub fn spawn(
        source: Box<dyn SampleSource>,
        pool: FillSide,
        signal: Arc<ReadinessSignal>,
        generation: u64,
        on_complete: CompletionCallback,
    ) -> Result<Self> {
        let shared = Arc::new(ReplayShared {
            state: AtomicU8::new(ReplayState::Configured.as_u8()),
            stop: AtomicBool::new(false),
            fills: AtomicU64::new(0),
            bytes_read: AtomicU64::new(0),
        });

        let worker_shared = Arc::clone(&shared);
        let handle = thread::Builder::new()
            .name(format!("gjam-replay-{}", generation))
            .spawn(move || replay_loop(source, pool, signal, worker_shared, generation, on_complete))
            .map_err(Error::Io)?;

        Ok(Self {
            generation,
            shared,
            handle: Some(handle),
        })
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn state(&self) -> ReplayState {
        self.shared.state()
    }

    pub fn fills(&self) -> u64 {
        self.shared.fills.load(Ordering::Relaxed)
    }

    pub fn bytes_read(&self) -> u64 {
        self.shared.bytes_read.load(Ordering::Relaxed)
    }

    /// Whether the worker has exited
    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().map_or(true, JoinHandle::is_finished)
    }

    /// Stop issuing fills and wait for the thread, recovering the pool
    ///
    /// Intended after a terminal notice, when the thread has already exited.
    /// Calling it on a live thread blocks until any in-progress read returns.
    pub fn finish(mut self) -> ReplayReport {
        self.request_stop();
        let pool = self.handle.take().and_then(|handle| match handle.join() {
            Ok(pool) => Some(pool),
            Err(_) => {
                warn!("Replay thread {} panicked", self.generation);
                None
            }
        });

        ReplayReport {
            generation: self.generation,
            fills: self.fills(),
            bytes_read: self.bytes_read(),
            state: self.state(),
            pool,
        }
    }

    /// Stop issuing fills without waiting
    ///
    /// Safe from the control context at any time. A read already in progress
    /// completes in the background and its chunk is discarded with the pool.
    pub fn cancel(mut self) {
        self.request_stop();
        // Detach; the worker exits on its own
        self.handle.take();
    }

    fn request_stop(&self) {
        self.shared.stop.store(true, Ordering::Release);
        if let Some(handle) = self.handle.as_ref() {
            handle.thread().unpark();
        }
    }
}

impl Drop for ReplayThread {
    fn drop(&mut self) {
        if self.handle.is_some() {
            self.request_stop();
        }
    }
}

impl std::fmt::Debug for ReplayThread {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReplayThread")
            .field("generation", &self.generation)
            .field("state", &self.state())
            .field("fills", &self.fills())
            .field("bytes_read", &self.bytes_read())
            .finish()
    }
}

fn replay_loop(
    mut source: Box<dyn SampleSource>,
    mut pool: FillSide,
    signal: Arc<ReadinessSignal>,
    shared: Arc<ReplayShared>,
    generation: u64,
    on_complete: CompletionCallback,
) -> FillSide {
    signal.register_current();
    info!(
        "Replay thread {} started: {} (pool depth {}, chunk {} bytes)",
        generation,
        source.describe(),
        pool.depth(),
        pool.chunk_size()
    );

    let mut outcome = None;

    // Prefill whatever the pool has free
    let mut prefilled = 0usize;
    while !shared.stopped() {
        match fill_one(source.as_mut(), &mut pool, &shared) {
            FillOutcome::Filled => prefilled += 1,
            FillOutcome::NoFreeChunk => break,
            FillOutcome::Terminal(notice) => {
                outcome = Some(notice);
                break;
            }
        }
    }
    pool.mark_primed();
    if prefilled > 0 {
        signal.clear();
    }
    debug!("Replay thread {} prefilled {} chunks", generation, prefilled);

    // Steady state: while a request stands, refill every chunk the consumer has released
    while outcome.is_none() && !shared.stopped() {
        if !signal.wait(IDLE_POLL) || shared.stopped() {
            continue;
        }

        match fill_one(source.as_mut(), &mut pool, &shared) {
            FillOutcome::Filled => {}
            // Pool full again; a chunk released after this point is requested by the next tick
            FillOutcome::NoFreeChunk => signal.clear(),
            FillOutcome::Terminal(notice) => outcome = Some(notice),
        }
    }

    signal.unregister(thread::current().id());
    drop(source);

    match outcome {
        Some(notice) if !shared.stopped() => {
            info!(
                "Replay thread {} finished with {} after {} fills ({} bytes)",
                generation,
                notice,
                shared.fills.load(Ordering::Relaxed),
                shared.bytes_read.load(Ordering::Relaxed)
            );
            on_complete(ReplayNotice { generation, notice });
        }
        _ => {
            shared.set_state(ReplayState::Stopped);
            debug!("Replay thread {} cancelled", generation);
        }
    }

    pool
}

fn fill_one(source: &mut dyn SampleSource, pool: &mut FillSide, shared: &ReplayShared) -> FillOutcome {
    let Some(mut chunk) = pool.checkout() else {
        return FillOutcome::NoFreeChunk;
    };

    let seq = shared.fills.load(Ordering::Relaxed) + 1;
    match chunk.fill_from(source, seq) {
        Ok(0) => {
            pool.put_back(chunk);
            shared.set_state(ReplayState::Draining);
            FillOutcome::Terminal(CompletionNotice::EndOfFile)
        }
        Ok(n) => {
            shared.fills.fetch_add(1, Ordering::Relaxed);
            shared.bytes_read.fetch_add(n as u64, Ordering::Relaxed);
            shared.set_state(ReplayState::Streaming);
            pool.deliver(chunk);
            FillOutcome::Filled
        }
        Err(e) => {
            warn!("Sample source read failed: {}", e);
            pool.put_back(chunk);
            shared.set_state(ReplayState::Stopped);
            FillOutcome::Terminal(CompletionNotice::ReadError)
        }
    }
}
