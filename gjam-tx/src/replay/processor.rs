//! Sample processor: the real-time tick handler
//!
//! Each tick copies the next `out.len()` bytes of delivered sample data into the
//! radio's transmit buffer, crossing chunk boundaries as needed, and returns
//! drained chunks to the pool.
//!
//! **REAL-TIME SAFE**: no logging, no locks, no blocking. Configuration
//! arrives over a channel that is drained with `try_recv` at the top of each
//! tick; statistics are plain atomics read by the monitor.
//!
//! **Fail soft**: with no binding, or before the replay thread has primed the
//! pool, a tick writes nothing and the radio keeps whatever its buffer held.

use super::chunk::{ConsumeSide, SampleChunk};
use super::signal::ReadinessSignal;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Consumer half of a pool plus the signal that requests refills
#[derive(Debug)]
pub struct Binding {
    pub pool: ConsumeSide,
    pub signal: Arc<ReadinessSignal>,
}

/// Messages from the control context to the tick handler
#[derive(Debug)]
pub enum ProcessorMessage {
    /// Rebind to a new pool (`Some`) or tear the binding down (`None`)
    Configure(Option<Binding>),
}

/// Result of one tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Nothing bound or not yet configured; output untouched
    Idle,
    /// `bytes` written; `underrun` when fewer than requested were available
    Transmitted { bytes: usize, underrun: bool },
}

/// Counters shared with the monitor and the control surface
#[derive(Debug, Default)]
pub struct ProcessorStats {
    ticks: AtomicU64,
    underruns: AtomicU64,
    bytes_consumed: AtomicU64,
    configured: AtomicBool,
}

impl ProcessorStats {
    pub fn snapshot(&self) -> ProcessorSnapshot {
        ProcessorSnapshot {
            ticks: self.ticks.load(Ordering::Relaxed),
            underruns: self.underruns.load(Ordering::Relaxed),
            bytes_consumed: self.bytes_consumed.load(Ordering::Relaxed),
            configured: self.configured.load(Ordering::Relaxed),
        }
    }

    fn reset(&self) {
        self.underruns.store(0, Ordering::Relaxed);
        self.bytes_consumed.store(0, Ordering::Relaxed);
        self.configured.store(false, Ordering::Relaxed);
    }
}

/// Point-in-time copy of `ProcessorStats`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessorSnapshot {
    /// Ticks since the processor was created
    pub ticks: u64,
    /// Short ticks in the current session
    pub underruns: u64,
    /// Bytes copied to the radio in the current session
    pub bytes_consumed: u64,
    pub configured: bool,
}

/// Control-context handle for a `SampleProcessor`
#[derive(Debug, Clone)]
pub struct ProcessorHandle {
    tx: mpsc::UnboundedSender<ProcessorMessage>,
    stats: Arc<ProcessorStats>,
}

impl ProcessorHandle {
    /// Bind the processor to a new pool; takes effect on the next tick
    pub fn configure(&self, binding: Binding) {
        self.send(ProcessorMessage::Configure(Some(binding)));
    }

    /// Drop the binding; subsequent ticks are no-ops
    pub fn unbind(&self) {
        self.send(ProcessorMessage::Configure(None));
    }

    pub fn stats(&self) -> ProcessorSnapshot {
        self.stats.snapshot()
    }

    pub fn shared_stats(&self) -> Arc<ProcessorStats> {
        Arc::clone(&self.stats)
    }

    fn send(&self, message: ProcessorMessage) {
        // Receiver gone means the radio thread has shut down; nothing left to configure
        let _ = self.tx.send(message);
    }
}

pub struct SampleProcessor {
    rx: mpsc::UnboundedReceiver<ProcessorMessage>,
    binding: Option<Binding>,
    /// Chunk being drained and the read offset into it
    current: Option<SampleChunk>,
    offset: usize,
    configured: bool,
    /// Buffered bytes below which a refill is requested
    low_water_bytes: usize,
    stats: Arc<ProcessorStats>,
}

impl SampleProcessor {
    /// Create a processor and its control handle
    ///
    /// `low_water_bytes` must cover at least one tick plus one chunk so the
    /// replay thread can complete a fill before the buffered data runs out.
    pub fn new(low_water_bytes: usize) -> (Self, ProcessorHandle) {
        let (tx, rx) = mpsc::unbounded_channel();
        let stats = Arc::new(ProcessorStats::default());

        let processor = Self {
            rx,
            binding: None,
            current: None,
            offset: 0,
            configured: false,
            low_water_bytes,
            stats: Arc::clone(&stats),
        };

        (processor, ProcessorHandle { tx, stats })
    }

    /// Threshold for a given chunk and tick size
    pub fn low_water_for(chunk_size: usize, tick_bytes: usize) -> usize {
        chunk_size + tick_bytes
    }

    pub fn is_bound(&self) -> bool {
        self.binding.is_some()
    }

    pub fn is_configured(&self) -> bool {
        self.configured
    }

    /// Sample bytes available to upcoming ticks without another fill
    pub fn buffered_bytes(&self) -> usize {
        let remaining = self
            .current
            .as_ref()
            .map_or(0, |chunk| chunk.len() - self.offset);
        let queued = self
            .binding
            .as_ref()
            .map_or(0, |binding| binding.pool.queued_bytes());
        remaining + queued
    }

    /// Produce one transmit buffer
    pub fn tick(&mut self, out: &mut [u8]) -> TickOutcome {
        self.poll_control();
        self.stats.ticks.fetch_add(1, Ordering::Relaxed);

        let Some(binding) = self.binding.as_mut() else {
            return TickOutcome::Idle;
        };

        if !self.configured {
            if !binding.pool.is_primed() {
                return TickOutcome::Idle;
            }
            self.configured = true;
            self.stats.configured.store(true, Ordering::Relaxed);
        }

        let mut written = 0;
        while written < out.len() {
            let chunk = match self.current.take() {
                Some(chunk) => chunk,
                None => match binding.pool.take_filled() {
                    Some(chunk) => {
                        self.offset = 0;
                        chunk
                    }
                    None => break,
                },
            };

            let available = &chunk.bytes()[self.offset..];
            let n = available.len().min(out.len() - written);
            out[written..written + n].copy_from_slice(&available[..n]);
            written += n;
            self.offset += n;

            if self.offset >= chunk.len() {
                binding.pool.release(chunk);
                self.offset = 0;
            } else {
                self.current = Some(chunk);
            }
        }

        if self.buffered_bytes() < self.low_water_bytes {
            if let Some(binding) = self.binding.as_ref() {
                binding.signal.raise();
            }
        }

        self.stats.bytes_consumed.fetch_add(written as u64, Ordering::Relaxed);
        let underrun = written < out.len();
        if underrun {
            self.stats.underruns.fetch_add(1, Ordering::Relaxed);
        }

        TickOutcome::Transmitted {
            bytes: written,
            underrun,
        }
    }

    /// Apply pending configuration without producing a buffer
    pub fn poll_control(&mut self) {
        while let Ok(message) = self.rx.try_recv() {
            match message {
                ProcessorMessage::Configure(target) => self.rebind(target),
            }
        }
    }

    fn rebind(&mut self, target: Option<Binding>) {
        self.current = None;
        self.offset = 0;
        self.configured = false;
        self.stats.reset();

        self.binding = target;
        if let Some(binding) = self.binding.as_ref() {
            binding.signal.raise();
        }
    }
}

impl std::fmt::Debug for SampleProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SampleProcessor")
            .field("bound", &self.binding.is_some())
            .field("configured", &self.configured)
            .field("offset", &self.offset)
            .field("low_water_bytes", &self.low_water_bytes)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::replay::chunk::{chunk_pool, FillSide};
    use crate::replay::source::ReaderSource;
    use std::io::Cursor;

    fn deliver(fill: &mut FillSide, bytes: &[u8], seq: u64) {
        let mut chunk = fill.checkout().unwrap();
        let mut source = ReaderSource::new(Cursor::new(bytes.to_vec()));
        chunk.fill_from(&mut source, seq).unwrap();
        fill.deliver(chunk);
    }

    #[test]
    fn test_unbound_tick_is_noop() {
        let (mut processor, handle) = SampleProcessor::new(16);
        let mut out = [0xAAu8; 8];
        assert_eq!(processor.tick(&mut out), TickOutcome::Idle);
        assert_eq!(out, [0xAA; 8]);
        assert_eq!(handle.stats().ticks, 1);
        assert_eq!(handle.stats().bytes_consumed, 0);
    }

    #[test]
    fn test_waits_for_primed_pool() {
        let (mut processor, handle) = SampleProcessor::new(12);
        let (mut fill, consume) = chunk_pool(2, 8);
        let signal = Arc::new(ReadinessSignal::new());
        handle.configure(Binding {
            pool: consume,
            signal: Arc::clone(&signal),
        });

        let mut out = [0xAAu8; 4];
        assert_eq!(processor.tick(&mut out), TickOutcome::Idle);
        assert!(processor.is_bound());
        assert!(!processor.is_configured());
        // Binding raises the first request
        assert!(signal.is_raised());

        deliver(&mut fill, &[1, 2, 3, 4, 5, 6, 7, 8], 1);
        fill.mark_primed();
        assert_eq!(
            processor.tick(&mut out),
            TickOutcome::Transmitted {
                bytes: 4,
                underrun: false
            }
        );
        assert_eq!(out, [1, 2, 3, 4]);
        assert!(handle.stats().configured);
    }

    #[test]
    fn test_copy_crosses_chunk_boundary_and_releases() {
        let (mut processor, handle) = SampleProcessor::new(0);
        let (mut fill, consume) = chunk_pool(2, 4);
        let signal = Arc::new(ReadinessSignal::new());
        handle.configure(Binding { pool: consume, signal });

        deliver(&mut fill, &[1, 2, 3, 4], 1);
        deliver(&mut fill, &[5, 6, 7, 8], 2);
        fill.mark_primed();
        assert_eq!(fill.free_count(), 0);

        let mut out = [0u8; 3];
        processor.tick(&mut out);
        assert_eq!(out, [1, 2, 3]);
        processor.tick(&mut out);
        assert_eq!(out, [4, 5, 6]);
        // First chunk drained and back in the free queue
        assert_eq!(fill.free_count(), 1);

        let mut out = [0u8; 2];
        processor.tick(&mut out);
        assert_eq!(out, [7, 8]);
        assert_eq!(fill.free_count(), 2);
        assert_eq!(handle.stats().bytes_consumed, 8);
        assert_eq!(handle.stats().underruns, 0);
    }

    #[test]
    fn test_short_tick_counts_underrun() {
        let (mut processor, handle) = SampleProcessor::new(0);
        let (mut fill, consume) = chunk_pool(2, 4);
        handle.configure(Binding {
            pool: consume,
            signal: Arc::new(ReadinessSignal::new()),
        });
        deliver(&mut fill, &[1, 2], 1);
        fill.mark_primed();

        let mut out = [0xEEu8; 4];
        assert_eq!(
            processor.tick(&mut out),
            TickOutcome::Transmitted {
                bytes: 2,
                underrun: true
            }
        );
        assert_eq!(out, [1, 2, 0xEE, 0xEE]);
        assert_eq!(handle.stats().underruns, 1);
    }

    #[test]
    fn test_low_water_raises_signal() {
        // chunk 8, tick 4: low water 12
        let (mut processor, handle) = SampleProcessor::new(SampleProcessor::low_water_for(8, 4));
        let (mut fill, consume) = chunk_pool(2, 8);
        let signal = Arc::new(ReadinessSignal::new());
        handle.configure(Binding {
            pool: consume,
            signal: Arc::clone(&signal),
        });

        deliver(&mut fill, &[0; 8], 1);
        deliver(&mut fill, &[0; 8], 2);
        fill.mark_primed();
        let mut out = [0u8; 4];

        // 4 left in current + 8 queued = 12: not below low water, only the bind request so far
        processor.tick(&mut out);
        assert_eq!(signal.requests(), 1);
        signal.clear();

        // current drained, 8 queued: below low water
        processor.tick(&mut out);
        assert!(signal.is_raised());
        assert_eq!(signal.requests(), 2);
    }

    #[test]
    fn test_reconfigure_resets_accounting() {
        let (mut processor, handle) = SampleProcessor::new(0);
        let (mut fill, consume) = chunk_pool(2, 4);
        handle.configure(Binding {
            pool: consume,
            signal: Arc::new(ReadinessSignal::new()),
        });
        deliver(&mut fill, &[1, 2, 3, 4], 1);
        fill.mark_primed();
        let mut out = [0u8; 2];
        processor.tick(&mut out);
        assert_eq!(handle.stats().bytes_consumed, 2);

        handle.unbind();
        assert_eq!(processor.tick(&mut out), TickOutcome::Idle);
        assert!(!processor.is_bound());
        let stats = handle.stats();
        assert_eq!(stats.bytes_consumed, 0);
        assert!(!stats.configured);
        assert_eq!(stats.ticks, 2);
    }
}
