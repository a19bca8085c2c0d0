//! Software transmit path
//!
//! A dedicated thread owns the `SampleProcessor` and, while the radio is
//! enabled, ticks it once per `tick_period` and writes the buffer to an
//! `IqSink`. The buffer is reused across ticks, so a fail-soft tick repeats
//! whatever was last transmitted, the same as a hardware transfer buffer.

use super::sink::IqSink;
use super::{Radio, RadioSettings};
use crate::config::TxGain;
use crate::error::{Error, Result};
use crate::replay::processor::{SampleProcessor, TickOutcome};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Ticks the thread may fall behind before it drops the backlog instead of catching up
const MAX_LAG_TICKS: u32 = 64;

/// Poll interval while disabled
const DISABLED_POLL: Duration = Duration::from_millis(10);

#[derive(Debug, Default)]
struct PacedShared {
    enabled: AtomicBool,
    shutdown: AtomicBool,
    frequency_hz: AtomicU64,
    gain_db: AtomicU8,
    ticks: AtomicU64,
    idle_ticks: AtomicU64,
    sink_errors: AtomicU64,
}

pub struct PacedRadio {
    shared: Arc<PacedShared>,
    settings: Mutex<Option<RadioSettings>>,
    tick_period: Duration,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl PacedRadio {
    /// Start the tick thread; transmission begins on `enable()`
    ///
    /// # Arguments
    /// * `processor` - Tick handler, moved onto the radio thread
    /// * `sink` - Destination for transmit buffers
    /// * `tick_bytes` - Transmit buffer size (2 bytes per complex sample)
    /// * `tick_period` - Wall-clock time one buffer represents
    pub fn spawn(
        processor: SampleProcessor,
        sink: Box<dyn IqSink>,
        tick_bytes: usize,
        tick_period: Duration,
    ) -> Result<Self> {
        if tick_bytes == 0 || tick_period.is_zero() {
            return Err(Error::Radio("Tick size and period must be non-zero".to_string()));
        }

        let shared = Arc::new(PacedShared::default());
        let thread_shared = Arc::clone(&shared);

        info!(
            "Software radio: {} byte buffers every {:?} into {}",
            tick_bytes,
            tick_period,
            sink.describe()
        );

        let handle = thread::Builder::new()
            .name("gjam-radio".to_string())
            .spawn(move || tick_loop(processor, sink, tick_bytes, tick_period, thread_shared))
            .map_err(Error::Io)?;

        Ok(Self {
            shared,
            settings: Mutex::new(None),
            tick_period,
            handle: Mutex::new(Some(handle)),
        })
    }

    /// Last applied settings, with the current gain
    pub fn settings(&self) -> Option<RadioSettings> {
        let settings = self.settings.lock().ok().and_then(|guard| *guard);
        settings.map(|mut s| {
            if let Ok(gain) = TxGain::new(self.shared.gain_db.load(Ordering::Relaxed)) {
                s.gain = gain;
            }
            s
        })
    }

    pub fn frequency_hz(&self) -> u64 {
        self.shared.frequency_hz.load(Ordering::Relaxed)
    }

    pub fn ticks(&self) -> u64 {
        self.shared.ticks.load(Ordering::Relaxed)
    }

    /// Ticks that found nothing bound or the pool not yet primed
    pub fn idle_ticks(&self) -> u64 {
        self.shared.idle_ticks.load(Ordering::Relaxed)
    }

    pub fn sink_errors(&self) -> u64 {
        self.shared.sink_errors.load(Ordering::Relaxed)
    }

    pub fn tick_period(&self) -> Duration {
        self.tick_period
    }

    /// Stop the tick thread and wait for it
    pub fn shutdown(&self) {
        self.shared.enabled.store(false, Ordering::Release);
        self.shared.shutdown.store(true, Ordering::Release);
        let handle = self.handle.lock().ok().and_then(|mut guard| guard.take());
        if let Some(handle) = handle {
            handle.thread().unpark();
            if handle.join().is_err() {
                warn!("Radio thread panicked");
            }
        }
    }
}

impl Radio for PacedRadio {
    fn tune(&self, settings: &RadioSettings) -> Result<()> {
        if settings.sample_rate_hz == 0 {
            return Err(Error::Radio("Sample rate must be non-zero".to_string()));
        }
        self.shared.frequency_hz.store(settings.frequency_hz, Ordering::Relaxed);
        self.shared.gain_db.store(settings.gain.db(), Ordering::Relaxed);
        if let Ok(mut guard) = self.settings.lock() {
            *guard = Some(*settings);
        }
        debug!(
            "Tuned: {} Hz, {} S/s, filter {} Hz, amp {}, gain {}",
            settings.frequency_hz,
            settings.sample_rate_hz,
            settings.bandwidth_hz,
            if settings.rf_amp { "on" } else { "off" },
            settings.gain
        );
        Ok(())
    }

    fn set_gain(&self, gain: TxGain) -> Result<()> {
        self.shared.gain_db.store(gain.db(), Ordering::Relaxed);
        Ok(())
    }

    fn enable(&self) -> Result<()> {
        if self.shared.shutdown.load(Ordering::Acquire) {
            return Err(Error::Radio("Radio thread has shut down".to_string()));
        }
        self.shared.enabled.store(true, Ordering::Release);
        if let Ok(guard) = self.handle.lock() {
            if let Some(handle) = guard.as_ref() {
                handle.thread().unpark();
            }
        }
        Ok(())
    }

    fn disable(&self) -> Result<()> {
        self.shared.enabled.store(false, Ordering::Release);
        Ok(())
    }

    fn is_enabled(&self) -> bool {
        self.shared.enabled.load(Ordering::Acquire)
    }
}

impl Drop for PacedRadio {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for PacedRadio {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PacedRadio")
            .field("enabled", &self.is_enabled())
            .field("frequency_hz", &self.frequency_hz())
            .field("ticks", &self.ticks())
            .field("tick_period", &self.tick_period)
            .finish()
    }
}

fn tick_loop(
    mut processor: SampleProcessor,
    mut sink: Box<dyn IqSink>,
    tick_bytes: usize,
    tick_period: Duration,
    shared: Arc<PacedShared>,
) {
    let mut buffer = vec![0u8; tick_bytes];
    let mut deadline: Option<Instant> = None;
    let max_lag = tick_period * MAX_LAG_TICKS;

    while !shared.shutdown.load(Ordering::Acquire) {
        if !shared.enabled.load(Ordering::Acquire) {
            if deadline.take().is_some() {
                let _ = sink.flush();
            }
            // Keep bindings current so a stopped session's pool is released promptly
            processor.poll_control();
            thread::park_timeout(DISABLED_POLL);
            continue;
        }

        let now = Instant::now();
        let due = *deadline.get_or_insert(now);
        if due > now {
            thread::sleep(due - now);
        } else if now - due > max_lag {
            // Fell too far behind (scheduler stall); resynchronise rather than burst
            deadline = Some(now);
        }

        // An idle or short tick leaves the previous contents in place
        if let TickOutcome::Idle = processor.tick(&mut buffer) {
            shared.idle_ticks.fetch_add(1, Ordering::Relaxed);
        }
        if let Err(e) = sink.write_block(&buffer) {
            if shared.sink_errors.fetch_add(1, Ordering::Relaxed) == 0 {
                warn!("IQ sink write failed: {}", e);
            }
        }
        shared.ticks.fetch_add(1, Ordering::Relaxed);

        if let Some(due) = deadline.as_mut() {
            *due += tick_period;
        }
    }

    let _ = sink.flush();
    debug!(
        "Radio thread exiting after {} ticks",
        shared.ticks.load(Ordering::Relaxed)
    );
}
