//! Test helper modules for gjam-tx integration tests
//!
//! Provides reusable test infrastructure components:
//! - ScriptedSource / ScriptedOpener: in-memory waveforms with read counting and fault injection
//! - GatedSource: a source whose reads block until the test releases them
//! - RecordingRadio / FakeStorage: injected capabilities that record what the session did
//! - Rig: a session wired to the fakes, with the tick handler driven by the test

#![allow(dead_code)]

use gjam_common::events::{EventBus, GjamEvent, SessionState};
use gjam_tx::config::{TxGain, TxSettings};
use gjam_tx::error::{Error, Result};
use gjam_tx::radio::{Radio, RadioSettings};
use gjam_tx::replay::{ReplayNotice, SampleProcessor, SampleSource, SourceOpener, TickOutcome};
use gjam_tx::session::{SessionDeps, TransmitSession};
use gjam_tx::storage::{StorageMedium, StorageStatus};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{mpsc as std_mpsc, Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, mpsc};

/// Upper bound for anything a test waits on
pub const WAIT: Duration = Duration::from_secs(5);

/// Position-dependent bytes so misplaced data shows up in comparisons
pub fn pattern_bytes(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

/// Poll `condition` until true, panicking after `WAIT`
pub fn wait_until(what: &str, mut condition: impl FnMut() -> bool) {
    let deadline = Instant::now() + WAIT;
    while !condition() {
        assert!(Instant::now() < deadline, "timed out waiting for {}", what);
        std::thread::sleep(Duration::from_micros(200));
    }
}

// ============================================================================
// Sample sources
// ============================================================================

/// In-memory sample source
pub struct ScriptedSource {
    data: Arc<Vec<u8>>,
    pos: usize,
    max_read: usize,
    fail_on_read: Option<usize>,
    reads: Arc<AtomicUsize>,
}

impl ScriptedSource {
    pub fn new(data: Vec<u8>) -> Self {
        Self {
            data: Arc::new(data),
            pos: 0,
            max_read: usize::MAX,
            fail_on_read: None,
            reads: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Cap the bytes returned by each read call
    pub fn with_max_read(mut self, max_read: usize) -> Self {
        self.max_read = max_read;
        self
    }

    /// Fail the k-th read call (1-based)
    pub fn failing_on_read(mut self, k: usize) -> Self {
        self.fail_on_read = Some(k);
        self
    }

    /// Shared count of read calls
    pub fn reads(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.reads)
    }
}

impl SampleSource for ScriptedSource {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.reads.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail_on_read == Some(n) {
            return Err(io::Error::new(io::ErrorKind::Other, "injected read failure"));
        }

        let remaining = &self.data[self.pos..];
        let len = remaining.len().min(buf.len()).min(self.max_read);
        buf[..len].copy_from_slice(&remaining[..len]);
        self.pos += len;
        Ok(len)
    }

    fn describe(&self) -> String {
        format!("scripted ({} bytes)", self.data.len())
    }
}

/// Source whose every read waits for a permit from the test
pub struct GatedSource {
    inner: ScriptedSource,
    gate: std_mpsc::Receiver<()>,
}

impl GatedSource {
    /// Returns the source and the permit sender
    pub fn new(data: Vec<u8>) -> (Self, std_mpsc::Sender<()>) {
        let (tx, rx) = std_mpsc::channel();
        (
            Self {
                inner: ScriptedSource::new(data),
                gate: rx,
            },
            tx,
        )
    }

    pub fn reads(&self) -> Arc<AtomicUsize> {
        self.inner.reads()
    }
}

impl SampleSource for GatedSource {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.gate
            .recv_timeout(WAIT)
            .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "gate never opened"))?;
        self.inner.read(buf)
    }
}

/// Opens `ScriptedSource`s over one shared waveform, recording every attempt
pub struct ScriptedOpener {
    data: Arc<Vec<u8>>,
    max_read: usize,
    fail_on_read: Option<usize>,
    fail_open: AtomicBool,
    opens: AtomicUsize,
    reads: Arc<AtomicUsize>,
    paths: Mutex<Vec<PathBuf>>,
}

impl ScriptedOpener {
    pub fn new(data: Vec<u8>) -> Self {
        Self {
            data: Arc::new(data),
            max_read: usize::MAX,
            fail_on_read: None,
            fail_open: AtomicBool::new(false),
            opens: AtomicUsize::new(0),
            reads: Arc::new(AtomicUsize::new(0)),
            paths: Mutex::new(Vec::new()),
        }
    }

    pub fn with_max_read(mut self, max_read: usize) -> Self {
        self.max_read = max_read;
        self
    }

    /// Every opened source fails its k-th read
    pub fn failing_on_read(mut self, k: usize) -> Self {
        self.fail_on_read = Some(k);
        self
    }

    pub fn set_fail_open(&self, fail: bool) {
        self.fail_open.store(fail, Ordering::SeqCst);
    }

    /// Successful opens
    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    /// Read calls across all opened sources
    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    /// Every path an open was attempted on
    pub fn paths(&self) -> Vec<PathBuf> {
        self.paths.lock().unwrap().clone()
    }
}

impl SourceOpener for ScriptedOpener {
    fn open(&self, path: &Path) -> Result<Box<dyn SampleSource>> {
        self.paths.lock().unwrap().push(path.to_path_buf());
        if self.fail_open.load(Ordering::SeqCst) {
            return Err(Error::SourceOpen {
                path: path.to_path_buf(),
                source: io::Error::new(io::ErrorKind::NotFound, "no such waveform"),
            });
        }
        self.opens.fetch_add(1, Ordering::SeqCst);

        Ok(Box::new(ScriptedSource {
            data: Arc::clone(&self.data),
            pos: 0,
            max_read: self.max_read,
            fail_on_read: self.fail_on_read,
            reads: Arc::clone(&self.reads),
        }))
    }
}

// ============================================================================
// Radio and storage
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RadioCall {
    Tune(RadioSettings),
    SetGain(u8),
    Enable,
    Disable,
}

/// Radio that only records calls
#[derive(Debug, Default)]
pub struct RecordingRadio {
    calls: Mutex<Vec<RadioCall>>,
    enabled: AtomicBool,
    fail_enable: AtomicBool,
}

impl RecordingRadio {
    pub fn calls(&self) -> Vec<RadioCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, call: &RadioCall) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| *c == call).count()
    }

    pub fn tunes(&self) -> Vec<RadioSettings> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter_map(|c| match c {
                RadioCall::Tune(settings) => Some(*settings),
                _ => None,
            })
            .collect()
    }

    pub fn set_fail_enable(&self, fail: bool) {
        self.fail_enable.store(fail, Ordering::SeqCst);
    }

    fn record(&self, call: RadioCall) {
        self.calls.lock().unwrap().push(call);
    }
}

impl Radio for RecordingRadio {
    fn tune(&self, settings: &RadioSettings) -> Result<()> {
        self.record(RadioCall::Tune(*settings));
        Ok(())
    }

    fn set_gain(&self, gain: TxGain) -> Result<()> {
        self.record(RadioCall::SetGain(gain.db()));
        Ok(())
    }

    fn enable(&self) -> Result<()> {
        if self.fail_enable.load(Ordering::SeqCst) {
            return Err(Error::Radio("transmitter unavailable".to_string()));
        }
        self.record(RadioCall::Enable);
        self.enabled.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn disable(&self) -> Result<()> {
        self.record(RadioCall::Disable);
        self.enabled.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }
}

/// Storage whose status the test controls
#[derive(Debug)]
pub struct FakeStorage {
    status: Mutex<StorageStatus>,
    root: PathBuf,
}

impl FakeStorage {
    pub fn new(status: StorageStatus) -> Self {
        Self {
            status: Mutex::new(status),
            root: PathBuf::from("/fake/sd"),
        }
    }

    pub fn set_status(&self, status: StorageStatus) {
        *self.status.lock().unwrap() = status;
    }
}

impl StorageMedium for FakeStorage {
    fn status(&self) -> StorageStatus {
        *self.status.lock().unwrap()
    }

    fn root(&self) -> &Path {
        &self.root
    }
}

// ============================================================================
// Session rig
// ============================================================================

/// Settings sized for tests: small chunks and ticks, looping configurable
pub fn test_settings(chunk_size: usize, pool_depth: usize, tick_bytes: usize, looping: bool) -> TxSettings {
    TxSettings {
        chunk_size,
        pool_depth,
        tick_samples: tick_bytes / 2,
        loop_on_completion: looping,
        ..TxSettings::default()
    }
}

/// A session wired to fakes; the test plays the radio by ticking the processor
pub struct Rig {
    pub session: TransmitSession,
    pub notices: mpsc::UnboundedReceiver<ReplayNotice>,
    pub processor: SampleProcessor,
    pub radio: Arc<RecordingRadio>,
    pub storage: Arc<FakeStorage>,
    pub opener: Arc<ScriptedOpener>,
    pub events: broadcast::Receiver<GjamEvent>,
    pub tick_bytes: usize,
    /// Notices handed to the session so far
    pub handled: Vec<ReplayNotice>,
}

impl Rig {
    pub fn new(settings: TxSettings, opener: ScriptedOpener) -> Self {
        let tick_bytes = settings.tick_bytes();
        let (processor, processor_handle) = SampleProcessor::new(SampleProcessor::low_water_for(
            settings.chunk_size,
            tick_bytes,
        ));

        let radio = Arc::new(RecordingRadio::default());
        let storage = Arc::new(FakeStorage::new(StorageStatus::Mounted));
        let opener = Arc::new(opener);
        let bus = EventBus::new(4096);
        let events = bus.subscribe();

        let deps = SessionDeps {
            radio: Arc::clone(&radio) as Arc<dyn Radio>,
            storage: Arc::clone(&storage) as Arc<dyn StorageMedium>,
            opener: Arc::clone(&opener) as Arc<dyn SourceOpener>,
            processor: processor_handle,
            events: bus,
        };
        let (session, notices) = TransmitSession::new(settings, deps);

        Self {
            session,
            notices,
            processor,
            radio,
            storage,
            opener,
            events,
            tick_bytes,
            handled: Vec::new(),
        }
    }

    /// Hand every notice that has arrived to the session
    pub fn pump_notices(&mut self) -> usize {
        let mut count = 0;
        while let Ok(notice) = self.notices.try_recv() {
            self.handled.push(notice);
            // Restart failures surface as a stopped session; tests inspect that
            let _ = self.session.handle_notice(notice);
            count += 1;
        }
        count
    }

    /// Wait until a full tick of data is buffered, then tick; returns the transmitted bytes
    pub fn tick_ready(&mut self) -> Vec<u8> {
        let deadline = Instant::now() + WAIT;
        let mut out = vec![0u8; self.tick_bytes];
        loop {
            self.pump_notices();
            self.processor.poll_control();
            if self.processor.buffered_bytes() >= self.tick_bytes {
                if let TickOutcome::Transmitted { bytes, .. } = self.processor.tick(&mut out) {
                    return out[..bytes].to_vec();
                }
            }
            assert!(
                Instant::now() < deadline,
                "timed out waiting for {} buffered bytes (session {})",
                self.tick_bytes,
                self.session.state()
            );
            std::thread::sleep(Duration::from_micros(200));
        }
    }

    /// Tick `count` times, each with a full buffer, and concatenate the output
    pub fn transmit(&mut self, count: usize) -> Vec<u8> {
        (0..count).flat_map(|_| self.tick_ready()).collect()
    }

    /// Wait until at least `bytes` are buffered for the radio
    pub fn wait_buffered(&mut self, bytes: usize) {
        let deadline = Instant::now() + WAIT;
        loop {
            self.pump_notices();
            self.processor.poll_control();
            if self.processor.buffered_bytes() >= bytes {
                return;
            }
            assert!(Instant::now() < deadline, "timed out waiting for {} buffered bytes", bytes);
            std::thread::sleep(Duration::from_micros(200));
        }
    }

    /// Tick like the radio does: once per `period`, whether or not data is ready
    ///
    /// Notices are handed to the session between ticks. Returns the
    /// concatenated output and every tick's outcome.
    pub fn tick_on_schedule(&mut self, count: usize, period: Duration) -> (Vec<u8>, Vec<TickOutcome>) {
        let mut out = vec![0u8; self.tick_bytes];
        let mut sent = Vec::new();
        let mut outcomes = Vec::with_capacity(count);
        let mut next = Instant::now() + period;
        for _ in 0..count {
            std::thread::sleep(next.saturating_duration_since(Instant::now()));
            next += period;

            self.pump_notices();
            let outcome = self.processor.tick(&mut out);
            if let TickOutcome::Transmitted { bytes, .. } = outcome {
                sent.extend_from_slice(&out[..bytes]);
            }
            outcomes.push(outcome);
        }
        (sent, outcomes)
    }

    /// Keep ticking whatever is buffered until the session has handled another notice
    pub fn run_until_notice(&mut self) -> ReplayNotice {
        let before = self.handled.len();
        let deadline = Instant::now() + WAIT;
        let mut out = vec![0u8; self.tick_bytes];
        loop {
            self.pump_notices();
            if self.handled.len() > before {
                return self.handled[before];
            }
            self.processor.poll_control();
            if self.processor.buffered_bytes() > 0 {
                self.processor.tick(&mut out);
            }
            assert!(Instant::now() < deadline, "timed out waiting for a replay notice");
            std::thread::sleep(Duration::from_micros(200));
        }
    }

    /// Events emitted since the last call
    pub fn drain_events(&mut self) -> Vec<GjamEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            events.push(event);
        }
        events
    }
}

/// Status lines among `events`
pub fn status_lines(events: &[GjamEvent]) -> Vec<String> {
    events
        .iter()
        .filter_map(|e| match e {
            GjamEvent::StatusMessage { message, .. } => Some(message.clone()),
            _ => None,
        })
        .collect()
}

/// `new_state` of every state change among `events`
pub fn state_changes(events: &[GjamEvent]) -> Vec<SessionState> {
    events
        .iter()
        .filter_map(|e| match e {
            GjamEvent::SessionStateChanged { new_state, .. } => Some(*new_state),
            _ => None,
        })
        .collect()
}
