//! Transmit session: the control surface
//!
//! **State machine:**
//! Stopped → Starting → Streaming → (Stopping | Restarting) → Stopped.
//! A loop restart goes Streaming → Restarting → Streaming with the radio left
//! enabled and the processor binding untouched.
//!
//! **Start** checks storage, opens the waveform file, then builds the pool,
//! spawns the replay thread, binds the processor and enables the radio. Any
//! failure before the spawn leaves nothing behind.
//!
//! **Notices** arrive on an unbounded channel fed by the replay thread's
//! completion callback; the owner of the session drains it and calls
//! `handle_notice()`, or the `take_completed()` / `apply_report()` pair when
//! the join must stay off an async worker.

pub mod command;
pub mod driver;

pub use command::ConsoleCommand;
pub use driver::{run_session, SessionCommand, SessionHandle};

use crate::config::{GnssBand, JammerType, TxGain, TxSettings};
use crate::error::{Error, Result};
use crate::radio::{Radio, RadioSettings};
use crate::replay::{
    chunk_pool, Binding, FillSide, ProcessorHandle, ReadinessSignal, ReplayNotice, ReplayReport,
    ReplayThread, SampleSource, SourceOpener,
};
use crate::storage::StorageMedium;
use gjam_common::events::{CompletionNotice, EventBus, GjamEvent, SessionState};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Capabilities a session is built from
///
/// Radio and storage are process-wide resources; the session only queries and
/// drives them.
#[derive(Clone)]
pub struct SessionDeps {
    pub radio: Arc<dyn Radio>,
    pub storage: Arc<dyn StorageMedium>,
    pub opener: Arc<dyn SourceOpener>,
    pub processor: ProcessorHandle,
    pub events: EventBus,
}

/// Diagnostic view of a session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub session_id: Uuid,
    pub state: SessionState,
    pub band: GnssBand,
    pub jammer: JammerType,
    pub frequency_hz: u64,
    pub gain_db: u8,
    pub loop_on_completion: bool,
    /// Waveform bound to the active replay thread
    pub file: Option<PathBuf>,
    /// Replay thread generation (increments on every start and loop restart)
    pub generation: u64,
    /// Chunks filled since the session started, across loop restarts
    pub fills: u64,
    pub bytes_consumed: u64,
    pub underruns: u64,
    /// Band or jammer changed while streaming
    pub needs_restart: bool,
    pub last_notice: Option<CompletionNotice>,
}

impl std::fmt::Display for SessionSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} | {} {} Hz | gain {} dB | {} ({}) | loop {} | gen {} | fills {} | sent {} bytes | underruns {}",
            self.state,
            self.band,
            self.frequency_hz,
            self.gain_db,
            self.jammer.code(),
            self.jammer.full_name(),
            if self.loop_on_completion { "on" } else { "off" },
            self.generation,
            self.fills,
            self.bytes_consumed,
            self.underruns
        )?;
        if self.needs_restart {
            write!(f, " | restart to apply selection")?;
        }
        Ok(())
    }
}

pub struct TransmitSession {
    id: Uuid,
    settings: TxSettings,
    band: GnssBand,
    jammer: JammerType,
    gain: TxGain,
    loop_on_completion: bool,
    state: SessionState,
    replay: Option<ReplayThread>,
    signal: Option<Arc<ReadinessSignal>>,
    active_path: Option<PathBuf>,
    generation: u64,
    /// Fills by replay threads that have already finished this session
    finished_fills: u64,
    needs_restart: bool,
    last_notice: Option<CompletionNotice>,
    notice_tx: mpsc::UnboundedSender<ReplayNotice>,
    deps: SessionDeps,
}

impl TransmitSession {
    /// Create a stopped session
    ///
    /// Returns the receiver for replay notices; feed each one to `handle_notice()`.
    pub fn new(
        settings: TxSettings,
        deps: SessionDeps,
    ) -> (Self, mpsc::UnboundedReceiver<ReplayNotice>) {
        let (notice_tx, notice_rx) = mpsc::unbounded_channel();

        let session = Self {
            id: Uuid::new_v4(),
            band: settings.band,
            jammer: settings.jammer,
            gain: settings.gain,
            loop_on_completion: settings.loop_on_completion,
            settings,
            state: SessionState::Stopped,
            replay: None,
            signal: None,
            active_path: None,
            generation: 0,
            finished_fills: 0,
            needs_restart: false,
            last_notice: None,
            notice_tx,
            deps,
        };

        (session, notice_rx)
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_streaming(&self) -> bool {
        self.state == SessionState::Streaming
    }

    pub fn band(&self) -> GnssBand {
        self.band
    }

    pub fn jammer(&self) -> JammerType {
        self.jammer
    }

    pub fn gain(&self) -> TxGain {
        self.gain
    }

    pub fn needs_restart(&self) -> bool {
        self.needs_restart
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Start transmitting the selected waveform
    ///
    /// A no-op if a session is already active. On failure the session stays
    /// Stopped, a `StartRefused` event is emitted and the error is returned.
    pub fn start(&mut self) -> Result<()> {
        if self.state != SessionState::Stopped {
            debug!("Start ignored: session is {}", self.state);
            return Ok(());
        }

        self.status("Start Jamming");
        self.set_state(SessionState::Starting);

        match self.open_pipeline() {
            Ok(()) => {
                self.set_state(SessionState::Streaming);
                Ok(())
            }
            Err(e) => {
                warn!("Start refused: {}", e);
                self.deps.events.emit_lossy(GjamEvent::StartRefused {
                    reason: e.to_string(),
                    timestamp: chrono::Utc::now(),
                });
                self.set_state(SessionState::Stopped);
                Err(e)
            }
        }
    }

    /// Stop transmitting; a no-op when already stopped
    pub fn stop(&mut self) {
        if self.state == SessionState::Stopped {
            debug!("Stop ignored: session already stopped");
            return;
        }

        self.set_state(SessionState::Stopping);
        self.teardown();
        self.status("stop Jamming!");
        self.set_state(SessionState::Stopped);
    }

    /// Start when stopped, stop otherwise
    pub fn toggle(&mut self) -> Result<()> {
        if self.state == SessionState::Stopped {
            self.start()
        } else {
            self.stop();
            Ok(())
        }
    }

    /// React to a replay thread's terminal notice
    ///
    /// Notices from superseded replay threads are ignored. EndOfFile restarts
    /// the replay when looping is on and the file produced data; everything
    /// else stops the session. Joins the finished thread on the calling
    /// thread; async callers use [`take_completed`](Self::take_completed) and
    /// [`apply_report`](Self::apply_report) instead.
    pub fn handle_notice(&mut self, notice: ReplayNotice) -> Result<()> {
        match self.take_completed(notice) {
            Some(replay) => self.apply_report(notice.notice, replay.finish()),
            None => Ok(()),
        }
    }

    /// Detach the replay thread a current-generation notice refers to
    ///
    /// **Returns:** the finished thread, ready for `finish()`, or None for a
    /// stale notice. The session keeps its state until `apply_report()`.
    pub fn take_completed(&mut self, notice: ReplayNotice) -> Option<ReplayThread> {
        let current = self.replay.as_ref().map(ReplayThread::generation);
        if current != Some(notice.generation) {
            debug!(
                "Ignoring {} from replay generation {} (current {:?})",
                notice.notice, notice.generation, current
            );
            return None;
        }

        self.last_notice = Some(notice.notice);
        self.deps.events.emit_lossy(GjamEvent::ReplayCompleted {
            session_id: self.id,
            generation: notice.generation,
            notice: notice.notice,
            timestamp: chrono::Utc::now(),
        });

        self.replay.take()
    }

    /// Loop or stop once a completed replay thread has been joined
    pub fn apply_report(&mut self, notice: CompletionNotice, report: ReplayReport) -> Result<()> {
        self.finished_fills += report.fills;

        match notice {
            CompletionNotice::EndOfFile if self.loop_on_completion && report.bytes_read > 0 => {
                self.restart(report.pool)
            }
            CompletionNotice::EndOfFile => {
                if self.loop_on_completion {
                    warn!("Waveform produced no data; not looping");
                }
                info!("Replay finished after {} bytes", report.bytes_read);
                self.stop();
                Ok(())
            }
            CompletionNotice::ReadError => {
                warn!("Replay read error after {} bytes; stopping", report.bytes_read);
                self.stop();
                Ok(())
            }
        }
    }

    /// Change TX gain; applied to the radio immediately while streaming
    pub fn set_gain(&mut self, gain: TxGain) -> Result<()> {
        self.gain = gain;
        if self.state != SessionState::Stopped {
            self.deps.radio.set_gain(gain)?;
        }
        self.status(format!("TX gain: {} dB", gain.db()));
        self.deps.events.emit_lossy(GjamEvent::GainChanged {
            gain_db: gain.db(),
            timestamp: chrono::Utc::now(),
        });
        Ok(())
    }

    /// Select the band for the next start
    pub fn select_band(&mut self, band: GnssBand) {
        if band == self.band {
            return;
        }
        self.band = band;
        self.flag_restart(format!("band changed to {}", band));
    }

    /// Select the waveform for the next start
    pub fn select_jammer(&mut self, jammer: JammerType) {
        if jammer == self.jammer {
            return;
        }
        self.jammer = jammer;
        self.flag_restart(format!("jammer type changed to {}", jammer.full_name()));
    }

    /// Loop policy, consulted when the next EndOfFile arrives
    pub fn set_loop(&mut self, enabled: bool) {
        self.loop_on_completion = enabled;
        info!("Loop on completion {}", if enabled { "enabled" } else { "disabled" });
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let stats = self.deps.processor.stats();
        let live_fills = self.replay.as_ref().map_or(0, ReplayThread::fills);

        SessionSnapshot {
            session_id: self.id,
            state: self.state,
            band: self.band,
            jammer: self.jammer,
            frequency_hz: self.band.center_frequency_hz(),
            gain_db: self.gain.db(),
            loop_on_completion: self.loop_on_completion,
            file: self.active_path.clone(),
            generation: self.generation,
            fills: self.finished_fills + live_fills,
            bytes_consumed: stats.bytes_consumed,
            underruns: stats.underruns,
            needs_restart: self.needs_restart,
            last_notice: self.last_notice,
        }
    }

    fn open_pipeline(&mut self) -> Result<()> {
        self.check_storage()?;

        let radio_settings = RadioSettings::for_band(&self.settings, self.band, self.gain);
        self.status(format!("Center freq: {} Hz", radio_settings.frequency_hz));
        self.status(format!("TX gain: {} dB", self.gain.db()));
        self.status(format!("Jammer type: {}", self.jammer.full_name()));

        let path = self
            .settings
            .waveform_path(self.deps.storage.root(), self.jammer);
        let source = self.open_source(&path)?;

        self.deps.radio.tune(&radio_settings)?;

        let (fill, consume) = chunk_pool(self.settings.pool_depth, self.settings.chunk_size);
        let signal = Arc::new(ReadinessSignal::new());
        self.finished_fills = 0;
        self.last_notice = None;

        let replay = self.spawn_replay(source, fill, Arc::clone(&signal))?;
        self.deps.processor.configure(Binding {
            pool: consume,
            signal: Arc::clone(&signal),
        });

        if let Err(e) = self.deps.radio.enable() {
            replay.cancel();
            self.deps.processor.unbind();
            return Err(e);
        }

        info!(
            "Streaming {} on {} ({} Hz), generation {}",
            path.display(),
            self.band,
            radio_settings.frequency_hz,
            replay.generation()
        );

        self.replay = Some(replay);
        self.signal = Some(signal);
        self.active_path = Some(path);
        self.needs_restart = false;
        Ok(())
    }

    /// Replace a finished replay thread with a fresh one on the same file and pool
    fn restart(&mut self, pool: Option<FillSide>) -> Result<()> {
        self.set_state(SessionState::Restarting);

        match self.reopen(pool) {
            Ok(generation) => {
                self.set_state(SessionState::Streaming);
                self.deps.events.emit_lossy(GjamEvent::LoopRestarted {
                    session_id: self.id,
                    generation,
                    timestamp: chrono::Utc::now(),
                });
                debug!("Loop restart complete, generation {}", generation);
                Ok(())
            }
            Err(e) => {
                warn!("Loop restart failed: {}", e);
                self.stop();
                Err(e)
            }
        }
    }

    fn reopen(&mut self, pool: Option<FillSide>) -> Result<u64> {
        let pool = pool.ok_or_else(|| Error::InvalidState("Replay pool was lost".to_string()))?;
        let path = self
            .active_path
            .clone()
            .ok_or_else(|| Error::InvalidState("No active waveform".to_string()))?;
        let signal = self
            .signal
            .clone()
            .ok_or_else(|| Error::InvalidState("No readiness signal".to_string()))?;

        self.check_storage()?;
        let source = self.open_source(&path)?;
        let replay = self.spawn_replay(source, pool, signal)?;
        let generation = replay.generation();
        self.replay = Some(replay);
        Ok(generation)
    }

    fn check_storage(&self) -> Result<()> {
        let status = self.deps.storage.status();
        if !status.is_mounted() {
            self.status("Error: SD card is not mounted.");
            return Err(Error::StorageUnavailable(format!(
                "{} is {}",
                self.deps.storage.root().display(),
                status
            )));
        }
        self.status("SD card is mounted.");
        Ok(())
    }

    fn open_source(&self, path: &std::path::Path) -> Result<Box<dyn SampleSource>> {
        match self.deps.opener.open(path) {
            Ok(source) => {
                self.status("Read IQ file.");
                Ok(source)
            }
            Err(e) => {
                self.status("Error: Unable to read IQ file.");
                Err(e)
            }
        }
    }

    fn spawn_replay(
        &mut self,
        source: Box<dyn SampleSource>,
        pool: FillSide,
        signal: Arc<ReadinessSignal>,
    ) -> Result<ReplayThread> {
        self.generation += 1;
        let notice_tx = self.notice_tx.clone();
        ReplayThread::spawn(
            source,
            pool,
            signal,
            self.generation,
            Box::new(move |notice| {
                // Receiver gone means the session was dropped
                let _ = notice_tx.send(notice);
            }),
        )
    }

    fn teardown(&mut self) {
        if let Some(replay) = self.replay.take() {
            self.finished_fills += replay.fills();
            replay.cancel();
        }
        self.deps.processor.unbind();
        if let Err(e) = self.deps.radio.disable() {
            warn!("Failed to disable radio: {}", e);
        }
        if let Some(signal) = self.signal.take() {
            signal.clear();
        }
        self.active_path = None;
    }

    fn flag_restart(&mut self, reason: String) {
        if self.state == SessionState::Stopped {
            debug!("Selection updated: {}", reason);
            return;
        }
        self.needs_restart = true;
        info!("Restart required: {}", reason);
        self.deps.events.emit_lossy(GjamEvent::RestartRequired {
            reason,
            timestamp: chrono::Utc::now(),
        });
    }

    fn set_state(&mut self, new_state: SessionState) {
        if new_state == self.state {
            return;
        }
        let old_state = std::mem::replace(&mut self.state, new_state);
        debug!("Session {}: {} -> {}", self.id, old_state, new_state);
        self.deps.events.emit_lossy(GjamEvent::SessionStateChanged {
            session_id: self.id,
            old_state,
            new_state,
            timestamp: chrono::Utc::now(),
        });
    }

    fn status(&self, message: impl Into<String>) {
        let message = message.into();
        info!("{}", message);
        self.deps.events.emit_lossy(GjamEvent::status(message));
    }
}

impl Drop for TransmitSession {
    fn drop(&mut self) {
        if self.state != SessionState::Stopped {
            self.teardown();
        }
    }
}

impl std::fmt::Debug for TransmitSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransmitSession")
            .field("id", &self.id)
            .field("state", &self.state)
            .field("band", &self.band)
            .field("jammer", &self.jammer)
            .field("gain", &self.gain)
            .field("generation", &self.generation)
            .field("needs_restart", &self.needs_restart)
            .finish()
    }
}
