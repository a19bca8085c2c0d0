//! Event types for the GJAM event system
//!
//! Provides shared event definitions and EventBus for every GJAM component.

mod session_types;

pub use session_types::{CompletionNotice, ReplayState, SessionState};

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// GJAM event types
///
/// Events are broadcast via EventBus and can be serialized for external consumers
/// (console, log shipping). All events use this central enum for exhaustive matching.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum GjamEvent {
    /// Transmit session state changed
    SessionStateChanged {
        /// Session UUID
        session_id: Uuid,
        /// State before change
        old_state: SessionState,
        /// State after change
        new_state: SessionState,
        /// When state changed
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A replay thread reported its terminal outcome
    ReplayCompleted {
        /// Session UUID
        session_id: Uuid,
        /// Replay thread generation within the session
        generation: u64,
        /// EndOfFile or ReadError
        notice: CompletionNotice,
        /// When the notice was handled
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Replay thread replaced after end of file (loop policy)
    LoopRestarted {
        /// Session UUID
        session_id: Uuid,
        /// Generation of the new replay thread
        generation: u64,
        /// When the restart completed
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A start request was refused before any pipeline was built
    StartRefused {
        /// Human-readable reason
        reason: String,
        /// When the start was refused
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// TX gain applied
    GainChanged {
        /// New gain in dB
        gain_db: u8,
        /// When gain changed
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A selection changed while streaming and only takes effect after restart
    RestartRequired {
        /// What changed
        reason: String,
        /// When the change was made
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Tick handler found no fresh sample data
    TransmitUnderrun {
        /// Total underruns since the session was configured
        underrun_count: u64,
        /// When the monitor noticed
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Operator-facing status line
    StatusMessage {
        /// Message text
        message: String,
        /// When the message was produced
        timestamp: chrono::DateTime<chrono::Utc>,
    },
}

impl GjamEvent {
    /// Get event type as string for filtering
    pub fn event_type(&self) -> &str {
        match self {
            GjamEvent::SessionStateChanged { .. } => "SessionStateChanged",
            GjamEvent::ReplayCompleted { .. } => "ReplayCompleted",
            GjamEvent::LoopRestarted { .. } => "LoopRestarted",
            GjamEvent::StartRefused { .. } => "StartRefused",
            GjamEvent::GainChanged { .. } => "GainChanged",
            GjamEvent::RestartRequired { .. } => "RestartRequired",
            GjamEvent::TransmitUnderrun { .. } => "TransmitUnderrun",
            GjamEvent::StatusMessage { .. } => "StatusMessage",
        }
    }

    /// Convenience constructor for a status line stamped now
    pub fn status(message: impl Into<String>) -> Self {
        GjamEvent::StatusMessage {
            message: message.into(),
            timestamp: chrono::Utc::now(),
        }
    }
}

/// Central event distribution bus
///
/// The EventBus uses tokio::broadcast internally, providing:
/// - Non-blocking publish (slow subscribers don't block producers)
/// - Multiple concurrent subscribers
/// - Lagged message detection for slow subscribers
///
/// # Examples
///
/// ```
/// use gjam_common::events::{EventBus, GjamEvent};
///
/// let event_bus = EventBus::new(100);
/// let mut rx = event_bus.subscribe();
///
/// event_bus.emit(GjamEvent::status("SD card is mounted.")).ok();
/// assert!(matches!(rx.try_recv(), Ok(GjamEvent::StatusMessage { .. })));
/// ```
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<GjamEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    ///
    /// * `capacity` - Number of events to buffer before dropping old events
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    ///
    /// Events emitted before subscription are not received.
    pub fn subscribe(&self) -> broadcast::Receiver<GjamEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Ok(subscriber_count)` if at least one subscriber exists.
    /// Returns `Err` if no subscribers are listening.
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: GjamEvent,
    ) -> Result<usize, broadcast::error::SendError<GjamEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: GjamEvent) {
        let _ = self.tx.send(event);
    }

    /// Get the current number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Get the configured channel capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("capacity", &self.capacity)
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}
