//! Session and replay lifecycle type definitions
//!
//! Supporting types shared between the transmit engine and anything observing it.

use serde::{Deserialize, Serialize};

/// Control-surface session state
///
/// Stopped → Starting → Streaming → (Stopping | Restarting) → Stopped.
/// A loop restart goes Streaming → Restarting → Streaming without visiting Stopped.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    /// No replay thread, radio disabled
    #[default]
    Stopped,
    /// Validating storage and opening the sample source
    Starting,
    /// Replay thread alive, radio enabled
    Streaming,
    /// Tearing down the replay thread and radio
    Stopping,
    /// Replacing the replay thread after end of file (radio stays enabled)
    Restarting,
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionState::Stopped => write!(f, "stopped"),
            SessionState::Starting => write!(f, "starting"),
            SessionState::Streaming => write!(f, "streaming"),
            SessionState::Stopping => write!(f, "stopping"),
            SessionState::Restarting => write!(f, "restarting"),
        }
    }
}

/// Replay thread state
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "PascalCase")]
pub enum ReplayState {
    /// Not constructed yet
    #[default]
    Idle,
    /// Constructed, no fill delivered yet
    Configured,
    /// At least one chunk delivered
    Streaming,
    /// End of file reached; consumer still draining delivered chunks
    Draining,
    /// Read error or cancellation; no further fills
    Stopped,
}

impl ReplayState {
    /// Encode for storage in an atomic
    pub fn as_u8(self) -> u8 {
        match self {
            ReplayState::Idle => 0,
            ReplayState::Configured => 1,
            ReplayState::Streaming => 2,
            ReplayState::Draining => 3,
            ReplayState::Stopped => 4,
        }
    }

    /// Decode from an atomic; unknown values read as Stopped
    pub fn from_u8(value: u8) -> Self {
        match value {
            0 => ReplayState::Idle,
            1 => ReplayState::Configured,
            2 => ReplayState::Streaming,
            3 => ReplayState::Draining,
            _ => ReplayState::Stopped,
        }
    }
}

impl std::fmt::Display for ReplayState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReplayState::Idle => write!(f, "Idle"),
            ReplayState::Configured => write!(f, "Configured"),
            ReplayState::Streaming => write!(f, "Streaming"),
            ReplayState::Draining => write!(f, "Draining"),
            ReplayState::Stopped => write!(f, "Stopped"),
        }
    }
}

/// Terminal outcome of a replay thread, delivered once to the control surface
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub enum CompletionNotice {
    /// The sample source returned zero bytes
    EndOfFile,
    /// The sample source failed
    ReadError,
}

impl std::fmt::Display for CompletionNotice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CompletionNotice::EndOfFile => write!(f, "EndOfFile"),
            CompletionNotice::ReadError => write!(f, "ReadError"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_replay_state_atomic_encoding() {
        for state in [
            ReplayState::Idle,
            ReplayState::Configured,
            ReplayState::Streaming,
            ReplayState::Draining,
            ReplayState::Stopped,
        ] {
            assert_eq!(ReplayState::from_u8(state.as_u8()), state);
        }
        assert_eq!(ReplayState::from_u8(200), ReplayState::Stopped);
    }

    #[test]
    fn test_session_state_serializes_lowercase() {
        let json = serde_json::to_string(&SessionState::Restarting).unwrap();
        assert_eq!(json, "\"restarting\"");
        assert_eq!(SessionState::default(), SessionState::Stopped);
    }
}
