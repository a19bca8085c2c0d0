//! Radio front-end abstraction
//!
//! The control surface tunes the radio, sets its gain and switches the transmit
//! path on and off. The radio, once enabled, drives the `SampleProcessor` at
//! its fixed tick cadence.

pub mod paced;
pub mod sink;

pub use paced::PacedRadio;
pub use sink::{open_sink, IqSink, NullSink, WriterSink};

use crate::config::{GnssBand, TxGain, TxSettings};
use crate::error::Result;
use serde::{Deserialize, Serialize};

/// Everything the transmit path needs to be configured for a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RadioSettings {
    pub frequency_hz: u64,
    pub sample_rate_hz: u32,
    pub bandwidth_hz: u32,
    pub rf_amp: bool,
    pub gain: TxGain,
}

impl RadioSettings {
    /// Settings for `band` at `gain`, with rate and filter from `settings`
    pub fn for_band(settings: &TxSettings, band: GnssBand, gain: TxGain) -> Self {
        Self {
            frequency_hz: band.center_frequency_hz(),
            sample_rate_hz: settings.sample_rate_hz,
            bandwidth_hz: settings.bandwidth_hz,
            rf_amp: settings.rf_amp,
            gain,
        }
    }
}

/// Transmit-capable radio
///
/// Methods take `&self` so one radio can be shared between the control
/// surface and diagnostics.
pub trait Radio: Send + Sync {
    /// Apply frequency, sample rate, filter and amplifier settings
    fn tune(&self, settings: &RadioSettings) -> Result<()>;

    /// Change TX gain; legal while transmitting
    fn set_gain(&self, gain: TxGain) -> Result<()>;

    /// Start requesting transmit buffers
    fn enable(&self) -> Result<()>;

    /// Stop requesting transmit buffers
    fn disable(&self) -> Result<()>;

    fn is_enabled(&self) -> bool;
}
