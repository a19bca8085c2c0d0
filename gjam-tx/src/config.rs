//! gjam-tx configuration
//!
//! Transmit settings with compiled defaults, optionally overridden by a TOML file.
//! Missing config files are not an error: the defaults describe the GNSS jammer
//! use case (20 MHz C8 replay, 8 KiB chunks, double buffering).

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use tracing::{info, warn};

/// GNSS frequency band selecting the transmit center frequency
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum GnssBand {
    #[default]
    L1,
    L2,
    L5,
}

impl GnssBand {
    pub const ALL: [GnssBand; 3] = [GnssBand::L1, GnssBand::L2, GnssBand::L5];

    /// Center frequency in Hz
    pub fn center_frequency_hz(self) -> u64 {
        match self {
            GnssBand::L1 => 1_575_420_000,
            GnssBand::L2 => 1_227_600_000,
            GnssBand::L5 => 1_176_450_000,
        }
    }
}

impl std::fmt::Display for GnssBand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GnssBand::L1 => write!(f, "L1"),
            GnssBand::L2 => write!(f, "L2"),
            GnssBand::L5 => write!(f, "L5"),
        }
    }
}

impl FromStr for GnssBand {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        GnssBand::ALL
            .into_iter()
            .find(|band| band.to_string().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| Error::InvalidInput(format!("Unknown GNSS band: {}", s)))
    }
}

/// Jammer waveform type; each maps to one pre-recorded C8 file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum JammerType {
    #[default]
    #[serde(rename = "LWF")]
    LinearWideFast,
    #[serde(rename = "LN")]
    LinearNarrow,
    #[serde(rename = "TRI")]
    Triangular,
    #[serde(rename = "TW")]
    TriangularWave,
    #[serde(rename = "TICK")]
    Tick,
}

impl JammerType {
    pub const ALL: [JammerType; 5] = [
        JammerType::LinearWideFast,
        JammerType::LinearNarrow,
        JammerType::Triangular,
        JammerType::TriangularWave,
        JammerType::Tick,
    ];

    /// Short code, also the waveform file stem
    pub fn code(self) -> &'static str {
        match self {
            JammerType::LinearWideFast => "LWF",
            JammerType::LinearNarrow => "LN",
            JammerType::Triangular => "TRI",
            JammerType::TriangularWave => "TW",
            JammerType::Tick => "TICK",
        }
    }

    /// Display name
    pub fn full_name(self) -> &'static str {
        match self {
            JammerType::LinearWideFast => "Linear Wide Fast",
            JammerType::LinearNarrow => "Linear Narrow",
            JammerType::Triangular => "Triangular",
            JammerType::TriangularWave => "Triangular Wave",
            JammerType::Tick => "TICK",
        }
    }
}

impl std::fmt::Display for JammerType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for JammerType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        JammerType::ALL
            .into_iter()
            .find(|kind| kind.code().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| Error::InvalidInput(format!("Unknown jammer type: {}", s)))
    }
}

/// TX VGA gain in dB, bounded to 0..=47
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct TxGain(u8);

impl TxGain {
    pub const MAX_DB: u8 = 47;

    pub fn new(db: u8) -> Result<Self> {
        if db > Self::MAX_DB {
            return Err(Error::InvalidInput(format!(
                "TX gain {} dB out of range 0..={}",
                db,
                Self::MAX_DB
            )));
        }
        Ok(Self(db))
    }

    pub fn db(self) -> u8 {
        self.0
    }
}

impl Default for TxGain {
    fn default() -> Self {
        Self(17)
    }
}

impl TryFrom<u8> for TxGain {
    type Error = Error;

    fn try_from(db: u8) -> Result<Self> {
        TxGain::new(db)
    }
}

impl FromStr for TxGain {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let db: u8 = s
            .trim()
            .parse()
            .map_err(|_| Error::InvalidInput(format!("Invalid TX gain: {}", s)))?;
        TxGain::new(db)
    }
}

impl From<TxGain> for u8 {
    fn from(gain: TxGain) -> u8 {
        gain.0
    }
}

impl std::fmt::Display for TxGain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} dB", self.0)
    }
}

/// Transmit settings
///
/// Every field has a compiled default so a partial TOML file is enough.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TxSettings {
    /// Storage root override (normally resolved by gjam_common::config)
    pub root_folder: Option<PathBuf>,
    /// Baseband sample rate in Hz
    pub sample_rate_hz: u32,
    /// Baseband filter bandwidth in Hz
    pub bandwidth_hz: u32,
    /// Bytes per replay chunk
    pub chunk_size: usize,
    /// Chunks in the replay pool (2 = double buffering)
    pub pool_depth: usize,
    /// Complex samples per radio tick
    pub tick_samples: usize,
    /// Initial TX gain
    pub gain: TxGain,
    /// Initial band
    pub band: GnssBand,
    /// Initial jammer type
    pub jammer: JammerType,
    /// Restart from the top of the file on end of file
    pub loop_on_completion: bool,
    /// RF amplifier on the transmit path
    pub rf_amp: bool,
    /// Waveform directory relative to the storage root
    pub waveform_dir: PathBuf,
    /// Waveform file extension (raw complex 8-bit)
    pub waveform_extension: String,
    /// Underrun monitor poll interval
    pub monitor_interval_ms: u64,
}

impl Default for TxSettings {
    fn default() -> Self {
        Self {
            root_folder: None,
            sample_rate_hz: 20_000_000,
            bandwidth_hz: 20_000_000,
            chunk_size: 8192,
            pool_depth: 2,
            tick_samples: 2048,
            gain: TxGain::default(),
            band: GnssBand::default(),
            jammer: JammerType::default(),
            loop_on_completion: true,
            rf_amp: true,
            waveform_dir: PathBuf::from("GNSS_JAMMER").join("BIN_FILES"),
            waveform_extension: "C8".to_string(),
            monitor_interval_ms: 500,
        }
    }
}

impl TxSettings {
    /// Load settings from an explicit file, the platform config file, or defaults
    ///
    /// An explicit path that cannot be read is an error; a missing platform
    /// config file only produces a log line.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let settings = match path {
            Some(path) => {
                let settings: TxSettings = gjam_common::config::load_toml_file(path)?;
                info!("Loaded transmit settings from {}", path.display());
                settings
            }
            None => match gjam_common::config::find_config_file() {
                Ok(found) => match gjam_common::config::load_toml_file::<TxSettings>(&found) {
                    Ok(settings) => {
                        info!("Loaded transmit settings from {}", found.display());
                        settings
                    }
                    Err(e) => {
                        warn!("Config file {} unusable ({}), using defaults", found.display(), e);
                        TxSettings::default()
                    }
                },
                Err(_) => {
                    info!("No config file found, using compiled defaults");
                    TxSettings::default()
                }
            },
        };

        settings.validate()?;
        Ok(settings)
    }

    /// Reject settings the pipeline cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.sample_rate_hz == 0 {
            return Err(Error::Config("sample_rate_hz must be non-zero".to_string()));
        }
        if self.chunk_size == 0 || self.chunk_size % 2 != 0 {
            return Err(Error::Config(format!(
                "chunk_size must be a non-zero multiple of 2 (one C8 sample), got {}",
                self.chunk_size
            )));
        }
        if self.pool_depth < 2 {
            return Err(Error::Config(format!(
                "pool_depth must be at least 2, got {}",
                self.pool_depth
            )));
        }
        if self.tick_samples == 0 {
            return Err(Error::Config("tick_samples must be non-zero".to_string()));
        }
        let tick_bytes = self.tick_samples.checked_mul(2).ok_or_else(|| {
            Error::Config(format!("tick_samples {} is out of range", self.tick_samples))
        })?;
        // One chunk is always being refilled; the rest must cover a full tick
        let refill_cover = self.chunk_size.checked_mul(self.pool_depth - 1).ok_or_else(|| {
            Error::Config(format!(
                "pool of {} x {} bytes is out of range",
                self.pool_depth, self.chunk_size
            ))
        })?;
        if refill_cover < tick_bytes {
            return Err(Error::Config(format!(
                "pool of {} x {} bytes cannot cover a {} byte tick while refilling",
                self.pool_depth, self.chunk_size, tick_bytes
            )));
        }
        if self.tick_period_nanos().is_none() {
            return Err(Error::Config(format!(
                "tick of {} samples at {} Hz is out of range",
                self.tick_samples, self.sample_rate_hz
            )));
        }
        if self.waveform_extension.is_empty() {
            return Err(Error::Config("waveform_extension must not be empty".to_string()));
        }
        Ok(())
    }

    /// Bytes produced per radio tick (2 bytes per C8 sample)
    pub fn tick_bytes(&self) -> usize {
        self.tick_samples * 2
    }

    /// Wall-clock period of one tick at the configured sample rate
    ///
    /// Saturates for settings that fail [`TxSettings::validate`].
    pub fn tick_period(&self) -> Duration {
        Duration::from_nanos(self.tick_period_nanos().unwrap_or(u64::MAX))
    }

    fn tick_period_nanos(&self) -> Option<u64> {
        let nanos = u64::try_from(self.tick_samples)
            .ok()?
            .checked_mul(1_000_000_000)?
            .checked_div(u64::from(self.sample_rate_hz))?;
        Some(nanos)
    }

    /// Path of the waveform file for a jammer type under `root`
    pub fn waveform_path(&self, root: &Path, jammer: JammerType) -> PathBuf {
        root.join(&self.waveform_dir)
            .join(format!("{}.{}", jammer.code(), self.waveform_extension))
    }
}
