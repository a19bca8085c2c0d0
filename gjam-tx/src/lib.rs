//! # GNSS Jammer Transmit Engine (gjam-tx)
//!
//! Replays pre-recorded complex 8-bit IQ waveforms onto a transmit path in
//! real time.
//!
//! **Architecture:**
//! - `replay`: replay thread, chunk pool, readiness signal and the tick handler
//! - `radio`: transmit path abstraction and the paced software radio
//! - `session`: control surface (start, stop, loop restart, gain and band changes)
//! - `storage`: storage medium checks

pub mod config;
pub mod error;
pub mod radio;
pub mod replay;
pub mod session;
pub mod storage;

pub use error::{Error, Result};
