//! # GJAM Common Library
//!
//! Shared code for the GJAM transmit tools including:
//! - Error types
//! - Storage root resolution and TOML config file discovery
//! - Event types (GjamEvent enum) and the broadcast EventBus
//! - Session and replay state enumerations

pub mod config;
pub mod error;
pub mod events;

pub use error::{Error, Result};
