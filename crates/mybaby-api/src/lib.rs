//! Data model and protocol types for mybabyd
//!
//! This crate defines the stable model shared by every other crate and the
//! API between mybabyd and its clients:
//! - Devices, platforms, control modes and verdicts
//! - Discovery sightings and device presets
//! - Commands (requests from clients) and responses
//! - Events (service -> clients)

mod commands;
mod events;
mod types;

pub use commands::*;
pub use events::*;
pub use types::*;

/// Current API version
pub const API_VERSION: u32 = 1;
