//! Shared utilities for mybabyd
//!
//! This crate provides:
//! - ID types (DeviceId, PlatformId, WindowId, ClientId)
//! - Canonical MAC addresses and vendor prefixes (OUI)
//! - Wall-clock time, weekday sets and a mockable `now()`
//! - Default paths for socket, data and config

mod ids;
mod mac;
mod paths;
mod time;

pub use ids::*;
pub use mac::*;
pub use paths::*;
pub use time::*;
