//! Collaborator trait interfaces for mybabyd
//!
//! This crate defines the seams between the policy core and the external
//! systems it talks to. It contains no transport code itself:
//! - Discovery service: reports recent network sightings
//! - Enforcement backend: receives the enforcement plan and does the blocking
//! - Advisory service: produces free-text guidance for a device
//!
//! Discovery and advisory failures are soft. [`CachedDiscovery`] and
//! [`advice_or_placeholder`] turn them into substitute results with a warning.

mod advisory;
mod fallback;
mod mock;
mod plan;
mod traits;

pub use advisory::*;
pub use fallback::*;
pub use mock::*;
pub use plan::*;
pub use traits::*;
