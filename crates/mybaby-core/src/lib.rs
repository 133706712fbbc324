//! Policy core for mybabyd
//!
//! This crate is the heart of mybabyd, containing:
//! - Identity resolution (MAC canonicalization, preset lookup)
//! - Discovery freshness filtering and enrichment
//! - Policy catalog (platforms) and device registry
//! - Quota tracking and schedule evaluation
//! - The decision engine: ALLOW / BLOCK / NOT_GOVERNED per (device, platform, instant)
//! - [`ControlEngine`], which owns the state and adds audit, events,
//!   daily reset and the enforcement plan
//!
//! Evaluation functions are pure. Every failure mode lives at the mutation
//! boundary, and a failed mutation leaves the state unchanged.

mod catalog;
mod decision;
mod discovery;
mod engine;
mod error;
mod events;
mod identity;
mod quota;
mod registry;
mod schedule;
mod state;

pub use catalog::*;
pub use decision::*;
pub use discovery::*;
pub use engine::*;
pub use error::*;
pub use events::*;
pub use identity::*;
pub use quota::*;
pub use registry::*;
pub use schedule::*;
pub use state::*;
