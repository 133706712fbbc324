//! HTTP collaborators for mybabyd
//!
//! Provides:
//! - [`HttpDiscovery`]: polls a JSON endpoint for recent sightings
//! - [`HttpEnforcement`]: posts the enforcement plan to the gateway backend
//! - [`HttpAdvisor`]: asks a text-generation endpoint for guidance
//! - [`LoggingEnforcement`]: logs plans when no backend is configured

mod advisory;
mod client;
mod discovery;
mod enforcement;

#[cfg(test)]
mod test_server;

pub use advisory::*;
pub use client::*;
pub use discovery::*;
pub use enforcement::*;
