//! Collaborator traits

use async_trait::async_trait;
use mybaby_api::RecentDeviceSighting;
use thiserror::Error;

use crate::{AdvisoryRequest, EnforcementPlan};

/// Discovery service could not produce sightings
#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("Discovery service unavailable: {0}")]
    Unavailable(String),

    #[error("Discovery request timed out")]
    Timeout,

    #[error("Invalid discovery response: {0}")]
    InvalidResponse(String),
}

pub type DiscoveryResult<T> = Result<T, DiscoveryError>;

/// Enforcement backend rejected or did not receive a plan
#[derive(Debug, Error)]
pub enum EnforcementError {
    #[error("Enforcement backend unavailable: {0}")]
    Unavailable(String),

    #[error("Enforcement backend rejected plan: {0}")]
    Rejected(String),
}

pub type EnforcementResult<T> = Result<T, EnforcementError>;

/// Advisory service failed to produce guidance
#[derive(Debug, Error)]
pub enum AdvisoryError {
    #[error("Advisory service unavailable: {0}")]
    Unavailable(String),

    #[error("Advisory service returned no text")]
    Empty,
}

pub type AdvisoryResult<T> = Result<T, AdvisoryError>;

/// Source of recent network sightings
#[async_trait]
pub trait DiscoveryService: Send + Sync {
    /// Fetch the current sighting list. Freshness filtering is the caller's job.
    async fn fetch_sightings(&self) -> DiscoveryResult<Vec<RecentDeviceSighting>>;
}

/// Performs the actual blocking and usage metering
#[async_trait]
pub trait EnforcementBackend: Send + Sync {
    /// Replace the backend's current plan
    async fn apply_plan(&self, plan: &EnforcementPlan) -> EnforcementResult<()>;

    /// Short name for logs and health output
    fn name(&self) -> &str;
}

/// Produces free-text guidance about a device's usage
#[async_trait]
pub trait AdvisoryService: Send + Sync {
    async fn advise(&self, request: &AdvisoryRequest) -> AdvisoryResult<String>;
}
