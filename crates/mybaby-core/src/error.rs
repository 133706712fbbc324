//! Policy errors

use mybaby_api::{ControlMode, ErrorCode};
use mybaby_util::{DeviceId, MacAddress, MacParseError};
use std::fmt;
use thiserror::Error;

/// Which collection an id refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Device,
    Platform,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityKind::Device => f.write_str("device"),
            EntityKind::Platform => f.write_str("platform"),
        }
    }
}

/// Rejected mutation. The collection is unchanged when one of these is returned.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PolicyError {
    #[error(transparent)]
    InvalidMacFormat(#[from] MacParseError),

    #[error("Duplicate {kind} id '{id}'")]
    DuplicateId { kind: EntityKind, id: String },

    #[error("MAC {mac} is already registered to device '{existing}'")]
    DuplicateMac { mac: MacAddress, existing: DeviceId },

    #[error("No {kind} with id '{id}'")]
    NotFound { kind: EntityKind, id: String },

    #[error("Platform '{platform_id}' must have at least one domain pattern")]
    EmptyDomainList { platform_id: String },

    #[error("Name cannot be empty")]
    EmptyName,

    #[error("Mode {mode} {reason}")]
    InconsistentMode {
        mode: ControlMode,
        reason: &'static str,
    },

    #[error("Store error: {0}")]
    Store(String),
}

impl PolicyError {
    pub fn not_found(kind: EntityKind, id: impl fmt::Display) -> Self {
        PolicyError::NotFound {
            kind,
            id: id.to_string(),
        }
    }

    /// Protocol error code for this error
    pub fn code(&self) -> ErrorCode {
        match self {
            PolicyError::InvalidMacFormat(_) => ErrorCode::InvalidMacFormat,
            PolicyError::DuplicateId { .. } => ErrorCode::DuplicateId,
            PolicyError::DuplicateMac { .. } => ErrorCode::DuplicateMac,
            PolicyError::NotFound { .. } => ErrorCode::NotFound,
            PolicyError::EmptyDomainList { .. } => ErrorCode::EmptyDomainList,
            PolicyError::EmptyName => ErrorCode::EmptyName,
            PolicyError::InconsistentMode { .. } => ErrorCode::InconsistentMode,
            PolicyError::Store(_) => ErrorCode::StoreError,
        }
    }
}

impl From<mybaby_store::StoreError> for PolicyError {
    fn from(e: mybaby_store::StoreError) -> Self {
        PolicyError::Store(e.to_string())
    }
}

pub type PolicyResult<T> = Result<T, PolicyError>;
