//! Store trait definitions

use chrono::{DateTime, Local, NaiveDate};
use mybaby_api::{Device, Platform};
use mybaby_util::DeviceId;
use serde::{Deserialize, Serialize};

use crate::{AuditEvent, StoreResult};

/// Main store trait
pub trait Store: Send + Sync {
    // Audit log

    /// Append an audit event
    fn append_audit(&self, event: AuditEvent) -> StoreResult<()>;

    /// Get recent audit events, newest first
    fn get_recent_audits(&self, limit: usize) -> StoreResult<Vec<AuditEvent>>;

    // Usage accounting

    /// Minutes used by a device on a specific local day
    fn get_usage(&self, device_id: &DeviceId, day: NaiveDate) -> StoreResult<u32>;

    /// Add minutes for a device on a specific local day, returning the new total
    fn add_usage(&self, device_id: &DeviceId, day: NaiveDate, minutes: u32) -> StoreResult<u32>;

    /// Zero every device's usage for a day. Returns the number of rows cleared.
    fn reset_usage(&self, day: NaiveDate) -> StoreResult<usize>;

    /// Drop every usage row for a device. Returns the number of rows removed.
    fn clear_device_usage(&self, device_id: &DeviceId) -> StoreResult<usize>;

    /// Drop usage rows older than `before`. Returns the number of rows removed.
    fn prune_usage(&self, before: NaiveDate) -> StoreResult<usize>;

    // Policy snapshot

    /// Load last saved snapshot
    fn load_snapshot(&self) -> StoreResult<Option<PolicySnapshot>>;

    /// Save policy snapshot
    fn save_snapshot(&self, snapshot: &PolicySnapshot) -> StoreResult<()>;

    // Health

    /// Check if store is healthy
    fn is_healthy(&self) -> bool;
}

/// Catalog and registry as last committed
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicySnapshot {
    /// Timestamp of snapshot
    pub timestamp: DateTime<Local>,

    pub platforms: Vec<Platform>,

    /// Devices with their policy fields. Usage is restored separately from
    /// the usage table.
    pub devices: Vec<Device>,
}
