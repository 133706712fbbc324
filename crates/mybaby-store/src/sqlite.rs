//! SQLite-based store implementation

use chrono::{DateTime, Local, NaiveDate};
use mybaby_util::DeviceId;
use rusqlite::{Connection, OptionalExtension, params};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, warn};

use crate::{AuditEvent, AuditEventType, PolicySnapshot, Store, StoreError, StoreResult};

/// SQLite-based store
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open or create a store at the given path
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let conn = Connection::open(path)?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    /// Create an in-memory store (for testing)
    pub fn in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn conn(&self) -> StoreResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| StoreError::Database("store lock poisoned".into()))
    }

    fn init_schema(&self) -> StoreResult<()> {
        let conn = self.conn()?;

        conn.execute_batch(
            r#"
            -- Audit log (append-only)
            CREATE TABLE IF NOT EXISTS audit_log (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                timestamp TEXT NOT NULL,
                event_json TEXT NOT NULL
            );

            -- Usage accounting, minutes per device per local day
            CREATE TABLE IF NOT EXISTS usage (
                device_id TEXT NOT NULL,
                day TEXT NOT NULL,
                minutes INTEGER NOT NULL DEFAULT 0,
                PRIMARY KEY (device_id, day)
            );

            -- Policy snapshot (single row)
            CREATE TABLE IF NOT EXISTS snapshot (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                snapshot_json TEXT NOT NULL
            );

            -- Indexes
            CREATE INDEX IF NOT EXISTS idx_audit_timestamp ON audit_log(timestamp);
            CREATE INDEX IF NOT EXISTS idx_usage_day ON usage(day);
            "#,
        )?;

        debug!("Store schema initialized");
        Ok(())
    }
}

fn day_key(day: NaiveDate) -> String {
    day.format("%Y-%m-%d").to_string()
}

impl Store for SqliteStore {
    fn append_audit(&self, mut event: AuditEvent) -> StoreResult<()> {
        let conn = self.conn()?;
        let event_json = serde_json::to_string(&event.event)?;

        conn.execute(
            "INSERT INTO audit_log (timestamp, event_json) VALUES (?, ?)",
            params![event.timestamp.to_rfc3339(), event_json],
        )?;

        event.id = conn.last_insert_rowid();
        debug!(event_id = event.id, event_type = event.event.name(), "Audit event appended");

        Ok(())
    }

    fn get_recent_audits(&self, limit: usize) -> StoreResult<Vec<AuditEvent>> {
        let conn = self.conn()?;

        let mut stmt = conn.prepare(
            "SELECT id, timestamp, event_json FROM audit_log ORDER BY id DESC LIMIT ?",
        )?;

        let rows = stmt.query_map([limit as i64], |row| {
            let id: i64 = row.get(0)?;
            let timestamp_str: String = row.get(1)?;
            let event_json: String = row.get(2)?;
            Ok((id, timestamp_str, event_json))
        })?;

        let mut events = Vec::new();
        for row in rows {
            let (id, timestamp_str, event_json) = row?;
            let timestamp = DateTime::parse_from_rfc3339(&timestamp_str)
                .map(|dt| dt.with_timezone(&Local))
                .unwrap_or_else(|_| mybaby_util::now());
            let event: AuditEventType = serde_json::from_str(&event_json)?;

            events.push(AuditEvent {
                id,
                timestamp,
                event,
            });
        }

        Ok(events)
    }

    fn get_usage(&self, device_id: &DeviceId, day: NaiveDate) -> StoreResult<u32> {
        let conn = self.conn()?;

        let minutes: Option<i64> = conn
            .query_row(
                "SELECT minutes FROM usage WHERE device_id = ? AND day = ?",
                params![device_id.as_str(), day_key(day)],
                |row| row.get(0),
            )
            .optional()?;

        Ok(minutes.unwrap_or(0).clamp(0, u32::MAX as i64) as u32)
    }

    fn add_usage(&self, device_id: &DeviceId, day: NaiveDate, minutes: u32) -> StoreResult<u32> {
        let conn = self.conn()?;
        let day_str = day_key(day);

        let total: i64 = conn.query_row(
            r#"
            INSERT INTO usage (device_id, day, minutes)
            VALUES (?, ?, ?)
            ON CONFLICT(device_id, day)
            DO UPDATE SET minutes = minutes + excluded.minutes
            RETURNING minutes
            "#,
            params![device_id.as_str(), day_str, minutes as i64],
            |row| row.get(0),
        )?;

        debug!(device_id = %device_id, day = %day_str, added_minutes = minutes, total, "Usage added");
        Ok(total.clamp(0, u32::MAX as i64) as u32)
    }

    fn reset_usage(&self, day: NaiveDate) -> StoreResult<usize> {
        let conn = self.conn()?;
        let cleared = conn.execute("DELETE FROM usage WHERE day = ?", [day_key(day)])?;
        debug!(day = %day, cleared, "Usage reset");
        Ok(cleared)
    }

    fn clear_device_usage(&self, device_id: &DeviceId) -> StoreResult<usize> {
        let conn = self.conn()?;
        let removed = conn.execute("DELETE FROM usage WHERE device_id = ?", [device_id.as_str()])?;
        debug!(device_id = %device_id, removed, "Device usage cleared");
        Ok(removed)
    }

    fn prune_usage(&self, before: NaiveDate) -> StoreResult<usize> {
        let conn = self.conn()?;
        // ISO dates compare correctly as text
        let removed = conn.execute("DELETE FROM usage WHERE day < ?", [day_key(before)])?;
        debug!(before = %before, removed, "Usage pruned");
        Ok(removed)
    }

    fn load_snapshot(&self) -> StoreResult<Option<PolicySnapshot>> {
        let conn = self.conn()?;

        let json: Option<String> = conn
            .query_row("SELECT snapshot_json FROM snapshot WHERE id = 1", [], |row| {
                row.get(0)
            })
            .optional()?;

        match json {
            Some(s) => {
                let snapshot: PolicySnapshot = serde_json::from_str(&s)?;
                Ok(Some(snapshot))
            }
            None => Ok(None),
        }
    }

    fn save_snapshot(&self, snapshot: &PolicySnapshot) -> StoreResult<()> {
        let conn = self.conn()?;
        let json = serde_json::to_string(snapshot)?;

        conn.execute(
            r#"
            INSERT INTO snapshot (id, snapshot_json)
            VALUES (1, ?)
            ON CONFLICT(id)
            DO UPDATE SET snapshot_json = excluded.snapshot_json
            "#,
            [json],
        )?;

        debug!(
            platforms = snapshot.platforms.len(),
            devices = snapshot.devices.len(),
            "Snapshot saved"
        );
        Ok(())
    }

    fn is_healthy(&self) -> bool {
        match self.conn.lock() {
            Ok(conn) => conn.query_row("SELECT 1", [], |_| Ok(())).is_ok(),
            Err(_) => {
                warn!("Store lock poisoned");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mybaby_api::{Device, DeviceControl, DeviceStatus, Platform, QuotaConfig};
    use mybaby_util::{MacAddress, PlatformId};

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, d).unwrap()
    }

    #[test]
    fn test_in_memory_store() {
        let store = SqliteStore::in_memory().unwrap();
        assert!(store.is_healthy());
    }

    #[test]
    fn test_audit_log() {
        let store = SqliteStore::in_memory().unwrap();

        store
            .append_audit(AuditEvent::new(AuditEventType::ServiceStarted))
            .unwrap();
        store
            .append_audit(AuditEvent::new(AuditEventType::EnforcementToggled {
                enabled: false,
            }))
            .unwrap();

        let events = store.get_recent_audits(10).unwrap();
        assert_eq!(events.len(), 2);
        // Newest first
        assert!(matches!(
            events[0].event,
            AuditEventType::EnforcementToggled { enabled: false }
        ));
        assert!(matches!(events[1].event, AuditEventType::ServiceStarted));

        assert_eq!(store.get_recent_audits(1).unwrap().len(), 1);
    }

    #[test]
    fn test_usage_accounting() {
        let store = SqliteStore::in_memory().unwrap();
        let device_id = DeviceId::new("d1");

        assert_eq!(store.get_usage(&device_id, day(5)).unwrap(), 0);

        assert_eq!(store.add_usage(&device_id, day(5), 30).unwrap(), 30);
        assert_eq!(store.add_usage(&device_id, day(5), 15).unwrap(), 45);
        assert_eq!(store.get_usage(&device_id, day(5)).unwrap(), 45);

        // Other days and devices are separate
        assert_eq!(store.get_usage(&device_id, day(6)).unwrap(), 0);
        assert_eq!(store.get_usage(&DeviceId::new("d2"), day(5)).unwrap(), 0);
    }

    #[test]
    fn test_reset_and_prune() {
        let store = SqliteStore::in_memory().unwrap();
        let a = DeviceId::new("d1");
        let b = DeviceId::new("d2");

        store.add_usage(&a, day(1), 10).unwrap();
        store.add_usage(&a, day(5), 20).unwrap();
        store.add_usage(&b, day(5), 5).unwrap();

        assert_eq!(store.reset_usage(day(5)).unwrap(), 2);
        assert_eq!(store.get_usage(&a, day(5)).unwrap(), 0);
        assert_eq!(store.get_usage(&a, day(1)).unwrap(), 10);

        assert_eq!(store.prune_usage(day(2)).unwrap(), 1);
        assert_eq!(store.get_usage(&a, day(1)).unwrap(), 0);
    }

    #[test]
    fn test_clear_device_usage() {
        let store = SqliteStore::in_memory().unwrap();
        let a = DeviceId::new("d1");
        let b = DeviceId::new("d2");

        store.add_usage(&a, day(4), 10).unwrap();
        store.add_usage(&a, day(5), 20).unwrap();
        store.add_usage(&b, day(5), 5).unwrap();

        assert_eq!(store.clear_device_usage(&a).unwrap(), 2);
        assert_eq!(store.get_usage(&a, day(5)).unwrap(), 0);
        assert_eq!(store.get_usage(&b, day(5)).unwrap(), 5);

        // A device reusing the id starts from nothing
        assert_eq!(store.add_usage(&a, day(5), 1).unwrap(), 1);
    }

    #[test]
    fn test_snapshot() {
        let store = SqliteStore::in_memory().unwrap();

        assert!(store.load_snapshot().unwrap().is_none());

        let snapshot = PolicySnapshot {
            timestamp: mybaby_util::now(),
            platforms: vec![Platform {
                id: PlatformId::new("1"),
                name: "Douyin".into(),
                icon: None,
                domains: vec!["*.douyin.com".into()],
                enabled: true,
            }],
            devices: vec![Device {
                id: DeviceId::new("d1"),
                mac: MacAddress::parse("70:B3:D5:E2:B1:00").unwrap(),
                name: "TV".into(),
                control: DeviceControl::Quota {
                    quota: QuotaConfig {
                        weekday_limit_minutes: 60,
                        weekend_limit_minutes: 120,
                    },
                },
                platform_ids: None,
                time_used_today: 0,
                status: DeviceStatus::Offline,
                last_seen: None,
            }],
        };
        store.save_snapshot(&snapshot).unwrap();
        store.save_snapshot(&snapshot).unwrap();

        let loaded = store.load_snapshot().unwrap().unwrap();
        assert_eq!(loaded.platforms, snapshot.platforms);
        assert_eq!(loaded.devices, snapshot.devices);
    }

    #[test]
    fn test_file_store_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mybaby.db");
        let device_id = DeviceId::new("d1");

        {
            let store = SqliteStore::open(&path).unwrap();
            store.add_usage(&device_id, day(5), 12).unwrap();
        }

        let store = SqliteStore::open(&path).unwrap();
        assert_eq!(store.get_usage(&device_id, day(5)).unwrap(), 12);
    }
}
