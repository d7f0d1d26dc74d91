//! Database module for the notification history
//!
//! Uses SQLite for the only persisted record of the advisor: one row per
//! notification that was worth sending. The duplicate check and the insert
//! run inside a single IMMEDIATE transaction, so concurrent ticks (threads
//! or processes) cannot both create an entry for the same event.

use crate::core::{
    EnvironmentalConditions, Error, Factors, Notification, NotificationAction,
    NotificationPriority, NotificationType, OptimizationResult, Recommendation, Result,
    ScheduleConfig, UsageSummary,
};
use chrono::{DateTime, Duration, TimeZone, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row, TransactionBehavior};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// How long another connection's write lock is waited for
const BUSY_TIMEOUT_SECS: u64 = 5;

/// Database manager
pub struct Database {
    conn: Connection,
}

/// Figures kept from the optimization result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizationSnapshot {
    pub base_energy_kwh: f64,
    pub adjusted_energy_kwh: f64,
    pub factors: Factors,
    pub efficiency_pct: u32,
    pub efficiency_loss_pct: i32,
    pub potential_savings_pct: u32,
    pub alert_count: usize,
    /// Adjusted energy priced at the tariff, for display
    pub estimated_cost: f64,
}

impl OptimizationSnapshot {
    pub fn from_result(result: &OptimizationResult, estimated_cost: f64) -> Self {
        Self {
            base_energy_kwh: result.base_energy_kwh,
            adjusted_energy_kwh: result.adjusted_energy_kwh,
            factors: result.factors,
            efficiency_pct: result.efficiency_pct,
            efficiency_loss_pct: result.efficiency_loss_pct,
            potential_savings_pct: result.potential_savings_pct,
            alert_count: result.alerts.len(),
            estimated_cost,
        }
    }
}

/// Everything needed to create a history entry
#[derive(Debug, Clone)]
pub struct NewHistoryEntry {
    pub user_id: String,
    pub device_id: String,
    pub appliance_key: String,
    pub device_name: String,
    pub notification: Notification,
    pub optimization: OptimizationSnapshot,
    pub conditions: EnvironmentalConditions,
    pub usage: UsageSummary,
}

/// A persisted history entry
#[derive(Debug, Clone, Serialize)]
pub struct HistoryEntry {
    pub id: i64,
    pub user_id: String,
    pub device_id: String,
    pub appliance_key: String,
    pub device_name: String,
    pub notification: Notification,
    pub optimization: OptimizationSnapshot,
    pub conditions: EnvironmentalConditions,
    pub usage: UsageSummary,
    pub delivered: bool,
    pub delivery_receipt_id: Option<String>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub read: bool,
    pub dismissed: bool,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// A delivery recorded in the session window
#[derive(Debug, Clone, PartialEq)]
pub struct DeliveredRecord {
    pub device_id: String,
    pub kind: NotificationType,
    pub title: String,
    pub message: String,
    pub delivered_at: DateTime<Utc>,
}

/// Duplicate-suppression and retention settings
#[derive(Debug, Clone, Copy)]
pub struct DedupePolicy {
    pub window: Duration,
    pub prefix_chars: usize,
    pub ttl: Duration,
}

impl Default for DedupePolicy {
    fn default() -> Self {
        Self {
            window: Duration::hours(12),
            prefix_chars: 50,
            ttl: Duration::days(7),
        }
    }
}

impl DedupePolicy {
    pub fn from_schedule(schedule: &ScheduleConfig) -> Self {
        Self {
            window: Duration::hours(i64::from(schedule.dedupe_window_hours)),
            prefix_chars: schedule.message_prefix_chars,
            ttl: Duration::days(i64::from(schedule.history_ttl_days)),
        }
    }
}

/// First `n` characters of a message, on char boundaries
pub fn message_prefix(message: &str, n: usize) -> &str {
    match message.char_indices().nth(n) {
        Some((idx, _)) => &message[..idx],
        None => message,
    }
}

const ENTRY_COLUMNS: &str = "id, user_id, device_id, appliance_key, device_name,
    title, message, type, priority, action, recommendations,
    optimization, conditions, usage,
    delivered, delivery_receipt_id, delivered_at, read, dismissed, created_at, expires_at";

impl Database {
    /// Open (or create) the history database at `path`
    pub fn new(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        conn.busy_timeout(std::time::Duration::from_secs(BUSY_TIMEOUT_SECS))?;

        let db = Self { conn };
        db.init_schema()?;
        log::info!("Notification history at {}", path.display());

        Ok(db)
    }

    /// Private in-memory database, used by the demo and tests
    pub fn open_in_memory() -> Result<Self> {
        let db = Self { conn: Connection::open_in_memory()? };
        db.init_schema()?;
        Ok(db)
    }

    /// Initialize database schema
    fn init_schema(&self) -> Result<()> {
        self.conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS notification_history (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id TEXT NOT NULL,
                device_id TEXT NOT NULL,
                appliance_key TEXT NOT NULL,
                device_name TEXT NOT NULL,
                title TEXT NOT NULL,
                message TEXT NOT NULL,
                type TEXT NOT NULL,
                priority TEXT NOT NULL,
                action TEXT NOT NULL,
                recommendations TEXT NOT NULL,
                optimization TEXT NOT NULL,
                conditions TEXT NOT NULL,
                usage TEXT NOT NULL,
                delivered INTEGER NOT NULL DEFAULT 0,
                delivery_receipt_id TEXT,
                delivered_at INTEGER,
                read INTEGER NOT NULL DEFAULT 0,
                dismissed INTEGER NOT NULL DEFAULT 0,
                created_at INTEGER NOT NULL,
                expires_at INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_history_dedupe
                ON notification_history(user_id, device_id, type, created_at);
            CREATE INDEX IF NOT EXISTS idx_history_expiry
                ON notification_history(expires_at);
            "#,
        )?;

        Ok(())
    }

    /// Insert the entry unless an equivalent one exists in the dedupe window.
    ///
    /// An existing live entry for the same user, device and type counts as a
    /// duplicate when it has the same title, or the same priority and
    /// appliance with the same message prefix. Returns `None` in that case.
    pub fn create_if_absent(
        &mut self,
        entry: &NewHistoryEntry,
        policy: &DedupePolicy,
        now: DateTime<Utc>,
    ) -> Result<Option<i64>> {
        let n = &entry.notification;
        let since = (now - policy.window).timestamp();
        let prefix = message_prefix(&n.message, policy.prefix_chars);

        let tx = self.conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let duplicate = {
            let mut stmt = tx.prepare(
                "SELECT title, message, priority, appliance_key
                 FROM notification_history
                 WHERE user_id = ?1 AND device_id = ?2 AND type = ?3
                   AND created_at >= ?4 AND expires_at > ?5",
            )?;
            let rows = stmt.query_map(
                params![entry.user_id, entry.device_id, n.kind.as_str(), since, now.timestamp()],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                    ))
                },
            )?;

            let mut found = false;
            for row in rows {
                let (title, message, priority, appliance_key) = row?;
                if title == n.title
                    || (priority == n.priority.as_str()
                        && appliance_key == entry.appliance_key
                        && message_prefix(&message, policy.prefix_chars) == prefix)
                {
                    found = true;
                    break;
                }
            }
            found
        };

        if duplicate {
            tx.rollback()?;
            log::debug!(
                "Duplicate {} notification for {}/{} suppressed",
                n.kind,
                entry.user_id,
                entry.device_id
            );
            return Ok(None);
        }

        tx.execute(
            "INSERT INTO notification_history (
                user_id, device_id, appliance_key, device_name,
                title, message, type, priority, action, recommendations,
                optimization, conditions, usage, created_at, expires_at
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
            params![
                entry.user_id,
                entry.device_id,
                entry.appliance_key,
                entry.device_name,
                n.title,
                n.message,
                n.kind.as_str(),
                n.priority.as_str(),
                serde_json::to_string(&n.action)?,
                serde_json::to_string(&n.recommendations)?,
                serde_json::to_string(&entry.optimization)?,
                serde_json::to_string(&entry.conditions)?,
                serde_json::to_string(&entry.usage)?,
                now.timestamp(),
                (now + policy.ttl).timestamp(),
            ],
        )?;
        let id = tx.last_insert_rowid();
        tx.commit()?;

        Ok(Some(id))
    }

    /// Record a successful delivery
    pub fn mark_delivered(&self, id: i64, receipt_id: Option<&str>, at: DateTime<Utc>) -> Result<bool> {
        let updated = self.conn.execute(
            "UPDATE notification_history
             SET delivered = 1, delivery_receipt_id = ?1, delivered_at = ?2
             WHERE id = ?3",
            params![receipt_id, at.timestamp(), id],
        )?;
        Ok(updated > 0)
    }

    pub fn mark_read(&self, id: i64) -> Result<bool> {
        let updated = self
            .conn
            .execute("UPDATE notification_history SET read = 1 WHERE id = ?1", params![id])?;
        Ok(updated > 0)
    }

    pub fn mark_dismissed(&self, id: i64) -> Result<bool> {
        let updated = self
            .conn
            .execute("UPDATE notification_history SET dismissed = 1 WHERE id = ?1", params![id])?;
        Ok(updated > 0)
    }

    /// Deliveries to a user since `since`, newest first
    pub fn recent_delivered(&self, user_id: &str, since: DateTime<Utc>) -> Result<Vec<DeliveredRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT device_id, type, title, message, delivered_at
             FROM notification_history
             WHERE user_id = ?1 AND delivered = 1 AND delivered_at >= ?2
             ORDER BY delivered_at DESC",
        )?;

        let rows = stmt
            .query_map(params![user_id, since.timestamp()], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, i64>(4)?,
                ))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        rows.into_iter()
            .map(|(device_id, kind, title, message, at)| -> Result<DeliveredRecord> {
                let corrupt = |what: &str| {
                    Error::Serialization(format!("Invalid {} in delivery of '{}' to device {}", what, title, device_id))
                };
                let kind = NotificationType::parse(&kind).ok_or_else(|| corrupt("type"))?;
                let delivered_at = from_timestamp(at).ok_or_else(|| corrupt("delivered_at"))?;
                Ok(DeliveredRecord { device_id, kind, title, message, delivered_at })
            })
            .collect()
    }

    pub fn get(&self, id: i64) -> Result<Option<HistoryEntry>> {
        let sql = format!("SELECT {} FROM notification_history WHERE id = ?1", ENTRY_COLUMNS);
        let raw = self
            .conn
            .query_row(&sql, params![id], RawEntry::from_row)
            .optional()?;

        raw.map(RawEntry::into_entry).transpose()
    }

    /// Live entries for a user, newest first
    pub fn list_for_user(&self, user_id: &str, limit: u32, now: DateTime<Utc>) -> Result<Vec<HistoryEntry>> {
        let sql = format!(
            "SELECT {} FROM notification_history
             WHERE user_id = ?1 AND expires_at > ?2
             ORDER BY created_at DESC, id DESC LIMIT ?3",
            ENTRY_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;

        let raw = stmt
            .query_map(params![user_id, now.timestamp(), limit], RawEntry::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        raw.into_iter().map(RawEntry::into_entry).collect()
    }

    /// Delete entries past their expiry
    pub fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64> {
        let deleted = self.conn.execute(
            "DELETE FROM notification_history WHERE expires_at <= ?1",
            params![now.timestamp()],
        )?;

        if deleted > 0 {
            log::info!("Purged {} expired history entries", deleted);
        }
        Ok(deleted as u64)
    }

    /// Get total history count
    pub fn count(&self) -> Result<i64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM notification_history", [], |row| row.get(0))?;
        Ok(count)
    }
}

/// Column values before JSON decoding
struct RawEntry {
    id: i64,
    user_id: String,
    device_id: String,
    appliance_key: String,
    device_name: String,
    title: String,
    message: String,
    kind: String,
    priority: String,
    action: String,
    recommendations: String,
    optimization: String,
    conditions: String,
    usage: String,
    delivered: bool,
    delivery_receipt_id: Option<String>,
    delivered_at: Option<i64>,
    read: bool,
    dismissed: bool,
    created_at: i64,
    expires_at: i64,
}

impl RawEntry {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            user_id: row.get(1)?,
            device_id: row.get(2)?,
            appliance_key: row.get(3)?,
            device_name: row.get(4)?,
            title: row.get(5)?,
            message: row.get(6)?,
            kind: row.get(7)?,
            priority: row.get(8)?,
            action: row.get(9)?,
            recommendations: row.get(10)?,
            optimization: row.get(11)?,
            conditions: row.get(12)?,
            usage: row.get(13)?,
            delivered: row.get(14)?,
            delivery_receipt_id: row.get(15)?,
            delivered_at: row.get(16)?,
            read: row.get(17)?,
            dismissed: row.get(18)?,
            created_at: row.get(19)?,
            expires_at: row.get(20)?,
        })
    }

    fn into_entry(self) -> Result<HistoryEntry> {
        let corrupt = |what: &str| Error::Serialization(format!("Invalid {} in history entry {}", what, self.id));

        let kind = NotificationType::parse(&self.kind).ok_or_else(|| corrupt("type"))?;
        let priority = NotificationPriority::parse(&self.priority).ok_or_else(|| corrupt("priority"))?;
        let action: NotificationAction = serde_json::from_str(&self.action)?;
        let recommendations: Vec<Recommendation> = serde_json::from_str(&self.recommendations)?;
        let created_at = from_timestamp(self.created_at).ok_or_else(|| corrupt("created_at"))?;
        let expires_at = from_timestamp(self.expires_at).ok_or_else(|| corrupt("expires_at"))?;

        Ok(HistoryEntry {
            id: self.id,
            user_id: self.user_id,
            device_id: self.device_id,
            appliance_key: self.appliance_key,
            device_name: self.device_name,
            notification: Notification {
                title: self.title,
                message: self.message,
                kind,
                priority,
                action,
                recommendations,
            },
            optimization: serde_json::from_str(&self.optimization)?,
            conditions: serde_json::from_str(&self.conditions)?,
            usage: serde_json::from_str(&self.usage)?,
            delivered: self.delivered,
            delivery_receipt_id: self.delivery_receipt_id,
            delivered_at: self.delivered_at.and_then(from_timestamp),
            read: self.read,
            dismissed: self.dismissed,
            created_at,
            expires_at,
        })
    }
}

fn from_timestamp(secs: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_opt(secs, 0).single()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_db() -> Database {
        Database::open_in_memory().unwrap()
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 4, 12, 0, 0).unwrap()
    }

    fn entry(device: &str, title: &str, message: &str) -> NewHistoryEntry {
        NewHistoryEntry {
            user_id: "u1".into(),
            device_id: device.into(),
            appliance_key: "kettle".into(),
            device_name: "Kitchen kettle".into(),
            notification: Notification {
                title: title.into(),
                message: message.into(),
                kind: NotificationType::Critical,
                priority: NotificationPriority::High,
                action: NotificationAction::ViewDetails,
                recommendations: Vec::new(),
            },
            optimization: OptimizationSnapshot {
                base_energy_kwh: 0.12,
                adjusted_energy_kwh: 0.138,
                factors: Factors { f_t: 1.15, f_h: 1.0, f_p: 1.0 },
                efficiency_pct: 87,
                efficiency_loss_pct: 13,
                potential_savings_pct: 35,
                alert_count: 2,
                estimated_cost: 0.04,
            },
            conditions: EnvironmentalConditions::new(5.0, 50.0, None),
            usage: UsageSummary::default(),
        }
    }

    #[test]
    fn test_create_and_get() {
        let mut db = create_test_db();
        let id = db
            .create_if_absent(&entry("d1", "Kettle alert", "Boil"), &DedupePolicy::default(), now())
            .unwrap()
            .unwrap();

        let stored = db.get(id).unwrap().unwrap();
        assert_eq!(stored.device_name, "Kitchen kettle");
        assert_eq!(stored.notification.kind, NotificationType::Critical);
        assert_eq!(stored.optimization.efficiency_pct, 87);
        assert_eq!(stored.expires_at - stored.created_at, Duration::days(7));
        assert!(!stored.delivered);
    }

    #[test]
    fn test_same_title_within_window_is_refused() {
        let mut db = create_test_db();
        let policy = DedupePolicy::default();

        assert!(db.create_if_absent(&entry("d1", "T", "first"), &policy, now()).unwrap().is_some());
        let again = db
            .create_if_absent(&entry("d1", "T", "completely different"), &policy, now() + Duration::hours(3))
            .unwrap();
        assert!(again.is_none());
        assert_eq!(db.count().unwrap(), 1);

        // Other devices are independent
        assert!(db.create_if_absent(&entry("d2", "T", "first"), &policy, now()).unwrap().is_some());
    }

    #[test]
    fn test_same_prefix_is_refused() {
        let mut db = create_test_db();
        let policy = DedupePolicy { prefix_chars: 10, ..Default::default() };
        let base = "0123456789";

        db.create_if_absent(&entry("d1", "A", &format!("{}abc", base)), &policy, now()).unwrap();
        let near = db
            .create_if_absent(&entry("d1", "B", &format!("{}xyz", base)), &policy, now())
            .unwrap();
        assert!(near.is_none());
    }

    #[test]
    fn test_window_expiry_allows_resend() {
        let mut db = create_test_db();
        let policy = DedupePolicy::default();

        db.create_if_absent(&entry("d1", "T", "m"), &policy, now()).unwrap();
        let later = db
            .create_if_absent(&entry("d1", "T", "m"), &policy, now() + Duration::hours(13))
            .unwrap();
        assert!(later.is_some());
    }

    #[test]
    fn test_delivery_and_interaction_state() {
        let mut db = create_test_db();
        let id = db
            .create_if_absent(&entry("d1", "T", "m"), &DedupePolicy::default(), now())
            .unwrap()
            .unwrap();

        assert!(db.mark_delivered(id, Some("receipt-1"), now()).unwrap());
        assert!(db.mark_read(id).unwrap());
        assert!(db.mark_dismissed(id).unwrap());
        assert!(!db.mark_read(9999).unwrap());

        let stored = db.get(id).unwrap().unwrap();
        assert!(stored.delivered && stored.read && stored.dismissed);
        assert_eq!(stored.delivery_receipt_id.as_deref(), Some("receipt-1"));

        let recent = db.recent_delivered("u1", now() - Duration::hours(24)).unwrap();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].title, "T");
    }

    #[test]
    fn test_corrupt_delivery_row_is_an_error() {
        let mut db = create_test_db();
        let id = db
            .create_if_absent(&entry("d1", "T", "m"), &DedupePolicy::default(), now())
            .unwrap()
            .unwrap();
        db.mark_delivered(id, None, now()).unwrap();
        db.conn
            .execute("UPDATE notification_history SET type = 'bogus' WHERE id = ?1", params![id])
            .unwrap();

        let recent = db.recent_delivered("u1", now() - Duration::hours(24));
        assert!(matches!(recent, Err(Error::Serialization(_))));
    }

    #[test]
    fn test_purge_and_listing() {
        let mut db = create_test_db();
        let policy = DedupePolicy::default();
        db.create_if_absent(&entry("d1", "old", "m1"), &policy, now() - Duration::days(8)).unwrap();
        db.create_if_absent(&entry("d2", "new", "m2"), &policy, now()).unwrap();

        let live = db.list_for_user("u1", 10, now()).unwrap();
        assert_eq!(live.len(), 1);
        assert_eq!(live[0].notification.title, "new");

        assert_eq!(db.purge_expired(now()).unwrap(), 1);
        assert_eq!(db.count().unwrap(), 1);
    }

    #[test]
    fn test_prefix_respects_char_boundaries() {
        assert_eq!(message_prefix("\u{2603}\u{2603}abc", 2), "\u{2603}\u{2603}");
        assert_eq!(message_prefix("ab", 50), "ab");
    }

    #[test]
    fn test_on_disk_database() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("history.db");
        let mut db = Database::new(&path).unwrap();
        db.create_if_absent(&entry("d1", "T", "m"), &DedupePolicy::default(), now()).unwrap();
        drop(db);

        let reopened = Database::new(&path).unwrap();
        assert_eq!(reopened.count().unwrap(), 1);
    }
}
