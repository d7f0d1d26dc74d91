//! Collaborators the scheduler depends on
//!
//! Each external system sits behind a small trait so the scheduler can be
//! driven by the real adapters in production and by in-memory fakes in tests.

use crate::core::{EnvironmentalConditions, NotificationPriority, NotificationType, PowerSample, Recipient, Result};
use crate::db::{Database, DedupePolicy, DeliveredRecord, NewHistoryEntry};
use chrono::{DateTime, Utc};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Users who may receive notifications
pub trait UserDirectory: Send + Sync {
    fn recipients(&self) -> impl Future<Output = Result<Vec<Recipient>>> + Send;
}

/// Ordered power samples for one power entity
pub trait SampleSource: Send + Sync {
    fn power_samples(
        &self,
        entity_id: &str,
        since: DateTime<Utc>,
    ) -> impl Future<Output = Result<Vec<PowerSample>>> + Send;
}

/// Latest ambient reading for one room sensor, if any
pub trait ConditionSource: Send + Sync {
    fn latest_conditions(
        &self,
        sensor_id: &str,
    ) -> impl Future<Output = Result<Option<EnvironmentalConditions>>> + Send;
}

/// Persistent notification history
pub trait HistoryStore: Send + Sync {
    fn recent_deliveries(
        &self,
        user_id: &str,
        since: DateTime<Utc>,
    ) -> impl Future<Output = Result<Vec<DeliveredRecord>>> + Send;

    /// Atomic find-or-create; `None` means an equivalent entry already exists
    fn create_if_absent(
        &self,
        entry: NewHistoryEntry,
        now: DateTime<Utc>,
    ) -> impl Future<Output = Result<Option<i64>>> + Send;

    fn mark_delivered(
        &self,
        id: i64,
        receipt_id: Option<String>,
        at: DateTime<Utc>,
    ) -> impl Future<Output = Result<()>> + Send;

    fn purge_expired(&self, now: DateTime<Utc>) -> impl Future<Output = Result<u64>> + Send;
}

/// One push message with its metadata
#[derive(Debug, Clone, PartialEq)]
pub struct DeliveryRequest {
    pub to: String,
    pub title: String,
    pub body: String,
    pub kind: NotificationType,
    pub priority: NotificationPriority,
    pub appliance_key: String,
    pub device_name: String,
    pub history_id: i64,
}

/// Gateway acknowledgement
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeliveryReceipt {
    pub id: Option<String>,
}

/// Best-effort push transport
pub trait DeliveryGateway: Send + Sync {
    fn deliver(&self, request: &DeliveryRequest) -> impl Future<Output = Result<DeliveryReceipt>> + Send;
}

/// Recipients fixed at startup, usually from the `[[users]]` config section
#[derive(Debug, Clone, Default)]
pub struct StaticDirectory {
    users: Vec<Recipient>,
}

impl StaticDirectory {
    pub fn new(users: Vec<Recipient>) -> Self {
        Self { users }
    }
}

impl UserDirectory for StaticDirectory {
    async fn recipients(&self) -> Result<Vec<Recipient>> {
        Ok(self.users.iter().filter(|u| u.can_receive()).cloned().collect())
    }
}

/// History store backed by the shared SQLite database
#[derive(Clone)]
pub struct SqliteHistory {
    db: Arc<Mutex<Database>>,
    policy: DedupePolicy,
}

impl SqliteHistory {
    pub fn new(db: Arc<Mutex<Database>>, policy: DedupePolicy) -> Self {
        Self { db, policy }
    }

    pub fn database(&self) -> Arc<Mutex<Database>> {
        Arc::clone(&self.db)
    }
}

impl HistoryStore for SqliteHistory {
    async fn recent_deliveries(&self, user_id: &str, since: DateTime<Utc>) -> Result<Vec<DeliveredRecord>> {
        let db = self.db.lock().await;
        db.recent_delivered(user_id, since)
    }

    async fn create_if_absent(&self, entry: NewHistoryEntry, now: DateTime<Utc>) -> Result<Option<i64>> {
        let mut db = self.db.lock().await;
        db.create_if_absent(&entry, &self.policy, now)
    }

    async fn mark_delivered(&self, id: i64, receipt_id: Option<String>, at: DateTime<Utc>) -> Result<()> {
        let db = self.db.lock().await;
        db.mark_delivered(id, receipt_id.as_deref(), at)?;
        Ok(())
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64> {
        let db = self.db.lock().await;
        db.purge_expired(now)
    }
}
