//! Scheduler - periodic analysis, deduplication and delivery
//!
//! Two independent cadences drive ticks: an hourly tick that handles every
//! notification type, and a denser tick inside the peak window that only
//! handles urgent notifications. Each tick fans out over users on a bounded
//! worker pool. A notification is persisted at most once per dedupe window;
//! the history store's atomic find-or-create is what guarantees this, the
//! in-memory delivered-key index only saves work within a run.

mod cadence;
mod sources;

pub use cadence::{delay_until, next_hourly_tick, next_peak_tick, TickKind};
pub use sources::{
    ConditionSource, DeliveryGateway, DeliveryReceipt, DeliveryRequest, HistoryStore,
    SampleSource, SqliteHistory, StaticDirectory, UserDirectory,
};

use crate::advisor::{ApplianceRegistry, OptimizationEngine};
use crate::core::{
    Config, Device, EnvironmentalConditions, Error, Notification, NotificationPriority,
    NotificationType, PeakWindow, Recipient, Result,
};
use crate::db::{message_prefix, DeliveredRecord, NewHistoryEntry, OptimizationSnapshot};
use crate::pricing::PricingEngine;
use crate::usage::{local_day_start, UsageAnalyzer};
use chrono::{DateTime, Duration, Local, TimeZone, Utc};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration as StdDuration;
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinSet;

/// (device id, type, title)
type SentKey = (String, NotificationType, String);

/// Runtime knobs, normally taken from [`Config`]
#[derive(Debug, Clone)]
pub struct SchedulerSettings {
    pub hourly_enabled: bool,
    pub peak_enabled: bool,
    pub peak_interval_minutes: u32,
    /// Look-back for the delivered-key index
    pub session_window: Duration,
    /// An identical notification is not resent within this window
    pub dedupe_window: Duration,
    pub message_prefix_chars: usize,
    pub max_concurrent_users: usize,
    pub query_timeout: StdDuration,
    pub delivery_timeout: StdDuration,
}

impl SchedulerSettings {
    pub fn from_config(config: &Config) -> Self {
        let schedule = &config.schedule;
        Self {
            hourly_enabled: schedule.hourly_enabled,
            peak_enabled: schedule.peak_enabled,
            peak_interval_minutes: schedule.peak_interval_minutes,
            session_window: Duration::hours(i64::from(schedule.session_window_hours)),
            dedupe_window: Duration::hours(i64::from(schedule.dedupe_window_hours)),
            message_prefix_chars: schedule.message_prefix_chars,
            max_concurrent_users: config.general.max_concurrent_users.max(1),
            query_timeout: StdDuration::from_secs(config.general.query_timeout_secs),
            delivery_timeout: StdDuration::from_secs(config.general.delivery_timeout_secs),
        }
    }
}

/// External systems the scheduler talks to
pub struct Collaborators<D, S, C, H, G> {
    pub users: D,
    pub samples: S,
    pub conditions: C,
    pub history: H,
    pub gateway: G,
}

/// Counters for one tick
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    pub users: usize,
    pub devices_analyzed: usize,
    pub skipped_unused: usize,
    /// Devices whose notification was `none`
    pub quiet: usize,
    /// Notifications this cadence does not handle
    pub not_for_tick: usize,
    /// Skipped by the delivered-key index
    pub suppressed: usize,
    /// Refused by the history store
    pub duplicates: usize,
    pub created: usize,
    pub delivered: usize,
    pub delivery_failures: usize,
    pub failures: usize,
}

impl TickReport {
    fn record(&mut self, outcome: DeviceOutcome) {
        if outcome != DeviceOutcome::Unused {
            self.devices_analyzed += 1;
        }
        match outcome {
            DeviceOutcome::Unused => self.skipped_unused += 1,
            DeviceOutcome::Quiet => self.quiet += 1,
            DeviceOutcome::NotForTick => self.not_for_tick += 1,
            DeviceOutcome::Suppressed => self.suppressed += 1,
            DeviceOutcome::Duplicate => self.duplicates += 1,
            DeviceOutcome::Stored => self.created += 1,
            DeviceOutcome::Delivered => {
                self.created += 1;
                self.delivered += 1;
            }
            DeviceOutcome::DeliveryFailed => {
                self.created += 1;
                self.delivery_failures += 1;
            }
        }
    }

    fn merge(&mut self, other: TickReport) {
        self.devices_analyzed += other.devices_analyzed;
        self.skipped_unused += other.skipped_unused;
        self.quiet += other.quiet;
        self.not_for_tick += other.not_for_tick;
        self.suppressed += other.suppressed;
        self.duplicates += other.duplicates;
        self.created += other.created;
        self.delivered += other.delivered;
        self.delivery_failures += other.delivery_failures;
        self.failures += other.failures;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DeviceOutcome {
    Unused,
    Quiet,
    NotForTick,
    Suppressed,
    Duplicate,
    Stored,
    Delivered,
    DeliveryFailed,
}

/// High-priority or critical notifications
fn is_urgent(notification: &Notification) -> bool {
    notification.priority == NotificationPriority::High
        || notification.kind == NotificationType::Critical
}

/// Peak ticks only look at urgent notifications
fn handled_on(notification: &Notification, tick: TickKind) -> bool {
    tick == TickKind::Hourly || is_urgent(notification)
}

/// Urgent notifications are always pushed; opportunities only on the hourly tick
pub fn should_deliver(notification: &Notification, tick: TickKind) -> bool {
    is_urgent(notification)
        || (notification.kind == NotificationType::Opportunity && tick == TickKind::Hourly)
}

/// Conditions of the device's room, else the first room with data, else defaults
fn conditions_for(device: &Device, rooms: &[(String, EnvironmentalConditions)]) -> EnvironmentalConditions {
    device
        .location
        .as_deref()
        .and_then(|location| rooms.iter().find(|(name, _)| name == location))
        .or_else(|| rooms.first())
        .map(|(_, conditions)| *conditions)
        .unwrap_or_default()
}

/// Latest delivery per key
fn sent_index(records: Vec<DeliveredRecord>) -> HashMap<SentKey, DeliveredRecord> {
    let mut index: HashMap<SentKey, DeliveredRecord> = HashMap::new();
    for record in records {
        let key = (record.device_id.clone(), record.kind, record.title.clone());
        match index.get(&key) {
            Some(existing) if existing.delivered_at >= record.delivered_at => {}
            _ => {
                index.insert(key, record);
            }
        }
    }
    index
}

/// Run an external call under a time budget
async fn bounded<T>(limit: StdDuration, what: &str, call: impl Future<Output = Result<T>>) -> Result<T> {
    tokio::time::timeout(limit, call)
        .await
        .map_err(|_| Error::Timeout(format!("{} after {:.1}s", what, limit.as_secs_f64())))?
}

struct Inner<D, S, C, H, G> {
    io: Collaborators<D, S, C, H, G>,
    engine: OptimizationEngine,
    analyzer: UsageAnalyzer,
    pricing: PricingEngine,
    peak: PeakWindow,
    settings: SchedulerSettings,
}

/// The notification scheduler service
pub struct Scheduler<D, S, C, H, G> {
    inner: Arc<Inner<D, S, C, H, G>>,
}

impl<D, S, C, H, G> Clone for Scheduler<D, S, C, H, G> {
    fn clone(&self) -> Self {
        Self { inner: Arc::clone(&self.inner) }
    }
}

impl<D, S, C, H, G> Scheduler<D, S, C, H, G>
where
    D: UserDirectory + 'static,
    S: SampleSource + 'static,
    C: ConditionSource + 'static,
    H: HistoryStore + 'static,
    G: DeliveryGateway + 'static,
{
    pub fn new(config: &Config, io: Collaborators<D, S, C, H, G>) -> Result<Self> {
        Self::with_settings(config, SchedulerSettings::from_config(config), io)
    }

    pub fn with_settings(
        config: &Config,
        settings: SchedulerSettings,
        io: Collaborators<D, S, C, H, G>,
    ) -> Result<Self> {
        let peak = config.schedule.peak_window()?;
        let registry = ApplianceRegistry::with_overrides(&config.appliances);

        Ok(Self {
            inner: Arc::new(Inner {
                io,
                engine: OptimizationEngine::new(registry),
                analyzer: UsageAnalyzer::new(config.detection.clone(), peak),
                pricing: PricingEngine::new(&config.pricing, peak),
                peak,
                settings,
            }),
        })
    }

    pub fn settings(&self) -> &SchedulerSettings {
        &self.inner.settings
    }

    pub fn engine(&self) -> &OptimizationEngine {
        &self.inner.engine
    }

    /// Drive both cadences until `shutdown` flips or its sender is dropped
    pub async fn run(&self, shutdown: watch::Receiver<bool>) {
        let hourly = self.run_cadence(TickKind::Hourly, shutdown.clone());
        let peak = self.run_cadence(TickKind::Peak, shutdown);
        tokio::join!(hourly, peak);
    }

    async fn run_cadence(&self, kind: TickKind, mut shutdown: watch::Receiver<bool>) {
        let settings = &self.inner.settings;
        let enabled = match kind {
            TickKind::Hourly => settings.hourly_enabled,
            TickKind::Peak => settings.peak_enabled,
        };
        if !enabled {
            log::info!("{} tick disabled", kind);
            return;
        }
        log::info!("Starting {} tick loop", kind);

        loop {
            if *shutdown.borrow() {
                break;
            }

            let now = Local::now();
            let next = match kind {
                TickKind::Hourly => Some(next_hourly_tick(&now)),
                TickKind::Peak => next_peak_tick(&now, &self.inner.peak, settings.peak_interval_minutes),
            };
            let Some(next) = next else {
                log::warn!("{} tick has no upcoming slot", kind);
                break;
            };
            log::debug!("Next {} tick at {}", kind, next);

            tokio::select! {
                _ = tokio::time::sleep(delay_until(next, Utc::now())) => {
                    self.run_tick(kind).await;
                }
                _ = shutdown.changed() => break,
            }
        }

        log::info!("{} tick loop stopped", kind);
    }

    /// One tick at the current local time
    pub async fn run_tick(&self, kind: TickKind) -> TickReport {
        self.run_tick_at(kind, Local::now()).await
    }

    /// One tick as if run at `now`, in `now`'s time zone
    pub async fn run_tick_at<Tz>(&self, kind: TickKind, now: DateTime<Tz>) -> TickReport
    where
        Tz: TimeZone + Send + Sync + 'static,
        Tz::Offset: Send + Sync,
    {
        let inner = &self.inner;
        let mut report = TickReport::default();

        let recipients = match bounded(
            inner.settings.query_timeout,
            "user directory",
            inner.io.users.recipients(),
        )
        .await
        {
            Ok(recipients) => recipients,
            Err(e) => {
                log::error!("{} tick: cannot list users: {}", kind, e);
                report.failures += 1;
                return report;
            }
        };
        report.users = recipients.len();

        let permits = Arc::new(Semaphore::new(inner.settings.max_concurrent_users));
        let mut workers = JoinSet::new();
        for user in recipients {
            let Ok(permit) = Arc::clone(&permits).acquire_owned().await else {
                break;
            };
            let this = self.clone();
            let now = now.clone();
            workers.spawn(async move {
                let _permit = permit;
                this.process_user(&user, kind, &now).await
            });
        }

        while let Some(joined) = workers.join_next().await {
            match joined {
                Ok(user_report) => report.merge(user_report),
                Err(e) => {
                    log::error!("{} tick: user task aborted: {}", kind, e);
                    report.failures += 1;
                }
            }
        }

        if kind == TickKind::Hourly {
            let purge = inner.io.history.purge_expired(now.with_timezone(&Utc));
            if let Err(e) = bounded(inner.settings.query_timeout, "history purge", purge).await {
                log::warn!("History purge failed: {}", e);
            }
        }

        log::info!(
            "{} tick: {} users, {} devices analysed, {} created, {} delivered, {} duplicates, {} failures",
            kind,
            report.users,
            report.devices_analyzed,
            report.created,
            report.delivered,
            report.duplicates + report.suppressed,
            report.failures
        );
        report
    }

    async fn process_user<Tz>(&self, user: &Recipient, kind: TickKind, now: &DateTime<Tz>) -> TickReport
    where
        Tz: TimeZone + Send + Sync,
        Tz::Offset: Send + Sync,
    {
        let inner = &self.inner;
        let mut report = TickReport::default();

        let since = now.with_timezone(&Utc) - inner.settings.session_window;
        let recent = inner.io.history.recent_deliveries(&user.id, since);
        let mut sent = match bounded(inner.settings.query_timeout, "recent deliveries", recent).await {
            Ok(records) => sent_index(records),
            Err(e) => {
                log::warn!("User {}: recent deliveries unavailable: {}", user.id, e);
                HashMap::new()
            }
        };

        let rooms = self.room_conditions(user).await;
        if rooms.is_empty() && !user.rooms.is_empty() {
            log::debug!("User {}: no room data, using default conditions", user.id);
        }

        for device in &user.devices {
            let conditions = conditions_for(device, &rooms);
            match self.process_device(user, device, conditions, &mut sent, kind, now).await {
                Ok(outcome) => report.record(outcome),
                Err(e) => {
                    log::warn!("User {} device {}: {}", user.id, device.id, e);
                    report.failures += 1;
                }
            }
        }

        report
    }

    /// Rooms with usable readings, in configuration order
    async fn room_conditions(&self, user: &Recipient) -> Vec<(String, EnvironmentalConditions)> {
        let inner = &self.inner;
        let mut rooms = Vec::new();

        for room in &user.rooms {
            let query = inner.io.conditions.latest_conditions(&room.sensor_id);
            match bounded(inner.settings.query_timeout, "room conditions", query).await {
                Ok(Some(conditions)) => rooms.push((room.name.clone(), conditions)),
                Ok(None) => log::debug!("Room {} has no readings", room.name),
                Err(e) => log::warn!("User {} room {}: {}", user.id, room.name, e),
            }
        }
        rooms
    }

    async fn process_device<Tz>(
        &self,
        user: &Recipient,
        device: &Device,
        conditions: EnvironmentalConditions,
        sent: &mut HashMap<SentKey, DeliveredRecord>,
        kind: TickKind,
        now: &DateTime<Tz>,
    ) -> Result<DeviceOutcome>
    where
        Tz: TimeZone + Send + Sync,
        Tz::Offset: Send + Sync,
    {
        let inner = &self.inner;
        let settings = &inner.settings;
        let now_utc = now.with_timezone(&Utc);
        let profile = inner.engine.registry().get(&device.appliance_key)?;

        let query = inner.io.samples.power_samples(&device.power_entity_id, local_day_start(now));
        let samples = bounded(settings.query_timeout, "power samples", query).await?;

        let usage = inner.analyzer.summarize(profile, &samples, now);
        if usage.is_unused() {
            log::debug!("Device {} unused today", device.id);
            return Ok(DeviceOutcome::Unused);
        }

        let result = inner.engine.evaluate_with_maintenance(
            &device.appliance_key,
            &conditions,
            &usage,
            &device.maintenance,
        )?;
        let notification = inner.engine.notify(&result)?;

        if !notification.is_actionable() {
            return Ok(DeviceOutcome::Quiet);
        }
        if !handled_on(&notification, kind) {
            log::debug!("Device {}: {} notification left for the hourly tick", device.id, notification.kind);
            return Ok(DeviceOutcome::NotForTick);
        }

        let key = (device.id.clone(), notification.kind, notification.title.clone());
        if let Some(prior) = sent.get(&key) {
            let n = settings.message_prefix_chars;
            let unchanged = message_prefix(&prior.message, n) == message_prefix(&notification.message, n);
            if unchanged && now_utc - prior.delivered_at < settings.dedupe_window {
                log::debug!("Device {}: '{}' already sent at {}", device.id, notification.title, prior.delivered_at);
                return Ok(DeviceOutcome::Suppressed);
            }
        }

        let estimated_cost = inner.pricing.estimated_cost(result.adjusted_energy_kwh, now.time());
        let entry = NewHistoryEntry {
            user_id: user.id.clone(),
            device_id: device.id.clone(),
            appliance_key: result.appliance_key.clone(),
            device_name: device.name.clone(),
            notification: notification.clone(),
            optimization: OptimizationSnapshot::from_result(&result, estimated_cost),
            conditions,
            usage,
        };
        let create = inner.io.history.create_if_absent(entry, now_utc);
        let Some(history_id) = bounded(settings.query_timeout, "history write", create).await? else {
            return Ok(DeviceOutcome::Duplicate);
        };

        if !should_deliver(&notification, kind) {
            return Ok(DeviceOutcome::Stored);
        }

        let request = DeliveryRequest {
            to: user.push_token.clone().unwrap_or_default(),
            title: notification.title.clone(),
            body: notification.message.clone(),
            kind: notification.kind,
            priority: notification.priority,
            appliance_key: result.appliance_key.clone(),
            device_name: device.name.clone(),
            history_id,
        };
        let receipt = match bounded(settings.delivery_timeout, "push delivery", inner.io.gateway.deliver(&request)).await {
            Ok(receipt) => receipt,
            Err(e) => {
                log::warn!("History entry {} for device {} not delivered: {}", history_id, device.id, e);
                return Ok(DeviceOutcome::DeliveryFailed);
            }
        };

        let mark = inner.io.history.mark_delivered(history_id, receipt.id, now_utc);
        if let Err(e) = bounded(settings.query_timeout, "mark delivered", mark).await {
            log::warn!("History entry {} delivered but not marked: {}", history_id, e);
        }

        log::info!(
            "Delivered {} notification '{}' for device {} to user {}",
            notification.kind,
            notification.title,
            device.id,
            user.id
        );
        sent.insert(
            key,
            DeliveredRecord {
                device_id: device.id.clone(),
                kind: notification.kind,
                title: notification.title,
                message: notification.message,
                delivered_at: now_utc,
            },
        );
        Ok(DeviceOutcome::Delivered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{NotificationAction, PowerSample, Room};
    use crate::db::{Database, DedupePolicy};
    use crate::usage::UkTime;
    use chrono::FixedOffset;
    use tokio::sync::Mutex;

    #[derive(Default)]
    struct FakeSamples {
        traces: HashMap<String, Vec<PowerSample>>,
    }

    impl SampleSource for FakeSamples {
        async fn power_samples(&self, entity_id: &str, since: DateTime<Utc>) -> Result<Vec<PowerSample>> {
            match entity_id {
                "sensor.broken" => Err(Error::Query("connection refused".into())),
                "sensor.slow" => {
                    tokio::time::sleep(StdDuration::from_secs(5)).await;
                    Ok(Vec::new())
                }
                _ => {
                    let trace = self.traces.get(entity_id).map(Vec::as_slice).unwrap_or_default();
                    Ok(trace.iter().filter(|s| s.timestamp >= since).copied().collect())
                }
            }
        }
    }

    struct FakeConditions;

    impl ConditionSource for FakeConditions {
        async fn latest_conditions(&self, sensor_id: &str) -> Result<Option<EnvironmentalConditions>> {
            match sensor_id {
                "sensor.kitchen" => Ok(Some(EnvironmentalConditions::new(20.0, 50.0, None))),
                "sensor.cellar" => Err(Error::Query("timeout".into())),
                _ => Ok(None),
            }
        }
    }

    #[derive(Clone, Default)]
    struct FakeGateway {
        attempts: Arc<std::sync::Mutex<Vec<DeliveryRequest>>>,
        fail: bool,
    }

    impl FakeGateway {
        fn attempts(&self) -> usize {
            self.attempts.lock().unwrap().len()
        }
    }

    impl DeliveryGateway for FakeGateway {
        async fn deliver(&self, request: &DeliveryRequest) -> Result<DeliveryReceipt> {
            self.attempts.lock().unwrap().push(request.clone());
            if self.fail {
                return Err(Error::Delivery("gateway down".into()));
            }
            Ok(DeliveryReceipt { id: Some(format!("receipt-{}", request.history_id)) })
        }
    }

    type TestScheduler = Scheduler<StaticDirectory, FakeSamples, FakeConditions, SqliteHistory, FakeGateway>;

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 4, h, m, 0).unwrap()
    }

    fn noon() -> DateTime<FixedOffset> {
        at(12, 0).into()
    }

    /// Bursts sampled every 30 s, each followed by an idle reading
    fn trace(bursts: &[(DateTime<Utc>, i64, f64)]) -> Vec<PowerSample> {
        let mut samples = Vec::new();
        for &(start, minutes, watts) in bursts {
            for step in 0..=minutes * 2 {
                samples.push(PowerSample::new(start + Duration::seconds(step * 30), watts));
            }
            samples.push(PowerSample::new(start + Duration::minutes(minutes + 1), 0.0));
        }
        samples
    }

    /// One long boil: critical
    fn long_boil() -> Vec<PowerSample> {
        trace(&[(at(8, 0), 6, 2000.0)])
    }

    /// Nine short boils: an opportunity
    fn many_boils() -> Vec<PowerSample> {
        let bursts: Vec<_> = (0..9).map(|i| (at(7, 0) + Duration::minutes(20 * i), 2, 2000.0)).collect();
        trace(&bursts)
    }

    fn device(id: &str, appliance_key: &str, entity: &str) -> Device {
        Device {
            id: id.into(),
            name: format!("{} kettle", id),
            location: Some("Kitchen".into()),
            appliance_key: appliance_key.into(),
            power_entity_id: entity.into(),
            maintenance: Default::default(),
        }
    }

    fn user(devices: Vec<Device>) -> Recipient {
        Recipient {
            id: "u1".into(),
            email: None,
            push_token: Some("ExponentPushToken[u1]".into()),
            notifications_enabled: true,
            rooms: vec![
                Room { name: "Cellar".into(), sensor_id: "sensor.cellar".into() },
                Room { name: "Kitchen".into(), sensor_id: "sensor.kitchen".into() },
            ],
            devices,
        }
    }

    fn build(
        users: Vec<Recipient>,
        traces: Vec<(&str, Vec<PowerSample>)>,
        gateway: FakeGateway,
        settings: Option<SchedulerSettings>,
    ) -> (TestScheduler, Arc<Mutex<Database>>) {
        let config = Config::default();
        let db = Arc::new(Mutex::new(Database::open_in_memory().unwrap()));
        let io = Collaborators {
            users: StaticDirectory::new(users),
            samples: FakeSamples {
                traces: traces.into_iter().map(|(k, v)| (k.to_string(), v)).collect(),
            },
            conditions: FakeConditions,
            history: SqliteHistory::new(Arc::clone(&db), DedupePolicy::from_schedule(&config.schedule)),
            gateway,
        };
        let settings = settings.unwrap_or_else(|| SchedulerSettings::from_config(&config));
        (Scheduler::with_settings(&config, settings, io).unwrap(), db)
    }

    #[tokio::test]
    async fn test_same_notification_twice_is_sent_once() {
        let gateway = FakeGateway::default();
        let (scheduler, db) = build(
            vec![user(vec![device("k1", "kettle", "sensor.k1")])],
            vec![("sensor.k1", long_boil())],
            gateway.clone(),
            None,
        );

        let first = scheduler.run_tick_at(TickKind::Hourly, noon()).await;
        assert_eq!(first.created, 1);
        assert_eq!(first.delivered, 1);

        let later: DateTime<FixedOffset> = at(13, 0).into();
        let second = scheduler.run_tick_at(TickKind::Hourly, later).await;
        assert_eq!(second.created, 0);
        assert_eq!(second.suppressed, 1);

        assert_eq!(gateway.attempts(), 1);
        let db = db.lock().await;
        assert_eq!(db.count().unwrap(), 1);
        let entry = db.list_for_user("u1", 10, at(13, 0)).unwrap().remove(0);
        assert!(entry.delivered);
        assert_eq!(entry.delivery_receipt_id.as_deref(), Some("receipt-1"));
        assert_eq!(entry.notification.kind, NotificationType::Critical);
    }

    #[tokio::test]
    async fn test_failed_delivery_is_not_retried() {
        let gateway = FakeGateway { fail: true, ..Default::default() };
        let (scheduler, db) = build(
            vec![user(vec![device("k1", "kettle", "sensor.k1")])],
            vec![("sensor.k1", long_boil())],
            gateway.clone(),
            None,
        );

        let first = scheduler.run_tick_at(TickKind::Hourly, noon()).await;
        assert_eq!(first.created, 1);
        assert_eq!(first.delivery_failures, 1);

        let second = scheduler.run_tick_at(TickKind::Hourly, noon()).await;
        assert_eq!(second.duplicates, 1);
        assert_eq!(second.created, 0);

        assert_eq!(gateway.attempts(), 1);
        let db = db.lock().await;
        let entry = db.get(1).unwrap().unwrap();
        assert!(!entry.delivered);
    }

    #[tokio::test]
    async fn test_overlapping_ticks_create_one_entry() {
        let gateway = FakeGateway::default();
        let (scheduler, db) = build(
            vec![user(vec![device("k1", "kettle", "sensor.k1")])],
            vec![("sensor.k1", long_boil())],
            gateway.clone(),
            None,
        );

        let (a, b) = tokio::join!(
            scheduler.run_tick_at(TickKind::Hourly, noon()),
            scheduler.run_tick_at(TickKind::Peak, noon()),
        );

        assert_eq!(a.created + b.created, 1);
        assert_eq!(gateway.attempts(), 1);
        assert_eq!(db.lock().await.count().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_unused_device_is_skipped() {
        let gateway = FakeGateway::default();
        let (scheduler, db) = build(
            vec![user(vec![device("k1", "kettle", "sensor.k1")])],
            vec![],
            gateway.clone(),
            None,
        );

        let report = scheduler.run_tick_at(TickKind::Hourly, noon()).await;
        assert_eq!(report.skipped_unused, 1);
        assert_eq!(report.devices_analyzed, 0);
        assert_eq!(gateway.attempts(), 0);
        assert_eq!(db.lock().await.count().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_failing_devices_do_not_stop_others() {
        let (scheduler, _db) = build(
            vec![user(vec![
                device("fridge", "fridge", "sensor.fridge"),
                device("k0", "kettle", "sensor.broken"),
                device("k1", "kettle", "sensor.k1"),
            ])],
            vec![("sensor.k1", long_boil())],
            FakeGateway::default(),
            None,
        );

        let report = scheduler.run_tick_at(TickKind::Hourly, noon()).await;
        assert_eq!(report.failures, 2);
        assert_eq!(report.created, 1);
        assert_eq!(report.delivered, 1);
    }

    #[tokio::test]
    async fn test_slow_query_times_out() {
        let mut settings = SchedulerSettings::from_config(&Config::default());
        settings.query_timeout = StdDuration::from_millis(50);
        let (scheduler, _db) = build(
            vec![user(vec![device("k0", "kettle", "sensor.slow"), device("k1", "kettle", "sensor.k1")])],
            vec![("sensor.k1", long_boil())],
            FakeGateway::default(),
            Some(settings),
        );

        let report = scheduler.run_tick_at(TickKind::Hourly, noon()).await;
        assert_eq!(report.failures, 1);
        assert_eq!(report.delivered, 1);
    }

    #[tokio::test]
    async fn test_peak_tick_leaves_opportunities_to_hourly() {
        let gateway = FakeGateway::default();
        let (scheduler, _db) = build(
            vec![user(vec![device("k1", "kettle", "sensor.k1"), device("k2", "kettle", "sensor.k2")])],
            vec![("sensor.k1", long_boil()), ("sensor.k2", many_boils())],
            gateway.clone(),
            None,
        );

        let peak = scheduler.run_tick_at(TickKind::Peak, noon()).await;
        assert_eq!(peak.not_for_tick, 1);
        assert_eq!(peak.delivered, 1);

        let hourly = scheduler.run_tick_at(TickKind::Hourly, noon()).await;
        assert_eq!(hourly.suppressed, 1);
        assert_eq!(hourly.delivered, 1);

        let attempts = gateway.attempts.lock().unwrap();
        assert_eq!(attempts[0].kind, NotificationType::Critical);
        assert_eq!(attempts[1].kind, NotificationType::Opportunity);
    }

    #[tokio::test]
    async fn test_day_window_follows_local_midnight_after_clock_change() {
        // 23:30 GMT on the 30th belongs to yesterday even though noon on the 31st is BST
        let yesterday = Utc.with_ymd_and_hms(2024, 3, 30, 23, 30, 0).unwrap();
        let this_morning = Utc.with_ymd_and_hms(2024, 3, 31, 8, 0, 0).unwrap();
        let (scheduler, _db) = build(
            vec![user(vec![device("k1", "kettle", "sensor.k1"), device("k2", "kettle", "sensor.k2")])],
            vec![
                ("sensor.k1", trace(&[(yesterday, 6, 2000.0)])),
                ("sensor.k2", trace(&[(this_morning, 6, 2000.0)])),
            ],
            FakeGateway::default(),
            None,
        );

        let now = UkTime.with_ymd_and_hms(2024, 3, 31, 12, 0, 0).unwrap();
        let report = scheduler.run_tick_at(TickKind::Hourly, now).await;
        assert_eq!(report.skipped_unused, 1);
        assert_eq!(report.devices_analyzed, 1);
    }

    #[tokio::test]
    async fn test_user_directory_filters_recipients() {
        let mut muted = user(vec![device("k1", "kettle", "sensor.k1")]);
        muted.notifications_enabled = false;
        let (scheduler, _db) = build(vec![muted], vec![("sensor.k1", long_boil())], FakeGateway::default(), None);

        let report = scheduler.run_tick_at(TickKind::Hourly, noon()).await;
        assert_eq!(report, TickReport::default());
    }

    #[test]
    fn test_room_fallback() {
        let kitchen = EnvironmentalConditions::new(20.0, 50.0, None);
        let garage = EnvironmentalConditions::new(8.0, 70.0, Some(1000.0));
        let rooms = vec![("Kitchen".to_string(), kitchen), ("Garage".to_string(), garage)];

        let mut d = device("k1", "kettle", "sensor.k1");
        d.location = Some("Garage".into());
        assert_eq!(conditions_for(&d, &rooms), garage);

        d.location = Some("Attic".into());
        assert_eq!(conditions_for(&d, &rooms), kitchen);

        assert_eq!(conditions_for(&d, &[]), EnvironmentalConditions::default());
    }

    #[test]
    fn test_delivery_policy() {
        let notification = |kind, priority| Notification {
            title: "t".into(),
            message: "m".into(),
            kind,
            priority,
            action: NotificationAction::ViewDetails,
            recommendations: Vec::new(),
        };
        let critical = notification(NotificationType::Critical, NotificationPriority::High);
        let opportunity = notification(NotificationType::Opportunity, NotificationPriority::Medium);
        let info = notification(NotificationType::Info, NotificationPriority::Low);

        assert!(should_deliver(&critical, TickKind::Peak));
        assert!(should_deliver(&opportunity, TickKind::Hourly));
        assert!(!should_deliver(&opportunity, TickKind::Peak));
        assert!(!should_deliver(&info, TickKind::Hourly));

        assert!(handled_on(&critical, TickKind::Peak));
        assert!(!handled_on(&opportunity, TickKind::Peak));
        assert!(handled_on(&info, TickKind::Hourly));
    }

    #[test]
    fn test_sent_index_keeps_latest() {
        let record = |hour, message: &str| DeliveredRecord {
            device_id: "k1".into(),
            kind: NotificationType::Critical,
            title: "t".into(),
            message: message.into(),
            delivered_at: at(hour, 0),
        };
        let index = sent_index(vec![record(9, "old"), record(11, "new"), record(10, "mid")]);
        assert_eq!(index.len(), 1);
        assert_eq!(index.values().next().unwrap().message, "new");
    }
}
