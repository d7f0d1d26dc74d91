//! Common types used across the advisor

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Sea-level pressure used when a room has no barometer
pub const DEFAULT_PRESSURE_HPA: f64 = 101.3;

/// A single power sample for one device
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PowerSample {
    pub timestamp: DateTime<Utc>,
    pub watts: f64,
}

impl PowerSample {
    pub fn new(timestamp: DateTime<Utc>, watts: f64) -> Self {
        Self { timestamp, watts }
    }
}

/// One inferred period of appliance activity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageCycle {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    /// Active minutes. After phase-merge this is the sum of the merged
    /// cycles, not the wall-clock span between `start` and `end`.
    pub duration_minutes: f64,
    pub energy_kwh: f64,
    /// Still running when the sample window ended
    #[serde(default)]
    pub partial: bool,
}

impl UsageCycle {
    /// Mean power over the active duration
    pub fn average_power_watts(&self) -> f64 {
        if self.duration_minutes <= 0.0 {
            return 0.0;
        }
        self.energy_kwh * 1000.0 / (self.duration_minutes / 60.0)
    }
}

/// Derived per-device usage for the current local day (never persisted)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UsageSummary {
    /// Energy of the most recent cycle (EAEC) in kWh
    pub last_cycle_energy_kwh: f64,
    /// Sum of all cycle energies in the window
    pub daily_total_energy_kwh: f64,
    pub cycle_count: u32,
    pub avg_duration_minutes: f64,
    pub short_cycle_count: u32,
    pub is_peak_time: bool,
    pub last_cycle_duration_minutes: f64,
    pub last_cycle_avg_power_watts: f64,
    /// Mean of non-zero readings at or below the power threshold
    pub standby_power_watts: f64,
    /// Cycle time spent between midnight and 05:00 local
    pub late_night_hours: f64,
}

impl UsageSummary {
    /// A device with no cycles and no energy today gets no notification
    pub fn is_unused(&self) -> bool {
        self.cycle_count == 0 && self.daily_total_energy_kwh == 0.0
    }
}

/// Ambient readings for the room a device lives in
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EnvironmentalConditions {
    pub temperature_c: f64,
    pub humidity_pct: f64,
    #[serde(default = "default_pressure")]
    pub pressure_hpa: f64,
}

fn default_pressure() -> f64 { DEFAULT_PRESSURE_HPA }

impl EnvironmentalConditions {
    pub fn new(temperature_c: f64, humidity_pct: f64, pressure_hpa: Option<f64>) -> Self {
        Self {
            temperature_c,
            humidity_pct,
            pressure_hpa: pressure_hpa.unwrap_or(DEFAULT_PRESSURE_HPA),
        }
    }
}

impl Default for EnvironmentalConditions {
    /// Used when no room of a user has usable sensor data
    fn default() -> Self {
        Self {
            temperature_c: 22.0,
            humidity_pct: 50.0,
            pressure_hpa: DEFAULT_PRESSURE_HPA,
        }
    }
}

/// Per-device maintenance metadata that power samples cannot reveal
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MaintenanceInfo {
    pub filter_age_days: f64,
    pub pre_filter_age_days: f64,
    pub membrane_age_days: f64,
    pub uv_lamp_age_days: f64,
    pub days_since_service: f64,
    pub tank_sanitization_age_days: f64,
    pub tds_in_ppm: f64,
    pub tds_out_ppm: f64,
    pub waste_ratio: f64,
    pub continuous_run_minutes: f64,
    pub keep_warm_hours: f64,
    pub standby_minutes: f64,
    pub has_mineralizer: bool,
}

/// Alert urgency, most urgent first
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertPriority {
    Critical,
    Warning,
    Caution,
    Notice,
}

impl AlertPriority {
    /// Contribution to the potential savings percentage
    pub fn savings_weight(self) -> u32 {
        match self {
            AlertPriority::Critical => 20,
            AlertPriority::Warning => 10,
            AlertPriority::Caution => 5,
            AlertPriority::Notice => 2,
        }
    }

    /// Coloured square shown in front of alert titles
    pub fn severity_marker(self) -> &'static str {
        match self {
            AlertPriority::Critical => "\u{1F7E5}",
            AlertPriority::Warning => "\u{1F7E7}",
            AlertPriority::Caution => "\u{1F7E8}",
            AlertPriority::Notice => "\u{1F7E6}",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AlertPriority::Critical => "critical",
            AlertPriority::Warning => "warning",
            AlertPriority::Caution => "caution",
            AlertPriority::Notice => "notice",
        }
    }
}

/// A rule that fired for the current facts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub severity_level: String,
    pub priority: AlertPriority,
    pub scenario: String,
    pub message: String,
}

/// Recommendation ranking, highest first when sorted descending
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecommendationPriority {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    /// Category such as "efficiency", "timing" or "maintenance"
    pub kind: String,
    pub title: String,
    pub message: String,
    /// Expected saving in percent
    pub potential_savings: u32,
    pub priority: RecommendationPriority,
}

/// Environmental correction multipliers
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Factors {
    pub f_t: f64,
    pub f_h: f64,
    pub f_p: f64,
}

impl Factors {
    pub fn combined(&self) -> f64 {
        self.f_t * self.f_h * self.f_p
    }
}

/// Output of the optimization engine for one appliance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizationResult {
    /// Canonical appliance key
    pub appliance_key: String,
    pub base_energy_kwh: f64,
    pub adjusted_energy_kwh: f64,
    pub factors: Factors,
    /// Signed; negative when conditions make the appliance cheaper than nominal
    pub efficiency_loss_pct: i32,
    pub efficiency_pct: u32,
    pub alerts: Vec<Alert>,
    pub recommendations: Vec<Recommendation>,
    pub potential_savings_pct: u32,
}

impl OptimizationResult {
    /// First alert in table order
    pub fn headline(&self) -> Option<&Alert> {
        self.alerts.first()
    }

    pub fn has_alert(&self, priority: AlertPriority) -> bool {
        self.alerts.iter().any(|a| a.priority == priority)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationType {
    Critical,
    Opportunity,
    Info,
    None,
}

impl NotificationType {
    pub fn as_str(self) -> &'static str {
        match self {
            NotificationType::Critical => "critical",
            NotificationType::Opportunity => "opportunity",
            NotificationType::Info => "info",
            NotificationType::None => "none",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "critical" => Some(NotificationType::Critical),
            "opportunity" => Some(NotificationType::Opportunity),
            "info" => Some(NotificationType::Info),
            "none" => Some(NotificationType::None),
            _ => None,
        }
    }
}

impl fmt::Display for NotificationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Notification priority. Declaration order gives `High > Medium > Low > None`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationPriority {
    None,
    Low,
    Medium,
    High,
}

impl NotificationPriority {
    pub fn as_str(self) -> &'static str {
        match self {
            NotificationPriority::High => "high",
            NotificationPriority::Medium => "medium",
            NotificationPriority::Low => "low",
            NotificationPriority::None => "none",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "high" => Some(NotificationPriority::High),
            "medium" => Some(NotificationPriority::Medium),
            "low" => Some(NotificationPriority::Low),
            "none" => Some(NotificationPriority::None),
            _ => None,
        }
    }
}

/// Call to action attached to a notification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationAction {
    ViewDetails,
    SeeTips,
    LearnMore,
    None,
}

/// The single message produced for one device per tick
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub title: String,
    pub message: String,
    #[serde(rename = "type")]
    pub kind: NotificationType,
    pub priority: NotificationPriority,
    pub action: NotificationAction,
    #[serde(default)]
    pub recommendations: Vec<Recommendation>,
}

impl Notification {
    /// Only `none` notifications are never persisted or delivered
    pub fn is_actionable(&self) -> bool {
        self.kind != NotificationType::None
    }
}

/// A room whose sensor supplies environmental conditions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Room {
    pub name: String,
    /// Sensor prefix; `_temperature`, `_humidity` and `_pressure` are appended
    pub sensor_id: String,
}

/// A metered appliance owned by a user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Device {
    pub id: String,
    pub name: String,
    /// Room name; falls back to the first room with data
    #[serde(default)]
    pub location: Option<String>,
    pub appliance_key: String,
    pub power_entity_id: String,
    #[serde(default)]
    pub maintenance: MaintenanceInfo,
}

/// A user that may receive notifications
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recipient {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub push_token: Option<String>,
    #[serde(default = "default_true")]
    pub notifications_enabled: bool,
    #[serde(default)]
    pub rooms: Vec<Room>,
    #[serde(default)]
    pub devices: Vec<Device>,
}

fn default_true() -> bool { true }

impl Recipient {
    /// Delivery enabled and an address on file
    pub fn can_receive(&self) -> bool {
        self.notifications_enabled
            && self.push_token.as_deref().map_or(false, |t| !t.trim().is_empty())
    }
}
