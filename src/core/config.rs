//! Configuration management

use crate::core::{Error, Recipient, Result};
use chrono::{NaiveTime, Timelike};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

const APP_DIR: &str = "appliance-advisor";

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub schedule: ScheduleConfig,
    #[serde(default)]
    pub detection: DetectionConfig,
    #[serde(default)]
    pub pricing: PricingConfig,
    /// Per-appliance overrides keyed by appliance key (aliases allowed)
    #[serde(default)]
    pub appliances: BTreeMap<String, ApplianceOverride>,
    #[serde(default)]
    pub influx: InfluxConfig,
    #[serde(default)]
    pub push: PushConfig,
    #[serde(default)]
    pub users: Vec<Recipient>,
}

impl Config {
    /// Get the configuration file path
    pub fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| Error::Config("Could not determine config directory".to_string()))?;

        let app_config_dir = config_dir.join(APP_DIR);

        if !app_config_dir.exists() {
            fs::create_dir_all(&app_config_dir)?;
        }

        Ok(app_config_dir.join("config.toml"))
    }

    /// Load configuration from the default location, writing defaults on first run
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;

        if !path.exists() {
            let config = Self::default();
            config.save_to(&path)?;
            return Ok(config);
        }

        Self::load_from(&path)
    }

    /// Load and validate configuration from an explicit file
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("Failed to parse config: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| Error::Serialization(e.to_string()))?;
        fs::write(path, content)?;
        Ok(())
    }

    /// Reject values the scheduler cannot run with
    pub fn validate(&self) -> Result<()> {
        self.schedule.peak_window()?;

        if self.schedule.peak_interval_minutes == 0 {
            return Err(Error::Config("peak_interval_minutes must be positive".to_string()));
        }
        if self.schedule.dedupe_window_hours == 0 || self.schedule.history_ttl_days == 0 {
            return Err(Error::Config("dedupe window and history TTL must be positive".to_string()));
        }
        if self.general.max_concurrent_users == 0 {
            return Err(Error::Config("max_concurrent_users must be at least 1".to_string()));
        }
        for (key, o) in &self.appliances {
            let negative = [o.base_energy_kwh, o.power_threshold_w, o.min_cycle_duration_s, o.max_gap_s]
                .iter()
                .flatten()
                .any(|v| *v < 0.0);
            if negative {
                return Err(Error::Config(format!("Negative override for appliance '{}'", key)));
            }
        }
        Ok(())
    }

    /// Path of the notification history database
    pub fn database_path(&self) -> Result<PathBuf> {
        if let Some(path) = &self.general.database_path {
            return Ok(path.clone());
        }

        let data_dir = dirs::data_dir()
            .ok_or_else(|| Error::Config("Could not determine data directory".to_string()))?;
        let app_dir = data_dir.join(APP_DIR);
        fs::create_dir_all(&app_dir)?;

        Ok(app_dir.join("history.db"))
    }
}

/// Process-wide settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Override for the history database file
    #[serde(default)]
    pub database_path: Option<PathBuf>,
    /// Users analysed in parallel within one tick
    #[serde(default = "default_max_concurrent_users")]
    pub max_concurrent_users: usize,
    /// Per-call budget for sample and condition queries
    #[serde(default = "default_query_timeout")]
    pub query_timeout_secs: u64,
    /// Per-call budget for push delivery
    #[serde(default = "default_delivery_timeout")]
    pub delivery_timeout_secs: u64,
}

fn default_max_concurrent_users() -> usize { 4 }
fn default_query_timeout() -> u64 { 10 }
fn default_delivery_timeout() -> u64 { 10 }

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            database_path: None,
            max_concurrent_users: default_max_concurrent_users(),
            query_timeout_secs: default_query_timeout(),
            delivery_timeout_secs: default_delivery_timeout(),
        }
    }
}

/// Tick cadence and deduplication windows
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleConfig {
    #[serde(default = "default_true")]
    pub hourly_enabled: bool,
    #[serde(default = "default_true")]
    pub peak_enabled: bool,
    /// Peak tick period inside the peak window
    #[serde(default = "default_peak_interval")]
    pub peak_interval_minutes: u32,
    /// Peak window start (HH:MM, local time)
    #[serde(default = "default_peak_start")]
    pub peak_start: String,
    /// Peak window end (HH:MM, local time, exclusive)
    #[serde(default = "default_peak_end")]
    pub peak_end: String,
    /// Look-back for the in-memory delivered-key cache
    #[serde(default = "default_session_window")]
    pub session_window_hours: u32,
    /// Minimum spacing between two identical notifications
    #[serde(default = "default_dedupe_window")]
    pub dedupe_window_hours: u32,
    #[serde(default = "default_history_ttl")]
    pub history_ttl_days: u32,
    /// Message characters compared to decide if content materially changed
    #[serde(default = "default_prefix_chars")]
    pub message_prefix_chars: usize,
}

fn default_true() -> bool { true }
fn default_peak_interval() -> u32 { 30 }
fn default_peak_start() -> String { "16:00".to_string() }
fn default_peak_end() -> String { "19:00".to_string() }
fn default_session_window() -> u32 { 24 }
fn default_dedupe_window() -> u32 { 12 }
fn default_history_ttl() -> u32 { 7 }
fn default_prefix_chars() -> usize { 50 }

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            hourly_enabled: true,
            peak_enabled: true,
            peak_interval_minutes: default_peak_interval(),
            peak_start: default_peak_start(),
            peak_end: default_peak_end(),
            session_window_hours: default_session_window(),
            dedupe_window_hours: default_dedupe_window(),
            history_ttl_days: default_history_ttl(),
            message_prefix_chars: default_prefix_chars(),
        }
    }
}

impl ScheduleConfig {
    /// The single peak-price window shared by tariffs, facts and the peak tick
    pub fn peak_window(&self) -> Result<PeakWindow> {
        PeakWindow::parse(&self.peak_start, &self.peak_end)
    }
}

/// Daily local-time window `[start, end)`; may wrap past midnight
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeakWindow {
    start_minute: u32,
    end_minute: u32,
}

impl PeakWindow {
    pub fn parse(start: &str, end: &str) -> Result<Self> {
        Ok(Self {
            start_minute: parse_time(start)?,
            end_minute: parse_time(end)?,
        })
    }

    pub fn from_minutes(start_minute: u32, end_minute: u32) -> Self {
        Self { start_minute: start_minute % 1440, end_minute: end_minute % 1440 }
    }

    pub fn start_minute(&self) -> u32 {
        self.start_minute
    }

    pub fn end_minute(&self) -> u32 {
        self.end_minute
    }

    /// Whether a wall-clock time falls inside the window
    pub fn contains(&self, time: NaiveTime) -> bool {
        let current = time.hour() * 60 + time.minute();

        if self.start_minute > self.end_minute {
            // Overnight window
            current >= self.start_minute || current < self.end_minute
        } else {
            current >= self.start_minute && current < self.end_minute
        }
    }
}

fn parse_time(time_str: &str) -> Result<u32> {
    let invalid = || Error::Config(format!("Invalid time '{}', expected HH:MM", time_str));

    let (h, m) = time_str.trim().split_once(':').ok_or_else(invalid)?;
    let hours: u32 = h.parse().map_err(|_| invalid())?;
    let minutes: u32 = m.parse().map_err(|_| invalid())?;
    if hours > 23 || minutes > 59 {
        return Err(invalid());
    }
    Ok(hours * 60 + minutes)
}

/// Cycle detection tuning shared by all appliances
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionConfig {
    /// Multi-phase cycles closer than this are merged into one operation
    #[serde(default = "default_phase_merge_gap")]
    pub phase_merge_gap_minutes: f64,
    /// Cycles shorter than this count as short uses
    #[serde(default = "default_short_cycle")]
    pub short_cycle_minutes: f64,
}

fn default_phase_merge_gap() -> f64 { 30.0 }
fn default_short_cycle() -> f64 { 2.0 }

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            phase_merge_gap_minutes: default_phase_merge_gap(),
            short_cycle_minutes: default_short_cycle(),
        }
    }
}

/// Tariff used for the estimated-cost display figure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PricingConfig {
    /// Pricing mode: "simple" or "peak_offpeak"
    #[serde(default = "default_pricing_mode")]
    pub mode: String,
    #[serde(default = "default_currency")]
    pub currency: String,
    #[serde(default = "default_currency_symbol")]
    pub currency_symbol: String,
    /// Flat rate per kWh
    #[serde(default = "default_rate")]
    pub rate_per_kwh: f64,
    /// Rate inside the peak window
    #[serde(default = "default_peak_rate")]
    pub peak_rate_per_kwh: f64,
    /// Rate outside the peak window
    #[serde(default = "default_offpeak_rate")]
    pub offpeak_rate_per_kwh: f64,
}

fn default_pricing_mode() -> String { "simple".to_string() }
fn default_currency() -> String { "GBP".to_string() }
fn default_currency_symbol() -> String { "\u{00A3}".to_string() } // Pound sign
fn default_rate() -> f64 { 0.2683 }
fn default_peak_rate() -> f64 { 0.28 }
fn default_offpeak_rate() -> f64 { 0.13 }

impl Default for PricingConfig {
    fn default() -> Self {
        Self {
            mode: default_pricing_mode(),
            currency: default_currency(),
            currency_symbol: default_currency_symbol(),
            rate_per_kwh: default_rate(),
            peak_rate_per_kwh: default_peak_rate(),
            offpeak_rate_per_kwh: default_offpeak_rate(),
        }
    }
}

/// Optional per-appliance tuning; unset fields keep the built-in profile
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ApplianceOverride {
    #[serde(default)]
    pub base_energy_kwh: Option<f64>,
    #[serde(default)]
    pub power_threshold_w: Option<f64>,
    #[serde(default)]
    pub min_cycle_duration_s: Option<f64>,
    #[serde(default)]
    pub max_gap_s: Option<f64>,
}

/// Time-series store connection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InfluxConfig {
    #[serde(default = "default_influx_url")]
    pub url: String,
    #[serde(default = "default_influx_db")]
    pub database: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    /// Measurement holding power readings
    #[serde(default = "default_power_measurement")]
    pub power_measurement: String,
}

fn default_influx_url() -> String { "http://localhost:8086".to_string() }
fn default_influx_db() -> String { "homeassistant".to_string() }
fn default_power_measurement() -> String { "W".to_string() }

impl Default for InfluxConfig {
    fn default() -> Self {
        Self {
            url: default_influx_url(),
            database: default_influx_db(),
            username: None,
            password: None,
            power_measurement: default_power_measurement(),
        }
    }
}

/// Push gateway endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushConfig {
    #[serde(default = "default_push_endpoint")]
    pub endpoint: String,
}

fn default_push_endpoint() -> String { "https://exp.host/--/api/v2/push/send".to_string() }

impl Default for PushConfig {
    fn default() -> Self {
        Self { endpoint: default_push_endpoint() }
    }
}
