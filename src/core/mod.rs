//! Core module - configuration, errors and the shared data model

mod config;
mod error;
mod types;

pub use config::{
    ApplianceOverride, Config, DetectionConfig, GeneralConfig, InfluxConfig, PeakWindow,
    PricingConfig, PushConfig, ScheduleConfig,
};
pub use error::{Error, Result};
pub use types::{
    Alert, AlertPriority, Device, EnvironmentalConditions, Factors, MaintenanceInfo, Notification,
    NotificationAction, NotificationPriority, NotificationType, OptimizationResult, PowerSample,
    Recipient, Recommendation, RecommendationPriority, Room, UsageCycle, UsageSummary,
    DEFAULT_PRESSURE_HPA,
};
