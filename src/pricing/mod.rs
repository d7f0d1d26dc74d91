//! Pricing engine for the estimated-cost display figure
//!
//! Supports two tariff modes:
//! - Simple: flat rate per kWh
//! - Peak/Off-peak: the peak rate inside the configured peak window,
//!   the off-peak rate everywhere else

use crate::core::{PeakWindow, PricingConfig};
use chrono::NaiveTime;

/// Pricing engine that turns kWh into money
#[derive(Debug, Clone)]
pub struct PricingEngine {
    config: PricingConfig,
    peak: PeakWindow,
}

impl PricingEngine {
    /// Create a new pricing engine; `peak` is the shared peak-price window
    pub fn new(config: &PricingConfig, peak: PeakWindow) -> Self {
        Self {
            config: config.clone(),
            peak,
        }
    }

    /// Rate per kWh in force at a local wall-clock time
    pub fn rate_at(&self, time: NaiveTime) -> f64 {
        match self.config.mode.as_str() {
            "simple" => self.config.rate_per_kwh,
            "peak_offpeak" => {
                if self.peak.contains(time) {
                    self.config.peak_rate_per_kwh
                } else {
                    self.config.offpeak_rate_per_kwh
                }
            }
            other => {
                log::debug!("Unknown pricing mode '{}', using flat rate", other);
                self.config.rate_per_kwh
            }
        }
    }

    /// Cost of `kwh` at the rate in force at `time`
    pub fn cost_at(&self, kwh: f64, time: NaiveTime) -> f64 {
        kwh * self.rate_at(time)
    }

    /// Rounded to the penny, for display and persistence
    pub fn estimated_cost(&self, kwh: f64, time: NaiveTime) -> f64 {
        (self.cost_at(kwh, time) * 100.0).round() / 100.0
    }

    pub fn format_cost(&self, amount: f64) -> String {
        format!("{}{:.2}", self.config.currency_symbol, amount)
    }
}
