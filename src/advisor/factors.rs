//! Environmental correction factors
//!
//! Step functions modelling how far real-world conditions push an
//! appliance away from its nominal energy per cycle.

use super::appliance::ApplianceKind;
use crate::core::{EnvironmentalConditions, Factors};

/// All three factors for one appliance under the given conditions
pub fn factors_for(kind: ApplianceKind, conditions: &EnvironmentalConditions) -> Factors {
    Factors {
        f_t: temperature_factor(kind, conditions.temperature_c),
        f_h: humidity_factor(kind, conditions.humidity_pct),
        f_p: pressure_factor(conditions.pressure_hpa),
    }
}

pub fn temperature_factor(kind: ApplianceKind, temperature: f64) -> f64 {
    match kind {
        ApplianceKind::Kettle => {
            if temperature < 10.0 {
                1.15
            } else if temperature < 15.0 {
                1.10
            } else if temperature > 25.0 {
                0.95
            } else {
                1.0
            }
        }
        ApplianceKind::Dryer => {
            if temperature < 15.0 {
                1.08
            } else if temperature < 18.0 {
                1.05
            } else {
                1.0
            }
        }
        ApplianceKind::AirFryer | ApplianceKind::Toaster => {
            if temperature > 30.0 { 1.05 } else { 1.0 }
        }
        ApplianceKind::Dishwasher => cold_water_step(temperature, 1.25, 1.18, 1.10),
        ApplianceKind::WashingMachine => cold_water_step(temperature, 1.35, 1.25, 1.15),
        ApplianceKind::Cooker => cold_water_step(temperature, 1.20, 1.15, 1.08),
        ApplianceKind::Xbox => {
            if temperature > 28.0 {
                1.10
            } else if temperature > 25.0 {
                1.05
            } else {
                1.0
            }
        }
        ApplianceKind::WaterPurifier => {
            if temperature > 35.0 {
                1.15
            } else if temperature > 30.0 {
                1.10
            } else if temperature < 15.0 {
                1.08
            } else {
                1.0
            }
        }
        ApplianceKind::Microwave | ApplianceKind::CoffeeMachine => 1.0,
    }
}

/// Heating penalty for appliances that warm incoming water: below 10, 15 and 20 °C
fn cold_water_step(temperature: f64, below_10: f64, below_15: f64, below_20: f64) -> f64 {
    if temperature < 10.0 {
        below_10
    } else if temperature < 15.0 {
        below_15
    } else if temperature < 20.0 {
        below_20
    } else {
        1.0
    }
}

pub fn humidity_factor(kind: ApplianceKind, humidity: f64) -> f64 {
    match kind {
        ApplianceKind::Dryer => {
            if humidity > 80.0 {
                1.25
            } else if humidity > 70.0 {
                1.20
            } else if humidity > 60.0 {
                1.15
            } else if humidity < 40.0 {
                0.95
            } else {
                1.0
            }
        }
        ApplianceKind::Dishwasher => {
            if humidity > 70.0 { 1.08 } else { 1.0 }
        }
        ApplianceKind::WashingMachine => {
            if humidity > 75.0 { 1.05 } else { 1.0 }
        }
        ApplianceKind::Cooker => {
            if humidity > 80.0 {
                1.15
            } else if humidity > 70.0 {
                1.10
            } else {
                1.0
            }
        }
        _ => 1.0,
    }
}

/// Reserved; pressure has no modelled effect yet
pub fn pressure_factor(_pressure_hpa: f64) -> f64 {
    1.0
}
