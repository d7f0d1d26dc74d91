//! Appliance catalogue
//!
//! Every supported appliance class has one immutable [`ApplianceProfile`].
//! Legacy spellings (`washing_machine`, `gaming_console`, `water_purifier`)
//! resolve to the same canonical profile.

use crate::core::{ApplianceOverride, Error, Result};
use crate::usage::DetectionParams;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Canonical appliance classes
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApplianceKind {
    Dryer,
    Kettle,
    Microwave,
    CoffeeMachine,
    AirFryer,
    Toaster,
    Dishwasher,
    WashingMachine,
    Cooker,
    Xbox,
    WaterPurifier,
}

impl ApplianceKind {
    pub const ALL: [ApplianceKind; 11] = [
        ApplianceKind::Dryer,
        ApplianceKind::Kettle,
        ApplianceKind::Microwave,
        ApplianceKind::CoffeeMachine,
        ApplianceKind::AirFryer,
        ApplianceKind::Toaster,
        ApplianceKind::Dishwasher,
        ApplianceKind::WashingMachine,
        ApplianceKind::Cooker,
        ApplianceKind::Xbox,
        ApplianceKind::WaterPurifier,
    ];

    /// Canonical configuration key
    pub fn key(self) -> &'static str {
        match self {
            ApplianceKind::Dryer => "dryer",
            ApplianceKind::Kettle => "kettle",
            ApplianceKind::Microwave => "microwave",
            ApplianceKind::CoffeeMachine => "coffeemachine",
            ApplianceKind::AirFryer => "airfryer",
            ApplianceKind::Toaster => "toaster",
            ApplianceKind::Dishwasher => "dishwasher",
            ApplianceKind::WashingMachine => "washingmachine",
            ApplianceKind::Cooker => "cooker",
            ApplianceKind::Xbox => "xbox",
            ApplianceKind::WaterPurifier => "waterpurifier",
        }
    }

    /// Name shown to users
    pub fn display_name(self) -> &'static str {
        match self {
            ApplianceKind::Dryer => "Dryer",
            ApplianceKind::Kettle => "Kettle",
            ApplianceKind::Microwave => "Microwave",
            ApplianceKind::CoffeeMachine => "Coffee Machine",
            ApplianceKind::AirFryer => "Air Fryer",
            ApplianceKind::Toaster => "Toaster",
            ApplianceKind::Dishwasher => "Dishwasher",
            ApplianceKind::WashingMachine => "Washing Machine",
            ApplianceKind::Cooker => "Rice Cooker",
            ApplianceKind::Xbox => "Xbox",
            ApplianceKind::WaterPurifier => "Water Purifier",
        }
    }

    /// Appliances whose single operation spans several power phases
    /// (fill, heat, wash, rinse, spin, tumble) separated by pauses.
    pub fn is_multi_phase(self) -> bool {
        matches!(
            self,
            ApplianceKind::WashingMachine | ApplianceKind::Dishwasher | ApplianceKind::Dryer
        )
    }
}

impl fmt::Display for ApplianceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for ApplianceKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let kind = match s.trim().to_ascii_lowercase().as_str() {
            "dryer" => ApplianceKind::Dryer,
            "kettle" => ApplianceKind::Kettle,
            "microwave" => ApplianceKind::Microwave,
            "coffeemachine" | "coffee_machine" => ApplianceKind::CoffeeMachine,
            "airfryer" | "air_fryer" => ApplianceKind::AirFryer,
            "toaster" => ApplianceKind::Toaster,
            "dishwasher" => ApplianceKind::Dishwasher,
            "washingmachine" | "washing_machine" => ApplianceKind::WashingMachine,
            "cooker" | "rice_cooker" => ApplianceKind::Cooker,
            "xbox" | "gaming_console" | "gamingconsole" => ApplianceKind::Xbox,
            "waterpurifier" | "water_purifier" => ApplianceKind::WaterPurifier,
            _ => return Err(Error::UnknownAppliance(s.to_string())),
        };
        Ok(kind)
    }
}

/// Immutable per-appliance parameters
#[derive(Debug, Clone, PartialEq)]
pub struct ApplianceProfile {
    pub kind: ApplianceKind,
    /// Nominal energy of one cycle in kWh
    pub base_energy_kwh: f64,
    /// Readings above this many watts count as active
    pub power_threshold_w: f64,
    /// Shorter closed cycles are discarded as noise
    pub min_cycle_duration_s: f64,
    /// Longest below-threshold dip that does not end a cycle
    pub max_gap_s: f64,
}

impl ApplianceProfile {
    /// Built-in profile for an appliance class
    pub fn builtin(kind: ApplianceKind) -> Self {
        // (base kWh, threshold W, min cycle s, max gap s)
        let (base, threshold, min_cycle, max_gap) = match kind {
            ApplianceKind::Dryer => (3.0, 100.0, 600.0, 300.0),
            ApplianceKind::Kettle => (0.12, 1000.0, 30.0, 60.0),
            ApplianceKind::Microwave => (0.3, 300.0, 20.0, 30.0),
            ApplianceKind::CoffeeMachine => (0.1, 200.0, 30.0, 60.0),
            ApplianceKind::AirFryer => (1.2, 300.0, 120.0, 120.0),
            ApplianceKind::Toaster => (0.08, 300.0, 30.0, 30.0),
            ApplianceKind::Dishwasher => (1.2, 10.0, 600.0, 900.0),
            ApplianceKind::WashingMachine => (0.9, 10.0, 600.0, 600.0),
            ApplianceKind::Cooker => (0.25, 50.0, 300.0, 300.0),
            ApplianceKind::Xbox => (0.15, 30.0, 300.0, 300.0),
            ApplianceKind::WaterPurifier => (0.25, 10.0, 60.0, 120.0),
        };

        Self {
            kind,
            base_energy_kwh: base,
            power_threshold_w: threshold,
            min_cycle_duration_s: min_cycle,
            max_gap_s: max_gap,
        }
    }

    pub fn detection_params(&self) -> DetectionParams {
        DetectionParams {
            power_threshold_w: self.power_threshold_w,
            min_cycle_duration_s: self.min_cycle_duration_s,
            max_gap_s: self.max_gap_s,
        }
    }

    fn with_override(mut self, o: &ApplianceOverride) -> Self {
        if let Some(v) = o.base_energy_kwh {
            self.base_energy_kwh = v;
        }
        if let Some(v) = o.power_threshold_w {
            self.power_threshold_w = v;
        }
        if let Some(v) = o.min_cycle_duration_s {
            self.min_cycle_duration_s = v;
        }
        if let Some(v) = o.max_gap_s {
            self.max_gap_s = v;
        }
        self
    }
}

/// Lookup from appliance key (or alias) to profile
#[derive(Debug, Clone)]
pub struct ApplianceRegistry {
    profiles: BTreeMap<ApplianceKind, ApplianceProfile>,
}

impl ApplianceRegistry {
    /// Registry with every built-in profile
    pub fn builtin() -> Self {
        let profiles = ApplianceKind::ALL
            .iter()
            .map(|&k| (k, ApplianceProfile::builtin(k)))
            .collect();
        Self { profiles }
    }

    /// Built-in profiles with configuration overrides applied.
    /// Overrides for unknown appliances are logged and skipped.
    pub fn with_overrides(overrides: &BTreeMap<String, ApplianceOverride>) -> Self {
        let mut registry = Self::builtin();
        for (key, o) in overrides {
            let kind: ApplianceKind = match key.parse() {
                Ok(kind) => kind,
                Err(e) => {
                    log::warn!("Ignoring override [appliances.{}]: {}", key, e);
                    continue;
                }
            };
            if let Some(profile) = registry.profiles.remove(&kind) {
                registry.profiles.insert(kind, profile.with_override(o));
            }
        }
        registry
    }

    /// Resolve a raw key, failing with `UnknownAppliance` if nothing matches
    pub fn get(&self, appliance_key: &str) -> Result<&ApplianceProfile> {
        let kind: ApplianceKind = appliance_key.parse()?;
        self.profiles
            .get(&kind)
            .ok_or_else(|| Error::UnknownAppliance(appliance_key.to_string()))
    }

    pub fn profile(&self, kind: ApplianceKind) -> Option<&ApplianceProfile> {
        self.profiles.get(&kind)
    }
}

impl Default for ApplianceRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aliases_resolve_to_canonical() {
        assert_eq!("washing_machine".parse::<ApplianceKind>().unwrap(), ApplianceKind::WashingMachine);
        assert_eq!("gaming_console".parse::<ApplianceKind>().unwrap(), ApplianceKind::Xbox);
        assert_eq!("water_purifier".parse::<ApplianceKind>().unwrap(), ApplianceKind::WaterPurifier);
        assert_eq!("Kettle".parse::<ApplianceKind>().unwrap(), ApplianceKind::Kettle);
    }

    #[test]
    fn test_unknown_key_is_configuration_error() {
        let registry = ApplianceRegistry::builtin();
        match registry.get("fridge") {
            Err(Error::UnknownAppliance(key)) => assert_eq!(key, "fridge"),
            other => panic!("expected UnknownAppliance, got {:?}", other),
        }
    }

    #[test]
    fn test_overrides_apply_to_alias_target() {
        let mut overrides = BTreeMap::new();
        overrides.insert(
            "washing_machine".to_string(),
            ApplianceOverride { base_energy_kwh: Some(1.1), ..Default::default() },
        );

        let registry = ApplianceRegistry::with_overrides(&overrides);
        let profile = registry.get("washingmachine").unwrap();
        assert_eq!(profile.base_energy_kwh, 1.1);
        assert_eq!(profile.power_threshold_w, 10.0);
    }

    #[test]
    fn test_misspelled_override_is_skipped() {
        let mut overrides = BTreeMap::new();
        overrides.insert(
            "ketle".to_string(),
            ApplianceOverride { base_energy_kwh: Some(9.0), ..Default::default() },
        );
        overrides.insert(
            "kettle".to_string(),
            ApplianceOverride { base_energy_kwh: Some(0.14), ..Default::default() },
        );

        let registry = ApplianceRegistry::with_overrides(&overrides);
        assert_eq!(registry.get("kettle").unwrap().base_energy_kwh, 0.14);
        assert!(registry.get("ketle").is_err());
    }

    #[test]
    fn test_builtin_baselines() {
        let registry = ApplianceRegistry::builtin();
        assert_eq!(registry.get("kettle").unwrap().base_energy_kwh, 0.12);
        assert_eq!(registry.get("dryer").unwrap().base_energy_kwh, 3.0);
        assert!(ApplianceKind::Dishwasher.is_multi_phase());
        assert!(!ApplianceKind::Kettle.is_multi_phase());
    }
}
