//! Advisor module - efficiency scoring, alert rules and notification selection
//!
//! [`OptimizationEngine::evaluate`] is a pure function of the appliance key,
//! ambient conditions and the day's usage: identical inputs always produce an
//! identical [`OptimizationResult`].

mod appliance;
mod factors;
mod notification;
mod recommendations;
mod rules;

pub use appliance::{ApplianceKind, ApplianceProfile, ApplianceRegistry};
pub use factors::{factors_for, humidity_factor, pressure_factor, temperature_factor};
pub use notification::{
    compose, efficiency_action, general_tip, savings_hint, LOW_EFFICIENCY_PCT,
    OPPORTUNITY_SAVINGS_PCT,
};
pub use recommendations::recommendations_for;
pub use rules::{evaluate as evaluate_rules, rules_for, Fact, Rule};

use crate::core::{
    AlertPriority, EnvironmentalConditions, MaintenanceInfo, Notification, OptimizationResult,
    Result, UsageSummary,
};
use serde::Serialize;

/// Upper bound on the advertised potential saving
pub const MAX_POTENTIAL_SAVINGS_PCT: u32 = 60;

/// One appliance to analyse in a batch
#[derive(Debug, Clone)]
pub struct BatchInput {
    pub appliance_key: String,
    pub conditions: EnvironmentalConditions,
    pub usage: UsageSummary,
    pub maintenance: MaintenanceInfo,
}

/// Result of one batch entry; failures keep the key and the reason
#[derive(Debug, Clone)]
pub enum BatchOutcome {
    Analyzed {
        optimization: OptimizationResult,
        notification: Notification,
    },
    Failed {
        appliance_key: String,
        error: String,
    },
}

/// Aggregate figures across a batch
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SummaryStats {
    pub total_appliances: usize,
    pub successful: usize,
    pub total_alerts: usize,
    pub critical_alerts: usize,
    pub total_potential_savings: u32,
    pub average_efficiency: u32,
}

/// Optimization engine
#[derive(Debug, Clone, Default)]
pub struct OptimizationEngine {
    registry: ApplianceRegistry,
}

impl OptimizationEngine {
    pub fn new(registry: ApplianceRegistry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &ApplianceRegistry {
        &self.registry
    }

    /// Score an appliance with no maintenance metadata
    pub fn evaluate(
        &self,
        appliance_key: &str,
        conditions: &EnvironmentalConditions,
        usage: &UsageSummary,
    ) -> Result<OptimizationResult> {
        self.evaluate_with_maintenance(appliance_key, conditions, usage, &MaintenanceInfo::default())
    }

    pub fn evaluate_with_maintenance(
        &self,
        appliance_key: &str,
        conditions: &EnvironmentalConditions,
        usage: &UsageSummary,
        maintenance: &MaintenanceInfo,
    ) -> Result<OptimizationResult> {
        let profile = self.registry.get(appliance_key)?;
        let kind = profile.kind;

        let factors = factors_for(kind, conditions);
        let base = profile.base_energy_kwh;
        let adjusted = base * factors.combined();
        let loss = efficiency_loss_pct(base, adjusted);
        let efficiency = (100 - loss.abs()).clamp(0, 100) as u32;

        let fact = Fact::new(conditions, usage, &factors, adjusted, maintenance);
        let alerts = rules::evaluate(&rules_for(kind), &fact);

        let weights: u32 = alerts.iter().map(|a| a.priority.savings_weight()).sum();
        let savings = (loss.unsigned_abs() + weights).min(MAX_POTENTIAL_SAVINGS_PCT);
        let recommendations = recommendations_for(kind, conditions, &alerts);

        log::debug!(
            "{}: adjusted {:.3} kWh, efficiency {}%, {} alerts",
            kind,
            adjusted,
            efficiency,
            alerts.len()
        );

        Ok(OptimizationResult {
            appliance_key: kind.key().to_string(),
            base_energy_kwh: base,
            adjusted_energy_kwh: adjusted,
            factors,
            efficiency_loss_pct: loss,
            efficiency_pct: efficiency,
            alerts,
            recommendations,
            potential_savings_pct: savings,
        })
    }

    /// Select the single notification for a result
    pub fn notify(&self, result: &OptimizationResult) -> Result<Notification> {
        let profile = self.registry.get(&result.appliance_key)?;
        Ok(compose(profile.kind, result))
    }

    /// Evaluate several appliances; one failure does not stop the others
    pub fn batch(&self, inputs: &[BatchInput]) -> Vec<BatchOutcome> {
        inputs
            .iter()
            .map(|input| {
                let outcome = self
                    .evaluate_with_maintenance(
                        &input.appliance_key,
                        &input.conditions,
                        &input.usage,
                        &input.maintenance,
                    )
                    .and_then(|optimization| {
                        let notification = self.notify(&optimization)?;
                        Ok((optimization, notification))
                    });

                match outcome {
                    Ok((optimization, notification)) => BatchOutcome::Analyzed { optimization, notification },
                    Err(e) => {
                        log::warn!("Failed to analyse {}: {}", input.appliance_key, e);
                        BatchOutcome::Failed {
                            appliance_key: input.appliance_key.clone(),
                            error: e.to_string(),
                        }
                    }
                }
            })
            .collect()
    }

    pub fn summary_stats(outcomes: &[BatchOutcome]) -> SummaryStats {
        let analyzed: Vec<&OptimizationResult> = outcomes
            .iter()
            .filter_map(|o| match o {
                BatchOutcome::Analyzed { optimization, .. } => Some(optimization),
                BatchOutcome::Failed { .. } => None,
            })
            .collect();

        let mut stats = SummaryStats {
            total_appliances: outcomes.len(),
            successful: analyzed.len(),
            ..Default::default()
        };
        if analyzed.is_empty() {
            return stats;
        }

        stats.total_alerts = analyzed.iter().map(|r| r.alerts.len()).sum();
        stats.critical_alerts = analyzed
            .iter()
            .map(|r| r.alerts.iter().filter(|a| a.priority == AlertPriority::Critical).count())
            .sum();
        stats.total_potential_savings = analyzed.iter().map(|r| r.potential_savings_pct).sum();
        let efficiency_sum: u32 = analyzed.iter().map(|r| r.efficiency_pct).sum();
        stats.average_efficiency = (efficiency_sum as f64 / analyzed.len() as f64).round() as u32;
        stats
    }
}

/// Signed percentage by which conditions inflate the nominal energy
fn efficiency_loss_pct(base: f64, adjusted: f64) -> i32 {
    if adjusted <= 0.0 {
        return 0;
    }
    ((1.0 - base / adjusted) * 100.0).round() as i32
}
