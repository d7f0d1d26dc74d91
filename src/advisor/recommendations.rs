//! Recommendation catalogue

use super::appliance::ApplianceKind;
use crate::core::{
    Alert, AlertPriority, EnvironmentalConditions, Recommendation, RecommendationPriority,
};

use RecommendationPriority::{High, Low, Medium};

fn tip(kind: &str, title: &str, message: &str, savings: u32, priority: RecommendationPriority) -> Recommendation {
    Recommendation {
        kind: kind.to_string(),
        title: title.to_string(),
        message: message.to_string(),
        potential_savings: savings,
        priority,
    }
}

/// Static and condition-dependent tips for an appliance
fn catalogue(kind: ApplianceKind, conditions: &EnvironmentalConditions) -> Vec<Recommendation> {
    let temperature = conditions.temperature_c;
    let humidity = conditions.humidity_pct;
    let mut tips = Vec::new();

    match kind {
        ApplianceKind::Xbox => {
            tips.push(tip("efficiency", "Use Energy-Saving Mode", "Switching from instant-on to energy-saving mode cuts standby draw by about 95%.", 40, High));
            tips.push(tip("timing", "Game During Off-Peak Hours", "Evening play after the peak window runs on the cheaper rate.", 25, Medium));
            tips.push(tip("health", "Take Regular Breaks", "Every 20 minutes, look at something 20 feet away for 20 seconds.", 0, High));
            if temperature > 26.0 {
                tips.push(tip("ventilation", "Improve Console Ventilation", "Leave 10-15 cm of clearance around the console so it does not overheat.", 15, Medium));
            }
        }
        ApplianceKind::WaterPurifier => {
            tips.push(tip("maintenance", "Regular Filter Changes", "Pre-filters every 3 months, RO membrane every 2 years.", 30, High));
            tips.push(tip("health", "Monitor TDS Levels", "Check output TDS monthly; 80-120 ppm is the ideal range.", 0, High));
            tips.push(tip("efficiency", "Purify During Off-Peak Hours", "A timer can run the purifier overnight on the cheaper rate.", 25, Medium));
            tips.push(tip("sustainability", "Reuse Waste Water", "Rejected water is fine for plants, mopping or flushing.", 0, Medium));
            tips.push(tip("maintenance", "Tank Sanitization", "Sanitise the storage tank every 2 months.", 0, High));
            if temperature > 35.0 {
                tips.push(tip("location", "Cool Installation Location", "Heat lowers membrane efficiency by 15-20%; move the purifier somewhere cooler.", 20, Medium));
            }
        }
        ApplianceKind::Dryer if humidity > 60.0 => {
            tips.push(tip("timing", "High Humidity Alert", "The dryer runs more efficiently once humidity drops.", 15, Medium));
        }
        ApplianceKind::Kettle if temperature < 15.0 => {
            tips.push(tip("temperature", "Cold Room Impact", "A cold room means the kettle needs more energy per boil.", 10, Low));
        }
        ApplianceKind::AirFryer if temperature > 28.0 => {
            tips.push(tip("ventilation", "Ventilation Needed", "Keep air moving around the air fryer in warm weather.", 5, Low));
        }
        ApplianceKind::Dishwasher => {
            if temperature < 15.0 {
                tips.push(tip("temperature", "Use Eco Mode", "Cold supply water raises heating cost; eco or cold programmes avoid it.", 35, High));
            }
            if humidity > 70.0 {
                tips.push(tip("maintenance", "Check Salt & Rinse Aid", "Keep salt and rinse aid topped up in hard water areas.", 10, Medium));
            }
        }
        ApplianceKind::WashingMachine => {
            if temperature < 18.0 {
                tips.push(tip("temperature", "Cold Wash Recommended", "With cold supply water, a 30\u{b0}C or cold wash saves most of the heating energy.", 40, High));
            }
            tips.push(tip("efficiency", "Full Loads Only", "Full loads get the most out of every wash.", 25, Medium));
        }
        ApplianceKind::Cooker => {
            if temperature < 15.0 {
                tips.push(tip("temperature", "Use Room Temperature Water", "Starting with room-temperature water shortens cooking in a cold kitchen.", 15, Medium));
            }
            tips.push(tip("efficiency", "Minimize Keep-Warm Time", "Switching keep-warm off within 1-2 hours saves 30-40%.", 35, High));
            tips.push(tip("batch", "Batch Cook Rice", "Cook larger portions and refrigerate; reheating is cheaper than cooking.", 25, Medium));
        }
        _ => {}
    }

    tips
}

/// Critical and warning alerts re-expressed as recommendations
fn from_alerts(alerts: &[Alert]) -> impl Iterator<Item = Recommendation> + '_ {
    alerts.iter().filter_map(|alert| {
        let (savings, priority) = match alert.priority {
            AlertPriority::Critical => (20, High),
            AlertPriority::Warning => (10, Medium),
            _ => return None,
        };
        Some(Recommendation {
            kind: alert.priority.as_str().to_string(),
            title: alert.scenario.clone(),
            message: alert.message.clone(),
            potential_savings: savings,
            priority,
        })
    })
}

/// Full recommendation list, highest priority first, then highest savings
pub fn recommendations_for(
    kind: ApplianceKind,
    conditions: &EnvironmentalConditions,
    alerts: &[Alert],
) -> Vec<Recommendation> {
    let mut all = catalogue(kind, conditions);
    all.extend(from_alerts(alerts));
    all.sort_by(|a, b| {
        b.priority
            .cmp(&a.priority)
            .then_with(|| b.potential_savings.cmp(&a.potential_savings))
    });
    all
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alert(priority: AlertPriority) -> Alert {
        Alert {
            severity_level: priority.severity_marker().to_string(),
            priority,
            scenario: format!("{} scenario", priority.as_str()),
            message: "m".to_string(),
        }
    }

    #[test]
    fn test_sorted_by_priority_then_savings() {
        let conditions = EnvironmentalConditions::new(12.0, 50.0, None);
        let recs = recommendations_for(ApplianceKind::Cooker, &conditions, &[alert(AlertPriority::Critical)]);

        let order: Vec<(RecommendationPriority, u32)> =
            recs.iter().map(|r| (r.priority, r.potential_savings)).collect();
        assert_eq!(order, vec![(High, 35), (High, 20), (Medium, 25), (Medium, 15)]);
    }

    #[test]
    fn test_only_critical_and_warning_alerts_convert() {
        let alerts = [alert(AlertPriority::Warning), alert(AlertPriority::Caution), alert(AlertPriority::Notice)];
        let recs = recommendations_for(ApplianceKind::Toaster, &EnvironmentalConditions::default(), &alerts);
        assert_eq!(recs.len(), 1);
        assert_eq!(recs[0].kind, "warning");
        assert_eq!(recs[0].potential_savings, 10);
        assert_eq!(recs[0].priority, Medium);
    }

    #[test]
    fn test_conditional_tips() {
        let warm = EnvironmentalConditions::new(30.0, 50.0, None);
        let recs = recommendations_for(ApplianceKind::Xbox, &warm, &[]);
        assert!(recs.iter().any(|r| r.title == "Improve Console Ventilation"));

        let mild = EnvironmentalConditions::default();
        assert!(recommendations_for(ApplianceKind::Kettle, &mild, &[]).is_empty());
    }
}
