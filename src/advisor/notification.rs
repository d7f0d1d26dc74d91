//! Notification composer
//!
//! Collapses an optimization result into exactly one notification using a
//! fixed waterfall: critical, then opportunity, then info, then none.

use super::appliance::ApplianceKind;
use crate::core::{
    AlertPriority, Notification, NotificationAction, NotificationPriority, NotificationType,
    OptimizationResult,
};

/// Efficiency below this is treated as critical even with no alert
pub const LOW_EFFICIENCY_PCT: u32 = 70;
/// Savings above this make an opportunity even with no warning
pub const OPPORTUNITY_SAVINGS_PCT: u32 = 10;

const WARNING_SIGN: &str = "\u{26A0}\u{FE0F}";
const LIGHT_BULB: &str = "\u{1F4A1}";
const INFO_SIGN: &str = "\u{2139}\u{FE0F}";
const CHECK_MARK: &str = "\u{2705}";

pub fn compose(kind: ApplianceKind, result: &OptimizationResult) -> Notification {
    let name = kind.display_name();
    let lower = name.to_lowercase();
    let headline = result.headline();
    let savings = result.potential_savings_pct;
    let efficiency = result.efficiency_pct;

    if result.has_alert(AlertPriority::Critical) || efficiency < LOW_EFFICIENCY_PCT {
        let (title, message) = match headline {
            Some(alert) => (
                format!("{} {}: Immediate Action Needed", alert.severity_level, name),
                alert.message.clone(),
            ),
            None => (
                format!("{} {}: Poor Efficiency Detected", WARNING_SIGN, name),
                format!(
                    "Your {} is running at only {}% efficiency in the current conditions, which pushes up your bill. {}",
                    lower,
                    efficiency,
                    efficiency_action(kind)
                ),
            ),
        };
        return build(title, message, NotificationType::Critical, NotificationPriority::High, NotificationAction::ViewDetails, result);
    }

    if result.has_alert(AlertPriority::Warning) || savings > OPPORTUNITY_SAVINGS_PCT {
        let (title, message) = match headline {
            Some(alert) => (
                format!("{} {}: Save Up to {}%", LIGHT_BULB, name, savings),
                format!("{}\n\nEstimated savings: {}% on your energy bill.", alert.message, savings),
            ),
            None => (
                format!("{} {}: Energy Saving Opportunity", LIGHT_BULB, name),
                format!(
                    "You could save up to {}% on {} energy costs by adjusting how you use it. {}",
                    savings,
                    lower,
                    savings_hint(kind, savings)
                ),
            ),
        };
        return build(title, message, NotificationType::Opportunity, NotificationPriority::Medium, NotificationAction::SeeTips, result);
    }

    if let Some(alert) = headline {
        return build(
            format!("{} {} Usage Insight", INFO_SIGN, name),
            alert.message.clone(),
            NotificationType::Info,
            NotificationPriority::Low,
            NotificationAction::LearnMore,
            result,
        );
    }

    build(
        format!("{} {} Running Efficiently", CHECK_MARK, name),
        format!(
            "Your {} is operating at optimal efficiency ({}%). {}",
            lower,
            efficiency,
            general_tip(kind)
        ),
        NotificationType::None,
        NotificationPriority::None,
        NotificationAction::None,
        result,
    )
}

fn build(
    title: String,
    message: String,
    kind: NotificationType,
    priority: NotificationPriority,
    action: NotificationAction,
    result: &OptimizationResult,
) -> Notification {
    Notification {
        title,
        message,
        kind,
        priority,
        action,
        recommendations: result.recommendations.clone(),
    }
}

/// Corrective step shown when efficiency alone triggers a critical notification
pub fn efficiency_action(kind: ApplianceKind) -> &'static str {
    match kind {
        ApplianceKind::Dryer => "Clean the lint filter and make sure the vent is clear.",
        ApplianceKind::Kettle => "Descale the kettle and boil only the water you need.",
        ApplianceKind::Microwave => "Check the door seal and never run it empty.",
        ApplianceKind::CoffeeMachine => "Descale the machine and switch it off between brews.",
        ApplianceKind::AirFryer => "Clean the heating element and avoid overfilling the basket.",
        ApplianceKind::Toaster => "Empty the crumb tray and check the elements.",
        ApplianceKind::Dishwasher => "Use eco mode, run full loads and clean the filter.",
        ApplianceKind::WashingMachine => "Wash cold and size loads properly.",
        ApplianceKind::Cooker => "Cut keep-warm time and cook larger batches less often.",
        ApplianceKind::Xbox => "Turn on energy-saving mode and keep the console well ventilated.",
        ApplianceKind::WaterPurifier => "Replace the filters, check for leaks and clean the tank.",
    }
}

/// Savings hint, more specific as the available saving grows
pub fn savings_hint(kind: ApplianceKind, savings: u32) -> &'static str {
    if savings > 30 {
        match kind {
            ApplianceKind::Dryer => "Use a lower heat setting or air-dry when you can.",
            ApplianceKind::Kettle => "Fill only what you need and descale regularly.",
            ApplianceKind::Microwave => "Defrost ahead of time and use lower power levels.",
            ApplianceKind::CoffeeMachine => "Brew in batches and go easy on keep-warm.",
            ApplianceKind::AirFryer => "Skip preheating and cook several items together.",
            ApplianceKind::Toaster => "Toast several slices at once on a lower setting.",
            ApplianceKind::Dishwasher => "Run full loads only, on eco or cold cycles.",
            ApplianceKind::WashingMachine => "Wash cold and fill the drum.",
            ApplianceKind::Cooker => "Switch keep-warm off early and batch cook for the week.",
            ApplianceKind::Xbox => "Use energy-saving mode and play outside peak hours.",
            ApplianceKind::WaterPurifier => "Run off-peak, reuse waste water and keep filters fresh.",
        }
    } else if savings > 15 {
        "Small changes in how you use this appliance add up to real savings."
    } else {
        "A few small adjustments could trim your energy costs."
    }
}

/// Friendly tip appended to the all-clear message
pub fn general_tip(kind: ApplianceKind) -> &'static str {
    match kind {
        ApplianceKind::Dryer => "Cleaning the lint filter after every load keeps it that way.",
        ApplianceKind::Kettle => "Boiling only what you need saves time as well as energy.",
        ApplianceKind::Microwave => "Covering food helps it heat evenly.",
        ApplianceKind::CoffeeMachine => "Regular descaling keeps it efficient.",
        ApplianceKind::AirFryer => "An uncrowded basket cooks more evenly.",
        ApplianceKind::Toaster => "Empty the crumb tray weekly for best performance.",
        ApplianceKind::Dishwasher => "Delay start can move runs to off-peak hours.",
        ApplianceKind::WashingMachine => "Cold water cleans most clothes as well as hot.",
        ApplianceKind::Cooker => "Larger batches lower the energy per serving.",
        ApplianceKind::Xbox => "A 10-minute break every hour is good for you and the bill.",
        ApplianceKind::WaterPurifier => "Check TDS monthly and change filters on schedule.",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Alert, Factors};

    fn result(efficiency: u32, savings: u32, alerts: Vec<Alert>) -> OptimizationResult {
        OptimizationResult {
            appliance_key: "kettle".to_string(),
            base_energy_kwh: 0.12,
            adjusted_energy_kwh: 0.12,
            factors: Factors { f_t: 1.0, f_h: 1.0, f_p: 1.0 },
            efficiency_loss_pct: 100 - efficiency as i32,
            efficiency_pct: efficiency,
            alerts,
            recommendations: Vec::new(),
            potential_savings_pct: savings,
        }
    }

    fn alert(priority: AlertPriority, message: &str) -> Alert {
        Alert {
            severity_level: priority.severity_marker().to_string(),
            priority,
            scenario: "s".to_string(),
            message: message.to_string(),
        }
    }

    #[test]
    fn test_low_efficiency_alone_is_critical() {
        let n = compose(ApplianceKind::Dryer, &result(65, 35, Vec::new()));
        assert_eq!(n.kind, NotificationType::Critical);
        assert_eq!(n.priority, NotificationPriority::High);
        assert_eq!(n.action, NotificationAction::ViewDetails);
        assert!(n.title.contains("Poor Efficiency Detected"));
        assert!(n.message.contains("65%"));
    }

    #[test]
    fn test_critical_alert_headline() {
        let n = compose(ApplianceKind::Kettle, &result(87, 35, vec![alert(AlertPriority::Critical, "boil")]));
        assert_eq!(n.kind, NotificationType::Critical);
        assert_eq!(n.message, "boil");
        assert!(n.title.ends_with("Kettle: Immediate Action Needed"));
    }

    #[test]
    fn test_savings_make_opportunity() {
        let n = compose(ApplianceKind::Kettle, &result(95, 12, vec![alert(AlertPriority::Notice, "cold")]));
        assert_eq!(n.kind, NotificationType::Opportunity);
        assert_eq!(n.priority, NotificationPriority::Medium);
        assert!(n.title.contains("Save Up to 12%"));
        assert!(n.message.starts_with("cold"));
    }

    #[test]
    fn test_minor_alert_is_info() {
        let n = compose(ApplianceKind::Toaster, &result(100, 2, vec![alert(AlertPriority::Notice, "tray")]));
        assert_eq!(n.kind, NotificationType::Info);
        assert_eq!(n.priority, NotificationPriority::Low);
        assert_eq!(n.action, NotificationAction::LearnMore);
    }

    #[test]
    fn test_all_clear_is_not_actionable() {
        let n = compose(ApplianceKind::Microwave, &result(100, 0, Vec::new()));
        assert_eq!(n.kind, NotificationType::None);
        assert_eq!(n.priority, NotificationPriority::None);
        assert!(!n.is_actionable());
        assert!(n.message.contains("(100%)"));
    }

    #[test]
    fn test_savings_hint_tiers() {
        assert_eq!(savings_hint(ApplianceKind::Kettle, 31), "Fill only what you need and descale regularly.");
        assert!(savings_hint(ApplianceKind::Kettle, 20).starts_with("Small changes"));
        assert!(savings_hint(ApplianceKind::Kettle, 11).starts_with("A few"));
    }
}
