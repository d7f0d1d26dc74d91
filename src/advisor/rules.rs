//! Per-appliance alert rules
//!
//! Each appliance owns an ordered table of [`Rule`] records. Rules are
//! evaluated against one fully-defaulted [`Fact`] and every rule whose
//! predicate holds becomes an alert, in table order.

use super::appliance::ApplianceKind;
use crate::core::{
    Alert, AlertPriority, EnvironmentalConditions, Factors, MaintenanceInfo, UsageSummary,
};
use std::panic::{catch_unwind, AssertUnwindSafe};

/// Everything a rule may look at, with zero/false for anything unknown
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Fact {
    pub temperature: f64,
    pub humidity: f64,
    pub pressure: f64,
    pub f_t: f64,
    pub f_h: f64,
    /// Energy of the latest cycle, or the adjusted estimate when none ran
    pub eaec: f64,
    pub daily_energy: f64,
    pub cycles: u32,
    pub short_cycles: u32,
    pub is_peak_time: bool,
    /// Minutes of the latest cycle
    pub duration: f64,
    pub avg_power: f64,
    pub standby_power: f64,
    pub late_night_hours: f64,
    pub keep_warm_hours: f64,
    pub standby_minutes: f64,
    pub filter_age: f64,
    pub pre_filter_age: f64,
    pub membrane_age: f64,
    pub uv_lamp_age: f64,
    pub days_since_service: f64,
    pub tank_sanitization_age: f64,
    pub tds_in: f64,
    pub tds_out: f64,
    pub waste_ratio: f64,
    pub continuous_run_minutes: f64,
    pub has_mineralizer: bool,
}

impl Fact {
    pub fn new(
        conditions: &EnvironmentalConditions,
        usage: &UsageSummary,
        factors: &Factors,
        adjusted_energy_kwh: f64,
        maintenance: &MaintenanceInfo,
    ) -> Self {
        let eaec = if usage.cycle_count > 0 {
            usage.last_cycle_energy_kwh
        } else {
            adjusted_energy_kwh
        };

        Self {
            temperature: conditions.temperature_c,
            humidity: conditions.humidity_pct,
            pressure: conditions.pressure_hpa,
            f_t: factors.f_t,
            f_h: factors.f_h,
            eaec,
            daily_energy: usage.daily_total_energy_kwh,
            cycles: usage.cycle_count,
            short_cycles: usage.short_cycle_count,
            is_peak_time: usage.is_peak_time,
            duration: usage.last_cycle_duration_minutes,
            avg_power: usage.last_cycle_avg_power_watts,
            standby_power: usage.standby_power_watts,
            late_night_hours: usage.late_night_hours,
            keep_warm_hours: maintenance.keep_warm_hours,
            standby_minutes: maintenance.standby_minutes,
            filter_age: maintenance.filter_age_days,
            pre_filter_age: maintenance.pre_filter_age_days,
            membrane_age: maintenance.membrane_age_days,
            uv_lamp_age: maintenance.uv_lamp_age_days,
            days_since_service: maintenance.days_since_service,
            tank_sanitization_age: maintenance.tank_sanitization_age_days,
            tds_in: maintenance.tds_in_ppm,
            tds_out: maintenance.tds_out_ppm,
            waste_ratio: maintenance.waste_ratio,
            continuous_run_minutes: maintenance.continuous_run_minutes,
            has_mineralizer: maintenance.has_mineralizer,
        }
    }

    fn used(&self) -> bool {
        self.cycles > 0
    }
}

/// A tagged rule record
#[derive(Clone, Copy)]
pub struct Rule {
    pub priority: AlertPriority,
    pub scenario: &'static str,
    pub predicate: fn(&Fact) -> bool,
    pub message: fn(&Fact) -> String,
}

impl Rule {
    fn new(
        priority: AlertPriority,
        scenario: &'static str,
        predicate: fn(&Fact) -> bool,
        message: fn(&Fact) -> String,
    ) -> Self {
        Self { priority, scenario, predicate, message }
    }

    /// A panicking predicate counts as not matched
    fn matches(&self, fact: &Fact) -> bool {
        match catch_unwind(AssertUnwindSafe(|| (self.predicate)(fact))) {
            Ok(hit) => hit,
            Err(_) => {
                log::warn!("Rule '{}' failed to evaluate, treating as not matched", self.scenario);
                false
            }
        }
    }

    fn to_alert(&self, fact: &Fact) -> Option<Alert> {
        let message = match catch_unwind(AssertUnwindSafe(|| (self.message)(fact))) {
            Ok(m) => m,
            Err(_) => {
                log::warn!("Rule '{}' failed to render its message", self.scenario);
                return None;
            }
        };

        Some(Alert {
            severity_level: self.priority.severity_marker().to_string(),
            priority: self.priority,
            scenario: self.scenario.to_string(),
            message,
        })
    }
}

impl std::fmt::Debug for Rule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Rule")
            .field("priority", &self.priority)
            .field("scenario", &self.scenario)
            .finish()
    }
}

/// Every alert whose rule matches, in table order
pub fn evaluate(rules: &[Rule], fact: &Fact) -> Vec<Alert> {
    rules
        .iter()
        .filter(|r| r.matches(fact))
        .filter_map(|r| r.to_alert(fact))
        .collect()
}

use AlertPriority::{Caution, Critical, Notice, Warning};

/// Rule table for an appliance class
pub fn rules_for(kind: ApplianceKind) -> Vec<Rule> {
    match kind {
        ApplianceKind::Dryer => dryer(),
        ApplianceKind::Kettle => kettle(),
        ApplianceKind::Microwave => microwave(),
        ApplianceKind::CoffeeMachine => coffee_machine(),
        ApplianceKind::AirFryer => air_fryer(),
        ApplianceKind::Toaster => toaster(),
        ApplianceKind::Dishwasher => dishwasher(),
        ApplianceKind::WashingMachine => washing_machine(),
        ApplianceKind::Cooker => cooker(),
        ApplianceKind::Xbox => console(),
        ApplianceKind::WaterPurifier => water_purifier(),
    }
}

fn dryer() -> Vec<Rule> {
    vec![
        Rule::new(
            Critical,
            "High energy per cycle",
            |f| f.used() && f.eaec > 4.5,
            |f| format!("This drying cycle took {:.2} kWh, well above normal. A shorter or eco programme would cut that down.", f.eaec),
        ),
        Rule::new(
            Warning,
            "Daily consumption high",
            |f| f.used() && f.daily_energy > 7.0,
            |f| format!("The dryer has used {:.1} kWh today. Air drying a few items would take some load off.", f.daily_energy),
        ),
        Rule::new(
            Notice,
            "Humidity spike adjustment",
            |f| f.used() && f.f_h > 1.15,
            |f| format!("Humid air is making the dryer work about {}% harder. A drier day or a dehumidifier would help.", ((f.f_h - 1.0) * 100.0).round()),
        ),
        Rule::new(
            Caution,
            "Multiple cycles per day",
            |f| f.cycles > 2,
            |f| format!("The dryer has run {} times today. Combining loads saves both energy and money.", f.cycles),
        ),
    ]
}

fn kettle() -> Vec<Rule> {
    vec![
        Rule::new(
            Critical,
            "Excessive boil time",
            |f| f.used() && f.eaec > 0.18,
            |f| format!("The last boil used {:.3} kWh, which is high. The kettle may need descaling, or it is being filled with more water than needed.", f.eaec),
        ),
        Rule::new(
            Warning,
            "High daily usage",
            |f| f.cycles > 8,
            |f| format!("The kettle has boiled {} times today. Boiling once and keeping water in a flask uses less energy.", f.cycles),
        ),
        Rule::new(
            Caution,
            "Boiling too much water",
            |f| f.used() && f.eaec > 0.15 && f.duration > 5.0,
            |_| "More water is being boiled than is used. Fill only what you need to save energy.".to_string(),
        ),
        Rule::new(
            Notice,
            "Cold room impact",
            |f| f.used() && f.temperature < 10.0 && f.f_t > 1.1,
            |f| format!("The kitchen is cold ({:.1}\u{b0}C), so the kettle needs more energy and time to boil.", f.temperature),
        ),
    ]
}

fn microwave() -> Vec<Rule> {
    vec![
        Rule::new(
            Critical,
            "High power usage per session",
            |f| f.used() && f.eaec > 0.5,
            |f| format!("The microwave used {:.2} kWh in one session. Defrosting overnight in the fridge is cheaper than defrosting on power.", f.eaec),
        ),
        Rule::new(
            Warning,
            "Daily usage spike",
            |f| f.used() && f.daily_energy > 0.15,
            |f| format!("The microwave has used {:.1} kWh today. Reheating several items together beats heating them one at a time.", f.daily_energy),
        ),
        Rule::new(
            Notice,
            "Inefficient use (short bursts)",
            |f| f.used() && f.short_cycles > 3,
            |f| format!("The microwave ran {} short bursts in a row. One longer session for everything uses less energy.", f.short_cycles),
        ),
    ]
}

fn coffee_machine() -> Vec<Rule> {
    vec![
        Rule::new(
            Critical,
            "High energy per brew",
            |f| f.used() && f.eaec > 0.2,
            |f| format!("That brew took {:.2} kWh. A smaller cup or a descale should bring it down.", f.eaec),
        ),
        Rule::new(
            Warning,
            "Daily usage high",
            |f| f.cycles > 6,
            |f| format!("{} brews so far today. A larger pot kept in a thermal carafe saves repeated heating.", f.cycles),
        ),
    ]
}

fn air_fryer() -> Vec<Rule> {
    vec![
        Rule::new(
            Critical,
            "High energy per session",
            |f| f.used() && f.eaec > 2.0,
            |f| format!("The air fryer used {:.2} kWh this session. Skipping preheat when the recipe allows saves energy.", f.eaec),
        ),
        Rule::new(
            Warning,
            "Daily usage high",
            |f| f.cycles > 3,
            |f| format!("The air fryer has run {} times today. Cooking items together cuts the number of sessions.", f.cycles),
        ),
        Rule::new(
            Notice,
            "Room temperature high",
            |f| f.used() && f.temperature > 28.0,
            |f| format!("The kitchen is warm ({:.1}\u{b0}C). Keep space around the air fryer so it can vent properly.", f.temperature),
        ),
    ]
}

fn toaster() -> Vec<Rule> {
    vec![
        Rule::new(
            Critical,
            "High energy per session",
            |f| f.used() && f.eaec > 0.12,
            |f| format!("The toaster used {:.3} kWh. A lower browning setting still gives good toast for less energy.", f.eaec),
        ),
        Rule::new(
            Warning,
            "Daily usage high",
            |f| f.cycles > 8,
            |f| format!("The toaster has run {} times today. Toasting several slices per run saves energy.", f.cycles),
        ),
    ]
}

fn dishwasher() -> Vec<Rule> {
    vec![
        Rule::new(
            Critical,
            "High energy per cycle",
            |f| f.used() && f.eaec > 3.0,
            |f| format!("The dishwasher used {:.2} kWh this cycle. Eco mode with a full load would use far less.", f.eaec),
        ),
        Rule::new(
            Warning,
            "Partial load detected",
            |f| f.used() && f.eaec < 1.5 && f.duration < 90.0,
            |_| "The dishwasher ran without a full load. Waiting until it is full gets more out of every cycle.".to_string(),
        ),
        Rule::new(
            Warning,
            "Hot cycle in cold conditions",
            |f| f.used() && f.eaec > 2.0 && f.temperature < 15.0,
            |_| "A hot programme in cold weather costs extra. Eco or low-temperature mode saves 30-40%.".to_string(),
        ),
        Rule::new(
            Notice,
            "Multiple daily cycles",
            |f| f.cycles > 1,
            |f| format!("The dishwasher has run {} times today. Saving up dishes for one daily run is cheaper.", f.cycles),
        ),
        Rule::new(
            Caution,
            "Peak time usage",
            |f| f.used() && f.is_peak_time,
            |_| "The dishwasher is running during peak hours. Delay start would move it to a cheaper off-peak slot.".to_string(),
        ),
        Rule::new(
            Notice,
            "Hard water detected",
            |f| f.used() && f.humidity > 70.0 && f.f_h > 1.1,
            |_| "Conditions suggest hard water. Keeping salt and rinse aid topped up keeps cleaning efficient.".to_string(),
        ),
    ]
}

fn washing_machine() -> Vec<Rule> {
    vec![
        Rule::new(
            Critical,
            "High energy per cycle",
            |f| f.used() && f.eaec > 3.0,
            |f| format!("This wash used {:.2} kWh. A cold eco programme would save most of that.", f.eaec),
        ),
        Rule::new(
            Warning,
            "Hot wash detected",
            |f| f.used() && f.eaec > 2.0 && f.duration > 60.0,
            |_| "Hot washes use far more energy than cold ones. Most detergents clean well at 30\u{b0}C.".to_string(),
        ),
        Rule::new(
            Warning,
            "Small load inefficiency",
            |f| f.used() && f.eaec < 0.6 && f.duration < 45.0,
            |f| format!("That looked like a small load ({:.2} kWh in {:.0} min). Filling the drum gets more from each wash.", f.eaec, f.duration),
        ),
        Rule::new(
            Notice,
            "Daily usage high",
            |f| f.used() && f.daily_energy > 4.0,
            |f| format!("Laundry has used {:.1} kWh today. Fewer, fuller loads would reduce that.", f.daily_energy),
        ),
        Rule::new(
            Notice,
            "Multiple cycles per day",
            |f| f.cycles > 2,
            |f| format!("The washing machine has run {} times today. Combining loads saves energy and money.", f.cycles),
        ),
        Rule::new(
            Caution,
            "High spin speed",
            |f| f.used() && f.eaec > 1.5 && f.duration > 90.0,
            |_| "Long cycles with a fast spin use extra energy. Lower the spin speed if clothes are line dried anyway.".to_string(),
        ),
        Rule::new(
            Caution,
            "Cold weather impact",
            |f| f.used() && f.temperature < 15.0 && f.f_t > 1.05,
            |f| format!("At {:.1}\u{b0}C the incoming water takes longer to heat. A cold wash avoids that cost.", f.temperature),
        ),
        Rule::new(
            Notice,
            "Peak time usage",
            |f| f.used() && f.is_peak_time,
            |_| "Washing during peak hours costs more. The delay timer can shift it off-peak.".to_string(),
        ),
    ]
}

fn cooker() -> Vec<Rule> {
    vec![
        Rule::new(
            Critical,
            "Excessive energy per cook",
            |f| f.used() && f.eaec > 1.0,
            |f| format!("The rice cooker used {:.2} kWh. Keep-warm may be running longer than needed.", f.eaec),
        ),
        Rule::new(
            Critical,
            "Extended keep-warm period",
            |f| f.used() && f.keep_warm_hours > 4.0,
            |f| format!("Food has been kept warm for {:.1} hours. Serving and switching off would stop the drain.", f.keep_warm_hours),
        ),
        Rule::new(
            Warning,
            "Multiple cooking cycles",
            |f| f.cycles > 3,
            |f| format!("Rice has been cooked {} times today. Cooking a larger batch and reheating uses less energy.", f.cycles),
        ),
        Rule::new(
            Warning,
            "Daily energy consumption high",
            |f| f.used() && f.daily_energy > 1.5,
            |f| format!("The rice cooker has used {:.1} kWh today. Batch cooking means fewer cooks.", f.daily_energy),
        ),
        Rule::new(
            Caution,
            "Cold water impact",
            |f| f.used() && f.temperature < 15.0 && f.f_t > 1.1,
            |f| format!("The kitchen is cold ({:.1}\u{b0}C), so cooking takes longer. Room-temperature water shortens it.", f.temperature),
        ),
        Rule::new(
            Notice,
            "High humidity cooking conditions",
            |f| f.used() && f.humidity > 70.0 && f.f_h > 1.05,
            |f| format!("Humidity is high ({:.0}%), which can slow cooking. Good kitchen ventilation helps.", f.humidity),
        ),
    ]
}

fn console() -> Vec<Rule> {
    vec![
        Rule::new(
            Critical,
            "Excessive gaming session",
            |f| f.used() && f.duration > 240.0,
            |f| format!("The console has been on for {:.1} hours straight and used {:.2} kWh. Time for a break.", f.duration / 60.0, f.eaec),
        ),
        Rule::new(
            Critical,
            "High daily gaming energy",
            |f| f.used() && f.daily_energy > 1.5,
            |f| format!("The console has used {:.1} kWh today. Shorter sessions would bring that down.", f.daily_energy),
        ),
        Rule::new(
            Warning,
            "Multiple long sessions",
            |f| f.cycles > 4,
            |f| format!("{} gaming sessions started today. Longer breaks between them cut energy costs.", f.cycles),
        ),
        Rule::new(
            Warning,
            "Instant-on mode detected",
            |f| f.used() && f.standby_power > 10.0,
            |f| format!("The console draws {:.1} W while idle in instant-on mode. Energy-saving mode removes nearly all of it.", f.standby_power),
        ),
        Rule::new(
            Warning,
            "Late night gaming",
            |f| f.used() && f.late_night_hours > 2.0,
            |f| format!("{:.1} hours of play after midnight today. Late sessions hurt sleep and add to the bill.", f.late_night_hours),
        ),
        Rule::new(
            Notice,
            "Warm room gaming",
            |f| f.used() && f.temperature > 26.0,
            |f| format!("The room is warm ({:.1}\u{b0}C) and the console runs hotter. Keep its vents clear.", f.temperature),
        ),
        Rule::new(
            Notice,
            "Background downloads",
            |f| f.used() && f.standby_minutes > 180.0,
            |f| format!("The console spent {:.1} hours downloading in rest mode. Scheduling downloads overnight is cheaper.", f.standby_minutes / 60.0),
        ),
        Rule::new(
            Caution,
            "Peak time gaming",
            |f| f.used() && f.is_peak_time,
            |_| "Gaming during peak hours costs the most. Playing after the peak window saves 20-30%.".to_string(),
        ),
        Rule::new(
            Caution,
            "Gaming posture reminder",
            |f| f.used() && f.duration > 120.0,
            |f| format!("{:.1} hours of gaming so far. Stand up and stretch now and then.", f.duration / 60.0),
        ),
        Rule::new(
            Notice,
            "Streaming vs gaming power",
            |f| f.used() && f.avg_power < 50.0,
            |f| format!("The console averaged {:.0} W, which looks like streaming rather than gaming.", f.avg_power),
        ),
    ]
}

fn water_purifier() -> Vec<Rule> {
    vec![
        Rule::new(
            Critical,
            "Filter replacement overdue",
            |f| f.used() && f.filter_age > 180.0,
            |f| format!("The purifier filter is {:.0} days old and overdue. Old filters purify less and use more energy.", f.filter_age),
        ),
        Rule::new(
            Critical,
            "Excessive daily purification",
            |f| f.used() && f.daily_energy > 2.5,
            |f| format!("The purifier used {:.1} kWh today, which is unusual. Check for leaks or a pump that keeps running.", f.daily_energy),
        ),
        Rule::new(
            Critical,
            "UV lamp replacement needed",
            |f| f.used() && f.uv_lamp_age > 365.0,
            |f| format!("The UV lamp is {:.0} days old. Its output drops sharply after a year, so replace it.", f.uv_lamp_age),
        ),
        Rule::new(
            Warning,
            "High energy per purification cycle",
            |f| f.used() && f.eaec > 0.8,
            |f| format!("That purification cycle used {:.2} kWh, above normal. Filters may be clogged or scaled.", f.eaec),
        ),
        Rule::new(
            Warning,
            "Filter change approaching",
            |f| f.used() && f.filter_age > 150.0 && f.filter_age <= 180.0,
            |f| format!("The filter is {:.0} days old. Plan a replacement soon; six months is the usual interval.", f.filter_age),
        ),
        Rule::new(
            Warning,
            "Multiple purification cycles",
            |f| f.cycles > 8,
            |f| format!("The purifier has run {} times today. Purifying larger batches uses less energy.", f.cycles),
        ),
        Rule::new(
            Warning,
            "TDS levels abnormal",
            |f| f.used() && (f.tds_out < 50.0 || f.tds_out > 150.0),
            |f| {
                if f.tds_out < 50.0 {
                    format!("Purified water TDS is very low ({:.0} ppm) and lacks minerals. A remineraliser would help.", f.tds_out)
                } else {
                    format!("Purified water TDS is high ({:.0} ppm). The filters may be saturated.", f.tds_out)
                }
            },
        ),
        Rule::new(
            Caution,
            "High input water TDS",
            |f| f.used() && f.tds_in > 500.0,
            |f| format!("Input water TDS is {:.0} ppm, so the purifier works harder and filters wear faster.", f.tds_in),
        ),
        Rule::new(
            Caution,
            "Long purification duration",
            |f| f.used() && f.duration > 45.0,
            |f| format!("The purifier ran for {:.0} minutes. Low pressure or a clogged pre-filter may be the cause.", f.duration),
        ),
        Rule::new(
            Caution,
            "Temperature impact on efficiency",
            |f| f.used() && f.temperature > 35.0,
            |f| format!("The room is {:.1}\u{b0}C. Membranes work best at 20-25\u{b0}C, so a cooler spot would help.", f.temperature),
        ),
        Rule::new(
            Caution,
            "Continuous operation detected",
            |f| f.used() && f.continuous_run_minutes > 120.0,
            |f| format!("The purifier has run non-stop for {:.0} minutes. Check the tank and auto-shutoff valve.", f.continuous_run_minutes),
        ),
        Rule::new(
            Caution,
            "Pre-filter replacement due",
            |f| f.used() && f.pre_filter_age > 90.0,
            |f| format!("The pre-filters are {:.0} days old. Replace them every three months to protect the membrane.", f.pre_filter_age),
        ),
        Rule::new(
            Notice,
            "Membrane replacement due",
            |f| f.used() && f.membrane_age > 730.0,
            |f| format!("The RO membrane is about {:.0} months old. Replacement is usually due every two to three years.", (f.membrane_age / 30.0).round()),
        ),
        Rule::new(
            Notice,
            "Water wastage high",
            |f| f.used() && f.waste_ratio > 3.0,
            |f| format!("The purifier rejects {:.1} litres for each litre purified. Efficient systems manage 2-3.", f.waste_ratio),
        ),
        Rule::new(
            Notice,
            "Ideal TDS range achieved",
            |f| f.used() && f.tds_out >= 80.0 && f.tds_out <= 120.0,
            |f| format!("Water TDS is {:.0} ppm, right in the ideal drinking range.", f.tds_out),
        ),
        Rule::new(
            Notice,
            "Regular maintenance reminder",
            |f| f.used() && f.days_since_service > 90.0 && f.days_since_service <= 120.0,
            |f| format!("{:.0} days since the last service. Book a maintenance check soon.", f.days_since_service),
        ),
        Rule::new(
            Notice,
            "Storage tank health check",
            |f| f.used() && f.tank_sanitization_age > 60.0,
            |f| format!("The storage tank was last sanitised {:.0} days ago. Every two months is recommended.", f.tank_sanitization_age),
        ),
        Rule::new(
            Notice,
            "Cold weather impact",
            |f| f.used() && f.temperature < 15.0,
            |f| format!("At {:.1}\u{b0}C purification slows down and the tank takes longer to fill.", f.temperature),
        ),
        Rule::new(
            Notice,
            "Mineral enhancement active",
            |f| f.used() && f.has_mineralizer && f.tds_out >= 80.0,
            |f| format!("The mineraliser is working; output TDS is {:.0} ppm.", f.tds_out),
        ),
    ]
}
