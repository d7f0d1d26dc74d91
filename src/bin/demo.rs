//! Appliance Advisor - Demo CLI
//!
//! Runs a synthetic household through the whole pipeline: cycle detection,
//! optimization, notification selection and two scheduler ticks against an
//! in-memory history database. No network access is needed.

use appliance_advisor_lib::advisor::{BatchInput, BatchOutcome, OptimizationEngine};
use appliance_advisor_lib::core::{
    Config, Device, EnvironmentalConditions, MaintenanceInfo, PowerSample, Recipient, Result,
    Room,
};
use appliance_advisor_lib::db::{Database, DedupePolicy};
use appliance_advisor_lib::pricing::PricingEngine;
use appliance_advisor_lib::scheduler::{
    Collaborators, ConditionSource, DeliveryGateway, DeliveryReceipt, DeliveryRequest,
    SampleSource, Scheduler, SqliteHistory, StaticDirectory, TickKind,
};
use appliance_advisor_lib::usage::{local_day_start, UsageAnalyzer};
use chrono::{DateTime, Duration, Local, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Pre-generated traces keyed by power entity
struct SyntheticSamples {
    traces: HashMap<String, Vec<PowerSample>>,
}

impl SampleSource for SyntheticSamples {
    async fn power_samples(&self, entity_id: &str, since: DateTime<Utc>) -> Result<Vec<PowerSample>> {
        let samples = self.traces.get(entity_id).map(Vec::as_slice).unwrap_or_default();
        Ok(samples.iter().filter(|s| s.timestamp >= since).copied().collect())
    }
}

struct SyntheticRooms;

impl ConditionSource for SyntheticRooms {
    async fn latest_conditions(&self, sensor_id: &str) -> Result<Option<EnvironmentalConditions>> {
        Ok(match sensor_id {
            "sensor.kitchen" => Some(EnvironmentalConditions::new(8.5, 62.0, Some(1004.0))),
            "sensor.utility" => Some(EnvironmentalConditions::new(14.0, 78.0, None)),
            "sensor.lounge" => Some(EnvironmentalConditions::new(21.0, 45.0, Some(1011.0))),
            _ => None,
        })
    }
}

/// Prints instead of pushing
struct ConsoleGateway;

impl DeliveryGateway for ConsoleGateway {
    async fn deliver(&self, request: &DeliveryRequest) -> Result<DeliveryReceipt> {
        println!("      -> push [{}] {}", request.priority.as_str(), request.title);
        Ok(DeliveryReceipt { id: Some(format!("demo-{}", request.history_id)) })
    }
}

/// Constant-power bursts sampled every 30 s, each followed by an idle reading
fn bursts(day_start: DateTime<Utc>, spec: &[(f64, i64, f64)]) -> Vec<PowerSample> {
    let mut samples = Vec::new();
    for &(start_hour, minutes, watts) in spec {
        let start = day_start + Duration::seconds((start_hour * 3600.0) as i64);
        for step in 0..=minutes * 2 {
            samples.push(PowerSample::new(start + Duration::seconds(step * 30), watts));
        }
        samples.push(PowerSample::new(start + Duration::minutes(minutes + 1), 1.5));
    }
    samples
}

fn device(id: &str, name: &str, room: &str, appliance_key: &str) -> Device {
    Device {
        id: id.to_string(),
        name: name.to_string(),
        location: Some(room.to_string()),
        appliance_key: appliance_key.to_string(),
        power_entity_id: format!("sensor.{}_power", id),
        maintenance: MaintenanceInfo::default(),
    }
}

fn household() -> Recipient {
    let mut purifier = device("purifier", "RO purifier", "Kitchen", "water_purifier");
    purifier.maintenance = MaintenanceInfo {
        filter_age_days: 200.0,
        uv_lamp_age_days: 120.0,
        tds_in_ppm: 420.0,
        tds_out_ppm: 35.0,
        ..Default::default()
    };

    Recipient {
        id: "demo-user".to_string(),
        email: None,
        push_token: Some("ExponentPushToken[demo]".to_string()),
        notifications_enabled: true,
        rooms: vec![
            Room { name: "Kitchen".to_string(), sensor_id: "sensor.kitchen".to_string() },
            Room { name: "Utility".to_string(), sensor_id: "sensor.utility".to_string() },
            Room { name: "Lounge".to_string(), sensor_id: "sensor.lounge".to_string() },
        ],
        devices: vec![
            device("kettle", "Kitchen kettle", "Kitchen", "kettle"),
            device("washer", "Washing machine", "Utility", "washing_machine"),
            device("xbox", "Games console", "Lounge", "gaming_console"),
            purifier,
            device("toaster", "Toaster", "Kitchen", "toaster"),
        ],
    }
}

fn traces(day_start: DateTime<Utc>) -> HashMap<String, Vec<PowerSample>> {
    let mut traces = HashMap::new();
    // One long boil
    traces.insert("sensor.kettle_power".to_string(), bursts(day_start, &[(7.5, 6, 2200.0)]));
    // Fill/wash and rinse/spin phases 20 minutes apart
    traces.insert(
        "sensor.washer_power".to_string(),
        bursts(day_start, &[(9.0, 40, 1800.0), (10.0, 25, 900.0)]),
    );
    // A late-night session and an evening one
    traces.insert(
        "sensor.xbox_power".to_string(),
        bursts(day_start, &[(0.25, 170, 160.0), (18.0, 90, 150.0)]),
    );
    traces.insert("sensor.purifier_power".to_string(), bursts(day_start, &[(6.0, 30, 40.0), (13.0, 25, 38.0)]));
    traces
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    println!("==============================================");
    println!("   Appliance Advisor - Demo CLI");
    println!("==============================================\n");

    let config = Config::default();
    let day_start = local_day_start(&Local::now());
    // Pin the demo clock to 21:00 today so every synthetic cycle is in the past
    let now: DateTime<Local> = (day_start + Duration::hours(21)).with_timezone(&Local);
    let user = household();
    let traces = traces(day_start);

    // 1. Usage detection
    println!("[1/4] Detecting usage cycles...");
    let peak = match config.schedule.peak_window() {
        Ok(p) => p,
        Err(e) => {
            eprintln!("      Invalid peak window: {}", e);
            return;
        }
    };
    let engine = OptimizationEngine::default();
    let analyzer = UsageAnalyzer::new(config.detection.clone(), peak);
    let pricing = PricingEngine::new(&config.pricing, peak);

    let mut inputs = Vec::new();
    for d in &user.devices {
        let Ok(profile) = engine.registry().get(&d.appliance_key) else {
            continue;
        };
        let samples = traces.get(&d.power_entity_id).cloned().unwrap_or_default();
        let usage = analyzer.summarize(profile, &samples, &now);
        println!(
            "      {:<16} {:>2} cycles  {:>6.3} kWh  last {:>5.1} min",
            d.name, usage.cycle_count, usage.daily_total_energy_kwh, usage.last_cycle_duration_minutes
        );

        let room = user.rooms.iter().find(|r| Some(&r.name) == d.location.as_ref());
        let conditions = match room {
            Some(r) => SyntheticRooms.latest_conditions(&r.sensor_id).await.ok().flatten(),
            None => None,
        };
        inputs.push(BatchInput {
            appliance_key: d.appliance_key.clone(),
            conditions: conditions.unwrap_or_default(),
            usage,
            maintenance: d.maintenance.clone(),
        });
    }
    println!();

    // 2. Optimization
    println!("[2/4] Scoring efficiency...");
    let outcomes = engine.batch(&inputs);
    for outcome in &outcomes {
        match outcome {
            BatchOutcome::Analyzed { optimization, notification } => {
                let cost = pricing.estimated_cost(optimization.adjusted_energy_kwh, now.time());
                println!(
                    "      {:<16} eff {:>3}%  save {:>2}%  {:>6}  [{}] {}",
                    optimization.appliance_key,
                    optimization.efficiency_pct,
                    optimization.potential_savings_pct,
                    pricing.format_cost(cost),
                    notification.kind,
                    notification.title
                );
            }
            BatchOutcome::Failed { appliance_key, error } => {
                println!("      {:<16} failed: {}", appliance_key, error);
            }
        }
    }
    let stats = OptimizationEngine::summary_stats(&outcomes);
    println!(
        "\n      {} appliances, {} alerts ({} critical), average efficiency {}%\n",
        stats.total_appliances, stats.total_alerts, stats.critical_alerts, stats.average_efficiency
    );

    // 3. Scheduler ticks
    println!("[3/4] Running scheduler ticks...");
    let db = match Database::open_in_memory() {
        Ok(db) => Arc::new(Mutex::new(db)),
        Err(e) => {
            eprintln!("      Could not open history database: {}", e);
            return;
        }
    };
    let io = Collaborators {
        users: StaticDirectory::new(vec![user.clone()]),
        samples: SyntheticSamples { traces },
        conditions: SyntheticRooms,
        history: SqliteHistory::new(Arc::clone(&db), DedupePolicy::from_schedule(&config.schedule)),
        gateway: ConsoleGateway,
    };
    let scheduler = match Scheduler::new(&config, io) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("      Could not build scheduler: {}", e);
            return;
        }
    };

    println!("      Hourly tick:");
    let first = scheduler.run_tick_at(TickKind::Hourly, now).await;
    println!("      Same tick again 30 minutes later:");
    let second = scheduler.run_tick_at(TickKind::Hourly, now + Duration::minutes(30)).await;
    println!(
        "      first: {} created, {} delivered | second: {} created, {} suppressed, {} duplicates\n",
        first.created, first.delivered, second.created, second.suppressed, second.duplicates
    );

    // 4. History
    println!("[4/4] Notification history...");
    let db = db.lock().await;
    match db.list_for_user(&user.id, 20, now.with_timezone(&Utc)) {
        Ok(entries) => {
            for e in entries {
                println!(
                    "      #{} {:<16} {:<11} delivered={} receipt={}",
                    e.id,
                    e.device_name,
                    e.notification.kind,
                    e.delivered,
                    e.delivery_receipt_id.as_deref().unwrap_or("-")
                );
            }
        }
        Err(e) => eprintln!("      Error listing history: {}", e),
    }

    println!("\n==============================================\n");
}
