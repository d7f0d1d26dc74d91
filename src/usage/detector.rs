//! Cycle detection and energy integration
//!
//! Splits an ordered power trace into usage cycles using a power threshold
//! and a dip tolerance, then integrates each cycle's energy over the exact
//! sample timestamps.

use crate::core::{PowerSample, UsageCycle};
use chrono::{DateTime, Utc};

/// Segmentation parameters for one appliance
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectionParams {
    pub power_threshold_w: f64,
    pub min_cycle_duration_s: f64,
    pub max_gap_s: f64,
}

/// Segment `samples` into non-overlapping cycles, ordered by start time.
///
/// A reading at or below threshold only ends a cycle when no reading above
/// threshold follows within `max_gap_s` of the last active reading. A cycle
/// still open when the trace ends is closed at `now` and flagged partial.
/// Cycles shorter than `min_cycle_duration_s` are dropped.
pub fn detect_cycles(
    samples: &[PowerSample],
    params: &DetectionParams,
    now: DateTime<Utc>,
) -> Vec<UsageCycle> {
    let mut cycles = Vec::new();
    let mut open: Option<usize> = None;
    let mut last_active = 0usize;

    for (i, sample) in samples.iter().enumerate() {
        if sample.watts > params.power_threshold_w {
            if open.is_none() {
                open = Some(i);
            }
            last_active = i;
            continue;
        }

        let Some(start) = open else { continue };
        if !dip_is_transient(samples, i, last_active, params, now) {
            cycles.extend(close_cycle(samples, start, last_active, params));
            open = None;
        }
    }

    if let Some(start) = open {
        let since_active = seconds_between(samples[last_active].timestamp, now);
        if since_active > params.max_gap_s {
            cycles.extend(close_cycle(samples, start, last_active, params));
        } else {
            cycles.extend(close_partial(samples, start, params, now));
        }
    }

    cycles
}

/// A dip is transient when activity resumes within the gap tolerance, or
/// when the tolerance has not elapsed yet and the trace ends inside it.
fn dip_is_transient(
    samples: &[PowerSample],
    dip: usize,
    last_active: usize,
    params: &DetectionParams,
    now: DateTime<Utc>,
) -> bool {
    let anchor = samples[last_active].timestamp;
    let mut window_observed = false;

    for ahead in &samples[dip + 1..] {
        if seconds_between(anchor, ahead.timestamp) > params.max_gap_s {
            window_observed = true;
            break;
        }
        if ahead.watts > params.power_threshold_w {
            return true;
        }
    }

    !window_observed && seconds_between(anchor, now) <= params.max_gap_s
}

fn close_cycle(
    samples: &[PowerSample],
    start: usize,
    end: usize,
    params: &DetectionParams,
) -> Option<UsageCycle> {
    let start_ts = samples[start].timestamp;
    let end_ts = samples[end].timestamp;
    let duration_s = seconds_between(start_ts, end_ts);
    if duration_s < params.min_cycle_duration_s {
        log::trace!("Dropping {:.0}s burst at {}", duration_s, start_ts);
        return None;
    }

    Some(UsageCycle {
        start: start_ts,
        end: end_ts,
        duration_minutes: duration_s / 60.0,
        energy_kwh: integrate_energy(&samples[start..=end]),
        partial: false,
    })
}

fn close_partial(
    samples: &[PowerSample],
    start: usize,
    params: &DetectionParams,
    now: DateTime<Utc>,
) -> Option<UsageCycle> {
    let start_ts = samples[start].timestamp;
    let last_ts = samples[samples.len() - 1].timestamp;
    let end_ts = if now > last_ts { now } else { last_ts };
    let duration_s = seconds_between(start_ts, end_ts);
    if duration_s < params.min_cycle_duration_s {
        return None;
    }

    Some(UsageCycle {
        start: start_ts,
        end: end_ts,
        duration_minutes: duration_s / 60.0,
        energy_kwh: integrate_energy(&samples[start..]),
        partial: true,
    })
}

/// Trapezoidal integration over consecutive samples, in kWh
pub fn integrate_energy(samples: &[PowerSample]) -> f64 {
    let watt_hours: f64 = samples
        .windows(2)
        .map(|pair| {
            let hours = seconds_between(pair[0].timestamp, pair[1].timestamp) / 3600.0;
            let avg = (pair[0].watts.max(0.0) + pair[1].watts.max(0.0)) / 2.0;
            avg * hours.max(0.0)
        })
        .sum();
    watt_hours / 1000.0
}

fn seconds_between(from: DateTime<Utc>, to: DateTime<Utc>) -> f64 {
    (to - from).num_milliseconds() as f64 / 1000.0
}
