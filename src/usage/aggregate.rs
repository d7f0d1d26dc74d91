//! Phase merging for multi-phase appliances

use crate::core::UsageCycle;

/// Merge consecutive cycles whose gap (end to next start) is below
/// `gap_minutes`. Energy and duration are summed; the merged span runs from
/// the first start to the last end.
pub fn merge_phases(cycles: Vec<UsageCycle>, gap_minutes: f64) -> Vec<UsageCycle> {
    let mut merged: Vec<UsageCycle> = Vec::with_capacity(cycles.len());

    for cycle in cycles {
        match merged.last_mut() {
            Some(current) if gap_between(current, &cycle) < gap_minutes => {
                current.end = cycle.end;
                current.duration_minutes += cycle.duration_minutes;
                current.energy_kwh += cycle.energy_kwh;
                current.partial = cycle.partial;
            }
            _ => merged.push(cycle),
        }
    }

    merged
}

fn gap_between(earlier: &UsageCycle, later: &UsageCycle) -> f64 {
    (later.start - earlier.end).num_milliseconds() as f64 / 60_000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Duration, TimeZone, Utc};

    fn cycle(start_min: i64, len_min: i64, kwh: f64) -> UsageCycle {
        let base: DateTime<Utc> = Utc.with_ymd_and_hms(2024, 3, 4, 8, 0, 0).unwrap();
        let start = base + Duration::minutes(start_min);
        UsageCycle {
            start,
            end: start + Duration::minutes(len_min),
            duration_minutes: len_min as f64,
            energy_kwh: kwh,
            partial: false,
        }
    }

    #[test]
    fn test_close_phases_merge() {
        let merged = merge_phases(vec![cycle(0, 20, 0.4), cycle(35, 25, 0.5)], 30.0);
        assert_eq!(merged.len(), 1);
        assert!((merged[0].energy_kwh - 0.9).abs() < 1e-12);
        assert!((merged[0].duration_minutes - 45.0).abs() < 1e-12);
        assert_eq!(merged[0].end, cycle(35, 25, 0.5).end);
    }

    #[test]
    fn test_distant_cycles_stay_apart() {
        let merged = merge_phases(vec![cycle(0, 20, 0.4), cycle(120, 25, 0.5)], 30.0);
        assert_eq!(merged.len(), 2);
    }

    #[test]
    fn test_chain_merges_transitively() {
        let merged = merge_phases(
            vec![cycle(0, 10, 0.1), cycle(20, 10, 0.2), cycle(40, 10, 0.3), cycle(200, 10, 0.4)],
            30.0,
        );
        assert_eq!(merged.len(), 2);
        assert!((merged[0].energy_kwh - 0.6).abs() < 1e-12);
        assert!((merged[0].duration_minutes - 30.0).abs() < 1e-12);
    }
}
