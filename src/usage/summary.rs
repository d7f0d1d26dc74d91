//! Per-day usage summary derived from detected cycles

use crate::core::{PeakWindow, PowerSample, UsageCycle, UsageSummary};
use chrono::{DateTime, Duration, NaiveDateTime, NaiveTime, TimeZone, Utc};

/// Hour (local) at which the late-night band ends
const LATE_NIGHT_END_HOUR: u32 = 5;

/// Midnight of `now`'s local day, as a UTC instant
///
/// Midnight is resolved in `now`'s own zone, so a DST change earlier in the
/// day does not shift the start. Where a zone skips midnight the first
/// valid local instant after it is used.
pub fn local_day_start<Tz: TimeZone>(now: &DateTime<Tz>) -> DateTime<Utc> {
    let tz = now.timezone();
    let local = now.naive_local();
    let midnight = local.date().and_time(NaiveTime::MIN);
    let resolved = tz
        .from_local_datetime(&midnight)
        .earliest()
        .or_else(|| tz.from_local_datetime(&(midnight + Duration::hours(1))).earliest());
    match resolved {
        Some(start) => start.with_timezone(&Utc),
        None => now.with_timezone(&Utc) - (local - midnight),
    }
}

/// Reduce a day's cycles to the facts the rule engine works with
pub fn summarize<Tz: TimeZone>(
    cycles: &[UsageCycle],
    standby_power_watts: f64,
    now: &DateTime<Tz>,
    peak: &PeakWindow,
    short_cycle_minutes: f64,
) -> UsageSummary {
    let tz = now.timezone();
    let is_peak_time = peak.contains(now.naive_local().time());

    let Some(last) = cycles.last() else {
        return UsageSummary {
            is_peak_time,
            standby_power_watts,
            ..Default::default()
        };
    };

    let count = cycles.len();
    let total_energy: f64 = cycles.iter().map(|c| c.energy_kwh).sum();
    let total_minutes: f64 = cycles.iter().map(|c| c.duration_minutes).sum();

    UsageSummary {
        last_cycle_energy_kwh: last.energy_kwh,
        daily_total_energy_kwh: total_energy,
        cycle_count: count as u32,
        avg_duration_minutes: total_minutes / count as f64,
        short_cycle_count: cycles
            .iter()
            .filter(|c| c.duration_minutes < short_cycle_minutes)
            .count() as u32,
        is_peak_time,
        last_cycle_duration_minutes: last.duration_minutes,
        last_cycle_avg_power_watts: last.average_power_watts(),
        standby_power_watts,
        late_night_hours: cycles.iter().map(|c| late_night_hours(c, &tz)).sum(),
    }
}

/// Mean of readings that are on but below the active threshold
pub fn standby_power(samples: &[PowerSample], threshold_w: f64) -> f64 {
    let (sum, n) = samples
        .iter()
        .filter(|s| s.watts > 0.0 && s.watts <= threshold_w)
        .fold((0.0, 0usize), |(sum, n), s| (sum + s.watts, n + 1));
    if n == 0 {
        0.0
    } else {
        sum / n as f64
    }
}

/// Hours of the cycle's span falling between 00:00 and 05:00 local
fn late_night_hours<Tz: TimeZone>(cycle: &UsageCycle, tz: &Tz) -> f64 {
    let start = cycle.start.with_timezone(tz).naive_local();
    let end = cycle.end.with_timezone(tz).naive_local();
    if end <= start {
        return 0.0;
    }

    let mut hours = 0.0;
    let mut day = start.date();
    while day <= end.date() {
        let band_start: NaiveDateTime = day.and_time(NaiveTime::MIN);
        let band_end = band_start + Duration::hours(LATE_NIGHT_END_HOUR as i64);
        let from = start.max(band_start);
        let to = end.min(band_end);
        if to > from {
            hours += (to - from).num_seconds() as f64 / 3600.0;
        }
        match day.succ_opt() {
            Some(next) => day = next,
            None => break,
        }
    }
    hours
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use chrono::{FixedOffset, LocalResult, NaiveDate, TimeZone};

    /// UK civil time for 2024: BST from 31 March to 27 October, both
    /// switches at 01:00 UTC
    #[derive(Debug, Clone, Copy)]
    pub(crate) struct UkTime;

    impl UkTime {
        fn gmt() -> FixedOffset {
            FixedOffset::east_opt(0).unwrap()
        }

        fn bst() -> FixedOffset {
            FixedOffset::east_opt(3600).unwrap()
        }

        fn switch(month: u32, day: u32) -> NaiveDateTime {
            NaiveDate::from_ymd_opt(2024, month, day).unwrap().and_hms_opt(1, 0, 0).unwrap()
        }
    }

    impl TimeZone for UkTime {
        type Offset = FixedOffset;

        fn from_offset(_: &FixedOffset) -> Self {
            UkTime
        }

        fn offset_from_local_date(&self, local: &NaiveDate) -> LocalResult<FixedOffset> {
            self.offset_from_local_datetime(&local.and_time(NaiveTime::MIN))
        }

        fn offset_from_local_datetime(&self, local: &NaiveDateTime) -> LocalResult<FixedOffset> {
            let (spring, autumn) = (Self::switch(3, 31), Self::switch(10, 27));
            let hour = Duration::hours(1);
            if *local >= spring && *local < spring + hour {
                LocalResult::None
            } else if *local >= autumn && *local < autumn + hour {
                LocalResult::Ambiguous(Self::bst(), Self::gmt())
            } else if *local >= spring + hour && *local < autumn {
                LocalResult::Single(Self::bst())
            } else {
                LocalResult::Single(Self::gmt())
            }
        }

        fn offset_from_utc_date(&self, utc: &NaiveDate) -> FixedOffset {
            self.offset_from_utc_datetime(&utc.and_time(NaiveTime::MIN))
        }

        fn offset_from_utc_datetime(&self, utc: &NaiveDateTime) -> FixedOffset {
            if *utc >= Self::switch(3, 31) && *utc < Self::switch(10, 27) {
                Self::bst()
            } else {
                Self::gmt()
            }
        }
    }

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 4, h, m, 0).unwrap()
    }

    fn cycle(start: DateTime<Utc>, minutes: i64, kwh: f64) -> UsageCycle {
        UsageCycle {
            start,
            end: start + Duration::minutes(minutes),
            duration_minutes: minutes as f64,
            energy_kwh: kwh,
            partial: false,
        }
    }

    fn peak() -> PeakWindow {
        PeakWindow::from_minutes(16 * 60, 19 * 60)
    }

    #[test]
    fn test_totals_match_cycles() {
        let cycles = vec![cycle(at(7, 0), 4, 0.1), cycle(at(8, 0), 1, 0.02), cycle(at(9, 0), 5, 0.15)];
        let s = summarize(&cycles, 0.0, &at(17, 0), &peak(), 2.0);
        assert_eq!(s.cycle_count, 3);
        assert!((s.daily_total_energy_kwh - 0.27).abs() < 1e-12);
        assert_eq!(s.last_cycle_energy_kwh, 0.15);
        assert_eq!(s.short_cycle_count, 1);
        assert!((s.avg_duration_minutes - 10.0 / 3.0).abs() < 1e-12);
        assert!(s.is_peak_time);
    }

    #[test]
    fn test_no_cycles_is_unused() {
        let s = summarize(&[], 0.0, &at(10, 0), &peak(), 2.0);
        assert!(s.is_unused());
        assert!(!s.is_peak_time);
    }

    #[test]
    fn test_late_night_overlap() {
        let c = cycle(at(4, 0), 120, 0.3);
        let s = summarize(&[c], 0.0, &at(10, 0), &peak(), 2.0);
        assert!((s.late_night_hours - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_day_start_in_offset_zone() {
        let tz = FixedOffset::east_opt(2 * 3600).unwrap();
        let now = tz.with_ymd_and_hms(2024, 3, 4, 1, 30, 0).unwrap();
        // Local midnight at +02:00 is 22:00 UTC on the previous day
        assert_eq!(local_day_start(&now), Utc.with_ymd_and_hms(2024, 3, 3, 22, 0, 0).unwrap());
    }

    #[test]
    fn test_day_start_after_clocks_go_forward() {
        let now = UkTime.with_ymd_and_hms(2024, 3, 31, 12, 0, 0).unwrap();
        assert_eq!(local_day_start(&now), Utc.with_ymd_and_hms(2024, 3, 31, 0, 0, 0).unwrap());
    }

    #[test]
    fn test_day_start_after_clocks_go_back() {
        let now = UkTime.with_ymd_and_hms(2024, 10, 27, 12, 0, 0).unwrap();
        assert_eq!(local_day_start(&now), Utc.with_ymd_and_hms(2024, 10, 26, 23, 0, 0).unwrap());
    }

    #[test]
    fn test_standby_power_ignores_off_and_active() {
        let samples: Vec<PowerSample> = [0.0, 12.0, 14.0, 250.0]
            .iter()
            .enumerate()
            .map(|(i, &w)| PowerSample::new(at(9, i as u32), w))
            .collect();
        assert!((standby_power(&samples, 30.0) - 13.0).abs() < 1e-12);
    }
}
