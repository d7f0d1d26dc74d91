//! Fire times for the two tick cadences

use crate::core::PeakWindow;
use chrono::{DateTime, Duration, TimeZone, Utc};
use std::fmt;

/// Which timer fired a tick
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TickKind {
    /// Top of every hour, all notification types
    Hourly,
    /// Every few minutes inside the peak window, high priority only
    Peak,
}

impl TickKind {
    pub fn as_str(self) -> &'static str {
        match self {
            TickKind::Hourly => "hourly",
            TickKind::Peak => "peak",
        }
    }
}

impl fmt::Display for TickKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Next top of the hour strictly after `now`
pub fn next_hourly_tick<Tz: TimeZone>(now: &DateTime<Tz>) -> DateTime<Utc> {
    let now = now.with_timezone(&Utc);
    let next = (now.timestamp().div_euclid(3600) + 1) * 3600;
    Utc.timestamp_opt(next, 0).single().unwrap_or(now + Duration::hours(1))
}

/// Next slot after `now` on the `interval_minutes` grid (aligned to local
/// midnight) that falls inside the peak window. `None` when the window is
/// empty.
pub fn next_peak_tick<Tz: TimeZone>(
    now: &DateTime<Tz>,
    window: &PeakWindow,
    interval_minutes: u32,
) -> Option<DateTime<Utc>> {
    let step = interval_minutes.clamp(1, 1440) as usize;
    let local = now.naive_local();

    for day in 0..=2 {
        let midnight = (local.date() + Duration::days(day)).and_hms_opt(0, 0, 0)?;
        for minute in (0..1440).step_by(step) {
            let candidate = midnight + Duration::minutes(minute as i64);
            if candidate <= local || !window.contains(candidate.time()) {
                continue;
            }
            // Slots skipped by a DST jump are ignored
            if let Some(at) = now.timezone().from_local_datetime(&candidate).earliest() {
                return Some(at.with_timezone(&Utc));
            }
        }
    }
    None
}

/// Time left until `target`, zero if it has passed
pub fn delay_until(target: DateTime<Utc>, now: DateTime<Utc>) -> std::time::Duration {
    (target - now).to_std().unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::FixedOffset;

    fn window() -> PeakWindow {
        PeakWindow::parse("16:00", "19:00").unwrap()
    }

    #[test]
    fn test_next_hourly_tick() {
        let now = Utc.with_ymd_and_hms(2024, 3, 4, 9, 15, 30).unwrap();
        assert_eq!(next_hourly_tick(&now), Utc.with_ymd_and_hms(2024, 3, 4, 10, 0, 0).unwrap());

        let on_the_hour = Utc.with_ymd_and_hms(2024, 3, 4, 10, 0, 0).unwrap();
        assert_eq!(next_hourly_tick(&on_the_hour), Utc.with_ymd_and_hms(2024, 3, 4, 11, 0, 0).unwrap());
    }

    #[test]
    fn test_peak_tick_before_window() {
        let now = Utc.with_ymd_and_hms(2024, 3, 4, 9, 0, 0).unwrap();
        let next = next_peak_tick(&now, &window(), 30).unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2024, 3, 4, 16, 0, 0).unwrap());
    }

    #[test]
    fn test_peak_tick_inside_window() {
        let now = Utc.with_ymd_and_hms(2024, 3, 4, 16, 10, 0).unwrap();
        let next = next_peak_tick(&now, &window(), 30).unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2024, 3, 4, 16, 30, 0).unwrap());

        // 19:00 is outside the half-open window, so the last slot is 18:30
        let late = Utc.with_ymd_and_hms(2024, 3, 4, 18, 30, 0).unwrap();
        let next = next_peak_tick(&late, &window(), 30).unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2024, 3, 5, 16, 0, 0).unwrap());
    }

    #[test]
    fn test_peak_tick_uses_local_time() {
        let tz = FixedOffset::east_opt(2 * 3600).unwrap();
        let now = tz.with_ymd_and_hms(2024, 3, 4, 12, 0, 0).unwrap();
        let next = next_peak_tick(&now, &window(), 30).unwrap();
        // 16:00 at UTC+2
        assert_eq!(next, Utc.with_ymd_and_hms(2024, 3, 4, 14, 0, 0).unwrap());
    }

    #[test]
    fn test_empty_window_never_fires() {
        let empty = PeakWindow::from_minutes(600, 600);
        let now = Utc.with_ymd_and_hms(2024, 3, 4, 9, 0, 0).unwrap();
        assert!(next_peak_tick(&now, &empty, 30).is_none());
    }

    #[test]
    fn test_delay_until_past_is_zero() {
        let now = Utc.with_ymd_and_hms(2024, 3, 4, 9, 0, 0).unwrap();
        assert_eq!(delay_until(now - Duration::minutes(1), now), std::time::Duration::ZERO);
        assert_eq!(delay_until(now + Duration::seconds(90), now).as_secs(), 90);
    }
}
