//! Usage module - turns raw power traces into per-day usage summaries

mod aggregate;
mod detector;
mod summary;

pub use aggregate::merge_phases;
pub use detector::{detect_cycles, integrate_energy, DetectionParams};
pub use summary::{local_day_start, standby_power, summarize};
#[cfg(test)]
pub(crate) use summary::tests::UkTime;

use crate::advisor::ApplianceProfile;
use crate::core::{DetectionConfig, PeakWindow, PowerSample, UsageCycle, UsageSummary};
use chrono::{DateTime, TimeZone, Utc};

/// Runs detection, phase merging and summarisation for one device
#[derive(Debug, Clone)]
pub struct UsageAnalyzer {
    detection: DetectionConfig,
    peak: PeakWindow,
}

impl UsageAnalyzer {
    pub fn new(detection: DetectionConfig, peak: PeakWindow) -> Self {
        Self { detection, peak }
    }

    /// Cycles for the trace, merged when the appliance runs in phases
    pub fn cycles(
        &self,
        profile: &ApplianceProfile,
        samples: &[PowerSample],
        now: DateTime<Utc>,
    ) -> Vec<UsageCycle> {
        let raw = detect_cycles(samples, &profile.detection_params(), now);
        if profile.kind.is_multi_phase() && raw.len() > 1 {
            let before = raw.len();
            let merged = merge_phases(raw, self.detection.phase_merge_gap_minutes);
            log::debug!("{}: merged {} phases into {} cycles", profile.kind, before, merged.len());
            merged
        } else {
            raw
        }
    }

    /// Summary of the samples since local midnight of `now`
    pub fn summarize<Tz: TimeZone>(
        &self,
        profile: &ApplianceProfile,
        samples: &[PowerSample],
        now: &DateTime<Tz>,
    ) -> UsageSummary {
        let cycles = self.cycles(profile, samples, now.with_timezone(&Utc));
        let standby = standby_power(samples, profile.power_threshold_w);
        summarize(&cycles, standby, now, &self.peak, self.detection.short_cycle_minutes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::advisor::{ApplianceKind, ApplianceProfile};
    use chrono::{Duration, TimeZone};

    fn washer_trace(start: DateTime<Utc>) -> Vec<PowerSample> {
        // Two 15-minute phases separated by a 20-minute pause, sampled per minute
        let mut samples = Vec::new();
        for m in 0..=70 {
            let watts = match m {
                0..=15 => 500.0,
                36..=51 => 300.0,
                _ => 2.0,
            };
            samples.push(PowerSample::new(start + Duration::minutes(m), watts));
        }
        samples
    }

    #[test]
    fn test_multi_phase_appliance_merges() {
        let start = Utc.with_ymd_and_hms(2024, 3, 4, 9, 0, 0).unwrap();
        let analyzer = UsageAnalyzer::new(DetectionConfig::default(), PeakWindow::from_minutes(960, 1140));
        let washer = ApplianceProfile::builtin(ApplianceKind::WashingMachine);
        let mut kettle_like = washer.clone();
        kettle_like.kind = ApplianceKind::Kettle;

        let samples = washer_trace(start);
        let now = start + Duration::hours(3);

        assert_eq!(analyzer.cycles(&kettle_like, &samples, now).len(), 2);

        let merged = analyzer.cycles(&washer, &samples, now);
        assert_eq!(merged.len(), 1);
        assert!((merged[0].duration_minutes - 30.0).abs() < 1e-9);

        let summary = analyzer.summarize(&washer, &samples, &now);
        assert_eq!(summary.cycle_count, 1);
        assert!((summary.standby_power_watts - 2.0).abs() < 1e-9);
    }
}
