//! Per-athlete rolling baselines
//!
//! Each athlete carries one [`BaselineProfile`] per metric kind, updated
//! by exponential smoothing once per analysis cycle. The smoothing update
//! in [`BaselineSet::observe`] is the only mutation path: nothing else in
//! the pipeline writes baseline state, so deviation math always reads a
//! value produced by the same rule. Baselines live for one session and
//! are dropped at teardown, never shared across athletes.

use kinesense_core::time::Timestamp;
use serde::{Deserialize, Serialize};

use crate::metrics::{MetricKind, METRIC_KIND_COUNT};

/// Weight kept from the previous baseline on each update
pub const BASELINE_RETAIN: f32 = 0.7;

/// Weight blended in from the newest observation on each update
pub const BASELINE_BLEND: f32 = 0.3;

/// Rolling statistic for one metric of one athlete
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BaselineProfile {
    /// Smoothed metric value
    pub value: f32,
    /// Smoothed confidence of the contributing observations
    pub confidence: f32,
    /// Time of the last observation folded in
    pub last_updated: Timestamp,
}

/// All baselines for one athlete's session, indexed by metric kind
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BaselineSet {
    profiles: [Option<BaselineProfile>; METRIC_KIND_COUNT],
}

impl BaselineSet {
    /// Empty set: every metric starts unseeded
    pub fn new() -> Self {
        Self::default()
    }

    /// Current baseline for `kind`, if one has been observed
    pub fn get(&self, kind: MetricKind) -> Option<BaselineProfile> {
        self.profiles[kind.index()]
    }

    /// Fold one observation into the baseline for `kind`.
    ///
    /// The first observation seeds the baseline directly; every later one
    /// applies `new = BASELINE_RETAIN * old + BASELINE_BLEND * observed`.
    /// Returns the updated profile.
    pub fn observe(
        &mut self,
        kind: MetricKind,
        observed: f32,
        confidence: f32,
        now: Timestamp,
    ) -> BaselineProfile {
        let slot = &mut self.profiles[kind.index()];
        let updated = match *slot {
            Some(prev) => BaselineProfile {
                value: BASELINE_RETAIN * prev.value + BASELINE_BLEND * observed,
                confidence: BASELINE_RETAIN * prev.confidence + BASELINE_BLEND * confidence,
                last_updated: now,
            },
            None => BaselineProfile {
                value: observed,
                confidence,
                last_updated: now,
            },
        };
        *slot = Some(updated);
        updated
    }

    /// Relative deviation of `observed` from the current baseline for
    /// `kind`: `|observed - baseline| / |baseline|`. Zero when the metric
    /// is unseeded or the baseline sits at zero.
    pub fn deviation(&self, kind: MetricKind, observed: f32) -> f32 {
        match self.profiles[kind.index()] {
            Some(prev) if prev.value != 0.0 => {
                let base = if prev.value < 0.0 { -prev.value } else { prev.value };
                let diff = observed - prev.value;
                (if diff < 0.0 { -diff } else { diff }) / base
            }
            _ => 0.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_observation_seeds() {
        let mut set = BaselineSet::new();
        let p = set.observe(MetricKind::Force, 820.0, 0.9, 100);
        assert_eq!(p.value, 820.0);
        assert_eq!(p.confidence, 0.9);
        assert_eq!(p.last_updated, 100);
    }

    #[test]
    fn one_step_smoothing_is_exact() {
        let mut set = BaselineSet::new();
        set.observe(MetricKind::Force, 800.0, 1.0, 0);
        let p = set.observe(MetricKind::Force, 900.0, 1.0, 50);
        assert_eq!(p.value, 0.7 * 800.0 + 0.3 * 900.0);
    }

    #[test]
    fn identical_observations_leave_baseline_fixed() {
        let mut set = BaselineSet::new();
        set.observe(MetricKind::Impact, 6.0, 0.95, 0);
        for i in 1..=100u64 {
            let p = set.observe(MetricKind::Impact, 6.0, 0.95, i);
            // 0.7x + 0.3x == x holds exactly in f32 for these weights
            assert_eq!(p.value, 6.0);
        }
    }

    #[test]
    fn deviation_is_relative_to_baseline() {
        let mut set = BaselineSet::new();
        assert_eq!(set.deviation(MetricKind::Force, 900.0), 0.0);
        set.observe(MetricKind::Force, 800.0, 1.0, 0);
        assert!((set.deviation(MetricKind::Force, 1000.0) - 0.25).abs() < 1e-6);
        assert!((set.deviation(MetricKind::Force, 600.0) - 0.25).abs() < 1e-6);
    }

    #[test]
    fn metrics_are_independent() {
        let mut set = BaselineSet::new();
        set.observe(MetricKind::Force, 800.0, 1.0, 0);
        assert!(set.get(MetricKind::Fatigue).is_none());
        assert!(set.get(MetricKind::Force).is_some());
    }
}
