//! Threshold and baseline driven anomaly detection
//!
//! Each analysis cycle hands the detector one [`MetricSet`]. Every metric
//! present is screened against its static threshold; violations are
//! scored by combining the cycle's reading confidence with how far the
//! value sits beyond the threshold and the athlete's baseline, and only
//! scores above the sensitivity floor become candidates. Baselines are
//! folded forward once per cycle per metric whether or not the metric
//! violated, keeping the rolling statistics honest during normal play.
//!
//! All state is per-instance. Two detectors never share baselines, so
//! test pipelines and multi-athlete deployments coexist without
//! cross-talk.

use kinesense_core::reading::InlineString;
use kinesense_core::time::Timestamp;
use serde::{Deserialize, Serialize};

use crate::baseline::BaselineSet;
use crate::metrics::{MetricKind, MetricSet};

/// Minimum combined confidence score for a candidate to be emitted.
///
/// Tuned against recorded sessions for a >=85% true-positive rate on
/// threshold-violating samples; kept as a named constant so deployments
/// can re-tune without hunting through the scoring math.
pub const CONFIDENCE_FLOOR: f32 = 0.85;

/// Simultaneous violations at which severity escalates to critical
pub const CRITICAL_VIOLATION_COUNT: usize = 2;

/// Relative excess at which the score boost saturates
const BOOST_SATURATION: f32 = 0.25;

/// Broad category of an anomaly, used for alert correlation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AnomalyKind {
    /// Movement or load pattern outside safe bounds
    Biomechanical,
    /// Strain on the athlete's physiology
    Physiological,
    /// Output decline without acute risk
    Performance,
    /// Fault in the sensing hardware or pipeline itself
    System,
}

/// Candidate severity, escalated by simultaneous violations
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Severity {
    /// Informational
    Low,
    /// Worth watching
    Medium,
    /// Single-metric threshold violation
    High,
    /// Multiple metrics violating in the same cycle
    Critical,
}

/// One scored threshold violation, produced per cycle and consumed
/// immediately by the correlator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnomalyCandidate {
    /// Broad category
    pub kind: AnomalyKind,
    /// The metric that violated
    pub metric: MetricKind,
    /// Observed value this cycle
    pub current_value: f32,
    /// Static threshold it exceeded
    pub threshold: f32,
    /// Combined confidence score, above [`CONFIDENCE_FLOOR`]
    pub confidence_score: f32,
    /// Sensor the violation was observed on
    pub location: InlineString,
    /// Cycle timestamp
    pub detection_time: Timestamp,
    /// Severity assigned from the cycle's violation context
    pub severity: Severity,
}

/// Static per-metric thresholds
///
/// Defaults come from the garment's sports-medicine characterization;
/// hosts may override per deployment.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Thresholds {
    /// Raw force units on the accelerometer force channels
    pub force: f32,
    /// Left/right imbalance percent
    pub asymmetry_pct: f32,
    /// Impact in g
    pub impact_g: f32,
    /// Angular excursion from neutral, degrees
    pub range_of_motion_deg: f32,
    /// Sustained-load percentage
    pub strain_pct: f32,
    /// Activation decline fraction
    pub fatigue: f32,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            force: 800.0,
            asymmetry_pct: 15.0,
            impact_g: 8.0,
            range_of_motion_deg: 45.0,
            strain_pct: 85.0,
            fatigue: 0.6,
        }
    }
}

impl Thresholds {
    /// Threshold for `kind`
    pub fn get(&self, kind: MetricKind) -> f32 {
        match kind {
            MetricKind::Force => self.force,
            MetricKind::Asymmetry => self.asymmetry_pct,
            MetricKind::Impact => self.impact_g,
            MetricKind::RangeOfMotionDeviation => self.range_of_motion_deg,
            MetricKind::PhysiologicalStrain => self.strain_pct,
            MetricKind::Fatigue => self.fatigue,
        }
    }
}

/// Category a metric's violations fall under
pub fn anomaly_kind(metric: MetricKind) -> AnomalyKind {
    match metric {
        MetricKind::Force
        | MetricKind::Asymmetry
        | MetricKind::Impact
        | MetricKind::RangeOfMotionDeviation => AnomalyKind::Biomechanical,
        MetricKind::PhysiologicalStrain => AnomalyKind::Physiological,
        MetricKind::Fatigue => AnomalyKind::Performance,
    }
}

/// Stateless scoring and stateful baseline tracking for one athlete
pub struct AnomalyDetector {
    thresholds: Thresholds,
    floor: f32,
}

impl Default for AnomalyDetector {
    fn default() -> Self {
        Self::new(Thresholds::default(), CONFIDENCE_FLOOR)
    }
}

impl AnomalyDetector {
    /// Detector with explicit thresholds and sensitivity floor
    pub fn new(thresholds: Thresholds, floor: f32) -> Self {
        Self { thresholds, floor }
    }

    /// The active thresholds
    pub fn thresholds(&self) -> &Thresholds {
        &self.thresholds
    }

    /// Screen one cycle's metrics, updating `baselines` as a side effect.
    ///
    /// Candidates are returned with severity already assigned: High for
    /// an isolated violation, Critical for every violation in a cycle
    /// with [`CRITICAL_VIOLATION_COUNT`] or more of them.
    pub fn detect(&self, set: &MetricSet, baselines: &mut BaselineSet) -> Vec<AnomalyCandidate> {
        let mut candidates = Vec::new();

        for (metric, value) in set.iter() {
            let threshold = self.thresholds.get(metric);
            // Deviation reads the baseline as it stood before this cycle
            let deviation = baselines.deviation(metric, value);
            baselines.observe(metric, value, set.confidence, set.timestamp);

            if value <= threshold {
                continue;
            }

            let score = self.score(value, threshold, deviation, set.confidence);
            if score <= self.floor {
                log::debug!(
                    "suppressing low-confidence {} violation on {}: score {:.3}",
                    metric.name(),
                    set.sensor_id,
                    score
                );
                continue;
            }

            candidates.push(AnomalyCandidate {
                kind: anomaly_kind(metric),
                metric,
                current_value: value,
                threshold,
                confidence_score: score,
                location: set.sensor_id,
                detection_time: set.timestamp,
                severity: Severity::High,
            });
        }

        if candidates.len() >= CRITICAL_VIOLATION_COUNT {
            for c in &mut candidates {
                c.severity = Severity::Critical;
            }
        }

        candidates
    }

    /// Combined confidence score.
    ///
    /// The reading's own confidence carries 90% of the weight; the last
    /// 10% scales with how far the value sits beyond the threshold or
    /// the athlete's baseline (whichever is larger), saturating at
    /// [`BOOST_SATURATION`] relative excess.
    fn score(&self, value: f32, threshold: f32, deviation: f32, confidence: f32) -> f32 {
        let excess = if threshold != 0.0 {
            ((value - threshold) / threshold).max(0.0)
        } else {
            0.0
        };
        let boost = excess.max(deviation).min(BOOST_SATURATION) / BOOST_SATURATION;
        (confidence * (0.9 + 0.1 * boost)).clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(s: &str) -> InlineString {
        InlineString::new(s).unwrap()
    }

    fn set_with(values: &[(MetricKind, f32)], confidence: f32) -> MetricSet {
        let mut set = MetricSet::new(id("quad_l"), id("s1"), 1_000, confidence);
        for &(kind, value) in values {
            set.insert(kind, value);
        }
        set
    }

    #[test]
    fn force_violation_scores_above_floor() {
        // Mean of the four-channel force reading [850, 900, 800, 850]
        let set = set_with(&[(MetricKind::Force, 850.0)], 0.95);
        let detector = AnomalyDetector::default();
        let mut baselines = BaselineSet::new();

        let out = detector.detect(&set, &mut baselines);
        assert_eq!(out.len(), 1);
        let c = &out[0];
        assert_eq!(c.kind, AnomalyKind::Biomechanical);
        assert_eq!(c.metric, MetricKind::Force);
        assert_eq!(c.severity, Severity::High);
        assert_eq!(c.threshold, 800.0);
        assert!(c.confidence_score > 0.85, "score {}", c.confidence_score);
    }

    #[test]
    fn below_threshold_emits_nothing_but_updates_baseline() {
        let set = set_with(&[(MetricKind::Force, 700.0)], 0.99);
        let detector = AnomalyDetector::default();
        let mut baselines = BaselineSet::new();

        assert!(detector.detect(&set, &mut baselines).is_empty());
        assert_eq!(baselines.get(MetricKind::Force).unwrap().value, 700.0);
    }

    #[test]
    fn low_confidence_violation_is_suppressed() {
        // Huge excess cannot rescue a weak reading: 0.7 * 1.0 = 0.7
        let set = set_with(&[(MetricKind::Force, 2_000.0)], 0.7);
        let detector = AnomalyDetector::default();
        let mut baselines = BaselineSet::new();
        assert!(detector.detect(&set, &mut baselines).is_empty());
    }

    #[test]
    fn simultaneous_violations_escalate_to_critical() {
        let set = set_with(
            &[(MetricKind::Force, 900.0), (MetricKind::Impact, 12.0)],
            0.98,
        );
        let detector = AnomalyDetector::default();
        let mut baselines = BaselineSet::new();

        let out = detector.detect(&set, &mut baselines);
        assert_eq!(out.len(), 2);
        assert!(out.iter().all(|c| c.severity == Severity::Critical));
    }

    #[test]
    fn baseline_deviation_raises_score() {
        let detector = AnomalyDetector::default();
        let mut baselines = BaselineSet::new();

        // Establish a calm baseline well below threshold
        for _ in 0..5 {
            let calm = set_with(&[(MetricKind::Impact, 4.0)], 0.95);
            detector.detect(&calm, &mut baselines);
        }

        let spike = set_with(&[(MetricKind::Impact, 9.0)], 0.95);
        let out = detector.detect(&spike, &mut baselines);
        assert_eq!(out.len(), 1);
        // Deviation from the 4g baseline saturates the boost
        assert!((out[0].confidence_score - 0.95).abs() < 1e-5);
    }

    #[test]
    fn physiological_and_performance_metrics_map_to_their_kinds() {
        assert_eq!(
            anomaly_kind(MetricKind::PhysiologicalStrain),
            AnomalyKind::Physiological
        );
        assert_eq!(anomaly_kind(MetricKind::Fatigue), AnomalyKind::Performance);
    }
}
