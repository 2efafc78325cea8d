//! Biomechanical metric derivation
//!
//! Converts calibrated sensor frames into muscle-activity, kinematic, and
//! load-distribution metrics. Every function here is pure with respect to
//! its frame input plus the supplied [`CalibrationProfile`] - no hidden
//! state, so analyses are reproducible and testable in isolation.
//!
//! ## Sensor interpretation
//!
//! The garment reports two physical channels:
//! - **IMU**: body-frame acceleration, angular rate, and magnetic field.
//!   Kinematics come from numerical integration/differentiation of
//!   successive samples, with the angular-rate drift bias removed per the
//!   active calibration.
//! - **ToF**: per-zone ranging against the muscle surface. Engagement
//!   compresses the gap, so activation is measured as deflection from the
//!   most-relaxed distance seen in the window, and zone load is deflection
//!   scaled by a garment spring constant.
//!
//! All arithmetic stays in `f32` with no intermediate quantization, so
//! derived values track the raw calibrated inputs within float rounding.

use kinesense_core::calibration::CalibrationProfile;
use kinesense_core::reading::{ImuSample, InlineString, ReadingPayload, SensorFrame, TofSample};
use kinesense_core::time::Timestamp;
use serde::{Deserialize, Serialize};

use crate::errors::{AnalysisError, AnalysisResult};

/// Number of derived metric kinds
pub const METRIC_KIND_COUNT: usize = 6;

/// Garment spring constant: kilograms of load per millimetre of zone
/// deflection, from the compression-fabric characterization
pub const KG_PER_MM_DEFLECTION: f32 = 0.25;

/// Standard gravity, for impact expressed in g
const GRAVITY_MS2: f32 = 9.80665;

/// The derived metrics the anomaly detector evaluates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MetricKind {
    /// Raw force figure from the accelerometer force channels
    Force,
    /// Left/right load imbalance, percent
    Asymmetry,
    /// Peak impact in g
    Impact,
    /// Angular excursion from neutral posture, degrees
    RangeOfMotionDeviation,
    /// Sustained-load percentage of peak activation
    PhysiologicalStrain,
    /// Activation decline across the analysis window, 0 to 1
    Fatigue,
}

impl MetricKind {
    /// Every kind, in stable index order
    pub const ALL: [MetricKind; METRIC_KIND_COUNT] = [
        MetricKind::Force,
        MetricKind::Asymmetry,
        MetricKind::Impact,
        MetricKind::RangeOfMotionDeviation,
        MetricKind::PhysiologicalStrain,
        MetricKind::Fatigue,
    ];

    /// Stable index for array-backed per-metric state
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Human-readable name
    pub const fn name(self) -> &'static str {
        match self {
            MetricKind::Force => "force",
            MetricKind::Asymmetry => "asymmetry",
            MetricKind::Impact => "impact",
            MetricKind::RangeOfMotionDeviation => "range_of_motion_deviation",
            MetricKind::PhysiologicalStrain => "physiological_strain",
            MetricKind::Fatigue => "fatigue",
        }
    }
}

/// Muscle activation summary over one analysis window
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MuscleMetrics {
    /// Mean zone deflection in mm across the window
    pub mean_activation_mm: f32,
    /// Largest single-zone deflection in mm
    pub peak_activation_mm: f32,
    /// Decline in peak activation from the first to the second half of
    /// the window, 0 (no decline) to 1
    pub fatigue_index: f32,
    /// Sustained load as a percentage of peak: 100 when the muscle never
    /// relaxes below its peak engagement
    pub strain_pct: f32,
    /// Mean confidence of the contributing readings
    pub confidence: f32,
}

/// Movement quality summary over one analysis window
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct KinematicMetrics {
    /// Peak integrated speed in m/s
    pub peak_velocity_ms: f32,
    /// Peak calibrated acceleration magnitude in m/s²
    pub peak_acceleration_ms2: f32,
    /// Peak impact expressed in g
    pub impact_g: f32,
    /// Drift-corrected angular excursion in degrees
    pub range_of_motion_deg: f32,
    /// Inverse of mean jerk, 1 for perfectly smooth movement
    pub smoothness: f32,
}

/// A zone whose load reached the calibrated pressure threshold
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PressurePoint {
    /// Zone index within the ToF grid
    pub zone: usize,
    /// Peak load on the zone in kg
    pub load_kg: f32,
}

/// Force distribution summary over one analysis window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoadMetrics {
    /// Total load across all zones in kg
    pub total_load_kg: f32,
    /// Fraction of total load carried by the left half of the grid,
    /// 0.5 when perfectly balanced or unloaded
    pub left_share: f32,
    /// Left/right imbalance as a percentage of total load
    pub asymmetry_pct: f32,
    /// Zones at or above the calibrated pressure threshold
    pub pressure_points: Vec<PressurePoint>,
}

/// One analysis cycle's metric values, keyed by [`MetricKind`]
///
/// This is what flows from the analyzer to the anomaly detector and out
/// to visualization collaborators. Not every cycle produces every metric
/// (an IMU-only window has no load figures), so entries are optional.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSet {
    /// Sensor the metrics were derived from
    pub sensor_id: InlineString,
    /// Session the sensor belongs to
    pub session_id: InlineString,
    /// Timestamp of the newest contributing reading
    pub timestamp: Timestamp,
    /// Mean confidence of the contributing readings
    pub confidence: f32,
    values: [Option<f32>; METRIC_KIND_COUNT],
}

impl MetricSet {
    /// Create an empty set for one cycle
    pub fn new(
        sensor_id: InlineString,
        session_id: InlineString,
        timestamp: Timestamp,
        confidence: f32,
    ) -> Self {
        Self {
            sensor_id,
            session_id,
            timestamp,
            confidence,
            values: [None; METRIC_KIND_COUNT],
        }
    }

    /// Record a metric value for this cycle
    pub fn insert(&mut self, kind: MetricKind, value: f32) {
        self.values[kind.index()] = Some(value);
    }

    /// Value for `kind`, if this cycle produced it
    pub fn get(&self, kind: MetricKind) -> Option<f32> {
        self.values[kind.index()]
    }

    /// Iterate over the metrics present in this cycle
    pub fn iter(&self) -> impl Iterator<Item = (MetricKind, f32)> + '_ {
        MetricKind::ALL
            .iter()
            .filter_map(|&kind| self.values[kind.index()].map(|v| (kind, v)))
    }

    /// Number of metrics present
    pub fn len(&self) -> usize {
        self.values.iter().filter(|v| v.is_some()).count()
    }

    /// True when no metric was produced this cycle
    pub fn is_empty(&self) -> bool {
        self.values.iter().all(|v| v.is_none())
    }
}

/// Collect IMU samples with timestamps from a frame window, in order
fn imu_samples(frames: &[SensorFrame]) -> Vec<(Timestamp, ImuSample)> {
    let mut out = Vec::new();
    for frame in frames {
        for reading in &frame.readings {
            if let ReadingPayload::Imu(sample) = &reading.payload {
                out.push((reading.timestamp, *sample));
            }
        }
    }
    out
}

/// Collect ToF samples with confidences from a frame window, in order
fn tof_samples(frames: &[SensorFrame]) -> Vec<(f32, TofSample)> {
    let mut out = Vec::new();
    for frame in frames {
        for reading in &frame.readings {
            if let ReadingPayload::Tof(sample) = &reading.payload {
                out.push((reading.confidence, sample.clone()));
            }
        }
    }
    out
}

/// Per-zone deflection series: distance below the most-relaxed (largest)
/// distance that zone reported in the window
fn zone_deflections(samples: &[(f32, TofSample)]) -> Vec<Vec<f32>> {
    let zones = samples
        .iter()
        .map(|(_, s)| s.distances.len())
        .max()
        .unwrap_or(0);

    let mut relaxed = vec![f32::NEG_INFINITY; zones];
    for (_, sample) in samples {
        for (z, &d) in sample.distances.iter().enumerate() {
            if d > relaxed[z] {
                relaxed[z] = d;
            }
        }
    }

    let mut series = vec![Vec::new(); zones];
    for (_, sample) in samples {
        for (z, &d) in sample.distances.iter().enumerate() {
            series[z].push((relaxed[z] - d).max(0.0));
        }
    }
    series
}

/// Derive muscle activation metrics from a window of ToF frames.
///
/// Rejects windows with no ranging data: an all-IMU window cannot speak
/// to muscle engagement.
pub fn analyze_muscle_activity(
    frames: &[SensorFrame],
    _profile: &CalibrationProfile,
) -> AnalysisResult<MuscleMetrics> {
    let samples = tof_samples(frames);
    if samples.is_empty() || samples.iter().all(|(_, s)| s.distances.is_empty()) {
        return Err(AnalysisError::InvalidSensorInput {
            reason: "no ranging readings in window",
        });
    }

    let series = zone_deflections(&samples);

    let mut sum = 0.0f32;
    let mut count = 0usize;
    let mut peak = 0.0f32;
    for zone in &series {
        for &d in zone {
            sum += d;
            count += 1;
            if d > peak {
                peak = d;
            }
        }
    }
    let mean = if count == 0 { 0.0 } else { sum / count as f32 };

    // Fatigue: compare peak engagement across window halves. A tired
    // muscle cannot reproduce its earlier peak.
    let half = (samples.len() / 2).max(1);
    let peak_in = |range: core::ops::Range<usize>| -> f32 {
        let mut p = 0.0f32;
        for zone in &series {
            for i in range.clone() {
                if let Some(&d) = zone.get(i) {
                    if d > p {
                        p = d;
                    }
                }
            }
        }
        p
    };
    let first_peak = peak_in(0..half);
    let second_peak = peak_in(half..samples.len());
    let fatigue_index = if first_peak > 0.0 && samples.len() >= 2 {
        ((first_peak - second_peak) / first_peak).clamp(0.0, 1.0)
    } else {
        0.0
    };

    let strain_pct = if peak > 0.0 { 100.0 * mean / peak } else { 0.0 };

    let confidence = samples.iter().map(|(c, _)| *c).sum::<f32>() / samples.len() as f32;

    Ok(MuscleMetrics {
        mean_activation_mm: mean,
        peak_activation_mm: peak,
        fatigue_index,
        strain_pct,
        confidence,
    })
}

/// Derive movement kinematics from a window of IMU frames.
///
/// Velocity is trapezoidal integration of the calibrated acceleration;
/// angular excursion integrates the gyro magnitude with the calibrated
/// drift bias removed. Needs at least two samples to differentiate.
pub fn analyze_movement_kinematics(
    frames: &[SensorFrame],
    profile: &CalibrationProfile,
) -> AnalysisResult<KinematicMetrics> {
    let samples = imu_samples(frames);
    if samples.len() < 2 {
        return Err(AnalysisError::InvalidSensorInput {
            reason: "need at least two inertial readings",
        });
    }

    let mut peak_speed = 0.0f32;
    let mut velocity = [0.0f32; 3];
    let mut rom_deg = 0.0f32;
    let mut jerk_sum = 0.0f32;
    let mut jerk_count = 0usize;

    // Seed from the first sample
    let mut prev = {
        let (t, s) = samples[0];
        (t, profile.align(s.accel), s.gyro_magnitude())
    };
    let mut prev_accel = prev.1;
    let mut peak_accel = magnitude(prev.1);

    for &(t, sample) in &samples[1..] {
        let accel = profile.align(sample.accel);
        let rate = sample.gyro_magnitude();
        let dt_ms = t.saturating_sub(prev.0);
        if dt_ms == 0 {
            prev = (t, accel, rate);
            continue;
        }
        let dt = dt_ms as f32 / 1000.0;

        let a_mag = magnitude(accel);
        if a_mag > peak_accel {
            peak_accel = a_mag;
        }

        for axis in 0..3 {
            velocity[axis] += 0.5 * (prev.1[axis] + accel[axis]) * dt;
        }
        let speed = magnitude(velocity);
        if speed > peak_speed {
            peak_speed = speed;
        }

        // Drift bias applies symmetrically to both endpoints
        let corrected = |r: f32| (r - profile.imu_drift_correction_deg).max(0.0);
        rom_deg += 0.5 * (corrected(prev.2) + corrected(rate)) * dt;

        for axis in 0..3 {
            let j = (accel[axis] - prev_accel[axis]) / dt;
            jerk_sum += if j < 0.0 { -j } else { j };
        }
        jerk_count += 3;

        prev_accel = accel;
        prev = (t, accel, rate);
    }

    let mean_jerk = if jerk_count == 0 {
        0.0
    } else {
        jerk_sum / jerk_count as f32
    };

    Ok(KinematicMetrics {
        peak_velocity_ms: peak_speed,
        peak_acceleration_ms2: peak_accel,
        impact_g: peak_accel / GRAVITY_MS2,
        range_of_motion_deg: rom_deg,
        smoothness: 1.0 / (1.0 + mean_jerk),
    })
}

/// Derive force distribution from a window of ToF frames.
///
/// Zone load is peak deflection times the garment spring constant.
/// Pressure points are zones at or above the calibrated
/// `pressure_threshold_kg`. Balance splits the grid down the middle:
/// the first half of the zones is the left side.
pub fn calculate_load_distribution(
    frames: &[SensorFrame],
    profile: &CalibrationProfile,
) -> AnalysisResult<LoadMetrics> {
    let samples = tof_samples(frames);
    if samples.is_empty() || samples.iter().all(|(_, s)| s.distances.is_empty()) {
        return Err(AnalysisError::InvalidSensorInput {
            reason: "no ranging readings in window",
        });
    }

    let series = zone_deflections(&samples);
    let zones = series.len();

    let mut loads = Vec::with_capacity(zones);
    for zone in &series {
        let peak = zone.iter().fold(0.0f32, |p, &d| if d > p { d } else { p });
        loads.push(peak * KG_PER_MM_DEFLECTION);
    }

    let pressure_points: Vec<PressurePoint> = loads
        .iter()
        .enumerate()
        .filter(|(_, &kg)| kg >= profile.pressure_threshold_kg)
        .map(|(zone, &kg)| PressurePoint { zone, load_kg: kg })
        .collect();

    let total: f32 = loads.iter().sum();
    let left: f32 = loads[..zones / 2].iter().sum();
    let right = total - left;

    let (left_share, asymmetry_pct) = if total > 0.0 {
        let imbalance = if left > right { left - right } else { right - left };
        (left / total, 100.0 * imbalance / total)
    } else {
        (0.5, 0.0)
    };

    Ok(LoadMetrics {
        total_load_kg: total,
        left_share,
        asymmetry_pct,
        pressure_points,
    })
}

/// Raw force figure for threshold screening: mean absolute value of the
/// accelerometer force channels across the window, in sensor units.
///
/// This intentionally stays in raw units so the static force threshold
/// is comparable across garments regardless of calibration state.
pub fn raw_force(frames: &[SensorFrame]) -> Option<f32> {
    let mut sum = 0.0f32;
    let mut count = 0usize;
    for frame in frames {
        for reading in &frame.readings {
            if let ReadingPayload::Imu(sample) = &reading.payload {
                for &c in &sample.accel {
                    sum += if c < 0.0 { -c } else { c };
                    count += 1;
                }
            }
        }
    }
    if count == 0 {
        None
    } else {
        Some(sum / count as f32)
    }
}

fn magnitude(v: [f32; 3]) -> f32 {
    libm::sqrtf(v[0] * v[0] + v[1] * v[1] + v[2] * v[2])
}
