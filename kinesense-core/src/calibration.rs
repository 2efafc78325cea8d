//! Per-Sensor Calibration Profiles and Their Store
//!
//! ## Overview
//!
//! Every sensor on the garment carries a parameter set tuned during
//! calibration: ToF amplifier gain, IMU drift correction, the pressure
//! threshold used for load analysis, the sampling window, and the low-pass
//! cutoff. Analysis without a current profile produces numbers that look
//! plausible and are quietly wrong, so the store is strict: out-of-range
//! parameters are rejected with the exact violated field, and profiles
//! expire 24 hours after calibration.
//!
//! ## Validation
//!
//! Each parameter is checked against its documented range and yields its
//! own error variant (`InvalidTofGain`, `InvalidDriftCorrection`, ...)
//! rather than a generic failure, so the host can tell the operator which
//! knob to fix. NaN never passes a range check.
//!
//! ## Concurrency
//!
//! The streaming path reads profiles on every frame; calibrate/adjust are
//! operator actions and rare. An `RwLock` over a bounded index map gives
//! the read-mostly pattern its cheap path while writes take the exclusive
//! lock.

use std::sync::RwLock;

use heapless::FnvIndexMap;
use serde::{Deserialize, Serialize};

use crate::constants::{
    CALIBRATION_TTL_MS, FILTER_CUTOFF_MAX_HZ, FILTER_CUTOFF_MIN_HZ, IMU_DRIFT_MAX_DEG,
    IMU_DRIFT_MIN_DEG, MAX_SENSORS, PRESSURE_THRESHOLD_MAX_KG, PRESSURE_THRESHOLD_MIN_KG,
    SAMPLE_WINDOW_MAX_MS, SAMPLE_WINDOW_MIN_MS, TOF_GAIN_MAX, TOF_GAIN_MIN,
};
use crate::errors::{CalibrationError, CalibrationResult};
use crate::reading::InlineString;
use crate::time::{TimeSource, Timestamp};

/// One sensor's calibration parameter set
///
/// Mutable only through the store's validated operations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationProfile {
    /// ToF amplifier gain, [1, 16]
    pub tof_gain: f32,
    /// IMU drift correction in degrees per sampling window, [0.1, 2.0]
    pub imu_drift_correction_deg: f32,
    /// Pressure-point detection threshold in kg, [0.1, 5.0]
    pub pressure_threshold_kg: f32,
    /// Sampling window in ms, [50, 500]
    pub sample_window_ms: u32,
    /// Low-pass filter cutoff in Hz, [0.5, 10]
    pub filter_cutoff_hz: f32,
    /// Row-major 3×3 axis alignment matrix applied to IMU vectors
    pub calibration_matrix: [f32; 9],
    /// When this profile was produced; expiry runs from here
    pub last_calibrated_at: Timestamp,
}

impl Default for CalibrationProfile {
    fn default() -> Self {
        Self {
            tof_gain: 4.0,
            imu_drift_correction_deg: 0.5,
            pressure_threshold_kg: 1.0,
            sample_window_ms: 100,
            filter_cutoff_hz: 5.0,
            // Identity: sensor axes already aligned with the body segment
            calibration_matrix: [1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0],
            last_calibrated_at: 0,
        }
    }
}

impl CalibrationProfile {
    /// Check every parameter against its documented range.
    ///
    /// The first violated field determines the error; NaN fails the range
    /// check for its field like any other out-of-range value.
    pub fn validate(&self) -> CalibrationResult<()> {
        if !(TOF_GAIN_MIN..=TOF_GAIN_MAX).contains(&self.tof_gain) {
            return Err(CalibrationError::InvalidTofGain {
                value: self.tof_gain,
            });
        }
        if !(IMU_DRIFT_MIN_DEG..=IMU_DRIFT_MAX_DEG).contains(&self.imu_drift_correction_deg) {
            return Err(CalibrationError::InvalidDriftCorrection {
                value: self.imu_drift_correction_deg,
            });
        }
        if !(PRESSURE_THRESHOLD_MIN_KG..=PRESSURE_THRESHOLD_MAX_KG)
            .contains(&self.pressure_threshold_kg)
        {
            return Err(CalibrationError::InvalidPressureThreshold {
                value: self.pressure_threshold_kg,
            });
        }
        if !(SAMPLE_WINDOW_MIN_MS..=SAMPLE_WINDOW_MAX_MS).contains(&self.sample_window_ms) {
            return Err(CalibrationError::InvalidSampleWindow {
                value: self.sample_window_ms,
            });
        }
        if !(FILTER_CUTOFF_MIN_HZ..=FILTER_CUTOFF_MAX_HZ).contains(&self.filter_cutoff_hz) {
            return Err(CalibrationError::InvalidFilterCutoff {
                value: self.filter_cutoff_hz,
            });
        }
        Ok(())
    }

    /// Whether the 24h validity window has passed at `now`
    pub fn is_expired(&self, now: Timestamp) -> bool {
        now.saturating_sub(self.last_calibrated_at) > CALIBRATION_TTL_MS
    }

    /// Apply the alignment matrix to a body-frame vector
    pub fn align(&self, v: [f32; 3]) -> [f32; 3] {
        let m = &self.calibration_matrix;
        [
            m[0] * v[0] + m[1] * v[1] + m[2] * v[2],
            m[3] * v[0] + m[4] * v[1] + m[5] * v[2],
            m[6] * v[0] + m[7] * v[1] + m[8] * v[2],
        ]
    }
}

/// Partial parameter update for [`CalibrationStore::adjust`]
///
/// `None` fields keep their current value; the merged result is validated
/// as a whole before anything is committed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CalibrationAdjust {
    /// New ToF gain, if changing
    pub tof_gain: Option<f32>,
    /// New drift correction, if changing
    pub imu_drift_correction_deg: Option<f32>,
    /// New pressure threshold, if changing
    pub pressure_threshold_kg: Option<f32>,
    /// New sampling window, if changing
    pub sample_window_ms: Option<u32>,
    /// New filter cutoff, if changing
    pub filter_cutoff_hz: Option<f32>,
    /// New alignment matrix, if changing
    pub calibration_matrix: Option<[f32; 9]>,
}

impl CalibrationAdjust {
    fn merge_into(&self, profile: &CalibrationProfile) -> CalibrationProfile {
        CalibrationProfile {
            tof_gain: self.tof_gain.unwrap_or(profile.tof_gain),
            imu_drift_correction_deg: self
                .imu_drift_correction_deg
                .unwrap_or(profile.imu_drift_correction_deg),
            pressure_threshold_kg: self
                .pressure_threshold_kg
                .unwrap_or(profile.pressure_threshold_kg),
            sample_window_ms: self.sample_window_ms.unwrap_or(profile.sample_window_ms),
            filter_cutoff_hz: self.filter_cutoff_hz.unwrap_or(profile.filter_cutoff_hz),
            calibration_matrix: self
                .calibration_matrix
                .unwrap_or(profile.calibration_matrix),
            last_calibrated_at: profile.last_calibrated_at,
        }
    }
}

/// Bounded, read-mostly store of one profile per sensor
pub struct CalibrationStore<C: TimeSource> {
    profiles: RwLock<FnvIndexMap<InlineString, CalibrationProfile, MAX_SENSORS>>,
    clock: C,
}

impl<C: TimeSource> CalibrationStore<C> {
    /// Create an empty store reading time from `clock`
    pub fn new(clock: C) -> Self {
        Self {
            profiles: RwLock::new(FnvIndexMap::new()),
            clock,
        }
    }

    /// Validate and install a profile for `sensor_id`.
    ///
    /// The stored profile is stamped with the current time; an invalid
    /// profile leaves any existing one untouched.
    pub fn calibrate(&self, sensor_id: &str, profile: CalibrationProfile) -> CalibrationResult<()> {
        let key = InlineString::new(sensor_id).ok_or(CalibrationError::InvalidSensorId)?;
        profile.validate()?;

        let stamped = CalibrationProfile {
            last_calibrated_at: self.clock.now(),
            ..profile
        };

        let mut map = self.write_lock();
        map.insert(key, stamped)
            .map_err(|_| {
                log::warn!("calibration store full ({MAX_SENSORS} sensors), rejecting {sensor_id}");
                CalibrationError::StoreFull {
                    capacity: MAX_SENSORS,
                }
            })?;
        log::debug!("calibrated {sensor_id}");
        Ok(())
    }

    /// Merge a partial update into the existing profile and re-validate.
    ///
    /// Requires a current (non-expired) profile; adjustment tunes
    /// parameters but does not renew the calibration deadline.
    pub fn adjust(
        &self,
        sensor_id: &str,
        params: &CalibrationAdjust,
    ) -> CalibrationResult<CalibrationProfile> {
        let key = InlineString::new(sensor_id).ok_or(CalibrationError::InvalidSensorId)?;
        let now = self.clock.now();

        let mut map = self.write_lock();
        let current = map.get(&key).ok_or(CalibrationError::NotCalibrated)?;
        if current.is_expired(now) {
            return Err(CalibrationError::NotCalibrated);
        }

        let merged = params.merge_into(current);
        merged.validate()?;

        // Re-insert on an existing key never hits capacity
        let _ = map.insert(key, merged.clone());
        log::debug!("adjusted calibration for {sensor_id}");
        Ok(merged)
    }

    /// Current profile for `sensor_id`.
    ///
    /// An expired profile is reported as [`CalibrationError::NotCalibrated`],
    /// forcing recalibration rather than serving stale parameters.
    pub fn status(&self, sensor_id: &str) -> CalibrationResult<CalibrationProfile> {
        let key = InlineString::new(sensor_id).ok_or(CalibrationError::InvalidSensorId)?;
        let map = self.read_lock();
        let profile = map.get(&key).ok_or(CalibrationError::NotCalibrated)?;

        if profile.is_expired(self.clock.now()) {
            return Err(CalibrationError::NotCalibrated);
        }
        Ok(profile.clone())
    }

    /// Profile for the streaming path, distinguishing staleness from absence
    /// so the per-frame log line says which one it was.
    pub fn active_profile(&self, sensor_id: &InlineString) -> CalibrationResult<CalibrationProfile> {
        let map = self.read_lock();
        let profile = map.get(sensor_id).ok_or(CalibrationError::NotCalibrated)?;

        let now = self.clock.now();
        if profile.is_expired(now) {
            let deadline = profile.last_calibrated_at + CALIBRATION_TTL_MS;
            return Err(CalibrationError::Expired {
                age_ms: now.saturating_sub(deadline),
            });
        }
        Ok(profile.clone())
    }

    /// Drop the profile for `sensor_id`, if any
    pub fn remove(&self, sensor_id: &str) {
        if let Some(key) = InlineString::new(sensor_id) {
            self.write_lock().remove(&key);
        }
    }

    fn read_lock(
        &self,
    ) -> std::sync::RwLockReadGuard<'_, FnvIndexMap<InlineString, CalibrationProfile, MAX_SENSORS>>
    {
        self.profiles.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write_lock(
        &self,
    ) -> std::sync::RwLockWriteGuard<'_, FnvIndexMap<InlineString, CalibrationProfile, MAX_SENSORS>>
    {
        self.profiles.write().unwrap_or_else(|e| e.into_inner())
    }
}
