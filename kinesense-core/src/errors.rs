//! Error Types for the Frame, Compression, and Calibration Layers
//!
//! ## Design Philosophy
//!
//! Errors on the streaming path follow three rules:
//!
//! 1. **Per-frame, never per-stream**: an integrity or format failure drops
//!    that one frame; it must not halt ingestion. The error types carry
//!    enough context to log the drop and move on.
//!
//! 2. **Field-specific, never generic**: calibration callers need to surface
//!    the exact violated parameter to the operator, so every range check has
//!    its own variant rather than a shared "invalid profile" failure.
//!
//! 3. **Caller decides on shortfall**: a compression ratio below target is
//!    reported together with the compressed payload, so the caller can still
//!    accept the degraded result instead of redoing the work.
//!
//! Corrupted frames are unrecoverable by construction (the checksum covers
//! every field), so there is no retry path for [`FrameError::Integrity`].

use thiserror_no_std::Error;

use crate::compress::Compressed;

/// Result type for frame codec operations
pub type FrameResult<T> = Result<T, FrameError>;

/// Result type for calibration operations
pub type CalibrationResult<T> = Result<T, CalibrationError>;

/// Frame decoding failures - fatal to the frame, never to the stream
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameError {
    /// Checksum mismatch; the frame is corrupt and dropped without retry.
    ///
    /// Carries the leading word of each digest so logs can distinguish
    /// repeated corruption of one frame from a stream of distinct failures.
    #[error("integrity check failed (stored {stored:08x}, computed {computed:08x})")]
    Integrity {
        /// First word of the digest stored in the frame
        stored: u32,
        /// First word of the digest computed from the payload
        computed: u32,
    },

    /// Binary layout violates the wire format
    #[error("malformed frame: {reason}")]
    Format {
        /// Which structural rule was violated
        reason: &'static str,
    },

    /// Buffer ends before the declared frame length
    #[error("truncated frame: need {required} bytes, have {available}")]
    Truncated {
        /// Bytes the header declares
        required: usize,
        /// Bytes actually present
        available: usize,
    },

    /// Sensor type byte has no known mapping
    #[error("unknown sensor type tag {0}")]
    UnknownSensorType(u8),
}

/// Compression engine failures
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CompressionError {
    /// Achieved ratio fell short of the configured target.
    ///
    /// The compressed payload is included so the caller can accept the
    /// degraded ratio rather than discard the sample.
    #[error("compression ratio below target {target:.2}")]
    Shortfall {
        /// The result that missed the target
        compressed: Compressed,
        /// Ratio that was required
        target: f32,
    },

    /// Deflate stream cannot be inflated
    #[error("compressed payload is corrupt")]
    Corrupt,

    /// Inflated byte count is not a whole number of samples
    #[error("decompressed length {len} is not a multiple of the sample size")]
    Misaligned {
        /// Byte length that failed to divide evenly
        len: usize,
    },
}

/// Calibration failures - fatal to the requested operation only
#[derive(Error, Debug, Clone, Copy, PartialEq)]
pub enum CalibrationError {
    /// ToF gain outside [1, 16]
    #[error("tof gain {value} outside [{min}, {max}]", min = crate::constants::TOF_GAIN_MIN, max = crate::constants::TOF_GAIN_MAX)]
    InvalidTofGain {
        /// Rejected gain value
        value: f32,
    },

    /// IMU drift correction outside [0.1, 2.0] degrees
    #[error("drift correction {value}° outside [{min}°, {max}°]", min = crate::constants::IMU_DRIFT_MIN_DEG, max = crate::constants::IMU_DRIFT_MAX_DEG)]
    InvalidDriftCorrection {
        /// Rejected correction value
        value: f32,
    },

    /// Pressure threshold outside [0.1, 5.0] kg
    #[error("pressure threshold {value}kg outside [{min}kg, {max}kg]", min = crate::constants::PRESSURE_THRESHOLD_MIN_KG, max = crate::constants::PRESSURE_THRESHOLD_MAX_KG)]
    InvalidPressureThreshold {
        /// Rejected threshold value
        value: f32,
    },

    /// Sample window outside [50, 500] ms
    #[error("sample window {value}ms outside [{min}ms, {max}ms]", min = crate::constants::SAMPLE_WINDOW_MIN_MS, max = crate::constants::SAMPLE_WINDOW_MAX_MS)]
    InvalidSampleWindow {
        /// Rejected window length
        value: u32,
    },

    /// Filter cutoff outside [0.5, 10] Hz
    #[error("filter cutoff {value}Hz outside [{min}Hz, {max}Hz]", min = crate::constants::FILTER_CUTOFF_MIN_HZ, max = crate::constants::FILTER_CUTOFF_MAX_HZ)]
    InvalidFilterCutoff {
        /// Rejected cutoff frequency
        value: f32,
    },

    /// Profile exists but its 24h validity window has passed
    #[error("calibration expired {age_ms}ms ago")]
    Expired {
        /// Milliseconds past the expiry deadline
        age_ms: u64,
    },

    /// No usable profile for this sensor; recalibration required
    #[error("sensor not calibrated")]
    NotCalibrated,

    /// Identifier does not fit the inline id limit
    #[error("sensor id exceeds {max} bytes", max = crate::constants::MAX_INLINE_ID)]
    InvalidSensorId,

    /// Store is at capacity for distinct sensors
    #[error("calibration store full ({capacity} sensors)")]
    StoreFull {
        /// Configured sensor capacity
        capacity: usize,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_errors_stay_small() {
        // Returned on the hot path; keep them register-friendly
        assert!(core::mem::size_of::<FrameError>() <= 24);
        assert!(core::mem::size_of::<CalibrationError>() <= 16);
    }

    #[test]
    fn errors_render_context() {
        let err = FrameError::Truncated {
            required: 128,
            available: 40,
        };
        assert_eq!(err.to_string(), "truncated frame: need 128 bytes, have 40");

        let err = CalibrationError::InvalidTofGain { value: 20.0 };
        assert!(err.to_string().contains("20"));
    }
}
