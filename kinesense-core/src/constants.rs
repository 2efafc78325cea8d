//! Tunable Constants for the Kinesense Pipeline
//!
//! Every threshold, capacity, and range that governs pipeline behavior lives
//! here rather than being scattered through the modules that use it. Values
//! that originated as apparent constants in the garment firmware (compression
//! target, baseline smoothing, confidence floor) are kept configurable here
//! instead of hard-coded at the point of use.

/// Frame magic prefix, little-endian on the wire.
///
/// Lets the streaming layer resynchronize after a ring overwrite clips the
/// front of a frame. Not covered by the integrity checksum.
pub const FRAME_MAGIC: u16 = 0xB105;

/// Maximum bytes a single encoded frame may occupy.
///
/// A full frame of [`MAX_FRAME_READINGS`] ToF readings with every zone
/// populated stays well under this. Lengths above it are treated as a
/// malformed header, not a frame to wait for.
pub const MAX_FRAME_BYTES: usize = 512 * 1024;

/// Maximum readings per frame (one sampling window at the highest rate).
pub const MAX_FRAME_READINGS: usize = 1000;

/// Maximum distance zones in a single ToF reading.
pub const MAX_TOF_ZONES: usize = 64;

/// Maximum inline length for sensor and session identifiers.
pub const MAX_INLINE_ID: usize = 15;

/// Maximum concurrently calibrated sensors (power of two for the index map).
pub const MAX_SENSORS: usize = 16;

/// Required compression ratio (raw / compressed) for stored sample buffers.
pub const TARGET_COMPRESSION_RATIO: f32 = 10.0;

/// Deflate level handed to miniz_oxide; 10 is its maximum effort setting.
pub const COMPRESSION_LEVEL: u8 = 10;

/// Calibration profiles expire this long after `last_calibrated_at`.
pub const CALIBRATION_TTL_MS: u64 = 24 * 60 * 60 * 1000;

/// Lower bound for ToF amplifier gain.
pub const TOF_GAIN_MIN: f32 = 1.0;
/// Upper bound for ToF amplifier gain.
pub const TOF_GAIN_MAX: f32 = 16.0;

/// Lower bound for IMU drift correction, degrees per sampling window.
pub const IMU_DRIFT_MIN_DEG: f32 = 0.1;
/// Upper bound for IMU drift correction, degrees per sampling window.
pub const IMU_DRIFT_MAX_DEG: f32 = 2.0;

/// Lower bound for the pressure-point detection threshold.
pub const PRESSURE_THRESHOLD_MIN_KG: f32 = 0.1;
/// Upper bound for the pressure-point detection threshold.
pub const PRESSURE_THRESHOLD_MAX_KG: f32 = 5.0;

/// Lower bound for the sampling window.
pub const SAMPLE_WINDOW_MIN_MS: u32 = 50;
/// Upper bound for the sampling window.
pub const SAMPLE_WINDOW_MAX_MS: u32 = 500;

/// Lower bound for the low-pass filter cutoff.
pub const FILTER_CUTOFF_MIN_HZ: f32 = 0.5;
/// Upper bound for the low-pass filter cutoff.
pub const FILTER_CUTOFF_MAX_HZ: f32 = 10.0;

/// End-to-end budget for one frame (decode through candidate emission).
///
/// A miss is logged, never raised as an error; see the pipeline module.
pub const FRAME_LATENCY_BUDGET_MS: u64 = 100;
