//! Sensor Reading and Frame Types
//!
//! ## Overview
//!
//! The typed view of everything the garment transmits. Raw characteristic
//! payloads are duck-typed on the wire (a single byte distinguishes IMU from
//! ToF); here they become a tagged variant with exhaustive matching, so no
//! downstream stage ever re-checks a payload's shape at runtime.
//!
//! ## Ownership
//!
//! A [`SensorFrame`] is owned by the pipeline for one processing pass and
//! discarded after downstream consumption. Readings are immutable once
//! constructed; nothing mutates a frame after decode.
//!
//! ## Identifiers
//!
//! Sensor and session ids are short, fixed-alphabet strings assigned by the
//! host ("quad_l_01", "sess_8f2a"). They are stored inline to keep frames
//! and map keys allocation-free.

use core::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::constants::MAX_INLINE_ID;
use crate::time::Timestamp;

/// Sensor type tag, one per garment characteristic
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum SensorKind {
    /// 9-axis inertial unit (accel, gyro, mag) plus die temperature
    Imu = 0,
    /// Multi-zone time-of-flight ranging array
    Tof = 1,
}

impl SensorKind {
    /// Get human-readable name
    pub const fn name(&self) -> &'static str {
        match self {
            SensorKind::Imu => "imu",
            SensorKind::Tof => "tof",
        }
    }

    /// Map a wire tag back to a kind
    pub const fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(SensorKind::Imu),
            1 => Some(SensorKind::Tof),
            _ => None,
        }
    }
}

/// Inline string for sensor and session IDs
///
/// Avoids heap allocation for the id lengths the garment actually uses,
/// and gives the calibration map a `Copy` key.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct InlineString {
    len: u8,
    data: [u8; MAX_INLINE_ID],
}

impl InlineString {
    /// Create from string slice; `None` if it exceeds [`MAX_INLINE_ID`] bytes
    pub fn new(s: &str) -> Option<Self> {
        let bytes = s.as_bytes();
        if bytes.len() > MAX_INLINE_ID {
            return None;
        }

        let mut data = [0u8; MAX_INLINE_ID];
        data[..bytes.len()].copy_from_slice(bytes);

        Some(Self {
            len: bytes.len() as u8,
            data,
        })
    }

    /// Get as string slice
    pub fn as_str(&self) -> &str {
        // Only valid UTF-8 is stored by new()
        core::str::from_utf8(&self.data[..self.len as usize]).unwrap_or("")
    }

    /// Raw id bytes, as fed to the integrity digest
    pub fn as_bytes(&self) -> &[u8] {
        &self.data[..self.len as usize]
    }
}

impl fmt::Debug for InlineString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.as_str())
    }
}

impl fmt::Display for InlineString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for InlineString {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for InlineString {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        InlineString::new(&s).ok_or_else(|| {
            serde::de::Error::invalid_length(s.len(), &"an id of at most MAX_INLINE_ID bytes")
        })
    }
}

/// One inertial sample: body-frame acceleration, angular rate, field, and
/// die temperature
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ImuSample {
    /// Acceleration in m/s², body frame
    pub accel: [f32; 3],
    /// Angular rate in deg/s, body frame
    pub gyro: [f32; 3],
    /// Magnetic field in µT
    pub mag: [f32; 3],
    /// Die temperature in °C
    pub temperature_c: f32,
}

impl ImuSample {
    /// Euclidean magnitude of the acceleration vector
    pub fn accel_magnitude(&self) -> f32 {
        let [x, y, z] = self.accel;
        libm::sqrtf(x * x + y * y + z * z)
    }

    /// Euclidean magnitude of the angular rate vector
    pub fn gyro_magnitude(&self) -> f32 {
        let [x, y, z] = self.gyro;
        libm::sqrtf(x * x + y * y + z * z)
    }
}

/// One time-of-flight sample: per-zone distances plus amplifier state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TofSample {
    /// Distance per zone in mm; zone count varies with the configured grid
    pub distances: Vec<f32>,
    /// Amplifier gain active for this sample
    pub gain: f32,
    /// Ambient light level, sensor units
    pub ambient: f32,
}

/// Tagged sensor payload - the only place payload shape is distinguished
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ReadingPayload {
    /// Inertial sample
    Imu(ImuSample),
    /// Time-of-flight sample
    Tof(TofSample),
}

impl ReadingPayload {
    /// Kind tag for this payload
    pub fn kind(&self) -> SensorKind {
        match self {
            ReadingPayload::Imu(_) => SensorKind::Imu,
            ReadingPayload::Tof(_) => SensorKind::Tof,
        }
    }

    /// Flat view of every numeric value in the payload, in wire order
    pub fn values(&self) -> Vec<f32> {
        match self {
            ReadingPayload::Imu(s) => {
                let mut v = Vec::with_capacity(10);
                v.extend_from_slice(&s.accel);
                v.extend_from_slice(&s.gyro);
                v.extend_from_slice(&s.mag);
                v.push(s.temperature_c);
                v
            }
            ReadingPayload::Tof(s) => {
                let mut v = Vec::with_capacity(s.distances.len() + 2);
                v.extend_from_slice(&s.distances);
                v.push(s.gain);
                v.push(s.ambient);
                v
            }
        }
    }
}

/// A single timestamped, confidence-weighted sensor reading
///
/// Immutable once constructed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorReading {
    /// Typed payload
    pub payload: ReadingPayload,
    /// Capture time in milliseconds
    pub timestamp: Timestamp,
    /// Reading confidence in [0, 1], reported by the sensor front-end
    pub confidence: f32,
}

impl SensorReading {
    /// Construct a reading, clamping confidence into [0, 1]
    pub fn new(payload: ReadingPayload, timestamp: Timestamp, confidence: f32) -> Self {
        Self {
            payload,
            timestamp,
            confidence: confidence.clamp(0.0, 1.0),
        }
    }
}

/// All readings captured in one sampling window of one sensor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorFrame {
    /// Originating sensor (e.g. "quad_l_01")
    pub sensor_id: InlineString,
    /// Host session this frame belongs to
    pub session_id: InlineString,
    /// Sensor type; every reading's payload matches it
    pub sensor_kind: SensorKind,
    /// Window start in milliseconds
    pub timestamp: Timestamp,
    /// Garment battery level, percent
    pub battery_level: u8,
    /// Version of the calibration active when the frame was captured
    pub calibration_version: u32,
    /// Readings in capture order
    pub readings: Vec<SensorReading>,
    /// Aggregate quality in [0, 100], derived from reading confidence
    pub data_quality: f32,
    /// Time spent in the pipeline so far, filled by the worker
    pub processing_latency_ms: u32,
}

impl SensorFrame {
    /// Assemble a frame, deriving `data_quality` from reading confidence
    pub fn new(
        sensor_id: InlineString,
        session_id: InlineString,
        sensor_kind: SensorKind,
        timestamp: Timestamp,
        battery_level: u8,
        calibration_version: u32,
        readings: Vec<SensorReading>,
    ) -> Self {
        let data_quality = if readings.is_empty() {
            0.0
        } else {
            let sum: f32 = readings.iter().map(|r| r.confidence).sum();
            (sum / readings.len() as f32) * 100.0
        };

        Self {
            sensor_id,
            session_id,
            sensor_kind,
            timestamp,
            battery_level,
            calibration_version,
            readings,
            data_quality,
            processing_latency_ms: 0,
        }
    }

    /// Flat view of every sample value in the frame, in wire order
    ///
    /// This is the buffer handed to the compression engine for the audit
    /// record.
    pub fn sample_values(&self) -> Vec<f32> {
        self.readings
            .iter()
            .flat_map(|r| r.payload.values())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inline_string_round_trip() {
        let s = InlineString::new("quad_l_01").unwrap();
        assert_eq!(s.as_str(), "quad_l_01");
        assert_eq!(s.as_bytes(), b"quad_l_01");

        // Too long
        assert!(InlineString::new("this_id_is_far_too_long_to_inline").is_none());
    }

    #[test]
    fn payload_kind_matches_variant() {
        let imu = ReadingPayload::Imu(ImuSample {
            accel: [0.0, 0.0, 9.81],
            gyro: [0.0; 3],
            mag: [20.0, 0.0, 40.0],
            temperature_c: 31.5,
        });
        assert_eq!(imu.kind(), SensorKind::Imu);
        assert_eq!(imu.values().len(), 10);

        let tof = ReadingPayload::Tof(TofSample {
            distances: vec![120.0, 118.5, 121.0],
            gain: 4.0,
            ambient: 0.2,
        });
        assert_eq!(tof.kind(), SensorKind::Tof);
        assert_eq!(tof.values().len(), 5);
    }

    #[test]
    fn frame_quality_from_confidence() {
        let id = InlineString::new("quad_l_01").unwrap();
        let session = InlineString::new("sess_01").unwrap();

        let readings = vec![
            SensorReading::new(
                ReadingPayload::Imu(ImuSample {
                    accel: [0.0, 0.0, 9.81],
                    gyro: [0.0; 3],
                    mag: [0.0; 3],
                    temperature_c: 30.0,
                }),
                1000,
                0.9,
            ),
            SensorReading::new(
                ReadingPayload::Imu(ImuSample {
                    accel: [0.1, 0.0, 9.78],
                    gyro: [0.0; 3],
                    mag: [0.0; 3],
                    temperature_c: 30.0,
                }),
                1010,
                0.7,
            ),
        ];

        let frame = SensorFrame::new(id, session, SensorKind::Imu, 1000, 88, 3, readings);
        assert!((frame.data_quality - 80.0).abs() < 1e-4);
    }

    #[test]
    fn confidence_is_clamped() {
        let reading = SensorReading::new(
            ReadingPayload::Tof(TofSample {
                distances: vec![100.0],
                gain: 2.0,
                ambient: 0.0,
            }),
            0,
            1.7,
        );
        assert_eq!(reading.confidence, 1.0);
    }
}
