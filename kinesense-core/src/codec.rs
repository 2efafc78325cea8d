//! Frame Codec: Wire Format and Integrity Verification
//!
//! ## Wire Format
//!
//! All integers and floats are little-endian. One frame:
//!
//! ```text
//! ┌────────────┬───────────┬─────────────────────────────┬────────────┐
//! │ magic u16  │ total u32 │ header + readings block     │ digest 32B │
//! └────────────┴───────────┴─────────────────────────────┴────────────┘
//!
//! header:
//!   id_len u8, id bytes            sensor id (≤ 15 bytes)
//!   session_len u8, session bytes  session id (≤ 15 bytes)
//!   timestamp u64                  window start, ms
//!   kind u8                        0 = IMU, 1 = ToF
//!   battery u8                     percent
//!   calibration_version u32
//!   data_quality f32
//!   processing_latency_ms u32
//!
//! readings block:
//!   count u16, then per reading:
//!     timestamp u64, confidence f32, payload
//!   IMU payload: accel×3, gyro×3, mag×3, temperature  (10 × f32)
//!   ToF payload: zones u16, zones × f32, gain f32, ambient f32
//! ```
//!
//! Payload shape is fixed by the frame-level kind byte; readings carry no
//! per-reading tag since a characteristic never interleaves sensor types.
//!
//! ## Integrity
//!
//! The trailing digest is SHA-256 over
//! `sensor_id ‖ timestamp ‖ kind ‖ readings block ‖ battery ‖
//! calibration_version ‖ session_id`. A mismatch means the frame is
//! corrupt and unrecoverable; it is dropped, never retried. The magic and
//! length words are framing, not payload, and are deliberately outside the
//! digest so a resync never changes what the checksum covers.
//!
//! ## Resynchronization
//!
//! When the streaming ring overwrites the front of a partially received
//! frame, the next [`frame_len`] call sees a bad magic and reports
//! [`FrameError::Format`]; the dispatch layer then skips bytes until the
//! next magic. Corruption inside a frame body survives framing but is
//! caught by the digest.

use sha2::{Digest, Sha256};

use crate::constants::{
    FRAME_MAGIC, MAX_FRAME_BYTES, MAX_FRAME_READINGS, MAX_INLINE_ID, MAX_TOF_ZONES,
};
use crate::errors::{FrameError, FrameResult};
use crate::reading::{
    ImuSample, InlineString, ReadingPayload, SensorFrame, SensorKind, SensorReading, TofSample,
};

/// Digest length appended to every frame
pub const DIGEST_LEN: usize = 32;

/// Magic word plus total-length word
const FRAMING_LEN: usize = 6;

/// Smallest structurally possible frame (empty ids, zero readings)
const MIN_FRAME_BYTES: usize = FRAMING_LEN + 2 + 8 + 1 + 1 + 4 + 4 + 4 + 2 + DIGEST_LEN;

/// Peek at a byte prefix and report the full frame length, if knowable.
///
/// - `Ok(None)` - not enough bytes yet to read the framing words; wait for
///   more data (transient underflow, not an error).
/// - `Ok(Some(len))` - a frame of `len` total bytes starts here.
/// - `Err(Format)` - the prefix cannot start a frame; skip and resync.
pub fn frame_len(buf: &[u8]) -> FrameResult<Option<usize>> {
    if buf.len() < FRAMING_LEN {
        return Ok(None);
    }

    let magic = u16::from_le_bytes([buf[0], buf[1]]);
    if magic != FRAME_MAGIC {
        return Err(FrameError::Format {
            reason: "bad magic",
        });
    }

    let total = u32::from_le_bytes([buf[2], buf[3], buf[4], buf[5]]) as usize;
    if !(MIN_FRAME_BYTES..=MAX_FRAME_BYTES).contains(&total) {
        return Err(FrameError::Format {
            reason: "declared length out of bounds",
        });
    }

    Ok(Some(total))
}

/// Encode a frame into its wire representation, digest included.
///
/// Panics if the frame holds more than [`MAX_FRAME_READINGS`] readings;
/// the count field could not represent it and the bytes would never
/// decode.
pub fn encode(frame: &SensorFrame) -> Vec<u8> {
    assert!(
        frame.readings.len() <= MAX_FRAME_READINGS,
        "frame exceeds {MAX_FRAME_READINGS} readings"
    );
    let readings_block = encode_readings(frame);
    let digest = integrity_digest(frame, &readings_block);

    let mut out = Vec::with_capacity(
        MIN_FRAME_BYTES + frame.sensor_id.as_bytes().len()
            + frame.session_id.as_bytes().len()
            + readings_block.len(),
    );

    out.extend_from_slice(&FRAME_MAGIC.to_le_bytes());
    out.extend_from_slice(&0u32.to_le_bytes()); // patched below

    out.push(frame.sensor_id.as_bytes().len() as u8);
    out.extend_from_slice(frame.sensor_id.as_bytes());
    out.push(frame.session_id.as_bytes().len() as u8);
    out.extend_from_slice(frame.session_id.as_bytes());
    out.extend_from_slice(&frame.timestamp.to_le_bytes());
    out.push(frame.sensor_kind as u8);
    out.push(frame.battery_level);
    out.extend_from_slice(&frame.calibration_version.to_le_bytes());
    out.extend_from_slice(&frame.data_quality.to_le_bytes());
    out.extend_from_slice(&frame.processing_latency_ms.to_le_bytes());
    out.extend_from_slice(&readings_block);
    out.extend_from_slice(&digest);

    let total = out.len() as u32;
    out[2..6].copy_from_slice(&total.to_le_bytes());
    out
}

/// Decode and verify one complete frame.
///
/// Structural violations yield [`FrameError::Format`] /
/// [`FrameError::Truncated`]; a frame that parses but fails the digest
/// yields [`FrameError::Integrity`].
pub fn decode(buf: &[u8]) -> FrameResult<SensorFrame> {
    let declared = match frame_len(buf)? {
        Some(len) => len,
        None => {
            return Err(FrameError::Truncated {
                required: FRAMING_LEN,
                available: buf.len(),
            })
        }
    };

    if buf.len() < declared {
        return Err(FrameError::Truncated {
            required: declared,
            available: buf.len(),
        });
    }

    let mut cur = Cursor::new(&buf[..declared - DIGEST_LEN], FRAMING_LEN);

    let (sensor_id, id_bytes) = cur.take_id()?;
    let (session_id, session_bytes) = cur.take_id()?;
    let timestamp = cur.take_u64()?;
    let kind_tag = cur.take_u8()?;
    let sensor_kind =
        SensorKind::from_tag(kind_tag).ok_or(FrameError::UnknownSensorType(kind_tag))?;
    let battery_level = cur.take_u8()?;
    let calibration_version = cur.take_u32()?;
    let data_quality = cur.take_f32()?;
    let processing_latency_ms = cur.take_u32()?;

    let readings_start = cur.pos;
    let count = cur.take_u16()? as usize;
    if count > MAX_FRAME_READINGS {
        return Err(FrameError::Format {
            reason: "reading count exceeds frame limit",
        });
    }

    let mut readings = Vec::with_capacity(count);
    for _ in 0..count {
        let reading_ts = cur.take_u64()?;
        let confidence = cur.take_f32()?;
        let payload = match sensor_kind {
            SensorKind::Imu => {
                let mut values = [0f32; 10];
                for v in &mut values {
                    *v = cur.take_f32()?;
                }
                ReadingPayload::Imu(ImuSample {
                    accel: [values[0], values[1], values[2]],
                    gyro: [values[3], values[4], values[5]],
                    mag: [values[6], values[7], values[8]],
                    temperature_c: values[9],
                })
            }
            SensorKind::Tof => {
                let zones = cur.take_u16()? as usize;
                if zones > MAX_TOF_ZONES {
                    return Err(FrameError::Format {
                        reason: "tof zone count exceeds limit",
                    });
                }
                let mut distances = Vec::with_capacity(zones);
                for _ in 0..zones {
                    distances.push(cur.take_f32()?);
                }
                let gain = cur.take_f32()?;
                let ambient = cur.take_f32()?;
                ReadingPayload::Tof(TofSample {
                    distances,
                    gain,
                    ambient,
                })
            }
        };
        readings.push(SensorReading {
            payload,
            timestamp: reading_ts,
            confidence,
        });
    }

    if cur.remaining() != 0 {
        return Err(FrameError::Format {
            reason: "trailing bytes after readings block",
        });
    }
    let readings_block = &buf[readings_start..declared - DIGEST_LEN];

    // Structure is sound; now verify integrity over the logical fields.
    let stored = &buf[declared - DIGEST_LEN..declared];
    let computed = digest_parts(
        id_bytes,
        timestamp,
        sensor_kind,
        readings_block,
        battery_level,
        calibration_version,
        session_bytes,
    );

    if stored != computed {
        return Err(FrameError::Integrity {
            stored: u32::from_le_bytes([stored[0], stored[1], stored[2], stored[3]]),
            computed: u32::from_le_bytes([computed[0], computed[1], computed[2], computed[3]]),
        });
    }

    Ok(SensorFrame {
        sensor_id,
        session_id,
        sensor_kind,
        timestamp,
        battery_level,
        calibration_version,
        readings,
        data_quality,
        processing_latency_ms,
    })
}

/// Digest over the logical frame fields, as stored on the wire.
///
/// Exposed so the audit record can re-verify stored frames without
/// re-encoding them.
pub fn integrity_digest(frame: &SensorFrame, readings_block: &[u8]) -> [u8; DIGEST_LEN] {
    digest_parts(
        frame.sensor_id.as_bytes(),
        frame.timestamp,
        frame.sensor_kind,
        readings_block,
        frame.battery_level,
        frame.calibration_version,
        frame.session_id.as_bytes(),
    )
}

/// Serialize the readings block (count prefix plus payloads)
pub fn encode_readings(frame: &SensorFrame) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&(frame.readings.len() as u16).to_le_bytes());

    for reading in &frame.readings {
        out.extend_from_slice(&reading.timestamp.to_le_bytes());
        out.extend_from_slice(&reading.confidence.to_le_bytes());
        match &reading.payload {
            ReadingPayload::Imu(s) => {
                for v in s.accel.iter().chain(&s.gyro).chain(&s.mag) {
                    out.extend_from_slice(&v.to_le_bytes());
                }
                out.extend_from_slice(&s.temperature_c.to_le_bytes());
            }
            ReadingPayload::Tof(s) => {
                out.extend_from_slice(&(s.distances.len() as u16).to_le_bytes());
                for d in &s.distances {
                    out.extend_from_slice(&d.to_le_bytes());
                }
                out.extend_from_slice(&s.gain.to_le_bytes());
                out.extend_from_slice(&s.ambient.to_le_bytes());
            }
        }
    }
    out
}

fn digest_parts(
    sensor_id: &[u8],
    timestamp: u64,
    kind: SensorKind,
    readings_block: &[u8],
    battery_level: u8,
    calibration_version: u32,
    session_id: &[u8],
) -> [u8; DIGEST_LEN] {
    let mut hasher = Sha256::new();
    hasher.update(sensor_id);
    hasher.update(timestamp.to_le_bytes());
    hasher.update([kind as u8]);
    hasher.update(readings_block);
    hasher.update([battery_level]);
    hasher.update(calibration_version.to_le_bytes());
    hasher.update(session_id);
    hasher.finalize().into()
}

/// Bounds-checked little-endian reader over a frame body
struct Cursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(buf: &'a [u8], pos: usize) -> Self {
        Self { buf, pos }
    }

    fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn take(&mut self, n: usize) -> FrameResult<&'a [u8]> {
        if self.remaining() < n {
            return Err(FrameError::Truncated {
                required: self.pos + n,
                available: self.buf.len(),
            });
        }
        let slice = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn take_u8(&mut self) -> FrameResult<u8> {
        Ok(self.take(1)?[0])
    }

    fn take_u16(&mut self) -> FrameResult<u16> {
        let b = self.take(2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    fn take_u32(&mut self) -> FrameResult<u32> {
        let b = self.take(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn take_u64(&mut self) -> FrameResult<u64> {
        let b = self.take(8)?;
        Ok(u64::from_le_bytes([
            b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7],
        ]))
    }

    fn take_f32(&mut self) -> FrameResult<f32> {
        Ok(f32::from_le_bytes(self.take(4)?.try_into().map_err(
            |_| FrameError::Format {
                reason: "short float field",
            },
        )?))
    }

    fn take_id(&mut self) -> FrameResult<(InlineString, &'a [u8])> {
        let len = self.take_u8()? as usize;
        if len > MAX_INLINE_ID {
            return Err(FrameError::Format {
                reason: "id exceeds inline limit",
            });
        }
        let bytes = self.take(len)?;
        let s = core::str::from_utf8(bytes).map_err(|_| FrameError::Format {
            reason: "id is not utf-8",
        })?;
        let id = InlineString::new(s).ok_or(FrameError::Format {
            reason: "id exceeds inline limit",
        })?;
        Ok((id, bytes))
    }
}
