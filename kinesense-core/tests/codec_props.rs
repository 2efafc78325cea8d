//! Property tests for the wire codec and compression engine
//!
//! Round-trip fidelity is the contract the rest of the pipeline leans on:
//! every structurally valid frame must decode back to itself with the
//! checksum verifying, and compression must be bit-exact regardless of the
//! sample values involved.

use proptest::prelude::*;

use kinesense_core::codec::{decode, encode, frame_len};
use kinesense_core::compress::{compress_with_target, decompress};
use kinesense_core::constants::MAX_TOF_ZONES;
use kinesense_core::reading::{
    ImuSample, InlineString, ReadingPayload, SensorFrame, SensorKind, SensorReading, TofSample,
};

fn finite_f32() -> impl Strategy<Value = f32> {
    // Wire floats are preserved bit-for-bit, but NaN breaks PartialEq in
    // the round-trip assertion, so stick to finite values.
    (-1.0e6f32..1.0e6f32).prop_filter("finite", |v| v.is_finite())
}

fn inline_id() -> impl Strategy<Value = InlineString> {
    "[a-z_0-9]{1,15}".prop_map(|s| InlineString::new(&s).expect("generated id fits inline"))
}

fn imu_reading() -> impl Strategy<Value = SensorReading> {
    (
        prop::array::uniform3(finite_f32()),
        prop::array::uniform3(finite_f32()),
        prop::array::uniform3(finite_f32()),
        finite_f32(),
        0u64..u64::MAX / 2,
        0.0f32..=1.0,
    )
        .prop_map(|(accel, gyro, mag, temperature_c, timestamp, confidence)| {
            SensorReading::new(
                ReadingPayload::Imu(ImuSample {
                    accel,
                    gyro,
                    mag,
                    temperature_c,
                }),
                timestamp,
                confidence,
            )
        })
}

fn tof_reading() -> impl Strategy<Value = SensorReading> {
    (
        prop::collection::vec(finite_f32(), 0..MAX_TOF_ZONES),
        finite_f32(),
        finite_f32(),
        0u64..u64::MAX / 2,
        0.0f32..=1.0,
    )
        .prop_map(|(distances, gain, ambient, timestamp, confidence)| {
            SensorReading::new(
                ReadingPayload::Tof(TofSample {
                    distances,
                    gain,
                    ambient,
                }),
                timestamp,
                confidence,
            )
        })
}

fn arb_frame() -> impl Strategy<Value = SensorFrame> {
    let imu = prop::collection::vec(imu_reading(), 0..20)
        .prop_map(|readings| (SensorKind::Imu, readings));
    let tof = prop::collection::vec(tof_reading(), 0..8)
        .prop_map(|readings| (SensorKind::Tof, readings));

    (
        inline_id(),
        inline_id(),
        imu.boxed().prop_union(tof.boxed()),
        0u64..u64::MAX / 2,
        0u8..=100,
        any::<u32>(),
    )
        .prop_map(
            |(sensor_id, session_id, (kind, readings), timestamp, battery, version)| {
                SensorFrame::new(
                    sensor_id, session_id, kind, timestamp, battery, version, readings,
                )
            },
        )
}

proptest! {
    #[test]
    fn decode_inverts_encode(frame in arb_frame()) {
        let wire = encode(&frame);
        let decoded = decode(&wire).expect("valid frame must decode");
        prop_assert_eq!(decoded, frame);
    }

    #[test]
    fn frame_len_agrees_with_wire(frame in arb_frame()) {
        let wire = encode(&frame);
        prop_assert_eq!(frame_len(&wire).expect("framing valid"), Some(wire.len()));
    }

    #[test]
    fn truncation_never_panics_or_decodes(frame in arb_frame(), cut in 1usize..64) {
        let wire = encode(&frame);
        let keep = wire.len().saturating_sub(cut);
        // Any truncation is an error, never a bogus frame or a panic
        prop_assert!(decode(&wire[..keep]).is_err());
    }

    #[test]
    fn single_corrupt_byte_is_caught(frame in arb_frame(), pos_seed in any::<usize>(), flip in 1u8..=255) {
        let mut wire = encode(&frame);
        // Corrupt within the digest-covered tail: the readings block and
        // the digest itself. A flip in either must surface as an error.
        let header_len = 6
            + 1 + frame.sensor_id.as_bytes().len()
            + 1 + frame.session_id.as_bytes().len()
            + 8 + 1 + 1 + 4 + 4 + 4;
        let pos = header_len + pos_seed % (wire.len() - header_len);
        wire[pos] ^= flip;
        prop_assert!(decode(&wire).is_err());
    }

    #[test]
    fn compression_is_bit_exact(samples in prop::collection::vec(finite_f32(), 0..2048)) {
        // Target 0 so shortfall never interferes with the exactness check
        let compressed = compress_with_target(&samples, 0.0).expect("target 0 cannot shortfall");
        let restored = decompress(&compressed.bytes).expect("inflate must succeed");
        prop_assert_eq!(restored, samples);
    }
}
