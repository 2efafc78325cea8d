//! Single-frame end-to-end latency: decode, analyze, detect, correlate.
//!
//! The real-time budget is 100ms per frame for inputs up to 1000
//! readings; this bench tracks how much of that the analysis path eats.

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use kinesense_analytics::alerts::AlertCorrelator;
use kinesense_analytics::anomaly::AnomalyDetector;
use kinesense_analytics::baseline::BaselineSet;
use kinesense_analytics::metrics::{
    analyze_movement_kinematics, raw_force, MetricKind, MetricSet,
};
use kinesense_core::calibration::CalibrationProfile;
use kinesense_core::codec::{decode, encode};
use kinesense_core::reading::{
    ImuSample, InlineString, ReadingPayload, SensorFrame, SensorKind, SensorReading,
};

fn thousand_reading_frame() -> SensorFrame {
    let readings = (0..1_000u64)
        .map(|i| {
            SensorReading::new(
                ReadingPayload::Imu(ImuSample {
                    accel: [820.0 + (i % 7) as f32, 10.0, -4.0],
                    gyro: [30.0, 2.0, 1.0],
                    mag: [20.0, -5.0, 43.0],
                    temperature_c: 31.5,
                }),
                i * 2,
                0.95,
            )
        })
        .collect();
    SensorFrame::new(
        InlineString::new("quad_l_01").unwrap(),
        InlineString::new("session_42").unwrap(),
        SensorKind::Imu,
        0,
        90,
        1,
        readings,
    )
}

fn frame_to_alert(c: &mut Criterion) {
    let wire = encode(&thousand_reading_frame());
    let profile = CalibrationProfile::default();
    let detector = AnomalyDetector::default();

    c.bench_function("frame_to_alert_1000_readings", |b| {
        b.iter(|| {
            let frame = decode(black_box(&wire)).unwrap();
            let window = [frame];

            let mut set = MetricSet::new(
                window[0].sensor_id,
                window[0].session_id,
                window[0].timestamp,
                window[0].data_quality / 100.0,
            );
            if let Some(force) = raw_force(&window) {
                set.insert(MetricKind::Force, force);
            }
            if let Ok(k) = analyze_movement_kinematics(&window, &profile) {
                set.insert(MetricKind::Impact, k.impact_g);
                set.insert(MetricKind::RangeOfMotionDeviation, k.range_of_motion_deg);
            }

            let mut baselines = BaselineSet::new();
            let mut correlator = AlertCorrelator::default();
            let mut alerts = 0usize;
            for candidate in detector.detect(&set, &mut baselines) {
                if correlator.correlate(&candidate).is_some() {
                    alerts += 1;
                }
            }
            black_box(alerts)
        })
    });
}

criterion_group!(benches, frame_to_alert);
criterion_main!(benches);
