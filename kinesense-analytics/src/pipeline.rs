//! End-to-end pipeline runner
//!
//! Wires the whole sensor-to-alert path together: per-connection byte
//! rings, frame extraction, calibration lookup, metric derivation,
//! anomaly detection, and alert correlation, with results flowing out
//! over a channel the host consumes at its own pace.
//!
//! ## Threading model
//!
//! Ingestion is push driven and never blocks: `ingest` appends to the
//! sensor's ring and flags a drain task. Each sensor hashes to one fixed
//! worker lane, so frames from the same sensor are always processed in
//! order (kinematic differentiation depends on it) while different
//! sensors proceed in parallel. Lanes are bounded; at capacity the
//! oldest pending task is dropped, trading completeness for freshness.
//!
//! One bad frame never halts the stream: integrity and format failures
//! are counted, logged, and skipped past byte-by-byte until the next
//! frame boundary.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread::JoinHandle;
use std::time::Instant;

use heapless::FnvIndexMap;
use serde::{Deserialize, Serialize};
use thiserror_no_std::Error;

use kinesense_core::calibration::{CalibrationProfile, CalibrationStore};
use kinesense_core::codec::{decode, frame_len, DIGEST_LEN};
use kinesense_core::compress;
use kinesense_core::constants::{
    FRAME_LATENCY_BUDGET_MS, MAX_FRAME_BYTES, MAX_SENSORS, TARGET_COMPRESSION_RATIO,
};
use kinesense_core::errors::{CalibrationError, CompressionError, FrameError};
use kinesense_core::reading::{InlineString, SensorFrame};
use kinesense_core::ring::SharedByteRing;
use kinesense_core::time::{TimeSource, Timestamp};

use crate::alerts::{Alert, AlertCorrelator};
use crate::anomaly::AnomalyDetector;
use crate::baseline::BaselineSet;
use crate::errors::AnalysisError;
use crate::metrics::{
    analyze_movement_kinematics, analyze_muscle_activity, calculate_load_distribution, raw_force,
    MetricKind, MetricSet,
};

/// Ring capacity per sensor connection; must hold at least one frame
pub const SENSOR_RING_BYTES: usize = MAX_FRAME_BYTES;

/// Frames of history retained per sensor for windowed analysis
const HISTORY_FRAMES: usize = 4;

/// Default pending-task depth per worker lane
const DEFAULT_LANE_DEPTH: usize = 32;

/// Default worker count
const DEFAULT_WORKERS: usize = 4;

/// Errors from pipeline management operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PipelineError {
    /// Registry is at [`MAX_SENSORS`]
    #[error("sensor registry full ({capacity} connections)")]
    SensorLimit {
        /// Configured connection capacity
        capacity: usize,
    },
    /// Bytes arrived for a sensor that was never registered
    #[error("sensor not registered")]
    UnknownSensor,
    /// Sensor or session id does not fit the inline id format
    #[error("invalid id")]
    InvalidId,
}

/// Everything the pipeline pushes to the host, in emission order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PipelineEvent {
    /// A correlated, user-facing alert
    Alert(Alert),
    /// One cycle's derived metrics, for visualization collaborators
    Metrics(MetricSet),
    /// Per-frame audit record, for the host's persistence collaborator
    FrameAudit(FrameAudit),
}

/// Audit record retained per stored frame for integrity re-verification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameAudit {
    /// Sensor the frame came from
    pub sensor_id: InlineString,
    /// Session the sensor belongs to
    pub session_id: InlineString,
    /// Frame timestamp
    pub timestamp: Timestamp,
    /// The frame's integrity digest, as carried on the wire
    pub checksum: [u8; DIGEST_LEN],
    /// Deflate ratio achieved on the frame's sample buffer
    pub compression_ratio: f32,
    /// Whether the ratio met [`TARGET_COMPRESSION_RATIO`]
    pub ratio_met: bool,
    /// Calibration version the frame was captured under
    pub calibration_version: u32,
}

/// Pipeline configuration
#[derive(Debug, Clone, Copy)]
pub struct PipelineConfig {
    /// Worker thread count
    pub workers: usize,
    /// Pending-task depth per lane before oldest-drop backpressure
    pub lane_depth: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            workers: DEFAULT_WORKERS,
            lane_depth: DEFAULT_LANE_DEPTH,
        }
    }
}

/// Lock-free counters for pipeline observability
#[derive(Debug, Default)]
pub struct PipelineStats {
    /// Frames decoded and analyzed
    pub frames_decoded: AtomicU64,
    /// Frames dropped on checksum mismatch
    pub integrity_drops: AtomicU64,
    /// Frames dropped on malformed layout, plus resync byte skips
    pub format_drops: AtomicU64,
    /// Drain tasks dropped under lane backpressure
    pub tasks_dropped: AtomicU64,
    /// Alerts created by the correlator
    pub alerts_emitted: AtomicU64,
    /// Candidates suppressed by the correlator
    pub alerts_suppressed: AtomicU64,
    /// Frames whose processing exceeded the latency budget
    pub latency_violations: AtomicU64,
}

impl PipelineStats {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// Per-connection state
struct SensorSlot {
    sensor_id: InlineString,
    session_id: InlineString,
    ring: SharedByteRing<SENSOR_RING_BYTES>,
    // A drain task is already queued or running
    pending: AtomicBool,
    // Session ended; queued tasks become no-ops
    cancelled: AtomicBool,
    history: Mutex<VecDeque<SensorFrame>>,
}

/// Per-session analysis state, dropped at teardown
#[derive(Default)]
struct SessionState {
    baselines: BaselineSet,
    correlator: AlertCorrelator,
}

/// Bounded task queue feeding one worker
struct Lane {
    queue: Mutex<VecDeque<Arc<SensorSlot>>>,
    cv: Condvar,
    depth: usize,
    shutdown: AtomicBool,
}

impl Lane {
    fn new(depth: usize) -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            cv: Condvar::new(),
            depth,
            shutdown: AtomicBool::new(false),
        }
    }

    fn push(&self, slot: Arc<SensorSlot>, stats: &PipelineStats) {
        let mut queue = lock(&self.queue);
        if queue.len() >= self.depth {
            // Freshness over completeness under backpressure
            if let Some(dropped) = queue.pop_front() {
                dropped.pending.store(false, Ordering::Release);
                PipelineStats::bump(&stats.tasks_dropped);
                log::warn!("lane saturated, dropped pending drain for {}", dropped.sensor_id);
            }
        }
        queue.push_back(slot);
        self.cv.notify_one();
    }

    fn pop(&self) -> Option<Arc<SensorSlot>> {
        let mut queue = lock(&self.queue);
        loop {
            if let Some(slot) = queue.pop_front() {
                return Some(slot);
            }
            if self.shutdown.load(Ordering::Acquire) {
                return None;
            }
            queue = self
                .cv
                .wait(queue)
                .unwrap_or_else(|e| e.into_inner());
        }
    }

    fn stop(&self) {
        self.shutdown.store(true, Ordering::Release);
        self.cv.notify_all();
    }
}

struct Shared<C: TimeSource> {
    sensors: Mutex<FnvIndexMap<InlineString, Arc<SensorSlot>, MAX_SENSORS>>,
    sessions: Mutex<FnvIndexMap<InlineString, SessionState, MAX_SENSORS>>,
    calibration: Arc<CalibrationStore<C>>,
    detector: AnomalyDetector,
    stats: PipelineStats,
}

/// The sensor-to-alert pipeline
///
/// Owns the worker pool; dropping the pipeline stops the workers after
/// their current task.
pub struct Pipeline<C: TimeSource + 'static> {
    shared: Arc<Shared<C>>,
    lanes: Vec<Arc<Lane>>,
    workers: Vec<JoinHandle<()>>,
}

impl<C: TimeSource + 'static> Pipeline<C> {
    /// Start the worker pool. Returns the pipeline handle and the event
    /// stream the host consumes.
    pub fn start(
        config: PipelineConfig,
        calibration: Arc<CalibrationStore<C>>,
        detector: AnomalyDetector,
    ) -> (Self, Receiver<PipelineEvent>) {
        let (tx, rx) = mpsc::channel();
        let shared = Arc::new(Shared {
            sensors: Mutex::new(FnvIndexMap::new()),
            sessions: Mutex::new(FnvIndexMap::new()),
            calibration,
            detector,
            stats: PipelineStats::default(),
        });

        let workers = config.workers.max(1);
        let lanes: Vec<Arc<Lane>> = (0..workers)
            .map(|_| Arc::new(Lane::new(config.lane_depth.max(1))))
            .collect();

        let handles = lanes
            .iter()
            .enumerate()
            .map(|(i, lane)| {
                let lane = Arc::clone(lane);
                let shared = Arc::clone(&shared);
                let tx = tx.clone();
                std::thread::Builder::new()
                    .name(format!("kinesense-worker-{i}"))
                    .spawn(move || worker_loop(lane, shared, tx))
                    .expect("spawning analysis worker")
            })
            .collect();

        log::info!("pipeline started with {workers} workers");
        (
            Self {
                shared,
                lanes,
                workers: handles,
            },
            rx,
        )
    }

    /// Register one sensor connection under a session
    pub fn register_sensor(&self, sensor_id: &str, session_id: &str) -> Result<(), PipelineError> {
        let sensor = InlineString::new(sensor_id).ok_or(PipelineError::InvalidId)?;
        let session = InlineString::new(session_id).ok_or(PipelineError::InvalidId)?;

        let slot = Arc::new(SensorSlot {
            sensor_id: sensor,
            session_id: session,
            ring: SharedByteRing::new(),
            pending: AtomicBool::new(false),
            cancelled: AtomicBool::new(false),
            history: Mutex::new(VecDeque::with_capacity(HISTORY_FRAMES)),
        });

        let mut sensors = lock(&self.shared.sensors);
        sensors.insert(sensor, slot).map_err(|_| PipelineError::SensorLimit {
            capacity: MAX_SENSORS,
        })?;
        log::debug!("registered sensor {sensor_id} in session {session_id}");
        Ok(())
    }

    /// Feed raw transport bytes for one sensor. Never blocks on analysis:
    /// the bytes land in the sensor's ring and a drain task is queued on
    /// the sensor's lane unless one is already pending.
    pub fn ingest(&self, sensor_id: &str, bytes: &[u8]) -> Result<(), PipelineError> {
        let key = InlineString::new(sensor_id).ok_or(PipelineError::InvalidId)?;
        let slot = {
            let sensors = lock(&self.shared.sensors);
            Arc::clone(sensors.get(&key).ok_or(PipelineError::UnknownSensor)?)
        };

        slot.ring.write(bytes);
        if !slot.pending.swap(true, Ordering::AcqRel) {
            let lane = &self.lanes[lane_for(&key, self.lanes.len())];
            lane.push(slot, &self.shared.stats);
        }
        Ok(())
    }

    /// Tear a session down: cancel its pending work, clear its buffers,
    /// and drop its baselines and correlation state.
    pub fn end_session(&self, session_id: &str) {
        let Some(session) = InlineString::new(session_id) else {
            return;
        };

        let mut sensors = lock(&self.shared.sensors);
        let doomed: Vec<InlineString> = sensors
            .iter()
            .filter(|(_, slot)| slot.session_id == session)
            .map(|(id, _)| *id)
            .collect();
        for id in &doomed {
            if let Some(slot) = sensors.remove(id) {
                slot.cancelled.store(true, Ordering::Release);
                slot.ring.clear();
                lock(&slot.history).clear();
            }
        }
        drop(sensors);

        lock(&self.shared.sessions).remove(&session);
        log::info!(
            "session {session_id} ended, released {} sensor connections",
            doomed.len()
        );
    }

    /// Live pipeline counters
    pub fn stats(&self) -> &PipelineStats {
        &self.shared.stats
    }
}

impl<C: TimeSource + 'static> Drop for Pipeline<C> {
    fn drop(&mut self) {
        for lane in &self.lanes {
            lane.stop();
        }
        for handle in self.workers.drain(..) {
            let _ = handle.join();
        }
        log::info!("pipeline stopped");
    }
}

/// FNV-1a over the sensor id, pinning each sensor to one lane
fn lane_for(id: &InlineString, lanes: usize) -> usize {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for &b in id.as_bytes() {
        hash ^= b as u64;
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    (hash % lanes as u64) as usize
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

fn worker_loop<C: TimeSource>(
    lane: Arc<Lane>,
    shared: Arc<Shared<C>>,
    tx: Sender<PipelineEvent>,
) {
    while let Some(slot) = lane.pop() {
        // Clear before draining so bytes arriving mid-drain re-queue us
        slot.pending.store(false, Ordering::Release);
        if slot.cancelled.load(Ordering::Acquire) {
            continue;
        }
        drain_slot(&shared, &slot, &tx);
    }
}

/// Pull every complete frame out of the slot's ring and process it.
/// Partial frames stay buffered; undecodable prefixes are skipped one
/// byte at a time until the next magic word lines up.
fn drain_slot<C: TimeSource>(shared: &Shared<C>, slot: &SensorSlot, tx: &Sender<PipelineEvent>) {
    loop {
        if slot.cancelled.load(Ordering::Acquire) {
            return;
        }

        let buffered = slot.ring.len();
        if buffered == 0 {
            return;
        }
        let mut head = vec![0u8; buffered.min(MAX_FRAME_BYTES)];
        let got = slot.ring.peek(&mut head);
        head.truncate(got);

        match frame_len(&head) {
            Ok(None) => return, // wait for more bytes
            Err(_) => {
                // Resync: the ring overwrote a frame boundary
                slot.ring.skip(1);
                PipelineStats::bump(&shared.stats.format_drops);
                continue;
            }
            Ok(Some(len)) => {
                if got < len {
                    return;
                }
                slot.ring.skip(len);
                process_frame(shared, slot, &head[..len], tx);
            }
        }
    }
}

fn process_frame<C: TimeSource>(
    shared: &Shared<C>,
    slot: &SensorSlot,
    wire: &[u8],
    tx: &Sender<PipelineEvent>,
) {
    let started = Instant::now();

    let frame = match decode(wire) {
        Ok(frame) => frame,
        Err(FrameError::Integrity { stored, computed }) => {
            PipelineStats::bump(&shared.stats.integrity_drops);
            log::warn!(
                "dropping corrupt frame from {}: checksum {stored:08x} != {computed:08x}",
                slot.sensor_id
            );
            return;
        }
        Err(e) => {
            PipelineStats::bump(&shared.stats.format_drops);
            log::warn!("dropping malformed frame from {}: {e}", slot.sensor_id);
            return;
        }
    };
    PipelineStats::bump(&shared.stats.frames_decoded);

    let profile = match shared.calibration.active_profile(&frame.sensor_id) {
        Ok(profile) => profile,
        Err(CalibrationError::Expired { age_ms }) => {
            log::warn!(
                "calibration for {} expired {age_ms}ms ago, analyzing uncalibrated",
                frame.sensor_id
            );
            CalibrationProfile::default()
        }
        Err(_) => {
            log::debug!("no calibration for {}, analyzing uncalibrated", frame.sensor_id);
            CalibrationProfile::default()
        }
    };

    // Audit record first so the host can persist even alert-free frames
    let mut checksum = [0u8; DIGEST_LEN];
    checksum.copy_from_slice(&wire[wire.len() - DIGEST_LEN..]);
    let samples = frame.sample_values();
    let (ratio, ratio_met) = match compress::compress(&samples) {
        Ok(c) => (c.ratio, true),
        Err(CompressionError::Shortfall { compressed, .. }) => {
            log::debug!(
                "frame from {} compressed at {:.2}:1, below target {TARGET_COMPRESSION_RATIO}:1",
                frame.sensor_id,
                compressed.ratio
            );
            (compressed.ratio, false)
        }
        Err(_) => (0.0, false),
    };
    let _ = tx.send(PipelineEvent::FrameAudit(FrameAudit {
        sensor_id: frame.sensor_id,
        session_id: frame.session_id,
        timestamp: frame.timestamp,
        checksum,
        compression_ratio: ratio,
        ratio_met,
        calibration_version: frame.calibration_version,
    }));

    // Windowed analysis over this frame plus recent history
    let window: Vec<SensorFrame> = {
        let mut history = lock(&slot.history);
        if history.len() == HISTORY_FRAMES {
            history.pop_front();
        }
        history.push_back(frame.clone());
        history.iter().cloned().collect()
    };

    let set = derive_metrics(&frame, &window, &profile);
    if set.is_empty() {
        log::debug!("frame from {} produced no metrics", frame.sensor_id);
        return;
    }

    // Detection and correlation share the session's state
    {
        let mut sessions = lock(&shared.sessions);
        // Re-check under the lock: teardown sets the flag before it takes
        // this lock, so a frame that raced past drain_slot's check must
        // not resurrect the session entry it is about to remove.
        if slot.cancelled.load(Ordering::Acquire) {
            log::debug!(
                "session {} ended mid-frame, discarding analysis",
                frame.session_id
            );
            return;
        }
        if !sessions.contains_key(&frame.session_id)
            && sessions
                .insert(frame.session_id, SessionState::default())
                .is_err()
        {
            log::warn!("session table full, skipping detection for {}", frame.session_id);
            let _ = tx.send(PipelineEvent::Metrics(set));
            return;
        }
        let Some(state) = sessions.get_mut(&frame.session_id) else {
            return;
        };

        let candidates = shared.detector.detect(&set, &mut state.baselines);
        for candidate in &candidates {
            match state.correlator.correlate(candidate) {
                Some(alert) => {
                    PipelineStats::bump(&shared.stats.alerts_emitted);
                    log::debug!(
                        "alert {} ({:?}, {:?}) on {}",
                        alert.id,
                        alert.kind,
                        alert.severity,
                        candidate.location
                    );
                    let _ = tx.send(PipelineEvent::Alert(alert));
                }
                None => PipelineStats::bump(&shared.stats.alerts_suppressed),
            }
        }
    }

    let _ = tx.send(PipelineEvent::Metrics(set));

    let elapsed_ms = started.elapsed().as_millis() as u64;
    if elapsed_ms > FRAME_LATENCY_BUDGET_MS {
        PipelineStats::bump(&shared.stats.latency_violations);
        log::warn!(
            "frame from {} took {elapsed_ms}ms, over the {FRAME_LATENCY_BUDGET_MS}ms budget",
            slot.sensor_id
        );
    }
}

/// Run every analyzer that the window has data for
fn derive_metrics(
    frame: &SensorFrame,
    window: &[SensorFrame],
    profile: &CalibrationProfile,
) -> MetricSet {
    let confidence = (frame.data_quality / 100.0).clamp(0.0, 1.0);
    let mut set = MetricSet::new(frame.sensor_id, frame.session_id, frame.timestamp, confidence);

    if let Some(force) = raw_force(window) {
        set.insert(MetricKind::Force, force);
    }

    match analyze_movement_kinematics(window, profile) {
        Ok(k) => {
            set.insert(MetricKind::Impact, k.impact_g);
            set.insert(MetricKind::RangeOfMotionDeviation, k.range_of_motion_deg);
        }
        Err(AnalysisError::InvalidSensorInput { .. }) => {}
    }

    match analyze_muscle_activity(window, profile) {
        Ok(m) => {
            set.insert(MetricKind::PhysiologicalStrain, m.strain_pct);
            set.insert(MetricKind::Fatigue, m.fatigue_index);
        }
        Err(AnalysisError::InvalidSensorInput { .. }) => {}
    }

    match calculate_load_distribution(window, profile) {
        Ok(l) => {
            set.insert(MetricKind::Asymmetry, l.asymmetry_pct);
        }
        Err(AnalysisError::InvalidSensorInput { .. }) => {}
    }

    set
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lane_assignment_is_stable_and_in_range() {
        let a = InlineString::new("quad_l_01").unwrap();
        let b = InlineString::new("quad_r_01").unwrap();
        for lanes in 1..=8 {
            let la = lane_for(&a, lanes);
            assert!(la < lanes);
            assert_eq!(la, lane_for(&a, lanes));
            assert!(lane_for(&b, lanes) < lanes);
        }
    }

    #[test]
    fn lane_drops_oldest_at_capacity() {
        let lane = Lane::new(2);
        let stats = PipelineStats::default();
        let slot = |name: &str| {
            Arc::new(SensorSlot {
                sensor_id: InlineString::new(name).unwrap(),
                session_id: InlineString::new("s").unwrap(),
                ring: SharedByteRing::new(),
                pending: AtomicBool::new(true),
                cancelled: AtomicBool::new(false),
                history: Mutex::new(VecDeque::new()),
            })
        };

        lane.push(slot("a"), &stats);
        lane.push(slot("b"), &stats);
        lane.push(slot("c"), &stats);

        assert_eq!(stats.tasks_dropped.load(Ordering::Relaxed), 1);
        let first = lane.pop().unwrap();
        assert_eq!(first.sensor_id.as_str(), "b");
    }

    #[test]
    fn torn_down_slot_never_resurrects_session_state() {
        use kinesense_core::codec::encode;
        use kinesense_core::reading::{ImuSample, ReadingPayload, SensorKind, SensorReading};
        use kinesense_core::time::FixedClock;

        let shared = Arc::new(Shared {
            sensors: Mutex::new(FnvIndexMap::new()),
            sessions: Mutex::new(FnvIndexMap::new()),
            calibration: Arc::new(CalibrationStore::new(FixedClock::new(0))),
            detector: AnomalyDetector::default(),
            stats: PipelineStats::default(),
        });
        let (tx, rx) = mpsc::channel();

        let slot = SensorSlot {
            sensor_id: InlineString::new("quad_l_01").unwrap(),
            session_id: InlineString::new("s1").unwrap(),
            ring: SharedByteRing::new(),
            pending: AtomicBool::new(false),
            cancelled: AtomicBool::new(true),
            history: Mutex::new(VecDeque::new()),
        };

        let reading = SensorReading::new(
            ReadingPayload::Imu(ImuSample {
                accel: [850.0, 900.0, 800.0],
                gyro: [0.0; 3],
                mag: [0.0; 3],
                temperature_c: 31.0,
            }),
            1_000,
            0.95,
        );
        let frame = SensorFrame::new(
            slot.sensor_id,
            slot.session_id,
            SensorKind::Imu,
            1_000,
            90,
            1,
            vec![reading],
        );
        let wire = encode(&frame);

        // A frame landing after teardown must not re-create the session
        process_frame(&shared, &slot, &wire, &tx);
        assert!(lock(&shared.sessions).is_empty());
        assert!(!rx.try_iter().any(|e| matches!(e, PipelineEvent::Alert(_))));

        // The same frame on a live slot does
        slot.cancelled.store(false, Ordering::Release);
        process_frame(&shared, &slot, &wire, &tx);
        assert_eq!(lock(&shared.sessions).len(), 1);
        assert!(rx.try_iter().any(|e| matches!(e, PipelineEvent::Alert(_))));
    }

    #[test]
    fn stopped_lane_returns_none() {
        let lane = Arc::new(Lane::new(4));
        let waiter = {
            let lane = Arc::clone(&lane);
            std::thread::spawn(move || lane.pop())
        };
        lane.stop();
        assert!(waiter.join().unwrap().is_none());
    }
}
