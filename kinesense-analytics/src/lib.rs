//! Analysis half of the Kinesense pipeline
//!
//! Takes decoded, calibrated sensor frames from `kinesense-core` and
//! turns them into biomechanical metrics, anomaly candidates, and
//! correlated user-facing alerts. The `pipeline` module wires the full
//! path together on a bounded worker pool; the analysis modules are
//! pure and usable on their own.
//!
//! ```no_run
//! use std::sync::Arc;
//! use kinesense_core::{calibration::CalibrationStore, time::SystemClock};
//! use kinesense_analytics::anomaly::AnomalyDetector;
//! use kinesense_analytics::pipeline::{Pipeline, PipelineConfig, PipelineEvent};
//!
//! let store = Arc::new(CalibrationStore::new(SystemClock));
//! let (pipeline, events) =
//!     Pipeline::start(PipelineConfig::default(), store, AnomalyDetector::default());
//!
//! pipeline.register_sensor("quad_l_01", "session_42").unwrap();
//! // pipeline.ingest("quad_l_01", &notification_bytes)?;
//!
//! for event in events {
//!     if let PipelineEvent::Alert(alert) = event {
//!         println!("{}", alert.to_json().unwrap());
//!     }
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod alerts;
pub mod anomaly;
pub mod baseline;
pub mod errors;
pub mod metrics;
pub mod pipeline;

// Public API
pub use alerts::{Alert, AlertCorrelator, AlertStatus, MAX_SIMILAR, TIME_WINDOW_MS};
pub use anomaly::{AnomalyCandidate, AnomalyDetector, AnomalyKind, Severity, CONFIDENCE_FLOOR};
pub use baseline::{BaselineProfile, BaselineSet, BASELINE_BLEND, BASELINE_RETAIN};
pub use errors::{AlertError, AnalysisError};
pub use metrics::{KinematicMetrics, LoadMetrics, MetricKind, MetricSet, MuscleMetrics};
pub use pipeline::{FrameAudit, Pipeline, PipelineConfig, PipelineEvent, PipelineStats};
