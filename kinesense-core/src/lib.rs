//! Core sensor pipeline for Kinesense
//!
//! Handles the inbound half of the sensor-to-alert pipeline for wearable
//! biomechanical apparel: per-connection byte streaming, frame integrity,
//! sample-buffer compression, and per-sensor calibration.
//!
//! Key constraints:
//! - One bad frame never halts the stream
//! - Bounded memory per connection (fixed-capacity rings and maps)
//! - Analysis-grade numerics: no lossy re-quantization anywhere
//!
//! ```no_run
//! use kinesense_core::{calibration::{CalibrationStore, CalibrationProfile}, time::SystemClock};
//!
//! let store = CalibrationStore::new(SystemClock);
//!
//! match store.calibrate("quad_l_01", CalibrationProfile::default()) {
//!     Ok(()) => {}   // Sensor ready for analysis
//!     Err(e) => {}   // Surface the exact violated parameter
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod calibration;
pub mod codec;
pub mod compress;
pub mod constants;
pub mod errors;
pub mod reading;
pub mod ring;
pub mod time;

// Public API
pub use calibration::{CalibrationAdjust, CalibrationProfile, CalibrationStore};
pub use compress::Compressed;
pub use errors::{CalibrationError, CompressionError, FrameError};
pub use reading::{
    ImuSample, InlineString, ReadingPayload, SensorFrame, SensorKind, SensorReading, TofSample,
};
pub use ring::{ByteRing, SharedByteRing};
pub use time::{FixedClock, SystemClock, TimeSource, Timestamp};

/// Crate version, surfaced for host diagnostics
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
