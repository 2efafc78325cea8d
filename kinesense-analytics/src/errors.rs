//! Error types for the analysis half of the pipeline
//!
//! Per the pipeline-wide policy, nothing here is fatal to the stream:
//! analysis errors abort the current frame only, and alert lifecycle
//! errors reject the requested transition while leaving the alert as-is.

use thiserror_no_std::Error;

use crate::alerts::AlertStatus;

/// Errors from the biomechanics analyzer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AnalysisError {
    /// Frame set was empty or contained no readings of the required kind
    #[error("invalid sensor input: {reason}")]
    InvalidSensorInput {
        /// What the analyzer needed and did not get
        reason: &'static str,
    },
}

/// Errors from alert lifecycle operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AlertError {
    /// Requested transition is not legal from the alert's current status
    #[error("cannot {action} an alert in {from:?} state")]
    InvalidTransition {
        /// Status the alert was in when the transition was requested
        from: AlertStatus,
        /// The rejected operation
        action: &'static str,
    },
}

/// Convenience alias for analyzer results
pub type AnalysisResult<T> = Result<T, AnalysisError>;
