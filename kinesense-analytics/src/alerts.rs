//! Alert creation, correlation, and lifecycle
//!
//! The correlator sits between the anomaly detector and the host's
//! notification surface. Its one job is fatigue control: a burst of
//! similar candidates inside the sliding window collapses to at most
//! [`MAX_SIMILAR`] alerts, and everything past that is suppressed.
//! Cache entries age out lazily on each call, so there is no background
//! sweeper to schedule.
//!
//! Lifecycle transitions come from outside the pipeline (a trainer
//! tapping "acknowledge"). They validate against the current status and
//! reject anything illegal; a dismissed or resolved alert is terminal
//! and never comes back.

use kinesense_core::reading::InlineString;
use kinesense_core::time::Timestamp;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::anomaly::{AnomalyCandidate, AnomalyKind, Severity};
use crate::errors::AlertError;

/// Sliding correlation window in milliseconds
pub const TIME_WINDOW_MS: u64 = 60_000;

/// Similar candidates tolerated per window before suppression
pub const MAX_SIMILAR: usize = 3;

/// Where an alert sits in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AlertStatus {
    /// Newly created, awaiting attention
    Active,
    /// Seen by a human, still open
    Acknowledged,
    /// Closed without action (terminal)
    Dismissed,
    /// Closed as handled (terminal)
    Resolved,
}

impl AlertStatus {
    /// Terminal states never transition again
    pub fn is_terminal(self) -> bool {
        matches!(self, AlertStatus::Dismissed | AlertStatus::Resolved)
    }
}

/// Evidence snapshot carried on every alert for the host UI
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertDetails {
    /// Threshold the metric exceeded
    pub threshold: f32,
    /// Observed value at detection time
    pub current_value: f32,
    /// Sensor the violation was observed on
    pub location: InlineString,
    /// Metric values from the triggering cycle
    pub sensor_snapshot: Vec<f32>,
    /// Recent values of the violating metric, oldest first
    pub historical_readings: Vec<f32>,
    /// Combined confidence score at detection time
    pub confidence_score: f32,
}

/// A user-facing alert
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    /// Stable identity for host persistence and dedup
    pub id: Uuid,
    /// Broad anomaly category
    pub kind: AnomalyKind,
    /// Severity assigned by the detector
    pub severity: Severity,
    /// Lifecycle state
    pub status: AlertStatus,
    /// Combined confidence score at detection time
    pub confidence_score: f32,
    /// Evidence for the host UI
    pub details: AlertDetails,
    /// Creation time
    pub created_at: Timestamp,
    /// Who acknowledged, once someone has
    pub acknowledged_by: Option<String>,
    /// When it was acknowledged
    pub acknowledged_at: Option<Timestamp>,
}

impl Alert {
    /// Build an active alert from a detector candidate
    pub fn from_candidate(candidate: &AnomalyCandidate, historical: Vec<f32>) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind: candidate.kind,
            severity: candidate.severity,
            status: AlertStatus::Active,
            confidence_score: candidate.confidence_score,
            details: AlertDetails {
                threshold: candidate.threshold,
                current_value: candidate.current_value,
                location: candidate.location,
                sensor_snapshot: vec![candidate.current_value],
                historical_readings: historical,
                confidence_score: candidate.confidence_score,
            },
            created_at: candidate.detection_time,
            acknowledged_by: None,
            acknowledged_at: None,
        }
    }

    /// Mark seen. Legal only while `Active`.
    pub fn acknowledge(&mut self, by: &str, now: Timestamp) -> Result<(), AlertError> {
        if self.status != AlertStatus::Active {
            return Err(AlertError::InvalidTransition {
                from: self.status,
                action: "acknowledge",
            });
        }
        self.status = AlertStatus::Acknowledged;
        self.acknowledged_by = Some(by.to_owned());
        self.acknowledged_at = Some(now);
        Ok(())
    }

    /// Close without action. Legal from `Active` or `Acknowledged`.
    pub fn dismiss(&mut self) -> Result<(), AlertError> {
        if self.status.is_terminal() {
            return Err(AlertError::InvalidTransition {
                from: self.status,
                action: "dismiss",
            });
        }
        self.status = AlertStatus::Dismissed;
        Ok(())
    }

    /// Close as handled. Legal from `Active` or `Acknowledged`.
    pub fn resolve(&mut self) -> Result<(), AlertError> {
        if self.status.is_terminal() {
            return Err(AlertError::InvalidTransition {
                from: self.status,
                action: "resolve",
            });
        }
        self.status = AlertStatus::Resolved;
        Ok(())
    }

    /// Serialize for host notification and persistence collaborators
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// Deduplicates candidates into alerts over a sliding window
pub struct AlertCorrelator {
    window_ms: u64,
    max_similar: usize,
    // (kind, creation time) of each alert still inside the window
    recent: Vec<(AnomalyKind, Timestamp)>,
    // Rolling per-kind metric history attached to new alerts
    history: Vec<(AnomalyKind, f32)>,
}

/// Values of the violating kind retained for alert evidence
const HISTORY_DEPTH: usize = 8;

impl Default for AlertCorrelator {
    fn default() -> Self {
        Self::new(TIME_WINDOW_MS, MAX_SIMILAR)
    }
}

impl AlertCorrelator {
    /// Correlator with an explicit window and suppression budget
    pub fn new(window_ms: u64, max_similar: usize) -> Self {
        Self {
            window_ms,
            max_similar,
            recent: Vec::new(),
            history: Vec::new(),
        }
    }

    /// Fold one candidate in. `None` means suppressed.
    ///
    /// Eviction is lazy: entries older than the window relative to the
    /// candidate's detection time fall out here, so time only needs to
    /// flow through candidates.
    pub fn correlate(&mut self, candidate: &AnomalyCandidate) -> Option<Alert> {
        let now = candidate.detection_time;
        let horizon = now.saturating_sub(self.window_ms);
        self.recent.retain(|&(_, t)| t >= horizon);

        let historical = self.push_history(candidate.kind, candidate.current_value);

        let similar = self
            .recent
            .iter()
            .filter(|&&(kind, _)| kind == candidate.kind)
            .count();
        if similar >= self.max_similar {
            log::debug!(
                "suppressing {:?} candidate on {}: {} similar in window",
                candidate.kind,
                candidate.location,
                similar
            );
            return None;
        }

        self.recent.push((candidate.kind, now));
        Some(Alert::from_candidate(candidate, historical))
    }

    /// Alerts of `kind` currently inside the window
    pub fn active_count(&self, kind: AnomalyKind) -> usize {
        self.recent.iter().filter(|&&(k, _)| k == kind).count()
    }

    fn push_history(&mut self, kind: AnomalyKind, value: f32) -> Vec<f32> {
        let historical: Vec<f32> = self
            .history
            .iter()
            .filter(|&&(k, _)| k == kind)
            .map(|&(_, v)| v)
            .collect();
        self.history.push((kind, value));
        let of_kind = historical.len() + 1;
        if of_kind > HISTORY_DEPTH {
            if let Some(idx) = self.history.iter().position(|&(k, _)| k == kind) {
                self.history.remove(idx);
            }
        }
        historical
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::MetricKind;

    fn candidate(kind: AnomalyKind, detection_time: Timestamp) -> AnomalyCandidate {
        AnomalyCandidate {
            kind,
            metric: MetricKind::Force,
            current_value: 900.0,
            threshold: 800.0,
            confidence_score: 0.9,
            location: InlineString::new("quad_l").unwrap(),
            detection_time,
            severity: Severity::High,
        }
    }

    #[test]
    fn suppresses_past_max_similar() {
        let mut correlator = AlertCorrelator::default();
        let mut created = 0;
        let mut suppressed = 0;

        for i in 0..5u64 {
            match correlator.correlate(&candidate(AnomalyKind::Biomechanical, 1_000 + i)) {
                Some(_) => created += 1,
                None => suppressed += 1,
            }
        }

        assert_eq!(created, 3);
        assert_eq!(suppressed, 2);
    }

    #[test]
    fn different_kinds_have_independent_budgets() {
        let mut correlator = AlertCorrelator::default();
        for i in 0..3u64 {
            assert!(correlator
                .correlate(&candidate(AnomalyKind::Biomechanical, 1_000 + i))
                .is_some());
        }
        // Biomechanical budget exhausted, physiological untouched
        assert!(correlator
            .correlate(&candidate(AnomalyKind::Biomechanical, 1_010))
            .is_none());
        assert!(correlator
            .correlate(&candidate(AnomalyKind::Physiological, 1_010))
            .is_some());
    }

    #[test]
    fn window_expiry_frees_the_budget() {
        let mut correlator = AlertCorrelator::default();
        for i in 0..3u64 {
            correlator.correlate(&candidate(AnomalyKind::Biomechanical, 1_000 + i));
        }
        assert!(correlator
            .correlate(&candidate(AnomalyKind::Biomechanical, 2_000))
            .is_none());

        // One window later the old entries evict lazily
        let later = 1_002 + TIME_WINDOW_MS + 1;
        assert!(correlator
            .correlate(&candidate(AnomalyKind::Biomechanical, later))
            .is_some());
        assert_eq!(correlator.active_count(AnomalyKind::Biomechanical), 1);
    }

    #[test]
    fn new_alert_starts_active_with_candidate_evidence() {
        let mut correlator = AlertCorrelator::default();
        let alert = correlator
            .correlate(&candidate(AnomalyKind::Biomechanical, 5_000))
            .unwrap();
        assert_eq!(alert.status, AlertStatus::Active);
        assert_eq!(alert.severity, Severity::High);
        assert_eq!(alert.details.threshold, 800.0);
        assert_eq!(alert.details.current_value, 900.0);
        assert_eq!(alert.created_at, 5_000);
        assert!(alert.details.historical_readings.is_empty());

        // Second alert carries the first value as history
        let alert = correlator
            .correlate(&candidate(AnomalyKind::Biomechanical, 5_001))
            .unwrap();
        assert_eq!(alert.details.historical_readings, vec![900.0]);
    }

    #[test]
    fn lifecycle_happy_path() {
        let mut correlator = AlertCorrelator::default();
        let mut alert = correlator
            .correlate(&candidate(AnomalyKind::Biomechanical, 1))
            .unwrap();

        alert.acknowledge("trainer_7", 10).unwrap();
        assert_eq!(alert.status, AlertStatus::Acknowledged);
        assert_eq!(alert.acknowledged_by.as_deref(), Some("trainer_7"));
        assert_eq!(alert.acknowledged_at, Some(10));

        alert.resolve().unwrap();
        assert_eq!(alert.status, AlertStatus::Resolved);
    }

    #[test]
    fn terminal_states_reject_every_transition() {
        let mut correlator = AlertCorrelator::default();
        let mut alert = correlator
            .correlate(&candidate(AnomalyKind::Biomechanical, 1))
            .unwrap();
        alert.dismiss().unwrap();

        assert_eq!(
            alert.acknowledge("trainer_7", 10),
            Err(AlertError::InvalidTransition {
                from: AlertStatus::Dismissed,
                action: "acknowledge",
            })
        );
        assert_eq!(
            alert.resolve(),
            Err(AlertError::InvalidTransition {
                from: AlertStatus::Dismissed,
                action: "resolve",
            })
        );
        assert_eq!(alert.status, AlertStatus::Dismissed);
    }

    #[test]
    fn double_acknowledge_is_rejected() {
        let mut correlator = AlertCorrelator::default();
        let mut alert = correlator
            .correlate(&candidate(AnomalyKind::Biomechanical, 1))
            .unwrap();
        alert.acknowledge("a", 1).unwrap();
        assert!(alert.acknowledge("b", 2).is_err());
        assert_eq!(alert.acknowledged_by.as_deref(), Some("a"));
    }

    #[test]
    fn json_serialization_names_fields() {
        let mut correlator = AlertCorrelator::default();
        let alert = correlator
            .correlate(&candidate(AnomalyKind::Biomechanical, 1))
            .unwrap();
        let json = alert.to_json().unwrap();
        assert!(json.contains("\"Biomechanical\""));
        assert!(json.contains("\"confidence_score\""));
        assert!(json.contains("quad_l"));
    }
}
