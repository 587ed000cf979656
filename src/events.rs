//! Core event types for the beverage-weight watcher
//!
//! This module defines the data that flows through the pipeline: samples
//! produced by ingest, per-tick evaluation results, the alarm state and the
//! transition events handed to the notifier.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Timestamp type for consistent time handling across the application
pub type Timestamp = DateTime<Utc>;

/// A single validated weight measurement
///
/// Produced by sample ingest for every accepted message. The value is always
/// normalized to grams.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Sample {
    /// Remaining weight in grams
    pub value: f64,
    /// When the measurement was taken (device clock if reported, else receive time)
    pub timestamp: Timestamp,
}

impl Sample {
    pub fn new(value: f64, timestamp: Timestamp) -> Self {
        Self { value, timestamp }
    }
}

/// State of the alarm as seen by the state machine
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlarmState {
    /// The monitored quantity is within bounds
    Ok,
    /// The threshold condition has been met
    Alarm,
    /// Not enough periods with data to decide either way
    InsufficientData,
}

impl fmt::Display for AlarmState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AlarmState::Ok => "OK",
            AlarmState::Alarm => "ALARM",
            AlarmState::InsufficientData => "INSUFFICIENT_DATA",
        };
        f.write_str(name)
    }
}

/// Outcome of one evaluation tick over the retained periods
///
/// Transient: recomputed on every tick and never persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct EvaluationResult {
    /// Retained periods whose outcome was breaching
    pub periods_breached: usize,
    /// Retained periods with a resolvable outcome
    pub periods_total: usize,
    /// Whether enough periods had data to reach a verdict
    pub has_sufficient_data: bool,
    /// Whether the alarm condition holds
    pub breaching: bool,
    /// Human-readable explanation, used as transition context
    pub reason: String,
}

/// A change of alarm state
///
/// Created only when `to != from`, handed to the notifier and dropped.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TransitionEvent {
    pub from: AlarmState,
    pub to: AlarmState,
    pub occurred_at: Timestamp,
    pub context: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alarm_state_serialization() {
        assert_eq!(serde_json::to_string(&AlarmState::Ok).unwrap(), "\"OK\"");
        assert_eq!(
            serde_json::to_string(&AlarmState::Alarm).unwrap(),
            "\"ALARM\""
        );
        assert_eq!(
            serde_json::to_string(&AlarmState::InsufficientData).unwrap(),
            "\"INSUFFICIENT_DATA\""
        );
    }

    #[test]
    fn test_alarm_state_display_matches_wire_name() {
        for state in [
            AlarmState::Ok,
            AlarmState::Alarm,
            AlarmState::InsufficientData,
        ] {
            let wire = serde_json::to_string(&state).unwrap();
            assert_eq!(wire.trim_matches('"'), state.to_string());
        }
    }

    #[test]
    fn test_transition_event_serialization() {
        let event = TransitionEvent {
            from: AlarmState::InsufficientData,
            to: AlarmState::Alarm,
            occurred_at: Utc::now(),
            context: "3 of 3 periods breaching".to_string(),
        };

        let json = serde_json::to_string(&event).unwrap();
        let deserialized: TransitionEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(event, deserialized);
    }
}
