use crate::alerts::state_store::AlarmStateStore;
use crate::events::{AlarmState, EvaluationResult, Timestamp, TransitionEvent};
use log::{debug, info, warn};

/// Tracks the current alarm state and reports changes
///
/// The state machine is the single source of truth for what the user has
/// already been told. It only produces a [`TransitionEvent`] when the state
/// resolved from an evaluation differs from the state it holds, so repeated
/// identical evaluations stay silent.
///
/// A state resumed from a store is held until the first evaluation with
/// sufficient data, since the evaluator restarts with an empty window.
pub struct AlarmStateMachine {
    alarm_name: String,
    state: AlarmState,
    store: Option<Box<dyn AlarmStateStore>>,
    /// Set while a resumed state waits for the window to refill
    holding_resumed: bool,
}

impl AlarmStateMachine {
    /// Create a state machine starting from `INSUFFICIENT_DATA`
    pub fn new(alarm_name: impl Into<String>) -> Self {
        Self {
            alarm_name: alarm_name.into(),
            state: AlarmState::InsufficientData,
            store: None,
            holding_resumed: false,
        }
    }

    /// Create a state machine that resumes from, and persists to, `store`
    ///
    /// A store that is empty or unreadable yields `INSUFFICIENT_DATA`.
    pub fn with_store(alarm_name: impl Into<String>, store: Box<dyn AlarmStateStore>) -> Self {
        let alarm_name = alarm_name.into();
        let state = match store.load() {
            Ok(Some(state)) => {
                info!("Alarm '{}' resumed in state {}", alarm_name, state);
                state
            }
            Ok(None) => AlarmState::InsufficientData,
            Err(e) => {
                warn!(
                    "Failed to load persisted state for alarm '{}', starting from {}: {}",
                    alarm_name,
                    AlarmState::InsufficientData,
                    e
                );
                AlarmState::InsufficientData
            }
        };

        Self {
            alarm_name,
            holding_resumed: state != AlarmState::InsufficientData,
            state,
            store: Some(store),
        }
    }

    /// The currently held state
    pub fn state(&self) -> AlarmState {
        self.state
    }

    pub fn alarm_name(&self) -> &str {
        &self.alarm_name
    }

    /// Map an evaluation result to the state it calls for
    pub fn resolve(result: &EvaluationResult) -> AlarmState {
        if !result.has_sufficient_data {
            AlarmState::InsufficientData
        } else if result.breaching {
            AlarmState::Alarm
        } else {
            AlarmState::Ok
        }
    }

    /// Apply one tick's evaluation result
    ///
    /// Commits the resolved state and returns the transition if it changed.
    /// A failure to persist is logged; the in-memory state is committed
    /// regardless.
    pub fn apply(&mut self, result: &EvaluationResult, at: Timestamp) -> Option<TransitionEvent> {
        if self.holding_resumed {
            if !result.has_sufficient_data {
                debug!(
                    "Alarm '{}' holding resumed state {} until the window refills",
                    self.alarm_name, self.state
                );
                return None;
            }
            self.holding_resumed = false;
        }

        let resolved = Self::resolve(result);
        if resolved == self.state {
            return None;
        }

        let from = self.state;
        self.state = resolved;
        info!(
            "Alarm '{}' changed state {} -> {}: {}",
            self.alarm_name, from, resolved, result.reason
        );

        if let Some(store) = &self.store {
            if let Err(e) = store.save(resolved, at) {
                warn!(
                    "Failed to persist state {} for alarm '{}': {}",
                    resolved, self.alarm_name, e
                );
            }
        }

        Some(TransitionEvent {
            from,
            to: resolved,
            occurred_at: at,
            context: format!(
                "{}: {} -> {}. {}",
                self.alarm_name, from, resolved, result.reason
            ),
        })
    }
}
