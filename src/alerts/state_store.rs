//! Persistence of the last committed alarm state
//!
//! Without a store the state machine starts from `INSUFFICIENT_DATA` after a
//! restart. With a [`FileStateStore`] it resumes from the last committed state,
//! so a restart does not re-announce a state the user was already told about.

use crate::error::StateStoreError;
use crate::events::{AlarmState, Timestamp};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

/// Storage for the last committed alarm state
#[cfg_attr(test, mockall::automock)]
pub trait AlarmStateStore: Send {
    /// Load the last committed state, `None` if nothing was stored yet
    fn load(&self) -> Result<Option<AlarmState>, StateStoreError>;

    /// Persist a newly committed state
    fn save(&self, state: AlarmState, updated_at: Timestamp) -> Result<(), StateStoreError>;
}

/// On-disk record of the alarm state
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
struct PersistedState {
    alarm: String,
    state: AlarmState,
    updated_at: Timestamp,
}

/// JSON file holding the state of one named alarm
#[derive(Debug, Clone)]
pub struct FileStateStore {
    path: PathBuf,
    alarm_name: String,
}

impl FileStateStore {
    pub fn new(path: impl Into<PathBuf>, alarm_name: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            alarm_name: alarm_name.into(),
        }
    }
}

impl AlarmStateStore for FileStateStore {
    fn load(&self) -> Result<Option<AlarmState>, StateStoreError> {
        if !self.path.exists() {
            return Ok(None);
        }

        let content = fs::read_to_string(&self.path)?;
        let persisted: PersistedState = serde_json::from_str(&content)?;

        // A file written for a differently named alarm says nothing about this one
        if persisted.alarm != self.alarm_name {
            return Ok(None);
        }

        Ok(Some(persisted.state))
    }

    fn save(&self, state: AlarmState, updated_at: Timestamp) -> Result<(), StateStoreError> {
        let persisted = PersistedState {
            alarm: self.alarm_name.clone(),
            state,
            updated_at,
        };
        let content = serde_json::to_string_pretty(&persisted)?;

        // Write-then-rename so a crash never leaves a truncated file behind
        let tmp_path = self.path.with_extension("tmp");
        fs::write(&tmp_path, content)?;
        fs::rename(&tmp_path, &self.path)?;
        Ok(())
    }
}
