//! Host runtime state machine.
//!
//! ```text
//! NOT_STARTED → STARTING → RUNNING → STOPPING → STOPPED
//!                   │                    ▲
//!                   └────────────────────┘  (failed start rolls back)
//! ```
//! Transitions only move forward; no state is revisited.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::types::{Error, Result};

/// Lifecycle state of the whole host.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum RuntimeState {
    #[default]
    NotStarted,
    Starting,
    Running,
    Stopping,
    Stopped,
}

impl RuntimeState {
    /// Check if transition is valid.
    pub fn can_transition_to(self, to: RuntimeState) -> bool {
        matches!(
            (self, to),
            (RuntimeState::NotStarted, RuntimeState::Starting)
                | (RuntimeState::Starting, RuntimeState::Running)
                | (RuntimeState::Starting, RuntimeState::Stopping)
                | (RuntimeState::Running, RuntimeState::Stopping)
                | (RuntimeState::Stopping, RuntimeState::Stopped)
        )
    }

    pub fn is_terminal(self) -> bool {
        self == RuntimeState::Stopped
    }

    /// Move to `to`, rejecting anything but a forward edge.
    pub fn transition(&mut self, to: RuntimeState) -> Result<()> {
        if !self.can_transition_to(to) {
            return Err(Error::state_transition(format!(
                "cannot move from {} to {}",
                self, to
            )));
        }
        tracing::debug!(from = %self, to = %to, "runtime state transition");
        *self = to;
        Ok(())
    }
}

impl fmt::Display for RuntimeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RuntimeState::NotStarted => "NOT_STARTED",
            RuntimeState::Starting => "STARTING",
            RuntimeState::Running => "RUNNING",
            RuntimeState::Stopping => "STOPPING",
            RuntimeState::Stopped => "STOPPED",
        };
        f.write_str(s)
    }
}
