//! UI-facing session state

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// The single authoritative state of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum State {
    /// Worker started, model not loaded yet
    #[default]
    Loading,
    /// Waiting for the user to start a recording
    Ready,
    /// Worker is capturing audio
    Recording,
    /// Stop sent, waiting for a result or an error
    Transcribing,
    /// Worker reported a recoverable failure
    Error,
    /// No worker; the session is over
    Dead,
}

impl State {
    /// Check if the session can never leave this state
    pub fn is_terminal(self) -> bool {
        matches!(self, State::Dead)
    }

    /// Protocol spelling of the state
    pub fn as_str(self) -> &'static str {
        match self {
            State::Loading => "LOADING",
            State::Ready => "READY",
            State::Recording => "RECORDING",
            State::Transcribing => "TRANSCRIBING",
            State::Error => "ERROR",
            State::Dead => "DEAD",
        }
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Read-only copy of a session's state handed to the UI
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionSnapshot {
    /// Current state
    pub state: State,
    /// Text attached to the last transition (error message, exit reason)
    pub message: Option<String>,
    /// Whether the worker reached `READY` at least once
    pub ever_ready: bool,
    /// Worker pid while a worker process exists
    pub worker_pid: Option<u32>,
    /// When the worker was spawned
    pub spawned_at: Option<DateTime<Utc>>,
}

impl Default for SessionSnapshot {
    fn default() -> Self {
        Self {
            state: State::Loading,
            message: None,
            ever_ready: false,
            worker_pid: None,
            spawned_at: None,
        }
    }
}
