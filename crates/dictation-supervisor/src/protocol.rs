//! Worker control and command protocol
//!
//! The worker reports its status with one line per event on stdout:
//!
//! | Line | Meaning |
//! |---|---|
//! | `LOADING` | started, model not ready yet |
//! | `READY` | ready for `START` |
//! | `RECORDING` | capturing audio |
//! | `RESULT:<text>` | transcription succeeded |
//! | `ERROR:<message>` | recoverable failure |
//!
//! and accepts `START` / `STOP` tokens on stdin.

use serde::{Deserialize, Serialize};
use std::fmt;

const RESULT_PREFIX: &str = "RESULT:";
const ERROR_PREFIX: &str = "ERROR:";

/// One interpreted line from the worker's stdout
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlLine {
    /// Model and resources still loading
    Loading,
    /// Ready to accept `START`
    Ready,
    /// Capture has begun
    Recording,
    /// Transcribed text, exactly as sent after the prefix
    Result(String),
    /// Free-form diagnostic text of a recoverable failure
    Error(String),
}

impl ControlLine {
    /// Classify a complete, already trimmed line
    ///
    /// Returns `None` for anything outside the protocol vocabulary.
    pub fn parse(line: &str) -> Option<Self> {
        match line {
            "LOADING" => Some(Self::Loading),
            "READY" => Some(Self::Ready),
            "RECORDING" => Some(Self::Recording),
            _ => {
                if let Some(text) = line.strip_prefix(RESULT_PREFIX) {
                    Some(Self::Result(text.to_string()))
                } else {
                    line.strip_prefix(ERROR_PREFIX)
                        .map(|message| Self::Error(message.to_string()))
                }
            }
        }
    }
}

/// A user command forwarded to the worker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Command {
    /// Begin capture
    Start,
    /// End capture and request transcription
    Stop,
}

impl Command {
    /// The token written to the worker's stdin (without the newline)
    pub fn token(self) -> &'static str {
        match self {
            Command::Start => "START",
            Command::Stop => "STOP",
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}
