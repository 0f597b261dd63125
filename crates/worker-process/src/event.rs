//! Raw worker events

use chrono::{DateTime, Utc};

use crate::process::ExitStatus;

/// A raw event from the worker process
#[derive(Debug, Clone)]
pub struct WorkerEvent {
    /// When the event was observed
    pub timestamp: DateTime<Utc>,
    /// What happened
    pub kind: WorkerEventKind,
}

impl WorkerEvent {
    /// Create a new event stamped with the current time
    pub fn new(kind: WorkerEventKind) -> Self {
        Self {
            timestamp: Utc::now(),
            kind,
        }
    }

    /// Whether this is the terminal event of the stream
    pub fn is_terminal(&self) -> bool {
        matches!(self.kind, WorkerEventKind::Exited(_))
    }
}

/// Types of raw worker events
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerEventKind {
    /// The process is running
    Started {
        /// OS process id
        pid: u32,
    },
    /// A chunk read from stdout, not aligned to lines
    Output(Vec<u8>),
    /// A chunk read from stderr, not aligned to lines
    Diagnostic(Vec<u8>),
    /// The process exited; always the last event
    Exited(ExitStatus),
}
