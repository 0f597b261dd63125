//! Collaborators the supervisor reports to
//!
//! Everything here is one-way and best effort: the supervisor never waits
//! for an acknowledgement and a failing collaborator never changes session
//! state.

use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::state::State;

/// Notification delivered to the UI surface
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum UiNotification {
    /// The session moved to `state`
    State {
        /// New state
        state: State,
        /// Optional text (error message, exit reason)
        #[serde(skip_serializing_if = "Option::is_none")]
        text: Option<String>,
    },
    /// A transcription arrived
    Result {
        /// The transcribed text
        text: String,
    },
}

impl UiNotification {
    /// State-change notification without text
    pub fn state(state: State) -> Self {
        Self::State { state, text: None }
    }

    /// State-change notification carrying `text`
    pub fn state_with_text(state: State, text: impl Into<String>) -> Self {
        Self::State {
            state,
            text: Some(text.into()),
        }
    }
}

/// The consumer of session state (a panel, a terminal, ...)
pub trait UiSurface: Send + Sync {
    /// Deliver a notification; must not block
    fn notify(&self, notification: UiNotification);
}

/// Ephemeral user-facing messages
pub trait Notifier: Send + Sync {
    /// Informational message
    fn info(&self, message: &str);
    /// Something the user did was not accepted
    fn warn(&self, message: &str);
    /// Something failed
    fn error(&self, message: &str);
}

/// Destination for transcribed text
#[async_trait]
pub trait Clipboard: Send + Sync {
    /// Replace the clipboard contents with `text`
    async fn write_text(&self, text: &str) -> anyhow::Result<()>;
}

/// Notifier that only writes to the log
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn info(&self, message: &str) {
        info!("{message}");
    }

    fn warn(&self, message: &str) {
        warn!("{message}");
    }

    fn error(&self, message: &str) {
        error!("{message}");
    }
}

/// Clipboard that discards everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NoClipboard;

#[async_trait]
impl Clipboard for NoClipboard {
    async fn write_text(&self, _text: &str) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Everything a session reports to, bundled for injection
#[derive(Clone)]
pub struct Collaborators {
    /// UI surface receiving state and result notifications
    pub surface: Arc<dyn UiSurface>,
    /// Ephemeral messages
    pub notifier: Arc<dyn Notifier>,
    /// Where results are copied
    pub clipboard: Arc<dyn Clipboard>,
}

impl Collaborators {
    /// Bundle a surface with the log notifier and no clipboard
    pub fn new(surface: Arc<dyn UiSurface>) -> Self {
        Self {
            surface,
            notifier: Arc::new(LogNotifier),
            clipboard: Arc::new(NoClipboard),
        }
    }

    /// Use `notifier` for ephemeral messages
    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    /// Copy results to `clipboard`
    pub fn with_clipboard(mut self, clipboard: Arc<dyn Clipboard>) -> Self {
        self.clipboard = clipboard;
        self
    }
}
