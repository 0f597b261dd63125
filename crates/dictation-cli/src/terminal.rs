//! Terminal rendering of session notifications

use dictation_supervisor::{Notifier, SessionSnapshot, State, UiNotification, UiSurface};
use serde::Serialize;

/// How lines are printed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Plain text for people
    Human,
    /// One JSON object per line for scripts
    Json,
}

/// Non-notification lines in JSON output
#[derive(Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum Line<'a> {
    Message { level: &'a str, text: &'a str },
    Status(&'a SessionSnapshot),
}

/// Prints state changes and results to stdout
#[derive(Debug, Clone, Copy)]
pub struct TerminalSurface {
    format: OutputFormat,
}

impl TerminalSurface {
    /// Create a surface printing in `format`
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// Print a full snapshot, for the `status` command
    pub fn print_status(&self, snapshot: &SessionSnapshot) {
        match self.format {
            OutputFormat::Human => println!("{}", render_status(snapshot)),
            OutputFormat::Json => print_json(&Line::Status(snapshot)),
        }
    }
}

impl UiSurface for TerminalSurface {
    fn notify(&self, notification: UiNotification) {
        match self.format {
            OutputFormat::Human => println!("{}", render_notification(&notification)),
            OutputFormat::Json => print_json(&notification),
        }
    }
}

/// Prints ephemeral messages; human-readable ones go to stderr
#[derive(Debug, Clone, Copy)]
pub struct TerminalNotifier {
    format: OutputFormat,
}

impl TerminalNotifier {
    /// Create a notifier printing in `format`
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    fn print(&self, level: &str, text: &str) {
        match self.format {
            OutputFormat::Human => eprintln!("{level}: {text}"),
            OutputFormat::Json => print_json(&Line::Message { level, text }),
        }
    }
}

impl Notifier for TerminalNotifier {
    fn info(&self, message: &str) {
        self.print("info", message);
    }

    fn warn(&self, message: &str) {
        self.print("warning", message);
    }

    fn error(&self, message: &str) {
        self.print("error", message);
    }
}

fn print_json<T: Serialize>(value: &T) {
    match serde_json::to_string(value) {
        Ok(line) => println!("{line}"),
        Err(e) => tracing::warn!(error = %e, "failed to encode output line"),
    }
}

fn state_label(state: State) -> &'static str {
    match state {
        State::Loading => "Loading model...",
        State::Ready => "Ready. Press enter to record.",
        State::Recording => "Recording... press enter to stop.",
        State::Transcribing => "Transcribing...",
        State::Error => "Error",
        State::Dead => "Worker stopped",
    }
}

fn render_notification(notification: &UiNotification) -> String {
    match notification {
        UiNotification::State { state, text: None } => format!("[{state}] {}", state_label(*state)),
        UiNotification::State {
            state,
            text: Some(text),
        } => format!("[{state}] {}: {text}", state_label(*state)),
        UiNotification::Result { text } => format!("> {text}"),
    }
}

fn render_status(snapshot: &SessionSnapshot) -> String {
    let mut out = format!("state: {}", snapshot.state);
    if let Some(pid) = snapshot.worker_pid {
        out.push_str(&format!("\npid: {pid}"));
    }
    if let Some(spawned_at) = snapshot.spawned_at {
        out.push_str(&format!("\nstarted: {}", spawned_at.format("%Y-%m-%d %H:%M:%S UTC")));
    }
    out.push_str(&format!("\nmodel loaded: {}", if snapshot.ever_ready { "yes" } else { "no" }));
    if let Some(message) = &snapshot.message {
        out.push_str(&format!("\nmessage: {message}"));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_notifications() {
        assert_eq!(
            render_notification(&UiNotification::state(State::Transcribing)),
            "[TRANSCRIBING] Transcribing..."
        );
        assert_eq!(
            render_notification(&UiNotification::state_with_text(State::Error, "mic busy")),
            "[ERROR] Error: mic busy"
        );
        assert_eq!(
            render_notification(&UiNotification::Result {
                text: "hola".to_string()
            }),
            "> hola"
        );
    }

    #[test]
    fn test_render_dead_status() {
        let snapshot = SessionSnapshot {
            state: State::Dead,
            message: Some("Worker process terminated (exit code 1)".to_string()),
            ..SessionSnapshot::default()
        };
        let text = render_status(&snapshot);
        assert!(text.starts_with("state: DEAD"));
        assert!(text.contains("model loaded: no"));
        assert!(text.contains("exit code 1"));
        assert!(!text.contains("pid"));
    }

    #[test]
    fn test_json_message_line() {
        let line = Line::Message {
            level: "warning",
            text: "Already recording.",
        };
        assert_eq!(
            serde_json::to_string(&line).unwrap(),
            r#"{"type":"message","level":"warning","text":"Already recording."}"#
        );
    }
}
