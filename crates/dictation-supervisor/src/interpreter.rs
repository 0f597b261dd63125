//! Protocol interpretation and the session state machine
//!
//! [`Interpreter`] is pure: every input returns the list of [`Effect`]s the
//! session must carry out, in order. It never touches the process, the UI or
//! a timer itself, which keeps every transition testable without a worker.

use std::time::Duration;
use tracing::debug;

use crate::error::Error;
use crate::notify::UiNotification;
use crate::protocol::{Command, ControlLine};
use crate::state::State;

/// Delay before an `ERROR` state falls back to `READY`
pub const DEFAULT_RECOVERY_DELAY: Duration = Duration::from_secs(3);

/// Something the session must do in response to an input
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Deliver a notification to the UI surface
    Notify(UiNotification),
    /// Write a command token to the worker's stdin
    Send(Command),
    /// Copy a transcription to the clipboard
    CopyToClipboard(String),
    /// Informational message for the notifier
    Inform(String),
    /// Rejected user action
    Warn(String),
    /// User-visible failure
    Alert(String),
    /// Arm the recovery timer; it must report back with `generation`
    ScheduleRecovery {
        /// Generation the recovery is valid for
        generation: u64,
        /// How long to wait
        delay: Duration,
    },
    /// Disarm the pending recovery timer
    CancelRecovery,
}

/// The state machine behind a session
#[derive(Debug, Clone)]
pub struct Interpreter {
    state: State,
    message: Option<String>,
    ever_ready: bool,
    worker_alive: bool,
    /// Bumped on every state change; a recovery only fires for its own generation
    generation: u64,
    pending_recovery: Option<u64>,
    recovery_delay: Duration,
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new(DEFAULT_RECOVERY_DELAY)
    }
}

impl Interpreter {
    /// A freshly spawned worker: `LOADING`, alive, never ready
    pub fn new(recovery_delay: Duration) -> Self {
        Self {
            state: State::Loading,
            message: None,
            ever_ready: false,
            worker_alive: true,
            generation: 0,
            pending_recovery: None,
            recovery_delay,
        }
    }

    /// Current state
    pub fn state(&self) -> State {
        self.state
    }

    /// Text attached to the current state
    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    /// Whether `READY` was reached at least once
    pub fn ever_ready(&self) -> bool {
        self.ever_ready
    }

    /// Whether a worker process is still believed to exist
    pub fn worker_alive(&self) -> bool {
        self.worker_alive
    }

    /// Current generation
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Generation of the armed recovery, if any
    pub fn pending_recovery(&self) -> Option<u64> {
        self.pending_recovery
    }

    fn transition(&mut self, state: State, text: Option<String>, effects: &mut Vec<Effect>) {
        if self.pending_recovery.take().is_some() {
            effects.push(Effect::CancelRecovery);
        }
        self.generation += 1;
        self.state = state;
        self.message = text.clone();
        if state == State::Ready {
            self.ever_ready = true;
        }
        debug!(%state, generation = self.generation, "session transition");
        effects.push(Effect::Notify(UiNotification::State { state, text }));
    }

    /// React to one control line from the worker
    pub fn on_line(&mut self, line: ControlLine) -> Vec<Effect> {
        let mut effects = Vec::new();
        if self.state.is_terminal() {
            return effects;
        }

        match line {
            ControlLine::Loading => {
                if self.state != State::Loading {
                    self.transition(State::Loading, None, &mut effects);
                }
            }
            ControlLine::Ready => {
                if self.state != State::Ready {
                    self.transition(State::Ready, None, &mut effects);
                }
            }
            ControlLine::Recording => {
                if self.state != State::Recording {
                    self.transition(State::Recording, None, &mut effects);
                }
            }
            ControlLine::Result(text) => {
                self.transition(State::Ready, None, &mut effects);
                effects.push(Effect::Notify(UiNotification::Result { text: text.clone() }));
                effects.push(Effect::Inform(format!("Copied: \"{text}\"")));
                effects.push(Effect::CopyToClipboard(text));
            }
            ControlLine::Error(message) => {
                let alert = Error::Protocol(message.clone()).to_string();
                self.transition(State::Error, Some(message), &mut effects);
                effects.push(Effect::Alert(alert));
                self.pending_recovery = Some(self.generation);
                effects.push(Effect::ScheduleRecovery {
                    generation: self.generation,
                    delay: self.recovery_delay,
                });
            }
        }
        effects
    }

    /// React to a user command
    pub fn on_command(&mut self, command: Command) -> Vec<Effect> {
        let mut effects = Vec::new();
        match command {
            Command::Start => {
                if self.state == State::Ready && self.worker_alive {
                    effects.push(Effect::Send(Command::Start));
                } else {
                    effects.push(Effect::Warn(start_rejection(self.state).to_string()));
                }
            }
            Command::Stop => {
                // Trust the process, not the declared state: the worker may be
                // recording even if we think otherwise.
                if !self.worker_alive {
                    return effects;
                }
                effects.push(Effect::Send(Command::Stop));
                if self.state == State::Recording {
                    self.transition(State::Transcribing, None, &mut effects);
                }
            }
        }
        effects
    }

    /// The recovery timer armed under `generation` elapsed
    pub fn on_recovery_due(&mut self, generation: u64) -> Vec<Effect> {
        let mut effects = Vec::new();
        if self.pending_recovery != Some(generation) {
            debug!(generation, current = self.generation, "stale recovery ignored");
            return effects;
        }
        self.pending_recovery = None;

        if self.state == State::Error && self.worker_alive && self.ever_ready {
            self.transition(State::Ready, None, &mut effects);
        }
        effects
    }

    /// The worker exited; `reason` describes how
    pub fn on_exit(&mut self, reason: String) -> Vec<Effect> {
        let mut effects = Vec::new();
        if self.state.is_terminal() {
            return effects;
        }
        self.worker_alive = false;
        self.transition(State::Dead, Some(reason), &mut effects);
        effects
    }

    /// The worker could not be started at all
    pub fn on_launch_failure(&mut self, error: &Error) -> Vec<Effect> {
        let mut effects = Vec::new();
        if self.state.is_terminal() {
            return effects;
        }
        let message = error.to_string();
        self.worker_alive = false;
        effects.push(Effect::Alert(message.clone()));
        self.transition(State::Dead, Some(message), &mut effects);
        effects
    }
}

fn start_rejection(state: State) -> &'static str {
    match state {
        State::Loading => "The model is still loading. Please wait a moment.",
        State::Recording => "Already recording.",
        State::Transcribing => "Still transcribing the previous recording.",
        State::Error => "The worker is recovering from an error. Please wait a moment.",
        State::Dead => "The worker process has terminated. Close and reopen the session.",
        State::Ready => "The worker is not running.",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DELAY: Duration = Duration::from_millis(3000);

    fn ready_machine() -> Interpreter {
        let mut machine = Interpreter::new(DELAY);
        machine.on_line(ControlLine::Loading);
        machine.on_line(ControlLine::Ready);
        machine
    }

    fn schedule_of(effects: &[Effect]) -> Option<u64> {
        effects.iter().find_map(|e| match e {
            Effect::ScheduleRecovery { generation, .. } => Some(*generation),
            _ => None,
        })
    }

    #[test]
    fn test_loading_is_reaffirmed_silently() {
        let mut machine = Interpreter::new(DELAY);
        assert_eq!(machine.state(), State::Loading);
        assert!(machine.on_line(ControlLine::Loading).is_empty());
        assert!(machine.on_line(ControlLine::Loading).is_empty());
        assert_eq!(machine.generation(), 0);
    }

    #[test]
    fn test_ready_marks_ever_ready() {
        let mut machine = Interpreter::new(DELAY);
        let effects = machine.on_line(ControlLine::Ready);
        assert_eq!(effects, vec![Effect::Notify(UiNotification::state(State::Ready))]);
        assert!(machine.ever_ready());
    }

    #[test]
    fn test_full_dictation_cycle() {
        let mut machine = ready_machine();

        assert_eq!(machine.on_command(Command::Start), vec![Effect::Send(Command::Start)]);
        assert_eq!(machine.state(), State::Ready);

        machine.on_line(ControlLine::Recording);
        assert_eq!(machine.state(), State::Recording);

        let effects = machine.on_command(Command::Stop);
        assert_eq!(
            effects,
            vec![
                Effect::Send(Command::Stop),
                Effect::Notify(UiNotification::state(State::Transcribing)),
            ]
        );

        let effects = machine.on_line(ControlLine::Result("test".to_string()));
        assert_eq!(machine.state(), State::Ready);
        assert!(effects.contains(&Effect::Notify(UiNotification::Result {
            text: "test".to_string()
        })));
        assert!(effects.contains(&Effect::CopyToClipboard("test".to_string())));
    }

    #[test]
    fn test_start_rejected_unless_ready() {
        let mut machine = Interpreter::new(DELAY);
        let effects = machine.on_command(Command::Start);
        assert!(matches!(effects.as_slice(), [Effect::Warn(msg)] if msg.contains("loading")));
        assert_eq!(machine.state(), State::Loading);

        let mut machine = ready_machine();
        machine.on_line(ControlLine::Recording);
        let before = machine.generation();
        let effects = machine.on_command(Command::Start);
        assert!(matches!(effects.as_slice(), [Effect::Warn(_)]));
        assert_eq!(machine.state(), State::Recording);
        assert_eq!(machine.generation(), before);

        machine.on_command(Command::Stop);
        assert!(matches!(machine.on_command(Command::Start).as_slice(), [Effect::Warn(_)]));
        assert_eq!(machine.state(), State::Transcribing);
    }

    #[test]
    fn test_stop_forwarded_regardless_of_state() {
        let mut machine = ready_machine();
        assert_eq!(machine.on_command(Command::Stop), vec![Effect::Send(Command::Stop)]);
        assert_eq!(machine.state(), State::Ready);

        let mut loading = Interpreter::new(DELAY);
        assert_eq!(loading.on_command(Command::Stop), vec![Effect::Send(Command::Stop)]);
    }

    #[test]
    fn test_error_recovers_exactly_once() {
        let mut machine = ready_machine();
        let effects = machine.on_line(ControlLine::Error("mic busy".to_string()));

        assert_eq!(machine.state(), State::Error);
        assert_eq!(machine.message(), Some("mic busy"));
        assert!(effects.contains(&Effect::Notify(UiNotification::state_with_text(
            State::Error,
            "mic busy"
        ))));
        assert!(effects.iter().any(|e| matches!(e, Effect::Alert(msg) if msg.contains("mic busy"))));

        let generation = schedule_of(&effects).unwrap();
        let recovered = machine.on_recovery_due(generation);
        assert_eq!(recovered, vec![Effect::Notify(UiNotification::state(State::Ready))]);
        assert_eq!(machine.state(), State::Ready);

        assert!(machine.on_recovery_due(generation).is_empty());
        assert_eq!(machine.state(), State::Ready);
    }

    #[test]
    fn test_error_before_ready_does_not_recover() {
        let mut machine = Interpreter::new(DELAY);
        let effects = machine.on_line(ControlLine::Error("model download failed".to_string()));
        let generation = schedule_of(&effects).unwrap();

        assert!(machine.on_recovery_due(generation).is_empty());
        assert_eq!(machine.state(), State::Error);
    }

    #[test]
    fn test_second_error_supersedes_first_recovery() {
        let mut machine = ready_machine();
        let first = schedule_of(&machine.on_line(ControlLine::Error("one".to_string()))).unwrap();

        let effects = machine.on_line(ControlLine::Error("two".to_string()));
        assert!(effects.contains(&Effect::CancelRecovery));
        let second = schedule_of(&effects).unwrap();
        assert_ne!(first, second);

        assert!(machine.on_recovery_due(first).is_empty());
        assert_eq!(machine.state(), State::Error);
        assert_eq!(machine.message(), Some("two"));

        assert!(!machine.on_recovery_due(second).is_empty());
        assert_eq!(machine.state(), State::Ready);
    }

    #[test]
    fn test_newer_state_is_not_clobbered_by_recovery() {
        let mut machine = ready_machine();
        let generation = schedule_of(&machine.on_line(ControlLine::Error("x".to_string()))).unwrap();

        let effects = machine.on_line(ControlLine::Recording);
        assert!(effects.contains(&Effect::CancelRecovery));

        assert!(machine.on_recovery_due(generation).is_empty());
        assert_eq!(machine.state(), State::Recording);
    }

    #[test]
    fn test_exit_forces_dead_and_disables_commands() {
        let mut machine = ready_machine();
        let generation = schedule_of(&machine.on_line(ControlLine::Error("x".to_string()))).unwrap();

        let effects = machine.on_exit("worker exited with exit code 1".to_string());
        assert_eq!(machine.state(), State::Dead);
        assert!(effects.contains(&Effect::CancelRecovery));
        assert!(!machine.worker_alive());

        assert!(machine.on_recovery_due(generation).is_empty());
        assert!(machine.on_command(Command::Stop).is_empty());
        assert!(matches!(machine.on_command(Command::Start).as_slice(), [Effect::Warn(_)]));
        assert!(machine.on_line(ControlLine::Ready).is_empty());
        assert!(machine.on_exit("again".to_string()).is_empty());
        assert_eq!(machine.state(), State::Dead);
    }

    #[test]
    fn test_launch_failure_is_dead_with_alert() {
        let mut machine = Interpreter::new(DELAY);
        let error = Error::Locator {
            name: "uv".to_string(),
        };
        let effects = machine.on_launch_failure(&error);

        assert_eq!(machine.state(), State::Dead);
        assert!(matches!(&effects[0], Effect::Alert(msg) if msg.contains("uv")));
        assert!(matches!(
            &effects[1],
            Effect::Notify(UiNotification::State { state: State::Dead, text: Some(_) })
        ));
    }

    #[test]
    fn test_result_text_is_verbatim() {
        let mut machine = ready_machine();
        machine.on_line(ControlLine::Recording);
        machine.on_command(Command::Stop);

        let line = ControlLine::parse("RESULT:hello world").unwrap();
        let effects = machine.on_line(line);
        assert!(effects.contains(&Effect::CopyToClipboard("hello world".to_string())));
    }
}
