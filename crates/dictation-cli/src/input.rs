//! Commands typed at the terminal

use dictation_supervisor::{Command, State};
use std::str::FromStr;

/// One line of user input
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserCommand {
    /// Start recording
    Start,
    /// Stop recording
    Stop,
    /// Stop while recording, start otherwise
    Toggle,
    /// Print the session snapshot
    Status,
    /// Dispose the session and open a new one
    Restart,
    /// Dispose the session and exit
    Quit,
    /// List the commands
    Help,
}

impl UserCommand {
    /// The worker command this resolves to in `state`, if any
    pub fn worker_command(self, state: State) -> Option<Command> {
        match self {
            UserCommand::Start => Some(Command::Start),
            UserCommand::Stop => Some(Command::Stop),
            UserCommand::Toggle if state == State::Recording => Some(Command::Stop),
            UserCommand::Toggle => Some(Command::Start),
            _ => None,
        }
    }
}

impl FromStr for UserCommand {
    type Err = String;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        match line.trim().to_ascii_lowercase().as_str() {
            "" | "t" | "toggle" => Ok(UserCommand::Toggle),
            "start" => Ok(UserCommand::Start),
            "stop" => Ok(UserCommand::Stop),
            "s" | "status" => Ok(UserCommand::Status),
            "r" | "restart" => Ok(UserCommand::Restart),
            "q" | "quit" | "exit" => Ok(UserCommand::Quit),
            "h" | "?" | "help" => Ok(UserCommand::Help),
            other => Err(format!("Unknown command: {other}. Type \"help\" for a list.")),
        }
    }
}

/// Text printed for `help`
pub const HELP: &str = "\
Commands:
  <enter>, toggle  start recording, or stop if recording
  start            start recording
  stop             stop recording and transcribe
  status           show the session state
  restart          restart the worker
  quit             stop the worker and exit";
