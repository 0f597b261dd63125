//! Supervision of the whisper dictation worker
//!
//! The worker is a long-lived helper process that records audio and
//! transcribes it. It reports progress with single-line status messages on
//! stdout and takes `START`/`STOP` tokens on stdin. This crate turns that
//! stream into one authoritative [`State`], forwards user commands only when
//! they are legal, recovers from transient errors, and reports everything to
//! pluggable [`UiSurface`], [`Notifier`] and [`Clipboard`] collaborators.
//!
//! ```no_run
//! use dictation_supervisor::{Collaborators, SupervisorConfig, Supervisor, UiNotification, UiSurface};
//! use std::sync::Arc;
//!
//! struct Print;
//!
//! impl UiSurface for Print {
//!     fn notify(&self, notification: UiNotification) {
//!         println!("{notification:?}");
//!     }
//! }
//!
//! smol::block_on(async {
//!     let mut supervisor = Supervisor::new(
//!         SupervisorConfig::default(),
//!         Collaborators::new(Arc::new(Print)),
//!     );
//!     let session = supervisor.open().await;
//!     session.start();
//! });
//! ```

#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod framer;
pub mod interpreter;
pub mod notify;
pub mod protocol;
pub mod session;
pub mod state;

pub use config::{ConfigError, SessionSettings, SupervisorConfig};
pub use error::{Error, Result};
pub use framer::LineFramer;
pub use interpreter::{Effect, Interpreter};
pub use notify::{Clipboard, Collaborators, LogNotifier, NoClipboard, Notifier, UiNotification, UiSurface};
pub use protocol::{Command, ControlLine};
pub use session::{Session, Supervisor};
pub use state::{SessionSnapshot, State};
