//! Worker process plumbing for the dictation supervisor
//!
//! This crate knows how to find the launcher executable, start the
//! transcription worker with piped standard streams, and expose everything
//! the worker does as an ordered stream of raw events. It deliberately knows
//! nothing about the control protocol spoken over those streams.

#![warn(missing_docs)]

pub mod command;
pub mod error;
pub mod event;
pub mod locator;
pub mod process;
pub mod stdin;

pub use command::Command;
pub use error::{Error, Result};
pub use event::{WorkerEvent, WorkerEventKind};
pub use locator::ExecutableLocator;
pub use process::{ExitStatus, WorkerEventStream, WorkerHandle, WorkerProcess};
