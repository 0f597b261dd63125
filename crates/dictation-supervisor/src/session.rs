//! Supervised worker sessions
//!
//! A [`Session`] is one lifetime of one worker process. It runs a single
//! event loop that owns the process handle, the output framer and the
//! [`Interpreter`]; everything else (the UI, user commands, the recovery
//! timer) talks to that loop through a channel. The UI only ever sees
//! snapshots.

use chrono::{DateTime, Utc};
use futures::channel::mpsc::{self, UnboundedReceiver, UnboundedSender};
use futures::StreamExt;
use smol::{Task, Timer};
use std::collections::VecDeque;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;
use tracing::{debug, error, info, warn};
use worker_process::{
    Command as WorkerCommand, ExitStatus, WorkerEvent, WorkerEventKind, WorkerEventStream,
    WorkerHandle, WorkerProcess,
};

use crate::config::{SessionSettings, SupervisorConfig};
use crate::error::{Error, Result};
use crate::framer::LineFramer;
use crate::interpreter::{Effect, Interpreter};
use crate::notify::{Collaborators, UiNotification};
use crate::protocol::{Command, ControlLine};
use crate::state::{SessionSnapshot, State};

/// How long `dispose` waits for a killed worker to be reaped
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

enum SessionInput {
    Command(Command),
    RecoveryDue(u64),
    Dispose,
}

/// One supervised worker and its UI-visible state
///
/// Dropping a session cancels its event loop, which kills the worker.
/// Prefer [`Session::dispose`] to also wait for the process to be reaped.
pub struct Session {
    inputs: UnboundedSender<SessionInput>,
    snapshot: Arc<RwLock<SessionSnapshot>>,
    task: Option<Task<()>>,
}

impl Session {
    /// Locate the launcher, prepare the cache directory and spawn the worker
    ///
    /// Never fails: a missing launcher or a failed spawn yields a session
    /// that is already `DEAD` and has no process. The launcher search may
    /// block for its whole timeout, so it runs on the blocking thread pool.
    pub async fn launch(config: &SupervisorConfig, collaborators: Collaborators) -> Self {
        let settings = config.session_settings();
        let config = config.clone();
        match smol::unblock(move || prepare_launch(&config)).await {
            Ok(command) => Self::spawn(&command, settings, collaborators),
            Err(e) => Self::failed(e, settings, collaborators),
        }
    }

    /// Spawn an explicit worker command
    pub fn spawn(
        command: &WorkerCommand,
        settings: SessionSettings,
        collaborators: Collaborators,
    ) -> Self {
        match WorkerProcess::spawn(command) {
            Ok((events, handle)) => {
                info!(pid = handle.pid(), "worker session started");
                Self::start_loop(Some((events, handle)), None, settings, collaborators)
            }
            Err(e) => Self::failed(Error::Spawn(e), settings, collaborators),
        }
    }

    fn failed(error: Error, settings: SessionSettings, collaborators: Collaborators) -> Self {
        error!(error = %error, "worker could not be launched");
        Self::start_loop(None, Some(error), settings, collaborators)
    }

    fn start_loop(
        worker: Option<(WorkerEventStream, WorkerHandle)>,
        launch_error: Option<Error>,
        settings: SessionSettings,
        collaborators: Collaborators,
    ) -> Self {
        let (inputs_tx, inputs_rx) = mpsc::unbounded();
        let snapshot = Arc::new(RwLock::new(SessionSnapshot::default()));

        let (events, handle) = match worker {
            Some((events, handle)) => (Some(events), Some(handle)),
            None => (None, None),
        };
        let spawned_at = handle.as_ref().map(|_| Utc::now());

        let mut session_loop = SessionLoop {
            interpreter: Interpreter::new(settings.recovery_delay),
            snapshot: snapshot.clone(),
            collaborators,
            inputs: inputs_tx.clone(),
            worker: handle,
            spawned_at,
            recovery: None,
            output: LineFramer::new(),
            diagnostics: LineFramer::new(),
            diagnostic_tail: VecDeque::new(),
            tail_len: settings.diagnostic_tail,
        };

        // The UI learns the initial state before the loop processes anything.
        let initial = match &launch_error {
            Some(error) => session_loop.interpreter.on_launch_failure(error),
            None => vec![Effect::Notify(UiNotification::state(State::Loading))],
        };
        let pending = session_loop.dispatch(initial);
        debug_assert!(pending.is_empty());

        let task = smol::spawn(session_loop.run(events, inputs_rx));

        Self {
            inputs: inputs_tx,
            snapshot,
            task: Some(task),
        }
    }

    /// Current state and metadata
    pub fn snapshot(&self) -> SessionSnapshot {
        self.snapshot
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Current state
    pub fn state(&self) -> State {
        self.snapshot().state
    }

    /// Whether the session can still do anything
    pub fn is_alive(&self) -> bool {
        !self.state().is_terminal()
    }

    /// Ask the worker to start recording; only honoured in `READY`
    pub fn start(&self) {
        self.send(Command::Start);
    }

    /// Ask the worker to stop recording and transcribe
    pub fn stop(&self) {
        self.send(Command::Stop);
    }

    /// Queue a user command for the session loop
    pub fn send(&self, command: Command) {
        if self.inputs.unbounded_send(SessionInput::Command(command)).is_err() {
            debug!(%command, "session loop is gone, command dropped");
        }
    }

    /// Kill the worker and wait for the session loop to finish
    pub async fn dispose(mut self) {
        let _ = self.inputs.unbounded_send(SessionInput::Dispose);
        if let Some(task) = self.task.take() {
            task.await;
        }
    }
}

/// Resolve everything a launch needs, without spawning
fn prepare_launch(config: &SupervisorConfig) -> Result<WorkerCommand> {
    let launcher = config.resolve_launcher()?;
    let cache_dir = config.cache_dir();
    std::fs::create_dir_all(&cache_dir)?;
    debug!(launcher = %launcher.display(), cache_dir = %cache_dir.display(), "launch prepared");
    Ok(config.worker_command(&launcher, &cache_dir))
}

struct SessionLoop {
    interpreter: Interpreter,
    snapshot: Arc<RwLock<SessionSnapshot>>,
    collaborators: Collaborators,
    /// Lets the recovery timer report back into this loop
    inputs: UnboundedSender<SessionInput>,
    worker: Option<WorkerHandle>,
    spawned_at: Option<DateTime<Utc>>,
    /// Dropping the task cancels the timer
    recovery: Option<Task<()>>,
    output: LineFramer,
    diagnostics: LineFramer,
    diagnostic_tail: VecDeque<String>,
    tail_len: usize,
}

impl SessionLoop {
    async fn run(
        mut self,
        events: Option<WorkerEventStream>,
        mut inputs: UnboundedReceiver<SessionInput>,
    ) {
        if let Some(mut events) = events {
            loop {
                futures::select! {
                    event = events.next() => match event {
                        Some(event) => {
                            if self.on_worker_event(event).await {
                                break;
                            }
                        }
                        None => {
                            self.on_worker_gone("Worker process terminated".to_string()).await;
                            break;
                        }
                    },
                    input = inputs.next() => match input {
                        Some(SessionInput::Dispose) | None => {
                            self.shutdown(events).await;
                            return;
                        }
                        Some(input) => self.on_input(input).await,
                    },
                }
            }
        }

        // The worker is gone; commands can only be rejected from here on.
        while let Some(input) = inputs.next().await {
            match input {
                SessionInput::Dispose => break,
                input => self.on_input(input).await,
            }
        }
        self.recovery = None;
    }

    async fn on_input(&mut self, input: SessionInput) {
        let effects = match input {
            SessionInput::Command(command) => {
                debug!(%command, state = %self.interpreter.state(), "user command");
                self.interpreter.on_command(command)
            }
            SessionInput::RecoveryDue(generation) => self.interpreter.on_recovery_due(generation),
            SessionInput::Dispose => return,
        };
        self.apply(effects).await;
    }

    /// Returns true once the terminal event has been handled
    async fn on_worker_event(&mut self, event: WorkerEvent) -> bool {
        match event.kind {
            WorkerEventKind::Started { pid } => {
                debug!(pid, "worker running");
            }
            WorkerEventKind::Output(chunk) => {
                for line in self.output.push(&chunk) {
                    self.on_line(&line, event.timestamp).await;
                }
            }
            WorkerEventKind::Diagnostic(chunk) => {
                for line in self.diagnostics.push(&chunk) {
                    debug!(target: "dictation::worker", "{line}");
                    if self.tail_len > 0 {
                        if self.diagnostic_tail.len() == self.tail_len {
                            self.diagnostic_tail.pop_front();
                        }
                        self.diagnostic_tail.push_back(line);
                    }
                }
            }
            WorkerEventKind::Exited(status) => {
                if let Some(tail) = std::mem::take(&mut self.output).finish() {
                    debug!(line = %tail, "discarding unterminated worker output");
                }
                let reason = self.exit_reason(status);
                info!(%status, "worker exited");
                self.on_worker_gone(reason).await;
                return true;
            }
        }
        false
    }

    async fn on_line(&mut self, line: &str, at: DateTime<Utc>) {
        let Some(control) = ControlLine::parse(line) else {
            debug!(line, "ignoring non-protocol output");
            return;
        };
        debug!(line, "control line");

        let was_ready = self.interpreter.ever_ready();
        let effects = self.interpreter.on_line(control);
        if !was_ready && self.interpreter.ever_ready() {
            if let Some(spawned_at) = self.spawned_at {
                info!(load_ms = (at - spawned_at).num_milliseconds(), "worker ready");
            }
        }
        self.apply(effects).await;
    }

    async fn on_worker_gone(&mut self, reason: String) {
        self.worker = None;
        let effects = self.interpreter.on_exit(reason);
        self.apply(effects).await;
    }

    fn exit_reason(&self, status: ExitStatus) -> String {
        let mut reason = format!("Worker process terminated ({status})");
        if !self.diagnostic_tail.is_empty() {
            reason.push_str(": ");
            reason.push_str(&Vec::from(self.diagnostic_tail.clone()).join("\n"));
        }
        reason
    }

    async fn shutdown(&mut self, mut events: WorkerEventStream) {
        info!("disposing worker session");
        let effects = self.interpreter.on_exit("Session closed".to_string());
        if let Some(worker) = self.worker.take() {
            worker.kill();
            let reaped = smol::future::or(
                async {
                    while let Some(event) = events.next().await {
                        if event.is_terminal() {
                            return true;
                        }
                    }
                    true
                },
                async {
                    Timer::after(SHUTDOWN_GRACE).await;
                    false
                },
            )
            .await;
            if !reaped {
                warn!(pid = worker.pid(), "worker not reaped in time after kill");
            }
        }
        self.apply(effects).await;
        self.recovery = None;
    }

    async fn apply(&mut self, effects: Vec<Effect>) {
        for command in self.dispatch(effects) {
            self.write(command).await;
        }
    }

    /// Carry out every effect that needs no waiting, returning the writes
    fn dispatch(&mut self, effects: Vec<Effect>) -> Vec<Command> {
        self.sync_snapshot();

        let mut writes = Vec::new();
        for effect in effects {
            match effect {
                Effect::Notify(notification) => self.collaborators.surface.notify(notification),
                Effect::Send(command) => writes.push(command),
                Effect::CopyToClipboard(text) => self.copy_to_clipboard(text),
                Effect::Inform(message) => self.collaborators.notifier.info(&message),
                Effect::Warn(message) => self.collaborators.notifier.warn(&message),
                Effect::Alert(message) => self.collaborators.notifier.error(&message),
                Effect::ScheduleRecovery { generation, delay } => {
                    let inputs = self.inputs.clone();
                    debug!(generation, ?delay, "recovery scheduled");
                    // Replacing the task drops, and so cancels, the previous timer.
                    self.recovery = Some(smol::spawn(async move {
                        Timer::after(delay).await;
                        let _ = inputs.unbounded_send(SessionInput::RecoveryDue(generation));
                    }));
                }
                Effect::CancelRecovery => {
                    if self.recovery.take().is_some() {
                        debug!("pending recovery cancelled");
                    }
                }
            }
        }
        writes
    }

    async fn write(&mut self, command: Command) {
        let Some(worker) = &mut self.worker else {
            debug!(%command, "no worker to write to");
            return;
        };
        if let Err(e) = worker.write_line(command.token()).await {
            let error = Error::StreamWrite(e);
            warn!(%command, error = %error, "command not delivered");
        }
    }

    fn copy_to_clipboard(&self, text: String) {
        let clipboard = self.collaborators.clipboard.clone();
        smol::spawn(async move {
            if let Err(e) = clipboard.write_text(&text).await {
                warn!(error = %e, "failed to copy result to clipboard");
            }
        })
        .detach();
    }

    fn sync_snapshot(&self) {
        let mut snapshot = self
            .snapshot
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        snapshot.state = self.interpreter.state();
        snapshot.message = self.interpreter.message().map(str::to_string);
        snapshot.ever_ready = self.interpreter.ever_ready();
        snapshot.worker_pid = self.worker.as_ref().map(WorkerHandle::pid);
        snapshot.spawned_at = self.spawned_at;
    }
}

/// Owner of the single session behind one UI surface
pub struct Supervisor {
    config: SupervisorConfig,
    collaborators: Collaborators,
    session: Option<Session>,
}

impl Supervisor {
    /// Create a supervisor; no worker is started yet
    pub fn new(config: SupervisorConfig, collaborators: Collaborators) -> Self {
        Self {
            config,
            collaborators,
            session: None,
        }
    }

    /// The configuration sessions are launched with
    pub fn config(&self) -> &SupervisorConfig {
        &self.config
    }

    /// Return the live session, launching a fresh one if there is none
    ///
    /// A `DEAD` session is discarded and replaced; its handle is never reused.
    pub async fn open(&mut self) -> &Session {
        let session = match self.session.take() {
            Some(session) if session.is_alive() => session,
            stale => {
                if stale.is_some() {
                    debug!("replacing dead session");
                }
                Session::launch(&self.config, self.collaborators.clone()).await
            }
        };
        self.session.insert(session)
    }

    /// The current session, if one was opened
    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    /// Dispose of the current session, killing its worker
    pub async fn close(&mut self) {
        if let Some(session) = self.session.take() {
            session.dispose().await;
        }
    }
}
