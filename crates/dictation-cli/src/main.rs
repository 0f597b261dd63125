use anyhow::{Context, Result};
use clap::Parser;
use dictation_supervisor::{Collaborators, Supervisor, config};
use futures::StreamExt;
use smol::Unblock;
use smol::io::{AsyncBufReadExt, BufReader};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

mod clipboard;
mod input;
mod terminal;

use clipboard::CommandClipboard;
use input::UserCommand;
use terminal::{OutputFormat, TerminalNotifier, TerminalSurface};

#[derive(Parser)]
#[command(name = "dictation")]
#[command(about = "Record, transcribe and copy speech with a local whisper worker")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Transcription model size (tiny, base, small, medium, large-v3)
    #[arg(short, long)]
    model: Option<String>,

    /// Language code of the speech
    #[arg(short, long)]
    language: Option<String>,

    /// Worker script to run
    #[arg(long)]
    script: Option<PathBuf>,

    /// Print notifications as JSON lines
    #[arg(long)]
    json: bool,

    /// Write logs to this file instead of stderr
    #[arg(long)]
    log_file: Option<PathBuf>,
}

fn main() -> Result<()> {
    smol::block_on(async {
        let cli = Cli::parse();
        let _guard = init_logging(cli.log_file.as_deref())?;

        let mut config = config::load(cli.config.as_deref()).context("Failed to load configuration")?;
        if let Some(model) = cli.model {
            config.worker.model = model;
        }
        if let Some(language) = cli.language {
            config.worker.language = language;
        }
        if let Some(script) = cli.script {
            config.worker.script = script.to_string_lossy().into_owned();
        }
        config.validate().context("Invalid configuration")?;

        let format = if cli.json {
            OutputFormat::Json
        } else {
            OutputFormat::Human
        };
        let surface = TerminalSurface::new(format);
        let collaborators = Collaborators::new(Arc::new(surface))
            .with_notifier(Arc::new(TerminalNotifier::new(format)))
            .with_clipboard(Arc::new(CommandClipboard::default()));

        info!(model = %config.worker.model, language = %config.worker.language, "starting dictation");
        let mut supervisor = Supervisor::new(config, collaborators);
        supervisor.open().await;

        let result = run(&mut supervisor, surface).await;
        supervisor.close().await;
        info!("dictation finished");
        result
    })
}

/// Read commands from stdin until `quit` or end of input
async fn run(supervisor: &mut Supervisor, surface: TerminalSurface) -> Result<()> {
    let mut lines = BufReader::new(Unblock::new(std::io::stdin())).lines();

    while let Some(line) = lines.next().await {
        let line = line.context("Failed to read from stdin")?;
        let command = match line.parse::<UserCommand>() {
            Ok(command) => command,
            Err(message) => {
                eprintln!("{message}");
                continue;
            }
        };

        match command {
            UserCommand::Quit => break,
            UserCommand::Help => println!("{}", input::HELP),
            UserCommand::Status => {
                if let Some(session) = supervisor.session() {
                    surface.print_status(&session.snapshot());
                }
            }
            UserCommand::Restart => {
                supervisor.close().await;
                supervisor.open().await;
            }
            // A dead session stays dead until `restart`
            command => {
                if let Some(session) = supervisor.session() {
                    if let Some(worker_command) = command.worker_command(session.state()) {
                        session.send(worker_command);
                    }
                }
            }
        }
    }
    Ok(())
}

fn init_logging(log_file: Option<&Path>) -> Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let Some(path) = log_file else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_target(false)
            .init();
        return Ok(None);
    };

    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let file_name = path.file_name().context("Log file path has no file name")?;
    std::fs::create_dir_all(dir)?;

    let file_appender = tracing_appender::rolling::never(dir, file_name);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(non_blocking)
        .with_ansi(false) // No ANSI colors in log file
        .init();
    Ok(Some(guard))
}
