//! Agent Timeline - Discover, parse and follow Claude Code session logs.

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use agent_timeline::config::{ConfigError, ConfigLoader, IngestConfig};
use agent_timeline::display;
use agent_timeline::scanner::{scan_projects, summarize_session, ScanError};
use agent_timeline::transcript::{parse_file, ParseError};
use agent_timeline::watcher::{SessionWatcher, WatchReceivers, WatcherError};

#[derive(Parser)]
#[command(
    name = "agent-timeline",
    about = "Discover, parse and follow Claude Code session logs",
    version
)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short = 'v', long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Config file to use instead of the default search paths.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Print full content without truncation.
    #[arg(long, global = true)]
    raw: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List projects and their sessions, most recent first.
    Projects {
        /// Projects root (defaults to ~/.claude/projects).
        #[arg(long)]
        root: Option<PathBuf>,
        /// Maximum sessions listed per project.
        #[arg(short = 'n', long, default_value_t = 5)]
        limit: usize,
    },
    /// Reconstruct and print the turns of a session log.
    Show {
        /// Session log file.
        file: PathBuf,
    },
    /// Follow session logs and print records as they are appended.
    Follow {
        /// Session log files.
        #[arg(required = true)]
        files: Vec<PathBuf>,
        /// Print existing records before following.
        #[arg(long)]
        replay: bool,
    },
}

#[derive(Debug, thiserror::Error)]
enum AppError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Scan(#[from] ScanError),
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Watcher(#[from] WatcherError),
    #[error("Could not determine the projects root; pass --root")]
    NoProjectsRoot,
}

fn init_tracing(verbosity: u8) {
    let level = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

fn load_config(path: Option<PathBuf>) -> Result<IngestConfig, ConfigError> {
    let loader = path.map_or_else(ConfigLoader::new, ConfigLoader::with_path);
    loader.load()
}

fn list_projects(
    config: &IngestConfig,
    root: Option<PathBuf>,
    limit: usize,
    raw: bool,
) -> Result<(), AppError> {
    let root = root
        .or_else(|| config.projects_root())
        .ok_or(AppError::NoProjectsRoot)?;
    tracing::info!(root = %root.display(), "Scanning projects");

    for project in scan_projects(&root)? {
        display::print_project(&project);
        for session in project.sessions.iter().take(limit) {
            match summarize_session(session) {
                Ok(summary) => display::print_session_summary(&summary, raw),
                Err(e) => tracing::warn!(error = %e, "Skipping unreadable session"),
            }
        }
    }
    Ok(())
}

fn show(file: &Path, raw: bool) -> Result<(), AppError> {
    let transcript = parse_file(file)?;
    for turn in &transcript.turns {
        display::print_turn(turn, raw);
    }
    display::print_totals(&transcript);
    Ok(())
}

async fn follow(
    config: &IngestConfig,
    files: &[PathBuf],
    replay: bool,
    raw: bool,
) -> Result<(), AppError> {
    let mut watcher_config = config.watcher.clone();
    watcher_config.replay_existing |= replay;

    let (watcher, receivers) = SessionWatcher::new(&watcher_config)?;
    let WatchReceivers {
        mut events,
        mut errors,
    } = receivers;

    // Drain while registering, so replay cannot block on a full queue.
    let printer = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            display::print_event(&event, raw);
        }
    });

    for file in files {
        watcher.watch(file).await?;
    }
    tracing::info!(count = watcher.watched_count(), "Following session logs");

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);
    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            Some(error) = errors.recv() => display::print_error(&error.to_string()),
        }
    }

    watcher.close().await?;
    printer.await.map_err(WatcherError::from)?;
    Ok(())
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let result = match load_config(cli.config) {
        Ok(config) => match cli.command {
            Commands::Projects { root, limit } => list_projects(&config, root, limit, cli.raw),
            Commands::Show { file } => show(&file, cli.raw),
            Commands::Follow { files, replay } => follow(&config, &files, replay, cli.raw).await,
        },
        Err(e) => Err(e.into()),
    };

    if let Err(e) = result {
        display::print_error(&e.to_string());
        std::process::exit(1);
    }
}
