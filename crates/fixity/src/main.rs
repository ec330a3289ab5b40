//! Fixity launcher.
//!
//! `fixity checksum create` monitors a directory hierarchy and keeps `.md5`
//! checksum sidecars fresh for the data files within it. The process runs
//! until interrupted by SIGINT or SIGTERM, then stops gracefully.

use anyhow::Result;
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::info;

mod cli;

use cli::checksum::CreateArgs;

#[derive(Parser, Debug)]
#[command(name = "fixity", version, about = "Checksum sidecar monitor for instrument data")]
struct Cli {
    /// Enable verbose (info-level) output
    #[arg(long, global = true)]
    verbose: bool,

    /// Enable debug output
    #[arg(long, global = true)]
    debug: bool,

    /// Append logs to this file in addition to stderr
    #[arg(long, global = true)]
    log_file: Option<std::path::PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Manage checksum sidecar files
    Checksum {
        #[command(subcommand)]
        action: ChecksumAction,
    },
}

#[derive(Subcommand, Debug)]
enum ChecksumAction {
    /// Create and refresh checksum files under a root directory
    Create(CreateArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    fixity_logging::init_logging(fixity_logging::LogConfig {
        app_name: "fixity",
        verbose: cli.verbose,
        debug: cli.debug,
        log_file: cli.log_file.clone(),
    })?;

    let token = CancellationToken::new();
    spawn_signal_handler(token.clone());

    match cli.command {
        Commands::Checksum {
            action: ChecksumAction::Create(args),
        } => cli::checksum::run_create(args, token).await,
    }
}

/// Translate SIGINT/SIGTERM into a single cancellation of the shared token.
#[cfg(unix)]
fn spawn_signal_handler(token: CancellationToken) {
    use tokio::signal::unix::{signal, SignalKind};

    tokio::spawn(async move {
        let mut sigint = match signal(SignalKind::interrupt()) {
            Ok(stream) => stream,
            Err(err) => {
                tracing::error!(error = %err, "failed to register SIGINT handler");
                return;
            }
        };
        let mut sigterm = match signal(SignalKind::terminate()) {
            Ok(stream) => stream,
            Err(err) => {
                tracing::error!(error = %err, "failed to register SIGTERM handler");
                return;
            }
        };

        tokio::select! {
            _ = sigint.recv() => info!("got SIGINT, shutting down"),
            _ = sigterm.recv() => info!("got SIGTERM, shutting down"),
        }
        token.cancel();
    });
}

#[cfg(not(unix))]
fn spawn_signal_handler(token: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("got Ctrl+C, shutting down");
        }
        token.cancel();
    });
}
