//! CLI entry point for clipperd
//!
//! Parses command line arguments, initialises logging, runs the preflight
//! tool checks, and starts the server.

use clap::Parser;
use clipperd::{run_server, run_startup_checks, AppState, Config, JobRegistry, Supervisor};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// clipperd - clip extraction server around external fetch/transform tools
#[derive(Parser, Debug)]
#[command(name = "clipperd")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the configuration file (config.toml)
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    /// Skip startup checks (yt-dlp, ffmpeg). For testing only.
    #[arg(long, default_value = "false")]
    skip_checks: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let config = if args.config.exists() {
        match Config::load(&args.config) {
            Ok(config) => config,
            Err(e) => {
                error!(path = %args.config.display(), error = %e, "failed to load configuration");
                return ExitCode::FAILURE;
            }
        }
    } else {
        info!(path = %args.config.display(), "no config file, using defaults");
        let mut config = Config::default();
        config.apply_env_overrides();
        config
    };

    if args.skip_checks {
        warn!("skipping startup checks (--skip-checks enabled)");
    } else if let Err(e) = run_startup_checks() {
        error!(error = %e, "startup check failed");
        return ExitCode::FAILURE;
    }

    info!(
        strategy = ?config.pipeline.strategy,
        scratch_dir = %config.pipeline.scratch_dir,
        retention_secs = config.jobs.retention_secs,
        "clipperd starting"
    );

    let registry = Arc::new(JobRegistry::new());
    let supervisor = Arc::new(Supervisor::new(registry, config.clone()));
    let state = AppState::new(supervisor);

    if let Err(e) = run_server(state, &config.server.bind_addr).await {
        error!(error = %e, "server error");
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}
