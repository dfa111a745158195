//! CLI entry point for convertd
//!
//! Parses command line arguments and starts the daemon, or converts a
//! single file and exits.

use clap::Parser;
use convertd::{Config, ConversionService, JobOptions, JobRequest, JobState};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// convertd - fallback video conversion daemon wrapping external encoders
#[derive(Parser, Debug)]
#[command(name = "convertd")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the configuration file (config.toml)
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    /// Convert a single file and exit instead of running the daemon
    #[arg(long)]
    convert: Option<PathBuf>,

    /// Profile to use with --convert (defaults to the configured default)
    #[arg(long)]
    profile: Option<String>,

    /// Preferred audio language with --convert (ISO tag, e.g. "eng")
    #[arg(long)]
    language: Option<String>,

    /// Skip startup checks (ffprobe, backend executables). For testing only.
    #[arg(long, default_value = "false")]
    skip_checks: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let args = Args::parse();

    let config = match Config::load(&args.config) {
        Ok(config) => config,
        Err(e) => {
            error!(config = %args.config.display(), error = %e, "failed to load configuration");
            return ExitCode::FAILURE;
        }
    };

    let service = if args.skip_checks {
        ConversionService::new_without_checks(config)
    } else {
        match ConversionService::new(config) {
            Ok(service) => service,
            Err(e) => {
                error!(error = %e, "failed to initialize service");
                return ExitCode::FAILURE;
            }
        }
    };

    info!(
        max_concurrent_jobs = service.plan.max_concurrent_jobs,
        cores = service.plan.total_cores,
        "convertd initialized"
    );

    if let Some(source) = args.convert {
        let profile = args
            .profile
            .unwrap_or_else(|| service.config.conversion.default_profile.clone());
        if profile.is_empty() {
            error!("--convert needs --profile or a configured default_profile");
            return ExitCode::FAILURE;
        }

        let options = JobOptions {
            audio_language: args.language,
            ..JobOptions::default()
        };
        let job = JobRequest::new(source.clone(), profile).with_options(options);

        info!(source = %source.display(), "converting single file");
        return match service.convert_one(job).await {
            JobState::Completed => ExitCode::SUCCESS,
            state => {
                error!(state = state.as_str(), "conversion did not complete");
                ExitCode::FAILURE
            }
        };
    }

    info!("status endpoint on http://127.0.0.1:7879/status");
    if let Err(e) = service.run_with_server().await {
        error!(error = %e, "service error");
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}
