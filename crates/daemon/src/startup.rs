//! Startup checks module for convertd
//!
//! Preflight checks before the daemon starts taking jobs:
//! - ffprobe must be runnable (every job begins with a probe)
//! - at least one configured backend executable must resolve; individual
//!   missing backends are only logged, since the fallback order tolerates
//!   them
//! - configured watch roots must exist

use crate::backends;
use crate::supervise::ProcessSupervisor;
use convertd_config::Config;
use std::process::Command;
use thiserror::Error;
use tracing::{info, warn};

/// Error types for startup checks
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("ffprobe not available: {0}")]
    FfprobeUnavailable(String),

    #[error("No configured backend executable found (checked: {0})")]
    NoBackendAvailable(String),

    #[error("Watch root does not exist: {0}")]
    WatchRootMissing(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Check that ffprobe runs and identifies itself.
pub fn check_ffprobe_available() -> Result<(), StartupError> {
    let output = Command::new("ffprobe")
        .arg("-version")
        .output()
        .map_err(|e| {
            StartupError::FfprobeUnavailable(format!(
                "ffprobe -version failed; is ffmpeg installed and in PATH? Error: {}",
                e
            ))
        })?;

    if !output.status.success() {
        return Err(StartupError::FfprobeUnavailable(
            "ffprobe -version exited with failure".to_string(),
        ));
    }

    Ok(())
}

/// Check which configured backends resolve to real executables.
///
/// Returns the names that resolved. Errors only when none of them do:
/// with no usable backend, every job would fail immediately.
pub fn check_backends_available(cfg: &Config) -> Result<Vec<String>, StartupError> {
    let mut available = Vec::new();

    for name in &cfg.conversion.backend_order {
        let Some(backend) = backends::by_name(name) else {
            warn!(backend = name.as_str(), "unknown backend in configured order");
            continue;
        };

        if ProcessSupervisor::resolve_executable(backend.executable()).is_some() {
            info!(backend = name.as_str(), executable = backend.executable(), "backend available");
            available.push(name.clone());
        } else {
            warn!(
                backend = name.as_str(),
                executable = backend.executable(),
                "backend executable not found, fallback will skip it"
            );
        }
    }

    if available.is_empty() {
        return Err(StartupError::NoBackendAvailable(
            cfg.conversion.backend_order.join(", "),
        ));
    }

    Ok(available)
}

/// Check that every configured watch root exists.
pub fn check_watch_roots(cfg: &Config) -> Result<(), StartupError> {
    for root in &cfg.paths.watch_roots {
        if !root.is_dir() {
            return Err(StartupError::WatchRootMissing(
                root.to_string_lossy().to_string(),
            ));
        }
    }
    Ok(())
}

/// Run all startup checks in order: ffprobe, backends, watch roots.
pub fn run_startup_checks(cfg: &Config) -> Result<(), StartupError> {
    check_ffprobe_available()?;
    check_backends_available(cfg)?;
    check_watch_roots(cfg)?;
    Ok(())
}
