//! Conversion service for convertd
//!
//! Ties the pieces together: a job queue, a semaphore bounding concurrent
//! conversions to the derived plan, the status board and its HTTP endpoint,
//! the watch-folder scanner, and the per-job pipeline run through the
//! fallback orchestrator.

use crate::backends;
use crate::board::{collect_system_metrics, new_shared_board, JobState, SharedBoard};
use crate::job::JobRequest;
use crate::marker::{write_converted_marker, write_why_sidecar};
use crate::media::{self, VideoStreamInfo};
use crate::orchestrate::FallbackOrchestrator;
use crate::pipeline::ConvertError;
use crate::plan::{derive_plan, ConcurrencyPlan};
use crate::scan::scan_watch_roots;
use crate::sched::{SchedulingControl, SharedScheduling};
use crate::server::run_status_server;
use crate::stability::{check_stability, StabilityResult};
use crate::startup::{run_startup_checks, StartupError};
use crate::status::{new_shared_status, SharedJobStatus};
use convertd_config::Config;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, RwLock, Semaphore};
use tracing::{error, info, warn};

/// How often the watch roots are rescanned.
const SCAN_INTERVAL: Duration = Duration::from_secs(60);

/// How often system metrics are refreshed on the board.
const METRICS_INTERVAL: Duration = Duration::from_millis(500);

/// Error type for service operations
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Startup check failed
    #[error("Startup check failed: {0}")]
    Startup(#[from] StartupError),

    /// Job submission failed
    #[error("Failed to submit job: {0}")]
    Submit(String),
}

/// Daemon runtime: queue, executor, board, scheduling control.
pub struct ConversionService {
    /// Loaded configuration
    pub config: Config,
    /// Derived concurrency plan
    pub plan: ConcurrencyPlan,
    board: SharedBoard,
    control: SharedScheduling,
    semaphore: Arc<Semaphore>,
    job_tx: mpsc::Sender<(JobRequest, SharedJobStatus)>,
    job_rx: Arc<RwLock<mpsc::Receiver<(JobRequest, SharedJobStatus)>>>,
}

impl ConversionService {
    /// Initialize the service, running startup checks first.
    pub fn new(config: Config) -> Result<Self, ServiceError> {
        run_startup_checks(&config)?;
        Ok(Self::new_without_checks(config))
    }

    /// Initialize without startup checks. For testing, or callers that
    /// already verified the environment.
    pub fn new_without_checks(config: Config) -> Self {
        let plan = derive_plan(&config);
        let control = SchedulingControl::new(config.scheduling.clone());
        let board = new_shared_board();
        let semaphore = Arc::new(Semaphore::new(plan.max_concurrent_jobs as usize));
        let (job_tx, job_rx) = mpsc::channel(100);

        Self {
            config,
            plan,
            board,
            control,
            semaphore,
            job_tx,
            job_rx: Arc::new(RwLock::new(job_rx)),
        }
    }

    /// Shared status board handle.
    pub fn board(&self) -> SharedBoard {
        self.board.clone()
    }

    /// Shared scheduling control handle (suspend/priority).
    pub fn scheduling(&self) -> SharedScheduling {
        self.control.clone()
    }

    /// Number of currently free conversion slots.
    pub fn available_slots(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Submits a job and returns its live status handle.
    pub async fn submit_job(&self, job: JobRequest) -> Result<SharedJobStatus, ServiceError> {
        let status = new_shared_status();
        self.board.register(&job, status.clone()).await;
        self.job_tx
            .send((job, status.clone()))
            .await
            .map_err(|e| ServiceError::Submit(e.to_string()))?;
        Ok(status)
    }

    /// Starts the status HTTP server as a background task.
    pub fn start_status_server(&self) -> tokio::task::JoinHandle<()> {
        let board = self.board.clone();
        tokio::spawn(async move {
            if let Err(e) = run_status_server(board).await {
                error!(error = %e, "status server failed");
            }
        })
    }

    /// Starts the periodic system metrics refresh.
    pub fn start_metrics_updater(&self) -> tokio::task::JoinHandle<()> {
        let board = self.board.clone();
        tokio::spawn(async move {
            loop {
                let metrics = tokio::task::spawn_blocking(collect_system_metrics)
                    .await
                    .unwrap_or_default();
                board.update_system(metrics).await;
                tokio::time::sleep(METRICS_INTERVAL).await;
            }
        })
    }

    /// Starts the watch-folder scanner.
    ///
    /// Stable new recordings are submitted against the configured default
    /// profile. Sources already submitted this session are remembered so a
    /// running conversion is not queued twice.
    pub fn start_scanner(&self) -> tokio::task::JoinHandle<()> {
        let roots = self.config.paths.watch_roots.clone();
        let profile = self.config.conversion.default_profile.clone();
        let stability_wait = self.config.conversion.stability_wait_secs;
        let job_tx = self.job_tx.clone();
        let board = self.board.clone();

        tokio::spawn(async move {
            if roots.is_empty() || profile.is_empty() {
                info!("watch-folder scanning disabled (no roots or no default profile)");
                return;
            }

            let mut submitted: HashSet<PathBuf> = HashSet::new();
            loop {
                let candidates = {
                    let roots = roots.clone();
                    tokio::task::spawn_blocking(move || scan_watch_roots(&roots))
                        .await
                        .unwrap_or_default()
                };

                for candidate in candidates {
                    if submitted.contains(&candidate.path) {
                        continue;
                    }

                    match check_stability(&candidate.path, candidate.size_bytes, stability_wait)
                        .await
                    {
                        Ok(StabilityResult::Stable) => {}
                        Ok(StabilityResult::Growing { .. }) => {
                            info!(path = %candidate.path.display(), "still growing, will retry");
                            continue;
                        }
                        Err(e) => {
                            warn!(path = %candidate.path.display(), error = %e, "stability check failed");
                            continue;
                        }
                    }

                    let job = JobRequest::new(candidate.path.clone(), profile.clone());
                    let status = new_shared_status();
                    board.register(&job, status.clone()).await;
                    if job_tx.send((job, status)).await.is_err() {
                        return;
                    }
                    submitted.insert(candidate.path);
                }

                tokio::time::sleep(SCAN_INTERVAL).await;
            }
        })
    }

    /// Runs the main processing loop: pull jobs off the queue and convert
    /// them, bounded by the concurrency plan.
    pub async fn run(&self) -> Result<(), ServiceError> {
        loop {
            let next = {
                let mut rx = self.job_rx.write().await;
                rx.recv().await
            };

            let Some((job, status)) = next else {
                break;
            };

            let permit = self
                .semaphore
                .clone()
                .acquire_owned()
                .await
                .expect("semaphore closed");

            let config = self.config.clone();
            let board = self.board.clone();
            let control = self.control.clone();

            tokio::spawn(async move {
                let _permit = permit;
                execute_job(job, status, config, board, control).await;
            });
        }

        Ok(())
    }

    /// Runs the service with every background task attached.
    pub async fn run_with_server(&self) -> Result<(), ServiceError> {
        let _server = self.start_status_server();
        let _metrics = self.start_metrics_updater();
        let _scanner = self.start_scanner();
        self.run().await
    }

    /// Converts a single job inline and returns its final state. One-shot
    /// mode for the CLI; the queue and background tasks are not involved.
    pub async fn convert_one(&self, job: JobRequest) -> JobState {
        let status = new_shared_status();
        self.board.register(&job, status.clone()).await;
        let job_id = job.id.clone();

        execute_job(
            job,
            status,
            self.config.clone(),
            self.board.clone(),
            self.control.clone(),
        )
        .await;

        self.board
            .snapshot()
            .await
            .jobs
            .iter()
            .find(|j| j.id == job_id)
            .map(|j| j.state)
            .unwrap_or(JobState::Failed)
    }
}

/// Converts one job end to end: probe, fallback over backends, markers.
async fn execute_job(
    job: JobRequest,
    status: SharedJobStatus,
    config: Config,
    board: SharedBoard,
    control: SharedScheduling,
) {
    board.set_state(&job.id, JobState::Converting).await;
    status.set_action("Probing source");

    let info = {
        let source = job.source.clone();
        tokio::task::spawn_blocking(move || media::probe_file(&source)).await
    };

    let info: VideoStreamInfo = match info {
        Ok(Ok(info)) => info,
        Ok(Err(e)) => {
            let message = format!("probe failed: {}", e);
            status.set_error(&message);
            board.set_state(&job.id, JobState::Failed).await;
            let _ = write_why_sidecar(
                &job.source,
                &message,
                config.conversion.write_why_sidecars,
            );
            return;
        }
        Err(join_err) => {
            status.set_error(format!("probe task panicked: {}", join_err));
            board.set_state(&job.id, JobState::Failed).await;
            return;
        }
    };

    let Some(profile) = config.profile(&job.profile) else {
        status.set_error(format!("unknown profile: {}", job.profile));
        board.set_state(&job.id, JobState::Failed).await;
        return;
    };

    let order = profile
        .backend_order
        .as_ref()
        .unwrap_or(&config.conversion.backend_order);
    let backend_list = backends::resolve_order(order);

    let orchestrator = FallbackOrchestrator {
        profile,
        conversion: &config.conversion,
        output_dir: &config.paths.output_dir,
        temp_dir: &config.paths.temp_dir,
        status: status.clone(),
        control,
    };

    match orchestrator.run(&job, &info, &backend_list).await {
        Ok(output) => {
            status.set_percentage(100.0);
            status.set_action(format!("Completed: {}", output.display()));
            if let Err(e) = write_converted_marker(&job.source) {
                warn!(source = %job.source.display(), error = %e, "failed to write converted marker");
            }
            board.set_state(&job.id, JobState::Completed).await;
        }
        Err(ConvertError::ProcessCancelled) => {
            board.set_state(&job.id, JobState::Cancelled).await;
        }
        Err(e) => {
            warn!(job = %job.id, error = %e, "all backends failed");
            let _ = write_why_sidecar(
                &job.source,
                &e.to_string(),
                config.conversion.write_why_sidecars,
            );
            board.set_state(&job.id, JobState::Failed).await;
        }
    }
}
