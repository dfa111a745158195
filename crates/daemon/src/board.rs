//! Status board module for convertd
//!
//! Aggregates every job's shared status record plus system metrics into one
//! snapshot for pollers (HTTP endpoint, dashboard). The board also resolves
//! cancel requests by job id, flipping the job's write-once cancel flag.

use crate::job::JobRequest;
use crate::status::SharedJobStatus;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Lifecycle state of a job as shown to pollers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Queued,
    Converting,
    Completed,
    Failed,
    Cancelled,
}

impl JobState {
    pub fn as_str(&self) -> &str {
        match self {
            JobState::Queued => "queued",
            JobState::Converting => "converting",
            JobState::Completed => "completed",
            JobState::Failed => "failed",
            JobState::Cancelled => "cancelled",
        }
    }
}

/// Public per-job view served to pollers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JobView {
    pub id: String,
    pub source: String,
    pub profile: String,
    pub state: JobState,
    pub percentage_complete: f32,
    pub eta: String,
    pub current_action: String,
    pub error_msg: String,
    pub cancelled: bool,
}

/// System-level metrics for resource monitoring
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct SystemMetrics {
    pub cpu_usage_percent: f32,
    pub mem_usage_percent: f32,
    pub load_avg_1: f32,
    pub load_avg_5: f32,
    pub load_avg_15: f32,
}

/// Complete board snapshot.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct StatusSnapshot {
    pub timestamp_unix_ms: i64,
    pub jobs: Vec<JobView>,
    pub system: SystemMetrics,
    pub queue_len: usize,
    pub running_jobs: usize,
    pub completed_jobs: u64,
    pub failed_jobs: u64,
    pub cancelled_jobs: u64,
}

struct JobEntry {
    id: String,
    source: String,
    profile: String,
    state: JobState,
    status: SharedJobStatus,
}

#[derive(Default)]
struct BoardInner {
    jobs: Vec<JobEntry>,
    system: SystemMetrics,
    completed_jobs: u64,
    failed_jobs: u64,
    cancelled_jobs: u64,
}

/// Shared status board handle.
pub type SharedBoard = Arc<StatusBoard>;

/// Creates a new empty shared board.
pub fn new_shared_board() -> SharedBoard {
    Arc::new(StatusBoard {
        inner: RwLock::new(BoardInner::default()),
    })
}

/// Concurrent job status registry.
pub struct StatusBoard {
    inner: RwLock<BoardInner>,
}

impl StatusBoard {
    /// Registers a job with its live status record.
    pub async fn register(&self, job: &JobRequest, status: SharedJobStatus) {
        let mut inner = self.inner.write().await;
        inner.jobs.push(JobEntry {
            id: job.id.clone(),
            source: job.source.to_string_lossy().to_string(),
            profile: job.profile.clone(),
            state: JobState::Queued,
            status,
        });
    }

    /// Moves a job into a new lifecycle state, bumping terminal counters.
    pub async fn set_state(&self, job_id: &str, state: JobState) {
        let mut inner = self.inner.write().await;
        match state {
            JobState::Completed => inner.completed_jobs += 1,
            JobState::Failed => inner.failed_jobs += 1,
            JobState::Cancelled => inner.cancelled_jobs += 1,
            _ => {}
        }
        if let Some(entry) = inner.jobs.iter_mut().find(|j| j.id == job_id) {
            entry.state = state;
        }
    }

    /// Requests cancellation of a job by id. Returns false for unknown ids.
    pub async fn cancel(&self, job_id: &str) -> bool {
        let inner = self.inner.read().await;
        match inner.jobs.iter().find(|j| j.id == job_id) {
            Some(entry) => {
                entry.status.cancel();
                true
            }
            None => false,
        }
    }

    /// Replaces the system metrics section.
    pub async fn update_system(&self, system: SystemMetrics) {
        self.inner.write().await.system = system;
    }

    /// Builds a consistent snapshot of every job plus aggregates.
    pub async fn snapshot(&self) -> StatusSnapshot {
        let inner = self.inner.read().await;

        let jobs: Vec<JobView> = inner
            .jobs
            .iter()
            .map(|entry| {
                let view = entry.status.snapshot();
                JobView {
                    id: entry.id.clone(),
                    source: entry.source.clone(),
                    profile: entry.profile.clone(),
                    state: entry.state,
                    percentage_complete: view.percentage_complete,
                    eta: view.eta,
                    current_action: view.current_action,
                    error_msg: view.error_msg,
                    cancelled: view.cancelled,
                }
            })
            .collect();

        let queue_len = jobs.iter().filter(|j| j.state == JobState::Queued).count();
        let running_jobs = jobs
            .iter()
            .filter(|j| j.state == JobState::Converting)
            .count();

        StatusSnapshot {
            timestamp_unix_ms: unix_timestamp_ms(),
            jobs,
            system: inner.system.clone(),
            queue_len,
            running_jobs,
            completed_jobs: inner.completed_jobs,
            failed_jobs: inner.failed_jobs,
            cancelled_jobs: inner.cancelled_jobs,
        }
    }
}

/// Collects current system metrics using sysinfo.
pub fn collect_system_metrics() -> SystemMetrics {
    use sysinfo::System;

    let mut sys = System::new();
    sys.refresh_cpu_usage();
    sys.refresh_memory();

    let total_memory = sys.total_memory();
    let used_memory = sys.used_memory();
    let mem_usage = if total_memory > 0 {
        (used_memory as f64 / total_memory as f64 * 100.0) as f32
    } else {
        0.0
    };

    let load_avg = System::load_average();

    SystemMetrics {
        cpu_usage_percent: sys.global_cpu_usage(),
        mem_usage_percent: mem_usage,
        load_avg_1: load_avg.one as f32,
        load_avg_5: load_avg.five as f32,
        load_avg_15: load_avg.fifteen as f32,
    }
}

/// Current timestamp in milliseconds.
pub fn unix_timestamp_ms() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
