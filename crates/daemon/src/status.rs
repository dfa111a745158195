//! Job status module for convertd
//!
//! Shared progress/status record for one conversion job. The record lives for
//! the whole job, across every backend attempt, so cumulative progress and
//! errors stay visible to pollers. Only the active process supervisor writes
//! progress fields; the cancel flag is set once from outside and never
//! cleared.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

/// Snapshot of a job's status fields, as served to pollers
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct StatusView {
    pub percentage_complete: f32,
    pub eta: String,
    pub current_action: String,
    pub error_msg: String,
    pub cancelled: bool,
}

/// Mutable status record shared between the supervisor and pollers
#[derive(Debug, Default)]
pub struct JobStatus {
    fields: Mutex<StatusFields>,
    cancelled: AtomicBool,
}

#[derive(Debug, Default)]
struct StatusFields {
    percentage_complete: f32,
    eta: String,
    current_action: String,
    error_msg: String,
}

/// Shared job status handle
pub type SharedJobStatus = Arc<JobStatus>;

/// Creates a new shared job status with default values
pub fn new_shared_status() -> SharedJobStatus {
    Arc::new(JobStatus::default())
}

impl JobStatus {
    /// Set completion percentage, clamped to [0, 100]
    pub fn set_percentage(&self, percent: f32) {
        let mut fields = self.fields.lock().expect("status lock poisoned");
        fields.percentage_complete = percent.clamp(0.0, 100.0);
    }

    /// Current completion percentage
    pub fn percentage(&self) -> f32 {
        self.fields
            .lock()
            .expect("status lock poisoned")
            .percentage_complete
    }

    /// Set the estimated-time-remaining string
    pub fn set_eta(&self, eta: impl Into<String>) {
        let mut fields = self.fields.lock().expect("status lock poisoned");
        fields.eta = eta.into();
    }

    /// Set the human-readable label for what the job is doing now
    pub fn set_action(&self, action: impl Into<String>) {
        let mut fields = self.fields.lock().expect("status lock poisoned");
        fields.current_action = action.into();
    }

    /// Record an error message
    pub fn set_error(&self, msg: impl Into<String>) {
        let mut fields = self.fields.lock().expect("status lock poisoned");
        fields.error_msg = msg.into();
    }

    /// Clear the error message before retrying with another backend
    pub fn clear_error(&self) {
        let mut fields = self.fields.lock().expect("status lock poisoned");
        fields.error_msg.clear();
    }

    /// Request cancellation of the whole job. One-way: never cleared.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation has been requested
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Consistent copy of all fields for pollers
    pub fn snapshot(&self) -> StatusView {
        let fields = self.fields.lock().expect("status lock poisoned");
        StatusView {
            percentage_complete: fields.percentage_complete,
            eta: fields.eta.clone(),
            current_action: fields.current_action.clone(),
            error_msg: fields.error_msg.clone(),
            cancelled: self.cancelled.load(Ordering::SeqCst),
        }
    }
}
