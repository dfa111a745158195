//! Job request types for convertd
//!
//! A job names a source file, a conversion profile, and the per-job options
//! collected from the caller: trim window, audio selection, volume, and the
//! commercial-scan result consumed as a cut list.

use std::path::PathBuf;
use uuid::Uuid;

/// Per-job conversion options.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JobOptions {
    /// Seconds to skip from the start of the source.
    pub trim_start_secs: Option<f64>,
    /// Seconds of material to keep after the start point.
    pub trim_duration_secs: Option<f64>,
    /// Preferred audio language (ISO tag); wins over channel count.
    pub audio_language: Option<String>,
    /// Pick the best audio track when several exist.
    pub select_best_audio: bool,
    /// Volume adjustment in dB (0 = untouched).
    pub volume_db: f64,
    /// Force stereo output.
    pub stereo: bool,
    /// Output frame rate override (e.g. "25", "30000/1001").
    pub frame_rate: Option<String>,
    /// Whether the commercial scan found anything.
    pub commercials_found: bool,
    /// Cut list produced by the commercial scan.
    pub edl_path: Option<PathBuf>,
}

/// One conversion job.
#[derive(Debug, Clone, PartialEq)]
pub struct JobRequest {
    /// Unique job identifier.
    pub id: String,
    /// Path to the source file.
    pub source: PathBuf,
    /// Name of the conversion profile to apply.
    pub profile: String,
    /// Per-job options.
    pub options: JobOptions,
}

impl JobRequest {
    pub fn new(source: PathBuf, profile: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            source,
            profile: profile.into(),
            options: JobOptions::default(),
        }
    }

    pub fn with_options(mut self, options: JobOptions) -> Self {
        self.options = options;
        self
    }
}
