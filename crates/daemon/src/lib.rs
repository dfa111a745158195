//! convertd
//!
//! Daemon core that converts recorded video through a chain of external
//! command-line encoders, supervising each process and falling back to the
//! next configured backend on failure.

pub mod backends;
pub mod board;
pub mod classify;
pub mod job;
pub mod marker;
pub mod media;
pub mod orchestrate;
pub mod params;
pub mod pipeline;
pub mod plan;
pub mod postproc;
pub mod scan;
pub mod sched;
pub mod server;
pub mod service;
pub mod stability;
pub mod startup;
pub mod status;
pub mod supervise;

pub use convertd_config as config;
pub use convertd_config::Config;

pub use board::{
    collect_system_metrics, new_shared_board, JobState, JobView, SharedBoard, StatusBoard,
    StatusSnapshot, SystemMetrics,
};
pub use classify::{
    CopyClassifier, EtaTracker, FfmpegClassifier, HandbrakeClassifier, MencoderClassifier,
    OutputClassifier,
};
pub use job::{JobOptions, JobRequest};
pub use media::{probe_file, AudioTrack, CropRect, ProbeError, ScanType, VideoStreamInfo};
pub use orchestrate::{format_combinations, is_format_supported, FallbackOrchestrator};
pub use params::{
    classify_filter, must_precede, FilterChainSpec, FilterClass, ParameterModel, FILTER_ORDERING,
};
pub use pipeline::{BackendHooks, ConversionPipeline, ConvertError, DrcPlacement, PassSpec};
pub use plan::{derive_plan, ConcurrencyPlan};
pub use sched::{SchedulingControl, SharedScheduling};
pub use server::{create_status_router, run_status_server, ServerError};
pub use service::{ConversionService, ServiceError};
pub use startup::{run_startup_checks, StartupError};
pub use status::{new_shared_status, JobStatus, SharedJobStatus, StatusView};
pub use supervise::{ProcessState, ProcessSupervisor, RunOutcome, SupervisorError};
