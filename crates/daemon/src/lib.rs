//! clipperd
//!
//! Clip-extraction service: supervises a fetch/transform process pipeline per
//! job, streams parsed progress to subscribers, and serves the resulting
//! artifacts for download.

pub mod duration;
pub mod monitor;
pub mod pipeline;
pub mod progress;
pub mod registry;
pub mod sanitize;
pub mod server;
pub mod startup;
pub mod supervisor;

pub use clipperd_config as config;
pub use clipperd_config::{Config, PipelineStrategy};
pub use duration::{clip_duration_us, format_clip_duration, parse_time_of_day, DurationError};
pub use monitor::run_monitor;
pub use pipeline::{build_pipeline, PipelineError, PipelineHandle};
pub use progress::{
    generate_job_id, ClipRequest, ProgressEvent, ProgressStatus, SubmitResponse,
};
pub use registry::{JobRegistry, ProgressQueue, RegistryError};
pub use sanitize::sanitize_file_name;
pub use server::{create_router, run_server, AppState, ServerError};
pub use startup::{
    check_ffmpeg_available, check_ytdlp_available, run_startup_checks, StartupError,
};
pub use supervisor::{SubmitError, Supervisor};
