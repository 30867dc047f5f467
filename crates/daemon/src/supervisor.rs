//! Job supervisor: owns the lifetime of one clip job.
//!
//! Submission validates the request, launches the pipeline, registers the
//! job, and returns immediately. A supervising task then watches the
//! transform process, pushes the single terminal event, closes the progress
//! queue exactly once, and handles cleanup for both outcomes.

use crate::duration::{clip_duration_us, DurationError};
use crate::monitor::run_monitor;
use crate::pipeline::{build_pipeline, PipelineError, PipelineHandle};
use crate::progress::{generate_job_id, ClipRequest, ProgressEvent};
use crate::registry::{JobRegistry, ProgressQueue, RegistryError};
use clipperd_config::Config;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Error type for job submission.
///
/// Everything here happens before a job id is issued; once a job exists,
/// failures are reported through the terminal `error` progress event instead.
#[derive(Debug, Error)]
pub enum SubmitError {
    /// The clip bounds are malformed or inverted
    #[error("Invalid clip request: {0}")]
    InvalidRequest(#[from] DurationError),

    /// Pipeline construction or launch failed
    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    /// The job could not be registered
    #[error(transparent)]
    Registry(#[from] RegistryError),
}

/// Supervises clip jobs: launches pipelines, tracks them in the registry,
/// and guarantees terminal events and cleanup.
pub struct Supervisor {
    registry: Arc<JobRegistry>,
    config: Config,
}

impl Supervisor {
    /// Create a supervisor over the given registry.
    pub fn new(registry: Arc<JobRegistry>, config: Config) -> Self {
        Self { registry, config }
    }

    /// The registry this supervisor updates.
    pub fn registry(&self) -> &Arc<JobRegistry> {
        &self.registry
    }

    /// Submit a clip request.
    ///
    /// Validates the clip bounds before anything is spawned, launches the
    /// pipeline, registers the job, and hands ownership to a supervising
    /// task. Returns the new job id as soon as the pipeline is running.
    pub async fn submit(&self, request: ClipRequest) -> Result<String, SubmitError> {
        // Must fail before any process is spawned
        let total_duration_us = clip_duration_us(&request.clip_start, &request.clip_end)?;

        let handle = build_pipeline(&request, total_duration_us, &self.config.pipeline).await?;

        let job_id = generate_job_id();
        let (events, queue) =
            ProgressQueue::bounded(self.config.jobs.progress_queue_capacity);

        if let Err(e) = self.register(&job_id, &handle, queue).await {
            kill_pipeline(handle).await;
            return Err(e.into());
        }

        info!(%job_id, file = %handle.file_name, source = %request.video_url, "job started");

        tokio::spawn(run_job(
            self.registry.clone(),
            job_id.clone(),
            handle,
            events,
            total_duration_us,
            Duration::from_secs(self.config.jobs.retention_secs),
            Duration::from_millis(self.config.jobs.progress_send_grace_ms),
        ));

        Ok(job_id)
    }

    /// Register both entries for a new job; unwinds the artifact entry if the
    /// queue registration fails so no half-registered job survives.
    async fn register(
        &self,
        job_id: &str,
        handle: &PipelineHandle,
        queue: ProgressQueue,
    ) -> Result<(), RegistryError> {
        self.registry
            .add(job_id, handle.artifact_path.clone())
            .await?;
        if let Err(e) = self.registry.add_progress_queue(job_id, queue).await {
            self.registry.remove(job_id).await;
            return Err(e);
        }
        Ok(())
    }
}

/// Kill every process of a pipeline that never became a job.
async fn kill_pipeline(mut handle: PipelineHandle) {
    let _ = handle.transform.kill().await;
    if let Some(mut fetch) = handle.fetch.take() {
        let _ = fetch.kill().await;
    }
}

/// Supervise one running job to its terminal state.
///
/// The progress queue is closed exactly once, on every path, by dropping the
/// final sender after the terminal event.
async fn run_job(
    registry: Arc<JobRegistry>,
    job_id: String,
    handle: PipelineHandle,
    events: mpsc::Sender<ProgressEvent>,
    total_duration_us: i64,
    retention: Duration,
    grace: Duration,
) {
    let PipelineHandle {
        mut transform,
        fetch,
        progress,
        artifact_path,
        ..
    } = handle;

    // Reap the fetch producer in the background. Its exit status is advisory
    // only: a broken-pipe exit after the transform finishes first is normal.
    if let Some(mut fetch) = fetch {
        tokio::spawn(async move {
            match fetch.wait().await {
                Ok(status) => debug!(%status, "fetch process finished"),
                Err(e) => debug!(error = %e, "failed to reap fetch process"),
            }
        });
    }

    // The monitor's sender clone drops when it reaches end-of-input, so the
    // queue stays open until the terminal event below.
    let monitor = tokio::spawn(run_monitor(
        progress,
        events.clone(),
        total_duration_us,
        grace,
    ));

    let status = transform.wait().await;
    let _ = monitor.await;

    match status {
        Ok(status) if status.success() => {
            info!(%job_id, "transform finished successfully");

            let terminal = ProgressEvent::finished(format!("/download/{}", job_id));
            if events.send_timeout(terminal, grace).await.is_err() {
                debug!(%job_id, "no subscriber accepted the terminal event");
            }
            drop(events);

            schedule_expiry(registry, job_id, artifact_path, retention);
        }
        outcome => {
            match outcome {
                Ok(status) => error!(%job_id, %status, "transform process failed"),
                Err(e) => error!(%job_id, error = %e, "failed to wait on transform process"),
            }

            if events.send_timeout(ProgressEvent::error(), grace).await.is_err() {
                debug!(%job_id, "no subscriber accepted the terminal event");
            }
            drop(events);

            // A failed artifact must never be downloadable, so the registry
            // entry and any partial file go immediately.
            registry.remove(&job_id).await;
            remove_artifact(&artifact_path).await;
        }
    }
}

/// Schedule registry and artifact cleanup after the retention window.
fn schedule_expiry(
    registry: Arc<JobRegistry>,
    job_id: String,
    artifact_path: PathBuf,
    retention: Duration,
) {
    tokio::spawn(async move {
        tokio::time::sleep(retention).await;
        expire_job(&registry, &job_id, &artifact_path).await;
    });
}

/// Expire a completed job: drop the registry entry and delete the artifact.
/// Safe under repeated or concurrent invocation.
async fn expire_job(registry: &JobRegistry, job_id: &str, artifact_path: &Path) {
    if registry.remove(job_id).await {
        info!(%job_id, path = %artifact_path.display(), "retention elapsed, cleaning up");
    }
    remove_artifact(artifact_path).await;
}

/// Delete an artifact file, tolerating it being gone already.
async fn remove_artifact(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => {}
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => warn!(path = %path.display(), error = %e, "failed to delete artifact"),
    }
}
