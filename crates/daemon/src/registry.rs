//! Job registry: the single concurrency-safe store shared across tasks.
//!
//! One reader/writer lock protects both internal maps, so a concurrent
//! lookup can never observe a half-inserted or half-removed job. The
//! registry stores locations and queue handles only; deleting the on-disk
//! artifact is the supervisor's decision.

use crate::progress::ProgressEvent;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, Mutex, RwLock};

/// Error type for registry operations
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    /// An entry already exists for this job id
    #[error("Job '{0}' is already registered")]
    DuplicateJob(String),
}

/// Consumer handle for a job's progress queue.
///
/// Cloning is cheap and lookups stay read-only; a subscriber takes the inner
/// lock for the duration of its drain, so one consumer at a time receives
/// events.
#[derive(Clone)]
pub struct ProgressQueue {
    receiver: Arc<Mutex<mpsc::Receiver<ProgressEvent>>>,
}

impl ProgressQueue {
    /// Create a bounded progress queue, returning the producer side and the
    /// registrable consumer handle. Capacity is at least one.
    pub fn bounded(capacity: usize) -> (mpsc::Sender<ProgressEvent>, Self) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (
            tx,
            Self {
                receiver: Arc::new(Mutex::new(rx)),
            },
        )
    }

    /// Receive the next event, or `None` once the queue is closed and drained.
    pub async fn recv(&self) -> Option<ProgressEvent> {
        self.receiver.lock().await.recv().await
    }
}

impl std::fmt::Debug for ProgressQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressQueue").finish_non_exhaustive()
    }
}

/// Internal state: both maps live under the one lock.
#[derive(Default)]
struct RegistryInner {
    artifacts: HashMap<String, PathBuf>,
    queues: HashMap<String, ProgressQueue>,
}

/// Concurrency-safe store mapping job ids to artifact locations and live
/// progress queues.
#[derive(Default)]
pub struct JobRegistry {
    inner: RwLock<RegistryInner>,
}

impl JobRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a job's artifact path. Called once per job at creation;
    /// refuses to overwrite an existing entry.
    pub async fn add(&self, job_id: &str, artifact_path: PathBuf) -> Result<(), RegistryError> {
        let mut inner = self.inner.write().await;
        if inner.artifacts.contains_key(job_id) {
            return Err(RegistryError::DuplicateJob(job_id.to_string()));
        }
        inner.artifacts.insert(job_id.to_string(), artifact_path);
        Ok(())
    }

    /// Register a job's progress queue. Called once per job at creation;
    /// refuses to overwrite an existing entry.
    pub async fn add_progress_queue(
        &self,
        job_id: &str,
        queue: ProgressQueue,
    ) -> Result<(), RegistryError> {
        let mut inner = self.inner.write().await;
        if inner.queues.contains_key(job_id) {
            return Err(RegistryError::DuplicateJob(job_id.to_string()));
        }
        inner.queues.insert(job_id.to_string(), queue);
        Ok(())
    }

    /// Look up a job's artifact path.
    pub async fn lookup(&self, job_id: &str) -> Option<PathBuf> {
        self.inner.read().await.artifacts.get(job_id).cloned()
    }

    /// Look up a job's progress queue handle.
    pub async fn lookup_progress_queue(&self, job_id: &str) -> Option<ProgressQueue> {
        self.inner.read().await.queues.get(job_id).cloned()
    }

    /// Remove a job's artifact-path entry and, if present, its progress
    /// queue. Idempotent: removing an unknown id is a no-op. Returns whether
    /// an artifact entry was actually removed.
    pub async fn remove(&self, job_id: &str) -> bool {
        let mut inner = self.inner.write().await;
        let removed = inner.artifacts.remove(job_id).is_some();
        inner.queues.remove(job_id);
        removed
    }

    /// Number of registered jobs (artifact entries).
    pub async fn len(&self) -> usize {
        self.inner.read().await.artifacts.len()
    }

    /// Whether no jobs are registered.
    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.artifacts.is_empty()
    }
}
