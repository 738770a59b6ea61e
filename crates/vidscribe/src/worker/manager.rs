//! Entry point for callers: submit jobs, watch them, cancel them.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::Semaphore;

use crate::backend::{ArtifactKind, ArtifactWriter};
use crate::broadcast::{JobCounts, JobProgressBroadcaster, JobStore, StreamEvent, Subscription};
use crate::config::Config;
use crate::error::{Result, StorageError, StoreError};
use crate::job::{Job, JobId, JobStatus, JobUpdate};
use crate::pipeline::{
    Backends, CancellationFlag, Pipeline, PipelineConfig, PipelineContext, PipelineError,
    StoreProgress,
};
use crate::sanitize;
use crate::storage::FileStorage;

/// Per-submission options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubmitOptions {
    /// Run the summary stage after transcription.
    pub extract: bool,
}

impl Default for SubmitOptions {
    fn default() -> Self {
        Self { extract: true }
    }
}

/// Service health, as reported by the health endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthReport {
    pub status: &'static str,
    pub version: &'static str,
    pub jobs: JobCounts,
    pub subscribers: usize,
    pub job_ttl_hours: u64,
}

type CancelRegistry = Arc<Mutex<HashMap<JobId, CancellationFlag>>>;

/// Runs one pipeline task per job on the tokio runtime, with at most
/// `max_concurrent_jobs` of them past the queue at a time.
pub struct JobManager {
    store: Arc<JobStore>,
    pipeline: Arc<Pipeline>,
    permits: Arc<Semaphore>,
    cancels: CancelRegistry,
    ttl_hours: u64,
}

impl JobManager {
    pub fn new(
        store: Arc<JobStore>,
        pipeline: Arc<Pipeline>,
        max_concurrent_jobs: usize,
        ttl_hours: u64,
    ) -> Self {
        Self {
            store,
            pipeline,
            permits: Arc::new(Semaphore::new(max_concurrent_jobs.max(1))),
            cancels: Arc::new(Mutex::new(HashMap::new())),
            ttl_hours,
        }
    }

    /// Builds the store, broadcaster and pipeline from `config`.
    ///
    /// When `backends.writer` is `None`, artifacts go to a [`FileStorage`]
    /// rooted at the configured output directory.
    pub fn from_config(config: &Config, backends: ManagerBackends) -> Self {
        let broadcaster = JobProgressBroadcaster::new(
            config.jobs.subscriber_queue_capacity,
            Duration::from_secs(config.jobs.keepalive_secs),
        );
        let store = Arc::new(JobStore::new(broadcaster));

        let writer = backends.writer.unwrap_or_else(|| {
            Arc::new(FileStorage::new(&config.output_directory)) as Arc<dyn ArtifactWriter>
        });
        let pipeline = Pipeline::new(
            Arc::new(PipelineConfig::from_config(config)),
            Backends {
                captions: backends.captions,
                fetcher: backends.fetcher,
                transcriber: backends.transcriber,
                extractor: backends.extractor,
                writer,
            },
        );

        Self::new(
            store,
            Arc::new(pipeline),
            config.jobs.max_concurrent_jobs,
            config.jobs.ttl_hours,
        )
    }

    pub fn store(&self) -> &Arc<JobStore> {
        &self.store
    }

    fn cancels(&self) -> MutexGuard<'_, HashMap<JobId, CancellationFlag>> {
        lock_registry(&self.cancels)
    }

    /// Creates a job for `url` and starts processing it in the background.
    ///
    /// Must be called from within a tokio runtime.
    pub fn submit(&self, url: &str, options: SubmitOptions) -> Result<JobId> {
        let url = url.trim();
        if url.is_empty() {
            return Err(PipelineError::InvalidInput("url must not be empty".to_string()).into());
        }

        let id = self.store.create(JobUpdate::default());
        let cancel = CancellationFlag::new();
        self.cancels().insert(id.clone(), cancel.clone());

        log::info!("Submitted job {} for {}", id, sanitize::redact_url(url));

        let ctx = PipelineContext::new(id.clone(), url)
            .with_extract(options.extract)
            .with_cancellation(cancel);
        let store = Arc::clone(&self.store);
        let pipeline = Arc::clone(&self.pipeline);
        let permits = Arc::clone(&self.permits);
        let cancels = Arc::clone(&self.cancels);

        tokio::spawn(async move {
            let job_id = ctx.job_id.clone();
            let _permit = match permits.acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => {
                    log::error!("Job queue closed, dropping job {}", job_id);
                    return;
                }
            };

            let progress = StoreProgress::new(store, job_id.clone());
            let (outcome, ctx) = pipeline.run(ctx, &progress).await;
            for warning in &ctx.warnings {
                log::debug!("Job {} finished with warning: {:?}", job_id, warning);
            }
            log::debug!("Job {} ended: {:?}", job_id, outcome);

            lock_registry(&cancels).remove(&job_id);
        });

        Ok(id)
    }

    pub fn get_status(&self, id: &JobId) -> std::result::Result<Job, StoreError> {
        self.store.get(id)
    }

    /// Live snapshots of a job, starting with its current state.
    pub fn stream(&self, id: &JobId) -> std::result::Result<Subscription, StoreError> {
        self.store.subscribe(id)
    }

    /// Requests cancellation. A queued job is cancelled immediately; a running
    /// one stops before its next backend call.
    pub fn cancel(&self, id: &JobId) -> std::result::Result<(), StoreError> {
        let job = self.store.get(id)?;
        if job.is_finished() {
            return Err(StoreError::Terminal(id.clone()));
        }

        if let Some(flag) = self.cancels().get(id) {
            flag.cancel();
        }

        if job.status == JobStatus::Pending {
            match self.store.update(id, JobUpdate::cancelled()) {
                Ok(_) | Err(StoreError::Terminal(_)) => {}
                Err(e) => return Err(e),
            }
        }

        log::info!("Cancellation requested for job {}", id);
        Ok(())
    }

    /// Reads the stored transcript or summary of a job.
    pub async fn artifact(&self, id: &JobId, kind: ArtifactKind) -> Result<String> {
        let job = self.store.get(id)?;
        let reference = match kind {
            ArtifactKind::Transcript => job.result_refs.transcript,
            ArtifactKind::Summary => job.result_refs.summary,
        };
        let reference = reference.ok_or_else(|| StorageError::MissingArtifact {
            job_id: id.clone(),
            kind,
        })?;

        Ok(self.pipeline.backends().writer.read(&reference).await?)
    }

    /// Waits until the job reaches a terminal state and returns it.
    pub async fn wait_for(&self, id: &JobId) -> std::result::Result<Job, StoreError> {
        loop {
            let mut subscription = self.stream(id)?;
            while let Some(event) = subscription.next().await {
                if let StreamEvent::Snapshot(job) = event {
                    if job.is_finished() {
                        return Ok(job);
                    }
                }
            }
            // Disconnected before the end (queue overflow): attach again.
            log::debug!("Stream for job {} ended early, resubscribing", id);
        }
    }

    /// Submits a job and waits for it to finish. Used for one-shot runs.
    pub async fn run_to_completion(&self, url: &str, options: SubmitOptions) -> Result<Job> {
        let id = self.submit(url, options)?;
        Ok(self.wait_for(&id).await?)
    }

    pub fn health(&self) -> HealthReport {
        HealthReport {
            status: "healthy",
            version: env!("CARGO_PKG_VERSION"),
            jobs: self.store.counts(),
            subscribers: self.store.broadcaster().total_subscribers(),
            job_ttl_hours: self.ttl_hours,
        }
    }
}

/// Backends handed to [`JobManager::from_config`].
pub struct ManagerBackends {
    pub captions: Option<Arc<dyn crate::backend::CaptionSource>>,
    pub fetcher: Arc<dyn crate::backend::MediaFetcher>,
    pub transcriber: Arc<dyn crate::backend::Transcriber>,
    pub extractor: Option<Arc<dyn crate::backend::Extractor>>,
    /// Defaults to [`FileStorage`] under the configured output directory.
    pub writer: Option<Arc<dyn ArtifactWriter>>,
}

fn lock_registry(
    registry: &Mutex<HashMap<JobId, CancellationFlag>>,
) -> MutexGuard<'_, HashMap<JobId, CancellationFlag>> {
    match registry.lock() {
        Ok(guard) => guard,
        Err(poisoned) => {
            log::warn!("Cancellation registry lock was poisoned, recovering");
            poisoned.into_inner()
        }
    }
}
