//! In-memory job store with per-entry locking.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::broadcast::job_progress::{JobProgressBroadcaster, Subscription};
use crate::error::StoreError;
use crate::job::{Job, JobId, JobStatus, JobUpdate};

type Entry = Arc<Mutex<Job>>;

/// Number of jobs per status group.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobCounts {
    pub total: usize,
    /// Pending or running.
    pub active: usize,
    pub completed: usize,
    pub errored: usize,
    pub cancelled: usize,
}

/// Job state shared between the pipeline, the reaper and stream clients.
///
/// The map lock is held only to look up or insert an entry; each job has its
/// own mutex, so updates to different jobs never wait on each other. Every
/// successful update is published to the broadcaster while the entry lock is
/// still held, which keeps snapshots in the same order as the updates.
pub struct JobStore {
    jobs: RwLock<HashMap<JobId, Entry>>,
    broadcaster: JobProgressBroadcaster,
}

impl JobStore {
    pub fn new(broadcaster: JobProgressBroadcaster) -> Self {
        Self {
            jobs: RwLock::new(HashMap::new()),
            broadcaster,
        }
    }

    pub fn broadcaster(&self) -> &JobProgressBroadcaster {
        &self.broadcaster
    }

    fn read_jobs(&self) -> RwLockReadGuard<'_, HashMap<JobId, Entry>> {
        match self.jobs.read() {
            Ok(guard) => guard,
            Err(poisoned) => {
                log::warn!("Job store map lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    fn write_jobs(&self) -> RwLockWriteGuard<'_, HashMap<JobId, Entry>> {
        match self.jobs.write() {
            Ok(guard) => guard,
            Err(poisoned) => {
                log::warn!("Job store map lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    fn lock_entry(entry: &Entry) -> MutexGuard<'_, Job> {
        match entry.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                log::warn!("Job entry lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    fn entry(&self, id: &JobId) -> Result<Entry, StoreError> {
        self.read_jobs()
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(id.clone()))
    }

    /// Creates a pending job with `initial` merged in and returns its id.
    pub fn create(&self, initial: JobUpdate) -> JobId {
        let mut jobs = self.write_jobs();
        let mut id = JobId::generate();
        while jobs.contains_key(&id) {
            id = JobId::generate();
        }

        let mut job = Job::new(id.clone());
        job.merge(initial);
        jobs.insert(id.clone(), Arc::new(Mutex::new(job)));

        log::debug!("Created job {}", id);
        id
    }

    /// Returns a snapshot of the job.
    pub fn get(&self, id: &JobId) -> Result<Job, StoreError> {
        let entry = self.entry(id)?;
        let job = Self::lock_entry(&entry);
        Ok(job.clone())
    }

    /// Merges `update` into the job and publishes the merged snapshot.
    ///
    /// Fails with [`StoreError::Terminal`] once the job is finished.
    pub fn update(&self, id: &JobId, update: JobUpdate) -> Result<Job, StoreError> {
        let entry = self.entry(id)?;
        let mut job = Self::lock_entry(&entry);

        if job.is_finished() {
            log::debug!("Rejected update for finished job {}", id);
            return Err(StoreError::Terminal(id.clone()));
        }

        job.merge(update);
        self.broadcaster.publish(&job);

        Ok(job.clone())
    }

    /// Opens a live stream of the job, starting from its current snapshot.
    pub fn subscribe(&self, id: &JobId) -> Result<Subscription, StoreError> {
        let entry = self.entry(id)?;
        let job = Self::lock_entry(&entry);
        Ok(self.broadcaster.subscribe(job.clone()))
    }

    /// Ids of finished jobs completed before `cutoff`.
    pub fn list_terminal_older_than(&self, cutoff: DateTime<Utc>) -> Vec<JobId> {
        let entries: Vec<(JobId, Entry)> = self
            .read_jobs()
            .iter()
            .map(|(id, entry)| (id.clone(), Arc::clone(entry)))
            .collect();

        entries
            .into_iter()
            .filter(|(_, entry)| {
                let job = Self::lock_entry(entry);
                job.is_finished() && job.completed_at.is_some_and(|at| at < cutoff)
            })
            .map(|(id, _)| id)
            .collect()
    }

    /// Removes a job and ends any stream still attached to it. Returns false
    /// if the job did not exist.
    pub fn delete(&self, id: &JobId) -> bool {
        let removed = self.write_jobs().remove(id).is_some();
        if removed {
            self.broadcaster.remove_job(id);
            log::debug!("Deleted job {}", id);
        }
        removed
    }

    /// Removes a job unless a stream client is attached to it.
    ///
    /// Subscribing takes the same entry lock, so no subscriber can attach
    /// between the check and the removal.
    pub fn delete_if_unobserved(&self, id: &JobId) -> bool {
        let Ok(entry) = self.entry(id) else {
            return false;
        };
        let _job = Self::lock_entry(&entry);

        if self.broadcaster.subscriber_count(id) > 0 {
            log::debug!("Keeping job {}: stream client still attached", id);
            return false;
        }

        self.write_jobs().remove(id).is_some()
    }

    /// Returns snapshots of every job, oldest first.
    pub fn list(&self) -> Vec<Job> {
        let entries: Vec<Entry> = self.read_jobs().values().cloned().collect();
        let mut jobs: Vec<Job> = entries
            .iter()
            .map(|entry| Self::lock_entry(entry).clone())
            .collect();
        jobs.sort_by_key(|job| job.created_at);
        jobs
    }

    pub fn counts(&self) -> JobCounts {
        let entries: Vec<Entry> = self.read_jobs().values().cloned().collect();
        let mut counts = JobCounts {
            total: entries.len(),
            ..Default::default()
        };

        for entry in &entries {
            match Self::lock_entry(entry).status {
                JobStatus::Complete => counts.completed += 1,
                JobStatus::Error => counts.errored += 1,
                JobStatus::Cancelled => counts.cancelled += 1,
                _ => counts.active += 1,
            }
        }

        counts
    }

    pub fn len(&self) -> usize {
        self.read_jobs().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for JobStore {
    fn default() -> Self {
        Self::new(JobProgressBroadcaster::default())
    }
}
