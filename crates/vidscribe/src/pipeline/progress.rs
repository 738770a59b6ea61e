use std::sync::{Arc, Mutex};

use crate::broadcast::JobStore;
use crate::error::StoreError;
use crate::job::{JobId, JobUpdate};

/// Progress bands per stage. Percentages are for display only.
pub const DOWNLOAD_START: u8 = 0;
pub const DOWNLOAD_DONE: u8 = 20;
pub const TRANSCRIBE_START: u8 = 25;
pub const TRANSCRIBE_DONE: u8 = 70;
pub const EXTRACT_START: u8 = 75;
pub const EXTRACT_DONE: u8 = 95;
pub const COMPLETE: u8 = 100;

/// Linear position of `done / total` inside `[start, end]`.
pub fn scaled(start: u8, end: u8, done: usize, total: usize) -> u8 {
    if total == 0 {
        return start;
    }
    let fraction = done.min(total) as f64 / total as f64;
    start + ((end - start) as f64 * fraction).round() as u8
}

/// Receives every state change the pipeline makes to a job.
pub trait ProgressReporter: Send + Sync {
    fn report(&self, update: JobUpdate) -> Result<(), StoreError>;
}

/// Discards updates.
pub struct NoopProgress;

impl ProgressReporter for NoopProgress {
    fn report(&self, _update: JobUpdate) -> Result<(), StoreError> {
        Ok(())
    }
}

/// Applies updates to a job in the [`JobStore`], which publishes them.
pub struct StoreProgress {
    store: Arc<JobStore>,
    job_id: JobId,
}

impl StoreProgress {
    pub fn new(store: Arc<JobStore>, job_id: JobId) -> Self {
        Self { store, job_id }
    }
}

impl ProgressReporter for StoreProgress {
    fn report(&self, update: JobUpdate) -> Result<(), StoreError> {
        self.store.update(&self.job_id, update).map(|_| ())
    }
}

/// Keeps every update in memory. Used by one-shot runs and tests.
#[derive(Default)]
pub struct RecordingProgress {
    updates: Mutex<Vec<JobUpdate>>,
}

impl RecordingProgress {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn updates(&self) -> Vec<JobUpdate> {
        match self.updates.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl ProgressReporter for RecordingProgress {
    fn report(&self, update: JobUpdate) -> Result<(), StoreError> {
        match self.updates.lock() {
            Ok(mut guard) => guard.push(update),
            Err(poisoned) => poisoned.into_inner().push(update),
        }
        Ok(())
    }
}
