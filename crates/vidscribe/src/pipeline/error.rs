use thiserror::Error;

use super::retry::RetryError;
use crate::backend::BackendError;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Download failed: {0}")]
    Fetch(#[source] BackendError),

    #[error("Transcription failed: {0}")]
    Transcribe(#[source] RetryError),

    #[error("Extraction failed: {0}")]
    Extract(#[source] RetryError),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Storing artifact failed: {0}")]
    Storage(#[from] crate::error::StorageError),

    #[error("Job state update rejected: {0}")]
    Store(#[from] crate::error::StoreError),

    #[error("Job was cancelled")]
    Cancelled,
}

/// Non-fatal problems recorded while a job still completes.
#[derive(Debug, Clone)]
pub enum PipelineWarning {
    CaptionsFailed { error: String },
    ExtractionFailed { error: String },
    SummaryNotStored { error: String },
    CleanupFailed { error: String },
}
