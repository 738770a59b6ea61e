use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::backend::FetchedMedia;
use crate::job::{JobId, MediaMetadata};
use crate::transcript::Segment;

use super::error::{PipelineError, PipelineWarning};

/// Shared cancellation switch for one job.
#[derive(Debug, Clone, Default)]
pub struct CancellationFlag(Arc<AtomicBool>);

impl CancellationFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

pub struct PipelineContext {
    // Input
    pub job_id: JobId,
    pub url: String,
    pub extract: bool,
    pub cancel: CancellationFlag,

    // Set by step_captions or step_fetch
    pub metadata: Option<MediaMetadata>,
    // Downloaded audio; stays None when captions were used
    pub fetched: Option<FetchedMedia>,

    // Transcription results
    pub chunk_count: usize,
    pub segments: Vec<Segment>,
    pub transcript_ref: Option<String>,

    // Extraction result
    pub summary_ref: Option<String>,

    // Non-fatal warnings
    pub warnings: Vec<PipelineWarning>,
}

impl PipelineContext {
    pub fn new(job_id: JobId, url: impl Into<String>) -> Self {
        Self {
            job_id,
            url: url.into(),
            extract: true,
            cancel: CancellationFlag::new(),
            metadata: None,
            fetched: None,
            chunk_count: 0,
            segments: Vec::new(),
            transcript_ref: None,
            summary_ref: None,
            warnings: Vec::new(),
        }
    }

    pub fn with_extract(mut self, extract: bool) -> Self {
        self.extract = extract;
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationFlag) -> Self {
        self.cancel = cancel;
        self
    }

    /// Fails with [`PipelineError::Cancelled`] once cancellation was requested.
    pub fn check_cancelled(&self) -> Result<(), PipelineError> {
        if self.cancel.is_cancelled() {
            Err(PipelineError::Cancelled)
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancellation_is_shared_between_clones() {
        let flag = CancellationFlag::new();
        let ctx = PipelineContext::new(JobId::from("a"), "https://example.com")
            .with_cancellation(flag.clone());

        assert!(ctx.check_cancelled().is_ok());
        flag.cancel();
        assert!(matches!(ctx.check_cancelled(), Err(PipelineError::Cancelled)));
    }
}
