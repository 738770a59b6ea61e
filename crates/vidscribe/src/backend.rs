//! Interfaces to the external services the pipeline drives.
//!
//! Downloading, speech-to-text and LLM extraction happen outside this crate;
//! the pipeline only sees these traits. Artifact writing has a default
//! filesystem implementation in [`crate::storage`].

use std::fmt;

use async_trait::async_trait;
use thiserror::Error;

use crate::error::StorageError;
use crate::job::{JobId, MediaMetadata};
use crate::transcript::{Segment, TimeRange};

/// Failure classes reported by a backend. Drives the retry decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The service asked us to slow down (HTTP 429 and friends).
    RateLimited,
    /// Connection reset, refused, 5xx: likely to succeed on a later attempt.
    Transient,
    Timeout,
    /// Everything else. Never retried.
    Fatal,
}

impl ErrorKind {
    /// Returns true if the failure is worth retrying.
    pub fn is_retryable(self) -> bool {
        matches!(
            self,
            ErrorKind::RateLimited | ErrorKind::Transient | ErrorKind::Timeout
        )
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::RateLimited => write!(f, "rate limited"),
            ErrorKind::Transient => write!(f, "transient"),
            ErrorKind::Timeout => write!(f, "timeout"),
            ErrorKind::Fatal => write!(f, "fatal"),
        }
    }
}

/// Error returned by a backend call.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct BackendError {
    pub kind: ErrorKind,
    pub message: String,
}

impl BackendError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn fatal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Fatal, message)
    }

    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::RateLimited, message)
    }

    pub fn transient(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Transient, message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Timeout, message)
    }

    pub fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }
}

/// Opaque handle to downloaded audio (typically a local file path).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioRef(pub String);

impl fmt::Display for AudioRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Result of a successful media fetch.
#[derive(Debug, Clone)]
pub struct FetchedMedia {
    pub audio: AudioRef,
    pub metadata: MediaMetadata,
}

/// Downloads the audio track of a media URL.
///
/// Implementations apply their own retry policy; the pipeline treats any
/// error as fatal for the job.
#[async_trait]
pub trait MediaFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<FetchedMedia, BackendError>;

    /// Releases downloaded audio once the job no longer needs it.
    async fn cleanup(&self, _audio: &AudioRef) -> Result<(), BackendError> {
        Ok(())
    }
}

/// Captions published alongside the media, with the media's metadata.
#[derive(Debug, Clone)]
pub struct CaptionTrack {
    pub metadata: MediaMetadata,
    pub segments: Vec<Segment>,
}

/// Published captions, tried before downloading audio. Calls must be
/// idempotent.
#[async_trait]
pub trait CaptionSource: Send + Sync {
    /// Returns `Ok(None)` when the media has no usable captions.
    async fn captions(&self, url: &str) -> Result<Option<CaptionTrack>, BackendError>;
}

/// Speech-to-text engine, invoked once per chunk.
#[async_trait]
pub trait Transcriber: Send + Sync {
    /// Engine name shown in progress messages.
    fn name(&self) -> &str {
        "speech-to-text"
    }

    /// Transcribes `range` of the audio. Returned segment times must be
    /// absolute (measured from the start of the media, not of the range).
    async fn transcribe(
        &self,
        audio: &AudioRef,
        range: TimeRange,
    ) -> Result<Vec<Segment>, BackendError>;
}

/// What an extraction call is being asked to produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractionKind {
    /// Summary of the whole transcript in one call.
    Full,
    /// Partial summary of one slice of a long transcript.
    Part { index: usize, total: usize },
    /// Final summary built from the partial summaries.
    Synthesis { parts: usize },
}

/// Input to a single extraction call.
#[derive(Debug, Clone, Copy)]
pub struct ExtractRequest<'a> {
    pub text: &'a str,
    pub kind: ExtractionKind,
    pub metadata: Option<&'a MediaMetadata>,
}

/// LLM service producing a summary from text. Calls must be idempotent.
#[async_trait]
pub trait Extractor: Send + Sync {
    async fn extract(&self, request: ExtractRequest<'_>) -> Result<String, BackendError>;
}

/// Artifact produced by a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    Transcript,
    Summary,
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArtifactKind::Transcript => write!(f, "transcript"),
            ArtifactKind::Summary => write!(f, "summary"),
        }
    }
}

/// Persists artifacts and hands back a stable reference to them.
#[async_trait]
pub trait ArtifactWriter: Send + Sync {
    async fn write(
        &self,
        job_id: &JobId,
        kind: ArtifactKind,
        metadata: &MediaMetadata,
        body: &str,
    ) -> Result<String, StorageError>;

    /// Reads back an artifact by the reference `write` returned.
    async fn read(&self, reference: &str) -> Result<String, StorageError> {
        Err(StorageError::NotFound(reference.to_string()))
    }
}
