//! Job engine that turns media URLs into timestamped transcripts and
//! summaries.
//!
//! A job runs download, chunked transcription and hierarchical summarization
//! against pluggable [`backend`]s. Job state lives in a [`JobStore`] and every
//! change is streamed to subscribers as a full snapshot.

pub mod backend;
pub mod broadcast;
pub mod config;
pub mod error;
pub mod job;
pub mod logging;
pub mod pipeline;
pub mod sanitize;
pub mod storage;
pub mod transcript;
pub mod worker;

pub use backend::{
    ArtifactKind, ArtifactWriter, AudioRef, BackendError, CaptionSource, CaptionTrack, ErrorKind,
    ExtractRequest, ExtractionKind, Extractor, FetchedMedia, MediaFetcher, Transcriber,
};
pub use broadcast::{JobCounts, JobProgressBroadcaster, JobStore, StreamEvent, Subscription};
pub use config::{load_config, Config};
pub use error::{ConfigError, Result, StorageError, StoreError, VidscribeError};
pub use job::{Job, JobId, JobPhase, JobStatus, JobUpdate, MediaMetadata};
pub use pipeline::{Backends, JobOutcome, Pipeline, PipelineConfig, PipelineContext};
pub use storage::FileStorage;
pub use transcript::{Segment, TimeRange};
pub use worker::{HealthReport, JobManager, JobReaper, ManagerBackends, SubmitOptions};
