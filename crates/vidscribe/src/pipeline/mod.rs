//! Per-job processing: download, chunked transcription, hierarchical
//! summarization.

pub mod chunking;
pub mod config;
pub mod context;
pub mod error;
pub mod progress;
pub mod retry;
pub mod runner;
pub mod summarize;

pub use chunking::{merge_chunk_segments, plan_chunks, ChunkPlanner, ChunkRange, ChunkSegments};
pub use config::PipelineConfig;
pub use context::{CancellationFlag, PipelineContext};
pub use error::{PipelineError, PipelineWarning};
pub use progress::{NoopProgress, ProgressReporter, RecordingProgress, StoreProgress};
pub use retry::{RetryError, RetryPolicy};
pub use runner::{Backends, JobOutcome, Pipeline};
pub use summarize::{split_text, HierarchicalSummarizer};
