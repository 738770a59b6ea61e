//! Hierarchical (map then reduce) summarization of long transcripts.

use std::sync::atomic::{AtomicUsize, Ordering};

use futures_util::stream::{self, StreamExt, TryStreamExt};
use tracing::debug;

use super::context::CancellationFlag;
use super::error::PipelineError;
use super::retry::RetryPolicy;
use crate::backend::{ExtractRequest, ExtractionKind, Extractor};
use crate::job::MediaMetadata;

pub const DEFAULT_MAX_CHARS: usize = 8000;
pub const DEFAULT_SEPARATOR: &str = "\n\n---\n\n";
pub const DEFAULT_MAX_CONCURRENT_CHUNKS: usize = 4;

/// Splits `text` into contiguous pieces of at most `max_chars` characters.
///
/// Cuts fall on the last whitespace inside the window; a single word longer
/// than `max_chars` is split hard. Whitespace at a cut is dropped.
pub fn split_text(text: &str, max_chars: usize) -> Vec<&str> {
    let max_chars = max_chars.max(1);
    let mut pieces = Vec::new();
    let mut rest = text.trim();

    while !rest.is_empty() {
        let limit = match rest.char_indices().nth(max_chars) {
            Some((byte_index, _)) => byte_index,
            None => {
                pieces.push(rest);
                break;
            }
        };

        let window = &rest[..limit];
        let cut = if rest[limit..].starts_with(char::is_whitespace) {
            limit
        } else {
            match window.rfind(char::is_whitespace) {
                Some(pos) if !window[..pos].trim().is_empty() => pos,
                _ => limit,
            }
        };

        pieces.push(rest[..cut].trim_end());
        rest = rest[cut..].trim_start();
    }

    pieces
}

/// Summarizes text in one call when it fits the budget, otherwise summarizes
/// each piece and synthesizes a final summary from the partial results.
#[derive(Debug, Clone)]
pub struct HierarchicalSummarizer {
    pub max_chars: usize,
    pub separator: String,
    pub max_concurrent_chunks: usize,
}

impl Default for HierarchicalSummarizer {
    fn default() -> Self {
        Self {
            max_chars: DEFAULT_MAX_CHARS,
            separator: DEFAULT_SEPARATOR.to_string(),
            max_concurrent_chunks: DEFAULT_MAX_CONCURRENT_CHUNKS,
        }
    }
}

impl HierarchicalSummarizer {
    pub fn new(max_chars: usize, separator: impl Into<String>, max_concurrent_chunks: usize) -> Self {
        Self {
            max_chars,
            separator: separator.into(),
            max_concurrent_chunks,
        }
    }

    /// Number of extraction calls needed for `text`.
    pub fn planned_calls(&self, text: &str) -> usize {
        if text.chars().count() <= self.max_chars {
            1
        } else {
            split_text(text, self.max_chars).len() + 1
        }
    }

    /// Runs the extraction. `on_progress(done, total)` is called after every
    /// finished extraction call.
    ///
    /// Any call that fails after retries fails the whole summary. `cancel` is
    /// checked before every extraction call.
    pub async fn summarize(
        &self,
        text: &str,
        metadata: Option<&MediaMetadata>,
        extractor: &dyn Extractor,
        retry: &RetryPolicy,
        cancel: &CancellationFlag,
        on_progress: &(dyn Fn(usize, usize) + Sync),
    ) -> Result<String, PipelineError> {
        if text.chars().count() <= self.max_chars {
            check(cancel)?;
            let summary = retry
                .run("extract", || {
                    extractor.extract(ExtractRequest {
                        text,
                        kind: ExtractionKind::Full,
                        metadata,
                    })
                })
                .await
                .map_err(PipelineError::Extract)?;
            on_progress(1, 1);
            return Ok(summary);
        }

        let pieces: Vec<String> = split_text(text, self.max_chars)
            .into_iter()
            .map(str::to_string)
            .collect();
        let parts = pieces.len();
        let total_calls = parts + 1;
        let done = AtomicUsize::new(0);
        debug!(
            "Transcript exceeds {} chars, summarizing in {} parts",
            self.max_chars, parts
        );

        let part = PartCall {
            parts,
            total_calls,
            metadata,
            extractor,
            retry,
            cancel,
            on_progress,
            done: &done,
        };
        let partials: Vec<String> = stream::iter(pieces.into_iter().enumerate())
            .map(|(index, piece)| part.run(index, piece))
            .buffered(self.max_concurrent_chunks.max(1))
            .try_collect()
            .await?;

        check(cancel)?;
        let combined = partials.join(&self.separator);
        let summary = retry
            .run("extract synthesis", || {
                extractor.extract(ExtractRequest {
                    text: &combined,
                    kind: ExtractionKind::Synthesis { parts },
                    metadata,
                })
            })
            .await
            .map_err(PipelineError::Extract)?;
        on_progress(total_calls, total_calls);

        Ok(summary)
    }
}

fn check(cancel: &CancellationFlag) -> Result<(), PipelineError> {
    if cancel.is_cancelled() {
        Err(PipelineError::Cancelled)
    } else {
        Ok(())
    }
}

/// Shared inputs of the per-part extraction calls.
struct PartCall<'a> {
    parts: usize,
    total_calls: usize,
    metadata: Option<&'a MediaMetadata>,
    extractor: &'a dyn Extractor,
    retry: &'a RetryPolicy,
    cancel: &'a CancellationFlag,
    on_progress: &'a (dyn Fn(usize, usize) + Sync),
    done: &'a AtomicUsize,
}

impl PartCall<'_> {
    async fn run(&self, index: usize, piece: String) -> Result<String, PipelineError> {
        check(self.cancel)?;
        let partial = self
            .retry
            .run("extract part", || {
                self.extractor.extract(ExtractRequest {
                    text: &piece,
                    kind: ExtractionKind::Part {
                        index,
                        total: self.parts,
                    },
                    metadata: self.metadata,
                })
            })
            .await
            .map_err(PipelineError::Extract)?;
        let finished = self.done.fetch_add(1, Ordering::SeqCst) + 1;
        (self.on_progress)(finished, self.total_calls);
        Ok(partial)
    }
}
