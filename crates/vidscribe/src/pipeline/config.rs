use crate::config::Config;

use super::chunking::ChunkPlanner;
use super::retry::RetryPolicy;
use super::summarize::HierarchicalSummarizer;

/// Runtime settings of the pipeline, derived from [`Config`].
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub chunking: ChunkPlanner,
    pub summarizer: HierarchicalSummarizer,
    pub retry: RetryPolicy,
}

impl PipelineConfig {
    pub fn from_config(config: &Config) -> Self {
        let t = &config.transcription;
        let e = &config.extraction;
        Self {
            chunking: ChunkPlanner::new(
                t.chunk_duration_secs,
                t.chunk_overlap_secs,
                t.chunking_threshold_secs,
            ),
            summarizer: HierarchicalSummarizer::new(
                e.max_chars_per_chunk,
                e.chunk_separator.clone(),
                e.max_concurrent_chunks,
            ),
            retry: RetryPolicy::from_config(&config.retry),
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}
