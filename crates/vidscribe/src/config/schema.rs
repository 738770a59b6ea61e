use serde::{Deserialize, Serialize};

use crate::pipeline::summarize::{
    DEFAULT_MAX_CHARS, DEFAULT_MAX_CONCURRENT_CHUNKS, DEFAULT_SEPARATOR,
};

pub const CONFIG_VERSION: &str = "1.0";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub version: String,
    #[serde(default = "default_output_directory")]
    pub output_directory: String,
    #[serde(default)]
    pub transcription: TranscriptionConfig,
    #[serde(default)]
    pub extraction: ExtractionConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub jobs: JobsConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION.to_string(),
            output_directory: default_output_directory(),
            transcription: TranscriptionConfig::default(),
            extraction: ExtractionConfig::default(),
            retry: RetryConfig::default(),
            jobs: JobsConfig::default(),
        }
    }
}

fn default_output_directory() -> String {
    dirs::data_dir()
        .map(|p| {
            p.join("vidscribe")
                .join("output")
                .to_string_lossy()
                .to_string()
        })
        .unwrap_or_else(|| "./output".to_string())
}

/// Chunked speech-to-text settings, in seconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptionConfig {
    #[serde(default = "default_chunk_duration")]
    pub chunk_duration_secs: f64,
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap_secs: f64,
    /// Media at or below this duration is transcribed in one call.
    #[serde(default = "default_chunk_duration")]
    pub chunking_threshold_secs: f64,
}

fn default_chunk_duration() -> f64 {
    1800.0
}

fn default_chunk_overlap() -> f64 {
    5.0
}

impl Default for TranscriptionConfig {
    fn default() -> Self {
        Self {
            chunk_duration_secs: default_chunk_duration(),
            chunk_overlap_secs: default_chunk_overlap(),
            chunking_threshold_secs: default_chunk_duration(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionConfig {
    /// Transcripts longer than this many characters are summarized in parts.
    #[serde(default = "default_max_chars")]
    pub max_chars_per_chunk: usize,
    #[serde(default = "default_separator")]
    pub chunk_separator: String,
    #[serde(default = "default_max_concurrent_chunks")]
    pub max_concurrent_chunks: usize,
}

fn default_max_chars() -> usize {
    DEFAULT_MAX_CHARS
}

fn default_separator() -> String {
    DEFAULT_SEPARATOR.to_string()
}

fn default_max_concurrent_chunks() -> usize {
    DEFAULT_MAX_CONCURRENT_CHUNKS
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            max_chars_per_chunk: default_max_chars(),
            chunk_separator: default_separator(),
            max_concurrent_chunks: default_max_concurrent_chunks(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    1000
}

fn default_max_delay_ms() -> u64 {
    30_000
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

/// Job lifetime and streaming settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobsConfig {
    /// Hours a finished job is kept before the reaper removes it. 0 keeps jobs forever.
    #[serde(default = "default_ttl_hours")]
    pub ttl_hours: u64,
    #[serde(default = "default_cleanup_interval")]
    pub cleanup_interval_minutes: u64,
    #[serde(default = "default_keepalive_secs")]
    pub keepalive_secs: u64,
    #[serde(default = "default_queue_capacity")]
    pub subscriber_queue_capacity: usize,
    #[serde(default = "default_max_concurrent_jobs")]
    pub max_concurrent_jobs: usize,
}

fn default_ttl_hours() -> u64 {
    24
}

fn default_cleanup_interval() -> u64 {
    30
}

fn default_keepalive_secs() -> u64 {
    30
}

fn default_queue_capacity() -> usize {
    100
}

fn default_max_concurrent_jobs() -> usize {
    num_cpus::get()
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            ttl_hours: default_ttl_hours(),
            cleanup_interval_minutes: default_cleanup_interval(),
            keepalive_secs: default_keepalive_secs(),
            subscriber_queue_capacity: default_queue_capacity(),
            max_concurrent_jobs: default_max_concurrent_jobs(),
        }
    }
}
