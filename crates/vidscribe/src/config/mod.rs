pub mod loader;
pub mod schema;

pub use loader::{load_config, load_config_from_str, ENV_JOB_TTL_HOURS, ENV_OUTPUT_DIR};
pub use schema::{
    Config, ExtractionConfig, JobsConfig, RetryConfig, TranscriptionConfig, CONFIG_VERSION,
};
