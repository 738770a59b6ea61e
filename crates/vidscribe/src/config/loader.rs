use std::path::Path;

use crate::config::schema::{Config, CONFIG_VERSION};
use crate::error::ConfigError;

const SCHEMA_JSON: &str = include_str!("../../schema/config-v1.json");

/// Overrides the output directory.
pub const ENV_OUTPUT_DIR: &str = "OUTPUT_DIR";
/// Overrides `jobs.ttl_hours`. Zero or negative disables cleanup.
pub const ENV_JOB_TTL_HOURS: &str = "JOB_TTL_HOURS";

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;

    load_config_from_str(&content)
}

pub fn load_config_from_str(content: &str) -> Result<Config, ConfigError> {
    let json_value: serde_json::Value = serde_json::from_str(content)?;

    validate_schema(&json_value)?;

    let config: Config = serde_json::from_value(json_value)?;

    validate_config(&config)?;

    Ok(config)
}

impl Config {
    /// Applies `OUTPUT_DIR` and `JOB_TTL_HOURS` from the environment, then
    /// re-validates.
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Ok(dir) = std::env::var(ENV_OUTPUT_DIR) {
            if !dir.trim().is_empty() {
                self.output_directory = dir;
            }
        }

        if let Ok(raw) = std::env::var(ENV_JOB_TTL_HOURS) {
            let hours: i64 = raw.trim().parse().map_err(|_| ConfigError::InvalidEnv {
                name: ENV_JOB_TTL_HOURS.to_string(),
                value: raw.clone(),
                reason: "expected a whole number of hours".to_string(),
            })?;
            self.jobs.ttl_hours = hours.max(0) as u64;
        }

        validate_config(self)
    }
}

fn validate_schema(json_value: &serde_json::Value) -> Result<(), ConfigError> {
    let schema: serde_json::Value =
        serde_json::from_str(SCHEMA_JSON).map_err(|e| ConfigError::Validation {
            message: format!("Invalid embedded schema JSON: {}", e),
        })?;

    let validator = jsonschema::validator_for(&schema).map_err(|e| ConfigError::Validation {
        message: format!("Failed to compile JSON schema: {}", e),
    })?;

    let error_messages: Vec<String> = validator
        .iter_errors(json_value)
        .map(|e| e.to_string())
        .collect();
    if !error_messages.is_empty() {
        return Err(ConfigError::SchemaValidation {
            errors: error_messages.join("; "),
        });
    }

    Ok(())
}

pub(crate) fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.version != CONFIG_VERSION {
        return Err(ConfigError::Validation {
            message: format!("Unsupported config version: {}", config.version),
        });
    }

    if config.output_directory.trim().is_empty() {
        return Err(ConfigError::Validation {
            message: "output_directory must not be empty".to_string(),
        });
    }

    let t = &config.transcription;
    if !(t.chunk_duration_secs.is_finite() && t.chunk_duration_secs > 0.0) {
        return Err(ConfigError::Validation {
            message: format!(
                "transcription.chunk_duration_secs must be positive, got {}",
                t.chunk_duration_secs
            ),
        });
    }
    if !(t.chunk_overlap_secs >= 0.0 && t.chunk_overlap_secs < t.chunk_duration_secs) {
        return Err(ConfigError::Validation {
            message: format!(
                "transcription.chunk_overlap_secs ({}) must be >= 0 and smaller than chunk_duration_secs ({})",
                t.chunk_overlap_secs, t.chunk_duration_secs
            ),
        });
    }
    if !(t.chunking_threshold_secs >= 0.0) {
        return Err(ConfigError::Validation {
            message: "transcription.chunking_threshold_secs must not be negative".to_string(),
        });
    }

    if config.extraction.max_chars_per_chunk == 0 {
        return Err(ConfigError::Validation {
            message: "extraction.max_chars_per_chunk must be at least 1".to_string(),
        });
    }
    if config.extraction.max_concurrent_chunks == 0 {
        return Err(ConfigError::Validation {
            message: "extraction.max_concurrent_chunks must be at least 1".to_string(),
        });
    }

    if config.retry.max_attempts == 0 {
        return Err(ConfigError::Validation {
            message: "retry.max_attempts must be at least 1".to_string(),
        });
    }
    if config.retry.max_delay_ms < config.retry.base_delay_ms {
        return Err(ConfigError::Validation {
            message: format!(
                "retry.max_delay_ms ({}) is smaller than retry.base_delay_ms ({})",
                config.retry.max_delay_ms, config.retry.base_delay_ms
            ),
        });
    }

    let jobs = &config.jobs;
    if jobs.cleanup_interval_minutes == 0 {
        return Err(ConfigError::Validation {
            message: "jobs.cleanup_interval_minutes must be at least 1".to_string(),
        });
    }
    if jobs.keepalive_secs == 0 {
        return Err(ConfigError::Validation {
            message: "jobs.keepalive_secs must be at least 1".to_string(),
        });
    }
    if jobs.subscriber_queue_capacity == 0 || jobs.max_concurrent_jobs == 0 {
        return Err(ConfigError::Validation {
            message: "jobs.subscriber_queue_capacity and jobs.max_concurrent_jobs must be at least 1"
                .to_string(),
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn clear_env() {
        std::env::remove_var(ENV_OUTPUT_DIR);
        std::env::remove_var(ENV_JOB_TTL_HOURS);
    }

    #[test]
    fn test_load_minimal_config() {
        let config = load_config_from_str(r#"{ "version": "1.0" }"#).unwrap();
        assert_eq!(config.version, "1.0");
        assert_eq!(config.transcription.chunk_duration_secs, 1800.0);
        assert_eq!(config.jobs.ttl_hours, 24);
    }

    #[test]
    fn test_load_full_config() {
        let config_json = r#"
        {
            "version": "1.0",
            "output_directory": "/srv/vidscribe",
            "transcription": {
                "chunk_duration_secs": 600,
                "chunk_overlap_secs": 2.5,
                "chunking_threshold_secs": 900
            },
            "extraction": {
                "max_chars_per_chunk": 4000,
                "chunk_separator": "\n\n",
                "max_concurrent_chunks": 2
            },
            "retry": { "max_attempts": 5, "base_delay_ms": 200, "max_delay_ms": 5000 },
            "jobs": {
                "ttl_hours": 6,
                "cleanup_interval_minutes": 10,
                "keepalive_secs": 15,
                "subscriber_queue_capacity": 16,
                "max_concurrent_jobs": 2
            }
        }
        "#;

        let config = load_config_from_str(config_json).unwrap();
        assert_eq!(config.output_directory, "/srv/vidscribe");
        assert_eq!(config.transcription.chunk_overlap_secs, 2.5);
        assert_eq!(config.extraction.max_chars_per_chunk, 4000);
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.jobs.subscriber_queue_capacity, 16);
    }

    #[test]
    fn test_load_config_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vidscribe.json");
        std::fs::write(&path, r#"{ "version": "1.0", "output_directory": "out" }"#).unwrap();

        let config = load_config(&path).unwrap();
        assert_eq!(config.output_directory, "out");
    }

    #[test]
    fn test_missing_file_reports_path() {
        let err = load_config("/nonexistent/vidscribe.json").unwrap_err();
        assert!(matches!(err, ConfigError::ReadFile { .. }));
        assert!(err.to_string().contains("/nonexistent/vidscribe.json"));
    }

    #[test]
    fn test_invalid_version() {
        let result = load_config_from_str(r#"{ "version": "2.0" }"#);
        assert!(matches!(result, Err(ConfigError::Validation { .. })));
    }

    #[test]
    fn test_schema_rejects_unknown_fields() {
        let result = load_config_from_str(r#"{ "version": "1.0", "worker_count": 4 }"#);
        assert!(matches!(result, Err(ConfigError::SchemaValidation { .. })));
    }

    #[test]
    fn test_schema_rejects_wrong_types() {
        let result = load_config_from_str(
            r#"{ "version": "1.0", "jobs": { "ttl_hours": "forever" } }"#,
        );
        assert!(matches!(result, Err(ConfigError::SchemaValidation { .. })));
    }

    #[test]
    fn test_overlap_must_be_smaller_than_chunk() {
        let result = load_config_from_str(
            r#"{ "version": "1.0", "transcription": { "chunk_duration_secs": 10, "chunk_overlap_secs": 10 } }"#,
        );
        assert!(matches!(result, Err(ConfigError::Validation { .. })));
    }

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate_config(&Config::default()).is_ok());
    }

    #[test]
    #[serial]
    fn test_env_overrides_output_dir_and_ttl() {
        clear_env();
        std::env::set_var(ENV_OUTPUT_DIR, "/data/out");
        std::env::set_var(ENV_JOB_TTL_HOURS, "48");

        let mut config = Config::default();
        config.apply_env_overrides().unwrap();
        clear_env();

        assert_eq!(config.output_directory, "/data/out");
        assert_eq!(config.jobs.ttl_hours, 48);
    }

    #[test]
    #[serial]
    fn test_negative_ttl_disables_cleanup() {
        clear_env();
        std::env::set_var(ENV_JOB_TTL_HOURS, "-1");

        let mut config = Config::default();
        config.apply_env_overrides().unwrap();
        clear_env();

        assert_eq!(config.jobs.ttl_hours, 0);
    }

    #[test]
    #[serial]
    fn test_malformed_ttl_is_rejected() {
        clear_env();
        std::env::set_var(ENV_JOB_TTL_HOURS, "a day");

        let mut config = Config::default();
        let result = config.apply_env_overrides();
        clear_env();

        assert!(matches!(result, Err(ConfigError::InvalidEnv { .. })));
    }

    #[test]
    #[serial]
    fn test_no_env_leaves_config_untouched() {
        clear_env();
        let mut config = Config::default();
        let before = config.output_directory.clone();
        config.apply_env_overrides().unwrap();
        assert_eq!(config.output_directory, before);
        assert_eq!(config.jobs.ttl_hours, 24);
    }
}
