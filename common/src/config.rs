use config::{Config, ConfigError};
use serde::Deserialize;
use std::collections::HashMap;
use tracing::debug;

#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub warehouse: WarehouseConfig,
    #[serde(default = "default_pipeline_config")]
    pub pipeline: PipelineConfig,
    #[serde(default = "default_quality_config")]
    pub quality: QualityConfig,
    #[serde(default = "default_retry_config")]
    pub retry: RetryConfig,
    /// Estimated file sizes in MB keyed by trip type, used for download
    /// sanity checks by the extraction collaborator.
    #[serde(default)]
    pub size_estimates: HashMap<String, u64>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct WarehouseConfig {
    pub account: String,
    pub database: String,
    pub schema: String,
    pub warehouse: String,
    #[serde(default)]
    pub role: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PipelineConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_parallel_files")]
    pub max_parallel_files: usize,
    /// Consecutive connection-exhausted files before the whole run aborts.
    #[serde(default = "default_max_consecutive_connection_failures")]
    pub max_consecutive_connection_failures: usize,
}

#[derive(Debug, Deserialize, Clone)]
pub struct QualityConfig {
    #[serde(default = "default_null_warn_fraction")]
    pub null_warn_fraction: f64,
    #[serde(default = "default_null_error_fraction")]
    pub null_error_fraction: f64,
    #[serde(default = "default_range_error_fraction")]
    pub range_error_fraction: f64,
    #[serde(default = "default_duplicate_warn_fraction")]
    pub duplicate_warn_fraction: f64,
    #[serde(default = "default_error_penalty")]
    pub error_penalty: f64,
    #[serde(default = "default_warning_penalty")]
    pub warning_penalty: f64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
}

fn default_pipeline_config() -> PipelineConfig {
    PipelineConfig {
        data_dir: default_data_dir(),
        batch_size: default_batch_size(),
        max_parallel_files: default_max_parallel_files(),
        max_consecutive_connection_failures: default_max_consecutive_connection_failures(),
    }
}

fn default_quality_config() -> QualityConfig {
    QualityConfig {
        null_warn_fraction: default_null_warn_fraction(),
        null_error_fraction: default_null_error_fraction(),
        range_error_fraction: default_range_error_fraction(),
        duplicate_warn_fraction: default_duplicate_warn_fraction(),
        error_penalty: default_error_penalty(),
        warning_penalty: default_warning_penalty(),
    }
}

fn default_retry_config() -> RetryConfig {
    RetryConfig {
        max_attempts: default_max_attempts(),
        base_delay_ms: default_base_delay_ms(),
    }
}

fn default_data_dir() -> String {
    "data".to_string()
}

fn default_batch_size() -> usize {
    10_000
}

fn default_max_parallel_files() -> usize {
    4
}

fn default_max_consecutive_connection_failures() -> usize {
    3
}

fn default_null_warn_fraction() -> f64 {
    0.05
}

fn default_null_error_fraction() -> f64 {
    0.5
}

fn default_range_error_fraction() -> f64 {
    0.01
}

fn default_duplicate_warn_fraction() -> f64 {
    0.01
}

fn default_error_penalty() -> f64 {
    20.0
}

fn default_warning_penalty() -> f64 {
    5.0
}

fn default_max_attempts() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    500
}

impl Settings {
    pub fn new(path: &str) -> Result<Self, ConfigError> {
        let builder = Config::builder()
            .add_source(config::File::with_name(path))
            .add_source(config::Environment::with_prefix("APP").separator("__"));

        let config = builder.build()?;

        let settings: Settings = config.try_deserialize()?;

        debug!(
            batch_size = settings.pipeline.batch_size,
            max_parallel_files = settings.pipeline.max_parallel_files,
            "Loaded pipeline settings"
        );

        Ok(settings)
    }
}
