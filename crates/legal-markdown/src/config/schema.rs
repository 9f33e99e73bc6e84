use serde::{Deserialize, Serialize};

use crate::crossref::HeaderFormats;
use crate::options::ProcessingOptions;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub pipeline: PipelineSettings,
    /// Defaults applied to every document unless the caller overrides them.
    #[serde(default)]
    pub processing: ProcessingOptions,
    #[serde(default)]
    pub headers: HeaderFormats,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub batch: BatchConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineSettings {
    #[serde(default)]
    pub continue_on_error: bool,
    #[serde(default = "default_true")]
    pub enable_metrics: bool,
    #[serde(default)]
    pub default_step_timeout_ms: Option<u64>,
}

fn default_true() -> bool {
    true
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            continue_on_error: false,
            enable_metrics: true,
            default_step_timeout_ms: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_level")]
    pub level: String,
    /// Emit JSON lines instead of human-readable output.
    #[serde(default)]
    pub json: bool,
}

fn default_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            json: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchConfig {
    #[serde(default = "default_worker_count")]
    pub worker_count: usize,
}

fn default_worker_count() -> usize {
    num_cpus::get()
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            worker_count: default_worker_count(),
        }
    }
}
