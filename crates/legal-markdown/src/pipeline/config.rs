use std::time::Duration;

use crate::config::Config;
use crate::crossref::HeaderFormats;

/// Run-level behaviour of a pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    /// Keep going after a recoverable step failure.
    pub continue_on_error: bool,
    pub enable_metrics: bool,
    /// Applied to steps that do not set their own timeout.
    pub default_step_timeout: Option<Duration>,
    pub header_formats: HeaderFormats,
    /// Step filters applied to every run. Checked against the registered
    /// steps when the pipeline is built.
    pub only_steps: Vec<String>,
    pub skip_steps: Vec<String>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            continue_on_error: false,
            enable_metrics: true,
            default_step_timeout: None,
            header_formats: HeaderFormats::default(),
            only_steps: Vec::new(),
            skip_steps: Vec::new(),
        }
    }
}

impl PipelineConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            continue_on_error: config.pipeline.continue_on_error,
            enable_metrics: config.pipeline.enable_metrics,
            default_step_timeout: config
                .pipeline
                .default_step_timeout_ms
                .map(Duration::from_millis),
            header_formats: config.headers.clone(),
            only_steps: config.processing.only_steps.clone(),
            skip_steps: config.processing.skip_steps.clone(),
        }
    }
}
