//! Legal Markdown processing: front matter, imports, optional clauses,
//! cross-references, template loops, mixins and header numbering, run as
//! an ordered pipeline of steps.

pub mod batch;
pub mod config;
pub mod crossref;
pub mod error;
pub mod logging;
pub mod options;
pub mod pipeline;
pub mod steps;
pub mod template;
pub mod tracking;

pub use batch::{BatchJob, BatchJobResult, BatchProcessor};
pub use config::{load_config, Config};
pub use error::{ConfigError, LegalMarkdownError, Result};
pub use logging::init_logging;
pub use options::{ExportFormat, ProcessingOptions};
pub use pipeline::{
    Pipeline, PipelineBuilder, PipelineConfig, PipelineContext, PipelineResult, PipelineStep,
    ProcessingError, StepError, StepProcessor,
};
pub use steps::{default_builder, default_pipeline};
pub use template::Metadata;
pub use tracking::{FieldReport, FieldTracker};

/// Runs `content` through the built-in pipeline with default settings.
pub fn process(content: &str, options: ProcessingOptions) -> Result<PipelineResult> {
    let pipeline = default_pipeline(PipelineConfig::default())?;
    Ok(pipeline.execute(content, Metadata::new(), options))
}

/// Like [`process`], with settings taken from a loaded [`Config`]. The
/// config's processing defaults are used as given.
pub fn process_with_config(content: &str, config: &Config) -> Result<PipelineResult> {
    let pipeline = default_pipeline(PipelineConfig::from_config(config))?;
    Ok(pipeline.execute(content, Metadata::new(), config.processing.clone()))
}
