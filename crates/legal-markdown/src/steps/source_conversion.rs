use std::sync::Arc;

use tracing::debug;

use crate::pipeline::{PipelineContext, StepError, StepProcessor};
use crate::template::Metadata;

/// Turns another markup (RST, LaTeX) into Legal Markdown.
pub trait SourceConverter: Send + Sync {
    fn name(&self) -> &str;

    /// Whether `content` is in this converter's source format.
    fn detect(&self, content: &str) -> bool;

    fn convert(&self, content: &str) -> Result<String, StepError>;
}

/// Runs the first converter that recognises the document. Content no
/// converter claims passes through unchanged.
#[derive(Default, Clone)]
pub struct SourceConversionStep {
    converters: Vec<Arc<dyn SourceConverter>>,
}

impl SourceConversionStep {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_converter(mut self, converter: impl SourceConverter + 'static) -> Self {
        self.converters.push(Arc::new(converter));
        self
    }
}

impl StepProcessor for SourceConversionStep {
    fn process(
        &self,
        content: &str,
        _metadata: &mut Metadata,
        _ctx: &PipelineContext,
    ) -> Result<String, StepError> {
        match self.converters.iter().find(|c| c.detect(content)) {
            Some(converter) => {
                debug!("Converting source with {}", converter.name());
                converter.convert(content)
            }
            None => Ok(content.to_string()),
        }
    }
}
