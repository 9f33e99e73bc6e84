use crate::options::ProcessingOptions;
use crate::pipeline::{PipelineContext, StepError, StepProcessor};
use crate::template::{Metadata, MixinProcessor};

/// Resolves the remaining `{{...}}` mixins. The processor and its parse
/// cache live as long as the step, so a batch worker reuses parses.
#[derive(Debug, Default)]
pub struct MixinsStep {
    processor: MixinProcessor,
}

impl MixinsStep {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn processor(&self) -> &MixinProcessor {
        &self.processor
    }
}

impl StepProcessor for MixinsStep {
    fn process(
        &self,
        content: &str,
        metadata: &mut Metadata,
        ctx: &PipelineContext,
    ) -> Result<String, StepError> {
        if !content.contains("{{") {
            return Ok(content.to_string());
        }
        Ok(self.processor.process(content, metadata, &ctx.render_context(metadata)))
    }

    fn is_enabled(&self, options: &ProcessingOptions) -> bool {
        !options.no_mixins
    }
}
