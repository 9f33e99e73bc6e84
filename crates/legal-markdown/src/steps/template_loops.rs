use tracing::debug;

use crate::options::ProcessingOptions;
use crate::pipeline::{PipelineContext, StepError, StepProcessor};
use crate::template::{LoopEngine, Metadata};

/// Expands block helpers (`{{#items}}`, `{{#if}}`, `{{#each}}`) before the
/// mixin pass sees the document.
#[derive(Debug, Default, Clone, Copy)]
pub struct TemplateLoopsStep;

impl StepProcessor for TemplateLoopsStep {
    fn process(
        &self,
        content: &str,
        metadata: &mut Metadata,
        ctx: &PipelineContext,
    ) -> Result<String, StepError> {
        if !content.contains("{{") {
            return Ok(content.to_string());
        }
        let engine = LoopEngine::new(ctx.options.legacy_list_items_as_html);
        let output = engine.process(content, metadata, &ctx.render_context(metadata));
        debug!("Template blocks processed as {:?}", output.dialect);
        for warning in output.warnings {
            ctx.warn(warning);
        }
        Ok(output.content)
    }

    fn is_enabled(&self, options: &ProcessingOptions) -> bool {
        !options.no_mixins
    }
}
