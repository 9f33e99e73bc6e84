use serde_json::{json, Value};
use tracing::debug;

use crate::crossref::{no_reset_levels, CrossReferenceResolver, HeaderFormats};
use crate::options::ProcessingOptions;
use crate::pipeline::{PipelineContext, StepError, StepProcessor};
use crate::template::Metadata;

/// Resolves `|key|` references. The header keys found are stored under
/// `_cross_references` for later steps and exporters.
#[derive(Debug, Default, Clone, Copy)]
pub struct CrossReferencesStep;

impl StepProcessor for CrossReferencesStep {
    fn process(
        &self,
        content: &str,
        metadata: &mut Metadata,
        ctx: &PipelineContext,
    ) -> Result<String, StepError> {
        let formats = HeaderFormats::from_metadata(metadata, &ctx.header_formats);
        let resolver = CrossReferenceResolver::new(formats, no_reset_levels(metadata))
            .with_tracker(ctx.active_tracker())
            .with_highlight(ctx.options.highlights_fields());

        let (out, keys) = resolver.process_with_keys(content, metadata);

        if !keys.is_empty() {
            debug!("Resolved {} header key(s)", keys.len());
            let refs: Vec<Value> = keys
                .iter()
                .map(|(key, number)| json!({ "key": key, "number": number }))
                .collect();
            metadata.insert("_cross_references".to_string(), Value::Array(refs));
        }
        Ok(out)
    }

    fn is_enabled(&self, options: &ProcessingOptions) -> bool {
        !options.no_references
    }
}
