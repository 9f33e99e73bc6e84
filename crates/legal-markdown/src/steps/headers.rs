use crate::crossref::{no_reset_levels, number_headers, render_headers, HeaderFormats};
use crate::options::ProcessingOptions;
use crate::pipeline::{PipelineContext, StepError, StepProcessor};
use crate::template::Metadata;

/// Replaces `l.`/`ll.`/`l3.` markers with their numbering.
#[derive(Debug, Default, Clone, Copy)]
pub struct HeadersStep;

impl StepProcessor for HeadersStep {
    fn process(
        &self,
        content: &str,
        metadata: &mut Metadata,
        ctx: &PipelineContext,
    ) -> Result<String, StepError> {
        let formats = HeaderFormats::from_metadata(metadata, &ctx.header_formats);
        let headers = number_headers(content, &formats, &no_reset_levels(metadata));
        if headers.is_empty() {
            return Ok(content.to_string());
        }
        Ok(render_headers(content, &headers))
    }

    fn is_enabled(&self, options: &ProcessingOptions) -> bool {
        !options.no_headers
    }
}
