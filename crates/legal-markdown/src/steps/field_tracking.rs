use serde_json::json;
use tracing::info;

use crate::options::ProcessingOptions;
use crate::pipeline::{PipelineContext, StepError, StepProcessor};
use crate::template::Metadata;

/// Closes the run's field tracking: logs the counts and stores them under
/// `_field_tracking`. Content passes through.
#[derive(Debug, Default, Clone, Copy)]
pub struct FieldTrackingStep;

impl StepProcessor for FieldTrackingStep {
    fn process(
        &self,
        content: &str,
        metadata: &mut Metadata,
        ctx: &PipelineContext,
    ) -> Result<String, StepError> {
        let report = ctx.tracker.report();
        info!(
            total = report.total,
            filled = report.filled,
            empty = report.empty,
            logic = report.logic,
            "Field tracking complete"
        );
        metadata.insert(
            "_field_tracking".to_string(),
            json!({
                "total": report.total,
                "filled": report.filled,
                "empty": report.empty,
                "logic": report.logic,
            }),
        );
        Ok(content.to_string())
    }

    fn is_enabled(&self, options: &ProcessingOptions) -> bool {
        options.tracks_fields()
    }
}
