use std::sync::OnceLock;

use regex::{Captures, Regex};
use serde_json::Value;

use crate::options::ProcessingOptions;
use crate::pipeline::{PipelineContext, StepError, StepProcessor};
use crate::template::expr::Scope;
use crate::template::Metadata;
use crate::tracking::{highlight_span, FieldStatus, MixinKind};

fn clause_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\[([^\[\]]*)\]\{([^{}]+)\}").expect("clause pattern is valid")
    })
}

/// `[text]{condition}`: keeps `text` when the condition holds.
#[derive(Debug, Default, Clone, Copy)]
pub struct ClausesStep;

impl StepProcessor for ClausesStep {
    fn process(
        &self,
        content: &str,
        metadata: &mut Metadata,
        ctx: &PipelineContext,
    ) -> Result<String, StepError> {
        let render = ctx.render_context(metadata);
        let evaluator = render.evaluator();
        let scope = Scope::new(metadata);

        let out = clause_regex().replace_all(content, |caps: &Captures| {
            let text = &caps[1];
            let condition = caps[2].trim();
            let keep = evaluator.test(condition, scope);

            let field = format!("clause.{}", condition);
            if let Some(tracker) = render.tracker {
                tracker.track(&field, Some(&Value::Bool(keep)), true, MixinKind::Clause);
            }
            match (keep, render.highlight) {
                (false, _) => String::new(),
                (true, false) => text.to_string(),
                (true, true) => highlight_span(&field, FieldStatus::Logic, text),
            }
        });
        Ok(out.into_owned())
    }

    fn is_enabled(&self, options: &ProcessingOptions) -> bool {
        !options.no_clauses
    }
}
