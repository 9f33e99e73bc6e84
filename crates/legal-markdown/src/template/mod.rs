//! Template expansion: the expression language, the helper library, the
//! mixin engine and the loop engine with its two dialects.

pub mod blocks;
pub mod context;
pub mod dialect;
pub mod expr;
pub mod hbs;
pub mod helpers;
pub mod loops;
pub mod mixins;
pub mod value;

use crate::tracking::FieldTracker;

pub use context::LoopContext;
pub use dialect::{detect_dialect, Dialect, DialectReport, MigrationHint};
pub use helpers::{HelperEnv, HelperRegistry};
pub use loops::LoopEngine;
pub use mixins::{MixinNode, MixinProcessor, NodeKind};
pub use value::Metadata;

/// Everything a resolver needs besides the metadata itself.
#[derive(Clone, Copy)]
pub struct RenderContext<'a> {
    pub helpers: &'a HelperRegistry,
    pub env: HelperEnv,
    /// Records every resolution when present.
    pub tracker: Option<&'a FieldTracker>,
    /// Wrap resolved and missing values in highlighting spans.
    pub highlight: bool,
}

impl<'a> RenderContext<'a> {
    pub fn new(helpers: &'a HelperRegistry, env: HelperEnv) -> Self {
        Self {
            helpers,
            env,
            tracker: None,
            highlight: false,
        }
    }

    pub fn with_tracker(mut self, tracker: &'a FieldTracker) -> Self {
        self.tracker = Some(tracker);
        self
    }

    pub fn with_highlight(mut self, highlight: bool) -> Self {
        self.highlight = highlight;
        self
    }

    pub fn evaluator(&self) -> expr::Evaluator<'a> {
        expr::Evaluator::new(self.helpers, self.env)
    }
}
