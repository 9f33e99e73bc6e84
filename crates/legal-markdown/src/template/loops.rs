//! Loop and conditional block expansion.
//!
//! The legacy expander walks the outermost blocks of a region, expands
//! each one recursively and, inside an iteration, substitutes the
//! remaining inline mixins against the per-iteration metadata.

use std::sync::OnceLock;

use regex::{Captures, Regex};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use super::blocks::{scan_blocks, Block, BlockKind};
use super::context::LoopContext;
use super::dialect::{detect_dialect, Dialect, MigrationHint, TemplateDialect};
use super::expr::Scope;
use super::hbs::HandlebarsDialect;
use super::mixins::{resolve_expression, NodeKind};
use super::value::{is_truthy, Metadata};
use super::RenderContext;
use crate::tracking::MixinKind;

/// Result of a loop pass.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LoopOutput {
    pub content: String,
    pub dialect: Dialect,
    pub hints: Vec<MigrationHint>,
    pub warnings: Vec<String>,
}

/// The built-in block syntax.
#[derive(Debug, Default, Clone, Copy)]
pub struct LegacyDialect {
    pub list_items_as_html: bool,
}

impl TemplateDialect for LegacyDialect {
    fn name(&self) -> &'static str {
        "legacy"
    }

    fn render(
        &self,
        content: &str,
        metadata: &Metadata,
        ctx: &RenderContext<'_>,
    ) -> Result<String, super::dialect::DialectError> {
        Ok(self.expand(content, metadata, None, ctx))
    }
}

fn inline_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\{\{\s*([^{}#/!\s][^{}]*?)\s*\}\}").expect("valid inline regex"))
}

impl LegacyDialect {
    /// Expands every block in `content`. With a loop context the text
    /// between blocks also has its inline mixins resolved.
    pub fn expand(
        &self,
        content: &str,
        metadata: &Metadata,
        loop_ctx: Option<&LoopContext<'_>>,
        ctx: &RenderContext<'_>,
    ) -> String {
        let scan = scan_blocks(content);
        if scan.blocks.is_empty() {
            return self.substitute(content, metadata, loop_ctx, ctx);
        }

        // back to front so earlier offsets stay valid
        let mut pieces = Vec::with_capacity(scan.blocks.len() * 2 + 1);
        let mut end = content.len();
        for block in scan.blocks.iter().rev() {
            pieces.push(self.substitute(&content[block.span.end..end], metadata, loop_ctx, ctx));
            pieces.push(self.expand_block(content, block, metadata, loop_ctx, ctx));
            end = block.span.start;
        }
        pieces.push(self.substitute(&content[..end], metadata, loop_ctx, ctx));
        pieces.reverse();
        pieces.concat()
    }

    fn expand_block(
        &self,
        content: &str,
        block: &Block,
        metadata: &Metadata,
        loop_ctx: Option<&LoopContext<'_>>,
        ctx: &RenderContext<'_>,
    ) -> String {
        let (then, otherwise) = block.branches(content);
        let scope = Scope::with_loop(metadata, loop_ctx);

        match &block.kind {
            BlockKind::If(condition) | BlockKind::Unless(condition) => {
                let result = ctx.evaluator().test(condition, scope);
                if let Some(tracker) = ctx.tracker {
                    tracker.track(condition, Some(&Value::Bool(result)), true, MixinKind::Conditional);
                }
                let passed = result != matches!(block.kind, BlockKind::Unless(_));
                match (passed, otherwise) {
                    (true, _) => self.expand(then, metadata, loop_ctx, ctx),
                    (false, Some(otherwise)) => self.expand(otherwise, metadata, loop_ctx, ctx),
                    (false, None) => String::new(),
                }
            }
            BlockKind::Each(path) | BlockKind::Section(path) => {
                let value = ctx.evaluator().eval_str(path, scope);
                if let Some(tracker) = ctx.tracker {
                    tracker.track(path, value.as_ref(), false, MixinKind::Loop);
                }
                match value {
                    Some(Value::Array(items)) if !items.is_empty() => {
                        let total = items.len();
                        let rendered: String = items
                            .into_iter()
                            .enumerate()
                            .map(|(index, item)| {
                                let child = LoopContext::new(path.as_str(), item, index, total, loop_ctx);
                                self.iterate(then, metadata, &child, ctx)
                            })
                            .collect();
                        self.list_items(rendered)
                    }
                    Some(value) if is_truthy(Some(&value)) => {
                        let child = LoopContext::new(path.as_str(), value, 0, 1, loop_ctx);
                        self.list_items(self.iterate(then, metadata, &child, ctx))
                    }
                    _ => match otherwise {
                        Some(otherwise) => self.expand(otherwise, metadata, loop_ctx, ctx),
                        None => String::new(),
                    },
                }
            }
        }
    }

    fn iterate(
        &self,
        body: &str,
        metadata: &Metadata,
        child: &LoopContext<'_>,
        ctx: &RenderContext<'_>,
    ) -> String {
        let enhanced = enhanced_metadata(metadata, child);
        self.expand(body, &enhanced, Some(child), ctx)
    }

    /// Single-pass inline substitution. Outside loops the text is left for
    /// the document-level mixin pass.
    fn substitute(
        &self,
        text: &str,
        metadata: &Metadata,
        loop_ctx: Option<&LoopContext<'_>>,
        ctx: &RenderContext<'_>,
    ) -> String {
        if loop_ctx.is_none() || !text.contains("{{") {
            return text.to_string();
        }
        let scope = Scope::with_loop(metadata, loop_ctx);
        inline_regex()
            .replace_all(text, |caps: &Captures| {
                let expression = caps[1].trim();
                if expression == "else" {
                    return caps[0].to_string();
                }
                let resolution =
                    resolve_expression(expression, NodeKind::classify(expression), scope, ctx);
                resolution.record(ctx);
                resolution.render(&caps[0], ctx)
            })
            .into_owned()
    }

    fn list_items(&self, rendered: String) -> String {
        if !self.list_items_as_html {
            return rendered;
        }
        rendered
            .split('\n')
            .map(|line| match line.strip_prefix("- ") {
                Some(item) => format!("<li>{}</li>", item),
                None => line.to_string(),
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Metadata seen by one iteration: the outer metadata, the item's own keys
/// when it is an object, and the loop variables.
fn enhanced_metadata(metadata: &Metadata, child: &LoopContext<'_>) -> Metadata {
    let mut enhanced = metadata.clone();
    if let Value::Object(fields) = &child.item {
        for (key, value) in fields {
            enhanced.insert(key.clone(), value.clone());
        }
    }
    enhanced.insert(".".to_string(), child.item.clone());
    enhanced.insert("@index".to_string(), Value::from(child.index));
    enhanced.insert("@total".to_string(), Value::from(child.total));
    enhanced.insert("@first".to_string(), Value::Bool(child.is_first()));
    enhanced.insert("@last".to_string(), Value::Bool(child.is_last()));
    enhanced
}

/// Picks a dialect per document and runs it.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoopEngine {
    legacy: LegacyDialect,
    handlebars: HandlebarsDialect,
}

impl LoopEngine {
    pub fn new(list_items_as_html: bool) -> Self {
        Self {
            legacy: LegacyDialect { list_items_as_html },
            handlebars: HandlebarsDialect,
        }
    }

    pub fn process(&self, content: &str, metadata: &Metadata, ctx: &RenderContext<'_>) -> LoopOutput {
        let report = detect_dialect(content);
        let mut warnings = Vec::new();

        if !report.hints.is_empty() {
            let message = format!(
                "{} legacy template construct(s) found: {}",
                report.hints.len(),
                report.summary()
            );
            warn!("{}", message);
            warnings.push(message);
        }

        let unmatched = scan_blocks(content).unmatched;
        if !unmatched.is_empty() {
            let message = format!("Unmatched block tag(s) left verbatim: {}", unmatched.join(", "));
            warn!("{}", message);
            warnings.push(message);
        }

        let content = match report.dialect {
            Dialect::Handlebars => match self.handlebars.render(content, metadata, ctx) {
                Ok(rendered) => rendered,
                Err(e) => {
                    let message = format!("{}; falling back to legacy processing", e);
                    warn!("{}", message);
                    warnings.push(message);
                    self.legacy.expand(content, metadata, None, ctx)
                }
            },
            Dialect::Mixed => {
                let message =
                    "Mixed legacy and Handlebars syntax; processing as legacy".to_string();
                warn!("{}", message);
                warnings.push(message);
                self.legacy.expand(content, metadata, None, ctx)
            }
            Dialect::Legacy | Dialect::None => {
                debug!("Expanding {} dialect blocks", self.legacy.name());
                self.legacy.expand(content, metadata, None, ctx)
            }
        };

        LoopOutput {
            content,
            dialect: report.dialect,
            hints: report.hints,
            warnings,
        }
    }
}
