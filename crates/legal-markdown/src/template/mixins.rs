//! Mixin engine: `{{...}}` occurrences are parsed into a flat node list,
//! each node is resolved on its own and the content is reassembled. A
//! substituted value is never scanned again, so metadata containing `{{`
//! comes out literally.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::time::Duration;

use moka::sync::Cache;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use super::blocks::scan_blocks;
use super::expr::{parse, Scope, VarKind};
use super::value::{is_placeholder, lookup_in, to_display, Metadata};
use super::RenderContext;
use crate::tracking::{highlight_span, FieldStatus, FieldTracker, MixinKind};

const CACHE_CAPACITY: u64 = 100;
const CACHE_TTL: Duration = Duration::from_secs(300);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    Text,
    Variable,
    Helper,
    Conditional,
}

impl NodeKind {
    /// Classifies the interior of a `{{...}}` region.
    pub fn classify(expression: &str) -> Self {
        if expression.contains('?') && expression.contains(':') {
            NodeKind::Conditional
        } else if expression.contains('(') && expression.contains(')') {
            NodeKind::Helper
        } else {
            NodeKind::Variable
        }
    }

    fn mixin_kind(self) -> MixinKind {
        match self {
            NodeKind::Helper => MixinKind::Helper,
            NodeKind::Conditional => MixinKind::Conditional,
            NodeKind::Text | NodeKind::Variable => MixinKind::Variable,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Position {
    pub start: usize,
    pub end: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MixinNode {
    pub kind: NodeKind,
    /// Raw source span, braces included.
    pub content: String,
    /// Expression between the braces, trimmed.
    pub variable: Option<String>,
    pub position: Position,
    pub resolved: Option<Value>,
    pub has_error: bool,
}

impl MixinNode {
    fn text(content: &str, start: usize) -> Self {
        Self {
            kind: NodeKind::Text,
            content: content.to_string(),
            variable: None,
            position: Position {
                start,
                end: start + content.len(),
            },
            resolved: None,
            has_error: false,
        }
    }

    fn expression(content: &str, start: usize) -> Self {
        let inner = content
            .strip_prefix("{{")
            .and_then(|s| s.strip_suffix("}}"))
            .unwrap_or_default()
            .trim();
        Self {
            kind: NodeKind::classify(inner),
            content: content.to_string(),
            variable: Some(inner.to_string()),
            position: Position {
                start,
                end: start + content.len(),
            },
            resolved: None,
            has_error: inner.is_empty(),
        }
    }

    fn malformed(content: &str, start: usize) -> Self {
        Self {
            has_error: true,
            ..Self::text(content, start)
        }
    }
}

/// Outcome of resolving one expression, shared with the loop engine's
/// inline substitution.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Resolution {
    pub field: String,
    /// `None` when missing, null or a bracketed placeholder.
    pub value: Option<Value>,
    pub has_logic: bool,
    pub kind: MixinKind,
}

impl Resolution {
    /// Text written in place of `original`.
    pub fn render(&self, original: &str, ctx: &RenderContext<'_>) -> String {
        let status = FieldTracker::status_for(self.value.as_ref(), self.has_logic);
        match (&self.value, ctx.highlight) {
            (Some(value), false) => to_display(value),
            (None, false) => original.to_string(),
            (Some(value), true) => highlight_span(&self.field, status, &to_display(value)),
            (None, true) => highlight_span(&self.field, FieldStatus::Empty, original),
        }
    }

    pub fn record(&self, ctx: &RenderContext<'_>) {
        if let Some(tracker) = ctx.tracker {
            tracker.track(&self.field, self.value.as_ref(), self.has_logic, self.kind);
        }
    }
}

/// Resolves `expression` against `scope`.
pub(crate) fn resolve_expression(
    expression: &str,
    kind: NodeKind,
    scope: Scope<'_>,
    ctx: &RenderContext<'_>,
) -> Resolution {
    let parsed = parse(expression);
    let (field, has_logic, placeholder_source) = match &parsed {
        Ok(expr) => {
            let primary = expr.primary_variable();
            let field = match (kind, primary) {
                (NodeKind::Variable, _) | (_, None) => expression.to_string(),
                (_, Some(var)) => var.raw.clone(),
            };
            let source = primary.and_then(|var| match &var.kind {
                VarKind::Meta(segments) => lookup_in(scope.metadata, segments).cloned(),
                _ => None,
            });
            (field, expr.has_logic(), source)
        }
        Err(e) => {
            debug!("Mixin '{}' did not parse: {}", expression, e);
            (expression.to_string(), kind != NodeKind::Variable, None)
        }
    };

    let value = parsed
        .ok()
        .and_then(|expr| ctx.evaluator().eval(&expr, scope))
        .filter(|v| !v.is_null() && !is_placeholder(v))
        .filter(|_| !placeholder_source.as_ref().map(is_placeholder).unwrap_or(false));

    Resolution {
        field,
        value,
        has_logic,
        kind: kind.mixin_kind(),
    }
}

struct ParsedTemplate {
    source: String,
    nodes: Vec<MixinNode>,
}

/// Document-level mixin pass with a bounded parse cache.
pub struct MixinProcessor {
    cache: Cache<u64, Arc<ParsedTemplate>>,
}

impl Default for MixinProcessor {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MixinProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MixinProcessor")
            .field("cached", &self.cache.entry_count())
            .finish()
    }
}

impl MixinProcessor {
    pub fn new() -> Self {
        Self {
            cache: Cache::builder()
                .max_capacity(CACHE_CAPACITY)
                .time_to_live(CACHE_TTL)
                .build(),
        }
    }

    /// Parses `content` into nodes. Cache hits hand back a fresh copy.
    pub fn parse(&self, content: &str) -> Vec<MixinNode> {
        let key = content_hash(content);
        if let Some(hit) = self.cache.get(&key) {
            if hit.source == content {
                return hit.nodes.clone();
            }
        }
        let nodes = parse_nodes(content);
        self.cache.insert(
            key,
            Arc::new(ParsedTemplate {
                source: content.to_string(),
                nodes: nodes.clone(),
            }),
        );
        nodes
    }

    pub fn clear_cache(&self) {
        self.cache.invalidate_all();
    }

    /// Resolves every mixin in `content` against `metadata`.
    pub fn process(&self, content: &str, metadata: &Metadata, ctx: &RenderContext<'_>) -> String {
        let mut nodes = self.parse(content);
        let scope = Scope::new(metadata);

        // resolve phase: each node sees only the metadata
        let mut resolutions = Vec::with_capacity(nodes.len());
        for node in nodes.iter_mut() {
            let resolution = match (&node.kind, &node.variable, node.has_error) {
                (NodeKind::Text, _, _) | (_, None, _) | (_, _, true) => None,
                (kind, Some(expression), false) => {
                    let r = resolve_expression(expression, *kind, scope, ctx);
                    node.resolved = r.value.clone();
                    r.record(ctx);
                    Some(r)
                }
            };
            resolutions.push(resolution);
        }

        let malformed = nodes.iter().filter(|n| n.has_error).count();
        if malformed > 0 {
            warn!("{} malformed mixin(s) left verbatim", malformed);
        }

        // serialize phase
        let mut out = String::with_capacity(content.len());
        for (node, resolution) in nodes.iter().zip(&resolutions) {
            match resolution {
                Some(r) => out.push_str(&r.render(&node.content, ctx)),
                None => out.push_str(&node.content),
            }
        }
        out
    }
}

fn content_hash(content: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    content.hash(&mut hasher);
    hasher.finish()
}

/// Splits content into text and expression nodes. Loop and conditional
/// blocks are left as text for the loop engine.
fn parse_nodes(content: &str) -> Vec<MixinNode> {
    let blocks = scan_blocks(content);
    let mut nodes = Vec::new();
    let mut text_start = 0;
    let mut cursor = 0;

    while let Some(rel) = content[cursor..].find("{{") {
        let open = cursor + rel;
        if let Some(block) = blocks.blocks.iter().find(|b| b.span.start == open) {
            cursor = block.span.end;
            continue;
        }

        let Some(close_rel) = content[open + 2..].find("}}") else {
            push_text(&mut nodes, content, text_start, open);
            nodes.push(MixinNode::malformed(&content[open..], open));
            text_start = content.len();
            break;
        };
        let close = open + 2 + close_rel + 2;
        let inner = &content[open + 2..close - 2];

        // `{{ a {{b}}` or a span across lines: the first braces are text
        if inner.contains("{{") || inner.contains('\n') {
            cursor = open + 2;
            continue;
        }
        let trimmed = inner.trim();
        if trimmed.starts_with('#')
            || trimmed.starts_with('/')
            || trimmed.starts_with('!')
            || trimmed == "else"
        {
            cursor = close;
            continue;
        }

        push_text(&mut nodes, content, text_start, open);
        nodes.push(MixinNode::expression(&content[open..close], open));
        text_start = close;
        cursor = close;
    }

    push_text(&mut nodes, content, text_start, content.len());
    nodes
}

fn push_text(nodes: &mut Vec<MixinNode>, content: &str, start: usize, end: usize) {
    if end > start {
        nodes.push(MixinNode::text(&content[start..end], start));
    }
}
