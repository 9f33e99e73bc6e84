//! Template dialect detection and migration hints.
//!
//! Two families share the `{{...}}` braces. Legacy documents call helpers
//! with parentheses and write arithmetic inline; Handlebars documents call
//! helpers with space separated arguments and iterate with `{{#each}}`.
//! `{{#if}}` blocks belong to both.

use std::sync::OnceLock;

use regex::Regex;
use serde::Serialize;
use thiserror::Error;

use super::value::Metadata;
use super::RenderContext;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    /// No dialect-specific syntax.
    None,
    Legacy,
    Handlebars,
    /// Both families; processed as legacy.
    Mixed,
}

/// One legacy construct with its Handlebars rewrite.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MigrationHint {
    /// 1-based source line.
    pub line: usize,
    pub original: String,
    pub suggestion: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DialectReport {
    pub dialect: Dialect,
    pub hints: Vec<MigrationHint>,
    pub handlebars_markers: usize,
}

impl DialectReport {
    /// One line per hint, for a single batched warning.
    pub fn summary(&self) -> String {
        self.hints
            .iter()
            .map(|h| format!("line {}: {} -> {}", h.line, h.original, h.suggestion))
            .collect::<Vec<_>>()
            .join("; ")
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DialectError {
    #[error("Template render failed: {0}")]
    Render(String),
}

/// A swappable template syntax.
pub trait TemplateDialect {
    fn name(&self) -> &'static str;

    fn render(
        &self,
        content: &str,
        metadata: &Metadata,
        ctx: &RenderContext<'_>,
    ) -> Result<String, DialectError>;
}

fn mustache_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\{\{~?([^{}]*?)~?\}\}").expect("valid mustache regex"))
}

fn legacy_call_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^([A-Za-z_][\w]*)\s*\((.*)\)$").expect("valid legacy call regex")
    })
}

fn handlebars_call_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"^[A-Za-z_][\w]*\s+[^\s?:()]"#).expect("valid handlebars call regex")
    })
}

/// Inspects every mustache in `content`.
pub fn detect_dialect(content: &str) -> DialectReport {
    let mut hints = Vec::new();
    let mut handlebars_markers = 0;

    for caps in mustache_regex().captures_iter(content) {
        let (Some(whole), Some(inner)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        let inner = inner.as_str().trim();
        let line = content[..whole.start()].matches('\n').count() + 1;

        if is_handlebars_marker(inner) {
            handlebars_markers += 1;
            continue;
        }
        if let Some(suggestion) = legacy_suggestion(inner) {
            hints.push(MigrationHint {
                line,
                original: whole.as_str().to_string(),
                suggestion: format!("{{{{{}}}}}", suggestion),
            });
        }
    }

    let dialect = match (hints.is_empty(), handlebars_markers == 0) {
        (true, true) => Dialect::None,
        (false, true) => Dialect::Legacy,
        (true, false) => Dialect::Handlebars,
        (false, false) => Dialect::Mixed,
    };
    DialectReport {
        dialect,
        hints,
        handlebars_markers,
    }
}

fn is_handlebars_marker(inner: &str) -> bool {
    if let Some(rest) = inner.strip_prefix('#') {
        let head = rest.split_whitespace().next().unwrap_or_default();
        return matches!(head, "each" | "unless" | "with");
    }
    if let Some(rest) = inner.strip_prefix('/') {
        return matches!(rest.trim(), "each" | "unless" | "with");
    }
    if inner == "else" || inner.contains('?') || has_operator(inner) {
        return false;
    }
    handlebars_call_regex().is_match(inner)
}

/// Handlebars rewrite of a legacy expression, or `None` when `inner` is
/// not legacy-specific.
fn legacy_suggestion(inner: &str) -> Option<String> {
    if inner.starts_with('#') || inner.starts_with('/') || inner.contains('?') {
        return None;
    }
    if let Some(caps) = legacy_call_regex().captures(inner) {
        let name = caps.get(1)?.as_str();
        let args = split_args(caps.get(2)?.as_str());
        return Some(if args.is_empty() {
            name.to_string()
        } else {
            format!("{} {}", name, args.join(" "))
        });
    }
    let (op, left, right) = split_operator(inner)?;
    let helper = match op {
        '*' => "multiply",
        '/' => "divide",
        '-' => "subtract",
        _ if is_quoted(left) || is_quoted(right) => "concat",
        _ => "add",
    };
    Some(format!("{} {} {}", helper, left, right))
}

fn is_quoted(s: &str) -> bool {
    s.len() >= 2
        && ((s.starts_with('"') && s.ends_with('"')) || (s.starts_with('\'') && s.ends_with('\'')))
}

/// Splits on commas outside quotes and parentheses.
fn split_args(args: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut current = String::new();
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    for c in args.chars() {
        match (quote, c) {
            (Some(q), _) if c == q => {
                quote = None;
                current.push(c);
            }
            (Some(_), _) => current.push(c),
            (None, '"' | '\'') => {
                quote = Some(c);
                current.push(c);
            }
            (None, '(') => {
                depth += 1;
                current.push(c);
            }
            (None, ')') => {
                depth = depth.saturating_sub(1);
                current.push(c);
            }
            (None, ',') if depth == 0 => {
                out.push(current.trim().to_string());
                current.clear();
            }
            _ => current.push(c),
        }
    }
    if !current.trim().is_empty() {
        out.push(current.trim().to_string());
    }
    out
}

fn has_operator(inner: &str) -> bool {
    split_operator(inner).is_some()
}

/// Finds the first binary arithmetic operator outside quotes. `-` only
/// counts with surrounding spaces so hyphenated names stay intact.
fn split_operator(inner: &str) -> Option<(char, &str, &str)> {
    let mut quote: Option<char> = None;
    let bytes = inner.as_bytes();
    for (i, c) in inner.char_indices() {
        match (quote, c) {
            (Some(q), _) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '"' | '\'') => quote = Some(c),
            (None, '*' | '+' | '/') if i > 0 => {
                let (left, right) = (inner[..i].trim(), inner[i + 1..].trim());
                if !left.is_empty() && !right.is_empty() && !left.ends_with('.') {
                    return Some((c, left, right));
                }
            }
            (None, '-') if i > 0 && bytes[i - 1] == b' ' && bytes.get(i + 1) == Some(&b' ') => {
                let (left, right) = (inner[..i].trim(), inner[i + 1..].trim());
                if !left.is_empty() && !right.is_empty() {
                    return Some((c, left, right));
                }
            }
            _ => {}
        }
    }
    None
}
