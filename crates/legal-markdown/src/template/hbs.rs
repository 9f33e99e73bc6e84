//! Handlebars dialect, rendered by the `handlebars` crate with the helper
//! registry bridged in.

use std::sync::OnceLock;

use ::handlebars::{Context, Handlebars, Helper, HelperDef, RenderError, ScopedJson};
use regex::{Captures, Regex};
use serde_json::Value;

use super::blocks::{scan_blocks, BlockKind};
use super::dialect::{DialectError, TemplateDialect};
use super::expr::parse;
use super::helpers::{HelperEnv, HelperFn, HelperRegistry};
use super::value::{get_path, is_placeholder, to_display, Metadata};
use super::RenderContext;
use crate::tracking::{highlight_span, FieldStatus, FieldTracker, MixinKind};

const SENTINEL_OPEN: char = '\u{E000}';
const SENTINEL_CLOSE: char = '\u{E001}';

/// Internal helper every plain field path inside a block is routed through.
const FIELD_HELPER: &str = "lmField";

/// Exposes one registry helper to Handlebars. Returning a derived value
/// lets it work both inline and as a subexpression.
struct BridgedHelper {
    helper: HelperFn,
    env: HelperEnv,
}

impl HelperDef for BridgedHelper {
    fn call_inner<'reg: 'rc, 'rc>(
        &self,
        h: &Helper<'rc>,
        _: &'reg Handlebars<'reg>,
        _: &'rc Context,
        _: &mut ::handlebars::RenderContext<'reg, 'rc>,
    ) -> Result<ScopedJson<'rc>, RenderError> {
        let args: Vec<Value> = h.params().iter().map(|p| p.value().clone()).collect();
        let value = (self.helper)(&args, &self.env).unwrap_or(Value::Null);
        Ok(ScopedJson::Derived(value))
    }
}

/// Renders one field path the way the mixin engine does: the value when
/// present, the original `{{path}}` when missing. Tracks and highlights
/// when the run asks for it.
struct FieldHelper {
    tracker: Option<FieldTracker>,
    highlight: bool,
}

impl HelperDef for FieldHelper {
    fn call_inner<'reg: 'rc, 'rc>(
        &self,
        h: &Helper<'rc>,
        _: &'reg Handlebars<'reg>,
        _: &'rc Context,
        _: &mut ::handlebars::RenderContext<'reg, 'rc>,
    ) -> Result<ScopedJson<'rc>, RenderError> {
        let field = h
            .param(0)
            .and_then(|p| p.value().as_str())
            .unwrap_or_default()
            .to_string();
        let value = h
            .param(1)
            .map(|p| p.value().clone())
            .filter(|v| !v.is_null() && !is_placeholder(v));

        if let Some(tracker) = &self.tracker {
            tracker.track(&field, value.as_ref(), false, MixinKind::Variable);
        }
        let original = format!("{{{{{}}}}}", field);
        let status = FieldTracker::status_for(value.as_ref(), false);
        let text = match (&value, self.highlight) {
            (Some(value), false) => to_display(value),
            (None, false) => original,
            (Some(value), true) => highlight_span(&field, status, &to_display(value)),
            (None, true) => highlight_span(&field, FieldStatus::Empty, &original),
        };
        Ok(ScopedJson::Derived(Value::String(text)))
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct HandlebarsDialect;

impl TemplateDialect for HandlebarsDialect {
    fn name(&self) -> &'static str {
        "handlebars"
    }

    fn render(
        &self,
        content: &str,
        metadata: &Metadata,
        ctx: &RenderContext<'_>,
    ) -> Result<String, DialectError> {
        track_loops(content, metadata, ctx);

        let (template, protected) = protect_inline_mixins(content);
        let template = rewrite_loop_vars(&template, None);
        let template = route_field_paths(&template, ctx.helpers);

        let mut registry = Handlebars::new();
        registry.register_escape_fn(::handlebars::no_escape);
        registry.set_strict_mode(false);
        registry.register_helper(
            FIELD_HELPER,
            Box::new(FieldHelper {
                tracker: ctx.tracker.cloned(),
                highlight: ctx.highlight,
            }),
        );
        for name in ctx.helpers.names() {
            if let Some(helper) = ctx.helpers.get(name) {
                registry.register_helper(
                    name,
                    Box::new(BridgedHelper {
                        helper,
                        env: ctx.env,
                    }),
                );
            }
        }

        let data = Value::Object(metadata.clone());
        let rendered = registry
            .render_template(&template, &data)
            .map_err(|e| DialectError::Render(e.to_string()))?;
        Ok(restore_inline_mixins(&rendered, &protected))
    }
}

fn mustache_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\{\{([^{}]*)\}\}").expect("valid mustache regex"))
}

fn sentinel_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new("\u{E000}(\\d+)\u{E001}").expect("valid sentinel regex"))
}

fn field_path_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(?:\.\./)*[A-Za-z_]\w*(?:\.\w+)*$").expect("valid field path regex")
    })
}

/// Rewrites `{{path}}` into `{{lmField "path" path}}` so unresolved paths
/// keep their source text instead of rendering empty. Helper names,
/// `this`, `else`, loop variables and triple-stash output are left alone.
fn route_field_paths(template: &str, helpers: &HelperRegistry) -> String {
    mustache_regex()
        .replace_all(template, |caps: &Captures| {
            let whole = &caps[0];
            let inner = caps[1].trim();
            let triple = caps
                .get(0)
                .map(|m| template[..m.start()].ends_with('{'))
                .unwrap_or(false);
            let first = inner.trim_start_matches("../").split('.').next().unwrap_or_default();
            let plain = field_path_regex().is_match(inner)
                && inner != "this"
                && inner != "else"
                && helpers.get(first).is_none();
            if triple || !plain {
                return whole.to_string();
            }
            format!("{{{{{} \"{}\" {}}}}}", FIELD_HELPER, inner, inner)
        })
        .into_owned()
}

fn track_loops(content: &str, metadata: &Metadata, ctx: &RenderContext<'_>) {
    let Some(tracker) = ctx.tracker else { return };
    for block in scan_blocks(content).blocks {
        if let BlockKind::Each(path) | BlockKind::Section(path) = &block.kind {
            tracker.track(path, get_path(metadata, path), false, MixinKind::Loop);
        }
    }
}

/// Swaps top-level mixins the document-level engine understands for
/// sentinels, so they keep their source text when unresolved and are
/// tracked by the mixin pass.
fn protect_inline_mixins(content: &str) -> (String, Vec<String>) {
    let scan = scan_blocks(content);
    let mut protected = Vec::new();
    let mut out = String::with_capacity(content.len());
    let mut last = 0;

    let mut protect = |text: &str, out: &mut String| {
        let replaced = mustache_regex().replace_all(text, |caps: &Captures| {
            let inner = caps[1].trim();
            let skip = inner.starts_with(['#', '/', '@', '!']) || inner == "else" || inner == "this";
            if skip || parse(inner).is_err() {
                return caps[0].to_string();
            }
            protected.push(caps[0].to_string());
            format!("{}{}{}", SENTINEL_OPEN, protected.len() - 1, SENTINEL_CLOSE)
        });
        out.push_str(&replaced);
    };

    for block in &scan.blocks {
        protect(&content[last..block.span.start], &mut out);
        out.push_str(&content[block.span.clone()]);
        last = block.span.end;
    }
    protect(&content[last..], &mut out);
    (out, protected)
}

fn restore_inline_mixins(rendered: &str, protected: &[String]) -> String {
    sentinel_regex()
        .replace_all(rendered, |caps: &Captures| {
            caps[1]
                .parse::<usize>()
                .ok()
                .and_then(|i| protected.get(i))
                .cloned()
                .unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}

/// Rewrites `@total` and `@parent` into forms Handlebars understands:
/// `(len ../items)` and `../field`.
fn rewrite_loop_vars(content: &str, path: Option<&str>) -> String {
    let scan = scan_blocks(content);
    let mut out = String::with_capacity(content.len());
    let mut last = 0;

    for block in &scan.blocks {
        out.push_str(&rewrite_mustaches(&content[last..block.span.start], path));
        out.push_str(&rewrite_mustaches(
            &content[block.span.start..block.body.start],
            path,
        ));
        let body = &content[block.body.clone()];
        match &block.kind {
            BlockKind::Each(inner) => out.push_str(&rewrite_loop_vars(body, Some(inner))),
            _ => out.push_str(&rewrite_loop_vars(body, path)),
        }
        out.push_str(&content[block.body.end..block.span.end]);
        last = block.span.end;
    }
    out.push_str(&rewrite_mustaches(&content[last..], path));
    out
}

fn rewrite_mustaches(text: &str, path: Option<&str>) -> String {
    let Some(path) = path else {
        return text.to_string();
    };
    mustache_regex()
        .replace_all(text, |caps: &Captures| {
            let whole = &caps[0];
            if !whole.contains("@total") && !whole.contains("@parent") {
                return whole.to_string();
            }
            if caps[1].trim() == "@total" {
                return format!("{{{{len ../{}}}}}", path);
            }
            whole
                .replace("@total", &format!("(len ../{})", path))
                .replace("@parent.", "../")
                .replace("@parent", "..")
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::HelperRegistry;
    use crate::tracking::FieldTracker;
    use chrono::NaiveDate;
    use serde_json::json;

    fn meta(value: Value) -> Metadata {
        value.as_object().cloned().unwrap()
    }

    fn render(content: &str, metadata: &Metadata) -> String {
        let helpers = HelperRegistry::with_builtins();
        let ctx = RenderContext::new(
            &helpers,
            HelperEnv::new(NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()),
        );
        HandlebarsDialect.render(content, metadata, &ctx).unwrap()
    }

    #[test]
    fn test_each_with_loop_variables() {
        let m = meta(json!({"items": [{"name": "a"}, {"name": "b"}]}));
        let out = render(
            "{{#each items}}{{@index}}/{{@total}}:{{name}}{{#if @last}}.{{else}}, {{/if}}{{/each}}",
            &m,
        );
        assert_eq!(out, "0/2:a, 1/2:b.");
    }

    #[test]
    fn test_empty_array_renders_nothing() {
        let m = meta(json!({"items": []}));
        assert_eq!(render("{{#each items}}X{{/each}}", &m), "");
    }

    #[test]
    fn test_registry_helpers_are_bridged() {
        let m = meta(json!({"amount": 1234.5, "qty": 2, "price": 5}));
        assert_eq!(
            render(r#"{{formatCurrency amount "EUR"}}"#, &m),
            "€1,234.50"
        );
        assert_eq!(
            render(r#"{{formatCurrency (multiply qty price) "USD"}}"#, &m),
            "$10.00"
        );
    }

    #[test]
    fn test_top_level_mixins_keep_source_when_missing() {
        let m = meta(json!({"items": [{"name": "a"}]}));
        assert_eq!(
            render("Client: {{client}} {{#each items}}{{name}}{{/each}}", &m),
            "Client: {{client}} a"
        );
    }

    #[test]
    fn test_values_are_not_html_escaped() {
        let m = meta(json!({"items": ["<b>&</b>"]}));
        assert_eq!(render("{{#each items}}{{this}}{{/each}}", &m), "<b>&</b>");
    }

    #[test]
    fn test_rewrite_loop_vars() {
        assert_eq!(
            rewrite_loop_vars("{{#each rows}}{{@total}} {{@parent.title}}{{/each}}", None),
            "{{#each rows}}{{len ../rows}} {{../title}}{{/each}}"
        );
    }

    #[test]
    fn test_unresolved_loop_fields_stay_visible() {
        let m = meta(json!({"items": [{"name": "A"}, {"name": "[NAME]"}]}));
        assert_eq!(
            render("{{#each items}}[{{name}}|{{missing_field}}]{{/each}}", &m),
            "[A|{{missing_field}}][{{name}}|{{missing_field}}]"
        );
    }

    #[test]
    fn test_loop_fields_are_tracked_and_highlighted() {
        let helpers = HelperRegistry::with_builtins();
        let tracker = FieldTracker::new();
        let ctx = RenderContext::new(&helpers, HelperEnv::from_clock())
            .with_tracker(&tracker)
            .with_highlight(true);
        let m = meta(json!({"items": [{"name": "A"}]}));
        let out = HandlebarsDialect
            .render("{{#each items}}{{name}} {{missing}}{{/each}}", &m, &ctx)
            .unwrap();
        assert_eq!(
            out,
            concat!(
                r#"<span class="legal-field imported-value" data-field="name">A</span> "#,
                r#"<span class="legal-field missing-value" data-field="missing">{{missing}}</span>"#
            )
        );
        assert_eq!(tracker.get("name").unwrap().status, FieldStatus::Filled);
        assert_eq!(tracker.get("missing").unwrap().status, FieldStatus::Empty);
    }

    #[test]
    fn test_route_field_paths() {
        let helpers = HelperRegistry::with_builtins();
        assert_eq!(
            route_field_paths("{{name}} {{../title}} {{this}} {{@index}} {{upper name}} {{{raw}}}", &helpers),
            r#"{{lmField "name" name}} {{lmField "../title" ../title}} {{this}} {{@index}} {{upper name}} {{{raw}}}"#
        );
    }

    #[test]
    fn test_loops_are_tracked() {
        let helpers = HelperRegistry::with_builtins();
        let tracker = FieldTracker::new();
        let ctx = RenderContext::new(&helpers, HelperEnv::from_clock()).with_tracker(&tracker);
        let m = meta(json!({"items": [1]}));
        HandlebarsDialect
            .render("{{#each items}}{{this}}{{/each}}", &m, &ctx)
            .unwrap();
        assert_eq!(tracker.get("items").unwrap().mixin_used, MixinKind::Loop);
    }
}
