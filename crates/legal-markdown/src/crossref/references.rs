use std::collections::BTreeMap;
use std::sync::OnceLock;

use regex::{Captures, Regex};
use serde_json::Value;
use tracing::debug;

use super::headers::{number_headers, parse_header_line, HeaderFormats, NumberedHeader};
use crate::template::helpers::{format_currency, parse_date};
use crate::template::value::{get_path, to_display, Metadata};
use crate::tracking::{highlight_span, FieldStatus, FieldTracker, MixinKind};

const CURRENCY_HINTS: [&str; 6] = ["amount", "price", "fee", "cost", "salary", "payment"];

fn reference_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\|([A-Za-z_][\w.-]*)\|").expect("valid reference regex"))
}

/// Where a reference was resolved from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReferenceSource {
    Header,
    Metadata,
    Unresolved,
}

/// Two-pass `|key|` resolution: header keys first, then metadata paths.
#[derive(Debug, Clone)]
pub struct CrossReferenceResolver<'a> {
    formats: HeaderFormats,
    no_reset: Vec<usize>,
    tracker: Option<&'a FieldTracker>,
    highlight: bool,
}

impl<'a> CrossReferenceResolver<'a> {
    pub fn new(formats: HeaderFormats, no_reset: Vec<usize>) -> Self {
        Self {
            formats,
            no_reset,
            tracker: None,
            highlight: false,
        }
    }

    pub fn with_tracker(mut self, tracker: Option<&'a FieldTracker>) -> Self {
        self.tracker = tracker;
        self
    }

    pub fn with_highlight(mut self, highlight: bool) -> Self {
        self.highlight = highlight;
        self
    }

    /// Pass 1: numbering string for every keyed header.
    pub fn collect(&self, content: &str) -> (Vec<NumberedHeader>, BTreeMap<String, String>) {
        let headers = number_headers(content, &self.formats, &self.no_reset);
        let keys = headers
            .iter()
            .filter_map(|h| h.key.as_ref().map(|k| (k.clone(), h.number.clone())))
            .collect();
        (headers, keys)
    }

    /// Runs both passes over `content`.
    pub fn process(&self, content: &str, metadata: &Metadata) -> String {
        self.process_with_keys(content, metadata).0
    }

    /// Like [`process`](Self::process), also returning the header keys
    /// found by the collection pass.
    pub fn process_with_keys(
        &self,
        content: &str,
        metadata: &Metadata,
    ) -> (String, BTreeMap<String, String>) {
        let (_, keys) = self.collect(content);
        debug!("Collected {} header reference(s)", keys.len());

        let out = content
            .split('\n')
            .map(|line| match parse_header_line(line).and_then(|h| h.key) {
                // leave the defining marker for the header pass
                Some(key) => {
                    let marker = format!("|{}|", key);
                    match line.rfind(&marker) {
                        Some(pos) => format!(
                            "{}{}",
                            self.resolve_line(&line[..pos], &keys, metadata),
                            &line[pos..]
                        ),
                        None => line.to_string(),
                    }
                }
                None => self.resolve_line(line, &keys, metadata),
            })
            .collect::<Vec<_>>()
            .join("\n");
        (out, keys)
    }

    fn resolve_line(&self, line: &str, keys: &BTreeMap<String, String>, metadata: &Metadata) -> String {
        if !line.contains('|') {
            return line.to_string();
        }
        reference_regex()
            .replace_all(line, |caps: &Captures| {
                let key = &caps[1];
                let (text, source) = resolve_key(key, keys, metadata);
                self.record(key, text.as_deref(), &source);
                match (text, self.highlight) {
                    (Some(text), false) => text,
                    (Some(text), true) => {
                        let status = match source {
                            ReferenceSource::Header => FieldStatus::Logic,
                            _ => FieldStatus::Filled,
                        };
                        highlight_span(&format!("crossref.{}", key), status, &text)
                    }
                    (None, _) => caps[0].to_string(),
                }
            })
            .into_owned()
    }

    fn record(&self, key: &str, text: Option<&str>, source: &ReferenceSource) {
        let Some(tracker) = self.tracker else { return };
        let value = text.map(|t| Value::String(t.to_string()));
        tracker.track(
            &format!("crossref.{}", key),
            value.as_ref(),
            *source == ReferenceSource::Header,
            MixinKind::CrossReference,
        );
    }
}

/// Header key, then metadata path, else unresolved.
pub fn resolve_key(
    key: &str,
    keys: &BTreeMap<String, String>,
    metadata: &Metadata,
) -> (Option<String>, ReferenceSource) {
    if let Some(number) = keys.get(key) {
        return (Some(number.clone()), ReferenceSource::Header);
    }
    match get_path(metadata, key) {
        Some(value) if !value.is_null() => (
            Some(format_reference_value(key, value, metadata)),
            ReferenceSource::Metadata,
        ),
        _ => (None, ReferenceSource::Unresolved),
    }
}

/// Dates become `YYYY-MM-DD`; numbers under money-like keys become
/// currency in the document's `payment_currency`/`currency` (USD default).
pub fn format_reference_value(key: &str, value: &Value, metadata: &Metadata) -> String {
    if let Value::String(s) = value {
        if s.contains('-') || s.contains('/') {
            if let Some(date) = parse_date(value) {
                return date.format("%Y-%m-%d").to_string();
            }
        }
    }
    if let Value::Number(n) = value {
        let lowered = key.to_lowercase();
        if CURRENCY_HINTS.iter().any(|hint| lowered.contains(hint)) {
            if let Some(amount) = n.as_f64() {
                let currency = metadata
                    .get("payment_currency")
                    .or_else(|| metadata.get("currency"))
                    .and_then(Value::as_str)
                    .unwrap_or("USD");
                return format_currency(amount, currency, 2);
            }
        }
    }
    to_display(value)
}
