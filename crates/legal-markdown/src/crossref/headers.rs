use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::counters::{HeaderCounters, MAX_LEVEL};
use super::format::render_format;
use crate::template::value::{to_display, Metadata};

const LEVEL_WORDS: [&str; MAX_LEVEL] = [
    "one", "two", "three", "four", "five", "six", "seven", "eight", "nine",
];

/// Format string per header level, index 0 being level one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HeaderFormats(pub Vec<String>);

impl Default for HeaderFormats {
    fn default() -> Self {
        Self(
            [
                "Article %n.",
                "Section %n.",
                "(%n)",
                "(%a)",
                "(%r)",
                "%A.",
                "%R.",
                "%n.",
                "%a.",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
        )
    }
}

impl HeaderFormats {
    /// `base` overridden by `level-one`..`level-nine` or `level-1`..`level-9`
    /// from the document metadata.
    pub fn from_metadata(metadata: &Metadata, base: &HeaderFormats) -> Self {
        let mut formats = base.0.clone();
        formats.resize(MAX_LEVEL, "%n.".to_string());
        for (i, word) in LEVEL_WORDS.iter().enumerate() {
            let value = metadata
                .get(&format!("level-{}", word))
                .or_else(|| metadata.get(&format!("level-{}", i + 1)));
            if let Some(value) = value.filter(|v| !v.is_null()) {
                formats[i] = to_display(value);
            }
        }
        Self(formats)
    }

    pub fn get(&self, level: usize) -> &str {
        level
            .checked_sub(1)
            .and_then(|i| self.0.get(i))
            .map(String::as_str)
            .unwrap_or("%n.")
    }
}

/// Levels named in the `no-reset` metadata key, e.g. `"l., ll."` or
/// `[2, 3]`.
pub fn no_reset_levels(metadata: &Metadata) -> Vec<usize> {
    let parse_one = |s: &str| -> Option<usize> {
        let s = s.trim().trim_end_matches('.');
        if let Ok(n) = s.parse::<usize>() {
            return Some(n);
        }
        if let Some(n) = s.strip_prefix('l').and_then(|rest| rest.parse::<usize>().ok()) {
            return Some(n);
        }
        (!s.is_empty() && s.chars().all(|c| c == 'l')).then(|| s.len())
    };
    match metadata.get("no-reset") {
        Some(Value::String(s)) => s.split(',').filter_map(parse_one).collect(),
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|v| match v {
                Value::Number(n) => n.as_u64().map(|n| n as usize),
                other => parse_one(&to_display(other)),
            })
            .collect(),
        Some(Value::Number(n)) => n.as_u64().map(|n| vec![n as usize]).unwrap_or_default(),
        _ => Vec::new(),
    }
}

/// A parsed header line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderLine {
    pub level: usize,
    pub title: String,
    /// Trailing `|key|` marker.
    pub key: Option<String>,
}

fn header_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^\s*(l{1,9}|l[1-9])\.\s+(.*?)(?:\s*\|([A-Za-z_][\w.-]*)\|)?\s*$")
            .expect("valid header regex")
    })
}

pub fn parse_header_line(line: &str) -> Option<HeaderLine> {
    let caps = header_regex().captures(line)?;
    let marker = caps.get(1)?.as_str();
    let level = match marker.strip_prefix('l').and_then(|rest| rest.parse::<usize>().ok()) {
        Some(n) => n,
        None => marker.len(),
    };
    Some(HeaderLine {
        level,
        title: caps.get(2).map(|m| m.as_str().to_string()).unwrap_or_default(),
        key: caps.get(3).map(|m| m.as_str().to_string()),
    })
}

/// A header after numbering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NumberedHeader {
    /// 0-based line index in the content.
    pub line: usize,
    pub level: usize,
    pub number: String,
    pub title: String,
    pub key: Option<String>,
}

/// Numbers every header in document order.
pub fn number_headers(content: &str, formats: &HeaderFormats, no_reset: &[usize]) -> Vec<NumberedHeader> {
    let mut counters = HeaderCounters::with_no_reset(no_reset.iter().copied());
    content
        .lines()
        .enumerate()
        .filter_map(|(line, text)| {
            let header = parse_header_line(text)?;
            counters.increment(header.level);
            Some(NumberedHeader {
                line,
                level: header.level,
                number: render_format(formats.get(header.level), header.level, &counters),
                title: header.title,
                key: header.key,
            })
        })
        .collect()
}

/// Rewrites header lines as `<number> <title>`, dropping key markers.
pub fn render_headers(content: &str, headers: &[NumberedHeader]) -> String {
    if headers.is_empty() {
        return content.to_string();
    }
    let mut pending = headers.iter().peekable();
    let mut lines = Vec::new();
    for (i, line) in content.split('\n').enumerate() {
        match pending.next_if(|h| h.line == i) {
            Some(header) if header.title.is_empty() => lines.push(header.number.clone()),
            Some(header) => lines.push(format!("{} {}", header.number, header.title)),
            None => lines.push(line.to_string()),
        }
    }
    lines.join("\n")
}
