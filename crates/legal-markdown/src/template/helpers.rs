//! Typed helper registry. Helpers are pure functions of their arguments
//! plus a small environment (the reference date for `@today`).

use std::collections::BTreeMap;

use chrono::{DateTime, Datelike, Months, NaiveDate, NaiveDateTime};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::template::value::{as_number, is_truthy, number_value, to_display};

pub type HelperFn = fn(&[Value], &HelperEnv) -> Option<Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HelperEnv {
    pub today: NaiveDate,
}

impl HelperEnv {
    pub fn new(today: NaiveDate) -> Self {
        Self { today }
    }

    /// Uses the local calendar date.
    pub fn from_clock() -> Self {
        Self::new(chrono::Local::now().date_naive())
    }

    /// A document may pin its own reference date with `@today` or `today`
    /// in the front matter. Values that do not parse as dates are ignored.
    pub fn with_metadata_override(self, metadata: &Map<String, Value>) -> Self {
        TODAY_KEYS
            .iter()
            .find_map(|key| metadata.get(*key).and_then(parse_date))
            .map(Self::new)
            .unwrap_or(self)
    }
}

const TODAY_KEYS: [&str; 2] = ["@today", "today"];

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HelperError {
    #[error("Invalid helper name '{0}'")]
    InvalidName(String),

    #[error("Helper '{0}' is already registered")]
    Duplicate(String),
}

#[derive(Clone)]
pub struct HelperRegistry {
    helpers: BTreeMap<String, HelperFn>,
}

impl std::fmt::Debug for HelperRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HelperRegistry")
            .field("helpers", &self.helpers.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl Default for HelperRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

impl HelperRegistry {
    pub fn empty() -> Self {
        Self {
            helpers: BTreeMap::new(),
        }
    }

    pub fn with_builtins() -> Self {
        let mut registry = Self::empty();
        // dates
        registry.builtin("today", today);
        registry.builtin("formatDate", format_date_helper);
        registry.builtin("addDays", add_days);
        registry.builtin("addMonths", add_months);
        registry.builtin("addYears", add_years);
        // numbers
        registry.builtin("formatCurrency", format_currency_helper);
        registry.builtin("formatDollar", |args, _| currency_with(args, "USD"));
        registry.builtin("formatEuro", |args, _| currency_with(args, "EUR"));
        registry.builtin("formatPound", |args, _| currency_with(args, "GBP"));
        registry.builtin("formatInteger", format_integer);
        registry.builtin("formatPercent", format_percent);
        registry.builtin("numberToWords", number_to_words_helper);
        registry.builtin("round", round);
        registry.builtin("add", |args, _| arithmetic(args, |a, b| Some(a + b)));
        registry.builtin("subtract", |args, _| arithmetic(args, |a, b| Some(a - b)));
        registry.builtin("multiply", |args, _| arithmetic(args, |a, b| Some(a * b)));
        registry.builtin("divide", |args, _| {
            arithmetic(args, |a, b| if b == 0.0 { None } else { Some(a / b) })
        });
        // strings
        registry.builtin("upper", |args, _| map_str(args, |s| s.to_uppercase()));
        registry.builtin("lower", |args, _| map_str(args, |s| s.to_lowercase()));
        registry.builtin("trim", |args, _| map_str(args, |s| s.trim().to_string()));
        registry.builtin("capitalize", |args, _| map_str(args, capitalize));
        registry.builtin("capitalizeWords", |args, _| {
            map_str(args, |s| s.split(' ').map(capitalize).collect::<Vec<_>>().join(" "))
        });
        registry.builtin("titleCase", |args, _| map_str(args, title_case));
        registry.builtin("kebabCase", |args, _| map_str(args, |s| words(s).join("-")));
        registry.builtin("snakeCase", |args, _| map_str(args, |s| words(s).join("_")));
        registry.builtin("camelCase", |args, _| map_str(args, |s| camel_case(s, false)));
        registry.builtin("pascalCase", |args, _| map_str(args, |s| camel_case(s, true)));
        registry.builtin("clean", |args, _| {
            map_str(args, |s| s.split_whitespace().collect::<Vec<_>>().join(" "))
        });
        registry.builtin("initials", |args, _| {
            map_str(args, |s| {
                s.split_whitespace()
                    .filter_map(|w| w.chars().next())
                    .flat_map(char::to_uppercase)
                    .collect()
            })
        });
        registry.builtin("truncate", truncate);
        registry.builtin("pluralize", pluralize_helper);
        registry.builtin("padStart", |args, _| pad(args, true));
        registry.builtin("padEnd", |args, _| pad(args, false));
        registry.builtin("contains", contains);
        registry.builtin("replaceAll", replace_all);
        registry.builtin("concat", |args, _| {
            Some(Value::String(args.iter().map(to_display).collect()))
        });
        registry.builtin("default", default_helper);
        registry
    }

    fn builtin(&mut self, name: &str, helper: HelperFn) {
        self.helpers.insert(name.to_string(), helper);
    }

    /// Adds a helper. Names must be identifiers and may not shadow an
    /// existing helper.
    pub fn register(&mut self, name: &str, helper: HelperFn) -> Result<(), HelperError> {
        let valid = !name.is_empty()
            && name
                .chars()
                .next()
                .map(|c| c.is_alphabetic() || c == '_')
                .unwrap_or(false)
            && name.chars().all(|c| c.is_alphanumeric() || c == '_');
        if !valid {
            return Err(HelperError::InvalidName(name.to_string()));
        }
        if self.helpers.contains_key(name) {
            return Err(HelperError::Duplicate(name.to_string()));
        }
        self.helpers.insert(name.to_string(), helper);
        Ok(())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.helpers.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<HelperFn> {
        self.helpers.get(name).copied()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.helpers.keys().map(String::as_str)
    }

    /// Calls `name`. Unknown helpers and helper failures yield `None`.
    pub fn call(&self, name: &str, args: &[Value], env: &HelperEnv) -> Option<Value> {
        let helper = self.helpers.get(name)?;
        helper(args, env)
    }
}

// ── argument access ──

fn arg_str(args: &[Value], i: usize) -> Option<String> {
    match args.get(i) {
        None | Some(Value::Null) => None,
        Some(v) => Some(to_display(v)),
    }
}

fn arg_num(args: &[Value], i: usize) -> Option<f64> {
    args.get(i).and_then(as_number)
}

fn map_str(args: &[Value], f: impl Fn(&str) -> String) -> Option<Value> {
    arg_str(args, 0).map(|s| Value::String(f(&s)))
}

// ── dates ──

pub fn parse_date(value: &Value) -> Option<NaiveDate> {
    let s = match value {
        Value::String(s) => s.trim(),
        _ => return None,
    };
    if let Ok(d) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Some(d);
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.date_naive());
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S") {
        return Some(dt.date());
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return Some(dt.date());
    }
    NaiveDate::parse_from_str(s, "%Y/%m/%d").ok()
}

fn date_arg(args: &[Value], env: &HelperEnv) -> Option<NaiveDate> {
    match args.first() {
        None | Some(Value::Null) => Some(env.today),
        Some(Value::String(s)) if s == "@today" || s == "today" => Some(env.today),
        Some(v) => parse_date(v),
    }
}

fn date_value(date: NaiveDate) -> Value {
    Value::String(date.format("%Y-%m-%d").to_string())
}

const MONTHS: [&str; 12] = [
    "January",
    "February",
    "March",
    "April",
    "May",
    "June",
    "July",
    "August",
    "September",
    "October",
    "November",
    "December",
];

const WEEKDAYS: [&str; 7] = [
    "Monday",
    "Tuesday",
    "Wednesday",
    "Thursday",
    "Friday",
    "Saturday",
    "Sunday",
];

fn ordinal_suffix(n: u32) -> &'static str {
    match (n % 10, n % 100) {
        (_, 11..=13) => "th",
        (1, _) => "st",
        (2, _) => "nd",
        (3, _) => "rd",
        _ => "th",
    }
}

/// Formats with moment-style tokens: `YYYY YY MMMM MMM MM M Do DD D dddd ddd`.
/// Any other text is copied through.
pub fn format_date(date: NaiveDate, pattern: &str) -> String {
    const TOKENS: [&str; 11] = [
        "YYYY", "MMMM", "dddd", "MMM", "ddd", "YY", "MM", "Do", "DD", "M", "D",
    ];
    let mut out = String::new();
    let mut rest = pattern;
    'outer: while !rest.is_empty() {
        for token in TOKENS {
            if let Some(after) = rest.strip_prefix(token) {
                let month = date.month() as usize - 1;
                let weekday = date.weekday().num_days_from_monday() as usize;
                let piece = match token {
                    "YYYY" => format!("{:04}", date.year()),
                    "YY" => format!("{:02}", date.year().rem_euclid(100)),
                    "MMMM" => MONTHS[month].to_string(),
                    "MMM" => MONTHS[month][..3].to_string(),
                    "MM" => format!("{:02}", date.month()),
                    "M" => date.month().to_string(),
                    "Do" => format!("{}{}", date.day(), ordinal_suffix(date.day())),
                    "DD" => format!("{:02}", date.day()),
                    "D" => date.day().to_string(),
                    "dddd" => WEEKDAYS[weekday].to_string(),
                    _ => WEEKDAYS[weekday][..3].to_string(),
                };
                out.push_str(&piece);
                rest = after;
                continue 'outer;
            }
        }
        let mut chars = rest.chars();
        if let Some(c) = chars.next() {
            out.push(c);
        }
        rest = chars.as_str();
    }
    out
}

fn today(_: &[Value], env: &HelperEnv) -> Option<Value> {
    Some(date_value(env.today))
}

fn format_date_helper(args: &[Value], env: &HelperEnv) -> Option<Value> {
    let date = date_arg(args, env)?;
    let pattern = arg_str(args, 1).unwrap_or_else(|| "YYYY-MM-DD".to_string());
    Some(Value::String(format_date(date, &pattern)))
}

fn add_days(args: &[Value], env: &HelperEnv) -> Option<Value> {
    let date = date_arg(args, env)?;
    let days = arg_num(args, 1)? as i64;
    date.checked_add_signed(chrono::Duration::days(days))
        .map(date_value)
}

fn shift_months(date: NaiveDate, months: i64) -> Option<NaiveDate> {
    let magnitude = Months::new(u32::try_from(months.unsigned_abs()).ok()?);
    if months >= 0 {
        date.checked_add_months(magnitude)
    } else {
        date.checked_sub_months(magnitude)
    }
}

fn add_months(args: &[Value], env: &HelperEnv) -> Option<Value> {
    let date = date_arg(args, env)?;
    shift_months(date, arg_num(args, 1)? as i64).map(date_value)
}

fn add_years(args: &[Value], env: &HelperEnv) -> Option<Value> {
    let date = date_arg(args, env)?;
    shift_months(date, arg_num(args, 1)? as i64 * 12).map(date_value)
}

// ── numbers ──

/// Groups the integer part with `separator` and keeps `decimals` places.
pub fn group_thousands(n: f64, decimals: usize, separator: &str) -> String {
    let formatted = format!("{:.*}", decimals, n.abs());
    let (int_part, frac_part) = match formatted.split_once('.') {
        Some((i, f)) => (i.to_string(), Some(f.to_string())),
        None => (formatted.clone(), None),
    };
    let mut grouped = String::new();
    for (i, c) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            grouped.push_str(separator);
        }
        grouped.push(c);
    }
    let sign = if n < 0.0 && formatted.chars().any(|c| c.is_ascii_digit() && c != '0') {
        "-"
    } else {
        ""
    };
    match frac_part {
        Some(f) => format!("{}{}.{}", sign, grouped, f),
        None => format!("{}{}", sign, grouped),
    }
}

/// `$1,234.56`, `€1,234.56`, `£1,234.56`; unknown codes are suffixed.
pub fn format_currency(amount: f64, currency: &str, decimals: usize) -> String {
    let body = group_thousands(amount.abs(), decimals, ",");
    let sign = if amount < 0.0 { "-" } else { "" };
    let symbol = match currency.to_uppercase().as_str() {
        "USD" => Some("$"),
        "EUR" => Some("€"),
        "GBP" => Some("£"),
        "JPY" => Some("¥"),
        _ => None,
    };
    match symbol {
        Some(symbol) => format!("{}{}{}", sign, symbol, body),
        None => format!("{}{} {}", sign, body, currency.to_uppercase()),
    }
}

fn format_currency_helper(args: &[Value], _: &HelperEnv) -> Option<Value> {
    let amount = arg_num(args, 0)?;
    let currency = arg_str(args, 1).unwrap_or_else(|| "USD".to_string());
    let decimals = arg_num(args, 2).map(|d| d.max(0.0) as usize).unwrap_or(2);
    Some(Value::String(format_currency(amount, &currency, decimals)))
}

fn currency_with(args: &[Value], currency: &str) -> Option<Value> {
    let amount = arg_num(args, 0)?;
    let decimals = arg_num(args, 1).map(|d| d.max(0.0) as usize).unwrap_or(2);
    Some(Value::String(format_currency(amount, currency, decimals)))
}

fn format_integer(args: &[Value], _: &HelperEnv) -> Option<Value> {
    let n = arg_num(args, 0)?;
    let separator = arg_str(args, 1).unwrap_or_else(|| ",".to_string());
    Some(Value::String(group_thousands(n.round(), 0, &separator)))
}

fn format_percent(args: &[Value], _: &HelperEnv) -> Option<Value> {
    let n = arg_num(args, 0)?;
    let decimals = arg_num(args, 1).map(|d| d.max(0.0) as usize).unwrap_or(0);
    let with_symbol = args.get(2).map(|v| is_truthy(Some(v))).unwrap_or(true);
    let body = format!("{:.*}", decimals, n * 100.0);
    Some(Value::String(if with_symbol {
        format!("{}%", body)
    } else {
        body
    }))
}

fn round(args: &[Value], _: &HelperEnv) -> Option<Value> {
    let n = arg_num(args, 0)?;
    let decimals = arg_num(args, 1).unwrap_or(0.0).clamp(0.0, 10.0) as i32;
    let factor = 10f64.powi(decimals);
    number_value((n * factor).round() / factor)
}

fn arithmetic(args: &[Value], op: impl Fn(f64, f64) -> Option<f64>) -> Option<Value> {
    let a = arg_num(args, 0)?;
    let b = arg_num(args, 1)?;
    number_value(op(a, b)?)
}

const ONES: [&str; 20] = [
    "zero",
    "one",
    "two",
    "three",
    "four",
    "five",
    "six",
    "seven",
    "eight",
    "nine",
    "ten",
    "eleven",
    "twelve",
    "thirteen",
    "fourteen",
    "fifteen",
    "sixteen",
    "seventeen",
    "eighteen",
    "nineteen",
];

const TENS: [&str; 10] = [
    "", "", "twenty", "thirty", "forty", "fifty", "sixty", "seventy", "eighty", "ninety",
];

fn below_thousand(n: u64) -> String {
    let mut parts = Vec::new();
    let hundreds = n / 100;
    let rest = n % 100;
    if hundreds > 0 {
        parts.push(format!("{} hundred", ONES[hundreds as usize]));
    }
    if rest > 0 {
        if rest < 20 {
            parts.push(ONES[rest as usize].to_string());
        } else if rest % 10 == 0 {
            parts.push(TENS[(rest / 10) as usize].to_string());
        } else {
            parts.push(format!(
                "{}-{}",
                TENS[(rest / 10) as usize],
                ONES[(rest % 10) as usize]
            ));
        }
    }
    parts.join(" ")
}

/// English words for the integer part of `n`.
pub fn number_to_words(n: i64) -> String {
    if n == 0 {
        return ONES[0].to_string();
    }
    let mut remaining = n.unsigned_abs();
    let scales = ["", "thousand", "million", "billion", "trillion", "quadrillion", "quintillion"];
    let mut chunks = Vec::new();
    let mut scale = 0;
    while remaining > 0 {
        let chunk = remaining % 1000;
        if chunk > 0 {
            let words = below_thousand(chunk);
            chunks.push(if scales[scale].is_empty() {
                words
            } else {
                format!("{} {}", words, scales[scale])
            });
        }
        remaining /= 1000;
        scale += 1;
    }
    chunks.reverse();
    let words = chunks.join(" ");
    if n < 0 {
        format!("minus {}", words)
    } else {
        words
    }
}

fn number_to_words_helper(args: &[Value], _: &HelperEnv) -> Option<Value> {
    let n = arg_num(args, 0)?;
    Some(Value::String(number_to_words(n.trunc() as i64)))
}

// ── strings ──

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn title_case(s: &str) -> String {
    const SMALL: [&str; 12] = [
        "a", "an", "and", "as", "at", "but", "by", "for", "in", "of", "on", "the",
    ];
    s.split(' ')
        .enumerate()
        .map(|(i, w)| {
            let lower = w.to_lowercase();
            if i > 0 && SMALL.contains(&lower.as_str()) {
                lower
            } else {
                capitalize(&lower)
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Lowercase words split on non-alphanumerics and camel-case boundaries.
fn words(s: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut current = String::new();
    let mut prev_lower = false;
    for c in s.chars() {
        if !c.is_alphanumeric() {
            if !current.is_empty() {
                out.push(std::mem::take(&mut current));
            }
            prev_lower = false;
            continue;
        }
        if c.is_uppercase() && prev_lower && !current.is_empty() {
            out.push(std::mem::take(&mut current));
        }
        prev_lower = c.is_lowercase() || c.is_ascii_digit();
        current.extend(c.to_lowercase());
    }
    if !current.is_empty() {
        out.push(current);
    }
    out
}

fn camel_case(s: &str, upper_first: bool) -> String {
    words(s)
        .iter()
        .enumerate()
        .map(|(i, w)| {
            if i == 0 && !upper_first {
                w.clone()
            } else {
                capitalize(w)
            }
        })
        .collect()
}

fn truncate(args: &[Value], _: &HelperEnv) -> Option<Value> {
    let s = arg_str(args, 0)?;
    let len = arg_num(args, 1)?.max(0.0) as usize;
    let suffix = arg_str(args, 2).unwrap_or_else(|| "...".to_string());
    if s.chars().count() <= len {
        return Some(Value::String(s));
    }
    let kept: String = s.chars().take(len).collect();
    Some(Value::String(format!("{}{}", kept.trim_end(), suffix)))
}

pub fn pluralize(word: &str, count: f64) -> String {
    if count == 1.0 {
        return word.to_string();
    }
    let lower = word.to_lowercase();
    if lower.ends_with('y')
        && !["ay", "ey", "iy", "oy", "uy"]
            .iter()
            .any(|v| lower.ends_with(v))
    {
        format!("{}ies", &word[..word.len() - 1])
    } else if ["s", "x", "z", "ch", "sh"].iter().any(|e| lower.ends_with(e)) {
        format!("{}es", word)
    } else {
        format!("{}s", word)
    }
}

fn pluralize_helper(args: &[Value], _: &HelperEnv) -> Option<Value> {
    let word = arg_str(args, 0)?;
    let count = arg_num(args, 1).unwrap_or(2.0);
    Some(Value::String(pluralize(&word, count)))
}

fn pad(args: &[Value], start: bool) -> Option<Value> {
    let s = arg_str(args, 0)?;
    let len = arg_num(args, 1)?.max(0.0) as usize;
    let fill = arg_str(args, 2)
        .and_then(|f| f.chars().next())
        .unwrap_or(' ');
    let missing = len.saturating_sub(s.chars().count());
    let padding: String = std::iter::repeat(fill).take(missing).collect();
    Some(Value::String(if start {
        format!("{}{}", padding, s)
    } else {
        format!("{}{}", s, padding)
    }))
}

fn contains(args: &[Value], _: &HelperEnv) -> Option<Value> {
    let needle = args.get(1)?;
    let found = match args.first()? {
        Value::Array(items) => items.iter().any(|i| i == needle),
        other => to_display(other).contains(&to_display(needle)),
    };
    Some(Value::Bool(found))
}

fn replace_all(args: &[Value], _: &HelperEnv) -> Option<Value> {
    let s = arg_str(args, 0)?;
    let from = arg_str(args, 1)?;
    let to = arg_str(args, 2).unwrap_or_default();
    if from.is_empty() {
        return Some(Value::String(s));
    }
    Some(Value::String(s.replace(&from, &to)))
}

fn default_helper(args: &[Value], _: &HelperEnv) -> Option<Value> {
    match args.first() {
        Some(v) if is_truthy(Some(v)) => Some(v.clone()),
        _ => args.get(1).cloned(),
    }
}
