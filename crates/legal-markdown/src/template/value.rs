//! Metadata value helpers shared by every resolver: path lookup,
//! truthiness, loose equality and display formatting.

use serde_json::{Map, Number, Value};

/// Document metadata. Front matter is deserialized straight into this map
/// and every pipeline step mutates the same instance.
pub type Metadata = Map<String, Value>;

/// One segment of a dotted variable path such as `parties[0].name`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Key(String),
    Index(usize),
}

/// Parses `a.b[0].c` into segments. Returns `None` for empty segments or
/// malformed indexes.
pub fn parse_path(path: &str) -> Option<Vec<Segment>> {
    let path = path.trim();
    if path.is_empty() {
        return None;
    }

    let mut segments = Vec::new();
    for part in path.split('.') {
        if part.is_empty() {
            return None;
        }
        let (key, mut rest) = match part.find('[') {
            Some(pos) => (&part[..pos], &part[pos..]),
            None => (part, ""),
        };
        if !key.is_empty() {
            segments.push(Segment::Key(key.to_string()));
        }
        while !rest.is_empty() {
            let close = rest.find(']')?;
            let index = rest[1..close].trim().parse::<usize>().ok()?;
            segments.push(Segment::Index(index));
            rest = &rest[close + 1..];
            if !rest.is_empty() && !rest.starts_with('[') {
                return None;
            }
        }
    }

    Some(segments)
}

/// Walks `segments` from `root`. Missing keys, out-of-range indexes and
/// indexing into scalars all yield `None`.
pub fn lookup<'a>(root: &'a Value, segments: &[Segment]) -> Option<&'a Value> {
    let mut current = root;
    for segment in segments {
        current = match (segment, current) {
            (Segment::Key(key), Value::Object(map)) => map.get(key)?,
            (Segment::Index(i), Value::Array(items)) => items.get(*i)?,
            (Segment::Key(key), Value::Array(items)) => {
                // numeric keys written as `items.0`
                let i = key.parse::<usize>().ok()?;
                items.get(i)?
            }
            _ => return None,
        };
    }
    Some(current)
}

/// Looks a dotted path up directly in a metadata map.
pub fn lookup_in<'a>(metadata: &'a Metadata, segments: &[Segment]) -> Option<&'a Value> {
    let (first, rest) = segments.split_first()?;
    let root = match first {
        Segment::Key(key) => metadata.get(key)?,
        Segment::Index(_) => return None,
    };
    lookup(root, rest)
}

/// Convenience wrapper: parse then look up.
pub fn get_path<'a>(metadata: &'a Metadata, path: &str) -> Option<&'a Value> {
    let segments = parse_path(path)?;
    lookup_in(metadata, &segments)
}

/// Renders segments back into `a.b[0]` form.
pub fn path_to_string(segments: &[Segment]) -> String {
    let mut out = String::new();
    for segment in segments {
        match segment {
            Segment::Key(key) => {
                if !out.is_empty() {
                    out.push('.');
                }
                out.push_str(key);
            }
            Segment::Index(i) => {
                out.push('[');
                out.push_str(&i.to_string());
                out.push(']');
            }
        }
    }
    out
}

/// `null`/absent → false, numbers → non-zero, strings/arrays/objects →
/// non-empty.
pub fn is_truthy(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64().map(|f| f != 0.0 && !f.is_nan()).unwrap_or(false),
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Array(items)) => !items.is_empty(),
        Some(Value::Object(map)) => !map.is_empty(),
    }
}

/// Strings wholly wrapped in brackets (`"[CLIENT NAME]"`) are placeholders
/// left in the front matter by template authors and count as missing.
pub fn is_placeholder(value: &Value) -> bool {
    match value {
        Value::String(s) => {
            let s = s.trim();
            s.len() >= 2 && s.starts_with('[') && s.ends_with(']')
        }
        _ => false,
    }
}

/// Numeric coercion used by ordering operators and arithmetic helpers.
pub fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => {
            let cleaned: String = s.trim().chars().filter(|c| *c != ',').collect();
            cleaned.parse::<f64>().ok()
        }
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        _ => None,
    }
}

/// Loose equality:
/// - absent and `null` are equal to each other only,
/// - a number equals a string that parses to the same number,
/// - a boolean equals the strings `"true"`/`"false"`,
/// - everything else compares structurally.
pub fn loose_eq(left: Option<&Value>, right: Option<&Value>) -> bool {
    let left = left.unwrap_or(&Value::Null);
    let right = right.unwrap_or(&Value::Null);
    match (left, right) {
        (Value::Null, Value::Null) => true,
        (Value::Null, _) | (_, Value::Null) => false,
        (Value::Number(a), Value::Number(b)) => a.as_f64() == b.as_f64(),
        (Value::Number(n), Value::String(s)) | (Value::String(s), Value::Number(n)) => {
            match (n.as_f64(), s.trim().parse::<f64>()) {
                (Some(a), Ok(b)) => a == b,
                _ => false,
            }
        }
        (Value::Bool(b), Value::String(s)) | (Value::String(s), Value::Bool(b)) => {
            s.trim() == if *b { "true" } else { "false" }
        }
        _ => left == right,
    }
}

/// Builds a JSON number, preferring an integer representation when the
/// value is whole.
pub fn number_value(n: f64) -> Option<Value> {
    if !n.is_finite() {
        return None;
    }
    if n.fract() == 0.0 && n.abs() < 9.0e15 {
        return Some(Value::Number(Number::from(n as i64)));
    }
    Number::from_f64(n).map(Value::Number)
}

/// String form used when a resolved value is written into the document.
pub fn to_display(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => format_number(n),
        Value::String(s) => s.clone(),
        Value::Array(items) => items.iter().map(to_display).collect::<Vec<_>>().join(", "),
        Value::Object(_) => value.to_string(),
    }
}

fn format_number(n: &Number) -> String {
    if let Some(i) = n.as_i64() {
        return i.to_string();
    }
    if let Some(u) = n.as_u64() {
        return u.to_string();
    }
    match n.as_f64() {
        Some(f) if f.fract() == 0.0 && f.abs() < 9.0e15 => (f as i64).to_string(),
        Some(f) => f.to_string(),
        None => n.to_string(),
    }
}
