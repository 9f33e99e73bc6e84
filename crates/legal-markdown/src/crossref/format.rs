//! Level format strings: `%n`, `%0Nn`, `%a`, `%A`, `%r`, `%R`, `%l1`..`%l9`.

use std::sync::OnceLock;

use regex::{Captures, Regex};

use super::counters::HeaderCounters;

const NUMERALS: [(u32, &str); 13] = [
    (1000, "M"),
    (900, "CM"),
    (500, "D"),
    (400, "CD"),
    (100, "C"),
    (90, "XC"),
    (50, "L"),
    (40, "XL"),
    (10, "X"),
    (9, "IX"),
    (5, "V"),
    (4, "IV"),
    (1, "I"),
];

/// Uppercase Roman numeral. Zero renders empty; 4000 and above fall back
/// to decimal.
pub fn to_roman(n: u32) -> String {
    if n == 0 {
        return String::new();
    }
    if n >= 4000 {
        return n.to_string();
    }
    let mut result = String::new();
    let mut num = n;
    for (value, numeral) in NUMERALS {
        while num >= value {
            result.push_str(numeral);
            num -= value;
        }
    }
    result
}

/// Lowercase letters, spreadsheet style past 26: 1 → a, 26 → z, 27 → aa,
/// 28 → ab, 702 → zz, 703 → aaa. Zero renders empty.
pub fn to_alpha(n: u32) -> String {
    let mut n = n;
    let mut letters = Vec::new();
    while n > 0 {
        let rem = ((n - 1) % 26) as u8;
        letters.push((b'a' + rem) as char);
        n = (n - 1) / 26;
    }
    letters.iter().rev().collect()
}

fn placeholder_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"%(?:l([1-9])|0([1-9])n|([naArR]))").expect("valid placeholder regex")
    })
}

/// Substitutes every placeholder in `format` for a header at `level`.
/// Text without placeholders comes back unchanged.
pub fn render_format(format: &str, level: usize, counters: &HeaderCounters) -> String {
    let own = counters.get(level);
    placeholder_regex()
        .replace_all(format, |caps: &Captures| {
            if let Some(other) = caps.get(1) {
                let other = other.as_str().parse::<usize>().unwrap_or(level);
                return counters.get(other).to_string();
            }
            if let Some(width) = caps.get(2) {
                let width = width.as_str().parse::<usize>().unwrap_or(1);
                return format!("{:0width$}", own, width = width);
            }
            match caps.get(3).map(|m| m.as_str()) {
                Some("n") => own.to_string(),
                Some("a") => to_alpha(own),
                Some("A") => to_alpha(own).to_uppercase(),
                Some("r") => to_roman(own).to_lowercase(),
                Some("R") => to_roman(own),
                _ => caps[0].to_string(),
            }
        })
        .into_owned()
}
