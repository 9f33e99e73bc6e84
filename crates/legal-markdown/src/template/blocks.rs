use std::ops::Range;
use std::sync::OnceLock;

use regex::Regex;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockKind {
    /// `{{#if cond}}`
    If(String),
    /// `{{#unless cond}}`
    Unless(String),
    /// `{{#each path}}`
    Each(String),
    /// Legacy `{{#path}}`: iterate an array or render once for a truthy
    /// scalar.
    Section(String),
}

impl BlockKind {
    fn closing_name(&self) -> &str {
        match self {
            BlockKind::If(_) => "if",
            BlockKind::Unless(_) => "unless",
            BlockKind::Each(_) => "each",
            BlockKind::Section(name) => name,
        }
    }
}

/// A top-level block with byte offsets into the scanned content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    pub kind: BlockKind,
    /// Whole block including opening and closing tags.
    pub span: Range<usize>,
    /// Between the opening and closing tags.
    pub body: Range<usize>,
    /// First `{{else}}` directly inside this block.
    pub else_tag: Option<Range<usize>>,
}

impl Block {
    /// `(then, otherwise)` halves of the body.
    pub fn branches<'a>(&self, content: &'a str) -> (&'a str, Option<&'a str>) {
        match &self.else_tag {
            Some(tag) => (
                &content[self.body.start..tag.start],
                Some(&content[tag.end..self.body.end]),
            ),
            None => (&content[self.body.clone()], None),
        }
    }
}

#[derive(Debug, Default)]
pub struct BlockScan {
    pub blocks: Vec<Block>,
    /// Tags that never found a partner; they stay in the text verbatim.
    pub unmatched: Vec<String>,
}

impl BlockScan {
    pub fn contains(&self, offset: usize) -> bool {
        self.blocks.iter().any(|b| b.span.contains(&offset))
    }
}

fn tag_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\{\{~?\s*(?:(?P<sigil>[#/])\s*(?P<body>[^{}]*?)|(?P<else>else))\s*~?\}\}")
            .expect("valid block tag regex")
    })
}

struct Open {
    kind: BlockKind,
    start: usize,
    body_start: usize,
    else_tag: Option<Range<usize>>,
    raw: String,
}

/// Finds the outermost `{{#...}}...{{/...}}` blocks, matching nested tags
/// by name.
pub fn scan_blocks(content: &str) -> BlockScan {
    let mut scan = BlockScan::default();
    let mut stack: Vec<Open> = Vec::new();

    for caps in tag_regex().captures_iter(content) {
        let Some(whole) = caps.get(0) else { continue };

        if caps.name("else").is_some() {
            if stack.len() == 1 {
                if let Some(open) = stack.last_mut() {
                    open.else_tag.get_or_insert(whole.range());
                }
            }
            continue;
        }

        let sigil = caps.name("sigil").map(|m| m.as_str()).unwrap_or_default();
        let body = caps.name("body").map(|m| m.as_str().trim()).unwrap_or_default();

        if sigil == "#" {
            let Some(kind) = classify_open(body) else {
                scan.unmatched.push(whole.as_str().to_string());
                continue;
            };
            stack.push(Open {
                kind,
                start: whole.start(),
                body_start: whole.end(),
                else_tag: None,
                raw: whole.as_str().to_string(),
            });
            continue;
        }

        let matches_top = stack
            .last()
            .map(|open| open.kind.closing_name() == body)
            .unwrap_or(false);
        if !matches_top {
            scan.unmatched.push(whole.as_str().to_string());
            continue;
        }
        if let Some(open) = stack.pop() {
            if stack.is_empty() {
                scan.blocks.push(Block {
                    kind: open.kind,
                    span: open.start..whole.end(),
                    body: open.body_start..whole.start(),
                    else_tag: open.else_tag,
                });
            }
        }
    }

    scan.unmatched.extend(stack.into_iter().map(|open| open.raw));
    scan
}

fn classify_open(body: &str) -> Option<BlockKind> {
    let (head, rest) = match body.split_once(char::is_whitespace) {
        Some((head, rest)) => (head, rest.trim()),
        None => (body, ""),
    };
    match head {
        "if" if !rest.is_empty() => Some(BlockKind::If(rest.to_string())),
        "unless" if !rest.is_empty() => Some(BlockKind::Unless(rest.to_string())),
        "each" if !rest.is_empty() => Some(BlockKind::Each(rest.to_string())),
        "if" | "unless" | "each" => None,
        name if !name.is_empty() && rest.is_empty() => Some(BlockKind::Section(name.to_string())),
        _ => None,
    }
}
