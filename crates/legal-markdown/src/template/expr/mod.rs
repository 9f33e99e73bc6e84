//! Typed expression language used inside `{{ ... }}` mixins, `{{#if}}`
//! conditions and optional-clause conditions.

mod eval;
mod lexer;
mod parser;

use serde_json::Value;
use thiserror::Error;

use crate::template::value::{parse_path, Segment};

pub use eval::{Evaluator, Scope};
pub use parser::parse;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExprError {
    #[error("empty expression")]
    Empty,

    #[error("unterminated string literal")]
    UnterminatedString,

    #[error("invalid number: {0}")]
    InvalidNumber(String),

    #[error("invalid variable path: {0}")]
    InvalidPath(String),

    #[error("unexpected character '{0}'")]
    UnexpectedChar(char),

    #[error("unexpected token {0}")]
    UnexpectedToken(String),

    #[error("unexpected end of expression")]
    UnexpectedEnd,

    #[error("unexpected trailing input starting at {0}")]
    TrailingTokens(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Or,
    And,
    Eq,
    NotEq,
    Gt,
    Lt,
    GtEq,
    LtEq,
    Add,
    Sub,
    Mul,
    Div,
}

impl BinaryOp {
    pub fn is_logic(self) -> bool {
        !matches!(self, Self::Add | Self::Sub | Self::Mul | Self::Div)
    }
}

/// Loop-scoped special variables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopVar {
    Index,
    Total,
    First,
    Last,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VarKind {
    /// Plain metadata path.
    Meta(Vec<Segment>),
    /// `.`, `this` or `this.field`: the current loop item.
    Item(Vec<Segment>),
    /// `@parent`, `@parent.field` or `../field`: the enclosing loop's item.
    Parent(Vec<Segment>),
    Loop(LoopVar),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VarRef {
    pub raw: String,
    pub kind: VarKind,
}

impl VarRef {
    pub fn parse(raw: &str) -> Option<Self> {
        let kind = match raw {
            "." | "this" => VarKind::Item(Vec::new()),
            "@index" => VarKind::Loop(LoopVar::Index),
            "@total" => VarKind::Loop(LoopVar::Total),
            "@first" => VarKind::Loop(LoopVar::First),
            "@last" => VarKind::Loop(LoopVar::Last),
            "@parent" => VarKind::Parent(Vec::new()),
            _ => {
                if let Some(rest) = raw.strip_prefix("this.") {
                    VarKind::Item(parse_path(rest)?)
                } else if let Some(rest) = raw.strip_prefix("@parent.") {
                    VarKind::Parent(parse_path(rest)?)
                } else if let Some(rest) = raw.strip_prefix("../") {
                    VarKind::Parent(parse_path(rest)?)
                } else if raw.starts_with('@') {
                    return None;
                } else {
                    VarKind::Meta(parse_path(raw)?)
                }
            }
        };
        Some(Self {
            raw: raw.to_string(),
            kind,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Value),
    Var(VarRef),
    /// `@today`; resolved from options or the clock.
    Today,
    Call {
        name: String,
        args: Vec<Expr>,
    },
    Ternary {
        cond: Box<Expr>,
        then: Box<Expr>,
        otherwise: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Not(Box<Expr>),
    Neg(Box<Expr>),
}

impl Expr {
    pub(crate) fn binary(op: BinaryOp, left: Expr, right: Expr) -> Self {
        Expr::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    /// First variable referenced, in evaluation order. Used as the field
    /// name when a helper call or conditional is tracked.
    pub fn primary_variable(&self) -> Option<&VarRef> {
        match self {
            Expr::Var(v) => Some(v),
            Expr::Literal(_) | Expr::Today => None,
            Expr::Call { args, .. } => args.iter().find_map(Expr::primary_variable),
            Expr::Ternary {
                cond,
                then,
                otherwise,
            } => cond
                .primary_variable()
                .or_else(|| then.primary_variable())
                .or_else(|| otherwise.primary_variable()),
            Expr::Binary { left, right, .. } => {
                left.primary_variable().or_else(|| right.primary_variable())
            }
            Expr::Not(inner) | Expr::Neg(inner) => inner.primary_variable(),
        }
    }

    /// True for anything beyond a bare variable or literal.
    pub fn has_logic(&self) -> bool {
        !matches!(self, Expr::Var(_) | Expr::Literal(_) | Expr::Today)
    }
}
