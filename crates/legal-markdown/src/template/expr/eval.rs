use serde_json::Value;
use tracing::debug;

use super::{parse, BinaryOp, Expr, LoopVar, VarKind, VarRef};
use crate::template::context::LoopContext;
use crate::template::helpers::{HelperEnv, HelperRegistry};
use crate::template::value::{
    as_number, is_truthy, lookup, lookup_in, loose_eq, number_value, to_display, Metadata,
};

/// What an expression can see: the (possibly loop-enhanced) metadata and
/// the chain of enclosing loops.
#[derive(Clone, Copy)]
pub struct Scope<'a> {
    pub metadata: &'a Metadata,
    pub loop_ctx: Option<&'a LoopContext<'a>>,
}

impl<'a> Scope<'a> {
    pub fn new(metadata: &'a Metadata) -> Self {
        Self {
            metadata,
            loop_ctx: None,
        }
    }

    pub fn with_loop(metadata: &'a Metadata, loop_ctx: Option<&'a LoopContext<'a>>) -> Self {
        Self { metadata, loop_ctx }
    }
}

/// Evaluates expressions. Every failure collapses to `None`; nothing here
/// returns an error to the caller.
pub struct Evaluator<'h> {
    helpers: &'h HelperRegistry,
    env: HelperEnv,
}

impl<'h> Evaluator<'h> {
    pub fn new(helpers: &'h HelperRegistry, env: HelperEnv) -> Self {
        Self { helpers, env }
    }

    pub fn env(&self) -> &HelperEnv {
        &self.env
    }

    /// Parses and evaluates `source`. Parse failures are logged and yield
    /// `None`.
    pub fn eval_str(&self, source: &str, scope: Scope<'_>) -> Option<Value> {
        match parse(source) {
            Ok(expr) => self.eval(&expr, scope),
            Err(e) => {
                debug!("Unparseable expression '{}': {}", source, e);
                None
            }
        }
    }

    /// Boolean evaluation for `{{#if}}` and clause conditions.
    pub fn test(&self, source: &str, scope: Scope<'_>) -> bool {
        is_truthy(self.eval_str(source, scope).as_ref())
    }

    pub fn eval(&self, expr: &Expr, scope: Scope<'_>) -> Option<Value> {
        match expr {
            Expr::Literal(value) => Some(value.clone()),
            Expr::Today => Some(Value::String(self.env.today.format("%Y-%m-%d").to_string())),
            Expr::Var(var) => self.resolve_var(var, scope),
            Expr::Call { name, args } => {
                let values: Vec<Value> = args
                    .iter()
                    .map(|arg| self.eval(arg, scope).unwrap_or(Value::Null))
                    .collect();
                self.helpers.call(name, &values, &self.env)
            }
            Expr::Ternary {
                cond,
                then,
                otherwise,
            } => {
                if is_truthy(self.eval(cond, scope).as_ref()) {
                    self.eval(then, scope)
                } else {
                    self.eval(otherwise, scope)
                }
            }
            Expr::Not(inner) => Some(Value::Bool(!is_truthy(self.eval(inner, scope).as_ref()))),
            Expr::Neg(inner) => {
                let n = as_number(&self.eval(inner, scope)?)?;
                number_value(-n)
            }
            Expr::Binary { op, left, right } => self.eval_binary(*op, left, right, scope),
        }
    }

    fn eval_binary(
        &self,
        op: BinaryOp,
        left: &Expr,
        right: &Expr,
        scope: Scope<'_>,
    ) -> Option<Value> {
        match op {
            BinaryOp::Or => {
                let l = is_truthy(self.eval(left, scope).as_ref());
                Some(Value::Bool(l || is_truthy(self.eval(right, scope).as_ref())))
            }
            BinaryOp::And => {
                let l = is_truthy(self.eval(left, scope).as_ref());
                Some(Value::Bool(l && is_truthy(self.eval(right, scope).as_ref())))
            }
            BinaryOp::Eq | BinaryOp::NotEq => {
                let l = self.eval(left, scope);
                let r = self.eval(right, scope);
                let equal = loose_eq(l.as_ref(), r.as_ref());
                Some(Value::Bool(if op == BinaryOp::Eq { equal } else { !equal }))
            }
            BinaryOp::Gt | BinaryOp::Lt | BinaryOp::GtEq | BinaryOp::LtEq => {
                let ordered = match (self.eval(left, scope), self.eval(right, scope)) {
                    (Some(l), Some(r)) => match (as_number(&l), as_number(&r)) {
                        (Some(a), Some(b)) => compare(op, a, b),
                        _ => false,
                    },
                    _ => false,
                };
                Some(Value::Bool(ordered))
            }
            BinaryOp::Add => {
                let l = self.eval(left, scope)?;
                let r = self.eval(right, scope)?;
                if l.is_string() || r.is_string() {
                    return Some(Value::String(format!("{}{}", to_display(&l), to_display(&r))));
                }
                number_value(as_number(&l)? + as_number(&r)?)
            }
            BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div => {
                let a = as_number(&self.eval(left, scope)?)?;
                let b = as_number(&self.eval(right, scope)?)?;
                match op {
                    BinaryOp::Sub => number_value(a - b),
                    BinaryOp::Mul => number_value(a * b),
                    _ if b == 0.0 => None,
                    _ => number_value(a / b),
                }
            }
        }
    }

    fn resolve_var(&self, var: &VarRef, scope: Scope<'_>) -> Option<Value> {
        match &var.kind {
            VarKind::Meta(segments) => {
                if let Some(value) = lookup_in(scope.metadata, segments) {
                    return Some(value.clone());
                }
                // fall back to the items of enclosing loops
                let mut ctx = scope.loop_ctx;
                while let Some(current) = ctx {
                    if let Some(value) = lookup(&current.item, segments) {
                        return Some(value.clone());
                    }
                    ctx = current.parent;
                }
                None
            }
            VarKind::Item(segments) => {
                let ctx = scope.loop_ctx?;
                lookup(&ctx.item, segments).cloned()
            }
            VarKind::Parent(segments) => {
                let parent = scope.loop_ctx?.parent?;
                lookup(&parent.item, segments).cloned()
            }
            VarKind::Loop(loop_var) => match scope.loop_ctx {
                Some(ctx) => Some(match loop_var {
                    LoopVar::Index => Value::from(ctx.index),
                    LoopVar::Total => Value::from(ctx.total),
                    LoopVar::First => Value::Bool(ctx.is_first()),
                    LoopVar::Last => Value::Bool(ctx.is_last()),
                }),
                None => scope.metadata.get(&var.raw).cloned(),
            },
        }
    }
}

fn compare(op: BinaryOp, a: f64, b: f64) -> bool {
    match op {
        BinaryOp::Gt => a > b,
        BinaryOp::Lt => a < b,
        BinaryOp::GtEq => a >= b,
        BinaryOp::LtEq => a <= b,
        _ => false,
    }
}
