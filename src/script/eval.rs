//! Tree-walking evaluator
//!
//! Every node evaluates to an [`Eval`]: a pass flag plus a value. Errors
//! (undefined names, bad arity, incomparable types) abort the evaluation;
//! a failed check is just `ok == false`.

use crate::common::{Error, Result};
use crate::runtime::Scope;

use super::ast::{
    Expression, ExpressionList, IString, Identifier, Interp, Literal, Operation, PrimaryExpr,
    Statement,
};
use super::ops::Registry;
use super::value::Value;

/// Variables and operators visible to an evaluation
#[derive(Clone, Copy)]
pub struct Context<'a> {
    pub vars: &'a Scope,
    pub ops: &'a Registry,
}

/// Result of evaluating a node
#[derive(Debug, Clone, PartialEq)]
pub struct Eval {
    pub ok: bool,
    pub value: Value,
}

impl Eval {
    pub fn new(ok: bool, value: impl Into<Value>) -> Self {
        Self {
            ok,
            value: value.into(),
        }
    }

    pub fn pass(value: impl Into<Value>) -> Self {
        Self::new(true, value)
    }
}

/// Result of evaluating a statement
#[derive(Debug, Clone, PartialEq)]
pub struct Outcome {
    pub ok: bool,
    pub value: Value,
    /// Rendered message template, if the statement has one
    pub message: Option<String>,
}

impl<'a> Context<'a> {
    pub fn new(vars: &'a Scope, ops: &'a Registry) -> Self {
        Self { vars, ops }
    }
}

impl Statement {
    pub fn eval(&self, ctx: &Context<'_>) -> Result<Outcome> {
        let Eval { ok, value } = self.operation.eval(ctx)?;
        let message = match &self.message {
            Some(msg) => Some(msg.eval(ctx)?),
            None => None,
        };
        Ok(Outcome { ok, value, message })
    }
}

impl Operation {
    pub fn eval(&self, ctx: &Context<'_>) -> Result<Eval> {
        let (subjects_ok, subjects) = self.subjects.eval(ctx)?;
        let op = ctx.ops.get(&self.operator)?;
        let (args_ok, args) = match &self.arguments {
            Some(list) => list.eval(ctx)?,
            None => (true, Vec::new()),
        };

        let result = op.call(&subjects, &args)?;
        tracing::trace!(op = %self.operator, ok = result.ok, "operation");

        let ok = subjects_ok && args_ok && result.ok;
        Ok(Eval {
            ok: ok != self.negate,
            value: result.value,
        })
    }
}

impl ExpressionList {
    /// Evaluate every expression in order, stopping at the first error
    pub fn eval(&self, ctx: &Context<'_>) -> Result<(bool, Vec<Value>)> {
        let mut ok = true;
        let mut values = Vec::with_capacity(self.expressions.len());
        for expr in &self.expressions {
            let e = expr.eval(ctx)?;
            ok &= e.ok;
            values.push(e.value);
        }
        Ok((ok, values))
    }
}

impl Expression {
    pub fn eval(&self, ctx: &Context<'_>) -> Result<Eval> {
        self.primary.eval(ctx)
    }
}

impl PrimaryExpr {
    pub fn eval(&self, ctx: &Context<'_>) -> Result<Eval> {
        match self {
            PrimaryExpr::Literal(lit) => Ok(Eval::pass(lit.value())),
            PrimaryExpr::Ident(ident) => ident.eval(ctx),
            PrimaryExpr::Selector { operand, field } => {
                let operand = operand.eval(ctx)?;
                let value = operand.value.extract(&Value::from(field.as_str()));
                Ok(Eval::new(operand.ok, value))
            }
            PrimaryExpr::Index { operand, index } => {
                let operand = operand.eval(ctx)?;
                let index = index.eval(ctx)?;
                let value = operand.value.extract(&index.value);
                Ok(Eval::new(operand.ok && index.ok, value))
            }
        }
    }
}

impl Identifier {
    pub fn eval(&self, ctx: &Context<'_>) -> Result<Eval> {
        match ctx.vars.get(&self.name) {
            Some(value) => Ok(Eval::pass(value)),
            None => Err(Error::NotFound(self.name.clone())),
        }
    }
}

impl Literal {
    pub fn value(&self) -> Value {
        match self {
            Literal::String(s) => Value::String(s.clone()),
            Literal::Int(i) => Value::Int(*i),
            Literal::Bool(b) => Value::Bool(*b),
        }
    }
}

impl IString {
    /// Render the template, string-coercing each embedded value
    pub fn eval(&self, ctx: &Context<'_>) -> Result<String> {
        let mut out = String::new();
        for seg in self.segments() {
            out.push_str(&seg.text);
            let value = match &seg.interp {
                Some(Interp::Ident(ident)) => ident.eval(ctx)?.value,
                Some(Interp::Expr(expr)) => expr.eval(ctx)?.value,
                None => continue,
            };
            out.push_str(&value.coerce_string()?);
        }
        Ok(out)
    }
}
