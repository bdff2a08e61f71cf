//! The check and interpolation language
//!
//! Scripts are compiled once into immutable syntax trees and evaluated
//! many times against different variable scopes.

pub mod ast;
pub mod eval;
pub mod interpolate;
pub mod ops;
pub mod parser;
pub mod scanner;
pub mod token;
pub mod value;

pub use eval::{Context, Eval, Outcome};
pub use interpolate::{interpolate, interpolate_params};
pub use ops::{Operator, Registry, ScriptOperator};
pub use value::Value;

use crate::common::{Error, Result};

use ast::{Expression, Statement};

/// Source text paired with its compiled tree
#[derive(Debug, Clone)]
pub struct Script<T> {
    source: String,
    tree: T,
}

impl<T> Script<T> {
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn tree(&self) -> &T {
        &self.tree
    }
}

/// Evaluated check, with its display message resolved
#[derive(Debug, Clone, PartialEq)]
pub struct CheckOutcome {
    pub ok: bool,
    pub value: Value,
    pub message: String,
}

fn non_empty(source: &str) -> Result<&str> {
    if source.trim().is_empty() {
        return Err(Error::Compile("empty script".to_string()));
    }
    Ok(source)
}

impl Script<Statement> {
    pub fn statement(source: &str) -> Result<Self> {
        let tree = parser::parse_statement(non_empty(source)?)?;
        Ok(Self {
            source: source.to_string(),
            tree,
        })
    }

    /// Evaluate the check; the message falls back to the source text
    pub fn check(&self, ctx: &Context<'_>) -> Result<CheckOutcome> {
        let Outcome { ok, value, message } = self.tree.eval(ctx)?;
        Ok(CheckOutcome {
            ok,
            value,
            message: message.unwrap_or_else(|| self.source.clone()),
        })
    }
}

impl Script<Expression> {
    pub fn expression(source: &str) -> Result<Self> {
        let tree = parser::parse_expression(non_empty(source)?)?;
        Ok(Self {
            source: source.to_string(),
            tree,
        })
    }

    pub fn eval(&self, ctx: &Context<'_>) -> Result<Value> {
        Ok(self.tree.eval(ctx)?.value)
    }
}
