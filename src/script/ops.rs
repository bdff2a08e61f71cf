//! Operators and the operator registry
//!
//! Operators are stateless and validate their own arity when called. The
//! standard set is `eq`, `gt`, `gte`, `lt`, `lte`, `in`, `contains` and `sh`;
//! Crashfile `checks` add [`ScriptOperator`]s on top.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::process::{Command, Stdio};
use std::sync::{Arc, Weak};

use crate::common::{Error, Result};
use crate::runtime::Scope;

use super::ast::Statement;
use super::eval::{Context, Eval};
use super::value::Value;

/// A named predicate callable from a check
pub trait Operator: Send + Sync {
    fn call(&self, subjects: &[Value], args: &[Value]) -> Result<Eval>;
}

/// Operators by name
#[derive(Clone, Default)]
pub struct Registry {
    ops: HashMap<String, Arc<dyn Operator>>,
}

impl Registry {
    /// An empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// The built-in operators
    pub fn standard() -> Self {
        let mut reg = Self::new();
        reg.register("eq", LooseEq);
        reg.register("gt", Ordered::new("gt", |o| o == Ordering::Greater));
        reg.register("gte", Ordered::new("gte", |o| o != Ordering::Less));
        reg.register("lt", Ordered::new("lt", |o| o == Ordering::Less));
        reg.register("lte", Ordered::new("lte", |o| o != Ordering::Greater));
        reg.register("in", In);
        reg.register("contains", Contains);
        reg.register("sh", Sh::default());
        reg
    }

    /// Add or replace an operator
    pub fn register(&mut self, name: impl Into<String>, op: impl Operator + 'static) {
        self.ops.insert(name.into(), Arc::new(op));
    }

    pub fn contains(&self, name: &str) -> bool {
        self.ops.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Result<Arc<dyn Operator>> {
        self.ops
            .get(name)
            .cloned()
            .ok_or_else(|| Error::UnknownOperator(name.to_string()))
    }
}

fn one_subject<'v>(op: &str, subjects: &'v [Value]) -> Result<&'v Value> {
    match subjects {
        [subject] => Ok(subject),
        _ => Err(Error::arity(
            op,
            format!("allows only one subject, found {}", subjects.len()),
        )),
    }
}

fn one_arg<'v>(op: &str, args: &'v [Value]) -> Result<&'v Value> {
    match args {
        [arg] => Ok(arg),
        _ => Err(Error::arity(
            op,
            format!("accepts only one argument, found {}", args.len()),
        )),
    }
}

fn arg_count(op: &str, args: &[Value], count: usize) -> Result<()> {
    if args.len() != count {
        return Err(Error::arity(
            op,
            format!("accepts {} arguments, found {}", count, args.len()),
        ));
    }
    Ok(())
}

/// `subject eq a, b, ...`: subject loosely equals any argument
pub struct LooseEq;

impl Operator for LooseEq {
    fn call(&self, subjects: &[Value], args: &[Value]) -> Result<Eval> {
        let subject = one_subject("eq", subjects)?;
        if args.is_empty() {
            return Err(Error::arity("eq", "requires at least one argument, found 0"));
        }
        let matched = args.iter().any(|arg| subject.loose_equal(arg));
        Ok(Eval::new(matched, matched))
    }
}

/// `gt`, `gte`, `lt`, `lte`
pub struct Ordered {
    name: &'static str,
    accept: fn(Ordering) -> bool,
}

impl Ordered {
    pub fn new(name: &'static str, accept: fn(Ordering) -> bool) -> Self {
        Self { name, accept }
    }
}

impl Operator for Ordered {
    fn call(&self, subjects: &[Value], args: &[Value]) -> Result<Eval> {
        let subject = one_subject(self.name, subjects)?;
        let arg = one_arg(self.name, args)?;
        let pass = (self.accept)(subject.compare(arg)?);
        Ok(Eval::new(pass, pass))
    }
}

/// `subject in min, max`: inclusive range
pub struct In;

impl Operator for In {
    fn call(&self, subjects: &[Value], args: &[Value]) -> Result<Eval> {
        let subject = one_subject("in", subjects)?;
        arg_count("in", args, 2)?;
        let pass = subject.compare(&args[0])? != Ordering::Less
            && subject.compare(&args[1])? != Ordering::Greater;
        Ok(Eval::new(pass, pass))
    }
}

/// `subject contains needle`: substring test on string forms
///
/// A needle with no string form never matches.
pub struct Contains;

impl Operator for Contains {
    fn call(&self, subjects: &[Value], args: &[Value]) -> Result<Eval> {
        let subject = one_subject("contains", subjects)?;
        arg_count("contains", args, 1)?;
        let Ok(needle) = args[0].coerce_string() else {
            return Ok(Eval::new(false, false));
        };
        let pass = subject.coerce_string()?.contains(&needle);
        Ok(Eval::new(pass, pass))
    }
}

/// `sh 'command'`: passes when the command exits 0, yields its stdout
///
/// Blocks until the command finishes.
pub struct Sh {
    program: String,
    arg: String,
}

impl Sh {
    pub fn new(program: impl Into<String>, arg: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            arg: arg.into(),
        }
    }
}

impl Default for Sh {
    fn default() -> Self {
        Self::new("sh", "-c")
    }
}

impl Operator for Sh {
    fn call(&self, subjects: &[Value], args: &[Value]) -> Result<Eval> {
        if !subjects.is_empty() {
            return Err(Error::arity(
                "sh",
                format!("allows no subjects, found {}", subjects.len()),
            ));
        }
        let command = one_arg("sh", args)?.coerce_string()?;

        tracing::debug!(command = %command, "sh");
        let output = Command::new(&self.program)
            .arg(&self.arg)
            .arg(&command)
            .stdin(Stdio::null())
            .output()?;

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        Ok(Eval::new(output.status.success(), stdout))
    }
}

/// A user-defined check used as an operator
///
/// Subjects then arguments are bound to `$1`, `$2`, ... in a fresh scope and
/// the statement is evaluated against `ops`, usually the registry this
/// operator itself belongs to.
pub struct ScriptOperator {
    statement: Statement,
    ops: Weak<Registry>,
}

impl ScriptOperator {
    pub fn new(statement: Statement, ops: Weak<Registry>) -> Self {
        Self { statement, ops }
    }
}

impl Operator for ScriptOperator {
    fn call(&self, subjects: &[Value], args: &[Value]) -> Result<Eval> {
        let scope = Scope::default();
        for (i, value) in subjects.iter().chain(args).enumerate() {
            scope.set(format!("${}", i + 1), value.clone());
        }
        let ops = self
            .ops
            .upgrade()
            .ok_or_else(|| Error::Internal("operator registry dropped".to_string()))?;
        let outcome = self.statement.eval(&Context::new(&scope, &ops))?;
        Ok(Eval::new(outcome.ok, outcome.value))
    }
}
