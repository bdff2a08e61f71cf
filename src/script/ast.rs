//! Syntax tree of the check language
//!
//! ```text
//! Statement      = Operation [ "//" IString ] .
//! Operation      = ExpressionList [ "not" ] Identifier [ ExpressionList ] .
//! ExpressionList = Expression { "," Expression } .
//! Expression     = PrimaryExpr .
//! PrimaryExpr    = Operand { Selector | Index } .
//! Operand        = Identifier | Literal .
//! Selector       = "." Identifier .
//! Index          = "[" PrimaryExpr "]" .
//! Literal        = String | Number | "true" | "false" .
//! ```
//!
//! Trees are built once by the parser and never mutated afterwards.

use std::fmt::{self, Write};

#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub operation: Operation,
    /// Message template following `//`
    pub message: Option<IString>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Operation {
    pub subjects: ExpressionList,
    pub negate: bool,
    pub operator: String,
    pub arguments: Option<ExpressionList>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExpressionList {
    pub expressions: Vec<Expression>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Expression {
    pub primary: PrimaryExpr,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PrimaryExpr {
    Literal(Literal),
    Ident(Identifier),
    /// `operand.field`
    Selector {
        operand: Box<PrimaryExpr>,
        field: String,
    },
    /// `operand[index]`
    Index {
        operand: Box<PrimaryExpr>,
        index: Box<PrimaryExpr>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    String(String),
    Int(i64),
    Bool(bool),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Identifier {
    pub name: String,
}

/// Interpolated string: a chain of literal text segments, each optionally
/// followed by an embedded value
#[derive(Debug, Clone, PartialEq)]
pub struct IString {
    pub text: String,
    pub interp: Option<Interp>,
    pub next: Option<Box<IString>>,
}

/// Value embedded in an interpolated string
#[derive(Debug, Clone, PartialEq)]
pub enum Interp {
    /// `$name`
    Ident(Identifier),
    /// `${expr}`
    Expr(Expression),
}

impl Identifier {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl Expression {
    pub fn new(primary: PrimaryExpr) -> Self {
        Self { primary }
    }
}

impl PrimaryExpr {
    pub fn ident(name: impl Into<String>) -> Self {
        PrimaryExpr::Ident(Identifier::new(name))
    }

    pub fn selector(operand: PrimaryExpr, field: impl Into<String>) -> Self {
        PrimaryExpr::Selector {
            operand: Box::new(operand),
            field: field.into(),
        }
    }

    pub fn index(operand: PrimaryExpr, index: PrimaryExpr) -> Self {
        PrimaryExpr::Index {
            operand: Box::new(operand),
            index: Box::new(index),
        }
    }
}

impl IString {
    pub fn literal(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            interp: None,
            next: None,
        }
    }

    /// Iterate the segments of the chain in order
    pub fn segments(&self) -> impl Iterator<Item = &IString> {
        std::iter::successors(Some(self), |seg| seg.next.as_deref())
    }
}

// Indented tree dump, for tests and debugging.

fn pad(out: &mut String, indent: usize) {
    out.extend(std::iter::repeat(' ').take(indent));
}

impl Statement {
    pub fn dump(&self) -> String {
        let mut out = String::new();
        self.dump_into(&mut out, 0);
        out
    }

    fn dump_into(&self, out: &mut String, indent: usize) {
        pad(out, indent);
        out.push_str("- statement:\n");
        self.operation.dump_into(out, indent + 4);
        if let Some(msg) = &self.message {
            msg.dump_into(out, indent + 4);
        }
    }
}

impl Operation {
    fn dump_into(&self, out: &mut String, indent: usize) {
        pad(out, indent);
        out.push_str("operation:\n");
        self.subjects.dump_into(out, indent + 2);
        pad(out, indent + 2);
        let not = if self.negate { "not " } else { "" };
        let _ = writeln!(out, "function: {}{}", not, self.operator);
        if let Some(args) = &self.arguments {
            args.dump_into(out, indent + 2);
        }
    }
}

impl ExpressionList {
    fn dump_into(&self, out: &mut String, indent: usize) {
        pad(out, indent);
        out.push_str("expression_list:\n");
        for expr in &self.expressions {
            expr.dump_into(out, indent);
        }
    }
}

impl Expression {
    pub fn dump(&self) -> String {
        let mut out = String::new();
        self.dump_into(&mut out, 0);
        out
    }

    fn dump_into(&self, out: &mut String, indent: usize) {
        pad(out, indent);
        out.push_str("- expression:\n");
        self.primary.dump_into(out, indent + 2);
    }
}

impl PrimaryExpr {
    fn dump_into(&self, out: &mut String, indent: usize) {
        pad(out, indent);
        out.push_str("- primary_expr:\n");
        match self {
            PrimaryExpr::Literal(lit) => {
                pad(out, indent + 4);
                let _ = writeln!(out, "literal: {}", lit);
            }
            PrimaryExpr::Ident(ident) => {
                pad(out, indent + 4);
                let _ = writeln!(out, "identifier: {}", ident.name);
            }
            PrimaryExpr::Selector { operand, field } => {
                pad(out, indent + 4);
                let _ = writeln!(out, "selector: {}", field);
                operand.dump_into(out, indent + 6);
            }
            PrimaryExpr::Index { operand, index } => {
                pad(out, indent + 4);
                out.push_str("index_expr:\n");
                operand.dump_into(out, indent + 6);
                index.dump_into(out, indent + 6);
            }
        }
    }
}

impl IString {
    fn dump_into(&self, out: &mut String, indent: usize) {
        pad(out, indent);
        out.push_str("istring:\n");
        for seg in self.segments() {
            pad(out, indent + 2);
            let _ = writeln!(out, "string: '{}'", seg.text);
            match &seg.interp {
                Some(Interp::Ident(ident)) => {
                    pad(out, indent + 2);
                    let _ = writeln!(out, "identifier: {}", ident.name);
                }
                Some(Interp::Expr(expr)) => expr.dump_into(out, indent + 2),
                None => {}
            }
        }
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::String(s) => write!(f, "{:?}", s),
            Literal::Int(i) => write!(f, "{}", i),
            Literal::Bool(b) => write!(f, "{}", b),
        }
    }
}
