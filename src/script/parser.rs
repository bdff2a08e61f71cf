//! Recursive-descent parser for checks, expressions and message templates
//!
//! The parser holds one token of lookahead in `tok`. Interpolated strings are
//! parsed by alternating [`Scanner::seek_interp`] with ordinary token scans,
//! so the lookahead is only valid while parsing an operation or expression.

use crate::common::{Error, Result};

use super::ast::{
    Expression, ExpressionList, IString, Identifier, Interp, Literal, Operation, PrimaryExpr,
    Statement,
};
use super::scanner::Scanner;
use super::token::{Token, TokenKind};

pub struct Parser {
    scanner: Scanner,
    tok: Token,
}

/// Parse a check statement
pub fn parse_statement(input: &str) -> Result<Statement> {
    Parser::new(input).statement()
}

/// Parse a single expression, e.g. a loop source
pub fn parse_expression(input: &str) -> Result<Expression> {
    Parser::new(input).standalone_expression()
}

/// Parse an interpolated string; `None` when the input is empty
pub fn parse_istring(input: &str) -> Result<Option<IString>> {
    Parser::new(input).istring()
}

impl Parser {
    pub fn new(input: &str) -> Self {
        Self {
            scanner: Scanner::new(input),
            tok: Token::bare(TokenKind::Illegal),
        }
    }

    /// Advance to the next non-whitespace token
    fn next(&mut self) -> Result<()> {
        let mut tok = self.scanner.scan()?;
        if tok.kind == TokenKind::Whitespace {
            tok = self.scanner.scan()?;
        }
        tracing::trace!(kind = %tok.kind, literal = %tok.literal, "token");
        self.tok = tok;
        Ok(())
    }

    fn error_expected(&self, expected: impl std::fmt::Display) -> Error {
        let (line, col) = self.scanner.position();
        Error::Parse {
            line,
            col,
            message: format!(
                "found '{}' ({}), expected {}",
                self.tok.literal, self.tok.kind, expected
            ),
        }
    }

    fn expect(&mut self, kind: TokenKind) -> Result<()> {
        if self.tok.kind != kind {
            return Err(self.error_expected(kind));
        }
        self.next()
    }

    /// `Statement = Operation [ "//" IString ] .`
    pub fn statement(&mut self) -> Result<Statement> {
        self.next()?;
        let operation = self.operation()?;

        let message = match self.tok.kind {
            TokenKind::Comment => {
                self.scanner.skip_whitespace();
                self.istring()?
            }
            TokenKind::Eof => None,
            _ => return Err(self.error_expected("end of statement")),
        };

        Ok(Statement { operation, message })
    }

    /// `Operation = [ ExpressionList ] [ "not" ] Identifier [ ExpressionList ] .`
    ///
    /// When the subject list is a single bare identifier that is not followed
    /// by an operator name, that identifier is the operator and the operation
    /// has no subjects (`sh 'true'`).
    fn operation(&mut self) -> Result<Operation> {
        let mut subjects = if self.tok.kind == TokenKind::Not {
            ExpressionList { expressions: Vec::new() }
        } else {
            self.expression_list()?
        };

        let mut negate = false;
        if self.tok.kind == TokenKind::Not {
            negate = true;
            self.next()?;
        }

        let operator = if self.tok.kind == TokenKind::Ident {
            let name = self.tok.literal.clone();
            self.next()?;
            name
        } else if let Some(name) = lone_identifier(&subjects).filter(|_| !negate) {
            subjects.expressions.clear();
            name
        } else {
            return Err(self.error_expected(TokenKind::Ident));
        };

        let arguments = match self.tok.kind {
            TokenKind::Eof | TokenKind::Comment => None,
            _ => Some(self.expression_list()?),
        };

        Ok(Operation {
            subjects,
            negate,
            operator,
            arguments,
        })
    }

    /// `ExpressionList = Expression { "," Expression } .`
    fn expression_list(&mut self) -> Result<ExpressionList> {
        let mut expressions = vec![self.expression()?];
        while self.tok.kind == TokenKind::Comma {
            self.next()?;
            expressions.push(self.expression()?);
        }
        Ok(ExpressionList { expressions })
    }

    fn standalone_expression(&mut self) -> Result<Expression> {
        self.next()?;
        let expr = self.expression()?;
        if self.tok.kind != TokenKind::Eof {
            return Err(self.error_expected(TokenKind::Eof));
        }
        Ok(expr)
    }

    fn expression(&mut self) -> Result<Expression> {
        Ok(Expression::new(self.primary_expr()?))
    }

    /// `PrimaryExpr = Operand { Selector | Index } .`
    fn primary_expr(&mut self) -> Result<PrimaryExpr> {
        let mut expr = self.operand()?;
        loop {
            match self.tok.kind {
                TokenKind::Dot => {
                    self.next()?;
                    let field = self.tok.literal.clone();
                    self.expect(TokenKind::Ident)?;
                    expr = PrimaryExpr::selector(expr, field);
                }
                TokenKind::OpenBracket => {
                    self.next()?;
                    let index = self.primary_expr()?;
                    self.expect(TokenKind::CloseBracket)?;
                    expr = PrimaryExpr::index(expr, index);
                }
                _ => return Ok(expr),
            }
        }
    }

    fn operand(&mut self) -> Result<PrimaryExpr> {
        if self.tok.kind == TokenKind::Ident {
            let ident = PrimaryExpr::ident(self.tok.literal.clone());
            self.next()?;
            return Ok(ident);
        }
        if self.tok.kind.is_literal() {
            return Ok(PrimaryExpr::Literal(self.literal()?));
        }
        Err(self.error_expected("identifier or literal"))
    }

    fn literal(&mut self) -> Result<Literal> {
        let lit = match self.tok.kind {
            TokenKind::String => Literal::String(self.tok.literal.clone()),
            TokenKind::Number => {
                let n = self
                    .tok
                    .literal
                    .parse::<i64>()
                    .map_err(|_| self.error_expected("64-bit integer"))?;
                Literal::Int(n)
            }
            TokenKind::True => Literal::Bool(true),
            TokenKind::False => Literal::Bool(false),
            _ => return Err(self.error_expected("string or number or boolean")),
        };
        self.next()?;
        Ok(lit)
    }

    /// Parse literal text and `$ident` / `${expr}` markers up to end of input
    pub fn istring(&mut self) -> Result<Option<IString>> {
        let seek = self.scanner.seek_interp();
        if seek.kind == TokenKind::Eof {
            if seek.text.is_empty() {
                return Ok(None);
            }
            return Ok(Some(IString::literal(seek.text)));
        }

        let interp = if seek.expect_close {
            self.next()?;
            let expr = self.expression()?;
            // The closing brace is the lookahead; the scanner already sits
            // just past it, so no further token is read.
            if self.tok.kind != TokenKind::InterpolateEnd {
                return Err(self.error_expected(TokenKind::InterpolateEnd));
            }
            Interp::Expr(expr)
        } else {
            self.tok = self.scanner.scan_interp_ident();
            if self.tok.kind != TokenKind::Ident {
                return Err(self.error_expected(TokenKind::Ident));
            }
            Interp::Ident(Identifier::new(self.tok.literal.clone()))
        };

        let next = self.istring()?.map(Box::new);
        Ok(Some(IString {
            text: seek.text,
            interp: Some(interp),
            next,
        }))
    }
}

fn lone_identifier(list: &ExpressionList) -> Option<String> {
    match list.expressions.as_slice() {
        [Expression {
            primary: PrimaryExpr::Ident(ident),
        }] => Some(ident.name.clone()),
        _ => None,
    }
}
