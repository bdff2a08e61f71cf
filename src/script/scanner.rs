//! Scanner for the check language
//!
//! Two scan modes share one character stream:
//! - [`Scanner::scan`] produces ordinary tokens.
//! - [`Scanner::seek_interp`] accumulates literal text up to the next
//!   unescaped `$` marker and is used while parsing interpolated strings.
//!
//! The parser interleaves both modes, so the scanner keeps the start of the
//! last scanned token and can push exactly one token back.

use crate::common::{Error, Result};

use super::token::{Token, TokenKind};

/// Outcome of [`Scanner::seek_interp`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterpSeek {
    /// `InterpolateBegin` if a marker was found, otherwise `Eof`
    pub kind: TokenKind,
    /// True when the marker was `${`, so a closing `}` is expected
    pub expect_close: bool,
    /// Literal text preceding the marker
    pub text: String,
}

pub struct Scanner {
    chars: Vec<char>,
    pos: usize,
    last_start: Option<usize>,
}

impl Scanner {
    pub fn new(input: &str) -> Self {
        Self {
            chars: input.chars().collect(),
            pos: 0,
            last_start: None,
        }
    }

    /// 1-based line and column of the current position
    pub fn position(&self) -> (usize, usize) {
        let mut line = 1;
        let mut col = 1;
        for &ch in &self.chars[..self.pos.min(self.chars.len())] {
            if ch == '\n' {
                line += 1;
                col = 1;
            } else {
                col += 1;
            }
        }
        (line, col)
    }

    fn read(&mut self) -> Option<char> {
        let ch = self.chars.get(self.pos).copied();
        if ch.is_some() {
            self.pos += 1;
        }
        ch
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_second(&self) -> Option<char> {
        self.chars.get(self.pos + 1).copied()
    }

    /// Push back the most recently scanned token
    ///
    /// Only one token can be pushed back; a second call without an
    /// intervening scan is a no-op.
    pub fn unscan(&mut self) {
        if let Some(start) = self.last_start.take() {
            self.pos = start;
        }
    }

    /// Scan the next token
    pub fn scan(&mut self) -> Result<Token> {
        self.last_start = Some(self.pos);

        let Some(ch) = self.peek() else {
            return Ok(Token::bare(TokenKind::Eof));
        };

        if is_whitespace(ch) {
            return Ok(self.consume_whitespace());
        }
        if ch == '$' {
            return Ok(self.consume_dollar());
        }
        if ch == '-' && self.peek_second().is_some_and(is_digit) {
            return Ok(self.consume_number());
        }
        if is_ident_char(ch) {
            return Ok(self.consume_identifier());
        }
        if is_quote(ch) {
            return self.consume_string();
        }
        if is_digit(ch) {
            return Ok(self.consume_number());
        }
        if ch == '/' {
            return Ok(self.consume_comment());
        }

        self.read();
        let kind = match ch {
            '(' => TokenKind::OpenParen,
            ')' => TokenKind::CloseParen,
            '[' => TokenKind::OpenBracket,
            ']' => TokenKind::CloseBracket,
            ',' => TokenKind::Comma,
            '.' => TokenKind::Dot,
            '}' => TokenKind::InterpolateEnd,
            '\\' => TokenKind::Escape,
            _ => return Ok(Token::new(TokenKind::Illegal, ch.to_string())),
        };
        Ok(Token::bare(kind))
    }

    /// Skip whitespace without producing a token
    pub fn skip_whitespace(&mut self) {
        while self.peek().is_some_and(is_whitespace) {
            self.pos += 1;
        }
    }

    /// Accumulate literal text until the next interpolation marker
    ///
    /// `\$` yields a literal `$`. A trailing `$` or `${` at end of input is
    /// kept as literal text.
    pub fn seek_interp(&mut self) -> InterpSeek {
        self.last_start = None;
        let mut text = String::new();

        loop {
            let Some(ch) = self.read() else {
                return InterpSeek {
                    kind: TokenKind::Eof,
                    expect_close: false,
                    text,
                };
            };

            // An escaped `$` stays literal, backslash included.
            if ch == '\\' && self.peek() == Some('$') {
                self.read();
                text.push_str("\\$");
                continue;
            }

            if ch != '$' {
                text.push(ch);
                continue;
            }

            let mut expect_close = false;
            if self.peek() == Some('{') {
                self.read();
                expect_close = true;
            }

            if self.peek().is_none() {
                text.push('$');
                if expect_close {
                    text.push('{');
                }
                return InterpSeek {
                    kind: TokenKind::Eof,
                    expect_close: false,
                    text,
                };
            }

            return InterpSeek {
                kind: TokenKind::InterpolateBegin,
                expect_close,
                text,
            };
        }
    }

    /// Scan the bare identifier following a `$` marker
    ///
    /// Leading digits are accepted and name positional variables (`$1`).
    pub fn scan_interp_ident(&mut self) -> Token {
        self.last_start = Some(self.pos);
        let start = self.pos;
        while self.peek().is_some_and(|c| is_ident_char(c) || is_digit(c)) {
            self.pos += 1;
        }
        let word: String = self.chars[start..self.pos].iter().collect();
        if word.is_empty() {
            return match self.read() {
                Some(ch) => Token::new(TokenKind::Illegal, ch.to_string()),
                None => Token::bare(TokenKind::Eof),
            };
        }
        if word.starts_with(|c: char| is_digit(c)) {
            return Token::new(TokenKind::Ident, format!("${}", word));
        }
        Token::new(TokenKind::Ident, word)
    }

    fn consume_whitespace(&mut self) -> Token {
        let mut buf = String::new();
        while let Some(ch) = self.peek().filter(|&c| is_whitespace(c)) {
            self.pos += 1;
            buf.push(ch);
        }
        Token::new(TokenKind::Whitespace, buf)
    }

    fn consume_comment(&mut self) -> Token {
        self.read();
        if self.peek() != Some('/') {
            return Token::new(TokenKind::Illegal, "/");
        }
        self.read();
        Token::bare(TokenKind::Comment)
    }

    fn consume_string(&mut self) -> Result<Token> {
        let quote = self.read();
        let mut buf = String::new();
        loop {
            match self.read() {
                None => return Err(Error::UnexpectedEof(buf)),
                Some(ch) if Some(ch) == quote => break,
                Some(ch) => buf.push(ch),
            }
        }
        Ok(Token::new(TokenKind::String, buf))
    }

    fn consume_identifier(&mut self) -> Token {
        let mut buf = String::new();
        while let Some(ch) = self.peek().filter(|&c| is_ident_char(c) || is_digit(c)) {
            self.pos += 1;
            buf.push(ch);
        }
        match TokenKind::keyword(&buf) {
            Some(kind) => Token::bare(kind),
            None => Token::new(TokenKind::Ident, buf),
        }
    }

    /// `$name` and `$1` are identifiers; `$` and `${` open an interpolation
    ///
    /// The sigil is dropped from named identifiers and kept on positional
    /// ones, matching [`Scanner::scan_interp_ident`].
    fn consume_dollar(&mut self) -> Token {
        self.read();
        match self.peek() {
            Some(c) if is_ident_char(c) || is_digit(c) => {
                let mut buf = String::new();
                if is_digit(c) {
                    buf.push('$');
                }
                while let Some(ch) = self.peek().filter(|&c| is_ident_char(c) || is_digit(c)) {
                    self.pos += 1;
                    buf.push(ch);
                }
                Token::new(TokenKind::Ident, buf)
            }
            Some('{') => {
                self.read();
                Token::new(TokenKind::InterpolateBegin, "${")
            }
            _ => Token::new(TokenKind::InterpolateBegin, "$"),
        }
    }

    fn consume_number(&mut self) -> Token {
        let mut buf = String::new();
        if let Some(ch) = self.read() {
            buf.push(ch);
        }
        while let Some(ch) = self.peek().filter(|&c| is_digit(c)) {
            self.pos += 1;
            buf.push(ch);
        }
        Token::new(TokenKind::Number, buf)
    }
}

fn is_whitespace(ch: char) -> bool {
    matches!(ch, ' ' | '\t' | '\n' | '\r')
}

fn is_digit(ch: char) -> bool {
    ch.is_ascii_digit()
}

fn is_letter(ch: char) -> bool {
    ch.is_alphabetic()
}

fn is_ident_char(ch: char) -> bool {
    is_letter(ch) || ch == '_' || ch == '-'
}

fn is_quote(ch: char) -> bool {
    matches!(ch, '"' | '\'' | '`')
}
