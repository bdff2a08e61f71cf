//! Lexical tokens of the check language

use std::fmt;

/// Kind of a scanned token
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Illegal,
    Eof,
    Whitespace,

    Ident,
    Number,
    String,

    Comma,
    Comment,

    OpenParen,
    CloseParen,
    OpenBracket,
    CloseBracket,

    True,
    False,

    Dot,
    And,
    Or,
    Xor,
    Not,

    InterpolateBegin,
    InterpolateEnd,

    Escape,
}

impl TokenKind {
    /// Keyword lookup for a scanned word
    pub fn keyword(word: &str) -> Option<TokenKind> {
        match word {
            "true" => Some(TokenKind::True),
            "false" => Some(TokenKind::False),
            "and" => Some(TokenKind::And),
            "or" => Some(TokenKind::Or),
            "xor" => Some(TokenKind::Xor),
            "not" => Some(TokenKind::Not),
            _ => None,
        }
    }

    pub fn is_literal(self) -> bool {
        matches!(
            self,
            TokenKind::String | TokenKind::Number | TokenKind::True | TokenKind::False
        )
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TokenKind::Illegal => "illegal",
            TokenKind::Eof => "eof",
            TokenKind::Whitespace => "whitespace",
            TokenKind::Ident => "identifier",
            TokenKind::Number => "number",
            TokenKind::String => "string",
            TokenKind::Comma => "comma",
            TokenKind::Comment => "comment",
            TokenKind::OpenParen => "(",
            TokenKind::CloseParen => ")",
            TokenKind::OpenBracket => "[",
            TokenKind::CloseBracket => "]",
            TokenKind::True => "true",
            TokenKind::False => "false",
            TokenKind::Dot => ".",
            TokenKind::And => "and",
            TokenKind::Or => "or",
            TokenKind::Xor => "xor",
            TokenKind::Not => "not",
            TokenKind::InterpolateBegin => "interpolate_begin",
            TokenKind::InterpolateEnd => "}",
            TokenKind::Escape => "escape",
        };
        f.write_str(s)
    }
}

/// A scanned token: its kind plus literal text
///
/// Only identifiers, numbers, strings, whitespace, interpolation markers and
/// illegal characters carry literal text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub literal: String,
}

impl Token {
    pub fn new(kind: TokenKind, literal: impl Into<String>) -> Self {
        Self {
            kind,
            literal: literal.into(),
        }
    }

    pub fn bare(kind: TokenKind) -> Self {
        Self {
            kind,
            literal: String::new(),
        }
    }
}
