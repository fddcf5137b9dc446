//! Tokens produced by the lexer.

use std::fmt;

/// A 1-indexed line/column position in the source text.
///
/// Every token and AST node carries the position it started at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Position {
    pub line: u32,
    pub column: u32,
}

impl Position {
    pub fn new(line: u32, column: u32) -> Self {
        Self { line, column }
    }

    /// The start of a source text.
    pub fn origin() -> Self {
        Self { line: 1, column: 1 }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {} char {}", self.line, self.column)
    }
}

/// The kind of a lexical token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    /// Lexing failed; the token value holds the message.
    Error,
    Eof,

    // Keywords
    List,
    Set,
    Get,
    Var,
    Scene,
    At,
    When,
    Wait,
    Is,
    Am,
    Pm,
    Start,
    Stop,

    // Literals and punctuation
    Word,
    Str,
    Number,
    Duration,
    Time,
    Assign,
    Star,
    PathSeparator,
    Dollar,
    OpenBrace,
    CloseBrace,
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TokenKind::Error => "error",
            TokenKind::Eof => "eof",
            TokenKind::List => "list",
            TokenKind::Set => "set",
            TokenKind::Get => "get",
            TokenKind::Var => "var",
            TokenKind::Scene => "scene",
            TokenKind::At => "at",
            TokenKind::When => "when",
            TokenKind::Wait => "wait",
            TokenKind::Is => "is",
            TokenKind::Am => "am",
            TokenKind::Pm => "pm",
            TokenKind::Start => "start",
            TokenKind::Stop => "stop",
            TokenKind::Word => "word",
            TokenKind::Str => "string",
            TokenKind::Number => "number",
            TokenKind::Duration => "duration",
            TokenKind::Time => "time",
            TokenKind::Assign => "assign",
            TokenKind::Star => "star",
            TokenKind::PathSeparator => "pathseparator",
            TokenKind::Dollar => "dollar",
            TokenKind::OpenBrace => "openbrace",
            TokenKind::CloseBrace => "closebrace",
        };
        f.write_str(s)
    }
}

/// A lexical token with its source position and raw text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub pos: Position,
    pub kind: TokenKind,
    pub value: String,
}

impl Token {
    pub fn new(pos: Position, kind: TokenKind, value: impl Into<String>) -> Self {
        Self {
            pos,
            kind,
            value: value.into(),
        }
    }
}

/// Look up the keyword kind for an identifier, if it is one.
///
/// Keywords are case-sensitive; `AM` and `PM` are the only uppercase ones.
pub(crate) fn keyword(ident: &str) -> Option<TokenKind> {
    let kind = match ident {
        "list" => TokenKind::List,
        "set" => TokenKind::Set,
        "get" => TokenKind::Get,
        "var" => TokenKind::Var,
        "scene" => TokenKind::Scene,
        "at" => TokenKind::At,
        "when" => TokenKind::When,
        "wait" => TokenKind::Wait,
        "is" => TokenKind::Is,
        "start" => TokenKind::Start,
        "stop" => TokenKind::Stop,
        "AM" => TokenKind::Am,
        "PM" => TokenKind::Pm,
        _ => return None,
    };
    Some(kind)
}
