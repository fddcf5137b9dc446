//! Hand-written lexer for the automation language.
//!
//! The lexer is a lazy iterator over [`Token`]s. Whitespace separates
//! tokens; `/`, `*`, `=`, `$`, `{` and `}` are single-character tokens.
//! A time literal (`10:00`) must be followed by `AM` or `PM`, with any
//! whitespace between them consumed. An error token carries its message
//! in the token value and terminates the stream.

use crate::token::{keyword, Position, Token, TokenKind};

const DURATION_UNITS: [char; 4] = ['u', 's', 'm', 'h'];

/// Lazy token stream over a source string.
pub struct Lexer<'a> {
    src: &'a str,
    /// Byte offset of the scan cursor.
    pos: usize,
    /// Byte offset where the current token started.
    start: usize,
    /// Position of the current token start, 1-indexed.
    line: u32,
    column: u32,
    /// A token scanned ahead of its turn (the AM/PM after a time literal).
    pending: Option<Token>,
    done: bool,
}

impl<'a> Lexer<'a> {
    pub fn new(src: &'a str) -> Self {
        Self {
            src,
            pos: 0,
            start: 0,
            line: 1,
            column: 1,
            pending: None,
            done: false,
        }
    }

    fn peek_char(&self) -> Option<char> {
        self.src[self.pos..].chars().next()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek_char()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    /// The text consumed since the last emit.
    fn current(&self) -> &'a str {
        &self.src[self.start..self.pos]
    }

    /// Advance the line/column counters over the consumed text and mark a
    /// new token start.
    fn advance(&mut self) {
        for c in self.current().chars() {
            if c == '\n' {
                self.line += 1;
                self.column = 1;
            } else {
                self.column += 1;
            }
        }
        self.start = self.pos;
    }

    fn cursor_position(&self) -> Position {
        Position::new(self.line, self.column)
    }

    fn emit(&mut self, kind: TokenKind) -> Token {
        let token = Token::new(self.cursor_position(), kind, self.current());
        self.advance();
        token
    }

    fn error(&mut self, message: impl Into<String>) -> Token {
        self.done = true;
        Token::new(self.cursor_position(), TokenKind::Error, message)
    }

    fn skip_whitespace(&mut self) {
        while let Some(c) = self.peek_char() {
            if !c.is_whitespace() {
                break;
            }
            self.bump();
            self.advance();
        }
    }

    fn scan_word(&mut self) -> Token {
        while let Some(c) = self.peek_char() {
            if is_ident(c) {
                self.bump();
            } else {
                break;
            }
        }
        match keyword(self.current()) {
            Some(kind) => self.emit(kind),
            None => self.emit(TokenKind::Word),
        }
    }

    fn scan_digits(&mut self) {
        while let Some(c) = self.peek_char() {
            if c.is_ascii_digit() {
                self.bump();
            } else {
                break;
            }
        }
    }

    /// A digit run is a number, a duration (unit suffix), or the hour part
    /// of a time literal.
    fn scan_number(&mut self) -> Token {
        self.scan_digits();
        match self.peek_char() {
            Some('.') => {
                self.bump();
                self.scan_digits();
                self.emit(TokenKind::Number)
            }
            Some(':') => {
                self.bump();
                self.scan_digits();
                self.scan_time_suffix()
            }
            Some(c) if DURATION_UNITS.contains(&c) => {
                self.bump();
                if c == 'm' && self.peek_char() == Some('s') {
                    self.bump();
                }
                self.emit(TokenKind::Duration)
            }
            _ => self.emit(TokenKind::Number),
        }
    }

    /// Emit the time token, then scan the required AM/PM into `pending`.
    fn scan_time_suffix(&mut self) -> Token {
        let time = self.emit(TokenKind::Time);
        self.skip_whitespace();
        let meridiem = match self.bump() {
            Some(half @ ('A' | 'P')) => {
                if self.bump() == Some('M') {
                    let kind = if half == 'A' {
                        TokenKind::Am
                    } else {
                        TokenKind::Pm
                    };
                    self.emit(kind)
                } else {
                    self.error("expected AM or PM")
                }
            }
            _ => self.error("expected AM or PM"),
        };
        self.pending = Some(meridiem);
        // error() marks the stream done; defer that until the pending
        // token has actually been returned.
        self.done = false;
        time
    }

    fn scan_string(&mut self, quote: char) -> Token {
        loop {
            match self.bump() {
                Some('\\') => {
                    if self.peek_char() == Some(quote) {
                        self.bump();
                    }
                }
                Some(c) if c == quote => return self.emit(TokenKind::Str),
                Some(_) => {}
                None => return self.error("unterminated string"),
            }
        }
    }
}

impl Iterator for Lexer<'_> {
    type Item = Token;

    fn next(&mut self) -> Option<Token> {
        if let Some(token) = self.pending.take() {
            if token.kind == TokenKind::Error {
                self.done = true;
            }
            return Some(token);
        }
        if self.done {
            return None;
        }
        self.skip_whitespace();
        let token = match self.bump() {
            None => {
                self.done = true;
                Token::new(self.cursor_position(), TokenKind::Eof, "")
            }
            Some(c) if c.is_alphabetic() || c == '_' => self.scan_word(),
            Some(c) if c.is_ascii_digit() => self.scan_number(),
            Some('/') => self.emit(TokenKind::PathSeparator),
            Some('*') => self.emit(TokenKind::Star),
            Some('=') => self.emit(TokenKind::Assign),
            Some('$') => self.emit(TokenKind::Dollar),
            Some('{') => self.emit(TokenKind::OpenBrace),
            Some('}') => self.emit(TokenKind::CloseBrace),
            Some(c @ ('\'' | '"')) => self.scan_string(c),
            Some(c) => self.error(format!("unexpected character {c:?}")),
        };
        Some(token)
    }
}

fn is_ident(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}
