//! Recursive-descent parser with one token of lookahead.
//!
//! Parsing does not attempt recovery: the first failure is returned as a
//! [`ParseError`] carrying the offending position.

use std::time::Duration;

use thiserror::Error;

use crate::ast::*;
use crate::lexer::Lexer;
use crate::token::{Position, Token, TokenKind};

/// A parse failure with the position it occurred at.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("parse error at {pos}: {message}")]
pub struct ParseError {
    pub pos: Position,
    pub message: String,
}

impl ParseError {
    fn new(pos: Position, message: impl Into<String>) -> Self {
        Self {
            pos,
            message: message.into(),
        }
    }
}

pub type ParseResult<T> = Result<T, ParseError>;

/// Parse a source string into a [`Program`].
pub fn parse(input: &str) -> ParseResult<Program> {
    Parser::new(Lexer::new(input)).program()
}

struct Parser<'a> {
    lexer: Lexer<'a>,
    lookahead: Option<Token>,
    last_pos: Position,
}

impl<'a> Parser<'a> {
    fn new(lexer: Lexer<'a>) -> Self {
        Self {
            lexer,
            lookahead: None,
            last_pos: Position::origin(),
        }
    }

    fn fill(&mut self) {
        if self.lookahead.is_none() {
            let token = self
                .lexer
                .next()
                .unwrap_or_else(|| Token::new(self.last_pos, TokenKind::Eof, ""));
            self.last_pos = token.pos;
            self.lookahead = Some(token);
        }
    }

    fn peek_kind(&mut self) -> TokenKind {
        self.fill();
        self.lookahead.as_ref().map(|t| t.kind).unwrap_or(TokenKind::Eof)
    }

    fn peek_pos(&mut self) -> Position {
        self.fill();
        self.lookahead
            .as_ref()
            .map(|t| t.pos)
            .unwrap_or(self.last_pos)
    }

    /// Consume the next token, surfacing lexer errors.
    fn next(&mut self) -> ParseResult<Token> {
        self.fill();
        let token = self
            .lookahead
            .take()
            .unwrap_or_else(|| Token::new(self.last_pos, TokenKind::Eof, ""));
        if token.kind == TokenKind::Error {
            return Err(ParseError::new(token.pos, token.value));
        }
        Ok(token)
    }

    fn expect(&mut self, expected: TokenKind) -> ParseResult<Token> {
        let token = self.next()?;
        if token.kind != expected {
            return Err(unexpected(&token, &[expected]));
        }
        Ok(token)
    }

    // --- Grammar productions ---

    fn program(&mut self) -> ParseResult<Program> {
        let mut program = Program {
            pos: Position::origin(),
            statements: Vec::new(),
        };
        loop {
            match self.peek_kind() {
                TokenKind::Eof => return Ok(program),
                TokenKind::Scene => {
                    let stmt = self.scene_statement()?;
                    program.statements.push(Stmt::Scene(stmt));
                }
                _ => {
                    let stmt = self.block_statement()?;
                    program.statements.push(stmt);
                }
            }
        }
    }

    fn block_statement(&mut self) -> ParseResult<Stmt> {
        match self.peek_kind() {
            TokenKind::Set => Ok(Stmt::Set(self.set_statement()?)),
            TokenKind::Get => Ok(Stmt::Get(self.get_statement()?)),
            TokenKind::Var => Ok(Stmt::Var(self.var_statement()?)),
            TokenKind::At => Ok(Stmt::At(self.at_statement()?)),
            TokenKind::When => Ok(Stmt::When(self.when_statement()?)),
            TokenKind::Start => Ok(Stmt::Start(self.start_statement()?)),
            TokenKind::Stop => Ok(Stmt::Stop(self.stop_statement()?)),
            _ => {
                let token = self.next()?;
                Err(unexpected(
                    &token,
                    &[
                        TokenKind::Set,
                        TokenKind::Get,
                        TokenKind::Var,
                        TokenKind::At,
                        TokenKind::When,
                        TokenKind::Start,
                        TokenKind::Stop,
                    ],
                ))
            }
        }
    }

    fn scene_statement(&mut self) -> ParseResult<SceneStmt> {
        let scene = self.expect(TokenKind::Scene)?;
        let name = self.expect(TokenKind::Word)?;
        let block = self.block()?;
        Ok(SceneStmt {
            pos: scene.pos,
            name: name.value,
            block,
        })
    }

    fn block(&mut self) -> ParseResult<Block> {
        let pos = self.peek_pos();
        let mut statements = Vec::new();
        if self.peek_kind() == TokenKind::OpenBrace {
            self.next()?;
            while self.peek_kind() != TokenKind::CloseBrace {
                statements.push(self.block_statement()?);
            }
            self.expect(TokenKind::CloseBrace)?;
        } else {
            statements.push(self.block_statement()?);
        }
        Ok(Block { pos, statements })
    }

    fn set_statement(&mut self) -> ParseResult<SetStmt> {
        let set = self.expect(TokenKind::Set)?;
        let device = self.path_match()?;
        let value = self.value()?;
        Ok(SetStmt {
            pos: set.pos,
            device,
            value,
        })
    }

    fn get_statement(&mut self) -> ParseResult<GetStmt> {
        let get = self.expect(TokenKind::Get)?;
        let path = self.path_match()?;
        Ok(GetStmt { pos: get.pos, path })
    }

    fn var_statement(&mut self) -> ParseResult<VarStmt> {
        let var = self.expect(TokenKind::Var)?;
        let name = self.expect(TokenKind::Word)?;
        self.expect(TokenKind::Assign)?;
        let get = self.get_statement()?;
        Ok(VarStmt {
            pos: var.pos,
            name: name.value,
            get,
        })
    }

    fn at_statement(&mut self) -> ParseResult<AtStmt> {
        let at = self.expect(TokenKind::At)?;
        let time = self.time()?;
        let block = self.block()?;
        Ok(AtStmt {
            pos: at.pos,
            time,
            block,
        })
    }

    fn when_statement(&mut self) -> ParseResult<WhenStmt> {
        let when = self.expect(TokenKind::When)?;
        let path = self.path_match()?;
        self.expect(TokenKind::Is)?;
        let is_value = self.value()?;
        let wait = if self.peek_kind() == TokenKind::Wait {
            self.next()?;
            Some(self.duration()?)
        } else {
            None
        };
        let block = self.block()?;
        Ok(WhenStmt {
            pos: when.pos,
            path,
            is_value,
            wait,
            block,
        })
    }

    fn start_statement(&mut self) -> ParseResult<StartStmt> {
        let start = self.expect(TokenKind::Start)?;
        let name = self.expect(TokenKind::Word)?;
        Ok(StartStmt {
            pos: start.pos,
            scene: name.value,
        })
    }

    fn stop_statement(&mut self) -> ParseResult<StopStmt> {
        let stop = self.expect(TokenKind::Stop)?;
        let name = self.expect(TokenKind::Word)?;
        Ok(StopStmt {
            pos: stop.pos,
            scene: name.value,
        })
    }

    /// `$` | segment (`/` segment)*, segment ∈ {word, `*`, `**`}.
    fn path_match(&mut self) -> ParseResult<PathMatch> {
        let pos = self.peek_pos();
        if self.peek_kind() == TokenKind::Dollar {
            self.next()?;
            return Ok(PathMatch {
                pos,
                path: "$".to_string(),
            });
        }
        let mut segments: Vec<String> = Vec::new();
        loop {
            match self.peek_kind() {
                TokenKind::Star => {
                    self.next()?;
                    if self.peek_kind() == TokenKind::Star {
                        self.next()?;
                        segments.push("**".to_string());
                    } else {
                        segments.push("*".to_string());
                    }
                }
                TokenKind::Word => {
                    let token = self.next()?;
                    segments.push(token.value);
                }
                _ => {
                    if segments.is_empty() {
                        let token = self.next()?;
                        return Err(unexpected(&token, &[TokenKind::Star, TokenKind::Word]));
                    }
                    break;
                }
            }
            if self.peek_kind() != TokenKind::PathSeparator {
                break;
            }
            self.next()?;
        }
        Ok(PathMatch {
            pos,
            path: segments.join("/"),
        })
    }

    fn value(&mut self) -> ParseResult<ValueLit> {
        match self.peek_kind() {
            TokenKind::Word | TokenKind::Number => {
                let token = self.next()?;
                Ok(ValueLit {
                    pos: token.pos,
                    value: token.value.clone(),
                    literal: token.value,
                })
            }
            TokenKind::Str => {
                let token = self.next()?;
                let value = unescape_string(&token.value);
                Ok(ValueLit {
                    pos: token.pos,
                    value,
                    literal: token.value,
                })
            }
            _ => {
                let token = self.next()?;
                Err(unexpected(
                    &token,
                    &[TokenKind::Word, TokenKind::Str, TokenKind::Number],
                ))
            }
        }
    }

    fn time(&mut self) -> ParseResult<TimeSpec> {
        match self.peek_kind() {
            TokenKind::Time => {
                let token = self.next()?;
                let (hour, minute) = parse_clock(&token)?;
                let am = match self.peek_kind() {
                    TokenKind::Am => {
                        self.next()?;
                        true
                    }
                    TokenKind::Pm => {
                        self.next()?;
                        false
                    }
                    _ => {
                        let token = self.next()?;
                        return Err(unexpected(&token, &[TokenKind::Am, TokenKind::Pm]));
                    }
                };
                Ok(TimeSpec {
                    pos: token.pos,
                    kind: TimeKind::Clock { hour, minute, am },
                })
            }
            TokenKind::Word => {
                let token = self.next()?;
                Ok(TimeSpec {
                    pos: token.pos,
                    kind: TimeKind::Keyword(token.value),
                })
            }
            _ => {
                let token = self.next()?;
                Err(unexpected(&token, &[TokenKind::Time, TokenKind::Word]))
            }
        }
    }

    fn duration(&mut self) -> ParseResult<DurationLit> {
        let token = self.expect(TokenKind::Duration)?;
        let duration = parse_duration(&token.value)
            .ok_or_else(|| ParseError::new(token.pos, format!("invalid duration {:?}", token.value)))?;
        Ok(DurationLit {
            pos: token.pos,
            duration,
            literal: token.value,
        })
    }
}

fn unexpected(token: &Token, expected: &[TokenKind]) -> ParseError {
    let expected = expected
        .iter()
        .map(|k| format!("{k:?}"))
        .collect::<Vec<_>>()
        .join(", ");
    ParseError::new(
        token.pos,
        format!(
            "unexpected token {} with value {:?}, expected: {}",
            token.kind, token.value, expected
        ),
    )
}

fn parse_clock(token: &Token) -> ParseResult<(u8, u8)> {
    let (h, m) = token
        .value
        .split_once(':')
        .ok_or_else(|| ParseError::new(token.pos, format!("unexpected time literal {:?}", token.value)))?;
    let hour: u8 = h
        .parse()
        .map_err(|_| ParseError::new(token.pos, format!("invalid hour {h:?}")))?;
    let minute: u8 = m
        .parse()
        .map_err(|_| ParseError::new(token.pos, format!("invalid minute {m:?}")))?;
    if hour > 12 {
        return Err(ParseError::new(token.pos, "hour must be between 0 and 12"));
    }
    if minute > 59 {
        return Err(ParseError::new(
            token.pos,
            "minute must be between 0 and 59",
        ));
    }
    Ok((hour, minute))
}

/// Parse a duration literal: digits followed by `u`, `ms`, `s`, `m` or `h`.
fn parse_duration(literal: &str) -> Option<Duration> {
    let split = literal.find(|c: char| !c.is_ascii_digit())?;
    let (digits, unit) = literal.split_at(split);
    let n: u64 = digits.parse().ok()?;
    let duration = match unit {
        "u" => Duration::from_micros(n),
        "ms" => Duration::from_millis(n),
        "s" => Duration::from_secs(n),
        "m" => Duration::from_secs(n * 60),
        "h" => Duration::from_secs(n * 3600),
        _ => return None,
    };
    Some(duration)
}

/// Strip the enclosing quotes and resolve `\<quote>` escapes.
fn unescape_string(literal: &str) -> String {
    let quote = literal.as_bytes()[0] as char;
    let inner = &literal[1..literal.len() - 1];
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '\\' && chars.peek() == Some(&quote) {
            continue;
        }
        out.push(c);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pos(line: u32, column: u32) -> Position {
        Position::new(line, column)
    }

    #[test]
    fn test_set_statement() {
        let program = parse("set masterbedroom/lights off").unwrap();
        assert_eq!(
            program,
            Program {
                pos: pos(1, 1),
                statements: vec![Stmt::Set(SetStmt {
                    pos: pos(1, 1),
                    device: PathMatch {
                        pos: pos(1, 5),
                        path: "masterbedroom/lights".to_string(),
                    },
                    value: ValueLit {
                        pos: pos(1, 26),
                        value: "off".to_string(),
                        literal: "off".to_string(),
                    },
                })],
            }
        );
    }

    #[test]
    fn test_var_statement() {
        let program = parse("var x = get masterbedroom/lights").unwrap();
        assert_eq!(
            program,
            Program {
                pos: pos(1, 1),
                statements: vec![Stmt::Var(VarStmt {
                    pos: pos(1, 1),
                    name: "x".to_string(),
                    get: GetStmt {
                        pos: pos(1, 9),
                        path: PathMatch {
                            pos: pos(1, 13),
                            path: "masterbedroom/lights".to_string(),
                        },
                    },
                })],
            }
        );
    }

    #[test]
    fn test_at_statement() {
        let program = parse("at 10:00 AM start workout").unwrap();
        assert_eq!(
            program,
            Program {
                pos: pos(1, 1),
                statements: vec![Stmt::At(AtStmt {
                    pos: pos(1, 1),
                    time: TimeSpec {
                        pos: pos(1, 4),
                        kind: TimeKind::Clock {
                            hour: 10,
                            minute: 0,
                            am: true,
                        },
                    },
                    block: Block {
                        pos: pos(1, 13),
                        statements: vec![Stmt::Start(StartStmt {
                            pos: pos(1, 13),
                            scene: "workout".to_string(),
                        })],
                    },
                })],
            }
        );
    }

    #[test]
    fn test_at_statement_sun_keyword() {
        let program = parse("at sunset set porch/light on").unwrap();
        let Stmt::At(at) = &program.statements[0] else {
            panic!("expected at statement");
        };
        assert_eq!(at.time.kind, TimeKind::Keyword("sunset".to_string()));
    }

    #[test]
    fn test_when_statement_with_wait_and_block() {
        let program = parse("when */doors is unlocked wait 5m { set $ locked }").unwrap();
        let Stmt::When(when) = &program.statements[0] else {
            panic!("expected when statement");
        };
        assert_eq!(when.path.path, "*/doors");
        assert_eq!(when.is_value.value, "unlocked");
        assert_eq!(
            when.wait.as_ref().map(|d| d.duration),
            Some(Duration::from_secs(300))
        );
        assert_eq!(when.block.statements.len(), 1);
        let Stmt::Set(set) = &when.block.statements[0] else {
            panic!("expected set statement");
        };
        assert_eq!(set.device.path, "$");
    }

    #[test]
    fn test_scene_definition() {
        let program = parse("scene night {\n set a/b on\n set c/d off\n}").unwrap();
        let Stmt::Scene(scene) = &program.statements[0] else {
            panic!("expected scene statement");
        };
        assert_eq!(scene.name, "night");
        assert_eq!(scene.block.statements.len(), 2);
    }

    #[test]
    fn test_double_star_path() {
        let program = parse("set home/**/lights off").unwrap();
        let Stmt::Set(set) = &program.statements[0] else {
            panic!("expected set statement");
        };
        assert_eq!(set.device.path, "home/**/lights");
    }

    #[test]
    fn test_string_value_unescaped() {
        let program = parse(r#"set a/b 'don\'t'"#).unwrap();
        let Stmt::Set(set) = &program.statements[0] else {
            panic!("expected set statement");
        };
        assert_eq!(set.value.value, "don't");
        assert_eq!(set.value.literal, r#"'don\'t'"#);
    }

    #[test]
    fn test_duration_units() {
        for (literal, expected) in [
            ("10u", Duration::from_micros(10)),
            ("5ms", Duration::from_millis(5)),
            ("30s", Duration::from_secs(30)),
            ("5m", Duration::from_secs(300)),
            ("2h", Duration::from_secs(7200)),
        ] {
            let src = format!("when a/b is on wait {literal} set c/d off");
            let program = parse(&src).unwrap();
            let Stmt::When(when) = &program.statements[0] else {
                panic!("expected when statement");
            };
            assert_eq!(when.wait.as_ref().unwrap().duration, expected, "{literal}");
        }
    }

    #[test]
    fn test_empty_program() {
        let program = parse("").unwrap();
        assert!(program.statements.is_empty());
    }

    #[test]
    fn test_hour_out_of_range() {
        let err = parse("at 13:00 PM set a/b on").unwrap_err();
        assert!(err.message.contains("hour"), "{err}");
        assert_eq!(err.pos, pos(1, 4));
    }

    #[test]
    fn test_minute_out_of_range() {
        let err = parse("at 10:75 PM set a/b on").unwrap_err();
        assert!(err.message.contains("minute"), "{err}");
    }

    #[test]
    fn test_unexpected_token() {
        let err = parse("set = on").unwrap_err();
        assert!(err.message.contains("unexpected token"), "{err}");
        assert_eq!(err.pos, pos(1, 5));
    }

    #[test]
    fn test_lex_error_surfaces_with_position() {
        let err = parse("set a/b 'oops").unwrap_err();
        assert_eq!(err.message, "unterminated string");
    }

    #[test]
    fn test_list_keyword_is_not_a_statement() {
        assert!(parse("list").is_err());
    }
}
