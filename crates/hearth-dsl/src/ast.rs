//! Abstract syntax tree for the automation language.
//!
//! Nodes are immutable after construction and cheap to clone; the evaluator
//! clones blocks into timer and subscription callbacks.

use std::time::Duration;

use crate::token::Position;

/// A parsed script: an ordered sequence of top-level statements.
#[derive(Debug, Clone, PartialEq)]
pub struct Program {
    pub pos: Position,
    pub statements: Vec<Stmt>,
}

/// Any statement.
#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    Set(SetStmt),
    Get(GetStmt),
    Var(VarStmt),
    Scene(SceneStmt),
    At(AtStmt),
    When(WhenStmt),
    Start(StartStmt),
    Stop(StopStmt),
}

impl Stmt {
    pub fn pos(&self) -> Position {
        match self {
            Stmt::Set(s) => s.pos,
            Stmt::Get(s) => s.pos,
            Stmt::Var(s) => s.pos,
            Stmt::Scene(s) => s.pos,
            Stmt::At(s) => s.pos,
            Stmt::When(s) => s.pos,
            Stmt::Start(s) => s.pos,
            Stmt::Stop(s) => s.pos,
        }
    }
}

/// An ordered sequence of statements, from `{ … }` or a single bare
/// statement.
#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    pub pos: Position,
    pub statements: Vec<Stmt>,
}

/// `set <path-match> <value>`
#[derive(Debug, Clone, PartialEq)]
pub struct SetStmt {
    pub pos: Position,
    pub device: PathMatch,
    pub value: ValueLit,
}

/// `get <path-match>`
#[derive(Debug, Clone, PartialEq)]
pub struct GetStmt {
    pub pos: Position,
    pub path: PathMatch,
}

/// `var <word> = get <path-match>`
#[derive(Debug, Clone, PartialEq)]
pub struct VarStmt {
    pub pos: Position,
    pub name: String,
    pub get: GetStmt,
}

/// `scene <word> <block>` — defines, does not execute.
#[derive(Debug, Clone, PartialEq)]
pub struct SceneStmt {
    pub pos: Position,
    pub name: String,
    pub block: Block,
}

/// `at <time> <block>`
#[derive(Debug, Clone, PartialEq)]
pub struct AtStmt {
    pub pos: Position,
    pub time: TimeSpec,
    pub block: Block,
}

/// `when <path-match> is <value> [wait <duration>] <block>`
#[derive(Debug, Clone, PartialEq)]
pub struct WhenStmt {
    pub pos: Position,
    pub path: PathMatch,
    pub is_value: ValueLit,
    pub wait: Option<DurationLit>,
    pub block: Block,
}

/// `start <word>`
#[derive(Debug, Clone, PartialEq)]
pub struct StartStmt {
    pub pos: Position,
    pub scene: String,
}

/// `stop <word>`
#[derive(Debug, Clone, PartialEq)]
pub struct StopStmt {
    pub pos: Position,
    pub scene: String,
}

/// A clock time with meridiem, or a keyword such as `sunrise`.
///
/// Keyword validation is deferred to the evaluator.
#[derive(Debug, Clone, PartialEq)]
pub struct TimeSpec {
    pub pos: Position,
    pub kind: TimeKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TimeKind {
    Clock { hour: u8, minute: u8, am: bool },
    Keyword(String),
}

/// A literal value with escapes resolved; `literal` keeps the source form.
#[derive(Debug, Clone, PartialEq)]
pub struct ValueLit {
    pub pos: Position,
    pub value: String,
    pub literal: String,
}

/// A device path whose segments may be words, `*`, `**`, or the single
/// sentinel `$`.
#[derive(Debug, Clone, PartialEq)]
pub struct PathMatch {
    pub pos: Position,
    pub path: String,
}

/// A duration literal such as `5m` or `150ms`.
#[derive(Debug, Clone, PartialEq)]
pub struct DurationLit {
    pub pos: Position,
    pub duration: Duration,
    pub literal: String,
}
