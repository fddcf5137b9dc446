//! Lexer, parser, AST and formatter for the hearth automation language.
//!
//! A script describes declarative device actions, reactive rules and
//! time-triggered rules, grouped into named scenes:
//!
//! ```text
//! scene night {
//!     set livingroom/lights off
//!     when front/door is open wait 30s set porch/light on
//! }
//! at 10:00 PM start night
//! ```
//!
//! [`parse`] turns source text into a [`Program`]; execution lives in the
//! `hearth-runtime` crate.

pub mod ast;
pub mod format;
pub mod lexer;
pub mod parser;
pub mod token;

pub use ast::{
    AtStmt, Block, DurationLit, GetStmt, PathMatch, Program, SceneStmt, SetStmt, StartStmt, Stmt,
    StopStmt, TimeKind, TimeSpec, ValueLit, VarStmt, WhenStmt,
};
pub use format::{format_block, format_stmt};
pub use lexer::Lexer;
pub use parser::{parse, ParseError, ParseResult};
pub use token::{Position, Token, TokenKind};
