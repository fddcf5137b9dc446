//! Render statements back to human-readable text.
//!
//! Used for scheduled-event descriptions. Rendering is canonical and lossy;
//! there is no round-trip guarantee.

use std::fmt::Write;

use crate::ast::*;

/// Format a block on a single line: a lone statement is rendered bare,
/// anything else is wrapped in braces with `;` separators.
pub fn format_block(block: &Block) -> String {
    match block.statements.as_slice() {
        [stmt] => format_stmt(stmt),
        statements => {
            let mut out = String::from("{ ");
            for (i, stmt) in statements.iter().enumerate() {
                if i > 0 {
                    out.push_str("; ");
                }
                out.push_str(&format_stmt(stmt));
            }
            out.push_str(" }");
            out
        }
    }
}

pub fn format_stmt(stmt: &Stmt) -> String {
    let mut out = String::new();
    match stmt {
        Stmt::Set(s) => {
            let _ = write!(out, "set {} {}", s.device.path, s.value.literal);
        }
        Stmt::Get(g) => {
            let _ = write!(out, "get {}", g.path.path);
        }
        Stmt::Var(v) => {
            let _ = write!(out, "var {} = get {}", v.name, v.get.path.path);
        }
        Stmt::Scene(s) => {
            let _ = write!(out, "scene {} {}", s.name, format_block(&s.block));
        }
        Stmt::At(a) => {
            let _ = write!(out, "at {} {}", format_time(&a.time), format_block(&a.block));
        }
        Stmt::When(w) => {
            let _ = write!(out, "when {} is {}", w.path.path, w.is_value.literal);
            if let Some(wait) = &w.wait {
                let _ = write!(out, " wait {}", wait.literal);
            }
            let _ = write!(out, " {}", format_block(&w.block));
        }
        Stmt::Start(s) => {
            let _ = write!(out, "start {}", s.scene);
        }
        Stmt::Stop(s) => {
            let _ = write!(out, "stop {}", s.scene);
        }
    }
    out
}

fn format_time(time: &TimeSpec) -> String {
    match &time.kind {
        TimeKind::Clock { hour, minute, am } => {
            format!("{}:{:02} {}", hour, minute, if *am { "AM" } else { "PM" })
        }
        TimeKind::Keyword(word) => word.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;

    fn first_block(src: &str) -> Block {
        let program = parse(src).unwrap();
        match program.statements.into_iter().next().unwrap() {
            Stmt::Scene(s) => s.block,
            Stmt::At(a) => a.block,
            Stmt::When(w) => w.block,
            other => Block {
                pos: other.pos(),
                statements: vec![other],
            },
        }
    }

    #[test]
    fn test_single_statement_block() {
        let block = first_block("scene night start lights");
        assert_eq!(format_block(&block), "start lights");
    }

    #[test]
    fn test_multi_statement_block() {
        let block = first_block("scene night { set a/b on\n set c/d off }");
        assert_eq!(format_block(&block), "{ set a/b on; set c/d off }");
    }

    #[test]
    fn test_nested_when() {
        let block = first_block("scene guard when front/door is open wait 30s set siren/alarm on");
        assert_eq!(
            format_block(&block),
            "when front/door is open wait 30s set siren/alarm on"
        );
    }

    #[test]
    fn test_at_with_clock_time() {
        let block = first_block("scene x at 10:00 PM start night");
        assert_eq!(format_block(&block), "at 10:00 PM start night");
    }
}
