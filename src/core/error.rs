//! CK-004: Error taxonomy for the resolver core.
//!
//! Resolution outcomes (not applicable, backtrack, unsatisfiable) are plain
//! return values; only the cases below travel through `Err`.

use super::position::ExprPosition;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CookError {
    #[error("{pos}: pattern \"{pattern}\": {message}")]
    Pattern {
        pos: ExprPosition,
        pattern: String,
        message: String,
    },

    /// The opcode stream broke one of the interpreter's own rules. This is
    /// a compiler bug, never a user error, and it ends the run.
    #[error("interpreter invariant violated in {program} at pc {pc}: {message}")]
    Invariant {
        program: String,
        pc: usize,
        message: String,
    },

    #[error("cookbook: {0}")]
    Cookbook(String),

    #[error("{0}")]
    Io(String),

    #[error("don't know how to cook {}", .0.join(", "))]
    UnknownTargets(Vec<String>),
}

impl CookError {
    pub fn invariant(program: impl Into<String>, pc: usize, message: impl Into<String>) -> Self {
        CookError::Invariant {
            program: program.into(),
            pc,
            message: message.into(),
        }
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, CookError::Invariant { .. })
    }
}

impl From<std::io::Error> for CookError {
    fn from(e: std::io::Error) -> Self {
        CookError::Io(e.to_string())
    }
}
