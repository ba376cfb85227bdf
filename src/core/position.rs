//! CK-003: Source positions carried by patterns, opcodes and diagnostics.

use super::pool::Istr;
use std::fmt;

/// A file/line pair pointing back into a cookbook.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct ExprPosition {
    pub file: Option<Istr>,
    pub line: u32,
}

impl ExprPosition {
    pub fn new(file: Istr, line: u32) -> Self {
        Self {
            file: Some(file),
            line,
        }
    }

    /// Position for things synthesized by the tool itself.
    pub fn builtin() -> Self {
        Self::default()
    }

    pub fn is_known(&self) -> bool {
        self.file.is_some()
    }
}

impl fmt::Display for ExprPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.file {
            Some(file) => write!(f, "{}: {}", file, self.line),
            None => f.write_str("(builtin)"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::pool::StringPool;

    #[test]
    fn test_ck003_display() {
        let pool = StringPool::new();
        let pos = ExprPosition::new(pool.intern("Howto.yaml"), 12);
        assert_eq!(pos.to_string(), "Howto.yaml: 12");
        assert!(pos.is_known());
        assert_eq!(ExprPosition::builtin().to_string(), "(builtin)");
    }
}
