//! Source traces
//!
//! Every IR node remembers where in the original source it came from so that
//! diagnostics raised deep inside lowering can still point at user code.

use serde::{Deserialize, Serialize};

/// A position in a source file (1-based line and column)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Span {
    /// Source file name
    #[serde(default)]
    pub file: String,
    /// Line number
    #[serde(default)]
    pub line: u32,
    /// Column number
    #[serde(default)]
    pub column: u32,
}

impl Span {
    /// Create a new span
    pub fn new(file: impl Into<String>, line: u32, column: u32) -> Self {
        Self {
            file: file.into(),
            line,
            column,
        }
    }

    /// Span used for nodes synthesized by the compiler itself
    pub fn generated() -> Self {
        Self::new("<generated>", 0, 0)
    }

    /// Whether this span points at real user source
    pub fn is_known(&self) -> bool {
        !self.file.is_empty() && self.file != "<generated>"
    }
}

impl std::fmt::Display for Span {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.file.is_empty() {
            write!(f, "<unknown>")
        } else {
            write!(f, "{}:{}:{}", self.file, self.line, self.column)
        }
    }
}
