//! Compilation errors and diagnostics

use crate::ir::Span;
use thiserror::Error;

pub type CompileResult<T> = Result<T, CompileError>;

#[derive(Debug, Error)]
pub enum CompileError {
    /// Malformed input: cyclic class graph, method group without
    /// implementations, `exitwhen` outside a loop, broken node ownership
    #[error("Structural error: {message}")]
    Structural { message: String, span: Span },

    /// A node shape a pass cannot handle
    #[error("Not implemented: {what}")]
    NotImplemented { what: String, span: Span },

    /// Internal bug detected after a pass claimed a fixpoint
    #[error("Internal compiler error in {pass} ({function}): {message}")]
    InvariantViolation {
        pass: String,
        function: String,
        message: String,
        dump: String,
    },
}

impl CompileError {
    /// Shorthand for a structural error at a span
    pub fn structural(message: impl Into<String>, span: &Span) -> Self {
        CompileError::Structural {
            message: message.into(),
            span: span.clone(),
        }
    }

    /// Shorthand for an unhandled node shape at a span
    pub fn not_implemented(what: impl Into<String>, span: &Span) -> Self {
        CompileError::NotImplemented {
            what: what.into(),
            span: span.clone(),
        }
    }

    /// Source position this error points at, if any
    pub fn span(&self) -> Option<&Span> {
        match self {
            CompileError::Structural { span, .. } | CompileError::NotImplemented { span, .. } => {
                Some(span)
            }
            CompileError::InvariantViolation { .. } => None,
        }
    }

    /// Convert to a diagnostic for the reporting sink
    pub fn to_diagnostic(&self) -> Diagnostic {
        Diagnostic {
            span: self.span().cloned().unwrap_or_default(),
            message: self.to_string(),
            severity: Severity::Error,
        }
    }
}

/// Errors raised while interpreting a flat program
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RuntimeError {
    /// A `trap` statement executed
    #[error("trap: {0}")]
    Trap(String),

    #[error("division by zero")]
    DivisionByZero,

    #[error("unknown function: {0}")]
    UnknownFunction(String),

    #[error("{name} expects {expected} arguments, got {got}")]
    Arity {
        name: String,
        expected: usize,
        got: usize,
    },

    #[error("type mismatch: {0}")]
    TypeMismatch(String),

    #[error("negative array index {0}")]
    NegativeIndex(i64),

    #[error("step limit of {0} exceeded")]
    StepLimit(u64),

    #[error("cannot interpret: {0}")]
    Unsupported(String),
}

/// How serious a diagnostic is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
    Note,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Error => write!(f, "error"),
            Severity::Warning => write!(f, "warning"),
            Severity::Note => write!(f, "note"),
        }
    }
}

/// A message for the user, tied to a source position
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub span: Span,
    pub message: String,
    pub severity: Severity,
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.span.file.is_empty() {
            write!(f, "{}: {}", self.severity, self.message)
        } else {
            write!(f, "{}: {}: {}", self.span, self.severity, self.message)
        }
    }
}
