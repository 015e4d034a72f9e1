//! Error types returned to embedders.
//!
//! There are exactly two kinds: [`StaticError`] for everything up to and
//! including static analysis (one span, one message, no stack) and
//! [`RuntimeError`] for evaluation (message plus a stack trace). Their
//! `Display` implementations produce the canonical text format, e.g.
//!
//! ```text
//! RUNTIME ERROR: x
//!     error.jsonnet:1:1-10    $
//! ```

use crate::span::{SourceMap, Span};

/// A lex, parse, desugar or analysis failure.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StaticError {
    pub span: Span,
    /// Rendered location, e.g. `file.jsonnet:1:7-12`.
    pub location: String,
    pub message: String,
}

impl StaticError {
    pub(crate) fn new(map: &SourceMap, span: Span, message: String) -> Self {
        Self {
            span,
            location: map.describe(span),
            message,
        }
    }
}

impl std::fmt::Display for StaticError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "STATIC ERROR: {} {}", self.location, self.message)
    }
}

impl std::error::Error for StaticError {}

/// One stack trace entry, innermost first in [`RuntimeError::stack`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StackFrame {
    /// Rendered location, e.g. `file.jsonnet:1:44-52`.
    pub location: String,
    /// `$`, `function <name>` or `object <field>`.
    pub context: String,
}

/// An evaluation failure with its source-level stack trace.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RuntimeError {
    pub message: String,
    pub stack: Vec<StackFrame>,
}

impl std::fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "RUNTIME ERROR: {}", self.message)?;
        for frame in &self.stack {
            write!(f, "\n\t{}\t{}", frame.location, frame.context)?;
        }
        Ok(())
    }
}

impl std::error::Error for RuntimeError {}

/// Either kind of failure, as returned by the VM entry points.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Error {
    Static(StaticError),
    Runtime(RuntimeError),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Static(e) => e.fmt(f),
            Self::Runtime(e) => e.fmt(f),
        }
    }
}

impl std::error::Error for Error {}

impl From<StaticError> for Error {
    #[inline]
    fn from(e: StaticError) -> Self {
        Self::Static(e)
    }
}

impl From<RuntimeError> for Error {
    #[inline]
    fn from(e: RuntimeError) -> Self {
        Self::Runtime(e)
    }
}
