//! Compilation errors.
//!
//! Every variant here corresponds to a language-level `SyntaxError` (or,
//! for `Internal`, an engine invariant violation in the compiler itself).
//! `glint-engine` converts the script-facing variants into thrown
//! `SyntaxError` completions at the `parse`/`eval` boundary.

use thiserror::Error;

/// A compilation failure.
#[derive(Debug, Error)]
pub enum CompileError {
    /// A lexical or grammatical error.
    #[error("SyntaxError at {location}: {message}")]
    Syntax {
        /// Human-readable description.
        message: String,
        /// `line:column` within the source.
        location: String,
    },

    /// A construct the compiler recognizes but does not implement
    /// (e.g. a non-ES5.1 syntax form, or a regex literal — regexp
    /// execution is an external collaborator per this engine's scope).
    #[error("Unsupported: {0}")]
    Unsupported(String),

    /// A static semantic violation caught before bytecode is emitted
    /// (strict-mode assignment to `eval`/`arguments`, duplicate
    /// parameter names in strict mode, `with` in strict mode, …).
    #[error("SyntaxError at {location}: {message}")]
    EarlyError {
        /// Human-readable description.
        message: String,
        /// `line:column` within the source.
        location: String,
    },

    /// The literal pool, register count, or nesting depth exceeded what
    /// the bytecode format's header fields can represent.
    #[error("compiled code exceeds format limits: {0}")]
    LimitExceeded(String),

    /// A compiler-internal invariant was violated (a bug in this crate,
    /// not in the input program).
    #[error("internal compiler error: {0}")]
    Internal(String),
}

impl CompileError {
    /// Build a [`CompileError::Syntax`] at `line:column`.
    pub fn syntax(message: impl Into<String>, line: u32, column: u32) -> Self {
        Self::Syntax { message: message.into(), location: format!("{line}:{column}") }
    }

    /// Build a [`CompileError::Unsupported`].
    pub fn unsupported(feature: impl Into<String>) -> Self {
        Self::Unsupported(feature.into())
    }

    /// Build a [`CompileError::EarlyError`] at `line:column`.
    pub fn early_error(message: impl Into<String>, line: u32, column: u32) -> Self {
        Self::EarlyError { message: message.into(), location: format!("{line}:{column}") }
    }

    /// Build a [`CompileError::Internal`].
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Build a [`CompileError::InvalidLiteral`]-shaped syntax error for
    /// malformed numeric/string literal text.
    pub fn invalid_literal(message: impl Into<String>, line: u32, column: u32) -> Self {
        Self::syntax(message, line, column)
    }
}

/// Result type used throughout the compiler.
pub type CompileResult<T> = Result<T, CompileError>;
