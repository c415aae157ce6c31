//! Engine-level errors surfaced to the embedder.
//!
//! These sit above [`glint_vm_core::CoreError`] (an unrecoverable engine
//! condition) and [`glint_vm_compiler::CompileError`] (a rejected
//! program): this is the error type `glint-engine`'s own entry points
//! return, carrying enough to pick an exit code at the host boundary.

use thiserror::Error;

use glint_vm_compiler::CompileError;
use glint_vm_core::CoreError;

/// A failure from one of `glint-engine`'s entry points.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Parsing or compilation rejected the source text.
    #[error("compile error: {0}")]
    Compile(#[from] CompileError),

    /// An unrecoverable engine condition (exhaustion, a broken
    /// invariant); see [`CoreError`].
    #[error("engine fatal: {0}")]
    Fatal(#[from] CoreError),

    /// A snapshot buffer failed header validation or was truncated.
    #[error("snapshot error: {0}")]
    Snapshot(#[from] glint_vm_bytecode::SnapshotError),

    /// A syscall the host port delegated to the operating system failed
    /// (used by `port_get_current_time`/`port_get_time_zone` callers).
    #[error("syscall failed: {0}")]
    Syscall(String),
}

impl EngineError {
    /// The process exit code this error maps to, per the embedding
    /// surface's documented exit codes.
    pub fn exit_code(&self) -> i32 {
        match self {
            EngineError::Compile(_) => 1,
            EngineError::Fatal(CoreError::OutOfMemory) => 2,
            EngineError::Fatal(CoreError::RefCountLimit) => 3,
            EngineError::Fatal(CoreError::UnimplementedCase(_)) => 4,
            EngineError::Fatal(CoreError::FailedInternalAssertion(_)) => 5,
            EngineError::Snapshot(_) => 6,
            EngineError::Syscall(_) => 7,
        }
    }
}

/// Result type used throughout this crate.
pub type EngineResult<T> = Result<T, EngineError>;
