//! GC-level fatal conditions.
//!
//! These are distinct from language-level completions (a thrown
//! `RangeError`, say): they signal that the engine's own invariants
//! cannot be maintained and must be routed to the host's fatal handler,
//! never caught from script.

use thiserror::Error;

/// Errors raised by the GC layer.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum GcError {
    /// A cell's reference count reached [`crate::header::MAX_REF_COUNT`].
    /// Corresponds to the host-visible `ERR_REF_COUNT_LIMIT` exit code.
    #[error("reference count limit reached")]
    RefCountLimit,

    /// The heap's byte budget is exhausted and no slot could be freed by
    /// a collection. Corresponds to `ERR_OUT_OF_MEMORY`.
    #[error("heap exhausted")]
    OutOfMemory,

    /// A compact pointer did not address a live, occupied slot. This can
    /// only happen from an internal bug (a dangling pointer survived a
    /// sweep), so it is an invariant violation rather than an OOM.
    #[error("dangling compact pointer")]
    DanglingPointer,
}
