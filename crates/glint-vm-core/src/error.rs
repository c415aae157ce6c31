//! Engine-level fatals.
//!
//! These are distinct from language-level completions (an
//! [`glint_vm_bytecode::Value`] carrying the abrupt-completion bit):
//! a [`CoreError`] can never be caught by script `try`/`catch`, and its
//! only destination is the host port's `fatal` entry point.

use thiserror::Error;

/// An unrecoverable engine condition.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum CoreError {
    /// A cell's reference count saturated at [`glint_vm_gc::GcError`]'s
    /// limit.
    #[error("reference count limit exceeded")]
    RefCountLimit,
    /// A heap allocation could not be satisfied within the configured
    /// budget.
    #[error("out of memory")]
    OutOfMemory,
    /// The interpreter reached a code path that should be provably
    /// unreachable given the compiler's guarantees.
    #[error("failed internal assertion: {0}")]
    FailedInternalAssertion(&'static str),
    /// The interpreter decoded an opcode or operand it does not (yet)
    /// implement.
    #[error("unimplemented case: {0}")]
    UnimplementedCase(&'static str),
}

impl From<glint_vm_gc::GcError> for CoreError {
    fn from(err: glint_vm_gc::GcError) -> Self {
        match err {
            glint_vm_gc::GcError::RefCountLimit => CoreError::RefCountLimit,
            glint_vm_gc::GcError::OutOfMemory => CoreError::OutOfMemory,
            glint_vm_gc::GcError::DanglingPointer => {
                CoreError::FailedInternalAssertion("dangling compact pointer")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gc_errors_convert_without_losing_their_meaning() {
        let err: CoreError = glint_vm_gc::GcError::OutOfMemory.into();
        assert_eq!(err, CoreError::OutOfMemory);
    }
}
