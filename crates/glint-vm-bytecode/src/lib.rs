//! # Glint VM bytecode
//!
//! The value representation, instruction set, and compiled-code
//! container shared between the compiler and the interpreter.
//!
//! This crate is deliberately inert: it defines data, not behavior.
//! Nothing here evaluates bytecode or walks an object graph; that is
//! `glint-vm-core`'s job. Keeping the two separate means a snapshot
//! reader, a disassembler, or a future bytecode verifier can all depend
//! on this crate alone.

#![warn(clippy::all)]
#![warn(missing_docs)]

pub mod constant;
pub mod error;
pub mod function;
pub mod instruction;
pub mod snapshot;
pub mod value;

pub use constant::{Literal, LiteralPool};
pub use error::BytecodeError;
pub use function::{CodeFlags, CodeHeader, CodeSource, CompiledCode};
pub use instruction::{ExtendedOpcode, OpSignature, Opcode};
pub use snapshot::{Endianness, SnapshotError, SnapshotHeader, COMPACT_PTR_BITS, SNAPSHOT_MAGIC, SNAPSHOT_VERSION};
pub use value::{PointerKind, Value, MAX_SMALL_INT, MIN_SMALL_INT};
