//! Source text to bytecode compiler for the Glint VM.
//!
//! [`compiler::parse`] builds an [`ast::Program`] from source text;
//! [`compiler::compile`] (and friends) walk it into a finished
//! [`glint_vm_bytecode::CompiledCode`] blob via [`emitter::CodeBuilder`].
#![warn(clippy::all)]

pub mod ast;
pub mod compiler;
pub mod emitter;
pub mod error;
pub mod lexer;
pub mod scope;

pub use ast::Program;
pub use compiler::{compile, compile_eval, compile_program, parse, Parser};
pub use error::{CompileError, CompileResult};
