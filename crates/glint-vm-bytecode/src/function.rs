//! Compiled code: the immutable, reference-counted unit the compiler
//! produces and the interpreter runs.

use std::rc::Rc;

use crate::constant::LiteralPool;

/// Flags carried in a compiled function's header.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CodeFlags {
    /// The function body is strict mode, either via a directive prologue
    /// or by inheriting strictness from its enclosing code.
    pub strict: bool,
    /// The function body references `arguments`, so `[[Call]]` must
    /// instantiate an Arguments object bound into the call's lexical
    /// environment.
    pub arguments_needed: bool,
    /// No binding in this function escapes into a closure or `eval`, so
    /// `[[Call]]` may skip allocating a fresh declarative lexical
    /// environment and run directly against the captured scope.
    pub lex_env_not_needed: bool,
    /// Literal-pool indices in this function's bytecode are encoded as
    /// 16-bit immediates rather than 8-bit (set once the pool grows past
    /// 256 entries; see [`LiteralPool::fits_u8_indices`]).
    pub wide_literals: bool,
    /// The function body contains parameter or binding initializers that
    /// must run before the first statement (default parameter values).
    pub has_initializers: bool,
}

/// The header fields every compiled function carries, independent of its
/// literal pool and bytecode stream.
#[derive(Debug, Clone, PartialEq)]
pub struct CodeHeader {
    /// Declared parameter count (`Function.prototype.length`'s source).
    pub arg_count: u8,
    /// Upper bound on simultaneous operand-stack depth, proven by the
    /// compiler so the interpreter can size a fixed-capacity stack once
    /// per frame.
    pub register_count: u16,
    /// This function's declared name, if any (used for `name`/stack
    /// traces; anonymous function expressions have `None`).
    pub function_name: Option<Rc<[u16]>>,
    /// Parameter names in declaration order. `[[Call]]` binds
    /// `args[i]` to `param_names[i]` as an own binding of the call's
    /// lexical environment before the body's bytecode runs.
    pub param_names: Rc<[Rc<[u16]>]>,
    /// Every `var`-hoisted and function-hoisted name this body declares
    /// (duplicates of `param_names` included; `[[Call]]` skips
    /// redeclaring a name already bound by a parameter). `[[Call]]`
    /// pre-populates each as an `undefined` own binding so shadowing and
    /// `typeof` on an unassigned-but-declared var behave per hoisting
    /// rules, and so the compiled prologue's `AssignIdent` for a hoisted
    /// function declaration resolves locally rather than escaping to an
    /// enclosing scope.
    pub var_names: Rc<[Rc<[u16]>]>,
    /// See [`CodeFlags`].
    pub flags: CodeFlags,
}

/// Where a [`CompiledCode`] blob came from, which decides whether its
/// bytes may be mutated or must be treated as host-owned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodeSource {
    /// Produced by `glint-vm-compiler` in this process.
    Compiled,
    /// Loaded from a host-supplied snapshot buffer. Such a blob is
    /// not heap-owned by the collector in the sense that its backing
    /// bytes were not allocated by this crate; the `Rc` here still
    /// manages the blob's own refcount, but the bytes it wraps must
    /// outlive every reference regardless of GC pressure.
    Snapshot,
}

/// An immutable, reference-counted compiled function.
#[derive(Debug, Clone)]
pub struct CompiledCode {
    /// See [`CodeHeader`].
    pub header: CodeHeader,
    /// Primitive values, string ids, and nested compiled-code blobs this
    /// function's bytecode indexes into via `PushLiteral`-family ops.
    pub literals: LiteralPool,
    /// The byte-code stream.
    pub bytecode: Rc<[u8]>,
    /// See [`CodeSource`].
    pub source: CodeSource,
}

impl CompiledCode {
    /// Build a compiled-code blob owned by this process (the normal path
    /// out of the compiler).
    pub fn compiled(header: CodeHeader, literals: LiteralPool, bytecode: Vec<u8>) -> Rc<Self> {
        Rc::new(Self {
            header,
            literals,
            bytecode: bytecode.into(),
            source: CodeSource::Compiled,
        })
    }

    /// Wrap a snapshot-provided bytecode stream. `bytecode` is expected to
    /// already be the section the snapshot reader sliced out for this
    /// function.
    pub fn from_snapshot(header: CodeHeader, literals: LiteralPool, bytecode: Rc<[u8]>) -> Rc<Self> {
        Rc::new(Self {
            header,
            literals,
            bytecode,
            source: CodeSource::Snapshot,
        })
    }

    /// Declared parameter count, exposed as `Function.prototype.length`.
    pub fn length(&self) -> u8 {
        self.header.arg_count
    }

    /// Whether this function's body is strict mode.
    pub fn is_strict(&self) -> bool {
        self.header.flags.strict
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header() -> CodeHeader {
        CodeHeader {
            arg_count: 2,
            register_count: 4,
            function_name: None,
            param_names: Rc::from([]),
            var_names: Rc::from([]),
            flags: CodeFlags::default(),
        }
    }

    #[test]
    fn compiled_code_reports_declared_length() {
        let code = CompiledCode::compiled(header(), LiteralPool::new(), vec![]);
        assert_eq!(code.length(), 2);
        assert_eq!(code.source, CodeSource::Compiled);
    }

    #[test]
    fn snapshot_blobs_are_tagged_distinctly() {
        let bytes: Rc<[u8]> = vec![0u8; 4].into();
        let code = CompiledCode::from_snapshot(header(), LiteralPool::new(), bytes);
        assert_eq!(code.source, CodeSource::Snapshot);
    }
}
