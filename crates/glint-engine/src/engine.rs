//! The embeddable engine: a [`Context`] plus the glue a host needs to
//! parse, run, and evaluate script.

use std::rc::Rc;

use glint_vm_bytecode::{CompiledCode, Value};
use glint_vm_core::registry::BuiltinId;
use glint_vm_core::Context;
use glint_vm_gc::{CompactPtr, GcConfig};

use crate::error::{EngineError, EngineResult};

/// Tunables an embedder passes to [`Engine::init`].
///
/// Mirrors the single knob the rest of the stack exposes today (the
/// heap budget/collection trigger ratio); kept as its own struct so new
/// fields can land here without changing `Engine::init`'s signature.
#[derive(Debug, Clone)]
pub struct EngineFlags {
    /// Heap sizing and GC trigger ratio for the underlying context.
    pub gc: GcConfig,
}

impl Default for EngineFlags {
    fn default() -> Self {
        Self { gc: GcConfig::default() }
    }
}

/// One embedding session.
///
/// Wraps a [`Context`] and installs the direct-`eval` hook at
/// construction time, since only this crate (which depends on
/// `glint-vm-compiler`) can compile the evaluated source.
pub struct Engine {
    ctx: Context,
}

impl Engine {
    /// Build a fresh engine: allocates the context's global object and
    /// environment and wires in direct `eval`.
    pub fn init(flags: EngineFlags) -> Self {
        let mut ctx = Context::new(flags.gc);
        ctx.set_eval_hook(eval_hook);
        Self { ctx }
    }

    /// Tear the engine down. Dropping an `Engine` is equivalent; this
    /// exists so callers mirroring the host surface's `init`/`cleanup`
    /// pair have an explicit spelling for the latter.
    pub fn cleanup(self) {}

    /// Borrow the underlying context, for callers that need lower-level
    /// access (value construction helpers in [`crate::value`] take a
    /// `&mut Context`).
    pub fn context(&self) -> &Context {
        &self.ctx
    }

    /// Mutably borrow the underlying context.
    pub fn context_mut(&mut self) -> &mut Context {
        &mut self.ctx
    }

    /// The global object, as a [`Value`].
    pub fn global_object(&self) -> Value {
        Value::object(self.ctx.global_object)
    }

    /// Compile `source` as top-level program text.
    ///
    /// `is_strict` imposes strictness from outside the text itself (a
    /// host embedding a module-like unit, or direct `eval` inheriting
    /// its caller's mode); `source` may still upgrade itself to strict
    /// with its own directive regardless of this flag.
    pub fn parse(&self, source: &str, is_strict: bool) -> EngineResult<Rc<CompiledCode>> {
        glint_vm_compiler::compile_eval(source, is_strict).map_err(EngineError::from)
    }

    /// Run previously compiled top-level code against the global
    /// object/environment.
    pub fn run(&mut self, code: &Rc<CompiledCode>) -> Value {
        let this = self.global_object();
        let env = self.ctx.global_env;
        glint_vm_core::vm_run(&mut self.ctx, code, this, env, false, &[])
    }

    /// Parse and immediately run `source` as a top-level program.
    pub fn parse_and_run(&mut self, source: &str, is_strict: bool) -> EngineResult<Value> {
        let code = self.parse(source, is_strict)?;
        Ok(self.run(&code))
    }

    /// Indirect `eval`: always runs against the global scope, regardless
    /// of strictness at the call site, matching the language's
    /// indirect-call rule.
    pub fn eval_indirect(&mut self, source: &str) -> EngineResult<Value> {
        self.parse_and_run(source, false)
    }

    /// Force an immediate garbage-collection cycle.
    pub fn gc(&mut self) {
        self.ctx.run_gc();
    }

    /// Raise a language-level error of `kind` with `message`, returning
    /// the abrupt completion a caller can hand back to script (e.g. from
    /// an external function).
    pub fn create_error(&mut self, kind: BuiltinId, message: &str) -> Value {
        self.ctx.throw_error(kind, message).into_completion_value()
    }
}

/// The engine's [`glint_vm_core::context::EvalHook`] implementation:
/// compiles `source` inheriting `strict` from the caller, then runs it
/// against the caller's existing lexical environment and `this`.
fn eval_hook(ctx: &mut Context, source: &str, strict: bool, env: CompactPtr, this: Value) -> Value {
    match glint_vm_compiler::compile_eval(source, strict) {
        Ok(code) => glint_vm_core::vm_run(ctx, &code, this, env, true, &[]),
        Err(err) => ctx.throw_error(BuiltinId::SyntaxError, &err.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_and_run_evaluates_an_expression_statement() {
        let mut engine = Engine::init(EngineFlags::default());
        let result = engine.parse_and_run("1 + 2;", false).unwrap();
        assert_eq!(engine.context_mut().to_number(result), 3.0);
    }

    #[test]
    fn globals_assigned_at_top_level_persist_across_runs() {
        let mut engine = Engine::init(EngineFlags::default());
        engine.parse_and_run("globalCounter = 41;", false).unwrap();
        let result = engine.parse_and_run("globalCounter + 1;", false).unwrap();
        assert_eq!(engine.context_mut().to_number(result), 42.0);
    }

    #[test]
    fn eval_indirect_runs_against_the_global_scope() {
        let mut engine = Engine::init(EngineFlags::default());
        engine.parse_and_run("var x = 10;", false).unwrap();
        let result = engine.eval_indirect("x * 2;").unwrap();
        assert_eq!(engine.context_mut().to_number(result), 20.0);
    }

    #[test]
    fn direct_eval_sees_the_caller_scope() {
        let mut engine = Engine::init(EngineFlags::default());
        let result = engine
            .parse_and_run("(function () { var y = 5; return eval('y + 1'); })();", false)
            .unwrap();
        assert_eq!(engine.context_mut().to_number(result), 6.0);
    }

    #[test]
    fn parse_rejects_unterminated_source() {
        let engine = Engine::init(EngineFlags::default());
        assert!(engine.parse("function (", false).is_err());
    }

    // The following mirror end-to-end scenarios an embedder's acceptance
    // suite would exercise against the function protocol, strict-mode
    // early errors, and exception propagation.

    #[test]
    fn call_rebinds_this_without_boxing() {
        let mut engine = Engine::init(EngineFlags::default());
        let src = "function f() { return this.t; } this.t = 1; f.call({ t: 7 });";
        let result = engine.parse_and_run(src, false).unwrap();
        assert_eq!(engine.context_mut().to_number(result), 7.0);
    }

    #[test]
    fn new_binds_this_to_the_fresh_instance() {
        let mut engine = Engine::init(EngineFlags::default());
        let src = "function A() { this.t = 12; } (new A()).t;";
        let result = engine.parse_and_run(src, false).unwrap();
        assert_eq!(engine.context_mut().to_number(result), 12.0);
    }

    #[test]
    fn bind_merges_bound_and_call_site_arguments_after_hoisting() {
        let mut engine = Engine::init(EngineFlags::default());
        let src = "var b = f.bind({ x: 3 }, 10); function f(a) { return this.x + a; } b(5);";
        let result = engine.parse_and_run(src, false).unwrap();
        assert_eq!(engine.context_mut().to_number(result), 18.0);
    }

    #[test]
    fn strict_mode_assignment_to_arguments_is_a_parse_time_error() {
        let engine = Engine::init(EngineFlags::default());
        let src = "\"use strict\"; var x = 1; function g() { arguments = 2; } g();";
        assert!(engine.parse(src, false).is_err());
    }

    #[test]
    fn finally_runs_exactly_once_around_a_caught_throw() {
        let mut engine = Engine::init(EngineFlags::default());
        let src = "var ran = 0; var caught; \
                    try { throw { m: 'e' }; } \
                    catch (e) { caught = e.m; } \
                    finally { ran = ran + 1; } \
                    ran + '/' + caught;";
        let result = engine.parse_and_run(src, false).unwrap();
        assert_eq!(engine.context_mut().string_value(result), "1/e");
    }

    #[test]
    fn a_throwing_getter_propagates_out_of_for_in() {
        let mut engine = Engine::init(EngineFlags::default());
        let src = "var that = {}; \
                    Object.defineProperty(that, 'k', { get: function () { throw 1; }, enumerable: true }); \
                    for (var k in that) { }";
        let result = engine.parse_and_run(src, false).unwrap();
        assert!(result.is_abrupt());
    }
}
