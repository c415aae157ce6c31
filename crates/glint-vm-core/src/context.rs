//! The engine context: the heaps, collector, global environment, and
//! built-in registry threaded through every entry point.
//!
//! There is no global mutable state anywhere in this crate; a `Context`
//! is created once per embedding session and passed by `&mut` reference
//! into every operation that might allocate or run script.

use rustc_hash::FxHashMap;

use glint_vm_bytecode::{PointerKind, Value, MAX_SMALL_INT, MIN_SMALL_INT};
use glint_vm_gc::{Collector, CompactPtr, GcConfig, Heap};

use crate::cells::{FloatCell, StringCell};
use crate::magic::MagicString;
use crate::object::{ObjectKind, ObjectRecord};
use crate::property::{PropertyDescriptor, PropertyKey};
use crate::registry::BuiltinId;

/// The constructor and prototype objects a resident built-in installs.
#[derive(Debug, Clone, Copy)]
pub struct BuiltinHandles {
    /// The built-in's constructor/function object.
    pub constructor: CompactPtr,
    /// The built-in's `.prototype` object, if it has one (routine-only
    /// built-ins like the thrower do not).
    pub prototype: Option<CompactPtr>,
}

/// The engine-side implementation of direct `eval`, installed by the
/// embedding layer (`glint-engine`) so that `glint-vm-core` never has to
/// depend on `glint-vm-compiler`.
///
/// Arguments are the source text, the caller's strictness, the caller's
/// lexical environment (direct eval runs against it rather than a fresh
/// one), and the caller's `this` binding. The result is whatever the
/// evaluated program completes with, or an abrupt completion.
pub type EvalHook = fn(&mut Context, &str, bool, CompactPtr, Value) -> Value;

/// A host-owned pointer attached to an object via
/// [`Context::set_object_native_handle`], plus the callback that reclaims
/// it when the object dies.
#[derive(Clone, Copy)]
struct NativeHandle {
    ptr: *mut u8,
    free: Option<fn(*mut u8)>,
}

/// The live state of one engine session.
pub struct Context {
    pub(crate) objects: Heap<ObjectRecord>,
    pub(crate) floats: Heap<FloatCell>,
    pub(crate) strings: Heap<StringCell>,
    pub(crate) collector: Collector,
    builtins: FxHashMap<BuiltinId, BuiltinHandles>,
    /// The global object (an ordinary object with no special kind).
    pub global_object: CompactPtr,
    /// The environment wrapping the global object; the root of every
    /// scope chain.
    pub global_env: CompactPtr,
    /// The single shared thrower function. `caller`/`arguments`
    /// accessors on every strict function share this exact object.
    pub thrower: CompactPtr,
    /// See [`EvalHook`]. `None` until an embedder wires the compiler in,
    /// in which case `CALL_EVAL` throws `EvalError`.
    pub(crate) eval_hook: Option<EvalHook>,
    /// Host-owned pointers attached via
    /// [`Context::set_object_native_handle`], keyed by the object they
    /// are attached to.
    native_handles: FxHashMap<CompactPtr, NativeHandle>,
}

impl Context {
    /// Build a fresh context: allocate the global object/environment,
    /// the shared thrower, and install the minimum built-in surface.
    pub fn new(config: GcConfig) -> Self {
        let mut objects = Heap::new(config);
        let floats = Heap::new(config);
        let strings = Heap::new(config);
        let collector = Collector::new();

        let global_object = objects
            .alloc(ObjectRecord::new(ObjectKind::General, None, true))
            .expect("initial allocation never exceeds a fresh heap's budget");
        let global_env = objects
            .alloc(ObjectRecord::object_environment(global_object, None))
            .expect("initial allocation never exceeds a fresh heap's budget");
        let thrower = objects
            .alloc(ObjectRecord::external_function(None, crate::intrinsics::thrower_entry))
            .expect("initial allocation never exceeds a fresh heap's budget");

        let mut ctx = Self {
            objects,
            floats,
            strings,
            collector,
            builtins: FxHashMap::default(),
            global_object,
            global_env,
            thrower,
            eval_hook: None,
            native_handles: FxHashMap::default(),
        };
        crate::intrinsics::install_all(&mut ctx);
        ctx
    }

    /// Install the embedder's direct-`eval` implementation. See
    /// [`EvalHook`].
    pub fn set_eval_hook(&mut self, hook: EvalHook) {
        self.eval_hook = Some(hook);
    }

    /// Run `source` as a direct `eval` against `env`/`this`, inheriting
    /// `strict` from the caller. Returns an `EvalError` completion if no
    /// embedder has installed a hook via [`Context::set_eval_hook`].
    pub fn direct_eval(&mut self, source: &str, strict: bool, env: CompactPtr, this: Value) -> Value {
        match self.eval_hook {
            Some(hook) => hook(self, source, strict, env, this),
            None => self.throw_error(BuiltinId::EvalError, "direct eval is not supported in this build"),
        }
    }

    // ---- heap access --------------------------------------------------

    /// Borrow an object record.
    pub fn object(&self, ptr: CompactPtr) -> &ObjectRecord {
        self.objects.get(ptr)
    }

    /// Allocate an object record, returning its compact pointer.
    pub fn alloc_object(&mut self, record: ObjectRecord) -> CompactPtr {
        let stats = self.objects.stats();
        if stats.bytes_used + glint_vm_gc::GcCell::approx_size(&record) > stats.bytes_budget {
            self.run_gc();
        }
        self.objects.alloc(record).expect("heap exhausted after collection")
    }

    /// Run a synchronous mark-and-sweep collection over every typed
    /// heap, rooted at the global object/environment, the shared
    /// thrower, and every resident built-in.
    pub fn run_gc(&mut self) {
        self.collector.begin_mark();
        let generation = self.collector.generation();
        let mut stack = vec![self.global_object, self.global_env, self.thrower];
        for handles in self.builtins.values() {
            stack.push(handles.constructor);
            if let Some(proto) = handles.prototype {
                stack.push(proto);
            }
        }
        while let Some(ptr) = stack.pop() {
            if self.objects.mark_of(ptr, generation) == glint_vm_gc::MarkColor::Black {
                continue;
            }
            self.objects.mark(ptr, glint_vm_gc::MarkColor::Black, generation);
            let record = self.objects.get(ptr);
            if let Some(proto) = record.prototype() {
                stack.push(proto);
            }
            if let Some(outer) = record.outer_environment() {
                stack.push(outer);
            }
            if let Some(bound) = record.bound_object() {
                stack.push(bound);
            }
            for (_, descriptor) in record.properties().iter() {
                push_value_roots(descriptor, &mut stack);
            }
        }
        // Native handles are reclaimed by comparing the live set across
        // the sweep rather than threading a per-cell callback through
        // `glint_vm_gc::Heap`, which has no notion of them.
        let live_before: Vec<CompactPtr> =
            if self.native_handles.is_empty() { Vec::new() } else { self.objects.iter_live().collect() };
        let reclaimed = self.objects.sweep(generation, |_| {});
        if !live_before.is_empty() {
            let live_after: std::collections::HashSet<CompactPtr> = self.objects.iter_live().collect();
            for ptr in live_before {
                if !live_after.contains(&ptr) {
                    self.run_native_free(ptr);
                }
            }
        }
        self.collector.end_mark();
        self.collector.record_cycle(reclaimed);
        tracing::debug!(reclaimed, "collection cycle complete");
    }

    /// Attach a host-owned pointer to `obj`, with a callback to run when
    /// the object is collected. Replacing an existing handle does not
    /// invoke the previous handle's callback — the embedder owns that
    /// transition.
    pub fn set_object_native_handle(&mut self, obj: CompactPtr, ptr: *mut u8, free: Option<fn(*mut u8)>) {
        self.native_handles.insert(obj, NativeHandle { ptr, free });
    }

    /// The host-owned pointer attached to `obj`, or a null pointer if
    /// none has been set.
    pub fn get_object_native_handle(&self, obj: CompactPtr) -> *mut u8 {
        self.native_handles.get(&obj).map(|h| h.ptr).unwrap_or(std::ptr::null_mut())
    }

    fn run_native_free(&mut self, ptr: CompactPtr) {
        if let Some(handle) = self.native_handles.remove(&ptr) {
            if let Some(free) = handle.free {
                free(handle.ptr);
            }
        }
    }

    /// Record a resident built-in's constructor/prototype pair.
    pub fn register_builtin(&mut self, id: BuiltinId, handles: BuiltinHandles) {
        self.builtins.insert(id, handles);
    }

    /// Look up a resident built-in's constructor/prototype pair.
    pub fn builtin(&self, id: BuiltinId) -> BuiltinHandles {
        *self
            .builtins
            .get(&id)
            .unwrap_or_else(|| panic!("built-in {id:?} was never installed"))
    }

    /// Reverse lookup: which built-in (and which side of it) `ptr`
    /// is, if any. Used by lazy materialization to find the descriptor
    /// table a given object should pull its properties from.
    pub(crate) fn builtin_id_for(&self, ptr: CompactPtr) -> Option<(BuiltinId, bool)> {
        for (&id, handles) in self.builtins.iter() {
            if handles.constructor == ptr {
                return Some((id, false));
            }
            if handles.prototype == Some(ptr) {
                return Some((id, true));
            }
        }
        None
    }

    // ---- value construction --------------------------------------------

    /// Build a number value, choosing the small-integer immediate when
    /// it round-trips exactly.
    pub fn make_number(&mut self, n: f64) -> Value {
        if n.fract() == 0.0 && n >= MIN_SMALL_INT as f64 && n <= MAX_SMALL_INT as f64 {
            return Value::integer(n as i32);
        }
        let ptr = self
            .floats
            .alloc(FloatCell::new(n))
            .unwrap_or_else(|_| panic!("float heap exhausted"));
        Value::float(ptr)
    }

    /// Intern a Rust string as a heap string value.
    pub fn make_string(&mut self, s: &str) -> Value {
        let ptr = self
            .strings
            .alloc(StringCell::new(s))
            .unwrap_or_else(|_| panic!("string heap exhausted"));
        Value::string(ptr)
    }

    /// The numeric payload of a value produced by [`Context::make_number`].
    pub fn number_value(&self, v: Value) -> f64 {
        if v.is_integer() {
            v.as_integer() as f64
        } else {
            self.floats.get(v.as_pointer()).value
        }
    }

    /// The Rust string this value's heap pointer addresses.
    pub fn string_value(&self, v: Value) -> String {
        self.strings.get(v.as_pointer()).to_rust_string()
    }

    /// Bump `v`'s reference count, if it addresses a heap cell.
    /// Immediate values (numbers that fit in a small int, booleans,
    /// `null`, `undefined`) are no-ops.
    pub fn retain_value(&self, v: Value) {
        let Some(kind) = v.pointer_kind() else { return };
        let ptr = v.as_pointer();
        let _ = match kind {
            PointerKind::Object => self.objects.inc_ref(ptr),
            PointerKind::Float => self.floats.inc_ref(ptr),
            PointerKind::String => self.strings.inc_ref(ptr),
        };
    }

    /// Drop `v`'s reference count, freeing the cell immediately if it
    /// reaches zero outside of an in-progress mark phase. See
    /// [`crate::context::Context::retain_value`].
    pub fn release_value(&mut self, v: Value) {
        let Some(kind) = v.pointer_kind() else { return };
        let ptr = v.as_pointer();
        let in_mark_phase = self.collector.in_mark_phase();
        match kind {
            PointerKind::Object => {
                let freed = glint_vm_gc::GcCell::header(self.objects.get(ptr)).ref_count() == 1;
                self.objects.dec_ref(ptr, in_mark_phase, |_| {});
                if freed && !in_mark_phase {
                    self.run_native_free(ptr);
                }
            }
            PointerKind::Float => self.floats.dec_ref(ptr, in_mark_phase, |_| {}),
            PointerKind::String => self.strings.dec_ref(ptr, in_mark_phase, |_| {}),
        }
    }

    /// Construct a new error object of the given kind with a message,
    /// returned as an abrupt completion ready to propagate.
    pub fn throw_error(&mut self, kind: BuiltinId, message: &str) -> Value {
        let handles = self.builtin(kind);
        let msg = self.make_string(message);
        let record = ObjectRecord::new(ObjectKind::General, handles.prototype, true);
        record.put_own(PropertyKey::Magic(MagicString::Message), msg);
        let ptr = self.alloc_object(record);
        Value::object(ptr).into_abrupt()
    }

    // ---- C2 contract ----------------------------------------------------

    /// `[[Get]]`: walk the prototype chain, consulting lazy
    /// materialization before declaring a name absent.
    pub fn get(&mut self, obj: CompactPtr, key: &PropertyKey) -> Value {
        let mut current = Some(obj);
        while let Some(ptr) = current {
            if let Some(descriptor) = self.get_own_property(ptr, key) {
                return match descriptor {
                    PropertyDescriptor::Data { value, .. } => value,
                    PropertyDescriptor::Accessor { get: Some(getter), .. } => {
                        crate::function::call(self, getter, Value::object(obj), &[])
                    }
                    PropertyDescriptor::Accessor { get: None, .. } => Value::undefined(),
                };
            }
            current = self.object(ptr).prototype();
        }
        Value::undefined()
    }

    /// `[[GetOwnProperty]]`: materializes lazy properties on first
    /// access, after which a second lookup is a plain chain hit.
    pub fn get_own_property(&mut self, obj: CompactPtr, key: &PropertyKey) -> Option<PropertyDescriptor> {
        self.materialize_lazy(obj, key);
        self.object(obj).properties().get(key).cloned()
    }

    /// `[[HasProperty]]`: like `[[Get]]` but stops at existence.
    pub fn has_property(&mut self, obj: CompactPtr, key: &PropertyKey) -> bool {
        let mut current = Some(obj);
        while let Some(ptr) = current {
            if self.get_own_property(ptr, key).is_some() {
                return true;
            }
            current = self.object(ptr).prototype();
        }
        false
    }

    /// `[[Put]]`: assign through an inherited setter, or create an own
    /// data property if nothing in the chain intercepts the write.
    ///
    /// Returns an abrupt completion only when `throw_flag` is set and
    /// the write is rejected; otherwise rejection is silent, matching
    /// non-strict-mode semantics.
    pub fn put(&mut self, obj: CompactPtr, key: PropertyKey, value: Value, throw_flag: bool) -> Value {
        let mut current = Some(obj);
        while let Some(ptr) = current {
            if let Some(descriptor) = self.get_own_property(ptr, &key) {
                match descriptor {
                    PropertyDescriptor::Accessor { set: Some(setter), .. } => {
                        crate::function::call(self, setter, Value::object(obj), &[value]);
                        return Value::undefined();
                    }
                    PropertyDescriptor::Accessor { set: None, .. } => {
                        return self.reject_put(throw_flag);
                    }
                    PropertyDescriptor::Data { attributes, .. } => {
                        if !attributes.writable {
                            return self.reject_put(throw_flag);
                        }
                        if ptr == obj {
                            // Existing own writable data property: update the
                            // value in place, preserving enumerable/configurable.
                            self.object(obj).set_own_value(&key, value);
                            return Value::undefined();
                        }
                        break;
                    }
                }
            }
            current = self.object(ptr).prototype();
        }
        if !self.object(obj).is_extensible() && self.object(obj).get_own_data(&key).is_none() {
            return self.reject_put(throw_flag);
        }
        self.object(obj).put_own(key, value);
        Value::undefined()
    }

    fn reject_put(&mut self, throw_flag: bool) -> Value {
        if throw_flag {
            self.throw_error(BuiltinId::TypeError, "cannot assign to read only property")
        } else {
            Value::undefined()
        }
    }

    /// `[[Delete]]`: fails (returns `false`, or throws if `throw_flag`)
    /// on a non-configurable own property.
    pub fn delete(&mut self, obj: CompactPtr, key: &PropertyKey, throw_flag: bool) -> Value {
        let record = self.object(obj);
        let Some(descriptor) = record.properties().get(key).cloned() else {
            return Value::boolean(true);
        };
        if !descriptor.attributes().configurable {
            return if throw_flag {
                self.throw_error(BuiltinId::TypeError, "property is non-configurable")
            } else {
                Value::boolean(false)
            };
        }
        record.properties_mut().remove(key);
        Value::boolean(true)
    }

    /// `[[DefineOwnProperty]]`: installs `descriptor` directly,
    /// rejecting the change when the object is non-extensible and the
    /// property is new.
    pub fn define_own_property(
        &mut self,
        obj: CompactPtr,
        key: PropertyKey,
        descriptor: PropertyDescriptor,
        throw_flag: bool,
    ) -> Value {
        let (exists, extensible) = {
            let record = self.object(obj);
            (record.properties().contains(&key), record.is_extensible())
        };
        if !exists && !extensible {
            return if throw_flag {
                self.throw_error(BuiltinId::TypeError, "object is not extensible")
            } else {
                Value::boolean(false)
            };
        }
        let incompatible = {
            let record = self.object(obj);
            match record.properties().get(&key) {
                Some(existing) if !existing.attributes().configurable => existing.is_accessor() != descriptor.is_accessor(),
                _ => false,
            }
        };
        if incompatible {
            return if throw_flag {
                self.throw_error(BuiltinId::TypeError, "cannot redefine non-configurable property")
            } else {
                Value::boolean(false)
            };
        }
        self.object(obj).properties_mut().set(key, descriptor);
        Value::boolean(true)
    }

    /// `[[DefaultValue]]`: invoke `valueOf`/`toString` in the order
    /// `hint` requests, returning the first primitive result.
    pub fn default_value(&mut self, obj: CompactPtr, hint_string_first: bool) -> Value {
        let methods = if hint_string_first {
            [MagicString::ToString, MagicString::ValueOf]
        } else {
            [MagicString::ValueOf, MagicString::ToString]
        };
        for method in methods {
            let f = self.get(obj, &PropertyKey::Magic(method));
            if crate::function::is_callable(self, f) {
                let result = crate::function::call(self, f, Value::object(obj), &[]);
                if !result.is_object() || result.is_abrupt() {
                    return result;
                }
            }
        }
        self.throw_error(BuiltinId::TypeError, "cannot convert object to primitive value")
    }

    /// Own enumerable and non-enumerable string-keyed names, in chain
    /// order, materializing any lazy properties first.
    pub fn enumerate(&mut self, obj: CompactPtr) -> (Vec<PropertyKey>, Vec<PropertyKey>) {
        self.materialize_all_lazy(obj);
        let mut enumerable = Vec::new();
        let mut non_enumerable = Vec::new();
        for (key, descriptor) in self.object(obj).properties().iter() {
            if descriptor.attributes().enumerable {
                enumerable.push(key.clone());
            } else {
                non_enumerable.push(key.clone());
            }
        }
        (enumerable, non_enumerable)
    }

    /// Materialize the single lazy property named `key` on `obj`, if it
    /// has one and it is not already present.
    fn materialize_lazy(&mut self, obj: CompactPtr, key: &PropertyKey) {
        if self.object(obj).properties().contains(key) {
            return;
        }
        crate::intrinsics::materialize(self, obj, Some(key));
    }

    /// Materialize every lazy property on `obj` (used by `enumerate`,
    /// which must see the complete own-property set).
    fn materialize_all_lazy(&mut self, obj: CompactPtr) {
        crate::intrinsics::materialize(self, obj, None);
    }

    // ---- value conversions ----------------------------------------------

    /// `ToNumber`.
    pub fn to_number(&mut self, v: Value) -> f64 {
        if v.is_integer() {
            return v.as_integer() as f64;
        }
        if v.is_float() {
            return self.number_value(v);
        }
        if v.is_boolean() {
            return if v.as_boolean() { 1.0 } else { 0.0 };
        }
        if v.is_null() {
            return 0.0;
        }
        if v.is_undefined() {
            return f64::NAN;
        }
        if v.is_string() {
            let s = self.string_value(v);
            return s.trim().parse::<f64>().unwrap_or(f64::NAN);
        }
        if v.is_object() {
            let primitive = self.default_value(v.as_pointer(), false);
            if primitive.is_abrupt() {
                return f64::NAN;
            }
            return self.to_number(primitive);
        }
        f64::NAN
    }

    /// `ToString`.
    pub fn to_string(&mut self, v: Value) -> String {
        if v.is_string() {
            return self.string_value(v);
        }
        if v.is_integer() {
            return v.as_integer().to_string();
        }
        if v.is_float() {
            return format_number(self.number_value(v));
        }
        if v.is_boolean() {
            return v.as_boolean().to_string();
        }
        if v.is_null() {
            return "null".to_string();
        }
        if v.is_undefined() {
            return "undefined".to_string();
        }
        if v.is_object() {
            let primitive = self.default_value(v.as_pointer(), true);
            if primitive.is_abrupt() {
                return String::new();
            }
            return self.to_string(primitive);
        }
        String::new()
    }

    /// `ToObject`: box a primitive into its wrapper kind, or pass
    /// objects through unchanged.
    pub fn to_object(&mut self, v: Value) -> Value {
        if v.is_object() {
            return v;
        }
        if v.is_nullish() {
            return self.throw_error(BuiltinId::TypeError, "cannot convert undefined or null to object");
        }
        let (builtin, kind) = if v.is_string() {
            (BuiltinId::String, ObjectKind::StringObject)
        } else if v.is_boolean() || v.is_integer() || v.is_float() {
            let id = if v.is_boolean() { BuiltinId::Boolean } else { BuiltinId::Number };
            (id, ObjectKind::General)
        } else {
            (BuiltinId::Object, ObjectKind::General)
        };
        let proto = self.builtin(builtin).prototype;
        let record = ObjectRecord::new(kind, proto, true);
        record.set_primitive_value(v);
        Value::object(self.alloc_object(record))
    }

    /// `===`.
    pub fn strict_equals(&mut self, a: Value, b: Value) -> bool {
        if a.is_integer() && b.is_integer() {
            return a.as_integer() == b.as_integer();
        }
        if (a.is_integer() || a.is_float()) && (b.is_integer() || b.is_float()) {
            return self.number_value(a) == self.number_value(b);
        }
        if a.is_string() && b.is_string() {
            return self.string_value(a) == self.string_value(b);
        }
        a.to_bits() == b.to_bits()
    }

    /// `==`.
    pub fn abstract_equals(&mut self, a: Value, b: Value) -> bool {
        if a.pointer_kind() == b.pointer_kind() || (numeric(a) && numeric(b)) {
            return self.strict_equals(a, b);
        }
        if a.is_nullish() && b.is_nullish() {
            return true;
        }
        if numeric(a) && b.is_string() {
            let rhs = self.to_number(b);
            return self.to_number(a) == rhs;
        }
        if a.is_string() && numeric(b) {
            let lhs = self.to_number(a);
            return lhs == self.to_number(b);
        }
        if a.is_boolean() {
            let lhs = self.to_number(a);
            let as_num = Value::integer(lhs as i32);
            return self.abstract_equals(as_num, b);
        }
        if b.is_boolean() {
            let rhs = self.to_number(b);
            let as_num = Value::integer(rhs as i32);
            return self.abstract_equals(a, as_num);
        }
        if (numeric(a) || a.is_string()) && b.is_object() {
            let rhs = self.default_value(b.as_pointer(), false);
            return self.abstract_equals(a, rhs);
        }
        if a.is_object() && (numeric(b) || b.is_string()) {
            let lhs = self.default_value(a.as_pointer(), false);
            return self.abstract_equals(lhs, b);
        }
        false
    }
}

fn numeric(v: Value) -> bool {
    v.is_integer() || v.is_float()
}

fn format_number(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n.is_infinite() {
        if n > 0.0 { "Infinity".to_string() } else { "-Infinity".to_string() }
    } else {
        let mut s = format!("{n}");
        if s.ends_with(".0") {
            s.truncate(s.len() - 2);
        }
        s
    }
}

fn push_value_roots(descriptor: &PropertyDescriptor, stack: &mut Vec<CompactPtr>) {
    let mut push = |v: Value| {
        if let Some(PointerKind::Object) = v.pointer_kind() {
            stack.push(v.as_pointer());
        }
    };
    match descriptor {
        PropertyDescriptor::Data { value, .. } => push(*value),
        PropertyDescriptor::Accessor { get, set, .. } => {
            if let Some(g) = get {
                push(*g);
            }
            if let Some(s) = set {
                push(*s);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context() -> Context {
        Context::new(GcConfig::default())
    }

    #[test]
    fn fresh_context_has_a_distinct_global_object_and_environment() {
        let ctx = context();
        assert_ne!(ctx.global_object, ctx.global_env);
    }

    #[test]
    fn put_then_get_round_trips_through_the_prototype_chain() {
        let mut ctx = context();
        let proto = ctx.alloc_object(ObjectRecord::new(ObjectKind::General, None, true));
        let child = ctx.alloc_object(ObjectRecord::new(ObjectKind::General, Some(proto), true));
        ctx.object(proto).put_own(PropertyKey::string("x"), Value::integer(7));
        assert_eq!(ctx.get(child, &PropertyKey::string("x")), Value::integer(7));
    }

    #[test]
    fn delete_rejects_non_configurable_properties() {
        let mut ctx = context();
        let obj = ctx.alloc_object(ObjectRecord::new(ObjectKind::General, None, true));
        ctx.object(obj).define_own_data(
            PropertyKey::string("x"),
            Value::integer(1),
            PropertyAttributes::sealed(),
        );
        assert_eq!(ctx.delete(obj, &PropertyKey::string("x"), false), Value::boolean(false));
        assert!(ctx.object(obj).properties().contains(&PropertyKey::string("x")));
    }

    #[test]
    fn numbers_round_trip_through_make_number_and_to_number() {
        let mut ctx = context();
        let v = ctx.make_number(3.25);
        assert_eq!(ctx.to_number(v), 3.25);
        let small = ctx.make_number(4.0);
        assert!(small.is_integer());
    }

    #[test]
    fn strings_round_trip_through_make_string_and_string_value() {
        let mut ctx = context();
        let v = ctx.make_string("hi");
        assert_eq!(ctx.string_value(v), "hi");
    }
}
