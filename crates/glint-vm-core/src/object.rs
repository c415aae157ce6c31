//! The object model: object records, property access, and the
//! operations ECMA-262's internal methods (`[[Get]]`, `[[Put]]`, …)
//! boil down to.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use glint_vm_bytecode::{CompiledCode, Value};
use glint_vm_gc::{CompactPtr, GcCell, GcHeader};

use crate::environment::Environment;
use crate::property::{PropertyAttributes, PropertyChain, PropertyDescriptor, PropertyKey};
use crate::registry::BuiltinId;

/// The type tag every object carries, deciding which extended data (if
/// any) it holds and how `[[Call]]`/`[[Construct]]` dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectKind {
    /// An ordinary object with no special internal behavior.
    General,
    /// A user-defined function backed by compiled byte-code.
    Function,
    /// `Function.prototype.bind`'s result.
    BoundFunction,
    /// A host-supplied native function.
    ExternalFunction,
    /// A function implemented by the engine's built-in registry.
    BuiltinFunction,
    /// An array, whose indexed properties are also reachable as an
    /// ordinary property chain (`Index` keys).
    Array,
    /// A `new String(...)` wrapper, carrying a primitive string slot.
    StringObject,
    /// An `arguments` object.
    Arguments,
    /// A fresh, declaration-only lexical environment.
    LexEnvDeclarative,
    /// A lexical environment wrapping an ordinary object (`with`, the
    /// global environment).
    LexEnvObject,
}

impl ObjectKind {
    /// Whether objects of this kind are callable via `[[Call]]`.
    pub const fn is_callable(self) -> bool {
        matches!(
            self,
            ObjectKind::Function
                | ObjectKind::BoundFunction
                | ObjectKind::ExternalFunction
                | ObjectKind::BuiltinFunction
        )
    }

    /// Whether objects of this kind support `[[Construct]]`.
    ///
    /// Per the function protocol, plain, external, and bound functions
    /// are constructors; built-in routines are only sometimes
    /// constructors, so that case is decided per-descriptor rather than
    /// by kind alone.
    pub const fn is_constructor_kind(self) -> bool {
        matches!(
            self,
            ObjectKind::Function | ObjectKind::ExternalFunction | ObjectKind::BoundFunction
        )
    }
}

/// A native function entry point: `(this, args) -> result`. The result
/// may carry the abrupt-completion bit to signal a thrown value.
pub type NativeFn = fn(&mut crate::context::Context, Value, &[Value]) -> Value;

/// Extended data a function-kind object carries on top of the generic
/// object fields.
pub enum FunctionExtra {
    /// A plain function: its compiled body and the environment it
    /// closed over.
    Plain {
        /// The compiled byte-code this function runs.
        code: Rc<CompiledCode>,
        /// The lexical environment the function was defined in.
        scope: CompactPtr,
    },
    /// `target.bind(bound_this, ...bound_args)`'s result.
    Bound {
        /// The function being wrapped.
        target: Value,
        /// The `this` value bound at bind-time.
        bound_this: Value,
        /// Arguments prepended to every call.
        bound_args: Vec<Value>,
    },
    /// A host-supplied native function.
    External {
        /// The native entry point.
        entry: NativeFn,
    },
    /// A function dispatched through the built-in registry.
    Builtin {
        /// Which built-in this routine belongs to.
        builtin_id: BuiltinId,
        /// The routine's id within that built-in's routine table.
        routine_id: u32,
    },
}

/// Instantiation state for a built-in object's lazily materialized
/// properties: a 32-bit bitset covering the first 32 descriptor slots,
/// plus an overflow mask for registries with more than 32 entries.
#[derive(Debug, Default)]
pub struct InstantiationBitset {
    low: Cell<u32>,
    high: RefCell<Option<u32>>,
}

impl InstantiationBitset {
    /// Whether the descriptor at `slot` has been materialized.
    pub fn is_set(&self, slot: u32) -> bool {
        if slot < 32 {
            self.low.get() & (1 << slot) != 0
        } else {
            self.high
                .borrow()
                .map(|mask| mask & (1 << (slot - 32)) != 0)
                .unwrap_or(false)
        }
    }

    /// Mark the descriptor at `slot` as materialized.
    pub fn set(&self, slot: u32) {
        if slot < 32 {
            self.low.set(self.low.get() | (1 << slot));
        } else {
            let mut high = self.high.borrow_mut();
            *high = Some(high.unwrap_or(0) | (1 << (slot - 32)));
        }
    }
}

/// A single heap-resident object.
pub struct ObjectRecord {
    header: GcHeader,
    kind: ObjectKind,
    extensible: Cell<bool>,
    is_builtin: bool,
    prototype: Cell<Option<CompactPtr>>,
    properties: RefCell<PropertyChain>,
    /// The environment this record's outer-environment pointer chains
    /// to, when `kind` is one of the `LexEnv*` variants.
    outer_env: Cell<Option<CompactPtr>>,
    /// The wrapped object, when `kind` is `LexEnvObject`.
    bound_object: Cell<Option<CompactPtr>>,
    /// A bare data slot used by string-wrapper objects and arguments
    /// (the primitive value / callee binding), independent of the
    /// property chain.
    primitive_value: Cell<Option<Value>>,
    extra: Option<FunctionExtra>,
    instantiated: InstantiationBitset,
}

impl ObjectRecord {
    /// Build a general (non-function) object.
    pub fn new(kind: ObjectKind, prototype: Option<CompactPtr>, extensible: bool) -> Self {
        Self {
            header: GcHeader::new(),
            kind,
            extensible: Cell::new(extensible),
            is_builtin: false,
            prototype: Cell::new(prototype),
            properties: RefCell::new(PropertyChain::new()),
            outer_env: Cell::new(None),
            bound_object: Cell::new(None),
            primitive_value: Cell::new(None),
            extra: None,
            instantiated: InstantiationBitset::default(),
        }
    }

    /// Build a plain function object.
    pub fn function(prototype: Option<CompactPtr>, code: Rc<CompiledCode>, scope: CompactPtr) -> Self {
        Self {
            extra: Some(FunctionExtra::Plain { code, scope }),
            ..Self::new(ObjectKind::Function, prototype, true)
        }
    }

    /// Build a bound-function object.
    pub fn bound_function(
        prototype: Option<CompactPtr>,
        target: Value,
        bound_this: Value,
        bound_args: Vec<Value>,
    ) -> Self {
        Self {
            extra: Some(FunctionExtra::Bound {
                target,
                bound_this,
                bound_args,
            }),
            ..Self::new(ObjectKind::BoundFunction, prototype, true)
        }
    }

    /// Build an external (host-supplied) function object.
    pub fn external_function(prototype: Option<CompactPtr>, entry: NativeFn) -> Self {
        Self {
            extra: Some(FunctionExtra::External { entry }),
            ..Self::new(ObjectKind::ExternalFunction, prototype, true)
        }
    }

    /// Build a built-in-registry function object.
    pub fn builtin_function(prototype: Option<CompactPtr>, builtin_id: BuiltinId, routine_id: u32) -> Self {
        Self {
            extra: Some(FunctionExtra::Builtin { builtin_id, routine_id }),
            is_builtin: true,
            ..Self::new(ObjectKind::BuiltinFunction, prototype, true)
        }
    }

    /// Build a declarative lexical environment extending `outer`.
    pub fn declarative_environment(outer: Option<CompactPtr>) -> Self {
        let record = Self::new(ObjectKind::LexEnvDeclarative, None, true);
        record.outer_env.set(outer);
        record
    }

    /// Build an object-bound lexical environment wrapping `bound`.
    pub fn object_environment(bound: CompactPtr, outer: Option<CompactPtr>) -> Self {
        let record = Self::new(ObjectKind::LexEnvObject, None, true);
        record.outer_env.set(outer);
        record.bound_object.set(Some(bound));
        record
    }

    /// This object's type tag.
    pub fn kind(&self) -> ObjectKind {
        self.kind
    }

    /// Whether this object is managed by the built-in registry.
    pub fn is_builtin(&self) -> bool {
        self.is_builtin
    }

    /// The prototype link, or `None` for the root of a chain.
    pub fn prototype(&self) -> Option<CompactPtr> {
        self.prototype.get()
    }

    /// Replace the prototype link.
    pub fn set_prototype(&self, proto: Option<CompactPtr>) {
        self.prototype.set(proto);
    }

    /// Whether new own properties may be added.
    pub fn is_extensible(&self) -> bool {
        self.extensible.get()
    }

    /// Clear the extensible flag (`Object.preventExtensions`).
    pub fn prevent_extensions(&self) {
        self.extensible.set(false);
    }

    /// This lexical environment's outer link.
    pub fn outer_environment(&self) -> Option<CompactPtr> {
        self.outer_env.get()
    }

    /// The object an object-bound environment wraps.
    pub fn bound_object(&self) -> Option<CompactPtr> {
        self.bound_object.get()
    }

    /// The primitive value slot (string/number/boolean wrappers,
    /// arguments' callee binding).
    pub fn primitive_value(&self) -> Option<Value> {
        self.primitive_value.get()
    }

    /// Set the primitive value slot.
    pub fn set_primitive_value(&self, value: Value) {
        self.primitive_value.set(Some(value));
    }

    /// Borrow this object's extended function data, if it is a function
    /// of any kind.
    pub fn function_extra(&self) -> Option<&FunctionExtra> {
        self.extra.as_ref()
    }

    /// Borrow the own-property chain.
    pub fn properties(&self) -> std::cell::Ref<'_, PropertyChain> {
        self.properties.borrow()
    }

    /// Mutably borrow the own-property chain.
    pub fn properties_mut(&self) -> std::cell::RefMut<'_, PropertyChain> {
        self.properties.borrow_mut()
    }

    /// This built-in function's lazy-instantiation bitset.
    pub fn instantiated(&self) -> &InstantiationBitset {
        &self.instantiated
    }

    /// An own property lookup that does not consult the prototype chain
    /// or materialize lazy properties. Callers that need the full
    /// `[[GetOwnProperty]]` contract should go through
    /// [`crate::context::Context::get_own_property`] instead.
    pub fn get_own_data(&self, key: &PropertyKey) -> Option<Value> {
        self.properties.borrow().get(key).and_then(|d| d.value())
    }

    /// Insert or overwrite an own data property with default attributes.
    pub fn put_own(&self, key: PropertyKey, value: Value) {
        self.properties
            .borrow_mut()
            .set(key, PropertyDescriptor::data(value));
    }

    /// Insert or overwrite an own data property with explicit attributes.
    pub fn define_own_data(&self, key: PropertyKey, value: Value, attributes: PropertyAttributes) {
        self.properties
            .borrow_mut()
            .set(key, PropertyDescriptor::data_with(value, attributes));
    }

    /// Overwrite the value of an existing own data property in place,
    /// leaving its attributes untouched. Panics if `key` is not already
    /// present as a data property; callers must check first.
    pub fn set_own_value(&self, key: &PropertyKey, value: Value) {
        match self.properties.borrow_mut().get_mut(key) {
            Some(PropertyDescriptor::Data { value: slot, .. }) => *slot = value,
            _ => unreachable!("set_own_value requires an existing own data property"),
        }
    }
}

impl GcCell for ObjectRecord {
    fn header(&self) -> &GcHeader {
        &self.header
    }

    fn approx_size(&self) -> usize {
        std::mem::size_of::<Self>()
    }
}

/// The `Environment` view over an object record with `LexEnv*` kind,
/// used by the interpreter to resolve and create bindings without
/// caring whether the environment is declarative or object-bound.
impl Environment for ObjectRecord {
    fn outer(&self) -> Option<CompactPtr> {
        self.outer_environment()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_object_is_extensible_with_no_properties() {
        let obj = ObjectRecord::new(ObjectKind::General, None, true);
        assert!(obj.is_extensible());
        assert!(obj.get_own_data(&PropertyKey::string("x")).is_none());
    }

    #[test]
    fn put_own_then_get_own_round_trips() {
        let obj = ObjectRecord::new(ObjectKind::General, None, true);
        obj.put_own(PropertyKey::string("x"), Value::integer(9));
        assert_eq!(obj.get_own_data(&PropertyKey::string("x")), Some(Value::integer(9)));
    }

    #[test]
    fn instantiation_bitset_tracks_slots_past_32() {
        let bitset = InstantiationBitset::default();
        assert!(!bitset.is_set(40));
        bitset.set(40);
        assert!(bitset.is_set(40));
        assert!(!bitset.is_set(41));
    }

    #[test]
    fn prevent_extensions_is_observable() {
        let obj = ObjectRecord::new(ObjectKind::General, None, true);
        obj.prevent_extensions();
        assert!(!obj.is_extensible());
    }
}
