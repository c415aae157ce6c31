//! Installation and lazy materialization of the engine's resident
//! built-ins: `Object`, `Function`, `Array`, the three primitive
//! wrappers, the `Error` family, and the global object's fixed
//! bindings. This is the minimum surface `[[Call]]`/`[[Construct]]`
//! and property-descriptor semantics need to be observable at all;
//! everything past it (`Math`, `Date`, `JSON`, `RegExp`, …) is a
//! library concern outside this crate.
//!
//! Two things happen here that do not happen for ordinary objects:
//! *installation* (`install_all`, run once per [`Context`]) wires up
//! the constructor/prototype graph and its circular references, and
//! *lazy materialization* (`materialize`) defers turning a descriptor
//! row into an actual property until something reads it, mirroring
//! [`crate::object::ObjectRecord::instantiated`]'s bitset.

mod array;
mod boolean;
mod error;
mod function;
mod number;
mod object;
mod string;

use glint_vm_bytecode::Value;
use glint_vm_gc::CompactPtr;

use crate::context::{BuiltinHandles, Context};
use crate::magic::MagicString;
use crate::object::{ObjectKind, ObjectRecord};
use crate::property::{PropertyAttributes, PropertyDescriptor, PropertyKey};
use crate::registry::{self, BuiltinId, DescriptorKind, DescriptorName};

/// The routine id reserved for a built-in's own `[[Call]]`/`[[Construct]]`
/// entry point, as opposed to one of its descriptor-table methods.
pub(crate) const CONSTRUCTOR_ROUTINE: u32 = u32::MAX;

/// The shared thrower's one behavior: refuse to be called.
///
/// Installed as `caller`/`arguments` accessors on every strict
/// function. Every strict function shares this exact object rather
/// than each getting its own.
pub fn thrower_entry(ctx: &mut Context, _this: Value, _args: &[Value]) -> Value {
    ctx.throw_error(BuiltinId::TypeError, "'caller' and 'arguments' are restricted function properties")
}

fn arg(args: &[Value], i: usize) -> Value {
    args.get(i).copied().unwrap_or_else(Value::undefined)
}

fn routine(ctx: &mut Context, internal_proto: Option<CompactPtr>, builtin_id: BuiltinId, routine_id: u32) -> Value {
    Value::object(ctx.alloc_object(ObjectRecord::builtin_function(internal_proto, builtin_id, routine_id)))
}

/// Build every resident built-in and register its handles on `ctx`.
///
/// Order matters: `Object.prototype` is the root of every prototype
/// chain, `Function.prototype` is the internal `[[Prototype]]` every
/// function (including every other constructor) carries, so both must
/// exist before anything else is allocated.
pub fn install_all(ctx: &mut Context) {
    let object_proto = ctx.alloc_object(ObjectRecord::new(ObjectKind::General, None, true));
    let function_proto = ctx.alloc_object(ObjectRecord::external_function(Some(object_proto), |_, _, _| Value::undefined()));

    install_with_prototype(ctx, BuiltinId::Object, object_proto);
    install_with_prototype(ctx, BuiltinId::Function, function_proto);

    let array_proto = ctx.alloc_object(ObjectRecord::new(ObjectKind::Array, Some(object_proto), true));
    install_with_prototype(ctx, BuiltinId::Array, array_proto);

    let string_proto = ctx.alloc_object(ObjectRecord::new(ObjectKind::StringObject, Some(object_proto), true));
    install_with_prototype(ctx, BuiltinId::String, string_proto);

    let number_proto = ctx.alloc_object(ObjectRecord::new(ObjectKind::General, Some(object_proto), true));
    install_with_prototype(ctx, BuiltinId::Number, number_proto);

    let boolean_proto = ctx.alloc_object(ObjectRecord::new(ObjectKind::General, Some(object_proto), true));
    install_with_prototype(ctx, BuiltinId::Boolean, boolean_proto);

    let error_proto = ctx.alloc_object(ObjectRecord::new(ObjectKind::General, Some(object_proto), true));
    install_with_prototype(ctx, BuiltinId::Error, error_proto);
    error_proto_name(ctx, error_proto, "Error");

    for &sibling in BuiltinId::ERROR_SIBLINGS.iter() {
        let sibling_proto = ctx.alloc_object(ObjectRecord::new(ObjectKind::General, Some(error_proto), true));
        install_with_prototype(ctx, sibling, sibling_proto);
        error_proto_name(ctx, sibling_proto, sibling_error_name(sibling));
    }

    ctx.register_builtin(
        BuiltinId::Global,
        BuiltinHandles {
            constructor: ctx.global_object,
            prototype: None,
        },
    );
}

/// Register `id`'s constructor/prototype pair and wire up the
/// eager (non-lazy) cross-links between them: the constructor's own
/// `prototype` property, the prototype's `constructor` back-reference,
/// and the constructor's internal `[[Prototype]]` link to its own
/// `.prototype` object (so static-style members installed on the
/// prototype resolve through the ordinary chain — see
/// `materialize`'s doc comment for why there is only one descriptor
/// table per built-in rather than a constructor/prototype split).
fn install_with_prototype(ctx: &mut Context, id: BuiltinId, prototype: CompactPtr) {
    let constructor = ctx.alloc_object(ObjectRecord::builtin_function(Some(prototype), id, CONSTRUCTOR_ROUTINE));
    ctx.object(constructor).put_own(
        PropertyKey::Magic(MagicString::Prototype),
        Value::object(prototype),
    );
    ctx.object(prototype).define_own_data(
        PropertyKey::Magic(MagicString::Constructor),
        Value::object(constructor),
        PropertyAttributes {
            writable: true,
            enumerable: false,
            configurable: true,
        },
    );
    ctx.register_builtin(id, BuiltinHandles { constructor, prototype: Some(prototype) });
}

fn error_proto_name(ctx: &mut Context, proto: CompactPtr, name: &'static str) {
    let value = ctx.make_string(name);
    ctx.object(proto).define_own_data(
        PropertyKey::string("name"),
        value,
        PropertyAttributes {
            writable: true,
            enumerable: false,
            configurable: true,
        },
    );
}

fn sibling_error_name(id: BuiltinId) -> &'static str {
    match id {
        BuiltinId::TypeError => "TypeError",
        BuiltinId::RangeError => "RangeError",
        BuiltinId::ReferenceError => "ReferenceError",
        BuiltinId::SyntaxError => "SyntaxError",
        BuiltinId::UriError => "URIError",
        BuiltinId::EvalError => "EvalError",
        _ => "Error",
    }
}

/// Materialize `obj`'s lazy properties: either the single one named by
/// `key`, or (when `key` is `None`, for `enumerate`) every descriptor
/// not yet instantiated.
///
/// Three independent lazy-property sources feed into this one hook,
/// matched by what kind of object `obj` actually is:
///
/// - A built-in's constructor or prototype object materializes rows
///   from its [`registry::BuiltinDescriptor`] table. Constructor-style
///   statics (`Object.keys`) and prototype-style instance methods
///   (`Object.prototype.toString`) share one table, installed on the
///   prototype object only; a constructor's own internal
///   `[[Prototype]]` link points at that same prototype object (set
///   up once in `install_with_prototype`), so static-style lookups
///   resolve through the ordinary chain instead of needing a second
///   table.
/// - A plain (byte-code) function materializes `length`, `prototype`,
///   and — if strict — `caller`/`arguments` thrower accessors.
/// - A built-in routine function (one already installed as, say,
///   `Object.prototype.toString`) materializes only `length`.
pub fn materialize(ctx: &mut Context, obj: CompactPtr, key: Option<&PropertyKey>) {
    if let Some((id, is_prototype_side)) = ctx.builtin_id_for(obj) {
        if id == BuiltinId::Global {
            materialize_descriptors(ctx, obj, id, key);
        } else if is_prototype_side {
            materialize_descriptors(ctx, obj, id, key);
        }
        return;
    }

    match ctx.object(obj).function_extra() {
        Some(crate::object::FunctionExtra::Plain { code, .. }) => {
            let code = code.clone();
            materialize_plain_function(ctx, obj, &code, key);
        }
        Some(crate::object::FunctionExtra::Builtin { builtin_id, routine_id }) => {
            let (builtin_id, routine_id) = (*builtin_id, *routine_id);
            if routine_id != CONSTRUCTOR_ROUTINE {
                materialize_routine_length(ctx, obj, builtin_id, routine_id, key);
            }
        }
        _ => {}
    }
}

fn name_matches(key: Option<&PropertyKey>, candidate: &str) -> bool {
    match key {
        Some(k) => k.to_display_string() == candidate,
        None => true,
    }
}

fn materialize_descriptors(ctx: &mut Context, obj: CompactPtr, id: BuiltinId, key: Option<&PropertyKey>) {
    let table = registry::descriptors_for(id);
    for (slot, descriptor) in table.iter().enumerate() {
        let slot = slot as u32;
        if ctx.object(obj).instantiated().is_set(slot) {
            continue;
        }
        if !name_matches(key, descriptor.name.as_str()) {
            continue;
        }
        install_descriptor(ctx, obj, id, descriptor);
        ctx.object(obj).instantiated().set(slot);
        if key.is_some() {
            return;
        }
    }
}

fn install_descriptor(ctx: &mut Context, obj: CompactPtr, id: BuiltinId, descriptor: &registry::BuiltinDescriptor) {
    let value = match descriptor.kind {
        DescriptorKind::Routine { routine_id, arg_count: _ } => {
            let proto = ctx.builtin(BuiltinId::Function).prototype;
            routine(ctx, proto, id, routine_id)
        }
        DescriptorKind::Number(n) => ctx.make_number(n),
        DescriptorKind::StringConst(s) => ctx.make_string(s),
        DescriptorKind::Undefined => Value::undefined(),
        DescriptorKind::BuiltinRef { id, prototype } => {
            let handles = ctx.builtin(id);
            let ptr = if prototype {
                handles.prototype.expect("referenced built-in has a prototype object")
            } else {
                handles.constructor
            };
            Value::object(ptr)
        }
    };
    let name = match descriptor.name {
        DescriptorName::Magic(m) => PropertyKey::Magic(m),
        DescriptorName::Literal(s) => PropertyKey::string(s),
    };
    ctx.object(obj).define_own_data(name, value, descriptor.attributes);
}

const PLAIN_LENGTH_SLOT: u32 = 0;
const PLAIN_PROTOTYPE_SLOT: u32 = 1;
const PLAIN_CALLER_SLOT: u32 = 2;
const PLAIN_ARGUMENTS_SLOT: u32 = 3;

fn materialize_plain_function(
    ctx: &mut Context,
    obj: CompactPtr,
    code: &glint_vm_bytecode::CompiledCode,
    key: Option<&PropertyKey>,
) {
    let want = |name: &str| name_matches(key, name);

    if want("length") && !ctx.object(obj).instantiated().is_set(PLAIN_LENGTH_SLOT) {
        ctx.object(obj).define_own_data(
            PropertyKey::Magic(MagicString::Length),
            Value::integer(code.length() as i32),
            PropertyAttributes::sealed(),
        );
        ctx.object(obj).instantiated().set(PLAIN_LENGTH_SLOT);
    }
    if want("prototype") && !ctx.object(obj).instantiated().is_set(PLAIN_PROTOTYPE_SLOT) {
        let object_proto = ctx.builtin(BuiltinId::Object).prototype;
        let fresh = ctx.alloc_object(ObjectRecord::new(ObjectKind::General, object_proto, true));
        ctx.object(fresh).define_own_data(
            PropertyKey::Magic(MagicString::Constructor),
            Value::object(obj),
            PropertyAttributes {
                writable: true,
                enumerable: false,
                configurable: true,
            },
        );
        ctx.object(obj).define_own_data(
            PropertyKey::Magic(MagicString::Prototype),
            Value::object(fresh),
            PropertyAttributes {
                writable: false,
                enumerable: false,
                configurable: false,
            },
        );
        ctx.object(obj).instantiated().set(PLAIN_PROTOTYPE_SLOT);
    }
    if code.is_strict() {
        if want("caller") && !ctx.object(obj).instantiated().is_set(PLAIN_CALLER_SLOT) {
            install_thrower_accessor(ctx, obj, PropertyKey::Magic(MagicString::Caller));
            ctx.object(obj).instantiated().set(PLAIN_CALLER_SLOT);
        }
        if want("arguments") && !ctx.object(obj).instantiated().is_set(PLAIN_ARGUMENTS_SLOT) {
            install_thrower_accessor(ctx, obj, PropertyKey::Magic(MagicString::Arguments));
            ctx.object(obj).instantiated().set(PLAIN_ARGUMENTS_SLOT);
        }
    }
}

fn install_thrower_accessor(ctx: &mut Context, obj: CompactPtr, key: PropertyKey) {
    let thrower = Value::object(ctx.thrower);
    ctx.object(obj).properties_mut().set(
        key,
        PropertyDescriptor::Accessor {
            get: Some(thrower),
            set: Some(thrower),
            attributes: PropertyAttributes::sealed(),
        },
    );
}

fn materialize_routine_length(
    ctx: &mut Context,
    obj: CompactPtr,
    builtin_id: BuiltinId,
    routine_id: u32,
    key: Option<&PropertyKey>,
) {
    if !name_matches(key, "length") || ctx.object(obj).instantiated().is_set(0) {
        return;
    }
    let arg_count = registry::descriptors_for(builtin_id)
        .iter()
        .find_map(|d| match d.kind {
            DescriptorKind::Routine { routine_id: r, arg_count } if r == routine_id => Some(arg_count),
            _ => None,
        })
        .unwrap_or(0);
    ctx.object(obj).define_own_data(
        PropertyKey::Magic(MagicString::Length),
        Value::integer(arg_count as i32),
        PropertyAttributes::sealed(),
    );
    ctx.object(obj).instantiated().set(0);
}

/// Route a `[[Call]]`/`[[Construct]]` on a built-in-function object to
/// its implementation, keyed by `(builtin_id, routine_id)`.
pub fn dispatch(ctx: &mut Context, builtin_id: BuiltinId, routine_id: u32, this: Value, args: &[Value]) -> Value {
    if routine_id == CONSTRUCTOR_ROUTINE {
        return dispatch_constructor(ctx, builtin_id, this, args);
    }
    match builtin_id {
        BuiltinId::Object => object::dispatch(ctx, routine_id, this, args),
        BuiltinId::Function => function::dispatch(ctx, routine_id, this, args),
        BuiltinId::Array => array::dispatch(ctx, routine_id, this, args),
        BuiltinId::String => string::dispatch(ctx, routine_id, this, args),
        BuiltinId::Number => number::dispatch(ctx, routine_id, this, args),
        BuiltinId::Boolean => boolean::dispatch(ctx, routine_id, this, args),
        BuiltinId::Error
        | BuiltinId::TypeError
        | BuiltinId::RangeError
        | BuiltinId::ReferenceError
        | BuiltinId::SyntaxError
        | BuiltinId::UriError
        | BuiltinId::EvalError => error::dispatch(ctx, routine_id, this, args),
        BuiltinId::Global => ctx.throw_error(BuiltinId::EvalError, "eval is not supported in this build"),
    }
}

/// `this` distinguishes a `new`-bound call (the interpreter passes a
/// freshly allocated object) from a bare function call: `String`,
/// `Number`, and `Boolean` behave differently in each case, boxing
/// their argument only in the former.
fn dispatch_constructor(ctx: &mut Context, builtin_id: BuiltinId, this: Value, args: &[Value]) -> Value {
    match builtin_id {
        BuiltinId::Object => object::construct(ctx, args),
        BuiltinId::Function => ctx.throw_error(BuiltinId::EvalError, "the Function constructor is not supported in this build"),
        BuiltinId::Array => array::construct(ctx, args),
        BuiltinId::String => string::construct(ctx, this, args),
        BuiltinId::Number => number::construct(ctx, this, args),
        BuiltinId::Boolean => boolean::construct(ctx, this, args),
        BuiltinId::Error
        | BuiltinId::TypeError
        | BuiltinId::RangeError
        | BuiltinId::ReferenceError
        | BuiltinId::SyntaxError
        | BuiltinId::UriError
        | BuiltinId::EvalError => error::construct(ctx, builtin_id, args),
        BuiltinId::Global => Value::undefined(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glint_vm_gc::GcConfig;

    #[test]
    fn object_and_function_prototypes_are_distinct_and_chained() {
        let ctx = Context::new(GcConfig::default());
        let object_proto = ctx.builtin(BuiltinId::Object).prototype.unwrap();
        let function_proto = ctx.builtin(BuiltinId::Function).prototype.unwrap();
        assert_ne!(object_proto, function_proto);
        assert_eq!(ctx.object(function_proto).prototype(), Some(object_proto));
    }

    #[test]
    fn error_siblings_chain_to_error_prototype() {
        let ctx = Context::new(GcConfig::default());
        let error_proto = ctx.builtin(BuiltinId::Error).prototype.unwrap();
        let type_error_proto = ctx.builtin(BuiltinId::TypeError).prototype.unwrap();
        assert_eq!(ctx.object(type_error_proto).prototype(), Some(error_proto));
    }

    #[test]
    fn a_constructors_prototype_property_is_eagerly_present() {
        let mut ctx = Context::new(GcConfig::default());
        let handles = ctx.builtin(BuiltinId::Array);
        let value = ctx.get(handles.constructor, &PropertyKey::Magic(MagicString::Prototype));
        assert_eq!(value, Value::object(handles.prototype.unwrap()));
    }

    #[test]
    fn object_prototype_tostring_materializes_lazily_on_first_access() {
        let mut ctx = Context::new(GcConfig::default());
        let object_proto = ctx.builtin(BuiltinId::Object).prototype.unwrap();
        assert!(!ctx.object(object_proto).properties().contains(&PropertyKey::Magic(MagicString::ToString)));
        let f = ctx.get(object_proto, &PropertyKey::Magic(MagicString::ToString));
        assert!(crate::function::is_callable(&ctx, f));
    }
}
