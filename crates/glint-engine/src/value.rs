//! Host-facing value introspection and construction.
//!
//! These mirror the embedding surface's "value introspection" and
//! "value construction" bullet lists: thin wrappers over
//! [`Context`]'s internal-method methods (`get`/`put`/`define_own_property`/…)
//! that take and return plain [`Value`]s instead of requiring the caller
//! to know about compact pointers or [`PropertyKey`] internals.

use glint_vm_core::object::{NativeFn, ObjectKind, ObjectRecord};
use glint_vm_core::property::{PropertyAttributes, PropertyDescriptor, PropertyKey};
use glint_vm_core::registry::BuiltinId;
use glint_vm_core::{function, Context};

use glint_vm_bytecode::Value;

// ---- introspection ------------------------------------------------------

/// Whether `v` is `undefined`.
pub fn is_undefined(v: Value) -> bool {
    v.is_undefined()
}

/// Whether `v` is `null`.
pub fn is_null(v: Value) -> bool {
    v.is_null()
}

/// Whether `v` is a boolean.
pub fn is_boolean(v: Value) -> bool {
    v.is_boolean()
}

/// Whether `v` is a number (small integer or heap float).
pub fn is_number(v: Value) -> bool {
    v.is_integer() || v.is_float()
}

/// Whether `v` is a string.
pub fn is_string(v: Value) -> bool {
    v.is_string()
}

/// Whether `v` is any object (including functions and arrays).
pub fn is_object(v: Value) -> bool {
    v.is_object()
}

/// Whether `v` is callable (`[[Call]]` is defined).
pub fn is_function(ctx: &Context, v: Value) -> bool {
    function::is_callable(ctx, v)
}

/// Whether `v` is an array.
pub fn is_array(ctx: &Context, v: Value) -> bool {
    v.is_object() && ctx.object(v.as_pointer()).kind() == ObjectKind::Array
}

/// Recover a number's `f64` value. `v` must be a number.
pub fn get_number(ctx: &Context, v: Value) -> f64 {
    ctx.number_value(v)
}

/// Recover a boolean's value. `v` must be a boolean.
pub fn get_boolean(v: Value) -> bool {
    v.as_boolean()
}

/// Recover a string's UTF-16 code units.
pub fn string_to_char_buffer(ctx: &Context, v: Value) -> Vec<u16> {
    ctx.string_value(v).encode_utf16().collect()
}

/// The number of UTF-16 code units in a string value.
pub fn get_string_size(ctx: &Context, v: Value) -> usize {
    ctx.string_value(v).encode_utf16().count()
}

/// An array's `.length`. `v` must be an array.
pub fn get_array_length(ctx: &mut Context, v: Value) -> u32 {
    let len = ctx.get(v.as_pointer(), &PropertyKey::Magic(glint_vm_core::magic::MagicString::Length));
    ctx.to_number(len) as u32
}

/// `obj.name`, consulting the prototype chain.
pub fn get_property(ctx: &mut Context, obj: Value, name: &str) -> Value {
    ctx.get(obj.as_pointer(), &PropertyKey::string(name))
}

/// `obj[index]`, consulting the prototype chain.
pub fn get_property_at(ctx: &mut Context, obj: Value, index: u32) -> Value {
    ctx.get(obj.as_pointer(), &PropertyKey::index(index))
}

/// `obj.name = value`, non-strict semantics (silent on a rejected write).
pub fn set_property(ctx: &mut Context, obj: Value, name: &str, value: Value) {
    ctx.put(obj.as_pointer(), PropertyKey::string(name), value, false);
}

/// `obj[index] = value`, non-strict semantics.
pub fn set_property_at(ctx: &mut Context, obj: Value, index: u32, value: Value) {
    ctx.put(obj.as_pointer(), PropertyKey::index(index), value, false);
}

/// `[[DefineOwnProperty]]` with explicit attributes, rejecting (rather
/// than throwing) on a non-extensible target.
pub fn define_own_property(
    ctx: &mut Context,
    obj: Value,
    name: &str,
    value: Value,
    writable: bool,
    enumerable: bool,
    configurable: bool,
) -> bool {
    let attributes = PropertyAttributes { writable, enumerable, configurable };
    let descriptor = PropertyDescriptor::data_with(value, attributes);
    ctx.define_own_property(obj.as_pointer(), PropertyKey::string(name), descriptor, false)
        .as_boolean()
}

/// A snapshot of one own property's value and attribute bits, for
/// [`get_own_property_descriptor`].
#[derive(Debug, Clone, Copy)]
pub struct OwnPropertyDescriptor {
    pub value: Value,
    pub writable: bool,
    pub enumerable: bool,
    pub configurable: bool,
}

/// `[[GetOwnProperty]]`, surfaced for host introspection. Accessor
/// properties report their current getter result as `value`; the host
/// surface has no use for distinguishing data from accessor slots.
pub fn get_own_property_descriptor(ctx: &mut Context, obj: Value, name: &str) -> Option<OwnPropertyDescriptor> {
    let key = PropertyKey::string(name);
    let descriptor = ctx.get_own_property(obj.as_pointer(), &key)?;
    let attributes = descriptor.attributes();
    let value = match descriptor {
        PropertyDescriptor::Data { value, .. } => value,
        PropertyDescriptor::Accessor { .. } => ctx.get(obj.as_pointer(), &key),
    };
    Some(OwnPropertyDescriptor {
        value,
        writable: attributes.writable,
        enumerable: attributes.enumerable,
        configurable: attributes.configurable,
    })
}

/// Visit every enumerable own property name, in insertion order.
///
/// `visit` returning `false` stops iteration early.
pub fn foreach_object_property(ctx: &mut Context, obj: Value, mut visit: impl FnMut(&str) -> bool) {
    let (enumerable, _non_enumerable) = ctx.enumerate(obj.as_pointer());
    for key in enumerable {
        if !visit(&key.to_display_string()) {
            break;
        }
    }
}

/// An object's prototype link, or `null` at the root of a chain.
pub fn get_prototype(ctx: &Context, obj: Value) -> Value {
    match ctx.object(obj.as_pointer()).prototype() {
        Some(proto) => Value::object(proto),
        None => Value::null(),
    }
}

/// Replace an object's prototype link. `proto` must be an object or
/// `null`.
pub fn set_prototype(ctx: &Context, obj: Value, proto: Value) {
    let link = if proto.is_object() { Some(proto.as_pointer()) } else { None };
    ctx.object(obj.as_pointer()).set_prototype(link);
}

// ---- construction ---------------------------------------------------

/// A heap-allocated number value.
pub fn create_number(ctx: &mut Context, n: f64) -> Value {
    ctx.make_number(n)
}

/// A boolean value (no allocation).
pub fn create_boolean(value: bool) -> Value {
    Value::boolean(value)
}

/// A heap-allocated (interned) string value.
pub fn create_string(ctx: &mut Context, s: &str) -> Value {
    ctx.make_string(s)
}

/// A fresh, empty ordinary object with `Object.prototype` as its
/// prototype.
pub fn create_object(ctx: &mut Context) -> Value {
    let proto = ctx.builtin(BuiltinId::Object).prototype;
    Value::object(ctx.alloc_object(ObjectRecord::new(ObjectKind::General, proto, true)))
}

/// A fresh array with `.length` set to `len` and every slot a hole.
pub fn create_array(ctx: &mut Context, len: u32) -> Value {
    let proto = ctx.builtin(BuiltinId::Array).prototype;
    let record = ObjectRecord::new(ObjectKind::Array, proto, true);
    record.put_own(PropertyKey::Magic(glint_vm_core::magic::MagicString::Length), Value::integer(len as i32));
    for i in 0..len {
        record.put_own(PropertyKey::index(i), Value::array_hole());
    }
    Value::object(ctx.alloc_object(record))
}

/// A fresh error object of the given built-in kind (`TypeError`,
/// `RangeError`, …), matching `new Error(message)`'s shape but without
/// throwing it — construction and throwing are separate host-surface
/// operations.
pub fn create_error(ctx: &mut Context, kind: BuiltinId, message: &str) -> Value {
    ctx.throw_error(kind, message).into_completion_value()
}

/// A function object backed by a host-supplied native entry point.
pub fn create_external_function(ctx: &mut Context, entry: NativeFn) -> Value {
    let proto = ctx.builtin(BuiltinId::Function).prototype;
    let fn_proto = ctx.builtin(BuiltinId::Object).prototype;
    let obj = ObjectRecord::external_function(proto, entry);
    let ptr = ctx.alloc_object(obj);
    let own_proto = ObjectRecord::new(ObjectKind::General, fn_proto, true);
    let own_proto_ptr = ctx.alloc_object(own_proto);
    ctx.object(ptr).put_own(
        PropertyKey::Magic(glint_vm_core::magic::MagicString::Prototype),
        Value::object(own_proto_ptr),
    );
    Value::object(ptr)
}

/// Retain a value for the embedder's own keeping, incrementing its
/// underlying cell's refcount if it has one.
pub fn acquire_value(ctx: &Context, v: Value) {
    ctx.retain_value(v);
}

/// Release a value the embedder previously retained via
/// [`acquire_value`].
pub fn release_value(ctx: &mut Context, v: Value) {
    ctx.release_value(v);
}

/// Attach a host-owned pointer to an object, with a callback that frees
/// it when the object is collected. Replacing an existing handle does
/// not invoke the old callback — the embedder is responsible for
/// freeing its own previous value before replacing it, mirroring the
/// exactly-once contract the surface documents.
pub fn set_object_native_handle(ctx: &mut Context, obj: Value, ptr: *mut u8, free: Option<fn(*mut u8)>) {
    ctx.set_object_native_handle(obj.as_pointer(), ptr, free);
}

/// The pointer previously attached via [`set_object_native_handle`], or
/// null if none was ever attached.
pub fn get_object_native_handle(ctx: &Context, obj: Value) -> *mut u8 {
    ctx.get_object_native_handle(obj.as_pointer())
}

#[cfg(test)]
mod tests {
    use super::*;
    use glint_vm_gc::GcConfig;

    #[test]
    fn create_and_inspect_a_number() {
        let mut ctx = Context::new(GcConfig::default());
        let v = create_number(&mut ctx, 3.5);
        assert!(is_number(v));
        assert_eq!(get_number(&ctx, v), 3.5);
    }

    #[test]
    fn create_object_then_roundtrip_a_property() {
        let mut ctx = Context::new(GcConfig::default());
        let obj = create_object(&mut ctx);
        let val = create_string(&mut ctx, "hi");
        set_property(&mut ctx, obj, "greeting", val);
        let read_back = get_property(&mut ctx, obj, "greeting");
        assert_eq!(ctx.string_value(read_back), "hi");
    }

    #[test]
    fn create_array_reports_its_length() {
        let mut ctx = Context::new(GcConfig::default());
        let arr = create_array(&mut ctx, 3);
        assert!(is_array(&ctx, arr));
        assert_eq!(get_array_length(&mut ctx, arr), 3);
    }

    #[test]
    fn foreach_object_property_visits_in_insertion_order() {
        let mut ctx = Context::new(GcConfig::default());
        let obj = create_object(&mut ctx);
        set_property(&mut ctx, obj, "a", Value::integer(1));
        set_property(&mut ctx, obj, "b", Value::integer(2));
        let mut seen = Vec::new();
        foreach_object_property(&mut ctx, obj, |name| {
            seen.push(name.to_string());
            true
        });
        assert_eq!(seen, vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn native_handle_round_trips_until_replaced() {
        let mut ctx = Context::new(GcConfig::default());
        let obj = create_object(&mut ctx);
        let mut payload = 7u8;
        set_object_native_handle(&mut ctx, obj, &mut payload as *mut u8, None);
        assert_eq!(get_object_native_handle(&ctx, obj), &mut payload as *mut u8);
    }
}
