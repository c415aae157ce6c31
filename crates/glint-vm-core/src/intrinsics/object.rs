//! `Object` constructor and `Object.prototype` routines.

use glint_vm_bytecode::Value;
use glint_vm_gc::CompactPtr;

use super::arg;
use crate::context::Context;
use crate::magic::MagicString;
use crate::object::{ObjectKind, ObjectRecord};
use crate::property::{PropertyAttributes, PropertyDescriptor, PropertyKey};
use crate::registry::BuiltinId;

const DEFINE_PROPERTY: u32 = 0;
const GET_OWN_PROPERTY_DESCRIPTOR: u32 = 1;
const KEYS: u32 = 2;
const CREATE: u32 = 3;
const TO_STRING: u32 = 4;
const VALUE_OF: u32 = 5;

/// `Object(value)` / `new Object(value)`: pass objects through, box
/// primitives, and fall back to a fresh plain object for `undefined`,
/// `null`, or no argument at all.
pub fn construct(ctx: &mut Context, args: &[Value]) -> Value {
    let value = arg(args, 0);
    if value.is_object() {
        return value;
    }
    if value.is_nullish() {
        let proto = ctx.builtin(BuiltinId::Object).prototype;
        return Value::object(ctx.alloc_object(ObjectRecord::new(ObjectKind::General, proto, true)));
    }
    ctx.to_object(value)
}

pub fn dispatch(ctx: &mut Context, routine_id: u32, this: Value, args: &[Value]) -> Value {
    match routine_id {
        DEFINE_PROPERTY => define_property(ctx, args),
        GET_OWN_PROPERTY_DESCRIPTOR => get_own_property_descriptor(ctx, args),
        KEYS => keys(ctx, args),
        CREATE => create(ctx, args),
        TO_STRING => to_string(ctx, this),
        VALUE_OF => ctx.to_object(this),
        _ => Value::undefined(),
    }
}

fn require_object(ctx: &mut Context, v: Value, what: &str) -> Result<CompactPtr, Value> {
    if v.is_object() {
        Ok(v.as_pointer())
    } else {
        Err(ctx.throw_error(BuiltinId::TypeError, &format!("{what} called on non-object")))
    }
}

fn define_property(ctx: &mut Context, args: &[Value]) -> Value {
    let obj = match require_object(ctx, arg(args, 0), "Object.defineProperty") {
        Ok(ptr) => ptr,
        Err(err) => return err,
    };
    let key = PropertyKey::string(&ctx.to_string(arg(args, 1)));
    let descriptor_obj = arg(args, 2);
    if !descriptor_obj.is_object() {
        return ctx.throw_error(BuiltinId::TypeError, "property descriptor must be an object");
    }
    let descriptor = match to_property_descriptor(ctx, descriptor_obj.as_pointer()) {
        Ok(d) => d,
        Err(err) => return err,
    };
    let result = ctx.define_own_property(obj, key, descriptor, true);
    if result.is_abrupt() {
        return result;
    }
    Value::object(obj)
}

fn to_property_descriptor(ctx: &mut Context, src: CompactPtr) -> Result<PropertyDescriptor, Value> {
    let has = |ctx: &mut Context, name: &str| ctx.has_property(src, &PropertyKey::string(name));
    let get_field = |ctx: &mut Context, name: &str| ctx.get(src, &PropertyKey::string(name));

    let is_accessor = has(ctx, "get") || has(ctx, "set");
    let writable = has(ctx, "writable") && {
        let v = get_field(ctx, "writable");
        crate::interpreter::is_truthy(ctx, v)
    };
    let enumerable = has(ctx, "enumerable") && {
        let v = get_field(ctx, "enumerable");
        crate::interpreter::is_truthy(ctx, v)
    };
    let configurable = has(ctx, "configurable") && {
        let v = get_field(ctx, "configurable");
        crate::interpreter::is_truthy(ctx, v)
    };
    let attributes = PropertyAttributes { writable, enumerable, configurable };
    if is_accessor {
        let get = if has(ctx, "get") { Some(get_field(ctx, "get")) } else { None };
        let set = if has(ctx, "set") { Some(get_field(ctx, "set")) } else { None };
        return Ok(PropertyDescriptor::Accessor { get, set, attributes });
    }
    let value = if has(ctx, "value") { get_field(ctx, "value") } else { Value::undefined() };
    Ok(PropertyDescriptor::data_with(value, attributes))
}

fn get_own_property_descriptor(ctx: &mut Context, args: &[Value]) -> Value {
    let obj = match require_object(ctx, arg(args, 0), "Object.getOwnPropertyDescriptor") {
        Ok(ptr) => ptr,
        Err(err) => return err,
    };
    let key = PropertyKey::string(&ctx.to_string(arg(args, 1)));
    let Some(descriptor) = ctx.get_own_property(obj, &key) else {
        return Value::undefined();
    };
    let result_proto = ctx.builtin(BuiltinId::Object).prototype;
    let result = ctx.alloc_object(ObjectRecord::new(ObjectKind::General, result_proto, true));
    match descriptor {
        PropertyDescriptor::Data { value, attributes } => {
            ctx.object(result).put_own(PropertyKey::string("value"), value);
            ctx.object(result).put_own(PropertyKey::string("writable"), Value::boolean(attributes.writable));
            ctx.object(result).put_own(PropertyKey::string("enumerable"), Value::boolean(attributes.enumerable));
            ctx.object(result).put_own(PropertyKey::string("configurable"), Value::boolean(attributes.configurable));
        }
        PropertyDescriptor::Accessor { get, set, attributes } => {
            ctx.object(result).put_own(PropertyKey::string("get"), get.unwrap_or_else(Value::undefined));
            ctx.object(result).put_own(PropertyKey::string("set"), set.unwrap_or_else(Value::undefined));
            ctx.object(result).put_own(PropertyKey::string("enumerable"), Value::boolean(attributes.enumerable));
            ctx.object(result).put_own(PropertyKey::string("configurable"), Value::boolean(attributes.configurable));
        }
    }
    Value::object(result)
}

fn keys(ctx: &mut Context, args: &[Value]) -> Value {
    let obj = match require_object(ctx, arg(args, 0), "Object.keys") {
        Ok(ptr) => ptr,
        Err(err) => return err,
    };
    let (enumerable, _) = ctx.enumerate(obj);
    let array_proto = ctx.builtin(BuiltinId::Array).prototype;
    let array = ctx.alloc_object(ObjectRecord::new(ObjectKind::Array, array_proto, true));
    ctx.object(array).define_own_data(
        PropertyKey::Magic(MagicString::Length),
        Value::integer(enumerable.len() as i32),
        PropertyAttributes::length(),
    );
    for (i, key) in enumerable.into_iter().enumerate() {
        let name = ctx.make_string(&key.to_display_string());
        ctx.object(array).put_own(PropertyKey::index(i as u32), name);
    }
    Value::object(array)
}

fn create(ctx: &mut Context, args: &[Value]) -> Value {
    let proto_arg = arg(args, 0);
    let proto = if proto_arg.is_object() {
        Some(proto_arg.as_pointer())
    } else if proto_arg.is_null() {
        None
    } else {
        return ctx.throw_error(BuiltinId::TypeError, "Object.create's prototype must be an object or null");
    };
    let obj = ctx.alloc_object(ObjectRecord::new(ObjectKind::General, proto, true));
    let props = arg(args, 1);
    if props.is_object() {
        let (enumerable, non_enumerable) = ctx.enumerate(props.as_pointer());
        for key in enumerable.into_iter().chain(non_enumerable) {
            let descriptor_obj = ctx.get(props.as_pointer(), &key);
            if !descriptor_obj.is_object() {
                continue;
            }
            let descriptor = match to_property_descriptor(ctx, descriptor_obj.as_pointer()) {
                Ok(d) => d,
                Err(err) => return err,
            };
            let result = ctx.define_own_property(obj, key, descriptor, true);
            if result.is_abrupt() {
                return result;
            }
        }
    }
    Value::object(obj)
}

fn to_string(ctx: &mut Context, this: Value) -> Value {
    let tag = if this.is_undefined() {
        "Undefined"
    } else if this.is_null() {
        "Null"
    } else if this.is_object() {
        match ctx.object(this.as_pointer()).kind() {
            ObjectKind::Array => "Array",
            ObjectKind::StringObject => "String",
            ObjectKind::Function | ObjectKind::BuiltinFunction | ObjectKind::ExternalFunction | ObjectKind::BoundFunction => "Function",
            ObjectKind::Arguments => "Arguments",
            _ => "Object",
        }
    } else {
        "Object"
    };
    ctx.make_string(&format!("[object {tag}]"))
}
