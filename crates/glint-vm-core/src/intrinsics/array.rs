//! `Array` constructor and `Array.prototype` routines.

use glint_vm_bytecode::Value;

use super::arg;
use crate::context::Context;
use crate::interpreter::array_append;
use crate::magic::MagicString;
use crate::object::{ObjectKind, ObjectRecord};
use crate::property::{PropertyAttributes, PropertyKey};
use crate::registry::BuiltinId;

const PUSH: u32 = 0;
const POP: u32 = 1;
const SLICE: u32 = 2;
const TO_STRING: u32 = 3;

fn new_array(ctx: &mut Context) -> Value {
    let proto = ctx.builtin(BuiltinId::Array).prototype;
    let array = ctx.alloc_object(ObjectRecord::new(ObjectKind::Array, proto, true));
    ctx.object(array).define_own_data(PropertyKey::Magic(MagicString::Length), Value::integer(0), PropertyAttributes::length());
    Value::object(array)
}

/// `Array(n)` creates a sparse array of length `n`; any other argument
/// list becomes the array's own indexed elements, in order.
pub fn construct(ctx: &mut Context, args: &[Value]) -> Value {
    let array = new_array(ctx);
    if args.len() == 1 && args[0].is_integer() {
        let len = args[0].as_integer();
        if len < 0 {
            return ctx.throw_error(BuiltinId::RangeError, "invalid array length");
        }
        ctx.object(array.as_pointer()).define_own_data(PropertyKey::Magic(MagicString::Length), Value::integer(len), PropertyAttributes::length());
        return array;
    }
    for &value in args {
        array_append(ctx, array, value);
    }
    array
}

pub fn dispatch(ctx: &mut Context, routine_id: u32, this: Value, args: &[Value]) -> Value {
    match routine_id {
        PUSH => push(ctx, this, args),
        POP => pop(ctx, this),
        SLICE => slice(ctx, this, args),
        TO_STRING => to_string(ctx, this),
        _ => Value::undefined(),
    }
}

fn length_of(ctx: &mut Context, this: Value) -> i32 {
    if !this.is_object() {
        return 0;
    }
    ctx.get(this.as_pointer(), &PropertyKey::Magic(MagicString::Length)).as_integer()
}

fn push(ctx: &mut Context, this: Value, args: &[Value]) -> Value {
    for &value in args {
        array_append(ctx, this, value);
    }
    Value::integer(length_of(ctx, this))
}

fn pop(ctx: &mut Context, this: Value) -> Value {
    if !this.is_object() {
        return Value::undefined();
    }
    let ptr = this.as_pointer();
    let length = length_of(ctx, this);
    if length <= 0 {
        return Value::undefined();
    }
    let last_index = (length - 1) as u32;
    let value = ctx.get(ptr, &PropertyKey::index(last_index));
    ctx.delete(ptr, &PropertyKey::index(last_index), false);
    ctx.object(ptr).define_own_data(PropertyKey::Magic(MagicString::Length), Value::integer(length - 1), PropertyAttributes::length());
    value
}

fn slice(ctx: &mut Context, this: Value, args: &[Value]) -> Value {
    let length = length_of(ctx, this);
    let start = normalize_index(ctx.to_number(arg(args, 0)), length);
    let end = if arg(args, 1).is_undefined() {
        length
    } else {
        normalize_index(ctx.to_number(arg(args, 1)), length)
    };
    let result = new_array(ctx);
    if !this.is_object() {
        return result;
    }
    let ptr = this.as_pointer();
    let mut i = start;
    while i < end {
        let value = ctx.get(ptr, &PropertyKey::index(i as u32));
        array_append(ctx, result, value);
        i += 1;
    }
    result
}

fn normalize_index(n: f64, length: i32) -> i32 {
    let n = if n.is_nan() { 0 } else { n as i32 };
    if n < 0 {
        (length + n).max(0)
    } else {
        n.min(length)
    }
}

fn to_string(ctx: &mut Context, this: Value) -> Value {
    let length = length_of(ctx, this);
    if !this.is_object() {
        return ctx.make_string("");
    }
    let ptr = this.as_pointer();
    let mut parts = Vec::with_capacity(length.max(0) as usize);
    for i in 0..length.max(0) {
        let element = ctx.get(ptr, &PropertyKey::index(i as u32));
        if element.is_nullish() {
            parts.push(String::new());
        } else {
            parts.push(ctx.to_string(element));
        }
    }
    ctx.make_string(&parts.join(","))
}
