//! `Boolean` constructor and `Boolean.prototype` routines.

use glint_vm_bytecode::Value;

use super::arg;
use crate::context::Context;
use crate::interpreter::is_truthy;
use crate::registry::BuiltinId;

const VALUE_OF: u32 = 0;
const TO_STRING: u32 = 1;

pub fn construct(ctx: &mut Context, this: Value, args: &[Value]) -> Value {
    let b = is_truthy(ctx, arg(args, 0));
    let value = Value::boolean(b);
    if this.is_object() {
        ctx.object(this.as_pointer()).set_primitive_value(value);
        this
    } else {
        value
    }
}

pub fn dispatch(ctx: &mut Context, routine_id: u32, this: Value, _args: &[Value]) -> Value {
    match routine_id {
        VALUE_OF => unbox(ctx, this),
        TO_STRING => {
            let b = unbox(ctx, this);
            if b.is_abrupt() {
                return b;
            }
            ctx.make_string(if b.as_boolean() { "true" } else { "false" })
        }
        _ => Value::undefined(),
    }
}

fn unbox(ctx: &mut Context, this: Value) -> Value {
    if this.is_boolean() {
        return this;
    }
    if this.is_object() {
        if let Some(primitive) = ctx.object(this.as_pointer()).primitive_value() {
            return primitive;
        }
    }
    ctx.throw_error(BuiltinId::TypeError, "Boolean.prototype method called on incompatible receiver")
}
