//! `Number` constructor and `Number.prototype` routines.

use glint_vm_bytecode::Value;

use super::arg;
use crate::context::Context;
use crate::registry::BuiltinId;

const VALUE_OF: u32 = 0;
const TO_STRING: u32 = 1;

pub fn construct(ctx: &mut Context, this: Value, args: &[Value]) -> Value {
    let n = if args.is_empty() { 0.0 } else { ctx.to_number(arg(args, 0)) };
    let value = ctx.make_number(n);
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
            let n = unbox(ctx, this);
            if n.is_abrupt() {
                return n;
            }
            let s = ctx.to_string(n);
            ctx.make_string(&s)
        }
        _ => Value::undefined(),
    }
}

fn unbox(ctx: &mut Context, this: Value) -> Value {
    if this.is_integer() || this.is_float() {
        return this;
    }
    if this.is_object() {
        if let Some(primitive) = ctx.object(this.as_pointer()).primitive_value() {
            return primitive;
        }
    }
    ctx.throw_error(BuiltinId::TypeError, "Number.prototype method called on incompatible receiver")
}
