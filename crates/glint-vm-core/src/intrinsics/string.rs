//! `String` constructor and `String.prototype` routines.
//!
//! Called as a function, `String(x)` converts and returns a bare
//! primitive. Called via `new`, the interpreter hands it a freshly
//! allocated object as `this`; the constructor boxes the primitive into
//! that object's primitive-value slot instead.

use glint_vm_bytecode::Value;

use super::arg;
use crate::context::Context;
use crate::registry::BuiltinId;

const VALUE_OF: u32 = 0;
const TO_STRING: u32 = 1;

pub fn construct(ctx: &mut Context, this: Value, args: &[Value]) -> Value {
    let value = arg_or_empty(ctx, args);
    wrap_or_return(ctx, this, value)
}

/// Box `value` into `this`'s primitive-value slot when `this` is a
/// fresh object (a `new`-bound call); otherwise `value` itself is the
/// result of a bare function call.
fn wrap_or_return(ctx: &mut Context, this: Value, value: Value) -> Value {
    if this.is_object() {
        ctx.object(this.as_pointer()).set_primitive_value(value);
        this
    } else {
        value
    }
}

pub fn dispatch(ctx: &mut Context, routine_id: u32, this: Value, _args: &[Value]) -> Value {
    match routine_id {
        VALUE_OF | TO_STRING => unbox(ctx, this),
        _ => Value::undefined(),
    }
}

fn unbox(ctx: &mut Context, this: Value) -> Value {
    if this.is_string() {
        return this;
    }
    if this.is_object() {
        if let Some(primitive) = ctx.object(this.as_pointer()).primitive_value() {
            return primitive;
        }
    }
    ctx.throw_error(BuiltinId::TypeError, "String.prototype method called on incompatible receiver")
}

fn arg_or_empty(ctx: &mut Context, args: &[Value]) -> Value {
    if args.is_empty() {
        ctx.make_string("")
    } else {
        let s = ctx.to_string(arg(args, 0));
        ctx.make_string(&s)
    }
}
