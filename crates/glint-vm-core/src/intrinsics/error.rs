//! `Error` and its five sibling constructors, plus `Error.prototype.toString`.
//!
//! Called with or without `new`, `Error(message)` always produces a
//! fresh error object — ES5 does not distinguish the two forms here.

use glint_vm_bytecode::Value;

use super::arg;
use crate::context::Context;
use crate::object::{ObjectKind, ObjectRecord};
use crate::property::PropertyKey;
use crate::registry::BuiltinId;

const TO_STRING: u32 = 0;

pub fn construct(ctx: &mut Context, builtin_id: BuiltinId, args: &[Value]) -> Value {
    let proto = ctx.builtin(builtin_id).prototype;
    let obj = ctx.alloc_object(ObjectRecord::new(ObjectKind::General, proto, true));
    let message = arg(args, 0);
    if !message.is_undefined() {
        let s = ctx.to_string(message);
        let value = ctx.make_string(&s);
        ctx.object(obj).put_own(PropertyKey::string("message"), value);
    }
    Value::object(obj)
}

pub fn dispatch(ctx: &mut Context, routine_id: u32, this: Value, _args: &[Value]) -> Value {
    match routine_id {
        TO_STRING => to_string(ctx, this),
        _ => Value::undefined(),
    }
}

fn to_string(ctx: &mut Context, this: Value) -> Value {
    if !this.is_object() {
        return ctx.throw_error(BuiltinId::TypeError, "Error.prototype.toString called on non-object");
    }
    let ptr = this.as_pointer();
    let name_value = ctx.get(ptr, &PropertyKey::string("name"));
    let name = if name_value.is_undefined() { "Error".to_string() } else { ctx.to_string(name_value) };
    let message_value = ctx.get(ptr, &PropertyKey::string("message"));
    if message_value.is_undefined() {
        return ctx.make_string(&name);
    }
    let message = ctx.to_string(message_value);
    if message.is_empty() {
        return ctx.make_string(&name);
    }
    ctx.make_string(&format!("{name}: {message}"))
}
