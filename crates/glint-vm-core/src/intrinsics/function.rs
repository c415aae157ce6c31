//! `Function.prototype` routines: `call`, `apply`, `bind`, `toString`.
//!
//! There is no `Function(...)` constructor here — compiling a function
//! body from a string at runtime is out of scope, so `new Function(...)`
//! throws rather than silently doing nothing.

use glint_vm_bytecode::Value;

use super::arg;
use crate::context::Context;
use crate::magic::MagicString;
use crate::object::ObjectRecord;
use crate::property::PropertyKey;
use crate::registry::BuiltinId;

const CALL: u32 = 0;
const APPLY: u32 = 1;
const BIND: u32 = 2;
const TO_STRING: u32 = 3;

pub fn dispatch(ctx: &mut Context, routine_id: u32, this: Value, args: &[Value]) -> Value {
    match routine_id {
        CALL => call(ctx, this, args),
        APPLY => apply(ctx, this, args),
        BIND => bind(ctx, this, args),
        TO_STRING => to_string(ctx, this),
        _ => Value::undefined(),
    }
}

fn call(ctx: &mut Context, this: Value, args: &[Value]) -> Value {
    let this_arg = arg(args, 0);
    let rest = if args.is_empty() { &[][..] } else { &args[1..] };
    crate::function::call(ctx, this, this_arg, rest)
}

fn apply(ctx: &mut Context, this: Value, args: &[Value]) -> Value {
    let this_arg = arg(args, 0);
    let array_like = arg(args, 1);
    let spread = if array_like.is_nullish() {
        Vec::new()
    } else if array_like.is_object() {
        spread_array_like(ctx, array_like)
    } else {
        return ctx.throw_error(BuiltinId::TypeError, "CreateListFromArrayLike called on non-object");
    };
    crate::function::call(ctx, this, this_arg, &spread)
}

fn spread_array_like(ctx: &mut Context, array_like: Value) -> Vec<Value> {
    let ptr = array_like.as_pointer();
    let len_value = ctx.get(ptr, &PropertyKey::Magic(MagicString::Length));
    let len = ctx.to_number(len_value) as i64;
    let len = len.max(0) as u32;
    (0..len).map(|i| ctx.get(ptr, &PropertyKey::index(i))).collect()
}

fn bind(ctx: &mut Context, this: Value, args: &[Value]) -> Value {
    if !crate::function::is_callable(ctx, this) {
        return ctx.throw_error(BuiltinId::TypeError, "Function.prototype.bind called on non-callable");
    }
    let bound_this = arg(args, 0);
    let bound_args = if args.is_empty() { Vec::new() } else { args[1..].to_vec() };
    let proto = ctx.builtin(BuiltinId::Function).prototype;
    let record = ObjectRecord::bound_function(proto, this, bound_this, bound_args);
    Value::object(ctx.alloc_object(record))
}

fn to_string(ctx: &mut Context, this: Value) -> Value {
    let name = if this.is_object() {
        match ctx.get(this.as_pointer(), &PropertyKey::Magic(MagicString::Name)) {
            v if v.is_string() => ctx.string_value(v),
            _ => String::new(),
        }
    } else {
        String::new()
    };
    ctx.make_string(&format!("function {name}() {{ [native code] }}"))
}
