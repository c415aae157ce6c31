//! The function protocol: `[[Call]]`, `[[Construct]]`, `[[HasInstance]]`
//! dispatched over the four function object kinds.

use glint_vm_bytecode::Value;
use glint_vm_gc::CompactPtr;

use crate::context::Context;
use crate::magic::MagicString;
use crate::object::{FunctionExtra, ObjectKind, ObjectRecord};
use crate::property::PropertyKey;
use crate::registry::BuiltinId;

/// Whether `v` is a function-kind object.
pub fn is_callable(ctx: &Context, v: Value) -> bool {
    v.is_object() && ctx.object(v.as_pointer()).kind().is_callable()
}

/// Whether `v` supports `[[Construct]]`.
///
/// Plain, external, and bound functions always qualify. A built-in
/// function object qualifies only when it *is* one of the resident
/// constructors (`Object`, `Array`, …) rather than one of their
/// ordinary routines (`Object.prototype.toString` is a `BuiltinFunction`
/// too, but is not constructible).
pub fn is_constructor(ctx: &Context, v: Value) -> bool {
    if !v.is_object() {
        return false;
    }
    let ptr = v.as_pointer();
    if ctx.object(ptr).kind().is_constructor_kind() {
        return true;
    }
    matches!(
        ctx.object(ptr).function_extra(),
        Some(FunctionExtra::Builtin { routine_id, .. }) if *routine_id == crate::intrinsics::CONSTRUCTOR_ROUTINE
    )
}

/// `[[Call]](f, this, args)`.
pub fn call(ctx: &mut Context, f: Value, this: Value, args: &[Value]) -> Value {
    if !is_callable(ctx, f) {
        return ctx.throw_error(BuiltinId::TypeError, "value is not callable");
    }
    let ptr = f.as_pointer();
    let kind = ctx.object(ptr).kind();
    match kind {
        ObjectKind::Function => call_plain(ctx, ptr, this, args),
        ObjectKind::BuiltinFunction => call_builtin(ctx, ptr, this, args),
        ObjectKind::ExternalFunction => call_external(ctx, ptr, this, args),
        ObjectKind::BoundFunction => call_bound(ctx, ptr, args),
        _ => unreachable!("is_callable guarantees a function kind"),
    }
}

fn call_plain(ctx: &mut Context, ptr: CompactPtr, this: Value, args: &[Value]) -> Value {
    let (code, scope) = match ctx.object(ptr).function_extra() {
        Some(FunctionExtra::Plain { code, scope }) => (code.clone(), *scope),
        _ => unreachable!("Function-kind object always carries Plain extra data"),
    };
    let strict = code.is_strict();
    let this_binding = if strict {
        this
    } else if this.is_nullish() {
        Value::object(ctx.global_object)
    } else {
        ctx.to_object(this)
    };

    let lex_env_not_needed = code.header.flags.lex_env_not_needed;
    let frame_env = if lex_env_not_needed {
        scope
    } else {
        ctx.alloc_object(ObjectRecord::declarative_environment(Some(scope)))
    };

    if !lex_env_not_needed {
        for (i, name) in code.header.param_names.iter().enumerate() {
            let value = args.get(i).copied().unwrap_or_else(Value::undefined);
            let key = PropertyKey::string(&String::from_utf16_lossy(name));
            ctx.object(frame_env).put_own(key, value);
        }
        for name in code.header.var_names.iter() {
            let key = PropertyKey::string(&String::from_utf16_lossy(name));
            if !ctx.object(frame_env).properties().contains(&key) {
                ctx.object(frame_env).put_own(key, Value::undefined());
            }
        }
    }

    if code.header.flags.arguments_needed {
        let arguments = build_arguments_object(ctx, args, Value::object(ptr));
        ctx.object(frame_env)
            .put_own(PropertyKey::Magic(MagicString::Arguments), arguments);
    }

    crate::interpreter::vm_run(ctx, &code, this_binding, frame_env, false, args)
}

fn build_arguments_object(ctx: &mut Context, args: &[Value], callee: Value) -> Value {
    let record = ObjectRecord::new(ObjectKind::Arguments, None, true);
    for (i, value) in args.iter().enumerate() {
        record.put_own(PropertyKey::index(i as u32), *value);
    }
    record.put_own(PropertyKey::Magic(MagicString::Length), Value::integer(args.len() as i32));
    record.set_primitive_value(callee);
    Value::object(ctx.alloc_object(record))
}

fn call_builtin(ctx: &mut Context, ptr: CompactPtr, this: Value, args: &[Value]) -> Value {
    let (builtin_id, routine_id) = match ctx.object(ptr).function_extra() {
        Some(FunctionExtra::Builtin { builtin_id, routine_id }) => (*builtin_id, *routine_id),
        _ => unreachable!("BuiltinFunction-kind object always carries Builtin extra data"),
    };
    crate::intrinsics::dispatch(ctx, builtin_id, routine_id, this, args)
}

fn call_external(ctx: &mut Context, ptr: CompactPtr, this: Value, args: &[Value]) -> Value {
    let entry = match ctx.object(ptr).function_extra() {
        Some(FunctionExtra::External { entry }) => *entry,
        _ => unreachable!("ExternalFunction-kind object always carries External extra data"),
    };
    entry(ctx, this, args)
}

fn call_bound(ctx: &mut Context, ptr: CompactPtr, args: &[Value]) -> Value {
    let (target, bound_this, bound_args) = match ctx.object(ptr).function_extra() {
        Some(FunctionExtra::Bound { target, bound_this, bound_args }) => {
            (*target, *bound_this, bound_args.clone())
        }
        _ => unreachable!("BoundFunction-kind object always carries Bound extra data"),
    };
    let merged = merge_args(&bound_args, args);
    call(ctx, target, bound_this, &merged)
}

fn merge_args(bound: &[Value], rest: &[Value]) -> Vec<Value> {
    let mut merged = Vec::with_capacity(bound.len() + rest.len());
    merged.extend_from_slice(bound);
    merged.extend_from_slice(rest);
    merged
}

/// `[[Construct]](f, args)`.
pub fn construct(ctx: &mut Context, f: Value, args: &[Value]) -> Value {
    if !is_constructor(ctx, f) {
        return ctx.throw_error(BuiltinId::TypeError, "value is not a constructor");
    }
    let ptr = f.as_pointer();
    match ctx.object(ptr).kind() {
        ObjectKind::BoundFunction => {
            let (target, bound_args) = match ctx.object(ptr).function_extra() {
                Some(FunctionExtra::Bound { target, bound_args, .. }) => (*target, bound_args.clone()),
                _ => unreachable!(),
            };
            let merged = merge_args(&bound_args, args);
            construct(ctx, target, &merged)
        }
        _ => {
            let proto_value = ctx.get(ptr, &PropertyKey::Magic(MagicString::Prototype));
            let proto = if proto_value.is_object() {
                Some(proto_value.as_pointer())
            } else {
                ctx.builtin(BuiltinId::Object).prototype
            };
            let new_object = ctx.alloc_object(ObjectRecord::new(ObjectKind::General, proto, true));
            let result = call(ctx, f, Value::object(new_object), args);
            if result.is_object() && !result.is_abrupt() {
                result
            } else if result.is_abrupt() {
                result
            } else {
                Value::object(new_object)
            }
        }
    }
}

/// `[[HasInstance]](f, v)`.
pub fn has_instance(ctx: &mut Context, f: Value, v: Value) -> Value {
    let ptr = f.as_pointer();
    match ctx.object(ptr).kind() {
        ObjectKind::BoundFunction => {
            let target = match ctx.object(ptr).function_extra() {
                Some(FunctionExtra::Bound { target, .. }) => *target,
                _ => unreachable!(),
            };
            has_instance(ctx, target, v)
        }
        ObjectKind::Function => {
            if !v.is_object() {
                return Value::boolean(false);
            }
            let proto_value = ctx.get(ptr, &PropertyKey::Magic(MagicString::Prototype));
            if !proto_value.is_object() {
                return ctx.throw_error(BuiltinId::TypeError, "prototype is not an object");
            }
            let target_proto = proto_value.as_pointer();
            let mut current = ctx.object(v.as_pointer()).prototype();
            while let Some(candidate) = current {
                if candidate == target_proto {
                    return Value::boolean(true);
                }
                current = ctx.object(candidate).prototype();
            }
            Value::boolean(false)
        }
        _ => ctx.throw_error(BuiltinId::TypeError, "function has no [[HasInstance]] behavior"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glint_vm_gc::GcConfig;

    fn noop_native(_ctx: &mut Context, this: Value, _args: &[Value]) -> Value {
        this
    }

    #[test]
    fn external_functions_are_callable_and_not_builtins() {
        let mut ctx = Context::new(GcConfig::default());
        let ptr = ctx.alloc_object(ObjectRecord::external_function(None, noop_native));
        let f = Value::object(ptr);
        assert!(is_callable(&ctx, f));
        assert!(!ctx.object(ptr).is_builtin());
    }

    #[test]
    fn calling_an_external_function_runs_its_native_entry() {
        let mut ctx = Context::new(GcConfig::default());
        let ptr = ctx.alloc_object(ObjectRecord::external_function(None, noop_native));
        let result = call(&mut ctx, Value::object(ptr), Value::integer(9), &[]);
        assert_eq!(result, Value::integer(9));
    }

    #[test]
    fn bound_functions_prepend_their_bound_arguments() {
        let mut ctx = Context::new(GcConfig::default());
        fn sum(ctx: &mut Context, _this: Value, args: &[Value]) -> Value {
            let total: i32 = args.iter().map(|v| v.as_integer()).sum();
            ctx.make_number(total as f64)
        }
        let target = ctx.alloc_object(ObjectRecord::external_function(None, sum));
        let bound = ctx.alloc_object(ObjectRecord::bound_function(
            None,
            Value::object(target),
            Value::undefined(),
            vec![Value::integer(10)],
        ));
        let result = call(&mut ctx, Value::object(bound), Value::undefined(), &[Value::integer(5)]);
        assert_eq!(ctx.to_number(result), 15.0);
    }

    #[test]
    fn non_callable_values_throw_type_error() {
        let mut ctx = Context::new(GcConfig::default());
        let result = call(&mut ctx, Value::integer(1), Value::undefined(), &[]);
        assert!(result.is_abrupt());
    }
}
