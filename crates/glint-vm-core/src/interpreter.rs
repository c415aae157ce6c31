//! The stack-based byte-code interpreter.
//!
//! `vm_run` executes one [`CompiledCode`] frame to completion: a normal
//! return, or an abrupt completion that the caller (another frame, or
//! the host) must handle. There is no recursion into this function for
//! nested calls — `Call`/`New`-family opcodes invoke
//! [`crate::function::call`]/[`crate::function::construct`], which may
//! themselves call back into `vm_run` for a plain callee, so the Rust
//! call stack mirrors the script call stack one-to-one.

use glint_vm_bytecode::{CompiledCode, ExtendedOpcode, Literal, Opcode, Value};
use glint_vm_gc::CompactPtr;

use crate::context::Context;
use crate::function;
use crate::magic::MagicString;
use crate::object::{ObjectKind, ObjectRecord};
use crate::property::{PropertyAttributes, PropertyDescriptor, PropertyKey};
use crate::registry::BuiltinId;

const ABSENT_TARGET: u16 = 0xFFFF;

struct Handler {
    catch_pc: Option<usize>,
    finally_pc: Option<usize>,
    stack_depth: usize,
    env: CompactPtr,
}

struct FinallyCheckpoint {
    at_pc: usize,
    pending: Option<Value>,
}

struct Frame {
    stack: Vec<Value>,
    pc: usize,
    env: CompactPtr,
    this_binding: Value,
    handlers: Vec<Handler>,
    checkpoints: Vec<FinallyCheckpoint>,
    args: Vec<Value>,
    enumerators: Vec<Enumerator>,
}

struct Enumerator {
    keys: Vec<PropertyKey>,
    index: usize,
}

/// Execute `code` as one interpreter frame.
///
/// `lex_env` is the environment the frame runs against (already set up
/// by the caller: a fresh declarative environment for a normal call, or
/// the caller's own environment for a direct `eval`). `args` backs
/// `PushIdent`/assignment resolution against any `arguments` binding the
/// caller already installed.
pub fn vm_run(
    ctx: &mut Context,
    code: &CompiledCode,
    this_binding: Value,
    lex_env: CompactPtr,
    _is_eval: bool,
    args: &[Value],
) -> Value {
    let mut frame = Frame {
        stack: Vec::with_capacity(code.header.register_count as usize),
        pc: 0,
        env: lex_env,
        this_binding,
        handlers: Vec::new(),
        checkpoints: Vec::new(),
        args: args.to_vec(),
        enumerators: Vec::new(),
    };
    let bytes = &*code.bytecode;
    let wide_literals = code.header.flags.wide_literals;

    loop {
        if let Some(top) = frame.checkpoints.last() {
            if frame.pc == top.at_pc {
                let checkpoint = frame.checkpoints.pop().unwrap();
                if let Some(pending) = checkpoint.pending {
                    match unwind(&mut frame, pending) {
                        Unwind::Continue => continue,
                        Unwind::Propagate(v) => return v,
                    }
                }
            }
        }

        let Some(&op_byte) = bytes.get(frame.pc) else {
            return frame.stack.pop().unwrap_or_else(Value::undefined);
        };
        frame.pc += 1;

        let Some(opcode) = decode_opcode(op_byte) else {
            return ctx.throw_error(BuiltinId::SyntaxError, "invalid opcode in compiled code");
        };

        if opcode == Opcode::ExtendedPrefix {
            let Some(&ext_byte) = bytes.get(frame.pc) else {
                return ctx.throw_error(BuiltinId::SyntaxError, "truncated extended opcode");
            };
            frame.pc += 1;
            let Some(ext) = decode_extended(ext_byte) else {
                return ctx.throw_error(BuiltinId::SyntaxError, "invalid extended opcode");
            };
            match run_extended(ctx, &mut frame, code, bytes, wide_literals, ext) {
                Step::Continue => continue,
                Step::Return(v) => return v,
            }
        }

        match run_opcode(ctx, &mut frame, code, bytes, wide_literals, opcode) {
            Step::Continue => {}
            Step::Return(v) => return v,
        }
    }
}

enum Step {
    Continue,
    Return(Value),
}

enum Unwind {
    Continue,
    Propagate(Value),
}

/// Raise `value` as a thrown completion from inside opcode execution,
/// routing it through the frame's handler stack like an explicit
/// `Throw` would.
fn throw_through(frame: &mut Frame, value: Value) -> Step {
    match unwind(frame, value.into_abrupt()) {
        Unwind::Continue => Step::Continue,
        Unwind::Propagate(completion) => Step::Return(completion),
    }
}

fn unwind(frame: &mut Frame, completion: Value) -> Unwind {
    while let Some(handler) = frame.handlers.pop() {
        if let Some(catch_pc) = handler.catch_pc {
            frame.stack.truncate(handler.stack_depth);
            frame.env = handler.env;
            frame.stack.push(completion.into_completion_value());
            frame.pc = catch_pc;
            return Unwind::Continue;
        }
        if let Some(finally_pc) = handler.finally_pc {
            frame.stack.truncate(handler.stack_depth);
            frame.env = handler.env;
            frame.pc = finally_pc;
            // The `Finally` opcode at `finally_pc` picks this back up by
            // reading it off a one-shot slot rather than the checkpoint
            // stack, since the checkpoint covering *this* finally block
            // has not been pushed yet.
            frame.checkpoints.push(FinallyCheckpoint {
                at_pc: usize::MAX,
                pending: None,
            });
            let slot = frame.checkpoints.last_mut().unwrap();
            slot.pending = Some(completion);
            return Unwind::Continue;
        }
    }
    Unwind::Propagate(completion)
}

fn decode_opcode(byte: u8) -> Option<Opcode> {
    use Opcode::*;
    Some(match byte {
        0x00 => PushLiteral,
        0x01 => PushTwoLiterals,
        0x02 => PushThis,
        0x03 => PushTrue,
        0x04 => PushFalse,
        0x05 => PushNull,
        0x06 => PushUndefined,
        0x07 => PushNumber0,
        0x08 => PushNumber1,
        0x09 => PushNumber2B,
        0x0A => PushIdent,
        0x0B => PushElision,
        0x10 => PropGet,
        0x11 => PropLiteralGet,
        0x12 => PropLiteralLiteralGet,
        0x13 => SetProperty,
        0x14 => CreateObject,
        0x15 => CreateArray,
        0x16 => ArrayAppend,
        0x20 => Assign,
        0x21 => AssignIdent,
        0x22 => AssignPropLiteral,
        0x23 => AssignPropLiteralGetAdd,
        0x30 => Add,
        0x31 => AddWithLiteral,
        0x32 => AddWithTwoLiterals,
        0x33 => Sub,
        0x34 => SubWithLiteral,
        0x35 => Mul,
        0x36 => Div,
        0x37 => Mod,
        0x38 => Neg,
        0x39 => NegIdent,
        0x40 => BitAnd,
        0x41 => BitOr,
        0x42 => BitXor,
        0x43 => BitNot,
        0x44 => Shl,
        0x45 => Shr,
        0x46 => Ushr,
        0x50 => Eq,
        0x51 => StrictEq,
        0x52 => Ne,
        0x53 => StrictNe,
        0x54 => Lt,
        0x55 => Le,
        0x56 => Gt,
        0x57 => Ge,
        0x60 => Not,
        0x61 => TypeOf,
        0x62 => TypeOfIdent,
        0x63 => InstanceOf,
        0x64 => In,
        0x65 => ToNumber,
        0x66 => RequireCoercible,
        0x67 => Pop,
        0x68 => PushArg,
        0x70 => BranchIfTrue,
        0x71 => BranchIfFalse,
        0x72 => BranchIfLogicalFalse,
        0x73 => BranchIfLogicalTrue,
        0x74 => JumpForward,
        0x75 => JumpBackward,
        0x76 => Try,
        0x77 => Catch,
        0x78 => Finally,
        0x79 => Throw,
        0x7A => Return,
        0x80 => Call,
        0x81 => CallProp,
        0x82 => Call0,
        0x83 => Call0Prop,
        0x84 => CallEval,
        0x85 => New,
        0xFF => ExtendedPrefix,
        _ => return None,
    })
}

fn decode_extended(byte: u8) -> Option<ExtendedOpcode> {
    use ExtendedOpcode::*;
    Some(match byte {
        0x00 => ObjectLiteralSetGetter,
        0x01 => ObjectLiteralSetSetter,
        0x02 => WithEnter,
        0x03 => WithExit,
        0x04 => PushArguments,
        0x05 => DeletePropLiteral,
        0x06 => ForInStart,
        0x07 => ForInNext,
        0x08 => ForInEnd,
        _ => return None,
    })
}

fn read_u8(bytes: &[u8], pc: &mut usize) -> u32 {
    let v = bytes[*pc] as u32;
    *pc += 1;
    v
}

fn read_u16(bytes: &[u8], pc: &mut usize) -> u32 {
    let v = u16::from_le_bytes([bytes[*pc], bytes[*pc + 1]]) as u32;
    *pc += 2;
    v
}

fn read_literal_index(bytes: &[u8], pc: &mut usize, wide: bool) -> u32 {
    if wide {
        read_u16(bytes, pc)
    } else {
        read_u8(bytes, pc)
    }
}

fn read_i16(bytes: &[u8], pc: &mut usize) -> i32 {
    let v = i16::from_le_bytes([bytes[*pc], bytes[*pc + 1]]);
    *pc += 2;
    v as i32
}

fn literal_value(ctx: &mut Context, code: &CompiledCode, env: CompactPtr, index: u32) -> Value {
    match code.literals.get(index) {
        Some(Literal::Number(n)) => ctx.make_number(*n),
        Some(Literal::String(units)) => ctx.make_string(&String::from_utf16_lossy(units)),
        Some(Literal::Function(nested)) => {
            let handles = ctx.builtin(BuiltinId::Function);
            let record = ObjectRecord::function(handles.prototype, nested.clone(), env);
            Value::object(ctx.alloc_object(record))
        }
        None => Value::undefined(),
    }
}

fn literal_key(code: &CompiledCode, index: u32) -> PropertyKey {
    match code.literals.get(index) {
        Some(Literal::String(units)) => PropertyKey::string(&String::from_utf16_lossy(units)),
        _ => PropertyKey::string(""),
    }
}

fn resolve_binding_env(ctx: &mut Context, env: CompactPtr, key: &PropertyKey) -> Option<CompactPtr> {
    let mut current = Some(env);
    while let Some(ptr) = current {
        let is_object_env = ctx.object(ptr).kind() == ObjectKind::LexEnvObject;
        let has = if is_object_env {
            let bound = ctx.object(ptr).bound_object().expect("object environment always wraps an object");
            ctx.has_property(bound, key)
        } else {
            ctx.object(ptr).properties().contains(key)
        };
        if has {
            return Some(ptr);
        }
        current = ctx.object(ptr).outer_environment();
    }
    None
}

fn get_binding(ctx: &mut Context, env: CompactPtr, key: &PropertyKey) -> Option<Value> {
    let owner = resolve_binding_env(ctx, env, key)?;
    if ctx.object(owner).kind() == ObjectKind::LexEnvObject {
        let bound = ctx.object(owner).bound_object().unwrap();
        Some(ctx.get(bound, key))
    } else {
        ctx.object(owner).get_own_data(key)
    }
}

fn set_binding(ctx: &mut Context, env: CompactPtr, key: PropertyKey, value: Value) {
    match resolve_binding_env(ctx, env, &key) {
        Some(owner) if ctx.object(owner).kind() == ObjectKind::LexEnvObject => {
            let bound = ctx.object(owner).bound_object().unwrap();
            ctx.put(bound, key, value, false);
        }
        Some(owner) => ctx.object(owner).put_own(key, value),
        None => ctx.object(ctx.global_object).put_own(key, value),
    }
}

fn to_number_op(ctx: &mut Context, v: Value) -> f64 {
    ctx.to_number(v)
}

fn numeric_binop(ctx: &mut Context, lhs: Value, rhs: Value, op: impl Fn(f64, f64) -> f64) -> Value {
    let a = to_number_op(ctx, lhs);
    let b = to_number_op(ctx, rhs);
    ctx.make_number(op(a, b))
}

fn add(ctx: &mut Context, lhs: Value, rhs: Value) -> Value {
    if lhs.is_string() || rhs.is_string() {
        let a = ctx.to_string(lhs);
        let b = ctx.to_string(rhs);
        return ctx.make_string(&format!("{a}{b}"));
    }
    numeric_binop(ctx, lhs, rhs, |a, b| a + b)
}

fn compare(ctx: &mut Context, lhs: Value, rhs: Value, op: impl Fn(f64, f64) -> bool) -> Value {
    let a = to_number_op(ctx, lhs);
    let b = to_number_op(ctx, rhs);
    Value::boolean(op(a, b))
}

pub(crate) fn is_truthy(ctx: &mut Context, v: Value) -> bool {
    if v.is_boolean() {
        return v.as_boolean();
    }
    if v.is_integer() {
        return v.as_integer() != 0;
    }
    if v.is_undefined() || v.is_null() {
        return false;
    }
    if v.is_string() {
        return !ctx.string_value(v).is_empty();
    }
    if v.is_float() {
        let n = ctx.number_value(v);
        return n != 0.0 && !n.is_nan();
    }
    true
}

fn type_of(ctx: &Context, v: Value) -> &'static str {
    if v.is_undefined() {
        "undefined"
    } else if v.is_null() {
        "object"
    } else if v.is_boolean() {
        "boolean"
    } else if v.is_integer() || v.is_float() {
        "number"
    } else if v.is_string() {
        "string"
    } else if v.is_object() && ctx.object(v.as_pointer()).kind().is_callable() {
        "function"
    } else {
        "object"
    }
}

fn pop2(frame: &mut Frame) -> (Value, Value) {
    let rhs = frame.stack.pop().unwrap_or_else(Value::undefined);
    let lhs = frame.stack.pop().unwrap_or_else(Value::undefined);
    (lhs, rhs)
}

fn run_opcode(
    ctx: &mut Context,
    frame: &mut Frame,
    code: &CompiledCode,
    bytes: &[u8],
    wide_literals: bool,
    opcode: Opcode,
) -> Step {
    use Opcode::*;
    match opcode {
        PushLiteral => {
            let idx = read_literal_index(bytes, &mut frame.pc, wide_literals);
            let v = literal_value(ctx, code, frame.env, idx);
            frame.stack.push(v);
        }
        PushTwoLiterals => {
            let idx0 = read_literal_index(bytes, &mut frame.pc, wide_literals);
            let idx1 = read_literal_index(bytes, &mut frame.pc, wide_literals);
            frame.stack.push(literal_value(ctx, code, frame.env, idx0));
            frame.stack.push(literal_value(ctx, code, frame.env, idx1));
        }
        PushThis => frame.stack.push(frame.this_binding),
        PushTrue => frame.stack.push(Value::boolean(true)),
        PushFalse => frame.stack.push(Value::boolean(false)),
        PushNull => frame.stack.push(Value::null()),
        PushUndefined => frame.stack.push(Value::undefined()),
        PushNumber0 => frame.stack.push(Value::integer(0)),
        PushNumber1 => frame.stack.push(Value::integer(1)),
        PushNumber2B => {
            let n = read_i16(bytes, &mut frame.pc);
            frame.stack.push(Value::integer(n));
        }
        PushIdent => {
            let idx = read_literal_index(bytes, &mut frame.pc, wide_literals);
            let key = literal_key(code, idx);
            match get_binding(ctx, frame.env, &key) {
                Some(v) => frame.stack.push(v),
                None => {
                    let err = ctx.throw_error(BuiltinId::ReferenceError, &format!("{} is not defined", key.to_display_string()));
                    return throw_through(frame, err);
                }
            }
        }
        PushElision => frame.stack.push(Value::array_hole()),

        PropGet => {
            let (obj, key) = pop2(frame);
            let key = value_to_key(ctx, key);
            let result = property_get(ctx, obj, &key);
            frame.stack.push(result);
        }
        PropLiteralGet => {
            let idx = read_literal_index(bytes, &mut frame.pc, wide_literals);
            let obj = frame.stack.pop().unwrap_or_else(Value::undefined);
            let key = literal_key(code, idx);
            frame.stack.push(property_get(ctx, obj, &key));
        }
        PropLiteralLiteralGet => {
            let idx0 = read_literal_index(bytes, &mut frame.pc, wide_literals);
            let idx1 = read_literal_index(bytes, &mut frame.pc, wide_literals);
            let base_key = literal_key(code, idx0);
            let obj = get_binding(ctx, frame.env, &base_key).unwrap_or_else(Value::undefined);
            let key = literal_key(code, idx1);
            frame.stack.push(property_get(ctx, obj, &key));
        }
        SetProperty => {
            let value = frame.stack.pop().unwrap_or_else(Value::undefined);
            let key = frame.stack.pop().unwrap_or_else(Value::undefined);
            let obj = frame.stack.pop().unwrap_or_else(Value::undefined);
            if obj.is_object() {
                let k = value_to_key(ctx, key);
                ctx.put(obj.as_pointer(), k, value, code.is_strict());
            }
        }
        CreateObject => {
            let proto = ctx.builtin(BuiltinId::Object).prototype;
            let ptr = ctx.alloc_object(ObjectRecord::new(ObjectKind::General, proto, true));
            frame.stack.push(Value::object(ptr));
        }
        CreateArray => {
            let proto = ctx.builtin(BuiltinId::Array).prototype;
            let record = ObjectRecord::new(ObjectKind::Array, proto, true);
            record.define_own_data(PropertyKey::Magic(MagicString::Length), Value::integer(0), PropertyAttributes::length());
            let ptr = ctx.alloc_object(record);
            frame.stack.push(Value::object(ptr));
        }
        ArrayAppend => {
            let element = frame.stack.pop().unwrap_or_else(Value::undefined);
            if let Some(&array) = frame.stack.last() {
                array_append(ctx, array, element);
            }
        }

        Assign => {
            let value = frame.stack.pop().unwrap_or_else(Value::undefined);
            let key = frame.stack.pop().unwrap_or_else(Value::undefined);
            let obj = frame.stack.pop().unwrap_or_else(Value::undefined);
            if obj.is_object() {
                let k = value_to_key(ctx, key);
                ctx.put(obj.as_pointer(), k, value, code.is_strict());
            }
            frame.stack.push(value);
        }
        AssignIdent => {
            let idx = read_literal_index(bytes, &mut frame.pc, wide_literals);
            let value = frame.stack.pop().unwrap_or_else(Value::undefined);
            let key = literal_key(code, idx);
            set_binding(ctx, frame.env, key, value);
            frame.stack.push(value);
        }
        AssignPropLiteral => {
            let idx = read_literal_index(bytes, &mut frame.pc, wide_literals);
            let value = frame.stack.pop().unwrap_or_else(Value::undefined);
            let obj = frame.stack.pop().unwrap_or_else(Value::undefined);
            if obj.is_object() {
                ctx.put(obj.as_pointer(), literal_key(code, idx), value, code.is_strict());
            }
            frame.stack.push(value);
        }
        AssignPropLiteralGetAdd => {
            let idx = read_literal_index(bytes, &mut frame.pc, wide_literals);
            let rhs = frame.stack.pop().unwrap_or_else(Value::undefined);
            let obj = frame.stack.pop().unwrap_or_else(Value::undefined);
            let key = literal_key(code, idx);
            let current = property_get(ctx, obj, &key);
            let updated = add(ctx, current, rhs);
            if obj.is_object() {
                ctx.put(obj.as_pointer(), key, updated, code.is_strict());
            }
            frame.stack.push(updated);
        }

        Add => {
            let (lhs, rhs) = pop2(frame);
            frame.stack.push(add(ctx, lhs, rhs));
        }
        AddWithLiteral => {
            let idx = read_literal_index(bytes, &mut frame.pc, wide_literals);
            let lhs = frame.stack.pop().unwrap_or_else(Value::undefined);
            let rhs = literal_value(ctx, code, frame.env, idx);
            frame.stack.push(add(ctx, lhs, rhs));
        }
        AddWithTwoLiterals => {
            let idx0 = read_literal_index(bytes, &mut frame.pc, wide_literals);
            let idx1 = read_literal_index(bytes, &mut frame.pc, wide_literals);
            let lhs = literal_value(ctx, code, frame.env, idx0);
            let rhs = literal_value(ctx, code, frame.env, idx1);
            frame.stack.push(add(ctx, lhs, rhs));
        }
        Sub => {
            let (lhs, rhs) = pop2(frame);
            frame.stack.push(numeric_binop(ctx, lhs, rhs, |a, b| a - b));
        }
        SubWithLiteral => {
            let idx = read_literal_index(bytes, &mut frame.pc, wide_literals);
            let lhs = frame.stack.pop().unwrap_or_else(Value::undefined);
            let rhs = literal_value(ctx, code, frame.env, idx);
            frame.stack.push(numeric_binop(ctx, lhs, rhs, |a, b| a - b));
        }
        Mul => {
            let (lhs, rhs) = pop2(frame);
            frame.stack.push(numeric_binop(ctx, lhs, rhs, |a, b| a * b));
        }
        Div => {
            let (lhs, rhs) = pop2(frame);
            frame.stack.push(numeric_binop(ctx, lhs, rhs, |a, b| a / b));
        }
        Mod => {
            let (lhs, rhs) = pop2(frame);
            frame.stack.push(numeric_binop(ctx, lhs, rhs, |a, b| a % b));
        }
        Neg => {
            let v = frame.stack.pop().unwrap_or_else(Value::undefined);
            let n = to_number_op(ctx, v);
            frame.stack.push(ctx.make_number(-n));
        }
        NegIdent => {
            let idx = read_literal_index(bytes, &mut frame.pc, wide_literals);
            let key = literal_key(code, idx);
            let v = get_binding(ctx, frame.env, &key).unwrap_or_else(Value::undefined);
            let n = to_number_op(ctx, v);
            frame.stack.push(ctx.make_number(-n));
        }

        BitAnd => {
            let (lhs, rhs) = pop2(frame);
            let result = (to_number_op(ctx, lhs) as i32) & (to_number_op(ctx, rhs) as i32);
            frame.stack.push(Value::integer(result));
        }
        BitOr => {
            let (lhs, rhs) = pop2(frame);
            let result = (to_number_op(ctx, lhs) as i32) | (to_number_op(ctx, rhs) as i32);
            frame.stack.push(Value::integer(result));
        }
        BitXor => {
            let (lhs, rhs) = pop2(frame);
            let result = (to_number_op(ctx, lhs) as i32) ^ (to_number_op(ctx, rhs) as i32);
            frame.stack.push(Value::integer(result));
        }
        BitNot => {
            let v = frame.stack.pop().unwrap_or_else(Value::undefined);
            let result = !(to_number_op(ctx, v) as i32);
            frame.stack.push(Value::integer(result));
        }
        Shl => {
            let (lhs, rhs) = pop2(frame);
            let result = (to_number_op(ctx, lhs) as i32).wrapping_shl(to_number_op(ctx, rhs) as u32 & 31);
            frame.stack.push(Value::integer(result));
        }
        Shr => {
            let (lhs, rhs) = pop2(frame);
            let result = (to_number_op(ctx, lhs) as i32).wrapping_shr(to_number_op(ctx, rhs) as u32 & 31);
            frame.stack.push(Value::integer(result));
        }
        Ushr => {
            let (lhs, rhs) = pop2(frame);
            let result = (to_number_op(ctx, lhs) as i64 as u32).wrapping_shr(to_number_op(ctx, rhs) as u32 & 31);
            frame.stack.push(Value::integer(result as i32));
        }

        Eq => {
            let (lhs, rhs) = pop2(frame);
            let result = ctx.abstract_equals(lhs, rhs);
            frame.stack.push(Value::boolean(result));
        }
        StrictEq => {
            let (lhs, rhs) = pop2(frame);
            let result = ctx.strict_equals(lhs, rhs);
            frame.stack.push(Value::boolean(result));
        }
        Ne => {
            let (lhs, rhs) = pop2(frame);
            let result = !ctx.abstract_equals(lhs, rhs);
            frame.stack.push(Value::boolean(result));
        }
        StrictNe => {
            let (lhs, rhs) = pop2(frame);
            let result = !ctx.strict_equals(lhs, rhs);
            frame.stack.push(Value::boolean(result));
        }
        Lt => {
            let (lhs, rhs) = pop2(frame);
            frame.stack.push(compare(ctx, lhs, rhs, |a, b| a < b));
        }
        Le => {
            let (lhs, rhs) = pop2(frame);
            frame.stack.push(compare(ctx, lhs, rhs, |a, b| a <= b));
        }
        Gt => {
            let (lhs, rhs) = pop2(frame);
            frame.stack.push(compare(ctx, lhs, rhs, |a, b| a > b));
        }
        Ge => {
            let (lhs, rhs) = pop2(frame);
            frame.stack.push(compare(ctx, lhs, rhs, |a, b| a >= b));
        }

        Not => {
            let v = frame.stack.pop().unwrap_or_else(Value::undefined);
            let truthy = is_truthy(ctx, v);
            frame.stack.push(Value::boolean(!truthy));
        }
        TypeOf => {
            let v = frame.stack.pop().unwrap_or_else(Value::undefined);
            let s = type_of(ctx, v).to_string();
            frame.stack.push(ctx.make_string(&s));
        }
        TypeOfIdent => {
            let idx = read_literal_index(bytes, &mut frame.pc, wide_literals);
            let key = literal_key(code, idx);
            let s = match get_binding(ctx, frame.env, &key) {
                Some(v) => type_of(ctx, v).to_string(),
                None => "undefined".to_string(),
            };
            frame.stack.push(ctx.make_string(&s));
        }
        InstanceOf => {
            let (lhs, rhs) = pop2(frame);
            if !rhs.is_object() || !ctx.object(rhs.as_pointer()).kind().is_callable() {
                let err = ctx.throw_error(BuiltinId::TypeError, "right-hand side of instanceof is not callable");
                return throw_through(frame, err);
            }
            let result = function::has_instance(ctx, rhs, lhs);
            if result.is_abrupt() {
                return throw_through(frame, result);
            }
            frame.stack.push(result);
        }
        In => {
            let (lhs, rhs) = pop2(frame);
            if !rhs.is_object() {
                let err = ctx.throw_error(BuiltinId::TypeError, "cannot use 'in' on a non-object");
                return throw_through(frame, err);
            }
            let key = value_to_key(ctx, lhs);
            let result = ctx.has_property(rhs.as_pointer(), &key);
            frame.stack.push(Value::boolean(result));
        }
        ToNumber => {
            let v = frame.stack.pop().unwrap_or_else(Value::undefined);
            let n = to_number_op(ctx, v);
            frame.stack.push(ctx.make_number(n));
        }
        RequireCoercible => {
            let v = frame.stack.last().copied().unwrap_or_else(Value::undefined);
            if v.is_nullish() {
                let err = ctx.throw_error(BuiltinId::TypeError, "value is not object-coercible");
                return throw_through(frame, err);
            }
        }
        Pop => {
            frame.stack.pop();
        }
        PushArg => {
            let idx = read_u8(bytes, &mut frame.pc) as usize;
            frame.stack.push(frame.args.get(idx).copied().unwrap_or_else(Value::undefined));
        }

        BranchIfTrue => {
            let delta = read_i16(bytes, &mut frame.pc);
            let v = frame.stack.pop().unwrap_or_else(Value::undefined);
            if is_truthy(ctx, v) {
                frame.pc = (frame.pc as i32 + delta) as usize;
            }
        }
        BranchIfFalse => {
            let delta = read_i16(bytes, &mut frame.pc);
            let v = frame.stack.pop().unwrap_or_else(Value::undefined);
            if !is_truthy(ctx, v) {
                frame.pc = (frame.pc as i32 + delta) as usize;
            }
        }
        BranchIfLogicalFalse => {
            let delta = read_i16(bytes, &mut frame.pc);
            let v = frame.stack.last().copied().unwrap_or_else(Value::undefined);
            if !is_truthy(ctx, v) {
                frame.pc = (frame.pc as i32 + delta) as usize;
            } else {
                frame.stack.pop();
            }
        }
        BranchIfLogicalTrue => {
            let delta = read_i16(bytes, &mut frame.pc);
            let v = frame.stack.last().copied().unwrap_or_else(Value::undefined);
            if is_truthy(ctx, v) {
                frame.pc = (frame.pc as i32 + delta) as usize;
            } else {
                frame.stack.pop();
            }
        }
        JumpForward | JumpBackward => {
            let delta = read_i16(bytes, &mut frame.pc);
            frame.pc = (frame.pc as i32 + delta) as usize;
        }

        Try => {
            let catch_raw = read_u16(bytes, &mut frame.pc) as u16;
            let finally_raw = read_u16(bytes, &mut frame.pc) as u16;
            frame.handlers.push(Handler {
                catch_pc: (catch_raw != ABSENT_TARGET).then_some(catch_raw as usize),
                finally_pc: (finally_raw != ABSENT_TARGET).then_some(finally_raw as usize),
                stack_depth: frame.stack.len(),
                env: frame.env,
            });
        }
        Catch => {
            frame.handlers.pop();
        }
        Finally => {
            let end_offset = read_u16(bytes, &mut frame.pc) as usize;
            let at_pc = frame.pc + end_offset;
            if let Some(slot) = frame.checkpoints.iter_mut().find(|c| c.at_pc == usize::MAX) {
                slot.at_pc = at_pc;
            } else {
                frame.checkpoints.push(FinallyCheckpoint { at_pc, pending: None });
            }
        }
        Throw => {
            let v = frame.stack.pop().unwrap_or_else(Value::undefined);
            match unwind(frame, v.into_abrupt()) {
                Unwind::Continue => {}
                Unwind::Propagate(completion) => return Step::Return(completion),
            }
        }
        Return => {
            let v = frame.stack.pop().unwrap_or_else(Value::undefined);
            return Step::Return(v);
        }

        Call | CallProp | Call0 | Call0Prop | CallEval | New => {
            return run_call(ctx, frame, code, opcode);
        }

        ExtendedPrefix => unreachable!("handled by the caller before dispatch"),
    }
    Step::Continue
}

fn run_call(ctx: &mut Context, frame: &mut Frame, code: &CompiledCode, opcode: Opcode) -> Step {
    use Opcode::*;
    let (callee, this_value, args): (Value, Value, Vec<Value>) = match opcode {
        Call => {
            let argc = frame.stack.pop().unwrap_or(Value::integer(0)).as_integer().max(0) as usize;
            let mut args = Vec::with_capacity(argc);
            for _ in 0..argc {
                args.push(frame.stack.pop().unwrap_or_else(Value::undefined));
            }
            args.reverse();
            let callee = frame.stack.pop().unwrap_or_else(Value::undefined);
            (callee, Value::undefined(), args)
        }
        Call0 => {
            let callee = frame.stack.pop().unwrap_or_else(Value::undefined);
            (callee, Value::undefined(), Vec::new())
        }
        CallProp | Call0Prop => {
            let argc = if opcode == CallProp {
                frame.stack.pop().unwrap_or(Value::integer(0)).as_integer().max(0) as usize
            } else {
                0
            };
            let mut args = Vec::with_capacity(argc);
            for _ in 0..argc {
                args.push(frame.stack.pop().unwrap_or_else(Value::undefined));
            }
            args.reverse();
            let key = frame.stack.pop().unwrap_or_else(Value::undefined);
            let obj = frame.stack.pop().unwrap_or_else(Value::undefined);
            let k = value_to_key(ctx, key);
            let callee = property_get(ctx, obj, &k);
            (callee, obj, args)
        }
        CallEval => {
            let argc = frame.stack.pop().unwrap_or(Value::integer(0)).as_integer().max(0) as usize;
            let mut args = Vec::with_capacity(argc);
            for _ in 0..argc {
                args.push(frame.stack.pop().unwrap_or_else(Value::undefined));
            }
            args.reverse();
            frame.stack.pop();
            let result = match args.first() {
                Some(v) if v.is_string() => {
                    let source = ctx.string_value(*v);
                    ctx.direct_eval(&source, code.is_strict(), frame.env, frame.this_binding)
                }
                Some(v) => *v,
                None => Value::undefined(),
            };
            if result.is_abrupt() {
                return throw_through(frame, result);
            }
            frame.stack.push(result);
            return Step::Continue;
        }
        New => {
            let argc = frame.stack.pop().unwrap_or(Value::integer(0)).as_integer().max(0) as usize;
            let mut args = Vec::with_capacity(argc);
            for _ in 0..argc {
                args.push(frame.stack.pop().unwrap_or_else(Value::undefined));
            }
            args.reverse();
            let callee = frame.stack.pop().unwrap_or_else(Value::undefined);
            let result = function::construct(ctx, callee, &args);
            if result.is_abrupt() {
                return throw_through(frame, result);
            }
            frame.stack.push(result);
            return Step::Continue;
        }
        _ => unreachable!(),
    };

    let result = function::call(ctx, callee, this_value, &args);
    if result.is_abrupt() {
        return throw_through(frame, result);
    }
    frame.stack.push(result);
    Step::Continue
}

fn run_extended(
    ctx: &mut Context,
    frame: &mut Frame,
    code: &CompiledCode,
    bytes: &[u8],
    wide_literals: bool,
    ext: ExtendedOpcode,
) -> Step {
    use ExtendedOpcode::*;
    match ext {
        ObjectLiteralSetGetter | ObjectLiteralSetSetter => {
            let getter_or_setter = frame.stack.pop().unwrap_or_else(Value::undefined);
            let key = frame.stack.pop().unwrap_or_else(Value::undefined);
            if let Some(&obj) = frame.stack.last() {
                if obj.is_object() {
                    let k = value_to_key(ctx, key);
                    let attrs = PropertyAttributes {
                        writable: false,
                        enumerable: true,
                        configurable: true,
                    };
                    let existing = ctx.object(obj.as_pointer()).properties().get(&k).cloned();
                    let (mut get, mut set) = match existing {
                        Some(PropertyDescriptor::Accessor { get, set, .. }) => (get, set),
                        _ => (None, None),
                    };
                    if ext == ObjectLiteralSetGetter {
                        get = Some(getter_or_setter);
                    } else {
                        set = Some(getter_or_setter);
                    }
                    ctx.object(obj.as_pointer())
                        .properties_mut()
                        .set(k, PropertyDescriptor::Accessor { get, set, attributes: attrs });
                }
            }
        }
        WithEnter => {
            let target = frame.stack.pop().unwrap_or_else(Value::undefined);
            let obj = ctx.to_object(target);
            if obj.is_abrupt() {
                return throw_through(frame, obj);
            }
            let env = ctx.alloc_object(ObjectRecord::object_environment(obj.as_pointer(), Some(frame.env)));
            frame.env = env;
        }
        WithExit => {
            if let Some(outer) = ctx.object(frame.env).outer_environment() {
                frame.env = outer;
            }
        }
        PushArguments => {
            let key = PropertyKey::Magic(MagicString::Arguments);
            let v = get_binding(ctx, frame.env, &key).unwrap_or_else(Value::undefined);
            frame.stack.push(v);
        }
        DeletePropLiteral => {
            let idx = read_literal_index(bytes, &mut frame.pc, wide_literals);
            let key = literal_key(code, idx);
            let obj = frame.stack.pop().unwrap_or_else(Value::undefined);
            let result = if obj.is_object() {
                ctx.delete(obj.as_pointer(), &key, code.is_strict())
            } else {
                Value::boolean(true)
            };
            frame.stack.push(result);
        }
        ForInStart => {
            let target = frame.stack.pop().unwrap_or_else(Value::undefined);
            let keys = if target.is_nullish() {
                Vec::new()
            } else {
                let obj = ctx.to_object(target);
                if obj.is_abrupt() {
                    return throw_through(frame, obj);
                }
                let keys = enumerate_chain(ctx, obj.as_pointer());
                // Reading each key through [[Get]] here (rather than only
                // when the loop body reads it) means a throwing accessor
                // aborts enumeration even for an empty loop body.
                for key in &keys {
                    let probe = ctx.get(obj.as_pointer(), key);
                    if probe.is_abrupt() {
                        return throw_through(frame, probe);
                    }
                }
                keys
            };
            frame.enumerators.push(Enumerator { keys, index: 0 });
        }
        ForInNext => {
            let delta = read_i16(bytes, &mut frame.pc);
            let done = match frame.enumerators.last_mut() {
                Some(state) if state.index < state.keys.len() => {
                    let key = state.keys[state.index].clone();
                    state.index += 1;
                    frame.stack.push(ctx.make_string(&key.to_display_string()));
                    false
                }
                _ => true,
            };
            if done {
                frame.enumerators.pop();
                frame.pc = (frame.pc as i32 + delta) as usize;
            }
        }
        ForInEnd => {
            frame.enumerators.pop();
        }
    }
    Step::Continue
}

/// Own and inherited enumerable string keys, walking the prototype
/// chain and keeping only the first occurrence of each name (a
/// shadowed inherited property is not visited twice).
fn enumerate_chain(ctx: &mut Context, obj: CompactPtr) -> Vec<PropertyKey> {
    let mut seen = std::collections::HashSet::new();
    let mut result = Vec::new();
    let mut current = Some(obj);
    while let Some(ptr) = current {
        let (enumerable, _) = ctx.enumerate(ptr);
        for key in enumerable {
            let display = key.to_display_string();
            if seen.insert(display) {
                result.push(key);
            }
        }
        current = ctx.object(ptr).prototype();
    }
    result
}

fn value_to_key(ctx: &mut Context, v: Value) -> PropertyKey {
    if v.is_integer() && v.as_integer() >= 0 {
        return PropertyKey::index(v.as_integer() as u32);
    }
    PropertyKey::string(&ctx.to_string(v))
}

fn property_get(ctx: &mut Context, obj: Value, key: &PropertyKey) -> Value {
    if obj.is_object() {
        return ctx.get(obj.as_pointer(), key);
    }
    let boxed = ctx.to_object(obj);
    if boxed.is_abrupt() {
        return boxed;
    }
    ctx.get(boxed.as_pointer(), key)
}

pub(crate) fn array_append(ctx: &mut Context, array: Value, element: Value) {
    if !array.is_object() {
        return;
    }
    let ptr = array.as_pointer();
    let length_key = PropertyKey::Magic(MagicString::Length);
    let length = ctx.object(ptr).get_own_data(&length_key).map(|v| v.as_integer()).unwrap_or(0);
    ctx.object(ptr).put_own(PropertyKey::index(length as u32), element);
    ctx.object(ptr).define_own_data(length_key, Value::integer(length + 1), PropertyAttributes::length());
}

#[cfg(test)]
mod tests {
    use super::*;
    use glint_vm_bytecode::{CodeFlags, CodeHeader, LiteralPool};
    use glint_vm_gc::GcConfig;

    fn header(register_count: u16) -> CodeHeader {
        CodeHeader {
            arg_count: 0,
            register_count,
            function_name: None,
            flags: CodeFlags::default(),
        }
    }

    #[test]
    fn adds_two_small_integer_literals() {
        let mut ctx = Context::new(GcConfig::default());
        let mut pool = LiteralPool::new();
        pool.push(Literal::Number(2.0));
        pool.push(Literal::Number(3.0));
        let bytecode = vec![
            Opcode::AddWithTwoLiterals as u8, 0, 1,
            Opcode::Return as u8,
        ];
        let code = CompiledCode::compiled(header(4), pool, bytecode);
        let result = vm_run(&mut ctx, &code, Value::undefined(), ctx.global_env, false, &[]);
        assert_eq!(result, Value::integer(5));
    }

    #[test]
    fn branch_if_false_skips_the_truthy_branch() {
        let mut ctx = Context::new(GcConfig::default());
        let bytecode = vec![
            Opcode::PushFalse as u8,
            Opcode::BranchIfFalse as u8, 2, 0,
            Opcode::PushNumber1 as u8,
            Opcode::Return as u8,
            Opcode::PushNumber0 as u8,
            Opcode::Return as u8,
        ];
        let code = CompiledCode::compiled(header(2), LiteralPool::new(), bytecode);
        let result = vm_run(&mut ctx, &code, Value::undefined(), ctx.global_env, false, &[]);
        assert_eq!(result, Value::integer(0));
    }

    #[test]
    fn throw_without_a_handler_returns_the_abrupt_value() {
        let mut ctx = Context::new(GcConfig::default());
        let bytecode = vec![Opcode::PushNumber1 as u8, Opcode::Throw as u8];
        let code = CompiledCode::compiled(header(2), LiteralPool::new(), bytecode);
        let result = vm_run(&mut ctx, &code, Value::undefined(), ctx.global_env, false, &[]);
        assert!(result.is_abrupt());
        assert_eq!(result.into_completion_value(), Value::integer(1));
    }

    #[test]
    fn try_catch_finally_runs_finally_exactly_once_after_a_catch() {
        let mut ctx = Context::new(GcConfig::default());
        // try { throw 1 } catch(_) { return <caught value> } -- no finally clause.
        // Layout: 0:Try 1-2:catch_pc=7 3-4:finally_pc=absent 5:PushNumber1
        // 6:Throw 7:Catch 8:Return
        let code = CompiledCode::compiled(
            header(4),
            LiteralPool::new(),
            vec![
                Opcode::Try as u8, 7, 0, 0xFF, 0xFF,
                Opcode::PushNumber1 as u8,
                Opcode::Throw as u8,
                Opcode::Catch as u8,
                Opcode::Return as u8,
            ],
        );
        let result = vm_run(&mut ctx, &code, Value::undefined(), ctx.global_env, false, &[]);
        assert_eq!(result, Value::integer(1));
    }

    #[test]
    fn finally_without_a_catch_runs_then_reraises_the_original_value() {
        let mut ctx = Context::new(GcConfig::default());
        // try { throw 1 } finally { } -- no catch clause, finally is empty.
        // Layout: 0:Try 1-2:catch_pc=absent 3-4:finally_pc=7 5:PushNumber1
        // 6:Throw 7:Finally 8-9:end_offset=0 10:Return (unreachable)
        let code = CompiledCode::compiled(
            header(4),
            LiteralPool::new(),
            vec![
                Opcode::Try as u8, 0xFF, 0xFF, 7, 0,
                Opcode::PushNumber1 as u8,
                Opcode::Throw as u8,
                Opcode::Finally as u8, 0, 0,
                Opcode::Return as u8,
            ],
        );
        let result = vm_run(&mut ctx, &code, Value::undefined(), ctx.global_env, false, &[]);
        assert!(result.is_abrupt());
        assert_eq!(result.into_completion_value(), Value::integer(1));
    }
}
