//! Function-section read/write for snapshot buffers.
//!
//! [`glint_vm_bytecode::snapshot`] defines and validates the fixed
//! header; this module walks a [`CompiledCode`] tree (a function and
//! every nested function reachable through its literal pool) into a
//! flat byte buffer after the header, and back.
//!
//! The wire shape of one function section, in order: `arg_count` (u8),
//! `register_count` (u16), a flags byte, the function name (optional
//! length-prefixed UTF-16), parameter and var name tables
//! (length-prefixed UTF-16 each), the literal pool (tagged entries —
//! numbers as `f64`, strings as length-prefixed UTF-16, nested functions
//! as a recursively nested section), then the bytecode stream
//! (length-prefixed bytes). All multi-byte integers are little-endian,
//! matching [`glint_vm_bytecode::snapshot::Endianness::native`].

use std::rc::Rc;

use glint_vm_bytecode::{
    CodeFlags, CodeHeader, CompiledCode, Literal, LiteralPool, SnapshotHeader,
};

use crate::error::{EngineError, EngineResult};

const FLAG_STRICT: u8 = 1 << 0;
const FLAG_ARGUMENTS_NEEDED: u8 = 1 << 1;
const FLAG_LEX_ENV_NOT_NEEDED: u8 = 1 << 2;
const FLAG_WIDE_LITERALS: u8 = 1 << 3;
const FLAG_HAS_INITIALIZERS: u8 = 1 << 4;

const LITERAL_TAG_NUMBER: u8 = 0;
const LITERAL_TAG_STRING: u8 = 1;
const LITERAL_TAG_FUNCTION: u8 = 2;

/// Compile `source` and serialize the result into a complete snapshot
/// buffer (header followed by the root function's section tree).
pub fn parse_and_save_snapshot(source: &str, is_strict: bool) -> EngineResult<Vec<u8>> {
    let code = glint_vm_compiler::compile_eval(source, is_strict)?;
    Ok(save_snapshot(&code))
}

/// Serialize an already-compiled function tree into a snapshot buffer.
pub fn save_snapshot(code: &Rc<CompiledCode>) -> Vec<u8> {
    let function_count = count_functions(code);
    let mut out = SnapshotHeader::for_native_build(function_count).write();
    write_function(&mut out, code);
    out
}

/// Parse a snapshot buffer's header and reconstruct its root function.
pub fn exec_snapshot(bytes: &[u8]) -> EngineResult<Rc<CompiledCode>> {
    SnapshotHeader::parse(bytes).map_err(EngineError::from)?;
    const HEADER_LEN: usize = 8 + 4 + 1 + 1 + 4;
    let mut cursor = Cursor { bytes, pos: HEADER_LEN };
    read_function(&mut cursor)
}

fn count_functions(code: &Rc<CompiledCode>) -> u32 {
    let mut total = 1;
    for index in 0..code.literals.len() {
        if let Some(Literal::Function(nested)) = code.literals.get(index as u32) {
            total += count_functions(nested);
        }
    }
    total
}

fn write_function(out: &mut Vec<u8>, code: &Rc<CompiledCode>) {
    let header = &code.header;
    out.push(header.arg_count);
    out.extend_from_slice(&header.register_count.to_le_bytes());

    let mut flags = 0u8;
    if header.flags.strict {
        flags |= FLAG_STRICT;
    }
    if header.flags.arguments_needed {
        flags |= FLAG_ARGUMENTS_NEEDED;
    }
    if header.flags.lex_env_not_needed {
        flags |= FLAG_LEX_ENV_NOT_NEEDED;
    }
    if header.flags.wide_literals {
        flags |= FLAG_WIDE_LITERALS;
    }
    if header.flags.has_initializers {
        flags |= FLAG_HAS_INITIALIZERS;
    }
    out.push(flags);

    write_optional_utf16(out, header.function_name.as_deref());

    out.extend_from_slice(&(header.param_names.len() as u32).to_le_bytes());
    for name in header.param_names.iter() {
        write_utf16(out, name);
    }

    out.extend_from_slice(&(header.var_names.len() as u32).to_le_bytes());
    for name in header.var_names.iter() {
        write_utf16(out, name);
    }

    out.extend_from_slice(&(code.literals.len() as u32).to_le_bytes());
    for index in 0..code.literals.len() {
        let literal = code.literals.get(index as u32).expect("index within bounds");
        match literal {
            Literal::Number(n) => {
                out.push(LITERAL_TAG_NUMBER);
                out.extend_from_slice(&n.to_le_bytes());
            }
            Literal::String(s) => {
                out.push(LITERAL_TAG_STRING);
                write_utf16(out, s);
            }
            Literal::Function(nested) => {
                out.push(LITERAL_TAG_FUNCTION);
                write_function(out, nested);
            }
        }
    }

    out.extend_from_slice(&(code.bytecode.len() as u32).to_le_bytes());
    out.extend_from_slice(&code.bytecode);
}

fn write_optional_utf16(out: &mut Vec<u8>, value: Option<&[u16]>) {
    match value {
        Some(units) => {
            out.push(1);
            write_utf16(out, units);
        }
        None => out.push(0),
    }
}

fn write_utf16(out: &mut Vec<u8>, units: &[u16]) {
    out.extend_from_slice(&(units.len() as u32).to_le_bytes());
    for unit in units {
        out.extend_from_slice(&unit.to_le_bytes());
    }
}

struct Cursor<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn truncated() -> EngineError {
        EngineError::Snapshot(glint_vm_bytecode::SnapshotError::Truncated)
    }

    fn take(&mut self, len: usize) -> EngineResult<&'a [u8]> {
        let end = self.pos.checked_add(len).ok_or_else(Self::truncated)?;
        let slice = self.bytes.get(self.pos..end).ok_or_else(Self::truncated)?;
        self.pos = end;
        Ok(slice)
    }

    fn u8(&mut self) -> EngineResult<u8> {
        Ok(self.take(1)?[0])
    }

    fn u16(&mut self) -> EngineResult<u16> {
        Ok(u16::from_le_bytes(self.take(2)?.try_into().unwrap()))
    }

    fn u32(&mut self) -> EngineResult<u32> {
        Ok(u32::from_le_bytes(self.take(4)?.try_into().unwrap()))
    }

    fn f64(&mut self) -> EngineResult<f64> {
        Ok(f64::from_le_bytes(self.take(8)?.try_into().unwrap()))
    }

    fn utf16(&mut self) -> EngineResult<Rc<[u16]>> {
        let len = self.u32()? as usize;
        let mut units = Vec::with_capacity(len);
        for _ in 0..len {
            units.push(self.u16()?);
        }
        Ok(units.into())
    }

    fn optional_utf16(&mut self) -> EngineResult<Option<Rc<[u16]>>> {
        if self.u8()? == 0 {
            Ok(None)
        } else {
            Ok(Some(self.utf16()?))
        }
    }
}

fn read_function(cursor: &mut Cursor<'_>) -> EngineResult<Rc<CompiledCode>> {
    let arg_count = cursor.u8()?;
    let register_count = cursor.u16()?;
    let flags_byte = cursor.u8()?;
    let flags = CodeFlags {
        strict: flags_byte & FLAG_STRICT != 0,
        arguments_needed: flags_byte & FLAG_ARGUMENTS_NEEDED != 0,
        lex_env_not_needed: flags_byte & FLAG_LEX_ENV_NOT_NEEDED != 0,
        wide_literals: flags_byte & FLAG_WIDE_LITERALS != 0,
        has_initializers: flags_byte & FLAG_HAS_INITIALIZERS != 0,
    };

    let function_name = cursor.optional_utf16()?;

    let param_count = cursor.u32()?;
    let mut param_names = Vec::with_capacity(param_count as usize);
    for _ in 0..param_count {
        param_names.push(cursor.utf16()?);
    }

    let var_count = cursor.u32()?;
    let mut var_names = Vec::with_capacity(var_count as usize);
    for _ in 0..var_count {
        var_names.push(cursor.utf16()?);
    }

    let header = CodeHeader {
        arg_count,
        register_count,
        function_name,
        param_names: param_names.into(),
        var_names: var_names.into(),
        flags,
    };

    let literal_count = cursor.u32()?;
    let mut literals = LiteralPool::new();
    for _ in 0..literal_count {
        let tag = cursor.u8()?;
        let literal = match tag {
            LITERAL_TAG_NUMBER => Literal::Number(cursor.f64()?),
            LITERAL_TAG_STRING => Literal::String(cursor.utf16()?),
            LITERAL_TAG_FUNCTION => Literal::Function(read_function(cursor)?),
            _ => return Err(Cursor::truncated()),
        };
        literals.push(literal);
    }

    let bytecode_len = cursor.u32()? as usize;
    let bytecode = cursor.take(bytecode_len)?;

    Ok(CompiledCode::from_snapshot(header, literals, bytecode.into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn a_snapshot_round_trips_through_save_and_exec() {
        let bytes = parse_and_save_snapshot("1 + 2;", false).unwrap();
        let code = exec_snapshot(&bytes).unwrap();
        assert_eq!(code.length(), 0);
    }

    #[test]
    fn nested_functions_survive_the_round_trip() {
        let bytes = parse_and_save_snapshot("function add(a, b) { return a + b; } add(1, 2);", false).unwrap();
        let code = exec_snapshot(&bytes).unwrap();
        assert!(code.literals.len() >= 1);
    }

    #[test]
    fn exec_snapshot_rejects_a_bad_header() {
        assert!(exec_snapshot(&[1, 2, 3]).is_err());
    }
}
