//! Byte-code emission.
//!
//! [`CodeBuilder`] is the write side of the format `glint-vm-bytecode`
//! defines: it owns the growing instruction stream, the literal pool
//! (deduplicating numbers and strings as they're pushed, per
//! `LiteralPool`'s documented expectation), the operand-stack depth
//! bookkeeping that becomes `CodeHeader::register_count`, and the
//! single-instruction lookahead that fuses adjacent push/operator pairs
//! into the bytecode's fused forms at the point of emission rather than
//! as a separate pass.

use std::rc::Rc;

use glint_vm_bytecode::{ExtendedOpcode, Literal, LiteralPool, Opcode};
use rustc_hash::FxHashMap;

/// What was just appended, kept around so the next `emit_*` call can
/// collapse it into a fused opcode instead of appending beside it.
enum Last {
    None,
    /// A single `PushLiteral idx`, starting at this byte offset.
    Lit(u32, usize),
    /// A `PushTwoLiterals idx0 idx1`, starting at this byte offset.
    TwoLit(u32, u32, usize),
    /// A `PushIdent idx`, starting at this byte offset.
    Ident(u32, usize),
}

/// A forward branch whose offset isn't known yet.
pub struct Label(usize);

pub struct CodeBuilder {
    bytes: Vec<u8>,
    literals: LiteralPool,
    num_index: FxHashMap<u64, u32>,
    str_index: FxHashMap<String, u32>,
    wide_literals: bool,
    depth: i32,
    max_depth: u32,
    last: Last,
}

impl CodeBuilder {
    pub fn new() -> Self {
        Self {
            bytes: Vec::new(),
            literals: LiteralPool::new(),
            num_index: FxHashMap::default(),
            str_index: FxHashMap::default(),
            wide_literals: false,
            depth: 0,
            max_depth: 0,
            last: Last::None,
        }
    }

    /// Call once every literal the function will ever push has been
    /// interned, before emitting a single literal-index operand: decides
    /// whether indices are written as 1 or 2 bytes.
    pub fn set_wide_literals(&mut self, wide: bool) {
        self.wide_literals = wide;
    }

    pub fn wide_literals(&self) -> bool {
        self.wide_literals
    }

    pub fn literal_count(&self) -> usize {
        self.literals.len()
    }

    pub fn pos(&self) -> usize {
        self.bytes.len()
    }

    pub fn max_depth(&self) -> u32 {
        self.max_depth
    }

    pub fn into_parts(self) -> (Vec<u8>, LiteralPool) {
        (self.bytes, self.literals)
    }

    // ---- literal pool ----

    pub fn intern_number(&mut self, n: f64) -> u32 {
        let bits = n.to_bits();
        if let Some(&idx) = self.num_index.get(&bits) {
            return idx;
        }
        let idx = self.literals.push(Literal::Number(n));
        self.num_index.insert(bits, idx);
        idx
    }

    pub fn intern_string(&mut self, s: &str) -> u32 {
        if let Some(&idx) = self.str_index.get(s) {
            return idx;
        }
        let idx = self.literals.push(Literal::string(s));
        self.str_index.insert(s.to_string(), idx);
        idx
    }

    /// Nested function literals are never deduplicated: each function
    /// expression/declaration produces its own closure identity.
    pub fn intern_function(&mut self, code: Rc<glint_vm_bytecode::CompiledCode>) -> u32 {
        self.literals.push(Literal::Function(code))
    }

    // ---- raw byte/operand writers ----

    fn raw_u8(&mut self, b: u8) {
        self.bytes.push(b);
    }

    fn raw_u16(&mut self, v: u16) {
        self.bytes.extend_from_slice(&v.to_le_bytes());
    }

    fn raw_i16(&mut self, v: i16) {
        self.bytes.extend_from_slice(&v.to_le_bytes());
    }

    fn raw_literal_index(&mut self, idx: u32) {
        if self.wide_literals {
            self.raw_u16(idx as u16);
        } else {
            self.raw_u8(idx as u8);
        }
    }

    fn touch_depth(&mut self, pushes: i32, pops: i32) {
        self.depth += pushes - pops;
        if self.depth > self.max_depth as i32 {
            self.max_depth = self.depth as u32;
        }
        debug_assert!(self.depth >= 0, "stack underflow during codegen");
    }

    fn clear_fusion(&mut self) {
        self.last = Last::None;
    }

    // ---- pushes ----

    pub fn push_literal(&mut self, idx: u32) {
        if let Last::Lit(prev, start) = self.last {
            self.bytes.truncate(start);
            self.raw_u8(Opcode::PushTwoLiterals as u8);
            self.raw_literal_index(prev);
            self.raw_literal_index(idx);
            // net effect identical to two PushLiterals: one more push.
            self.touch_depth(1, 0);
            self.last = Last::TwoLit(prev, idx, start);
            return;
        }
        let start = self.pos();
        self.raw_u8(Opcode::PushLiteral as u8);
        self.raw_literal_index(idx);
        self.touch_depth(1, 0);
        self.last = Last::Lit(idx, start);
    }

    pub fn push_number(&mut self, n: f64) {
        if n == 0.0 && n.is_sign_positive() {
            self.push_simple(Opcode::PushNumber0);
            return;
        }
        if n == 1.0 {
            self.push_simple(Opcode::PushNumber1);
            return;
        }
        if n.fract() == 0.0 && n >= i16::MIN as f64 && n <= i16::MAX as f64 {
            self.raw_u8(Opcode::PushNumber2B as u8);
            self.raw_i16(n as i16);
            self.touch_depth(1, 0);
            self.clear_fusion();
            return;
        }
        let idx = self.intern_number(n);
        self.push_literal(idx);
    }

    pub fn push_simple(&mut self, op: Opcode) {
        self.raw_u8(op as u8);
        self.touch_depth(1, 0);
        self.clear_fusion();
    }

    pub fn push_ident(&mut self, name_idx: u32) {
        let start = self.pos();
        self.raw_u8(Opcode::PushIdent as u8);
        self.raw_literal_index(name_idx);
        self.touch_depth(1, 0);
        self.last = Last::Ident(name_idx, start);
    }

    pub fn push_arg(&mut self, index: u8) {
        self.raw_u8(Opcode::PushArg as u8);
        self.raw_u8(index);
        self.touch_depth(1, 0);
        self.clear_fusion();
    }

    // ---- identifier-fused forms (structural, chosen by the caller) ----

    pub fn type_of_ident(&mut self, name_idx: u32) {
        self.raw_u8(Opcode::TypeOfIdent as u8);
        self.raw_literal_index(name_idx);
        self.touch_depth(1, 0);
        self.clear_fusion();
    }

    pub fn prop_literal_literal_get(&mut self, base_idx: u32, key_idx: u32) {
        self.raw_u8(Opcode::PropLiteralLiteralGet as u8);
        self.raw_literal_index(base_idx);
        self.raw_literal_index(key_idx);
        self.touch_depth(1, 0);
        self.clear_fusion();
    }

    pub fn assign_prop_literal_get_add(&mut self, name_idx: u32) {
        self.raw_u8(Opcode::AssignPropLiteralGetAdd as u8);
        self.raw_literal_index(name_idx);
        self.touch_depth(1, 2);
        self.clear_fusion();
    }

    // ---- binary/unary ops, with literal fusion ----

    /// Emit `Add`, fusing with a literal or two-literal push that was
    /// just emitted (the right-hand operand; addition order matters once
    /// either side can be a string).
    pub fn add(&mut self) {
        self.arith_with_fusion(Opcode::Add, Opcode::AddWithLiteral, Some(Opcode::AddWithTwoLiterals));
    }

    pub fn sub(&mut self) {
        self.arith_with_fusion(Opcode::Sub, Opcode::SubWithLiteral, None);
    }

    fn arith_with_fusion(&mut self, plain: Opcode, with_lit: Opcode, with_two: Option<Opcode>) {
        match self.last {
            Last::Lit(idx, start) if idx != u32::MAX => {
                self.bytes.truncate(start);
                self.raw_u8(with_lit as u8);
                self.raw_literal_index(idx);
                // The literal push and the already-pushed lhs (two stack
                // slots) collapse into one result, same net effect as the
                // unfused `PushLiteral; Add` would have had.
                self.depth -= 1;
                self.clear_fusion();
            }
            Last::TwoLit(a, b, start) if with_two.is_some() => {
                self.bytes.truncate(start);
                let op = with_two.unwrap();
                self.raw_u8(op as u8);
                self.raw_literal_index(a);
                self.raw_literal_index(b);
                // Both literal pushes collapse into one result.
                self.depth -= 1;
                self.clear_fusion();
            }
            _ => {
                self.raw_u8(plain as u8);
                self.touch_depth(1, 2);
                self.clear_fusion();
            }
        }
    }

    /// Emit `Neg`, fusing with an identifier push that was just emitted.
    pub fn neg(&mut self) {
        if let Last::Ident(idx, start) = self.last {
            self.bytes.truncate(start);
            self.raw_u8(Opcode::NegIdent as u8);
            self.raw_literal_index(idx);
            // PushIdent already accounted for the push; Neg would have
            // been pop 1 push 1, net zero, so depth is unchanged either way.
            self.clear_fusion();
            return;
        }
        self.raw_u8(Opcode::Neg as u8);
        self.touch_depth(1, 1);
        self.clear_fusion();
    }

    // ---- generic opcodes with no fusion ----

    pub fn op(&mut self, op: Opcode) {
        let sig = op.signature();
        self.raw_u8(op as u8);
        self.touch_depth(sig.pushes as i32, sig.pops as i32);
        self.clear_fusion();
    }

    pub fn op_with_literal(&mut self, op: Opcode, idx: u32) {
        let sig = op.signature();
        self.raw_u8(op as u8);
        self.raw_literal_index(idx);
        self.touch_depth(sig.pushes as i32, sig.pops as i32);
        self.clear_fusion();
    }

    /// `argc` pushed values plus the callee (and `this` for prop calls)
    /// collapse into one pushed result; depth bookkeeping is done
    /// explicitly here since `Opcode::signature` can't express a
    /// variable pop count.
    pub fn call(&mut self, op: Opcode, argc: u32) {
        self.raw_u8(op as u8);
        match op {
            Opcode::Call | Opcode::CallEval => {
                self.raw_u16(argc as u16);
                // argc-count args + argc-immediate marker + callee -> result
                self.touch_depth(1, argc as i32 + 2);
            }
            Opcode::CallProp => {
                self.raw_u16(argc as u16);
                self.touch_depth(1, argc as i32 + 3);
            }
            Opcode::New => {
                self.raw_u16(argc as u16);
                self.touch_depth(1, argc as i32 + 2);
            }
            Opcode::Call0 => self.touch_depth(1, 1),
            Opcode::Call0Prop => self.touch_depth(1, 2),
            _ => unreachable!("not a call opcode"),
        }
        self.clear_fusion();
    }

    // ---- branches ----

    /// Reserve a forward branch's offset operand, to be patched once the
    /// target address is known.
    pub fn branch(&mut self, op: Opcode) -> Label {
        let sig = op.signature();
        self.raw_u8(op as u8);
        let at = self.pos();
        self.raw_i16(0);
        self.touch_depth(sig.pushes as i32, sig.pops as i32);
        self.clear_fusion();
        Label(at)
    }

    /// Patch a forward branch's offset to land at the current position.
    pub fn patch_to_here(&mut self, label: Label) {
        let here = self.pos() as i32;
        let delta = here - (label.0 as i32 + 2);
        self.bytes[label.0..label.0 + 2].copy_from_slice(&(delta as i16).to_le_bytes());
    }

    /// Emit a backward jump to `target` (a position captured earlier via
    /// [`CodeBuilder::pos`]).
    pub fn jump_backward_to(&mut self, target: usize) {
        self.raw_u8(Opcode::JumpBackward as u8);
        let at = self.pos();
        let delta = target as i32 - (at as i32 + 2);
        self.raw_i16(delta as i16);
        self.clear_fusion();
    }

    // ---- try/catch/finally ----

    /// Emit `Try` with both targets reserved for a later patch.
    pub fn try_start(&mut self) -> (usize, usize) {
        self.raw_u8(Opcode::Try as u8);
        let catch_at = self.pos();
        self.raw_u16(0xFFFF);
        let finally_at = self.pos();
        self.raw_u16(0xFFFF);
        self.clear_fusion();
        (catch_at, finally_at)
    }

    /// Patch a `Try` target to the absolute byte position `target`, or
    /// leave it `0xFFFF` ("absent") if `target` is `None`.
    pub fn patch_try_target(&mut self, at: usize, target: Option<usize>) {
        let raw = target.map(|t| t as u16).unwrap_or(0xFFFF);
        self.bytes[at..at + 2].copy_from_slice(&raw.to_le_bytes());
    }

    pub fn catch_op(&mut self) {
        self.raw_u8(Opcode::Catch as u8);
        self.clear_fusion();
    }

    /// Emit `Finally` with its length operand reserved; the caller
    /// compiles the finally block's body immediately afterward and
    /// passes the returned offset to [`CodeBuilder::finally_patch_len`]
    /// once the body's length is known.
    pub fn finally_start(&mut self) -> usize {
        self.raw_u8(Opcode::Finally as u8);
        let at = self.pos();
        self.raw_u16(0);
        self.clear_fusion();
        at
    }

    /// Patch a `Finally`'s length operand, reserved by
    /// [`CodeBuilder::finally_start`], to the finally block's actual
    /// byte length.
    pub fn finally_patch_len(&mut self, at: usize, len: usize) {
        self.bytes[at..at + 2].copy_from_slice(&(len as u16).to_le_bytes());
    }

    pub fn throw(&mut self) {
        self.raw_u8(Opcode::Throw as u8);
        self.touch_depth(0, 1);
        self.clear_fusion();
    }

    pub fn ret(&mut self) {
        self.raw_u8(Opcode::Return as u8);
        self.touch_depth(0, 1);
        self.clear_fusion();
    }

    /// An [`ExtendedOpcode`] with no operands.
    pub fn ext_op(&mut self, ext: ExtendedOpcode, pushes: i32, pops: i32) {
        self.raw_u8(Opcode::ExtendedPrefix as u8);
        self.raw_u8(ext as u8);
        self.touch_depth(pushes, pops);
        self.clear_fusion();
    }

    /// An [`ExtendedOpcode`] followed by one literal-pool index operand.
    pub fn ext_op_with_literal(&mut self, ext: ExtendedOpcode, idx: u32, pushes: i32, pops: i32) {
        self.raw_u8(Opcode::ExtendedPrefix as u8);
        self.raw_u8(ext as u8);
        self.raw_literal_index(idx);
        self.touch_depth(pushes, pops);
        self.clear_fusion();
    }

    /// An [`ExtendedOpcode`] carrying a forward branch offset (e.g.
    /// `ForInNext`'s loop-exit jump), reserved for a later
    /// [`CodeBuilder::patch_to_here`].
    pub fn ext_branch(&mut self, ext: ExtendedOpcode, pushes: i32, pops: i32) -> Label {
        self.raw_u8(Opcode::ExtendedPrefix as u8);
        self.raw_u8(ext as u8);
        let at = self.pos();
        self.raw_i16(0);
        self.touch_depth(pushes, pops);
        self.clear_fusion();
        Label(at)
    }

    pub fn pop(&mut self) {
        self.raw_u8(Opcode::Pop as u8);
        self.touch_depth(0, 1);
        self.clear_fusion();
    }

    /// Discard the last expression's value left on the stack, if any
    /// (expression-statement completion). Callers track whether a value
    /// was actually pushed; this just emits the `Pop`.
    pub fn discard(&mut self) {
        self.pop();
    }
}

impl Default for CodeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn two_adjacent_literal_pushes_fuse() {
        let mut b = CodeBuilder::new();
        let i0 = b.intern_number(1.0);
        let i1 = b.intern_number(2.0);
        b.push_literal(i0);
        b.push_literal(i1);
        let (bytes, _) = b.into_parts();
        assert_eq!(bytes[0], Opcode::PushTwoLiterals as u8);
    }

    #[test]
    fn literal_then_add_fuses_to_add_with_literal() {
        let mut b = CodeBuilder::new();
        b.push_ident(0); // stands in for some lhs already pushed
        let lit = b.intern_number(5.0);
        b.push_literal(lit);
        b.add();
        let (bytes, _) = b.into_parts();
        assert!(bytes.contains(&(Opcode::AddWithLiteral as u8)));
        assert!(!bytes.contains(&(Opcode::Add as u8)));
    }

    #[test]
    fn ident_then_neg_fuses() {
        let mut b = CodeBuilder::new();
        let idx = b.intern_string("x");
        b.push_ident(idx);
        b.neg();
        let (bytes, _) = b.into_parts();
        assert_eq!(bytes[0], Opcode::NegIdent as u8);
    }

    #[test]
    fn numbers_and_strings_dedup() {
        let mut b = CodeBuilder::new();
        assert_eq!(b.intern_number(1.0), b.intern_number(1.0));
        assert_eq!(b.intern_string("a"), b.intern_string("a"));
    }

    #[test]
    fn max_depth_tracks_peak_usage() {
        let mut b = CodeBuilder::new();
        let idx = b.intern_number(1.0);
        b.push_literal(idx);
        b.push_literal(idx); // fuses, depth should read 2 at peak
        assert_eq!(b.max_depth(), 2);
    }
}
