//! Code emitter (§4.3.1, §4.3.2): appends instructions to a per-function
//! byte buffer, tracks the address-to-line side table, and patches relative
//! jump deltas once their targets are known.
//!
//! Patching a jump here is a direct byte-splice at a statically known
//! field offset, the same relocation-table idea as
//! `cranelift_codegen::binemit::relaxation` resolving branch targets after
//! layout — except Kos bytecode operands never change width, so there is no
//! relaxation loop, only a single patch pass per jump.

use kos_bytecode::{Instruction, LineTable, Opcode};
use smallvec::SmallVec;

use crate::error::{CompileError, CompileErrorKind, Pos};
use crate::frame::{PendingJump, PendingJumpKind};

/// Implementation ceiling; §4.3.1 requires at least 16 MiB.
pub const MAX_FUNCTION_CODE_SIZE: usize = 16 * 1024 * 1024;

/// A small set of placeholder offsets all targeting the same eventual
/// address, patched together by [`Emitter::patch_all`].
pub type JumpArray = SmallVec<[u32; 4]>;

pub struct Emitter {
    code: Vec<u8>,
    lines: LineTable,
}

impl Emitter {
    pub fn new() -> Self {
        Emitter { code: Vec::new(), lines: LineTable::new() }
    }

    pub fn offset(&self) -> u32 {
        self.code.len() as u32
    }

    pub fn into_parts(self) -> (Vec<u8>, kos_bytecode::LineTable) {
        (self.code, self.lines)
    }

    /// Append one instruction, returning the offset it was written at.
    pub fn emit(&mut self, pos: Pos, instr: Instruction) -> Result<u32, CompileError> {
        let off = self.code.len();
        if off + instr.encoded_len() > MAX_FUNCTION_CODE_SIZE {
            return Err(CompileError::new(pos, CompileErrorKind::CodeTooLarge));
        }
        self.lines.push(off as u32, pos.line);
        instr.write_to(&mut self.code);
        Ok(off as u32)
    }

    /// Emit a jump-family instruction with a placeholder delta of 0,
    /// returning its offset so the caller can later [`patch`](Self::patch)
    /// or collect it into a [`JumpArray`] for [`patch_all`](Self::patch_all).
    pub fn emit_jump(&mut self, pos: Pos, instr: Instruction) -> Result<u32, CompileError> {
        debug_assert!(instr.opcode().is_jump(), "emit_jump called with a non-jump instruction");
        self.emit(pos, instr)
    }

    /// Overwrite the delta field of the jump instruction at `placeholder_offset`
    /// so it targets `target_offset`.
    pub fn patch(&mut self, placeholder_offset: u32, target_offset: u32) {
        let off = placeholder_offset as usize;
        let opcode = Opcode::from_byte(self.code[off]).expect("patch target is not an instruction start");
        let (field_off, instr_len) = delta_field(opcode);
        let delta = target_offset as i64 - (off as i64 + instr_len as i64);
        let bytes = (delta as i32).to_le_bytes();
        self.code[off + field_off..off + field_off + 4].copy_from_slice(&bytes);
    }

    pub fn patch_all(&mut self, placeholders: &JumpArray, target_offset: u32) {
        for &off in placeholders {
            self.patch(off, target_offset);
        }
    }

    /// Record a break/continue/fallthrough jump against the current frame so
    /// the enclosing loop/switch can resolve it later.
    pub fn record_pending(&self, frame_pending: &mut Vec<PendingJump>, kind: PendingJumpKind, offset: u32) {
        frame_pending.push(PendingJump { kind, patch_offset: offset });
    }
}

impl Default for Emitter {
    fn default() -> Self {
        Self::new()
    }
}

/// Byte offset of the 4-byte delta field within a jump-family instruction,
/// and that instruction's total encoded length (opcode byte included) —
/// mirrors the field layout in `kos_bytecode::instruction::Instruction`.
fn delta_field(opcode: Opcode) -> (usize, usize) {
    match opcode {
        Opcode::Jump => (1, 5),
        Opcode::JumpCond | Opcode::JumpNotCond => (2, 6),
        Opcode::NextJump => (3, 7),
        Opcode::Catch => (2, 6),
        _ => panic!("{opcode:?} has no delta field"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pos() -> Pos {
        Pos::new(1, 1)
    }

    #[test]
    fn patch_computes_delta_relative_to_instruction_end() {
        let mut e = Emitter::new();
        let jump_off = e.emit_jump(pos(), Instruction::Jump { delta: 0 }).unwrap();
        // pad with a couple of no-operand instructions to create distance
        e.emit(pos(), Instruction::LoadVoid { dest: 0 }).unwrap();
        e.emit(pos(), Instruction::LoadVoid { dest: 1 }).unwrap();
        let target = e.offset();
        e.patch(jump_off, target);
        let (code, _) = e.into_parts();
        let delta = i32::from_le_bytes([code[1], code[2], code[3], code[4]]);
        assert_eq!(target as i64, jump_off as i64 + 5 + delta as i64);
    }

    #[test]
    fn oversized_function_is_rejected() {
        let mut e = Emitter::new();
        e.code = vec![0u8; MAX_FUNCTION_CODE_SIZE - 1];
        let err = e.emit(pos(), Instruction::LoadVoid { dest: 0 }).unwrap_err();
        assert_eq!(err.kind, CompileErrorKind::CodeTooLarge);
    }
}
