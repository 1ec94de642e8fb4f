//! A minimal disassembler: walks a code buffer and yields `(offset, Instruction)`
//! pairs. Used by tests that assert the round-trip property from the spec
//! ("disassembling then re-serializing any valid function yields the
//! identical byte sequence") and by any future debugger front-end.

use crate::error::DecodeError;
use crate::instruction::Instruction;

/// Iterator over the instructions in a code slice, starting at offset 0.
pub struct Disassembler<'a> {
    code: &'a [u8],
    offset: usize,
}

impl<'a> Disassembler<'a> {
    pub fn new(code: &'a [u8]) -> Self {
        Disassembler { code, offset: 0 }
    }
}

impl<'a> Iterator for Disassembler<'a> {
    type Item = Result<(u32, Instruction), DecodeError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.offset >= self.code.len() {
            return None;
        }
        match Instruction::read_from(&self.code[self.offset..]) {
            Ok((inst, len)) => {
                let at = self.offset as u32;
                self.offset += len;
                Some(Ok((at, inst)))
            }
            Err(e) => {
                // Advance past the end so a caller iterating to completion
                // doesn't spin on the same error forever.
                self.offset = self.code.len();
                Some(Err(e))
            }
        }
    }
}

/// Disassemble a whole function body, collecting every instruction.
/// Fails on the first malformed instruction.
pub fn disassemble_all(code: &[u8]) -> Result<Vec<(u32, Instruction)>, DecodeError> {
    Disassembler::new(code).collect()
}

/// Re-encode a disassembled instruction stream. Concatenating the result of
/// `disassemble_all` then `reassemble` on a well-formed buffer must yield the
/// original bytes back.
pub fn reassemble(instructions: &[(u32, Instruction)]) -> Vec<u8> {
    let mut buf = Vec::new();
    for (_, inst) in instructions {
        inst.write_to(&mut buf);
    }
    buf
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instruction::Instruction;

    #[test]
    fn round_trips_a_mixed_instruction_stream() {
        let instrs = vec![
            Instruction::LoadInt8 { dest: 0, imm: -5 },
            Instruction::LoadConst { dest: 1, idx: 1000 },
            Instruction::Add { dest: 2, a: 0, b: 1 },
            Instruction::JumpCond { cond: 2, delta: 9 },
            Instruction::Return { val: 2 },
        ];
        let mut buf = Vec::new();
        for i in &instrs {
            i.write_to(&mut buf);
        }
        let decoded = disassemble_all(&buf).unwrap();
        let decoded_only: Vec<_> = decoded.iter().map(|(_, i)| *i).collect();
        assert_eq!(decoded_only, instrs);
        assert_eq!(reassemble(&decoded), buf);
    }

    #[test]
    fn rejects_unknown_opcode_byte() {
        let buf = [0xffu8];
        assert_eq!(Instruction::read_from(&buf), Err(DecodeError::InvalidOpcode(0xff)));
    }

    #[test]
    fn rejects_truncated_operand() {
        // ADD needs 3 operand bytes, give it none.
        let buf = [crate::opcode::Opcode::Add as u8];
        assert_eq!(Instruction::read_from(&buf), Err(DecodeError::Truncated));
    }
}
