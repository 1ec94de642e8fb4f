//! Encoding and decoding of individual instructions.
//!
//! An instruction is one opcode byte followed by a fixed number of operand
//! bytes; the shape (which operand kinds, in which order) is a static
//! property of the opcode (see [`Opcode::operand_layout`]).

use crate::error::DecodeError;
use crate::opcode::Opcode;
use smallvec::SmallVec;

/// A register index into the current frame, in `0..=255`.
pub type Reg = u8;

/// Sentinel meaning "no register" for fields of a function's layout that may
/// be absent (no `this`, no rest parameter, no ellipsis).
pub const KOS_NO_REG: Reg = 255;

/// The kind of one operand slot, used by the disassembler and by the emitter
/// to size jump placeholders generically.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperandKind {
    /// A register index, one byte.
    Reg,
    /// A signed 8-bit immediate.
    ImmS8,
    /// An unsigned 8-bit immediate (also used for small constant/string indices).
    ImmU8,
    /// An unsigned 16-bit constant-pool or module index.
    ImmU16,
    /// An unsigned 32-bit global/element index.
    ImmU32,
    /// A signed 32-bit relative jump delta, patched at finalization.
    JumpDelta,
}

impl OperandKind {
    /// Encoded width in bytes.
    pub const fn size(self) -> usize {
        match self {
            OperandKind::Reg | OperandKind::ImmS8 | OperandKind::ImmU8 => 1,
            OperandKind::ImmU16 => 2,
            OperandKind::ImmU32 | OperandKind::JumpDelta => 4,
        }
    }
}

/// One decoded instruction together with its operands.
///
/// Variants mirror [`Opcode`] one-to-one; `Instruction::opcode()` recovers
/// the tag for table-driven dispatch.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Instruction {
    LoadConst { dest: Reg, idx: u16 },
    LoadConst8 { dest: Reg, idx: u8 },
    LoadFun { dest: Reg, idx: u16 },
    LoadFun8 { dest: Reg, idx: u8 },
    LoadInt8 { dest: Reg, imm: i8 },
    LoadTrue { dest: Reg },
    LoadFalse { dest: Reg },
    LoadVoid { dest: Reg },
    LoadArray { dest: Reg, size: u32 },
    LoadObj { dest: Reg },
    LoadObjProto { dest: Reg, proto: Reg },
    LoadIter { dest: Reg, src: Reg },

    Move { dest: Reg, src: Reg },
    GetProto { dest: Reg, src: Reg },

    GetGlobal { dest: Reg, idx: u32 },
    SetGlobal { idx: u32, src: Reg },
    GetMod { dest: Reg, module_idx: u16 },
    GetModElem { dest: Reg, module_idx: u16, elem_idx: u32 },
    GetModGlobal { dest: Reg, module_idx: u16, global_idx: u32 },

    Get { dest: Reg, obj: Reg, prop: Reg },
    GetElem { dest: Reg, obj: Reg, idx: i32 },
    GetElem8 { dest: Reg, obj: Reg, idx: i8 },
    GetProp8 { dest: Reg, obj: Reg, str_idx: u8 },
    GetRange { dest: Reg, obj: Reg, begin: Reg, end: Reg },
    Set { obj: Reg, prop: Reg, val: Reg },
    SetElem { obj: Reg, idx: i32, val: Reg },
    SetElem8 { obj: Reg, idx: i8, val: Reg },
    SetProp8 { obj: Reg, str_idx: u8, val: Reg },
    Del { obj: Reg, prop: Reg },
    DelProp8 { obj: Reg, str_idx: u8 },
    Push { arr: Reg, val: Reg },
    PushEx { arr: Reg, val: Reg },

    Add { dest: Reg, a: Reg, b: Reg },
    Sub { dest: Reg, a: Reg, b: Reg },
    Mul { dest: Reg, a: Reg, b: Reg },
    Div { dest: Reg, a: Reg, b: Reg },
    Mod { dest: Reg, a: Reg, b: Reg },
    Not { dest: Reg, a: Reg },
    And { dest: Reg, a: Reg, b: Reg },
    Or { dest: Reg, a: Reg, b: Reg },
    Xor { dest: Reg, a: Reg, b: Reg },
    Shl { dest: Reg, a: Reg, b: Reg },
    Shr { dest: Reg, a: Reg, b: Reg },
    Shru { dest: Reg, a: Reg, b: Reg },

    Type { dest: Reg, a: Reg },
    CmpEq { dest: Reg, a: Reg, b: Reg },
    CmpNe { dest: Reg, a: Reg, b: Reg },
    CmpLe { dest: Reg, a: Reg, b: Reg },
    CmpLt { dest: Reg, a: Reg, b: Reg },
    HasDp { dest: Reg, obj: Reg, prop: Reg },
    HasDpProp8 { dest: Reg, obj: Reg, str_idx: u8 },
    HasSh { dest: Reg, obj: Reg, prop: Reg },
    HasShProp8 { dest: Reg, obj: Reg, str_idx: u8 },
    InstanceOf { dest: Reg, a: Reg, class: Reg },

    Jump { delta: i32 },
    JumpCond { cond: Reg, delta: i32 },
    JumpNotCond { cond: Reg, delta: i32 },
    Next { dest: Reg, iter: Reg },
    NextJump { dest: Reg, iter: Reg, delta: i32 },

    Bind { fun: Reg, slot: u8, src: Reg },
    BindSelf { fun: Reg, slot: u8 },
    BindDefaults { fun: Reg, defaults: Reg },

    Call { dest: Reg, func: Reg, args: Reg, num_args: u8 },
    CallN { dest: Reg, func: Reg, this: Reg, args: Reg, num_args: u8 },
    CallFun { dest: Reg, func: Reg, args_array: Reg },
    TailCall { func: Reg, args: Reg, num_args: u8 },
    TailCallN { func: Reg, this: Reg, args: Reg, num_args: u8 },
    TailCallFun { func: Reg, args_array: Reg },

    Return { val: Reg },
    Yield { val: Reg },
    Throw { val: Reg },
    Catch { dest: Reg, delta: i32 },
    Cancel,
    Breakpoint,
}

impl Instruction {
    /// The opcode tag for this instruction, used to drive the interpreter's
    /// dispatch table and the emitter's operand-size table.
    pub const fn opcode(&self) -> Opcode {
        match self {
            Instruction::LoadConst { .. } => Opcode::LoadConst,
            Instruction::LoadConst8 { .. } => Opcode::LoadConst8,
            Instruction::LoadFun { .. } => Opcode::LoadFun,
            Instruction::LoadFun8 { .. } => Opcode::LoadFun8,
            Instruction::LoadInt8 { .. } => Opcode::LoadInt8,
            Instruction::LoadTrue { .. } => Opcode::LoadTrue,
            Instruction::LoadFalse { .. } => Opcode::LoadFalse,
            Instruction::LoadVoid { .. } => Opcode::LoadVoid,
            Instruction::LoadArray { .. } => Opcode::LoadArray,
            Instruction::LoadObj { .. } => Opcode::LoadObj,
            Instruction::LoadObjProto { .. } => Opcode::LoadObjProto,
            Instruction::LoadIter { .. } => Opcode::LoadIter,
            Instruction::Move { .. } => Opcode::Move,
            Instruction::GetProto { .. } => Opcode::GetProto,
            Instruction::GetGlobal { .. } => Opcode::GetGlobal,
            Instruction::SetGlobal { .. } => Opcode::SetGlobal,
            Instruction::GetMod { .. } => Opcode::GetMod,
            Instruction::GetModElem { .. } => Opcode::GetModElem,
            Instruction::GetModGlobal { .. } => Opcode::GetModGlobal,
            Instruction::Get { .. } => Opcode::Get,
            Instruction::GetElem { .. } => Opcode::GetElem,
            Instruction::GetElem8 { .. } => Opcode::GetElem8,
            Instruction::GetProp8 { .. } => Opcode::GetProp8,
            Instruction::GetRange { .. } => Opcode::GetRange,
            Instruction::Set { .. } => Opcode::Set,
            Instruction::SetElem { .. } => Opcode::SetElem,
            Instruction::SetElem8 { .. } => Opcode::SetElem8,
            Instruction::SetProp8 { .. } => Opcode::SetProp8,
            Instruction::Del { .. } => Opcode::Del,
            Instruction::DelProp8 { .. } => Opcode::DelProp8,
            Instruction::Push { .. } => Opcode::Push,
            Instruction::PushEx { .. } => Opcode::PushEx,
            Instruction::Add { .. } => Opcode::Add,
            Instruction::Sub { .. } => Opcode::Sub,
            Instruction::Mul { .. } => Opcode::Mul,
            Instruction::Div { .. } => Opcode::Div,
            Instruction::Mod { .. } => Opcode::Mod,
            Instruction::Not { .. } => Opcode::Not,
            Instruction::And { .. } => Opcode::And,
            Instruction::Or { .. } => Opcode::Or,
            Instruction::Xor { .. } => Opcode::Xor,
            Instruction::Shl { .. } => Opcode::Shl,
            Instruction::Shr { .. } => Opcode::Shr,
            Instruction::Shru { .. } => Opcode::Shru,
            Instruction::Type { .. } => Opcode::Type,
            Instruction::CmpEq { .. } => Opcode::CmpEq,
            Instruction::CmpNe { .. } => Opcode::CmpNe,
            Instruction::CmpLe { .. } => Opcode::CmpLe,
            Instruction::CmpLt { .. } => Opcode::CmpLt,
            Instruction::HasDp { .. } => Opcode::HasDp,
            Instruction::HasDpProp8 { .. } => Opcode::HasDpProp8,
            Instruction::HasSh { .. } => Opcode::HasSh,
            Instruction::HasShProp8 { .. } => Opcode::HasShProp8,
            Instruction::InstanceOf { .. } => Opcode::InstanceOf,
            Instruction::Jump { .. } => Opcode::Jump,
            Instruction::JumpCond { .. } => Opcode::JumpCond,
            Instruction::JumpNotCond { .. } => Opcode::JumpNotCond,
            Instruction::Next { .. } => Opcode::Next,
            Instruction::NextJump { .. } => Opcode::NextJump,
            Instruction::Bind { .. } => Opcode::Bind,
            Instruction::BindSelf { .. } => Opcode::BindSelf,
            Instruction::BindDefaults { .. } => Opcode::BindDefaults,
            Instruction::Call { .. } => Opcode::Call,
            Instruction::CallN { .. } => Opcode::CallN,
            Instruction::CallFun { .. } => Opcode::CallFun,
            Instruction::TailCall { .. } => Opcode::TailCall,
            Instruction::TailCallN { .. } => Opcode::TailCallN,
            Instruction::TailCallFun { .. } => Opcode::TailCallFun,
            Instruction::Return { .. } => Opcode::Return,
            Instruction::Yield { .. } => Opcode::Yield,
            Instruction::Throw { .. } => Opcode::Throw,
            Instruction::Catch { .. } => Opcode::Catch,
            Instruction::Cancel => Opcode::Cancel,
            Instruction::Breakpoint => Opcode::Breakpoint,
        }
    }

    /// Total encoded size in bytes, including the opcode byte.
    pub fn encoded_len(&self) -> usize {
        1 + self.operands_len()
    }

    fn operands_len(&self) -> usize {
        use Instruction::*;
        match self {
            LoadConst { .. } | LoadFun { .. } => 3,
            LoadConst8 { .. } | LoadFun8 { .. } | LoadInt8 { .. } => 2,
            LoadTrue { .. } | LoadFalse { .. } | LoadVoid { .. } | LoadObj { .. } => 1,
            LoadArray { .. } => 5,
            LoadObjProto { .. } | LoadIter { .. } | Move { .. } | GetProto { .. } => 2,
            GetGlobal { .. } => 5,
            SetGlobal { .. } => 5,
            GetMod { .. } => 3,
            GetModElem { .. } => 7,
            GetModGlobal { .. } => 7,
            Get { .. } | Set { .. } => 3,
            GetElem { .. } => 6,
            GetElem8 { .. } => 3,
            GetProp8 { .. } => 3,
            GetRange { .. } => 4,
            SetElem { .. } => 6,
            SetElem8 { .. } => 3,
            SetProp8 { .. } => 3,
            Del { .. } => 2,
            DelProp8 { .. } => 2,
            Push { .. } | PushEx { .. } => 2,
            Add { .. } | Sub { .. } | Mul { .. } | Div { .. } | Mod { .. } | And { .. } | Or { .. } | Xor { .. }
            | Shl { .. } | Shr { .. } | Shru { .. } | CmpEq { .. } | CmpNe { .. } | CmpLe { .. } | CmpLt { .. }
            | HasDp { .. } | HasSh { .. } => 3,
            Not { .. } | Type { .. } => 2,
            HasDpProp8 { .. } | HasShProp8 { .. } => 3,
            InstanceOf { .. } => 3,
            Jump { .. } => 4,
            JumpCond { .. } | JumpNotCond { .. } => 5,
            Next { .. } => 2,
            NextJump { .. } => 6,
            Bind { .. } => 3,
            BindSelf { .. } => 2,
            BindDefaults { .. } => 2,
            Call { .. } => 4,
            CallN { .. } => 5,
            CallFun { .. } => 3,
            TailCall { .. } => 3,
            TailCallN { .. } => 4,
            TailCallFun { .. } => 2,
            Return { .. } | Throw { .. } | Yield { .. } => 1,
            Catch { .. } => 5,
            Cancel | Breakpoint => 0,
        }
    }

    /// Encode this instruction to `buf`, little-endian, appending in place.
    pub fn write_to(&self, buf: &mut Vec<u8>) {
        use Instruction::*;
        buf.push(self.opcode() as u8);
        match *self {
            LoadConst { dest, idx } => {
                buf.push(dest);
                buf.extend_from_slice(&idx.to_le_bytes());
            }
            LoadConst8 { dest, idx } => {
                buf.push(dest);
                buf.push(idx);
            }
            LoadFun { dest, idx } => {
                buf.push(dest);
                buf.extend_from_slice(&idx.to_le_bytes());
            }
            LoadFun8 { dest, idx } => {
                buf.push(dest);
                buf.push(idx);
            }
            LoadInt8 { dest, imm } => {
                buf.push(dest);
                buf.push(imm as u8);
            }
            LoadTrue { dest } | LoadFalse { dest } | LoadVoid { dest } | LoadObj { dest } => buf.push(dest),
            LoadArray { dest, size } => {
                buf.push(dest);
                buf.extend_from_slice(&size.to_le_bytes());
            }
            LoadObjProto { dest, proto } => {
                buf.push(dest);
                buf.push(proto);
            }
            LoadIter { dest, src } | Move { dest, src } | GetProto { dest, src } => {
                buf.push(dest);
                buf.push(src);
            }
            GetGlobal { dest, idx } => {
                buf.push(dest);
                buf.extend_from_slice(&idx.to_le_bytes());
            }
            SetGlobal { idx, src } => {
                buf.extend_from_slice(&idx.to_le_bytes());
                buf.push(src);
            }
            GetMod { dest, module_idx } => {
                buf.push(dest);
                buf.extend_from_slice(&module_idx.to_le_bytes());
            }
            GetModElem { dest, module_idx, elem_idx } => {
                buf.push(dest);
                buf.extend_from_slice(&module_idx.to_le_bytes());
                buf.extend_from_slice(&elem_idx.to_le_bytes());
            }
            GetModGlobal { dest, module_idx, global_idx } => {
                buf.push(dest);
                buf.extend_from_slice(&module_idx.to_le_bytes());
                buf.extend_from_slice(&global_idx.to_le_bytes());
            }
            Get { dest, obj, prop } => {
                buf.push(dest);
                buf.push(obj);
                buf.push(prop);
            }
            Set { obj, prop, val } => {
                buf.push(obj);
                buf.push(prop);
                buf.push(val);
            }
            GetElem { dest, obj, idx } => {
                buf.push(dest);
                buf.push(obj);
                buf.extend_from_slice(&idx.to_le_bytes());
            }
            GetElem8 { dest, obj, idx } => {
                buf.push(dest);
                buf.push(obj);
                buf.push(idx as u8);
            }
            GetProp8 { dest, obj, str_idx } => {
                buf.push(dest);
                buf.push(obj);
                buf.push(str_idx);
            }
            GetRange { dest, obj, begin, end } => {
                buf.push(dest);
                buf.push(obj);
                buf.push(begin);
                buf.push(end);
            }
            SetElem { obj, idx, val } => {
                buf.push(obj);
                buf.extend_from_slice(&idx.to_le_bytes());
                buf.push(val);
            }
            SetElem8 { obj, idx, val } => {
                buf.push(obj);
                buf.push(idx as u8);
                buf.push(val);
            }
            SetProp8 { obj, str_idx, val } => {
                buf.push(obj);
                buf.push(str_idx);
                buf.push(val);
            }
            Del { obj, prop } => {
                buf.push(obj);
                buf.push(prop);
            }
            DelProp8 { obj, str_idx } => {
                buf.push(obj);
                buf.push(str_idx);
            }
            Push { arr, val } | PushEx { arr, val } => {
                buf.push(arr);
                buf.push(val);
            }
            Add { dest, a, b } | Sub { dest, a, b } | Mul { dest, a, b } | Div { dest, a, b } | Mod { dest, a, b }
            | And { dest, a, b } | Or { dest, a, b } | Xor { dest, a, b } | Shl { dest, a, b } | Shr { dest, a, b }
            | Shru { dest, a, b } | CmpEq { dest, a, b } | CmpNe { dest, a, b } | CmpLe { dest, a, b }
            | CmpLt { dest, a, b } => {
                buf.push(dest);
                buf.push(a);
                buf.push(b);
            }
            InstanceOf { dest, a, class } => {
                buf.push(dest);
                buf.push(a);
                buf.push(class);
            }
            HasDp { dest, obj, prop } | HasSh { dest, obj, prop } => {
                buf.push(dest);
                buf.push(obj);
                buf.push(prop);
            }
            Not { dest, a } | Type { dest, a } => {
                buf.push(dest);
                buf.push(a);
            }
            HasDpProp8 { dest, obj, str_idx } | HasShProp8 { dest, obj, str_idx } => {
                buf.push(dest);
                buf.push(obj);
                buf.push(str_idx);
            }
            Jump { delta } => buf.extend_from_slice(&delta.to_le_bytes()),
            JumpCond { cond, delta } | JumpNotCond { cond, delta } => {
                buf.push(cond);
                buf.extend_from_slice(&delta.to_le_bytes());
            }
            Next { dest, iter } => {
                buf.push(dest);
                buf.push(iter);
            }
            NextJump { dest, iter, delta } => {
                buf.push(dest);
                buf.push(iter);
                buf.extend_from_slice(&delta.to_le_bytes());
            }
            Bind { fun, slot, src } => {
                buf.push(fun);
                buf.push(slot);
                buf.push(src);
            }
            BindSelf { fun, slot } => {
                buf.push(fun);
                buf.push(slot);
            }
            BindDefaults { fun, defaults } => {
                buf.push(fun);
                buf.push(defaults);
            }
            Call { dest, func, args, num_args } => {
                buf.push(dest);
                buf.push(func);
                buf.push(args);
                buf.push(num_args);
            }
            CallN { dest, func, this, args, num_args } => {
                buf.push(dest);
                buf.push(func);
                buf.push(this);
                buf.push(args);
                buf.push(num_args);
            }
            CallFun { dest, func, args_array } => {
                buf.push(dest);
                buf.push(func);
                buf.push(args_array);
            }
            TailCall { func, args, num_args } => {
                buf.push(func);
                buf.push(args);
                buf.push(num_args);
            }
            TailCallN { func, this, args, num_args } => {
                buf.push(func);
                buf.push(this);
                buf.push(args);
                buf.push(num_args);
            }
            TailCallFun { func, args_array } => {
                buf.push(func);
                buf.push(args_array);
            }
            Return { val } | Throw { val } | Yield { val } => buf.push(val),
            Catch { dest, delta } => {
                buf.push(dest);
                buf.extend_from_slice(&delta.to_le_bytes());
            }
            Cancel | Breakpoint => {}
        }
    }

    /// Decode one instruction starting at `bytes[0]`, returning it along with
    /// the number of bytes consumed.
    pub fn read_from(bytes: &[u8]) -> Result<(Instruction, usize), DecodeError> {
        let op_byte = *bytes.first().ok_or(DecodeError::Truncated)?;
        let op = Opcode::from_byte(op_byte).ok_or(DecodeError::InvalidOpcode(op_byte))?;
        let rest = &bytes[1..];

        macro_rules! need {
            ($n:expr) => {
                if rest.len() < $n {
                    return Err(DecodeError::Truncated);
                }
            };
        }
        macro_rules! u16_at {
            ($off:expr) => {
                u16::from_le_bytes([rest[$off], rest[$off + 1]])
            };
        }
        macro_rules! u32_at {
            ($off:expr) => {
                u32::from_le_bytes([rest[$off], rest[$off + 1], rest[$off + 2], rest[$off + 3]])
            };
        }
        macro_rules! i32_at {
            ($off:expr) => {
                i32::from_le_bytes([rest[$off], rest[$off + 1], rest[$off + 2], rest[$off + 3]])
            };
        }

        let inst = match op {
            Opcode::LoadConst => {
                need!(3);
                Instruction::LoadConst { dest: rest[0], idx: u16_at!(1) }
            }
            Opcode::LoadConst8 => {
                need!(2);
                Instruction::LoadConst8 { dest: rest[0], idx: rest[1] }
            }
            Opcode::LoadFun => {
                need!(3);
                Instruction::LoadFun { dest: rest[0], idx: u16_at!(1) }
            }
            Opcode::LoadFun8 => {
                need!(2);
                Instruction::LoadFun8 { dest: rest[0], idx: rest[1] }
            }
            Opcode::LoadInt8 => {
                need!(2);
                Instruction::LoadInt8 { dest: rest[0], imm: rest[1] as i8 }
            }
            Opcode::LoadTrue => {
                need!(1);
                Instruction::LoadTrue { dest: rest[0] }
            }
            Opcode::LoadFalse => {
                need!(1);
                Instruction::LoadFalse { dest: rest[0] }
            }
            Opcode::LoadVoid => {
                need!(1);
                Instruction::LoadVoid { dest: rest[0] }
            }
            Opcode::LoadArray => {
                need!(5);
                Instruction::LoadArray { dest: rest[0], size: u32_at!(1) }
            }
            Opcode::LoadObj => {
                need!(1);
                Instruction::LoadObj { dest: rest[0] }
            }
            Opcode::LoadObjProto => {
                need!(2);
                Instruction::LoadObjProto { dest: rest[0], proto: rest[1] }
            }
            Opcode::LoadIter => {
                need!(2);
                Instruction::LoadIter { dest: rest[0], src: rest[1] }
            }
            Opcode::Move => {
                need!(2);
                Instruction::Move { dest: rest[0], src: rest[1] }
            }
            Opcode::GetProto => {
                need!(2);
                Instruction::GetProto { dest: rest[0], src: rest[1] }
            }
            Opcode::GetGlobal => {
                need!(5);
                Instruction::GetGlobal { dest: rest[0], idx: u32_at!(1) }
            }
            Opcode::SetGlobal => {
                need!(5);
                Instruction::SetGlobal { idx: u32_at!(0), src: rest[4] }
            }
            Opcode::GetMod => {
                need!(3);
                Instruction::GetMod { dest: rest[0], module_idx: u16_at!(1) }
            }
            Opcode::GetModElem => {
                need!(7);
                Instruction::GetModElem { dest: rest[0], module_idx: u16_at!(1), elem_idx: u32_at!(3) }
            }
            Opcode::GetModGlobal => {
                need!(7);
                Instruction::GetModGlobal { dest: rest[0], module_idx: u16_at!(1), global_idx: u32_at!(3) }
            }
            Opcode::Get => {
                need!(3);
                Instruction::Get { dest: rest[0], obj: rest[1], prop: rest[2] }
            }
            Opcode::GetElem => {
                need!(6);
                Instruction::GetElem { dest: rest[0], obj: rest[1], idx: i32_at!(2) }
            }
            Opcode::GetElem8 => {
                need!(3);
                Instruction::GetElem8 { dest: rest[0], obj: rest[1], idx: rest[2] as i8 }
            }
            Opcode::GetProp8 => {
                need!(3);
                Instruction::GetProp8 { dest: rest[0], obj: rest[1], str_idx: rest[2] }
            }
            Opcode::GetRange => {
                need!(4);
                Instruction::GetRange { dest: rest[0], obj: rest[1], begin: rest[2], end: rest[3] }
            }
            Opcode::Set => {
                need!(3);
                Instruction::Set { obj: rest[0], prop: rest[1], val: rest[2] }
            }
            Opcode::SetElem => {
                need!(6);
                Instruction::SetElem { obj: rest[0], idx: i32_at!(1), val: rest[5] }
            }
            Opcode::SetElem8 => {
                need!(3);
                Instruction::SetElem8 { obj: rest[0], idx: rest[1] as i8, val: rest[2] }
            }
            Opcode::SetProp8 => {
                need!(3);
                Instruction::SetProp8 { obj: rest[0], str_idx: rest[1], val: rest[2] }
            }
            Opcode::Del => {
                need!(2);
                Instruction::Del { obj: rest[0], prop: rest[1] }
            }
            Opcode::DelProp8 => {
                need!(2);
                Instruction::DelProp8 { obj: rest[0], str_idx: rest[1] }
            }
            Opcode::Push => {
                need!(2);
                Instruction::Push { arr: rest[0], val: rest[1] }
            }
            Opcode::PushEx => {
                need!(2);
                Instruction::PushEx { arr: rest[0], val: rest[1] }
            }
            Opcode::Add => {
                need!(3);
                Instruction::Add { dest: rest[0], a: rest[1], b: rest[2] }
            }
            Opcode::Sub => {
                need!(3);
                Instruction::Sub { dest: rest[0], a: rest[1], b: rest[2] }
            }
            Opcode::Mul => {
                need!(3);
                Instruction::Mul { dest: rest[0], a: rest[1], b: rest[2] }
            }
            Opcode::Div => {
                need!(3);
                Instruction::Div { dest: rest[0], a: rest[1], b: rest[2] }
            }
            Opcode::Mod => {
                need!(3);
                Instruction::Mod { dest: rest[0], a: rest[1], b: rest[2] }
            }
            Opcode::Not => {
                need!(2);
                Instruction::Not { dest: rest[0], a: rest[1] }
            }
            Opcode::And => {
                need!(3);
                Instruction::And { dest: rest[0], a: rest[1], b: rest[2] }
            }
            Opcode::Or => {
                need!(3);
                Instruction::Or { dest: rest[0], a: rest[1], b: rest[2] }
            }
            Opcode::Xor => {
                need!(3);
                Instruction::Xor { dest: rest[0], a: rest[1], b: rest[2] }
            }
            Opcode::Shl => {
                need!(3);
                Instruction::Shl { dest: rest[0], a: rest[1], b: rest[2] }
            }
            Opcode::Shr => {
                need!(3);
                Instruction::Shr { dest: rest[0], a: rest[1], b: rest[2] }
            }
            Opcode::Shru => {
                need!(3);
                Instruction::Shru { dest: rest[0], a: rest[1], b: rest[2] }
            }
            Opcode::Type => {
                need!(2);
                Instruction::Type { dest: rest[0], a: rest[1] }
            }
            Opcode::CmpEq => {
                need!(3);
                Instruction::CmpEq { dest: rest[0], a: rest[1], b: rest[2] }
            }
            Opcode::CmpNe => {
                need!(3);
                Instruction::CmpNe { dest: rest[0], a: rest[1], b: rest[2] }
            }
            Opcode::CmpLe => {
                need!(3);
                Instruction::CmpLe { dest: rest[0], a: rest[1], b: rest[2] }
            }
            Opcode::CmpLt => {
                need!(3);
                Instruction::CmpLt { dest: rest[0], a: rest[1], b: rest[2] }
            }
            Opcode::HasDp => {
                need!(3);
                Instruction::HasDp { dest: rest[0], obj: rest[1], prop: rest[2] }
            }
            Opcode::HasDpProp8 => {
                need!(3);
                Instruction::HasDpProp8 { dest: rest[0], obj: rest[1], str_idx: rest[2] }
            }
            Opcode::HasSh => {
                need!(3);
                Instruction::HasSh { dest: rest[0], obj: rest[1], prop: rest[2] }
            }
            Opcode::HasShProp8 => {
                need!(3);
                Instruction::HasShProp8 { dest: rest[0], obj: rest[1], str_idx: rest[2] }
            }
            Opcode::InstanceOf => {
                need!(3);
                Instruction::InstanceOf { dest: rest[0], a: rest[1], class: rest[2] }
            }
            Opcode::Jump => {
                need!(4);
                Instruction::Jump { delta: i32_at!(0) }
            }
            Opcode::JumpCond => {
                need!(5);
                Instruction::JumpCond { cond: rest[0], delta: i32_at!(1) }
            }
            Opcode::JumpNotCond => {
                need!(5);
                Instruction::JumpNotCond { cond: rest[0], delta: i32_at!(1) }
            }
            Opcode::Next => {
                need!(2);
                Instruction::Next { dest: rest[0], iter: rest[1] }
            }
            Opcode::NextJump => {
                need!(6);
                Instruction::NextJump { dest: rest[0], iter: rest[1], delta: i32_at!(2) }
            }
            Opcode::Bind => {
                need!(3);
                Instruction::Bind { fun: rest[0], slot: rest[1], src: rest[2] }
            }
            Opcode::BindSelf => {
                need!(2);
                Instruction::BindSelf { fun: rest[0], slot: rest[1] }
            }
            Opcode::BindDefaults => {
                need!(2);
                Instruction::BindDefaults { fun: rest[0], defaults: rest[1] }
            }
            Opcode::Call => {
                need!(4);
                Instruction::Call { dest: rest[0], func: rest[1], args: rest[2], num_args: rest[3] }
            }
            Opcode::CallN => {
                need!(5);
                Instruction::CallN { dest: rest[0], func: rest[1], this: rest[2], args: rest[3], num_args: rest[4] }
            }
            Opcode::CallFun => {
                need!(3);
                Instruction::CallFun { dest: rest[0], func: rest[1], args_array: rest[2] }
            }
            Opcode::TailCall => {
                need!(3);
                Instruction::TailCall { func: rest[0], args: rest[1], num_args: rest[2] }
            }
            Opcode::TailCallN => {
                need!(4);
                Instruction::TailCallN { func: rest[0], this: rest[1], args: rest[2], num_args: rest[3] }
            }
            Opcode::TailCallFun => {
                need!(2);
                Instruction::TailCallFun { func: rest[0], args_array: rest[1] }
            }
            Opcode::Return => {
                need!(1);
                Instruction::Return { val: rest[0] }
            }
            Opcode::Yield => {
                need!(1);
                Instruction::Yield { val: rest[0] }
            }
            Opcode::Throw => {
                need!(1);
                Instruction::Throw { val: rest[0] }
            }
            Opcode::Catch => {
                need!(5);
                Instruction::Catch { dest: rest[0], delta: i32_at!(1) }
            }
            Opcode::Cancel => Instruction::Cancel,
            Opcode::Breakpoint => Instruction::Breakpoint,
        };

        Ok((inst, 1 + inst.operands_len()))
    }

    /// Registers read by this instruction and not written, collected for
    /// tooling (e.g. a future liveness pass); order is not significant.
    pub fn read_regs(&self) -> SmallVec<[Reg; 4]> {
        use Instruction::*;
        let mut v = SmallVec::new();
        match *self {
            Move { src, .. } | GetProto { src, .. } | LoadIter { src, .. } => v.push(src),
            Get { obj, prop, .. } => {
                v.push(obj);
                v.push(prop);
            }
            Set { obj, prop, val } => {
                v.push(obj);
                v.push(prop);
                v.push(val);
            }
            Add { a, b, .. } | Sub { a, b, .. } | Mul { a, b, .. } | Div { a, b, .. } | Mod { a, b, .. }
            | And { a, b, .. } | Or { a, b, .. } | Xor { a, b, .. } | Shl { a, b, .. } | Shr { a, b, .. }
            | Shru { a, b, .. } | CmpEq { a, b, .. } | CmpNe { a, b, .. } | CmpLe { a, b, .. } | CmpLt { a, b, .. } => {
                v.push(a);
                v.push(b);
            }
            Not { a, .. } | Type { a, .. } => v.push(a),
            _ => {}
        }
        v
    }
}
