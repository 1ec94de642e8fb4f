//! The opcode tag. Each variant names one instruction; the operands that
//! accompany it at a particular site live in [`crate::instruction::Instruction`],
//! not here, so the dispatch tables in the interpreter and the operand-layout
//! table in the emitter can both key off this single, fieldless enum.

use core::fmt;

/// One bytecode operation.
///
/// The discriminants are part of the on-disk format: they must not be
/// renumbered without bumping the format version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum Opcode {
    // -- loads --
    LoadConst = 0x00,
    LoadConst8 = 0x01,
    LoadFun = 0x02,
    LoadFun8 = 0x03,
    LoadInt8 = 0x04,
    LoadTrue = 0x05,
    LoadFalse = 0x06,
    LoadVoid = 0x07,
    LoadArray = 0x08,
    LoadObj = 0x09,
    LoadObjProto = 0x0a,
    LoadIter = 0x0b,

    // -- move --
    Move = 0x0c,
    GetProto = 0x0d,

    // -- globals --
    GetGlobal = 0x0e,
    SetGlobal = 0x0f,
    GetMod = 0x10,
    GetModElem = 0x11,
    GetModGlobal = 0x12,

    // -- property / element access --
    Get = 0x13,
    GetElem = 0x14,
    GetElem8 = 0x15,
    GetProp8 = 0x16,
    GetRange = 0x17,
    Set = 0x18,
    SetElem = 0x19,
    SetElem8 = 0x1a,
    SetProp8 = 0x1b,
    Del = 0x1c,
    DelProp8 = 0x1d,
    Push = 0x1e,
    PushEx = 0x1f,

    // -- arithmetic / logical --
    Add = 0x20,
    Sub = 0x21,
    Mul = 0x22,
    Div = 0x23,
    Mod = 0x24,
    Not = 0x25,
    And = 0x26,
    Or = 0x27,
    Xor = 0x28,
    Shl = 0x29,
    Shr = 0x2a,
    Shru = 0x2b,

    // -- comparison / membership --
    Type = 0x2c,
    CmpEq = 0x2d,
    CmpNe = 0x2e,
    CmpLe = 0x2f,
    CmpLt = 0x30,
    HasDp = 0x31,
    HasDpProp8 = 0x32,
    HasSh = 0x33,
    HasShProp8 = 0x34,
    InstanceOf = 0x35,

    // -- control --
    Jump = 0x36,
    JumpCond = 0x37,
    JumpNotCond = 0x38,
    Next = 0x39,
    NextJump = 0x3a,

    // -- binding --
    Bind = 0x3b,
    BindSelf = 0x3c,
    BindDefaults = 0x3d,

    // -- calls --
    Call = 0x3e,
    CallN = 0x3f,
    CallFun = 0x40,
    TailCall = 0x41,
    TailCallN = 0x42,
    TailCallFun = 0x43,

    // -- flow --
    Return = 0x44,
    Yield = 0x45,
    Throw = 0x46,
    Catch = 0x47,
    Cancel = 0x48,
    Breakpoint = 0x49,
}

impl Opcode {
    /// All opcodes, for tests that want to walk the whole set.
    pub const ALL: &'static [Opcode] = &[
        Opcode::LoadConst,
        Opcode::LoadConst8,
        Opcode::LoadFun,
        Opcode::LoadFun8,
        Opcode::LoadInt8,
        Opcode::LoadTrue,
        Opcode::LoadFalse,
        Opcode::LoadVoid,
        Opcode::LoadArray,
        Opcode::LoadObj,
        Opcode::LoadObjProto,
        Opcode::LoadIter,
        Opcode::Move,
        Opcode::GetProto,
        Opcode::GetGlobal,
        Opcode::SetGlobal,
        Opcode::GetMod,
        Opcode::GetModElem,
        Opcode::GetModGlobal,
        Opcode::Get,
        Opcode::GetElem,
        Opcode::GetElem8,
        Opcode::GetProp8,
        Opcode::GetRange,
        Opcode::Set,
        Opcode::SetElem,
        Opcode::SetElem8,
        Opcode::SetProp8,
        Opcode::Del,
        Opcode::DelProp8,
        Opcode::Push,
        Opcode::PushEx,
        Opcode::Add,
        Opcode::Sub,
        Opcode::Mul,
        Opcode::Div,
        Opcode::Mod,
        Opcode::Not,
        Opcode::And,
        Opcode::Or,
        Opcode::Xor,
        Opcode::Shl,
        Opcode::Shr,
        Opcode::Shru,
        Opcode::Type,
        Opcode::CmpEq,
        Opcode::CmpNe,
        Opcode::CmpLe,
        Opcode::CmpLt,
        Opcode::HasDp,
        Opcode::HasDpProp8,
        Opcode::HasSh,
        Opcode::HasShProp8,
        Opcode::InstanceOf,
        Opcode::Jump,
        Opcode::JumpCond,
        Opcode::JumpNotCond,
        Opcode::Next,
        Opcode::NextJump,
        Opcode::Bind,
        Opcode::BindSelf,
        Opcode::BindDefaults,
        Opcode::Call,
        Opcode::CallN,
        Opcode::CallFun,
        Opcode::TailCall,
        Opcode::TailCallN,
        Opcode::TailCallFun,
        Opcode::Return,
        Opcode::Yield,
        Opcode::Throw,
        Opcode::Catch,
        Opcode::Cancel,
        Opcode::Breakpoint,
    ];

    /// Decode a raw opcode byte, as read from a code buffer.
    pub fn from_byte(byte: u8) -> Option<Opcode> {
        // Kept as a linear scan over `ALL` rather than a transmute: the
        // discriminant space is sparse-free today but a transmute would
        // silently start accepting garbage the day it isn't.
        Self::ALL.iter().copied().find(|op| *op as u8 == byte)
    }

    /// True for the three call-like opcodes that do not return control to
    /// the current frame on completion (their callee's `RETURN` resumes the
    /// *caller's* caller, not this site).
    pub const fn is_tail_call(self) -> bool {
        matches!(self, Opcode::TailCall | Opcode::TailCallN | Opcode::TailCallFun)
    }

    /// True for opcodes whose last operand is a relative jump delta.
    pub const fn is_jump(self) -> bool {
        matches!(
            self,
            Opcode::Jump | Opcode::JumpCond | Opcode::JumpNotCond | Opcode::NextJump | Opcode::Catch
        )
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}
