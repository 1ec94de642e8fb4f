//! The function-constant record: the header a [`crate::opcode::Opcode::LoadFun`]
//! site refers to by index, and the interpreter consults on every call.

use crate::error::DecodeError;
use crate::instruction::Reg;

/// Bit flags packed into a function header's single flags byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FunctionFlags(u8);

impl FunctionFlags {
    const IS_CLASS: u8 = 0x01;
    const IS_GENERATOR: u8 = 0x02;
    const IS_CLOSURE: u8 = 0x04;
    const HAS_ELLIPSIS: u8 = 0x08;

    pub const fn empty() -> Self {
        FunctionFlags(0)
    }

    pub const fn from_bits(bits: u8) -> Self {
        FunctionFlags(bits)
    }

    pub const fn bits(self) -> u8 {
        self.0
    }

    pub const fn is_class(self) -> bool {
        self.0 & Self::IS_CLASS != 0
    }
    pub const fn is_generator(self) -> bool {
        self.0 & Self::IS_GENERATOR != 0
    }
    pub const fn is_closure(self) -> bool {
        self.0 & Self::IS_CLOSURE != 0
    }
    pub const fn has_ellipsis(self) -> bool {
        self.0 & Self::HAS_ELLIPSIS != 0
    }

    pub fn set_class(&mut self, v: bool) {
        self.set(Self::IS_CLASS, v);
    }
    pub fn set_generator(&mut self, v: bool) {
        self.set(Self::IS_GENERATOR, v);
    }
    pub fn set_closure(&mut self, v: bool) {
        self.set(Self::IS_CLOSURE, v);
    }
    pub fn set_ellipsis(&mut self, v: bool) {
        self.set(Self::HAS_ELLIPSIS, v);
    }

    fn set(&mut self, bit: u8, v: bool) {
        if v {
            self.0 |= bit;
        } else {
            self.0 &= !bit;
        }
    }
}

/// Which load instruction a call site should use to materialize this
/// function: `LoadConst{,8}` for a plain value, `LoadFun{,8}` when the
/// runtime needs to know up front that this constant is callable (e.g. to
/// preallocate closure storage before any `BIND`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadSelector {
    LoadConst,
    LoadConst8,
    LoadFun,
    LoadFun8,
}

/// A function constant: everything the interpreter needs to set up a call
/// frame and run a function's body, plus the line table for error reporting.
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionHeader {
    /// Index into the string constant table naming this function (empty for anonymous).
    pub name_str_idx: u32,
    /// Count of declared named (non-rest) parameters.
    pub num_named_args: u8,
    /// Count of default-value parameters actually used at any call site
    /// (defaults whose slot was never read get dropped at synth time).
    pub num_used_def_args: u8,
    /// Minimum number of positional arguments a caller must supply.
    pub min_args: u8,
    pub this_reg: Reg,
    pub rest_reg: Reg,
    pub ellipsis_reg: Reg,
    /// First register of the contiguous arguments block.
    pub args_reg: Reg,
    /// First register of the contiguous closure-bindings block.
    pub bind_reg: Reg,
    /// Number of registers this function expects to receive when instantiated via `BIND`.
    pub closure_size: u8,
    pub num_binds: u8,
    pub total_regs: u8,
    pub flags: FunctionFlags,
    pub load_selector: LoadSelector,
    pub bytecode_offset: u32,
    pub bytecode_size: u32,
    pub line_table_offset: u32,
    pub line_table_size: u32,
    pub def_line: u32,
    pub num_instructions: u32,
    /// String-table index of each declared parameter's name, in order.
    pub param_names: Vec<u32>,
}

impl FunctionHeader {
    /// A zero-initialized header for a function with no parameters or binds,
    /// suitable as a starting point for the synthesizer to fill in.
    pub fn new(def_line: u32) -> Self {
        FunctionHeader {
            name_str_idx: 0,
            num_named_args: 0,
            num_used_def_args: 0,
            min_args: 0,
            this_reg: crate::instruction::KOS_NO_REG,
            rest_reg: crate::instruction::KOS_NO_REG,
            ellipsis_reg: crate::instruction::KOS_NO_REG,
            args_reg: crate::instruction::KOS_NO_REG,
            bind_reg: crate::instruction::KOS_NO_REG,
            closure_size: 0,
            num_binds: 0,
            total_regs: 0,
            flags: FunctionFlags::empty(),
            load_selector: LoadSelector::LoadConst,
            bytecode_offset: 0,
            bytecode_size: 0,
            line_table_offset: 0,
            line_table_size: 0,
            def_line,
            num_instructions: 0,
            param_names: Vec::new(),
        }
    }

    /// Whether this header's bytecode range overlaps another's; used to
    /// assert the "non-overlapping function ranges" invariant in tests.
    pub fn overlaps(&self, other: &FunctionHeader) -> bool {
        let a_end = self.bytecode_offset + self.bytecode_size;
        let b_end = other.bytecode_offset + other.bytecode_size;
        self.bytecode_offset < b_end && other.bytecode_offset < a_end
    }

    pub fn write_to(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&self.name_str_idx.to_le_bytes());
        buf.push(self.num_named_args);
        buf.push(self.num_used_def_args);
        buf.push(self.min_args);
        buf.push(self.this_reg);
        buf.push(self.rest_reg);
        buf.push(self.ellipsis_reg);
        buf.push(self.args_reg);
        buf.push(self.bind_reg);
        buf.push(self.closure_size);
        buf.push(self.num_binds);
        buf.push(self.total_regs);
        buf.push(self.flags.bits());
        buf.push(load_selector_tag(self.load_selector));
        buf.extend_from_slice(&self.bytecode_offset.to_le_bytes());
        buf.extend_from_slice(&self.bytecode_size.to_le_bytes());
        buf.extend_from_slice(&self.line_table_offset.to_le_bytes());
        buf.extend_from_slice(&self.line_table_size.to_le_bytes());
        buf.extend_from_slice(&self.def_line.to_le_bytes());
        buf.extend_from_slice(&self.num_instructions.to_le_bytes());
        buf.extend_from_slice(&(self.param_names.len() as u32).to_le_bytes());
        for name in &self.param_names {
            buf.extend_from_slice(&name.to_le_bytes());
        }
    }

    pub fn read_from(bytes: &[u8]) -> Result<(FunctionHeader, usize), DecodeError> {
        const FIXED_LEN: usize = 4 + 9 + 1 + 1 + 4 * 4 + 4;
        if bytes.len() < FIXED_LEN {
            return Err(DecodeError::TruncatedHeader);
        }
        let mut off = 0;
        let rd_u32 = |b: &[u8], o: usize| u32::from_le_bytes([b[o], b[o + 1], b[o + 2], b[o + 3]]);

        let name_str_idx = rd_u32(bytes, off);
        off += 4;
        let num_named_args = bytes[off];
        off += 1;
        let num_used_def_args = bytes[off];
        off += 1;
        let min_args = bytes[off];
        off += 1;
        let this_reg = bytes[off];
        off += 1;
        let rest_reg = bytes[off];
        off += 1;
        let ellipsis_reg = bytes[off];
        off += 1;
        let args_reg = bytes[off];
        off += 1;
        let bind_reg = bytes[off];
        off += 1;
        let closure_size = bytes[off];
        off += 1;
        let num_binds = bytes[off];
        off += 1;
        let total_regs = bytes[off];
        off += 1;
        let flags = FunctionFlags::from_bits(bytes[off]);
        off += 1;
        let load_selector = load_selector_from_tag(bytes[off]).ok_or(DecodeError::TruncatedHeader)?;
        off += 1;
        let bytecode_offset = rd_u32(bytes, off);
        off += 4;
        let bytecode_size = rd_u32(bytes, off);
        off += 4;
        let line_table_offset = rd_u32(bytes, off);
        off += 4;
        let line_table_size = rd_u32(bytes, off);
        off += 4;
        let def_line = rd_u32(bytes, off);
        off += 4;
        let num_instructions = rd_u32(bytes, off);
        off += 4;
        let num_params = rd_u32(bytes, off) as usize;
        off += 4;

        if bytes.len() < off + num_params * 4 {
            return Err(DecodeError::TruncatedHeader);
        }
        let mut param_names = Vec::with_capacity(num_params);
        for _ in 0..num_params {
            param_names.push(rd_u32(bytes, off));
            off += 4;
        }

        Ok((
            FunctionHeader {
                name_str_idx,
                num_named_args,
                num_used_def_args,
                min_args,
                this_reg,
                rest_reg,
                ellipsis_reg,
                args_reg,
                bind_reg,
                closure_size,
                num_binds,
                total_regs,
                flags,
                load_selector,
                bytecode_offset,
                bytecode_size,
                line_table_offset,
                line_table_size,
                def_line,
                num_instructions,
                param_names,
            },
            off,
        ))
    }
}

fn load_selector_tag(sel: LoadSelector) -> u8 {
    match sel {
        LoadSelector::LoadConst => 0,
        LoadSelector::LoadConst8 => 1,
        LoadSelector::LoadFun => 2,
        LoadSelector::LoadFun8 => 3,
    }
}

fn load_selector_from_tag(tag: u8) -> Option<LoadSelector> {
    match tag {
        0 => Some(LoadSelector::LoadConst),
        1 => Some(LoadSelector::LoadConst8),
        2 => Some(LoadSelector::LoadFun),
        3 => Some(LoadSelector::LoadFun8),
        _ => None,
    }
}
