//! Wire format for the Kos bytecode: the opcode table, instruction
//! encoding/decoding, function-constant headers, address-to-line tables and
//! a small disassembler.
//!
//! This crate knows nothing about how code gets generated (`kos-compiler`)
//! or executed (`kos-vm`); it is the shared contract between them, the way
//! `cranelift-codegen`'s `ir` types sit underneath its `binemit` encoder in
//! the Cranelift stack this workspace is modeled on.

pub mod const_record;
pub mod disasm;
pub mod error;
pub mod function_header;
pub mod instruction;
pub mod line_table;
pub mod opcode;

pub use const_record::{ConstRecord, StringEscapeMode};
pub use error::DecodeError;
pub use function_header::{FunctionFlags, FunctionHeader, LoadSelector};
pub use instruction::{Instruction, OperandKind, Reg, KOS_NO_REG};
pub use line_table::{LineEntry, LineTable};
pub use opcode::Opcode;
