//! Errors produced while decoding a serialized bytecode buffer.
//!
//! These are distinct from the compiler's own `CompileError` (in
//! `kos-compiler`) and the VM's `Exception` (in `kos-vm`): this crate only
//! ever fails on malformed *bytes*, never on a language-level condition.

use thiserror::Error;

/// Failure while decoding an instruction, function header, or line table
/// entry from a byte buffer.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum DecodeError {
    /// The buffer ended before a complete instruction could be read.
    #[error("truncated instruction stream")]
    Truncated,
    /// The leading byte did not match any known opcode.
    #[error("invalid opcode byte 0x{0:02x}")]
    InvalidOpcode(u8),
    /// A function header's constant-pool or string-table entry count did not
    /// fit the record.
    #[error("truncated function header")]
    TruncatedHeader,
}
