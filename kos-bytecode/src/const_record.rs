//! On-disk shape of one constant pool entry. `kos_compiler::constant_pool`
//! builds and dedups these; this crate only knows how to serialize them.

use crate::function_header::FunctionHeader;

/// How a string constant's escape sequences were already resolved by the
/// (out-of-scope) lexer. Kept distinct so `\n` inside a literal and a raw
/// two-character backslash-n never collide in the constant pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum StringEscapeMode {
    /// The bytes are the literal string contents; no escapes were present.
    NoEscape,
    /// The bytes are the fully-resolved contents of a string that contained
    /// at least one escape sequence.
    WithEscape,
}

/// One dense, order-preserving slot in a module's constant pool.
#[derive(Debug, Clone, PartialEq)]
pub enum ConstRecord {
    Integer(i64),
    Float(f64),
    String { bytes: Vec<u8>, escape_mode: StringEscapeMode },
    Function(FunctionHeader),
    /// A class's prototype object placeholder; populated at link time, never
    /// deduplicated (see `kos_compiler::constant_pool`).
    Prototype,
}

impl ConstRecord {
    pub fn tag(&self) -> u8 {
        match self {
            ConstRecord::Integer(_) => 0,
            ConstRecord::Float(_) => 1,
            ConstRecord::String { .. } => 2,
            ConstRecord::Function(_) => 3,
            ConstRecord::Prototype => 4,
        }
    }

    pub fn write_to(&self, buf: &mut Vec<u8>) {
        buf.push(self.tag());
        match self {
            ConstRecord::Integer(i) => buf.extend_from_slice(&i.to_le_bytes()),
            ConstRecord::Float(f) => buf.extend_from_slice(&f.to_bits().to_le_bytes()),
            ConstRecord::String { bytes, escape_mode } => {
                buf.push(match escape_mode {
                    StringEscapeMode::NoEscape => 0,
                    StringEscapeMode::WithEscape => 1,
                });
                buf.extend_from_slice(&(bytes.len() as u32).to_le_bytes());
                buf.extend_from_slice(bytes);
            }
            ConstRecord::Function(h) => h.write_to(buf),
            ConstRecord::Prototype => {}
        }
    }
}
