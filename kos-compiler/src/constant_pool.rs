//! Constant pool (§4.2): dedups integers, floats and strings, and assigns
//! dense indices to function and class-prototype constants that are never
//! deduplicated.
//!
//! The dedup-by-lookup-map-plus-insertion-order-vec shape follows
//! `cranelift_codegen::ir::constant::ConstantPool`: a forward map from value
//! to handle for the insert-or-reuse check, and a plain `Vec` that *is* the
//! insertion order, so serialization never needs a second pass to recover it.

use std::collections::HashMap;

use kos_bytecode::{ConstRecord, FunctionHeader, StringEscapeMode};

use crate::error::{CompileError, CompileErrorKind, Pos};

/// An index into the pool, dense and stable once assigned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ConstIdx(pub u32);

/// Implementation ceiling so a `LOAD_CONST` 16-bit index field never overflows;
/// real-world modules sit far below this.
pub const MAX_CONSTANTS: usize = 1 << 20;

#[derive(Default)]
pub struct ConstantPool {
    records: Vec<ConstRecord>,
    ints: HashMap<i64, u32>,
    floats: HashMap<u64, u32>,
    no_escape_strings: HashMap<Vec<u8>, u32>,
    with_escape_strings: HashMap<Vec<u8>, u32>,
}

impl ConstantPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> &[ConstRecord] {
        &self.records
    }

    fn push(&mut self, pos: Pos, record: ConstRecord) -> Result<ConstIdx, CompileError> {
        if self.records.len() >= MAX_CONSTANTS {
            return Err(CompileError::new(pos, CompileErrorKind::TooManyConstants));
        }
        let idx = ConstIdx(self.records.len() as u32);
        self.records.push(record);
        Ok(idx)
    }

    /// Intern an integer. Callers are expected to only call this for values
    /// outside `-128..=127`; small integers are emitted with `LOAD_INT8`
    /// instead and never touch the pool (see `kos_compiler::emitter`).
    pub fn intern_int(&mut self, pos: Pos, value: i64) -> Result<ConstIdx, CompileError> {
        if let Some(&idx) = self.ints.get(&value) {
            return Ok(ConstIdx(idx));
        }
        let idx = self.push(pos, ConstRecord::Integer(value))?;
        self.ints.insert(value, idx.0);
        Ok(idx)
    }

    /// Intern a float. Compared by raw bit pattern, so `-0.0` and `+0.0`
    /// (and any two differently-rounded NaNs) are distinct constants.
    pub fn intern_float(&mut self, pos: Pos, value: f64) -> Result<ConstIdx, CompileError> {
        let bits = value.to_bits();
        if let Some(&idx) = self.floats.get(&bits) {
            return Ok(ConstIdx(idx));
        }
        let idx = self.push(pos, ConstRecord::Float(value))?;
        self.floats.insert(bits, idx.0);
        Ok(idx)
    }

    /// Intern a string. A no-escape intern of bytes that already exist as a
    /// with-escape entry narrows that entry to no-escape in place (the
    /// narrower interpretation wins) rather than allocating a new slot.
    pub fn intern_string(
        &mut self,
        pos: Pos,
        bytes: &[u8],
        mode: StringEscapeMode,
    ) -> Result<ConstIdx, CompileError> {
        match mode {
            StringEscapeMode::NoEscape => {
                if let Some(&idx) = self.no_escape_strings.get(bytes) {
                    return Ok(ConstIdx(idx));
                }
                if let Some(idx) = self.with_escape_strings.remove(bytes) {
                    if let ConstRecord::String { escape_mode, .. } = &mut self.records[idx as usize] {
                        *escape_mode = StringEscapeMode::NoEscape;
                    }
                    self.no_escape_strings.insert(bytes.to_vec(), idx);
                    return Ok(ConstIdx(idx));
                }
                let idx = self.push(
                    pos,
                    ConstRecord::String { bytes: bytes.to_vec(), escape_mode: StringEscapeMode::NoEscape },
                )?;
                self.no_escape_strings.insert(bytes.to_vec(), idx.0);
                Ok(idx)
            }
            StringEscapeMode::WithEscape => {
                if let Some(&idx) = self.with_escape_strings.get(bytes) {
                    return Ok(ConstIdx(idx));
                }
                let idx = self.push(
                    pos,
                    ConstRecord::String { bytes: bytes.to_vec(), escape_mode: StringEscapeMode::WithEscape },
                )?;
                self.with_escape_strings.insert(bytes.to_vec(), idx.0);
                Ok(idx)
            }
        }
    }

    /// Reserve a slot for a function constant whose header isn't finished
    /// yet (the synthesizer fills register counts and bytecode ranges in
    /// only after the body has been emitted).
    pub fn reserve_function(&mut self, pos: Pos) -> Result<ConstIdx, CompileError> {
        self.push(pos, ConstRecord::Function(FunctionHeader::new(0)))
    }

    pub fn set_function(&mut self, idx: ConstIdx, header: FunctionHeader) {
        self.records[idx.0 as usize] = ConstRecord::Function(header);
    }

    pub fn function(&self, idx: ConstIdx) -> &FunctionHeader {
        match &self.records[idx.0 as usize] {
            ConstRecord::Function(h) => h,
            _ => panic!("constant {idx:?} is not a function"),
        }
    }

    /// Intern a fresh prototype placeholder. Never deduplicated: each class
    /// literal gets its own prototype identity even if two classes happen
    /// to produce byte-identical bodies.
    pub fn intern_prototype(&mut self, pos: Pos) -> Result<ConstIdx, CompileError> {
        self.push(pos, ConstRecord::Prototype)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pos() -> Pos {
        Pos::new(1, 1)
    }

    #[test]
    fn integers_and_floats_dedup_by_value() {
        let mut pool = ConstantPool::new();
        let a = pool.intern_int(pos(), 1000).unwrap();
        let b = pool.intern_int(pos(), 1000).unwrap();
        assert_eq!(a, b);
        let c = pool.intern_int(pos(), -1000).unwrap();
        assert_ne!(a, c);
    }

    #[test]
    fn negative_and_positive_zero_float_are_distinct() {
        let mut pool = ConstantPool::new();
        let pos_zero = pool.intern_float(pos(), 0.0).unwrap();
        let neg_zero = pool.intern_float(pos(), -0.0).unwrap();
        assert_ne!(pos_zero, neg_zero);
    }

    #[test]
    fn no_escape_intern_narrows_an_existing_with_escape_entry() {
        let mut pool = ConstantPool::new();
        let escaped = pool.intern_string(pos(), b"hi\n", StringEscapeMode::WithEscape).unwrap();
        let raw = pool.intern_string(pos(), b"hi\n", StringEscapeMode::NoEscape).unwrap();
        assert_eq!(escaped, raw, "no-escape intern reuses and narrows the existing slot");
        match &pool.records()[raw.0 as usize] {
            ConstRecord::String { escape_mode, .. } => assert_eq!(*escape_mode, StringEscapeMode::NoEscape),
            _ => panic!("expected a string record"),
        }
    }

    #[test]
    fn with_escape_intern_does_not_merge_into_an_existing_no_escape_entry() {
        let mut pool = ConstantPool::new();
        let raw = pool.intern_string(pos(), b"hi", StringEscapeMode::NoEscape).unwrap();
        let escaped = pool.intern_string(pos(), b"hi", StringEscapeMode::WithEscape).unwrap();
        assert_ne!(raw, escaped);
    }

    #[test]
    fn prototypes_are_never_deduplicated() {
        let mut pool = ConstantPool::new();
        let a = pool.intern_prototype(pos()).unwrap();
        let b = pool.intern_prototype(pos()).unwrap();
        assert_ne!(a, b);
    }
}
