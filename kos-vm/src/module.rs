//! Runtime module: the constant pool, globals array and global-name table a
//! loaded function's bytecode indexes into (§3 "Shared resources" / §5).
//!
//! Built once from a [`kos_bytecode::ConstRecord`] slice (typically the
//! output of `kos_compiler::CompiledModule`) by [`Module::load`]; the
//! `kos-compiler` dependency itself stays out of this crate; the `kos` facade
//! crate does that translation.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use kos_bytecode::{ConstRecord, FunctionHeader, StringEscapeMode};

use crate::value::{RcStr, Value};

/// One resolved constant-pool slot. Integers/floats/strings become runtime
/// values directly; functions stay as headers (a `LOAD_FUN`/`LOAD_CONST`
/// materializes a fresh [`crate::function::FunctionValue`] from one on every
/// visit, since closures differ per instantiation — see §3 "Function value").
pub enum Const {
    Integer(i64),
    Float(f64),
    Str(RcStr, StringEscapeMode),
    Function(Rc<FunctionHeader>),
    /// A class's prototype object, created lazily on first reference and
    /// shared by every instance of that function template thereafter.
    Prototype(RefCell<Option<Value>>),
}

pub struct Module {
    pub code: Vec<u8>,
    pub line_data: Vec<u8>,
    pub consts: Vec<Const>,
    pub globals: RefCell<Vec<Value>>,
    pub global_names: HashMap<RcStr, u32>,
}

impl Module {
    /// Build a runtime module from compiled constant records and a
    /// pre-finalized globals layout. `global_names` maps a global's source
    /// name to its slot in `globals`; the module's own top-level code is
    /// expected to populate those slots via `SET_GLOBAL` on first run (§5).
    pub fn load(code: Vec<u8>, line_data: Vec<u8>, records: &[ConstRecord], global_names: HashMap<RcStr, u32>, num_globals: usize) -> Self {
        let consts = records
            .iter()
            .map(|r| match r {
                ConstRecord::Integer(i) => Const::Integer(*i),
                ConstRecord::Float(f) => Const::Float(*f),
                ConstRecord::String { bytes, escape_mode } => {
                    let s = String::from_utf8_lossy(bytes).into_owned();
                    Const::Str(Rc::from(s), *escape_mode)
                }
                ConstRecord::Function(h) => Const::Function(Rc::new(h.clone())),
                ConstRecord::Prototype => Const::Prototype(RefCell::new(None)),
            })
            .collect();
        Module { code, line_data, consts, globals: RefCell::new(vec![Value::Void; num_globals]), global_names }
    }

    pub fn function_header(&self, idx: u32) -> &Rc<FunctionHeader> {
        match &self.consts[idx as usize] {
            Const::Function(h) => h,
            _ => panic!("constant {idx} is not a function"),
        }
    }

    pub fn const_value(&self, idx: u32) -> Value {
        match &self.consts[idx as usize] {
            Const::Integer(i) => Value::Int(*i),
            Const::Float(f) => Value::Float(*f),
            Const::Str(s, _) => Value::Str(s.clone()),
            Const::Function(_) | Const::Prototype(_) => {
                panic!("constant {idx} is not a plain value; use Module::function_header/prototype_of")
            }
        }
    }

    pub fn const_str(&self, idx: u32) -> RcStr {
        match &self.consts[idx as usize] {
            Const::Str(s, _) => s.clone(),
            _ => panic!("constant {idx} is not a string"),
        }
    }

    /// The shared prototype object for a class's `LOAD_OBJ_PROTO`/`prototype`
    /// handling, created on first access.
    pub fn prototype_of(&self, idx: u32) -> Value {
        match &self.consts[idx as usize] {
            Const::Prototype(slot) => {
                let mut slot = slot.borrow_mut();
                slot.get_or_insert_with(|| Value::object(None)).clone()
            }
            _ => panic!("constant {idx} is not a prototype"),
        }
    }

    /// Source line for `code_offset` (relative to this function's own
    /// bytecode, i.e. already subtracted from `header.bytecode_offset`),
    /// looked up in `header`'s slice of the module's shared line-table buffer.
    pub fn line_for(&self, header: &FunctionHeader, code_offset: u32) -> Option<u32> {
        let start = header.line_table_offset as usize;
        let end = start + header.line_table_size as usize;
        let table = kos_bytecode::LineTable::read_from(self.line_data.get(start..end)?);
        table.lookup(code_offset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integers_floats_and_strings_load_as_plain_values() {
        let records = vec![
            ConstRecord::Integer(42),
            ConstRecord::Float(1.5),
            ConstRecord::String { bytes: b"hi".to_vec(), escape_mode: StringEscapeMode::NoEscape },
        ];
        let module = Module::load(Vec::new(), Vec::new(), &records, HashMap::new(), 0);
        assert!(matches!(module.const_value(0), Value::Int(42)));
        assert!(matches!(module.const_value(1), Value::Float(f) if f == 1.5));
        assert_eq!(&*module.const_str(2), "hi");
    }

    #[test]
    fn prototype_constant_is_created_lazily_and_shared() {
        let records = vec![ConstRecord::Prototype];
        let module = Module::load(Vec::new(), Vec::new(), &records, HashMap::new(), 0);
        let first = module.prototype_of(0);
        let second = module.prototype_of(0);
        if let (Value::Object(a), Value::Object(b)) = (first, second) {
            assert!(Rc::ptr_eq(&a, &b));
        } else {
            panic!("expected object prototype");
        }
    }

    #[test]
    fn globals_array_is_sized_and_void_initialized() {
        let module = Module::load(Vec::new(), Vec::new(), &[], HashMap::new(), 3);
        assert_eq!(module.globals.borrow().len(), 3);
        assert!(matches!(module.globals.borrow()[0], Value::Void));
    }
}
