//! Runtime value representation (§3 Data Model: "Function value (runtime)"
//! and the object/array/buffer roots the interpreter exposes to the
//! otherwise out-of-scope standard library).
//!
//! One context runs on one thread (§5), so heap objects are `Rc<RefCell<_>>`
//! rather than `Arc<Mutex<_>>` — there is no cross-thread sharing to guard
//! against, only the aliasing `RefCell` already catches.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::function::FunctionValue;

pub type RcStr = Rc<str>;

/// A property slot: either a plain value or a getter/setter accessor pair —
/// the "dynamic property" the glossary describes, recognized by `GET`/`GET_PROP8`
/// at read time and invoked as a script call with `this` bound to the holder.
#[derive(Clone)]
pub enum PropSlot {
    Value(Value),
    Accessor { getter: Option<Value>, setter: Option<Value> },
}

#[derive(Default)]
pub struct Object {
    pub proto: Option<Value>,
    pub props: HashMap<RcStr, PropSlot>,
}

impl Object {
    pub fn with_proto(proto: Option<Value>) -> Self {
        Object { proto, props: HashMap::new() }
    }

    /// Own-property lookup only — backs `HAS_SH`/`HAS_SH_PROP8` (`in`).
    pub fn has_own(&self, name: &str) -> bool {
        self.props.contains_key(name)
    }

    /// Walks the prototype chain — backs `HAS_DP`/`HAS_DP_PROP8` (`propertyof`)
    /// and plain property reads.
    pub fn has_deep(&self, name: &str) -> bool {
        if self.props.contains_key(name) {
            return true;
        }
        match &self.proto {
            Some(Value::Object(o)) => o.borrow().has_deep(name),
            _ => false,
        }
    }

    /// Find the slot for `name`, searching own properties then the
    /// prototype chain. Returns the slot cloned (slots are cheap: a `Value`
    /// clone or two `Option<Value>` clones).
    pub fn lookup(&self, name: &str) -> Option<PropSlot> {
        if let Some(slot) = self.props.get(name) {
            return Some(slot.clone());
        }
        match &self.proto {
            Some(Value::Object(o)) => o.borrow().lookup(name),
            _ => None,
        }
    }
}

#[derive(Clone)]
pub enum Value {
    Void,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(RcStr),
    Array(Rc<RefCell<Vec<Value>>>),
    Buffer(Rc<RefCell<Vec<u8>>>),
    Object(Rc<RefCell<Object>>),
    Function(Rc<FunctionValue>),
    /// The iterator protocol's cursor, produced by `LOAD_ITER` and consumed
    /// by `NEXT`/`NEXT_JUMP`. The VM only needs to know intrinsically how to
    /// iterate the handful of built-in container types (§1); anything richer
    /// is the (out-of-scope) standard library's job.
    Iterator(Rc<RefCell<KosIter>>),
}

/// Cursor state for the built-in iterable kinds. Exhausted once `next`
/// returns `None`; `NEXT` on an exhausted iterator raises `GeneratorEnd`-like
/// behavior is the caller's job (see `crate::interpreter`), not this type's.
pub enum KosIter {
    Array(Rc<RefCell<Vec<Value>>>, usize),
    Str(RcStr, usize),
    /// Snapshot of an object's own keys at `LOAD_ITER` time, each yielded as
    /// a two-element `[key, value]` array.
    Object(Rc<RefCell<Object>>, Vec<RcStr>, usize),
}

impl KosIter {
    pub fn next(&mut self) -> Option<Value> {
        match self {
            KosIter::Array(arr, idx) => {
                let v = arr.borrow().get(*idx).cloned();
                if v.is_some() {
                    *idx += 1;
                }
                v
            }
            KosIter::Str(s, idx) => {
                let ch = s.chars().nth(*idx)?;
                *idx += 1;
                Some(Value::str(ch.to_string()))
            }
            KosIter::Object(obj, keys, idx) => {
                let key = keys.get(*idx)?.clone();
                *idx += 1;
                let value = obj.borrow().props.get(&key).map(|slot| match slot {
                    PropSlot::Value(v) => v.clone(),
                    PropSlot::Accessor { .. } => Value::Void,
                });
                Some(Value::array(vec![Value::Str(key), value.unwrap_or(Value::Void)]))
            }
        }
    }
}

impl Value {
    pub fn str(s: impl Into<Rc<str>>) -> Value {
        Value::Str(s.into())
    }

    pub fn array(items: Vec<Value>) -> Value {
        Value::Array(Rc::new(RefCell::new(items)))
    }

    pub fn object(proto: Option<Value>) -> Value {
        Value::Object(Rc::new(RefCell::new(Object::with_proto(proto))))
    }

    /// The fixed type-tag string `TYPE` returns, matching
    /// `kos_compiler::expr::is_known_type_name`'s set exactly.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Void => "void",
            Value::Bool(_) => "boolean",
            Value::Int(_) => "integer",
            Value::Float(_) => "float",
            Value::Str(_) => "string",
            Value::Array(_) => "array",
            Value::Buffer(_) => "buffer",
            Value::Object(_) => "object",
            Value::Function(f) => {
                if f.header.flags.is_class() {
                    "class"
                } else {
                    "function"
                }
            }
            Value::Iterator(_) => "object",
        }
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Void => false,
            Value::Bool(b) => *b,
            Value::Int(i) => *i != 0,
            Value::Float(f) => *f != 0.0,
            Value::Str(s) => !s.is_empty(),
            Value::Array(a) => !a.borrow().is_empty(),
            Value::Buffer(b) => !b.borrow().is_empty(),
            Value::Object(_) | Value::Function(_) | Value::Iterator(_) => true,
        }
    }
}

impl std::fmt::Debug for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Void => write!(f, "void"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(x) => write!(f, "{x}"),
            Value::Str(s) => write!(f, "{s:?}"),
            Value::Array(a) => write!(f, "array[{}]", a.borrow().len()),
            Value::Buffer(b) => write!(f, "buffer[{}]", b.borrow().len()),
            Value::Object(_) => write!(f, "object"),
            Value::Function(fun) => write!(f, "function({})", fun.header.name_str_idx),
            Value::Iterator(_) => write!(f, "iterator"),
        }
    }
}
