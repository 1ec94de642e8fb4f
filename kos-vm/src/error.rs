//! Runtime errors (§7): conditions the interpreter raises as script-level
//! exceptions, catchable by `try`/`catch`, distinct from `kos_bytecode::DecodeError`
//! (malformed bytes) and `kos_compiler::CompileError` (rejected source).

use thiserror::Error;

use crate::value::Value;

/// A runtime condition the interpreter raises. Carries enough to format a
/// message; the interpreter turns it into an [`Exception`] by stringifying
/// it into a thrown `Value::Str`, the same path a script's own `throw "..."`
/// takes.
#[derive(Debug, Error, Clone)]
pub enum RuntimeErrorKind {
    #[error("function arguments must be an array")]
    ArgsNotArray,
    #[error("function is not a generator")]
    CannotYield,
    #[error("corrupted default argument array")]
    CorruptedDefaults,
    #[error("division by zero")]
    DivisionByZero,
    #[error("integer division overflow")]
    DivisionOverflow,
    #[error("generator is already running")]
    GeneratorRunning,
    #[error("value is not a generator")]
    NotGenerator,
    /// Swallowed by `NEXT_JUMP`-driven loops; surfaces to the caller of a
    /// bare `NEXT` unless caught (§7 Policy).
    #[error("generator has no more values")]
    GeneratorEnd,
    #[error("invalid byte value {0}")]
    InvalidByteValue(i64),
    #[error("index {0} out of range")]
    InvalidIndex(i64),
    #[error("invalid instruction")]
    InvalidInstruction,
    #[error("function does not accept named arguments")]
    NamedArgsNotSupported,
    #[error("property {0:?} has no setter")]
    NoSetter(String),
    #[error("value of type {0} is not callable")]
    NotCallable(&'static str),
    #[error("value of type {0} is not a class")]
    NotClass(&'static str),
    #[error("value of type {0} is not indexable")]
    NotIndexable(&'static str),
    #[error("slice target has no `slice` method")]
    SliceNotFunction,
    #[error("too few arguments: need at least {needed}, got {got}")]
    TooFewArgs { needed: u8, got: usize },
    #[error("unsupported operand types {0} and {1}")]
    UnsupportedOperandTypes(&'static str, &'static str),
    #[error("invalid function parameter {0:?}")]
    InvalidFunctionParameter(String),
    #[error("missing function parameter {0:?}")]
    MissingFunctionParameter(String),
    #[error("stack overflow")]
    StackOverflow,
    #[error("try/catch nesting exceeded the supported depth")]
    CatchNestingTooDeep,
    #[error("value of type {0} is not iterable")]
    NotIterable(&'static str),
}

/// A value in flight during exception unwinding: either a script `throw`'d
/// value directly, or a runtime error stringified the same way a native
/// `throw` of its message would be.
#[derive(Debug, Clone)]
pub struct Exception(pub Value);

impl Exception {
    pub fn from_kind(kind: RuntimeErrorKind) -> Self {
        Exception(Value::str(kind.to_string()))
    }

    pub fn value(self) -> Value {
        self.0
    }
}

impl From<RuntimeErrorKind> for Exception {
    fn from(kind: RuntimeErrorKind) -> Self {
        Exception::from_kind(kind)
    }
}

pub type VmResult<T> = Result<T, Exception>;
