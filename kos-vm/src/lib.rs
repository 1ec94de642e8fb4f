//! Register-based interpreter for Kos bytecode.
//!
//! Modules here mirror the shape of one call: [`value`] is what a register
//! can hold, [`function`] is what gets called, [`call`] resolves arguments
//! into a callee's registers, [`frame`]/[`interpreter`] run the bytecode,
//! [`generator`] and [`exception`] are the two ways a frame can leave early
//! besides an ordinary `RETURN`. [`module`] is the constant pool and globals
//! a function's bytecode indexes into — built from `kos_bytecode::ConstRecord`s
//! without any dependency on how those records were produced, so this crate
//! never needs `kos-compiler` itself; the `kos` facade crate bridges the two.

pub mod alu;
pub mod call;
pub mod error;
pub mod exception;
pub mod frame;
pub mod function;
pub mod generator;
pub mod interpreter;
pub mod module;
pub mod value;

pub use error::{Exception, RuntimeErrorKind, VmResult};
pub use function::FunctionValue;
pub use interpreter::{FrameExit, Interpreter};
pub use module::Module;
pub use value::{Object, PropSlot, Value};
