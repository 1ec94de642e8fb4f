//! Compiler back-end (§4): lowers a resolved AST into the bytecode, line
//! table and constant pool [`kos_bytecode`] defines the on-disk shape of.
//!
//! Module layout mirrors the pipeline's dependency order, leaves first:
//! constant pool → register allocator → code emitter → statement/expression
//! lowering → function/class synthesizer, all driven by [`compiler::Compiler`].

pub mod assign;
pub mod ast;
pub mod compiler;
pub mod constant_pool;
pub mod control_flow;
pub mod emitter;
pub mod error;
pub mod expr;
pub mod frame;
pub mod register;
pub mod scope;
pub mod synth;

pub use ast::{
    ArrayElement, BinOp, ClassLiteral, FunctionLiteral, LValue, LogicalOp, Node, NodeKind, ObjectProperty, Param, SwitchCase, UnOp,
};
pub use compiler::{CompiledModule, Compiler};
pub use constant_pool::{ConstIdx, ConstantPool, MAX_CONSTANTS};
pub use error::{CompileError, CompileErrorKind, CompileResult, Pos};
pub use frame::Frame;
pub use register::{RegisterAllocator, MAX_REGISTERS};
pub use scope::{Scope, ScopeArena, ScopeId, Variable, VariableKind, VarId};

use tracing::instrument;

/// Compile one module's top-level statements into bytecode, given the scope
/// arena the (out-of-scope) resolver already built for it.
#[instrument(level = "debug", skip(scopes, program))]
pub fn compile_module(scopes: ScopeArena, module_scope: ScopeId, program: &[Node]) -> CompileResult<CompiledModule> {
    let mut compiler = Compiler::new(scopes);
    let def_line = program.first().map(|n| n.pos.line).unwrap_or(1);
    let body = Node::new(NodeKind::Block(program.to_vec()), Pos::new(def_line, 1));
    compiler.compile_function(module_scope, def_line, &body, |_, _| Ok(()))?;
    Ok(compiler.finish())
}
