//! Bridges `kos_compiler`'s bytecode output into a `kos_vm` module and runs
//! it. Lexing, parsing and scope resolution stay upstream, out of scope here
//! (see `kos_compiler::compile_module`'s own doc comment) — this crate's job
//! starts once a resolved AST is handed to it, and ends once the resulting
//! bytecode has been executed to a value.

use std::collections::HashMap;
use std::rc::Rc;

use thiserror::Error;

use kos_compiler::{CompileError, CompiledModule, Node, ScopeArena, ScopeId};
use kos_vm::value::RcStr;
use kos_vm::{Interpreter, Module, Value};

/// Either stage of the pipeline this crate wires together can fail: codegen
/// rejects the input before a single instruction runs, execution raises a
/// script-level exception (or host-detected condition like stack overflow)
/// partway through a run.
#[derive(Debug, Error)]
pub enum KosError {
    #[error(transparent)]
    Compile(#[from] CompileError),
    #[error("uncaught exception: {0}")]
    Uncaught(String),
}

impl From<kos_vm::Exception> for KosError {
    fn from(exn: kos_vm::Exception) -> Self {
        KosError::Uncaught(describe(&exn.value()))
    }
}

fn describe(v: &Value) -> String {
    match v {
        Value::Str(s) => s.to_string(),
        other => format!("{:?}", other.type_name()),
    }
}

pub type KosResult<T> = Result<T, KosError>;

/// The globals layout a resolved module's top-level code expects: a slot
/// count for `Module::load`'s globals array, and the name→slot map
/// `GET_GLOBAL`/`SET_GLOBAL` were compiled against. Produced by the
/// (out-of-scope) resolver alongside the scope arena.
pub struct Globals {
    pub names: HashMap<RcStr, u32>,
    pub count: usize,
}

impl Globals {
    pub fn new(names: HashMap<RcStr, u32>, count: usize) -> Self {
        Globals { names, count }
    }
}

/// Lower a resolved module's top-level statements to bytecode.
#[tracing::instrument(level = "debug", skip(scopes, program))]
pub fn compile(scopes: ScopeArena, module_scope: ScopeId, program: &[Node]) -> KosResult<CompiledModule> {
    Ok(kos_compiler::compile_module(scopes, module_scope, program)?)
}

/// Link a compiled module's bytecode and constant pool against a runtime
/// globals layout, producing the module the interpreter can execute against.
pub fn link(compiled: &CompiledModule, globals: Globals) -> Module {
    Module::load(compiled.code.clone(), compiled.line_data.clone(), compiled.pool.records(), globals.names, globals.count)
}

/// Run a linked module's entry function (its synthesized top-level body,
/// constant index 0) with no receiver and no arguments, to completion.
///
/// `max_stack_depth` bounds call/generator nesting (§5); a runaway script
/// raises `StackOverflow` rather than exhausting the host's own stack.
pub fn run(module: Module, max_stack_depth: usize) -> KosResult<Value> {
    let mut interp = Interpreter::new(vec![Rc::new(module)], max_stack_depth);
    Ok(interp.execute(0, 0)?)
}

/// Compile and run a resolved module in one step, the common case for a
/// script with a single module and no cross-module imports.
pub fn compile_and_run(
    scopes: ScopeArena,
    module_scope: ScopeId,
    program: &[Node],
    globals: Globals,
    max_stack_depth: usize,
) -> KosResult<Value> {
    let compiled = compile(scopes, module_scope, program)?;
    let module = link(&compiled, globals);
    run(module, max_stack_depth)
}

#[cfg(test)]
mod tests {
    use super::*;
    use kos_compiler::{NodeKind, Pos, ScopeArena};

    fn empty_module() -> (ScopeArena, ScopeId) {
        let mut scopes = ScopeArena::new();
        let module_scope = scopes.new_scope(None, true);
        (scopes, module_scope)
    }

    #[test]
    fn compiles_and_runs_an_empty_module() {
        let (scopes, module_scope) = empty_module();
        let program: Vec<Node> = Vec::new();
        let globals = Globals::new(HashMap::new(), 0);
        let result = compile_and_run(scopes, module_scope, &program, globals, 256).unwrap();
        assert!(matches!(result, Value::Void));
    }

    #[test]
    fn compiles_a_literal_return() {
        let (scopes, module_scope) = empty_module();
        let program = vec![Node::new(NodeKind::Return(Some(Box::new(Node::new(NodeKind::IntLiteral(7), Pos::new(1, 1))))), Pos::new(1, 1))];
        let globals = Globals::new(HashMap::new(), 0);
        let result = compile_and_run(scopes, module_scope, &program, globals, 256).unwrap();
        assert!(matches!(result, Value::Int(7)));
    }
}
