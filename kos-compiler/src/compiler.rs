//! Top-level driver: owns the constant pool, the scope arena and the frame
//! stack, and dispatches `visit_node` across the statement/expression/
//! assignment/control-flow/synthesizer modules that do the actual lowering.

use kos_bytecode::{FunctionHeader, Instruction, Reg};
use tracing::instrument;

use crate::ast::{Node, NodeKind};
use crate::constant_pool::{ConstIdx, ConstantPool};
use crate::error::{CompileError, CompileErrorKind, CompileResult, Pos};
use crate::frame::Frame;
use crate::scope::{ScopeArena, ScopeId};

/// A fully compiled module: one concatenated bytecode buffer, one
/// concatenated line-table buffer, and the constant pool every function
/// constant's header indexes into.
pub struct CompiledModule {
    pub code: Vec<u8>,
    pub line_data: Vec<u8>,
    pub pool: ConstantPool,
}

pub struct Compiler {
    pub pool: ConstantPool,
    pub scopes: ScopeArena,
    frames: Vec<Frame>,
    code: Vec<u8>,
    line_data: Vec<u8>,
}

impl Compiler {
    pub fn new(scopes: ScopeArena) -> Self {
        Compiler { pool: ConstantPool::new(), scopes, frames: Vec::new(), code: Vec::new(), line_data: Vec::new() }
    }

    pub fn frame(&mut self) -> &mut Frame {
        self.frames.last_mut().expect("no active frame")
    }

    pub fn frame_ref(&self) -> &Frame {
        self.frames.last().expect("no active frame")
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// Convenience wrapper so statement/expression lowerings can write
    /// `self.emit(pos, instr)` instead of reaching into the frame.
    pub fn emit(&mut self, pos: Pos, instr: Instruction) -> CompileResult<u32> {
        self.frame().emitter.emit(pos, instr)
    }

    #[instrument(level = "trace", skip(self, body), fields(scope = scope.0))]
    pub fn compile_function(
        &mut self,
        scope: ScopeId,
        def_line: u32,
        body: &Node,
        setup: impl FnOnce(&mut Compiler, &mut Frame) -> CompileResult<()>,
    ) -> CompileResult<ConstIdx> {
        let const_idx = self.pool.reserve_function(Pos::new(def_line, 1))?;
        let mut frame = Frame::new(scope, const_idx);
        setup(self, &mut frame)?;
        self.frames.push(frame);

        let result = crate::synth::compile_body(self, body);

        let mut frame = self.frames.pop().expect("pushed above");
        result?;

        let (local_code, line_table) = std::mem::take(&mut frame.emitter).into_parts();
        let bytecode_offset = self.code.len() as u32;
        let bytecode_size = local_code.len() as u32;
        self.code.extend_from_slice(&local_code);

        let line_table_offset = self.line_data.len() as u32;
        let mut line_buf = Vec::new();
        line_table.write_to(&mut line_buf);
        let line_table_size = line_buf.len() as u32;
        self.line_data.extend_from_slice(&line_buf);

        let num_instructions = line_table.entries().len() as u32;

        let num_binds = frame.bind_slots.len() as u8;
        let header = FunctionHeader {
            name_str_idx: 0,
            num_named_args: 0,
            num_used_def_args: frame.num_used_def_args,
            min_args: 0,
            this_reg: frame.this_reg,
            rest_reg: frame.rest_reg,
            ellipsis_reg: frame.ellipsis_reg,
            args_reg: frame.args_reg,
            bind_reg: frame.bind_reg,
            closure_size: num_binds,
            num_binds,
            total_regs: frame.regs.register_count() as u8,
            flags: Default::default(),
            load_selector: kos_bytecode::LoadSelector::LoadConst,
            bytecode_offset,
            bytecode_size,
            line_table_offset,
            line_table_size,
            def_line,
            num_instructions,
            param_names: Vec::new(),
        };
        self.pool.set_function(const_idx, header);
        Ok(const_idx)
    }

    /// Overwrite a function constant's header after the fact — used by the
    /// synthesizer once it knows details (name, param layout, generator/class
    /// flags) that aren't available until after the literal itself has been
    /// fully processed.
    pub fn patch_function_header(&mut self, idx: ConstIdx, patch: impl FnOnce(&mut FunctionHeader)) {
        let mut header = self.pool.function(idx).clone();
        patch(&mut header);
        self.pool.set_function(idx, header);
    }

    pub fn finish(self) -> CompiledModule {
        CompiledModule { code: self.code, line_data: self.line_data, pool: self.pool }
    }

    /// Visit one statement-position node. Expressions reached this way
    /// discard their result register (the `ExprStmt` wrapper records which
    /// register that was so it can be freed).
    pub fn visit_stmt(&mut self, node: &Node) -> CompileResult<()> {
        match &node.kind {
            NodeKind::Block(stmts) => self.visit_block(stmts),
            NodeKind::VarDecl { var, init, is_const } => {
                crate::assign::compile_var_decl(self, node.pos, *var, init.as_deref(), *is_const)
            }
            NodeKind::Assign { target, op, value } => {
                let r = crate::assign::compile_assign(self, node.pos, target, *op, value)?;
                self.frame().regs.free(r);
                Ok(())
            }
            NodeKind::MultiAssign { targets, value } => crate::assign::compile_multi_assign(self, node.pos, targets, value),
            NodeKind::If { cond, then_branch, else_branch } => {
                crate::control_flow::compile_if(self, node.pos, cond, then_branch, else_branch.as_deref())
            }
            NodeKind::While { cond, body } => crate::control_flow::compile_while(self, node.pos, cond, body),
            NodeKind::Repeat { body, cond } => crate::control_flow::compile_repeat(self, node.pos, body, cond),
            NodeKind::ForIn { targets, iterable, body } => {
                crate::control_flow::compile_for_in(self, node.pos, targets, iterable, body)
            }
            NodeKind::Switch { scrutinee, cases } => crate::control_flow::compile_switch(self, node.pos, scrutinee, cases),
            NodeKind::TryCatch { body, catch_var, handler } => {
                crate::control_flow::compile_try_catch(self, node.pos, body, *catch_var, handler)
            }
            NodeKind::TryDefer { body, defer } => crate::control_flow::compile_try_defer(self, node.pos, body, defer),
            NodeKind::Break => crate::control_flow::compile_break(self, node.pos),
            NodeKind::Continue => crate::control_flow::compile_continue(self, node.pos),
            NodeKind::Fallthrough => crate::control_flow::compile_fallthrough(self, node.pos),
            NodeKind::Return(value) => crate::synth::compile_return(self, node.pos, value.as_deref()),
            NodeKind::Throw(value) => crate::control_flow::compile_throw(self, node.pos, value),
            NodeKind::ExprStmt(expr) => {
                let r = crate::expr::compile_expr(self, expr, None)?;
                self.frame().regs.free(r);
                Ok(())
            }
            _ => {
                let r = crate::expr::compile_expr(self, node, None)?;
                self.frame().regs.free(r);
                Ok(())
            }
        }
    }

    pub fn visit_block(&mut self, stmts: &[Node]) -> CompileResult<()> {
        for stmt in stmts {
            self.visit_stmt(stmt)?;
        }
        Ok(())
    }

    /// Allocate the register a boolean condition expression should land in,
    /// and lower it.
    pub fn compile_condition(&mut self, cond: &Node) -> CompileResult<Reg> {
        crate::expr::compile_expr(self, cond, None)
    }

    pub fn too_many_args(&self, pos: Pos) -> CompileError {
        CompileError::new(pos, CompileErrorKind::TooManyArgs)
    }
}
