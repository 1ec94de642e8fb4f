//! Assignment lowering (§4.3.5): identifier, property/element refinement,
//! and slice targets, plus the destructuring multi-assignment form.

use kos_bytecode::{Instruction, Reg};

use crate::ast::{BinOp, LValue, Node};
use crate::compiler::Compiler;
use crate::error::{CompileError, CompileErrorKind, CompileResult, Pos};
use crate::scope::{VariableKind, VarId};

/// The register a local/argument/independent variable lives in, allocating
/// and binding one on first use (§4.1: "variable-bound registers are
/// allocated once on first assignment/read and then reused"). Not
/// meaningful for `Global`/`Module`/`Imported` variables, which have no
/// register home — see [`store_variable`]/[`load_variable`] for those.
pub fn variable_register(c: &mut Compiler, pos: Pos, var: VarId) -> CompileResult<Reg> {
    if let Some(&r) = c.frame_ref().bind_slots.get(&var) {
        return Ok(r);
    }
    if let Some(r) = c.scopes.var(var).reg {
        return Ok(r);
    }
    let r = c.frame().regs.alloc_temp(pos)?;
    c.frame().regs.bind_variable(r);
    c.scopes.var_mut(var).reg = Some(r);
    Ok(r)
}

/// Emit whatever store instruction `var`'s kind requires to receive the
/// value currently in `src`.
pub fn store_variable(c: &mut Compiler, pos: Pos, var: VarId, src: Reg) -> CompileResult<()> {
    let kind = c.scopes.var(var).kind;
    if c.scopes.var(var).is_const && c.scopes.var(var).num_assignments > 0 {
        return Err(CompileError::new(pos, CompileErrorKind::ConstAssignment(c.scopes.var(var).name.clone())));
    }
    match kind {
        VariableKind::Local
        | VariableKind::ArgumentInRegister
        | VariableKind::ArgumentOnHeap
        | VariableKind::IndependentLocal
        | VariableKind::IndependentArgument => {
            let dest = variable_register(c, pos, var)?;
            if dest != src {
                c.emit(pos, Instruction::Move { dest, src })?;
            }
        }
        VariableKind::Global => {
            let idx = c.scopes.var(var).array_idx;
            c.emit(pos, Instruction::SetGlobal { idx, src })?;
        }
        VariableKind::Module | VariableKind::Imported => {
            return Err(CompileError::new(pos, CompileErrorKind::UndefinedVariable(c.scopes.var(var).name.clone())));
        }
    }
    c.scopes.var_mut(var).num_assignments += 1;
    Ok(())
}

/// Load `var`'s current value into a fresh register (or its home register,
/// for register-resident kinds — callers must treat the returned register
/// as borrowed, not owned, in that case).
pub fn load_variable(c: &mut Compiler, pos: Pos, var: VarId) -> CompileResult<Reg> {
    let kind = c.scopes.var(var).kind;
    c.scopes.var_mut(var).num_reads += 1;
    match kind {
        VariableKind::Local
        | VariableKind::ArgumentInRegister
        | VariableKind::ArgumentOnHeap
        | VariableKind::IndependentLocal
        | VariableKind::IndependentArgument => variable_register(c, pos, var),
        VariableKind::Global => {
            let idx = c.scopes.var(var).array_idx;
            let dest = c.frame().regs.alloc_temp(pos)?;
            c.emit(pos, Instruction::GetGlobal { dest, idx })?;
            Ok(dest)
        }
        VariableKind::Module => {
            let module_idx = c.scopes.var(var).array_idx as u16;
            let dest = c.frame().regs.alloc_temp(pos)?;
            c.emit(pos, Instruction::GetMod { dest, module_idx })?;
            Ok(dest)
        }
        VariableKind::Imported => Err(CompileError::new(pos, CompileErrorKind::NoSuchModuleVariable(c.scopes.var(var).name.clone()))),
    }
}

pub fn compile_var_decl(c: &mut Compiler, pos: Pos, var: VarId, init: Option<&Node>, is_const: bool) -> CompileResult<()> {
    c.scopes.var_mut(var).is_const = is_const;
    let dest = variable_register(c, pos, var)?;
    match init {
        Some(expr) => {
            let src = crate::expr::compile_expr(c, expr, Some(dest))?;
            if src != dest {
                c.emit(pos, Instruction::Move { dest, src })?;
                c.frame().regs.free(src);
            }
        }
        None => {
            c.emit(pos, Instruction::LoadVoid { dest })?;
        }
    }
    // Counts as the variable's first assignment so a later `store_variable`
    // through `compile_assign` can tell a true reassignment of a `const`
    // apart from its own initializing write, which never goes through
    // `store_variable`.
    c.scopes.var_mut(var).num_assignments += 1;
    Ok(())
}

/// Returns the register the assignment's value ended up in (the caller
/// frees it when used as a statement).
pub fn compile_assign(c: &mut Compiler, pos: Pos, target: &LValue, op: Option<BinOp>, value: &Node) -> CompileResult<Reg> {
    match target {
        LValue::Identifier(var) => {
            let rhs = crate::expr::compile_expr(c, value, None)?;
            let result = match op {
                None => rhs,
                Some(bin_op) => {
                    let cur = load_variable(c, pos, *var)?;
                    let dest = c.frame().regs.alloc_dest(pos, None, cur)?;
                    crate::expr::emit_binary(c, pos, bin_op, dest, cur, rhs)?;
                    c.frame().regs.free(rhs);
                    dest
                }
            };
            store_variable(c, pos, *var, result)?;
            Ok(result)
        }
        LValue::Property { object, prop_name } => {
            let obj_reg = crate::expr::compile_expr(c, object, None)?;
            let rhs = crate::expr::compile_expr(c, value, None)?;
            let final_value = match op {
                None => rhs,
                Some(bin_op) => {
                    let cur = c.frame().regs.alloc_temp(pos)?;
                    crate::expr::emit_get_prop(c, pos, cur, obj_reg, prop_name)?;
                    let dest = c.frame().regs.alloc_temp(pos)?;
                    crate::expr::emit_binary(c, pos, bin_op, dest, cur, rhs)?;
                    c.frame().regs.free(cur);
                    c.frame().regs.free(rhs);
                    dest
                }
            };
            crate::expr::emit_set_prop(c, pos, obj_reg, prop_name, final_value)?;
            c.frame().regs.free(obj_reg);
            Ok(final_value)
        }
        LValue::Element { object, index } => {
            let obj_reg = crate::expr::compile_expr(c, object, None)?;
            let idx_reg = crate::expr::compile_expr(c, index, None)?;
            let rhs = crate::expr::compile_expr(c, value, None)?;
            let final_value = match op {
                None => rhs,
                Some(bin_op) => {
                    let cur = c.frame().regs.alloc_temp(pos)?;
                    c.emit(pos, Instruction::Get { dest: cur, obj: obj_reg, prop: idx_reg })?;
                    let dest = c.frame().regs.alloc_temp(pos)?;
                    crate::expr::emit_binary(c, pos, bin_op, dest, cur, rhs)?;
                    c.frame().regs.free(cur);
                    c.frame().regs.free(rhs);
                    dest
                }
            };
            c.emit(pos, Instruction::Set { obj: obj_reg, prop: idx_reg, val: final_value })?;
            c.frame().regs.free(obj_reg);
            c.frame().regs.free(idx_reg);
            Ok(final_value)
        }
        LValue::Slice { object, begin, end } => {
            // Slice assignment always goes through a call to the object's
            // `insert` method with (begin, end, value) (§4.3.5).
            let obj_reg = crate::expr::compile_expr(c, object, None)?;
            let begin_reg = crate::expr::compile_expr(c, begin, None)?;
            let end_reg = crate::expr::compile_expr(c, end, None)?;
            let rhs = crate::expr::compile_expr(c, value, None)?;
            let args = c.frame().regs.alloc_contiguous(pos, 3)?;
            c.emit(pos, Instruction::Move { dest: args, src: begin_reg })?;
            c.emit(pos, Instruction::Move { dest: args + 1, src: end_reg })?;
            c.emit(pos, Instruction::Move { dest: args + 2, src: rhs })?;
            let method = c.frame().regs.alloc_temp(pos)?;
            crate::expr::emit_get_prop(c, pos, method, obj_reg, "insert")?;
            let dest = c.frame().regs.alloc_temp(pos)?;
            c.emit(pos, Instruction::CallN { dest, func: method, this: obj_reg, args, num_args: 3 })?;
            c.frame().regs.free(method);
            c.frame().regs.free(args);
            c.frame().regs.free(begin_reg);
            c.frame().regs.free(end_reg);
            c.frame().regs.free(obj_reg);
            c.frame().regs.free(dest);
            Ok(rhs)
        }
    }
}

/// Destructuring assignment: `LOAD_ITER` the RHS once, then `NEXT` into
/// each target in turn (a placeholder target still advances the iterator
/// but discards the value).
pub fn compile_multi_assign(c: &mut Compiler, pos: Pos, targets: &[Option<LValue>], value: &Node) -> CompileResult<()> {
    let rhs = crate::expr::compile_expr(c, value, None)?;
    let iter_reg = c.frame().regs.alloc_temp(pos)?;
    c.emit(pos, Instruction::LoadIter { dest: iter_reg, src: rhs })?;
    c.frame().regs.free(rhs);

    for target in targets {
        let dest = c.frame().regs.alloc_temp(pos)?;
        c.emit(pos, Instruction::Next { dest, iter: iter_reg })?;
        if let Some(lvalue) = target {
            match lvalue {
                LValue::Identifier(var) => store_variable(c, pos, *var, dest)?,
                _ => {
                    let tmp_node_value_reg = dest;
                    assign_plain(c, pos, lvalue, tmp_node_value_reg)?;
                }
            }
        }
        c.frame().regs.free(dest);
    }
    c.frame().regs.free(iter_reg);
    Ok(())
}

/// Store `src` directly into a non-identifier target, used by the
/// destructuring form where the value is already materialized.
fn assign_plain(c: &mut Compiler, pos: Pos, target: &LValue, src: Reg) -> CompileResult<()> {
    match target {
        LValue::Identifier(var) => store_variable(c, pos, *var, src),
        LValue::Property { object, prop_name } => {
            let obj_reg = crate::expr::compile_expr(c, object, None)?;
            crate::expr::emit_set_prop(c, pos, obj_reg, prop_name, src)?;
            c.frame().regs.free(obj_reg);
            Ok(())
        }
        LValue::Element { object, index } => {
            let obj_reg = crate::expr::compile_expr(c, object, None)?;
            let idx_reg = crate::expr::compile_expr(c, index, None)?;
            c.emit(pos, Instruction::Set { obj: obj_reg, prop: idx_reg, val: src })?;
            c.frame().regs.free(obj_reg);
            c.frame().regs.free(idx_reg);
            Ok(())
        }
        LValue::Slice { .. } => Err(CompileError::new(pos, CompileErrorKind::ExpectedRefinement)),
    }
}
