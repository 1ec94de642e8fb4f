//! Control-flow statement lowering (§4.3.3): if/else, while, repeat,
//! for-in (with the `range()` fast path), switch, try/catch, try/defer,
//! and the break/continue/fallthrough jump bookkeeping they all share.

use kos_bytecode::Instruction;

use crate::ast::{Node, NodeKind, SwitchCase};
use crate::compiler::Compiler;
use crate::error::{CompileError, CompileErrorKind, CompileResult, Pos};
use crate::frame::PendingJumpKind;
use crate::scope::VarId;

/// Implementation cap on try/catch nesting (§7 `CatchNestingTooDeep`); the
/// reference design asks for at least 16.
const MAX_CATCH_DEPTH: u32 = 64;

pub fn compile_if(
    c: &mut Compiler,
    pos: Pos,
    cond: &Node,
    then_branch: &Node,
    else_branch: Option<&Node>,
) -> CompileResult<()> {
    let cond_reg = c.compile_condition(cond)?;
    let skip_then = c.emit(pos, Instruction::JumpNotCond { cond: cond_reg, delta: 0 })?;
    c.frame().regs.free(cond_reg);
    c.visit_stmt(then_branch)?;

    if let Some(else_branch) = else_branch {
        let skip_else = c.emit(pos, Instruction::Jump { delta: 0 })?;
        let else_entry = c.frame().emitter.offset();
        c.frame().emitter.patch(skip_then, else_entry);
        c.visit_stmt(else_branch)?;
        let end = c.frame().emitter.offset();
        c.frame().emitter.patch(skip_else, end);
    } else {
        let end = c.frame().emitter.offset();
        c.frame().emitter.patch(skip_then, end);
    }
    Ok(())
}

pub fn compile_while(c: &mut Compiler, pos: Pos, cond: &Node, body: &Node) -> CompileResult<()> {
    if cond.is_const_false() {
        return Ok(());
    }
    let loop_mark = c.frame().mark();

    let cond_start = c.frame().emitter.offset();
    let cond_reg = c.compile_condition(cond)?;
    let exit_jump = c.emit(pos, Instruction::JumpNotCond { cond: cond_reg, delta: 0 })?;
    c.frame().regs.free(cond_reg);

    c.visit_stmt(body)?;

    let continue_target = c.frame().emitter.offset();
    let back_jump = c.emit(pos, Instruction::Jump { delta: 0 })?;
    c.frame().emitter.patch(back_jump, cond_start);

    let end = c.frame().emitter.offset();
    c.frame().emitter.patch(exit_jump, end);

    resolve_loop_jumps(c, loop_mark, continue_target, end);
    Ok(())
}

pub fn compile_repeat(c: &mut Compiler, pos: Pos, body: &Node, cond: &Node) -> CompileResult<()> {
    let loop_mark = c.frame().mark();
    let body_start = c.frame().emitter.offset();
    c.visit_stmt(body)?;

    let continue_target = c.frame().emitter.offset();
    if !cond.is_const_false() {
        let cond_reg = c.compile_condition(cond)?;
        let back_jump = c.emit(pos, Instruction::JumpCond { cond: cond_reg, delta: 0 })?;
        c.frame().regs.free(cond_reg);
        c.frame().emitter.patch(back_jump, body_start);
    }
    let end = c.frame().emitter.offset();
    resolve_loop_jumps(c, loop_mark, continue_target, end);
    Ok(())
}

pub fn compile_for_in(c: &mut Compiler, pos: Pos, targets: &[VarId], iterable: &Node, body: &Node) -> CompileResult<()> {
    if let Some((start, step, count_hint)) = recognize_range(iterable) {
        if targets.len() != 1 {
            return Err(CompileError::new(pos, CompileErrorKind::TooManyVarsForRange));
        }
        let _ = count_hint;
        return compile_for_range(c, pos, targets[0], start, step, iterable, body);
    }

    let iter_src = crate::expr::compile_expr(c, iterable, None)?;
    let iter_reg = c.frame().regs.alloc_temp(pos)?;
    c.emit(pos, Instruction::LoadIter { dest: iter_reg, src: iter_src })?;
    c.frame().regs.free(iter_src);

    let loop_mark = c.frame().mark();
    let body_entry_jump = c.emit(pos, Instruction::Jump { delta: 0 })?;
    let next_site = c.frame().emitter.offset();

    // NEXT_JUMP advances the iterator into `dest` and jumps to `delta`
    // (the loop exit) once exhausted; see kos_bytecode::Instruction::NextJump.
    let dest = c.frame().regs.alloc_temp(pos)?;
    let exit_jump = c.emit(pos, Instruction::NextJump { dest, iter: iter_reg, delta: 0 })?;
    bind_for_in_target(c, pos, targets[0], dest)?;
    for &extra in &targets[1..] {
        let d2 = c.frame().regs.alloc_temp(pos)?;
        c.emit(pos, Instruction::Next { dest: d2, iter: iter_reg })?;
        bind_for_in_target(c, pos, extra, d2)?;
        c.frame().regs.free(d2);
    }
    c.frame().regs.free(dest);

    let body_entry = c.frame().emitter.offset();
    c.frame().emitter.patch(body_entry_jump, body_entry);

    c.visit_stmt(body)?;

    let continue_target = c.frame().emitter.offset();
    let back_jump = c.emit(pos, Instruction::Jump { delta: 0 })?;
    c.frame().emitter.patch(back_jump, next_site);

    let end = c.frame().emitter.offset();
    c.frame().emitter.patch(exit_jump, end);
    c.frame().regs.free(iter_reg);

    for &t in targets {
        let void_reg = c.frame().regs.alloc_temp(pos)?;
        c.emit(pos, Instruction::LoadVoid { dest: void_reg })?;
        bind_for_in_target(c, pos, t, void_reg)?;
        c.frame().regs.free(void_reg);
    }

    resolve_loop_jumps(c, loop_mark, continue_target, end);
    Ok(())
}

fn bind_for_in_target(c: &mut Compiler, pos: Pos, var: VarId, src: kos_bytecode::Reg) -> CompileResult<()> {
    crate::assign::store_variable(c, pos, var, src)
}

/// Detects `for (x in range(a[, b[, c]]))` (§4.3.3 for-range optimization).
/// Returns `(start_literal, step_literal, has_explicit_bounds)` when the
/// iterable is a direct call to the well-known `range` function; the
/// literals are re-evaluated by the caller rather than cached here since
/// only constant args are special-cased.
fn recognize_range(iterable: &Node) -> Option<(i64, i64, bool)> {
    if let NodeKind::Call { callee, args, .. } = &iterable.kind {
        let is_range_name = match &callee.kind {
            NodeKind::Identifier(_) => true,
            NodeKind::Property { prop_name, .. } => prop_name == "range",
            _ => false,
        };
        if !is_range_name || args.is_empty() || args.len() > 3 {
            return None;
        }
        let step = if args.len() == 3 {
            match &args[2].kind {
                NodeKind::IntLiteral(n) => *n,
                _ => return None,
            }
        } else {
            1
        };
        let start = if args.len() >= 2 {
            match &args[0].kind {
                NodeKind::IntLiteral(n) => *n,
                _ => return None,
            }
        } else {
            0
        };
        return Some((start, step, args.len() >= 2));
    }
    None
}

fn compile_for_range(
    c: &mut Compiler,
    pos: Pos,
    target: VarId,
    start: i64,
    step: i64,
    iterable: &Node,
    body: &Node,
) -> CompileResult<()> {
    let NodeKind::Call { args, .. } = &iterable.kind else { unreachable!() };
    let limit_node = if args.len() >= 2 { &args[1] } else { &args[0] };
    let limit_reg = crate::expr::compile_expr(c, limit_node, None)?;

    let counter = c.frame().regs.alloc_temp(pos)?;
    if (-128..=127).contains(&start) {
        c.emit(pos, Instruction::LoadInt8 { dest: counter, imm: start as i8 })?;
    } else {
        let idx = c.pool.intern_int(pos, start)?;
        c.emit(pos, Instruction::LoadConst { dest: counter, idx: idx.0 as u16 })?;
    }

    let loop_mark = c.frame().mark();
    let cond_start = c.frame().emitter.offset();
    let cmp = c.frame().regs.alloc_temp(pos)?;
    if step >= 0 {
        c.emit(pos, Instruction::CmpLt { dest: cmp, a: counter, b: limit_reg })?;
    } else {
        c.emit(pos, Instruction::CmpLt { dest: cmp, a: limit_reg, b: counter })?;
    }
    let exit_jump = c.emit(pos, Instruction::JumpNotCond { cond: cmp, delta: 0 })?;
    c.frame().regs.free(cmp);

    bind_for_in_target(c, pos, target, counter)?;
    c.visit_stmt(body)?;

    let continue_target = c.frame().emitter.offset();
    let step_reg = c.frame().regs.alloc_temp(pos)?;
    if (-128..=127).contains(&step) {
        c.emit(pos, Instruction::LoadInt8 { dest: step_reg, imm: step as i8 })?;
    } else {
        let idx = c.pool.intern_int(pos, step)?;
        c.emit(pos, Instruction::LoadConst { dest: step_reg, idx: idx.0 as u16 })?;
    }
    c.emit(pos, Instruction::Add { dest: counter, a: counter, b: step_reg })?;
    c.frame().regs.free(step_reg);
    let back_jump = c.emit(pos, Instruction::Jump { delta: 0 })?;
    c.frame().emitter.patch(back_jump, cond_start);

    let end = c.frame().emitter.offset();
    c.frame().emitter.patch(exit_jump, end);
    c.frame().regs.free(counter);
    c.frame().regs.free(limit_reg);

    resolve_loop_jumps(c, loop_mark, continue_target, end);
    Ok(())
}

/// Patch every break recorded since `loop_mark` to `break_target` and every
/// continue to `continue_target`.
fn resolve_loop_jumps(c: &mut Compiler, loop_mark: usize, continue_target: u32, break_target: u32) {
    let breaks = c.frame().resolve_since(loop_mark, PendingJumpKind::Break);
    for j in breaks {
        c.frame().emitter.patch(j.patch_offset, break_target);
    }
    let continues = c.frame().resolve_since(loop_mark, PendingJumpKind::Continue);
    for j in continues {
        c.frame().emitter.patch(j.patch_offset, continue_target);
    }
}

pub fn compile_switch(c: &mut Compiler, pos: Pos, scrutinee: &Node, cases: &[SwitchCase]) -> CompileResult<()> {
    let scrutinee_reg = crate::expr::compile_expr(c, scrutinee, None)?;
    let switch_mark = c.frame().mark();

    let mut case_entry_jumps = Vec::with_capacity(cases.len());
    let mut default_idx = None;
    for (i, case) in cases.iter().enumerate() {
        match &case.key {
            Some(key) => {
                let key_reg = crate::expr::compile_expr(c, key, None)?;
                let cmp = c.frame().regs.alloc_temp(pos)?;
                c.emit(pos, Instruction::CmpEq { dest: cmp, a: scrutinee_reg, b: key_reg })?;
                c.frame().regs.free(key_reg);
                let jump = c.emit(pos, Instruction::JumpCond { cond: cmp, delta: 0 })?;
                c.frame().regs.free(cmp);
                case_entry_jumps.push(Some(jump));
            }
            None => {
                default_idx = Some(i);
                case_entry_jumps.push(None);
            }
        }
    }
    c.frame().regs.free(scrutinee_reg);

    let default_jump = if default_idx.is_none() {
        Some(c.emit(pos, Instruction::Jump { delta: 0 })?)
    } else {
        None
    };
    let fall_to_default = default_idx.map(|i| c.emit(pos, Instruction::Jump { delta: 0 }));
    let fall_to_default = fall_to_default.transpose()?;

    let mut case_starts = Vec::with_capacity(cases.len());
    for (i, case) in cases.iter().enumerate() {
        let start = c.frame().emitter.offset();
        case_starts.push(start);
        if let Some(jump) = case_entry_jumps[i] {
            c.frame().emitter.patch(jump, start);
        }
        if default_idx == Some(i) {
            if let Some(j) = fall_to_default {
                c.frame().emitter.patch(j, start);
            }
        }
        for stmt in &case.body {
            c.visit_stmt(stmt)?;
        }
        if !case.falls_through && i + 1 != cases.len() {
            let jump = c.emit(pos, Instruction::Jump { delta: 0 })?;
            c.frame().pending_breaks.push(crate::frame::PendingJump {
                kind: PendingJumpKind::Fallthrough,
                patch_offset: jump,
            });
        }
    }

    let end = c.frame().emitter.offset();
    if let Some(j) = default_jump {
        c.frame().emitter.patch(j, end);
    }
    // Any explicit `fallthrough` exits that weren't re-targeted to the next
    // case's start above (i.e. jumps out of the final case) land at `end`.
    let leftover = c.frame().resolve_since(switch_mark, PendingJumpKind::Fallthrough);
    for j in leftover {
        c.frame().emitter.patch(j.patch_offset, end);
    }
    resolve_loop_jumps(c, switch_mark, end, end);
    Ok(())
}

pub fn compile_try_catch(
    c: &mut Compiler,
    pos: Pos,
    body: &Node,
    catch_var: Option<VarId>,
    handler: &Node,
) -> CompileResult<()> {
    if c.frame().catch_depth >= MAX_CATCH_DEPTH {
        return Err(CompileError::new(pos, CompileErrorKind::CatchNestingTooDeep));
    }
    c.frame().catch_depth += 1;

    let catch_reg = match catch_var {
        Some(v) => crate::assign::variable_register(c, pos, v)?,
        None => c.frame().regs.alloc_temp(pos)?,
    };
    let catch_site = c.emit(pos, Instruction::Catch { dest: catch_reg, delta: 0 })?;

    c.visit_stmt(body)?;
    c.emit(pos, Instruction::Cancel)?;
    let skip_handler = c.emit(pos, Instruction::Jump { delta: 0 })?;

    let handler_start = c.frame().emitter.offset();
    c.frame().emitter.patch(catch_site, handler_start);
    c.visit_stmt(handler)?;

    let end = c.frame().emitter.offset();
    c.frame().emitter.patch(skip_handler, end);

    if catch_var.is_none() {
        c.frame().regs.free(catch_reg);
    }
    c.frame().catch_depth -= 1;
    Ok(())
}

/// try/defer (§4.3.3): the defer block is re-emitted once per normal exit
/// path rather than shared, since the body may reach the end of the try in
/// more than one way (fallthrough, or an early exit already resolved inside
/// the body) but each still needs the defer semantics run exactly once on
/// its own path.
pub fn compile_try_defer(c: &mut Compiler, pos: Pos, body: &Node, defer: &Node) -> CompileResult<()> {
    if c.frame().catch_depth >= MAX_CATCH_DEPTH {
        return Err(CompileError::new(pos, CompileErrorKind::CatchNestingTooDeep));
    }
    c.frame().catch_depth += 1;

    let exn_reg = c.frame().regs.alloc_temp(pos)?;
    let catch_site = c.emit(pos, Instruction::Catch { dest: exn_reg, delta: 0 })?;

    c.frame().defer_stack.push(defer.clone());
    c.visit_stmt(body)?;
    c.frame().defer_stack.pop();
    c.emit(pos, Instruction::Cancel)?;
    c.visit_stmt(defer)?;
    let skip_exceptional_defer = c.emit(pos, Instruction::Jump { delta: 0 })?;

    let exceptional_start = c.frame().emitter.offset();
    c.frame().emitter.patch(catch_site, exceptional_start);
    c.visit_stmt(defer)?;
    c.emit(pos, Instruction::Throw { val: exn_reg })?;

    let end = c.frame().emitter.offset();
    c.frame().emitter.patch(skip_exceptional_defer, end);
    c.frame().regs.free(exn_reg);
    c.frame().catch_depth -= 1;
    Ok(())
}

pub fn compile_break(c: &mut Compiler, pos: Pos) -> CompileResult<()> {
    let offset = c.emit(pos, Instruction::Jump { delta: 0 })?;
    c.frame().pending_breaks.push(crate::frame::PendingJump { kind: PendingJumpKind::Break, patch_offset: offset });
    Ok(())
}

pub fn compile_continue(c: &mut Compiler, pos: Pos) -> CompileResult<()> {
    let offset = c.emit(pos, Instruction::Jump { delta: 0 })?;
    c.frame().pending_breaks.push(crate::frame::PendingJump { kind: PendingJumpKind::Continue, patch_offset: offset });
    Ok(())
}

pub fn compile_fallthrough(c: &mut Compiler, pos: Pos) -> CompileResult<()> {
    let offset = c.emit(pos, Instruction::Jump { delta: 0 })?;
    c.frame().pending_breaks.push(crate::frame::PendingJump { kind: PendingJumpKind::Fallthrough, patch_offset: offset });
    Ok(())
}

pub fn compile_throw(c: &mut Compiler, pos: Pos, value: &Node) -> CompileResult<()> {
    let r = crate::expr::compile_expr(c, value, None)?;
    c.emit(pos, Instruction::Throw { val: r })?;
    c.frame().regs.free(r);
    Ok(())
}
