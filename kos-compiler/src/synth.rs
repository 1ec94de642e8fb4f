//! Function/class synthesizer (§4.4): turns a [`FunctionLiteral`]/
//! [`ClassLiteral`] into a function constant plus the `BIND`/`BIND_SELF`/
//! `BIND_DEFAULTS` sequence at its definition site, and drives the handful
//! of statements (`return`, `yield`) whose lowering depends on which kind of
//! function is currently being compiled.

use kos_bytecode::{Instruction, Reg, StringEscapeMode};

use crate::ast::{ClassLiteral, FunctionLiteral, Node, NodeKind};
use crate::compiler::Compiler;
use crate::error::{CompileError, CompileErrorKind, CompileResult, Pos};
use crate::frame::Frame;
use crate::scope::{ScopeArena, VarId};

/// Entry point `Compiler::compile_function` calls for every function body.
pub fn compile_body(c: &mut Compiler, body: &Node) -> CompileResult<()> {
    c.visit_stmt(body)
}

pub fn compile_return(c: &mut Compiler, pos: Pos, value: Option<&Node>) -> CompileResult<()> {
    if c.frame_ref().is_generator() && value.is_some() {
        return Err(CompileError::new(pos, CompileErrorKind::ReturnInGenerator));
    }
    let val = match value {
        Some(expr) => crate::expr::compile_expr(c, expr, None)?,
        None => {
            let r = c.frame().regs.alloc_temp(pos)?;
            c.emit(pos, Instruction::LoadVoid { dest: r })?;
            r
        }
    };
    // Re-emit every enclosing `defer` block, innermost first, before the
    // actual return (§4.3.3 try/defer: returning out of the try runs defer).
    let defers = c.frame_ref().defer_stack.clone();
    for defer in defers.iter().rev() {
        c.visit_stmt(defer)?;
    }
    c.emit(pos, Instruction::Return { val })?;
    c.frame().regs.free(val);
    Ok(())
}

pub fn compile_yield(c: &mut Compiler, pos: Pos, value: Option<&Node>, dest_hint: Option<Reg>) -> CompileResult<Reg> {
    let val = match value {
        Some(expr) => crate::expr::compile_expr(c, expr, None)?,
        None => {
            let r = c.frame().regs.alloc_temp(pos)?;
            c.emit(pos, Instruction::LoadVoid { dest: r })?;
            r
        }
    };
    c.emit(pos, Instruction::Yield { val })?;
    c.frame().regs.free(val);
    // The value a resumed `NEXT(value)` writes back in; allocated once per
    // generator body and reused by every `yield` expression in it.
    let dest = match c.frame_ref().yield_reg {
        Some(r) => r,
        None => {
            let r = match dest_hint {
                Some(r) => r,
                None => c.frame().regs.alloc_temp(pos)?,
            };
            c.frame().yield_reg = Some(r);
            r
        }
    };
    Ok(dest)
}

/// Bind `var` to a fresh register directly in `frame`, bypassing
/// [`crate::assign::variable_register`] (which reads `Compiler`'s *active*
/// frame — not yet pushed while a literal's registers are being set up).
fn bind_register(frame: &mut Frame, scopes: &mut ScopeArena, pos: Pos, var: VarId) -> CompileResult<Reg> {
    let r = frame.regs.alloc_temp(pos)?;
    frame.regs.bind_variable(r);
    scopes.var_mut(var).reg = Some(r);
    Ok(r)
}

fn scan_for_super_call(node: &Node, found: &mut bool) {
    if *found {
        return;
    }
    if let NodeKind::Call { callee, .. } = &node.kind {
        if matches!(callee.kind, NodeKind::Super) {
            *found = true;
            return;
        }
    }
    walk_children(node, |child| scan_for_super_call(child, found));
}

/// Visits every direct child `Node` reachable from `node`'s payload, for the
/// handful of analyses (like [`scan_for_super_call`]) that need a full walk
/// without the statement/expression lowering machinery.
fn walk_children(node: &Node, mut visit: impl FnMut(&Node)) {
    match &node.kind {
        NodeKind::Program(stmts) | NodeKind::Block(stmts) => stmts.iter().for_each(&mut visit),
        NodeKind::ArrayLiteral(elems) => elems.iter().for_each(|e| match e {
            crate::ast::ArrayElement::Single(n) | crate::ast::ArrayElement::Expand(n) => visit(n),
        }),
        NodeKind::ObjectLiteral { prototype, properties } => {
            if let Some(p) = prototype {
                visit(p);
            }
            properties.iter().for_each(|p| visit(&p.value));
        }
        NodeKind::Binary { lhs, rhs, .. } | NodeKind::Logical { lhs, rhs, .. } => {
            visit(lhs);
            visit(rhs);
        }
        NodeKind::Unary { operand, .. } => visit(operand),
        NodeKind::Ternary { cond, then_branch, else_branch } => {
            visit(cond);
            visit(then_branch);
            visit(else_branch);
        }
        NodeKind::Property { object, .. } => visit(object),
        NodeKind::Element { object, index } => {
            visit(object);
            visit(index);
        }
        NodeKind::Slice { object, begin, end } => {
            visit(object);
            if let Some(b) = begin {
                visit(b);
            }
            if let Some(e) = end {
                visit(e);
            }
        }
        NodeKind::Call { callee, args, .. } => {
            visit(callee);
            args.iter().for_each(&mut visit);
        }
        NodeKind::VarDecl { init, .. } => {
            if let Some(i) = init {
                visit(i);
            }
        }
        NodeKind::Assign { value, .. } => visit(value),
        NodeKind::MultiAssign { value, .. } => visit(value),
        NodeKind::If { cond, then_branch, else_branch } => {
            visit(cond);
            visit(then_branch);
            if let Some(e) = else_branch {
                visit(e);
            }
        }
        NodeKind::While { cond, body } => {
            visit(cond);
            visit(body);
        }
        NodeKind::Repeat { body, cond } => {
            visit(body);
            visit(cond);
        }
        NodeKind::ForIn { iterable, body, .. } => {
            visit(iterable);
            visit(body);
        }
        NodeKind::Switch { scrutinee, cases } => {
            visit(scrutinee);
            for case in cases {
                if let Some(k) = &case.key {
                    visit(k);
                }
                case.body.iter().for_each(&mut visit);
            }
        }
        NodeKind::TryCatch { body, handler, .. } => {
            visit(body);
            visit(handler);
        }
        NodeKind::TryDefer { body, defer } => {
            visit(body);
            visit(defer);
        }
        NodeKind::Return(v) | NodeKind::Yield(v) => {
            if let Some(v) = v {
                visit(v);
            }
        }
        NodeKind::Throw(v) => visit(v),
        NodeKind::ExprStmt(e) => visit(e),
        // Nested function/class literals introduce their own scope for
        // `super`; an implicit base-ctor call never needs to look inside one.
        NodeKind::FunctionExpr(_) | NodeKind::ClassExpr(_) => {}
        _ => {}
    }
}

/// Lower a function literal: synthesize its function constant, then emit the
/// `LOAD_CONST`/`LOAD_FUN` and bind sequence at the definition site.
pub fn compile_function_literal(c: &mut Compiler, pos: Pos, lit: &FunctionLiteral, dest_hint: Option<Reg>) -> CompileResult<Reg> {
    if lit.params.len() > u8::MAX as usize {
        return Err(c.too_many_args(pos));
    }

    let mut param_name_consts = Vec::with_capacity(lit.params.len());
    for p in &lit.params {
        let idx = c.pool.intern_string(pos, p.name.as_bytes(), StringEscapeMode::NoEscape)?;
        param_name_consts.push(idx.0);
    }
    let min_args = lit.params.iter().take_while(|p| p.default.is_none()).count() as u8;
    let num_used_def_args = lit.params.iter().filter(|p| p.default.is_some()).count() as u8;
    let is_generator = lit.is_generator;
    let captures = lit.captures.clone();

    let const_idx = c.compile_function(lit.scope, lit.def_line, &lit.body, |c, frame| {
        setup_function_frame(c, frame, lit, &captures, pos)
    })?;

    c.patch_function_header(const_idx, |h| {
        h.num_named_args = lit.params.len() as u8;
        h.num_used_def_args = num_used_def_args;
        h.min_args = min_args;
        h.param_names = param_name_consts;
        h.flags.set_generator(is_generator);
        h.flags.set_closure(!captures.is_empty());
    });

    if !captures.is_empty() && matches!(c.pool.function(const_idx).load_selector, kos_bytecode::LoadSelector::LoadConst) {
        c.patch_function_header(const_idx, |h| {
            h.load_selector = if const_idx.0 <= u8::MAX as u32 {
                kos_bytecode::LoadSelector::LoadFun8
            } else {
                kos_bytecode::LoadSelector::LoadFun
            };
        });
    }

    let func_reg = fresh(c, pos, dest_hint)?;
    emit_load_function_const(c, pos, func_reg, const_idx)?;
    emit_binds(c, pos, func_reg, &captures)?;
    emit_default_args(c, pos, func_reg, lit)?;
    Ok(func_reg)
}

fn fresh(c: &mut Compiler, pos: Pos, dest_hint: Option<Reg>) -> CompileResult<Reg> {
    match dest_hint {
        Some(r) => Ok(r),
        None => c.frame().regs.alloc_temp(pos),
    }
}

fn emit_load_function_const(c: &mut Compiler, pos: Pos, dest: Reg, const_idx: crate::constant_pool::ConstIdx) -> CompileResult<()> {
    let selector = c.pool.function(const_idx).load_selector;
    use kos_bytecode::LoadSelector::*;
    match selector {
        LoadConst8 | LoadFun8 if const_idx.0 <= u8::MAX as u32 => {
            let instr = if matches!(selector, LoadFun8) {
                Instruction::LoadFun8 { dest, idx: const_idx.0 as u8 }
            } else {
                Instruction::LoadConst8 { dest, idx: const_idx.0 as u8 }
            };
            c.emit(pos, instr)?;
        }
        LoadFun => {
            c.emit(pos, Instruction::LoadFun { dest, idx: const_idx.0 as u16 })?;
        }
        _ => {
            if const_idx.0 <= u8::MAX as u32 {
                c.emit(pos, Instruction::LoadConst8 { dest, idx: const_idx.0 as u8 })?;
            } else {
                c.emit(pos, Instruction::LoadConst { dest, idx: const_idx.0 as u16 })?;
            }
        }
    }
    Ok(())
}

/// For each captured variable, pass the register that holds it *in the
/// current (defining) frame* as `BIND`'s source — either the variable's own
/// home register, or, if it was itself only reached through a bind slot
/// here, that relay register (see [`crate::frame::Frame::bind_slots`]).
fn emit_binds(c: &mut Compiler, pos: Pos, func_reg: Reg, captures: &[VarId]) -> CompileResult<()> {
    for (slot, &var) in captures.iter().enumerate() {
        let src = crate::assign::variable_register(c, pos, var)?;
        c.emit(pos, Instruction::Bind { fun: func_reg, slot: slot as u8, src })?;
    }
    Ok(())
}

fn emit_default_args(c: &mut Compiler, pos: Pos, func_reg: Reg, lit: &FunctionLiteral) -> CompileResult<()> {
    let defaults: Vec<&Node> = lit.params.iter().filter_map(|p| p.default.as_deref()).collect();
    if defaults.is_empty() {
        return Ok(());
    }
    let array_reg = c.frame().regs.alloc_temp(pos)?;
    c.emit(pos, Instruction::LoadArray { dest: array_reg, size: defaults.len().min(255) as u32 })?;
    for default_expr in &defaults {
        let val = crate::expr::compile_expr(c, default_expr, None)?;
        c.emit(pos, Instruction::Push { arr: array_reg, val })?;
        c.frame().regs.free(val);
    }
    c.emit(pos, Instruction::BindDefaults { fun: func_reg, defaults: array_reg })?;
    c.frame().regs.free(array_reg);
    Ok(())
}

/// Steps 3-8 of §4.4: allocate every register a function's own body expects
/// to find already in place before a single statement is emitted.
fn setup_function_frame(c: &mut Compiler, frame: &mut Frame, lit: &FunctionLiteral, captures: &[VarId], pos: Pos) -> CompileResult<()> {
    let scope = lit.scope;

    // Step 3: independent locals/arguments declared directly in this
    // function's own scope get the lowest register numbers so `BIND_SELF`
    // in a nested closure can address them by a stable index.
    let independent_vars: Vec<VarId> = c
        .scopes
        .scope(scope)
        .vars
        .iter()
        .copied()
        .filter(|&v| c.scopes.var(v).kind.is_independent())
        .collect();
    for var in independent_vars {
        bind_register(frame, &mut c.scopes, pos, var)?;
    }

    // Step 4: ordinary (non-independent) parameters, in declaration order,
    // as one contiguous block so `args_reg` names the whole run.
    let plain_params: Vec<VarId> = lit
        .params
        .iter()
        .map(|p| p.var)
        .filter(|&v| !c.scopes.var(v).kind.is_independent())
        .collect();
    if !plain_params.is_empty() {
        let start = frame.regs.alloc_contiguous(pos, plain_params.len() as u16)?;
        frame.args_reg = start;
        for (i, var) in plain_params.into_iter().enumerate() {
            let r = start + i as Reg;
            frame.regs.bind_variable(r);
            c.scopes.var_mut(var).reg = Some(r);
        }
    }

    // Rest parameter, allocated after the named block.
    if let Some((_, rest_var)) = &lit.rest {
        let r = bind_register(frame, &mut c.scopes, pos, *rest_var)?;
        frame.rest_reg = r;
    }

    // Step 5: `this`.
    if c.scopes.scope(scope).uses_this {
        frame.this_reg = frame.regs.alloc_temp(pos)?;
        frame.regs.bind_variable(frame.this_reg);
    }

    // Step 6: a bare `...` ellipsis catch-all, when the resolver left one on
    // the scope distinct from a named rest parameter.
    if let Some(ellipsis_var) = c.scopes.scope(scope).ellipsis_var {
        let r = bind_register(frame, &mut c.scopes, pos, ellipsis_var)?;
        frame.ellipsis_reg = r;
    }

    // Step 7: constructors receive the base class's constructor/prototype so
    // an implicit `super(...)` can be synthesized.
    if lit.is_constructor {
        frame.base_ctor_reg = frame.regs.alloc_temp(pos)?;
        frame.regs.bind_variable(frame.base_ctor_reg);
        frame.base_proto_reg = frame.regs.alloc_temp(pos)?;
        frame.regs.bind_variable(frame.base_proto_reg);
    }

    // Step 8: one bind slot per captured outer-scope variable.
    if !captures.is_empty() {
        let start = frame.regs.alloc_contiguous(pos, captures.len() as u16)?;
        frame.bind_reg = start;
        for (i, &var) in captures.iter().enumerate() {
            let r = start + i as Reg;
            frame.regs.bind_variable(r);
            frame.bind_slots.insert(var, r);
        }
    }

    if lit.is_generator {
        frame.yield_reg = None; // assigned lazily by the first `yield` (see compile_yield)
    }

    Ok(())
}

/// Lower a class literal (§4.4): build the derived prototype from the base
/// class's, synthesize the constructor, and attach the prototype.
pub fn compile_class_literal(c: &mut Compiler, pos: Pos, lit: &ClassLiteral, dest_hint: Option<Reg>) -> CompileResult<Reg> {
    let mut calls_super = false;
    scan_for_super_call(&lit.constructor.body, &mut calls_super);

    let base_ctor_reg = match &lit.extends {
        Some(expr) => Some(crate::expr::compile_expr(c, expr, None)?),
        None => None,
    };
    let base_proto_reg = match base_ctor_reg {
        Some(ctor) => {
            let proto = c.frame().regs.alloc_temp(pos)?;
            c.emit(pos, Instruction::GetProto { dest: proto, src: ctor })?;
            Some(proto)
        }
        None => None,
    };

    // Step 3: derived prototype object, built like an ordinary object
    // literal whose prototype is the base class's and whose properties are
    // the class's methods (each itself a function literal, closing over
    // `base_proto_reg`/`base_ctor_reg` for `super`/`super.method()` access).
    let proto_reg = c.frame().regs.alloc_temp(pos)?;
    match base_proto_reg {
        Some(base_proto) => {
            c.emit(pos, Instruction::LoadObjProto { dest: proto_reg, proto: base_proto })?;
        }
        None => {
            c.emit(pos, Instruction::LoadObj { dest: proto_reg })?;
        }
    }
    for (name, method) in &lit.members {
        let method_reg = compile_method_literal(c, pos, method)?;
        crate::expr::emit_set_prop(c, pos, proto_reg, name, method_reg)?;
        c.frame().regs.free(method_reg);
    }

    // Step 4: the constructor itself, a function literal in constructor mode.
    let ctor_reg = compile_constructor(c, pos, &lit.constructor, base_ctor_reg, base_proto_reg, calls_super)?;

    // Step 5: attach the prototype to the class value.
    crate::expr::emit_set_prop(c, pos, ctor_reg, "prototype", proto_reg)?;

    if let Some(r) = base_ctor_reg {
        c.frame().regs.free(r);
    }
    if let Some(r) = base_proto_reg {
        c.frame().regs.free(r);
    }
    c.frame().regs.free(proto_reg);

    match dest_hint {
        Some(dest) if dest != ctor_reg => {
            c.emit(pos, Instruction::Move { dest, src: ctor_reg })?;
            c.frame().regs.free(ctor_reg);
            Ok(dest)
        }
        _ => Ok(ctor_reg),
    }
}

fn compile_method_literal(c: &mut Compiler, pos: Pos, method: &FunctionLiteral) -> CompileResult<Reg> {
    compile_function_literal(c, pos, method, None)
}

fn compile_constructor(
    c: &mut Compiler,
    pos: Pos,
    ctor: &FunctionLiteral,
    base_ctor_reg: Option<Reg>,
    base_proto_reg: Option<Reg>,
    calls_super: bool,
) -> CompileResult<Reg> {
    let captures = ctor.captures.clone();
    let const_idx = c.compile_function(ctor.scope, ctor.def_line, &ctor.body, |c, frame| {
        setup_function_frame(c, frame, ctor, &captures, pos)?;
        // Step 11: implicit `super(...)` when the body never calls one
        // explicitly and this class extends another.
        if base_ctor_reg.is_some() && !calls_super {
            let this = frame.this_reg;
            let base_ctor = frame.base_ctor_reg;
            frame.emitter.emit(
                pos,
                Instruction::CallN { dest: this, func: base_ctor, this, args: kos_bytecode::KOS_NO_REG, num_args: 0 },
            )?;
        }
        Ok(())
    })?;
    let has_binds = !captures.is_empty() || base_ctor_reg.is_some();
    c.patch_function_header(const_idx, |h| {
        h.flags.set_class(true);
        h.flags.set_closure(has_binds);
        if has_binds {
            h.load_selector =
                if const_idx.0 <= u8::MAX as u32 { kos_bytecode::LoadSelector::LoadFun8 } else { kos_bytecode::LoadSelector::LoadFun };
        }
    });
    let func_reg = c.frame().regs.alloc_temp(pos)?;
    emit_load_function_const(c, pos, func_reg, const_idx)?;
    // Slots 0/1 are reserved for the base constructor/prototype when this
    // class extends another (§4.4); remaining slots follow for any other
    // captured variables the constructor body itself closes over.
    let mut slot = 0u8;
    if let Some(base_ctor) = base_ctor_reg {
        c.emit(pos, Instruction::Bind { fun: func_reg, slot, src: base_ctor })?;
        slot += 1;
    }
    if let Some(base_proto) = base_proto_reg {
        c.emit(pos, Instruction::Bind { fun: func_reg, slot, src: base_proto })?;
        slot += 1;
    }
    for &var in &captures {
        let src = crate::assign::variable_register(c, pos, var)?;
        c.emit(pos, Instruction::Bind { fun: func_reg, slot, src })?;
        slot += 1;
    }
    emit_default_args(c, pos, func_reg, ctor)?;
    Ok(func_reg)
}
