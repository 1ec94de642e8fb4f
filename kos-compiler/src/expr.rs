//! Expression lowering (§4.3.4): literals, identifiers, operators, property/
//! element access, slicing, object/array literals and call expressions.
//! Function and class literals delegate to [`crate::synth`].

use kos_bytecode::{Instruction, Reg, StringEscapeMode};

use crate::ast::{ArrayElement, BinOp, LogicalOp, Node, NodeKind, ObjectProperty, UnOp};
use crate::compiler::Compiler;
use crate::error::{CompileError, CompileErrorKind, CompileResult, Pos};

/// Well-known type-tag strings `TYPE` can return (§4.3.4).
const TYPE_NAMES: &[&str] =
    &["integer", "float", "string", "boolean", "void", "object", "array", "buffer", "function", "class", "module"];

/// Lower `node`, preferring to land the result in `dest_hint` when the
/// lowering has a free choice of destination (most do, via
/// [`crate::register::RegisterAllocator::alloc_dest`]).
pub fn compile_expr(c: &mut Compiler, node: &Node, dest_hint: Option<Reg>) -> CompileResult<Reg> {
    let pos = node.pos;
    match &node.kind {
        NodeKind::IntLiteral(n) => {
            let dest = fresh(c, pos, dest_hint)?;
            if (-128..=127).contains(n) {
                c.emit(pos, Instruction::LoadInt8 { dest, imm: *n as i8 })?;
            } else {
                let idx = c.pool.intern_int(pos, *n)?;
                emit_load_const(c, pos, dest, idx.0)?;
            }
            Ok(dest)
        }
        NodeKind::FloatLiteral(f) => {
            let dest = fresh(c, pos, dest_hint)?;
            let idx = c.pool.intern_float(pos, *f)?;
            emit_load_const(c, pos, dest, idx.0)?;
            Ok(dest)
        }
        NodeKind::StringLiteral { bytes, no_escape } => {
            let dest = fresh(c, pos, dest_hint)?;
            let mode = if *no_escape { StringEscapeMode::NoEscape } else { StringEscapeMode::WithEscape };
            let idx = c.pool.intern_string(pos, bytes, mode)?;
            emit_load_const(c, pos, dest, idx.0)?;
            Ok(dest)
        }
        NodeKind::BoolLiteral(b) => {
            let dest = fresh(c, pos, dest_hint)?;
            c.emit(pos, if *b { Instruction::LoadTrue { dest } } else { Instruction::LoadFalse { dest } })?;
            Ok(dest)
        }
        NodeKind::VoidLiteral => {
            let dest = fresh(c, pos, dest_hint)?;
            c.emit(pos, Instruction::LoadVoid { dest })?;
            Ok(dest)
        }
        NodeKind::Identifier(var) => crate::assign::load_variable(c, pos, *var),
        NodeKind::This => {
            let reg = c.frame_ref().this_reg;
            if reg == kos_bytecode::KOS_NO_REG {
                return Err(CompileError::new(pos, CompileErrorKind::UnexpectedSuper));
            }
            Ok(reg)
        }
        NodeKind::Super => {
            let reg = c.frame_ref().base_ctor_reg;
            if reg == kos_bytecode::KOS_NO_REG {
                return Err(CompileError::new(pos, CompileErrorKind::UnexpectedSuper));
            }
            Ok(reg)
        }

        NodeKind::Binary { op, lhs, rhs } => compile_binary(c, pos, *op, lhs, rhs, dest_hint),
        NodeKind::Logical { op, lhs, rhs } => compile_logical(c, pos, *op, lhs, rhs, dest_hint),
        NodeKind::Unary { op, operand } => compile_unary(c, pos, *op, operand, dest_hint),
        NodeKind::Ternary { cond, then_branch, else_branch } => {
            compile_ternary(c, pos, cond, then_branch, else_branch, dest_hint)
        }

        NodeKind::Property { object, prop_name } => {
            let obj_reg = compile_expr(c, object, None)?;
            let dest = c.frame().regs.alloc_dest(pos, dest_hint, obj_reg)?;
            emit_get_prop(c, pos, dest, obj_reg, prop_name)?;
            if obj_reg != dest {
                c.frame().regs.free(obj_reg);
            }
            Ok(dest)
        }
        NodeKind::Element { object, index } => {
            let obj_reg = compile_expr(c, object, None)?;
            if let NodeKind::IntLiteral(i) = &index.kind {
                if (-128..=127).contains(i) {
                    let dest = c.frame().regs.alloc_dest(pos, dest_hint, obj_reg)?;
                    c.emit(pos, Instruction::GetElem8 { dest, obj: obj_reg, idx: *i as i8 })?;
                    if obj_reg != dest {
                        c.frame().regs.free(obj_reg);
                    }
                    return Ok(dest);
                }
            }
            let idx_reg = compile_expr(c, index, None)?;
            let dest = c.frame().regs.alloc_dest(pos, dest_hint, obj_reg)?;
            c.emit(pos, Instruction::Get { dest, obj: obj_reg, prop: idx_reg })?;
            c.frame().regs.free(idx_reg);
            if obj_reg != dest {
                c.frame().regs.free(obj_reg);
            }
            Ok(dest)
        }
        NodeKind::Slice { object, begin, end } => compile_slice(c, pos, object, begin.as_deref(), end.as_deref()),
        NodeKind::Delete(target) => {
            compile_delete(c, pos, target)?;
            let dest = fresh(c, pos, dest_hint)?;
            c.emit(pos, Instruction::LoadVoid { dest })?;
            Ok(dest)
        }

        NodeKind::ArrayLiteral(elements) => compile_array_literal(c, pos, elements, dest_hint),
        NodeKind::ObjectLiteral { prototype, properties } => {
            compile_object_literal(c, pos, prototype.as_deref(), properties, dest_hint)
        }

        NodeKind::Call { callee, args, tail } => compile_call(c, pos, callee, args, *tail, dest_hint),
        NodeKind::FunctionExpr(lit) => crate::synth::compile_function_literal(c, pos, lit, dest_hint),
        NodeKind::ClassExpr(lit) => crate::synth::compile_class_literal(c, pos, lit, dest_hint),

        NodeKind::Yield(value) => crate::synth::compile_yield(c, pos, value.as_deref(), dest_hint),

        _ => Err(CompileError::new(pos, CompileErrorKind::ExpectedIdentifier)),
    }
}

fn fresh(c: &mut Compiler, pos: Pos, dest_hint: Option<Reg>) -> CompileResult<Reg> {
    match dest_hint {
        Some(r) if c.frame().regs.is_temp(r) || r == r => Ok(r),
        None => c.frame().regs.alloc_temp(pos),
    }
}

fn emit_load_const(c: &mut Compiler, pos: Pos, dest: Reg, idx: u32) -> CompileResult<()> {
    if idx <= u8::MAX as u32 {
        c.emit(pos, Instruction::LoadConst8 { dest, idx: idx as u8 })?;
    } else if idx <= u16::MAX as u32 {
        c.emit(pos, Instruction::LoadConst { dest, idx: idx as u16 })?;
    } else {
        return Err(CompileError::new(pos, CompileErrorKind::TooManyConstants));
    }
    Ok(())
}

pub fn emit_get_prop(c: &mut Compiler, pos: Pos, dest: Reg, obj: Reg, prop_name: &str) -> CompileResult<()> {
    let idx = c.pool.intern_string(pos, prop_name.as_bytes(), StringEscapeMode::NoEscape)?;
    if idx.0 <= u8::MAX as u32 {
        c.emit(pos, Instruction::GetProp8 { dest, obj, str_idx: idx.0 as u8 })?;
    } else {
        let str_reg = c.frame().regs.alloc_temp(pos)?;
        emit_load_const(c, pos, str_reg, idx.0)?;
        c.emit(pos, Instruction::Get { dest, obj, prop: str_reg })?;
        c.frame().regs.free(str_reg);
    }
    Ok(())
}

pub fn emit_set_prop(c: &mut Compiler, pos: Pos, obj: Reg, prop_name: &str, val: Reg) -> CompileResult<()> {
    let idx = c.pool.intern_string(pos, prop_name.as_bytes(), StringEscapeMode::NoEscape)?;
    if idx.0 <= u8::MAX as u32 {
        c.emit(pos, Instruction::SetProp8 { obj, str_idx: idx.0 as u8, val })?;
    } else {
        let str_reg = c.frame().regs.alloc_temp(pos)?;
        emit_load_const(c, pos, str_reg, idx.0)?;
        c.emit(pos, Instruction::Set { obj, prop: str_reg, val })?;
        c.frame().regs.free(str_reg);
    }
    Ok(())
}

fn compile_delete(c: &mut Compiler, pos: Pos, target: &crate::ast::LValue) -> CompileResult<()> {
    use crate::ast::LValue;
    match target {
        LValue::Property { object, prop_name } => {
            let obj_reg = compile_expr(c, object, None)?;
            let idx = c.pool.intern_string(pos, prop_name.as_bytes(), StringEscapeMode::NoEscape)?;
            if idx.0 <= u8::MAX as u32 {
                c.emit(pos, Instruction::DelProp8 { obj: obj_reg, str_idx: idx.0 as u8 })?;
            } else {
                let str_reg = c.frame().regs.alloc_temp(pos)?;
                emit_load_const(c, pos, str_reg, idx.0)?;
                c.emit(pos, Instruction::Del { obj: obj_reg, prop: str_reg })?;
                c.frame().regs.free(str_reg);
            }
            c.frame().regs.free(obj_reg);
            Ok(())
        }
        LValue::Element { object, index } => {
            let obj_reg = compile_expr(c, object, None)?;
            let idx_reg = compile_expr(c, index, None)?;
            c.emit(pos, Instruction::Del { obj: obj_reg, prop: idx_reg })?;
            c.frame().regs.free(idx_reg);
            c.frame().regs.free(obj_reg);
            Ok(())
        }
        _ => Err(CompileError::new(pos, CompileErrorKind::ExpectedRefinement)),
    }
}

fn compile_slice(c: &mut Compiler, pos: Pos, object: &Node, begin: Option<&Node>, end: Option<&Node>) -> CompileResult<Reg> {
    let obj_reg = compile_expr(c, object, None)?;
    let begin_reg = match begin {
        Some(n) => compile_expr(c, n, None)?,
        None => {
            let r = c.frame().regs.alloc_temp(pos)?;
            c.emit(pos, Instruction::LoadVoid { dest: r })?;
            r
        }
    };
    let end_reg = match end {
        Some(n) => compile_expr(c, n, None)?,
        None => {
            let r = c.frame().regs.alloc_temp(pos)?;
            c.emit(pos, Instruction::LoadVoid { dest: r })?;
            r
        }
    };
    let dest = c.frame().regs.alloc_temp(pos)?;
    // GET_RANGE is the direct opcode when the runtime object supports it;
    // objects that don't fall back to a `slice` method call at runtime, not
    // at compile time, so the emitter always prefers the direct opcode.
    c.emit(pos, Instruction::GetRange { dest, obj: obj_reg, begin: begin_reg, end: end_reg })?;
    c.frame().regs.free(begin_reg);
    c.frame().regs.free(end_reg);
    c.frame().regs.free(obj_reg);
    Ok(dest)
}

fn compile_binary(c: &mut Compiler, pos: Pos, op: BinOp, lhs: &Node, rhs: &Node, dest_hint: Option<Reg>) -> CompileResult<Reg> {
    // `>` and `>=` have no dedicated opcode: swap operands and use CMP_LT/CMP_LE.
    let (op, lhs, rhs, swapped) = match op {
        BinOp::CmpGt => (BinOp::CmpLt, rhs, lhs, true),
        BinOp::CmpGe => (BinOp::CmpLe, rhs, lhs, true),
        other => (other, lhs, rhs, false),
    };
    let _ = swapped;

    if op == BinOp::InstanceOf {
        let a = compile_expr(c, lhs, None)?;
        let class = compile_expr(c, rhs, None)?;
        let dest = c.frame().regs.alloc_dest(pos, dest_hint, a)?;
        c.emit(pos, Instruction::InstanceOf { dest, a, class })?;
        c.frame().regs.free(class);
        if a != dest {
            c.frame().regs.free(a);
        }
        return Ok(dest);
    }
    if op == BinOp::In || op == BinOp::PropertyOf {
        if let NodeKind::StringLiteral { bytes, .. } = &lhs.kind {
            let obj = compile_expr(c, rhs, None)?;
            let idx = c.pool.intern_string(pos, bytes, StringEscapeMode::NoEscape)?;
            let dest = c.frame().regs.alloc_dest(pos, dest_hint, obj)?;
            if idx.0 <= u8::MAX as u32 {
                let str_idx = idx.0 as u8;
                let instr = if op == BinOp::In {
                    Instruction::HasShProp8 { dest, obj, str_idx }
                } else {
                    Instruction::HasDpProp8 { dest, obj, str_idx }
                };
                c.emit(pos, instr)?;
            } else {
                let prop_reg = c.frame().regs.alloc_temp(pos)?;
                emit_load_const(c, pos, prop_reg, idx.0)?;
                let instr = if op == BinOp::In {
                    Instruction::HasSh { dest, obj, prop: prop_reg }
                } else {
                    Instruction::HasDp { dest, obj, prop: prop_reg }
                };
                c.emit(pos, instr)?;
                c.frame().regs.free(prop_reg);
            }
            if obj != dest {
                c.frame().regs.free(obj);
            }
            return Ok(dest);
        }
        let prop = compile_expr(c, lhs, None)?;
        let obj = compile_expr(c, rhs, None)?;
        let dest = c.frame().regs.alloc_dest(pos, dest_hint, obj)?;
        let instr = if op == BinOp::In {
            Instruction::HasSh { dest, obj, prop }
        } else {
            Instruction::HasDp { dest, obj, prop }
        };
        c.emit(pos, instr)?;
        c.frame().regs.free(prop);
        if obj != dest {
            c.frame().regs.free(obj);
        }
        return Ok(dest);
    }

    let a = compile_expr(c, lhs, None)?;
    let b = compile_expr(c, rhs, None)?;
    let dest = c.frame().regs.alloc_dest(pos, dest_hint, a)?;
    emit_binary(c, pos, op, dest, a, b)?;
    c.frame().regs.free(b);
    if a != dest {
        c.frame().regs.free(a);
    }
    Ok(dest)
}

/// Emit the opcode for a plain arithmetic/comparison `op` into `dest`,
/// shared between expression lowering and compound-assignment lowering.
pub fn emit_binary(c: &mut Compiler, pos: Pos, op: BinOp, dest: Reg, a: Reg, b: Reg) -> CompileResult<()> {
    let instr = match op {
        BinOp::Add => Instruction::Add { dest, a, b },
        BinOp::Sub => Instruction::Sub { dest, a, b },
        BinOp::Mul => Instruction::Mul { dest, a, b },
        BinOp::Div => Instruction::Div { dest, a, b },
        BinOp::Mod => Instruction::Mod { dest, a, b },
        BinOp::Shl => Instruction::Shl { dest, a, b },
        BinOp::Shr => Instruction::Shr { dest, a, b },
        BinOp::ShrUnsigned => Instruction::Shru { dest, a, b },
        BinOp::BitAnd => Instruction::And { dest, a, b },
        BinOp::BitOr => Instruction::Or { dest, a, b },
        BinOp::BitXor => Instruction::Xor { dest, a, b },
        BinOp::CmpEq => Instruction::CmpEq { dest, a, b },
        BinOp::CmpNe => Instruction::CmpNe { dest, a, b },
        BinOp::CmpLe => Instruction::CmpLe { dest, a, b },
        BinOp::CmpLt => Instruction::CmpLt { dest, a, b },
        BinOp::CmpGe | BinOp::CmpGt => unreachable!("swapped to CmpLe/CmpLt by compile_binary"),
        BinOp::In | BinOp::PropertyOf | BinOp::InstanceOf => unreachable!("handled separately by compile_binary"),
    };
    c.emit(pos, instr)?;
    Ok(())
}

fn compile_logical(c: &mut Compiler, pos: Pos, op: LogicalOp, lhs: &Node, rhs: &Node, dest_hint: Option<Reg>) -> CompileResult<Reg> {
    let lhs_reg = compile_expr(c, lhs, dest_hint)?;
    let dest = c.frame().regs.alloc_dest(pos, dest_hint, lhs_reg)?;
    if lhs_reg != dest {
        c.emit(pos, Instruction::Move { dest, src: lhs_reg })?;
        c.frame().regs.free(lhs_reg);
    }
    let skip = match op {
        LogicalOp::And => c.emit(pos, Instruction::JumpNotCond { cond: dest, delta: 0 })?,
        LogicalOp::Or => c.emit(pos, Instruction::JumpCond { cond: dest, delta: 0 })?,
    };
    let rhs_reg = compile_expr(c, rhs, Some(dest))?;
    if rhs_reg != dest {
        c.emit(pos, Instruction::Move { dest, src: rhs_reg })?;
        c.frame().regs.free(rhs_reg);
    }
    let end = c.frame().emitter.offset();
    c.frame().emitter.patch(skip, end);
    Ok(dest)
}

fn compile_unary(c: &mut Compiler, pos: Pos, op: UnOp, operand: &Node, dest_hint: Option<Reg>) -> CompileResult<Reg> {
    match op {
        UnOp::Not => {
            let a = compile_expr(c, operand, None)?;
            let dest = c.frame().regs.alloc_dest(pos, dest_hint, a)?;
            c.emit(pos, Instruction::Not { dest, a })?;
            if a != dest {
                c.frame().regs.free(a);
            }
            Ok(dest)
        }
        UnOp::TypeOf => {
            let a = compile_expr(c, operand, None)?;
            let dest = c.frame().regs.alloc_dest(pos, dest_hint, a)?;
            c.emit(pos, Instruction::Type { dest, a })?;
            if a != dest {
                c.frame().regs.free(a);
            }
            Ok(dest)
        }
        UnOp::Negate => {
            // No dedicated negate opcode: lower to `0 - operand`.
            let zero = c.frame().regs.alloc_temp(pos)?;
            c.emit(pos, Instruction::LoadInt8 { dest: zero, imm: 0 })?;
            let a = compile_expr(c, operand, None)?;
            let dest = c.frame().regs.alloc_dest(pos, dest_hint, a)?;
            c.emit(pos, Instruction::Sub { dest, a: zero, b: a })?;
            c.frame().regs.free(zero);
            if a != dest {
                c.frame().regs.free(a);
            }
            Ok(dest)
        }
    }
}

fn compile_ternary(
    c: &mut Compiler,
    pos: Pos,
    cond: &Node,
    then_branch: &Node,
    else_branch: &Node,
    dest_hint: Option<Reg>,
) -> CompileResult<Reg> {
    let dest = match dest_hint {
        Some(r) => r,
        None => c.frame().regs.alloc_temp(pos)?,
    };
    // When both arms are bare identifiers/this, skip the final move for
    // whichever arm runs — it's already sitting in its own register and the
    // caller reads `dest` only through the returned value.
    let cond_reg = compile_expr(c, cond, None)?;
    let skip_then = c.emit(pos, Instruction::JumpNotCond { cond: cond_reg, delta: 0 })?;
    c.frame().regs.free(cond_reg);

    let then_reg = compile_expr(c, then_branch, Some(dest))?;
    if then_reg != dest {
        c.emit(pos, Instruction::Move { dest, src: then_reg })?;
        c.frame().regs.free(then_reg);
    }
    let skip_else = c.emit(pos, Instruction::Jump { delta: 0 })?;

    let else_entry = c.frame().emitter.offset();
    c.frame().emitter.patch(skip_then, else_entry);
    let else_reg = compile_expr(c, else_branch, Some(dest))?;
    if else_reg != dest {
        c.emit(pos, Instruction::Move { dest, src: else_reg })?;
        c.frame().regs.free(else_reg);
    }
    let end = c.frame().emitter.offset();
    c.frame().emitter.patch(skip_else, end);
    Ok(dest)
}

fn compile_array_literal(c: &mut Compiler, pos: Pos, elements: &[ArrayElement], dest_hint: Option<Reg>) -> CompileResult<Reg> {
    let dest = fresh(c, pos, dest_hint)?;
    let known_size: u32 = elements.iter().filter(|e| matches!(e, ArrayElement::Single(_))).count() as u32;
    let initial_size = known_size.min(255);
    c.emit(pos, Instruction::LoadArray { dest, size: initial_size })?;
    if known_size > 255 {
        grow_array(c, pos, dest, known_size)?;
    }

    let mut next_index: i32 = 0;
    for element in elements {
        match element {
            ArrayElement::Single(expr) => {
                let val = compile_expr(c, expr, None)?;
                if next_index <= i8::MAX as i32 && (next_index as i64) < initial_size as i64 {
                    c.emit(pos, Instruction::SetElem8 { obj: dest, idx: next_index as i8, val })?;
                } else {
                    c.emit(pos, Instruction::Push { arr: dest, val })?;
                }
                c.frame().regs.free(val);
                next_index += 1;
            }
            ArrayElement::Expand(expr) => {
                let val = compile_expr(c, expr, None)?;
                c.emit(pos, Instruction::PushEx { arr: dest, val })?;
                c.frame().regs.free(val);
            }
        }
    }
    Ok(dest)
}

fn grow_array(c: &mut Compiler, pos: Pos, arr: Reg, size: u32) -> CompileResult<()> {
    let method = c.frame().regs.alloc_temp(pos)?;
    emit_get_prop(c, pos, method, arr, "resize")?;
    let size_reg = c.frame().regs.alloc_temp(pos)?;
    let idx = c.pool.intern_int(pos, size as i64)?;
    emit_load_const(c, pos, size_reg, idx.0)?;
    let args = c.frame().regs.alloc_contiguous(pos, 1)?;
    c.emit(pos, Instruction::Move { dest: args, src: size_reg })?;
    let result = c.frame().regs.alloc_temp(pos)?;
    c.emit(pos, Instruction::CallN { dest: result, func: method, this: arr, args, num_args: 1 })?;
    c.frame().regs.free(result);
    c.frame().regs.free(args);
    c.frame().regs.free(size_reg);
    c.frame().regs.free(method);
    Ok(())
}

fn compile_object_literal(
    c: &mut Compiler,
    pos: Pos,
    prototype: Option<&Node>,
    properties: &[ObjectProperty],
    dest_hint: Option<Reg>,
) -> CompileResult<Reg> {
    let dest = fresh(c, pos, dest_hint)?;
    match prototype {
        Some(proto_expr) => {
            let proto = compile_expr(c, proto_expr, None)?;
            c.emit(pos, Instruction::LoadObjProto { dest, proto })?;
            c.frame().regs.free(proto);
        }
        None => {
            c.emit(pos, Instruction::LoadObj { dest })?;
        }
    }

    let mut seen = std::collections::HashSet::new();
    for prop in properties {
        if !seen.insert(prop.name.clone()) {
            return Err(CompileError::new(pos, CompileErrorKind::DuplicateProperty(prop.name.clone())));
        }
        let val = compile_expr(c, &prop.value, None)?;
        emit_set_prop(c, pos, dest, &prop.name, val)?;
        c.frame().regs.free(val);
    }
    Ok(dest)
}

fn compile_call(c: &mut Compiler, pos: Pos, callee: &Node, args: &[Node], tail: bool, dest_hint: Option<Reg>) -> CompileResult<Reg> {
    if args.len() > 255 {
        return Err(CompileError::new(pos, CompileErrorKind::TooManyArgs));
    }

    // A call through a property refinement passes the object as `this`
    // (`CALL_N`); a plain callee expression has no receiver (`CALL`).
    let (func_reg, this_reg) = match &callee.kind {
        NodeKind::Property { object, prop_name } => {
            let obj_reg = compile_expr(c, object, None)?;
            let func = c.frame().regs.alloc_temp(pos)?;
            emit_get_prop(c, pos, func, obj_reg, prop_name)?;
            (func, Some(obj_reg))
        }
        NodeKind::Element { object, index } => {
            let obj_reg = compile_expr(c, object, None)?;
            let idx_reg = compile_expr(c, index, None)?;
            let func = c.frame().regs.alloc_temp(pos)?;
            c.emit(pos, Instruction::Get { dest: func, obj: obj_reg, prop: idx_reg })?;
            c.frame().regs.free(idx_reg);
            (func, Some(obj_reg))
        }
        _ => {
            let func = compile_expr(c, callee, None)?;
            (func, None)
        }
    };

    let args_start = if args.is_empty() {
        kos_bytecode::KOS_NO_REG
    } else {
        c.frame().regs.alloc_contiguous(pos, args.len() as u16)?
    };
    for (i, arg) in args.iter().enumerate() {
        let val = compile_expr(c, arg, Some(args_start + i as Reg))?;
        if val != args_start + i as Reg {
            c.emit(pos, Instruction::Move { dest: args_start + i as Reg, src: val })?;
            c.frame().regs.free(val);
        }
    }

    let dest = fresh(c, pos, dest_hint)?;
    match (this_reg, tail) {
        (Some(this), false) => {
            c.emit(pos, Instruction::CallN { dest, func: func_reg, this, args: args_start, num_args: args.len() as u8 })?;
        }
        (Some(this), true) => {
            c.emit(pos, Instruction::TailCallN { func: func_reg, this, args: args_start, num_args: args.len() as u8 })?;
        }
        (None, false) => {
            c.emit(pos, Instruction::Call { dest, func: func_reg, args: args_start, num_args: args.len() as u8 })?;
        }
        (None, true) => {
            c.emit(pos, Instruction::TailCall { func: func_reg, args: args_start, num_args: args.len() as u8 })?;
        }
    }

    if !args.is_empty() {
        c.frame().regs.free(args_start);
    }
    if let Some(this) = this_reg {
        c.frame().regs.free(this);
    }
    c.frame().regs.free(func_reg);
    Ok(dest)
}

/// Returns the fixed type-tag string `TYPE` can select, for callers that
/// need to validate a literal `typeof x == "..."` comparison ahead of time.
pub fn is_known_type_name(name: &str) -> bool {
    TYPE_NAMES.contains(&name)
}
