//! The dispatch loop (§4.5): decodes one function's bytecode at a time,
//! executing each instruction's semantics against the active [`CallFrame`]'s
//! registers. Calls recurse straight into [`Interpreter::run_frame`] (deep-
//! stack mode, the simpler of the two execution models §4.5 allows) rather
//! than driving a separate trampoline loop; the [`Stack`]'s `max_depth`
//! ceiling turns runaway script recursion into a catchable `StackOverflow`
//! instead of exhausting the host's own stack. Tail calls still recurse one
//! level under this model — see the doc comment on `exec_tail_call` — so
//! they're semantically correct but not O(1) stack space.

use std::cell::RefCell;
use std::rc::Rc;

use kos_bytecode::{Instruction, Reg};

use crate::call::{self, CallArgs};
use crate::error::{Exception, RuntimeErrorKind, VmResult};
use crate::exception;
use crate::frame::{CallFrame, CatchInfo, Stack};
use crate::function::{FunctionValue, GeneratorState};
use crate::generator::{self, Driven};
use crate::module::Module;
use crate::value::{KosIter, PropSlot, RcStr, Value};

/// How a frame's dispatch loop ended: a plain `RETURN`, or a `YIELD` that
/// also reports which register it yielded from (so the generator's next
/// `NEXT` resumption knows where to write the resume value back to).
pub enum FrameExit {
    Returned(Value),
    Yielded(Value, Reg),
}

pub struct Interpreter {
    pub modules: Vec<Rc<Module>>,
    pub stack: Stack,
}

impl Interpreter {
    pub fn new(modules: Vec<Rc<Module>>, max_stack_depth: usize) -> Self {
        Interpreter { modules, stack: Stack::new(max_stack_depth) }
    }

    /// Load the entry function out of `modules[entry_module_idx]` and run it
    /// with no receiver and no arguments — the module's top-level code.
    pub fn execute(&mut self, entry_module_idx: usize, entry_fn_idx: u32) -> VmResult<Value> {
        let module = self.modules[entry_module_idx].clone();
        let header = module.function_header(entry_fn_idx).clone();
        let f = Rc::new(FunctionValue::new(header, module));
        self.call_value(Value::Function(f), Value::Void, CallArgs::Positional(Vec::new()))
    }

    #[tracing::instrument(skip(self, args), level = "trace")]
    pub fn call_value(&mut self, target: Value, this: Value, args: CallArgs) -> VmResult<Value> {
        let f = match target {
            Value::Function(f) => f,
            other => return Err(Exception::from(RuntimeErrorKind::NotCallable(other.type_name()))),
        };

        if let Some(native) = f.native.clone() {
            let resolved = call::resolve_args(&f, args)?;
            return native(this, &resolved.positional);
        }

        if f.is_generator() {
            let mut registers = vec![Value::Void; f.header.total_regs as usize];
            let resolved = call::resolve_args(&f, args)?;
            call::setup_call_registers(&mut registers, &f, this, resolved)?;
            return Ok(generator::instantiate(&f, registers));
        }

        let is_class = f.is_class();
        let call_this = if is_class && matches!(this, Value::Void) { call::fresh_instance(&f) } else { this };
        let ctor_this = call_this.clone();

        let mut registers = vec![Value::Void; f.header.total_regs as usize];
        let resolved = call::resolve_args(&f, args)?;
        call::setup_call_registers(&mut registers, &f, call_this, resolved)?;

        self.stack.push(CallFrame::new(f, registers))?;
        let result = self.run_frame();
        self.stack.pop();
        match result? {
            FrameExit::Returned(v) => {
                if is_class {
                    Ok(match v {
                        Value::Object(_) | Value::Function(_) => v,
                        _ => ctor_this,
                    })
                } else {
                    Ok(v)
                }
            }
            FrameExit::Yielded(..) => unreachable!("YIELD only appears inside a generator body"),
        }
    }

    fn generator_instance(&mut self, f: Rc<FunctionValue>) -> VmResult<Rc<FunctionValue>> {
        let is_init = matches!(f.generator.as_ref().expect("caller checked is_generator").borrow().state, GeneratorState::Init);
        if !is_init {
            return Ok(f);
        }
        match self.call_value(Value::Function(f), Value::Void, CallArgs::Positional(Vec::new()))? {
            Value::Function(inst) => Ok(inst),
            _ => unreachable!("instantiating a generator always yields a function value"),
        }
    }

    fn drive_generator(&mut self, f: Rc<FunctionValue>, resume_value: Value) -> VmResult<Driven> {
        let resumption = generator::begin_resume(&f, resume_value)?;
        let frame = match resumption {
            generator::Resumption::Start { registers } => CallFrame::new(f.clone(), registers),
            generator::Resumption::Continue { registers, ip, catch_info } => {
                let mut fr = CallFrame::new(f.clone(), registers);
                fr.ip = ip;
                fr.catch_info = catch_info;
                fr
            }
        };
        self.stack.push(frame)?;
        let result = self.run_frame();
        let frame = self.stack.pop().expect("generator frame was just pushed");
        match result {
            Ok(FrameExit::Yielded(v, yield_reg)) => {
                generator::suspend(&f, frame.registers, frame.ip, frame.catch_info, yield_reg);
                Ok(Driven::Value(v))
            }
            Ok(FrameExit::Returned(_)) => {
                generator::finish(&f);
                Ok(Driven::Done)
            }
            Err(e) => {
                generator::finish(&f);
                Err(e)
            }
        }
    }

    fn next_value(&mut self, v: Value) -> VmResult<Driven> {
        match v {
            Value::Function(f) if f.is_generator() => {
                let instance = self.generator_instance(f)?;
                self.drive_generator(instance, Value::Void)
            }
            Value::Iterator(it) => Ok(match it.borrow_mut().next() {
                Some(val) => Driven::Value(val),
                None => Driven::Done,
            }),
            other => Err(Exception::from(RuntimeErrorKind::NotIterable(other.type_name()))),
        }
    }

    pub fn run_frame(&mut self) -> VmResult<FrameExit> {
        loop {
            let (inst, next_ip) = {
                let frame = self.stack.top();
                let module = &frame.function.module;
                let header = &frame.function.header;
                let code_off = header.bytecode_offset as usize + frame.ip as usize;
                let (inst, len) = Instruction::read_from(&module.code[code_off..])
                    .map_err(|_| Exception::from(RuntimeErrorKind::InvalidInstruction))?;
                (inst, frame.ip + len as u32)
            };
            self.stack.top_mut().ip = next_ip;

            match self.exec_one(inst, next_ip) {
                Ok(None) => continue,
                Ok(Some(exit)) => return Ok(exit),
                Err(exn) => {
                    let handled =
                        exception::catch_in_frame(self.stack.top_mut(), &exn, |frame, reg, exn| frame.set(reg, exn.0.clone()));
                    match handled {
                        Some(offset) => {
                            self.stack.top_mut().ip = offset;
                            continue;
                        }
                        None => return Err(exn),
                    }
                }
            }
        }
    }

    fn exec_one(&mut self, inst: Instruction, next_ip: u32) -> VmResult<Option<FrameExit>> {
        use Instruction::*;

        match inst {
            LoadConst { dest, idx } => self.set_const(dest, idx as u32),
            LoadConst8 { dest, idx } => self.set_const(dest, idx as u32),
            LoadFun { dest, idx } => self.set_fun(dest, idx as u32),
            LoadFun8 { dest, idx } => self.set_fun(dest, idx as u32),
            LoadInt8 { dest, imm } => self.stack.top_mut().set(dest, Value::Int(imm as i64)),
            LoadTrue { dest } => self.stack.top_mut().set(dest, Value::Bool(true)),
            LoadFalse { dest } => self.stack.top_mut().set(dest, Value::Bool(false)),
            LoadVoid { dest } => self.stack.top_mut().set(dest, Value::Void),
            LoadArray { dest, size } => self.stack.top_mut().set(dest, Value::array(vec![Value::Void; size as usize])),
            LoadObj { dest } => self.stack.top_mut().set(dest, Value::object(None)),
            LoadObjProto { dest, proto } => {
                let proto = self.stack.top().get(proto);
                self.stack.top_mut().set(dest, Value::object(Some(proto)));
            }
            LoadIter { dest, src } => {
                let v = self.stack.top().get(src);
                let it = self.load_iter(v)?;
                self.stack.top_mut().set(dest, it);
            }

            Move { dest, src } => {
                let v = self.stack.top().get(src);
                self.stack.top_mut().set(dest, v);
            }
            GetProto { dest, src } => {
                let v = self.stack.top().get(src);
                let proto = match v {
                    Value::Object(o) => o.borrow().proto.clone().unwrap_or(Value::Void),
                    _ => Value::Void,
                };
                self.stack.top_mut().set(dest, proto);
            }

            GetGlobal { dest, idx } => {
                let module = self.stack.top().function.module.clone();
                let v = module.globals.borrow()[idx as usize].clone();
                self.stack.top_mut().set(dest, v);
            }
            SetGlobal { idx, src } => {
                let v = self.stack.top().get(src);
                let module = self.stack.top().function.module.clone();
                module.globals.borrow_mut()[idx as usize] = v;
            }
            GetMod { dest, module_idx } => {
                let m = &self.modules[module_idx as usize];
                let obj = Value::object(None);
                if let Value::Object(o) = &obj {
                    let mut o = o.borrow_mut();
                    for (name, &slot) in &m.global_names {
                        o.props.insert(name.clone(), PropSlot::Value(m.globals.borrow()[slot as usize].clone()));
                    }
                }
                self.stack.top_mut().set(dest, obj);
            }
            GetModElem { dest, module_idx, elem_idx } => {
                let v = self.modules[module_idx as usize].const_value(elem_idx);
                self.stack.top_mut().set(dest, v);
            }
            GetModGlobal { dest, module_idx, global_idx } => {
                let v = self.modules[module_idx as usize].globals.borrow()[global_idx as usize].clone();
                self.stack.top_mut().set(dest, v);
            }

            Get { dest, obj, prop } => {
                let (obj, prop) = (self.stack.top().get(obj), self.stack.top().get(prop));
                let v = self.generic_get(obj, prop)?;
                self.stack.top_mut().set(dest, v);
            }
            GetElem { dest, obj, idx } => {
                let obj = self.stack.top().get(obj);
                let v = self.get_indexed(&obj, idx as i64)?;
                self.stack.top_mut().set(dest, v);
            }
            GetElem8 { dest, obj, idx } => {
                let obj = self.stack.top().get(obj);
                let v = self.get_indexed(&obj, idx as i64)?;
                self.stack.top_mut().set(dest, v);
            }
            GetProp8 { dest, obj, str_idx } => {
                let obj = self.stack.top().get(obj);
                let module = self.stack.top().function.module.clone();
                let name = module.const_str(str_idx as u32);
                let v = self.prop_get(&obj, &name)?;
                self.stack.top_mut().set(dest, v);
            }
            GetRange { dest, obj, begin, end } => {
                let (obj, begin, end) = (self.stack.top().get(obj), self.stack.top().get(begin), self.stack.top().get(end));
                let v = self.get_range(&obj, &begin, &end)?;
                self.stack.top_mut().set(dest, v);
            }
            Set { obj, prop, val } => {
                let (obj, prop, val) = (self.stack.top().get(obj), self.stack.top().get(prop), self.stack.top().get(val));
                self.generic_set(obj, prop, val)?;
            }
            SetElem { obj, idx, val } => {
                let (obj, val) = (self.stack.top().get(obj), self.stack.top().get(val));
                self.set_indexed(&obj, idx as i64, val)?;
            }
            SetElem8 { obj, idx, val } => {
                let (obj, val) = (self.stack.top().get(obj), self.stack.top().get(val));
                self.set_indexed(&obj, idx as i64, val)?;
            }
            SetProp8 { obj, str_idx, val } => {
                let (obj, val) = (self.stack.top().get(obj), self.stack.top().get(val));
                let module = self.stack.top().function.module.clone();
                let name = module.const_str(str_idx as u32);
                self.prop_set(&obj, name, val)?;
            }
            Del { obj, prop } => {
                let (obj, prop) = (self.stack.top().get(obj), self.stack.top().get(prop));
                self.generic_del(obj, prop)?;
            }
            DelProp8 { obj, str_idx } => {
                let obj = self.stack.top().get(obj);
                let module = self.stack.top().function.module.clone();
                let name = module.const_str(str_idx as u32);
                prop_del(&obj, &name)?;
            }
            Push { arr, val } => {
                let (arr, val) = (self.stack.top().get(arr), self.stack.top().get(val));
                match arr {
                    Value::Array(a) => a.borrow_mut().push(val),
                    other => return Err(Exception::from(RuntimeErrorKind::NotIndexable(other.type_name()))),
                }
            }
            PushEx { arr, val } => {
                let (arr, val) = (self.stack.top().get(arr), self.stack.top().get(val));
                match arr {
                    Value::Array(a) => self.spread_into(&a, val)?,
                    other => return Err(Exception::from(RuntimeErrorKind::NotIndexable(other.type_name()))),
                }
            }

            Add { dest, a, b } => self.binop(dest, a, b, crate::alu::add)?,
            Sub { dest, a, b } => self.binop(dest, a, b, crate::alu::sub)?,
            Mul { dest, a, b } => self.binop(dest, a, b, crate::alu::mul)?,
            Div { dest, a, b } => self.binop(dest, a, b, crate::alu::div)?,
            Mod { dest, a, b } => self.binop(dest, a, b, crate::alu::modulo)?,
            Not { dest, a } => {
                let v = self.stack.top().get(a);
                self.stack.top_mut().set(dest, Value::Bool(!v.is_truthy()));
            }
            And { dest, a, b } => self.binop(dest, a, b, crate::alu::bit_and)?,
            Or { dest, a, b } => self.binop(dest, a, b, crate::alu::bit_or)?,
            Xor { dest, a, b } => self.binop(dest, a, b, crate::alu::bit_xor)?,
            Shl { dest, a, b } => self.binop(dest, a, b, crate::alu::shl)?,
            Shr { dest, a, b } => self.binop(dest, a, b, crate::alu::shr)?,
            Shru { dest, a, b } => self.binop(dest, a, b, crate::alu::shru)?,

            Type { dest, a } => {
                let v = self.stack.top().get(a);
                self.stack.top_mut().set(dest, Value::str(v.type_name()));
            }
            CmpEq { dest, a, b } => {
                let (a, b) = (self.stack.top().get(a), self.stack.top().get(b));
                self.stack.top_mut().set(dest, Value::Bool(crate::alu::values_equal(&a, &b)));
            }
            CmpNe { dest, a, b } => {
                let (a, b) = (self.stack.top().get(a), self.stack.top().get(b));
                self.stack.top_mut().set(dest, Value::Bool(!crate::alu::values_equal(&a, &b)));
            }
            CmpLe { dest, a, b } => {
                let (a, b) = (self.stack.top().get(a), self.stack.top().get(b));
                self.stack.top_mut().set(dest, Value::Bool(crate::alu::compare(&a, &b) != std::cmp::Ordering::Greater));
            }
            CmpLt { dest, a, b } => {
                let (a, b) = (self.stack.top().get(a), self.stack.top().get(b));
                self.stack.top_mut().set(dest, Value::Bool(crate::alu::compare(&a, &b) == std::cmp::Ordering::Less));
            }
            HasDp { dest, obj, prop } => {
                let (obj, prop) = (self.stack.top().get(obj), self.stack.top().get(prop));
                let name = str_key(&prop)?;
                let v = has_dp(&obj, &name)?;
                self.stack.top_mut().set(dest, Value::Bool(v));
            }
            HasDpProp8 { dest, obj, str_idx } => {
                let obj = self.stack.top().get(obj);
                let module = self.stack.top().function.module.clone();
                let name = module.const_str(str_idx as u32);
                let v = has_dp(&obj, &name)?;
                self.stack.top_mut().set(dest, Value::Bool(v));
            }
            HasSh { dest, obj, prop } => {
                let (obj, prop) = (self.stack.top().get(obj), self.stack.top().get(prop));
                let name = str_key(&prop)?;
                let v = has_sh(&obj, &name)?;
                self.stack.top_mut().set(dest, Value::Bool(v));
            }
            HasShProp8 { dest, obj, str_idx } => {
                let obj = self.stack.top().get(obj);
                let module = self.stack.top().function.module.clone();
                let name = module.const_str(str_idx as u32);
                let v = has_sh(&obj, &name)?;
                self.stack.top_mut().set(dest, Value::Bool(v));
            }
            InstanceOf { dest, a, class } => {
                let (a, class) = (self.stack.top().get(a), self.stack.top().get(class));
                let v = instance_of(&a, &class)?;
                self.stack.top_mut().set(dest, Value::Bool(v));
            }

            Jump { delta } => {
                self.stack.top_mut().ip = apply_delta(next_ip, delta);
            }
            JumpCond { cond, delta } => {
                let v = self.stack.top().get(cond);
                if v.is_truthy() {
                    self.stack.top_mut().ip = apply_delta(next_ip, delta);
                }
            }
            JumpNotCond { cond, delta } => {
                let v = self.stack.top().get(cond);
                if !v.is_truthy() {
                    self.stack.top_mut().ip = apply_delta(next_ip, delta);
                }
            }
            Next { dest, iter } => {
                let v = self.stack.top().get(iter);
                match self.next_value(v)? {
                    Driven::Value(val) => self.stack.top_mut().set(dest, val),
                    Driven::Done => return Err(Exception::from(RuntimeErrorKind::GeneratorEnd)),
                }
            }
            NextJump { dest, iter, delta } => {
                let v = self.stack.top().get(iter);
                match self.next_value(v)? {
                    Driven::Value(val) => self.stack.top_mut().set(dest, val),
                    Driven::Done => self.stack.top_mut().ip = apply_delta(next_ip, delta),
                }
            }

            Bind { fun, slot, src } => {
                let (fun, src) = (self.stack.top().get(fun), self.stack.top().get(src));
                match fun {
                    Value::Function(f) => f.closures.borrow_mut()[slot as usize] = src,
                    other => return Err(Exception::from(RuntimeErrorKind::NotCallable(other.type_name()))),
                }
            }
            BindSelf { fun, slot } => {
                let fun_val = self.stack.top().get(fun);
                match &fun_val {
                    Value::Function(f) => f.closures.borrow_mut()[slot as usize] = fun_val.clone(),
                    other => return Err(Exception::from(RuntimeErrorKind::NotCallable(other.type_name()))),
                }
            }
            BindDefaults { fun, defaults } => {
                let (fun, defaults) = (self.stack.top().get(fun), self.stack.top().get(defaults));
                match (fun, defaults) {
                    (Value::Function(f), Value::Array(a)) => *f.defaults.borrow_mut() = Some(a.borrow().clone()),
                    _ => return Err(Exception::from(RuntimeErrorKind::CorruptedDefaults)),
                }
            }

            Call { dest, func, args, num_args } => {
                let func = self.stack.top().get(func);
                let positional = (0..num_args).map(|i| self.stack.top().get(args + i)).collect();
                let v = self.call_value(func, Value::Void, CallArgs::Positional(positional))?;
                self.stack.top_mut().set(dest, v);
            }
            CallN { dest, func, this, args, num_args } => {
                let (func, this) = (self.stack.top().get(func), self.stack.top().get(this));
                let positional = (0..num_args).map(|i| self.stack.top().get(args + i)).collect();
                let v = self.call_value(func, this, CallArgs::Positional(positional))?;
                self.stack.top_mut().set(dest, v);
            }
            CallFun { dest, func, args_array } => {
                let (func, args_array) = (self.stack.top().get(func), self.stack.top().get(args_array));
                let v = self.call_value(func, Value::Void, CallArgs::FromValue(args_array))?;
                self.stack.top_mut().set(dest, v);
            }
            TailCall { func, args, num_args } => {
                let func = self.stack.top().get(func);
                let positional = (0..num_args).map(|i| self.stack.top().get(args + i)).collect();
                let v = self.call_value(func, Value::Void, CallArgs::Positional(positional))?;
                return Ok(Some(FrameExit::Returned(v)));
            }
            TailCallN { func, this, args, num_args } => {
                let (func, this) = (self.stack.top().get(func), self.stack.top().get(this));
                let positional = (0..num_args).map(|i| self.stack.top().get(args + i)).collect();
                let v = self.call_value(func, this, CallArgs::Positional(positional))?;
                return Ok(Some(FrameExit::Returned(v)));
            }
            TailCallFun { func, args_array } => {
                let (func, args_array) = (self.stack.top().get(func), self.stack.top().get(args_array));
                let v = self.call_value(func, Value::Void, CallArgs::FromValue(args_array))?;
                return Ok(Some(FrameExit::Returned(v)));
            }

            Return { val } => {
                let v = self.stack.top().get(val);
                return Ok(Some(FrameExit::Returned(v)));
            }
            Yield { val } => {
                let v = self.stack.top().get(val);
                return Ok(Some(FrameExit::Yielded(v, val)));
            }
            Throw { val } => {
                let v = self.stack.top().get(val);
                return Err(Exception(v));
            }
            Catch { dest, delta } => {
                let offset = apply_delta(next_ip, delta);
                self.stack.top_mut().catch_info = Some(CatchInfo { offset, reg: dest });
            }
            Cancel => {
                self.stack.top_mut().catch_info = None;
            }
            Breakpoint => {
                tracing::trace!("breakpoint");
            }
        }
        Ok(None)
    }

    fn set_const(&mut self, dest: Reg, idx: u32) -> VmResult<Option<FrameExit>> {
        let module = self.stack.top().function.module.clone();
        self.stack.top_mut().set(dest, module.const_value(idx));
        Ok(None)
    }

    fn set_fun(&mut self, dest: Reg, idx: u32) -> VmResult<Option<FrameExit>> {
        let module = self.stack.top().function.module.clone();
        let header = module.function_header(idx).clone();
        let f = FunctionValue::new(header, module);
        self.stack.top_mut().set(dest, Value::Function(Rc::new(f)));
        Ok(None)
    }

    fn binop(&mut self, dest: Reg, a: Reg, b: Reg, op: impl Fn(&Value, &Value) -> Result<Value, Exception>) -> VmResult<()> {
        let (a, b) = (self.stack.top().get(a), self.stack.top().get(b));
        let v = op(&a, &b)?;
        self.stack.top_mut().set(dest, v);
        Ok(())
    }

    fn load_iter(&mut self, v: Value) -> VmResult<Value> {
        match v {
            Value::Function(ref f) if f.is_generator() => Ok(v.clone()),
            Value::Array(a) => Ok(Value::Iterator(Rc::new(RefCell::new(KosIter::Array(a, 0))))),
            Value::Str(s) => Ok(Value::Iterator(Rc::new(RefCell::new(KosIter::Str(s, 0))))),
            Value::Object(o) => {
                let keys: Vec<RcStr> = o.borrow().props.keys().cloned().collect();
                Ok(Value::Iterator(Rc::new(RefCell::new(KosIter::Object(o, keys, 0)))))
            }
            other => Err(Exception::from(RuntimeErrorKind::NotIterable(other.type_name()))),
        }
    }

    fn spread_into(&mut self, arr: &Rc<RefCell<Vec<Value>>>, val: Value) -> VmResult<()> {
        match val {
            Value::Array(a) => {
                let items = a.borrow().clone();
                arr.borrow_mut().extend(items);
                Ok(())
            }
            Value::Str(s) => {
                arr.borrow_mut().extend(s.chars().map(|c| Value::str(c.to_string())));
                Ok(())
            }
            Value::Iterator(it) => {
                loop {
                    let next = it.borrow_mut().next();
                    match next {
                        Some(v) => arr.borrow_mut().push(v),
                        None => break,
                    }
                }
                Ok(())
            }
            Value::Function(ref f) if f.is_generator() => {
                let instance = self.generator_instance(f.clone())?;
                loop {
                    match self.drive_generator(instance.clone(), Value::Void)? {
                        Driven::Value(v) => arr.borrow_mut().push(v),
                        Driven::Done => break,
                    }
                }
                Ok(())
            }
            other => Err(Exception::from(RuntimeErrorKind::NotIndexable(other.type_name()))),
        }
    }

    fn generic_get(&mut self, obj: Value, prop: Value) -> VmResult<Value> {
        match (&obj, &prop) {
            (Value::Array(_) | Value::Str(_) | Value::Buffer(_), Value::Int(i)) => self.get_indexed(&obj, *i),
            (Value::Object(_) | Value::Function(_), Value::Str(s)) => self.prop_get(&obj, s),
            _ => Err(Exception::from(RuntimeErrorKind::NotIndexable(obj.type_name()))),
        }
    }

    fn generic_set(&mut self, obj: Value, prop: Value, val: Value) -> VmResult<()> {
        match (&obj, &prop) {
            (Value::Array(_) | Value::Buffer(_), Value::Int(i)) => self.set_indexed(&obj, *i, val),
            (Value::Object(_) | Value::Function(_), Value::Str(s)) => self.prop_set(&obj, s.clone(), val),
            _ => Err(Exception::from(RuntimeErrorKind::NotIndexable(obj.type_name()))),
        }
    }

    fn generic_del(&mut self, obj: Value, prop: Value) -> VmResult<()> {
        let name = str_key(&prop)?;
        prop_del(&obj, &name)
    }

    fn get_indexed(&mut self, obj: &Value, idx: i64) -> VmResult<Value> {
        match obj {
            Value::Array(a) => {
                let a = a.borrow();
                let i = normalize_index(idx, a.len())?;
                Ok(a[i].clone())
            }
            Value::Str(s) => {
                let chars: Vec<char> = s.chars().collect();
                let i = normalize_index(idx, chars.len())?;
                Ok(Value::str(chars[i].to_string()))
            }
            Value::Buffer(b) => {
                let b = b.borrow();
                let i = normalize_index(idx, b.len())?;
                Ok(Value::Int(b[i] as i64))
            }
            other => Err(Exception::from(RuntimeErrorKind::NotIndexable(other.type_name()))),
        }
    }

    fn set_indexed(&mut self, obj: &Value, idx: i64, val: Value) -> VmResult<()> {
        match obj {
            Value::Array(a) => {
                let mut a = a.borrow_mut();
                let i = normalize_index(idx, a.len())?;
                a[i] = val;
                Ok(())
            }
            Value::Buffer(b) => {
                let mut b = b.borrow_mut();
                let i = normalize_index(idx, b.len())?;
                let byte = match val {
                    Value::Int(n) if (0..=255).contains(&n) => n as u8,
                    Value::Int(n) => return Err(Exception::from(RuntimeErrorKind::InvalidByteValue(n))),
                    other => return Err(Exception::from(RuntimeErrorKind::UnsupportedOperandTypes(other.type_name(), "integer"))),
                };
                b[i] = byte;
                Ok(())
            }
            other => Err(Exception::from(RuntimeErrorKind::NotIndexable(other.type_name()))),
        }
    }

    fn prop_get(&mut self, obj: &Value, name: &str) -> VmResult<Value> {
        let slot = match obj {
            Value::Object(o) => o.borrow().lookup(name),
            Value::Function(f) => f.get_prop(name),
            other => return Err(Exception::from(RuntimeErrorKind::NotIndexable(other.type_name()))),
        };
        match slot {
            Some(PropSlot::Value(v)) => Ok(v),
            Some(PropSlot::Accessor { getter: Some(g), .. }) => self.call_value(g, obj.clone(), CallArgs::Positional(Vec::new())),
            Some(PropSlot::Accessor { getter: None, .. }) | None => Ok(Value::Void),
        }
    }

    fn prop_set(&mut self, obj: &Value, name: RcStr, val: Value) -> VmResult<()> {
        let existing = match obj {
            Value::Object(o) => o.borrow().props.get(name.as_ref()).cloned(),
            Value::Function(f) => f.props.borrow().get(name.as_ref()).cloned(),
            other => return Err(Exception::from(RuntimeErrorKind::NotIndexable(other.type_name()))),
        };
        match existing {
            Some(PropSlot::Accessor { setter: Some(s), .. }) => {
                self.call_value(s, obj.clone(), CallArgs::Positional(vec![val]))?;
                Ok(())
            }
            Some(PropSlot::Accessor { setter: None, .. }) => Err(Exception::from(RuntimeErrorKind::NoSetter(name.to_string()))),
            _ => {
                match obj {
                    Value::Object(o) => {
                        o.borrow_mut().props.insert(name, PropSlot::Value(val));
                    }
                    Value::Function(f) => f.set_prop(name, val),
                    _ => unreachable!(),
                }
                Ok(())
            }
        }
    }

    fn get_range(&mut self, obj: &Value, begin: &Value, end: &Value) -> VmResult<Value> {
        match obj {
            Value::Array(a) => {
                let a = a.borrow();
                let (b, e) = resolve_range(begin, end, a.len())?;
                Ok(Value::array(a[b..e].to_vec()))
            }
            Value::Str(s) => {
                let chars: Vec<char> = s.chars().collect();
                let (b, e) = resolve_range(begin, end, chars.len())?;
                Ok(Value::str(chars[b..e].iter().collect::<String>()))
            }
            Value::Buffer(buf) => {
                let buf = buf.borrow();
                let (b, e) = resolve_range(begin, end, buf.len())?;
                Ok(Value::Buffer(Rc::new(RefCell::new(buf[b..e].to_vec()))))
            }
            _ => {
                let method = self.prop_get(obj, "slice")?;
                match method {
                    Value::Function(_) => self.call_value(method, obj.clone(), CallArgs::Positional(vec![begin.clone(), end.clone()])),
                    _ => Err(Exception::from(RuntimeErrorKind::SliceNotFunction)),
                }
            }
        }
    }
}

fn apply_delta(next_ip: u32, delta: i32) -> u32 {
    (next_ip as i64 + delta as i64) as u32
}

fn normalize_index(idx: i64, len: usize) -> VmResult<usize> {
    let resolved = if idx < 0 { idx + len as i64 } else { idx };
    if resolved < 0 || resolved as usize >= len {
        Err(Exception::from(RuntimeErrorKind::InvalidIndex(idx)))
    } else {
        Ok(resolved as usize)
    }
}

fn resolve_range(begin: &Value, end: &Value, len: usize) -> VmResult<(usize, usize)> {
    let b = range_bound(begin, len, 0)?;
    let e = range_bound(end, len, len as i64)?;
    Ok(if b <= e { (b, e) } else { (b, b) })
}

fn range_bound(v: &Value, len: usize, default: i64) -> VmResult<usize> {
    let raw = match v {
        Value::Void => default,
        Value::Int(i) => *i,
        other => return Err(Exception::from(RuntimeErrorKind::UnsupportedOperandTypes(other.type_name(), "integer"))),
    };
    let resolved = if raw < 0 { raw + len as i64 } else { raw };
    Ok(resolved.clamp(0, len as i64) as usize)
}

fn str_key(v: &Value) -> VmResult<RcStr> {
    match v {
        Value::Str(s) => Ok(s.clone()),
        other => Err(Exception::from(RuntimeErrorKind::NotIndexable(other.type_name()))),
    }
}

fn prop_del(obj: &Value, name: &str) -> VmResult<()> {
    match obj {
        Value::Object(o) => {
            o.borrow_mut().props.remove(name);
            Ok(())
        }
        Value::Function(f) => {
            f.props.borrow_mut().remove(name);
            Ok(())
        }
        other => Err(Exception::from(RuntimeErrorKind::NotIndexable(other.type_name()))),
    }
}

fn has_sh(obj: &Value, name: &str) -> VmResult<bool> {
    match obj {
        Value::Object(o) => Ok(o.borrow().has_own(name)),
        Value::Function(f) => Ok(f.props.borrow().contains_key(name)),
        other => Err(Exception::from(RuntimeErrorKind::NotIndexable(other.type_name()))),
    }
}

fn has_dp(obj: &Value, name: &str) -> VmResult<bool> {
    match obj {
        Value::Object(o) => Ok(o.borrow().has_deep(name)),
        Value::Function(f) => Ok(f.props.borrow().contains_key(name)),
        other => Err(Exception::from(RuntimeErrorKind::NotIndexable(other.type_name()))),
    }
}

/// `a instanceof class`: walks `a`'s prototype chain looking for `class`'s
/// own `prototype` object by reference identity (§4.5).
fn instance_of(a: &Value, class: &Value) -> VmResult<bool> {
    let class_f = match class {
        Value::Function(f) if f.is_class() => f,
        Value::Function(_) => return Err(Exception::from(RuntimeErrorKind::NotClass("function"))),
        other => return Err(Exception::from(RuntimeErrorKind::NotClass(other.type_name()))),
    };
    let proto = match class_f.get_prop("prototype") {
        Some(PropSlot::Value(Value::Object(p))) => p,
        _ => return Ok(false),
    };
    let mut cur = match a {
        Value::Object(o) => o.borrow().proto.clone(),
        _ => None,
    };
    while let Some(Value::Object(o)) = cur {
        if Rc::ptr_eq(&o, &proto) {
            return Ok(true);
        }
        cur = o.borrow().proto.clone();
    }
    Ok(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use kos_bytecode::{ConstRecord, FunctionHeader};
    use std::collections::HashMap;

    fn assemble(instructions: &[Instruction]) -> Vec<u8> {
        let mut buf = Vec::new();
        for inst in instructions {
            inst.write_to(&mut buf);
        }
        buf
    }

    /// Builds a single-function module whose entry point is the given
    /// instructions, with `total_regs` registers and no arguments — enough
    /// to drive `Interpreter::execute` without going through `kos-compiler`.
    fn module_with(instructions: &[Instruction], total_regs: u8) -> Module {
        let code = assemble(instructions);
        let mut header = FunctionHeader::new(1);
        header.total_regs = total_regs;
        header.bytecode_offset = 0;
        header.bytecode_size = code.len() as u32;
        Module::load(code, Vec::new(), &[ConstRecord::Function(std::rc::Rc::new(header))], HashMap::new(), 0)
    }

    #[test]
    fn adds_two_immediates_and_returns() {
        let module = module_with(
            &[
                Instruction::LoadInt8 { dest: 0, imm: 3 },
                Instruction::LoadInt8 { dest: 1, imm: 4 },
                Instruction::Add { dest: 0, a: 0, b: 1 },
                Instruction::Return { val: 0 },
            ],
            2,
        );
        let mut interp = Interpreter::new(vec![Rc::new(module)], 64);
        let result = interp.execute(0, 0).unwrap();
        assert!(matches!(result, Value::Int(7)));
    }

    #[test]
    fn catch_installs_a_handler_that_receives_a_thrown_value() {
        // CATCH reg=1, delta -> handler; THROW reg=0; (unreachable) RETURN;
        // handler: RETURN reg=1.
        let throw_len = Instruction::Throw { val: 0 }.encoded_len() as i32;
        let unreachable_return_len = Instruction::Return { val: 0 }.encoded_len() as i32;
        let handler_delta = throw_len + unreachable_return_len;
        let module = module_with(
            &[
                Instruction::LoadInt8 { dest: 0, imm: 9 },
                Instruction::Catch { dest: 1, delta: handler_delta },
                Instruction::Throw { val: 0 },
                Instruction::Return { val: 0 },
                Instruction::Return { val: 1 },
            ],
            2,
        );
        let mut interp = Interpreter::new(vec![Rc::new(module)], 64);
        let result = interp.execute(0, 0).unwrap();
        assert!(matches!(result, Value::Int(9)));
    }

    #[test]
    fn uncaught_throw_propagates_out_of_execute() {
        let module = module_with(&[Instruction::LoadInt8 { dest: 0, imm: 1 }, Instruction::Throw { val: 0 }], 1);
        let mut interp = Interpreter::new(vec![Rc::new(module)], 64);
        let err = interp.execute(0, 0).unwrap_err();
        assert!(matches!(err.0, Value::Int(1)));
    }

    #[test]
    fn stack_overflow_on_unbounded_recursive_call() {
        // A function that calls itself via a freshly-loaded copy of its own
        // constant with no arguments, forever: LOAD_FUN 0 -> CALL -> loops
        // until the configured max_stack_depth is exceeded.
        let module = {
            let mut header = FunctionHeader::new(1);
            header.total_regs = 2;
            header.args_reg = kos_bytecode::KOS_NO_REG;
            let code = assemble(&[
                Instruction::LoadFun8 { dest: 0, idx: 0 },
                Instruction::Call { dest: 1, func: 0, args: 0, num_args: 0 },
                Instruction::Return { val: 1 },
            ]);
            header.bytecode_offset = 0;
            header.bytecode_size = code.len() as u32;
            Module::load(code, Vec::new(), &[ConstRecord::Function(std::rc::Rc::new(header))], HashMap::new(), 0)
        };
        let mut interp = Interpreter::new(vec![Rc::new(module)], 8);
        let err = interp.execute(0, 0).unwrap_err();
        assert!(matches!(err.0, Value::Str(ref s) if s.contains("stack overflow")));
    }
}
