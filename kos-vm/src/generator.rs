//! Generator state machine (§4.5 "Generators"): instantiation-by-copy plus
//! the suspend/resume bookkeeping `crate::interpreter` drives `run_frame`
//! with. This interpreter recurses into `run_frame` (deep-stack mode)
//! instead of truly suspending a Rust stack, so a "suspended" generator is
//! just its saved register file, instruction pointer and catch handler.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use kos_bytecode::{Reg, KOS_NO_REG};

use crate::error::{Exception, RuntimeErrorKind, VmResult};
use crate::frame::CatchInfo;
use crate::function::{FunctionValue, GeneratorRuntime, GeneratorState};
use crate::value::Value;

/// Calling a generator template while it's `Init` doesn't run the body — it
/// spawns a fresh, independent instance with its own closures/defaults/state
/// (§3 "copying a function produces a distinct value with independent
/// state... used when spawning a generator instance"). `registers` is the
/// callee's register file already populated by `crate::call::setup_call_registers`.
pub fn instantiate(template: &Rc<FunctionValue>, registers: Vec<Value>) -> Value {
    let instance = FunctionValue {
        header: template.header.clone(),
        module: template.module.clone(),
        closures: RefCell::new(template.closures.borrow().clone()),
        defaults: RefCell::new(template.defaults.borrow().clone()),
        arg_map: template.arg_map.clone(),
        props: RefCell::new(HashMap::new()),
        native: None,
        generator: Some(RefCell::new(GeneratorRuntime {
            state: GeneratorState::Ready,
            registers,
            ip: 0,
            catch_info: None,
            yield_reg: KOS_NO_REG,
        })),
    };
    Value::Function(Rc::new(instance))
}

/// The outcome of driving a generator forward by one `NEXT`: either it
/// yielded a value, or its body ran to completion (`RETURN`) and it's now
/// `Done`. A thrown exception is reported through the ordinary `VmResult`
/// error channel instead, since unlike exhaustion it isn't a normal outcome
/// a loop should just stop on.
pub enum Driven {
    Value(Value),
    Done,
}

/// What `run_frame` should do to resume `f`: either start its body fresh
/// (`Start`) or continue from a previous `YIELD` with a resume value written
/// into the register it yielded from (`Continue`).
pub enum Resumption {
    Start { registers: Vec<Value> },
    Continue { registers: Vec<Value>, ip: u32, catch_info: Option<CatchInfo> },
}

/// Transition a generator out of `Ready`/`Active` into `Running`, handing
/// back the state `run_frame` needs to build a `CallFrame`. Raises
/// `NotGenerator`, `GeneratorRunning` or `GeneratorEnd` per §7.
pub fn begin_resume(f: &FunctionValue, resume_value: Value) -> VmResult<Resumption> {
    let gen = f.generator.as_ref().ok_or_else(|| Exception::from(RuntimeErrorKind::NotGenerator))?;
    let mut gen = gen.borrow_mut();
    match gen.state {
        GeneratorState::Init => Err(Exception::from(RuntimeErrorKind::NotGenerator)),
        GeneratorState::Running => Err(Exception::from(RuntimeErrorKind::GeneratorRunning)),
        GeneratorState::Done => Err(Exception::from(RuntimeErrorKind::GeneratorEnd)),
        GeneratorState::Ready => {
            gen.state = GeneratorState::Running;
            Ok(Resumption::Start { registers: std::mem::take(&mut gen.registers) })
        }
        GeneratorState::Active => {
            gen.state = GeneratorState::Running;
            let mut registers = std::mem::take(&mut gen.registers);
            if gen.yield_reg != KOS_NO_REG {
                registers[gen.yield_reg as usize] = resume_value;
            }
            Ok(Resumption::Continue { registers, ip: gen.ip, catch_info: gen.catch_info })
        }
    }
}

/// Save a generator's register file at the point it hit `YIELD val_reg`,
/// transitioning it back to `Active` so the next `NEXT` resumes it.
pub fn suspend(f: &FunctionValue, registers: Vec<Value>, ip: u32, catch_info: Option<CatchInfo>, yield_reg: Reg) {
    let gen = f.generator.as_ref().expect("suspend called on non-generator");
    let mut gen = gen.borrow_mut();
    gen.state = GeneratorState::Active;
    gen.registers = registers;
    gen.ip = ip;
    gen.catch_info = catch_info;
    gen.yield_reg = yield_reg;
}

/// Mark a generator exhausted after its frame returned or threw. Its
/// register file is dropped entirely rather than kept around, matching the
/// "shrink its stack allocation to just the closure size" note (§4.5) — here
/// there's no closure-sized remainder to keep since the instance is never
/// resumed again.
pub fn finish(f: &FunctionValue) {
    let gen = f.generator.as_ref().expect("finish called on non-generator");
    let mut gen = gen.borrow_mut();
    gen.state = GeneratorState::Done;
    gen.registers = Vec::new();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::Module;
    use std::collections::HashMap;

    fn generator_template() -> Rc<FunctionValue> {
        let mut header = kos_bytecode::FunctionHeader::new(1);
        header.flags.set_generator(true);
        let module = Rc::new(Module::load(Vec::new(), Vec::new(), &[], HashMap::new(), 0));
        Rc::new(FunctionValue::new(Rc::new(header), module))
    }

    #[test]
    fn instantiate_spawns_an_independent_ready_instance() {
        let template = generator_template();
        let instance = instantiate(&template, vec![Value::Int(1)]);
        let Value::Function(f) = instance else { panic!("not a function") };
        assert_eq!(f.generator.as_ref().unwrap().borrow().state, GeneratorState::Ready);
        assert!(template.generator.as_ref().unwrap().borrow().state == GeneratorState::Init);
    }

    #[test]
    fn first_resume_starts_the_body() {
        let instance_val = instantiate(&generator_template(), vec![Value::Int(7)]);
        let Value::Function(f) = &instance_val else { panic!() };
        let resumption = begin_resume(f, Value::Void).unwrap();
        assert!(matches!(resumption, Resumption::Start { ref registers } if matches!(registers[0], Value::Int(7))));
        assert_eq!(f.generator.as_ref().unwrap().borrow().state, GeneratorState::Running);
    }

    #[test]
    fn resuming_a_running_generator_is_an_error() {
        let instance_val = instantiate(&generator_template(), Vec::new());
        let Value::Function(f) = &instance_val else { panic!() };
        begin_resume(f, Value::Void).unwrap();
        let err = begin_resume(f, Value::Void).unwrap_err();
        assert!(matches!(err.0, Value::Str(ref s) if s.contains("already running")));
    }

    #[test]
    fn suspend_then_resume_writes_the_value_into_the_yield_register() {
        let instance_val = instantiate(&generator_template(), vec![Value::Void, Value::Void]);
        let Value::Function(f) = &instance_val else { panic!() };
        begin_resume(f, Value::Void).unwrap();
        suspend(f, vec![Value::Int(1), Value::Void], 10, None, 1);
        assert_eq!(f.generator.as_ref().unwrap().borrow().state, GeneratorState::Active);

        let resumption = begin_resume(f, Value::Int(99)).unwrap();
        match resumption {
            Resumption::Continue { registers, ip, .. } => {
                assert_eq!(ip, 10);
                assert!(matches!(registers[1], Value::Int(99)));
            }
            _ => panic!("expected Continue"),
        }
    }

    #[test]
    fn finished_generator_raises_generator_end_on_resume() {
        let instance_val = instantiate(&generator_template(), Vec::new());
        let Value::Function(f) = &instance_val else { panic!() };
        begin_resume(f, Value::Void).unwrap();
        finish(f);
        let err = begin_resume(f, Value::Void).unwrap_err();
        assert!(matches!(err.0, Value::Str(ref s) if s.contains("no more values")));
    }

    #[test]
    fn resuming_a_never_instantiated_template_is_not_a_generator_error() {
        let mut header = kos_bytecode::FunctionHeader::new(1);
        header.flags.set_generator(false);
        let module = Rc::new(Module::load(Vec::new(), Vec::new(), &[], HashMap::new(), 0));
        let plain = FunctionValue::new(Rc::new(header), module);
        let err = begin_resume(&plain, Value::Void).unwrap_err();
        assert!(matches!(err.0, Value::Str(ref s) if s.contains("not a generator")));
    }
}
