//! Function value (runtime) (§3): the callable produced by `LOAD_CONST`/
//! `LOAD_FUN` and wired up with `BIND`/`BIND_SELF`/`BIND_DEFAULTS`.
//!
//! A function *template* (the header + owning module) is shared across every
//! instantiation; each `LOAD_FUN` materializes a fresh [`FunctionValue`] with
//! its own closures/defaults/generator state, since "copying a function
//! produces a distinct value with independent state" (§3).

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use kos_bytecode::{FunctionHeader, Reg, KOS_NO_REG};

use crate::error::VmResult;
use crate::frame::CatchInfo;
use crate::module::Module;
use crate::value::{PropSlot, RcStr, Value};

/// The generator state machine (§4.5). Absent (`None` on
/// [`FunctionValue::generator`]) for ordinary functions, classes and
/// constructors, which always run `ctor`/`fun` to completion in one call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeneratorState {
    /// Freshly loaded, not yet called to spawn an instance.
    Init,
    /// Spawned, registers initialized from args, body not yet started.
    Ready,
    /// Suspended at a `YIELD`, waiting for `NEXT`/`NEXT_JUMP`.
    Active,
    /// Currently executing (reentrant `NEXT` raises `GeneratorRunning`).
    Running,
    Done,
}

/// Suspended generator state: its own register file, the instruction offset
/// to resume at, and whatever catch handler was active when it yielded.
pub struct GeneratorRuntime {
    pub state: GeneratorState,
    pub registers: Vec<Value>,
    pub ip: u32,
    pub catch_info: Option<CatchInfo>,
    /// The register operand of the `YIELD` that last suspended this
    /// generator; `NEXT`'s resume value is written back into this same slot,
    /// so no separate "resume value" storage is needed (§4.5 "Generators").
    pub yield_reg: Reg,
}

/// A host-provided function ("handler" in the design notes): invoked
/// directly by the call protocol instead of pushing a bytecode frame.
pub type NativeFn = Rc<dyn Fn(Value, &[Value]) -> VmResult<Value>>;

pub struct FunctionValue {
    pub header: Rc<FunctionHeader>,
    pub module: Rc<Module>,
    pub closures: RefCell<Vec<Value>>,
    pub defaults: RefCell<Option<Vec<Value>>>,
    /// Parameter-name → slot index, built once from `header.param_names`;
    /// consulted when a caller passes an object instead of a positional
    /// array (§4.5 "Named arguments").
    pub arg_map: Option<HashMap<RcStr, u8>>,
    /// Arbitrary properties this function value carries — notably a class's
    /// `prototype`, set by ordinary `SET_PROP8` at class-synthesis time, but
    /// otherwise no different from an object's property bag.
    pub props: RefCell<HashMap<RcStr, PropSlot>>,
    pub native: Option<NativeFn>,
    pub generator: Option<RefCell<GeneratorRuntime>>,
}

impl FunctionValue {
    pub fn new(header: Rc<FunctionHeader>, module: Rc<Module>) -> Self {
        let arg_map = if header.num_named_args > 0 {
            let mut map = HashMap::with_capacity(header.param_names.len());
            for (slot, &name_idx) in header.param_names.iter().enumerate() {
                map.insert(module.const_str(name_idx), slot as u8);
            }
            Some(map)
        } else {
            None
        };
        let generator = header.flags.is_generator().then(|| {
            RefCell::new(GeneratorRuntime {
                state: GeneratorState::Init,
                registers: Vec::new(),
                ip: 0,
                catch_info: None,
                yield_reg: KOS_NO_REG,
            })
        });
        FunctionValue {
            closures: RefCell::new(vec![Value::Void; header.num_binds as usize]),
            defaults: RefCell::new(None),
            arg_map,
            props: RefCell::new(HashMap::new()),
            native: None,
            header,
            module,
            generator,
        }
    }

    pub fn is_generator(&self) -> bool {
        self.generator.is_some()
    }

    pub fn is_class(&self) -> bool {
        self.header.flags.is_class()
    }

    pub fn get_prop(&self, name: &str) -> Option<PropSlot> {
        self.props.borrow().get(name).cloned()
    }

    pub fn set_prop(&self, name: RcStr, value: Value) {
        self.props.borrow_mut().insert(name, PropSlot::Value(value));
    }
}
