//! Call protocol and named-argument resolution (§4.5 "Call protocol",
//! "Named arguments").

use std::collections::HashMap;
use std::rc::Rc;

use kos_bytecode::KOS_NO_REG;

use crate::error::{Exception, RuntimeErrorKind, VmResult};
use crate::function::FunctionValue;
use crate::value::{PropSlot, Value};

/// How a call site handed arguments to the callee: a contiguous register
/// block (`CALL`/`CALL_N`/tail variants) or a single array/object value
/// (`CALL_FUN`/tail variant, and `apply`-style native calls).
pub enum CallArgs {
    Positional(Vec<Value>),
    FromValue(Value),
}

/// Arguments resolved into the callee's register layout: one value per
/// declared parameter slot, plus whatever landed in the ellipsis object
/// (named arguments the callee didn't declare but accepts via `...`).
pub struct ResolvedArgs {
    pub positional: Vec<Value>,
    pub ellipsis: Option<Value>,
}

pub fn resolve_args(f: &FunctionValue, args: CallArgs) -> VmResult<ResolvedArgs> {
    match args {
        CallArgs::Positional(v) => Ok(ResolvedArgs { positional: v, ellipsis: None }),
        CallArgs::FromValue(Value::Array(arr)) => Ok(ResolvedArgs { positional: arr.borrow().clone(), ellipsis: None }),
        CallArgs::FromValue(Value::Object(obj)) => {
            let obj = obj.borrow();
            resolve_named_args(f, &obj.props)
        }
        CallArgs::FromValue(_) => Err(Exception::from(RuntimeErrorKind::ArgsNotArray)),
    }
}

fn resolve_named_args(f: &FunctionValue, props: &HashMap<crate::value::RcStr, PropSlot>) -> VmResult<ResolvedArgs> {
    let map = f.arg_map.as_ref().ok_or_else(|| Exception::from(RuntimeErrorKind::NamedArgsNotSupported))?;
    let mut positional = vec![Value::Void; f.header.num_named_args as usize];
    let mut filled = vec![false; positional.len()];
    let mut ellipsis: Option<Value> = None;

    for (key, slot) in props {
        let value = match slot {
            PropSlot::Value(v) => v.clone(),
            PropSlot::Accessor { .. } => continue,
        };
        if let Some(&slot_idx) = map.get(key.as_ref()) {
            positional[slot_idx as usize] = value;
            filled[slot_idx as usize] = true;
        } else if f.header.flags.has_ellipsis() {
            let obj = ellipsis.get_or_insert_with(|| Value::object(None));
            if let Value::Object(o) = obj {
                o.borrow_mut().props.insert(key.clone(), PropSlot::Value(value));
            }
        } else {
            return Err(Exception::from(RuntimeErrorKind::InvalidFunctionParameter(key.to_string())));
        }
    }
    for i in 0..(f.header.min_args as usize) {
        if !filled[i] {
            let name = param_name(f, i);
            return Err(Exception::from(RuntimeErrorKind::MissingFunctionParameter(name)));
        }
    }
    Ok(ResolvedArgs { positional, ellipsis })
}

fn param_name(f: &FunctionValue, slot: usize) -> String {
    f.header.param_names.get(slot).map(|&idx| f.module.const_str(idx).to_string()).unwrap_or_default()
}

/// Lay `this`, positional args (applying trailing defaults), the rest array,
/// the ellipsis object and the closure bindings into a fresh register file
/// sized to `f.header.total_regs` (§4.5).
pub fn setup_call_registers(registers: &mut [Value], f: &FunctionValue, this: Value, resolved: ResolvedArgs) -> VmResult<()> {
    let h = &f.header;
    let args = resolved.positional;
    if (args.len() as u8) < h.min_args {
        return Err(Exception::from(RuntimeErrorKind::TooFewArgs { needed: h.min_args, got: args.len() }));
    }

    if h.args_reg != KOS_NO_REG {
        let defaults = f.defaults.borrow();
        for i in 0..(h.num_named_args as usize) {
            let value = if i < args.len() {
                args[i].clone()
            } else {
                let default_idx = i.saturating_sub(h.min_args as usize);
                defaults.as_ref().and_then(|d| d.get(default_idx)).cloned().unwrap_or(Value::Void)
            };
            registers[h.args_reg as usize + i] = value;
        }
    }

    if h.rest_reg != KOS_NO_REG {
        let rest = if args.len() > h.num_named_args as usize { args[h.num_named_args as usize..].to_vec() } else { Vec::new() };
        registers[h.rest_reg as usize] = Value::array(rest);
    }

    if h.this_reg != KOS_NO_REG {
        registers[h.this_reg as usize] = this;
    }

    if h.ellipsis_reg != KOS_NO_REG {
        registers[h.ellipsis_reg as usize] = resolved.ellipsis.unwrap_or(Value::Void);
    }

    if h.bind_reg != KOS_NO_REG {
        let closures = f.closures.borrow();
        for (i, val) in closures.iter().enumerate() {
            registers[h.bind_reg as usize + i] = val.clone();
        }
    }

    Ok(())
}

/// A fresh instance `this` object for a class call with no explicit
/// receiver: prototype comes from the class value's own `prototype`
/// property (an ordinary property, set by `SET_PROP8` at class-synthesis
/// time — see `kos_compiler::synth::compile_class_literal`).
pub fn fresh_instance(f: &Rc<FunctionValue>) -> Value {
    let proto = match f.get_prop("prototype") {
        Some(PropSlot::Value(v)) => Some(v),
        _ => None,
    };
    Value::object(proto)
}

#[cfg(test)]
mod tests {
    use super::*;
    use kos_bytecode::FunctionHeader;

    fn named_fn(param_names: &[&str], min_args: u8) -> FunctionValue {
        let mut header = FunctionHeader::new(1);
        header.min_args = min_args;
        header.num_named_args = param_names.len() as u8;
        header.args_reg = 0;
        let records: Vec<kos_bytecode::ConstRecord> = param_names
            .iter()
            .map(|n| kos_bytecode::ConstRecord::String { bytes: n.as_bytes().to_vec(), escape_mode: kos_bytecode::StringEscapeMode::NoEscape })
            .collect();
        let module = Rc::new(crate::module::Module::load(Vec::new(), Vec::new(), &records, HashMap::new(), 0));
        for (i, _) in param_names.iter().enumerate() {
            header.param_names.push(i as u32);
        }
        FunctionValue::new(Rc::new(header), module)
    }

    fn obj_with(pairs: &[(&str, Value)]) -> Value {
        let obj = Value::object(None);
        if let Value::Object(o) = &obj {
            for (k, v) in pairs {
                o.borrow_mut().props.insert(Rc::from(*k), PropSlot::Value(v.clone()));
            }
        }
        obj
    }

    #[test]
    fn named_args_fill_declared_slots_by_name() {
        let f = named_fn(&["a", "b"], 2);
        let args = obj_with(&[("b", Value::Int(2)), ("a", Value::Int(1))]);
        let resolved = resolve_args(&f, CallArgs::FromValue(args)).unwrap();
        assert!(matches!(resolved.positional[0], Value::Int(1)));
        assert!(matches!(resolved.positional[1], Value::Int(2)));
    }

    #[test]
    fn missing_required_named_arg_is_an_error() {
        let f = named_fn(&["a", "b"], 2);
        let args = obj_with(&[("a", Value::Int(1))]);
        let err = resolve_args(&f, CallArgs::FromValue(args)).unwrap_err();
        assert!(matches!(err.0, Value::Str(ref s) if s.contains("missing function parameter")));
    }

    #[test]
    fn unknown_named_arg_without_ellipsis_is_an_error() {
        let f = named_fn(&["a"], 1);
        let args = obj_with(&[("a", Value::Int(1)), ("z", Value::Int(9))]);
        let err = resolve_args(&f, CallArgs::FromValue(args)).unwrap_err();
        assert!(matches!(err.0, Value::Str(ref s) if s.contains("invalid function parameter")));
    }

    #[test]
    fn positional_array_args_pass_through_untouched() {
        let f = named_fn(&["a", "b"], 2);
        let resolved = resolve_args(&f, CallArgs::FromValue(Value::array(vec![Value::Int(5), Value::Int(6)]))).unwrap();
        assert!(matches!(resolved.positional[0], Value::Int(5)));
        assert!(matches!(resolved.positional[1], Value::Int(6)));
    }

    #[test]
    fn non_array_non_object_args_value_is_rejected() {
        let f = named_fn(&[], 0);
        let err = resolve_args(&f, CallArgs::FromValue(Value::Int(3))).unwrap_err();
        assert!(matches!(err.0, Value::Str(ref s) if s.contains("must be an array")));
    }
}
