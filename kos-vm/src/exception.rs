//! Exception unwinding (§4.5 "Exception unwinding"): `CATCH`/`CANCEL` and the
//! local-frame half of unwinding. Cross-frame propagation falls out of
//! `?`-based `Result` plumbing in `crate::interpreter::Interpreter::run_frame`
//! — this module only handles what happens *within* one frame's own
//! dispatch loop.

use kos_bytecode::Reg;

use crate::error::Exception;
use crate::frame::CallFrame;

/// If `frame` has an installed handler, consume it, write the exception
/// value into its register and return the bytecode offset to resume at.
/// Returns `None` when the frame has no handler, meaning the caller must
/// propagate the exception to the enclosing call instead.
pub fn catch_in_frame(frame: &mut CallFrame, exn: &Exception, write: impl FnOnce(&mut CallFrame, Reg, &Exception)) -> Option<u32> {
    let info = frame.catch_info.take()?;
    write(frame, info.reg, exn);
    Some(info.offset)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::CatchInfo;
    use crate::function::FunctionValue;
    use crate::module::Module;
    use crate::value::Value;
    use std::collections::HashMap;
    use std::rc::Rc;

    fn frame_with(num_regs: usize) -> CallFrame {
        let header = kos_bytecode::FunctionHeader::new(1);
        let module = Rc::new(Module::load(Vec::new(), Vec::new(), &[], HashMap::new(), 0));
        let function = Rc::new(FunctionValue::new(Rc::new(header), module));
        CallFrame::new(function, vec![Value::Void; num_regs])
    }

    #[test]
    fn installed_handler_is_consumed_and_writes_the_value() {
        let mut frame = frame_with(2);
        frame.catch_info = Some(CatchInfo { offset: 42, reg: 1 });
        let exn = Exception(Value::str("boom"));
        let resume_at = catch_in_frame(&mut frame, &exn, |f, reg, e| f.set(reg, e.0.clone()));
        assert_eq!(resume_at, Some(42));
        assert!(frame.catch_info.is_none());
        assert!(matches!(frame.get(1), Value::Str(ref s) if &**s == "boom"));
    }

    #[test]
    fn no_handler_means_propagate() {
        let mut frame = frame_with(1);
        let exn = Exception(Value::str("boom"));
        let resume_at = catch_in_frame(&mut frame, &exn, |_, _, _| panic!("should not be called"));
        assert_eq!(resume_at, None);
    }
}
