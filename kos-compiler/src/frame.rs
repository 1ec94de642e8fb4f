//! Per-function codegen state (§3 Data Model, `Frame`).
//!
//! One `Frame` exists per function scope being compiled; nested functions
//! push a new frame and the enclosing one sits on `Compiler`'s frame stack
//! until the nested body is done. This mirrors how `cranelift_codegen`'s
//! `Context` is reused one-per-function rather than nested, except here
//! nesting is real (closures), so frames stack instead of resetting.

use std::collections::HashMap;

use kos_bytecode::Reg;

use crate::ast::Node;
use crate::constant_pool::ConstIdx;
use crate::emitter::Emitter;
use crate::register::RegisterAllocator;
use crate::scope::{ScopeId, VarId};

/// Tags a pending unresolved jump so the enclosing construct that resolves
/// it (loop, switch, try) can tell which kind of exit produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PendingJumpKind {
    Break,
    Continue,
    Fallthrough,
}

/// An unresolved forward jump recorded against the bytecode offset of its
/// placeholder delta operand, to be patched once the target address is known.
#[derive(Debug, Clone, Copy)]
pub struct PendingJump {
    pub kind: PendingJumpKind,
    pub patch_offset: u32,
}

pub struct Frame {
    pub emitter: Emitter,
    pub regs: RegisterAllocator,
    pub this_reg: Reg,
    pub args_reg: Reg,
    pub rest_reg: Reg,
    pub ellipsis_reg: Reg,
    /// First register of the contiguous bind-slot block `BIND`/`BIND_SELF`
    /// fill in at call time; `bind_slots` maps each captured variable to
    /// its register within this block.
    pub bind_reg: Reg,
    /// Constructor-only: register receiving the base class's constructor,
    /// used to synthesize an implicit `super(...)` call.
    pub base_ctor_reg: Reg,
    /// Constructor-only: register receiving the base class's prototype.
    pub base_proto_reg: Reg,
    /// Scopes captured by closures nested inside this frame; accumulated so
    /// the synthesizer knows which independent locals need a `BIND`.
    pub captured_scopes: Vec<ScopeId>,
    pub pending_breaks: Vec<PendingJump>,
    /// Bodies of `try`/`defer` blocks currently being compiled, innermost
    /// last, so a `return` reached inside one can re-emit each enclosing
    /// defer (innermost first) before the actual `RETURN` (§4.3.3 try/defer:
    /// "re-emits... at the emitter's discretion").
    pub defer_stack: Vec<Node>,
    /// Maps a captured [`VarId`] to the register in *this* frame holding the
    /// value `BIND`/`BIND_SELF` delivered for it at call time — distinct
    /// from [`crate::scope::Variable::reg`], which names the register in
    /// the variable's *home* frame.
    pub bind_slots: HashMap<VarId, Reg>,
    /// Set while compiling a generator body; holds the register a `YIELD`
    /// writes its resumed-with value into.
    pub yield_reg: Option<Reg>,
    /// How many default-argument slots have been read at any call site so
    /// far; becomes the function header's `num_used_def_args`.
    pub num_used_def_args: u8,
    /// The function constant this frame is building bytecode for.
    pub const_idx: ConstIdx,
    /// The scope that owns this frame.
    pub scope: ScopeId,
    /// Current try/catch nesting depth, tracked so `CatchNestingTooDeep` can
    /// be raised before the interpreter's catch stack would overflow.
    pub catch_depth: u32,
}

impl Frame {
    pub fn new(scope: ScopeId, const_idx: ConstIdx) -> Self {
        Frame {
            emitter: Emitter::new(),
            regs: RegisterAllocator::new(),
            this_reg: kos_bytecode::KOS_NO_REG,
            args_reg: kos_bytecode::KOS_NO_REG,
            rest_reg: kos_bytecode::KOS_NO_REG,
            ellipsis_reg: kos_bytecode::KOS_NO_REG,
            bind_reg: kos_bytecode::KOS_NO_REG,
            base_ctor_reg: kos_bytecode::KOS_NO_REG,
            base_proto_reg: kos_bytecode::KOS_NO_REG,
            captured_scopes: Vec::new(),
            pending_breaks: Vec::new(),
            defer_stack: Vec::new(),
            bind_slots: HashMap::new(),
            yield_reg: None,
            num_used_def_args: 0,
            const_idx,
            scope,
            catch_depth: 0,
        }
    }

    pub fn is_generator(&self) -> bool {
        self.yield_reg.is_some()
    }

    /// Record that `scope` is captured by some nested closure, if not
    /// already recorded.
    pub fn capture_scope(&mut self, scope: ScopeId) {
        if !self.captured_scopes.contains(&scope) {
            self.captured_scopes.push(scope);
        }
    }

    /// Pull every pending break/continue/fallthrough jump matching `kind`,
    /// leaving the rest (e.g. a break meant for an outer loop) in place.
    pub fn take_pending(&mut self, kind: PendingJumpKind) -> Vec<PendingJump> {
        let (matching, rest): (Vec<_>, Vec<_>) =
            self.pending_breaks.drain(..).partition(|j| j.kind == kind);
        self.pending_breaks = rest;
        matching
    }

    /// A marker a loop/switch takes before compiling its body, so that on
    /// exit it only claims the break/continue/fallthrough jumps recorded
    /// *during its own body* — not ones an outer construct is still
    /// carrying from before this one started.
    pub fn mark(&self) -> usize {
        self.pending_breaks.len()
    }

    /// Claim every pending jump of `kind` recorded since `mark`, putting any
    /// other kind recorded in that span back for the next enclosing
    /// construct to claim.
    pub fn resolve_since(&mut self, mark: usize, kind: PendingJumpKind) -> Vec<PendingJump> {
        let tail = self.pending_breaks.split_off(mark);
        let (matching, rest): (Vec<_>, Vec<_>) = tail.into_iter().partition(|j| j.kind == kind);
        self.pending_breaks.extend(rest);
        matching
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn take_pending_only_removes_matching_kind() {
        let mut frame = Frame::new(ScopeId(0), ConstIdx(0));
        frame.pending_breaks.push(PendingJump { kind: PendingJumpKind::Break, patch_offset: 4 });
        frame.pending_breaks.push(PendingJump { kind: PendingJumpKind::Continue, patch_offset: 8 });
        let breaks = frame.take_pending(PendingJumpKind::Break);
        assert_eq!(breaks.len(), 1);
        assert_eq!(frame.pending_breaks.len(), 1);
        assert_eq!(frame.pending_breaks[0].kind, PendingJumpKind::Continue);
    }

    #[test]
    fn capture_scope_is_idempotent() {
        let mut frame = Frame::new(ScopeId(0), ConstIdx(0));
        frame.capture_scope(ScopeId(1));
        frame.capture_scope(ScopeId(1));
        assert_eq!(frame.captured_scopes, vec![ScopeId(1)]);
    }
}
