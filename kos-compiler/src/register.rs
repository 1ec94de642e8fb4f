//! Per-frame register allocator (§4.1).
//!
//! The reference design describes an intrusive doubly-linked free/used list
//! of registers, sorted ascending on the free side so a contiguous run can
//! be found in one pass. We get the same asymptotics with a flat `Vec<u8>`
//! acting as a sorted free-stack plus a `Vec<bool>` recording which
//! registers are temporaries, the alternative representation the design
//! notes call out explicitly — it avoids the self-referential-list
//! bookkeeping an intrusive list needs in safe Rust, in the same spirit as
//! `cranelift_codegen::regalloc::RegisterSet` tracking availability as a
//! compact bitmask rather than a linked free list.

use crate::error::{CompileErrorKind, Pos};
use kos_bytecode::{Reg, KOS_NO_REG};

/// Hard ceiling so every register operand fits in one byte.
pub const MAX_REGISTERS: usize = 256;

/// Allocates and reclaims registers within a single function frame.
#[derive(Debug, Clone)]
pub struct RegisterAllocator {
    /// `true` at index `r` if register `r` is a reusable temporary;
    /// `false` if it is permanently bound to a variable for the remainder
    /// of that variable's scope.
    is_temp: Vec<bool>,
    /// Currently free temporaries, kept sorted ascending.
    free: Vec<Reg>,
    /// High-water mark: one past the highest register ever allocated.
    count: u16,
}

impl RegisterAllocator {
    pub fn new() -> Self {
        RegisterAllocator { is_temp: Vec::new(), free: Vec::new(), count: 0 }
    }

    /// Total registers this frame has ever needed; becomes the function
    /// header's `total_regs` field once the frame settles at its peak.
    pub fn register_count(&self) -> u16 {
        self.count
    }

    fn extend_to(&mut self, pos: Pos, new_count: u16) -> Result<(), crate::error::CompileError> {
        if new_count as usize > MAX_REGISTERS {
            return Err(crate::error::CompileError::new(pos, CompileErrorKind::TooManyRegisters));
        }
        while (self.is_temp.len() as u16) < new_count {
            self.is_temp.push(false);
        }
        if new_count > self.count {
            self.count = new_count;
        }
        Ok(())
    }

    /// Allocate a fresh temporary: the smallest free index, or a new
    /// register at the top of the frame if none is free.
    pub fn alloc_temp(&mut self, pos: Pos) -> Result<Reg, crate::error::CompileError> {
        if let Some(r) = self.free.first().copied() {
            self.free.remove(0);
            self.is_temp[r as usize] = true;
            return Ok(r);
        }
        let r = self.count as Reg;
        self.extend_to(pos, self.count + 1)?;
        self.is_temp[r as usize] = true;
        Ok(r)
    }

    /// Allocate `n` contiguous registers, preferring an existing run on the
    /// free list (single ascending pass) before extending the frame.
    pub fn alloc_contiguous(&mut self, pos: Pos, n: u16) -> Result<Reg, crate::error::CompileError> {
        if n == 0 {
            return self.alloc_temp(pos);
        }
        if let Some(start_idx) = self.find_contiguous_run(n) {
            let start = self.free[start_idx];
            for i in 0..n {
                let r = start + i as Reg;
                self.is_temp[r as usize] = true;
            }
            self.free.drain(start_idx..start_idx + n as usize);
            return Ok(start);
        }
        let start = self.count as Reg;
        self.extend_to(pos, self.count + n)?;
        for i in 0..n {
            self.is_temp[(start + i as Reg) as usize] = true;
        }
        Ok(start)
    }

    fn find_contiguous_run(&self, n: u16) -> Option<usize> {
        if self.free.len() < n as usize {
            return None;
        }
        'outer: for start in 0..=(self.free.len() - n as usize) {
            for i in 0..(n as usize - 1) {
                if self.free[start + i] + 1 != self.free[start + i + 1] {
                    continue 'outer;
                }
            }
            return Some(start);
        }
        None
    }

    /// Choose a destination register for a binary/unary operation: when
    /// `source` is already variable-bound (not a temporary) and either
    /// equals `preferred` or no preference was given, a fresh temporary is
    /// allocated instead of clobbering the variable in place.
    pub fn alloc_dest(&mut self, pos: Pos, preferred: Option<Reg>, source: Reg) -> Result<Reg, crate::error::CompileError> {
        let source_is_persistent = (source as usize) < self.is_temp.len() && !self.is_temp[source as usize];
        if source_is_persistent && (preferred.is_none() || preferred == Some(source)) {
            return self.alloc_temp(pos);
        }
        Ok(preferred.unwrap_or(source))
    }

    /// Release a register. A no-op for variable-bound registers: those live
    /// until their owning scope is deactivated, which happens via
    /// `free_variable`.
    pub fn free(&mut self, r: Reg) {
        if (r as usize) >= self.is_temp.len() || !self.is_temp[r as usize] {
            return;
        }
        self.is_temp[r as usize] = false;
        let idx = self.free.partition_point(|&x| x < r);
        self.free.insert(idx, r);
    }

    /// Bind `r` permanently to a variable: it is removed from temp status so
    /// `free` becomes a no-op for it until `free_variable` reclaims it.
    pub fn bind_variable(&mut self, r: Reg) {
        if (r as usize) < self.is_temp.len() {
            self.is_temp[r as usize] = false;
        }
        // Ensure it isn't sitting on the free list from a stale temp alloc.
        self.free.retain(|&x| x != r);
    }

    /// Return a variable's register to the free pool once its scope ends.
    pub fn free_variable(&mut self, r: Reg) {
        if r == KOS_NO_REG {
            return;
        }
        self.is_temp[r as usize] = true;
        self.free(r);
    }

    /// `true` if `r` is currently a reusable temporary rather than bound to
    /// a variable.
    pub fn is_temp(&self, r: Reg) -> bool {
        (r as usize) < self.is_temp.len() && self.is_temp[r as usize]
    }
}

impl Default for RegisterAllocator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pos() -> Pos {
        Pos::new(1, 1)
    }

    #[test]
    fn allocates_ascending_and_reuses_freed() {
        let mut a = RegisterAllocator::new();
        let r0 = a.alloc_temp(pos()).unwrap();
        let r1 = a.alloc_temp(pos()).unwrap();
        assert_eq!((r0, r1), (0, 1));
        a.free(r0);
        let r2 = a.alloc_temp(pos()).unwrap();
        assert_eq!(r2, 0, "smallest free index is reused first");
    }

    #[test]
    fn alloc_contiguous_finds_a_run_on_the_free_list() {
        let mut a = RegisterAllocator::new();
        let regs: Vec<Reg> = (0..4).map(|_| a.alloc_temp(pos()).unwrap()).collect();
        for r in &regs {
            a.free(*r);
        }
        let start = a.alloc_contiguous(pos(), 3).unwrap();
        assert_eq!(start, 0);
    }

    #[test]
    fn variable_bound_registers_are_not_freed_by_free() {
        let mut a = RegisterAllocator::new();
        let r = a.alloc_temp(pos()).unwrap();
        a.bind_variable(r);
        a.free(r);
        assert!(!a.is_temp(r));
        a.free_variable(r);
        assert!(a.is_temp(r));
    }

    #[test]
    fn exceeding_capacity_is_an_error() {
        let mut a = RegisterAllocator::new();
        for _ in 0..MAX_REGISTERS {
            a.alloc_temp(pos()).unwrap();
        }
        assert_eq!(
            a.alloc_temp(pos()).unwrap_err().kind,
            CompileErrorKind::TooManyRegisters
        );
    }
}
