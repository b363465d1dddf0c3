//! Per-type virtual register allocation.
//!
//! Each of the four value types has its own register space. Register 0 is
//! reserved for return values and call results, locals are acquired as
//! permanent registers at function entry, and temporaries follow. Freed
//! temporaries are reused lowest-first so numbering stays deterministic.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use regwasm_types::{Reg, ValueType};

/// One type's register namespace.
#[derive(Debug, Clone)]
pub struct RegisterSpace {
    ty: ValueType,
    /// Next never-used register index.
    next: u32,
    /// Registers below this index are permanent.
    first_temporary: u32,
    free: BTreeSet<u32>,
}

impl RegisterSpace {
    pub fn new(ty: ValueType) -> Self {
        Self {
            ty,
            next: 1,
            first_temporary: 1,
            free: BTreeSet::new(),
        }
    }

    /// Acquire a register that lives for the whole function.
    ///
    /// Must be called before any temporary is acquired.
    pub fn acquire_register(&mut self) -> Reg {
        debug_assert_eq!(self.next, self.first_temporary, "permanent after temporary");
        let reg = Reg::new(self.ty, self.next);
        self.next += 1;
        self.first_temporary = self.next;
        reg
    }

    pub fn acquire_temporary(&mut self) -> Reg {
        let index = match self.free.pop_first() {
            Some(index) => index,
            None => {
                let index = self.next;
                self.next += 1;
                index
            }
        };
        Reg::new(self.ty, index)
    }

    /// Return a temporary to the free list. Permanent registers and the
    /// return register are ignored.
    pub fn release(&mut self, reg: Reg) {
        debug_assert_eq!(reg.ty, self.ty);
        if !self.is_temporary(reg) {
            return;
        }
        let fresh = self.free.insert(reg.index);
        debug_assert!(fresh, "register {reg} released twice");
    }

    pub fn is_temporary(&self, reg: Reg) -> bool {
        reg.index >= self.first_temporary
    }

    pub fn locals(&self) -> u32 {
        self.first_temporary - 1
    }

    /// High-water mark of temporaries.
    pub fn temporaries(&self) -> u32 {
        self.next - self.first_temporary
    }

    /// Temporaries currently acquired.
    pub fn live_temporaries(&self) -> u32 {
        self.temporaries() - self.free.len() as u32
    }
}

/// Register frame size of a compiled function, per value type.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameLayout {
    /// Indexed by [`ValueType::space`].
    pub locals: [u32; 4],
    pub temporaries: [u32; 4],
}

impl FrameLayout {
    /// Registers needed for a type, including the reserved register 0.
    pub fn register_count(&self, ty: ValueType) -> u32 {
        1 + self.locals[ty.space()] + self.temporaries[ty.space()]
    }

    pub fn temporaries_of(&self, ty: ValueType) -> u32 {
        self.temporaries[ty.space()]
    }
}

/// The four register spaces of one function compile.
#[derive(Debug, Clone)]
pub struct RegisterAllocator {
    spaces: [RegisterSpace; 4],
}

impl Default for RegisterAllocator {
    fn default() -> Self {
        Self {
            spaces: ValueType::ALL.map(RegisterSpace::new),
        }
    }
}

impl RegisterAllocator {
    pub fn acquire_register(&mut self, ty: ValueType) -> Reg {
        self.spaces[ty.space()].acquire_register()
    }

    pub fn acquire_temporary(&mut self, ty: ValueType) -> Reg {
        self.spaces[ty.space()].acquire_temporary()
    }

    pub fn release(&mut self, reg: Reg) {
        self.spaces[reg.ty.space()].release(reg);
    }

    pub fn live_temporaries(&self) -> u32 {
        self.spaces.iter().map(RegisterSpace::live_temporaries).sum()
    }

    pub fn frame(&self) -> FrameLayout {
        FrameLayout {
            locals: [0, 1, 2, 3].map(|i| self.spaces[i].locals()),
            temporaries: [0, 1, 2, 3].map(|i| self.spaces[i].temporaries()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn locals_come_before_temporaries() {
        let mut space = RegisterSpace::new(ValueType::I32);
        assert_eq!(space.acquire_register().index, 1);
        assert_eq!(space.acquire_register().index, 2);
        let t = space.acquire_temporary();
        assert_eq!(t.index, 3);
        assert!(space.is_temporary(t));
        assert_eq!(space.locals(), 2);
    }

    #[test]
    fn lowest_free_temporary_is_reused() {
        let mut space = RegisterSpace::new(ValueType::F64);
        let a = space.acquire_temporary();
        let b = space.acquire_temporary();
        let c = space.acquire_temporary();
        space.release(c);
        space.release(a);
        assert_eq!(space.acquire_temporary(), a);
        assert_eq!(space.acquire_temporary(), c);
        assert_eq!(space.temporaries(), 3);
        assert_eq!(space.live_temporaries(), 3);
        space.release(b);
        assert_eq!(space.live_temporaries(), 2);
    }

    #[test]
    fn releasing_permanent_registers_is_a_no_op() {
        let mut space = RegisterSpace::new(ValueType::I64);
        let local = space.acquire_register();
        space.release(local);
        space.release(Reg::ret(ValueType::I64));
        assert_eq!(space.acquire_temporary().index, 2);
    }

    #[test]
    fn spaces_are_independent() {
        let mut regs = RegisterAllocator::default();
        regs.acquire_register(ValueType::I32);
        let f = regs.acquire_temporary(ValueType::F32);
        let i = regs.acquire_temporary(ValueType::I32);
        assert_eq!(f.index, 1);
        assert_eq!(i.index, 2);
        let frame = regs.frame();
        assert_eq!(frame.locals, [1, 0, 0, 0]);
        assert_eq!(frame.temporaries, [1, 0, 1, 0]);
        assert_eq!(frame.register_count(ValueType::I32), 3);
        assert_eq!(regs.live_temporaries(), 2);
    }
}
