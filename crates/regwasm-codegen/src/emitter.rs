//! Bytecode writer.
//!
//! Appends instructions for one function, hands out labels and records
//! where they are marked, and keeps loop bookkeeping. Labels are resolved
//! to instruction indices when the function is ended.

use regwasm_types::{
    ArrayView, ByteCode, Instruction, Label, Literal, LoopRange, OpCode, Reg, ValueType,
};

#[derive(Debug, Default)]
pub struct ByteCodeWriter {
    instructions: Vec<Instruction>,
    labels: Vec<Option<u32>>,
    loops: Vec<LoopRange>,
    active: bool,
}

impl ByteCodeWriter {
    /// Start a function body.
    pub fn begin(&mut self) {
        self.reset();
        self.active = true;
    }

    /// Finish the function body and resolve labels.
    ///
    /// A label that was never marked resolves to the end of the body.
    pub fn end(&mut self) -> ByteCode {
        debug_assert!(self.active, "end without begin");
        let end = self.pc();
        debug_assert!(
            self.labels.iter().all(Option::is_some),
            "unmarked label in function body"
        );
        let code = ByteCode {
            instructions: std::mem::take(&mut self.instructions),
            labels: self.labels.drain(..).map(|l| l.unwrap_or(end)).collect(),
            loops: std::mem::take(&mut self.loops),
        };
        self.active = false;
        code
    }

    fn reset(&mut self) {
        self.instructions.clear();
        self.labels.clear();
        self.loops.clear();
        self.active = false;
    }

    /// Index of the next instruction.
    pub fn pc(&self) -> u32 {
        self.instructions.len() as u32
    }

    pub fn define_label(&mut self) -> Label {
        self.labels.push(None);
        Label(self.labels.len() as u32 - 1)
    }

    pub fn mark_label(&mut self, label: Label) {
        let pc = self.pc();
        let slot = &mut self.labels[label.0 as usize];
        debug_assert!(slot.is_none(), "label {label} marked twice");
        *slot = Some(pc);
    }

    /// Mark the loop head and open a loop. Returns its id.
    pub fn enter_loop(&mut self, head: Label) -> u32 {
        self.mark_label(head);
        let loop_id = self.loops.len() as u32;
        self.loops.push(LoopRange {
            head: self.pc(),
            end: self.pc(),
        });
        self.emit(Instruction::LoopStart {
            op: OpCode::LoopStart,
            loop_id,
        });
        loop_id
    }

    pub fn exit_loop(&mut self, loop_id: u32) {
        let pc = self.pc();
        self.loops[loop_id as usize].end = pc;
    }

    pub fn emit(&mut self, instr: Instruction) {
        debug_assert!(self.active, "emit outside of a function body");
        self.instructions.push(instr);
    }

    // ── Layout helpers ───────────────────────────────────────────────────

    pub fn empty(&mut self, op: OpCode) {
        self.emit(Instruction::Empty { op });
    }

    pub fn reg1(&mut self, op: OpCode, r0: Reg) {
        self.emit(Instruction::Reg1 { op, r0 });
    }

    pub fn reg2(&mut self, op: OpCode, r0: Reg, r1: Reg) {
        self.emit(Instruction::Reg2 { op, r0, r1 });
    }

    pub fn reg3(&mut self, op: OpCode, r0: Reg, r1: Reg, r2: Reg) {
        self.emit(Instruction::Reg3 { op, r0, r1, r2 });
    }

    pub fn reg1_const(&mut self, op: OpCode, r0: Reg, value: Literal) {
        self.emit(Instruction::Reg1Const { op, r0, value });
    }

    /// Register move; self-moves are dropped.
    pub fn mov(&mut self, dst: Reg, src: Reg) {
        if dst != src {
            self.reg2(OpCode::load(dst.ty), dst, src);
        }
    }

    pub fn load_zero(&mut self, dst: Reg) {
        self.reg1_const(OpCode::load_const(dst.ty), dst, Literal::zero(dst.ty));
    }

    pub fn br(&mut self, op: OpCode, label: Label) {
        self.emit(Instruction::Br { op, label });
    }

    pub fn br_reg1(&mut self, op: OpCode, label: Label, r1: Reg) {
        self.emit(Instruction::BrReg1 { op, label, r1 });
    }

    pub fn br_reg1_const(&mut self, op: OpCode, label: Label, r1: Reg, value: i32) {
        self.emit(Instruction::BrReg1Const {
            op,
            label,
            r1,
            value,
        });
    }

    pub fn slot(&mut self, op: OpCode, value: Reg, slot: u32) {
        self.emit(Instruction::Slot { op, value, slot });
    }

    pub fn typed_arr(&mut self, op: OpCode, value: Reg, address: Reg, view: ArrayView) {
        self.emit(Instruction::TypedArr {
            op,
            value,
            address,
            view,
        });
    }

    pub fn start_call(&mut self, op: OpCode, arg_size: u16) {
        self.emit(Instruction::StartCall { op, arg_size });
    }

    pub fn arg_out(&mut self, op: OpCode, slot: u32, value: Reg) {
        self.emit(Instruction::ArgOut { op, slot, value });
    }

    pub fn call(&mut self, op: OpCode, arg_slots: u16, result: Option<ValueType>) {
        self.emit(Instruction::Call {
            op,
            arg_slots,
            result,
        });
    }
}
