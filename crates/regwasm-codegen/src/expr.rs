//! Non-control operators: variables, constants, arithmetic, memory, calls.
//!
//! Operand and result types come from the operator table in
//! [`regwasm_types::opcode`]; every operator pops its operands, checks their
//! types, releases them and pushes a fresh temporary for its result.

use regwasm_reader::{CallKind, ExprReader};
use regwasm_types::{
    ArrayView, CompileError, CompileResult, ErrorKind, Instruction, Literal, OpClass, OpCode, Reg,
    ValueType, WasmOp,
};

use crate::generator::FunctionGenerator;

impl<R: ExprReader> FunctionGenerator<'_, R> {
    /// Compile a non-control operator.
    pub(crate) fn emit_operator(&mut self, op: WasmOp) -> CompileResult<()> {
        match op.class() {
            OpClass::Const(ty) => self.emit_const(ty),
            OpClass::Unary { result, input, op: target } => {
                let value = self.pop_typed(input, op)?;
                self.registers.release(value);
                let dst = self.registers.acquire_temporary(result);
                self.writer.reg2(target, dst, value);
                self.stack.push(dst);
                Ok(())
            }
            OpClass::Binary { result, operand, op: target } => {
                let rhs = self.pop_typed(operand, op)?;
                let lhs = self.pop_typed(operand, op)?;
                self.registers.release(rhs);
                self.registers.release(lhs);
                let dst = self.registers.acquire_temporary(result);
                self.writer.reg3(target, dst, lhs, rhs);
                self.stack.push(dst);
                Ok(())
            }
            OpClass::Load { ty, view } => self.emit_load(ty, view),
            OpClass::Store { ty, view } => self.emit_store(ty, view),
            OpClass::Memory => self.emit_memory(op),
            OpClass::Variable => self.emit_variable(op),
            OpClass::Parametric => self.emit_parametric(op),
            OpClass::Control | OpClass::Nyi => Err(CompileError::new(
                ErrorKind::UnexpectedOpcode,
                format!("{} reached the operator table", op.name()),
            )),
        }
    }

    fn emit_const(&mut self, ty: ValueType) -> CompileResult<()> {
        let literal = self.reader.current_node().literal;
        debug_assert_eq!(literal.ty(), ty);
        let dst = self.registers.acquire_temporary(ty);
        self.writer.reg1_const(OpCode::load_const(ty), dst, literal);
        self.stack.push(dst);
        Ok(())
    }

    // ══════════════════════════════════════════════════════════════════════
    // Parametric
    // ══════════════════════════════════════════════════════════════════════

    fn emit_parametric(&mut self, op: WasmOp) -> CompileResult<()> {
        match op {
            WasmOp::Nop => Ok(()),
            WasmOp::Drop => {
                let value = self.stack.pop()?;
                self.registers.release(value);
                Ok(())
            }
            _ => self.emit_select(),
        }
    }

    fn emit_select(&mut self) -> CompileResult<()> {
        let cond = self.pop_typed(ValueType::I32, WasmOp::Select)?;
        let if_false = self.stack.pop()?;
        let if_true = self.stack.pop()?;
        if if_true.ty != if_false.ty {
            return Err(CompileError::new(
                ErrorKind::OperandTypeMismatch,
                format!("select operands differ: {} and {}", if_true.ty, if_false.ty),
            ));
        }
        self.registers.release(cond);
        self.registers.release(if_false);
        self.registers.release(if_true);
        let dst = self.registers.acquire_temporary(if_true.ty);

        let false_label = self.writer.define_label();
        let done = self.writer.define_label();
        self.writer.br_reg1(OpCode::BrFalse, false_label, cond);
        self.writer.mov(dst, if_true);
        self.writer.br(OpCode::Br, done);
        self.writer.mark_label(false_label);
        self.writer.mov(dst, if_false);
        self.writer.mark_label(done);

        self.stack.push(dst);
        Ok(())
    }

    // ══════════════════════════════════════════════════════════════════════
    // Variables
    // ══════════════════════════════════════════════════════════════════════

    fn local(&self, index: u32) -> CompileResult<Reg> {
        self.locals.get(index as usize).copied().ok_or_else(|| {
            CompileError::new(
                ErrorKind::InvalidLocalIndex,
                format!("local index {index} out of range ({} locals)", self.locals.len()),
            )
        })
    }

    /// Copy stack entries that still refer to `local` before it is
    /// overwritten.
    fn preserve_local(&mut self, local: Reg) {
        for entry in self.stack.values_mut() {
            if *entry == local {
                let copy = self.registers.acquire_temporary(local.ty);
                self.writer.mov(copy, local);
                *entry = copy;
            }
        }
    }

    /// Copy every stack entry that refers to a local into a temporary.
    ///
    /// Runs before a scope opens. A write inside the scope may execute on
    /// some paths only, so values below the scope must not alias a local.
    pub(crate) fn detach_locals(&mut self) {
        for entry in self.stack.values_mut() {
            if self.locals.contains(entry) {
                let copy = self.registers.acquire_temporary(entry.ty);
                self.writer.mov(copy, *entry);
                *entry = copy;
            }
        }
    }

    fn emit_variable(&mut self, op: WasmOp) -> CompileResult<()> {
        let index = self.reader.current_node().index;
        match op {
            WasmOp::LocalGet => {
                let local = self.local(index)?;
                self.stack.push(local);
            }
            WasmOp::LocalSet | WasmOp::LocalTee => {
                let local = self.local(index)?;
                let value = self.pop_typed(local.ty, op)?;
                if value != local {
                    self.preserve_local(local);
                    self.writer.mov(local, value);
                }
                self.registers.release(value);
                if op == WasmOp::LocalTee {
                    self.stack.push(local);
                }
            }
            WasmOp::GlobalGet => {
                let global = *self.module.global(index)?;
                let dst = self.registers.acquire_temporary(global.ty);
                let slot = self.module.layout.global_slot(index);
                self.writer.slot(OpCode::load_slot(global.ty), dst, slot);
                self.stack.push(dst);
            }
            _ => {
                let global = *self.module.global(index)?;
                if !global.mutable {
                    return Err(CompileError::new(
                        ErrorKind::ImmutableGlobal,
                        format!("global {index} is immutable"),
                    ));
                }
                let value = self.pop_typed(global.ty, op)?;
                let slot = self.module.layout.global_slot(index);
                self.writer.slot(OpCode::store_slot(global.ty), value, slot);
                self.registers.release(value);
            }
        }
        Ok(())
    }

    // ══════════════════════════════════════════════════════════════════════
    // Memory
    // ══════════════════════════════════════════════════════════════════════

    /// Static offset of the current memory operator, after checking that
    /// its memory exists.
    fn memory_offset(&mut self) -> CompileResult<u32> {
        let mem = self.reader.current_node().mem;
        self.module.require_memory(mem.memory)?;
        u32::try_from(mem.offset).map_err(|_| {
            CompileError::new(
                ErrorKind::SizeOverflow,
                format!("memory offset {} exceeds 32 bits", mem.offset),
            )
        })
    }

    /// Compute `zext(index) + offset` as a 64-bit temporary.
    fn effective_address(&mut self, index: Reg, offset: u32) -> Reg {
        self.registers.release(index);
        let address = self.registers.acquire_temporary(ValueType::I64);
        self.writer.reg2(OpCode::ExtendUIntToLong, address, index);
        if offset != 0 {
            let constant = self.registers.acquire_temporary(ValueType::I64);
            self.writer
                .reg1_const(OpCode::LdLongConst, constant, Literal::I64(i64::from(offset)));
            self.writer.reg3(OpCode::AddLong, address, address, constant);
            self.registers.release(constant);
        }
        self.uses_heap_buffer = true;
        address
    }

    fn emit_load(&mut self, ty: ValueType, view: ArrayView) -> CompileResult<()> {
        let offset = self.memory_offset()?;
        let index = self.pop_memory_index()?;
        let address = self.effective_address(index, offset);
        let dst = self.registers.acquire_temporary(ty);
        self.writer.typed_arr(OpCode::LdArr, dst, address, view);
        self.registers.release(address);
        self.stack.push(dst);
        Ok(())
    }

    fn emit_store(&mut self, ty: ValueType, view: ArrayView) -> CompileResult<()> {
        let offset = self.memory_offset()?;
        let value = self.stack.pop()?;
        if value.ty != ty {
            return Err(CompileError::new(
                ErrorKind::StoreValueTypeMismatch,
                format!("store of {ty} got a {} value", value.ty),
            ));
        }
        let index = self.pop_memory_index()?;
        let address = self.effective_address(index, offset);
        self.writer.typed_arr(OpCode::StArr, value, address, view);
        self.registers.release(address);
        self.registers.release(value);
        Ok(())
    }

    fn pop_memory_index(&mut self) -> CompileResult<Reg> {
        let index = self.stack.pop()?;
        if index.ty != ValueType::I32 {
            return Err(CompileError::new(
                ErrorKind::OperandTypeMismatch,
                format!("memory index must be i32, got {}", index.ty),
            ));
        }
        Ok(index)
    }

    fn emit_memory(&mut self, op: WasmOp) -> CompileResult<()> {
        let mem = self.reader.current_node().mem;
        self.module.require_memory(mem.memory)?;
        if op == WasmOp::MemorySize {
            let dst = self.registers.acquire_temporary(ValueType::I32);
            self.writer.reg1(OpCode::CurrentMemory, dst);
            self.stack.push(dst);
        } else {
            let delta = self.pop_typed(ValueType::I32, op)?;
            self.registers.release(delta);
            let dst = self.registers.acquire_temporary(ValueType::I32);
            self.writer.reg2(OpCode::GrowMemory, dst, delta);
            self.stack.push(dst);
        }
        Ok(())
    }

    // ══════════════════════════════════════════════════════════════════════
    // Calls
    // ══════════════════════════════════════════════════════════════════════

    pub(crate) fn emit_call(&mut self, op: WasmOp) -> CompileResult<()> {
        let module = self.module;
        let node = self.reader.current_node();
        let (index, table, call_kind) = (node.index, node.table, node.call_kind);

        // Indirect calls pop the table index first; it is on top.
        let (sig, host, table_index) = if op == WasmOp::CallIndirect {
            let table_index = self.pop_typed(ValueType::I32, op)?;
            // At most one table is ever declared.
            module.require_table(table)?;
            (module.signature(index)?, false, Some(table_index))
        } else {
            let info = module.function(index)?;
            debug_assert_eq!(call_kind == CallKind::Import, info.is_import());
            (module.signature(info.signature)?, info.is_import(), None)
        };

        let ptr = self.options.pointer_width.bytes();
        let params_bytes = if host {
            u32::from(ptr) * sig.param_count() as u32
        } else {
            u32::from(sig.params_size)
        };
        let arg_size = params_bytes + u32::from(ptr);
        if arg_size >= u32::from(u16::MAX) {
            return Err(CompileError::new(
                ErrorKind::SizeOverflow,
                format!("call argument area of {arg_size} bytes is too large"),
            ));
        }
        let arg_size = arg_size as u16;

        // Arguments come off the stack last-first but go out first-first.
        let mut args = Vec::with_capacity(sig.param_count());
        for (i, &expected) in sig.params.iter().enumerate().rev() {
            let arg = self.stack.pop()?;
            if arg.ty != expected {
                return Err(CompileError::new(
                    ErrorKind::CallArgumentTypeMismatch,
                    format!("argument {i} of {} expects {expected}, got {}", op.name(), arg.ty),
                ));
            }
            args.push(arg);
        }
        args.reverse();

        let start = if host { OpCode::StartCall } else { OpCode::IStartCall };
        self.writer.start_call(start, arg_size);
        let mut offset = u32::from(ptr);
        for (i, &arg) in args.iter().enumerate() {
            self.writer
                .arg_out(OpCode::arg_out(arg.ty, host), offset / u32::from(ptr), arg);
            offset += if host { u32::from(ptr) } else { u32::from(sig.param_sizes[i]) };
        }
        for arg in args {
            self.registers.release(arg);
        }

        match table_index {
            Some(table_index) => {
                self.writer.emit(Instruction::TableFunc {
                    op: OpCode::LdTableFunc,
                    slot: module.layout.table_slot,
                    index: table_index,
                });
                self.writer.emit(Instruction::Signature {
                    op: OpCode::CheckSignature,
                    signature: index,
                });
                self.registers.release(table_index);
            }
            None => self.writer.emit(Instruction::FuncSlot {
                op: OpCode::LdFuncSlot,
                slot: module.layout.function_slot(index),
            }),
        }

        let arg_slots = if host {
            sig.param_count() as u16 + 1
        } else {
            arg_size.div_ceil(ptr)
        };
        let call = if host { OpCode::Call } else { OpCode::ICall };
        self.writer.call(call, arg_slots, sig.result);
        self.max_arg_out_depth = self.max_arg_out_depth.max(arg_slots.saturating_add(1));

        if let Some(ty) = sig.result {
            let dst = self.registers.acquire_temporary(ty);
            self.writer.reg2(OpCode::convert_result(ty, host), dst, Reg::ret(ty));
            self.stack.push(dst);
        }
        Ok(())
    }
}
