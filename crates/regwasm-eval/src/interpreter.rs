//! Bytecode interpreter.
//!
//! Executes one function's [`ByteCode`] over a register frame with one
//! register file per value type, sized from the function's
//! [`FrameLayout`]. Register 0 of each file receives call results and the
//! function's return value. Calls recurse on the host stack, bounded by
//! the store's call depth limit.

use tracing::trace;

use regwasm_codegen::{CompiledModule, FrameLayout};
use regwasm_types::{ByteCode, Instruction, Label, OpCode, Reg, ValueType};

use crate::error::{EvalError, EvalResult};
use crate::instance::Store;
use crate::numeric;
use crate::value::Value;

// ══════════════════════════════════════════════════════════════════════════════
// Frames
// ══════════════════════════════════════════════════════════════════════════════

struct Frame {
    regs: [Vec<Value>; 4],
}

impl Frame {
    fn new(layout: &FrameLayout) -> Self {
        Self {
            regs: ValueType::ALL
                .map(|ty| vec![Value::zero(ty); layout.register_count(ty) as usize]),
        }
    }

    fn get(&self, reg: Reg) -> EvalResult<Value> {
        self.regs[reg.ty.space()]
            .get(reg.index as usize)
            .copied()
            .ok_or_else(|| EvalError::Runtime(format!("register {reg} outside the frame")))
    }

    fn set(&mut self, reg: Reg, value: Value) -> EvalResult<()> {
        if value.ty() != reg.ty {
            return Err(EvalError::Runtime(format!("cannot store {value} in {reg}")));
        }
        let slot = self.regs[reg.ty.space()]
            .get_mut(reg.index as usize)
            .ok_or_else(|| EvalError::Runtime(format!("register {reg} outside the frame")))?;
        *slot = value;
        Ok(())
    }
}

/// Outgoing call being assembled between `StartCall` and `Call`.
#[derive(Default)]
struct PendingCall {
    args: Vec<(u32, Value)>,
    callee: Option<u32>,
}

// ══════════════════════════════════════════════════════════════════════════════
// Interpreter
// ══════════════════════════════════════════════════════════════════════════════

pub(crate) struct Interpreter<'a> {
    compiled: &'a CompiledModule,
    store: &'a mut Store,
}

impl<'a> Interpreter<'a> {
    pub(crate) fn new(compiled: &'a CompiledModule, store: &'a mut Store) -> Self {
        Self { compiled, store }
    }

    /// Call any function of the index space with checked arguments.
    pub(crate) fn call(&mut self, index: u32, args: &[Value]) -> EvalResult<Option<Value>> {
        let compiled = self.compiled;
        let header = compiled
            .header(index)
            .ok_or_else(|| EvalError::Runtime(format!("function {index} does not exist")))?;
        if args.len() != header.param_types.len()
            || args.iter().zip(&header.param_types).any(|(a, &ty)| a.ty() != ty)
        {
            let got: Vec<String> = args.iter().map(|a| a.ty().to_string()).collect();
            let expected: Vec<String> = header.param_types.iter().map(|t| t.to_string()).collect();
            return Err(EvalError::ArgumentMismatch(format!(
                "{} expects ({}), got ({})",
                header.name,
                expected.join(", "),
                got.join(", ")
            )));
        }

        if self.store.depth >= self.store.max_depth {
            return Err(EvalError::CallStackExhausted);
        }
        self.store.depth += 1;
        trace!(function = %header.name, depth = self.store.depth, "call");
        let result = if header.is_import {
            self.call_host(index, args)
        } else {
            self.execute(index, args)
        };
        self.store.depth -= 1;

        let result = result?;
        if result.map(Value::ty) != header.result {
            return Err(EvalError::Runtime(format!(
                "{} returned {}, expected {}",
                header.name,
                result.map_or("nothing".to_string(), |v| v.to_string()),
                regwasm_types::ty::result_name(header.result)
            )));
        }
        Ok(result)
    }

    fn call_host(&mut self, index: u32, args: &[Value]) -> EvalResult<Option<Value>> {
        let f = self
            .store
            .host
            .get(index as usize)
            .and_then(Option::as_ref)
            .ok_or_else(|| EvalError::UnknownImport(format!("function {index}")))?;
        f(args)
    }

    fn execute(&mut self, index: u32, args: &[Value]) -> EvalResult<Option<Value>> {
        let compiled = self.compiled;
        let function = compiled
            .function(index)
            .ok_or_else(|| EvalError::Runtime(format!("function {index} has no body")))?;
        let code = &function.bytecode;
        let mut frame = Frame::new(&function.frame);

        // Parameters occupy the first registers of their spaces.
        let mut next = [1u32; 4];
        for &arg in args {
            let space = arg.ty().space();
            frame.set(Reg::new(arg.ty(), next[space]), arg)?;
            next[space] += 1;
        }

        let mut pending: Option<PendingCall> = None;
        let mut pc = 0usize;
        loop {
            let instr = *code
                .instructions
                .get(pc)
                .ok_or_else(|| EvalError::Runtime(format!("execution ran past instruction {pc}")))?;
            pc += 1;

            match instr {
                Instruction::Empty { op } => match op {
                    OpCode::Ret => {
                        let header = &compiled.headers[index as usize];
                        return header.result.map(|ty| frame.get(Reg::ret(ty))).transpose();
                    }
                    OpCode::Unreachable => return Err(EvalError::Unreachable),
                    other => return Err(malformed(other)),
                },
                Instruction::Reg1 { op, r0 } => match op {
                    OpCode::LdUndef | OpCode::BeginSwitch => {}
                    OpCode::CurrentMemory => {
                        let pages = self.memory()?.pages();
                        frame.set(r0, Value::I32(pages as i32))?;
                    }
                    other => return Err(malformed(other)),
                },
                Instruction::Reg2 { op, r0, r1 } => {
                    let value = frame.get(r1)?;
                    let result = match op {
                        OpCode::GrowMemory => {
                            let delta = value.as_i32()? as u32;
                            let memory = self
                                .store
                                .memory
                                .as_mut()
                                .ok_or_else(|| EvalError::Runtime("no memory".to_string()))?;
                            Value::I32(memory.grow(delta))
                        }
                        op if is_move(op) => value,
                        op => numeric::unary(op, value)?,
                    };
                    frame.set(r0, result)?;
                }
                Instruction::Reg3 { op, r0, r1, r2 } => {
                    let result = numeric::binary(op, frame.get(r1)?, frame.get(r2)?)?;
                    frame.set(r0, result)?;
                }
                Instruction::Reg1Const { r0, value, .. } => frame.set(r0, Value::from(value))?,

                // ── Branches ──
                Instruction::Br { label, .. } => pc = target(code, label)?,
                Instruction::BrReg1 { op, label, r1 } => {
                    let cond = frame.get(r1)?.as_i32()? != 0;
                    if cond == (op == OpCode::BrTrue) {
                        pc = target(code, label)?;
                    }
                }
                Instruction::BrReg1Const { label, r1, value, .. } => {
                    if frame.get(r1)?.as_i32()? == value {
                        pc = target(code, label)?;
                    }
                }
                Instruction::LoopStart { .. } => {}

                // ── Globals ──
                Instruction::Slot { op, value, slot } => {
                    let global = slot
                        .checked_sub(compiled.module.layout.global_offset)
                        .map(|g| g as usize)
                        .filter(|&g| g < self.store.globals.len())
                        .ok_or_else(|| EvalError::Runtime(format!("slot {slot} is not a global")))?;
                    match op {
                        OpCode::LdSlotInt | OpCode::LdSlotLong | OpCode::LdSlotFlt | OpCode::LdSlotDb => {
                            frame.set(value, self.store.globals[global])?;
                        }
                        _ => self.store.globals[global] = frame.get(value)?,
                    }
                }

                // ── Memory ──
                Instruction::TypedArr { op, value, address, view } => {
                    let address = frame.get(address)?.as_i64()? as u64;
                    if op == OpCode::LdArr {
                        let loaded = self.memory()?.load(address, view, value.ty)?;
                        frame.set(value, loaded)?;
                    } else {
                        let stored = frame.get(value)?;
                        self.store
                            .memory
                            .as_mut()
                            .ok_or_else(|| EvalError::Runtime("no memory".to_string()))?
                            .store(address, view, stored)?;
                    }
                }

                // ── Calls ──
                Instruction::StartCall { .. } => pending = Some(PendingCall::default()),
                Instruction::ArgOut { slot, value, .. } => {
                    pending_call(&mut pending)?.args.push((slot, frame.get(value)?));
                }
                Instruction::FuncSlot { slot, .. } => {
                    let callee = slot
                        .checked_sub(compiled.module.layout.function_offset)
                        .ok_or_else(|| EvalError::Runtime(format!("slot {slot} is not a function")))?;
                    pending_call(&mut pending)?.callee = Some(callee);
                }
                Instruction::TableFunc { index, .. } => {
                    let entry = frame.get(index)?.as_i32()? as u32;
                    let callee = self
                        .store
                        .table
                        .get(entry as usize)
                        .copied()
                        .flatten()
                        .ok_or_else(|| EvalError::UndefinedElement(format!("table index {entry}")))?;
                    pending_call(&mut pending)?.callee = Some(callee);
                }
                Instruction::Signature { signature, .. } => {
                    let callee = pending_call(&mut pending)?
                        .callee
                        .ok_or_else(|| EvalError::Runtime("signature check without callee".to_string()))?;
                    let expected = compiled.module.signature(signature)?;
                    let actual = compiled.module.function_signature(callee)?;
                    if !expected.is_equivalent(actual) {
                        return Err(EvalError::IndirectCallTypeMismatch(format!(
                            "expected {expected}, callee {callee} has {actual}"
                        )));
                    }
                }
                Instruction::Call { result, .. } => {
                    let mut call = pending
                        .take()
                        .ok_or_else(|| EvalError::Runtime("call without StartCall".to_string()))?;
                    let callee = call
                        .callee
                        .ok_or_else(|| EvalError::Runtime("call without callee".to_string()))?;
                    call.args.sort_by_key(|&(slot, _)| slot);
                    let args: Vec<Value> = call.args.into_iter().map(|(_, v)| v).collect();
                    let value = self.call(callee, &args)?;
                    match (result, value) {
                        (Some(ty), Some(value)) => frame.set(Reg::ret(ty), value)?,
                        (None, _) => {}
                        (Some(ty), None) => {
                            return Err(EvalError::Runtime(format!(
                                "function {callee} returned nothing, expected {ty}"
                            )))
                        }
                    }
                }
            }
        }
    }

    fn memory(&self) -> EvalResult<&crate::memory::LinearMemory> {
        self.store
            .memory
            .as_ref()
            .ok_or_else(|| EvalError::Runtime("no memory".to_string()))
    }
}

/// Register copies: moves, return-register writes and call-result reads.
fn is_move(op: OpCode) -> bool {
    use OpCode::*;
    matches!(
        op,
        LdInt | LdLong | LdFlt | LdDb
            | ReturnInt | ReturnLong | ReturnFlt | ReturnDb
            | ConvVTI | ConvVTL | ConvVTF | ConvVTD
            | IConvVTI | IConvVTL | IConvVTF | IConvVTD
    )
}

fn target(code: &ByteCode, label: Label) -> EvalResult<usize> {
    code.target(label)
        .ok_or_else(|| EvalError::Runtime(format!("unresolved label {label}")))
}

fn pending_call(pending: &mut Option<PendingCall>) -> EvalResult<&mut PendingCall> {
    pending
        .as_mut()
        .ok_or_else(|| EvalError::Runtime("argument outside of a call sequence".to_string()))
}

fn malformed(op: OpCode) -> EvalError {
    EvalError::Runtime(format!("{op} has the wrong operand layout"))
}
