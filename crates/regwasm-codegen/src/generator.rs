//! Function body generator: control flow.
//!
//! Walks a function body once, one operator at a time, keeping a symbolic
//! operand stack and a label stack, and emits register bytecode as it goes.
//!
//! Structured control flow is linearised as follows:
//!
//! - `block`: the block's label is marked after its `end`.
//! - `loop`: the head is marked before the body; branches to the loop go to
//!   a landing pad that jumps back to the head, and fallthrough leaves
//!   through a hidden tail label.
//! - `if`: `BrFalse` to the false label, then branch, `Br` to the end label,
//!   false label, else branch, end label.
//!
//! Typed blocks own a yield register. Every path out of the block writes it
//! before branching, and the block's value is the yield register afterwards.
//!
//! Non-control operators live in [`crate::expr`].

use tracing::debug;

use regwasm_reader::{BlockSig, ExprReader, Module};
use regwasm_types::{
    CompileError, CompileOptions, CompileResult, ErrorKind, Label, OpCode, Reg, ValueType,
    WasmOp, YieldPolicy,
};

use crate::compiled::CompiledFunction;
use crate::emitter::ByteCodeWriter;
use crate::eval_stack::EvalStack;
use crate::header::FunctionHeader;
use crate::registers::RegisterAllocator;

// ══════════════════════════════════════════════════════════════════════════════
// Block bookkeeping
// ══════════════════════════════════════════════════════════════════════════════

/// Where a branch to a block delivers its value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BlockYield {
    None,
    /// Index into the generator's yield slots.
    Value(usize),
    /// The function-level block: values go to the return register.
    Return(Option<ValueType>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct BlockInfo {
    pub label: Label,
    pub yields: BlockYield,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct YieldSlot {
    pub reg: Reg,
    /// Set once some path has written the register.
    pub did_yield: bool,
}

/// A construct waiting for its `end` (or `else`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Scope {
    Function,
    Block(BlockInfo),
    /// `info` describes the hidden tail block; branches target `pad`.
    Loop {
        info: BlockInfo,
        head: Label,
        pad: Label,
        loop_id: u32,
    },
    If {
        info: BlockInfo,
        false_label: Label,
        in_else: bool,
    },
    /// A block, loop or if opened in unreachable code.
    Dead { opener: WasmOp, seen_else: bool },
}

// ══════════════════════════════════════════════════════════════════════════════
// Generator
// ══════════════════════════════════════════════════════════════════════════════

/// Generates one function body.
pub struct FunctionGenerator<'m, R> {
    pub(crate) module: &'m Module,
    pub(crate) header: &'m FunctionHeader,
    pub(crate) options: &'m CompileOptions,
    pub(crate) reader: R,
    pub(crate) writer: ByteCodeWriter,
    pub(crate) registers: RegisterAllocator,
    pub(crate) stack: EvalStack,
    pub(crate) locals: Vec<Reg>,
    pub(crate) blocks: Vec<BlockInfo>,
    pub(crate) yields: Vec<YieldSlot>,
    pub(crate) unreachable: bool,
    pub(crate) uses_heap_buffer: bool,
    pub(crate) max_arg_out_depth: u16,
    nesting: usize,
}

impl<'m, R: ExprReader> FunctionGenerator<'m, R> {
    pub fn new(
        module: &'m Module,
        header: &'m FunctionHeader,
        options: &'m CompileOptions,
        reader: R,
    ) -> Self {
        Self {
            module,
            header,
            options,
            reader,
            writer: ByteCodeWriter::default(),
            registers: RegisterAllocator::default(),
            stack: EvalStack::default(),
            locals: Vec::new(),
            blocks: Vec::new(),
            yields: Vec::new(),
            unreachable: false,
            uses_heap_buffer: false,
            max_arg_out_depth: 0,
            nesting: 0,
        }
    }

    /// Generate the whole body.
    ///
    /// Errors without a position are stamped with the offset of the operator
    /// being compiled.
    pub fn generate(mut self) -> CompileResult<CompiledFunction> {
        debug!(function = %self.header.name, index = self.header.index, "generating body");
        match self.generate_body() {
            Ok(()) => {
                debug_assert_eq!(self.registers.live_temporaries(), 0, "leaked temporaries");
                Ok(CompiledFunction {
                    index: self.header.index,
                    bytecode: self.writer.end(),
                    frame: self.registers.frame(),
                    uses_heap_buffer: self.uses_heap_buffer,
                    max_arg_out_depth: self.max_arg_out_depth,
                })
            }
            Err(err) if err.offset.is_some() => Err(err),
            Err(err) => Err(err.at(self.reader.current_offset())),
        }
    }

    fn generate_body(&mut self) -> CompileResult<()> {
        self.writer.begin();
        self.enregister_locals()?;

        let exit = self.writer.define_label();
        self.blocks.push(BlockInfo {
            label: exit,
            yields: BlockYield::Return(self.header.result),
        });
        self.stack.enter_scope();

        self.emit_scopes()?;
        if !self.unreachable {
            let expected = usize::from(self.header.result.is_some());
            let residual = self.stack.scope_len();
            if residual > expected {
                return Err(CompileError::new(
                    ErrorKind::NonEmptyStackAtScopeExit,
                    format!(
                        "{} value(s) left on the operand stack at end of function",
                        residual - expected
                    ),
                ));
            }
            self.emit_return()?;
        }
        self.stack.exit_scope()?;
        self.blocks.pop();

        self.writer.mark_label(exit);
        self.writer.empty(OpCode::Ret);

        if !self.reader.is_current_function_completed() {
            return Err(CompileError::new(
                ErrorKind::TruncatedOrOverlongFunctionBody,
                "function body continues past its final end",
            ));
        }
        Ok(())
    }

    /// Give parameters and declared locals their permanent registers.
    /// Declared locals start at zero.
    fn enregister_locals(&mut self) -> CompileResult<()> {
        for &ty in &self.header.param_types {
            let reg = self.registers.acquire_register(ty);
            self.locals.push(reg);
        }
        let info = self.module.function(self.header.index)?;
        for &ty in &info.locals {
            let reg = self.registers.acquire_register(ty);
            self.writer.load_zero(reg);
            self.locals.push(reg);
        }
        Ok(())
    }

    // ══════════════════════════════════════════════════════════════════════
    // Dispatch
    // ══════════════════════════════════════════════════════════════════════

    /// Compile operators up to the function-level `end`.
    ///
    /// Open constructs are kept on an explicit stack, so deep nesting costs
    /// heap memory instead of native stack.
    fn emit_scopes(&mut self) -> CompileResult<()> {
        let mut scopes = vec![Scope::Function];
        while let Some(&top) = scopes.last() {
            let op = self.reader.read_expr()?;
            if op.is_nyi() {
                return Err(CompileError::new(
                    ErrorKind::UnsupportedOperator,
                    format!("operator {} is not implemented", op.name()),
                ));
            }
            match op {
                WasmOp::End | WasmOp::Else => {
                    scopes.pop();
                    if let Some(next) = self.close_scope(top, op)? {
                        scopes.push(next);
                    }
                }
                _ if self.unreachable => {
                    if op.opens_scope() {
                        self.enter_nesting()?;
                        scopes.push(Scope::Dead {
                            opener: op,
                            seen_else: false,
                        });
                    }
                }
                WasmOp::Block => scopes.push(self.open_block()?),
                WasmOp::Loop => scopes.push(self.open_loop()?),
                WasmOp::If => scopes.push(self.open_if()?),
                _ => self.emit_expr(op)?,
            }
        }
        Ok(())
    }

    fn emit_expr(&mut self, op: WasmOp) -> CompileResult<()> {
        match op {
            WasmOp::Br => self.emit_br(),
            WasmOp::BrIf => self.emit_br_if(),
            WasmOp::BrTable => self.emit_br_table(),
            WasmOp::Return => self.emit_return(),
            WasmOp::Unreachable => {
                self.writer.empty(OpCode::Unreachable);
                self.set_unreachable();
                Ok(())
            }
            WasmOp::Call | WasmOp::CallIndirect => self.emit_call(op),
            _ => self.emit_operator(op),
        }
    }

    fn enter_nesting(&mut self) -> CompileResult<()> {
        self.nesting += 1;
        if self.nesting > self.options.max_nesting_depth {
            return Err(CompileError::new(
                ErrorKind::NestingTooDeep,
                format!("blocks nested deeper than {}", self.options.max_nesting_depth),
            ));
        }
        Ok(())
    }

    // ══════════════════════════════════════════════════════════════════════
    // Structured control flow
    // ══════════════════════════════════════════════════════════════════════

    /// Result type of the current operator's block signature.
    fn block_result(&self) -> CompileResult<Option<ValueType>> {
        match self.reader.current_node().block {
            BlockSig::Empty => Ok(None),
            BlockSig::Value(ty) => Ok(Some(ty)),
            BlockSig::Func(index) => {
                let sig = self.module.signature(index)?;
                if !sig.params.is_empty() {
                    return Err(CompileError::new(
                        ErrorKind::UnsupportedFeature,
                        format!("block parameters are not supported (type {index})"),
                    ));
                }
                Ok(sig.result)
            }
        }
    }

    fn push_block(&mut self, label: Label, result: Option<ValueType>) -> CompileResult<BlockInfo> {
        self.enter_nesting()?;
        let yields = match result {
            Some(ty) => {
                let reg = self.registers.acquire_temporary(ty);
                self.yields.push(YieldSlot { reg, did_yield: false });
                BlockYield::Value(self.yields.len() - 1)
            }
            None => BlockYield::None,
        };
        let info = BlockInfo { label, yields };
        self.blocks.push(info);
        Ok(info)
    }

    /// Pop a block and push its value, if any, for the enclosing code.
    fn pop_block(&mut self, info: BlockInfo) {
        self.blocks.pop();
        self.nesting -= 1;
        self.unreachable = false;
        if let BlockYield::Value(slot) = info.yields {
            self.stack.push(self.yields[slot].reg);
        }
    }

    /// Close an arm's operand scope at its `end`/`else` and deliver the
    /// fallthrough value.
    fn finish_arm(&mut self, info: BlockInfo, last: WasmOp, allow_else: bool) -> CompileResult<()> {
        if last == WasmOp::Else && !allow_else {
            return Err(unexpected(last));
        }
        if let BlockYield::Value(slot) = info.yields {
            if !self.unreachable {
                if self.stack.scope_len() > 0 {
                    let value = self.stack.pop()?;
                    self.yield_value(slot, value)?;
                    self.registers.release(value);
                } else if self.options.yield_policy == YieldPolicy::Strict {
                    return Err(CompileError::new(
                        ErrorKind::MissingBlockYield,
                        format!("block of type {} ends without a value", self.yields[slot].reg.ty),
                    ));
                }
            }
        }
        self.stack.exit_scope()?;
        self.ensure_yield(info);
        Ok(())
    }

    /// Write a zero into a yield register no path has written yet.
    fn ensure_yield(&mut self, info: BlockInfo) {
        if let BlockYield::Value(slot) = info.yields {
            if !self.yields[slot].did_yield {
                self.writer.load_zero(self.yields[slot].reg);
                self.yields[slot].did_yield = true;
            }
        }
    }

    fn open_block(&mut self) -> CompileResult<Scope> {
        let result = self.block_result()?;
        self.detach_locals();
        let label = self.writer.define_label();
        let info = self.push_block(label, result)?;
        self.stack.enter_scope();
        Ok(Scope::Block(info))
    }

    fn open_loop(&mut self) -> CompileResult<Scope> {
        let result = self.block_result()?;
        self.detach_locals();
        let tail = self.writer.define_label();
        let head = self.writer.define_label();
        let pad = self.writer.define_label();
        let loop_id = self.writer.enter_loop(head);

        // Branches to a loop carry no value; only fallthrough yields.
        let info = self.push_block(tail, result)?;
        self.blocks.pop();
        self.blocks.push(BlockInfo {
            label: pad,
            yields: BlockYield::None,
        });
        self.stack.enter_scope();
        Ok(Scope::Loop {
            info,
            head,
            pad,
            loop_id,
        })
    }

    fn open_if(&mut self) -> CompileResult<Scope> {
        let result = self.block_result()?;
        let cond = self.pop_typed(ValueType::I32, WasmOp::If)?;
        self.detach_locals();
        let false_label = self.writer.define_label();
        let end_label = self.writer.define_label();
        self.writer.br_reg1(OpCode::BrFalse, false_label, cond);
        self.registers.release(cond);

        let info = self.push_block(end_label, result)?;
        self.stack.enter_scope();
        Ok(Scope::If {
            info,
            false_label,
            in_else: false,
        })
    }

    /// Close `scope` at `last`. An `if` reaching its `else` returns the
    /// scope of the else arm.
    fn close_scope(&mut self, scope: Scope, last: WasmOp) -> CompileResult<Option<Scope>> {
        match scope {
            Scope::Function if last == WasmOp::Else => return Err(unexpected(last)),
            Scope::Function => {}
            Scope::Block(info) => {
                self.finish_arm(info, last, false)?;
                self.writer.mark_label(info.label);
                self.pop_block(info);
            }
            Scope::Loop {
                info,
                head,
                pad,
                loop_id,
            } => {
                self.finish_arm(info, last, false)?;
                self.writer.br(OpCode::Br, info.label);
                self.writer.mark_label(pad);
                self.writer.br(OpCode::Br, head);
                self.writer.mark_label(info.label);
                self.writer.exit_loop(loop_id);
                self.pop_block(info);
            }
            Scope::If {
                info,
                false_label,
                in_else: false,
            } => {
                self.finish_arm(info, last, true)?;
                self.writer.br(OpCode::Br, info.label);
                self.writer.mark_label(false_label);
                if last == WasmOp::Else {
                    self.unreachable = false;
                    if let BlockYield::Value(slot) = info.yields {
                        self.yields[slot].did_yield = false;
                    }
                    self.stack.enter_scope();
                    return Ok(Some(Scope::If {
                        info,
                        false_label,
                        in_else: true,
                    }));
                }
                if let BlockYield::Value(slot) = info.yields {
                    if self.options.yield_policy == YieldPolicy::Strict {
                        return Err(CompileError::new(
                            ErrorKind::MissingBlockYield,
                            format!(
                                "if of type {} has no else branch",
                                self.yields[slot].reg.ty
                            ),
                        ));
                    }
                    self.writer.load_zero(self.yields[slot].reg);
                }
                self.writer.mark_label(info.label);
                self.pop_block(info);
            }
            Scope::If { info, .. } => {
                self.finish_arm(info, last, false)?;
                self.writer.mark_label(info.label);
                self.pop_block(info);
            }
            Scope::Dead { opener, seen_else } => match last {
                WasmOp::End => self.nesting -= 1,
                _ if opener == WasmOp::If && !seen_else => {
                    return Ok(Some(Scope::Dead {
                        opener,
                        seen_else: true,
                    }))
                }
                _ => return Err(unexpected(last)),
            },
        }
        Ok(None)
    }

    // ══════════════════════════════════════════════════════════════════════
    // Branches
    // ══════════════════════════════════════════════════════════════════════

    fn branch_target(&self, depth: u32) -> CompileResult<BlockInfo> {
        let depth = depth as usize;
        if depth >= self.blocks.len() {
            return Err(CompileError::new(
                ErrorKind::InvalidBranchTarget,
                format!(
                    "branch depth {depth} exceeds {} enclosing label(s)",
                    self.blocks.len()
                ),
            ));
        }
        Ok(self.blocks[self.blocks.len() - 1 - depth])
    }

    fn yield_type(&self, info: BlockInfo) -> Option<ValueType> {
        match info.yields {
            BlockYield::None => None,
            BlockYield::Value(slot) => Some(self.yields[slot].reg.ty),
            BlockYield::Return(result) => result,
        }
    }

    /// Copy a value into a block's yield register.
    fn yield_value(&mut self, slot: usize, value: Reg) -> CompileResult<()> {
        let target = self.yields[slot].reg;
        if value.ty != target.ty {
            return Err(CompileError::new(
                ErrorKind::InvalidYieldType,
                format!("block yields {}, got {}", target.ty, value.ty),
            ));
        }
        self.writer.mov(target, value);
        self.yields[slot].did_yield = true;
        Ok(())
    }

    /// Deliver `value` to the place a branch to `info` expects it.
    fn yield_to(&mut self, info: BlockInfo, value: Option<Reg>) -> CompileResult<()> {
        match (info.yields, value) {
            (BlockYield::None, _) => Ok(()),
            (BlockYield::Value(slot), Some(value)) => self.yield_value(slot, value),
            (BlockYield::Return(None), _) => {
                self.writer.reg1(OpCode::LdUndef, Reg::ret(ValueType::I32));
                Ok(())
            }
            (BlockYield::Return(Some(ty)), Some(value)) => {
                if value.ty != ty {
                    return Err(CompileError::new(
                        ErrorKind::ReturnTypeMismatch,
                        format!("function returns {ty}, got {}", value.ty),
                    ));
                }
                self.writer.reg2(OpCode::ret(ty), Reg::ret(ty), value);
                Ok(())
            }
            (_, None) => Err(CompileError::new(
                ErrorKind::StackUnderflow,
                "branch needs a value but none was provided",
            )),
        }
    }

    /// Pop the value a branch to `info` carries, if it carries one.
    fn pop_branch_value(&mut self, info: BlockInfo) -> CompileResult<Option<Reg>> {
        match self.yield_type(info) {
            Some(_) => Ok(Some(self.stack.pop()?)),
            None => Ok(None),
        }
    }

    fn emit_br(&mut self) -> CompileResult<()> {
        let info = self.branch_target(self.reader.current_node().depth)?;
        let value = self.pop_branch_value(info)?;
        self.yield_to(info, value)?;
        if let Some(value) = value {
            self.registers.release(value);
        }
        self.writer.br(OpCode::Br, info.label);
        self.set_unreachable();
        Ok(())
    }

    fn emit_br_if(&mut self) -> CompileResult<()> {
        let info = self.branch_target(self.reader.current_node().depth)?;
        let cond = self.pop_typed(ValueType::I32, WasmOp::BrIf)?;
        let value = self.pop_branch_value(info)?;
        self.yield_to(info, value)?;
        self.writer.br_reg1(OpCode::BrTrue, info.label, cond);
        self.registers.release(cond);
        if let Some(value) = value {
            self.stack.push(value);
        }
        Ok(())
    }

    fn emit_br_table(&mut self) -> CompileResult<()> {
        let node = self.reader.current_node();
        let targets = node.targets.clone();
        let default = self.branch_target(node.default_target)?;

        let expected = self.yield_type(default);
        let mut infos = Vec::with_capacity(targets.len());
        for depth in targets {
            let info = self.branch_target(depth)?;
            if self.yield_type(info) != expected {
                return Err(CompileError::new(
                    ErrorKind::InvalidYieldType,
                    format!(
                        "br_table target {depth} yields {}, default yields {}",
                        regwasm_types::ty::result_name(self.yield_type(info)),
                        regwasm_types::ty::result_name(expected)
                    ),
                ));
            }
            infos.push(info);
        }

        let scrutinee = self.pop_typed(ValueType::I32, WasmOp::BrTable)?;
        let value = self.pop_branch_value(default)?;

        self.writer.reg1(OpCode::BeginSwitch, scrutinee);
        for (case, info) in infos.into_iter().enumerate() {
            self.yield_to(info, value)?;
            self.writer.br_reg1_const(OpCode::Case, info.label, scrutinee, case as i32);
        }
        self.yield_to(default, value)?;
        self.writer.br(OpCode::EndSwitch, default.label);

        if let Some(value) = value {
            self.registers.release(value);
        }
        self.registers.release(scrutinee);
        self.set_unreachable();
        Ok(())
    }

    /// Return to the caller through the function's exit label.
    fn emit_return(&mut self) -> CompileResult<()> {
        let exit = self.blocks[0];
        let value = match self.header.result {
            Some(ty) => Some(self.stack.pop().map_err(|_| {
                CompileError::new(
                    ErrorKind::ReturnTypeMismatch,
                    format!("function returns {ty} but the operand stack is empty"),
                )
            })?),
            None => None,
        };
        self.yield_to(exit, value)?;
        if let Some(value) = value {
            self.registers.release(value);
        }
        self.writer.br(OpCode::Br, exit.label);
        self.set_unreachable();
        Ok(())
    }

    // ══════════════════════════════════════════════════════════════════════
    // Shared helpers
    // ══════════════════════════════════════════════════════════════════════

    /// Drop the current scope's values; following code is dead until the
    /// scope closes.
    pub(crate) fn set_unreachable(&mut self) {
        for reg in self.stack.drain_scope() {
            self.registers.release(reg);
        }
        self.unreachable = true;
    }

    /// Pop a value that must have type `ty`.
    pub(crate) fn pop_typed(&mut self, ty: ValueType, op: WasmOp) -> CompileResult<Reg> {
        let reg = self.stack.pop()?;
        if reg.ty != ty {
            return Err(CompileError::new(
                ErrorKind::OperandTypeMismatch,
                format!("{} expects {ty}, got {}", op.name(), reg.ty),
            ));
        }
        Ok(reg)
    }
}

fn unexpected(op: WasmOp) -> CompileError {
    CompileError::new(
        ErrorKind::UnexpectedOpcode,
        format!("unexpected {} outside of a matching block", op.name()),
    )
}
