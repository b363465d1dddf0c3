//! Target register bytecode.
//!
//! Instructions are grouped by operand layout (zero to three registers,
//! with or without an immediate) and the opcode selects the operation.
//! Registers are typed: each [`Reg`] names a register in one of the four
//! per-type register spaces. Register 0 of every space is the return /
//! call-result register.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::ty::{result_name, ValueType};

// ══════════════════════════════════════════════════════════════════════════════
// Opcodes
// ══════════════════════════════════════════════════════════════════════════════

macro_rules! opcodes {
    ($($(#[$doc:meta])* $variant:ident,)*) => {
        /// Target bytecode operation.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum OpCode {
            $($(#[$doc])* $variant,)*
        }

        impl OpCode {
            pub fn name(self) -> &'static str {
                match self {
                    $(Self::$variant => stringify!($variant),)*
                }
            }
        }
    };
}

opcodes! {
    // ── Control ──
    Ret,
    Unreachable,
    Br,
    BrTrue,
    BrFalse,
    BeginSwitch,
    Case,
    EndSwitch,
    LoopStart,
    LdUndef,

    // ── Moves and constants ──
    LdInt,
    LdLong,
    LdFlt,
    LdDb,
    LdIntConst,
    LdLongConst,
    LdFltConst,
    LdDbConst,
    ReturnInt,
    ReturnLong,
    ReturnFlt,
    ReturnDb,

    // ── Globals ──
    LdSlotInt,
    LdSlotLong,
    LdSlotFlt,
    LdSlotDb,
    StSlotInt,
    StSlotLong,
    StSlotFlt,
    StSlotDb,

    // ── Calls ──
    /// Begin a call into imported (host) code.
    StartCall,
    /// Begin an internal call.
    IStartCall,
    ArgOutInt,
    ArgOutLong,
    ArgOutFlt,
    ArgOutDb,
    IArgOutInt,
    IArgOutLong,
    IArgOutFlt,
    IArgOutDb,
    LdFuncSlot,
    LdTableFunc,
    CheckSignature,
    Call,
    ICall,
    ConvVTI,
    ConvVTL,
    ConvVTF,
    ConvVTD,
    IConvVTI,
    IConvVTL,
    IConvVTF,
    IConvVTD,

    // ── Linear memory ──
    LdArr,
    StArr,
    CurrentMemory,
    GrowMemory,

    // ── i32 ──
    AddInt,
    SubInt,
    MulInt,
    DivInt,
    DivUInt,
    RemInt,
    RemUInt,
    AndInt,
    OrInt,
    XorInt,
    ShlInt,
    ShrInt,
    ShrUInt,
    RolInt,
    RorInt,
    ClzInt,
    CtzInt,
    PopCntInt,
    EqzInt,
    CmEqInt,
    CmNeInt,
    CmLtInt,
    CmLtUInt,
    CmGtInt,
    CmGtUInt,
    CmLeInt,
    CmLeUInt,
    CmGeInt,
    CmGeUInt,

    // ── i64 ──
    AddLong,
    SubLong,
    MulLong,
    DivLong,
    DivULong,
    RemLong,
    RemULong,
    AndLong,
    OrLong,
    XorLong,
    ShlLong,
    ShrLong,
    ShrULong,
    RolLong,
    RorLong,
    ClzLong,
    CtzLong,
    PopCntLong,
    EqzLong,
    CmEqLong,
    CmNeLong,
    CmLtLong,
    CmLtULong,
    CmGtLong,
    CmGtULong,
    CmLeLong,
    CmLeULong,
    CmGeLong,
    CmGeULong,

    // ── f32 ──
    AddFlt,
    SubFlt,
    MulFlt,
    DivFlt,
    MinFlt,
    MaxFlt,
    CopySignFlt,
    AbsFlt,
    NegFlt,
    CeilFlt,
    FloorFlt,
    TruncFlt,
    NearestFlt,
    SqrtFlt,
    CmEqFlt,
    CmNeFlt,
    CmLtFlt,
    CmGtFlt,
    CmLeFlt,
    CmGeFlt,

    // ── f64 ──
    AddDb,
    SubDb,
    MulDb,
    DivDb,
    MinDb,
    MaxDb,
    CopySignDb,
    AbsDb,
    NegDb,
    CeilDb,
    FloorDb,
    TruncDb,
    NearestDb,
    SqrtDb,
    CmEqDb,
    CmNeDb,
    CmLtDb,
    CmGtDb,
    CmLeDb,
    CmGeDb,

    // ── Conversions ──
    WrapLong,
    TruncFltToInt,
    TruncFltToUInt,
    TruncDbToInt,
    TruncDbToUInt,
    ExtendIntToLong,
    ExtendUIntToLong,
    TruncFltToLong,
    TruncFltToULong,
    TruncDbToLong,
    TruncDbToULong,
    ConvIntToFlt,
    ConvUIntToFlt,
    ConvLongToFlt,
    ConvULongToFlt,
    DemoteDb,
    ConvIntToDb,
    ConvUIntToDb,
    ConvLongToDb,
    ConvULongToDb,
    PromoteFlt,
    ReinterpretFltToInt,
    ReinterpretDbToLong,
    ReinterpretIntToFlt,
    ReinterpretLongToDb,
}

impl OpCode {
    /// Register-to-register move for a value type.
    pub fn load(ty: ValueType) -> Self {
        match ty {
            ValueType::I32 => Self::LdInt,
            ValueType::I64 => Self::LdLong,
            ValueType::F32 => Self::LdFlt,
            ValueType::F64 => Self::LdDb,
        }
    }

    /// Constant load for a value type.
    pub fn load_const(ty: ValueType) -> Self {
        match ty {
            ValueType::I32 => Self::LdIntConst,
            ValueType::I64 => Self::LdLongConst,
            ValueType::F32 => Self::LdFltConst,
            ValueType::F64 => Self::LdDbConst,
        }
    }

    /// Move into the return register.
    pub fn ret(ty: ValueType) -> Self {
        match ty {
            ValueType::I32 => Self::ReturnInt,
            ValueType::I64 => Self::ReturnLong,
            ValueType::F32 => Self::ReturnFlt,
            ValueType::F64 => Self::ReturnDb,
        }
    }

    pub fn load_slot(ty: ValueType) -> Self {
        match ty {
            ValueType::I32 => Self::LdSlotInt,
            ValueType::I64 => Self::LdSlotLong,
            ValueType::F32 => Self::LdSlotFlt,
            ValueType::F64 => Self::LdSlotDb,
        }
    }

    pub fn store_slot(ty: ValueType) -> Self {
        match ty {
            ValueType::I32 => Self::StSlotInt,
            ValueType::I64 => Self::StSlotLong,
            ValueType::F32 => Self::StSlotFlt,
            ValueType::F64 => Self::StSlotDb,
        }
    }

    /// Argument store; `host` selects the boxed calling convention.
    pub fn arg_out(ty: ValueType, host: bool) -> Self {
        match (ty, host) {
            (ValueType::I32, true) => Self::ArgOutInt,
            (ValueType::I64, true) => Self::ArgOutLong,
            (ValueType::F32, true) => Self::ArgOutFlt,
            (ValueType::F64, true) => Self::ArgOutDb,
            (ValueType::I32, false) => Self::IArgOutInt,
            (ValueType::I64, false) => Self::IArgOutLong,
            (ValueType::F32, false) => Self::IArgOutFlt,
            (ValueType::F64, false) => Self::IArgOutDb,
        }
    }

    /// Call-result conversion; `host` selects the boxed calling convention.
    pub fn convert_result(ty: ValueType, host: bool) -> Self {
        match (ty, host) {
            (ValueType::I32, true) => Self::ConvVTI,
            (ValueType::I64, true) => Self::ConvVTL,
            (ValueType::F32, true) => Self::ConvVTF,
            (ValueType::F64, true) => Self::ConvVTD,
            (ValueType::I32, false) => Self::IConvVTI,
            (ValueType::I64, false) => Self::IConvVTL,
            (ValueType::F32, false) => Self::IConvVTF,
            (ValueType::F64, false) => Self::IConvVTD,
        }
    }
}

impl fmt::Display for OpCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.name())
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Operands
// ══════════════════════════════════════════════════════════════════════════════

/// A typed virtual register.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Reg {
    pub ty: ValueType,
    pub index: u32,
}

impl Reg {
    pub fn new(ty: ValueType, index: u32) -> Self {
        Self { ty, index }
    }

    /// The return / call-result register of a space.
    pub fn ret(ty: ValueType) -> Self {
        Self { ty, index: 0 }
    }
}

impl fmt::Display for Reg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.ty.prefix(), self.index)
    }
}

/// Branch target handle, resolved to an instruction index when the
/// function's stream is closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Label(pub u32);

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "L{}", self.0)
    }
}

/// Constant literal. Floats are stored as raw bits so NaN payloads survive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Literal {
    I32(i32),
    I64(i64),
    F32(u32),
    F64(u64),
}

impl Literal {
    pub fn ty(self) -> ValueType {
        match self {
            Self::I32(_) => ValueType::I32,
            Self::I64(_) => ValueType::I64,
            Self::F32(_) => ValueType::F32,
            Self::F64(_) => ValueType::F64,
        }
    }

    pub fn zero(ty: ValueType) -> Self {
        match ty {
            ValueType::I32 => Self::I32(0),
            ValueType::I64 => Self::I64(0),
            ValueType::F32 => Self::F32(0),
            ValueType::F64 => Self::F64(0),
        }
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::I32(v) => write!(f, "{v}"),
            Self::I64(v) => write!(f, "{v}L"),
            Self::F32(bits) => write!(f, "{:?}f", f32::from_bits(*bits)),
            Self::F64(bits) => write!(f, "{:?}", f64::from_bits(*bits)),
        }
    }
}

/// Element view used by linear-memory loads and stores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ArrayView {
    Int8,
    Uint8,
    Int16,
    Uint16,
    Int32,
    Uint32,
    Int64,
    Float32,
    Float64,
}

impl ArrayView {
    /// Access width in bytes.
    pub fn size(self) -> usize {
        match self {
            Self::Int8 | Self::Uint8 => 1,
            Self::Int16 | Self::Uint16 => 2,
            Self::Int32 | Self::Uint32 | Self::Float32 => 4,
            Self::Int64 | Self::Float64 => 8,
        }
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Instructions
// ══════════════════════════════════════════════════════════════════════════════

/// One emitted instruction, grouped by operand layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "layout", rename_all = "snake_case")]
pub enum Instruction {
    Empty { op: OpCode },
    Reg1 { op: OpCode, r0: Reg },
    Reg2 { op: OpCode, r0: Reg, r1: Reg },
    Reg3 { op: OpCode, r0: Reg, r1: Reg, r2: Reg },
    Reg1Const { op: OpCode, r0: Reg, value: Literal },
    Br { op: OpCode, label: Label },
    BrReg1 { op: OpCode, label: Label, r1: Reg },
    BrReg1Const { op: OpCode, label: Label, r1: Reg, value: i32 },
    /// Global access through a module environment slot.
    Slot { op: OpCode, value: Reg, slot: u32 },
    /// Load a function object from the environment into the callee register.
    FuncSlot { op: OpCode, slot: u32 },
    /// Load a table entry into the callee register.
    TableFunc { op: OpCode, slot: u32, index: Reg },
    /// Guard the callee register against a signature id.
    Signature { op: OpCode, signature: u32 },
    TypedArr { op: OpCode, value: Reg, address: Reg, view: ArrayView },
    StartCall { op: OpCode, arg_size: u16 },
    ArgOut { op: OpCode, slot: u32, value: Reg },
    Call { op: OpCode, arg_slots: u16, result: Option<ValueType> },
    LoopStart { op: OpCode, loop_id: u32 },
}

impl Instruction {
    pub fn op(&self) -> OpCode {
        match *self {
            Self::Empty { op }
            | Self::Reg1 { op, .. }
            | Self::Reg2 { op, .. }
            | Self::Reg3 { op, .. }
            | Self::Reg1Const { op, .. }
            | Self::Br { op, .. }
            | Self::BrReg1 { op, .. }
            | Self::BrReg1Const { op, .. }
            | Self::Slot { op, .. }
            | Self::FuncSlot { op, .. }
            | Self::TableFunc { op, .. }
            | Self::Signature { op, .. }
            | Self::TypedArr { op, .. }
            | Self::StartCall { op, .. }
            | Self::ArgOut { op, .. }
            | Self::Call { op, .. }
            | Self::LoopStart { op, .. } => op,
        }
    }

    /// Branch target, if this instruction can transfer control.
    pub fn label(&self) -> Option<Label> {
        match *self {
            Self::Br { label, .. } | Self::BrReg1 { label, .. } | Self::BrReg1Const { label, .. } => {
                Some(label)
            }
            _ => None,
        }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty { op } => write!(f, "{op}"),
            Self::Reg1 { op, r0 } => write!(f, "{op:<16} {r0}"),
            Self::Reg2 { op, r0, r1 } => write!(f, "{op:<16} {r0}, {r1}"),
            Self::Reg3 { op, r0, r1, r2 } => write!(f, "{op:<16} {r0}, {r1}, {r2}"),
            Self::Reg1Const { op, r0, value } => write!(f, "{op:<16} {r0}, {value}"),
            Self::Br { op, label } => write!(f, "{op:<16} {label}"),
            Self::BrReg1 { op, label, r1 } => write!(f, "{op:<16} {label}, {r1}"),
            Self::BrReg1Const { op, label, r1, value } => {
                write!(f, "{op:<16} {label}, {r1} == {value}")
            }
            Self::Slot { op, value, slot } => write!(f, "{op:<16} {value}, env[{slot}]"),
            Self::FuncSlot { op, slot } => write!(f, "{op:<16} env[{slot}]"),
            Self::TableFunc { op, slot, index } => write!(f, "{op:<16} env[{slot}][{index}]"),
            Self::Signature { op, signature } => write!(f, "{op:<16} sig {signature}"),
            Self::TypedArr { op, value, address, view } => {
                write!(f, "{op:<16} {value}, [{address}] {view:?}")
            }
            Self::StartCall { op, arg_size } => write!(f, "{op:<16} {arg_size} bytes"),
            Self::ArgOut { op, slot, value } => write!(f, "{op:<16} out[{slot}], {value}"),
            Self::Call { op, arg_slots, result } => {
                write!(f, "{op:<16} {arg_slots} slots -> {}", result_name(*result))
            }
            Self::LoopStart { op, loop_id } => write!(f, "{op:<16} #{loop_id}"),
        }
    }
}

/// Instruction range covered by one loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoopRange {
    pub head: u32,
    pub end: u32,
}

/// A finished function body.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ByteCode {
    pub instructions: Vec<Instruction>,
    /// Instruction index of every label, indexed by [`Label`].
    pub labels: Vec<u32>,
    pub loops: Vec<LoopRange>,
}

impl ByteCode {
    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    /// Instruction index a label resolves to.
    pub fn target(&self, label: Label) -> Option<usize> {
        self.labels.get(label.0 as usize).map(|&t| t as usize)
    }

    /// Opcodes in emission order.
    pub fn ops(&self) -> Vec<OpCode> {
        self.instructions.iter().map(Instruction::op).collect()
    }
}

impl fmt::Display for ByteCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (pc, instr) in self.instructions.iter().enumerate() {
            for (label, target) in self.labels.iter().enumerate() {
                if *target as usize == pc {
                    writeln!(f, "  L{label}:")?;
                }
            }
            writeln!(f, "    {pc:>4}  {instr}")?;
        }
        for (label, target) in self.labels.iter().enumerate() {
            if *target as usize == self.instructions.len() {
                writeln!(f, "  L{label}:")?;
            }
        }
        Ok(())
    }
}
