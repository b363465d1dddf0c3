//! WebAssembly operators understood by the translator.
//!
//! [`WasmOp`] is a closed enumeration of the MVP operator set plus the few
//! post-MVP operators that are recognised but not implemented. Each
//! operator carries a parallel [`OpClass`] entry describing how the
//! generator validates and lowers it: operand and result types, the target
//! opcode, or the fact that it is not implemented yet.

use crate::bytecode::{ArrayView, OpCode};
use crate::ty::ValueType;

/// How an operator is validated and lowered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpClass {
    /// Structured control flow, branches, calls, `return`, `unreachable`.
    Control,
    /// `drop`, `select`, `nop`.
    Parametric,
    /// Local and global access.
    Variable,
    /// Constant of the given type.
    Const(ValueType),
    Load { ty: ValueType, view: ArrayView },
    Store { ty: ValueType, view: ArrayView },
    /// `memory.size` / `memory.grow`.
    Memory,
    Unary { result: ValueType, input: ValueType, op: OpCode },
    Binary { result: ValueType, operand: ValueType, op: OpCode },
    /// Recognised but not yet implemented.
    Nyi,
}

const fn unary(result: ValueType, input: ValueType, op: OpCode) -> OpClass {
    OpClass::Unary { result, input, op }
}

const fn binary(result: ValueType, operand: ValueType, op: OpCode) -> OpClass {
    OpClass::Binary { result, operand, op }
}

const fn load(ty: ValueType, view: ArrayView) -> OpClass {
    OpClass::Load { ty, view }
}

const fn store(ty: ValueType, view: ArrayView) -> OpClass {
    OpClass::Store { ty, view }
}

macro_rules! wasm_ops {
    ($($variant:ident => $name:literal, $class:expr;)*) => {
        /// A decoded WebAssembly operator, without its immediates.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum WasmOp {
            $($variant,)*
        }

        impl WasmOp {
            pub const ALL: &'static [WasmOp] = &[$(WasmOp::$variant,)*];

            /// Text-format name.
            pub fn name(self) -> &'static str {
                match self {
                    $(Self::$variant => $name,)*
                }
            }

            pub fn class(self) -> OpClass {
                use ArrayView::*;
                use ValueType::*;
                match self {
                    $(Self::$variant => $class,)*
                }
            }
        }
    };
}

wasm_ops! {
    // ── Control ──
    Unreachable => "unreachable", OpClass::Control;
    Nop => "nop", OpClass::Parametric;
    Block => "block", OpClass::Control;
    Loop => "loop", OpClass::Control;
    If => "if", OpClass::Control;
    Else => "else", OpClass::Control;
    End => "end", OpClass::Control;
    Br => "br", OpClass::Control;
    BrIf => "br_if", OpClass::Control;
    BrTable => "br_table", OpClass::Control;
    Return => "return", OpClass::Control;
    Call => "call", OpClass::Control;
    CallIndirect => "call_indirect", OpClass::Control;

    // ── Parametric ──
    Drop => "drop", OpClass::Parametric;
    Select => "select", OpClass::Parametric;

    // ── Variables ──
    LocalGet => "local.get", OpClass::Variable;
    LocalSet => "local.set", OpClass::Variable;
    LocalTee => "local.tee", OpClass::Variable;
    GlobalGet => "global.get", OpClass::Variable;
    GlobalSet => "global.set", OpClass::Variable;

    // ── Memory ──
    I32Load => "i32.load", load(I32, Int32);
    I64Load => "i64.load", load(I64, Int64);
    F32Load => "f32.load", load(F32, Float32);
    F64Load => "f64.load", load(F64, Float64);
    I32Load8S => "i32.load8_s", load(I32, Int8);
    I32Load8U => "i32.load8_u", load(I32, Uint8);
    I32Load16S => "i32.load16_s", load(I32, Int16);
    I32Load16U => "i32.load16_u", load(I32, Uint16);
    I64Load8S => "i64.load8_s", load(I64, Int8);
    I64Load8U => "i64.load8_u", load(I64, Uint8);
    I64Load16S => "i64.load16_s", load(I64, Int16);
    I64Load16U => "i64.load16_u", load(I64, Uint16);
    I64Load32S => "i64.load32_s", load(I64, Int32);
    I64Load32U => "i64.load32_u", load(I64, Uint32);
    I32Store => "i32.store", store(I32, Int32);
    I64Store => "i64.store", store(I64, Int64);
    F32Store => "f32.store", store(F32, Float32);
    F64Store => "f64.store", store(F64, Float64);
    I32Store8 => "i32.store8", store(I32, Int8);
    I32Store16 => "i32.store16", store(I32, Int16);
    I64Store8 => "i64.store8", store(I64, Int8);
    I64Store16 => "i64.store16", store(I64, Int16);
    I64Store32 => "i64.store32", store(I64, Int32);
    MemorySize => "memory.size", OpClass::Memory;
    MemoryGrow => "memory.grow", OpClass::Memory;

    // ── Constants ──
    I32Const => "i32.const", OpClass::Const(I32);
    I64Const => "i64.const", OpClass::Const(I64);
    F32Const => "f32.const", OpClass::Const(F32);
    F64Const => "f64.const", OpClass::Const(F64);

    // ── i32 ──
    I32Eqz => "i32.eqz", unary(I32, I32, OpCode::EqzInt);
    I32Eq => "i32.eq", binary(I32, I32, OpCode::CmEqInt);
    I32Ne => "i32.ne", binary(I32, I32, OpCode::CmNeInt);
    I32LtS => "i32.lt_s", binary(I32, I32, OpCode::CmLtInt);
    I32LtU => "i32.lt_u", binary(I32, I32, OpCode::CmLtUInt);
    I32GtS => "i32.gt_s", binary(I32, I32, OpCode::CmGtInt);
    I32GtU => "i32.gt_u", binary(I32, I32, OpCode::CmGtUInt);
    I32LeS => "i32.le_s", binary(I32, I32, OpCode::CmLeInt);
    I32LeU => "i32.le_u", binary(I32, I32, OpCode::CmLeUInt);
    I32GeS => "i32.ge_s", binary(I32, I32, OpCode::CmGeInt);
    I32GeU => "i32.ge_u", binary(I32, I32, OpCode::CmGeUInt);
    I32Clz => "i32.clz", unary(I32, I32, OpCode::ClzInt);
    I32Ctz => "i32.ctz", unary(I32, I32, OpCode::CtzInt);
    I32Popcnt => "i32.popcnt", unary(I32, I32, OpCode::PopCntInt);
    I32Add => "i32.add", binary(I32, I32, OpCode::AddInt);
    I32Sub => "i32.sub", binary(I32, I32, OpCode::SubInt);
    I32Mul => "i32.mul", binary(I32, I32, OpCode::MulInt);
    I32DivS => "i32.div_s", binary(I32, I32, OpCode::DivInt);
    I32DivU => "i32.div_u", binary(I32, I32, OpCode::DivUInt);
    I32RemS => "i32.rem_s", binary(I32, I32, OpCode::RemInt);
    I32RemU => "i32.rem_u", binary(I32, I32, OpCode::RemUInt);
    I32And => "i32.and", binary(I32, I32, OpCode::AndInt);
    I32Or => "i32.or", binary(I32, I32, OpCode::OrInt);
    I32Xor => "i32.xor", binary(I32, I32, OpCode::XorInt);
    I32Shl => "i32.shl", binary(I32, I32, OpCode::ShlInt);
    I32ShrS => "i32.shr_s", binary(I32, I32, OpCode::ShrInt);
    I32ShrU => "i32.shr_u", binary(I32, I32, OpCode::ShrUInt);
    I32Rotl => "i32.rotl", binary(I32, I32, OpCode::RolInt);
    I32Rotr => "i32.rotr", binary(I32, I32, OpCode::RorInt);

    // ── i64 ──
    I64Eqz => "i64.eqz", unary(I32, I64, OpCode::EqzLong);
    I64Eq => "i64.eq", binary(I32, I64, OpCode::CmEqLong);
    I64Ne => "i64.ne", binary(I32, I64, OpCode::CmNeLong);
    I64LtS => "i64.lt_s", binary(I32, I64, OpCode::CmLtLong);
    I64LtU => "i64.lt_u", binary(I32, I64, OpCode::CmLtULong);
    I64GtS => "i64.gt_s", binary(I32, I64, OpCode::CmGtLong);
    I64GtU => "i64.gt_u", binary(I32, I64, OpCode::CmGtULong);
    I64LeS => "i64.le_s", binary(I32, I64, OpCode::CmLeLong);
    I64LeU => "i64.le_u", binary(I32, I64, OpCode::CmLeULong);
    I64GeS => "i64.ge_s", binary(I32, I64, OpCode::CmGeLong);
    I64GeU => "i64.ge_u", binary(I32, I64, OpCode::CmGeULong);
    I64Clz => "i64.clz", unary(I64, I64, OpCode::ClzLong);
    I64Ctz => "i64.ctz", unary(I64, I64, OpCode::CtzLong);
    I64Popcnt => "i64.popcnt", unary(I64, I64, OpCode::PopCntLong);
    I64Add => "i64.add", binary(I64, I64, OpCode::AddLong);
    I64Sub => "i64.sub", binary(I64, I64, OpCode::SubLong);
    I64Mul => "i64.mul", binary(I64, I64, OpCode::MulLong);
    I64DivS => "i64.div_s", binary(I64, I64, OpCode::DivLong);
    I64DivU => "i64.div_u", binary(I64, I64, OpCode::DivULong);
    I64RemS => "i64.rem_s", binary(I64, I64, OpCode::RemLong);
    I64RemU => "i64.rem_u", binary(I64, I64, OpCode::RemULong);
    I64And => "i64.and", binary(I64, I64, OpCode::AndLong);
    I64Or => "i64.or", binary(I64, I64, OpCode::OrLong);
    I64Xor => "i64.xor", binary(I64, I64, OpCode::XorLong);
    I64Shl => "i64.shl", binary(I64, I64, OpCode::ShlLong);
    I64ShrS => "i64.shr_s", binary(I64, I64, OpCode::ShrLong);
    I64ShrU => "i64.shr_u", binary(I64, I64, OpCode::ShrULong);
    I64Rotl => "i64.rotl", binary(I64, I64, OpCode::RolLong);
    I64Rotr => "i64.rotr", binary(I64, I64, OpCode::RorLong);

    // ── f32 ──
    F32Eq => "f32.eq", binary(I32, F32, OpCode::CmEqFlt);
    F32Ne => "f32.ne", binary(I32, F32, OpCode::CmNeFlt);
    F32Lt => "f32.lt", binary(I32, F32, OpCode::CmLtFlt);
    F32Gt => "f32.gt", binary(I32, F32, OpCode::CmGtFlt);
    F32Le => "f32.le", binary(I32, F32, OpCode::CmLeFlt);
    F32Ge => "f32.ge", binary(I32, F32, OpCode::CmGeFlt);
    F32Abs => "f32.abs", unary(F32, F32, OpCode::AbsFlt);
    F32Neg => "f32.neg", unary(F32, F32, OpCode::NegFlt);
    F32Ceil => "f32.ceil", unary(F32, F32, OpCode::CeilFlt);
    F32Floor => "f32.floor", unary(F32, F32, OpCode::FloorFlt);
    F32Trunc => "f32.trunc", unary(F32, F32, OpCode::TruncFlt);
    F32Nearest => "f32.nearest", unary(F32, F32, OpCode::NearestFlt);
    F32Sqrt => "f32.sqrt", unary(F32, F32, OpCode::SqrtFlt);
    F32Add => "f32.add", binary(F32, F32, OpCode::AddFlt);
    F32Sub => "f32.sub", binary(F32, F32, OpCode::SubFlt);
    F32Mul => "f32.mul", binary(F32, F32, OpCode::MulFlt);
    F32Div => "f32.div", binary(F32, F32, OpCode::DivFlt);
    F32Min => "f32.min", binary(F32, F32, OpCode::MinFlt);
    F32Max => "f32.max", binary(F32, F32, OpCode::MaxFlt);
    F32Copysign => "f32.copysign", binary(F32, F32, OpCode::CopySignFlt);

    // ── f64 ──
    F64Eq => "f64.eq", binary(I32, F64, OpCode::CmEqDb);
    F64Ne => "f64.ne", binary(I32, F64, OpCode::CmNeDb);
    F64Lt => "f64.lt", binary(I32, F64, OpCode::CmLtDb);
    F64Gt => "f64.gt", binary(I32, F64, OpCode::CmGtDb);
    F64Le => "f64.le", binary(I32, F64, OpCode::CmLeDb);
    F64Ge => "f64.ge", binary(I32, F64, OpCode::CmGeDb);
    F64Abs => "f64.abs", unary(F64, F64, OpCode::AbsDb);
    F64Neg => "f64.neg", unary(F64, F64, OpCode::NegDb);
    F64Ceil => "f64.ceil", unary(F64, F64, OpCode::CeilDb);
    F64Floor => "f64.floor", unary(F64, F64, OpCode::FloorDb);
    F64Trunc => "f64.trunc", unary(F64, F64, OpCode::TruncDb);
    F64Nearest => "f64.nearest", unary(F64, F64, OpCode::NearestDb);
    F64Sqrt => "f64.sqrt", unary(F64, F64, OpCode::SqrtDb);
    F64Add => "f64.add", binary(F64, F64, OpCode::AddDb);
    F64Sub => "f64.sub", binary(F64, F64, OpCode::SubDb);
    F64Mul => "f64.mul", binary(F64, F64, OpCode::MulDb);
    F64Div => "f64.div", binary(F64, F64, OpCode::DivDb);
    F64Min => "f64.min", binary(F64, F64, OpCode::MinDb);
    F64Max => "f64.max", binary(F64, F64, OpCode::MaxDb);
    F64Copysign => "f64.copysign", binary(F64, F64, OpCode::CopySignDb);

    // ── Conversions ──
    I32WrapI64 => "i32.wrap_i64", unary(I32, I64, OpCode::WrapLong);
    I32TruncF32S => "i32.trunc_f32_s", unary(I32, F32, OpCode::TruncFltToInt);
    I32TruncF32U => "i32.trunc_f32_u", unary(I32, F32, OpCode::TruncFltToUInt);
    I32TruncF64S => "i32.trunc_f64_s", unary(I32, F64, OpCode::TruncDbToInt);
    I32TruncF64U => "i32.trunc_f64_u", unary(I32, F64, OpCode::TruncDbToUInt);
    I64ExtendI32S => "i64.extend_i32_s", unary(I64, I32, OpCode::ExtendIntToLong);
    I64ExtendI32U => "i64.extend_i32_u", unary(I64, I32, OpCode::ExtendUIntToLong);
    I64TruncF32S => "i64.trunc_f32_s", unary(I64, F32, OpCode::TruncFltToLong);
    I64TruncF32U => "i64.trunc_f32_u", unary(I64, F32, OpCode::TruncFltToULong);
    I64TruncF64S => "i64.trunc_f64_s", unary(I64, F64, OpCode::TruncDbToLong);
    I64TruncF64U => "i64.trunc_f64_u", unary(I64, F64, OpCode::TruncDbToULong);
    F32ConvertI32S => "f32.convert_i32_s", unary(F32, I32, OpCode::ConvIntToFlt);
    F32ConvertI32U => "f32.convert_i32_u", unary(F32, I32, OpCode::ConvUIntToFlt);
    F32ConvertI64S => "f32.convert_i64_s", unary(F32, I64, OpCode::ConvLongToFlt);
    F32ConvertI64U => "f32.convert_i64_u", unary(F32, I64, OpCode::ConvULongToFlt);
    F32DemoteF64 => "f32.demote_f64", unary(F32, F64, OpCode::DemoteDb);
    F64ConvertI32S => "f64.convert_i32_s", unary(F64, I32, OpCode::ConvIntToDb);
    F64ConvertI32U => "f64.convert_i32_u", unary(F64, I32, OpCode::ConvUIntToDb);
    F64ConvertI64S => "f64.convert_i64_s", unary(F64, I64, OpCode::ConvLongToDb);
    F64ConvertI64U => "f64.convert_i64_u", unary(F64, I64, OpCode::ConvULongToDb);
    F64PromoteF32 => "f64.promote_f32", unary(F64, F32, OpCode::PromoteFlt);
    I32ReinterpretF32 => "i32.reinterpret_f32", unary(I32, F32, OpCode::ReinterpretFltToInt);
    I64ReinterpretF64 => "i64.reinterpret_f64", unary(I64, F64, OpCode::ReinterpretDbToLong);
    F32ReinterpretI32 => "f32.reinterpret_i32", unary(F32, I32, OpCode::ReinterpretIntToFlt);
    F64ReinterpretI64 => "f64.reinterpret_i64", unary(F64, I64, OpCode::ReinterpretLongToDb);

    // ── Not yet implemented ──
    I32Extend8S => "i32.extend8_s", OpClass::Nyi;
    I32Extend16S => "i32.extend16_s", OpClass::Nyi;
    I64Extend8S => "i64.extend8_s", OpClass::Nyi;
    I64Extend16S => "i64.extend16_s", OpClass::Nyi;
    I64Extend32S => "i64.extend32_s", OpClass::Nyi;
    I32TruncSatF32S => "i32.trunc_sat_f32_s", OpClass::Nyi;
    I32TruncSatF32U => "i32.trunc_sat_f32_u", OpClass::Nyi;
    I32TruncSatF64S => "i32.trunc_sat_f64_s", OpClass::Nyi;
    I32TruncSatF64U => "i32.trunc_sat_f64_u", OpClass::Nyi;
    I64TruncSatF32S => "i64.trunc_sat_f32_s", OpClass::Nyi;
    I64TruncSatF32U => "i64.trunc_sat_f32_u", OpClass::Nyi;
    I64TruncSatF64S => "i64.trunc_sat_f64_s", OpClass::Nyi;
    I64TruncSatF64U => "i64.trunc_sat_f64_u", OpClass::Nyi;
    MemoryCopy => "memory.copy", OpClass::Nyi;
    MemoryFill => "memory.fill", OpClass::Nyi;
}

impl WasmOp {
    /// Whether the operator is recognised but not implemented.
    pub fn is_nyi(self) -> bool {
        matches!(self.class(), OpClass::Nyi)
    }

    /// Operators that open a nested scope.
    pub fn opens_scope(self) -> bool {
        matches!(self, Self::Block | Self::Loop | Self::If)
    }
}
