//! Function body cursor.
//!
//! Decodes one operator per [`ExprReader::read_expr`] call and stores its
//! immediates in a [`CurrentNode`] that stays valid until the next call.

use tracing::trace;
use wasmparser::{BlockType, FunctionBody, Operator, OperatorsReader};

use regwasm_types::{CompileError, CompileResult, ErrorKind, Literal, ValueType, WasmOp};

use crate::module::BodyLocation;
use crate::{malformed, value_type};

/// Static signature of a block, loop or if.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockSig {
    Empty,
    Value(ValueType),
    /// Type-section index; resolved by the generator.
    Func(u32),
}

/// Index space a direct call target lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallKind {
    Import,
    Function,
}

/// Memory immediate.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MemArg {
    pub offset: u64,
    pub align: u8,
    pub memory: u32,
}

/// Immediates of the most recently decoded operator.
///
/// Only the fields relevant to that operator are meaningful.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurrentNode {
    pub block: BlockSig,
    /// Relative depth of `br` / `br_if`.
    pub depth: u32,
    /// `br_table` targets, excluding the default.
    pub targets: Vec<u32>,
    pub default_target: u32,
    pub literal: Literal,
    pub mem: MemArg,
    /// Local or global index, call target, or `call_indirect` type index.
    pub index: u32,
    pub table: u32,
    pub call_kind: CallKind,
}

impl Default for CurrentNode {
    fn default() -> Self {
        Self {
            block: BlockSig::Empty,
            depth: 0,
            targets: Vec::new(),
            default_target: 0,
            literal: Literal::I32(0),
            mem: MemArg::default(),
            index: 0,
            table: 0,
            call_kind: CallKind::Function,
        }
    }
}

/// Pull interface over a function body's operator stream.
pub trait ExprReader {
    /// Decode the next operator. Running out of bytes is an error.
    fn read_expr(&mut self) -> CompileResult<WasmOp>;

    fn current_node(&self) -> &CurrentNode;

    /// Absolute byte offset of the last decoded operator.
    fn current_offset(&self) -> usize;

    /// True once every byte of the body has been consumed.
    fn is_current_function_completed(&self) -> bool;

    fn body_location(&self) -> BodyLocation;
}

/// [`ExprReader`] over a `wasmparser` function body.
pub struct FunctionBodyReader<'a> {
    ops: OperatorsReader<'a>,
    node: CurrentNode,
    location: BodyLocation,
    offset: usize,
    import_function_count: u32,
}

impl<'a> FunctionBodyReader<'a> {
    /// Position a reader on the first operator of `body`.
    pub fn new(body: &FunctionBody<'a>, import_function_count: u32) -> CompileResult<Self> {
        let range = body.range();
        let ops = body.get_operators_reader().map_err(malformed)?;
        Ok(Self {
            offset: ops.original_position(),
            ops,
            node: CurrentNode::default(),
            location: BodyLocation {
                offset: range.start,
                size: range.end - range.start,
            },
            import_function_count,
        })
    }

    fn set_memarg(&mut self, memarg: wasmparser::MemArg) {
        self.node.mem = MemArg {
            offset: memarg.offset,
            align: memarg.align,
            memory: memarg.memory,
        };
    }

    fn set_block(&mut self, blockty: BlockType) -> CompileResult<()> {
        self.node.block = match blockty {
            BlockType::Empty => BlockSig::Empty,
            BlockType::Type(ty) => BlockSig::Value(value_type(ty)?),
            BlockType::FuncType(index) => BlockSig::Func(index),
        };
        Ok(())
    }

    fn decode(&mut self, op: Operator<'a>) -> CompileResult<WasmOp> {
        macro_rules! decode_ops {
            (plain: [$($plain:ident),* $(,)?]; memory: [$($mem:ident),* $(,)?]; $($rest:tt)*) => {
                match op {
                    $(Operator::$plain => WasmOp::$plain,)*
                    $(Operator::$mem { memarg } => {
                        self.set_memarg(memarg);
                        WasmOp::$mem
                    })*
                    $($rest)*
                }
            };
        }

        let op = decode_ops! {
            plain: [
                Unreachable, Nop, Else, End, Return, Drop, Select,
                I32Eqz, I32Eq, I32Ne, I32LtS, I32LtU, I32GtS, I32GtU, I32LeS, I32LeU,
                I32GeS, I32GeU, I32Clz, I32Ctz, I32Popcnt, I32Add, I32Sub, I32Mul,
                I32DivS, I32DivU, I32RemS, I32RemU, I32And, I32Or, I32Xor, I32Shl,
                I32ShrS, I32ShrU, I32Rotl, I32Rotr,
                I64Eqz, I64Eq, I64Ne, I64LtS, I64LtU, I64GtS, I64GtU, I64LeS, I64LeU,
                I64GeS, I64GeU, I64Clz, I64Ctz, I64Popcnt, I64Add, I64Sub, I64Mul,
                I64DivS, I64DivU, I64RemS, I64RemU, I64And, I64Or, I64Xor, I64Shl,
                I64ShrS, I64ShrU, I64Rotl, I64Rotr,
                F32Eq, F32Ne, F32Lt, F32Gt, F32Le, F32Ge, F32Abs, F32Neg, F32Ceil,
                F32Floor, F32Trunc, F32Nearest, F32Sqrt, F32Add, F32Sub, F32Mul, F32Div,
                F32Min, F32Max, F32Copysign,
                F64Eq, F64Ne, F64Lt, F64Gt, F64Le, F64Ge, F64Abs, F64Neg, F64Ceil,
                F64Floor, F64Trunc, F64Nearest, F64Sqrt, F64Add, F64Sub, F64Mul, F64Div,
                F64Min, F64Max, F64Copysign,
                I32WrapI64, I32TruncF32S, I32TruncF32U, I32TruncF64S, I32TruncF64U,
                I64ExtendI32S, I64ExtendI32U, I64TruncF32S, I64TruncF32U, I64TruncF64S,
                I64TruncF64U, F32ConvertI32S, F32ConvertI32U, F32ConvertI64S,
                F32ConvertI64U, F32DemoteF64, F64ConvertI32S, F64ConvertI32U,
                F64ConvertI64S, F64ConvertI64U, F64PromoteF32, I32ReinterpretF32,
                I64ReinterpretF64, F32ReinterpretI32, F64ReinterpretI64,
                I32Extend8S, I32Extend16S, I64Extend8S, I64Extend16S, I64Extend32S,
                I32TruncSatF32S, I32TruncSatF32U, I32TruncSatF64S, I32TruncSatF64U,
                I64TruncSatF32S, I64TruncSatF32U, I64TruncSatF64S, I64TruncSatF64U,
            ];
            memory: [
                I32Load, I64Load, F32Load, F64Load, I32Load8S, I32Load8U, I32Load16S,
                I32Load16U, I64Load8S, I64Load8U, I64Load16S, I64Load16U, I64Load32S,
                I64Load32U, I32Store, I64Store, F32Store, F64Store, I32Store8,
                I32Store16, I64Store8, I64Store16, I64Store32,
            ];

            Operator::Block { blockty } => {
                self.set_block(blockty)?;
                WasmOp::Block
            }
            Operator::Loop { blockty } => {
                self.set_block(blockty)?;
                WasmOp::Loop
            }
            Operator::If { blockty } => {
                self.set_block(blockty)?;
                WasmOp::If
            }
            Operator::Br { relative_depth } => {
                self.node.depth = relative_depth;
                WasmOp::Br
            }
            Operator::BrIf { relative_depth } => {
                self.node.depth = relative_depth;
                WasmOp::BrIf
            }
            Operator::BrTable { targets } => {
                self.node.default_target = targets.default();
                self.node.targets = targets
                    .targets()
                    .collect::<Result<Vec<u32>, _>>()
                    .map_err(malformed)?;
                WasmOp::BrTable
            }
            Operator::Call { function_index } => {
                self.node.index = function_index;
                self.node.call_kind = if function_index < self.import_function_count {
                    CallKind::Import
                } else {
                    CallKind::Function
                };
                WasmOp::Call
            }
            Operator::CallIndirect { type_index, table_index } => {
                self.node.index = type_index;
                self.node.table = table_index;
                self.node.call_kind = CallKind::Function;
                WasmOp::CallIndirect
            }
            Operator::TypedSelect { ty } => {
                value_type(ty)?;
                WasmOp::Select
            }
            Operator::LocalGet { local_index } => {
                self.node.index = local_index;
                WasmOp::LocalGet
            }
            Operator::LocalSet { local_index } => {
                self.node.index = local_index;
                WasmOp::LocalSet
            }
            Operator::LocalTee { local_index } => {
                self.node.index = local_index;
                WasmOp::LocalTee
            }
            Operator::GlobalGet { global_index } => {
                self.node.index = global_index;
                WasmOp::GlobalGet
            }
            Operator::GlobalSet { global_index } => {
                self.node.index = global_index;
                WasmOp::GlobalSet
            }
            Operator::MemorySize { mem } => {
                self.node.mem = MemArg { memory: mem, ..MemArg::default() };
                WasmOp::MemorySize
            }
            Operator::MemoryGrow { mem } => {
                self.node.mem = MemArg { memory: mem, ..MemArg::default() };
                WasmOp::MemoryGrow
            }
            Operator::MemoryCopy { .. } => WasmOp::MemoryCopy,
            Operator::MemoryFill { .. } => WasmOp::MemoryFill,
            Operator::I32Const { value } => {
                self.node.literal = Literal::I32(value);
                WasmOp::I32Const
            }
            Operator::I64Const { value } => {
                self.node.literal = Literal::I64(value);
                WasmOp::I64Const
            }
            Operator::F32Const { value } => {
                self.node.literal = Literal::F32(value.bits());
                WasmOp::F32Const
            }
            Operator::F64Const { value } => {
                self.node.literal = Literal::F64(value.bits());
                WasmOp::F64Const
            }
            other => {
                return Err(CompileError::new(
                    ErrorKind::UnsupportedOperator,
                    format!("operator {} is not supported", operator_name(&other)),
                )
                .at(self.offset));
            }
        };
        Ok(op)
    }
}

/// Variant name of a decoder operator, without its immediates.
fn operator_name(op: &Operator<'_>) -> String {
    let debug = format!("{op:?}");
    debug
        .split(|c: char| c == ' ' || c == '{' || c == '(')
        .next()
        .unwrap_or_default()
        .to_string()
}

impl ExprReader for FunctionBodyReader<'_> {
    fn read_expr(&mut self) -> CompileResult<WasmOp> {
        self.offset = self.ops.original_position();
        if self.ops.eof() {
            return Err(CompileError::new(
                ErrorKind::TruncatedOrOverlongFunctionBody,
                "unexpected end of function body",
            )
            .at(self.offset));
        }
        let op = self.ops.read().map_err(malformed)?;
        let op = self.decode(op)?;
        trace!(offset = self.offset, op = op.name(), "decoded operator");
        Ok(op)
    }

    fn current_node(&self) -> &CurrentNode {
        &self.node
    }

    fn current_offset(&self) -> usize {
        self.offset
    }

    fn is_current_function_completed(&self) -> bool {
        self.ops.eof()
    }

    fn body_location(&self) -> BodyLocation {
        self.location
    }
}
