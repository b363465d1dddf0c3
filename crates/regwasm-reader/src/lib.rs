//! regwasm module reader.
//!
//! Wraps `wasmparser` behind the contract the bytecode generator consumes:
//!
//! - [`ModuleReader`] walks sections one logical section code at a time,
//!   enforcing the section ordering rules, and fills the owned [`Module`]
//!   data model.
//! - [`FunctionBodyReader`] decodes one operator at a time from a function
//!   body and exposes its immediates through [`CurrentNode`]. The generator
//!   only sees it through the [`ExprReader`] trait.

pub mod body;
pub mod module;
pub mod reader;
pub mod section;

pub use body::{BlockSig, CallKind, CurrentNode, ExprReader, FunctionBodyReader, MemArg};
pub use module::{
    BodyLocation, DataSegment, ElementSegment, EnvironmentLayout, Export, ExportKind,
    FunctionInfo, GlobalDesc, Import, ImportKind, InitExpr, LimitsDesc, Module,
};
pub use reader::{ModuleReader, ParsedModule};
pub use section::SectionCode;

use regwasm_types::{CompileError, CompileResult, ErrorKind, ValueType};

/// Convert a decoder error into a compile error at the decoder's offset.
pub(crate) fn malformed(err: wasmparser::BinaryReaderError) -> CompileError {
    CompileError::new(ErrorKind::MalformedBinary, err.message().to_string()).at(err.offset())
}

/// Map a decoder value type onto one of the four supported types.
pub(crate) fn value_type(ty: wasmparser::ValType) -> CompileResult<ValueType> {
    match ty {
        wasmparser::ValType::I32 => Ok(ValueType::I32),
        wasmparser::ValType::I64 => Ok(ValueType::I64),
        wasmparser::ValType::F32 => Ok(ValueType::F32),
        wasmparser::ValType::F64 => Ok(ValueType::F64),
        other => Err(CompileError::new(
            ErrorKind::UnsupportedType,
            format!("value type {other:?} is not supported"),
        )),
    }
}
