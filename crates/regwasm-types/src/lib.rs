//! Shared types for the regwasm translator.
//!
//! Everything that more than one stage of the pipeline needs to agree on
//! lives here: the four primitive value types and function signatures, the
//! closed enumeration of WebAssembly operators with their validation
//! metadata, the target register bytecode, compile options, and the single
//! compilation error type.

pub mod bytecode;
pub mod error;
pub mod opcode;
pub mod options;
pub mod ty;

pub use bytecode::{ArrayView, ByteCode, Instruction, Label, Literal, LoopRange, OpCode, Reg};
pub use error::{CompileError, CompileResult, ErrorCategory, ErrorKind};
pub use opcode::{OpClass, WasmOp};
pub use options::{CompileOptions, PointerWidth, YieldPolicy};
pub use ty::{Signature, ValueType};
