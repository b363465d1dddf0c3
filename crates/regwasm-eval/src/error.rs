//! Runtime error types for the regwasm interpreter.

use std::fmt;

use regwasm_types::CompileError;

/// Evaluation error: traps, linking failures and bad invocations.
#[derive(Debug, Clone, PartialEq)]
pub enum EvalError {
    /// `unreachable` was executed
    Unreachable,
    /// Integer division or remainder by zero
    DivisionByZero,
    /// `INT_MIN / -1` or a float-to-int conversion out of range
    IntegerOverflow,
    /// Float-to-int conversion of a NaN
    InvalidConversion,
    /// Load, store or segment initialisation outside linear memory
    MemoryOutOfBounds(String),
    /// Indirect call through an empty or missing table entry
    UndefinedElement(String),
    /// Indirect call whose callee has another signature
    IndirectCallTypeMismatch(String),
    /// Call depth limit reached
    CallStackExhausted,
    /// Import not supplied by the host
    UnknownImport(String),
    /// Export not found, or not a function
    UnknownExport(String),
    /// Arguments do not match the callee's signature
    ArgumentMismatch(String),
    /// The module failed to compile
    Compile(CompileError),
    /// Malformed bytecode or host failure
    Runtime(String),
}

impl EvalError {
    /// Whether this error is a WebAssembly trap.
    pub fn is_trap(&self) -> bool {
        matches!(
            self,
            Self::Unreachable
                | Self::DivisionByZero
                | Self::IntegerOverflow
                | Self::InvalidConversion
                | Self::MemoryOutOfBounds(_)
                | Self::UndefinedElement(_)
                | Self::IndirectCallTypeMismatch(_)
                | Self::CallStackExhausted
        )
    }
}

impl fmt::Display for EvalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unreachable => write!(f, "trap: unreachable executed"),
            Self::DivisionByZero => write!(f, "trap: integer divide by zero"),
            Self::IntegerOverflow => write!(f, "trap: integer overflow"),
            Self::InvalidConversion => write!(f, "trap: invalid conversion to integer"),
            Self::MemoryOutOfBounds(msg) => write!(f, "trap: out of bounds memory access: {msg}"),
            Self::UndefinedElement(msg) => write!(f, "trap: undefined element: {msg}"),
            Self::IndirectCallTypeMismatch(msg) => {
                write!(f, "trap: indirect call type mismatch: {msg}")
            }
            Self::CallStackExhausted => write!(f, "trap: call stack exhausted"),
            Self::UnknownImport(name) => write!(f, "unknown import: {name}"),
            Self::UnknownExport(name) => write!(f, "unknown export: {name}"),
            Self::ArgumentMismatch(msg) => write!(f, "argument mismatch: {msg}"),
            Self::Compile(err) => write!(f, "compile error: {err}"),
            Self::Runtime(msg) => write!(f, "runtime error: {msg}"),
        }
    }
}

impl std::error::Error for EvalError {}

impl From<CompileError> for EvalError {
    fn from(err: CompileError) -> Self {
        Self::Compile(err)
    }
}

/// Result alias for interpreter operations.
pub type EvalResult<T> = Result<T, EvalError>;
