//! Compilation error type.
//!
//! Every failure in the pipeline, from a malformed section header to a
//! type mismatch deep inside a function body, is reported as one
//! [`CompileError`]. Errors are module-fatal: nothing downstream attempts
//! recovery, so the error carries enough context (kind, message, byte
//! offset, function name) for the host to surface it verbatim.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Broad grouping of error kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorCategory {
    Structure,
    Unsupported,
    Index,
    Type,
    Stack,
    Overflow,
    Body,
}

/// The precise reason a compilation failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    // ── Structure ──
    SectionOrder,
    MissingSection,
    MalformedBinary,
    UnexpectedOpcode,

    // ── Unsupported ──
    UnsupportedOperator,
    UnsupportedType,
    UnsupportedFeature,

    // ── Index ──
    InvalidFunctionIndex,
    InvalidLocalIndex,
    InvalidGlobalIndex,
    InvalidSignatureIndex,
    InvalidTableIndex,
    InvalidMemoryIndex,
    InvalidBranchTarget,

    // ── Type ──
    OperandTypeMismatch,
    ReturnTypeMismatch,
    InvalidYieldType,
    CallArgumentTypeMismatch,
    StoreValueTypeMismatch,
    ImmutableGlobal,

    // ── Stack ──
    StackUnderflow,
    NonEmptyStackAtScopeExit,
    MissingBlockYield,

    // ── Overflow ──
    SizeOverflow,
    NestingTooDeep,

    // ── Body ──
    TruncatedOrOverlongFunctionBody,
}

impl ErrorKind {
    /// Get the category for this error kind.
    pub fn category(self) -> ErrorCategory {
        use ErrorKind::*;
        match self {
            SectionOrder | MissingSection | MalformedBinary | UnexpectedOpcode => {
                ErrorCategory::Structure
            }
            UnsupportedOperator | UnsupportedType | UnsupportedFeature => {
                ErrorCategory::Unsupported
            }
            InvalidFunctionIndex | InvalidLocalIndex | InvalidGlobalIndex
            | InvalidSignatureIndex | InvalidTableIndex | InvalidMemoryIndex
            | InvalidBranchTarget => ErrorCategory::Index,
            OperandTypeMismatch | ReturnTypeMismatch | InvalidYieldType
            | CallArgumentTypeMismatch | StoreValueTypeMismatch | ImmutableGlobal => {
                ErrorCategory::Type
            }
            StackUnderflow | NonEmptyStackAtScopeExit | MissingBlockYield => ErrorCategory::Stack,
            SizeOverflow | NestingTooDeep => ErrorCategory::Overflow,
            TruncatedOrOverlongFunctionBody => ErrorCategory::Body,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Reuse the serde spelling so logs and JSON agree.
        let name = match self {
            Self::SectionOrder => "section_order",
            Self::MissingSection => "missing_section",
            Self::MalformedBinary => "malformed_binary",
            Self::UnexpectedOpcode => "unexpected_opcode",
            Self::UnsupportedOperator => "unsupported_operator",
            Self::UnsupportedType => "unsupported_type",
            Self::UnsupportedFeature => "unsupported_feature",
            Self::InvalidFunctionIndex => "invalid_function_index",
            Self::InvalidLocalIndex => "invalid_local_index",
            Self::InvalidGlobalIndex => "invalid_global_index",
            Self::InvalidSignatureIndex => "invalid_signature_index",
            Self::InvalidTableIndex => "invalid_table_index",
            Self::InvalidMemoryIndex => "invalid_memory_index",
            Self::InvalidBranchTarget => "invalid_branch_target",
            Self::OperandTypeMismatch => "operand_type_mismatch",
            Self::ReturnTypeMismatch => "return_type_mismatch",
            Self::InvalidYieldType => "invalid_yield_type",
            Self::CallArgumentTypeMismatch => "call_argument_type_mismatch",
            Self::StoreValueTypeMismatch => "store_value_type_mismatch",
            Self::ImmutableGlobal => "immutable_global",
            Self::StackUnderflow => "stack_underflow",
            Self::NonEmptyStackAtScopeExit => "non_empty_stack_at_scope_exit",
            Self::MissingBlockYield => "missing_block_yield",
            Self::SizeOverflow => "size_overflow",
            Self::NestingTooDeep => "nesting_too_deep",
            Self::TruncatedOrOverlongFunctionBody => "truncated_or_overlong_function_body",
        };
        f.write_str(name)
    }
}

/// A module-fatal compilation error.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{message}")]
pub struct CompileError {
    /// What went wrong.
    pub kind: ErrorKind,
    /// Category (derived from kind).
    pub category: ErrorCategory,
    /// Human-readable message: opcode name, index, expected vs. actual type.
    pub message: String,
    /// Absolute byte offset in the module, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub offset: Option<usize>,
    /// Display name of the function being compiled, when inside a body.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub function: Option<String>,
}

impl CompileError {
    /// Create a new error.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            category: kind.category(),
            message: message.into(),
            offset: None,
            function: None,
        }
    }

    /// Attach an absolute byte offset.
    pub fn at(mut self, offset: usize) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Wrap the message with the location inside a function body.
    ///
    /// `relative_offset` is measured from the start of the body and `size`
    /// is the body's length in bytes. Errors already carrying a function
    /// name are returned unchanged.
    pub fn in_function(mut self, name: &str, relative_offset: usize, size: usize) -> Self {
        if self.function.is_some() {
            return self;
        }
        self.message = format!(
            "function {name} at offset {relative_offset}/{size}: {}",
            self.message
        );
        self.function = Some(name.to_string());
        self
    }
}

/// Result alias for every fallible compilation step.
pub type CompileResult<T> = Result<T, CompileError>;
