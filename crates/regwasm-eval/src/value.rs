//! Runtime values.

use std::fmt;

use regwasm_types::{Literal, ValueType};

use crate::error::{EvalError, EvalResult};

/// A WebAssembly value of one of the four primitive types.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Value {
    I32(i32),
    I64(i64),
    F32(f32),
    F64(f64),
}

impl Value {
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
            ValueType::F32 => Self::F32(0.0),
            ValueType::F64 => Self::F64(0.0),
        }
    }

    pub fn as_i32(self) -> EvalResult<i32> {
        match self {
            Self::I32(v) => Ok(v),
            other => Err(mismatch(ValueType::I32, other)),
        }
    }

    pub fn as_i64(self) -> EvalResult<i64> {
        match self {
            Self::I64(v) => Ok(v),
            other => Err(mismatch(ValueType::I64, other)),
        }
    }

    pub fn as_f32(self) -> EvalResult<f32> {
        match self {
            Self::F32(v) => Ok(v),
            other => Err(mismatch(ValueType::F32, other)),
        }
    }

    pub fn as_f64(self) -> EvalResult<f64> {
        match self {
            Self::F64(v) => Ok(v),
            other => Err(mismatch(ValueType::F64, other)),
        }
    }

    /// Bit-exact comparison, so NaN payloads and signed zeros compare as
    /// stored.
    pub fn bits_eq(self, other: Value) -> bool {
        match (self, other) {
            (Self::I32(a), Self::I32(b)) => a == b,
            (Self::I64(a), Self::I64(b)) => a == b,
            (Self::F32(a), Self::F32(b)) => a.to_bits() == b.to_bits(),
            (Self::F64(a), Self::F64(b)) => a.to_bits() == b.to_bits(),
            _ => false,
        }
    }
}

fn mismatch(expected: ValueType, got: Value) -> EvalError {
    EvalError::Runtime(format!("expected {expected} value, found {got}"))
}

impl From<Literal> for Value {
    fn from(literal: Literal) -> Self {
        match literal {
            Literal::I32(v) => Self::I32(v),
            Literal::I64(v) => Self::I64(v),
            Literal::F32(bits) => Self::F32(f32::from_bits(bits)),
            Literal::F64(bits) => Self::F64(f64::from_bits(bits)),
        }
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Self::I32(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::I64(v)
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Self::F32(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::F64(v)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::I32(v) => write!(f, "{v}:i32"),
            Self::I64(v) => write!(f, "{v}:i64"),
            Self::F32(v) => write!(f, "{v:?}:f32"),
            Self::F64(v) => write!(f, "{v:?}:f64"),
        }
    }
}
