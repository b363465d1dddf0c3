//! Value types and function signatures.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{CompileError, CompileResult, ErrorKind};
use crate::options::PointerWidth;

/// One of the four primitive WebAssembly value types.
///
/// Each type has its own register space in the target bytecode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
    I32,
    I64,
    F32,
    F64,
}

impl ValueType {
    pub const ALL: [ValueType; 4] = [Self::I32, Self::I64, Self::F32, Self::F64];

    /// Index of this type's register space.
    pub fn space(self) -> usize {
        match self {
            Self::I32 => 0,
            Self::I64 => 1,
            Self::F32 => 2,
            Self::F64 => 3,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::I32 => "i32",
            Self::I64 => "i64",
            Self::F32 => "f32",
            Self::F64 => "f64",
        }
    }

    /// Register prefix used in bytecode listings.
    pub fn prefix(self) -> char {
        match self {
            Self::I32 => 'I',
            Self::I64 => 'L',
            Self::F32 => 'F',
            Self::F64 => 'D',
        }
    }

    /// Bytes this type occupies in an argument area.
    pub fn slot_size(self, width: PointerWidth) -> u16 {
        match self {
            Self::I32 | Self::F32 => width.bytes(),
            Self::I64 | Self::F64 => 8,
        }
    }

    fn param_code(self) -> u64 {
        self.space() as u64
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Render an optional result type, `void` when absent.
pub fn result_name(result: Option<ValueType>) -> &'static str {
    result.map_or("void", ValueType::name)
}

/// A finalized function signature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature {
    /// Type-section index.
    pub id: u32,
    pub params: Vec<ValueType>,
    pub result: Option<ValueType>,
    /// Byte width of each parameter in the internal calling convention.
    pub param_sizes: Vec<u16>,
    /// Sum of `param_sizes`.
    pub params_size: u16,
    /// Compact hash; absent when the signature has too many parameters.
    pub short_sig: Option<u64>,
}

impl Signature {
    /// Build a signature and compute its calling-convention sizes.
    pub fn new(
        id: u32,
        params: Vec<ValueType>,
        result: Option<ValueType>,
        width: PointerWidth,
    ) -> CompileResult<Self> {
        let param_sizes: Vec<u16> = params.iter().map(|p| p.slot_size(width)).collect();
        let mut params_size: u16 = 0;
        for size in &param_sizes {
            params_size = params_size.checked_add(*size).ok_or_else(|| {
                CompileError::new(
                    ErrorKind::SizeOverflow,
                    format!("signature {id}: parameter size exceeds 65535 bytes"),
                )
            })?;
        }
        let short_sig = Self::short_signature(&params, result);
        Ok(Self {
            id,
            params,
            result,
            param_sizes,
            params_size,
            short_sig,
        })
    }

    pub fn param_count(&self) -> usize {
        self.params.len()
    }

    /// Pack the signature into a single integer.
    ///
    /// Layout from the most significant set bit: a marker `1`, three bits of
    /// result code (0 = void), then two bits per parameter. The marker keeps
    /// signatures with different parameter counts distinct.
    pub fn short_signature(params: &[ValueType], result: Option<ValueType>) -> Option<u64> {
        if 1 + 3 + 2 * params.len() > 64 {
            return None;
        }
        let result_code = result.map_or(0, |r| r.param_code() + 1);
        let mut sig: u64 = 1;
        sig = (sig << 3) | result_code;
        for p in params {
            sig = (sig << 2) | p.param_code();
        }
        Some(sig)
    }

    /// Structural equivalence, as checked at indirect call sites.
    pub fn is_equivalent(&self, other: &Signature) -> bool {
        match (self.short_sig, other.short_sig) {
            (Some(a), Some(b)) => a == b,
            _ => self.params == other.params && self.result == other.result,
        }
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for (i, p) in self.params.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{p}")?;
        }
        write!(f, ") -> {}", result_name(self.result))
    }
}
