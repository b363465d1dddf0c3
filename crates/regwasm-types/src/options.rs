//! Compile options.

use serde::{Deserialize, Serialize};

/// Width of a boxed value slot on the target.
///
/// 32-bit values occupy one slot; 64-bit values always take 8 bytes, which
/// is two slots on a 32-bit target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PointerWidth {
    P32,
    #[default]
    P64,
}

impl PointerWidth {
    /// Size of one argument slot in bytes.
    pub fn bytes(self) -> u16 {
        match self {
            Self::P32 => 4,
            Self::P64 => 8,
        }
    }
}

/// How a typed `if` without an `else` arm is treated.
///
/// The false path of such an `if` reaches the end of the block without
/// producing its result. `Strict` rejects it with `MissingBlockYield`;
/// `Permissive` loads a zero constant into the result register on that
/// path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum YieldPolicy {
    #[default]
    Strict,
    Permissive,
}

/// Options controlling one module compilation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompileOptions {
    pub pointer_width: PointerWidth,
    pub yield_policy: YieldPolicy,
    /// Maximum nesting of block/loop/if scopes inside one body.
    pub max_nesting_depth: usize,
    /// Maximum number of declared locals (parameters excluded) per function.
    pub max_locals: u32,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            pointer_width: PointerWidth::default(),
            yield_policy: YieldPolicy::default(),
            max_nesting_depth: 1024,
            max_locals: 50_000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_take_defaults() {
        let opts: CompileOptions =
            serde_json::from_str(r#"{ "pointer_width": "p32" }"#).unwrap();
        assert_eq!(opts.pointer_width, PointerWidth::P32);
        assert_eq!(opts.yield_policy, YieldPolicy::Strict);
        assert_eq!(opts.max_nesting_depth, 1024);
    }

    #[test]
    fn slot_widths() {
        assert_eq!(PointerWidth::P32.bytes(), 4);
        assert_eq!(PointerWidth::P64.bytes(), 8);
    }
}
