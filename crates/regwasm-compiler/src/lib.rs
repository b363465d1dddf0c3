//! regwasm compiler: orchestrates the full translation pipeline.
//!
//! ```text
//! .wasm bytes → Section Reader → Header Builder → Bytecode Generator → CompiledModule
//! ```
//!
//! [`compile`] translates every function body up front. [`LazyModule`]
//! reads the sections and headers eagerly and generates each body the first
//! time it is asked for. [`compile_to_result`] wraps the eager pipeline in a
//! serializable [`CompileOutput`] for hosts that speak JSON.

pub mod lazy;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::debug;

use regwasm_codegen::CompiledModule;
use regwasm_types::{CompileError, CompileOptions, CompileResult};

pub use lazy::LazyModule;

/// Result of [`compile_to_result`], shaped for JSON consumers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompileOutput {
    /// Whether every function translated.
    pub success: bool,
    /// The translated module (present on success).
    pub module: Option<CompiledModule>,
    /// The module-fatal error (present on failure).
    pub error: Option<CompileError>,
    /// SHA-256 of the input bytes, lowercase hex.
    pub fingerprint: String,
}

/// Translate a binary module eagerly.
pub fn compile(bytes: &[u8], options: &CompileOptions) -> CompileResult<CompiledModule> {
    regwasm_codegen::generate_module(bytes, options)
}

/// Translate a binary module and package the outcome as a [`CompileOutput`].
///
/// Never fails: errors are reported inside the result.
pub fn compile_to_result(bytes: &[u8], options: &CompileOptions) -> CompileOutput {
    let fingerprint = fingerprint(bytes);
    match compile(bytes, options) {
        Ok(module) => CompileOutput {
            success: true,
            module: Some(module),
            error: None,
            fingerprint,
        },
        Err(err) => {
            debug!(%fingerprint, error = %err, "compilation failed");
            CompileOutput {
                success: false,
                module: None,
                error: Some(err),
                fingerprint,
            }
        }
    }
}

/// SHA-256 of `bytes` as lowercase hex.
pub fn fingerprint(bytes: &[u8]) -> String {
    Sha256::digest(bytes)
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect()
}
