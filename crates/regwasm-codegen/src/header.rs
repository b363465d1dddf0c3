//! Function headers: display names and calling-convention layout.
//!
//! Headers are built for every function of the index space before any body
//! is generated, so body generation only reads them.

use serde::{Deserialize, Serialize};

use regwasm_reader::Module;
use regwasm_types::{CompileError, CompileResult, ErrorKind, PointerWidth, ValueType};

/// Minimum length of [`FunctionHeader::arg_sizes`].
pub const MIN_ARG_SIZES: usize = 3;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionHeader {
    pub index: u32,
    pub name: String,
    /// Type-section index of the signature.
    pub signature: u32,
    pub param_count: u16,
    pub param_types: Vec<ValueType>,
    /// Byte width of each parameter, zero-padded to [`MIN_ARG_SIZES`].
    pub arg_sizes: Vec<u16>,
    pub arg_byte_size: u16,
    pub result: Option<ValueType>,
    pub is_import: bool,
}

impl FunctionHeader {
    pub fn new(module: &Module, index: u32, width: PointerWidth) -> CompileResult<Self> {
        let info = module.function(index)?;
        let sig = module.signature(info.signature)?;
        let name = display_name(module, index);

        let param_count = u16::try_from(sig.param_count())
            .ok()
            .filter(|&n| n < u16::MAX)
            .ok_or_else(|| {
                CompileError::new(
                    ErrorKind::SizeOverflow,
                    format!("function {name}: too many parameters ({})", sig.param_count()),
                )
            })?;

        let mut arg_sizes = vec![0u16; sig.param_count().max(MIN_ARG_SIZES)];
        let mut arg_byte_size: u16 = 0;
        for (i, ty) in sig.params.iter().enumerate() {
            let size = ty.slot_size(width);
            arg_sizes[i] = size;
            arg_byte_size = arg_byte_size.checked_add(size).ok_or_else(|| {
                CompileError::new(
                    ErrorKind::SizeOverflow,
                    format!("function {name}: argument size exceeds 65535 bytes"),
                )
            })?;
        }

        Ok(Self {
            index,
            name,
            signature: info.signature,
            param_count,
            param_types: sig.params.clone(),
            arg_sizes,
            arg_byte_size,
            result: sig.result,
            is_import: info.is_import(),
        })
    }
}

/// Declared name, else `<export>[<index>]`, else `wasm-function[<index>]`.
pub fn display_name(module: &Module, index: u32) -> String {
    if let Some(name) = module.functions.get(index as usize).and_then(|f| f.name.as_ref()) {
        return name.clone();
    }
    match module.export_name_for_function(index) {
        Some(export) => format!("{export}[{index}]"),
        None => format!("wasm-function[{index}]"),
    }
}

/// Headers for the whole function index space, imports first.
pub fn build_headers(module: &Module, width: PointerWidth) -> CompileResult<Vec<FunctionHeader>> {
    (0..module.functions.len() as u32)
        .map(|index| FunctionHeader::new(module, index, width))
        .collect()
}
