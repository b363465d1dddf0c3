//! Module generator.
//!
//! Runs the section loop, builds every function header, then generates the
//! bodies of the defined functions. Any error aborts the whole module.

use tracing::debug;

use regwasm_reader::{ExprReader, ModuleReader, ParsedModule, SectionCode};
use regwasm_types::{CompileOptions, CompileResult};

use crate::compiled::{CompiledFunction, CompiledModule};
use crate::generator::FunctionGenerator;
use crate::header::{build_headers, FunctionHeader};

// ══════════════════════════════════════════════════════════════════════════════
// Public API
// ══════════════════════════════════════════════════════════════════════════════

/// Translate a binary module eagerly.
pub fn generate_module(bytes: &[u8], options: &CompileOptions) -> CompileResult<CompiledModule> {
    let prepared = prepare_module(bytes, options)?;
    let functions = prepared
        .defined_indices()
        .map(|index| prepared.compile_function(index))
        .collect::<CompileResult<Vec<_>>>()?;
    debug!(functions = functions.len(), "module generated");
    Ok(prepared.into_compiled(functions))
}

/// Read all sections and build headers, leaving bodies for later.
pub fn prepare_module<'a>(
    bytes: &'a [u8],
    options: &CompileOptions,
) -> CompileResult<PreparedModule<'a>> {
    let mut reader = ModuleReader::new(bytes, options)?;
    for code in SectionCode::ORDER {
        if reader.read_next_section(code)? {
            reader.process_current_section()?;
        }
    }
    let parsed = reader.finish()?;
    let headers = build_headers(&parsed.module, options.pointer_width)?;
    debug!(
        signatures = parsed.module.signatures.len(),
        functions = parsed.module.functions.len(),
        imports = parsed.module.import_function_count,
        "module prepared"
    );
    Ok(PreparedModule {
        parsed,
        headers,
        options: options.clone(),
    })
}

// ══════════════════════════════════════════════════════════════════════════════
// Prepared module
// ══════════════════════════════════════════════════════════════════════════════

/// A module whose sections and headers are ready and whose bodies can be
/// generated one at a time.
pub struct PreparedModule<'a> {
    parsed: ParsedModule<'a>,
    headers: Vec<FunctionHeader>,
    options: CompileOptions,
}

impl<'a> PreparedModule<'a> {
    pub fn module(&self) -> &regwasm_reader::Module {
        &self.parsed.module
    }

    pub fn headers(&self) -> &[FunctionHeader] {
        &self.headers
    }

    pub fn options(&self) -> &CompileOptions {
        &self.options
    }

    /// Function indices that have a body.
    pub fn defined_indices(&self) -> impl Iterator<Item = u32> + '_ {
        self.parsed.module.defined_functions().map(|f| f.index)
    }

    /// Generate one body.
    ///
    /// Failures are prefixed with the function's display name and the
    /// offset of the failing operator relative to the body.
    pub fn compile_function(&self, index: u32) -> CompileResult<CompiledFunction> {
        let header = self.headers.get(index as usize).ok_or_else(|| {
            regwasm_types::CompileError::new(
                regwasm_types::ErrorKind::InvalidFunctionIndex,
                format!("function index {index} out of range ({} declared)", self.headers.len()),
            )
        })?;
        let reader = self.parsed.seek_to_function_body(index)?;
        let location = reader.body_location();
        FunctionGenerator::new(&self.parsed.module, header, &self.options, reader)
            .generate()
            .map_err(|err| {
                let relative = err.offset.map_or(0, |o| o.saturating_sub(location.offset));
                debug!(function = %header.name, error = %err, "body generation failed");
                err.in_function(&header.name, relative, location.size)
            })
    }

    /// Assemble the output from bodies generated by the caller.
    pub fn into_compiled(self, functions: Vec<CompiledFunction>) -> CompiledModule {
        CompiledModule {
            module: self.parsed.module,
            headers: self.headers,
            functions,
        }
    }
}
