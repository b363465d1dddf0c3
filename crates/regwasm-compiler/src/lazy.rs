//! Deferred per-function compilation.
//!
//! A [`LazyModule`] validates sections and builds every header when it is
//! created, but generates a function body only on first request. Both
//! outcomes are cached, so a body that failed keeps failing with the same
//! error without being regenerated.

use tracing::debug;

use regwasm_codegen::{prepare_module, CompiledFunction, CompiledModule, FunctionHeader, PreparedModule};
use regwasm_reader::Module;
use regwasm_types::{CompileError, CompileOptions, CompileResult, ErrorKind};

pub struct LazyModule<'a> {
    prepared: PreparedModule<'a>,
    /// One entry per defined function, in index order.
    bodies: Vec<Option<CompileResult<CompiledFunction>>>,
}

impl<'a> LazyModule<'a> {
    /// Read every section and build the function headers.
    pub fn new(bytes: &'a [u8], options: &CompileOptions) -> CompileResult<Self> {
        let prepared = prepare_module(bytes, options)?;
        let defined = prepared.defined_indices().count();
        let mut bodies = Vec::with_capacity(defined);
        bodies.resize_with(defined, || None);
        Ok(Self { prepared, bodies })
    }

    pub fn module(&self) -> &Module {
        self.prepared.module()
    }

    pub fn headers(&self) -> &[FunctionHeader] {
        self.prepared.headers()
    }

    /// Number of bodies generated so far, successful or not.
    pub fn generated_count(&self) -> usize {
        self.bodies.iter().filter(|b| b.is_some()).count()
    }

    /// The body of function `index`, generating it on first use.
    pub fn function(&mut self, index: u32) -> CompileResult<&CompiledFunction> {
        let slot = self.slot(index)?;
        let prepared = &self.prepared;
        let entry = self.bodies[slot].get_or_insert_with(|| {
            let result = prepared.compile_function(index);
            match &result {
                Ok(_) => debug!(function = index, "lazy body generated"),
                Err(err) => debug!(function = index, error = %err, "lazy body failed"),
            }
            result
        });
        entry.as_ref().map_err(Clone::clone)
    }

    /// Generate every remaining body and assemble the module.
    ///
    /// Fails with the first cached or fresh error, in index order.
    pub fn finish(mut self) -> CompileResult<CompiledModule> {
        let indices: Vec<u32> = self.prepared.defined_indices().collect();
        for &index in &indices {
            self.function(index)?;
        }
        let functions = self
            .bodies
            .into_iter()
            .flatten()
            .collect::<CompileResult<Vec<_>>>()?;
        Ok(self.prepared.into_compiled(functions))
    }

    fn slot(&self, index: u32) -> CompileResult<usize> {
        let imports = self.module().import_function_count;
        index
            .checked_sub(imports)
            .map(|i| i as usize)
            .filter(|&i| i < self.bodies.len())
            .ok_or_else(|| {
                CompileError::new(
                    ErrorKind::InvalidFunctionIndex,
                    format!(
                        "function {index} has no body ({imports} imported, {} defined)",
                        self.bodies.len()
                    ),
                )
            })
    }
}
