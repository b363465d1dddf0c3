//! Output of the generator, handed to the instantiation collaborator.

use serde::{Deserialize, Serialize};

use regwasm_reader::Module;
use regwasm_types::ByteCode;

use crate::header::FunctionHeader;
use crate::registers::FrameLayout;

/// A generated function body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompiledFunction {
    /// Index in the function index space.
    pub index: u32,
    pub bytecode: ByteCode,
    pub frame: FrameLayout,
    /// Whether the body reads or writes linear memory.
    pub uses_heap_buffer: bool,
    /// Largest outgoing argument area, in pointer-sized slots.
    pub max_arg_out_depth: u16,
}

/// A whole translated module.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompiledModule {
    pub module: Module,
    /// One per function of the index space, imports included.
    pub headers: Vec<FunctionHeader>,
    /// One per defined function, in declaration order.
    pub functions: Vec<CompiledFunction>,
}

impl CompiledModule {
    pub fn header(&self, index: u32) -> Option<&FunctionHeader> {
        self.headers.get(index as usize)
    }

    /// Compiled body of a function in the function index space.
    pub fn function(&self, index: u32) -> Option<&CompiledFunction> {
        let offset = index.checked_sub(self.module.import_function_count)?;
        self.functions.get(offset as usize)
    }

    /// Numbered listing of every compiled body.
    pub fn listing(&self) -> String {
        let mut out = String::new();
        for func in &self.functions {
            let header = &self.headers[func.index as usize];
            out.push_str(&format!(
                "function {} [{}] {}\n",
                header.name,
                func.index,
                self.module
                    .signatures
                    .get(header.signature as usize)
                    .map(ToString::to_string)
                    .unwrap_or_default()
            ));
            out.push_str(&func.bytecode.to_string());
        }
        out
    }
}
