//! Owned module data model.
//!
//! Populated section by section by the [`ModuleReader`](crate::ModuleReader)
//! and read-only once body generation starts.

use serde::{Deserialize, Serialize};

use regwasm_types::{CompileError, CompileResult, ErrorKind, Literal, Signature, ValueType};

/// What an import brings into the module, with its index in the
/// corresponding index space.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ImportKind {
    Function { index: u32, signature: u32 },
    Table { index: u32 },
    Memory { index: u32 },
    Global { index: u32 },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Import {
    pub module: String,
    pub field: String,
    #[serde(flatten)]
    pub kind: ImportKind,
}

/// Byte range of an encoded function body (after the size prefix).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BodyLocation {
    pub offset: usize,
    pub size: usize,
}

/// Everything known about one entry of the function index space.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionInfo {
    pub index: u32,
    /// Type-section index of the signature.
    pub signature: u32,
    /// `(module, field)` for imported functions.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub import: Option<(String, String)>,
    /// Declared name from the `name` section.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Declared locals, parameters excluded.
    pub locals: Vec<ValueType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<BodyLocation>,
}

impl FunctionInfo {
    pub fn is_import(&self) -> bool {
        self.import.is_some()
    }
}

/// Table or memory limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LimitsDesc {
    pub initial: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub maximum: Option<u32>,
    pub imported: bool,
}

/// Constant initializer of a global or segment offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InitExpr {
    Const(Literal),
    /// Value of an imported global.
    Global(u32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlobalDesc {
    pub ty: ValueType,
    pub mutable: bool,
    /// `None` for imported globals.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub init: Option<InitExpr>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportKind {
    Function,
    Table,
    Memory,
    Global,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Export {
    pub name: String,
    pub kind: ExportKind,
    pub index: u32,
}

/// Active element segment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElementSegment {
    pub table: u32,
    pub offset: InitExpr,
    pub functions: Vec<u32>,
}

/// Active data segment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataSegment {
    pub memory: u32,
    pub offset: InitExpr,
    pub bytes: Vec<u8>,
}

/// Slot assignment of the module environment.
///
/// Slot 0 holds the linear memory, then one slot per function in the
/// function index space, one slot for the table, then one per global.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvironmentLayout {
    pub memory_slot: u32,
    pub function_offset: u32,
    pub table_slot: u32,
    pub global_offset: u32,
    pub size: u32,
}

impl EnvironmentLayout {
    pub fn new(function_count: u32, global_count: u32) -> Self {
        let function_offset = 1;
        let table_slot = function_offset + function_count;
        let global_offset = table_slot + 1;
        Self {
            memory_slot: 0,
            function_offset,
            table_slot,
            global_offset,
            size: global_offset + global_count,
        }
    }

    pub fn function_slot(&self, index: u32) -> u32 {
        self.function_offset + index
    }

    pub fn global_slot(&self, index: u32) -> u32 {
        self.global_offset + index
    }
}

/// A decoded module.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Module {
    pub signatures: Vec<Signature>,
    pub imports: Vec<Import>,
    /// Function index space: imports first, then defined functions.
    pub functions: Vec<FunctionInfo>,
    pub import_function_count: u32,
    pub tables: Vec<LimitsDesc>,
    pub memories: Vec<LimitsDesc>,
    pub globals: Vec<GlobalDesc>,
    pub import_global_count: u32,
    pub exports: Vec<Export>,
    pub elements: Vec<ElementSegment>,
    pub data: Vec<DataSegment>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_count: Option<u32>,
    pub layout: EnvironmentLayout,
}

impl Module {
    pub fn signature(&self, index: u32) -> CompileResult<&Signature> {
        self.signatures.get(index as usize).ok_or_else(|| {
            CompileError::new(
                ErrorKind::InvalidSignatureIndex,
                format!("signature index {index} out of range ({} declared)", self.signatures.len()),
            )
        })
    }

    pub fn function(&self, index: u32) -> CompileResult<&FunctionInfo> {
        self.functions.get(index as usize).ok_or_else(|| {
            CompileError::new(
                ErrorKind::InvalidFunctionIndex,
                format!("function index {index} out of range ({} declared)", self.functions.len()),
            )
        })
    }

    /// Signature of a function in the function index space.
    pub fn function_signature(&self, index: u32) -> CompileResult<&Signature> {
        let info = self.function(index)?;
        self.signature(info.signature)
    }

    pub fn global(&self, index: u32) -> CompileResult<&GlobalDesc> {
        self.globals.get(index as usize).ok_or_else(|| {
            CompileError::new(
                ErrorKind::InvalidGlobalIndex,
                format!("global index {index} out of range ({} declared)", self.globals.len()),
            )
        })
    }

    pub fn require_table(&self, index: u32) -> CompileResult<&LimitsDesc> {
        self.tables.get(index as usize).ok_or_else(|| {
            CompileError::new(
                ErrorKind::InvalidTableIndex,
                format!("table index {index} out of range ({} declared)", self.tables.len()),
            )
        })
    }

    pub fn require_memory(&self, index: u32) -> CompileResult<&LimitsDesc> {
        self.memories.get(index as usize).ok_or_else(|| {
            CompileError::new(
                ErrorKind::InvalidMemoryIndex,
                format!("memory index {index} out of range ({} declared)", self.memories.len()),
            )
        })
    }

    pub fn is_import_function(&self, index: u32) -> bool {
        index < self.import_function_count
    }

    /// Functions with a body, in declaration order.
    pub fn defined_functions(&self) -> impl Iterator<Item = &FunctionInfo> {
        self.functions.iter().skip(self.import_function_count as usize)
    }

    /// First export name referencing a function index.
    pub fn export_name_for_function(&self, index: u32) -> Option<&str> {
        self.exports
            .iter()
            .find(|e| e.kind == ExportKind::Function && e.index == index)
            .map(|e| e.name.as_str())
    }

    /// Exported function index by name.
    pub fn exported_function(&self, name: &str) -> Option<u32> {
        self.exports
            .iter()
            .find(|e| e.kind == ExportKind::Function && e.name == name)
            .map(|e| e.index)
    }
}
