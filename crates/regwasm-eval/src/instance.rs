//! Module instantiation.
//!
//! Builds the runtime state a compiled module needs before any function can
//! run: host functions and imported globals from [`Imports`], global
//! initialisers, linear memory and table sized from their limits, active
//! data and element segments, then the start function.

use std::collections::BTreeMap;

use tracing::debug;

use regwasm_codegen::{generate_module, CompiledModule};
use regwasm_reader::{ExportKind, ImportKind, InitExpr};
use regwasm_types::CompileOptions;

use crate::error::{EvalError, EvalResult};
use crate::interpreter::Interpreter;
use crate::memory::LinearMemory;
use crate::value::Value;

/// Default limit on nested calls before [`EvalError::CallStackExhausted`].
pub const DEFAULT_MAX_CALL_DEPTH: usize = 256;

/// A host function supplied for an import.
pub type HostFunc = Box<dyn Fn(&[Value]) -> EvalResult<Option<Value>>>;

// ══════════════════════════════════════════════════════════════════════════════
// Imports
// ══════════════════════════════════════════════════════════════════════════════

/// Host-provided values for a module's imports, keyed by `(module, field)`.
#[derive(Default)]
pub struct Imports {
    functions: BTreeMap<(String, String), HostFunc>,
    globals: BTreeMap<(String, String), Value>,
}

impl Imports {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn func(
        mut self,
        module: &str,
        field: &str,
        f: impl Fn(&[Value]) -> EvalResult<Option<Value>> + 'static,
    ) -> Self {
        self.functions
            .insert((module.to_string(), field.to_string()), Box::new(f));
        self
    }

    pub fn global(mut self, module: &str, field: &str, value: Value) -> Self {
        self.globals
            .insert((module.to_string(), field.to_string()), value);
        self
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Store
// ══════════════════════════════════════════════════════════════════════════════

/// Mutable runtime state of an instance.
pub(crate) struct Store {
    pub memory: Option<LinearMemory>,
    /// Function indices; `None` for uninitialised entries.
    pub table: Vec<Option<u32>>,
    pub globals: Vec<Value>,
    /// Host functions, indexed by function index.
    pub host: Vec<Option<HostFunc>>,
    pub depth: usize,
    pub max_depth: usize,
}

// ══════════════════════════════════════════════════════════════════════════════
// Instance
// ══════════════════════════════════════════════════════════════════════════════

/// An instantiated module, ready to run exported functions.
pub struct Instance {
    compiled: CompiledModule,
    store: Store,
}

impl Instance {
    /// Compile `bytes` and instantiate the result.
    pub fn from_bytes(bytes: &[u8], options: &CompileOptions, imports: Imports) -> EvalResult<Self> {
        let compiled = generate_module(bytes, options)?;
        Self::new(compiled, imports)
    }

    pub fn new(compiled: CompiledModule, imports: Imports) -> EvalResult<Self> {
        Self::with_max_call_depth(compiled, imports, DEFAULT_MAX_CALL_DEPTH)
    }

    pub fn with_max_call_depth(
        compiled: CompiledModule,
        mut imports: Imports,
        max_depth: usize,
    ) -> EvalResult<Self> {
        let module = &compiled.module;

        // ── Imports ──
        let mut host: Vec<Option<HostFunc>> = Vec::new();
        host.resize_with(module.functions.len(), || None);
        let mut imported_globals = BTreeMap::new();
        for import in &module.imports {
            let key = (import.module.clone(), import.field.clone());
            let name = format!("{}.{}", import.module, import.field);
            match import.kind {
                ImportKind::Function { index, .. } => {
                    let f = imports
                        .functions
                        .remove(&key)
                        .ok_or(EvalError::UnknownImport(name))?;
                    host[index as usize] = Some(f);
                }
                ImportKind::Global { index } => {
                    let value = *imports
                        .globals
                        .get(&key)
                        .ok_or(EvalError::UnknownImport(name.clone()))?;
                    let expected = module.global(index)?.ty;
                    if value.ty() != expected {
                        return Err(EvalError::UnknownImport(format!(
                            "{name}: expected {expected}, got {}",
                            value.ty()
                        )));
                    }
                    imported_globals.insert(index, value);
                }
                // Tables and memories are created from their declared limits.
                ImportKind::Table { .. } | ImportKind::Memory { .. } => {}
            }
        }

        // ── Globals ──
        let mut globals = Vec::with_capacity(module.globals.len());
        for (index, desc) in module.globals.iter().enumerate() {
            let value = match desc.init {
                Some(init) => init_value(&globals, init)?,
                None => imported_globals.get(&(index as u32)).copied().ok_or_else(|| {
                    EvalError::Runtime(format!("global {index} has no value"))
                })?,
            };
            globals.push(value);
        }

        let memory = module
            .memories
            .first()
            .map(|limits| LinearMemory::new(limits.initial, limits.maximum));
        let table = module
            .tables
            .first()
            .map(|limits| vec![None; limits.initial as usize])
            .unwrap_or_default();

        let mut store = Store {
            memory,
            table,
            globals,
            host,
            depth: 0,
            max_depth,
        };

        // ── Segments ──
        for segment in &module.elements {
            let offset = offset_value(&store.globals, segment.offset)? as usize;
            let end = offset.checked_add(segment.functions.len());
            match end {
                Some(end) if end <= store.table.len() => {
                    for (slot, &function) in store.table[offset..end].iter_mut().zip(&segment.functions) {
                        *slot = Some(function);
                    }
                }
                _ => {
                    return Err(EvalError::UndefinedElement(format!(
                        "element segment at {offset} overflows table of {}",
                        store.table.len()
                    )))
                }
            }
        }
        for segment in &module.data {
            let offset = offset_value(&store.globals, segment.offset)?;
            let memory = store.memory.as_mut().ok_or_else(|| {
                EvalError::MemoryOutOfBounds("data segment without a memory".to_string())
            })?;
            memory.write(offset, &segment.bytes)?;
        }

        debug!(
            functions = module.functions.len(),
            globals = store.globals.len(),
            table = store.table.len(),
            "module instantiated"
        );

        let mut instance = Self { compiled, store };
        if let Some(start) = instance.compiled.module.start {
            instance.call(start, &[])?;
        }
        Ok(instance)
    }

    pub fn module(&self) -> &CompiledModule {
        &self.compiled
    }

    pub fn memory(&self) -> Option<&LinearMemory> {
        self.store.memory.as_ref()
    }

    /// Current value of an exported global.
    pub fn global(&self, name: &str) -> Option<Value> {
        self.compiled
            .module
            .exports
            .iter()
            .find(|e| e.kind == ExportKind::Global && e.name == name)
            .and_then(|e| self.store.globals.get(e.index as usize).copied())
    }

    /// Call an exported function by name.
    pub fn invoke(&mut self, name: &str, args: &[Value]) -> EvalResult<Option<Value>> {
        let index = self
            .compiled
            .module
            .exported_function(name)
            .ok_or_else(|| EvalError::UnknownExport(name.to_string()))?;
        self.call(index, args)
    }

    /// Call a function by index.
    pub fn call(&mut self, index: u32, args: &[Value]) -> EvalResult<Option<Value>> {
        Interpreter::new(&self.compiled, &mut self.store).call(index, args)
    }
}

fn init_value(globals: &[Value], init: InitExpr) -> EvalResult<Value> {
    match init {
        InitExpr::Const(literal) => Ok(Value::from(literal)),
        InitExpr::Global(index) => globals
            .get(index as usize)
            .copied()
            .ok_or_else(|| EvalError::Runtime(format!("initializer reads undefined global {index}"))),
    }
}

/// Segment offsets are unsigned 32-bit.
fn offset_value(globals: &[Value], init: InitExpr) -> EvalResult<u64> {
    let offset = init_value(globals, init)?.as_i32()?;
    Ok(u64::from(offset as u32))
}
