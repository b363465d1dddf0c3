//! Section-level module reader.
//!
//! The binary is split into sections up front; the module generator then
//! asks for sections by logical code in canonical order. A section that is
//! still pending once the walk is over appeared out of order (or twice).

use std::collections::VecDeque;

use tracing::debug;
use wasmparser::{
    ConstExpr, DataKind, ElementItems, ElementKind, Encoding, ExternalKind, FunctionBody,
    KnownCustom, Name, Operator, Parser, Payload, RefType, TypeRef,
};

use regwasm_types::{
    CompileError, CompileOptions, CompileResult, ErrorKind, Literal, Signature, ValueType,
};

use crate::body::FunctionBodyReader;
use crate::module::*;
use crate::section::SectionCode;
use crate::{malformed, value_type};

enum SectionData<'a> {
    Type(wasmparser::TypeSectionReader<'a>),
    Import(wasmparser::ImportSectionReader<'a>),
    Function(wasmparser::FunctionSectionReader<'a>),
    Table(wasmparser::TableSectionReader<'a>),
    Memory(wasmparser::MemorySectionReader<'a>),
    Global(wasmparser::GlobalSectionReader<'a>),
    Export(wasmparser::ExportSectionReader<'a>),
    Start(u32),
    Element(wasmparser::ElementSectionReader<'a>),
    DataCount(u32),
    Code(Vec<FunctionBody<'a>>),
    Data(wasmparser::DataSectionReader<'a>),
    Name(wasmparser::NameSectionReader<'a>),
}

struct PendingSection<'a> {
    code: SectionCode,
    offset: usize,
    data: SectionData<'a>,
}

/// Reads a module section by section.
pub struct ModuleReader<'a> {
    options: CompileOptions,
    pending: VecDeque<PendingSection<'a>>,
    name_section: Option<PendingSection<'a>>,
    current: Option<PendingSection<'a>>,
    seen: [bool; SectionCode::ORDER.len()],
    module: Module,
    bodies: Vec<FunctionBody<'a>>,
}

impl<'a> ModuleReader<'a> {
    /// Split `bytes` into sections. Nothing is interpreted yet beyond the
    /// module header and section framing.
    pub fn new(bytes: &'a [u8], options: &CompileOptions) -> CompileResult<Self> {
        let mut pending: VecDeque<PendingSection<'a>> = VecDeque::new();
        let mut name_section = None;

        for payload in Parser::new(0).parse_all(bytes) {
            let payload = payload.map_err(malformed)?;
            let (code, offset, data) = match payload {
                Payload::Version { encoding, range, .. } => {
                    if encoding != Encoding::Module {
                        return Err(CompileError::new(
                            ErrorKind::UnsupportedFeature,
                            "components are not supported",
                        )
                        .at(range.start));
                    }
                    continue;
                }
                Payload::TypeSection(r) => (SectionCode::Type, r.range().start, SectionData::Type(r)),
                Payload::ImportSection(r) => {
                    (SectionCode::Import, r.range().start, SectionData::Import(r))
                }
                Payload::FunctionSection(r) => {
                    (SectionCode::Function, r.range().start, SectionData::Function(r))
                }
                Payload::TableSection(r) => {
                    (SectionCode::Table, r.range().start, SectionData::Table(r))
                }
                Payload::MemorySection(r) => {
                    (SectionCode::Memory, r.range().start, SectionData::Memory(r))
                }
                Payload::GlobalSection(r) => {
                    (SectionCode::Global, r.range().start, SectionData::Global(r))
                }
                Payload::ExportSection(r) => {
                    (SectionCode::Export, r.range().start, SectionData::Export(r))
                }
                Payload::StartSection { func, range } => {
                    (SectionCode::Start, range.start, SectionData::Start(func))
                }
                Payload::ElementSection(r) => {
                    (SectionCode::Element, r.range().start, SectionData::Element(r))
                }
                Payload::DataCountSection { count, range } => {
                    (SectionCode::DataCount, range.start, SectionData::DataCount(count))
                }
                Payload::DataSection(r) => (SectionCode::Data, r.range().start, SectionData::Data(r)),
                Payload::CodeSectionStart { range, .. } => {
                    (SectionCode::Code, range.start, SectionData::Code(Vec::new()))
                }
                Payload::CodeSectionEntry(body) => {
                    if let Some(PendingSection { data: SectionData::Code(bodies), .. }) =
                        pending.back_mut()
                    {
                        bodies.push(body);
                    }
                    continue;
                }
                Payload::CustomSection(reader) => {
                    if let KnownCustom::Name(names) = reader.as_known() {
                        name_section = Some(PendingSection {
                            code: SectionCode::Name,
                            offset: reader.data_offset(),
                            data: SectionData::Name(names),
                        });
                    }
                    continue;
                }
                Payload::End(_) => break,
                other => {
                    return Err(CompileError::new(
                        ErrorKind::UnsupportedFeature,
                        format!("unsupported section {other:?}"),
                    ));
                }
            };
            pending.push_back(PendingSection { code, offset, data });
        }

        Ok(Self {
            options: options.clone(),
            pending,
            name_section,
            current: None,
            seen: [false; SectionCode::ORDER.len()],
            module: Module::default(),
            bodies: Vec::new(),
        })
    }

    /// Make the next section current if it has the requested code.
    ///
    /// Fails when the section's precedent has not been read.
    pub fn read_next_section(&mut self, code: SectionCode) -> CompileResult<bool> {
        let next = if code == SectionCode::Name {
            self.name_section.take()
        } else if self.pending.front().is_some_and(|s| s.code == code) {
            self.pending.pop_front()
        } else {
            None
        };
        let Some(section) = next else {
            return Ok(false);
        };
        if let Some(precedent) = code.precedent() {
            if !self.seen[precedent.index()] {
                return Err(CompileError::new(
                    ErrorKind::SectionOrder,
                    format!("{code} section requires a preceding {precedent} section"),
                )
                .at(section.offset));
            }
        }
        self.seen[code.index()] = true;
        self.current = Some(section);
        Ok(true)
    }

    /// Decode the current section into the module.
    pub fn process_current_section(&mut self) -> CompileResult<()> {
        let Some(section) = self.current.take() else {
            return Ok(());
        };
        debug!(section = section.code.name(), offset = section.offset, "reading section");
        match section.data {
            SectionData::Type(r) => self.read_types(r),
            SectionData::Import(r) => self.read_imports(r),
            SectionData::Function(r) => self.read_functions(r),
            SectionData::Table(r) => self.read_tables(r),
            SectionData::Memory(r) => self.read_memories(r),
            SectionData::Global(r) => self.read_globals(r),
            SectionData::Export(r) => self.read_exports(r),
            SectionData::Start(func) => {
                self.module.function(func).map_err(|e| e.at(section.offset))?;
                self.module.start = Some(func);
                Ok(())
            }
            SectionData::Element(r) => self.read_elements(r),
            SectionData::DataCount(count) => {
                self.module.data_count = Some(count);
                Ok(())
            }
            SectionData::Code(bodies) => self.read_code(bodies, section.offset),
            SectionData::Data(r) => self.read_data(r),
            SectionData::Name(r) => self.read_names(r),
        }
    }

    /// Check the walk left nothing behind and freeze the module.
    pub fn finish(mut self) -> CompileResult<ParsedModule<'a>> {
        if let Some(section) = self.pending.front() {
            return Err(CompileError::new(
                ErrorKind::SectionOrder,
                format!("{} section is out of order or duplicated", section.code),
            )
            .at(section.offset));
        }
        if self.seen[SectionCode::Function.index()] && !self.seen[SectionCode::Code.index()] {
            return Err(CompileError::new(
                ErrorKind::MissingSection,
                "function section declared without a code section",
            ));
        }
        self.module.layout = EnvironmentLayout::new(
            self.module.functions.len() as u32,
            self.module.globals.len() as u32,
        );
        Ok(ParsedModule {
            module: self.module,
            bodies: self.bodies,
        })
    }

    // ── Type section ─────────────────────────────────────────────────────

    fn read_types(&mut self, reader: wasmparser::TypeSectionReader<'a>) -> CompileResult<()> {
        for (id, ty) in reader.into_iter_err_on_gc_types().enumerate() {
            let ty = ty.map_err(malformed)?;
            let params = ty
                .params()
                .iter()
                .map(|p| value_type(*p))
                .collect::<CompileResult<Vec<_>>>()?;
            let result = match ty.results() {
                [] => None,
                [r] => Some(value_type(*r)?),
                _ => {
                    return Err(CompileError::new(
                        ErrorKind::UnsupportedFeature,
                        format!("signature {id}: multiple results are not supported"),
                    ))
                }
            };
            let sig = Signature::new(id as u32, params, result, self.options.pointer_width)?;
            self.module.signatures.push(sig);
        }
        Ok(())
    }

    // ── Import section ───────────────────────────────────────────────────

    fn read_imports(&mut self, reader: wasmparser::ImportSectionReader<'a>) -> CompileResult<()> {
        for import in reader {
            let import = import.map_err(malformed)?;
            let kind = match import.ty {
                TypeRef::Func(signature) => {
                    self.module.signature(signature)?;
                    let index = self.module.functions.len() as u32;
                    self.module.functions.push(FunctionInfo {
                        index,
                        signature,
                        import: Some((import.module.to_string(), import.name.to_string())),
                        name: None,
                        locals: Vec::new(),
                        body: None,
                    });
                    self.module.import_function_count += 1;
                    ImportKind::Function { index, signature }
                }
                TypeRef::Table(table) => {
                    let index = self.module.tables.len() as u32;
                    self.push_table(table, true)?;
                    ImportKind::Table { index }
                }
                TypeRef::Memory(memory) => {
                    let index = self.module.memories.len() as u32;
                    self.push_memory(memory, true)?;
                    ImportKind::Memory { index }
                }
                TypeRef::Global(global) => {
                    let index = self.module.globals.len() as u32;
                    self.module.globals.push(GlobalDesc {
                        ty: value_type(global.content_type)?,
                        mutable: global.mutable,
                        init: None,
                    });
                    self.module.import_global_count += 1;
                    ImportKind::Global { index }
                }
                other => {
                    return Err(CompileError::new(
                        ErrorKind::UnsupportedFeature,
                        format!("import {}.{}: {other:?} is not supported", import.module, import.name),
                    ))
                }
            };
            self.module.imports.push(Import {
                module: import.module.to_string(),
                field: import.name.to_string(),
                kind,
            });
        }
        Ok(())
    }

    // ── Function section ─────────────────────────────────────────────────

    fn read_functions(&mut self, reader: wasmparser::FunctionSectionReader<'a>) -> CompileResult<()> {
        for signature in reader {
            let signature = signature.map_err(malformed)?;
            self.module.signature(signature)?;
            let index = self.module.functions.len() as u32;
            self.module.functions.push(FunctionInfo {
                index,
                signature,
                import: None,
                name: None,
                locals: Vec::new(),
                body: None,
            });
        }
        Ok(())
    }

    // ── Table and memory sections ────────────────────────────────────────

    fn read_tables(&mut self, reader: wasmparser::TableSectionReader<'a>) -> CompileResult<()> {
        for table in reader {
            let table = table.map_err(malformed)?;
            if !matches!(table.init, wasmparser::TableInit::RefNull) {
                return Err(CompileError::new(
                    ErrorKind::UnsupportedFeature,
                    "table initializer expressions are not supported",
                ));
            }
            self.push_table(table.ty, false)?;
        }
        Ok(())
    }

    fn push_table(&mut self, table: wasmparser::TableType, imported: bool) -> CompileResult<()> {
        if table.element_type != RefType::FUNCREF {
            return Err(CompileError::new(
                ErrorKind::UnsupportedType,
                format!("table element type {:?} is not supported", table.element_type),
            ));
        }
        if !self.module.tables.is_empty() {
            return Err(CompileError::new(
                ErrorKind::UnsupportedFeature,
                "multiple tables are not supported",
            ));
        }
        let initial = limit(table.initial, "table")?;
        let maximum = table.maximum.map(|m| limit(m, "table")).transpose()?;
        self.module.tables.push(LimitsDesc { initial, maximum, imported });
        Ok(())
    }

    fn read_memories(&mut self, reader: wasmparser::MemorySectionReader<'a>) -> CompileResult<()> {
        for memory in reader {
            let memory = memory.map_err(malformed)?;
            self.push_memory(memory, false)?;
        }
        Ok(())
    }

    fn push_memory(&mut self, memory: wasmparser::MemoryType, imported: bool) -> CompileResult<()> {
        if memory.memory64 || memory.shared {
            return Err(CompileError::new(
                ErrorKind::UnsupportedFeature,
                "64-bit and shared memories are not supported",
            ));
        }
        if !self.module.memories.is_empty() {
            return Err(CompileError::new(
                ErrorKind::UnsupportedFeature,
                "multiple memories are not supported",
            ));
        }
        let initial = limit(memory.initial, "memory")?;
        let maximum = memory.maximum.map(|m| limit(m, "memory")).transpose()?;
        self.module.memories.push(LimitsDesc { initial, maximum, imported });
        Ok(())
    }

    // ── Global section ───────────────────────────────────────────────────

    fn read_globals(&mut self, reader: wasmparser::GlobalSectionReader<'a>) -> CompileResult<()> {
        for global in reader {
            let global = global.map_err(malformed)?;
            let ty = value_type(global.ty.content_type)?;
            let init = self.init_expr(&global.init_expr, ty)?;
            self.module.globals.push(GlobalDesc {
                ty,
                mutable: global.ty.mutable,
                init: Some(init),
            });
        }
        Ok(())
    }

    /// Decode a constant expression of the expected type.
    fn init_expr(&self, expr: &ConstExpr<'a>, expected: ValueType) -> CompileResult<InitExpr> {
        let mut ops = expr.get_operators_reader();
        let offset = ops.original_position();
        let (init, ty) = match ops.read().map_err(malformed)? {
            Operator::I32Const { value } => (InitExpr::Const(Literal::I32(value)), ValueType::I32),
            Operator::I64Const { value } => (InitExpr::Const(Literal::I64(value)), ValueType::I64),
            Operator::F32Const { value } => {
                (InitExpr::Const(Literal::F32(value.bits())), ValueType::F32)
            }
            Operator::F64Const { value } => {
                (InitExpr::Const(Literal::F64(value.bits())), ValueType::F64)
            }
            Operator::GlobalGet { global_index } => {
                if global_index >= self.module.import_global_count {
                    return Err(CompileError::new(
                        ErrorKind::InvalidGlobalIndex,
                        format!("constant expression reads non-imported global {global_index}"),
                    )
                    .at(offset));
                }
                let ty = self.module.global(global_index)?.ty;
                (InitExpr::Global(global_index), ty)
            }
            other => {
                return Err(CompileError::new(
                    ErrorKind::UnsupportedOperator,
                    format!("{other:?} is not allowed in a constant expression"),
                )
                .at(offset))
            }
        };
        if !matches!(ops.read().map_err(malformed)?, Operator::End) {
            return Err(CompileError::new(
                ErrorKind::UnsupportedFeature,
                "extended constant expressions are not supported",
            )
            .at(offset));
        }
        if ty != expected {
            return Err(CompileError::new(
                ErrorKind::OperandTypeMismatch,
                format!("constant expression has type {ty}, expected {expected}"),
            )
            .at(offset));
        }
        Ok(init)
    }

    // ── Export section ───────────────────────────────────────────────────

    fn read_exports(&mut self, reader: wasmparser::ExportSectionReader<'a>) -> CompileResult<()> {
        for export in reader {
            let export = export.map_err(malformed)?;
            let kind = match export.kind {
                ExternalKind::Func => {
                    self.module.function(export.index)?;
                    ExportKind::Function
                }
                ExternalKind::Table => {
                    self.module.require_table(export.index)?;
                    ExportKind::Table
                }
                ExternalKind::Memory => {
                    self.module.require_memory(export.index)?;
                    ExportKind::Memory
                }
                ExternalKind::Global => {
                    self.module.global(export.index)?;
                    ExportKind::Global
                }
                other => {
                    return Err(CompileError::new(
                        ErrorKind::UnsupportedFeature,
                        format!("export {}: {other:?} exports are not supported", export.name),
                    ))
                }
            };
            self.module.exports.push(Export {
                name: export.name.to_string(),
                kind,
                index: export.index,
            });
        }
        Ok(())
    }

    // ── Element section ──────────────────────────────────────────────────

    fn read_elements(&mut self, reader: wasmparser::ElementSectionReader<'a>) -> CompileResult<()> {
        for segment in reader {
            let segment = segment.map_err(malformed)?;
            let (table, offset) = match segment.kind {
                ElementKind::Active { table_index, offset_expr } => {
                    let table = table_index.unwrap_or(0);
                    self.module.require_table(table)?;
                    (table, self.init_expr(&offset_expr, ValueType::I32)?)
                }
                _ => {
                    return Err(CompileError::new(
                        ErrorKind::UnsupportedFeature,
                        "passive and declarative element segments are not supported",
                    ))
                }
            };
            let mut functions = Vec::new();
            match segment.items {
                ElementItems::Functions(indices) => {
                    for index in indices {
                        functions.push(index.map_err(malformed)?);
                    }
                }
                ElementItems::Expressions(_, exprs) => {
                    for expr in exprs {
                        let expr = expr.map_err(malformed)?;
                        let mut ops = expr.get_operators_reader();
                        match ops.read().map_err(malformed)? {
                            Operator::RefFunc { function_index } => functions.push(function_index),
                            other => {
                                return Err(CompileError::new(
                                    ErrorKind::UnsupportedOperator,
                                    format!("{other:?} is not allowed in an element segment"),
                                ))
                            }
                        }
                    }
                }
            }
            for &index in &functions {
                self.module.function(index)?;
            }
            self.module.elements.push(ElementSegment { table, offset, functions });
        }
        Ok(())
    }

    // ── Code section ─────────────────────────────────────────────────────

    fn read_code(&mut self, bodies: Vec<FunctionBody<'a>>, offset: usize) -> CompileResult<()> {
        let defined = self.module.functions.len() - self.module.import_function_count as usize;
        if bodies.len() != defined {
            return Err(CompileError::new(
                ErrorKind::MalformedBinary,
                format!(
                    "code section has {} bodies but {defined} functions were declared",
                    bodies.len()
                ),
            )
            .at(offset));
        }
        let first = self.module.import_function_count as usize;
        for (i, body) in bodies.iter().enumerate() {
            let info = &mut self.module.functions[first + i];
            let range = body.range();
            info.body = Some(BodyLocation {
                offset: range.start,
                size: range.end - range.start,
            });
            let mut total: u64 = 0;
            let locals = body.get_locals_reader().map_err(malformed)?;
            for entry in locals {
                let (count, ty) = entry.map_err(malformed)?;
                total += u64::from(count);
                if total > u64::from(self.options.max_locals) {
                    return Err(CompileError::new(
                        ErrorKind::SizeOverflow,
                        format!(
                            "function {} declares more than {} locals",
                            info.index, self.options.max_locals
                        ),
                    )
                    .at(range.start));
                }
                let ty = value_type(ty)?;
                info.locals.extend(std::iter::repeat(ty).take(count as usize));
            }
        }
        self.bodies = bodies;
        Ok(())
    }

    // ── Data section ─────────────────────────────────────────────────────

    fn read_data(&mut self, reader: wasmparser::DataSectionReader<'a>) -> CompileResult<()> {
        for segment in reader {
            let segment = segment.map_err(malformed)?;
            match segment.kind {
                DataKind::Active { memory_index, offset_expr } => {
                    self.module.require_memory(memory_index)?;
                    let offset = self.init_expr(&offset_expr, ValueType::I32)?;
                    self.module.data.push(DataSegment {
                        memory: memory_index,
                        offset,
                        bytes: segment.data.to_vec(),
                    });
                }
                DataKind::Passive => {
                    return Err(CompileError::new(
                        ErrorKind::UnsupportedFeature,
                        "passive data segments are not supported",
                    ))
                }
            }
        }
        Ok(())
    }

    // ── Name section ─────────────────────────────────────────────────────

    fn read_names(&mut self, reader: wasmparser::NameSectionReader<'a>) -> CompileResult<()> {
        for subsection in reader {
            if let Name::Function(map) = subsection.map_err(malformed)? {
                for naming in map {
                    let naming = naming.map_err(malformed)?;
                    match self.module.functions.get_mut(naming.index as usize) {
                        Some(info) => info.name = Some(naming.name.to_string()),
                        None => debug!(index = naming.index, "name for unknown function ignored"),
                    }
                }
            }
        }
        Ok(())
    }
}

/// Convert a declared limit to 32 bits.
fn limit(value: impl Into<u64>, what: &str) -> CompileResult<u32> {
    let value: u64 = value.into();
    u32::try_from(value).map_err(|_| {
        CompileError::new(ErrorKind::SizeOverflow, format!("{what} limit {value} exceeds 32 bits"))
    })
}

/// A fully read module with its still-encoded function bodies.
pub struct ParsedModule<'a> {
    pub module: Module,
    bodies: Vec<FunctionBody<'a>>,
}

impl<'a> ParsedModule<'a> {
    /// Read every section of `bytes` in canonical order.
    pub fn parse(bytes: &'a [u8], options: &CompileOptions) -> CompileResult<Self> {
        let mut reader = ModuleReader::new(bytes, options)?;
        for code in SectionCode::ORDER {
            if reader.read_next_section(code)? {
                reader.process_current_section()?;
            }
        }
        reader.finish()
    }

    /// Open a cursor on the body of a function in the function index space.
    pub fn seek_to_function_body(&self, index: u32) -> CompileResult<FunctionBodyReader<'a>> {
        let info = self.module.function(index)?;
        if info.is_import() {
            return Err(CompileError::new(
                ErrorKind::InvalidFunctionIndex,
                format!("function {index} is imported and has no body"),
            ));
        }
        let body = self
            .bodies
            .get((index - self.module.import_function_count) as usize)
            .ok_or_else(|| {
                CompileError::new(
                    ErrorKind::InvalidFunctionIndex,
                    format!("function {index} has no body"),
                )
            })?;
        FunctionBodyReader::new(body, self.module.import_function_count)
    }
}
