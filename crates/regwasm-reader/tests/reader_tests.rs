//! Integration tests for the regwasm module reader.
//!
//! Tests validate:
//! - A module with every supported section reads into the data model
//! - Section ordering and precedent rules
//! - Structural limits (multi-value, multiple memories, local caps)
//! - The function body cursor and its immediates

use std::borrow::Cow;

use regwasm_reader::{
    BlockSig, CallKind, ExprReader, ImportKind, InitExpr, ParsedModule,
};
use regwasm_types::{CompileOptions, ErrorKind, Literal, ValueType, WasmOp};
use wasm_encoder::{
    CodeSection, ConstExpr, DataSection, ElementSection, Elements, EntityType, ExportKind,
    ExportSection, Function, FunctionSection, GlobalSection, GlobalType, ImportSection,
    Instruction, MemorySection, MemoryType, Module, NameMap, NameSection, RawSection, RefType,
    TableSection, TableType, TypeSection, ValType,
};

// ══════════════════════════════════════════════════════════════════════════════
// Helpers
// ══════════════════════════════════════════════════════════════════════════════

fn parse(bytes: &[u8]) -> ParsedModule<'_> {
    ParsedModule::parse(bytes, &CompileOptions::default())
        .unwrap_or_else(|e| panic!("read failed: {e}"))
}

fn parse_err(bytes: &[u8]) -> ErrorKind {
    match ParsedModule::parse(bytes, &CompileOptions::default()) {
        Ok(_) => panic!("expected the module to be rejected"),
        Err(e) => e.kind,
    }
}

/// `(i32, i32) -> i32` at index 0, `() -> ()` at index 1.
fn types() -> TypeSection {
    let mut types = TypeSection::new();
    types.ty().function([ValType::I32, ValType::I32], [ValType::I32]);
    types.ty().function([], []);
    types
}

fn memory(minimum: u64) -> MemoryType {
    MemoryType {
        minimum,
        maximum: None,
        memory64: false,
        shared: false,
        page_size_log2: None,
    }
}

fn body(locals: Vec<(u32, ValType)>, instrs: &[Instruction<'_>]) -> Function {
    let mut f = Function::new(locals);
    for instr in instrs {
        f.instruction(instr);
    }
    f
}

fn single_function(instrs: &[Instruction<'_>]) -> Vec<u8> {
    let mut module = Module::new();
    module.section(&types());
    let mut functions = FunctionSection::new();
    functions.function(0);
    module.section(&functions);
    let mut code = CodeSection::new();
    code.function(&body(vec![(1, ValType::I64)], instrs));
    module.section(&code);
    module.finish()
}

/// Module exercising every section kind the reader understands.
fn full_module() -> Vec<u8> {
    let mut module = Module::new();
    module.section(&types());

    let mut imports = ImportSection::new();
    imports.import("env", "log", EntityType::Function(1));
    imports.import(
        "env",
        "base",
        EntityType::Global(GlobalType {
            val_type: ValType::I32,
            mutable: false,
            shared: false,
        }),
    );
    module.section(&imports);

    let mut functions = FunctionSection::new();
    functions.function(0);
    functions.function(1);
    module.section(&functions);

    let mut tables = TableSection::new();
    tables.table(TableType {
        element_type: RefType::FUNCREF,
        table64: false,
        minimum: 2,
        maximum: Some(2),
        shared: false,
    });
    module.section(&tables);

    let mut memories = MemorySection::new();
    memories.memory(memory(1));
    module.section(&memories);

    let mut globals = GlobalSection::new();
    globals.global(
        GlobalType {
            val_type: ValType::I64,
            mutable: true,
            shared: false,
        },
        &ConstExpr::i64_const(-7),
    );
    globals.global(
        GlobalType {
            val_type: ValType::I32,
            mutable: false,
            shared: false,
        },
        &ConstExpr::global_get(0),
    );
    module.section(&globals);

    let mut exports = ExportSection::new();
    exports.export("add", ExportKind::Func, 1);
    exports.export("mem", ExportKind::Memory, 0);
    module.section(&exports);

    let mut elements = ElementSection::new();
    elements.active(
        Some(0),
        &ConstExpr::i32_const(0),
        Elements::Functions(Cow::Borrowed(&[1, 2])),
    );
    module.section(&elements);

    let mut code = CodeSection::new();
    code.function(&body(
        vec![(2, ValType::F64)],
        &[
            Instruction::LocalGet(0),
            Instruction::LocalGet(1),
            Instruction::I32Add,
            Instruction::End,
        ],
    ));
    code.function(&body(vec![], &[Instruction::Call(0), Instruction::End]));
    module.section(&code);

    let mut data = DataSection::new();
    data.active(0, &ConstExpr::i32_const(16), b"hi".iter().copied());
    module.section(&data);

    let mut names = NameMap::new();
    names.append(1, "adder");
    let mut name_section = NameSection::new();
    name_section.functions(&names);
    module.section(&name_section);

    module.finish()
}

// ══════════════════════════════════════════════════════════════════════════════
// Module data model
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn reads_every_section() {
    let bytes = full_module();
    let parsed = parse(&bytes);
    let module = &parsed.module;

    assert_eq!(module.signatures.len(), 2);
    assert_eq!(module.signatures[0].params, vec![ValueType::I32, ValueType::I32]);
    assert_eq!(module.signatures[1].result, None);

    assert_eq!(module.imports.len(), 2);
    assert_eq!(module.imports[0].kind, ImportKind::Function { index: 0, signature: 1 });
    assert_eq!(module.imports[1].kind, ImportKind::Global { index: 0 });
    assert_eq!(module.import_function_count, 1);
    assert_eq!(module.functions.len(), 3);
    assert!(module.functions[0].is_import());
    assert_eq!(module.functions[1].locals, vec![ValueType::F64, ValueType::F64]);
    assert!(module.functions[1].body.is_some());

    assert_eq!(module.tables[0].initial, 2);
    assert_eq!(module.memories[0].initial, 1);
    assert_eq!(module.globals.len(), 3);
    assert_eq!(module.globals[1].init, Some(InitExpr::Const(Literal::I64(-7))));
    assert_eq!(module.globals[2].init, Some(InitExpr::Global(0)));

    assert_eq!(module.exported_function("add"), Some(1));
    assert_eq!(module.export_name_for_function(1), Some("add"));
    assert_eq!(module.elements[0].functions, vec![1, 2]);
    assert_eq!(module.data[0].bytes, b"hi".to_vec());
    assert_eq!(module.data[0].offset, InitExpr::Const(Literal::I32(16)));
    assert_eq!(module.functions[1].name.as_deref(), Some("adder"));
}

#[test]
fn layout_places_table_between_functions_and_globals() {
    let bytes = full_module();
    let layout = parse(&bytes).module.layout;
    assert_eq!(layout.memory_slot, 0);
    assert_eq!(layout.function_slot(0), 1);
    assert_eq!(layout.table_slot, 4);
    assert_eq!(layout.global_slot(0), 5);
    assert_eq!(layout.size, 8);
}

#[test]
fn empty_module_reads() {
    let bytes = Module::new().finish();
    let parsed = parse(&bytes);
    assert!(parsed.module.functions.is_empty());
    assert_eq!(parsed.module.layout.size, 2);
}

// ══════════════════════════════════════════════════════════════════════════════
// Section ordering
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn section_after_code_is_out_of_order() {
    let mut bytes = single_function(&[Instruction::End]);
    let mut tail = Module::new();
    tail.section(&RawSection { id: 7, data: &[0] });
    // Drop the second module header, keeping only the raw export section.
    bytes.extend_from_slice(&tail.finish()[8..]);
    assert_eq!(parse_err(&bytes), ErrorKind::SectionOrder);
}

#[test]
fn duplicate_type_section_is_out_of_order() {
    let mut module = Module::new();
    module.section(&types());
    module.section(&types());
    assert_eq!(parse_err(&module.finish()), ErrorKind::SectionOrder);
}

#[test]
fn code_requires_function_section() {
    let mut module = Module::new();
    module.section(&types());
    module.section(&CodeSection::new());
    assert_eq!(parse_err(&module.finish()), ErrorKind::SectionOrder);
}

#[test]
fn function_requires_type_section() {
    let mut functions = FunctionSection::new();
    functions.function(0);
    let mut module = Module::new();
    module.section(&functions);
    assert_eq!(parse_err(&module.finish()), ErrorKind::SectionOrder);
}

#[test]
fn function_without_code_is_missing_section() {
    let mut functions = FunctionSection::new();
    functions.function(0);
    let mut module = Module::new();
    module.section(&types());
    module.section(&functions);
    assert_eq!(parse_err(&module.finish()), ErrorKind::MissingSection);
}

#[test]
fn body_count_must_match_declarations() {
    let mut functions = FunctionSection::new();
    functions.function(1);
    functions.function(1);
    let mut code = CodeSection::new();
    code.function(&body(vec![], &[Instruction::End]));
    let mut module = Module::new();
    module.section(&types());
    module.section(&functions);
    module.section(&code);
    assert_eq!(parse_err(&module.finish()), ErrorKind::MalformedBinary);
}

// ══════════════════════════════════════════════════════════════════════════════
// Structural limits
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn multi_value_signature_is_unsupported() {
    let mut types = TypeSection::new();
    types.ty().function([], [ValType::I32, ValType::I32]);
    let mut module = Module::new();
    module.section(&types);
    assert_eq!(parse_err(&module.finish()), ErrorKind::UnsupportedFeature);
}

#[test]
fn import_with_unknown_signature_is_rejected() {
    let mut imports = ImportSection::new();
    imports.import("env", "f", EntityType::Function(9));
    let mut module = Module::new();
    module.section(&types());
    module.section(&imports);
    assert_eq!(parse_err(&module.finish()), ErrorKind::InvalidSignatureIndex);
}

#[test]
fn second_memory_is_unsupported() {
    let mut memories = MemorySection::new();
    memories.memory(memory(1));
    memories.memory(memory(1));
    let mut module = Module::new();
    module.section(&memories);
    assert_eq!(parse_err(&module.finish()), ErrorKind::UnsupportedFeature);
}

#[test]
fn global_init_may_only_read_imported_globals() {
    let mut globals = GlobalSection::new();
    let ty = GlobalType {
        val_type: ValType::I32,
        mutable: false,
        shared: false,
    };
    globals.global(ty, &ConstExpr::i32_const(1));
    globals.global(ty, &ConstExpr::global_get(0));
    let mut module = Module::new();
    module.section(&globals);
    assert_eq!(parse_err(&module.finish()), ErrorKind::InvalidGlobalIndex);
}

#[test]
fn global_init_type_must_match() {
    let mut globals = GlobalSection::new();
    globals.global(
        GlobalType {
            val_type: ValType::F32,
            mutable: false,
            shared: false,
        },
        &ConstExpr::i32_const(1),
    );
    let mut module = Module::new();
    module.section(&globals);
    assert_eq!(parse_err(&module.finish()), ErrorKind::OperandTypeMismatch);
}

#[test]
fn locals_are_capped() {
    let mut functions = FunctionSection::new();
    functions.function(1);
    let mut code = CodeSection::new();
    code.function(&body(vec![(3, ValType::I32), (3, ValType::F32)], &[Instruction::End]));
    let mut module = Module::new();
    module.section(&types());
    module.section(&functions);
    module.section(&code);
    let bytes = module.finish();

    let options = CompileOptions {
        max_locals: 4,
        ..CompileOptions::default()
    };
    let err = ParsedModule::parse(&bytes, &options).err().map(|e| e.kind);
    assert_eq!(err, Some(ErrorKind::SizeOverflow));
    assert!(ParsedModule::parse(&bytes, &CompileOptions::default()).is_ok());
}

#[test]
fn start_function_must_exist() {
    let mut module = Module::new();
    module.section(&types());
    module.section(&wasm_encoder::StartSection { function_index: 3 });
    assert_eq!(parse_err(&module.finish()), ErrorKind::InvalidFunctionIndex);
}

// ══════════════════════════════════════════════════════════════════════════════
// Function body cursor
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn cursor_decodes_operators_and_immediates() {
    let bytes = full_module();
    let parsed = parse(&bytes);
    let mut reader = parsed.seek_to_function_body(1).expect("body");

    assert_eq!(reader.read_expr().unwrap(), WasmOp::LocalGet);
    assert_eq!(reader.current_node().index, 0);
    assert_eq!(reader.read_expr().unwrap(), WasmOp::LocalGet);
    assert_eq!(reader.current_node().index, 1);
    assert_eq!(reader.read_expr().unwrap(), WasmOp::I32Add);
    assert!(!reader.is_current_function_completed());
    assert_eq!(reader.read_expr().unwrap(), WasmOp::End);
    assert!(reader.is_current_function_completed());

    let err = reader.read_expr().unwrap_err();
    assert_eq!(err.kind, ErrorKind::TruncatedOrOverlongFunctionBody);
}

#[test]
fn cursor_tags_import_calls() {
    let bytes = full_module();
    let parsed = parse(&bytes);
    let mut reader = parsed.seek_to_function_body(2).expect("body");
    assert_eq!(reader.read_expr().unwrap(), WasmOp::Call);
    assert_eq!(reader.current_node().call_kind, CallKind::Import);
    assert_eq!(reader.current_node().index, 0);
}

#[test]
fn imported_function_has_no_body() {
    let bytes = full_module();
    let parsed = parse(&bytes);
    let err = parsed.seek_to_function_body(0).err().map(|e| e.kind);
    assert_eq!(err, Some(ErrorKind::InvalidFunctionIndex));
    let err = parsed.seek_to_function_body(7).err().map(|e| e.kind);
    assert_eq!(err, Some(ErrorKind::InvalidFunctionIndex));
}

#[test]
fn cursor_reads_block_signatures_and_tables() {
    let bytes = single_function(&[
        Instruction::Block(wasm_encoder::BlockType::Result(ValType::F32)),
        Instruction::I32Const(1),
        Instruction::BrTable(Cow::Borrowed(&[0, 1]), 0),
        Instruction::End,
        Instruction::I64Const(-3),
        Instruction::End,
    ]);
    let parsed = parse(&bytes);
    let mut reader = parsed.seek_to_function_body(0).expect("body");

    assert_eq!(reader.read_expr().unwrap(), WasmOp::Block);
    assert_eq!(reader.current_node().block, BlockSig::Value(ValueType::F32));
    assert_eq!(reader.read_expr().unwrap(), WasmOp::I32Const);
    assert_eq!(reader.current_node().literal, Literal::I32(1));
    assert_eq!(reader.read_expr().unwrap(), WasmOp::BrTable);
    assert_eq!(reader.current_node().targets, vec![0, 1]);
    assert_eq!(reader.current_node().default_target, 0);
    assert_eq!(reader.read_expr().unwrap(), WasmOp::End);
    assert_eq!(reader.read_expr().unwrap(), WasmOp::I64Const);
    assert_eq!(reader.current_node().literal, Literal::I64(-3));
}

#[test]
fn cursor_reports_memory_immediates() {
    let bytes = single_function(&[
        Instruction::I32Const(0),
        Instruction::I32Load8U(wasm_encoder::MemArg {
            offset: 12,
            align: 0,
            memory_index: 0,
        }),
        Instruction::End,
    ]);
    let parsed = parse(&bytes);
    let mut reader = parsed.seek_to_function_body(0).expect("body");
    reader.read_expr().unwrap();
    assert_eq!(reader.read_expr().unwrap(), WasmOp::I32Load8U);
    assert_eq!(reader.current_node().mem.offset, 12);
}

#[test]
fn unknown_operator_is_unsupported() {
    let bytes = single_function(&[Instruction::TableSize(0), Instruction::End]);
    let parsed = parse(&bytes);
    let mut reader = parsed.seek_to_function_body(0).expect("body");
    let err = reader.read_expr().unwrap_err();
    assert_eq!(err.kind, ErrorKind::UnsupportedOperator);
    assert!(err.message.contains("TableSize"), "{}", err.message);
}

#[test]
fn body_location_covers_encoded_body() {
    let bytes = single_function(&[Instruction::Nop, Instruction::End]);
    let parsed = parse(&bytes);
    let reader = parsed.seek_to_function_body(0).expect("body");
    let location = reader.body_location();
    assert_eq!(parsed.module.functions[0].body, Some(location));
    // locals vector (1 entry) + nop + end
    assert_eq!(location.size, 5);
}
