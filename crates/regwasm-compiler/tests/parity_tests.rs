//! Differential tests: translated bytecode against `wasmi`.
//!
//! Each module is instantiated twice, once in `wasmi` straight from the
//! binary and once through regwasm (translation + reference interpreter).
//! Every exported function is called with the same arguments on both and
//! the outcomes must agree: equal results (NaNs match any NaN) or a trap on
//! both sides.

use regwasm_eval::{Imports, Instance, Value};
use regwasm_types::{CompileOptions, PointerWidth};
use wasm_encoder::{
    BlockType, CodeSection, ConstExpr, ElementSection, Elements, EntityType, ExportKind,
    ExportSection, Function, FunctionSection, GlobalSection, GlobalType, ImportSection,
    Instruction as I, MemArg, MemorySection, MemoryType, Module, RefType, TableSection, TableType,
    TypeSection, ValType,
};

const I32: ValType = ValType::I32;
const I64: ValType = ValType::I64;
const F32: ValType = ValType::F32;
const F64: ValType = ValType::F64;

// ══════════════════════════════════════════════════════════════════════════════
// Module builder
// ══════════════════════════════════════════════════════════════════════════════

/// One imported function (`env.scale`), one memory, one table, one mutable
/// global, and whatever functions the test adds.
struct ParityModule {
    types: Vec<(Vec<ValType>, Vec<ValType>)>,
    functions: FunctionSection,
    code: CodeSection,
    exports: ExportSection,
    next_index: u32,
    elements: Vec<u32>,
}

impl ParityModule {
    fn new() -> Self {
        let mut m = Self {
            types: Vec::new(),
            functions: FunctionSection::new(),
            code: CodeSection::new(),
            exports: ExportSection::new(),
            next_index: 1,
            elements: Vec::new(),
        };
        // Type 0 is the import's signature.
        m.ty(&[I32], &[I32]);
        m
    }

    fn ty(&mut self, params: &[ValType], results: &[ValType]) -> u32 {
        let sig = (params.to_vec(), results.to_vec());
        match self.types.iter().position(|t| *t == sig) {
            Some(index) => index as u32,
            None => {
                self.types.push(sig);
                self.types.len() as u32 - 1
            }
        }
    }

    /// Add a function; `body` excludes the final `end`.
    fn func(
        &mut self,
        name: &str,
        params: &[ValType],
        results: &[ValType],
        locals: Vec<(u32, ValType)>,
        body: &[I<'_>],
    ) -> u32 {
        let mut f = Function::new(locals);
        for instr in body {
            f.instruction(instr);
        }
        f.instruction(&I::End);
        self.raw_func(name, params, results, f)
    }

    fn raw_func(&mut self, name: &str, params: &[ValType], results: &[ValType], f: Function) -> u32 {
        let ty = self.ty(params, results);
        let index = self.next_index;
        self.functions.function(ty);
        self.code.function(&f);
        if !name.is_empty() {
            self.exports.export(name, ExportKind::Func, index);
        }
        self.next_index += 1;
        index
    }

    fn finish(self) -> Vec<u8> {
        let mut types = TypeSection::new();
        for (params, results) in &self.types {
            types
                .ty()
                .function(params.iter().copied(), results.iter().copied());
        }
        let mut imports = ImportSection::new();
        imports.import("env", "scale", EntityType::Function(0));

        let mut tables = TableSection::new();
        tables.table(TableType {
            element_type: RefType::FUNCREF,
            table64: false,
            minimum: 4,
            maximum: None,
            shared: false,
        });
        let mut memories = MemorySection::new();
        memories.memory(MemoryType {
            minimum: 1,
            maximum: Some(3),
            memory64: false,
            shared: false,
            page_size_log2: None,
        });
        let mut globals = GlobalSection::new();
        globals.global(
            GlobalType {
                val_type: I32,
                mutable: true,
                shared: false,
            },
            &ConstExpr::i32_const(100),
        );
        let mut elements = ElementSection::new();
        if !self.elements.is_empty() {
            elements.active(
                Some(0),
                &ConstExpr::i32_const(0),
                Elements::Functions(self.elements.clone().into()),
            );
        }

        let mut module = Module::new();
        module.section(&types);
        module.section(&imports);
        module.section(&self.functions);
        module.section(&tables);
        module.section(&memories);
        module.section(&globals);
        module.section(&self.exports);
        if !self.elements.is_empty() {
            module.section(&elements);
        }
        module.section(&self.code);
        module.finish()
    }
}

fn mem(offset: u64, align: u32) -> MemArg {
    MemArg {
        offset,
        align,
        memory_index: 0,
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Harness
// ══════════════════════════════════════════════════════════════════════════════

/// Argument tuples that both engines accept.
trait Args: wasmi::WasmParams + Copy {
    fn to_values(&self) -> Vec<Value>;
}

impl Args for (i32,) {
    fn to_values(&self) -> Vec<Value> {
        vec![self.0.into()]
    }
}

impl Args for (i32, i32) {
    fn to_values(&self) -> Vec<Value> {
        vec![self.0.into(), self.1.into()]
    }
}

impl Args for (i64,) {
    fn to_values(&self) -> Vec<Value> {
        vec![self.0.into()]
    }
}

impl Args for (i64, i64) {
    fn to_values(&self) -> Vec<Value> {
        vec![self.0.into(), self.1.into()]
    }
}

impl Args for (f32,) {
    fn to_values(&self) -> Vec<Value> {
        vec![self.0.into()]
    }
}

impl Args for (f32, f32) {
    fn to_values(&self) -> Vec<Value> {
        vec![self.0.into(), self.1.into()]
    }
}

impl Args for (f64,) {
    fn to_values(&self) -> Vec<Value> {
        vec![self.0.into()]
    }
}

impl Args for (f64, f64) {
    fn to_values(&self) -> Vec<Value> {
        vec![self.0.into(), self.1.into()]
    }
}

struct Harness {
    store: wasmi::Store<()>,
    instance: wasmi::Instance,
    ours: Instance,
}

impl Harness {
    fn new(bytes: &[u8]) -> Self {
        Self::with_options(bytes, &CompileOptions::default())
    }

    fn with_options(bytes: &[u8], options: &CompileOptions) -> Self {
        let engine = wasmi::Engine::default();
        let module = wasmi::Module::new(&engine, bytes).expect("wasmi rejected the module");
        let mut store = wasmi::Store::new(&engine, ());
        let mut linker = <wasmi::Linker<()>>::new(&engine);
        linker
            .func_wrap(
                "env",
                "scale",
                |_caller: wasmi::Caller<'_, ()>, x: i32| -> i32 { x.wrapping_mul(3) },
            )
            .expect("link scale");
        let instance = linker
            .instantiate(&mut store, &module)
            .expect("instantiation failed")
            .start(&mut store)
            .expect("start failed");

        let imports = Imports::new().func("env", "scale", |args| {
            Ok(Some(Value::I32(args[0].as_i32()?.wrapping_mul(3))))
        });
        let ours = Instance::from_bytes(bytes, options, imports)
            .unwrap_or_else(|e| panic!("regwasm instantiation failed: {e}"));

        Self {
            store,
            instance,
            ours,
        }
    }

    /// Call `name` on both engines and compare the outcomes.
    fn check<P: Args, R: wasmi::WasmResults + Into<Value>>(&mut self, name: &str, args: P) {
        let values = args.to_values();
        let expected: Option<Value> = self
            .instance
            .get_typed_func::<P, R>(&self.store, name)
            .unwrap_or_else(|e| panic!("wasmi has no {name}: {e}"))
            .call(&mut self.store, args)
            .ok()
            .map(Into::into);
        let actual = self.ours.invoke(name, &values);
        match (expected, actual) {
            (Some(e), Ok(Some(a))) => {
                assert!(same(e, a), "{name}{values:?}: wasmi {e}, regwasm {a}")
            }
            (None, Err(err)) => {
                assert!(err.is_trap(), "{name}{values:?}: expected a trap, got {err}")
            }
            (e, a) => panic!("{name}{values:?}: wasmi {e:?}, regwasm {a:?}"),
        }
    }
}

fn same(a: Value, b: Value) -> bool {
    match (a, b) {
        (Value::F32(x), Value::F32(y)) => (x.is_nan() && y.is_nan()) || x.to_bits() == y.to_bits(),
        (Value::F64(x), Value::F64(y)) => (x.is_nan() && y.is_nan()) || x.to_bits() == y.to_bits(),
        _ => a == b,
    }
}

const INTS: [i32; 12] = [0, 1, -1, 2, 7, -7, 31, 32, 33, i32::MIN, i32::MAX, 0x1234_5678];
const LONGS: [i64; 11] = [
    0,
    1,
    -1,
    3,
    -9,
    63,
    64,
    i64::MIN,
    i64::MAX,
    0x1234_5678_9abc_def0,
    i32::MIN as i64,
];
const DOUBLES: [f64; 13] = [
    0.0,
    -0.0,
    0.5,
    1.5,
    2.5,
    -2.5,
    3.0,
    1e10,
    -4.2e9,
    9.3e18,
    f64::INFINITY,
    f64::NEG_INFINITY,
    f64::NAN,
];
const FLOATS: [f32; 11] = [
    0.0,
    -0.0,
    0.5,
    1.5,
    -2.5,
    3.25,
    1e9,
    -3e9,
    f32::INFINITY,
    f32::NEG_INFINITY,
    f32::NAN,
];

// ══════════════════════════════════════════════════════════════════════════════
// Numeric operators
// ══════════════════════════════════════════════════════════════════════════════

fn binary_module(ty: ValType, result: ValType, ops: &[(&str, I<'static>)]) -> Vec<u8> {
    let mut m = ParityModule::new();
    for (name, op) in ops {
        m.func(name, &[ty, ty], &[result], vec![], &[I::LocalGet(0), I::LocalGet(1), op.clone()]);
    }
    m.finish()
}

fn unary_module(ops: &[(&str, ValType, ValType, I<'static>)]) -> Vec<u8> {
    let mut m = ParityModule::new();
    for (name, param, result, op) in ops {
        m.func(name, &[*param], &[*result], vec![], &[I::LocalGet(0), op.clone()]);
    }
    m.finish()
}

#[test]
fn i32_binary_operators_agree() {
    let ops = [
        ("add", I::I32Add),
        ("sub", I::I32Sub),
        ("mul", I::I32Mul),
        ("div_s", I::I32DivS),
        ("div_u", I::I32DivU),
        ("rem_s", I::I32RemS),
        ("rem_u", I::I32RemU),
        ("and", I::I32And),
        ("or", I::I32Or),
        ("xor", I::I32Xor),
        ("shl", I::I32Shl),
        ("shr_s", I::I32ShrS),
        ("shr_u", I::I32ShrU),
        ("rotl", I::I32Rotl),
        ("rotr", I::I32Rotr),
        ("eq", I::I32Eq),
        ("ne", I::I32Ne),
        ("lt_s", I::I32LtS),
        ("lt_u", I::I32LtU),
        ("gt_s", I::I32GtS),
        ("gt_u", I::I32GtU),
        ("le_s", I::I32LeS),
        ("le_u", I::I32LeU),
        ("ge_s", I::I32GeS),
        ("ge_u", I::I32GeU),
    ];
    let mut h = Harness::new(&binary_module(I32, I32, &ops));
    for (name, _) in &ops {
        for &a in &INTS {
            for &b in &INTS {
                h.check::<_, i32>(name, (a, b));
            }
        }
    }
}

#[test]
fn i64_binary_operators_agree() {
    let arith = [
        ("add", I::I64Add),
        ("sub", I::I64Sub),
        ("mul", I::I64Mul),
        ("div_s", I::I64DivS),
        ("div_u", I::I64DivU),
        ("rem_s", I::I64RemS),
        ("rem_u", I::I64RemU),
        ("and", I::I64And),
        ("or", I::I64Or),
        ("xor", I::I64Xor),
        ("shl", I::I64Shl),
        ("shr_s", I::I64ShrS),
        ("shr_u", I::I64ShrU),
        ("rotl", I::I64Rotl),
        ("rotr", I::I64Rotr),
    ];
    let compare = [
        ("eq", I::I64Eq),
        ("ne", I::I64Ne),
        ("lt_s", I::I64LtS),
        ("lt_u", I::I64LtU),
        ("gt_s", I::I64GtS),
        ("ge_u", I::I64GeU),
    ];
    let mut h = Harness::new(&binary_module(I64, I64, &arith));
    let mut c = Harness::new(&binary_module(I64, I32, &compare));
    for &a in &LONGS {
        for &b in &LONGS {
            for (name, _) in &arith {
                h.check::<_, i64>(name, (a, b));
            }
            for (name, _) in &compare {
                c.check::<_, i32>(name, (a, b));
            }
        }
    }
}

#[test]
fn float_binary_operators_agree() {
    let f64_ops = [
        ("add", I::F64Add),
        ("sub", I::F64Sub),
        ("mul", I::F64Mul),
        ("div", I::F64Div),
        ("min", I::F64Min),
        ("max", I::F64Max),
        ("copysign", I::F64Copysign),
    ];
    let f64_cmp = [
        ("eq", I::F64Eq),
        ("ne", I::F64Ne),
        ("lt", I::F64Lt),
        ("ge", I::F64Ge),
    ];
    let f32_ops = [
        ("add", I::F32Add),
        ("div", I::F32Div),
        ("min", I::F32Min),
        ("max", I::F32Max),
        ("copysign", I::F32Copysign),
    ];
    let mut d = Harness::new(&binary_module(F64, F64, &f64_ops));
    let mut dc = Harness::new(&binary_module(F64, I32, &f64_cmp));
    let mut f = Harness::new(&binary_module(F32, F32, &f32_ops));
    for &a in &DOUBLES {
        for &b in &DOUBLES {
            for (name, _) in &f64_ops {
                d.check::<_, f64>(name, (a, b));
            }
            for (name, _) in &f64_cmp {
                dc.check::<_, i32>(name, (a, b));
            }
        }
    }
    for &a in &FLOATS {
        for &b in &FLOATS {
            for (name, _) in &f32_ops {
                f.check::<_, f32>(name, (a, b));
            }
        }
    }
}

#[test]
fn unary_operators_agree() {
    let int_ops = [
        ("clz", I32, I32, I::I32Clz),
        ("ctz", I32, I32, I::I32Ctz),
        ("popcnt", I32, I32, I::I32Popcnt),
        ("eqz", I32, I32, I::I32Eqz),
        ("extend_s", I32, I64, I::I64ExtendI32S),
        ("extend_u", I32, I64, I::I64ExtendI32U),
        ("f64_convert_s", I32, F64, I::F64ConvertI32S),
        ("f64_convert_u", I32, F64, I::F64ConvertI32U),
        ("f32_convert_u", I32, F32, I::F32ConvertI32U),
        ("f32_reinterpret", I32, F32, I::F32ReinterpretI32),
    ];
    let mut h = Harness::new(&unary_module(&int_ops));
    for &a in &INTS {
        h.check::<_, i32>("clz", (a,));
        h.check::<_, i32>("ctz", (a,));
        h.check::<_, i32>("popcnt", (a,));
        h.check::<_, i32>("eqz", (a,));
        h.check::<_, i64>("extend_s", (a,));
        h.check::<_, i64>("extend_u", (a,));
        h.check::<_, f64>("f64_convert_s", (a,));
        h.check::<_, f64>("f64_convert_u", (a,));
        h.check::<_, f32>("f32_convert_u", (a,));
        h.check::<_, f32>("f32_reinterpret", (a,));
    }

    let long_ops = [
        ("clz", I64, I64, I::I64Clz),
        ("popcnt", I64, I64, I::I64Popcnt),
        ("eqz", I64, I32, I::I64Eqz),
        ("wrap", I64, I32, I::I32WrapI64),
        ("f32_convert_u", I64, F32, I::F32ConvertI64U),
        ("f64_convert_s", I64, F64, I::F64ConvertI64S),
        ("f64_reinterpret", I64, F64, I::F64ReinterpretI64),
    ];
    let mut h = Harness::new(&unary_module(&long_ops));
    for &a in &LONGS {
        h.check::<_, i64>("clz", (a,));
        h.check::<_, i64>("popcnt", (a,));
        h.check::<_, i32>("eqz", (a,));
        h.check::<_, i32>("wrap", (a,));
        h.check::<_, f32>("f32_convert_u", (a,));
        h.check::<_, f64>("f64_convert_s", (a,));
        h.check::<_, f64>("f64_reinterpret", (a,));
    }
}

#[test]
fn float_unary_and_truncation_agree() {
    let double_ops = [
        ("abs", F64, F64, I::F64Abs),
        ("neg", F64, F64, I::F64Neg),
        ("ceil", F64, F64, I::F64Ceil),
        ("floor", F64, F64, I::F64Floor),
        ("trunc", F64, F64, I::F64Trunc),
        ("nearest", F64, F64, I::F64Nearest),
        ("sqrt", F64, F64, I::F64Sqrt),
        ("demote", F64, F32, I::F32DemoteF64),
        ("i32_trunc_s", F64, I32, I::I32TruncF64S),
        ("i32_trunc_u", F64, I32, I::I32TruncF64U),
        ("i64_trunc_s", F64, I64, I::I64TruncF64S),
        ("i64_trunc_u", F64, I64, I::I64TruncF64U),
        ("reinterpret", F64, I64, I::I64ReinterpretF64),
    ];
    let mut h = Harness::new(&unary_module(&double_ops));
    for &a in &DOUBLES {
        for name in ["abs", "neg", "ceil", "floor", "trunc", "nearest", "sqrt"] {
            h.check::<_, f64>(name, (a,));
        }
        h.check::<_, f32>("demote", (a,));
        h.check::<_, i32>("i32_trunc_s", (a,));
        h.check::<_, i32>("i32_trunc_u", (a,));
        h.check::<_, i64>("i64_trunc_s", (a,));
        h.check::<_, i64>("i64_trunc_u", (a,));
        h.check::<_, i64>("reinterpret", (a,));
    }

    let float_ops = [
        ("nearest", F32, F32, I::F32Nearest),
        ("sqrt", F32, F32, I::F32Sqrt),
        ("promote", F32, F64, I::F64PromoteF32),
        ("i32_trunc_s", F32, I32, I::I32TruncF32S),
        ("i64_trunc_u", F32, I64, I::I64TruncF32U),
        ("reinterpret", F32, I32, I::I32ReinterpretF32),
    ];
    let mut h = Harness::new(&unary_module(&float_ops));
    for &a in &FLOATS {
        h.check::<_, f32>("nearest", (a,));
        h.check::<_, f32>("sqrt", (a,));
        h.check::<_, f64>("promote", (a,));
        h.check::<_, i32>("i32_trunc_s", (a,));
        h.check::<_, i64>("i64_trunc_u", (a,));
        h.check::<_, i32>("reinterpret", (a,));
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Programs
// ══════════════════════════════════════════════════════════════════════════════

fn program_module() -> Vec<u8> {
    let mut m = ParityModule::new();

    m.func(
        "gcd",
        &[I32, I32],
        &[I32],
        vec![(1, I32)],
        &[
            I::Block(BlockType::Empty),
            I::Loop(BlockType::Empty),
            I::LocalGet(1),
            I::I32Eqz,
            I::BrIf(1),
            I::LocalGet(0),
            I::LocalGet(1),
            I::I32RemU,
            I::LocalSet(2),
            I::LocalGet(1),
            I::LocalSet(0),
            I::LocalGet(2),
            I::LocalSet(1),
            I::Br(0),
            I::End,
            I::End,
            I::LocalGet(0),
        ],
    );

    m.func(
        "switch",
        &[I32],
        &[I32],
        vec![],
        &[
            I::Block(BlockType::Empty),
            I::Block(BlockType::Empty),
            I::Block(BlockType::Empty),
            I::Block(BlockType::Empty),
            I::LocalGet(0),
            I::BrTable(vec![0, 1, 2].into(), 3),
            I::End,
            I::I32Const(10),
            I::Return,
            I::End,
            I::I32Const(20),
            I::Return,
            I::End,
            I::I32Const(30),
            I::Return,
            I::End,
            I::I32Const(99),
        ],
    );

    m.func(
        "select_max",
        &[I64, I64],
        &[I64],
        vec![],
        &[
            I::LocalGet(0),
            I::LocalGet(1),
            I::LocalGet(0),
            I::LocalGet(1),
            I::I64GtS,
            I::Select,
        ],
    );

    // Store i*i for i < n & 63 as i64 at i*8, then sum the stored values.
    m.func(
        "sum_squares",
        &[I32],
        &[I64],
        vec![(1, I32), (1, I64)],
        &[
            I::LocalGet(0),
            I::I32Const(63),
            I::I32And,
            I::LocalSet(0),
            I::Block(BlockType::Empty),
            I::Loop(BlockType::Empty),
            I::LocalGet(1),
            I::LocalGet(0),
            I::I32GeU,
            I::BrIf(1),
            I::LocalGet(1),
            I::I32Const(8),
            I::I32Mul,
            I::LocalGet(1),
            I::I64ExtendI32U,
            I::LocalGet(1),
            I::I64ExtendI32U,
            I::I64Mul,
            I::I64Store(mem(0, 3)),
            I::LocalGet(1),
            I::I32Const(1),
            I::I32Add,
            I::LocalSet(1),
            I::Br(0),
            I::End,
            I::End,
            I::Block(BlockType::Empty),
            I::Loop(BlockType::Empty),
            I::LocalGet(1),
            I::I32Eqz,
            I::BrIf(1),
            I::LocalGet(1),
            I::I32Const(1),
            I::I32Sub,
            I::LocalTee(1),
            I::I32Const(8),
            I::I32Mul,
            I::I64Load(mem(0, 3)),
            I::LocalGet(2),
            I::I64Add,
            I::LocalSet(2),
            I::Br(0),
            I::End,
            I::End,
            I::LocalGet(2),
        ],
    );

    m.func(
        "bytes",
        &[I32],
        &[I32],
        vec![],
        &[
            I::I32Const(200),
            I::LocalGet(0),
            I::I32Store(mem(0, 2)),
            I::I32Const(200),
            I::I32Load8S(mem(1, 0)),
            I::I32Const(200),
            I::I32Load16U(mem(2, 1)),
            I::I32Add,
            I::I32Const(0),
            I::I64Load32S(mem(200, 2)),
            I::I32WrapI64,
            I::I32Xor,
        ],
    );

    m.func(
        "load_at",
        &[I32],
        &[I32],
        vec![],
        &[I::LocalGet(0), I::I32Load(mem(4, 2))],
    );

    m.func(
        "grow",
        &[I32],
        &[I32],
        vec![],
        &[
            I::LocalGet(0),
            I::MemoryGrow(0),
            I::MemorySize(0),
            I::I32Const(16),
            I::I32Shl,
            I::I32Add,
        ],
    );

    m.func(
        "bump",
        &[I32],
        &[I32],
        vec![],
        &[
            I::GlobalGet(0),
            I::LocalGet(0),
            I::I32Add,
            I::GlobalSet(0),
            I::GlobalGet(0),
        ],
    );

    m.func(
        "branchy",
        &[F64],
        &[F64],
        vec![],
        &[
            I::LocalGet(0),
            I::F64Const(0.0f64.into()),
            I::F64Lt,
            I::If(BlockType::Result(F64)),
            I::LocalGet(0),
            I::F64Neg,
            I::Else,
            I::LocalGet(0),
            I::F64Sqrt,
            I::End,
            I::F64Const(1.0f64.into()),
            I::F64Add,
        ],
    );

    m.func(
        "guarded",
        &[I32],
        &[I32],
        vec![],
        &[
            I::LocalGet(0),
            I::I32Const(0),
            I::I32LtS,
            I::If(BlockType::Empty),
            I::Unreachable,
            I::End,
            I::LocalGet(0),
            I::I32Const(5),
            I::I32Add,
        ],
    );

    m.func(
        "scaled",
        &[I32],
        &[I32],
        vec![],
        &[I::LocalGet(0), I::Call(0), I::I32Const(1), I::I32Add],
    );

    // fib calls itself: its index is the next one handed out.
    let fib = m.next_index;
    m.func(
        "fib",
        &[I32],
        &[I32],
        vec![],
        &[
            I::LocalGet(0),
            I::I32Const(2),
            I::I32LtS,
            I::If(BlockType::Result(I32)),
            I::LocalGet(0),
            I::Else,
            I::LocalGet(0),
            I::I32Const(1),
            I::I32Sub,
            I::Call(fib),
            I::LocalGet(0),
            I::I32Const(2),
            I::I32Sub,
            I::Call(fib),
            I::I32Add,
            I::End,
        ],
    );

    let double = m.func("", &[I32], &[I32], vec![], &[I::LocalGet(0), I::LocalGet(0), I::I32Add]);
    let square = m.func("", &[I32], &[I32], vec![], &[I::LocalGet(0), I::LocalGet(0), I::I32Mul]);
    let seven = m.func("", &[], &[I32], vec![], &[I::I32Const(7)]);
    m.elements = vec![double, square, seven];

    let unary = m.ty(&[I32], &[I32]);
    let mut dispatch = Function::new(vec![]);
    dispatch.instruction(&I::LocalGet(1));
    dispatch.instruction(&I::LocalGet(0));
    // call_indirect (type unary) (table 0)
    dispatch.raw([0x11, unary as u8, 0x00]);
    dispatch.instruction(&I::End);
    m.raw_func("dispatch", &[I32, I32], &[I32], dispatch);

    m.finish()
}

#[test]
fn programs_agree() {
    let bytes = program_module();
    let mut h = Harness::new(&bytes);
    for &a in &INTS {
        for &b in &INTS {
            h.check::<_, i32>("gcd", (a, b));
        }
        h.check::<_, i32>("switch", (a,));
        h.check::<_, i64>("sum_squares", (a,));
        h.check::<_, i32>("bytes", (a,));
        h.check::<_, i32>("guarded", (a,));
        h.check::<_, i32>("scaled", (a,));
    }
    for &a in &LONGS {
        for &b in &LONGS {
            h.check::<_, i64>("select_max", (a, b));
        }
    }
    for &a in &DOUBLES {
        h.check::<_, f64>("branchy", (a,));
    }
    for n in 0..=20 {
        h.check::<_, i32>("fib", (n,));
    }
}

#[test]
fn memory_and_globals_agree() {
    let mut h = Harness::new(&program_module());
    for address in [0, 100, 65524, 65527, 65528, 65532, -1, 131064] {
        h.check::<_, i32>("load_at", (address,));
    }
    for delta in [0, 1, 0, 5, 1, 1, 0] {
        h.check::<_, i32>("grow", (delta,));
    }
    // Memory is now three pages; addresses past the first page resolve.
    h.check::<_, i32>("load_at", (131064,));
    for delta in [1, -7, 1000, i32::MAX] {
        h.check::<_, i32>("bump", (delta,));
    }
}

#[test]
fn indirect_calls_agree() {
    let mut h = Harness::new(&program_module());
    for index in [0, 1, 2, 3, 4, -1] {
        for &x in &[0, 6, -9, i32::MAX] {
            h.check::<_, i32>("dispatch", (index, x));
        }
    }
}

#[test]
fn pointer_width_does_not_change_results() {
    let bytes = program_module();
    let options = CompileOptions {
        pointer_width: PointerWidth::P32,
        ..CompileOptions::default()
    };
    let mut h = Harness::with_options(&bytes, &options);
    for n in 0..=12 {
        h.check::<_, i32>("fib", (n,));
        h.check::<_, i32>("dispatch", (1, n));
        h.check::<_, i32>("scaled", (n,));
    }
}
