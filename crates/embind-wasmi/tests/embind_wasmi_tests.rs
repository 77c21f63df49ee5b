//! End-to-end adapter tests against a real wasmi instance.
//!
//! A synthetic guest module (built with `wasm-encoder`) plays the role of an
//! Emscripten output: it exports `memory`, `malloc`, `free`,
//! `__getTypeName`, and `__indirect_function_table`, and its start section
//! registers an `int` type, a `bool` type, and an `add(int, int) -> int`
//! function — deliberately registering the function *before* its types so
//! the resolver path runs over the wire.

use embind_engine::Value;
use embind_wasmi::{Binding, EmbindHost};
use wasm_encoder::{
    CodeSection, ConstExpr, DataSection, ElementSection, Elements, EntityType, ExportKind,
    ExportSection, Function, FunctionSection, GlobalSection, GlobalType, ImportSection,
    Instruction, MemorySection, MemoryType, Module, RefType, StartSection, TableSection,
    TableType, TypeSection, ValType,
};

// ─────────────────────────────────────────────────────────────────────
// Guest module layout
// ─────────────────────────────────────────────────────────────────────

const NAME_INT: i32 = 1024; // "int\0"
const NAME_BOOL: i32 = 1028; // "bool\0"
const NAME_ADD: i32 = 1033; // "add\0"
const TYPES_ADD: i32 = 1040; // [2, 2, 2] little-endian
const HEAP_START: i32 = 2048;

/// Build the synthetic embind guest. With `duplicate_int`, the start
/// function registers the `int` type twice, which must trap.
fn build_guest(duplicate_int: bool) -> Vec<u8> {
    let mut types = TypeSection::new();
    types.ty().function(vec![], vec![]); // 0: start
    types.ty().function(vec![ValType::I32], vec![ValType::I32]); // 1: malloc, __getTypeName
    types.ty().function(vec![ValType::I32], vec![]); // 2: free
    types.ty().function(vec![ValType::I32; 5], vec![]); // 3: register integer/bool
    types.ty().function(vec![ValType::I32; 7], vec![]); // 4: register function
    types
        .ty()
        .function(vec![ValType::I32; 3], vec![ValType::I32]); // 5: add invoker

    let mut imports = ImportSection::new();
    imports.import("env", "_embind_register_integer", EntityType::Function(3));
    imports.import("env", "_embind_register_bool", EntityType::Function(3));
    imports.import("env", "_embind_register_function", EntityType::Function(4));

    let mut functions = FunctionSection::new();
    functions.function(1); // 3: malloc
    functions.function(2); // 4: free
    functions.function(1); // 5: __getTypeName
    functions.function(5); // 6: add invoker
    functions.function(0); // 7: start

    let mut tables = TableSection::new();
    tables.table(TableType {
        element_type: RefType::FUNCREF,
        minimum: 2,
        maximum: Some(2),
        table64: false,
        shared: false,
    });

    let mut memories = MemorySection::new();
    memories.memory(MemoryType {
        minimum: 1,
        maximum: Some(2),
        memory64: false,
        shared: false,
        page_size_log2: None,
    });

    let mut globals = GlobalSection::new();
    globals.global(
        GlobalType {
            val_type: ValType::I32,
            mutable: true,
            shared: false,
        },
        &ConstExpr::i32_const(HEAP_START),
    );

    let mut exports = ExportSection::new();
    exports.export("memory", ExportKind::Memory, 0);
    exports.export("__indirect_function_table", ExportKind::Table, 0);
    exports.export("malloc", ExportKind::Func, 3);
    exports.export("free", ExportKind::Func, 4);
    exports.export("__getTypeName", ExportKind::Func, 5);

    let mut elements = ElementSection::new();
    elements.active(
        Some(0),
        &ConstExpr::i32_const(1),
        Elements::Functions(std::borrow::Cow::Owned(vec![6])),
    );

    let mut code = CodeSection::new();

    // malloc: bump the heap global by the 8-aligned size.
    let mut malloc = Function::new(vec![(1, ValType::I32)]);
    malloc
        .instruction(&Instruction::GlobalGet(0))
        .instruction(&Instruction::LocalSet(1))
        .instruction(&Instruction::GlobalGet(0))
        .instruction(&Instruction::LocalGet(0))
        .instruction(&Instruction::I32Const(7))
        .instruction(&Instruction::I32Add)
        .instruction(&Instruction::I32Const(-8))
        .instruction(&Instruction::I32And)
        .instruction(&Instruction::I32Add)
        .instruction(&Instruction::GlobalSet(0))
        .instruction(&Instruction::LocalGet(1))
        .instruction(&Instruction::End);
    code.function(&malloc);

    // free: a no-op for the bump allocator.
    let mut free = Function::new(vec![]);
    free.instruction(&Instruction::End);
    code.function(&free);

    // __getTypeName: every id in this module names "int".
    let mut get_type_name = Function::new(vec![]);
    get_type_name
        .instruction(&Instruction::I32Const(NAME_INT))
        .instruction(&Instruction::End);
    code.function(&get_type_name);

    // add invoker: (fn, a, b) -> a + b.
    let mut invoker = Function::new(vec![]);
    invoker
        .instruction(&Instruction::LocalGet(1))
        .instruction(&Instruction::LocalGet(2))
        .instruction(&Instruction::I32Add)
        .instruction(&Instruction::End);
    code.function(&invoker);

    // start: register `add` first (unbound), then the types it needs.
    let mut start = Function::new(vec![]);
    start
        .instruction(&Instruction::I32Const(NAME_ADD))
        .instruction(&Instruction::I32Const(3))
        .instruction(&Instruction::I32Const(TYPES_ADD))
        .instruction(&Instruction::I32Const(0))
        .instruction(&Instruction::I32Const(1)) // table slot of the invoker
        .instruction(&Instruction::I32Const(0))
        .instruction(&Instruction::I32Const(0))
        .instruction(&Instruction::Call(2));
    for _ in 0..if duplicate_int { 2 } else { 1 } {
        start
            .instruction(&Instruction::I32Const(2))
            .instruction(&Instruction::I32Const(NAME_INT))
            .instruction(&Instruction::I32Const(4))
            .instruction(&Instruction::I32Const(i32::MIN))
            .instruction(&Instruction::I32Const(i32::MAX))
            .instruction(&Instruction::Call(0));
    }
    start
        .instruction(&Instruction::I32Const(4))
        .instruction(&Instruction::I32Const(NAME_BOOL))
        .instruction(&Instruction::I32Const(1))
        .instruction(&Instruction::I32Const(1))
        .instruction(&Instruction::I32Const(0))
        .instruction(&Instruction::Call(1))
        .instruction(&Instruction::End);
    code.function(&start);

    let mut data_bytes = Vec::new();
    data_bytes.extend_from_slice(b"int\0bool\0add\0");
    data_bytes.extend_from_slice(&[0, 0, 0]); // pad to TYPES_ADD
    for raw_type in [2i32, 2, 2] {
        data_bytes.extend_from_slice(&raw_type.to_le_bytes());
    }
    let mut data = DataSection::new();
    data.active(0, &ConstExpr::i32_const(NAME_INT), data_bytes);

    let mut module = Module::new();
    module
        .section(&types)
        .section(&imports)
        .section(&functions)
        .section(&tables)
        .section(&memories)
        .section(&globals)
        .section(&exports)
        .section(&StartSection { function_index: 7 })
        .section(&elements)
        .section(&code)
        .section(&data);
    module.finish()
}

// ─────────────────────────────────────────────────────────────────────
// Host state
// ─────────────────────────────────────────────────────────────────────

struct HostState {
    embind: Binding,
}

impl EmbindHost for HostState {
    fn embind(&self) -> &Binding {
        &self.embind
    }

    fn embind_mut(&mut self) -> &mut Binding {
        &mut self.embind
    }
}

fn instantiate(wasm: &[u8]) -> (wasmi::Store<HostState>, wasmi::Instance) {
    let engine = wasmi::Engine::default();
    let module = wasmi::Module::new(&engine, wasm).expect("invalid synthetic module");
    let mut store = wasmi::Store::new(
        &engine,
        HostState {
            embind: Binding::new(embind_engine::Engine::new()),
        },
    );
    let mut linker = <wasmi::Linker<HostState>>::new(&engine);
    embind_wasmi::register_imports(&mut linker).expect("import registration failed");

    let instance = linker
        .instantiate(&mut store, &module)
        .expect("instantiation failed")
        .start(&mut store)
        .expect("start (guest registration) trapped");
    embind_wasmi::bind_instance(&mut store, instance).expect("bind failed");
    (store, instance)
}

// ─────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────

#[test]
fn registrations_from_the_start_section_become_callable() {
    let (mut store, _instance) = instantiate(&build_guest(false));

    let engine = store.data().embind().engine().clone();
    assert_eq!(engine.registered_type_name(2).as_deref(), Some("int"));
    assert_eq!(engine.registered_type_name(4).as_deref(), Some("bool"));
    assert!(engine.has_public_symbol("add"));

    let result = embind_wasmi::call_function(
        &mut store,
        "add",
        &[Value::I32(2), Value::I32(40)],
    )
    .expect("add failed");
    assert_eq!(result, Value::I32(42));

    // Repeated calls reuse the cached table function.
    let result = embind_wasmi::call_function(
        &mut store,
        "add",
        &[Value::I32(-5), Value::I32(5)],
    )
    .unwrap();
    assert_eq!(result, Value::I32(0));
}

#[test]
fn wrong_argument_counts_and_kinds_fail_cleanly() {
    let (mut store, _instance) = instantiate(&build_guest(false));

    let err = embind_wasmi::call_function(&mut store, "add", &[Value::I32(1)]).unwrap_err();
    assert!(err.to_string().contains("expected 2 args"));

    let err = embind_wasmi::call_function(
        &mut store,
        "add",
        &[Value::Bool(true), Value::I32(1)],
    )
    .unwrap_err();
    assert!(err.is_binding());

    // The engine stays usable after failures.
    assert_eq!(
        embind_wasmi::call_function(&mut store, "add", &[Value::I32(3), Value::I32(4)]).unwrap(),
        Value::I32(7)
    );
}

#[test]
fn duplicate_registration_traps_guest_initialization() {
    let wasm = build_guest(true);
    let engine = wasmi::Engine::default();
    let module = wasmi::Module::new(&engine, wasm.as_slice()).unwrap();
    let mut store = wasmi::Store::new(
        &engine,
        HostState {
            embind: Binding::new(embind_engine::Engine::new()),
        },
    );
    let mut linker = <wasmi::Linker<HostState>>::new(&engine);
    embind_wasmi::register_imports(&mut linker).unwrap();

    let result = linker
        .instantiate(&mut store, &module)
        .unwrap()
        .start(&mut store);
    assert!(result.is_err(), "duplicate registration must trap start");
}

#[test]
fn binding_a_second_instance_fails() {
    let wasm = build_guest(false);
    let (mut store, instance) = instantiate(&wasm);
    let err = embind_wasmi::bind_instance(&mut store, instance).unwrap_err();
    assert!(err.to_string().contains("already bound"));
}
