//! Integration tests for marshaling into a wasmi instance.
//!
//! Tests validate:
//! - Direct apply and `dynCall` thunk dispatch reach the same functions
//! - Split 64-bit arguments and returns survive the thunk round trip
//! - Void returns leave the result slot untouched
//! - Traps, empty slots and type mismatches surface as invocation failures
//! - Host construction errors (missing exports, bad signatures, bad config)

use std::borrow::Cow;

use wasm_encoder::{
    CodeSection, ConstExpr, ElementSection, Elements, ExportKind, ExportSection, Function,
    FunctionSection, Instruction, MemArg, MemoryType, MemorySection, Module, RefType,
    TableSection, TableType, TypeSection, ValType,
};
use wasmi::Engine;

use wasmffi_marshal::cif::write_descriptor;
use wasmffi_marshal::{
    invoke, invoke_raw, CallDescriptor, FuncRef, HeapRead, HeapWrite, Host, MarshalError,
    Position, TypeTag, WideIntStrategy,
};
use wasmffi_wasmi::{WasmiConfig, WasmiError, WasmiHost};

// ══════════════════════════════════════════════════════════════════════════════
// Target module
// ══════════════════════════════════════════════════════════════════════════════

const ARGS: u32 = 256;
const RESULT: u32 = 1024;
const STAGING: u32 = 2048;
const POISON: u8 = 0xAA;
/// Where `store_i32` writes its argument.
const STORE_ADDR: u32 = 64;

const ID_I32: FuncRef = FuncRef(1);
const ID_I64: FuncRef = FuncRef(2);
const ID_F32: FuncRef = FuncRef(3);
const ID_F64: FuncRef = FuncRef(4);
const ADD_I64: FuncRef = FuncRef(5);
const MIX: FuncRef = FuncRef(6);
const STORE_I32: FuncRef = FuncRef(7);
const TRAP: FuncRef = FuncRef(8);
/// Inside the table but never initialized.
const EMPTY_SLOT: FuncRef = FuncRef(12);
const TABLE_SIZE: u64 = 16;

/// Every signature the target functions need under split dispatch.
const SIGNATURES: [&str; 8] = ["ii", "jj", "ff", "dd", "jjj", "difi", "vi", "v"];

/// A module exporting `memory` and `__indirect_function_table`, with the
/// functions above at table slots 1..=8 and slot 0 left null.
fn target_module() -> Vec<u8> {
    use ValType::{F32, F64, I32, I64};
    const UNIT: [ValType; 0] = [];

    let mut types = TypeSection::new();
    types.ty().function([I32], [I32]); // 0
    types.ty().function([I64], [I64]); // 1
    types.ty().function([F32], [F32]); // 2
    types.ty().function([F64], [F64]); // 3
    types.ty().function([I64, I64], [I64]); // 4
    types.ty().function([I32, F32, I32], [F64]); // 5
    types.ty().function([I32], UNIT); // 6
    types.ty().function(UNIT, UNIT); // 7

    let mut funcs = FunctionSection::new();
    for ty in 0..8 {
        funcs.function(ty);
    }

    let mut tables = TableSection::new();
    tables.table(TableType {
        element_type: RefType::FUNCREF,
        table64: false,
        minimum: TABLE_SIZE,
        maximum: None,
        shared: false,
    });

    let mut memories = MemorySection::new();
    memories.memory(MemoryType {
        minimum: 1,
        maximum: None,
        memory64: false,
        shared: false,
        page_size_log2: None,
    });

    let mut exports = ExportSection::new();
    exports.export("memory", ExportKind::Memory, 0);
    exports.export("__indirect_function_table", ExportKind::Table, 0);

    let mut elements = ElementSection::new();
    elements.active(
        Some(0),
        &ConstExpr::i32_const(1),
        Elements::Functions(Cow::Borrowed(&[0, 1, 2, 3, 4, 5, 6, 7])),
    );

    let mut code = CodeSection::new();
    for _ in 0..4 {
        code.function(&body(&[Instruction::LocalGet(0)]));
    }
    code.function(&body(&[
        Instruction::LocalGet(0),
        Instruction::LocalGet(1),
        Instruction::I64Add,
    ]));
    // a + b + c
    code.function(&body(&[
        Instruction::LocalGet(0),
        Instruction::F64ConvertI32S,
        Instruction::LocalGet(1),
        Instruction::F64PromoteF32,
        Instruction::F64Add,
        Instruction::LocalGet(2),
        Instruction::F64ConvertI32S,
        Instruction::F64Add,
    ]));
    code.function(&body(&[
        Instruction::I32Const(STORE_ADDR as i32),
        Instruction::LocalGet(0),
        Instruction::I32Store(MemArg {
            offset: 0,
            align: 2,
            memory_index: 0,
        }),
    ]));
    code.function(&body(&[Instruction::Unreachable]));

    let mut module = Module::new();
    module.section(&types);
    module.section(&funcs);
    module.section(&tables);
    module.section(&memories);
    module.section(&exports);
    module.section(&elements);
    module.section(&code);
    module.finish()
}

fn body(instrs: &[Instruction<'_>]) -> Function {
    let mut f = Function::new(vec![]);
    for i in instrs {
        f.instruction(i);
    }
    f.instruction(&Instruction::End);
    f
}

fn host_with(config: &WasmiConfig) -> WasmiHost<()> {
    let engine = Engine::default();
    let mut host = WasmiHost::instantiate(&engine, &target_module(), (), config).unwrap();
    host.memory_mut()[RESULT as usize..RESULT as usize + 16].fill(POISON);
    host
}

fn host(strategy: WideIntStrategy) -> WasmiHost<()> {
    match strategy {
        WideIntStrategy::Native => host_with(&WasmiConfig::default()),
        WideIntStrategy::SplitWords => host_with(&WasmiConfig::split_words(SIGNATURES)),
    }
}

const STRATEGIES: [WideIntStrategy; 2] = [WideIntStrategy::Native, WideIntStrategy::SplitWords];

// ══════════════════════════════════════════════════════════════════════════════
// Round trips
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn scalars_round_trip_through_wasm_identities() {
    for strategy in STRATEGIES {
        let mut h = host(strategy);

        h.memory_mut().store_i32(ARGS, 0, -7).unwrap();
        let cif = CallDescriptor::new(TypeTag::Sint32, [TypeTag::Sint32]);
        invoke(&mut h, &cif, ID_I32, RESULT, &[ARGS]).unwrap();
        assert_eq!(h.memory().load_i32(RESULT, 0).unwrap(), -7, "{strategy:?}");

        h.memory_mut().store_f32(ARGS, 0, f32::from_bits(0x7fc0_0001)).unwrap();
        let cif = CallDescriptor::new(TypeTag::Float, [TypeTag::Float]);
        invoke(&mut h, &cif, ID_F32, RESULT, &[ARGS]).unwrap();
        assert_eq!(h.memory().load_u32(RESULT, 0).unwrap(), 0x7fc0_0001, "{strategy:?}");

        h.memory_mut().store_f64(ARGS, 0, -1.5e-300).unwrap();
        let cif = CallDescriptor::new(TypeTag::Double, [TypeTag::Double]);
        invoke(&mut h, &cif, ID_F64, RESULT, &[ARGS]).unwrap();
        assert_eq!(h.memory().load_f64(RESULT, 0).unwrap(), -1.5e-300, "{strategy:?}");
    }
}

#[test]
fn narrow_arguments_arrive_widened() {
    for strategy in STRATEGIES {
        let mut h = host(strategy);
        h.memory_mut().store_u8(ARGS, 0, 0x80).unwrap();

        let cif = CallDescriptor::new(TypeTag::Sint32, [TypeTag::Sint8]);
        invoke(&mut h, &cif, ID_I32, RESULT, &[ARGS]).unwrap();
        assert_eq!(h.memory().load_i32(RESULT, 0).unwrap(), -128);

        let cif = CallDescriptor::new(TypeTag::Sint32, [TypeTag::Uint8]);
        invoke(&mut h, &cif, ID_I32, RESULT, &[ARGS]).unwrap();
        assert_eq!(h.memory().load_i32(RESULT, 0).unwrap(), 128);
    }
}

#[test]
fn mixed_arguments_reach_the_target_in_order() {
    for strategy in STRATEGIES {
        let mut h = host(strategy);
        let mem = h.memory_mut();
        mem.store_i32(ARGS, 0, 2).unwrap();
        mem.store_f32(ARGS + 8, 0, 0.5).unwrap();
        mem.store_i32(ARGS + 16, 0, 40).unwrap();

        let cif = CallDescriptor::new(TypeTag::Double, [TypeTag::Int, TypeTag::Float, TypeTag::Int]);
        invoke(&mut h, &cif, MIX, RESULT, &[ARGS, ARGS + 8, ARGS + 16]).unwrap();
        assert_eq!(h.memory().load_f64(RESULT, 0).unwrap(), 42.5, "{strategy:?}");
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// 64-bit values
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn wide_values_round_trip_under_both_strategies() {
    for strategy in STRATEGIES {
        for wide in [0x0102_0304_0506_0708u64, u64::MAX - 1, 0, 1 << 32] {
            let mut h = host(strategy);
            h.memory_mut().store_u64(ARGS, 0, wide).unwrap();

            let cif = CallDescriptor::new(TypeTag::Uint64, [TypeTag::Uint64]);
            invoke(&mut h, &cif, ID_I64, RESULT, &[ARGS]).unwrap();
            assert_eq!(h.memory().load_u64(RESULT, 0).unwrap(), wide, "{strategy:?}");
        }
    }
}

#[test]
fn split_return_high_word_comes_from_temp_ret0() {
    let mut h = host(WideIntStrategy::SplitWords);
    h.memory_mut().store_u64(ARGS, 0, 0x0102_0304_0506_0708).unwrap();

    let cif = CallDescriptor::new(TypeTag::Sint64, [TypeTag::Sint64]);
    invoke(&mut h, &cif, ID_I64, RESULT, &[ARGS]).unwrap();
    assert_eq!(h.memory().load_u32(RESULT, 0).unwrap(), 0x0506_0708);
    assert_eq!(h.memory().load_u32(RESULT, 1).unwrap(), 0x0102_0304);
}

#[test]
fn split_arguments_recombine_before_the_call() {
    let mut h = host(WideIntStrategy::SplitWords);
    let mem = h.memory_mut();
    mem.store_i64(ARGS, 0, 0x0000_0001_ffff_ffff).unwrap();
    mem.store_i64(ARGS, 1, 1).unwrap();

    let cif = CallDescriptor::new(TypeTag::Sint64, [TypeTag::Sint64, TypeTag::Sint64]);
    invoke(&mut h, &cif, ADD_I64, RESULT, &[ARGS, ARGS + 8]).unwrap();
    assert_eq!(h.memory().load_i64(RESULT, 0).unwrap(), 0x0000_0002_0000_0000);
}

#[test]
fn negative_wide_values_keep_their_sign() {
    for strategy in STRATEGIES {
        let mut h = host(strategy);
        let mem = h.memory_mut();
        mem.store_i64(ARGS, 0, -5).unwrap();
        mem.store_i64(ARGS, 1, 3).unwrap();

        let cif = CallDescriptor::new(TypeTag::Sint64, [TypeTag::Sint64, TypeTag::Sint64]);
        invoke(&mut h, &cif, ADD_I64, RESULT, &[ARGS, ARGS + 8]).unwrap();
        assert_eq!(h.memory().load_i64(RESULT, 0).unwrap(), -2, "{strategy:?}");
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Void and rejected calls
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn void_call_runs_but_leaves_result_untouched() {
    for strategy in STRATEGIES {
        let mut h = host(strategy);
        h.memory_mut().store_i32(ARGS, 0, 99).unwrap();

        let cif = CallDescriptor::new(TypeTag::Void, [TypeTag::Sint32]);
        invoke(&mut h, &cif, STORE_I32, RESULT, &[ARGS]).unwrap();
        assert_eq!(h.memory().load_i32(STORE_ADDR, 0).unwrap(), 99);
        assert!(h.memory()[RESULT as usize..RESULT as usize + 16]
            .iter()
            .all(|&b| b == POISON));
    }
}

#[test]
fn aggregate_argument_never_reaches_the_target() {
    for strategy in STRATEGIES {
        let mut h = host(strategy);
        let cif = CallDescriptor::new(TypeTag::Void, [TypeTag::Struct]);
        let err = invoke(&mut h, &cif, STORE_I32, RESULT, &[ARGS]).unwrap_err();
        assert_eq!(
            err,
            MarshalError::UnsupportedAggregateType {
                position: Position::Argument(0),
                tag: TypeTag::Struct,
            }
        );
        assert_eq!(h.memory().load_i32(STORE_ADDR, 0).unwrap(), 0);
    }
}

#[test]
fn trap_is_an_invocation_failure() {
    for strategy in STRATEGIES {
        let mut h = host(strategy);
        let cif = CallDescriptor::new(TypeTag::Void, Vec::<TypeTag>::new());
        let err = invoke(&mut h, &cif, TRAP, RESULT, &[]).unwrap_err();
        assert!(matches!(err, MarshalError::InvocationFailure(_)), "{strategy:?}: {err:?}");
    }
}

#[test]
fn empty_and_out_of_range_slots_fail() {
    for strategy in STRATEGIES {
        for target in [FuncRef(0), EMPTY_SLOT, FuncRef(100)] {
            let mut h = host(strategy);
            let cif = CallDescriptor::new(TypeTag::Void, Vec::<TypeTag>::new());
            let err = invoke(&mut h, &cif, target, RESULT, &[]).unwrap_err();
            assert!(
                matches!(err, MarshalError::InvocationFailure(_)),
                "{strategy:?} {target:?}: {err:?}"
            );
        }
    }
}

#[test]
fn descriptor_not_matching_the_function_type_fails() {
    for strategy in STRATEGIES {
        let mut h = host(strategy);
        h.memory_mut().store_f64(ARGS, 0, 1.0).unwrap();
        let cif = CallDescriptor::new(TypeTag::Double, [TypeTag::Double]);
        let err = invoke(&mut h, &cif, ID_I32, RESULT, &[ARGS]).unwrap_err();
        assert!(matches!(err, MarshalError::InvocationFailure(_)), "{strategy:?}: {err:?}");
    }
}

#[test]
fn signature_without_a_thunk_fails() {
    let mut h = host_with(&WasmiConfig::split_words(["vi"]));
    h.memory_mut().store_i32(ARGS, 0, 1).unwrap();
    let cif = CallDescriptor::new(TypeTag::Sint32, [TypeTag::Sint32]);
    let err = invoke(&mut h, &cif, ID_I32, RESULT, &[ARGS]).unwrap_err();
    match err {
        MarshalError::InvocationFailure(msg) => assert!(msg.contains("`ii`"), "{msg}"),
        other => panic!("expected invocation failure, got {other:?}"),
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Descriptors in linear memory
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn invoke_raw_reads_everything_from_instance_memory() {
    for strategy in STRATEGIES {
        let mut h = host(strategy);
        let cif = CallDescriptor::new(TypeTag::Uint64, [TypeTag::Uint64, TypeTag::Uint64]);
        let staged = write_descriptor(h.memory_mut(), STAGING, &cif).unwrap();

        let mem = h.memory_mut();
        mem.store_u64(ARGS, 0, 40).unwrap();
        mem.store_u64(ARGS, 1, 2).unwrap();
        let avalue = staged.end;
        mem.store_u32(avalue, 0, ARGS).unwrap();
        mem.store_u32(avalue, 1, ARGS + 8).unwrap();

        invoke_raw(&mut h, staged.addr, ADD_I64, RESULT, avalue).unwrap();
        assert_eq!(h.memory().load_u64(RESULT, 0).unwrap(), 42, "{strategy:?}");
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Host construction
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn split_host_registers_one_thunk_per_signature() {
    let h = host(WideIntStrategy::SplitWords);
    assert_eq!(h.thunks().len(), SIGNATURES.len());
    assert!(host(WideIntStrategy::Native).thunks().is_empty());
}

#[test]
fn repeated_configured_signature_builds_one_thunk() {
    let mut h = host_with(&WasmiConfig::split_words(["ii", "ii"]));
    assert_eq!(h.thunks().len(), 1);

    h.memory_mut().store_i32(ARGS, 0, 31).unwrap();
    let cif = CallDescriptor::new(TypeTag::Sint32, [TypeTag::Sint32]);
    invoke(&mut h, &cif, ID_I32, RESULT, &[ARGS]).unwrap();
    assert_eq!(h.memory().load_i32(RESULT, 0).unwrap(), 31);
}

#[test]
fn config_from_json_drives_the_host() {
    let config = WasmiConfig::from_json(
        r#"{ "strategy": "split_words", "signatures": ["jjj"] }"#,
    )
    .unwrap();
    let mut h = host_with(&config);
    assert_eq!(h.wide_int_strategy(), WideIntStrategy::SplitWords);

    let mem = h.memory_mut();
    mem.store_i64(ARGS, 0, 1 << 40).unwrap();
    mem.store_i64(ARGS, 1, 1).unwrap();
    let cif = CallDescriptor::new(TypeTag::Sint64, [TypeTag::Sint64, TypeTag::Sint64]);
    invoke(&mut h, &cif, ADD_I64, RESULT, &[ARGS, ARGS + 8]).unwrap();
    assert_eq!(h.memory().load_i64(RESULT, 0).unwrap(), (1 << 40) + 1);
}

#[test]
fn missing_exports_are_reported() {
    let engine = Engine::default();
    let config = WasmiConfig {
        memory_export: "heap".to_string(),
        ..WasmiConfig::default()
    };
    let err = WasmiHost::instantiate(&engine, &target_module(), (), &config).err();
    assert!(matches!(err, Some(WasmiError::MissingExport(name)) if name == "heap"));

    let config = WasmiConfig {
        table_export: "table".to_string(),
        ..WasmiConfig::default()
    };
    let err = WasmiHost::instantiate(&engine, &target_module(), (), &config).err();
    assert!(matches!(err, Some(WasmiError::MissingExport(name)) if name == "table"));
}

#[test]
fn malformed_configured_signature_is_rejected() {
    let engine = Engine::default();
    let config = WasmiConfig::split_words(["vx"]);
    let err = WasmiHost::instantiate(&engine, &target_module(), (), &config).err();
    assert!(matches!(
        err,
        Some(WasmiError::Marshal(MarshalError::InvalidSignature(_)))
    ));
}

#[test]
fn invalid_module_bytes_are_a_wasmi_error() {
    let engine = Engine::default();
    let err = WasmiHost::instantiate(&engine, b"not wasm", (), &WasmiConfig::default()).err();
    assert!(matches!(err, Some(WasmiError::Wasmi(_))));
}
