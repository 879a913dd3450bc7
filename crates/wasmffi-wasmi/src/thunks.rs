//! Ahead-of-time `dynCall` thunks for split-word dispatch.
//!
//! A target that can only pass 32-bit integers reaches 64-bit functions
//! through emscripten-style legalized thunks. For a signature `sig` the
//! thunk module exports:
//!
//! ```text
//! dynCall_<sig>(fn: i32, <legalized params>) -> <legalized result>
//! ```
//!
//! which recombines each `j` argument from its (low, high) words, performs
//! `call_indirect` through the imported function table with the real
//! signature, and splits a `j` result into the returned low word plus the
//! high word stored in the exported `tempRet0` global.
//!
//! All thunks are generated in one module when the host is built, from the
//! configured signature list. Nothing is generated per call.
//!
//! # Module layout
//!
//! | Index space | Contents                                              |
//! |-------------|-------------------------------------------------------|
//! | types       | `2k`: native type of sig k, `2k+1`: its thunk type     |
//! | imports     | `env.__indirect_function_table` (funcref table 0)      |
//! | globals     | `0`: `tempRet0` (mut i32, exported)                    |
//! | functions   | `k`: `dynCall_<sig k>` (exported)                      |

use log::debug;
use wasm_encoder::{
    CodeSection, ConstExpr, EntityType, ExportKind, ExportSection, Function, FunctionSection,
    GlobalSection, GlobalType, ImportSection, Instruction, Module, RefType, TableType,
    TypeSection, ValType,
};

use wasmffi_marshal::{CallShape, SigChar, Signature, ValueType};

use crate::error::{WasmiError, WasmiResult};

/// Import module/name the thunks read the function table from.
pub const TABLE_IMPORT: (&str, &str) = ("env", "__indirect_function_table");
/// Export carrying the high word of the last split 64-bit return.
pub const TEMP_RET0_EXPORT: &str = "tempRet0";

const GLOBAL_TEMP_RET0: u32 = 0;
const TABLE_INDEX: u32 = 0;

/// `dynCall_<sig>`
pub fn export_name(sig: &Signature) -> String {
    format!("dynCall_{sig}")
}

fn val_type(t: ValueType) -> ValType {
    match t {
        ValueType::I32 => ValType::I32,
        ValueType::I64 => ValType::I64,
        ValueType::F32 => ValType::F32,
        ValueType::F64 => ValType::F64,
    }
}

/// Build and validate a module holding one thunk per distinct signature.
pub fn build_thunk_module(signatures: &[Signature]) -> WasmiResult<Vec<u8>> {
    let mut types = TypeSection::new();
    let mut funcs = FunctionSection::new();
    let mut code = CodeSection::new();
    let mut exports = ExportSection::new();

    let mut emitted: Vec<&Signature> = Vec::with_capacity(signatures.len());
    for sig in signatures {
        if emitted.contains(&sig) {
            continue;
        }
        let k = emitted.len() as u32;
        emitted.push(sig);
        let native = CallShape::native(sig);
        let legal = CallShape::legalized(sig);

        let native_params: Vec<ValType> = native.params.iter().copied().map(val_type).collect();
        let native_results: Vec<ValType> = native.result.map(val_type).into_iter().collect();
        types.ty().function(native_params, native_results);

        let mut thunk_params = vec![ValType::I32];
        thunk_params.extend(legal.params.iter().copied().map(val_type));
        let thunk_results: Vec<ValType> = legal.result.map(val_type).into_iter().collect();
        let param_count = thunk_params.len() as u32;
        types.ty().function(thunk_params, thunk_results);

        funcs.function(2 * k + 1);
        code.function(&emit_thunk(sig, 2 * k, param_count));
        exports.export(&export_name(sig), ExportKind::Func, k);
    }
    exports.export(TEMP_RET0_EXPORT, ExportKind::Global, GLOBAL_TEMP_RET0);

    let mut imports = ImportSection::new();
    imports.import(
        TABLE_IMPORT.0,
        TABLE_IMPORT.1,
        EntityType::Table(TableType {
            element_type: RefType::FUNCREF,
            table64: false,
            minimum: 0,
            maximum: None,
            shared: false,
        }),
    );

    let mut globals = GlobalSection::new();
    globals.global(
        GlobalType {
            val_type: ValType::I32,
            mutable: true,
            shared: false,
        },
        &ConstExpr::i32_const(0),
    );

    let mut module = Module::new();
    module.section(&types);
    module.section(&imports);
    module.section(&funcs);
    module.section(&globals);
    module.section(&exports);
    module.section(&code);
    let bytes = module.finish();

    wasmparser::validate(&bytes).map_err(|e| WasmiError::ThunkValidation(format!("{e}")))?;
    debug!(
        "generated {} dynCall thunks ({} bytes)",
        emitted.len(),
        bytes.len()
    );
    Ok(bytes)
}

/// Thunk body. Param 0 is the table index; legalized params follow.
fn emit_thunk(sig: &Signature, target_type: u32, param_count: u32) -> Function {
    let wide_ret = sig.ret() == SigChar::I64;
    let mut f = Function::new(if wide_ret { vec![(1, ValType::I64)] } else { vec![] });

    let mut local = 1;
    for c in sig.params() {
        if c == SigChar::I64 {
            // (i64)lo | ((i64)hi << 32)
            f.instruction(&Instruction::LocalGet(local));
            f.instruction(&Instruction::I64ExtendI32U);
            f.instruction(&Instruction::LocalGet(local + 1));
            f.instruction(&Instruction::I64ExtendI32U);
            f.instruction(&Instruction::I64Const(32));
            f.instruction(&Instruction::I64Shl);
            f.instruction(&Instruction::I64Or);
            local += 2;
        } else {
            f.instruction(&Instruction::LocalGet(local));
            local += 1;
        }
    }

    f.instruction(&Instruction::LocalGet(0));
    f.instruction(&Instruction::CallIndirect {
        type_index: target_type,
        table_index: TABLE_INDEX,
    });

    if wide_ret {
        // tempRet0 = (i32)(r >> 32); return (i32)r
        let tmp = param_count;
        f.instruction(&Instruction::LocalTee(tmp));
        f.instruction(&Instruction::I64Const(32));
        f.instruction(&Instruction::I64ShrU);
        f.instruction(&Instruction::I32WrapI64);
        f.instruction(&Instruction::GlobalSet(GLOBAL_TEMP_RET0));
        f.instruction(&Instruction::LocalGet(tmp));
        f.instruction(&Instruction::I32WrapI64);
    }
    f.instruction(&Instruction::End);
    f
}
