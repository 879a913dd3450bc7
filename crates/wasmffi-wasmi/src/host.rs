//! A [`Host`] backed by a wasmi instance.
//!
//! Targets are indices into the instance's exported function table.
//!
//! - Direct apply ([`WideIntStrategy::Native`]): the table slot is resolved
//!   to a `Func` and called with the decoded values, i64 included.
//! - Signature dispatch ([`WideIntStrategy::SplitWords`]): the call goes
//!   through the `dynCall_<sig>` thunk registered for the signature. A `j`
//!   return reads its high word from the thunk module's `tempRet0` global.

use log::debug;
use wasmi::core::{F32, F64};
use wasmi::{Engine, Func, Global, Instance, Linker, Memory, Module, Store, Table, Val};

use wasmffi_marshal::{
    CallRequest, FuncRef, Host, MarshalError, MarshalResult, RawReturn, ShapeRegistry, SigChar,
    Signature, Value, WideIntStrategy,
};

use crate::config::WasmiConfig;
use crate::error::{WasmiError, WasmiResult};
use crate::thunks::{self, TABLE_IMPORT, TEMP_RET0_EXPORT};

pub struct WasmiHost<T> {
    store: Store<T>,
    instance: Instance,
    memory: Memory,
    table: Table,
    strategy: WideIntStrategy,
    thunks: ShapeRegistry<Func>,
    temp_ret0: Option<Global>,
}

impl<T> WasmiHost<T> {
    /// Bind to an already instantiated module.
    ///
    /// Under split-word dispatch this also generates, instantiates and
    /// registers the thunks for every configured signature.
    pub fn new(mut store: Store<T>, instance: Instance, config: &WasmiConfig) -> WasmiResult<Self> {
        let memory = instance
            .get_memory(&store, &config.memory_export)
            .ok_or_else(|| WasmiError::MissingExport(config.memory_export.clone()))?;
        let table = instance
            .get_table(&store, &config.table_export)
            .ok_or_else(|| WasmiError::MissingExport(config.table_export.clone()))?;

        let mut thunks = ShapeRegistry::new();
        let mut temp_ret0 = None;
        if config.strategy == WideIntStrategy::SplitWords {
            let sigs = config
                .signatures
                .iter()
                .map(|s| Signature::parse(s))
                .collect::<MarshalResult<Vec<_>>>()?;
            let wasm = thunks::build_thunk_module(&sigs)?;

            let engine = store.engine().clone();
            let module = Module::new(&engine, &wasm[..])?;
            let mut linker = Linker::<T>::new(&engine);
            linker
                .define(TABLE_IMPORT.0, TABLE_IMPORT.1, table)
                .map_err(|e| WasmiError::Link(e.to_string()))?;
            let thunk_instance = linker.instantiate(&mut store, &module)?.start(&mut store)?;

            for sig in &sigs {
                let name = thunks::export_name(sig);
                let func = thunk_instance
                    .get_func(&store, &name)
                    .ok_or(WasmiError::MissingExport(name))?;
                thunks.insert(sig, func);
            }
            temp_ret0 = Some(
                thunk_instance
                    .get_global(&store, TEMP_RET0_EXPORT)
                    .ok_or_else(|| WasmiError::MissingExport(TEMP_RET0_EXPORT.to_string()))?,
            );
            debug!("registered {} dynCall thunks", thunks.len());
        }

        Ok(Self {
            store,
            instance,
            memory,
            table,
            strategy: config.strategy,
            thunks,
            temp_ret0,
        })
    }

    /// Compile and instantiate `wasm` (which must have no imports), then bind
    /// to it.
    pub fn instantiate(engine: &Engine, wasm: &[u8], data: T, config: &WasmiConfig) -> WasmiResult<Self> {
        let module = Module::new(engine, wasm)?;
        let mut store = Store::new(engine, data);
        let linker = Linker::<T>::new(engine);
        let instance = linker.instantiate(&mut store, &module)?.start(&mut store)?;
        Self::new(store, instance, config)
    }

    pub fn instance(&self) -> Instance {
        self.instance
    }

    pub fn store(&self) -> &Store<T> {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut Store<T> {
        &mut self.store
    }

    pub fn thunks(&self) -> &ShapeRegistry<Func> {
        &self.thunks
    }

    fn apply(&mut self, target: FuncRef, args: &[Value]) -> MarshalResult<RawReturn> {
        let func = match self.table.get(&self.store, target.0.into()) {
            Some(Val::FuncRef(r)) => r.func().copied(),
            _ => None,
        }
        .ok_or_else(|| {
            MarshalError::InvocationFailure(format!("table slot {} holds no function", target.0))
        })?;

        let inputs: Vec<Val> = args.iter().map(to_val).collect();
        let mut outputs = vec![Val::I32(0); func.ty(&self.store).results().len()];
        func.call(&mut self.store, &inputs, &mut outputs)
            .map_err(|e| MarshalError::InvocationFailure(e.to_string()))?;

        Ok(RawReturn {
            value: outputs.first().map(from_val).transpose()?,
            high: None,
        })
    }

    fn dispatch(&mut self, sig: &Signature, target: FuncRef, args: &[Value]) -> MarshalResult<RawReturn> {
        let thunk = *self.thunks.get(sig)?;

        let mut inputs = Vec::with_capacity(args.len() + 1);
        inputs.push(Val::I32(target.0 as i32));
        inputs.extend(args.iter().map(to_val));
        let mut outputs = vec![Val::I32(0); usize::from(sig.ret() != SigChar::Void)];
        thunk
            .call(&mut self.store, &inputs, &mut outputs)
            .map_err(|e| MarshalError::InvocationFailure(format!("dynCall_{sig}: {e}")))?;

        let high = match (sig.ret(), self.temp_ret0) {
            (SigChar::I64, Some(global)) => match global.get(&self.store) {
                Val::I32(v) => Some(v as u32),
                _ => None,
            },
            _ => None,
        };
        Ok(RawReturn {
            value: outputs.first().map(from_val).transpose()?,
            high,
        })
    }
}

impl<T> Host for WasmiHost<T> {
    fn wide_int_strategy(&self) -> WideIntStrategy {
        self.strategy
    }

    fn memory(&self) -> &[u8] {
        self.memory.data(&self.store)
    }

    fn memory_mut(&mut self) -> &mut [u8] {
        self.memory.data_mut(&mut self.store)
    }

    fn dyn_call(&mut self, request: CallRequest<'_>) -> MarshalResult<RawReturn> {
        match request.signature {
            None => self.apply(request.target, request.args),
            Some(sig) => self.dispatch(sig, request.target, request.args),
        }
    }
}

fn to_val(v: &Value) -> Val {
    match *v {
        Value::I32(x) => Val::I32(x),
        Value::I64(x) => Val::I64(x),
        Value::F32(x) => Val::F32(F32::from_bits(x.to_bits())),
        Value::F64(x) => Val::F64(F64::from_bits(x.to_bits())),
    }
}

fn from_val(v: &Val) -> MarshalResult<Value> {
    Ok(match v {
        Val::I32(x) => Value::I32(*x),
        Val::I64(x) => Value::I64(*x),
        Val::F32(x) => Value::F32(f32::from_bits(x.to_bits())),
        Val::F64(x) => Value::F64(f64::from_bits(x.to_bits())),
        _ => {
            return Err(MarshalError::InvocationFailure(
                "reference results cannot be marshaled".to_string(),
            ))
        }
    })
}
