//! In-process host: Rust closures in a function table over a `Vec<u8>`
//! linear memory.
//!
//! Useful for embedding the marshaler without a wasm engine and as the
//! reference host in tests. Under split-word dispatch the host behaves like a
//! legalized wasm module: targets receive 64-bit arguments as two i32 words
//! and return 64-bit results as [`RawReturn::split`].

use std::fmt;
use std::sync::Arc;

use log::debug;

use wasmffi_types::{CallDescriptor, MarshalError, MarshalResult};

use crate::host::{CallRequest, FuncRef, Host, WideIntStrategy};
use crate::marshal::signature_of;
use crate::registry::ShapeRegistry;
use crate::signature::{CallShape, SigChar, Signature};
use crate::value::{RawReturn, Value};

/// A callable table entry.
pub type HostFn = dyn Fn(&[Value]) -> MarshalResult<RawReturn> + Send + Sync;

/// Function table shared between hosts. Slot 0 is the null function.
#[derive(Clone)]
pub struct FunctionTable {
    entries: Vec<Option<Arc<HostFn>>>,
}

impl Default for FunctionTable {
    fn default() -> Self {
        Self { entries: vec![None] }
    }
}

impl fmt::Debug for FunctionTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionTable")
            .field("len", &self.entries.len())
            .finish()
    }
}

impl FunctionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `f` and return its table index.
    pub fn register<F>(&mut self, f: F) -> FuncRef
    where
        F: Fn(&[Value]) -> MarshalResult<RawReturn> + Send + Sync + 'static,
    {
        self.entries.push(Some(Arc::new(f)));
        FuncRef(self.entries.len() as u32 - 1)
    }

    pub fn get(&self, target: FuncRef) -> MarshalResult<&Arc<HostFn>> {
        match self.entries.get(target.0 as usize) {
            Some(Some(f)) => Ok(f),
            Some(None) => Err(MarshalError::InvocationFailure(format!(
                "null function reference {}",
                target.0
            ))),
            None => Err(MarshalError::InvocationFailure(format!(
                "function index {} out of table bounds ({})",
                target.0,
                self.entries.len()
            ))),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.len() <= 1
    }
}

#[derive(Debug)]
pub struct NativeHost {
    memory: Vec<u8>,
    table: Arc<FunctionTable>,
    strategy: WideIntStrategy,
    shapes: ShapeRegistry<CallShape>,
}

impl NativeHost {
    /// A host with `memory_size` zeroed bytes of linear memory.
    pub fn new(memory_size: usize, table: Arc<FunctionTable>, strategy: WideIntStrategy) -> Self {
        Self {
            memory: vec![0; memory_size],
            table,
            strategy,
            shapes: ShapeRegistry::new(),
        }
    }

    /// Make `signature` dispatchable under split-word mode.
    pub fn register_signature(&mut self, signature: &str) -> MarshalResult<Signature> {
        let sig = Signature::parse(signature)?;
        self.shapes.insert(&sig, CallShape::legalized(&sig));
        Ok(sig)
    }

    /// Register whatever signature `cif` dispatches through.
    pub fn register_descriptor(&mut self, cif: &CallDescriptor) -> MarshalResult<Signature> {
        let sig = signature_of(cif)?;
        self.shapes.insert(&sig, CallShape::legalized(&sig));
        Ok(sig)
    }

    pub fn shapes(&self) -> &ShapeRegistry<CallShape> {
        &self.shapes
    }

    fn dispatch(&self, func: &HostFn, sig: &Signature, args: &[Value]) -> MarshalResult<RawReturn> {
        let shape = self.shapes.get(sig)?;
        let arity_ok = shape.params.len() == args.len();
        if !arity_ok || shape.params.iter().zip(args).any(|(t, v)| *t != v.ty()) {
            return Err(MarshalError::InvocationFailure(format!(
                "arguments do not match call shape `{sig}`"
            )));
        }

        let raw = func(args)?;
        if raw.value.map(|v| v.ty()) != shape.result {
            return Err(MarshalError::InvocationFailure(format!(
                "result does not match call shape `{sig}`"
            )));
        }
        if sig.ret() == SigChar::I64 && raw.high.is_none() {
            return Err(MarshalError::InvocationFailure(format!(
                "`{sig}` target did not set the high return word"
            )));
        }
        Ok(raw)
    }
}

impl Host for NativeHost {
    fn wide_int_strategy(&self) -> WideIntStrategy {
        self.strategy
    }

    fn memory(&self) -> &[u8] {
        &self.memory
    }

    fn memory_mut(&mut self) -> &mut [u8] {
        &mut self.memory
    }

    fn dyn_call(&mut self, request: CallRequest<'_>) -> MarshalResult<RawReturn> {
        let func: &HostFn = &**self.table.get(request.target)?;
        match request.signature {
            None => func(request.args),
            Some(sig) => self.dispatch(func, sig, request.args).inspect_err(|e| {
                debug!("native dispatch of {} failed: {e}", request.target.0);
            }),
        }
    }
}
