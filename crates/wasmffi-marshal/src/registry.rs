//! Signature-keyed registry of call shapes.
//!
//! Without runtime code generation the set of callable signatures is fixed
//! ahead of time. Each backend registers one entry per signature it can
//! dispatch (a thunk, a typed spreader, ...) and the marshaler resolves the
//! signature built for a call against it. A miss is an invocation failure,
//! never a fallback.

use std::collections::BTreeMap;

use wasmffi_types::{MarshalError, MarshalResult};

use crate::signature::Signature;

#[derive(Debug, Clone)]
pub struct ShapeRegistry<T> {
    shapes: BTreeMap<String, T>,
}

impl<T> Default for ShapeRegistry<T> {
    fn default() -> Self {
        Self {
            shapes: BTreeMap::new(),
        }
    }
}

impl<T> ShapeRegistry<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `shape` under `signature`, replacing any previous entry.
    pub fn insert(&mut self, signature: &Signature, shape: T) -> Option<T> {
        self.shapes.insert(signature.as_str().to_string(), shape)
    }

    pub fn get(&self, signature: &Signature) -> MarshalResult<&T> {
        self.shapes.get(signature.as_str()).ok_or_else(|| {
            MarshalError::InvocationFailure(format!(
                "no call shape registered for signature `{signature}`"
            ))
        })
    }

    pub fn contains(&self, signature: &Signature) -> bool {
        self.shapes.contains_key(signature.as_str())
    }

    pub fn len(&self) -> usize {
        self.shapes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shapes.is_empty()
    }

    /// Registered signatures, sorted.
    pub fn signatures(&self) -> impl Iterator<Item = &str> {
        self.shapes.keys().map(String::as_str)
    }
}
