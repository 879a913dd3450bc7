//! Shared types for wasmffi.
//!
//! This crate defines the primitive type tags, call descriptors and error
//! types used by the marshaler and its hosts.

mod descriptor;
mod error;
mod tag;

pub use descriptor::{Abi, CallDescriptor, TypeCode};
pub use error::{MarshalError, MarshalResult, Position};
pub use tag::{TypeClass, TypeTag};
