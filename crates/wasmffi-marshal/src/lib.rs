//! wasmffi call marshaler.
//!
//! # Architecture
//!
//! A foreign call on wasm32 cannot be made through a synthesized stub: the
//! engine has no way to emit code at runtime. Instead every call goes
//! through a generic invocation primitive supplied by a [`Host`]:
//!
//! ```text
//! CallDescriptor + argument slots
//!     → decode   (memory → Values, one signature char per argument)
//!     → dyn_call (direct apply, or dispatch through a registered signature)
//!     → encode   (RawReturn → result slot)
//! ```
//!
//! ## 64-bit integers
//!
//! [`WideIntStrategy`] picks, once per host, whether i64 crosses the
//! boundary natively or as two i32 words with a side-channel high return
//! word. Both paths live behind the same [`invoke`] entry point.
//!
//! ## Aggregates
//!
//! `struct` and `complex` have no layout here and are rejected with
//! `UnsupportedAggregateType` before the target is touched.

pub mod cif;
pub mod host;
pub mod marshal;
pub mod memory;
pub mod native;
pub mod registry;
pub mod signature;
pub mod value;

pub use host::{CallRequest, FuncRef, Host, WideIntStrategy};
pub use marshal::{invoke, invoke_raw, prepare, signature_of};
pub use memory::{HeapRead, HeapWrite};
pub use native::{FunctionTable, NativeHost};
pub use registry::ShapeRegistry;
pub use signature::{CallShape, SigChar, Signature};
pub use value::{RawReturn, Value, ValueType};

pub use wasmffi_types::{
    Abi, CallDescriptor, MarshalError, MarshalResult, Position, TypeClass, TypeCode, TypeTag,
};
