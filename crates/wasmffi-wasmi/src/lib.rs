//! # wasmffi-wasmi
//!
//! Runs marshaled calls against a real WebAssembly instance through wasmi.
//!
//! [`WasmiHost`] implements [`wasmffi_marshal::Host`] over an instance's
//! linear memory and function table. Under split-word dispatch it builds
//! the `dynCall_<sig>` thunks for the configured signatures once, when the
//! host is created (see [`thunks`]).
//!
//! ```ignore
//! let config = WasmiConfig::split_words(["jj"]);
//! let mut host = WasmiHost::instantiate(&engine, &wasm, (), &config)?;
//! let cif = CallDescriptor::new(TypeTag::Sint64, vec![TypeTag::Sint64.into()]);
//! wasmffi_marshal::invoke(&mut host, &cif, FuncRef(1), rvalue, &[slot])?;
//! ```

mod config;
mod error;
mod host;
pub mod thunks;

pub use config::{WasmiConfig, DEFAULT_MEMORY_EXPORT, DEFAULT_TABLE_EXPORT};
pub use error::{WasmiError, WasmiResult};
pub use host::WasmiHost;
