//! The host seam: linear memory plus the generic invocation primitive.

use serde::{Deserialize, Serialize};

use wasmffi_types::MarshalResult;

use crate::signature::Signature;
use crate::value::{RawReturn, Value};

/// How 64-bit integers cross the call boundary.
///
/// Chosen once per host, from what the target can pass:
/// - `Native`: i64 is a first-class value. Calls go straight to the target
///   with no signature (direct apply).
/// - `SplitWords`: only 32-bit integers are passable. A 64-bit argument is
///   two i32 words (low, high), a 64-bit return is the low word plus a
///   side-channel high word, and every call is dispatched through a
///   pre-registered signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WideIntStrategy {
    #[default]
    Native,
    SplitWords,
}

/// An entry in the host's function table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FuncRef(pub u32);

/// One dynamic call, as handed to [`Host::dyn_call`].
#[derive(Debug, Clone, Copy)]
pub struct CallRequest<'a> {
    pub target: FuncRef,
    /// Present only under [`WideIntStrategy::SplitWords`].
    pub signature: Option<&'a Signature>,
    pub args: &'a [Value],
}

/// Everything the marshaler needs from its environment.
pub trait Host {
    fn wide_int_strategy(&self) -> WideIntStrategy;

    fn memory(&self) -> &[u8];

    fn memory_mut(&mut self) -> &mut [u8];

    /// Call `request.target` with `request.args`.
    ///
    /// Without a signature the values are applied directly. With one, the
    /// host must resolve a pre-registered call shape for it and fail with
    /// `InvocationFailure` if there is none.
    fn dyn_call(&mut self, request: CallRequest<'_>) -> MarshalResult<RawReturn>;
}
