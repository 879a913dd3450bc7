//! Marshaling error types.

use serde::Serialize;
use std::fmt;
use thiserror::Error;

use crate::tag::TypeTag;

/// Where in a descriptor an offending type sits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Position {
    Return,
    Argument(usize),
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Position::Return => write!(f, "return"),
            Position::Argument(i) => write!(f, "argument {i}"),
        }
    }
}

/// Errors that can occur while marshaling a dynamic call.
///
/// All of them are terminal for the call that raised them. None leaves a
/// partial write in the result slot.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MarshalError {
    /// `struct` or `complex` in argument or return position.
    #[error("{position}: {tag} marshalling is not supported")]
    UnsupportedAggregateType { position: Position, tag: TypeTag },

    /// A type code outside the known tag range.
    #[error("{position}: unexpected type code {code}")]
    UnknownTypeTag { position: Position, code: u16 },

    /// The target could not be called, trapped, or no call shape was
    /// registered for the signature.
    #[error("invocation failed: {0}")]
    InvocationFailure(String),

    /// A memory access fell outside linear memory.
    #[error("out-of-bounds access: {len} bytes at {addr:#x}")]
    OutOfBounds { addr: u64, len: u32 },

    /// The slot vector does not match the descriptor's argument count.
    #[error("descriptor declares {expected} arguments, got {actual} slots")]
    ArgumentCount { expected: usize, actual: usize },

    /// A signature string outside the `v/i/f/d/j` alphabet.
    #[error("invalid signature `{0}`")]
    InvalidSignature(String),
}

/// Marshal result type alias.
pub type MarshalResult<T> = Result<T, MarshalError>;
