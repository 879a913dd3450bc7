//! Call descriptors: the prepared, reusable shape of a foreign function.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{MarshalError, MarshalResult, Position};
use crate::tag::TypeTag;

/// Raw type code as stored in a descriptor.
///
/// Descriptors come from outside the marshaler (often straight out of guest
/// memory), so a code is not guaranteed to name a valid [`TypeTag`].
/// Serialized as the tag name when known, or as the bare number otherwise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "CodeRepr", into = "CodeRepr")]
pub struct TypeCode(pub u16);

impl TypeCode {
    pub fn tag(self) -> Option<TypeTag> {
        TypeTag::from_code(self.0)
    }

    /// Resolve to a tag, reporting where the bad code sits on failure.
    pub fn resolve(self, position: Position) -> MarshalResult<TypeTag> {
        self.tag().ok_or(MarshalError::UnknownTypeTag {
            position,
            code: self.0,
        })
    }
}

impl From<TypeTag> for TypeCode {
    fn from(tag: TypeTag) -> Self {
        Self(tag.code())
    }
}

impl fmt::Display for TypeCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.tag() {
            Some(tag) => write!(f, "{tag}"),
            None => write!(f, "<{}>", self.0),
        }
    }
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum CodeRepr {
    Tag(TypeTag),
    Code(u16),
}

impl From<CodeRepr> for TypeCode {
    fn from(repr: CodeRepr) -> Self {
        match repr {
            CodeRepr::Tag(tag) => tag.into(),
            CodeRepr::Code(code) => Self(code),
        }
    }
}

impl From<TypeCode> for CodeRepr {
    fn from(code: TypeCode) -> Self {
        match code.tag() {
            Some(tag) => CodeRepr::Tag(tag),
            None => CodeRepr::Code(code.0),
        }
    }
}

/// Calling-convention tag. wasm32 has a single ABI, so the value is carried
/// through but never inspected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Abi(pub u32);

impl Abi {
    /// `FFI_WASM32`, libffi's default ABI on this target.
    pub const WASM32: Self = Self(1);
}

impl Default for Abi {
    fn default() -> Self {
        Self::WASM32
    }
}

/// A prepared call interface: return type plus ordered argument types.
///
/// Built once by the caller and reused across many calls. The marshaler only
/// ever reads it, so one descriptor can be shared between threads.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CallDescriptor {
    #[serde(default)]
    pub abi: Abi,
    pub rtype: TypeCode,
    #[serde(default)]
    pub arg_types: Vec<TypeCode>,
}

impl CallDescriptor {
    pub fn new<R, I, A>(rtype: R, arg_types: I) -> Self
    where
        R: Into<TypeCode>,
        I: IntoIterator<Item = A>,
        A: Into<TypeCode>,
    {
        Self {
            abi: Abi::default(),
            rtype: rtype.into(),
            arg_types: arg_types.into_iter().map(Into::into).collect(),
        }
    }

    pub fn with_abi(mut self, abi: Abi) -> Self {
        self.abi = abi;
        self
    }

    /// Number of declared arguments.
    pub fn nargs(&self) -> usize {
        self.arg_types.len()
    }
}

impl fmt::Display for CallDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for (i, arg) in self.arg_types.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{arg}")?;
        }
        write!(f, ") -> {}", self.rtype)
    }
}
