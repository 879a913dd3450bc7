//! Call signatures: compact strings naming a call shape.
//!
//! A signature is the return character followed by one character per
//! argument:
//!
//! | Char | Meaning                                               |
//! |------|-------------------------------------------------------|
//! | `v`  | void (return position only)                           |
//! | `i`  | i32: every integer up to 32 bits, and pointers        |
//! | `f`  | f32                                                   |
//! | `d`  | f64 (`double` and `longdouble`)                       |
//! | `j`  | 64-bit integer                                        |
//!
//! Under split-word dispatch a `j` argument travels as two `i32` words
//! (low, high) and a `j` return comes back as the low word, with the high
//! word on the side channel. That is the "legalized" view of a signature.

use std::fmt;

use wasmffi_types::{MarshalError, MarshalResult, TypeClass};

use crate::value::ValueType;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SigChar {
    Void,
    I32,
    F32,
    F64,
    I64,
}

impl SigChar {
    pub fn as_char(self) -> char {
        match self {
            SigChar::Void => 'v',
            SigChar::I32 => 'i',
            SigChar::F32 => 'f',
            SigChar::F64 => 'd',
            SigChar::I64 => 'j',
        }
    }

    pub fn from_char(c: char) -> Option<Self> {
        Some(match c {
            'v' => SigChar::Void,
            'i' => SigChar::I32,
            'f' => SigChar::F32,
            'd' => SigChar::F64,
            'j' => SigChar::I64,
            _ => return None,
        })
    }

    /// Signature character for a type class. Aggregates have none.
    pub fn for_class(class: TypeClass) -> Option<Self> {
        Some(match class {
            TypeClass::Void => SigChar::Void,
            TypeClass::Int32 => SigChar::I32,
            TypeClass::Int64 => SigChar::I64,
            TypeClass::Float32 => SigChar::F32,
            TypeClass::Float64 => SigChar::F64,
            TypeClass::Aggregate => return None,
        })
    }

    /// Value kind when 64-bit integers are passed natively.
    pub fn native_type(self) -> Option<ValueType> {
        match self {
            SigChar::Void => None,
            SigChar::I32 => Some(ValueType::I32),
            SigChar::F32 => Some(ValueType::F32),
            SigChar::F64 => Some(ValueType::F64),
            SigChar::I64 => Some(ValueType::I64),
        }
    }

    /// Value kinds when 64-bit integers are split into two words.
    pub fn legalized_types(self) -> &'static [ValueType] {
        match self {
            SigChar::Void => &[],
            SigChar::I32 => &[ValueType::I32],
            SigChar::F32 => &[ValueType::F32],
            SigChar::F64 => &[ValueType::F64],
            SigChar::I64 => &[ValueType::I32, ValueType::I32],
        }
    }
}

/// A full signature string, return character first.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Signature(String);

impl Signature {
    /// Start a signature with its return character.
    pub fn new(ret: SigChar) -> Self {
        let mut s = String::with_capacity(8);
        s.push(ret.as_char());
        Self(s)
    }

    /// Append an argument character. `v` is never a valid argument.
    pub fn push(&mut self, arg: SigChar) {
        debug_assert!(arg != SigChar::Void, "void is not an argument type");
        self.0.push(arg.as_char());
    }

    /// Parse and validate a signature string such as `"vij"`.
    pub fn parse(s: &str) -> MarshalResult<Self> {
        let invalid = || MarshalError::InvalidSignature(s.to_string());
        let mut chars = s.chars();
        let ret = chars.next().and_then(SigChar::from_char).ok_or_else(invalid)?;
        let mut sig = Self::new(ret);
        for c in chars {
            match SigChar::from_char(c) {
                Some(SigChar::Void) | None => return Err(invalid()),
                Some(arg) => sig.push(arg),
            }
        }
        Ok(sig)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn ret(&self) -> SigChar {
        self.chars().next().unwrap_or(SigChar::Void)
    }

    /// Argument characters in order.
    pub fn params(&self) -> impl Iterator<Item = SigChar> + '_ {
        self.chars().skip(1)
    }

    fn chars(&self) -> impl Iterator<Item = SigChar> + '_ {
        self.0.chars().filter_map(SigChar::from_char)
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The concrete value layout a signature calls for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallShape {
    pub signature: Signature,
    pub params: Vec<ValueType>,
    pub result: Option<ValueType>,
}

impl CallShape {
    /// Shape of a legalized call: `j` params split in two, `j` result is the
    /// low word.
    pub fn legalized(signature: &Signature) -> Self {
        let params = signature
            .params()
            .flat_map(|c| c.legalized_types().iter().copied())
            .collect();
        let result = signature.ret().legalized_types().first().copied();
        Self {
            signature: signature.clone(),
            params,
            result,
        }
    }

    /// Shape of the underlying target, with 64-bit values kept whole.
    pub fn native(signature: &Signature) -> Self {
        Self {
            signature: signature.clone(),
            params: signature.params().filter_map(SigChar::native_type).collect(),
            result: signature.ret().native_type(),
        }
    }
}
