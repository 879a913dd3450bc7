//! Primitive type tags and their wasm32 layout.
//!
//! Tag numbering follows libffi's `FFI_TYPE_*` constants, so a descriptor
//! laid out in guest memory by a C toolchain decodes directly:
//!
//! | Code | Tag          | Size | Align | Sig |
//! |------|--------------|------|-------|-----|
//! | 0    | `void`       | 1    | 1     | `v` |
//! | 1    | `int`        | 4    | 4     | `i` |
//! | 2    | `float`      | 4    | 4     | `f` |
//! | 3    | `double`     | 8    | 8     | `d` |
//! | 4    | `longdouble` | 8    | 8     | `d` |
//! | 5/6  | `uint8/sint8`| 1    | 1     | `i` |
//! | 7/8  | `uint16/sint16` | 2 | 2     | `i` |
//! | 9/10 | `uint32/sint32` | 4 | 4     | `i` |
//! | 11/12| `uint64/sint64` | 8 | 8     | `j` |
//! | 13   | `struct`     | —    | —     | —   |
//! | 14   | `pointer`    | 4    | 4     | `i` |
//! | 15   | `complex`    | —    | —     | —   |
//!
//! `longdouble` is a 64-bit double surrogate here: anything beyond double
//! precision is not representable.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A primitive argument/return kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u16)]
pub enum TypeTag {
    Void = 0,
    Int = 1,
    Float = 2,
    Double = 3,
    LongDouble = 4,
    Uint8 = 5,
    Sint8 = 6,
    Uint16 = 7,
    Sint16 = 8,
    Uint32 = 9,
    Sint32 = 10,
    Uint64 = 11,
    Sint64 = 12,
    Struct = 13,
    Pointer = 14,
    Complex = 15,
}

/// How a tag travels through a dynamic call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeClass {
    /// No value.
    Void,
    /// Anything that fits a wasm `i32` (8/16/32-bit ints and pointers).
    Int32,
    /// 64-bit integers; native `i64` or split into two `i32` words.
    Int64,
    Float32,
    /// `double` and the `longdouble` surrogate.
    Float64,
    /// `struct` and `complex`: no layout is known, never marshaled.
    Aggregate,
}

impl TypeTag {
    /// Every tag, in code order.
    pub const ALL: [TypeTag; 16] = [
        TypeTag::Void,
        TypeTag::Int,
        TypeTag::Float,
        TypeTag::Double,
        TypeTag::LongDouble,
        TypeTag::Uint8,
        TypeTag::Sint8,
        TypeTag::Uint16,
        TypeTag::Sint16,
        TypeTag::Uint32,
        TypeTag::Sint32,
        TypeTag::Uint64,
        TypeTag::Sint64,
        TypeTag::Struct,
        TypeTag::Pointer,
        TypeTag::Complex,
    ];

    /// Resolve a raw type code. Returns `None` for out-of-range codes.
    pub fn from_code(code: u16) -> Option<Self> {
        Self::ALL.get(code as usize).copied()
    }

    pub fn code(self) -> u16 {
        self as u16
    }

    pub fn class(self) -> TypeClass {
        match self {
            TypeTag::Void => TypeClass::Void,
            TypeTag::Int
            | TypeTag::Uint8
            | TypeTag::Sint8
            | TypeTag::Uint16
            | TypeTag::Sint16
            | TypeTag::Uint32
            | TypeTag::Sint32
            | TypeTag::Pointer => TypeClass::Int32,
            TypeTag::Uint64 | TypeTag::Sint64 => TypeClass::Int64,
            TypeTag::Float => TypeClass::Float32,
            TypeTag::Double | TypeTag::LongDouble => TypeClass::Float64,
            TypeTag::Struct | TypeTag::Complex => TypeClass::Aggregate,
        }
    }

    /// Storage width in bytes on wasm32. Aggregates report 0.
    pub fn size(self) -> u32 {
        match self {
            TypeTag::Void | TypeTag::Uint8 | TypeTag::Sint8 => 1,
            TypeTag::Uint16 | TypeTag::Sint16 => 2,
            TypeTag::Int
            | TypeTag::Float
            | TypeTag::Uint32
            | TypeTag::Sint32
            | TypeTag::Pointer => 4,
            TypeTag::Double | TypeTag::LongDouble | TypeTag::Uint64 | TypeTag::Sint64 => 8,
            TypeTag::Struct | TypeTag::Complex => 0,
        }
    }

    /// Natural alignment in bytes on wasm32. Aggregates report 0.
    pub fn alignment(self) -> u32 {
        self.size()
    }

    pub fn is_aggregate(self) -> bool {
        self.class() == TypeClass::Aggregate
    }

    /// Lowercase name, as used in serialized descriptors.
    pub fn name(self) -> &'static str {
        match self {
            TypeTag::Void => "void",
            TypeTag::Int => "int",
            TypeTag::Float => "float",
            TypeTag::Double => "double",
            TypeTag::LongDouble => "longdouble",
            TypeTag::Uint8 => "uint8",
            TypeTag::Sint8 => "sint8",
            TypeTag::Uint16 => "uint16",
            TypeTag::Sint16 => "sint16",
            TypeTag::Uint32 => "uint32",
            TypeTag::Sint32 => "sint32",
            TypeTag::Uint64 => "uint64",
            TypeTag::Sint64 => "sint64",
            TypeTag::Struct => "struct",
            TypeTag::Pointer => "pointer",
            TypeTag::Complex => "complex",
        }
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
