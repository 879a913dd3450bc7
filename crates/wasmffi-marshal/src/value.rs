//! Values passed through a dynamic call.

use std::fmt;

/// A wasm value kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueType {
    I32,
    I64,
    F32,
    F64,
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ValueType::I32 => "i32",
            ValueType::I64 => "i64",
            ValueType::F32 => "f32",
            ValueType::F64 => "f64",
        })
    }
}

/// One decoded argument, or the raw result of a call.
///
/// Floats compare by value; use [`Value::to_bits`] for bit-exact checks.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Value {
    I32(i32),
    I64(i64),
    F32(f32),
    F64(f64),
}

impl Value {
    pub fn ty(&self) -> ValueType {
        match self {
            Value::I32(_) => ValueType::I32,
            Value::I64(_) => ValueType::I64,
            Value::F32(_) => ValueType::F32,
            Value::F64(_) => ValueType::F64,
        }
    }

    /// Raw bit pattern, zero-extended to 64 bits.
    pub fn to_bits(&self) -> u64 {
        match *self {
            Value::I32(v) => v as u32 as u64,
            Value::I64(v) => v as u64,
            Value::F32(v) => v.to_bits() as u64,
            Value::F64(v) => v.to_bits(),
        }
    }

    pub fn as_i32(&self) -> Option<i32> {
        match *self {
            Value::I32(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match *self {
            Value::I64(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_f32(&self) -> Option<f32> {
        match *self {
            Value::F32(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match *self {
            Value::F64(v) => Some(v),
            _ => None,
        }
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::I32(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::I64(v)
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Value::F32(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::F64(v)
    }
}

/// What the invocation primitive hands back.
///
/// `high` is the side-channel word of a split 64-bit return (the value a
/// legalized callee leaves in its extra return register). It is only
/// meaningful when the call returned `j` under split-word dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct RawReturn {
    pub value: Option<Value>,
    pub high: Option<u32>,
}

impl RawReturn {
    pub fn void() -> Self {
        Self::default()
    }

    pub fn value(value: impl Into<Value>) -> Self {
        Self {
            value: Some(value.into()),
            high: None,
        }
    }

    /// A split 64-bit return: low word as the value, high word on the side.
    pub fn split(wide: u64) -> Self {
        Self {
            value: Some(Value::I32(wide as u32 as i32)),
            high: Some((wide >> 32) as u32),
        }
    }
}
