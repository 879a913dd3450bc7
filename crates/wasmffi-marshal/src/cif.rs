//! Call descriptors as laid out in wasm32 linear memory.
//!
//! ```text
//! ffi_cif (24 bytes)             ffi_type (12 bytes)
//! +0  abi        u32             +0  size       u32
//! +4  nargs      u32             +4  alignment  u16
//! +8  arg_types  u32 → [u32; N]  +6  type       u16
//! +12 rtype      u32 → ffi_type  +8  elements   u32
//! +16 bytes      u32
//! +20 flags      u32
//! ```
//!
//! Each entry of `arg_types` points at an `ffi_type`; only its `type` field
//! is consulted. The argument slot vector (`avalue`) is `N` consecutive u32
//! addresses.

use wasmffi_types::{Abi, CallDescriptor, MarshalError, MarshalResult, TypeCode};

use crate::memory::{HeapRead, HeapWrite};

pub const CIF_SIZE: u32 = 24;
pub const FFI_TYPE_SIZE: u32 = 12;

const CIF_ABI: u32 = 0;
const CIF_NARGS: u32 = 1;
const CIF_ARG_TYPES: u32 = 2;
const CIF_RTYPE: u32 = 3;
const CIF_BYTES: u32 = 4;
const CIF_FLAGS: u32 = 5;

/// Byte offset of the `type` field within an `ffi_type`.
const FFI_TYPE_TYPE: u32 = 6;

/// Upper bound on `nargs` accepted from memory, so a corrupt cif cannot
/// trigger a huge allocation before bounds checks catch it.
const MAX_NARGS: u32 = 1 << 16;

// Halfword indices into an `ffi_type`, so no address arithmetic happens
// outside the bounds-checked accessors.
const FFI_TYPE_ALIGNMENT_HALF: u32 = 2;
const FFI_TYPE_TYPE_HALF: u32 = FFI_TYPE_TYPE / 2;
const FFI_TYPE_ELEMENTS_WORD: u32 = 2;

fn type_code(mem: &[u8], ffi_type: u32) -> MarshalResult<TypeCode> {
    Ok(TypeCode(mem.load_u16(ffi_type, FFI_TYPE_TYPE_HALF)?))
}

/// Decode the cif at `addr`.
pub fn read_descriptor(mem: &[u8], addr: u32) -> MarshalResult<CallDescriptor> {
    let abi = mem.load_u32(addr, CIF_ABI)?;
    let nargs = mem.load_u32(addr, CIF_NARGS)?;
    let arg_types = mem.load_u32(addr, CIF_ARG_TYPES)?;
    let rtype = mem.load_u32(addr, CIF_RTYPE)?;

    if nargs > MAX_NARGS {
        return Err(MarshalError::OutOfBounds {
            addr: arg_types as u64,
            len: nargs.saturating_mul(4),
        });
    }

    let codes = (0..nargs)
        .map(|i| type_code(mem, mem.load_u32(arg_types, i)?))
        .collect::<MarshalResult<Vec<_>>>()?;

    Ok(CallDescriptor {
        abi: Abi(abi),
        rtype: type_code(mem, rtype)?,
        arg_types: codes,
    })
}

/// Read `n` argument slot addresses starting at `avalue`.
pub fn read_slots(mem: &[u8], avalue: u32, n: usize) -> MarshalResult<Vec<u32>> {
    (0..n as u32).map(|i| mem.load_u32(avalue, i)).collect()
}

/// Where [`write_descriptor`] put things.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StagedCif {
    /// Address of the `ffi_cif` itself.
    pub addr: u32,
    /// First free byte after everything written.
    pub end: u32,
}

/// Lay out `cif` in memory starting at `base` (rounded up to 4).
///
/// Writes one `ffi_type` per distinct type code, then the argument type
/// array, then the `ffi_cif`. The `bytes` field is the packed, aligned size
/// of the argument block; `flags` is zero.
pub fn write_descriptor(mem: &mut [u8], base: u32, cif: &CallDescriptor) -> MarshalResult<StagedCif> {
    let mut at = align_up(base, 4).ok_or(overflow(base, 4))?;
    let mut types: Vec<(TypeCode, u32)> = Vec::new();

    for &code in std::iter::once(&cif.rtype).chain(&cif.arg_types) {
        if types.iter().any(|(c, _)| *c == code) {
            continue;
        }
        let (size, align) = code.tag().map_or((0, 0), |t| (t.size(), t.alignment()));
        mem.store_u32(at, 0, size)?;
        mem.store_u16(at, FFI_TYPE_ALIGNMENT_HALF, align as u16)?;
        mem.store_u16(at, FFI_TYPE_TYPE_HALF, code.0)?;
        mem.store_u32(at, FFI_TYPE_ELEMENTS_WORD, 0)?;
        types.push((code, at));
        at = advance(at, FFI_TYPE_SIZE as u64)?;
    }
    let addr_of = |code: TypeCode| types.iter().find(|(c, _)| *c == code).map_or(0, |(_, a)| *a);

    let arg_types = at;
    for (i, &code) in cif.arg_types.iter().enumerate() {
        mem.store_u32(arg_types, i as u32, addr_of(code))?;
    }
    at = advance(at, 4 * cif.nargs() as u64)?;

    let bytes = cif
        .arg_types
        .iter()
        .filter_map(|c| c.tag())
        .try_fold(0u32, |acc, t| align_up(acc, t.alignment().max(1))?.checked_add(t.size()))
        .ok_or(overflow(0, u32::MAX))?;

    let addr = at;
    mem.store_u32(addr, CIF_ABI, cif.abi.0)?;
    mem.store_u32(addr, CIF_NARGS, cif.nargs() as u32)?;
    mem.store_u32(addr, CIF_ARG_TYPES, arg_types)?;
    mem.store_u32(addr, CIF_RTYPE, addr_of(cif.rtype))?;
    mem.store_u32(addr, CIF_BYTES, bytes)?;
    mem.store_u32(addr, CIF_FLAGS, 0)?;

    Ok(StagedCif {
        addr,
        end: advance(addr, CIF_SIZE as u64)?,
    })
}

fn overflow(addr: u32, len: u32) -> MarshalError {
    MarshalError::OutOfBounds {
        addr: addr as u64,
        len,
    }
}

/// `at + by`, failing past the end of the 32-bit address space.
fn advance(at: u32, by: u64) -> MarshalResult<u32> {
    u32::try_from(at as u64 + by).map_err(|_| overflow(at, u32::try_from(by).unwrap_or(u32::MAX)))
}

fn align_up(v: u32, align: u32) -> Option<u32> {
    v.checked_next_multiple_of(align)
}
