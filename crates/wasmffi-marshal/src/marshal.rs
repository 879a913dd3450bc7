//! The call marshaler: decode arguments, dispatch, encode the result.
//!
//! One call is a single synchronous pass:
//! 1. Resolve the return type (aggregates fail here, before any argument
//!    is read).
//! 2. Decode each argument slot into a [`Value`] and append its signature
//!    character.
//! 3. Hand the values to [`Host::dyn_call`], with the signature under
//!    split-word dispatch and without it under direct apply.
//! 4. Encode the raw result into the result slot. Nothing is written before
//!    the call has succeeded.
//!
//! The descriptor is only read. The value list and signature live for one
//! call, so any number of calls may share a descriptor.

use log::{debug, trace};

use wasmffi_types::{CallDescriptor, MarshalError, MarshalResult, Position, TypeCode, TypeTag};

use crate::cif;
use crate::host::{CallRequest, FuncRef, Host, WideIntStrategy};
use crate::memory::{HeapRead, HeapWrite};
use crate::signature::{SigChar, Signature};
use crate::value::{RawReturn, Value};

/// Machine-dependent preparation of a descriptor.
///
/// wasm32 needs no layout or trampoline work, so this always succeeds. It
/// exists so callers can keep the usual prepare-once, call-many lifecycle.
pub fn prepare(cif: &CallDescriptor) -> MarshalResult<()> {
    trace!("prepared {cif}");
    Ok(())
}

/// Call `target` with the arguments at `avalue`, storing the result at
/// `rvalue`.
///
/// `avalue` holds one linear-memory address per declared argument; each
/// address points at that argument's storage. `rvalue` is ignored for void
/// returns.
pub fn invoke<H: Host + ?Sized>(
    host: &mut H,
    cif: &CallDescriptor,
    target: FuncRef,
    rvalue: u32,
    avalue: &[u32],
) -> MarshalResult<()> {
    let strategy = host.wide_int_strategy();
    let (rtype, ret) = resolve_return(cif).inspect_err(|e| debug!("rejected {cif}: {e}"))?;

    if avalue.len() != cif.nargs() {
        return Err(MarshalError::ArgumentCount {
            expected: cif.nargs(),
            actual: avalue.len(),
        });
    }

    let mut sig = Signature::new(ret);
    let mut args = Vec::with_capacity(cif.nargs() * 2);

    let mem = host.memory();
    for (i, (&code, &ptr)) in cif.arg_types.iter().zip(avalue).enumerate() {
        let c = decode_arg(mem, Position::Argument(i), code, ptr, strategy, &mut args)
            .inspect_err(|e| debug!("rejected {cif}: {e}"))?;
        sig.push(c);
    }

    trace!("dyn_call target={} sig={sig} strategy={strategy:?}", target.0);
    let signature = match strategy {
        WideIntStrategy::Native => None,
        WideIntStrategy::SplitWords => Some(&sig),
    };
    let raw = host
        .dyn_call(CallRequest {
            target,
            signature,
            args: &args,
        })
        .inspect_err(|e| debug!("call to {} ({sig}) failed: {e}", target.0))?;

    encode_result(host.memory_mut(), rtype, rvalue, raw, strategy)
}

/// Like [`invoke`], but with the descriptor and slot vector read out of
/// linear memory (`cif_addr` points at an in-memory cif, `avalue_addr` at
/// its argument pointer array).
pub fn invoke_raw<H: Host + ?Sized>(
    host: &mut H,
    cif_addr: u32,
    target: FuncRef,
    rvalue: u32,
    avalue_addr: u32,
) -> MarshalResult<()> {
    let cif = cif::read_descriptor(host.memory(), cif_addr)?;
    let slots = cif::read_slots(host.memory(), avalue_addr, cif.nargs())?;
    invoke(host, &cif, target, rvalue, &slots)
}

/// Build the signature a descriptor dispatches through, without calling
/// anything. Fails the same way [`invoke`] would on bad tags.
pub fn signature_of(cif: &CallDescriptor) -> MarshalResult<Signature> {
    let (_, ret) = resolve_return(cif)?;
    let mut sig = Signature::new(ret);
    for (i, &code) in cif.arg_types.iter().enumerate() {
        let (_, c) = resolve_arg(code, Position::Argument(i))?;
        sig.push(c);
    }
    Ok(sig)
}

/// Resolve a code to a non-aggregate tag.
fn resolve(code: TypeCode, position: Position) -> MarshalResult<TypeTag> {
    let tag = code.resolve(position)?;
    if tag.is_aggregate() {
        return Err(MarshalError::UnsupportedAggregateType { position, tag });
    }
    Ok(tag)
}

/// Resolve the return tag and its signature character.
fn resolve_return(cif: &CallDescriptor) -> MarshalResult<(TypeTag, SigChar)> {
    let tag = resolve(cif.rtype, Position::Return)?;
    let c = SigChar::for_class(tag.class()).ok_or(MarshalError::UnsupportedAggregateType {
        position: Position::Return,
        tag,
    })?;
    Ok((tag, c))
}

/// Resolve an argument tag and its signature character. `void` and the
/// aggregates have no argument form.
fn resolve_arg(code: TypeCode, position: Position) -> MarshalResult<(TypeTag, SigChar)> {
    let tag = resolve(code, position)?;
    match SigChar::for_class(tag.class()) {
        Some(SigChar::Void) | None => Err(not_an_argument(tag, code, position)),
        Some(c) => Ok((tag, c)),
    }
}

fn not_an_argument(tag: TypeTag, code: TypeCode, position: Position) -> MarshalError {
    if tag.is_aggregate() {
        MarshalError::UnsupportedAggregateType { position, tag }
    } else {
        MarshalError::UnknownTypeTag { position, code: code.0 }
    }
}

fn decode_arg(
    mem: &[u8],
    position: Position,
    code: TypeCode,
    ptr: u32,
    strategy: WideIntStrategy,
    args: &mut Vec<Value>,
) -> MarshalResult<SigChar> {
    let (tag, c) = resolve_arg(code, position)?;
    let value = match tag {
        TypeTag::Int | TypeTag::Sint32 => Value::I32(mem.load_i32(ptr, 0)?),
        TypeTag::Uint8 => Value::I32(mem.load_u8(ptr, 0)? as i32),
        TypeTag::Sint8 => Value::I32(mem.load_i8(ptr, 0)? as i32),
        TypeTag::Uint16 => Value::I32(mem.load_u16(ptr, 0)? as i32),
        TypeTag::Sint16 => Value::I32(mem.load_i16(ptr, 0)? as i32),
        TypeTag::Uint32 | TypeTag::Pointer => Value::I32(mem.load_u32(ptr, 0)? as i32),
        TypeTag::Float => Value::F32(mem.load_f32(ptr, 0)?),
        TypeTag::Double | TypeTag::LongDouble => Value::F64(mem.load_f64(ptr, 0)?),
        TypeTag::Uint64 | TypeTag::Sint64 => match strategy {
            WideIntStrategy::Native => Value::I64(mem.load_i64(ptr, 0)?),
            WideIntStrategy::SplitWords => {
                let low = mem.load_u32(ptr, 0)?;
                let high = mem.load_u32(ptr, 1)?;
                args.push(Value::I32(low as i32));
                Value::I32(high as i32)
            }
        },
        TypeTag::Void | TypeTag::Struct | TypeTag::Complex => {
            return Err(not_an_argument(tag, code, position))
        }
    };
    args.push(value);
    Ok(c)
}

fn mismatch(tag: TypeTag, got: Option<Value>) -> MarshalError {
    let got = match got {
        Some(v) => v.ty().to_string(),
        None => "nothing".to_string(),
    };
    MarshalError::InvocationFailure(format!("target returned {got} for a {tag} result"))
}

fn encode_result(
    mem: &mut [u8],
    rtype: TypeTag,
    rvalue: u32,
    raw: RawReturn,
    strategy: WideIntStrategy,
) -> MarshalResult<()> {
    if rtype == TypeTag::Void {
        return Ok(());
    }
    let value = raw.value.ok_or_else(|| mismatch(rtype, None))?;
    let int32 = || value.as_i32().ok_or_else(|| mismatch(rtype, Some(value)));

    match rtype {
        TypeTag::Int | TypeTag::Uint32 | TypeTag::Sint32 | TypeTag::Pointer => {
            mem.store_i32(rvalue, 0, int32()?)
        }
        TypeTag::Float => {
            let v = value.as_f32().ok_or_else(|| mismatch(rtype, Some(value)))?;
            mem.store_f32(rvalue, 0, v)
        }
        TypeTag::Double | TypeTag::LongDouble => {
            let v = value.as_f64().ok_or_else(|| mismatch(rtype, Some(value)))?;
            mem.store_f64(rvalue, 0, v)
        }
        TypeTag::Uint8 | TypeTag::Sint8 => mem.store_u8(rvalue, 0, int32()? as u8),
        TypeTag::Uint16 | TypeTag::Sint16 => mem.store_u16(rvalue, 0, int32()? as u16),
        TypeTag::Uint64 | TypeTag::Sint64 => {
            let wide = match strategy {
                WideIntStrategy::Native => {
                    value.as_i64().ok_or_else(|| mismatch(rtype, Some(value)))? as u64
                }
                // The high word never comes from memory: it is whatever the
                // callee left on the side channel.
                WideIntStrategy::SplitWords => {
                    let low = int32()? as u32;
                    let high = raw.high.ok_or_else(|| {
                        MarshalError::InvocationFailure(format!(
                            "{rtype} result is missing its high word"
                        ))
                    })?;
                    ((high as u64) << 32) | low as u64
                }
            };
            mem.store_u64(rvalue, 0, wide)
        }
        TypeTag::Void => Ok(()),
        TypeTag::Struct | TypeTag::Complex => Err(MarshalError::UnsupportedAggregateType {
            position: Position::Return,
            tag: rtype,
        }),
    }
}
