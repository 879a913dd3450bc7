//! Typed, bounds-checked access to wasm32 linear memory.
//!
//! Addressing mirrors the heap views a wasm host works with: a base address
//! plus an element index scaled by the element width, so
//! `load_u32(addr, 2)` reads the third word at `addr`. All values are
//! little-endian. Every access checks `addr + index * width + width` against
//! the buffer and fails with [`MarshalError::OutOfBounds`] instead of
//! wrapping or panicking.

use wasmffi_types::{MarshalError, MarshalResult};

fn range(len: usize, addr: u32, index: u32, width: u32) -> MarshalResult<std::ops::Range<usize>> {
    let start = addr as u64 + index as u64 * width as u64;
    let end = start + width as u64;
    if end > len as u64 {
        return Err(MarshalError::OutOfBounds { addr: start, len: width });
    }
    Ok(start as usize..end as usize)
}

macro_rules! loads {
    ($($name:ident: $ty:ty;)*) => {
        $(
            fn $name(&self, addr: u32, index: u32) -> MarshalResult<$ty> {
                const W: usize = std::mem::size_of::<$ty>();
                let bytes = self.read_bytes::<W>(addr, index)?;
                Ok(<$ty>::from_le_bytes(bytes))
            }
        )*
    };
}

macro_rules! stores {
    ($($name:ident: $ty:ty;)*) => {
        $(
            fn $name(&mut self, addr: u32, index: u32, value: $ty) -> MarshalResult<()> {
                self.write_bytes(addr, index, &value.to_le_bytes())
            }
        )*
    };
}

/// Reads from a linear-memory byte buffer.
pub trait HeapRead {
    fn heap(&self) -> &[u8];

    /// Read `N` bytes of element `index` (width `N`) at `addr`.
    fn read_bytes<const N: usize>(&self, addr: u32, index: u32) -> MarshalResult<[u8; N]> {
        let heap = self.heap();
        let r = range(heap.len(), addr, index, N as u32)?;
        let mut out = [0u8; N];
        out.copy_from_slice(&heap[r]);
        Ok(out)
    }

    loads! {
        load_u8: u8;
        load_i8: i8;
        load_u16: u16;
        load_i16: i16;
        load_u32: u32;
        load_i32: i32;
        load_u64: u64;
        load_i64: i64;
        load_f32: f32;
        load_f64: f64;
    }
}

/// Writes into a linear-memory byte buffer.
pub trait HeapWrite: HeapRead {
    fn heap_mut(&mut self) -> &mut [u8];

    fn write_bytes(&mut self, addr: u32, index: u32, bytes: &[u8]) -> MarshalResult<()> {
        let heap = self.heap_mut();
        let r = range(heap.len(), addr, index, bytes.len() as u32)?;
        heap[r].copy_from_slice(bytes);
        Ok(())
    }

    stores! {
        store_u8: u8;
        store_u16: u16;
        store_i32: i32;
        store_u32: u32;
        store_u64: u64;
        store_i64: i64;
        store_f32: f32;
        store_f64: f64;
    }
}

impl HeapRead for [u8] {
    fn heap(&self) -> &[u8] {
        self
    }
}

impl HeapWrite for [u8] {
    fn heap_mut(&mut self) -> &mut [u8] {
        self
    }
}
