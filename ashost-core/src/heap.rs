//! Validated access to managed objects in linear memory.
//!
//! A [`Heap`] is a view of the memory bytes taken for the duration of one
//! operation. It never outlives the borrow of the store it came from, so a
//! memory growth (which needs `&mut Store`) can never leave a stale view behind.

use crate::abi::{ID_OFFSET, SIZE_OFFSET};
use crate::error::{BridgeError, Result};

/// The 8-byte header in front of every managed object.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Header {
    pub id: u32,
    pub size: u32,
}

/// Read-only view of linear memory.
#[derive(Clone, Copy)]
pub struct Heap<'a> {
    bytes: &'a [u8],
}

impl<'a> Heap<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes }
    }

    pub fn bytes(&self) -> &'a [u8] {
        self.bytes
    }

    pub fn slice(&self, ptr: u32, len: usize) -> Result<&'a [u8]> {
        let start = ptr as usize;
        start
            .checked_add(len)
            .and_then(|end| self.bytes.get(start..end))
            .ok_or(BridgeError::OutOfBounds {
                ptr: ptr as u64,
                len: len as u64,
            })
    }

    pub fn u32_at(&self, ptr: u32) -> Result<u32> {
        let b = self.slice(ptr, 4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    /// The `u32` field `offset` bytes into the object at `ptr`.
    pub fn field(&self, ptr: u32, offset: u32) -> Result<u32> {
        self.u32_at(field_address(ptr, offset)?)
    }

    /// Header of the object at `handle`.
    pub fn header(&self, handle: u32) -> Result<Header> {
        let base = handle as i64;
        let id_at = base + ID_OFFSET;
        if id_at < 0 {
            return Err(BridgeError::OutOfBounds {
                ptr: handle as u64,
                len: 8,
            });
        }
        Ok(Header {
            id: self.u32_at(id_at as u32)?,
            size: self.u32_at((base + SIZE_OFFSET) as u32)?,
        })
    }

    /// Resolve `handle` as an object of type `expected`.
    pub fn object(&self, handle: u32, expected: u32) -> Result<Object<'a>> {
        let header = self.header(handle)?;
        if header.id != expected {
            return Err(BridgeError::TypeMismatch {
                ptr: handle,
                expected,
                found: header.id,
            });
        }
        self.object_unchecked(handle, header)
    }

    /// Resolve `handle` with whatever type its header declares.
    pub fn any_object(&self, handle: u32) -> Result<Object<'a>> {
        let header = self.header(handle)?;
        self.object_unchecked(handle, header)
    }

    fn object_unchecked(&self, handle: u32, header: Header) -> Result<Object<'a>> {
        let payload = self.slice(handle, header.size as usize)?;
        Ok(Object {
            ptr: handle,
            header,
            payload,
        })
    }
}

/// A managed object whose header has been checked.
#[derive(Clone, Copy, Debug)]
pub struct Object<'a> {
    pub ptr: u32,
    pub header: Header,
    pub payload: &'a [u8],
}

/// `ptr + offset`, unless that leaves the 32-bit address space.
pub fn field_address(ptr: u32, offset: u32) -> Result<u32> {
    ptr.checked_add(offset).ok_or(BridgeError::OutOfBounds {
        ptr: ptr as u64,
        len: offset as u64 + 4,
    })
}

/// Mutable view of linear memory.
pub struct HeapMut<'a> {
    bytes: &'a mut [u8],
}

impl<'a> HeapMut<'a> {
    pub fn new(bytes: &'a mut [u8]) -> Self {
        Self { bytes }
    }

    pub fn slice_mut(&mut self, ptr: u32, len: usize) -> Result<&mut [u8]> {
        let start = ptr as usize;
        start
            .checked_add(len)
            .and_then(|end| self.bytes.get_mut(start..end))
            .ok_or(BridgeError::OutOfBounds {
                ptr: ptr as u64,
                len: len as u64,
            })
    }

    pub fn write_u32(&mut self, ptr: u32, value: u32) -> Result<()> {
        self.slice_mut(ptr, 4)?.copy_from_slice(&value.to_le_bytes());
        Ok(())
    }

    pub fn write_field(&mut self, ptr: u32, offset: u32, value: u32) -> Result<()> {
        self.write_u32(field_address(ptr, offset)?, value)
    }

    pub fn write_bytes(&mut self, ptr: u32, data: &[u8]) -> Result<()> {
        self.slice_mut(ptr, data.len())?.copy_from_slice(data);
        Ok(())
    }
}
