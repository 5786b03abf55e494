//! Array and typed-array layouts.

use crate::abi::view_layout;
use crate::error::{BridgeError, Result};
use crate::heap::Heap;
use crate::rtti::{ElementKind, TypeFlags};

use super::element::{ArrayValues, ClampedU8, Element};

/// Zero-copy view of an array's elements in linear memory.
///
/// Borrows the bridge, so it cannot be held across an allocation.
#[derive(Clone, Copy, Debug)]
pub struct ArrayView<'a> {
    kind: ElementKind,
    bytes: &'a [u8],
}

impl<'a> ArrayView<'a> {
    pub fn new(kind: ElementKind, bytes: &'a [u8]) -> Self {
        Self { kind, bytes }
    }

    pub fn kind(&self) -> ElementKind {
        self.kind
    }

    pub fn len(&self) -> usize {
        self.bytes.len() / self.kind.width()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Raw element bytes.
    pub fn as_bytes(&self) -> &'a [u8] {
        self.bytes
    }

    /// Element `index`, read as `T`. `T` must match the view's layout.
    pub fn get<T: Element>(&self, index: usize) -> Result<Option<T>> {
        self.check::<T>()?;
        let width = self.kind.width();
        let range = index
            .checked_mul(width)
            .and_then(|start| Some(start..start.checked_add(width)?));
        Ok(range.and_then(|r| self.bytes.get(r)).map(T::read_le))
    }

    pub fn iter<T: Element>(&self) -> Result<impl Iterator<Item = T> + 'a> {
        self.check::<T>()?;
        Ok(self.bytes.chunks_exact(self.kind.width()).map(T::read_le))
    }

    pub fn to_vec<T: Element>(&self) -> Result<Vec<T>> {
        Ok(self.iter::<T>()?.collect())
    }

    /// Copy out as whatever kind the view has.
    pub fn to_values(&self) -> ArrayValues {
        fn collect<T: Element>(bytes: &[u8]) -> Vec<T> {
            bytes.chunks_exact(T::KIND.width()).map(T::read_le).collect()
        }
        let b = self.bytes;
        match self.kind {
            ElementKind::I8 => ArrayValues::I8(collect(b)),
            ElementKind::U8 => ArrayValues::U8(collect(b)),
            ElementKind::U8Clamped => ArrayValues::U8Clamped(collect::<ClampedU8>(b)),
            ElementKind::I16 => ArrayValues::I16(collect(b)),
            ElementKind::U16 => ArrayValues::U16(collect(b)),
            ElementKind::I32 => ArrayValues::I32(collect(b)),
            ElementKind::U32 => ArrayValues::U32(collect(b)),
            ElementKind::I64 => ArrayValues::I64(collect(b)),
            ElementKind::U64 => ArrayValues::U64(collect(b)),
            ElementKind::F32 => ArrayValues::F32(collect(b)),
            ElementKind::F64 => ArrayValues::F64(collect(b)),
        }
    }

    fn check<T: Element>(&self) -> Result<()> {
        if T::KIND.same_layout(self.kind) {
            Ok(())
        } else {
            Err(BridgeError::ElementMismatch {
                id: 0,
                expected: self.kind,
            })
        }
    }
}

/// Locate the elements of the array object at `ptr` using its RTTI `flags`.
///
/// Static arrays are their own storage. `Array<T>` records its element count;
/// other views derive it from the size of the backing buffer.
pub fn locate(heap: &Heap<'_>, ptr: u32, flags: TypeFlags) -> Result<(u32, usize)> {
    let kind = flags.element_kind()?;
    let align = kind.align_log2();
    if flags.contains(TypeFlags::STATICARRAY) {
        let size = heap.header(ptr)?.size;
        return Ok((ptr, (size >> align) as usize));
    }
    let data_start = heap.field(ptr, view_layout::DATASTART_OFFSET)?;
    let length = if flags.contains(TypeFlags::ARRAY) {
        heap.field(ptr, view_layout::LENGTH_OFFSET)?
    } else {
        heap.header(data_start)?.size >> align
    };
    Ok((data_start, length as usize))
}

/// Bytes of a buffer view, from its own `dataStart` and `byteLength` fields.
pub fn typed_view_bytes<'a>(heap: &Heap<'a>, ptr: u32, kind: ElementKind) -> Result<&'a [u8]> {
    let data_start = heap.field(ptr, view_layout::DATASTART_OFFSET)?;
    let byte_length = heap.field(ptr, view_layout::BYTELENGTH_OFFSET)?;
    let length = (byte_length >> kind.align_log2()) as usize;
    heap.slice(data_start, length * kind.width())
}

/// How to initialise a new array.
#[derive(Clone, Copy, Debug)]
pub enum ArrayInit<'v, T: Element> {
    /// Zeroed storage for this many elements.
    Capacity(u32),
    /// Copy these values in.
    Values(&'v [T]),
}

impl<'v, T: Element> ArrayInit<'v, T> {
    pub fn len(&self) -> u32 {
        match self {
            ArrayInit::Capacity(n) => *n,
            ArrayInit::Values(v) => v.len() as u32,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<'v, T: Element> From<&'v [T]> for ArrayInit<'v, T> {
    fn from(values: &'v [T]) -> Self {
        ArrayInit::Values(values)
    }
}

impl<'v, T: Element, const N: usize> From<&'v [T; N]> for ArrayInit<'v, T> {
    fn from(values: &'v [T; N]) -> Self {
        ArrayInit::Values(values.as_slice())
    }
}

impl<'v, T: Element> From<&'v Vec<T>> for ArrayInit<'v, T> {
    fn from(values: &'v Vec<T>) -> Self {
        ArrayInit::Values(values.as_slice())
    }
}
