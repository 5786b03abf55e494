//! Runtime type information.
//!
//! The guest keeps a table of `u32` flag words at `__rtti_base`: word 0 is the
//! number of declared type ids, word `1 + id` describes `id`. Only the bits the
//! host needs to interpret collection layouts are decoded here.

use bitflags::bitflags;

use crate::error::{BridgeError, Result};

bitflags! {
    /// Flag word of one RTTI entry.
    #[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
    pub struct TypeFlags: u32 {
        const ARRAYBUFFERVIEW = 1 << 0;
        const ARRAY = 1 << 1;
        const STATICARRAY = 1 << 2;
        const SET = 1 << 3;
        const MAP = 1 << 4;
        const POINTERFREE = 1 << 5;
        const VAL_ALIGN_0 = 1 << 6;
        const VAL_ALIGN_1 = 1 << 7;
        const VAL_ALIGN_2 = 1 << 8;
        const VAL_ALIGN_3 = 1 << 9;
        const VAL_ALIGN_4 = 1 << 10;
        const VAL_SIGNED = 1 << 11;
        const VAL_FLOAT = 1 << 12;
        const VAL_NULLABLE = 1 << 13;
        const VAL_MANAGED = 1 << 14;
    }
}

const VAL_ALIGN_OFFSET: u32 = 6;

impl TypeFlags {
    /// Any of the three array-like kinds.
    pub const ARRAY_KINDS: TypeFlags = TypeFlags::ARRAYBUFFERVIEW
        .union(TypeFlags::ARRAY)
        .union(TypeFlags::STATICARRAY);

    pub fn is_array_like(self) -> bool {
        self.intersects(Self::ARRAY_KINDS)
    }

    /// `log2` of the element width. `-1` when no alignment bit is set.
    pub fn align_log2(self) -> i32 {
        let align = (self.bits() >> VAL_ALIGN_OFFSET) & 31;
        31 - align.leading_zeros() as i32
    }

    /// Element kind for arrays of this type.
    pub fn element_kind(self) -> Result<ElementKind> {
        ElementKind::from_layout(
            self.align_log2(),
            self.contains(TypeFlags::VAL_SIGNED),
            self.contains(TypeFlags::VAL_FLOAT),
        )
    }
}

/// Numeric element kinds a typed view can have.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum ElementKind {
    I8,
    U8,
    /// Same storage as `U8`; saturates when converted from floats.
    U8Clamped,
    I16,
    U16,
    I32,
    U32,
    I64,
    U64,
    F32,
    F64,
}

impl ElementKind {
    /// Pick the view type for `(align_log2, signed, float)`.
    pub fn from_layout(align_log2: i32, signed: bool, float: bool) -> Result<Self> {
        let kind = match (align_log2, float, signed) {
            (2, true, _) => ElementKind::F32,
            (3, true, _) => ElementKind::F64,
            (0, false, true) => ElementKind::I8,
            (0, false, false) => ElementKind::U8,
            (1, false, true) => ElementKind::I16,
            (1, false, false) => ElementKind::U16,
            (2, false, true) => ElementKind::I32,
            (2, false, false) => ElementKind::U32,
            (3, false, true) => ElementKind::I64,
            (3, false, false) => ElementKind::U64,
            (align, _, _) => return Err(BridgeError::UnsupportedAlignment { align }),
        };
        Ok(kind)
    }

    pub const fn align_log2(self) -> u32 {
        match self {
            ElementKind::I8 | ElementKind::U8 | ElementKind::U8Clamped => 0,
            ElementKind::I16 | ElementKind::U16 => 1,
            ElementKind::I32 | ElementKind::U32 | ElementKind::F32 => 2,
            ElementKind::I64 | ElementKind::U64 | ElementKind::F64 => 3,
        }
    }

    pub const fn width(self) -> usize {
        1 << self.align_log2()
    }

    /// Whether values of `self` can be stored in a slot laid out as `other`.
    pub fn same_layout(self, other: ElementKind) -> bool {
        let unify = |k| match k {
            ElementKind::U8Clamped => ElementKind::U8,
            k => k,
        };
        unify(self) == unify(other)
    }
}

/// Reads RTTI entries from a word slice of linear memory.
///
/// `base` is the byte offset of the table (`__rtti_base`).
pub fn layout_of(memory: &[u8], base: u32, id: u32) -> Result<TypeFlags> {
    let count = read_u32(memory, base)?;
    if id >= count {
        return Err(BridgeError::InvalidId { id });
    }
    let word = base as u64 + 4 + id as u64 * 4;
    let flags = read_u32(memory, word as u32)?;
    Ok(TypeFlags::from_bits_retain(flags))
}

/// As [`layout_of`], but the type must be one of the array kinds.
pub fn array_layout_of(memory: &[u8], base: u32, id: u32) -> Result<TypeFlags> {
    let flags = layout_of(memory, base, id)?;
    if !flags.is_array_like() {
        return Err(BridgeError::NotAnArray {
            id,
            flags: flags.bits(),
        });
    }
    Ok(flags)
}

/// Number of type ids declared in the table.
pub fn declared_count(memory: &[u8], base: u32) -> Result<u32> {
    read_u32(memory, base)
}

fn read_u32(memory: &[u8], at: u32) -> Result<u32> {
    let start = at as usize;
    memory
        .get(start..start + 4)
        .map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .ok_or(BridgeError::OutOfBounds {
            ptr: at as u64,
            len: 4,
        })
}
