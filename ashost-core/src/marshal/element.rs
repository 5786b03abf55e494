use crate::rtti::ElementKind;

/// A host type that can be stored in a typed guest array.
pub trait Element: Copy + PartialEq + core::fmt::Debug + 'static {
    const KIND: ElementKind;

    /// Decode from exactly `KIND.width()` little-endian bytes.
    fn read_le(bytes: &[u8]) -> Self;

    /// Encode into exactly `KIND.width()` bytes.
    fn write_le(self, out: &mut [u8]);
}

macro_rules! impl_element {
    ($($ty:ty => $kind:ident),* $(,)?) => {
        $(
            impl Element for $ty {
                const KIND: ElementKind = ElementKind::$kind;

                #[inline]
                fn read_le(bytes: &[u8]) -> Self {
                    let mut raw = [0u8; core::mem::size_of::<$ty>()];
                    raw.copy_from_slice(bytes);
                    <$ty>::from_le_bytes(raw)
                }

                #[inline]
                fn write_le(self, out: &mut [u8]) {
                    out.copy_from_slice(&self.to_le_bytes());
                }
            }
        )*
    };
}

impl_element! {
    i8 => I8,
    u8 => U8,
    i16 => I16,
    u16 => U16,
    i32 => I32,
    u32 => U32,
    i64 => I64,
    u64 => U64,
    f32 => F32,
    f64 => F64,
}

/// A byte that saturates instead of wrapping when built from a float.
#[repr(transparent)]
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash)]
pub struct ClampedU8(pub u8);

impl From<f64> for ClampedU8 {
    fn from(value: f64) -> Self {
        if value.is_nan() {
            return ClampedU8(0);
        }
        // Round half to even, like a clamped byte array store.
        ClampedU8(value.clamp(0.0, 255.0).round_ties_even() as u8)
    }
}

impl From<u8> for ClampedU8 {
    fn from(value: u8) -> Self {
        ClampedU8(value)
    }
}

impl Element for ClampedU8 {
    const KIND: ElementKind = ElementKind::U8Clamped;

    fn read_le(bytes: &[u8]) -> Self {
        ClampedU8(bytes[0])
    }

    fn write_le(self, out: &mut [u8]) {
        out[0] = self.0;
    }
}

/// Owned array contents tagged with their element kind.
#[derive(Clone, Debug, PartialEq)]
pub enum ArrayValues {
    I8(Vec<i8>),
    U8(Vec<u8>),
    U8Clamped(Vec<ClampedU8>),
    I16(Vec<i16>),
    U16(Vec<u16>),
    I32(Vec<i32>),
    U32(Vec<u32>),
    I64(Vec<i64>),
    U64(Vec<u64>),
    F32(Vec<f32>),
    F64(Vec<f64>),
}

impl ArrayValues {
    pub fn kind(&self) -> ElementKind {
        match self {
            ArrayValues::I8(_) => ElementKind::I8,
            ArrayValues::U8(_) => ElementKind::U8,
            ArrayValues::U8Clamped(_) => ElementKind::U8Clamped,
            ArrayValues::I16(_) => ElementKind::I16,
            ArrayValues::U16(_) => ElementKind::U16,
            ArrayValues::I32(_) => ElementKind::I32,
            ArrayValues::U32(_) => ElementKind::U32,
            ArrayValues::I64(_) => ElementKind::I64,
            ArrayValues::U64(_) => ElementKind::U64,
            ArrayValues::F32(_) => ElementKind::F32,
            ArrayValues::F64(_) => ElementKind::F64,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            ArrayValues::I8(v) => v.len(),
            ArrayValues::U8(v) => v.len(),
            ArrayValues::U8Clamped(v) => v.len(),
            ArrayValues::I16(v) => v.len(),
            ArrayValues::U16(v) => v.len(),
            ArrayValues::I32(v) => v.len(),
            ArrayValues::U32(v) => v.len(),
            ArrayValues::I64(v) => v.len(),
            ArrayValues::U64(v) => v.len(),
            ArrayValues::F32(v) => v.len(),
            ArrayValues::F64(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
