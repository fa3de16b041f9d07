//! The enumerated element-kind table.
//!
//! Every element type the foreign runtime can allocate on our behalf is a
//! variant of [`ElementKind`]. Rust primitives are mapped onto the table at
//! compile time through [`Element::KIND`]; there is no name-based lookup.

use std::fmt;

/// Primitive element kinds understood by the foreign runtime.
///
/// Discriminants are ABI-stable; the FFI layer passes them as `i32`.
#[repr(i32)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ElementKind {
    /// IEEE-754 binary64.
    Float64 = 0,
    /// IEEE-754 binary32.
    Float32 = 1,
    /// Signed 64-bit integer.
    Int64 = 2,
    /// Signed 32-bit integer.
    Int32 = 3,
    /// Signed 16-bit integer.
    Int16 = 4,
    /// Signed 8-bit integer.
    Int8 = 5,
    /// Unsigned 64-bit integer.
    UInt64 = 6,
    /// Unsigned 32-bit integer.
    UInt32 = 7,
    /// Unsigned 16-bit integer.
    UInt16 = 8,
    /// Unsigned 8-bit integer.
    UInt8 = 9,
}

impl ElementKind {
    /// Every supported kind, in discriminant order.
    pub const ALL: [ElementKind; 10] = [
        ElementKind::Float64,
        ElementKind::Float32,
        ElementKind::Int64,
        ElementKind::Int32,
        ElementKind::Int16,
        ElementKind::Int8,
        ElementKind::UInt64,
        ElementKind::UInt32,
        ElementKind::UInt16,
        ElementKind::UInt8,
    ];

    /// Size of one element in bytes, as the runtime lays it out.
    pub const fn size(self) -> usize {
        match self {
            Self::Float64 | Self::Int64 | Self::UInt64 => 8,
            Self::Float32 | Self::Int32 | Self::UInt32 => 4,
            Self::Int16 | Self::UInt16 => 2,
            Self::Int8 | Self::UInt8 => 1,
        }
    }

    /// The runtime's own name for this type (e.g. `"Float64"`).
    pub const fn type_name(self) -> &'static str {
        match self {
            Self::Float64 => "Float64",
            Self::Float32 => "Float32",
            Self::Int64 => "Int64",
            Self::Int32 => "Int32",
            Self::Int16 => "Int16",
            Self::Int8 => "Int8",
            Self::UInt64 => "UInt64",
            Self::UInt32 => "UInt32",
            Self::UInt16 => "UInt16",
            Self::UInt8 => "UInt8",
        }
    }

    /// Exported symbol of the runtime global holding this kind's type object.
    pub const fn symbol(self) -> &'static str {
        match self {
            Self::Float64 => "jl_float64_type",
            Self::Float32 => "jl_float32_type",
            Self::Int64 => "jl_int64_type",
            Self::Int32 => "jl_int32_type",
            Self::Int16 => "jl_int16_type",
            Self::Int8 => "jl_int8_type",
            Self::UInt64 => "jl_uint64_type",
            Self::UInt32 => "jl_uint32_type",
            Self::UInt16 => "jl_uint16_type",
            Self::UInt8 => "jl_uint8_type",
        }
    }

    /// Decode an ABI discriminant.
    pub fn from_raw(raw: i32) -> Option<Self> {
        Self::ALL.iter().copied().find(|k| *k as i32 == raw)
    }
}

impl fmt::Display for ElementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.type_name())
    }
}

mod sealed {
    pub trait Sealed {}
}

/// A Rust primitive that can be viewed in place inside a foreign array.
///
/// Sealed: the implementations below are the complete table. Every
/// implementor is plain-old-data, so any bit pattern the runtime hands us is
/// a valid value.
pub trait Element: sealed::Sealed + Copy + Send + Sync + fmt::Debug + 'static {
    /// The runtime element kind this type corresponds to.
    const KIND: ElementKind;
}

macro_rules! impl_element {
    ($($ty:ty => $kind:ident),* $(,)?) => {
        $(
            impl sealed::Sealed for $ty {}
            impl Element for $ty {
                const KIND: ElementKind = ElementKind::$kind;
            }
        )*
    };
}

impl_element! {
    f64 => Float64,
    f32 => Float32,
    i64 => Int64,
    i32 => Int32,
    i16 => Int16,
    i8 => Int8,
    u64 => UInt64,
    u32 => UInt32,
    u16 => UInt16,
    u8 => UInt8,
}
