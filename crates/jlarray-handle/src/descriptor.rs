//! Decoding the foreign array header.
//!
//! [`ArrayDescriptor`] is a value snapshot of an [`ArrayHeader`] taken once
//! at wrap time. [`ArrayFlags`] slices the packed 16-bit flag word with
//! explicit masks and shifts, so the bit positions never depend on a
//! compiler's bit-field layout.

use std::ffi::c_void;
use std::fmt;
use std::ptr::NonNull;

use jlarray_core::ArrayError;
use smallvec::smallvec;

use crate::layout::Shape;
use crate::raw::{self, ArrayHeader};

/// Packed flag word of a foreign array header (least significant bit first).
///
/// | bits  | field              |
/// |-------|--------------------|
/// | 0–1   | storage kind (`how`) |
/// | 2–11  | `ndims`            |
/// | 12    | `pooled`           |
/// | 13    | `is_pointer_array` |
/// | 14    | `is_shared`        |
/// | 15    | `is_aligned`       |
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ArrayFlags(u16);

impl ArrayFlags {
    const STORAGE_MASK: u16 = 0x3;
    const NDIMS_SHIFT: u16 = 2;
    const NDIMS_MASK: u16 = 0x3FF;
    const POOLED_BIT: u16 = 12;
    const POINTER_ARRAY_BIT: u16 = 13;
    const SHARED_BIT: u16 = 14;
    const ALIGNED_BIT: u16 = 15;

    /// Largest `ndims` the word can carry.
    pub const MAX_NDIMS: u16 = Self::NDIMS_MASK;

    /// Wrap a raw flag word.
    pub const fn from_bits(bits: u16) -> Self {
        Self(bits)
    }

    /// The raw flag word.
    pub const fn bits(self) -> u16 {
        self.0
    }

    /// Pack individual fields into a flag word.
    ///
    /// `storage` and `ndims` are masked to their widths.
    pub const fn compose(
        storage: u16,
        ndims: u16,
        pooled: bool,
        is_pointer_array: bool,
        is_shared: bool,
        is_aligned: bool,
    ) -> Self {
        Self(
            (storage & Self::STORAGE_MASK)
                | ((ndims & Self::NDIMS_MASK) << Self::NDIMS_SHIFT)
                | ((pooled as u16) << Self::POOLED_BIT)
                | ((is_pointer_array as u16) << Self::POINTER_ARRAY_BIT)
                | ((is_shared as u16) << Self::SHARED_BIT)
                | ((is_aligned as u16) << Self::ALIGNED_BIT),
        )
    }

    /// The 2-bit storage field.
    pub const fn storage_bits(self) -> u16 {
        self.0 & Self::STORAGE_MASK
    }

    /// Decoded storage strategy.
    pub const fn storage_kind(self) -> StorageKind {
        StorageKind::from_bits(self.storage_bits())
    }

    /// Number of dimensions.
    pub const fn ndims(self) -> u16 {
        (self.0 >> Self::NDIMS_SHIFT) & Self::NDIMS_MASK
    }

    /// Storage came from the runtime's small-object pool.
    pub const fn pooled(self) -> bool {
        self.bit(Self::POOLED_BIT)
    }

    /// Elements are boxed references rather than inline values.
    pub const fn is_pointer_array(self) -> bool {
        self.bit(Self::POINTER_ARRAY_BIT)
    }

    /// Storage is shared with another array.
    pub const fn is_shared(self) -> bool {
        self.bit(Self::SHARED_BIT)
    }

    /// Storage is aligned to the runtime's cache-line alignment.
    pub const fn is_aligned(self) -> bool {
        self.bit(Self::ALIGNED_BIT)
    }

    const fn bit(self, at: u16) -> bool {
        (self.0 >> at) & 0x1 == 1
    }
}

impl fmt::Debug for ArrayFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArrayFlags")
            .field("bits", &format_args!("{:#06x}", self.0))
            .field("storage", &self.storage_kind())
            .field("ndims", &self.ndims())
            .field("pooled", &self.pooled())
            .field("is_pointer_array", &self.is_pointer_array())
            .field("is_shared", &self.is_shared())
            .field("is_aligned", &self.is_aligned())
            .finish()
    }
}

/// Where the runtime keeps an array's elements (`how`).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StorageKind {
    /// Elements follow the header in the same allocation.
    Inline,
    /// A buffer managed by the runtime's collector.
    RuntimeBuffer,
    /// A `malloc`ed buffer.
    Malloc,
    /// Elements belong to another object the array points at.
    Owner,
}

impl StorageKind {
    const fn from_bits(bits: u16) -> Self {
        match bits & 0x3 {
            0 => Self::Inline,
            1 => Self::RuntimeBuffer,
            2 => Self::Malloc,
            _ => Self::Owner,
        }
    }
}

/// Read-only snapshot of a foreign array header.
///
/// Holds the `data` address but owns nothing behind it.
#[derive(Clone, Copy, Debug)]
pub struct ArrayDescriptor {
    /// Address of element storage.
    pub data: *mut c_void,
    /// Total element count.
    pub length: usize,
    /// Packed flag word.
    pub flags: ArrayFlags,
    /// Bytes per element as reported by the runtime.
    pub element_size: u16,
    /// Offset field as reported by the runtime.
    pub offset: u32,
    /// First extent.
    pub nrows: usize,
    /// Second extent; `maxsize` when `ndims == 1`.
    pub ncols: usize,
}

impl ArrayDescriptor {
    /// Decode the header at `address`.
    ///
    /// A null address fails with [`ArrayError::InvalidHandle`] before any
    /// memory is touched. Nothing else is validated.
    ///
    /// # Safety
    ///
    /// A non-null `address` must point at a readable header of the layout
    /// described by [`ABI_VERSION`](crate::ABI_VERSION).
    #[allow(unsafe_code)]
    pub unsafe fn decode(address: *const c_void) -> Result<Self, ArrayError> {
        let address = NonNull::new(address.cast_mut()).ok_or(ArrayError::InvalidHandle)?;
        // SAFETY: non-null, and readability is the caller's contract.
        let header = unsafe { raw::read_header(address) };
        Ok(Self::from_header(&header))
    }

    /// Decode an already-copied header.
    pub fn from_header(header: &ArrayHeader) -> Self {
        Self {
            data: header.data,
            length: header.length,
            flags: ArrayFlags::from_bits(header.flags),
            element_size: header.element_size,
            offset: header.offset,
            nrows: header.nrows,
            ncols: header.ncols,
        }
    }

    /// Number of dimensions.
    pub fn ndims(&self) -> u16 {
        self.flags.ndims()
    }

    /// Decoded storage strategy.
    pub fn storage_kind(&self) -> StorageKind {
        self.flags.storage_kind()
    }

    /// Row count for the row/column view.
    ///
    /// 1-D arrays report `length`.
    pub fn row_count(&self) -> Result<usize, ArrayError> {
        match self.ndims() {
            1 => Ok(self.length),
            2 => Ok(self.nrows),
            ndims => Err(ArrayError::DimensionalityUnsupported { ndims }),
        }
    }

    /// Column count for the row/column view.
    ///
    /// 1-D arrays report 1; the header's `ncols` slot holds `maxsize` there.
    pub fn col_count(&self) -> Result<usize, ArrayError> {
        match self.ndims() {
            1 => Ok(1),
            2 => Ok(self.ncols),
            ndims => Err(ArrayError::DimensionalityUnsupported { ndims }),
        }
    }

    /// Extents as `[rows]` or `[rows, cols]`.
    pub fn shape(&self) -> Result<Shape, ArrayError> {
        match self.ndims() {
            1 => Ok(smallvec![self.length]),
            2 => Ok(smallvec![self.nrows, self.ncols]),
            ndims => Err(ArrayError::DimensionalityUnsupported { ndims }),
        }
    }

    /// Buffer capacity of a 1-D array, in elements.
    pub fn max_size(&self) -> Option<usize> {
        (self.ndims() == 1).then_some(self.ncols)
    }

    /// Size of the element storage in bytes.
    pub fn byte_len(&self) -> usize {
        self.length.saturating_mul(self.element_size as usize)
    }
}

#[cfg(test)]
#[allow(unsafe_code)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn header(flags: u16, length: usize, nrows: usize, ncols: usize) -> ArrayHeader {
        ArrayHeader {
            data: std::ptr::null_mut(),
            length,
            flags,
            element_size: 8,
            offset: 0,
            nrows,
            ncols,
        }
    }

    #[test]
    fn slices_hand_built_word() {
        // aligned | ndims = 2 | how = 1
        let bits: u16 = 0b1_0_0_0_0000000010_01;
        let flags = ArrayFlags::from_bits(bits);
        assert_eq!(flags.storage_bits(), 1);
        assert_eq!(flags.storage_kind(), StorageKind::RuntimeBuffer);
        assert_eq!(flags.ndims(), 2);
        assert!(!flags.pooled());
        assert!(!flags.is_pointer_array());
        assert!(!flags.is_shared());
        assert!(flags.is_aligned());
    }

    #[test]
    fn each_single_bit_lands_in_its_field() {
        let pooled = ArrayFlags::from_bits(1 << 12);
        assert!(pooled.pooled());
        assert!(!pooled.is_pointer_array());
        assert_eq!(pooled.ndims(), 0);

        let ptr = ArrayFlags::from_bits(1 << 13);
        assert!(ptr.is_pointer_array());
        assert!(!ptr.pooled());
        assert!(!ptr.is_shared());

        let shared = ArrayFlags::from_bits(1 << 14);
        assert!(shared.is_shared());
        assert!(!shared.is_aligned());
        assert!(!shared.is_pointer_array());
    }

    #[test]
    fn ndims_uses_all_ten_bits() {
        let flags = ArrayFlags::from_bits(0x3FF << 2);
        assert_eq!(flags.ndims(), 1023);
        assert_eq!(flags.storage_bits(), 0);
        assert!(!flags.pooled());
    }

    #[test]
    fn storage_kinds_decode() {
        assert_eq!(ArrayFlags::from_bits(0).storage_kind(), StorageKind::Inline);
        assert_eq!(ArrayFlags::from_bits(2).storage_kind(), StorageKind::Malloc);
        assert_eq!(ArrayFlags::from_bits(3).storage_kind(), StorageKind::Owner);
    }

    #[test]
    fn compose_masks_oversized_fields() {
        let flags = ArrayFlags::compose(0x7, 0x7FF, false, false, false, false);
        assert_eq!(flags.storage_bits(), 0x3);
        assert_eq!(flags.ndims(), 0x3FF);
        assert!(!flags.pooled());
    }

    #[test]
    fn null_address_fails_without_reading() {
        let err = unsafe { ArrayDescriptor::decode(std::ptr::null()) }.unwrap_err();
        assert_eq!(err, ArrayError::InvalidHandle);
    }

    #[test]
    fn decode_reads_live_header() {
        let h = header(ArrayFlags::compose(1, 2, false, false, false, true).bits(), 6, 2, 3);
        let desc = unsafe { ArrayDescriptor::decode((&h as *const ArrayHeader).cast()) }.unwrap();
        assert_eq!(desc.length, 6);
        assert_eq!(desc.ndims(), 2);
        assert_eq!(desc.row_count(), Ok(2));
        assert_eq!(desc.col_count(), Ok(3));
        assert_eq!(desc.byte_len(), 48);
    }

    #[test]
    fn one_dimensional_projection() {
        let h = header(ArrayFlags::compose(0, 1, false, false, false, true).bits(), 5, 5, 8);
        let desc = ArrayDescriptor::from_header(&h);
        assert_eq!(desc.row_count(), Ok(5));
        assert_eq!(desc.col_count(), Ok(1));
        assert_eq!(desc.max_size(), Some(8));
        assert_eq!(desc.shape().unwrap().as_slice(), &[5]);
    }

    #[test]
    fn three_dimensional_decodes_but_has_no_rows() {
        let h = header(ArrayFlags::compose(1, 3, false, false, false, true).bits(), 24, 2, 3);
        let desc = ArrayDescriptor::from_header(&h);
        assert_eq!(desc.ndims(), 3);
        assert_eq!(desc.max_size(), None);
        assert_eq!(
            desc.row_count(),
            Err(ArrayError::DimensionalityUnsupported { ndims: 3 })
        );
        assert_eq!(
            desc.shape(),
            Err(ArrayError::DimensionalityUnsupported { ndims: 3 })
        );
    }

    proptest! {
        #[test]
        fn compose_then_slice_recovers_fields(
            storage in 0u16..4,
            ndims in 0u16..1024,
            pooled in any::<bool>(),
            ptr in any::<bool>(),
            shared in any::<bool>(),
            aligned in any::<bool>(),
        ) {
            let flags = ArrayFlags::compose(storage, ndims, pooled, ptr, shared, aligned);
            prop_assert_eq!(flags.storage_bits(), storage);
            prop_assert_eq!(flags.ndims(), ndims);
            prop_assert_eq!(flags.pooled(), pooled);
            prop_assert_eq!(flags.is_pointer_array(), ptr);
            prop_assert_eq!(flags.is_shared(), shared);
            prop_assert_eq!(flags.is_aligned(), aligned);
        }

        #[test]
        fn slicing_matches_reference_formulas(bits in any::<u16>()) {
            let flags = ArrayFlags::from_bits(bits);
            prop_assert_eq!(flags.storage_bits(), bits & 0x3);
            prop_assert_eq!(flags.ndims(), (bits >> 2) & 0x3FF);
            prop_assert_eq!(flags.pooled(), (bits >> 12) & 0x1 == 1);
            prop_assert_eq!(flags.is_pointer_array(), (bits >> 13) & 0x1 == 1);
            prop_assert_eq!(flags.is_shared(), (bits >> 14) & 0x1 == 1);
            prop_assert_eq!(flags.is_aligned(), (bits >> 15) & 0x1 == 1);
        }
    }
}
