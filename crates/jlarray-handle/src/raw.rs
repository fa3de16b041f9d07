//! Low-level reads of foreign memory.
//!
//! Every dereference of a runtime-owned address in this crate goes through
//! one of the functions here. Each carries a `# Safety` contract; callers
//! discharge it with a `// SAFETY:` comment.

#![allow(unsafe_code)]

use std::ffi::c_void;
use std::ptr::NonNull;

/// The runtime's array header, field for field.
///
/// `#[repr(C)]` with no reordering: pointer-sized `data`, pointer-sized
/// `length`, `u16` flags, `u16` element size, `u32` offset, pointer-sized
/// `nrows`, pointer-sized `ncols`. For 1-D arrays the runtime stores the
/// buffer capacity (`maxsize`) in the `ncols` slot.
#[repr(C)]
#[derive(Clone, Copy, Debug)]
pub struct ArrayHeader {
    /// Address of element storage.
    pub data: *mut c_void,
    /// Total element count.
    pub length: usize,
    /// Packed flag word; see [`ArrayFlags`](crate::ArrayFlags).
    pub flags: u16,
    /// Bytes per element.
    pub element_size: u16,
    /// Offset field as recorded by the runtime.
    pub offset: u32,
    /// First extent.
    pub nrows: usize,
    /// Second extent, or `maxsize` for 1-D arrays.
    pub ncols: usize,
}

#[cfg(target_pointer_width = "64")]
const _: () = {
    assert!(std::mem::size_of::<ArrayHeader>() == 40);
    assert!(std::mem::offset_of!(ArrayHeader, data) == 0);
    assert!(std::mem::offset_of!(ArrayHeader, length) == 8);
    assert!(std::mem::offset_of!(ArrayHeader, flags) == 16);
    assert!(std::mem::offset_of!(ArrayHeader, element_size) == 18);
    assert!(std::mem::offset_of!(ArrayHeader, offset) == 20);
    assert!(std::mem::offset_of!(ArrayHeader, nrows) == 24);
    assert!(std::mem::offset_of!(ArrayHeader, ncols) == 32);
};

/// Copy the header at `address` out of foreign memory.
///
/// # Safety
///
/// `address` must point at `size_of::<ArrayHeader>()` readable bytes laid
/// out as an [`ArrayHeader`]. Alignment is not required.
pub(crate) unsafe fn read_header(address: NonNull<c_void>) -> ArrayHeader {
    // SAFETY: readability is the caller's contract; read_unaligned has no
    // alignment requirement.
    unsafe { address.cast::<ArrayHeader>().as_ptr().read_unaligned() }
}

/// Reinterpret foreign element storage as a shared slice.
///
/// # Safety
///
/// `data` must be non-null, aligned for `T`, and point at `len` initialized
/// values of `T` that stay live and unmodified through another `&mut` for
/// `'a`.
pub(crate) unsafe fn slice<'a, T>(data: *const T, len: usize) -> &'a [T] {
    // SAFETY: forwarded from the caller.
    unsafe { std::slice::from_raw_parts(data, len) }
}

/// Reinterpret foreign element storage as a mutable slice.
///
/// # Safety
///
/// As [`slice`], plus no other reference to the same elements may exist
/// for `'a`.
pub(crate) unsafe fn slice_mut<'a, T>(data: *mut T, len: usize) -> &'a mut [T] {
    // SAFETY: forwarded from the caller.
    unsafe { std::slice::from_raw_parts_mut(data, len) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_header_copies_every_field() {
        let mut storage = [0.0f64; 3];
        let header = ArrayHeader {
            data: storage.as_mut_ptr().cast(),
            length: 3,
            flags: 0x8005,
            element_size: 8,
            offset: 0,
            nrows: 3,
            ncols: 3,
        };
        let address = NonNull::from(&header).cast::<c_void>();
        let copy = unsafe { read_header(address) };
        assert_eq!(copy.data, header.data);
        assert_eq!(copy.length, 3);
        assert_eq!(copy.flags, 0x8005);
        assert_eq!(copy.element_size, 8);
        assert_eq!(copy.nrows, 3);
        assert_eq!(copy.ncols, 3);
    }

    #[test]
    fn read_header_tolerates_unaligned_address() {
        let header = ArrayHeader {
            data: std::ptr::null_mut(),
            length: 0,
            flags: 0x0004,
            element_size: 4,
            offset: 7,
            nrows: 0,
            ncols: 0,
        };
        let mut bytes = vec![0u8; std::mem::size_of::<ArrayHeader>() + 1];
        // SAFETY: bytes has room for one header after the first byte.
        unsafe {
            std::ptr::copy_nonoverlapping(
                (&header as *const ArrayHeader).cast::<u8>(),
                bytes.as_mut_ptr().add(1),
                std::mem::size_of::<ArrayHeader>(),
            );
        }
        let address = NonNull::new(bytes[1..].as_mut_ptr().cast::<c_void>()).unwrap();
        let copy = unsafe { read_header(address) };
        assert_eq!(copy.offset, 7);
        assert_eq!(copy.element_size, 4);
    }
}
