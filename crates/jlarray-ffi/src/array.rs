//! Array handle FFI: wrap, acquire, release, invalidate, destroy, inspect.
//!
//! Handles are `Arc<RawArrayHandle>` in a global table. The table lock is
//! held only for lookup, so borrows on different arrays never contend on it.

use std::ffi::c_void;
use std::sync::{Arc, Mutex};

use jlarray_core::{ArrayError, ElementKind};
use jlarray_handle::{HandleConfig, RawArrayHandle};

use crate::handle::HandleTable;
use crate::status::JlStatus;

type ArrayArc = Arc<RawArrayHandle>;

static ARRAYS: Mutex<HandleTable<ArrayArc>> = Mutex::new(HandleTable::new());

fn get_array(handle: u64) -> Option<ArrayArc> {
    ARRAYS.lock().ok()?.get(handle).cloned()
}

/// Snapshot of a wrapped array, filled by [`jlarray_info`].
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct JlArrayInfo {
    /// Total element count.
    pub length: usize,
    /// Rows of the row/column view; 0 when `ndims` is neither 1 nor 2.
    pub nrows: usize,
    /// Columns of the row/column view; 0 when `ndims` is neither 1 nor 2.
    pub ncols: usize,
    /// Number of dimensions.
    pub ndims: u16,
    /// Bytes per element.
    pub element_size: u16,
    /// Raw header flag bits.
    pub flags: u16,
    /// Outstanding borrows.
    pub borrow_count: u32,
    /// 1 until the handle is invalidated.
    pub valid: u8,
    /// 1 if the handle was wrapped with lifetime checking.
    pub check_lifetime: u8,
}

/// Wrap the array header at `address` and write a handle to `handle_out`.
///
/// `element_kind` is an `ElementKind` discriminant (0 = Float64 ... 9 =
/// UInt8); the header's element size must match it. With `check_lifetime`
/// non-zero the handle refuses invalidation and destruction while borrowed.
///
/// The header and its storage must stay live and unresized until the handle
/// is destroyed.
#[no_mangle]
#[allow(unsafe_code)]
pub extern "C" fn jlarray_wrap(
    address: *mut c_void,
    element_kind: i32,
    check_lifetime: u8,
    handle_out: *mut u64,
) -> i32 {
    ffi_guard!({
        if handle_out.is_null() {
            return JlStatus::InvalidArgument as i32;
        }
        let Some(kind) = ElementKind::from_raw(element_kind) else {
            tracing::debug!(element_kind, "unknown element kind");
            return JlStatus::UnsupportedElementType as i32;
        };
        let config = if check_lifetime != 0 {
            HandleConfig::default()
        } else {
            HandleConfig::unchecked()
        };
        // SAFETY: header validity is the caller's contract; null is rejected
        // inside wrap without a read.
        let raw = match unsafe { RawArrayHandle::wrap(address, config) } {
            Ok(raw) => raw,
            Err(e) => return JlStatus::from(&e) as i32,
        };
        let actual = raw.descriptor().element_size as usize;
        if actual != kind.size() {
            return JlStatus::from(&ArrayError::ElementSizeMismatch {
                expected: kind.size(),
                actual,
            }) as i32;
        }
        let handle = ffi_lock!(ARRAYS).insert(Arc::new(raw));
        // SAFETY: handle_out is non-null and valid per caller contract.
        unsafe { *handle_out = handle };
        JlStatus::Ok as i32
    })
}

/// Take one borrow and write the wrapped address to `address_out`.
#[no_mangle]
#[allow(unsafe_code)]
pub extern "C" fn jlarray_acquire(handle: u64, address_out: *mut *mut c_void) -> i32 {
    ffi_guard!({
        if address_out.is_null() {
            return JlStatus::InvalidArgument as i32;
        }
        let Some(array) = get_array(handle) else {
            return JlStatus::InvalidHandle as i32;
        };
        match array.acquire() {
            Ok(address) => {
                // SAFETY: address_out is non-null and valid per caller contract.
                unsafe { *address_out = address };
                JlStatus::Ok as i32
            }
            Err(e) => JlStatus::from(&e) as i32,
        }
    })
}

/// Return a borrow taken by [`jlarray_acquire`].
///
/// An `address` other than the wrapped one, or an invalidated handle, is a
/// no-op; `released_out` (if non-null) receives 1 only when a borrow was
/// actually returned.
#[no_mangle]
#[allow(unsafe_code)]
pub extern "C" fn jlarray_release(handle: u64, address: *mut c_void, released_out: *mut u8) -> i32 {
    ffi_guard!({
        let Some(array) = get_array(handle) else {
            return JlStatus::InvalidHandle as i32;
        };
        match array.release(address) {
            Ok(released) => {
                if !released_out.is_null() {
                    // SAFETY: released_out is non-null and valid per caller contract.
                    unsafe { *released_out = u8::from(released) };
                }
                JlStatus::Ok as i32
            }
            Err(e) => JlStatus::from(&e) as i32,
        }
    })
}

/// Mark the handle invalid. Later acquires fail; the handle stays in the
/// table until [`jlarray_destroy`].
#[no_mangle]
#[allow(unsafe_code)]
pub extern "C" fn jlarray_invalidate(handle: u64) -> i32 {
    ffi_guard!({
        let Some(array) = get_array(handle) else {
            return JlStatus::InvalidHandle as i32;
        };
        match array.invalidate() {
            Ok(()) => JlStatus::Ok as i32,
            Err(e) => JlStatus::from(&e) as i32,
        }
    })
}

/// Invalidate and remove the handle. The foreign array itself is untouched.
///
/// Refused with `BorrowsOutstanding` while a lifetime-checked handle is
/// borrowed; the handle then stays usable.
#[no_mangle]
#[allow(unsafe_code)]
pub extern "C" fn jlarray_destroy(handle: u64) -> i32 {
    ffi_guard!({
        let mut arrays = ffi_lock!(ARRAYS);
        let Some(array) = arrays.get(handle) else {
            return JlStatus::InvalidHandle as i32;
        };
        if let Err(e) = array.invalidate() {
            return JlStatus::from(&e) as i32;
        }
        arrays.remove(handle);
        JlStatus::Ok as i32
    })
}

/// Fill `info_out` with the handle's decoded header and borrow state.
#[no_mangle]
#[allow(unsafe_code)]
pub extern "C" fn jlarray_info(handle: u64, info_out: *mut JlArrayInfo) -> i32 {
    ffi_guard!({
        if info_out.is_null() {
            return JlStatus::InvalidArgument as i32;
        }
        let Some(array) = get_array(handle) else {
            return JlStatus::InvalidHandle as i32;
        };
        let desc = array.descriptor();
        let info = JlArrayInfo {
            length: desc.length,
            nrows: desc.row_count().unwrap_or(0),
            ncols: desc.col_count().unwrap_or(0),
            ndims: desc.ndims(),
            element_size: desc.element_size,
            flags: desc.flags.bits(),
            borrow_count: array.borrow_count(),
            valid: u8::from(array.is_valid()),
            check_lifetime: u8::from(array.config().check_lifetime),
        };
        // SAFETY: info_out is non-null and valid per caller contract.
        unsafe { *info_out = info };
        JlStatus::Ok as i32
    })
}

/// Write the number of live handles to `count_out`.
///
/// Hosts can check this drops back to its starting value to catch leaked
/// handles.
#[no_mangle]
#[allow(unsafe_code)]
pub extern "C" fn jlarray_live_count(count_out: *mut usize) -> i32 {
    ffi_guard!({
        if count_out.is_null() {
            return JlStatus::InvalidArgument as i32;
        }
        let count = ffi_lock!(ARRAYS).len();
        // SAFETY: count_out is non-null and valid per caller contract.
        unsafe { *count_out = count };
        JlStatus::Ok as i32
    })
}
