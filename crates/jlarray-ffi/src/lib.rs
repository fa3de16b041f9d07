//! C FFI bindings for jlarray.
//!
//! Lets a C host wrap a runtime-owned array address and borrow it through an
//! opaque `u64` handle. Every function returns a [`JlStatus`] as `i32`;
//! panics are caught at the boundary and reported as
//! [`JlStatus::Panicked`]. The generated header lands in `include/jlarray.h`.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![deny(unsafe_code)]

/// Run an FFI body, turning a panic into [`JlStatus::Panicked`].
macro_rules! ffi_guard {
    ($body:block) => {
        match ::std::panic::catch_unwind(::std::panic::AssertUnwindSafe(|| $body)) {
            Ok(code) => code,
            Err(_) => {
                ::tracing::error!("panic caught at FFI boundary");
                $crate::status::JlStatus::Panicked as i32
            }
        }
    };
}

/// Lock a mutex or return [`JlStatus::InternalError`] if it is poisoned.
macro_rules! ffi_lock {
    ($mutex:expr) => {
        match $mutex.lock() {
            Ok(guard) => guard,
            Err(_) => return $crate::status::JlStatus::InternalError as i32,
        }
    };
}

pub mod array;
mod handle;
pub mod status;

pub use array::{
    jlarray_acquire, jlarray_destroy, jlarray_info, jlarray_invalidate, jlarray_live_count,
    jlarray_release, jlarray_wrap, JlArrayInfo,
};
pub use status::JlStatus;
