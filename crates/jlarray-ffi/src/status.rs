//! C-compatible status codes.
//!
//! [`JlStatus`] is a `repr(i32)` enum covering every [`ArrayError`] plus the
//! conditions that only arise at the C boundary (bad arguments, poisoned
//! locks, caught panics).

use jlarray_core::ArrayError;

/// C-compatible status code returned by all FFI functions.
///
/// `Ok` = 0, all errors are negative. Values are ABI-stable.
#[repr(i32)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum JlStatus {
    /// Success.
    Ok = 0,
    /// Handle is invalid, invalidated, or was already destroyed.
    InvalidHandle = -1,
    /// Element kind unknown or not provided by the runtime.
    UnsupportedElementType = -2,
    /// The array is neither 1-D nor 2-D.
    DimensionalityUnsupported = -3,
    /// Release without a matching acquire.
    UnbalancedRelease = -4,
    /// Borrows are still outstanding.
    BorrowsOutstanding = -5,
    /// The handle's borrow limit was reached.
    BorrowLimitExceeded = -6,
    /// Header element size disagrees with the requested kind.
    ElementSizeMismatch = -7,
    /// Element storage is not aligned for its kind.
    Misaligned = -8,
    /// Row or column out of range.
    IndexOutOfBounds = -9,
    /// The runtime failed to build an array type or allocate.
    AllocationFailed = -10,
    /// The runtime library could not be loaded.
    RuntimeUnavailable = -11,
    /// An argument is null, out of range, or otherwise invalid.
    InvalidArgument = -12,
    /// Internal error (e.g. poisoned mutex after a prior panic).
    InternalError = -13,
    /// A Rust panic was caught at the FFI boundary.
    Panicked = -128,
}

impl From<&ArrayError> for JlStatus {
    fn from(e: &ArrayError) -> Self {
        match e {
            ArrayError::InvalidHandle => JlStatus::InvalidHandle,
            ArrayError::UnsupportedElementType { .. } => JlStatus::UnsupportedElementType,
            ArrayError::DimensionalityUnsupported { .. } => JlStatus::DimensionalityUnsupported,
            ArrayError::UnbalancedRelease => JlStatus::UnbalancedRelease,
            ArrayError::BorrowsOutstanding { .. } => JlStatus::BorrowsOutstanding,
            ArrayError::BorrowLimitExceeded { .. } => JlStatus::BorrowLimitExceeded,
            ArrayError::ElementSizeMismatch { .. } => JlStatus::ElementSizeMismatch,
            ArrayError::Misaligned { .. } => JlStatus::Misaligned,
            ArrayError::IndexOutOfBounds { .. } => JlStatus::IndexOutOfBounds,
            ArrayError::AllocationFailed { .. } => JlStatus::AllocationFailed,
            ArrayError::RuntimeUnavailable { .. } => JlStatus::RuntimeUnavailable,
        }
    }
}

impl From<ArrayError> for JlStatus {
    fn from(e: ArrayError) -> Self {
        JlStatus::from(&e)
    }
}
