//! Error types for jlarray.
//!
//! One enum covers the whole handle lifecycle: wrapping, borrowing, typed
//! creation through the runtime, and element access.

use std::error::Error;
use std::fmt;

use crate::element::ElementKind;

/// Errors from wrapping, borrowing, creating, or indexing a foreign array.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ArrayError {
    /// The handle was built from a null address or has been invalidated.
    InvalidHandle,
    /// The runtime's element-type table has no entry for this kind.
    UnsupportedElementType {
        /// The requested kind.
        kind: ElementKind,
    },
    /// A row/column operation on an array whose `ndims` is not 1 or 2.
    DimensionalityUnsupported {
        /// The decoded dimensionality.
        ndims: u16,
    },
    /// `release` was called with no outstanding borrows.
    UnbalancedRelease,
    /// `invalidate` was refused because borrows are still held.
    BorrowsOutstanding {
        /// Number of borrows held at the time of the call.
        count: u32,
    },
    /// `acquire` would exceed the configured borrow ceiling.
    BorrowLimitExceeded {
        /// The configured ceiling.
        limit: u32,
    },
    /// The header's element size disagrees with the Rust element type.
    ElementSizeMismatch {
        /// `size_of::<T>()`.
        expected: usize,
        /// Element size recorded in the foreign header.
        actual: usize,
    },
    /// Element storage is not aligned for the Rust element type.
    Misaligned {
        /// Address of the element storage.
        address: usize,
        /// Required alignment in bytes.
        align: usize,
    },
    /// Element index outside the array.
    IndexOutOfBounds {
        /// Flat index requested.
        index: usize,
        /// Number of elements (or rows, for row access).
        len: usize,
    },
    /// The runtime failed to produce an array type or an array.
    AllocationFailed {
        /// Element kind requested.
        kind: ElementKind,
        /// Dimensionality requested.
        ndims: usize,
    },
    /// The foreign runtime library could not be loaded.
    RuntimeUnavailable {
        /// Loader diagnostic.
        reason: String,
    },
}

impl fmt::Display for ArrayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidHandle => write!(f, "the handle is invalid"),
            Self::UnsupportedElementType { kind } => {
                write!(f, "element type {kind} is not supported by the runtime")
            }
            Self::DimensionalityUnsupported { ndims } => {
                write!(f, "{ndims}-dimensional arrays have no row/column view")
            }
            Self::UnbalancedRelease => write!(f, "release without a matching acquire"),
            Self::BorrowsOutstanding { count } => {
                write!(f, "cannot invalidate: {count} borrows outstanding")
            }
            Self::BorrowLimitExceeded { limit } => {
                write!(f, "borrow limit of {limit} exceeded")
            }
            Self::ElementSizeMismatch { expected, actual } => {
                write!(
                    f,
                    "element size mismatch: expected {expected} bytes, header says {actual}"
                )
            }
            Self::Misaligned { address, align } => {
                write!(f, "element storage at {address:#x} is not {align}-byte aligned")
            }
            Self::IndexOutOfBounds { index, len } => {
                write!(f, "index {index} out of bounds for length {len}")
            }
            Self::AllocationFailed { kind, ndims } => {
                write!(f, "runtime failed to allocate Array{{{kind},{ndims}}}")
            }
            Self::RuntimeUnavailable { reason } => {
                write!(f, "foreign runtime unavailable: {reason}")
            }
        }
    }
}

impl Error for ArrayError {}
