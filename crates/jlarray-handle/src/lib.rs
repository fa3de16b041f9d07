//! Borrow-checked handles over arrays owned by the Julia runtime.
//!
//! A foreign array is a header (`jl_array_t`) followed by, or pointing at,
//! element storage that the runtime allocates and frees. This crate decodes
//! that header into an [`ArrayDescriptor`] and wraps the pointer in a
//! [`ForeignArrayHandle`] that counts outstanding borrows, refuses use after
//! invalidation, and never frees what it wraps. This crate is one of the
//! workspace crates that may contain `unsafe` code (along with
//! `jlarray-ffi` and `jlarray-test-utils`).
//!
//! # Architecture
//!
//! ```text
//! ForeignArrayHandle<T>
//! └── RawArrayHandle
//!     ├── NonNull<c_void>      foreign header address (not owned)
//!     ├── ArrayDescriptor      decoded once at wrap time (raw.rs reads it)
//!     └── BorrowState          AtomicU64: invalid bit | borrow count
//! Borrow<'_, T>                one acquire, released on drop; yields &[T]
//! ForeignRuntime               applyArrayType / allocArray1D / allocArray2D
//! ```
//!
//! # ABI
//!
//! The header layout matches [`ABI_VERSION`]. Any other runtime version
//! decodes silently wrong values; there is no way to validate a header.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![deny(unsafe_code)]

pub mod config;
pub mod descriptor;
pub mod handle;
#[cfg(feature = "libjulia")]
pub mod julia;
pub mod layout;
pub mod raw;
pub mod runtime;

/// Runtime ABI this crate's header layout and flag bits correspond to.
///
/// `jl_array_t` from Julia 0.7 through 1.2 on 64-bit targets, with flags
/// `how:2, ndims:10, pooled:1, ptrarray:1, isshared:1, isaligned:1`.
pub const ABI_VERSION: &str = "julia-0.7..1.2/jl_array_t";

pub use config::HandleConfig;
pub use descriptor::{ArrayDescriptor, ArrayFlags, StorageKind};
pub use handle::{Borrow, ForeignArrayHandle, RawArrayHandle};
#[cfg(feature = "libjulia")]
pub use julia::JuliaLibrary;
pub use layout::Shape;
pub use raw::ArrayHeader;
pub use runtime::{ForeignRuntime, TypeHandle};

pub use jlarray_core::{ArrayError, Element, ElementKind};
