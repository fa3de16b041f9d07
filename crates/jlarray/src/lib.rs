//! jlarray: borrow-checked handles over arrays owned by the Julia runtime.
//!
//! This is the facade crate that re-exports the public API from the jlarray
//! sub-crates. For most users, adding `jlarray` as a single dependency is
//! sufficient.
//!
//! # Quick start
//!
//! ```rust
//! use jlarray::prelude::*;
//! use jlarray_test_utils::MockRuntime;
//!
//! // Any ForeignRuntime works here; with the `libjulia` feature,
//! // `jlarray::handle::JuliaLibrary::load()` gives the real one.
//! let runtime = MockRuntime::new();
//!
//! let matrix = ForeignArrayHandle::<f64>::create_2d(&runtime, 2, 3).unwrap();
//! assert_eq!(matrix.ndims(), 2);
//! assert_eq!(matrix.len(), 6);
//!
//! {
//!     let view = matrix.borrow().unwrap();
//!     assert_eq!(matrix.borrow_count(), 1);
//!     assert!(view.view().iter().all(|&x| x == 0.0));
//!     assert_eq!(view.row(1).unwrap().len(), 3);
//! }
//! assert_eq!(matrix.borrow_count(), 0);
//!
//! matrix.invalidate().unwrap();
//! assert_eq!(matrix.acquire(), Err(ArrayError::InvalidHandle));
//! ```
//!
//! # Modules
//!
//! | Module | Sub-crate | Contents |
//! |--------|-----------|----------|
//! | [`types`] | `jlarray-core` | Element kinds and the error type |
//! | [`handle`] | `jlarray-handle` | Header decoding, handles, borrows, runtime trait |

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

/// Element kinds and errors (`jlarray-core`).
///
/// [`types::ElementKind`] lists the ten supported primitive element types;
/// [`types::ArrayError`] is returned by every fallible operation.
pub use jlarray_core as types;

/// Header decoding, handles and borrows (`jlarray-handle`).
///
/// [`handle::ForeignArrayHandle`] is the main entry point. Implement
/// [`handle::ForeignRuntime`] to allocate arrays through a runtime.
pub use jlarray_handle as handle;

/// Common imports for typical jlarray usage.
///
/// ```rust
/// use jlarray::prelude::*;
/// ```
pub mod prelude {
    // Core types
    pub use jlarray_core::{ArrayError, Element, ElementKind};

    // Handles
    pub use jlarray_handle::{
        ArrayDescriptor, Borrow, ForeignArrayHandle, HandleConfig, RawArrayHandle, Shape,
    };

    // Runtime
    pub use jlarray_handle::{ForeignRuntime, TypeHandle};
}
