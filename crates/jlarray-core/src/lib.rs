//! Core types for jlarray.
//!
//! This is the leaf crate with zero internal dependencies. It defines the
//! closed table of element kinds the foreign runtime can allocate, the
//! [`Element`] trait that maps Rust primitives onto that table, and the
//! [`ArrayError`] taxonomy shared by every other crate in the workspace.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod element;
pub mod error;

pub use element::{Element, ElementKind};
pub use error::ArrayError;
