//! Test utilities for jlarray development.
//!
//! Provides [`MockRuntime`], an in-process stand-in for the foreign runtime
//! that lays out real array headers and element storage, and a few
//! [`fixtures`] for building headers and patterns by hand.

#![deny(unsafe_code)]
#![allow(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

pub mod fixtures;

use std::ffi::c_void;
use std::mem;
use std::ptr;
use std::sync::Mutex;

use indexmap::IndexMap;
use jlarray_core::{ArrayError, Element, ElementKind};
use jlarray_handle::{ArrayFlags, ArrayHeader, ForeignRuntime, TypeHandle};

/// Storage unit; keeps every element buffer 16-byte aligned.
#[repr(C, align(16))]
#[derive(Clone, Copy)]
struct Chunk([u8; 16]);

/// A type object. Boxed so its address is a stable [`TypeHandle`].
#[derive(Debug)]
struct MockType {
    kind: ElementKind,
}

struct MockArray {
    header: Box<ArrayHeader>,
    kind: Option<ElementKind>,
    storage: Vec<Chunk>,
}

// SAFETY: `header.data` points into `storage` (or at memory the test that
// crafted the header owns); the runtime's mutex serialises all access.
#[allow(unsafe_code)]
unsafe impl Send for MockArray {}

impl MockArray {
    fn address(&self) -> *mut c_void {
        (&*self.header as *const ArrayHeader).cast_mut().cast()
    }
}

struct Inner {
    element_types: IndexMap<ElementKind, Box<MockType>>,
    array_types: IndexMap<(ElementKind, usize), Box<MockType>>,
    arrays: Vec<MockArray>,
    fail_array_types: bool,
}

impl Inner {
    fn kind_of_element_type(&self, handle: TypeHandle) -> Option<ElementKind> {
        self.element_types
            .values()
            .find(|t| type_address(t) == handle.as_ptr())
            .map(|t| t.kind)
    }

    fn array_type(&self, handle: TypeHandle) -> Option<(ElementKind, usize)> {
        self.array_types
            .iter()
            .find(|(_, t)| type_address(t) == handle.as_ptr())
            .map(|(key, _)| *key)
    }

    fn find(&mut self, address: *mut c_void) -> Option<&mut MockArray> {
        self.arrays.iter_mut().find(|a| a.address() == address)
    }
}

fn type_address(t: &MockType) -> *mut c_void {
    (t as *const MockType).cast_mut().cast()
}

/// In-process fake of the foreign runtime.
///
/// Owns every header and buffer it hands out until it is dropped, the way
/// the real runtime owns its arrays; handles created from it must not
/// outlive it. Buffers are zero-initialised and 16-byte aligned.
pub struct MockRuntime {
    inner: Mutex<Inner>,
}

impl MockRuntime {
    /// Arrays at or below this many bytes are flagged as inline storage.
    pub const INLINE_NBYTES: usize = 2048 * mem::size_of::<usize>();

    /// A runtime supporting every [`ElementKind`].
    pub fn new() -> Self {
        Self::with_kinds(&ElementKind::ALL)
    }

    /// A runtime whose element-type table contains only `kinds`.
    pub fn with_kinds(kinds: &[ElementKind]) -> Self {
        let element_types = kinds
            .iter()
            .map(|&kind| (kind, Box::new(MockType { kind })))
            .collect();
        Self {
            inner: Mutex::new(Inner {
                element_types,
                array_types: IndexMap::new(),
                arrays: Vec::new(),
                fail_array_types: false,
            }),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Kinds in the element-type table, in registration order.
    pub fn supported_kinds(&self) -> Vec<ElementKind> {
        self.lock().element_types.keys().copied().collect()
    }

    /// Make `apply_array_type` return `None` from now on.
    pub fn set_fail_array_types(&self, fail: bool) {
        self.lock().fail_array_types = fail;
    }

    /// Number of arrays this runtime currently owns.
    pub fn array_count(&self) -> usize {
        self.lock().arrays.len()
    }

    /// Allocate an array of any dimensionality.
    ///
    /// The header records `shape[0]` as `nrows` and `shape[1]` as `ncols`
    /// (for 1-D, `ncols` holds the capacity). Storage is zeroed.
    pub fn alloc(&self, kind: ElementKind, shape: &[usize]) -> *mut c_void {
        let length = shape.iter().product::<usize>();
        let nrows = shape.first().copied().unwrap_or(0);
        let ncols = match shape.len() {
            1 => length,
            _ => shape.get(1).copied().unwrap_or(0),
        };
        let bytes = length * kind.size();
        let storage_kind = if bytes <= Self::INLINE_NBYTES { 0 } else { 2 };
        let mut storage = vec![Chunk([0; 16]); bytes.div_ceil(mem::size_of::<Chunk>())];
        let header = Box::new(ArrayHeader {
            data: storage.as_mut_ptr().cast(),
            length,
            flags: ArrayFlags::compose(storage_kind, shape.len() as u16, false, false, false, true)
                .bits(),
            element_size: kind.size() as u16,
            offset: 0,
            nrows,
            ncols,
        });
        self.push(MockArray {
            header,
            kind: Some(kind),
            storage,
        })
    }

    /// Store a hand-built header verbatim and return its address.
    ///
    /// The runtime owns the header but not whatever `header.data` points at.
    pub fn insert_header(&self, header: ArrayHeader) -> *mut c_void {
        self.push(MockArray {
            header: Box::new(header),
            kind: None,
            storage: Vec::new(),
        })
    }

    fn push(&self, array: MockArray) -> *mut c_void {
        let address = array.address();
        self.lock().arrays.push(array);
        address
    }

    /// Overwrite the first `values.len()` elements of `array` in storage order.
    #[allow(unsafe_code)]
    pub fn write<T: Element>(&self, array: *mut c_void, values: &[T]) -> Result<(), ArrayError> {
        let mut inner = self.lock();
        let target = inner.find(array).ok_or(ArrayError::InvalidHandle)?;
        if target.kind != Some(T::KIND) {
            return Err(ArrayError::UnsupportedElementType { kind: T::KIND });
        }
        let length = target.header.length;
        if values.len() > length {
            return Err(ArrayError::IndexOutOfBounds {
                index: values.len(),
                len: length,
            });
        }
        // SAFETY: storage holds `length * size_of::<T>()` bytes, 16-byte
        // aligned, and `values` is no longer than `length`.
        unsafe {
            ptr::copy_nonoverlapping(
                values.as_ptr(),
                target.storage.as_mut_ptr().cast::<T>(),
                values.len(),
            );
        }
        Ok(())
    }

    /// Write a logical `nrows × ncols` matrix given row by row, storing it
    /// column-major the way the real runtime lays matrices out.
    pub fn write_column_major<T: Element>(
        &self,
        array: *mut c_void,
        row_major: &[T],
    ) -> Result<(), ArrayError> {
        let (nrows, ncols) = {
            let mut inner = self.lock();
            let target = inner.find(array).ok_or(ArrayError::InvalidHandle)?;
            (target.header.nrows, target.header.ncols)
        };
        if row_major.len() != nrows * ncols {
            return Err(ArrayError::IndexOutOfBounds {
                index: row_major.len(),
                len: nrows * ncols,
            });
        }
        let mut stored = Vec::with_capacity(row_major.len());
        for j in 0..ncols {
            for i in 0..nrows {
                stored.push(row_major[i * ncols + j]);
            }
        }
        self.write(array, &stored)
    }
}

impl Default for MockRuntime {
    fn default() -> Self {
        Self::new()
    }
}

// SAFETY: every non-null pointer returned below addresses a boxed header
// whose storage holds the requested shape; both live until the runtime is
// dropped and are never resized.
#[allow(unsafe_code)]
unsafe impl ForeignRuntime for MockRuntime {
    fn element_type(&self, kind: ElementKind) -> Option<TypeHandle> {
        let inner = self.lock();
        inner
            .element_types
            .get(&kind)
            .and_then(|t| TypeHandle::new(type_address(t)))
    }

    fn apply_array_type(&self, element_type: TypeHandle, ndims: usize) -> Option<TypeHandle> {
        let mut inner = self.lock();
        if inner.fail_array_types {
            return None;
        }
        let kind = inner.kind_of_element_type(element_type)?;
        let array_type = inner
            .array_types
            .entry((kind, ndims))
            .or_insert_with(|| Box::new(MockType { kind }));
        TypeHandle::new(type_address(array_type))
    }

    fn alloc_array_1d(&self, array_type: TypeHandle, n: usize) -> *mut c_void {
        let found = self.lock().array_type(array_type);
        match found {
            Some((kind, 1)) => self.alloc(kind, &[n]),
            _ => ptr::null_mut(),
        }
    }

    fn alloc_array_2d(&self, array_type: TypeHandle, nrows: usize, ncols: usize) -> *mut c_void {
        let found = self.lock().array_type(array_type);
        match found {
            Some((kind, 2)) => self.alloc(kind, &[nrows, ncols]),
            _ => ptr::null_mut(),
        }
    }
}
