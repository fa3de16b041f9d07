//! The seam to the foreign runtime's allocation entry points.
//!
//! Typed creation goes: element kind → the runtime's element type object
//! (from its enumerated table) → `applyArrayType(element_type, ndims)` →
//! `allocArray1D` / `allocArray2D` → [`ForeignArrayHandle::wrap`].

use std::ffi::c_void;
use std::ptr::NonNull;

use jlarray_core::{ArrayError, Element, ElementKind};

use crate::config::HandleConfig;
use crate::handle::ForeignArrayHandle;

/// Opaque runtime type object (element type or array type).
///
/// Never dereferenced on this side of the boundary.
#[repr(transparent)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TypeHandle(NonNull<c_void>);

// SAFETY: a TypeHandle is an opaque token passed back to the runtime; this
// crate never reads through it.
#[allow(unsafe_code)]
unsafe impl Send for TypeHandle {}
// SAFETY: see `Send`.
#[allow(unsafe_code)]
unsafe impl Sync for TypeHandle {}

impl TypeHandle {
    /// `None` for null.
    pub fn new(ptr: *mut c_void) -> Option<Self> {
        NonNull::new(ptr).map(Self)
    }

    /// The raw type object pointer.
    pub fn as_ptr(self) -> *mut c_void {
        self.0.as_ptr()
    }
}

/// Allocation entry points of a foreign array runtime.
///
/// # Safety
///
/// Implementors promise that every non-null pointer returned by
/// `alloc_array_1d` / `alloc_array_2d` addresses a live array header of the
/// layout in [`ABI_VERSION`](crate::ABI_VERSION), with element storage for
/// the requested shape, and that both stay live and unresized for as long as
/// the implementor itself is alive.
#[allow(unsafe_code)]
pub unsafe trait ForeignRuntime {
    /// The runtime's type object for `kind`, or `None` if unsupported.
    fn element_type(&self, kind: ElementKind) -> Option<TypeHandle>;

    /// `applyArrayType(element_type, ndims)`.
    fn apply_array_type(&self, element_type: TypeHandle, ndims: usize) -> Option<TypeHandle>;

    /// `allocArray1D(array_type, n)`.
    fn alloc_array_1d(&self, array_type: TypeHandle, n: usize) -> *mut c_void;

    /// `allocArray2D(array_type, nrows, ncols)`.
    fn alloc_array_2d(&self, array_type: TypeHandle, nrows: usize, ncols: usize) -> *mut c_void;
}

fn array_type<T: Element, R: ForeignRuntime + ?Sized>(
    runtime: &R,
    ndims: usize,
) -> Result<TypeHandle, ArrayError> {
    let kind = T::KIND;
    let element_type = runtime
        .element_type(kind)
        .ok_or(ArrayError::UnsupportedElementType { kind })?;
    runtime
        .apply_array_type(element_type, ndims)
        .ok_or(ArrayError::AllocationFailed { kind, ndims })
}

impl<T: Element> ForeignArrayHandle<T> {
    /// Ask the runtime for a new 1-D array of `n` elements and wrap it.
    ///
    /// Fails with [`ArrayError::UnsupportedElementType`] if the runtime's
    /// table has no entry for `T`. The handle must not outlive `runtime`.
    #[allow(unsafe_code)]
    pub fn create_1d<R: ForeignRuntime + ?Sized>(runtime: &R, n: usize) -> Result<Self, ArrayError> {
        let array_type = array_type::<T, R>(runtime, 1)?;
        let address = runtime.alloc_array_1d(array_type, n);
        // SAFETY: the ForeignRuntime contract covers non-null results.
        let handle = unsafe { Self::wrap(address, HandleConfig::default()) }?;
        tracing::debug!(kind = %T::KIND, n, "created 1-d foreign array");
        Ok(handle)
    }

    /// Ask the runtime for a new `nrows × ncols` array and wrap it.
    ///
    /// Fails with [`ArrayError::UnsupportedElementType`] if the runtime's
    /// table has no entry for `T`. The handle must not outlive `runtime`.
    #[allow(unsafe_code)]
    pub fn create_2d<R: ForeignRuntime + ?Sized>(
        runtime: &R,
        nrows: usize,
        ncols: usize,
    ) -> Result<Self, ArrayError> {
        let array_type = array_type::<T, R>(runtime, 2)?;
        let address = runtime.alloc_array_2d(array_type, nrows, ncols);
        // SAFETY: the ForeignRuntime contract covers non-null results.
        let handle = unsafe { Self::wrap(address, HandleConfig::default()) }?;
        tracing::debug!(kind = %T::KIND, nrows, ncols, "created 2-d foreign array");
        Ok(handle)
    }
}

#[cfg(test)]
#[allow(unsafe_code)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use crate::descriptor::ArrayFlags;
    use crate::raw::ArrayHeader;

    /// Hands out headers for `Float64` only; array types are the element
    /// type address offset by `ndims`.
    struct Float64Only {
        tag: u64,
        arrays: Mutex<Vec<(Box<ArrayHeader>, Vec<f64>)>>,
    }

    unsafe impl ForeignRuntime for Float64Only {
        fn element_type(&self, kind: ElementKind) -> Option<TypeHandle> {
            (kind == ElementKind::Float64)
                .then(|| TypeHandle::new((&self.tag as *const u64).cast_mut().cast()))
                .flatten()
        }

        fn apply_array_type(&self, element_type: TypeHandle, ndims: usize) -> Option<TypeHandle> {
            (ndims <= 2).then_some(element_type)
        }

        fn alloc_array_1d(&self, _array_type: TypeHandle, n: usize) -> *mut c_void {
            self.alloc(1, n, 1, n)
        }

        fn alloc_array_2d(&self, _array_type: TypeHandle, nrows: usize, ncols: usize) -> *mut c_void {
            self.alloc(2, nrows, ncols, nrows * ncols)
        }
    }

    impl Float64Only {
        fn alloc(&self, ndims: u16, nrows: usize, ncols: usize, len: usize) -> *mut c_void {
            let mut data = vec![0.0f64; len];
            let mut header = Box::new(ArrayHeader {
                data: data.as_mut_ptr().cast(),
                length: len,
                flags: ArrayFlags::compose(1, ndims, false, false, false, true).bits(),
                element_size: 8,
                offset: 0,
                nrows,
                ncols,
            });
            let address = (&mut *header as *mut ArrayHeader).cast();
            self.arrays.lock().unwrap().push((header, data));
            address
        }
    }

    fn runtime() -> Float64Only {
        Float64Only {
            tag: 0,
            arrays: Mutex::new(Vec::new()),
        }
    }

    #[test]
    fn create_1d_wraps_runtime_array() {
        let rt = runtime();
        let h = ForeignArrayHandle::<f64>::create_1d(&rt, 5).unwrap();
        assert_eq!(h.len(), 5);
        assert_eq!(h.ndims(), 1);
        assert_eq!(h.to_vec().unwrap(), vec![0.0; 5]);
    }

    #[test]
    fn create_2d_reports_extents() {
        let rt = runtime();
        let h = ForeignArrayHandle::<f64>::create_2d(&rt, 2, 3).unwrap();
        assert_eq!(h.row_count(), Ok(2));
        assert_eq!(h.col_count(), Ok(3));
        assert_eq!(h.len(), 6);
    }

    #[test]
    fn kind_missing_from_table_is_unsupported() {
        let rt = runtime();
        let err = ForeignArrayHandle::<i64>::create_1d(&rt, 3).unwrap_err();
        assert_eq!(
            err,
            ArrayError::UnsupportedElementType {
                kind: ElementKind::Int64
            }
        );
    }

    #[test]
    fn null_type_handle_is_none() {
        assert!(TypeHandle::new(std::ptr::null_mut()).is_none());
    }
}
