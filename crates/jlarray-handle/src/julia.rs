//! [`ForeignRuntime`] backed by a `libjulia` shared library.
//!
//! Resolves `jl_apply_array_type`, `jl_alloc_array_1d`, `jl_alloc_array_2d`
//! and the `jl_<kind>_type` globals with `libloading`. The runtime must
//! already be initialised in this process (`jl_init`) before any array is
//! created; starting and stopping it is the embedder's job. All calls must
//! come from a thread the runtime has adopted.

#![allow(unsafe_code)]

use std::ffi::{c_void, OsStr};
use std::ptr::NonNull;

use jlarray_core::{ArrayError, ElementKind};

use crate::runtime::{ForeignRuntime, TypeHandle};

type FnApplyArrayType = unsafe extern "C" fn(element_type: *mut c_void, ndims: usize) -> *mut c_void;
type FnAllocArray1d = unsafe extern "C" fn(array_type: *mut c_void, n: usize) -> *mut c_void;
type FnAllocArray2d =
    unsafe extern "C" fn(array_type: *mut c_void, nrows: usize, ncols: usize) -> *mut c_void;

/// Entry points of a loaded `libjulia`.
pub struct JuliaLibrary {
    apply_array_type: FnApplyArrayType,
    alloc_array_1d: FnAllocArray1d,
    alloc_array_2d: FnAllocArray2d,
    /// Address of each `jl_<kind>_type` global, indexed by `ElementKind as usize`.
    type_globals: [Option<NonNull<*mut c_void>>; ElementKind::ALL.len()],
    // Keeps the function pointers above valid; dropped last.
    _library: libloading::Library,
}

// SAFETY: the function pointers and global addresses are process-wide and
// immutable once resolved; the runtime's own threading rules are the
// caller's contract (see module docs).
unsafe impl Send for JuliaLibrary {}
// SAFETY: see `Send`.
unsafe impl Sync for JuliaLibrary {}

impl JuliaLibrary {
    /// Library names tried by [`JuliaLibrary::load`].
    #[cfg(target_os = "linux")]
    pub const DEFAULT_NAMES: &'static [&'static str] = &["libjulia.so.1", "libjulia.so"];
    /// Library names tried by [`JuliaLibrary::load`].
    #[cfg(target_os = "macos")]
    pub const DEFAULT_NAMES: &'static [&'static str] = &["libjulia.1.dylib", "libjulia.dylib"];
    /// Library names tried by [`JuliaLibrary::load`].
    #[cfg(target_os = "windows")]
    pub const DEFAULT_NAMES: &'static [&'static str] = &["libjulia.dll"];
    /// Library names tried by [`JuliaLibrary::load`].
    #[cfg(not(any(target_os = "linux", target_os = "macos", target_os = "windows")))]
    pub const DEFAULT_NAMES: &'static [&'static str] = &[];

    /// Load the first of [`DEFAULT_NAMES`](Self::DEFAULT_NAMES) that resolves.
    pub fn load() -> Result<Self, ArrayError> {
        let mut last = ArrayError::RuntimeUnavailable {
            reason: "no libjulia name for this platform".to_string(),
        };
        for name in Self::DEFAULT_NAMES {
            match Self::open(name) {
                Ok(lib) => return Ok(lib),
                Err(e) => last = e,
            }
        }
        Err(last)
    }

    /// Load `libjulia` from `path`.
    pub fn open(path: impl AsRef<OsStr>) -> Result<Self, ArrayError> {
        let path = path.as_ref();
        tracing::debug!(path = ?path, "loading libjulia");
        let unavailable = |e: libloading::Error| ArrayError::RuntimeUnavailable {
            reason: e.to_string(),
        };

        // SAFETY: loading runs the library's initialisers; libjulia's do not
        // start the runtime.
        let library = unsafe { libloading::Library::new(path) }.map_err(unavailable)?;

        // SAFETY: the signatures match the runtime's exported C API.
        let (apply_array_type, alloc_array_1d, alloc_array_2d) = unsafe {
            (
                *library
                    .get::<FnApplyArrayType>(b"jl_apply_array_type\0")
                    .map_err(unavailable)?,
                *library
                    .get::<FnAllocArray1d>(b"jl_alloc_array_1d\0")
                    .map_err(unavailable)?,
                *library
                    .get::<FnAllocArray2d>(b"jl_alloc_array_2d\0")
                    .map_err(unavailable)?,
            )
        };

        let mut type_globals = [None; ElementKind::ALL.len()];
        for kind in ElementKind::ALL {
            // SAFETY: each symbol is a `jl_datatype_t *` global; we take its
            // address and only read it later.
            let global = unsafe { library.get::<*mut *mut c_void>(kind.symbol().as_bytes()) };
            match global {
                Ok(symbol) => type_globals[kind as usize] = NonNull::new(*symbol),
                Err(_) => tracing::debug!(%kind, "libjulia does not export {}", kind.symbol()),
            }
        }

        tracing::info!(path = ?path, "loaded libjulia");
        Ok(Self {
            apply_array_type,
            alloc_array_1d,
            alloc_array_2d,
            type_globals,
            _library: library,
        })
    }
}

// SAFETY: the runtime's allocators return either null or a live array of
// the requested type and shape.
unsafe impl ForeignRuntime for JuliaLibrary {
    fn element_type(&self, kind: ElementKind) -> Option<TypeHandle> {
        let global = self.type_globals[kind as usize]?;
        // SAFETY: the global lives as long as the library; it is null until
        // the runtime is initialised, which TypeHandle::new maps to None.
        TypeHandle::new(unsafe { global.as_ptr().read() })
    }

    fn apply_array_type(&self, element_type: TypeHandle, ndims: usize) -> Option<TypeHandle> {
        // SAFETY: element_type came from `element_type` above.
        TypeHandle::new(unsafe { (self.apply_array_type)(element_type.as_ptr(), ndims) })
    }

    fn alloc_array_1d(&self, array_type: TypeHandle, n: usize) -> *mut c_void {
        // SAFETY: array_type came from `apply_array_type`.
        unsafe { (self.alloc_array_1d)(array_type.as_ptr(), n) }
    }

    fn alloc_array_2d(&self, array_type: TypeHandle, nrows: usize, ncols: usize) -> *mut c_void {
        // SAFETY: array_type came from `apply_array_type`.
        unsafe { (self.alloc_array_2d)(array_type.as_ptr(), nrows, ncols) }
    }
}
