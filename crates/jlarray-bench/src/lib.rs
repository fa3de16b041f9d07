//! Benchmark fixtures for jlarray.
//!
//! - [`matrix_fixture`]: a `rows × cols` `f64` array filled with
//!   [`pattern`](jlarray_test_utils::fixtures::pattern) and wrapped
//! - [`REFERENCE_SHAPE`]: the shape the benches use by default

#![forbid(unsafe_code)]
#![deny(rustdoc::broken_intra_doc_links)]

use jlarray_core::ArrayError;
use jlarray_handle::ForeignArrayHandle;
use jlarray_test_utils::{fixtures, MockRuntime};

/// 100 x 100 (10K elements, 80 KB of `f64`; large enough to be
/// malloc-flagged).
pub const REFERENCE_SHAPE: (usize, usize) = (100, 100);

/// Allocate a `rows × cols` `f64` array in `runtime` and fill it row by row.
pub fn matrix_fixture(
    runtime: &MockRuntime,
    rows: usize,
    cols: usize,
) -> Result<ForeignArrayHandle<f64>, ArrayError> {
    let handle = ForeignArrayHandle::<f64>::create_2d(runtime, rows, cols)?;
    let address = handle.acquire()?;
    let filled = runtime.write(address, &fixtures::pattern(rows, cols));
    handle.release(address)?;
    filled?;
    Ok(handle)
}
