//! Hand-built headers and element patterns.

use std::ptr;

use jlarray_handle::{ArrayFlags, ArrayHeader};

/// `is_aligned | ndims = 2 | how = 1`, spelled out bit by bit.
pub const ALIGNED_2D_RUNTIME_BUFFER: u16 = 0b1_0_0_0_0000000010_01;

/// A header with null `data` and the given fields.
pub fn header(
    flags: ArrayFlags,
    element_size: u16,
    length: usize,
    nrows: usize,
    ncols: usize,
) -> ArrayHeader {
    ArrayHeader {
        data: ptr::null_mut(),
        length,
        flags: flags.bits(),
        element_size,
        offset: 0,
        nrows,
        ncols,
    }
}

/// `rows × cols` values where element `(i, j)` is `10 * i + j`, listed row
/// by row.
pub fn pattern(rows: usize, cols: usize) -> Vec<f64> {
    (0..rows)
        .flat_map(|i| (0..cols).map(move |j| (10 * i + j) as f64))
        .collect()
}
