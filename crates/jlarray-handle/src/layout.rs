//! Shape and flat-index addressing for the row/column view.
//!
//! The view addresses element `(row, col)` at flat index `row * ncols + col`,
//! i.e. row-major, whatever order the runtime actually stores elements in.
//! The runtime this crate targets stores matrices column-major, so for a
//! 2-D array `(row, col)` here is the runtime's `(col, row)` transposed
//! onto an `nrows × ncols` grid. Existing callers rely on this order; it is
//! kept on purpose and every accessor built on it says so.

use smallvec::SmallVec;

/// Extents of a 1-D (`[rows]`) or 2-D (`[rows, cols]`) array.
pub type Shape = SmallVec<[usize; 2]>;

/// Flat index of `(row, col)` in an `nrows × ncols` grid, row-major.
///
/// Returns `None` when either coordinate is out of range or the product
/// overflows.
pub fn row_major_index(row: usize, col: usize, nrows: usize, ncols: usize) -> Option<usize> {
    if row >= nrows || col >= ncols {
        return None;
    }
    row.checked_mul(ncols)?.checked_add(col)
}

/// Flat range covering row `row` of an `nrows × ncols` grid, row-major.
pub fn row_range(row: usize, nrows: usize, ncols: usize) -> Option<std::ops::Range<usize>> {
    if row >= nrows {
        return None;
    }
    let start = row.checked_mul(ncols)?;
    Some(start..start.checked_add(ncols)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn two_by_three_walks_rows_first() {
        let order: Vec<usize> = (0..2)
            .flat_map(|i| (0..3).map(move |j| row_major_index(i, j, 2, 3).unwrap()))
            .collect();
        assert_eq!(order, vec![0, 1, 2, 3, 4, 5]);
    }

    #[test]
    fn out_of_range_is_none() {
        assert_eq!(row_major_index(2, 0, 2, 3), None);
        assert_eq!(row_major_index(0, 3, 2, 3), None);
        assert_eq!(row_major_index(0, 0, 0, 0), None);
    }

    #[test]
    fn overflow_is_none() {
        assert_eq!(row_major_index(usize::MAX - 1, 0, usize::MAX, usize::MAX), None);
    }

    #[test]
    fn row_range_spans_one_row() {
        assert_eq!(row_range(1, 2, 3), Some(3..6));
        assert_eq!(row_range(2, 2, 3), None);
        assert_eq!(row_range(0, 4, 0), Some(0..0));
    }
}
