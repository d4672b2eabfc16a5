//! Sparse containers: sorted coordinate vectors and CSR matrices.
//!
//! Both types uphold the sorted-nonzero iteration contract the kernels rely
//! on: indices ascend strictly, each index appears once, and iteration
//! visits every stored entry exactly once. Reading a non-stored index yields
//! the additive identity.
//!
//! Stored values are allowed to be exactly zero: arithmetic that cancels a
//! pair of entries keeps the slot (see `sparse_kernel` for the policy).

use num_traits::Zero;

use crate::{EvalError, Result, Scalar};

/// Sparse vector as parallel sorted index/value arrays.
#[derive(Debug, Clone, PartialEq)]
pub struct SparseVector<T> {
    len: usize,
    indices: Vec<usize>,
    values: Vec<T>,
}

impl<T: Scalar> SparseVector<T> {
    /// Empty vector of logical length `len`.
    pub fn new(len: usize) -> Self {
        SparseVector {
            len,
            indices: Vec::new(),
            values: Vec::new(),
        }
    }

    /// Build from `(index, value)` pairs.
    ///
    /// Pairs must be strictly ascending by index and in bounds; violations
    /// fail with [`EvalError::InvalidSparse`].
    pub fn from_pairs(len: usize, pairs: &[(usize, T)]) -> Result<Self> {
        let mut indices = Vec::with_capacity(pairs.len());
        let mut values = Vec::with_capacity(pairs.len());
        for &(i, v) in pairs {
            if i >= len {
                return Err(EvalError::InvalidSparse {
                    what: "index out of bounds",
                });
            }
            if let Some(&last) = indices.last() {
                if i <= last {
                    return Err(EvalError::InvalidSparse {
                        what: "indices must be strictly ascending",
                    });
                }
            }
            indices.push(i);
            values.push(v);
        }
        Ok(SparseVector {
            len,
            indices,
            values,
        })
    }

    pub(crate) fn from_sorted_parts(len: usize, indices: Vec<usize>, values: Vec<T>) -> Self {
        debug_assert_eq!(indices.len(), values.len());
        debug_assert!(indices.windows(2).all(|w| w[0] < w[1]));
        debug_assert!(indices.last().map_or(true, |&i| i < len));
        SparseVector {
            len,
            indices,
            values,
        }
    }

    /// Logical length.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of stored entries.
    pub fn nnz(&self) -> usize {
        self.indices.len()
    }

    /// Element at `i`; the additive identity when not stored.
    pub fn get(&self, i: usize) -> T {
        debug_assert!(i < self.len);
        match self.indices.binary_search(&i) {
            Ok(pos) => self.values[pos],
            Err(_) => T::zero(),
        }
    }

    /// Stored entries in ascending index order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, T)> + '_ {
        self.indices.iter().copied().zip(self.values.iter().copied())
    }

    pub fn indices(&self) -> &[usize] {
        &self.indices
    }

    pub fn values(&self) -> &[T] {
        &self.values
    }
}

/// Compressed sparse row matrix.
///
/// Row `i`'s entries live at `col_idx[row_ptr[i]..row_ptr[i+1]]` /
/// `values[row_ptr[i]..row_ptr[i+1]]`, column indices strictly ascending
/// within each row.
#[derive(Debug, Clone, PartialEq)]
pub struct SparseMatrix<T> {
    rows: usize,
    cols: usize,
    row_ptr: Vec<usize>,
    col_idx: Vec<usize>,
    values: Vec<T>,
}

impl<T: Scalar> SparseMatrix<T> {
    /// Empty matrix.
    pub fn new(rows: usize, cols: usize) -> Self {
        SparseMatrix {
            rows,
            cols,
            row_ptr: vec![0; rows + 1],
            col_idx: Vec::new(),
            values: Vec::new(),
        }
    }

    /// Build from `(row, col, value)` triplets in any order.
    ///
    /// Duplicate positions are summed. Out-of-bounds coordinates fail with
    /// [`EvalError::InvalidSparse`].
    pub fn from_triplets(rows: usize, cols: usize, triplets: &[(usize, usize, T)]) -> Result<Self> {
        for &(r, c, _) in triplets {
            if r >= rows || c >= cols {
                return Err(EvalError::InvalidSparse {
                    what: "coordinate out of bounds",
                });
            }
        }
        let mut sorted: Vec<(usize, usize, T)> = triplets.to_vec();
        sorted.sort_by_key(|&(r, c, _)| (r, c));

        let mut row_ptr = vec![0usize; rows + 1];
        let mut col_idx = Vec::with_capacity(sorted.len());
        let mut values: Vec<T> = Vec::with_capacity(sorted.len());
        let mut last: Option<(usize, usize)> = None;
        let mut cur_row = 0usize;

        for &(r, c, v) in &sorted {
            if last == Some((r, c)) {
                let n = values.len() - 1;
                values[n] = values[n] + v;
                continue;
            }
            while cur_row < r {
                cur_row += 1;
                row_ptr[cur_row] = values.len();
            }
            col_idx.push(c);
            values.push(v);
            last = Some((r, c));
        }
        while cur_row < rows {
            cur_row += 1;
            row_ptr[cur_row] = values.len();
        }
        Ok(SparseMatrix {
            rows,
            cols,
            row_ptr,
            col_idx,
            values,
        })
    }

    /// Compress a dense matrix, dropping exact zeros.
    pub fn from_dense(m: &crate::DenseMatrix<T>) -> Self {
        let mut row_ptr = Vec::with_capacity(m.rows() + 1);
        let mut col_idx = Vec::new();
        let mut values = Vec::new();
        row_ptr.push(0);
        for i in 0..m.rows() {
            for (j, &v) in m.row(i).iter().enumerate() {
                if !v.is_zero() {
                    col_idx.push(j);
                    values.push(v);
                }
            }
            row_ptr.push(values.len());
        }
        SparseMatrix {
            rows: m.rows(),
            cols: m.cols(),
            row_ptr,
            col_idx,
            values,
        }
    }

    pub(crate) fn from_csr_parts(
        rows: usize,
        cols: usize,
        row_ptr: Vec<usize>,
        col_idx: Vec<usize>,
        values: Vec<T>,
    ) -> Self {
        debug_assert_eq!(row_ptr.len(), rows + 1);
        debug_assert_eq!(col_idx.len(), values.len());
        debug_assert_eq!(*row_ptr.last().unwrap(), values.len());
        SparseMatrix {
            rows,
            cols,
            row_ptr,
            col_idx,
            values,
        }
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn nnz(&self) -> usize {
        self.values.len()
    }

    /// Element at `(i, j)`; the additive identity when not stored.
    pub fn get(&self, i: usize, j: usize) -> T {
        debug_assert!(i < self.rows && j < self.cols);
        let (cols, vals) = self.row_entries(i);
        match cols.binary_search(&j) {
            Ok(pos) => vals[pos],
            Err(_) => T::zero(),
        }
    }

    /// Column indices and values of row `i`, ascending by column.
    #[inline]
    pub fn row_entries(&self, i: usize) -> (&[usize], &[T]) {
        let lo = self.row_ptr[i];
        let hi = self.row_ptr[i + 1];
        (&self.col_idx[lo..hi], &self.values[lo..hi])
    }

    /// Stored entries of the whole matrix in row-major order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, usize, T)> + '_ {
        (0..self.rows).flat_map(move |i| {
            let (cols, vals) = self.row_entries(i);
            cols.iter()
                .copied()
                .zip(vals.iter().copied())
                .map(move |(j, v)| (i, j, v))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vector_from_pairs_and_get() {
        let v = SparseVector::from_pairs(8, &[(1, 1.0), (3, 3.0), (5, 5.0)]).unwrap();
        assert_eq!(v.nnz(), 3);
        assert_eq!(v.get(3), 3.0);
        assert_eq!(v.get(2), 0.0);
        let collected: Vec<_> = v.iter().collect();
        assert_eq!(collected, vec![(1, 1.0), (3, 3.0), (5, 5.0)]);
    }

    #[test]
    fn test_vector_rejects_unsorted_and_oob() {
        assert!(SparseVector::from_pairs(4, &[(2, 1.0), (1, 2.0)]).is_err());
        assert!(SparseVector::from_pairs(4, &[(1, 1.0), (1, 2.0)]).is_err());
        assert!(SparseVector::from_pairs(4, &[(4, 1.0)]).is_err());
    }

    #[test]
    fn test_matrix_from_triplets() {
        let m =
            SparseMatrix::from_triplets(3, 3, &[(0, 1, 2.0), (2, 0, 5.0), (0, 0, 1.0)]).unwrap();
        assert_eq!(m.nnz(), 3);
        assert_eq!(m.get(0, 0), 1.0);
        assert_eq!(m.get(0, 1), 2.0);
        assert_eq!(m.get(2, 0), 5.0);
        assert_eq!(m.get(1, 1), 0.0);
        let (cols, vals) = m.row_entries(0);
        assert_eq!(cols, &[0, 1]);
        assert_eq!(vals, &[1.0, 2.0]);
    }

    #[test]
    fn test_matrix_duplicate_triplets_sum() {
        let m = SparseMatrix::from_triplets(2, 2, &[(0, 0, 1.0), (0, 0, 2.0)]).unwrap();
        assert_eq!(m.nnz(), 1);
        assert_eq!(m.get(0, 0), 3.0);
    }

    #[test]
    fn test_matrix_empty_rows() {
        let m = SparseMatrix::from_triplets(4, 4, &[(3, 3, 9.0)]).unwrap();
        assert_eq!(m.row_entries(0).0.len(), 0);
        assert_eq!(m.row_entries(1).0.len(), 0);
        assert_eq!(m.get(3, 3), 9.0);
    }

    #[test]
    fn test_from_dense_roundtrip() {
        let d = crate::DenseMatrix::from_fn(3, 3, |i, j| if i == j { 1.0 + i as f64 } else { 0.0 });
        let s = SparseMatrix::from_dense(&d);
        assert_eq!(s.nnz(), 3);
        for i in 0..3 {
            for j in 0..3 {
                assert_eq!(s.get(i, j), d.get(i, j));
            }
        }
    }

    #[test]
    fn test_iter_row_major() {
        let m =
            SparseMatrix::from_triplets(2, 3, &[(1, 2, 6.0), (0, 1, 2.0), (1, 0, 4.0)]).unwrap();
        let entries: Vec<_> = m.iter().collect();
        assert_eq!(entries, vec![(0, 1, 2.0), (1, 0, 4.0), (1, 2, 6.0)]);
    }
}
