//! Sparse kernel family: sorted-index merges and the sparse product.
//!
//! Add/Sub merge the union of the operand index sets, Schur the
//! intersection; both walk each sorted index sequence once (linear merge).
//! The product uses a per-row accumulator over the touched column set.
//!
//! Explicit-zero policy: entries produced by cancellation in Add/Sub are
//! retained — the output pattern is exactly the union/intersection of the
//! input patterns, independent of the values. The product only
//! materializes columns the accumulator actually touched.

use smallvec::SmallVec;

use crate::sparse::{SparseMatrix, SparseVector};
use crate::structure::OpKind;
use crate::Scalar;

/// Merge two sorted (index, value) sequences into union (Add/Sub) output.
///
/// `negate_rhs` turns the merge into subtraction.
fn union_merge<T: Scalar>(
    a_idx: &[usize],
    a_val: &[T],
    b_idx: &[usize],
    b_val: &[T],
    negate_rhs: bool,
    out_idx: &mut Vec<usize>,
    out_val: &mut Vec<T>,
) {
    let rhs = |v: T| if negate_rhs { T::zero() - v } else { v };
    let (mut p, mut q) = (0usize, 0usize);
    while p < a_idx.len() && q < b_idx.len() {
        match a_idx[p].cmp(&b_idx[q]) {
            std::cmp::Ordering::Less => {
                out_idx.push(a_idx[p]);
                out_val.push(a_val[p]);
                p += 1;
            }
            std::cmp::Ordering::Greater => {
                out_idx.push(b_idx[q]);
                out_val.push(rhs(b_val[q]));
                q += 1;
            }
            std::cmp::Ordering::Equal => {
                out_idx.push(a_idx[p]);
                out_val.push(a_val[p] + rhs(b_val[q]));
                p += 1;
                q += 1;
            }
        }
    }
    while p < a_idx.len() {
        out_idx.push(a_idx[p]);
        out_val.push(a_val[p]);
        p += 1;
    }
    while q < b_idx.len() {
        out_idx.push(b_idx[q]);
        out_val.push(rhs(b_val[q]));
        q += 1;
    }
}

/// Merge two sorted (index, value) sequences into intersection (Schur)
/// output.
fn intersect_merge<T: Scalar>(
    a_idx: &[usize],
    a_val: &[T],
    b_idx: &[usize],
    b_val: &[T],
    out_idx: &mut Vec<usize>,
    out_val: &mut Vec<T>,
) {
    let (mut p, mut q) = (0usize, 0usize);
    while p < a_idx.len() && q < b_idx.len() {
        match a_idx[p].cmp(&b_idx[q]) {
            std::cmp::Ordering::Less => p += 1,
            std::cmp::Ordering::Greater => q += 1,
            std::cmp::Ordering::Equal => {
                out_idx.push(a_idx[p]);
                out_val.push(a_val[p] * b_val[q]);
                p += 1;
                q += 1;
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Vector kernels
// ---------------------------------------------------------------------------

/// Elementwise combine of two sparse vectors of equal length.
pub(crate) fn sv_combine<T: Scalar>(
    op: OpKind,
    a: &SparseVector<T>,
    b: &SparseVector<T>,
) -> SparseVector<T> {
    debug_assert_eq!(a.len(), b.len());
    let mut idx = Vec::new();
    let mut val = Vec::new();
    match op {
        OpKind::Add => union_merge(
            a.indices(),
            a.values(),
            b.indices(),
            b.values(),
            false,
            &mut idx,
            &mut val,
        ),
        OpKind::Sub => union_merge(
            a.indices(),
            a.values(),
            b.indices(),
            b.values(),
            true,
            &mut idx,
            &mut val,
        ),
        OpKind::Schur => intersect_merge(
            a.indices(),
            a.values(),
            b.indices(),
            b.values(),
            &mut idx,
            &mut val,
        ),
        _ => unreachable!("sv_combine handles elementwise operators"),
    }
    SparseVector::from_sorted_parts(a.len(), idx, val)
}

/// Scalar multiple of a sparse vector (pattern unchanged).
pub(crate) fn sv_scale<T: Scalar>(k: T, v: &SparseVector<T>) -> SparseVector<T> {
    let values = v.values().iter().map(|&x| k * x).collect();
    SparseVector::from_sorted_parts(v.len(), v.indices().to_vec(), values)
}

// ---------------------------------------------------------------------------
// Matrix kernels
// ---------------------------------------------------------------------------

/// Elementwise combine of two equal-shape CSR matrices, row by row.
pub(crate) fn csr_combine<T: Scalar>(
    op: OpKind,
    a: &SparseMatrix<T>,
    b: &SparseMatrix<T>,
) -> SparseMatrix<T> {
    debug_assert_eq!((a.rows(), a.cols()), (b.rows(), b.cols()));
    let mut row_ptr = Vec::with_capacity(a.rows() + 1);
    let mut col_idx = Vec::new();
    let mut values = Vec::new();
    row_ptr.push(0);
    for i in 0..a.rows() {
        let (ac, av) = a.row_entries(i);
        let (bc, bv) = b.row_entries(i);
        match op {
            OpKind::Add => union_merge(ac, av, bc, bv, false, &mut col_idx, &mut values),
            OpKind::Sub => union_merge(ac, av, bc, bv, true, &mut col_idx, &mut values),
            OpKind::Schur => intersect_merge(ac, av, bc, bv, &mut col_idx, &mut values),
            _ => unreachable!("csr_combine handles elementwise operators"),
        }
        row_ptr.push(values.len());
    }
    SparseMatrix::from_csr_parts(a.rows(), a.cols(), row_ptr, col_idx, values)
}

/// Sparse × sparse product via a per-row accumulator.
///
/// For each row of A, the stored entries scatter scaled rows of B into a
/// dense accumulator; only touched columns are emitted, in ascending
/// order.
pub(crate) fn csr_mult<T: Scalar>(a: &SparseMatrix<T>, b: &SparseMatrix<T>) -> SparseMatrix<T> {
    debug_assert_eq!(a.cols(), b.rows());
    let n = b.cols();
    let mut acc: Vec<T> = vec![T::zero(); n];
    let mut seen: Vec<bool> = vec![false; n];
    let mut touched: SmallVec<[usize; 64]> = SmallVec::new();

    let mut row_ptr = Vec::with_capacity(a.rows() + 1);
    let mut col_idx = Vec::new();
    let mut values = Vec::new();
    row_ptr.push(0);

    for i in 0..a.rows() {
        let (ac, av) = a.row_entries(i);
        for (&k, &aik) in ac.iter().zip(av) {
            let (bc, bv) = b.row_entries(k);
            for (&j, &bkj) in bc.iter().zip(bv) {
                if !seen[j] {
                    seen[j] = true;
                    touched.push(j);
                }
                acc[j] = acc[j] + aik * bkj;
            }
        }
        touched.sort_unstable();
        for &j in touched.iter() {
            col_idx.push(j);
            values.push(acc[j]);
            acc[j] = T::zero();
            seen[j] = false;
        }
        touched.clear();
        row_ptr.push(values.len());
    }
    SparseMatrix::from_csr_parts(a.rows(), b.cols(), row_ptr, col_idx, values)
}

/// Scalar multiple of a CSR matrix (pattern unchanged).
pub(crate) fn csr_scale<T: Scalar>(k: T, m: &SparseMatrix<T>) -> SparseMatrix<T> {
    let mut row_ptr = Vec::with_capacity(m.rows() + 1);
    let mut col_idx = Vec::new();
    let mut values = Vec::new();
    row_ptr.push(0);
    for i in 0..m.rows() {
        let (cols, vals) = m.row_entries(i);
        col_idx.extend_from_slice(cols);
        values.extend(vals.iter().map(|&v| k * v));
        row_ptr.push(values.len());
    }
    SparseMatrix::from_csr_parts(m.rows(), m.cols(), row_ptr, col_idx, values)
}

/// CSR transpose via counting sort over columns.
pub(crate) fn csr_transpose<T: Scalar>(m: &SparseMatrix<T>) -> SparseMatrix<T> {
    let (rows, cols) = (m.rows(), m.cols());
    let mut counts = vec![0usize; cols + 1];
    for (_, j, _) in m.iter() {
        counts[j + 1] += 1;
    }
    for c in 1..=cols {
        counts[c] += counts[c - 1];
    }
    let row_ptr = counts.clone();
    let nnz = m.nnz();
    let mut col_idx = vec![0usize; nnz];
    let mut values = vec![T::zero(); nnz];
    let mut next = counts;
    for (i, j, v) in m.iter() {
        let slot = next[j];
        col_idx[slot] = i;
        values[slot] = v;
        next[j] += 1;
    }
    SparseMatrix::from_csr_parts(cols, rows, row_ptr, col_idx, values)
}

/// Identity pattern of order `n`.
pub(crate) fn csr_identity<T: Scalar>(n: usize) -> SparseMatrix<T> {
    let row_ptr = (0..=n).collect();
    let col_idx = (0..n).collect();
    let values = vec![T::one(); n];
    SparseMatrix::from_csr_parts(n, n, row_ptr, col_idx, values)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vector_union_add() {
        // Nonzero index sets {1,3,5} and {2,3}: union is {1,2,3,5} and the
        // shared index sums.
        let a = SparseVector::from_pairs(8, &[(1, 1.0), (3, 3.0), (5, 5.0)]).unwrap();
        let b = SparseVector::from_pairs(8, &[(2, 2.0), (3, 30.0)]).unwrap();
        let c = sv_combine(OpKind::Add, &a, &b);
        assert_eq!(c.indices(), &[1, 2, 3, 5]);
        assert_eq!(c.get(3), 33.0);
        assert_eq!(c.get(2), 2.0);
        assert_eq!(c.get(0), 0.0);
    }

    #[test]
    fn test_vector_sub_negates_rhs_only_entries() {
        let a = SparseVector::from_pairs(4, &[(1, 5.0)]).unwrap();
        let b = SparseVector::from_pairs(4, &[(1, 2.0), (2, 3.0)]).unwrap();
        let c = sv_combine(OpKind::Sub, &a, &b);
        assert_eq!(c.indices(), &[1, 2]);
        assert_eq!(c.get(1), 3.0);
        assert_eq!(c.get(2), -3.0);
    }

    #[test]
    fn test_vector_cancellation_retains_explicit_zero() {
        let a = SparseVector::from_pairs(4, &[(1, 2.0)]).unwrap();
        let b = SparseVector::from_pairs(4, &[(1, 2.0)]).unwrap();
        let c = sv_combine(OpKind::Sub, &a, &b);
        // The slot survives with an explicit zero; the pattern is the
        // union regardless of values.
        assert_eq!(c.nnz(), 1);
        assert_eq!(c.get(1), 0.0);
    }

    #[test]
    fn test_vector_schur_intersection() {
        let a = SparseVector::from_pairs(8, &[(1, 1.0), (3, 3.0), (5, 5.0)]).unwrap();
        let b = SparseVector::from_pairs(8, &[(2, 2.0), (3, 30.0)]).unwrap();
        let c = sv_combine(OpKind::Schur, &a, &b);
        assert_eq!(c.indices(), &[3]);
        assert_eq!(c.get(3), 90.0);
    }

    #[test]
    fn test_csr_combine_add() {
        let a = SparseMatrix::from_triplets(2, 3, &[(0, 0, 1.0), (1, 2, 2.0)]).unwrap();
        let b = SparseMatrix::from_triplets(2, 3, &[(0, 0, 10.0), (0, 1, 20.0)]).unwrap();
        let c = csr_combine(OpKind::Add, &a, &b);
        assert_eq!(c.get(0, 0), 11.0);
        assert_eq!(c.get(0, 1), 20.0);
        assert_eq!(c.get(1, 2), 2.0);
        assert_eq!(c.nnz(), 3);
    }

    #[test]
    fn test_csr_mult_small() {
        // A = [[1, 0], [0, 2]] (diagonal), B = [[0, 3], [4, 0]]
        let a = SparseMatrix::from_triplets(2, 2, &[(0, 0, 1.0), (1, 1, 2.0)]).unwrap();
        let b = SparseMatrix::from_triplets(2, 2, &[(0, 1, 3.0), (1, 0, 4.0)]).unwrap();
        let c = csr_mult(&a, &b);
        assert_eq!(c.get(0, 1), 3.0);
        assert_eq!(c.get(1, 0), 8.0);
        assert_eq!(c.nnz(), 2);
    }

    #[test]
    fn test_csr_mult_matches_dense() {
        let a = SparseMatrix::from_triplets(
            3,
            3,
            &[(0, 0, 1.0), (0, 2, 2.0), (1, 1, 3.0), (2, 0, 4.0), (2, 2, 5.0)],
        )
        .unwrap();
        let b = SparseMatrix::from_triplets(
            3,
            3,
            &[(0, 1, 6.0), (1, 0, 7.0), (1, 2, 8.0), (2, 1, 9.0)],
        )
        .unwrap();
        let c = csr_mult(&a, &b);
        for i in 0..3 {
            for j in 0..3 {
                let mut expected = 0.0;
                for k in 0..3 {
                    expected += a.get(i, k) * b.get(k, j);
                }
                assert_eq!(c.get(i, j), expected, "mismatch at ({i}, {j})");
            }
        }
    }

    #[test]
    fn test_csr_mult_columns_ascend() {
        let a = SparseMatrix::from_triplets(1, 2, &[(0, 0, 1.0), (0, 1, 1.0)]).unwrap();
        let b =
            SparseMatrix::from_triplets(2, 3, &[(0, 2, 1.0), (1, 0, 1.0), (1, 1, 1.0)]).unwrap();
        let c = csr_mult(&a, &b);
        let (cols, _) = c.row_entries(0);
        assert_eq!(cols, &[0, 1, 2]);
    }

    #[test]
    fn test_csr_scale() {
        let m = SparseMatrix::from_triplets(2, 2, &[(0, 1, 2.0), (1, 0, 3.0)]).unwrap();
        let s = csr_scale(10.0, &m);
        assert_eq!(s.get(0, 1), 20.0);
        assert_eq!(s.get(1, 0), 30.0);
        assert_eq!(s.nnz(), 2);
    }

    #[test]
    fn test_csr_transpose() {
        let m =
            SparseMatrix::from_triplets(2, 3, &[(0, 1, 2.0), (0, 2, 3.0), (1, 0, 4.0)]).unwrap();
        let t = csr_transpose(&m);
        assert_eq!((t.rows(), t.cols()), (3, 2));
        for i in 0..2 {
            for j in 0..3 {
                assert_eq!(t.get(j, i), m.get(i, j));
            }
        }
        // Sorted contract within each row.
        for i in 0..t.rows() {
            let (cols, _) = t.row_entries(i);
            assert!(cols.windows(2).all(|w| w[0] < w[1]));
        }
    }

    #[test]
    fn test_csr_identity() {
        let id = csr_identity::<f64>(3);
        assert_eq!(id.nnz(), 3);
        for i in 0..3 {
            assert_eq!(id.get(i, i), 1.0);
        }
    }
}
