//! Dense kernel family: elementwise slice loops (SIMD with scalar
//! fallback), the blocked matrix-product kernel, and dense/sparse mixed
//! loops.
//!
//! Kernels operate on raw row-major slices so the parallel scheduler can
//! hand each worker a disjoint row-block of the target. Every SIMD call
//! site falls through to the scalar loop when the element type reports no
//! vector support; callers never branch on the type.

use crate::dense::DenseMatrix;
use crate::simd::SimdScalar;
use crate::sparse::SparseMatrix;
use crate::structure::OpKind;
use crate::Scalar;

// ---------------------------------------------------------------------------
// Elementwise slice kernels
// ---------------------------------------------------------------------------

/// `dst[i] = a[i] <op> b[i]` for an elementwise operator.
pub(crate) fn ew_slices<T: SimdScalar>(op: OpKind, dst: &mut [T], a: &[T], b: &[T]) {
    debug_assert_eq!(dst.len(), a.len());
    debug_assert_eq!(dst.len(), b.len());
    match op {
        OpKind::Add => {
            if !T::try_simd_add(dst, a, b) {
                for ((d, &x), &y) in dst.iter_mut().zip(a).zip(b) {
                    *d = x + y;
                }
            }
        }
        OpKind::Sub => {
            if !T::try_simd_sub(dst, a, b) {
                for ((d, &x), &y) in dst.iter_mut().zip(a).zip(b) {
                    *d = x - y;
                }
            }
        }
        OpKind::Schur => {
            if !T::try_simd_mul(dst, a, b) {
                for ((d, &x), &y) in dst.iter_mut().zip(a).zip(b) {
                    *d = x * y;
                }
            }
        }
        _ => unreachable!("ew_slices handles elementwise operators"),
    }
}

/// `dst[i] = dst[i] <op> src[i]`.
pub(crate) fn ew_assign_slices<T: SimdScalar>(op: OpKind, dst: &mut [T], src: &[T]) {
    debug_assert_eq!(dst.len(), src.len());
    match op {
        OpKind::Add => {
            if !T::try_simd_add_assign(dst, src) {
                for (d, &x) in dst.iter_mut().zip(src) {
                    *d = *d + x;
                }
            }
        }
        OpKind::Sub => {
            if !T::try_simd_sub_assign(dst, src) {
                for (d, &x) in dst.iter_mut().zip(src) {
                    *d = *d - x;
                }
            }
        }
        OpKind::Schur => {
            if !T::try_simd_mul_assign(dst, src) {
                for (d, &x) in dst.iter_mut().zip(src) {
                    *d = *d * x;
                }
            }
        }
        _ => unreachable!("ew_assign_slices handles elementwise operators"),
    }
}

/// `dst[i] = k * dst[i]`.
pub(crate) fn scale_assign_slice<T: SimdScalar>(dst: &mut [T], k: T) {
    if !T::try_simd_scale_assign(dst, k) {
        for d in dst.iter_mut() {
            *d = k * *d;
        }
    }
}

/// `dst[i] += k * src[i]`.
pub(crate) fn axpy_slice<T: SimdScalar>(dst: &mut [T], src: &[T], k: T) {
    debug_assert_eq!(dst.len(), src.len());
    if !T::try_simd_axpy(dst, src, k) {
        for (d, &x) in dst.iter_mut().zip(src) {
            *d = *d + k * x;
        }
    }
}

/// Dot product of two equal-length slices.
pub(crate) fn dot_slices<T: SimdScalar>(a: &[T], b: &[T]) -> T {
    debug_assert_eq!(a.len(), b.len());
    if let Some(d) = T::try_simd_dot(a, b) {
        return d;
    }
    let mut acc = T::zero();
    for (&x, &y) in a.iter().zip(b) {
        acc = acc + x * y;
    }
    acc
}

// ---------------------------------------------------------------------------
// Dense operand view for product kernels
// ---------------------------------------------------------------------------

/// A dense matrix operand as the product kernel sees it: possibly a
/// transposed view, in which case row slices are unavailable and access
/// degrades to strided `get`.
#[derive(Clone, Copy)]
pub(crate) struct DenseOperand<'a, T> {
    pub(crate) m: &'a DenseMatrix<T>,
    pub(crate) transposed: bool,
}

impl<'a, T: Scalar> DenseOperand<'a, T> {
    pub(crate) fn new(m: &'a DenseMatrix<T>) -> Self {
        DenseOperand {
            m,
            transposed: false,
        }
    }

    pub(crate) fn cols(&self) -> usize {
        if self.transposed {
            self.m.rows()
        } else {
            self.m.cols()
        }
    }

    #[inline]
    pub(crate) fn get(&self, i: usize, j: usize) -> T {
        if self.transposed {
            self.m.get(j, i)
        } else {
            self.m.get(i, j)
        }
    }

    /// Contiguous row slice, available only on untransposed views.
    #[inline]
    pub(crate) fn row(&self, i: usize) -> Option<&'a [T]> {
        if self.transposed {
            None
        } else {
            Some(self.m.row(i))
        }
    }
}

// ---------------------------------------------------------------------------
// Product kernels (one row block of the target per call)
// ---------------------------------------------------------------------------

/// Dense × dense product into target rows starting at `r0`.
///
/// `c_block` is the row-major block slice of the target; `n` its width.
/// The ikj loop keeps the inner update on contiguous target/B rows so the
/// axpy kernel can vectorize; a transposed B falls back to the scalar
/// inner loop.
pub(crate) fn matmul_block<T: SimdScalar>(
    c_block: &mut [T],
    r0: usize,
    n: usize,
    a: &DenseOperand<'_, T>,
    b: &DenseOperand<'_, T>,
) {
    let inner = a.cols();
    let rows_here = c_block.len() / n.max(1);
    for local in 0..rows_here {
        let i = r0 + local;
        let c_row = &mut c_block[local * n..(local + 1) * n];
        c_row.fill(T::zero());
        for k in 0..inner {
            let aik = a.get(i, k);
            if aik.is_zero() {
                continue;
            }
            match b.row(k) {
                Some(b_row) => axpy_slice(c_row, b_row, aik),
                None => {
                    for (j, c) in c_row.iter_mut().enumerate() {
                        *c = *c + aik * b.get(k, j);
                    }
                }
            }
        }
    }
}

/// Sparse × dense product into target rows starting at `r0`.
pub(crate) fn sp_dense_mult_block<T: SimdScalar>(
    c_block: &mut [T],
    r0: usize,
    n: usize,
    a: &SparseMatrix<T>,
    b: &DenseOperand<'_, T>,
) {
    let rows_here = c_block.len() / n.max(1);
    for local in 0..rows_here {
        let i = r0 + local;
        let c_row = &mut c_block[local * n..(local + 1) * n];
        c_row.fill(T::zero());
        let (cols, vals) = a.row_entries(i);
        for (&k, &v) in cols.iter().zip(vals) {
            match b.row(k) {
                Some(b_row) => axpy_slice(c_row, b_row, v),
                None => {
                    for (j, c) in c_row.iter_mut().enumerate() {
                        *c = *c + v * b.get(k, j);
                    }
                }
            }
        }
    }
}

/// Dense × sparse product into target rows starting at `r0`.
///
/// Scatter form: row k of B contributes `a[i][k] * b[k][j]` at the stored
/// columns `j` only.
pub(crate) fn dense_sp_mult_block<T: SimdScalar>(
    c_block: &mut [T],
    r0: usize,
    n: usize,
    a: &DenseOperand<'_, T>,
    b: &SparseMatrix<T>,
) {
    let inner = a.cols();
    let rows_here = c_block.len() / n.max(1);
    for local in 0..rows_here {
        let i = r0 + local;
        let c_row = &mut c_block[local * n..(local + 1) * n];
        c_row.fill(T::zero());
        for k in 0..inner {
            let aik = a.get(i, k);
            if aik.is_zero() {
                continue;
            }
            let (cols, vals) = b.row_entries(k);
            for (&j, &v) in cols.iter().zip(vals) {
                c_row[j] = c_row[j] + aik * v;
            }
        }
    }
}

/// Scatter a sparse leaf into freshly assigned target rows (zero fill plus
/// stored entries).
pub(crate) fn scatter_sparse_block<T: Scalar>(
    c_block: &mut [T],
    r0: usize,
    n: usize,
    s: &SparseMatrix<T>,
    transposed: bool,
) {
    let rows_here = c_block.len() / n.max(1);
    c_block.fill(T::zero());
    if transposed {
        // View element (i, j) reads base element (j, i); there is no cheap
        // row iteration over a transposed CSR, so read by index.
        for local in 0..rows_here {
            let i = r0 + local;
            let c_row = &mut c_block[local * n..(local + 1) * n];
            for (j, c) in c_row.iter_mut().enumerate() {
                let v = s.get(j, i);
                if !v.is_zero() {
                    *c = v;
                }
            }
        }
    } else {
        for local in 0..rows_here {
            let i = r0 + local;
            let c_row = &mut c_block[local * n..(local + 1) * n];
            let (cols, vals) = s.row_entries(i);
            for (&j, &v) in cols.iter().zip(vals) {
                c_row[j] = v;
            }
        }
    }
}
