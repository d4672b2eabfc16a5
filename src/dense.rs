//! Dense containers: row-major matrices and contiguous vectors.
//!
//! These are the concrete storage the evaluation engine writes into and the
//! leaves it reads from. Element access is random-access by index; the data
//! slice accessors exist so kernels can run over contiguous memory.

use crate::{EvalError, Result, Scalar};

/// Row-major dense matrix.
///
/// Row `i` occupies `data[i*cols .. (i+1)*cols]`, so row slices are
/// contiguous and row-block partitions of the element buffer are disjoint.
#[derive(Debug, Clone, PartialEq)]
pub struct DenseMatrix<T> {
    rows: usize,
    cols: usize,
    data: Vec<T>,
}

impl<T: Scalar> DenseMatrix<T> {
    /// All-zero matrix.
    pub fn zeros(rows: usize, cols: usize) -> Self {
        DenseMatrix {
            rows,
            cols,
            data: vec![T::zero(); rows * cols],
        }
    }

    /// All-zero matrix with fallible allocation.
    ///
    /// Used by the evaluator for aliasing temporaries so an allocation
    /// failure surfaces as [`EvalError::AllocationFailure`] instead of
    /// aborting the process.
    pub fn try_zeros(rows: usize, cols: usize) -> Result<Self> {
        let len = rows
            .checked_mul(cols)
            .ok_or(EvalError::AllocationFailure)?;
        let mut data = Vec::new();
        data.try_reserve_exact(len)
            .map_err(|_| EvalError::AllocationFailure)?;
        data.resize(len, T::zero());
        Ok(DenseMatrix { rows, cols, data })
    }

    /// Build from a function of the index pair.
    pub fn from_fn(rows: usize, cols: usize, mut f: impl FnMut(usize, usize) -> T) -> Self {
        let mut data = Vec::with_capacity(rows * cols);
        for i in 0..rows {
            for j in 0..cols {
                data.push(f(i, j));
            }
        }
        DenseMatrix { rows, cols, data }
    }

    /// Build from a row-major element vector.
    ///
    /// Fails with a dimension mismatch when `data.len() != rows * cols`.
    pub fn from_vec(rows: usize, cols: usize, data: Vec<T>) -> Result<Self> {
        if data.len() != rows * cols {
            return Err(EvalError::TargetShapeMismatch {
                expected: (rows, cols),
                got: (data.len(), 1),
            });
        }
        Ok(DenseMatrix { rows, cols, data })
    }

    /// Identity matrix of order `n`.
    pub fn identity(n: usize) -> Self {
        let mut m = Self::zeros(n, n);
        for i in 0..n {
            m.data[i * n + i] = T::one();
        }
        m
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    /// Element at `(i, j)`.
    #[inline]
    pub fn get(&self, i: usize, j: usize) -> T {
        debug_assert!(i < self.rows && j < self.cols);
        self.data[i * self.cols + j]
    }

    #[inline]
    pub fn set(&mut self, i: usize, j: usize, v: T) {
        debug_assert!(i < self.rows && j < self.cols);
        self.data[i * self.cols + j] = v;
    }

    /// Contiguous slice of row `i`.
    #[inline]
    pub fn row(&self, i: usize) -> &[T] {
        &self.data[i * self.cols..(i + 1) * self.cols]
    }

    #[inline]
    pub fn row_mut(&mut self, i: usize) -> &mut [T] {
        &mut self.data[i * self.cols..(i + 1) * self.cols]
    }

    /// Full row-major element slice.
    #[inline]
    pub fn as_slice(&self) -> &[T] {
        &self.data
    }

    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [T] {
        &mut self.data
    }

    /// Overwrite every element with zero.
    pub fn fill_zero(&mut self) {
        self.data.fill(T::zero());
    }

    /// Address range of the element buffer, used for aliasing detection.
    pub(crate) fn data_range(&self) -> (usize, usize) {
        let start = self.data.as_ptr() as usize;
        (start, start + self.data.len() * std::mem::size_of::<T>())
    }
}

/// Contiguous dense vector.
#[derive(Debug, Clone, PartialEq)]
pub struct DenseVector<T> {
    data: Vec<T>,
}

impl<T: Scalar> DenseVector<T> {
    pub fn zeros(len: usize) -> Self {
        DenseVector {
            data: vec![T::zero(); len],
        }
    }

    /// All-zero vector with fallible allocation, for evaluator
    /// temporaries.
    pub fn try_zeros(len: usize) -> Result<Self> {
        let mut data = Vec::new();
        data.try_reserve_exact(len)
            .map_err(|_| EvalError::AllocationFailure)?;
        data.resize(len, T::zero());
        Ok(DenseVector { data })
    }

    pub fn from_fn(len: usize, mut f: impl FnMut(usize) -> T) -> Self {
        DenseVector {
            data: (0..len).map(&mut f).collect(),
        }
    }

    pub fn from_vec(data: Vec<T>) -> Self {
        DenseVector { data }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    #[inline]
    pub fn get(&self, i: usize) -> T {
        self.data[i]
    }

    #[inline]
    pub fn set(&mut self, i: usize, v: T) {
        self.data[i] = v;
    }

    #[inline]
    pub fn as_slice(&self) -> &[T] {
        &self.data
    }

    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [T] {
        &mut self.data
    }

    pub fn fill_zero(&mut self) {
        self.data.fill(T::zero());
    }

    pub(crate) fn data_range(&self) -> (usize, usize) {
        let start = self.data.as_ptr() as usize;
        (start, start + self.data.len() * std::mem::size_of::<T>())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_major_layout() {
        let m = DenseMatrix::from_fn(2, 3, |i, j| (i * 10 + j) as f64);
        assert_eq!(m.as_slice(), &[0.0, 1.0, 2.0, 10.0, 11.0, 12.0]);
        assert_eq!(m.get(1, 2), 12.0);
        assert_eq!(m.row(1), &[10.0, 11.0, 12.0]);
    }

    #[test]
    fn test_identity() {
        let m = DenseMatrix::<f64>::identity(3);
        for i in 0..3 {
            for j in 0..3 {
                assert_eq!(m.get(i, j), if i == j { 1.0 } else { 0.0 });
            }
        }
    }

    #[test]
    fn test_from_vec_shape_check() {
        assert!(DenseMatrix::from_vec(2, 2, vec![1.0, 2.0, 3.0]).is_err());
        let m = DenseMatrix::from_vec(2, 2, vec![1.0, 2.0, 3.0, 4.0]).unwrap();
        assert_eq!(m.get(1, 0), 3.0);
    }

    #[test]
    fn test_try_zeros() {
        let m = DenseMatrix::<f64>::try_zeros(4, 5).unwrap();
        assert_eq!(m.rows(), 4);
        assert_eq!(m.cols(), 5);
        assert!(m.as_slice().iter().all(|&x| x == 0.0));
    }

    #[test]
    fn test_vector_basics() {
        let mut v = DenseVector::from_fn(4, |i| i as f64);
        assert_eq!(v.len(), 4);
        assert_eq!(v.get(3), 3.0);
        v.set(0, 7.0);
        assert_eq!(v.as_slice(), &[7.0, 1.0, 2.0, 3.0]);
    }
}
