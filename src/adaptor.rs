//! Structured-matrix adaptors and the invariant guard on assignment.
//!
//! Each adaptor wraps dense storage and upholds one structural invariant
//! across every write. Assignment of an expression goes through the guard:
//! when the expression's combined tag already proves the required
//! structure, the write is the trusted fast path (the dispatcher visits
//! only the live index set); when the tag is `General`, the result is
//! materialized and every off-structure position is checked at runtime —
//! a violation fails with [`EvalError::InvalidStructure`] rather than
//! silently dropping data.
//!
//! Adaptors are also readable operands: [`expr`](DiagonalMatrix::expr)
//! exposes a leaf carrying the adaptor's tag, so structure propagates into
//! the expressions built on top.

use crate::dense::DenseMatrix;
use crate::eval::evaluate;
use crate::expr::MatExpr;
use crate::simd::SimdScalar;
use crate::structure::{implies, StructuralTag};
use crate::{EvalError, Result, Scalar};

macro_rules! common_adaptor_api {
    ($tag:expr) => {
        /// Order of the (square) matrix.
        pub fn order(&self) -> usize {
            self.inner.rows()
        }

        /// Element at `(i, j)`.
        pub fn get(&self, i: usize, j: usize) -> T {
            self.inner.get(i, j)
        }

        /// The underlying dense storage.
        pub fn as_dense(&self) -> &DenseMatrix<T> {
            &self.inner
        }

        /// A leaf operand carrying this adaptor's structural tag.
        pub fn expr(&self) -> MatExpr<'_, T> {
            MatExpr::dense_tagged(&self.inner, $tag)
        }
    };
}

// ---------------------------------------------------------------------------
// Diagonal
// ---------------------------------------------------------------------------

/// Square matrix whose off-diagonal elements are provably zero.
#[derive(Debug, Clone, PartialEq)]
pub struct DiagonalMatrix<T> {
    inner: DenseMatrix<T>,
}

impl<T: Scalar> DiagonalMatrix<T> {
    common_adaptor_api!(StructuralTag::Diagonal);

    /// Zero matrix of order `n`.
    pub fn new(n: usize) -> Self {
        DiagonalMatrix {
            inner: DenseMatrix::zeros(n, n),
        }
    }

    /// Diagonal matrix from its diagonal entries.
    pub fn from_diagonal(diag: &[T]) -> Self {
        let n = diag.len();
        let mut inner = DenseMatrix::zeros(n, n);
        for (i, &v) in diag.iter().enumerate() {
            inner.set(i, i, v);
        }
        DiagonalMatrix { inner }
    }

    /// Validate and adapt a dense square matrix.
    pub fn from_dense(m: DenseMatrix<T>) -> Result<Self> {
        if m.rows() != m.cols() {
            return Err(EvalError::NonSquare {
                rows: m.rows(),
                cols: m.cols(),
            });
        }
        check_off_diagonal_zero(&m)?;
        Ok(DiagonalMatrix { inner: m })
    }

    /// Write a diagonal entry.
    pub fn set_diagonal(&mut self, i: usize, v: T) {
        self.inner.set(i, i, v);
    }

    /// The diagonal entries.
    pub fn diagonal(&self) -> Vec<T> {
        (0..self.order()).map(|i| self.inner.get(i, i)).collect()
    }
}

impl<T: SimdScalar> DiagonalMatrix<T> {
    /// Assign an evaluated expression, enforcing diagonality.
    pub fn assign(&mut self, expr: &MatExpr<'_, T>) -> Result<()> {
        let n = self.order();
        if (expr.rows(), expr.cols()) != (n, n) {
            return Err(EvalError::TargetShapeMismatch {
                expected: (n, n),
                got: (expr.rows(), expr.cols()),
            });
        }
        if implies(expr.tag(), StructuralTag::Diagonal) {
            return evaluate(expr, &mut self.inner);
        }
        let mut tmp = DenseMatrix::try_zeros(n, n)?;
        evaluate(expr, &mut tmp)?;
        check_off_diagonal_zero(&tmp)?;
        self.inner = tmp;
        Ok(())
    }
}

fn check_off_diagonal_zero<T: Scalar>(m: &DenseMatrix<T>) -> Result<()> {
    for i in 0..m.rows() {
        for j in 0..m.cols() {
            if i != j && !m.get(i, j).is_zero() {
                return Err(EvalError::InvalidStructure {
                    row: i,
                    col: j,
                    required: StructuralTag::Diagonal,
                });
            }
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Triangular
// ---------------------------------------------------------------------------

/// Square matrix that is zero strictly above the diagonal.
#[derive(Debug, Clone, PartialEq)]
pub struct LowerTriangularMatrix<T> {
    inner: DenseMatrix<T>,
}

impl<T: Scalar> LowerTriangularMatrix<T> {
    common_adaptor_api!(StructuralTag::LowerTriangular);

    pub fn new(n: usize) -> Self {
        LowerTriangularMatrix {
            inner: DenseMatrix::zeros(n, n),
        }
    }

    /// Validate and adapt a dense square matrix.
    pub fn from_dense(m: DenseMatrix<T>) -> Result<Self> {
        if m.rows() != m.cols() {
            return Err(EvalError::NonSquare {
                rows: m.rows(),
                cols: m.cols(),
            });
        }
        check_triangle_zero(&m, true)?;
        Ok(LowerTriangularMatrix { inner: m })
    }

    /// Write an on-structure entry (`j <= i`).
    pub fn set(&mut self, i: usize, j: usize, v: T) -> Result<()> {
        if j > i {
            return Err(EvalError::InvalidStructure {
                row: i,
                col: j,
                required: StructuralTag::LowerTriangular,
            });
        }
        self.inner.set(i, j, v);
        Ok(())
    }
}

impl<T: SimdScalar> LowerTriangularMatrix<T> {
    /// Assign an evaluated expression, enforcing lower-triangularity.
    pub fn assign(&mut self, expr: &MatExpr<'_, T>) -> Result<()> {
        let n = self.order();
        if (expr.rows(), expr.cols()) != (n, n) {
            return Err(EvalError::TargetShapeMismatch {
                expected: (n, n),
                got: (expr.rows(), expr.cols()),
            });
        }
        if implies(expr.tag(), StructuralTag::LowerTriangular) {
            return evaluate(expr, &mut self.inner);
        }
        let mut tmp = DenseMatrix::try_zeros(n, n)?;
        evaluate(expr, &mut tmp)?;
        check_triangle_zero(&tmp, true)?;
        self.inner = tmp;
        Ok(())
    }
}

/// Square matrix that is zero strictly below the diagonal.
#[derive(Debug, Clone, PartialEq)]
pub struct UpperTriangularMatrix<T> {
    inner: DenseMatrix<T>,
}

impl<T: Scalar> UpperTriangularMatrix<T> {
    common_adaptor_api!(StructuralTag::UpperTriangular);

    pub fn new(n: usize) -> Self {
        UpperTriangularMatrix {
            inner: DenseMatrix::zeros(n, n),
        }
    }

    /// Validate and adapt a dense square matrix.
    pub fn from_dense(m: DenseMatrix<T>) -> Result<Self> {
        if m.rows() != m.cols() {
            return Err(EvalError::NonSquare {
                rows: m.rows(),
                cols: m.cols(),
            });
        }
        check_triangle_zero(&m, false)?;
        Ok(UpperTriangularMatrix { inner: m })
    }

    /// Write an on-structure entry (`j >= i`).
    pub fn set(&mut self, i: usize, j: usize, v: T) -> Result<()> {
        if j < i {
            return Err(EvalError::InvalidStructure {
                row: i,
                col: j,
                required: StructuralTag::UpperTriangular,
            });
        }
        self.inner.set(i, j, v);
        Ok(())
    }
}

impl<T: SimdScalar> UpperTriangularMatrix<T> {
    /// Assign an evaluated expression, enforcing upper-triangularity.
    pub fn assign(&mut self, expr: &MatExpr<'_, T>) -> Result<()> {
        let n = self.order();
        if (expr.rows(), expr.cols()) != (n, n) {
            return Err(EvalError::TargetShapeMismatch {
                expected: (n, n),
                got: (expr.rows(), expr.cols()),
            });
        }
        if implies(expr.tag(), StructuralTag::UpperTriangular) {
            return evaluate(expr, &mut self.inner);
        }
        let mut tmp = DenseMatrix::try_zeros(n, n)?;
        evaluate(expr, &mut tmp)?;
        check_triangle_zero(&tmp, false)?;
        self.inner = tmp;
        Ok(())
    }
}

fn check_triangle_zero<T: Scalar>(m: &DenseMatrix<T>, lower: bool) -> Result<()> {
    for i in 0..m.rows() {
        for j in 0..m.cols() {
            let off_structure = if lower { j > i } else { j < i };
            if off_structure && !m.get(i, j).is_zero() {
                return Err(EvalError::InvalidStructure {
                    row: i,
                    col: j,
                    required: if lower {
                        StructuralTag::LowerTriangular
                    } else {
                        StructuralTag::UpperTriangular
                    },
                });
            }
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Symmetric
// ---------------------------------------------------------------------------

/// Square matrix with `a[i][j] == a[j][i]` maintained across every write.
#[derive(Debug, Clone, PartialEq)]
pub struct SymmetricMatrix<T> {
    inner: DenseMatrix<T>,
}

impl<T: Scalar> SymmetricMatrix<T> {
    common_adaptor_api!(StructuralTag::Symmetric);

    pub fn new(n: usize) -> Self {
        SymmetricMatrix {
            inner: DenseMatrix::zeros(n, n),
        }
    }

    /// Validate and adapt a dense square matrix.
    pub fn from_dense(m: DenseMatrix<T>) -> Result<Self> {
        if m.rows() != m.cols() {
            return Err(EvalError::NonSquare {
                rows: m.rows(),
                cols: m.cols(),
            });
        }
        check_mirror_equal(&m)?;
        Ok(SymmetricMatrix { inner: m })
    }

    /// Write an entry and its mirror in one step.
    pub fn set(&mut self, i: usize, j: usize, v: T) {
        self.inner.set(i, j, v);
        self.inner.set(j, i, v);
    }
}

impl<T: SimdScalar> SymmetricMatrix<T> {
    /// Assign an evaluated expression, enforcing symmetry.
    pub fn assign(&mut self, expr: &MatExpr<'_, T>) -> Result<()> {
        let n = self.order();
        if (expr.rows(), expr.cols()) != (n, n) {
            return Err(EvalError::TargetShapeMismatch {
                expected: (n, n),
                got: (expr.rows(), expr.cols()),
            });
        }
        if implies(expr.tag(), StructuralTag::Symmetric) {
            return evaluate(expr, &mut self.inner);
        }
        let mut tmp = DenseMatrix::try_zeros(n, n)?;
        evaluate(expr, &mut tmp)?;
        check_mirror_equal(&tmp)?;
        self.inner = tmp;
        Ok(())
    }
}

fn check_mirror_equal<T: Scalar>(m: &DenseMatrix<T>) -> Result<()> {
    for i in 0..m.rows() {
        for j in (i + 1)..m.cols() {
            if m.get(i, j) != m.get(j, i) {
                return Err(EvalError::InvalidStructure {
                    row: i,
                    col: j,
                    required: StructuralTag::Symmetric,
                });
            }
        }
    }
    Ok(())
}
