//! Lazy expression evaluation engine for dense and sparse linear algebra.
//!
//! Chained arithmetic on vectors and matrices builds a lazily evaluated
//! expression graph; [`evaluate`] materializes the whole chain into a
//! target container in one dispatch, choosing among scalar, SIMD, and
//! row-block parallel kernels per operand storage and problem size.
//!
//! # Core pieces
//!
//! - [`DenseMatrix`] / [`DenseVector`]: row-major random-access storage
//! - [`SparseMatrix`] / [`SparseVector`]: CSR / sorted-coordinate storage
//!   with a sorted nonzero-iteration contract
//! - [`MatExpr`] / [`VecExpr`]: lazy expression nodes built with [`add`],
//!   [`sub`], [`mult`], [`schur`], [`scale`] (and the `vec_*` variants)
//! - [`StructuralTag`] and [`combine`]: type-level structure propagation
//!   (diagonal, triangular, symmetric, ...) with a conservative
//!   combination table
//! - [`DiagonalMatrix`], [`LowerTriangularMatrix`], [`UpperTriangularMatrix`],
//!   [`SymmetricMatrix`]: adaptors whose assignments enforce their
//!   invariant — trusted when the tag proves it, runtime-checked otherwise
//! - [`SimdScalar`]: the SIMD layer, with a width-1 scalar fallback for
//!   element types without vector support
//! - [`EvalConfig`] / [`init_config`]: process-wide worker pool size,
//!   parallel threshold, and block shape
//!
//! # Example
//!
//! ```rust
//! use matexpr::{add, evaluate, mult, DenseMatrix, MatExpr};
//!
//! let a = DenseMatrix::from_fn(2, 2, |i, j| (i * 2 + j) as f64);
//! let b = DenseMatrix::identity(2);
//! let c = DenseMatrix::from_fn(2, 2, |_, _| 1.0);
//!
//! // A*B + C, fused into one evaluation pass.
//! let expr = add(mult(MatExpr::dense(&a), MatExpr::dense(&b)).unwrap(),
//!                MatExpr::dense(&c)).unwrap();
//! let mut out = DenseMatrix::zeros(2, 2);
//! evaluate(&expr, &mut out).unwrap();
//! assert_eq!(out.get(1, 0), a.get(1, 0) + 1.0);
//! ```
//!
//! # Structure propagation
//!
//! ```rust
//! use matexpr::{combine, OpKind, StructuralTag};
//!
//! // The product of two diagonal matrices is provably diagonal...
//! assert_eq!(
//!     combine(OpKind::Mult, StructuralTag::Diagonal, StructuralTag::Diagonal),
//!     StructuralTag::Diagonal,
//! );
//! // ...but symmetry does not survive a general product.
//! assert_eq!(
//!     combine(OpKind::Mult, StructuralTag::Symmetric, StructuralTag::Symmetric),
//!     StructuralTag::General,
//! );
//! ```

mod adaptor;
mod config;
mod dense;
mod eval;
mod expr;
mod kernel;
mod parallel;
mod simd;
mod sparse;
mod sparse_kernel;
mod structure;
mod traits;

// ============================================================================
// Containers
// ============================================================================
pub use dense::{DenseMatrix, DenseVector};
pub use sparse::{SparseMatrix, SparseVector};

// ============================================================================
// Structured adaptors
// ============================================================================
pub use adaptor::{
    DiagonalMatrix, LowerTriangularMatrix, SymmetricMatrix, UpperTriangularMatrix,
};

// ============================================================================
// Expression construction
// ============================================================================
pub use expr::{
    add, mat_vec, mult, neg, scale, schur, sub, vec_add, vec_scale, vec_schur, vec_sub, MatExpr,
    StorageCategory, VecExpr,
};

// ============================================================================
// Evaluation entry points
// ============================================================================
pub use eval::{
    add_assign, dot, evaluate, evaluate_sparse, evaluate_vec, evaluate_vec_sparse,
    evaluate_vec_with_config, evaluate_with_config, mult_assign, scale_assign, schur_assign,
    sub_assign,
};

// ============================================================================
// Structural tag system
// ============================================================================
pub use structure::{combine, implies, transpose_tag, OpKind, StructuralTag};

// ============================================================================
// SIMD layer
// ============================================================================
pub use simd::{batch_lgamma, batch_ln, batch_log10, batch_powf, batch_shl, lgamma, SimdScalar};

// ============================================================================
// Configuration
// ============================================================================
pub use config::{config, init_config, BlockShape, EvalConfig, MIN_PARALLEL_LENGTH};

// ============================================================================
// Scalar bounds
// ============================================================================
pub use traits::Scalar;

// ============================================================================
// Error types
// ============================================================================

/// Errors that can occur while building or evaluating expressions.
#[derive(Debug, thiserror::Error)]
pub enum EvalError {
    /// Elementwise operator over operands of different shapes.
    #[error("dimension mismatch in {op}: {}x{} vs {}x{}", left.0, left.1, right.0, right.1)]
    DimensionMismatch {
        op: &'static str,
        left: (usize, usize),
        right: (usize, usize),
    },

    /// Product operands whose inner dimensions do not contract.
    #[error("inner dimension mismatch: {}x{} * {}x{}", left.0, left.1, right.0, right.1)]
    InnerDimensionMismatch {
        left: (usize, usize),
        right: (usize, usize),
    },

    /// Target container shape differs from the expression's shape.
    #[error("target shape mismatch: expected {}x{}, got {}x{}", expected.0, expected.1, got.0, got.1)]
    TargetShapeMismatch {
        expected: (usize, usize),
        got: (usize, usize),
    },

    /// A runtime structural check found an off-structure value.
    #[error("invalid structure: element at ({row}, {col}) violates {required:?}")]
    InvalidStructure {
        row: usize,
        col: usize,
        required: StructuralTag,
    },

    /// A temporary or block-local allocation could not be satisfied.
    #[error("allocation failure for evaluation temporary")]
    AllocationFailure,

    /// A square matrix was required.
    #[error("non-square matrix: rows={rows}, cols={cols}")]
    NonSquare { rows: usize, cols: usize },

    /// Sparse input violating the sorted-nonzero contract.
    #[error("invalid sparse input: {what}")]
    InvalidSparse { what: &'static str },

    /// Configuration misuse.
    #[error("configuration error: {0}")]
    Config(&'static str),
}

/// Result type for expression construction and evaluation.
pub type Result<T> = std::result::Result<T, EvalError>;
