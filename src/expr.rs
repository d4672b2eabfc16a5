//! Expression node types: lazy, non-owning expression graphs over matrix
//! and vector operands.
//!
//! A node references its operands (concrete containers or sub-expressions)
//! and never copies their data; every element access recomputes from the
//! operands until [`evaluate`](crate::evaluate) materializes the result.
//! Operand lifetimes are compile-time borrows — the graph cannot outlive
//! the containers it reads.
//!
//! Dimensions and the structural result tag are computed eagerly at
//! construction: an incompatible shape fails with
//! [`EvalError::DimensionMismatch`] before any element is read.

use crate::structure::{combine, transpose_tag, OpKind, StructuralTag};
use crate::{DenseMatrix, DenseVector, EvalError, Result, Scalar, SparseMatrix, SparseVector};

/// Storage category of an operand or expression result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageCategory {
    /// Random-access element storage.
    Dense,
    /// Iterator-over-nonzeros storage.
    Sparse,
    /// A single scalar participating in an expression.
    Scalar,
}

// ---------------------------------------------------------------------------
// Matrix expressions
// ---------------------------------------------------------------------------

/// Concrete matrix operand referenced by a leaf.
pub(crate) enum MatRef<'a, T> {
    Dense(&'a DenseMatrix<T>),
    Sparse(&'a SparseMatrix<T>),
    /// Virtual all-zero operand (no storage).
    Zero,
    /// Virtual identity operand (no storage).
    Identity,
}

impl<T> Clone for MatRef<'_, T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for MatRef<'_, T> {}

pub(crate) struct MatLeaf<'a, T> {
    pub(crate) mat: MatRef<'a, T>,
    pub(crate) transposed: bool,
}

impl<T: Scalar> MatLeaf<'_, T> {
    #[inline]
    pub(crate) fn at(&self, i: usize, j: usize) -> T {
        let (i, j) = if self.transposed { (j, i) } else { (i, j) };
        match self.mat {
            MatRef::Dense(m) => m.get(i, j),
            MatRef::Sparse(m) => m.get(i, j),
            MatRef::Zero => T::zero(),
            MatRef::Identity => {
                if i == j {
                    T::one()
                } else {
                    T::zero()
                }
            }
        }
    }
}

pub(crate) enum MatKind<'a, T> {
    Leaf(MatLeaf<'a, T>),
    /// Elementwise binary node: Add, Sub or Schur.
    Map2(OpKind, Box<MatExpr<'a, T>>, Box<MatExpr<'a, T>>),
    /// Matrix product node.
    Mult(Box<MatExpr<'a, T>>, Box<MatExpr<'a, T>>),
    /// Scalar multiplication node.
    Scale(T, Box<MatExpr<'a, T>>),
}

/// A lazily evaluated matrix expression.
///
/// Build leaves with [`MatExpr::dense`] / [`MatExpr::sparse`] (or from an
/// adaptor), compose with [`add`], [`sub`], [`mult`], [`schur`], [`scale`],
/// and materialize with [`evaluate`](crate::evaluate).
pub struct MatExpr<'a, T> {
    pub(crate) kind: MatKind<'a, T>,
    rows: usize,
    cols: usize,
    tag: StructuralTag,
}

impl<T> core::fmt::Debug for MatExpr<'_, T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("MatExpr")
            .field("rows", &self.rows)
            .field("cols", &self.cols)
            .field("tag", &self.tag)
            .finish()
    }
}

impl<'a, T: Scalar> MatExpr<'a, T> {
    /// Leaf over a dense matrix, tagged `General`.
    pub fn dense(m: &'a DenseMatrix<T>) -> Self {
        Self::dense_tagged(m, StructuralTag::General)
    }

    /// Leaf over a dense matrix with a caller-proven structural tag.
    ///
    /// Used by the structured adaptors, which uphold the tag's invariant
    /// on every write.
    pub(crate) fn dense_tagged(m: &'a DenseMatrix<T>, tag: StructuralTag) -> Self {
        MatExpr {
            rows: m.rows(),
            cols: m.cols(),
            tag,
            kind: MatKind::Leaf(MatLeaf {
                mat: MatRef::Dense(m),
                transposed: false,
            }),
        }
    }

    /// Leaf over a sparse matrix, tagged `General`.
    pub fn sparse(m: &'a SparseMatrix<T>) -> Self {
        MatExpr {
            rows: m.rows(),
            cols: m.cols(),
            tag: StructuralTag::General,
            kind: MatKind::Leaf(MatLeaf {
                mat: MatRef::Sparse(m),
                transposed: false,
            }),
        }
    }

    /// Virtual all-zero operand.
    pub fn zeros(rows: usize, cols: usize) -> Self {
        MatExpr {
            rows,
            cols,
            tag: StructuralTag::Zero,
            kind: MatKind::Leaf(MatLeaf {
                mat: MatRef::Zero,
                transposed: false,
            }),
        }
    }

    /// Virtual identity operand of order `n`.
    pub fn identity(n: usize) -> Self {
        MatExpr {
            rows: n,
            cols: n,
            tag: StructuralTag::Identity,
            kind: MatKind::Leaf(MatLeaf {
                mat: MatRef::Identity,
                transposed: false,
            }),
        }
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    /// Structural tag of the (not yet materialized) result.
    pub fn tag(&self) -> StructuralTag {
        self.tag
    }

    /// Storage category of the result.
    pub fn storage(&self) -> StorageCategory {
        match &self.kind {
            MatKind::Leaf(l) => match l.mat {
                MatRef::Dense(_) => StorageCategory::Dense,
                MatRef::Sparse(_) | MatRef::Zero | MatRef::Identity => StorageCategory::Sparse,
            },
            MatKind::Map2(_, a, b) | MatKind::Mult(a, b) => {
                if a.storage() == StorageCategory::Sparse && b.storage() == StorageCategory::Sparse
                {
                    StorageCategory::Sparse
                } else {
                    StorageCategory::Dense
                }
            }
            MatKind::Scale(_, e) => e.storage(),
        }
    }

    /// Element at `(i, j)`, recomputed from the operands.
    ///
    /// Sparse operands yield the additive identity at non-stored indices.
    pub fn at(&self, i: usize, j: usize) -> T {
        match &self.kind {
            MatKind::Leaf(l) => l.at(i, j),
            MatKind::Map2(op, a, b) => {
                let x = a.at(i, j);
                let y = b.at(i, j);
                match op {
                    OpKind::Add => x + y,
                    OpKind::Sub => x - y,
                    OpKind::Schur => x * y,
                    _ => unreachable!("Map2 holds an elementwise operator"),
                }
            }
            MatKind::Mult(a, b) => {
                let mut acc = T::zero();
                for k in 0..a.cols {
                    acc = acc + a.at(i, k) * b.at(k, j);
                }
                acc
            }
            MatKind::Scale(k, e) => *k * e.at(i, j),
        }
    }

    /// Transpose of the expression.
    ///
    /// Leaves become transposed views (no copy); composite nodes distribute:
    /// `(A ∘ B)ᵗ = Aᵗ ∘ Bᵗ` for elementwise operators and
    /// `(A·B)ᵗ = Bᵗ·Aᵗ` for products.
    pub fn transpose(self) -> Self {
        let tag = transpose_tag(self.tag);
        match self.kind {
            MatKind::Leaf(l) => MatExpr {
                rows: self.cols,
                cols: self.rows,
                tag,
                kind: MatKind::Leaf(MatLeaf {
                    mat: l.mat,
                    transposed: !l.transposed,
                }),
            },
            MatKind::Map2(op, a, b) => MatExpr {
                rows: self.cols,
                cols: self.rows,
                tag,
                kind: MatKind::Map2(op, Box::new(a.transpose()), Box::new(b.transpose())),
            },
            MatKind::Mult(a, b) => MatExpr {
                rows: self.cols,
                cols: self.rows,
                tag,
                kind: MatKind::Mult(Box::new(b.transpose()), Box::new(a.transpose())),
            },
            MatKind::Scale(k, e) => MatExpr {
                rows: self.cols,
                cols: self.rows,
                tag,
                kind: MatKind::Scale(k, Box::new(e.transpose())),
            },
        }
    }

    /// Whether the tree is built from elementwise operators only (no
    /// product nodes). Elementwise trees are index-local, so writing the
    /// target in place is safe even when it aliases an operand.
    pub(crate) fn is_elementwise_only(&self) -> bool {
        match &self.kind {
            MatKind::Leaf(_) => true,
            MatKind::Map2(_, a, b) => a.is_elementwise_only() && b.is_elementwise_only(),
            MatKind::Mult(_, _) => false,
            MatKind::Scale(_, e) => e.is_elementwise_only(),
        }
    }

    /// Whether any dense leaf overlaps the given byte range.
    pub(crate) fn aliases_range(&self, range: (usize, usize)) -> bool {
        match &self.kind {
            MatKind::Leaf(l) => match l.mat {
                MatRef::Dense(m) => ranges_overlap(m.data_range(), range),
                _ => false,
            },
            MatKind::Map2(_, a, b) | MatKind::Mult(a, b) => {
                a.aliases_range(range) || b.aliases_range(range)
            }
            MatKind::Scale(_, e) => e.aliases_range(range),
        }
    }
}

#[inline]
pub(crate) fn ranges_overlap(a: (usize, usize), b: (usize, usize)) -> bool {
    a.0 < b.1 && b.0 < a.1
}

fn map2<'a, T: Scalar>(
    op: OpKind,
    l: MatExpr<'a, T>,
    r: MatExpr<'a, T>,
) -> Result<MatExpr<'a, T>> {
    if l.rows != r.rows || l.cols != r.cols {
        return Err(EvalError::DimensionMismatch {
            op: op.name(),
            left: (l.rows, l.cols),
            right: (r.rows, r.cols),
        });
    }
    Ok(MatExpr {
        rows: l.rows,
        cols: l.cols,
        tag: combine(op, l.tag, r.tag),
        kind: MatKind::Map2(op, Box::new(l), Box::new(r)),
    })
}

/// `l + r`. Requires identical dimensions.
pub fn add<'a, T: Scalar>(l: MatExpr<'a, T>, r: MatExpr<'a, T>) -> Result<MatExpr<'a, T>> {
    map2(OpKind::Add, l, r)
}

/// `l - r`. Requires identical dimensions.
pub fn sub<'a, T: Scalar>(l: MatExpr<'a, T>, r: MatExpr<'a, T>) -> Result<MatExpr<'a, T>> {
    map2(OpKind::Sub, l, r)
}

/// Elementwise (Schur) product. Requires identical dimensions.
pub fn schur<'a, T: Scalar>(l: MatExpr<'a, T>, r: MatExpr<'a, T>) -> Result<MatExpr<'a, T>> {
    map2(OpKind::Schur, l, r)
}

/// Matrix product `l · r`. Requires `l.cols() == r.rows()`.
pub fn mult<'a, T: Scalar>(l: MatExpr<'a, T>, r: MatExpr<'a, T>) -> Result<MatExpr<'a, T>> {
    if l.cols != r.rows {
        return Err(EvalError::InnerDimensionMismatch {
            left: (l.rows, l.cols),
            right: (r.rows, r.cols),
        });
    }
    Ok(MatExpr {
        rows: l.rows,
        cols: r.cols,
        tag: combine(OpKind::Mult, l.tag, r.tag),
        kind: MatKind::Mult(Box::new(l), Box::new(r)),
    })
}

/// Scalar multiple `k · e`.
pub fn scale<'a, T: Scalar>(k: T, e: MatExpr<'a, T>) -> MatExpr<'a, T> {
    MatExpr {
        rows: e.rows,
        cols: e.cols,
        tag: combine(OpKind::ScalarMult, e.tag, e.tag),
        kind: MatKind::Scale(k, Box::new(e)),
    }
}

/// Negation `-e`, expressed as scaling by `0 - 1`.
pub fn neg<'a, T: Scalar>(e: MatExpr<'a, T>) -> MatExpr<'a, T> {
    scale(T::zero() - T::one(), e)
}

// ---------------------------------------------------------------------------
// Vector expressions
// ---------------------------------------------------------------------------

pub(crate) enum VecRef<'a, T> {
    Dense(&'a DenseVector<T>),
    Sparse(&'a SparseVector<T>),
}

pub(crate) enum VecKind<'a, T> {
    Leaf(VecRef<'a, T>),
    Map2(OpKind, Box<VecExpr<'a, T>>, Box<VecExpr<'a, T>>),
    Scale(T, Box<VecExpr<'a, T>>),
    /// Matrix × vector product.
    MatVec(Box<MatExpr<'a, T>>, Box<VecExpr<'a, T>>),
}

/// A lazily evaluated vector expression.
pub struct VecExpr<'a, T> {
    pub(crate) kind: VecKind<'a, T>,
    len: usize,
}

impl<T> core::fmt::Debug for VecExpr<'_, T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("VecExpr").field("len", &self.len).finish()
    }
}

impl<'a, T: Scalar> VecExpr<'a, T> {
    pub fn dense(v: &'a DenseVector<T>) -> Self {
        VecExpr {
            len: v.len(),
            kind: VecKind::Leaf(VecRef::Dense(v)),
        }
    }

    pub fn sparse(v: &'a SparseVector<T>) -> Self {
        VecExpr {
            len: v.len(),
            kind: VecKind::Leaf(VecRef::Sparse(v)),
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn storage(&self) -> StorageCategory {
        match &self.kind {
            VecKind::Leaf(VecRef::Dense(_)) => StorageCategory::Dense,
            VecKind::Leaf(VecRef::Sparse(_)) => StorageCategory::Sparse,
            VecKind::Map2(_, a, b) => {
                if a.storage() == StorageCategory::Sparse && b.storage() == StorageCategory::Sparse
                {
                    StorageCategory::Sparse
                } else {
                    StorageCategory::Dense
                }
            }
            VecKind::Scale(_, e) => e.storage(),
            VecKind::MatVec(_, _) => StorageCategory::Dense,
        }
    }

    /// Element at `i`, recomputed from the operands.
    pub fn at(&self, i: usize) -> T {
        match &self.kind {
            VecKind::Leaf(VecRef::Dense(v)) => v.get(i),
            VecKind::Leaf(VecRef::Sparse(v)) => v.get(i),
            VecKind::Map2(op, a, b) => {
                let x = a.at(i);
                let y = b.at(i);
                match op {
                    OpKind::Add => x + y,
                    OpKind::Sub => x - y,
                    OpKind::Schur => x * y,
                    _ => unreachable!("Map2 holds an elementwise operator"),
                }
            }
            VecKind::Scale(k, e) => *k * e.at(i),
            VecKind::MatVec(m, v) => {
                let mut acc = T::zero();
                for k in 0..m.cols() {
                    acc = acc + m.at(i, k) * v.at(k);
                }
                acc
            }
        }
    }

    pub(crate) fn is_elementwise_only(&self) -> bool {
        match &self.kind {
            VecKind::Leaf(_) => true,
            VecKind::Map2(_, a, b) => a.is_elementwise_only() && b.is_elementwise_only(),
            VecKind::Scale(_, e) => e.is_elementwise_only(),
            VecKind::MatVec(_, _) => false,
        }
    }

    pub(crate) fn aliases_range(&self, range: (usize, usize)) -> bool {
        match &self.kind {
            VecKind::Leaf(VecRef::Dense(v)) => ranges_overlap(v.data_range(), range),
            VecKind::Leaf(VecRef::Sparse(_)) => false,
            VecKind::Map2(_, a, b) => a.aliases_range(range) || b.aliases_range(range),
            VecKind::Scale(_, e) => e.aliases_range(range),
            VecKind::MatVec(_, v) => v.aliases_range(range),
        }
    }
}

fn vec_map2<'a, T: Scalar>(
    op: OpKind,
    l: VecExpr<'a, T>,
    r: VecExpr<'a, T>,
) -> Result<VecExpr<'a, T>> {
    if l.len != r.len {
        return Err(EvalError::DimensionMismatch {
            op: op.name(),
            left: (l.len, 1),
            right: (r.len, 1),
        });
    }
    Ok(VecExpr {
        len: l.len,
        kind: VecKind::Map2(op, Box::new(l), Box::new(r)),
    })
}

/// `l + r` for vectors of equal length.
pub fn vec_add<'a, T: Scalar>(l: VecExpr<'a, T>, r: VecExpr<'a, T>) -> Result<VecExpr<'a, T>> {
    vec_map2(OpKind::Add, l, r)
}

/// `l - r` for vectors of equal length.
pub fn vec_sub<'a, T: Scalar>(l: VecExpr<'a, T>, r: VecExpr<'a, T>) -> Result<VecExpr<'a, T>> {
    vec_map2(OpKind::Sub, l, r)
}

/// Elementwise product for vectors of equal length.
pub fn vec_schur<'a, T: Scalar>(l: VecExpr<'a, T>, r: VecExpr<'a, T>) -> Result<VecExpr<'a, T>> {
    vec_map2(OpKind::Schur, l, r)
}

/// Scalar multiple `k · e`.
pub fn vec_scale<'a, T: Scalar>(k: T, e: VecExpr<'a, T>) -> VecExpr<'a, T> {
    VecExpr {
        len: e.len,
        kind: VecKind::Scale(k, Box::new(e)),
    }
}

/// Matrix × vector product. Requires `m.cols() == v.len()`.
pub fn mat_vec<'a, T: Scalar>(m: MatExpr<'a, T>, v: VecExpr<'a, T>) -> Result<VecExpr<'a, T>> {
    if m.cols() != v.len {
        return Err(EvalError::InnerDimensionMismatch {
            left: (m.rows(), m.cols()),
            right: (v.len, 1),
        });
    }
    Ok(VecExpr {
        len: m.rows(),
        kind: VecKind::MatVec(Box::new(m), Box::new(v)),
    })
}
