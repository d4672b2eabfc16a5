//! Kernel dispatcher: the single entry point for materializing an
//! expression into a concrete container.
//!
//! Dispatch order per evaluation:
//! 1. aliasing check — a target sharing storage with an operand under a
//!    product node evaluates through a temporary; pure elementwise trees
//!    are index-local and run in place,
//! 2. storage-category dispatch (dense/dense, dense/sparse, sparse/dense,
//!    sparse/sparse kernel families),
//! 3. SIMD eligibility — contiguous dense slices with a vector-capable
//!    element type take the SIMD loop, everything else the scalar loop
//!    through the same call sites,
//! 4. size threshold — large targets are split into disjoint row blocks on
//!    the worker pool,
//! 5. structural restriction — a structured result tag visits only the
//!    structurally live index set.
//!
//! Failures (`DimensionMismatch` from construction, `AllocationFailure`
//! for temporaries) surface to the caller; nothing is retried or ignored.

use crate::config::{config, trace_enabled, EvalConfig};
use crate::dense::{DenseMatrix, DenseVector};
use crate::expr::{MatExpr, MatKind, MatRef, StorageCategory, VecExpr, VecKind, VecRef};
use crate::kernel::{
    dense_sp_mult_block, dot_slices, ew_assign_slices, ew_slices, matmul_block,
    scale_assign_slice, scatter_sparse_block, sp_dense_mult_block, DenseOperand,
};
use crate::parallel::run_row_blocks;
use crate::simd::SimdScalar;
use crate::sparse::{SparseMatrix, SparseVector};
use crate::sparse_kernel::{
    csr_combine, csr_identity, csr_mult, csr_scale, csr_transpose, sv_combine, sv_scale,
};
use crate::structure::{OpKind, StructuralTag};
use crate::{EvalError, Result};

// ---------------------------------------------------------------------------
// Public entry points — matrix targets
// ---------------------------------------------------------------------------

/// Materialize `expr` into `target` under the process-wide configuration.
pub fn evaluate<T: SimdScalar>(expr: &MatExpr<'_, T>, target: &mut DenseMatrix<T>) -> Result<()> {
    evaluate_with_config(expr, target, config())
}

/// Materialize `expr` into `target` under an explicit configuration.
///
/// The worker pool itself is process-wide; `cfg` controls dispatch only
/// (threshold, block shape, and whether parallel dispatch is considered).
pub fn evaluate_with_config<T: SimdScalar>(
    expr: &MatExpr<'_, T>,
    target: &mut DenseMatrix<T>,
    cfg: &EvalConfig,
) -> Result<()> {
    if (expr.rows(), expr.cols()) != (target.rows(), target.cols()) {
        return Err(EvalError::TargetShapeMismatch {
            expected: (expr.rows(), expr.cols()),
            got: (target.rows(), target.cols()),
        });
    }
    // Aliasing: an operand sharing storage with the target is only safe in
    // place for index-local (elementwise) trees; anything with a product
    // node streams through a temporary.
    if expr.aliases_range(target.data_range()) && !expr.is_elementwise_only() {
        if trace_enabled() {
            eprintln!("matexpr: aliasing temporary for product evaluation");
        }
        let mut tmp = DenseMatrix::try_zeros(target.rows(), target.cols())?;
        eval_root(expr, &mut tmp, cfg)?;
        target.as_mut_slice().copy_from_slice(tmp.as_slice());
        return Ok(());
    }
    eval_root(expr, target, cfg)
}

/// `target = target + expr` (in place; elementwise updates are index-local
/// and need no temporary).
pub fn add_assign<T: SimdScalar>(target: &mut DenseMatrix<T>, expr: &MatExpr<'_, T>) -> Result<()> {
    combine_assign_checked(OpKind::Add, target, expr, config())
}

/// `target = target - expr`.
pub fn sub_assign<T: SimdScalar>(target: &mut DenseMatrix<T>, expr: &MatExpr<'_, T>) -> Result<()> {
    combine_assign_checked(OpKind::Sub, target, expr, config())
}

/// `target = target ⊙ expr` (elementwise product in place).
pub fn schur_assign<T: SimdScalar>(
    target: &mut DenseMatrix<T>,
    expr: &MatExpr<'_, T>,
) -> Result<()> {
    combine_assign_checked(OpKind::Schur, target, expr, config())
}

/// `target = k * target`.
pub fn scale_assign<T: SimdScalar>(target: &mut DenseMatrix<T>, k: T) {
    scale_assign_slice(target.as_mut_slice(), k);
}

/// `target = target * rhs` — the in-place product.
///
/// A general product cannot stream into its own left operand, so this is
/// the dispatcher's temporary path: evaluate into a fresh allocation, then
/// move the result over the target. Requires `rhs` square of order
/// `target.cols()`.
pub fn mult_assign<T: SimdScalar>(
    target: &mut DenseMatrix<T>,
    rhs: &DenseMatrix<T>,
) -> Result<()> {
    if target.cols() != rhs.rows() {
        return Err(EvalError::InnerDimensionMismatch {
            left: (target.rows(), target.cols()),
            right: (rhs.rows(), rhs.cols()),
        });
    }
    if rhs.rows() != rhs.cols() {
        return Err(EvalError::TargetShapeMismatch {
            expected: (target.rows(), rhs.cols()),
            got: (target.rows(), target.cols()),
        });
    }
    if trace_enabled() {
        eprintln!("matexpr: aliasing temporary for in-place product");
    }
    let cfg = config();
    let mut tmp = DenseMatrix::try_zeros(target.rows(), rhs.cols())?;
    {
        let a = DenseOperand::new(&*target);
        let b = DenseOperand::new(rhs);
        let (rows, cols) = (tmp.rows(), tmp.cols());
        run_row_blocks(tmp.as_mut_slice(), rows, cols, cfg, &|r0, block| {
            matmul_block(block, r0, cols, &a, &b);
            Ok(())
        })?;
    }
    target.as_mut_slice().copy_from_slice(tmp.as_slice());
    Ok(())
}

/// Materialize a sparse-combinable expression into a sparse target.
///
/// Dense sub-results are compressed (exact zeros dropped); sparse
/// arithmetic keeps cancellation-produced explicit zeros.
pub fn evaluate_sparse<T: SimdScalar>(
    expr: &MatExpr<'_, T>,
    target: &mut SparseMatrix<T>,
) -> Result<()> {
    if (expr.rows(), expr.cols()) != (target.rows(), target.cols()) {
        return Err(EvalError::TargetShapeMismatch {
            expected: (expr.rows(), expr.cols()),
            got: (target.rows(), target.cols()),
        });
    }
    *target = eval_sparse_mat(expr)?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Public entry points — vector targets
// ---------------------------------------------------------------------------

/// Materialize a vector expression into a dense vector.
pub fn evaluate_vec<T: SimdScalar>(
    expr: &VecExpr<'_, T>,
    target: &mut DenseVector<T>,
) -> Result<()> {
    evaluate_vec_with_config(expr, target, config())
}

/// Materialize a vector expression under an explicit configuration.
pub fn evaluate_vec_with_config<T: SimdScalar>(
    expr: &VecExpr<'_, T>,
    target: &mut DenseVector<T>,
    cfg: &EvalConfig,
) -> Result<()> {
    if expr.len() != target.len() {
        return Err(EvalError::TargetShapeMismatch {
            expected: (expr.len(), 1),
            got: (target.len(), 1),
        });
    }
    if expr.aliases_range(target.data_range()) && !expr.is_elementwise_only() {
        let mut tmp = DenseVector::try_zeros(target.len())?;
        eval_vec_root(expr, &mut tmp, cfg)?;
        target.as_mut_slice().copy_from_slice(tmp.as_slice());
        return Ok(());
    }
    eval_vec_root(expr, target, cfg)
}

/// Materialize a vector expression into a sparse vector.
pub fn evaluate_vec_sparse<T: SimdScalar>(
    expr: &VecExpr<'_, T>,
    target: &mut SparseVector<T>,
) -> Result<()> {
    if expr.len() != target.len() {
        return Err(EvalError::TargetShapeMismatch {
            expected: (expr.len(), 1),
            got: (target.len(), 1),
        });
    }
    *target = eval_sparse_vec(expr, config())?;
    Ok(())
}

/// Inner product of two vector expressions.
pub fn dot<T: SimdScalar>(a: &VecExpr<'_, T>, b: &VecExpr<'_, T>) -> Result<T> {
    if a.len() != b.len() {
        return Err(EvalError::DimensionMismatch {
            op: "dot",
            left: (a.len(), 1),
            right: (b.len(), 1),
        });
    }
    match (&a.kind, &b.kind) {
        (VecKind::Leaf(VecRef::Dense(x)), VecKind::Leaf(VecRef::Dense(y))) => {
            Ok(dot_slices(x.as_slice(), y.as_slice()))
        }
        (VecKind::Leaf(VecRef::Sparse(x)), VecKind::Leaf(VecRef::Sparse(y))) => {
            let mut acc = T::zero();
            let (mut p, mut q) = (0usize, 0usize);
            let (xi, yi) = (x.indices(), y.indices());
            while p < xi.len() && q < yi.len() {
                match xi[p].cmp(&yi[q]) {
                    std::cmp::Ordering::Less => p += 1,
                    std::cmp::Ordering::Greater => q += 1,
                    std::cmp::Ordering::Equal => {
                        acc = acc + x.values()[p] * y.values()[q];
                        p += 1;
                        q += 1;
                    }
                }
            }
            Ok(acc)
        }
        (VecKind::Leaf(VecRef::Sparse(x)), _) => {
            let mut acc = T::zero();
            for (i, v) in x.iter() {
                acc = acc + v * b.at(i);
            }
            Ok(acc)
        }
        (_, VecKind::Leaf(VecRef::Sparse(y))) => {
            let mut acc = T::zero();
            for (i, v) in y.iter() {
                acc = acc + a.at(i) * v;
            }
            Ok(acc)
        }
        _ => {
            let mut acc = T::zero();
            for i in 0..a.len() {
                acc = acc + a.at(i) * b.at(i);
            }
            Ok(acc)
        }
    }
}

// ---------------------------------------------------------------------------
// Matrix evaluation core
// ---------------------------------------------------------------------------

/// Evaluate with structural restriction: a structured result tag visits
/// only its live index set; everything else takes the full dispatch.
pub(crate) fn eval_root<T: SimdScalar>(
    expr: &MatExpr<'_, T>,
    target: &mut DenseMatrix<T>,
    cfg: &EvalConfig,
) -> Result<()> {
    match expr.tag() {
        StructuralTag::Zero => {
            target.fill_zero();
            Ok(())
        }
        StructuralTag::Diagonal | StructuralTag::Identity => {
            target.fill_zero();
            let n = target.rows().min(target.cols());
            for i in 0..n {
                target.set(i, i, expr.at(i, i));
            }
            Ok(())
        }
        StructuralTag::LowerTriangular => fill_triangle(expr, target, cfg, true),
        StructuralTag::UpperTriangular => fill_triangle(expr, target, cfg, false),
        _ => dispatch_full(expr, target, cfg),
    }
}

/// Zero fill plus elementwise fill of one triangle.
fn fill_triangle<T: SimdScalar>(
    expr: &MatExpr<'_, T>,
    target: &mut DenseMatrix<T>,
    cfg: &EvalConfig,
    lower: bool,
) -> Result<()> {
    let (rows, cols) = (target.rows(), target.cols());
    run_row_blocks(target.as_mut_slice(), rows, cols, cfg, &|r0, block| {
        let rows_here = block.len() / cols.max(1);
        for local in 0..rows_here {
            let i = r0 + local;
            let row = &mut block[local * cols..(local + 1) * cols];
            let (lo, hi) = if lower {
                (0, (i + 1).min(cols))
            } else {
                (i.min(cols), cols)
            };
            row[..lo].fill(T::zero());
            row[hi..].fill(T::zero());
            for (j, r) in row[lo..hi].iter_mut().enumerate() {
                *r = expr.at(i, lo + j);
            }
        }
        Ok(())
    })
}

/// Full (unrestricted) dispatch over the node kind.
fn dispatch_full<T: SimdScalar>(
    expr: &MatExpr<'_, T>,
    target: &mut DenseMatrix<T>,
    cfg: &EvalConfig,
) -> Result<()> {
    match &expr.kind {
        MatKind::Leaf(l) => copy_leaf(l.mat, l.transposed, target, cfg),
        MatKind::Scale(k, e) => {
            eval_root(e, target, cfg)?;
            let (rows, cols) = (target.rows(), target.cols());
            let k = *k;
            run_row_blocks(target.as_mut_slice(), rows, cols, cfg, &|_r0, block| {
                scale_assign_slice(block, k);
                Ok(())
            })
        }
        MatKind::Map2(op, a, b) => eval_map2(*op, a, b, target, cfg),
        MatKind::Mult(a, b) => eval_mult(a, b, target, cfg),
    }
}

fn copy_leaf<T: SimdScalar>(
    mat: MatRef<'_, T>,
    transposed: bool,
    target: &mut DenseMatrix<T>,
    cfg: &EvalConfig,
) -> Result<()> {
    let (rows, cols) = (target.rows(), target.cols());
    match mat {
        MatRef::Dense(m) => {
            if !transposed {
                target.as_mut_slice().copy_from_slice(m.as_slice());
                Ok(())
            } else {
                run_row_blocks(target.as_mut_slice(), rows, cols, cfg, &|r0, block| {
                    let rows_here = block.len() / cols.max(1);
                    for local in 0..rows_here {
                        let i = r0 + local;
                        for (j, d) in block[local * cols..(local + 1) * cols]
                            .iter_mut()
                            .enumerate()
                        {
                            *d = m.get(j, i);
                        }
                    }
                    Ok(())
                })
            }
        }
        MatRef::Sparse(s) => run_row_blocks(target.as_mut_slice(), rows, cols, cfg, &|r0, block| {
            scatter_sparse_block(block, r0, cols, s, transposed);
            Ok(())
        }),
        MatRef::Zero => {
            target.fill_zero();
            Ok(())
        }
        MatRef::Identity => {
            target.fill_zero();
            for i in 0..rows.min(cols) {
                target.set(i, i, T::one());
            }
            Ok(())
        }
    }
}

fn eval_map2<T: SimdScalar>(
    op: OpKind,
    a: &MatExpr<'_, T>,
    b: &MatExpr<'_, T>,
    target: &mut DenseMatrix<T>,
    cfg: &EvalConfig,
) -> Result<()> {
    let (rows, cols) = (target.rows(), target.cols());

    // SIMD-eligible fast path: both operands are contiguous dense leaves.
    if let (Some(a_s), Some(b_s)) = (contiguous_slice(a), contiguous_slice(b)) {
        return run_row_blocks(target.as_mut_slice(), rows, cols, cfg, &|r0, block| {
            let start = r0 * cols;
            ew_slices(op, block, &a_s[start..start + block.len()], &b_s[start..start + block.len()]);
            Ok(())
        });
    }

    // General: evaluate the left side into the target, then fold the right
    // side in with the in-place kernels.
    eval_root(a, target, cfg)?;
    combine_assign(op, target, b, cfg)
}

/// The contiguous row-major slice of an untransposed dense leaf.
fn contiguous_slice<'e, T: SimdScalar>(e: &'e MatExpr<'_, T>) -> Option<&'e [T]> {
    match &e.kind {
        MatKind::Leaf(l) if !l.transposed => match l.mat {
            MatRef::Dense(m) => Some(m.as_slice()),
            _ => None,
        },
        _ => None,
    }
}

fn combine_assign_checked<T: SimdScalar>(
    op: OpKind,
    target: &mut DenseMatrix<T>,
    expr: &MatExpr<'_, T>,
    cfg: &EvalConfig,
) -> Result<()> {
    if (expr.rows(), expr.cols()) != (target.rows(), target.cols()) {
        return Err(EvalError::DimensionMismatch {
            op: op.name(),
            left: (target.rows(), target.cols()),
            right: (expr.rows(), expr.cols()),
        });
    }
    combine_assign(op, target, expr, cfg)
}

/// `target = target <op> b`, dispatching on b's storage.
fn combine_assign<T: SimdScalar>(
    op: OpKind,
    target: &mut DenseMatrix<T>,
    b: &MatExpr<'_, T>,
    cfg: &EvalConfig,
) -> Result<()> {
    let (rows, cols) = (target.rows(), target.cols());
    match &b.kind {
        MatKind::Leaf(l) => match (l.mat, l.transposed) {
            (MatRef::Dense(m), false) => {
                let b_s = m.as_slice();
                run_row_blocks(target.as_mut_slice(), rows, cols, cfg, &|r0, block| {
                    let start = r0 * cols;
                    ew_assign_slices(op, block, &b_s[start..start + block.len()]);
                    Ok(())
                })
            }
            (MatRef::Sparse(s), false) => match op {
                OpKind::Add | OpKind::Sub => {
                    for (i, j, v) in s.iter() {
                        let cur = target.get(i, j);
                        let new = if op == OpKind::Add { cur + v } else { cur - v };
                        target.set(i, j, new);
                    }
                    Ok(())
                }
                OpKind::Schur => {
                    // Stored columns multiply; the gaps between them zero,
                    // walking each row once.
                    for i in 0..rows {
                        let (bc, bv) = s.row_entries(i);
                        let row = target.row_mut(i);
                        let mut p = 0usize;
                        for (j, r) in row.iter_mut().enumerate() {
                            if p < bc.len() && bc[p] == j {
                                *r = *r * bv[p];
                                p += 1;
                            } else {
                                *r = T::zero();
                            }
                        }
                    }
                    Ok(())
                }
                _ => unreachable!("combine_assign handles elementwise operators"),
            },
            (MatRef::Zero, _) => match op {
                OpKind::Add | OpKind::Sub => Ok(()),
                OpKind::Schur => {
                    target.fill_zero();
                    Ok(())
                }
                _ => unreachable!("combine_assign handles elementwise operators"),
            },
            _ => {
                // Transposed leaves and the virtual identity: index-local
                // scalar loop through the expression's element reads.
                run_row_blocks(target.as_mut_slice(), rows, cols, cfg, &|r0, block| {
                    let rows_here = block.len() / cols.max(1);
                    for local in 0..rows_here {
                        let i = r0 + local;
                        for (j, d) in block[local * cols..(local + 1) * cols]
                            .iter_mut()
                            .enumerate()
                        {
                            let v = b.at(i, j);
                            *d = match op {
                                OpKind::Add => *d + v,
                                OpKind::Sub => *d - v,
                                OpKind::Schur => *d * v,
                                _ => unreachable!(),
                            };
                        }
                    }
                    Ok(())
                })
            }
        },
        _ => {
            // Composite right side: materialize through a temporary, then
            // fold in with the slice kernels. The temporary is scoped to
            // this call and released on every exit path.
            let mut tmp = DenseMatrix::try_zeros(rows, cols)?;
            eval_root(b, &mut tmp, cfg)?;
            let b_s = tmp.as_slice();
            run_row_blocks(target.as_mut_slice(), rows, cols, cfg, &|r0, block| {
                let start = r0 * cols;
                ew_assign_slices(op, block, &b_s[start..start + block.len()]);
                Ok(())
            })
        }
    }
}

/// A product operand materialized for the kernel family dispatch.
enum Conc<'x, T> {
    Dense(DenseOperand<'x, T>),
    Sparse(&'x SparseMatrix<T>, bool),
}

fn concretize<'x, T: SimdScalar>(
    e: &'x MatExpr<'_, T>,
    dense_slot: &'x mut Option<DenseMatrix<T>>,
    sparse_slot: &'x mut Option<SparseMatrix<T>>,
    cfg: &EvalConfig,
) -> Result<Conc<'x, T>> {
    match &e.kind {
        MatKind::Leaf(l) => match l.mat {
            MatRef::Dense(m) => Ok(Conc::Dense(DenseOperand {
                m,
                transposed: l.transposed,
            })),
            MatRef::Sparse(s) => Ok(Conc::Sparse(s, l.transposed)),
            MatRef::Zero => {
                *sparse_slot = Some(SparseMatrix::new(e.rows(), e.cols()));
                Ok(Conc::Sparse(sparse_slot.as_ref().unwrap(), false))
            }
            MatRef::Identity => {
                *sparse_slot = Some(csr_identity(e.rows()));
                Ok(Conc::Sparse(sparse_slot.as_ref().unwrap(), false))
            }
        },
        _ if e.storage() == StorageCategory::Sparse => {
            *sparse_slot = Some(eval_sparse_mat(e)?);
            Ok(Conc::Sparse(sparse_slot.as_ref().unwrap(), false))
        }
        _ => {
            let mut t = DenseMatrix::try_zeros(e.rows(), e.cols())?;
            eval_root(e, &mut t, cfg)?;
            *dense_slot = Some(t);
            Ok(Conc::Dense(DenseOperand::new(dense_slot.as_ref().unwrap())))
        }
    }
}

fn is_identity_leaf<T: SimdScalar>(e: &MatExpr<'_, T>) -> bool {
    matches!(&e.kind, MatKind::Leaf(l) if matches!(l.mat, MatRef::Identity))
}

fn eval_mult<T: SimdScalar>(
    a: &MatExpr<'_, T>,
    b: &MatExpr<'_, T>,
    target: &mut DenseMatrix<T>,
    cfg: &EvalConfig,
) -> Result<()> {
    // Identity operands fold into a plain evaluation of the other side.
    if is_identity_leaf(a) {
        return eval_root(b, target, cfg);
    }
    if is_identity_leaf(b) {
        return eval_root(a, target, cfg);
    }

    let (rows, cols) = (target.rows(), target.cols());
    let mut a_dense = None;
    let mut a_sparse = None;
    let mut b_dense = None;
    let mut b_sparse = None;
    let ca = concretize(a, &mut a_dense, &mut a_sparse, cfg)?;
    let cb = concretize(b, &mut b_dense, &mut b_sparse, cfg)?;

    match (ca, cb) {
        (Conc::Dense(ao), Conc::Dense(bo)) => {
            if trace_enabled() {
                eprintln!("matexpr: dense-dense product {}x{}", rows, cols);
            }
            run_row_blocks(target.as_mut_slice(), rows, cols, cfg, &|r0, block| {
                matmul_block(block, r0, cols, &ao, &bo);
                Ok(())
            })
        }
        (Conc::Sparse(s, transposed), Conc::Dense(bo)) => {
            let at;
            let a_csr = if transposed {
                at = csr_transpose(s);
                &at
            } else {
                s
            };
            run_row_blocks(target.as_mut_slice(), rows, cols, cfg, &|r0, block| {
                sp_dense_mult_block(block, r0, cols, a_csr, &bo);
                Ok(())
            })
        }
        (Conc::Dense(ao), Conc::Sparse(s, transposed)) => {
            let bt;
            let b_csr = if transposed {
                bt = csr_transpose(s);
                &bt
            } else {
                s
            };
            run_row_blocks(target.as_mut_slice(), rows, cols, cfg, &|r0, block| {
                dense_sp_mult_block(block, r0, cols, &ao, b_csr);
                Ok(())
            })
        }
        (Conc::Sparse(sa, ta), Conc::Sparse(sb, tb)) => {
            let at;
            let a_csr = if ta {
                at = csr_transpose(sa);
                &at
            } else {
                sa
            };
            let bt;
            let b_csr = if tb {
                bt = csr_transpose(sb);
                &bt
            } else {
                sb
            };
            let c = csr_mult(a_csr, b_csr);
            run_row_blocks(target.as_mut_slice(), rows, cols, cfg, &|r0, block| {
                scatter_sparse_block(block, r0, cols, &c, false);
                Ok(())
            })
        }
    }
}

// ---------------------------------------------------------------------------
// Sparse materialization
// ---------------------------------------------------------------------------

pub(crate) fn eval_sparse_mat<T: SimdScalar>(e: &MatExpr<'_, T>) -> Result<SparseMatrix<T>> {
    match &e.kind {
        MatKind::Leaf(l) => match l.mat {
            MatRef::Sparse(s) => Ok(if l.transposed {
                csr_transpose(s)
            } else {
                s.clone()
            }),
            MatRef::Dense(m) => {
                let compressed = SparseMatrix::from_dense(m);
                Ok(if l.transposed {
                    csr_transpose(&compressed)
                } else {
                    compressed
                })
            }
            MatRef::Zero => Ok(SparseMatrix::new(e.rows(), e.cols())),
            MatRef::Identity => Ok(csr_identity(e.rows())),
        },
        MatKind::Map2(op, a, b) => {
            let sa = eval_sparse_mat(a)?;
            let sb = eval_sparse_mat(b)?;
            Ok(csr_combine(*op, &sa, &sb))
        }
        MatKind::Mult(a, b) => {
            let sa = eval_sparse_mat(a)?;
            let sb = eval_sparse_mat(b)?;
            Ok(csr_mult(&sa, &sb))
        }
        MatKind::Scale(k, inner) => {
            let s = eval_sparse_mat(inner)?;
            Ok(csr_scale(*k, &s))
        }
    }
}

fn eval_sparse_vec<T: SimdScalar>(
    e: &VecExpr<'_, T>,
    cfg: &EvalConfig,
) -> Result<SparseVector<T>> {
    match &e.kind {
        VecKind::Leaf(VecRef::Sparse(v)) => Ok((*v).clone()),
        VecKind::Leaf(VecRef::Dense(v)) => {
            let pairs: Vec<(usize, T)> = v
                .as_slice()
                .iter()
                .enumerate()
                .filter(|(_, x)| !x.is_zero())
                .map(|(i, &x)| (i, x))
                .collect();
            SparseVector::from_pairs(v.len(), &pairs)
        }
        VecKind::Map2(op, a, b) => {
            let sa = eval_sparse_vec(a, cfg)?;
            let sb = eval_sparse_vec(b, cfg)?;
            Ok(sv_combine(*op, &sa, &sb))
        }
        VecKind::Scale(k, inner) => {
            let s = eval_sparse_vec(inner, cfg)?;
            Ok(sv_scale(*k, &s))
        }
        VecKind::MatVec(_, _) => {
            // Product results are dense in general; compute densely and
            // compress.
            let mut tmp = DenseVector::try_zeros(e.len())?;
            eval_vec_root(e, &mut tmp, cfg)?;
            let pairs: Vec<(usize, T)> = tmp
                .as_slice()
                .iter()
                .enumerate()
                .filter(|(_, x)| !x.is_zero())
                .map(|(i, &x)| (i, x))
                .collect();
            SparseVector::from_pairs(tmp.len(), &pairs)
        }
    }
}

// ---------------------------------------------------------------------------
// Vector evaluation core
// ---------------------------------------------------------------------------

fn eval_vec_root<T: SimdScalar>(
    expr: &VecExpr<'_, T>,
    target: &mut DenseVector<T>,
    cfg: &EvalConfig,
) -> Result<()> {
    let len = target.len();
    match &expr.kind {
        VecKind::Leaf(VecRef::Dense(v)) => {
            target.as_mut_slice().copy_from_slice(v.as_slice());
            Ok(())
        }
        VecKind::Leaf(VecRef::Sparse(v)) => {
            target.fill_zero();
            for (i, x) in v.iter() {
                target.set(i, x);
            }
            Ok(())
        }
        VecKind::Scale(k, e) => {
            eval_vec_root(e, target, cfg)?;
            scale_assign_slice(target.as_mut_slice(), *k);
            Ok(())
        }
        VecKind::Map2(op, a, b) => {
            let op = *op;
            if let (VecKind::Leaf(VecRef::Dense(x)), VecKind::Leaf(VecRef::Dense(y))) =
                (&a.kind, &b.kind)
            {
                let (xs, ys) = (x.as_slice(), y.as_slice());
                return run_row_blocks(target.as_mut_slice(), len, 1, cfg, &|r0, block| {
                    ew_slices(op, block, &xs[r0..r0 + block.len()], &ys[r0..r0 + block.len()]);
                    Ok(())
                });
            }
            eval_vec_root(a, target, cfg)?;
            combine_assign_vec(op, target, b, cfg)
        }
        VecKind::MatVec(m, v) => eval_mat_vec(m, v, target, cfg),
    }
}

fn combine_assign_vec<T: SimdScalar>(
    op: OpKind,
    target: &mut DenseVector<T>,
    b: &VecExpr<'_, T>,
    cfg: &EvalConfig,
) -> Result<()> {
    match &b.kind {
        VecKind::Leaf(VecRef::Dense(v)) => {
            ew_assign_slices(op, target.as_mut_slice(), v.as_slice());
            Ok(())
        }
        VecKind::Leaf(VecRef::Sparse(v)) => match op {
            OpKind::Add | OpKind::Sub => {
                for (i, x) in v.iter() {
                    let cur = target.get(i);
                    target.set(i, if op == OpKind::Add { cur + x } else { cur - x });
                }
                Ok(())
            }
            OpKind::Schur => {
                let idx = v.indices();
                let vals = v.values();
                let mut p = 0usize;
                for (i, d) in target.as_mut_slice().iter_mut().enumerate() {
                    if p < idx.len() && idx[p] == i {
                        *d = *d * vals[p];
                        p += 1;
                    } else {
                        *d = T::zero();
                    }
                }
                Ok(())
            }
            _ => unreachable!("combine_assign_vec handles elementwise operators"),
        },
        _ => {
            let mut tmp = DenseVector::try_zeros(target.len())?;
            eval_vec_root(b, &mut tmp, cfg)?;
            ew_assign_slices(op, target.as_mut_slice(), tmp.as_slice());
            Ok(())
        }
    }
}

fn eval_mat_vec<T: SimdScalar>(
    m: &MatExpr<'_, T>,
    v: &VecExpr<'_, T>,
    target: &mut DenseVector<T>,
    cfg: &EvalConfig,
) -> Result<()> {
    // Materialize the vector operand to a contiguous slice.
    let x_tmp;
    let x: &[T] = match &v.kind {
        VecKind::Leaf(VecRef::Dense(d)) => d.as_slice(),
        _ => {
            let mut t = DenseVector::try_zeros(v.len())?;
            eval_vec_root(v, &mut t, cfg)?;
            x_tmp = t;
            x_tmp.as_slice()
        }
    };

    let mut m_dense = None;
    let mut m_sparse = None;
    let cm = concretize(m, &mut m_dense, &mut m_sparse, cfg)?;
    let len = target.len();

    match cm {
        Conc::Dense(mo) => run_row_blocks(target.as_mut_slice(), len, 1, cfg, &|r0, block| {
            for (local, y) in block.iter_mut().enumerate() {
                let i = r0 + local;
                *y = match mo.row(i) {
                    Some(row) => dot_slices(row, x),
                    None => {
                        let mut acc = T::zero();
                        for (k, &xk) in x.iter().enumerate() {
                            acc = acc + mo.get(i, k) * xk;
                        }
                        acc
                    }
                };
            }
            Ok(())
        }),
        Conc::Sparse(s, transposed) => {
            let st;
            let csr = if transposed {
                st = csr_transpose(s);
                &st
            } else {
                s
            };
            run_row_blocks(target.as_mut_slice(), len, 1, cfg, &|r0, block| {
                for (local, y) in block.iter_mut().enumerate() {
                    let (cols, vals) = csr.row_entries(r0 + local);
                    let mut acc = T::zero();
                    for (&k, &a) in cols.iter().zip(vals) {
                        acc = acc + a * x[k];
                    }
                    *y = acc;
                }
                Ok(())
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::{add, mat_vec, mult, scale, schur, sub, vec_add, vec_schur};

    fn dm(rows: usize, cols: usize, f: impl FnMut(usize, usize) -> f64) -> DenseMatrix<f64> {
        DenseMatrix::from_fn(rows, cols, f)
    }

    #[test]
    fn test_evaluate_add_matches_elementwise() {
        let a = dm(3, 4, |i, j| (i * 4 + j) as f64);
        let b = dm(3, 4, |i, j| (i + j) as f64 * 0.5);
        let e = add(MatExpr::dense(&a), MatExpr::dense(&b)).unwrap();
        let mut out = DenseMatrix::zeros(3, 4);
        evaluate(&e, &mut out).unwrap();
        for i in 0..3 {
            for j in 0..4 {
                assert_eq!(out.get(i, j), a.get(i, j) + b.get(i, j));
            }
        }
    }

    #[test]
    fn test_evaluate_nested_fused_chain() {
        // 2*(A - B) ⊙ C evaluated in one call.
        let a = dm(2, 2, |i, j| (i * 2 + j) as f64);
        let b = dm(2, 2, |i, j| (i + j) as f64);
        let c = dm(2, 2, |_, _| 3.0);
        let e = schur(
            scale(2.0, sub(MatExpr::dense(&a), MatExpr::dense(&b)).unwrap()),
            MatExpr::dense(&c),
        )
        .unwrap();
        let mut out = DenseMatrix::zeros(2, 2);
        evaluate(&e, &mut out).unwrap();
        for i in 0..2 {
            for j in 0..2 {
                assert_eq!(out.get(i, j), 2.0 * (a.get(i, j) - b.get(i, j)) * 3.0);
            }
        }
    }

    #[test]
    fn test_evaluate_mult_dense() {
        let a = DenseMatrix::from_vec(2, 3, vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]).unwrap();
        let b = DenseMatrix::from_vec(3, 2, vec![7.0, 8.0, 9.0, 10.0, 11.0, 12.0]).unwrap();
        let e = mult(MatExpr::dense(&a), MatExpr::dense(&b)).unwrap();
        let mut out = DenseMatrix::zeros(2, 2);
        evaluate(&e, &mut out).unwrap();
        assert_eq!(out.as_slice(), &[58.0, 64.0, 139.0, 154.0]);
    }

    #[test]
    fn test_evaluate_mult_then_add_into_target() {
        // A*B + C: the product lands in the target, C folds in place.
        let a = dm(3, 3, |i, j| (i + 2 * j) as f64);
        let b = dm(3, 3, |i, j| if i == j { 2.0 } else { 1.0 });
        let c = dm(3, 3, |i, j| (i * j) as f64);
        let e = add(
            mult(MatExpr::dense(&a), MatExpr::dense(&b)).unwrap(),
            MatExpr::dense(&c),
        )
        .unwrap();
        let mut out = DenseMatrix::zeros(3, 3);
        evaluate(&e, &mut out).unwrap();
        for i in 0..3 {
            for j in 0..3 {
                let mut expected = c.get(i, j);
                for k in 0..3 {
                    expected += a.get(i, k) * b.get(k, j);
                }
                assert_eq!(out.get(i, j), expected);
            }
        }
    }

    #[test]
    fn test_target_shape_mismatch() {
        let a = dm(2, 2, |_, _| 1.0);
        let e = MatExpr::dense(&a);
        let mut out = DenseMatrix::<f64>::zeros(3, 3);
        assert!(matches!(
            evaluate(&e, &mut out),
            Err(EvalError::TargetShapeMismatch { .. })
        ));
    }

    #[test]
    fn test_dense_sparse_mixed_add() {
        let a = dm(3, 3, |i, j| (i * 3 + j) as f64);
        let s = SparseMatrix::from_triplets(3, 3, &[(0, 1, 10.0), (2, 2, 20.0)]).unwrap();
        let e = add(MatExpr::dense(&a), MatExpr::sparse(&s)).unwrap();
        let mut out = DenseMatrix::zeros(3, 3);
        evaluate(&e, &mut out).unwrap();
        for i in 0..3 {
            for j in 0..3 {
                assert_eq!(out.get(i, j), a.get(i, j) + s.get(i, j));
            }
        }
    }

    #[test]
    fn test_sparse_schur_into_dense_target() {
        let a = dm(2, 3, |i, j| (1 + i + j) as f64);
        let s = SparseMatrix::from_triplets(2, 3, &[(0, 0, 2.0), (1, 2, 3.0)]).unwrap();
        let e = schur(MatExpr::dense(&a), MatExpr::sparse(&s)).unwrap();
        let mut out = DenseMatrix::zeros(2, 3);
        evaluate(&e, &mut out).unwrap();
        for i in 0..2 {
            for j in 0..3 {
                assert_eq!(out.get(i, j), a.get(i, j) * s.get(i, j));
            }
        }
    }

    #[test]
    fn test_sparse_sparse_mult_into_dense() {
        let a = SparseMatrix::from_triplets(2, 2, &[(0, 0, 1.0), (1, 1, 2.0)]).unwrap();
        let b = SparseMatrix::from_triplets(2, 2, &[(0, 1, 3.0), (1, 0, 4.0)]).unwrap();
        let e = mult(MatExpr::sparse(&a), MatExpr::sparse(&b)).unwrap();
        let mut out = DenseMatrix::zeros(2, 2);
        evaluate(&e, &mut out).unwrap();
        assert_eq!(out.as_slice(), &[0.0, 3.0, 8.0, 0.0]);
    }

    #[test]
    fn test_evaluate_sparse_target() {
        let a = SparseMatrix::from_triplets(2, 2, &[(0, 0, 1.0), (1, 1, 2.0)]).unwrap();
        let b = SparseMatrix::from_triplets(2, 2, &[(0, 0, 5.0), (0, 1, 6.0)]).unwrap();
        let e = add(MatExpr::sparse(&a), MatExpr::sparse(&b)).unwrap();
        let mut out = SparseMatrix::new(2, 2);
        evaluate_sparse(&e, &mut out).unwrap();
        assert_eq!(out.get(0, 0), 6.0);
        assert_eq!(out.get(0, 1), 6.0);
        assert_eq!(out.get(1, 1), 2.0);
        assert_eq!(out.nnz(), 3);
    }

    #[test]
    fn test_structural_restriction_diagonal_product() {
        // Diagonal × diagonal visits the diagonal only; off-diagonal
        // entries of a dirty target must still be zeroed.
        let d1 = crate::DiagonalMatrix::from_diagonal(&[1.0, 2.0, 3.0]);
        let d2 = crate::DiagonalMatrix::from_diagonal(&[4.0, 5.0, 6.0]);
        let e = mult(d1.expr(), d2.expr()).unwrap();
        assert_eq!(e.tag(), StructuralTag::Diagonal);
        let mut out = DenseMatrix::from_fn(3, 3, |_, _| 99.0);
        evaluate(&e, &mut out).unwrap();
        for i in 0..3 {
            for j in 0..3 {
                let expected = if i == j { [4.0, 10.0, 18.0][i] } else { 0.0 };
                assert_eq!(out.get(i, j), expected);
            }
        }
    }

    #[test]
    fn test_identity_operand_folds_away() {
        let a = dm(3, 3, |i, j| (i * 3 + j) as f64);
        let e = mult(MatExpr::identity(3), MatExpr::dense(&a)).unwrap();
        let mut out = DenseMatrix::zeros(3, 3);
        evaluate(&e, &mut out).unwrap();
        assert_eq!(out.as_slice(), a.as_slice());
    }

    #[test]
    fn test_zero_tag_short_circuits() {
        let a = dm(2, 2, |_, _| 7.0);
        let e = mult(MatExpr::zeros(2, 2), MatExpr::dense(&a)).unwrap();
        assert_eq!(e.tag(), StructuralTag::Zero);
        let mut out = DenseMatrix::from_fn(2, 2, |_, _| 5.0);
        evaluate(&e, &mut out).unwrap();
        assert!(out.as_slice().iter().all(|&x| x == 0.0));
    }

    #[test]
    fn test_in_place_add_assign() {
        let mut t = dm(2, 2, |i, j| (i + j) as f64);
        let orig = t.clone();
        let b = dm(2, 2, |_, _| 10.0);
        add_assign(&mut t, &MatExpr::dense(&b)).unwrap();
        for i in 0..2 {
            for j in 0..2 {
                assert_eq!(t.get(i, j), orig.get(i, j) + 10.0);
            }
        }
    }

    #[test]
    fn test_mult_assign_matches_temporary_form() {
        let a0 = dm(3, 3, |i, j| (i * 3 + j + 1) as f64);
        let b = dm(3, 3, |i, j| if (i + j) % 2 == 0 { 2.0 } else { -1.0 });

        // Temporary-based reference: C = A*B, then A = C.
        let mut c = DenseMatrix::zeros(3, 3);
        let e = mult(MatExpr::dense(&a0), MatExpr::dense(&b)).unwrap();
        evaluate(&e, &mut c).unwrap();

        let mut a = a0.clone();
        mult_assign(&mut a, &b).unwrap();
        assert_eq!(a.as_slice(), c.as_slice());
    }

    #[test]
    fn test_mult_assign_rejects_non_square_rhs() {
        let mut a = dm(2, 3, |_, _| 1.0);
        let b = dm(3, 2, |_, _| 1.0);
        assert!(matches!(
            mult_assign(&mut a, &b),
            Err(EvalError::TargetShapeMismatch { .. })
        ));
    }

    #[test]
    fn test_evaluate_vec_paths() {
        let a = DenseVector::from_fn(5, |i| i as f64);
        let b = DenseVector::from_fn(5, |i| (5 - i) as f64);
        let e = vec_add(VecExpr::dense(&a), VecExpr::dense(&b)).unwrap();
        let mut out = DenseVector::zeros(5);
        evaluate_vec(&e, &mut out).unwrap();
        assert!(out.as_slice().iter().all(|&x| x == 5.0));

        let sv = SparseVector::from_pairs(5, &[(1, 2.0), (4, 3.0)]).unwrap();
        let e = vec_schur(VecExpr::dense(&a), VecExpr::sparse(&sv)).unwrap();
        let mut out = DenseVector::zeros(5);
        evaluate_vec(&e, &mut out).unwrap();
        assert_eq!(out.as_slice(), &[0.0, 2.0, 0.0, 0.0, 12.0]);
    }

    #[test]
    fn test_mat_vec_dense_and_sparse() {
        let m = DenseMatrix::from_vec(2, 3, vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]).unwrap();
        let x = DenseVector::from_vec(vec![1.0, 1.0, 1.0]);
        let e = mat_vec(MatExpr::dense(&m), VecExpr::dense(&x)).unwrap();
        let mut y = DenseVector::zeros(2);
        evaluate_vec(&e, &mut y).unwrap();
        assert_eq!(y.as_slice(), &[6.0, 15.0]);

        let s = SparseMatrix::from_triplets(2, 3, &[(0, 2, 2.0), (1, 0, 3.0)]).unwrap();
        let e = mat_vec(MatExpr::sparse(&s), VecExpr::dense(&x)).unwrap();
        let mut y = DenseVector::zeros(2);
        evaluate_vec(&e, &mut y).unwrap();
        assert_eq!(y.as_slice(), &[2.0, 3.0]);
    }

    #[test]
    fn test_dot_products() {
        let a = DenseVector::from_vec(vec![1.0, 2.0, 3.0]);
        let b = DenseVector::from_vec(vec![4.0, 5.0, 6.0]);
        assert_eq!(dot(&VecExpr::dense(&a), &VecExpr::dense(&b)).unwrap(), 32.0);

        let sa = SparseVector::from_pairs(4, &[(0, 1.0), (2, 2.0)]).unwrap();
        let sb = SparseVector::from_pairs(4, &[(2, 5.0), (3, 7.0)]).unwrap();
        assert_eq!(
            dot(&VecExpr::sparse(&sa), &VecExpr::sparse(&sb)).unwrap(),
            10.0
        );

        let short = DenseVector::<f64>::zeros(2);
        assert!(dot(&VecExpr::dense(&a), &VecExpr::dense(&short)).is_err());
    }

    #[test]
    fn test_evaluate_vec_sparse_target() {
        let a = SparseVector::from_pairs(8, &[(1, 1.0), (3, 3.0), (5, 5.0)]).unwrap();
        let b = SparseVector::from_pairs(8, &[(2, 2.0), (3, 30.0)]).unwrap();
        let e = vec_add(VecExpr::sparse(&a), VecExpr::sparse(&b)).unwrap();
        let mut out = SparseVector::new(8);
        evaluate_vec_sparse(&e, &mut out).unwrap();
        assert_eq!(out.indices(), &[1, 2, 3, 5]);
        assert_eq!(out.get(3), 33.0);
    }

    #[test]
    fn test_transposed_leaf_evaluation() {
        let a = dm(2, 3, |i, j| (i * 3 + j) as f64);
        let e = MatExpr::dense(&a).transpose();
        let mut out = DenseMatrix::zeros(3, 2);
        evaluate(&e, &mut out).unwrap();
        for i in 0..3 {
            for j in 0..2 {
                assert_eq!(out.get(i, j), a.get(j, i));
            }
        }
    }
}
