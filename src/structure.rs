//! Structural tag system: type-level classification of matrix shape
//! invariants and the combination table for composed expressions.
//!
//! Tags are combined by [`combine`], a pure function over the finite
//! operator × tag × tag space. Composition is conservative: any combination
//! not provably structure-preserving degrades to [`StructuralTag::General`].
//! A tag must never overclaim structure — a false tag would let the adaptor
//! guard skip a check it must not skip — so the table only encodes facts
//! that hold for every concrete value of the operands.

/// Shape invariant of a matrix operand or expression result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StructuralTag {
    /// No structure is known.
    General,
    /// `a[i][j] == a[j][i]` for all positions.
    Symmetric,
    /// `a[i][j] == conj(a[j][i])` for all positions.
    Hermitian,
    /// Zero above the diagonal.
    LowerTriangular,
    /// Zero below the diagonal.
    UpperTriangular,
    /// Zero off the diagonal.
    Diagonal,
    /// Every element is zero.
    Zero,
    /// Ones on the diagonal, zero elsewhere.
    Identity,
}

/// Algebraic operator of an expression node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpKind {
    Add,
    Sub,
    /// Matrix product (inner dimensions contract).
    Mult,
    /// Elementwise (Hadamard) product.
    Schur,
    /// Multiplication by a scalar. `combine` reads only the left tag.
    ScalarMult,
}

impl OpKind {
    /// Short operator name used in error messages.
    pub fn name(self) -> &'static str {
        match self {
            OpKind::Add => "add",
            OpKind::Sub => "sub",
            OpKind::Mult => "mult",
            OpKind::Schur => "schur",
            OpKind::ScalarMult => "scalar-mult",
        }
    }
}

// ---------------------------------------------------------------------------
// Tag properties
//
// Each predicate states a fact that holds for every concrete matrix carrying
// the tag. `Zero` and `Identity` satisfy every zero-pattern predicate that
// `Diagonal` satisfies; `Diagonal` is both triangular orientations and
// symmetric (but not Hermitian: complex diagonal entries need not be real).
// ---------------------------------------------------------------------------

/// True when every off-diagonal element is provably zero.
pub(crate) fn is_diagonal(tag: StructuralTag) -> bool {
    matches!(
        tag,
        StructuralTag::Diagonal | StructuralTag::Zero | StructuralTag::Identity
    )
}

/// True when every element above the diagonal is provably zero.
pub(crate) fn is_lower(tag: StructuralTag) -> bool {
    is_diagonal(tag) || tag == StructuralTag::LowerTriangular
}

/// True when every element below the diagonal is provably zero.
pub(crate) fn is_upper(tag: StructuralTag) -> bool {
    is_diagonal(tag) || tag == StructuralTag::UpperTriangular
}

/// True when `a[i][j] == a[j][i]` is provable.
pub(crate) fn is_symmetric(tag: StructuralTag) -> bool {
    is_diagonal(tag) || tag == StructuralTag::Symmetric
}

/// True when `a[i][j] == conj(a[j][i])` is provable. Note `Diagonal` does
/// not qualify: a complex diagonal matrix has no realness guarantee.
pub(crate) fn is_hermitian(tag: StructuralTag) -> bool {
    matches!(
        tag,
        StructuralTag::Hermitian | StructuralTag::Zero | StructuralTag::Identity
    )
}

/// Strongest tag expressible from a property set, preferring the tags with
/// the smallest live index set.
fn strongest(diag: bool, lower: bool, upper: bool, sym: bool, herm: bool) -> StructuralTag {
    if diag || (lower && upper) {
        StructuralTag::Diagonal
    } else if lower {
        StructuralTag::LowerTriangular
    } else if upper {
        StructuralTag::UpperTriangular
    } else if sym {
        StructuralTag::Symmetric
    } else if herm {
        StructuralTag::Hermitian
    } else {
        StructuralTag::General
    }
}

/// Tag of `-A` given the tag of `A`. Negation preserves every zero-pattern
/// and symmetry property but turns `Identity` into a plain `Diagonal`.
pub(crate) fn negation_tag(tag: StructuralTag) -> StructuralTag {
    match tag {
        StructuralTag::Identity => StructuralTag::Diagonal,
        other => other,
    }
}

/// Tag of `Aᵗ` given the tag of `A`.
pub fn transpose_tag(tag: StructuralTag) -> StructuralTag {
    match tag {
        StructuralTag::LowerTriangular => StructuralTag::UpperTriangular,
        StructuralTag::UpperTriangular => StructuralTag::LowerTriangular,
        other => other,
    }
}

// ---------------------------------------------------------------------------
// Combination table
// ---------------------------------------------------------------------------

/// Structural tag of `left <op> right`.
///
/// Pure function over the finite tag space, consulted both at expression
/// construction time (to stamp the node) and by container code that wants
/// to predict a result's category before evaluating.
///
/// For [`OpKind::ScalarMult`] only `left` is read (the scalar operand has
/// no structural tag); pass the matrix operand's tag as `left`.
pub fn combine(op: OpKind, left: StructuralTag, right: StructuralTag) -> StructuralTag {
    use StructuralTag::*;
    match op {
        OpKind::Add | OpKind::Sub => {
            // 0 ± 0 stays provably zero; otherwise intersect properties.
            if left == Zero && right == Zero {
                return Zero;
            }
            if right == Zero {
                return left;
            }
            if left == Zero {
                return if op == OpKind::Add {
                    right
                } else {
                    negation_tag(right)
                };
            }
            strongest(
                is_diagonal(left) && is_diagonal(right),
                is_lower(left) && is_lower(right),
                is_upper(left) && is_upper(right),
                is_symmetric(left) && is_symmetric(right),
                is_hermitian(left) && is_hermitian(right),
            )
        }
        OpKind::Schur => {
            // The zero pattern of a Hadamard product is the union of the
            // operand patterns, so a single structured operand suffices.
            if left == Zero || right == Zero {
                return Zero;
            }
            if left == Identity && right == Identity {
                return Identity;
            }
            let diag = is_diagonal(left)
                || is_diagonal(right)
                || (is_lower(left) && is_upper(right))
                || (is_upper(left) && is_lower(right));
            strongest(
                diag,
                is_lower(left) || is_lower(right),
                is_upper(left) || is_upper(right),
                is_symmetric(left) && is_symmetric(right),
                is_hermitian(left) && is_hermitian(right),
            )
        }
        OpKind::Mult => {
            if left == Zero || right == Zero {
                return Zero;
            }
            if left == Identity {
                return right;
            }
            if right == Identity {
                return left;
            }
            if is_diagonal(left) && is_diagonal(right) {
                return Diagonal;
            }
            // Same-orientation triangular products stay triangular; mixed
            // orientations and everything symmetric degrade. In particular
            // Symmetric × Symmetric is NOT symmetric unless the operands
            // commute, which the type level cannot prove.
            if is_lower(left) && is_lower(right) {
                return LowerTriangular;
            }
            if is_upper(left) && is_upper(right) {
                return UpperTriangular;
            }
            General
        }
        OpKind::ScalarMult => match left {
            Zero => Zero,
            // k·I is diagonal for every k; Identity only survives k == 1,
            // which the type level cannot prove.
            Identity => Diagonal,
            // The scalar is not provably real, so hermiticity is lost.
            Hermitian => General,
            other => other,
        },
    }
}

/// Whether `tag` proves the structure a container requires.
///
/// Consulted by the adaptor invariant guard: a `true` answer permits the
/// unchecked fast-path write, a `false` answer routes through the runtime
/// checked fallback.
pub fn implies(tag: StructuralTag, required: StructuralTag) -> bool {
    use StructuralTag::*;
    match required {
        General => true,
        Diagonal => is_diagonal(tag),
        LowerTriangular => is_lower(tag),
        UpperTriangular => is_upper(tag),
        Symmetric => is_symmetric(tag),
        Hermitian => is_hermitian(tag),
        Zero => tag == Zero,
        Identity => tag == Identity,
    }
}

#[cfg(test)]
mod tests {
    use super::StructuralTag::*;
    use super::*;

    #[test]
    fn test_diagonal_closed_under_elementwise() {
        for op in [OpKind::Add, OpKind::Sub, OpKind::Schur] {
            assert_eq!(combine(op, Diagonal, Diagonal), Diagonal);
        }
        assert_eq!(combine(OpKind::ScalarMult, Diagonal, General), Diagonal);
    }

    #[test]
    fn test_diagonal_product_is_diagonal() {
        assert_eq!(combine(OpKind::Mult, Diagonal, Diagonal), Diagonal);
    }

    #[test]
    fn test_diagonal_times_general_degrades() {
        assert_eq!(combine(OpKind::Mult, Diagonal, General), General);
        assert_eq!(combine(OpKind::Mult, General, Diagonal), General);
    }

    #[test]
    fn test_triangular_same_orientation() {
        assert_eq!(
            combine(OpKind::Add, LowerTriangular, LowerTriangular),
            LowerTriangular
        );
        assert_eq!(
            combine(OpKind::Mult, LowerTriangular, LowerTriangular),
            LowerTriangular
        );
        assert_eq!(
            combine(OpKind::Mult, UpperTriangular, UpperTriangular),
            UpperTriangular
        );
    }

    #[test]
    fn test_triangular_mixed_orientation_degrades_mult() {
        assert_eq!(
            combine(OpKind::Mult, LowerTriangular, UpperTriangular),
            General
        );
        assert_eq!(
            combine(OpKind::Add, LowerTriangular, UpperTriangular),
            General
        );
    }

    #[test]
    fn test_triangular_mixed_schur_is_diagonal() {
        // The patterns intersect on the diagonal only.
        assert_eq!(
            combine(OpKind::Schur, LowerTriangular, UpperTriangular),
            Diagonal
        );
    }

    #[test]
    fn test_schur_one_sided_diagonal() {
        assert_eq!(combine(OpKind::Schur, Diagonal, General), Diagonal);
        assert_eq!(combine(OpKind::Schur, General, Diagonal), Diagonal);
    }

    #[test]
    fn test_symmetric_add_preserved_mult_degrades() {
        assert_eq!(combine(OpKind::Add, Symmetric, Symmetric), Symmetric);
        assert_eq!(combine(OpKind::Sub, Symmetric, Symmetric), Symmetric);
        // Load-bearing: the product of two symmetric matrices is symmetric
        // only when they commute.
        assert_eq!(combine(OpKind::Mult, Symmetric, Symmetric), General);
    }

    #[test]
    fn test_zero_absorbs_and_identity_neutral() {
        assert_eq!(combine(OpKind::Mult, Zero, General), Zero);
        assert_eq!(combine(OpKind::Schur, General, Zero), Zero);
        assert_eq!(combine(OpKind::Mult, Identity, Symmetric), Symmetric);
        assert_eq!(combine(OpKind::Mult, LowerTriangular, Identity), LowerTriangular);
        assert_eq!(combine(OpKind::Add, Zero, Symmetric), Symmetric);
        assert_eq!(combine(OpKind::Add, Zero, Zero), Zero);
    }

    #[test]
    fn test_sub_from_zero_drops_identity() {
        // 0 - I = -I is diagonal, not identity.
        assert_eq!(combine(OpKind::Sub, Zero, Identity), Diagonal);
        assert_eq!(combine(OpKind::Sub, Zero, Symmetric), Symmetric);
    }

    #[test]
    fn test_identity_sum_is_diagonal() {
        // I + I = 2I; the tag must not overclaim Identity.
        assert_eq!(combine(OpKind::Add, Identity, Identity), Diagonal);
    }

    #[test]
    fn test_diagonal_plus_triangular() {
        assert_eq!(
            combine(OpKind::Add, Diagonal, LowerTriangular),
            LowerTriangular
        );
        assert_eq!(
            combine(OpKind::Add, UpperTriangular, Diagonal),
            UpperTriangular
        );
    }

    #[test]
    fn test_scalar_mult_hermitian_degrades() {
        assert_eq!(combine(OpKind::ScalarMult, Hermitian, Hermitian), General);
        assert_eq!(combine(OpKind::ScalarMult, Symmetric, Symmetric), Symmetric);
        assert_eq!(combine(OpKind::ScalarMult, Identity, Identity), Diagonal);
        assert_eq!(combine(OpKind::ScalarMult, Zero, Zero), Zero);
    }

    #[test]
    fn test_hermitian_add_preserved() {
        assert_eq!(combine(OpKind::Add, Hermitian, Hermitian), Hermitian);
        assert_eq!(combine(OpKind::Mult, Hermitian, Hermitian), General);
        // Hermitian + Symmetric proves nothing in general.
        assert_eq!(combine(OpKind::Add, Hermitian, Symmetric), General);
    }

    #[test]
    fn test_transpose_tag() {
        assert_eq!(transpose_tag(LowerTriangular), UpperTriangular);
        assert_eq!(transpose_tag(UpperTriangular), LowerTriangular);
        assert_eq!(transpose_tag(Symmetric), Symmetric);
        assert_eq!(transpose_tag(Diagonal), Diagonal);
        assert_eq!(transpose_tag(General), General);
    }

    #[test]
    fn test_implies_partial_order() {
        assert!(implies(Zero, Diagonal));
        assert!(implies(Zero, Symmetric));
        assert!(implies(Identity, Diagonal));
        assert!(implies(Diagonal, LowerTriangular));
        assert!(implies(Diagonal, UpperTriangular));
        assert!(implies(Diagonal, Symmetric));
        assert!(!implies(Diagonal, Hermitian));
        assert!(!implies(General, Diagonal));
        assert!(!implies(Symmetric, Diagonal));
        assert!(implies(General, General));
    }

    #[test]
    fn test_never_overclaims_exhaustive_elementwise() {
        // For every pair, the combined tag's zero-pattern claims must be
        // implied by the operand claims (Add/Sub case).
        let all = [
            General,
            Symmetric,
            Hermitian,
            LowerTriangular,
            UpperTriangular,
            Diagonal,
            Zero,
            Identity,
        ];
        for &l in &all {
            for &r in &all {
                let out = combine(OpKind::Add, l, r);
                if is_diagonal(out) {
                    assert!(
                        is_diagonal(l) && is_diagonal(r),
                        "overclaimed diagonal for {l:?} + {r:?}"
                    );
                }
                if is_symmetric(out) {
                    assert!(
                        is_symmetric(l) && is_symmetric(r),
                        "overclaimed symmetry for {l:?} + {r:?}"
                    );
                }
            }
        }
    }
}
