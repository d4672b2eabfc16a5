//! Scalar type bounds for expression evaluation.

/// Shared trait bounds for all element types usable as matrix/vector
/// elements, independent of SIMD support.
///
/// The bound set is deliberately minimal: closed ring arithmetic plus the
/// `Send + Sync` markers required for threaded evaluation. SIMD acceleration
/// is layered on top through [`SimdScalar`](crate::simd::SimdScalar), so
/// custom element types (e.g. semiring scalars) can participate in the
/// engine without vector kernels.
pub trait Scalar:
    Copy
    + Send
    + Sync
    + 'static
    + std::ops::Add<Output = Self>
    + std::ops::Sub<Output = Self>
    + std::ops::Mul<Output = Self>
    + num_traits::Zero
    + num_traits::One
    + PartialEq
{
}

impl<T> Scalar for T where
    T: Copy
        + Send
        + Sync
        + 'static
        + std::ops::Add<Output = T>
        + std::ops::Sub<Output = T>
        + std::ops::Mul<Output = T>
        + num_traits::Zero
        + num_traits::One
        + PartialEq
{
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_scalar<T: Scalar>() {}

    #[test]
    fn test_standard_types() {
        assert_scalar::<f32>();
        assert_scalar::<f64>();
        assert_scalar::<i32>();
        assert_scalar::<i64>();
        assert_scalar::<num_complex::Complex64>();
    }

    #[test]
    fn test_custom_semiring_type() {
        // A custom type with ring arithmetic but no SIMD support should
        // satisfy the bound.
        #[derive(Debug, Clone, Copy, PartialEq)]
        struct Wrapping8(u8);

        impl std::ops::Add for Wrapping8 {
            type Output = Self;
            fn add(self, rhs: Self) -> Self {
                Wrapping8(self.0.wrapping_add(rhs.0))
            }
        }

        impl std::ops::Sub for Wrapping8 {
            type Output = Self;
            fn sub(self, rhs: Self) -> Self {
                Wrapping8(self.0.wrapping_sub(rhs.0))
            }
        }

        impl std::ops::Mul for Wrapping8 {
            type Output = Self;
            fn mul(self, rhs: Self) -> Self {
                Wrapping8(self.0.wrapping_mul(rhs.0))
            }
        }

        impl num_traits::Zero for Wrapping8 {
            fn zero() -> Self {
                Wrapping8(0)
            }
            fn is_zero(&self) -> bool {
                self.0 == 0
            }
        }

        impl num_traits::One for Wrapping8 {
            fn one() -> Self {
                Wrapping8(1)
            }
        }

        assert_scalar::<Wrapping8>();
    }
}
