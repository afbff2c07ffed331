//! Utility module containing integer math functions.
//!
//! Token amounts are [`u128`], so a product of two amounts can need up to 256 bits. Products
//! are formed in [`U256`] and only the final result has to fit back into a [`u128`].

#[allow(clippy::assign_op_pattern)]
#[allow(clippy::reversed_empty_ranges)]
mod uint_types {
    use uint::construct_uint;
    construct_uint! {
        pub struct U256(4);
    }
}

pub use uint_types::U256;

/// Narrows `value` to a [`u128`], or [`None`] if it does not fit.
pub fn u256_to_u128(value: U256) -> Option<u128> {
    (value.bits() <= 128).then_some(value.low_u128())
}

/// Finds the integer square root of `a * b`, rounding down.
///
/// Uses Newton's iteration starting from a power of two above the root, so the
/// sequence of estimates decreases monotonically until it settles on the floor.
///
/// ### Parameters:
///
/// * `a`, `b`: [`u128`] - The factors of the number to find the square root of.
///
/// ### Returns:
/// The largest x such that x*x <= a*b. It always fits in a [`u128`].
pub fn sqrt_of_product(a: u128, b: u128) -> u128 {
    let input = U256::from(a) * U256::from(b);
    if input < U256::from(2u8) {
        return input.low_u128();
    }

    // 2^ceil(bits/2) is always >= sqrt(input).
    let mut estimate = U256::one() << input.bits().div_ceil(2);

    loop {
        let next = (estimate + input / estimate) >> 1u8;
        if next >= estimate {
            break;
        }
        estimate = next;
    }

    estimate.low_u128()
}

/// Computes `a * b / denominator` with floor division.
///
/// ### Returns:
///
/// [`None`] if `denominator` is zero or the quotient does not fit in a [`u128`].
pub fn mul_div_floor(a: u128, b: u128, denominator: u128) -> Option<u128> {
    if denominator == 0 {
        return None;
    }
    u256_to_u128(U256::from(a) * U256::from(b) / U256::from(denominator))
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    const E18: u128 = 1_000_000_000_000_000_000;

    #[test]
    fn known_square_roots() {
        assert_eq!(sqrt_of_product(0, 7), 0);
        assert_eq!(sqrt_of_product(1, 1), 1);
        assert_eq!(sqrt_of_product(3, 1), 1);
        assert_eq!(sqrt_of_product(2, 2), 2);
        assert_eq!(sqrt_of_product(4, 5), 4);
        assert_eq!(sqrt_of_product(5, 5), 5);
        // Initial deposit of 100 A and 200 B.
        assert_eq!(sqrt_of_product(100, 200), 141);
        assert_eq!(sqrt_of_product(u128::MAX, 1), u128::from(u64::MAX));
        assert_eq!(sqrt_of_product(u128::MAX, u128::MAX), u128::MAX);
    }

    #[test]
    fn square_roots_of_token_amounts() {
        assert_eq!(
            sqrt_of_product(100 * E18, 200 * E18),
            141_421_356_237_309_504_880
        );
        assert_eq!(
            sqrt_of_product(1_000 * E18, 2_000 * E18),
            1_414_213_562_373_095_048_801
        );
    }

    #[test]
    fn mul_div_floor_only_rejects_unrepresentable_results() {
        assert_eq!(mul_div_floor(10, 141, 100), Some(14));
        assert_eq!(
            mul_div_floor(u128::MAX, u128::MAX, u128::MAX),
            Some(u128::MAX)
        );
        assert_eq!(
            mul_div_floor(200 * E18, 10 * E18, 110 * E18),
            Some(18_181_818_181_818_181_818)
        );
        assert_eq!(mul_div_floor(u128::MAX, 2, 3), Some(u128::MAX / 3 * 2));
        assert_eq!(mul_div_floor(u128::MAX, 2, 1), None);
        assert_eq!(mul_div_floor(1, 1, 0), None);
    }

    #[test]
    fn narrowing() {
        assert_eq!(u256_to_u128(U256::from(u128::MAX)), Some(u128::MAX));
        assert_eq!(u256_to_u128(U256::from(u128::MAX) + U256::one()), None);
    }

    proptest! {
        #[test]
        fn sqrt_of_square_is_identity(root in any::<u128>()) {
            prop_assert_eq!(sqrt_of_product(root, root), root);
        }

        #[test]
        fn sqrt_is_floor(a in any::<u128>(), b in any::<u128>()) {
            let root = U256::from(sqrt_of_product(a, b));
            let input = U256::from(a) * U256::from(b);
            prop_assert!(root * root <= input);
            let next = root + U256::one();
            if let Some(next_square) = next.checked_mul(next) {
                prop_assert!(input < next_square);
            }
        }

        #[test]
        fn mul_div_floor_is_exact_when_product_fits(
            a in any::<u64>(),
            b in any::<u64>(),
            d in 1..u64::MAX,
        ) {
            let (a, b, d) = (u128::from(a), u128::from(b), u128::from(d));
            prop_assert_eq!(mul_div_floor(a, b, d), Some(a * b / d));
        }
    }
}
