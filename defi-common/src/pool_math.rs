//! Pricing and share arithmetic for two-asset constant-product pools.
//!
//! Every function floors its result. Intermediate products are formed in 256 bits, so
//! [`None`] is only returned when a result does not fit in a [`TokenAmount`] or a divisor
//! is zero.

use std::ops::RangeInclusive;

use crate::{
    math::{mul_div_floor, sqrt_of_product},
    token_balances::TokenAmount,
};

/// Denominator of a fee expressed in basis points.
pub const BPS_DENOMINATOR: u16 = 10_000;

/// The range of allowed swap fees in basis points.
pub const ALLOWED_FEE_RATE_BPS: RangeInclusive<u16> = 0..=BPS_DENOMINATOR;

/// Calculates how many of the output token you get for `amount_in`, given a fee in basis points.
///
/// The fee is deducted from the input before pricing and stays in the input pool:
///
/// ```text
/// amount_in_after_fee = amount_in * (10000 - fee_rate_bps) / 10000
/// amount_out          = reserve_out * amount_in_after_fee / (reserve_in + amount_in_after_fee)
/// ```
///
/// As long as `reserve_in` is non-zero the result is strictly less than `reserve_out`.
///
/// ### Parameters:
///
/// * `reserve_in`: [`TokenAmount`] - The pool matching the token of `amount_in`.
///
/// * `reserve_out`: [`TokenAmount`] - The output token pool.
///
/// * `amount_in`: [`TokenAmount`] - The amount being swapped.
///
/// * `fee_rate_bps`: [`u16`] - The fee to take out of `amount_in`. Must be in [`ALLOWED_FEE_RATE_BPS`].
pub fn calculate_amount_out(
    reserve_in: TokenAmount,
    reserve_out: TokenAmount,
    amount_in: TokenAmount,
    fee_rate_bps: u16,
) -> Option<TokenAmount> {
    let remainder_ratio = TokenAmount::from(BPS_DENOMINATOR.checked_sub(fee_rate_bps)?);
    let amount_in_after_fee = mul_div_floor(
        amount_in,
        remainder_ratio,
        TokenAmount::from(BPS_DENOMINATOR),
    )?;
    mul_div_floor(
        reserve_out,
        amount_in_after_fee,
        reserve_in.checked_add(amount_in_after_fee)?,
    )
}

/// Shares minted for the deposit that creates a pool: the geometric mean of both amounts.
///
/// This makes the value of a share independent of the ratio the pool was opened at.
pub fn initial_liquidity_shares(amount_a: TokenAmount, amount_b: TokenAmount) -> TokenAmount {
    sqrt_of_product(amount_a, amount_b)
}

/// Shares that `amount` is worth when added to a pool holding `reserve` of the same token.
pub fn proportional_shares(
    amount: TokenAmount,
    reserve: TokenAmount,
    total_shares: TokenAmount,
) -> Option<TokenAmount> {
    mul_div_floor(amount, total_shares, reserve)
}

/// Amounts of token A and B that `shares` can reclaim from the pools.
///
/// Due to flooring a provider may reclaim slightly less than their exact proportion,
/// never more.
pub fn calculate_reclaim_output(
    shares: TokenAmount,
    reserve_a: TokenAmount,
    reserve_b: TokenAmount,
    total_shares: TokenAmount,
) -> Option<(TokenAmount, TokenAmount)> {
    let a_output = mul_div_floor(reserve_a, shares, total_shares)?;
    let b_output = mul_div_floor(reserve_b, shares, total_shares)?;
    Some((a_output, b_output))
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use rand::Rng;
    use rand_chacha::rand_core::SeedableRng;

    use super::*;
    use crate::math::U256;

    #[test]
    fn swap_output_matches_worked_example() {
        // 10 * 9970 / 10000 = 9 after flooring, 200 * 9 / 109 = 16.
        assert_eq!(calculate_amount_out(100, 200, 10, 30), Some(16));
        assert_eq!(calculate_amount_out(100, 200, 10, 0), Some(18));
    }

    #[test]
    fn full_fee_gives_nothing() {
        assert_eq!(calculate_amount_out(1_000, 1_000, 500, BPS_DENOMINATOR), Some(0));
    }

    #[test]
    fn fee_above_denominator_is_rejected() {
        assert_eq!(calculate_amount_out(1_000, 1_000, 500, BPS_DENOMINATOR + 1), None);
    }

    #[test]
    fn reclaim_output_is_proportional() {
        assert_eq!(calculate_reclaim_output(10, 100, 100, 100), Some((10, 10)));
        assert_eq!(calculate_reclaim_output(10, 30, 150, 100), Some((3, 15)));
        assert_eq!(calculate_reclaim_output(25, 100, 200, 100), Some((25, 50)));
        assert_eq!(calculate_reclaim_output(1, 100, 200, 0), None);
    }

    const E18: TokenAmount = 1_000_000_000_000_000_000;

    #[test]
    fn initial_shares_are_geometric_mean() {
        assert_eq!(initial_liquidity_shares(100, 200), 141);
        assert_eq!(initial_liquidity_shares(u128::MAX, 2), 26_087_635_650_665_564_424);
        assert_eq!(
            initial_liquidity_shares(1_000 * E18, 2_000 * E18),
            1_414_213_562_373_095_048_801
        );
    }

    #[test]
    fn eighteen_decimal_amounts_do_not_overflow() {
        // 10e18 * 9970 / 10000 after the fee, then 200e18 * 9.97e18 / 109.97e18.
        assert_eq!(
            calculate_amount_out(100 * E18, 200 * E18, 10 * E18, 30),
            Some(18_132_217_877_602_982_631)
        );
        assert_eq!(
            proportional_shares(30 * E18, 10 * E18, 10 * E18),
            Some(30 * E18)
        );
        assert_eq!(
            calculate_reclaim_output(30 * E18, 40 * E18, 40 * E18, 40 * E18),
            Some((30 * E18, 30 * E18))
        );
        assert_eq!(
            calculate_reclaim_output(u128::MAX, u128::MAX, u128::MAX, u128::MAX),
            Some((u128::MAX, u128::MAX))
        );
    }

    #[test]
    fn float_floored_output_agrees() {
        let mut rng = rand_chacha::ChaCha8Rng::seed_from_u64(10);
        let end_input_range = 10_000_000;

        for _ in 0..=100_000 {
            let amount_in: u64 = rng.gen_range(1..=end_input_range);
            let reserve_in: u64 = rng.gen_range(1..=end_input_range);
            let reserve_out: u64 = rng.gen_range(1..=end_input_range);

            let amount_out = calculate_amount_out(
                reserve_in.into(),
                reserve_out.into(),
                amount_in.into(),
                30,
            )
            .unwrap();

            let after_fee = (amount_in * 9_970 / 10_000) as f64;
            let expected = (reserve_out as f64 * after_fee / (reserve_in as f64 + after_fee)).floor()
                as TokenAmount;

            assert!(
                amount_out.abs_diff(expected) <= 1,
                "amount_out was: {amount_out}, float floor was: {expected}"
            );
        }
    }

    proptest! {
        #[test]
        fn swap_never_drains_output_pool(
            reserve_in in 1..u64::MAX,
            reserve_out in 1..u64::MAX,
            amount_in in any::<u64>(),
            fee_rate_bps in ALLOWED_FEE_RATE_BPS,
        ) {
            let amount_out = calculate_amount_out(
                reserve_in.into(),
                reserve_out.into(),
                amount_in.into(),
                fee_rate_bps,
            ).unwrap();
            prop_assert!(amount_out < TokenAmount::from(reserve_out));
        }

        #[test]
        fn swap_never_decreases_product(
            reserve_in in 1..u64::MAX,
            reserve_out in 1..u64::MAX,
            amount_in in any::<u64>(),
            fee_rate_bps in ALLOWED_FEE_RATE_BPS,
        ) {
            let (reserve_in, reserve_out) = (TokenAmount::from(reserve_in), TokenAmount::from(reserve_out));
            let amount_in = TokenAmount::from(amount_in);
            let amount_out = calculate_amount_out(reserve_in, reserve_out, amount_in, fee_rate_bps).unwrap();
            let product_before = U256::from(reserve_in) * U256::from(reserve_out);
            let product_after = U256::from(reserve_in + amount_in) * U256::from(reserve_out - amount_out);
            prop_assert!(product_after >= product_before);
        }

        #[test]
        fn reclaim_must_not_exceed_pools(
            shares in any::<u64>(),
            reserve_a in any::<u64>(),
            reserve_b in any::<u64>(),
            extra_shares in any::<u64>(),
        ) {
            let total_shares = TokenAmount::from(shares) + TokenAmount::from(extra_shares) + 1;
            let (a_output, b_output) = calculate_reclaim_output(
                shares.into(),
                reserve_a.into(),
                reserve_b.into(),
                total_shares,
            ).unwrap();
            prop_assert!(a_output <= TokenAmount::from(reserve_a));
            prop_assert!(b_output <= TokenAmount::from(reserve_b));
        }
    }
}
