//! The pool engine: reserves, the liquidity share ledger and the constant-product pricing rule.
//!
//! Every operation validates completely before it mutates, so a returned error always leaves
//! the pool untouched.

use create_type_spec_derive::CreateTypeSpec;
use defi_common::{
    pool_math::{
        calculate_amount_out, calculate_reclaim_output, initial_liquidity_shares,
        proportional_shares, ALLOWED_FEE_RATE_BPS,
    },
    token_balances::{Token, TokenAmount, TokensInOut},
};
use pbc_contract_common::{address::Address, sorted_vec_map::SortedVecMap};
use read_write_state_derive::ReadWriteState;
use thiserror::Error;

/// Errors raised by the pool engine.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PoolError {
    #[error("Amounts must be greater than zero")]
    ZeroAmount,

    #[error("Pools must have existing liquidity")]
    EmptyPool,

    #[error("Deposit ratio does not match the pools: {shares_a} shares from A, {shares_b} shares from B")]
    RatioMismatch {
        shares_a: TokenAmount,
        shares_b: TokenAmount,
    },

    #[error("Insufficient liquidity shares: {owned}/{requested}")]
    InsufficientShares {
        owned: TokenAmount,
        requested: TokenAmount,
    },

    #[error("Swap would produce {amount_out} output tokens, but minimum was set to {minimum}")]
    SlippageExceeded {
        amount_out: TokenAmount,
        minimum: TokenAmount,
    },

    #[error("The given input amounts yielded 0 minted shares")]
    ZeroSharesMinted,

    #[error("Arithmetic overflow")]
    ArithmeticOverflow,

    #[error("Swap fee must be in range [0,10000] basis points, got {0}")]
    InvalidFeeRate(u16),
}

/// Two reserves and the shares that claim them.
///
/// Invariant: `reserve_a == 0` iff `reserve_b == 0` iff `total_shares == 0`, and `total_shares`
/// is the sum of every provider's shares.
#[derive(ReadWriteState, CreateTypeSpec, Debug)]
pub struct PoolState {
    reserve_a: TokenAmount,
    reserve_b: TokenAmount,
    total_shares: TokenAmount,
    shares: SortedVecMap<Address, TokenAmount>,
    fee_rate_bps: u16,
}

impl PoolState {
    /// An empty pool charging `fee_rate_bps` on swap input.
    pub fn new(fee_rate_bps: u16) -> Result<Self, PoolError> {
        if !ALLOWED_FEE_RATE_BPS.contains(&fee_rate_bps) {
            return Err(PoolError::InvalidFeeRate(fee_rate_bps));
        }
        Ok(Self {
            reserve_a: 0,
            reserve_b: 0,
            total_shares: 0,
            shares: SortedVecMap::new(),
            fee_rate_bps,
        })
    }

    pub fn reserve_a(&self) -> TokenAmount {
        self.reserve_a
    }

    pub fn reserve_b(&self) -> TokenAmount {
        self.reserve_b
    }

    /// Reserve of the given `token`.
    pub fn reserve_of(&self, token: Token) -> TokenAmount {
        match token {
            Token::TokenA {} => self.reserve_a,
            Token::TokenB {} => self.reserve_b,
        }
    }

    pub fn total_shares(&self) -> TokenAmount {
        self.total_shares
    }

    pub fn fee_rate_bps(&self) -> u16 {
        self.fee_rate_bps
    }

    /// Shares held by `provider`.
    pub fn share_of(&self, provider: &Address) -> TokenAmount {
        self.shares.get(provider).copied().unwrap_or(0)
    }

    /// True if the pools hold no liquidity.
    pub fn is_empty(&self) -> bool {
        self.total_shares == 0
    }

    /// Shares `amount_a` and `amount_b` would mint right now.
    ///
    /// The first deposit sets the price freely and mints the geometric mean of both amounts.
    /// Later deposits must match the pool ratio: the shares each amount is worth are computed
    /// with floor division, and they must agree.
    pub fn quote_shares(
        &self,
        amount_a: TokenAmount,
        amount_b: TokenAmount,
    ) -> Result<TokenAmount, PoolError> {
        if amount_a == 0 || amount_b == 0 {
            return Err(PoolError::ZeroAmount);
        }

        if self.is_empty() {
            return Ok(initial_liquidity_shares(amount_a, amount_b));
        }

        let shares_a = proportional_shares(amount_a, self.reserve_a, self.total_shares)
            .ok_or(PoolError::ArithmeticOverflow)?;
        let shares_b = proportional_shares(amount_b, self.reserve_b, self.total_shares)
            .ok_or(PoolError::ArithmeticOverflow)?;
        if shares_a != shares_b {
            return Err(PoolError::RatioMismatch { shares_a, shares_b });
        }
        if shares_a == 0 {
            return Err(PoolError::ZeroSharesMinted);
        }
        Ok(shares_a)
    }

    /// Adds `amount_a` and `amount_b` to the reserves and mints shares to `provider`.
    ///
    /// ### Returns
    ///
    /// The number of shares minted.
    pub fn add_liquidity(
        &mut self,
        provider: Address,
        amount_a: TokenAmount,
        amount_b: TokenAmount,
    ) -> Result<TokenAmount, PoolError> {
        let minted = self.quote_shares(amount_a, amount_b)?;
        let reserve_a = self
            .reserve_a
            .checked_add(amount_a)
            .ok_or(PoolError::ArithmeticOverflow)?;
        let reserve_b = self
            .reserve_b
            .checked_add(amount_b)
            .ok_or(PoolError::ArithmeticOverflow)?;
        let total_shares = self
            .total_shares
            .checked_add(minted)
            .ok_or(PoolError::ArithmeticOverflow)?;

        // A provider never owns more than total_shares.
        let owned = self.share_of(&provider);
        self.reserve_a = reserve_a;
        self.reserve_b = reserve_b;
        self.total_shares = total_shares;
        self.shares.insert(provider, owned + minted);

        tracing::info!(
            provider = ?provider,
            amount_a,
            amount_b,
            minted,
            total_shares = self.total_shares,
            "liquidity added"
        );
        Ok(minted)
    }

    /// Burns `shares` of `provider` and releases their proportion of both reserves.
    ///
    /// ### Returns
    ///
    /// The amounts of token A and B to pay out to `provider`.
    pub fn remove_liquidity(
        &mut self,
        provider: Address,
        shares: TokenAmount,
    ) -> Result<(TokenAmount, TokenAmount), PoolError> {
        if shares == 0 {
            return Err(PoolError::ZeroAmount);
        }
        let owned = self.share_of(&provider);
        if shares > owned {
            return Err(PoolError::InsufficientShares {
                owned,
                requested: shares,
            });
        }

        let (a_output, b_output) =
            calculate_reclaim_output(shares, self.reserve_a, self.reserve_b, self.total_shares)
                .ok_or(PoolError::ArithmeticOverflow)?;

        self.reserve_a -= a_output;
        self.reserve_b -= b_output;
        self.total_shares -= shares;
        if owned == shares {
            self.shares.remove(&provider);
        } else {
            self.shares.insert(provider, owned - shares);
        }

        tracing::info!(
            provider = ?provider,
            shares,
            a_output,
            b_output,
            total_shares = self.total_shares,
            "liquidity removed"
        );
        Ok((a_output, b_output))
    }

    /// Output of swapping `amount_in` at the current reserves. Does not mutate.
    ///
    /// `a_to_b` selects token A as input and token B as output; otherwise the reverse.
    pub fn get_amount_out(
        &self,
        amount_in: TokenAmount,
        a_to_b: bool,
    ) -> Result<TokenAmount, PoolError> {
        self.amount_out_for(amount_in, TokensInOut::for_direction(a_to_b))
    }

    fn amount_out_for(
        &self,
        amount_in: TokenAmount,
        tokens: TokensInOut,
    ) -> Result<TokenAmount, PoolError> {
        if amount_in == 0 {
            return Err(PoolError::ZeroAmount);
        }
        if self.reserve_a == 0 || self.reserve_b == 0 {
            return Err(PoolError::EmptyPool);
        }
        calculate_amount_out(
            self.reserve_of(tokens.token_in),
            self.reserve_of(tokens.token_out),
            amount_in,
            self.fee_rate_bps,
        )
        .ok_or(PoolError::ArithmeticOverflow)
    }

    /// Swaps `amount_in` of `tokens.token_in` at the rate given by the constant product formula.
    ///
    /// The whole input, fee included, is added to the input reserve, so the product of the
    /// reserves never decreases.
    ///
    /// Fails if the output is below `amount_out_minimum`.
    ///
    /// ### Returns
    ///
    /// The amount of `tokens.token_out` to pay out to the trader.
    pub fn swap(
        &mut self,
        trader: Address,
        tokens: TokensInOut,
        amount_in: TokenAmount,
        amount_out_minimum: Option<TokenAmount>,
    ) -> Result<TokenAmount, PoolError> {
        let amount_out = self.amount_out_for(amount_in, tokens)?;
        if let Some(minimum) = amount_out_minimum {
            if amount_out < minimum {
                return Err(PoolError::SlippageExceeded {
                    amount_out,
                    minimum,
                });
            }
        }
        let reserve_in = self
            .reserve_of(tokens.token_in)
            .checked_add(amount_in)
            .ok_or(PoolError::ArithmeticOverflow)?;

        *self.reserve_mut(tokens.token_in) = reserve_in;
        *self.reserve_mut(tokens.token_out) -= amount_out;

        tracing::info!(
            trader = ?trader,
            token_in = ?tokens.token_in,
            amount_in,
            amount_out,
            reserve_a = self.reserve_a,
            reserve_b = self.reserve_b,
            "swap executed"
        );
        Ok(amount_out)
    }

    fn reserve_mut(&mut self, token: Token) -> &mut TokenAmount {
        match token {
            Token::TokenA {} => &mut self.reserve_a,
            Token::TokenB {} => &mut self.reserve_b,
        }
    }
}
