#![doc = include_str!("../README.md")]


pub mod pool;

use pbc_contract_codegen::*;

use std::fmt::Display;

pub use defi_common::token_balances::Token;
use defi_common::{
    interact_mpc20::MPC20Contract,
    token_balances::{BalanceError, TokenAmount, TokenBalances, TokensInOut},
};
use pbc_contract_common::{
    address::Address,
    context::{CallbackContext, ContractContext},
    events::{EventGroup, EventGroupBuilder},
};
use thiserror::Error;

use crate::pool::{PoolError, PoolState};

/// Any reason an AMM contract operation is rejected.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AmmError {
    #[error(transparent)]
    Pool(#[from] PoolError),

    #[error(transparent)]
    Balance(#[from] BalanceError),
}

/// Tokens to send out of the pool's custody once a state transition has committed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Payout {
    /// The token to pay out.
    pub token: Token,
    /// The amount to pay out.
    pub amount: TokenAmount,
}

/// This is the state of the contract which is persisted on the chain.
///
/// The #\[state\] macro generates serialization logic for the struct.
#[state]
pub struct AmmContractState {
    /// The address of this contract.
    pub pool_address: Address,
    /// Tokens deposited by users and not yet spent by a pool operation.
    pub deposits: TokenBalances,
    /// Reserves, shares and fee of the pool.
    pub pool: PoolState,
}

impl AmmContractState {
    /// A pool at `pool_address` for the pair (`token_a_address`, `token_b_address`), with empty
    /// reserves.
    pub fn new(
        pool_address: Address,
        token_a_address: Address,
        token_b_address: Address,
        fee_rate_bps: u16,
    ) -> Result<Self, AmmError> {
        Ok(Self {
            pool_address,
            deposits: TokenBalances::new(token_a_address, token_b_address)?,
            pool: PoolState::new(fee_rate_bps)?,
        })
    }

    /// Validates a deposit of `amount` at `token_address` before any tokens are pulled.
    ///
    /// ### Returns
    ///
    /// The pool token at `token_address`.
    pub fn check_deposit(
        &self,
        token_address: Address,
        amount: TokenAmount,
    ) -> Result<Token, AmmError> {
        let token = self.deposits.token_at(token_address)?;
        if amount == 0 {
            return Err(PoolError::ZeroAmount.into());
        }
        Ok(token)
    }

    /// Spends `amount_a` and `amount_b` from `provider`'s deposits on new liquidity.
    ///
    /// ### Returns
    ///
    /// The number of minted shares.
    pub fn add_liquidity(
        &mut self,
        provider: Address,
        amount_a: TokenAmount,
        amount_b: TokenAmount,
    ) -> Result<TokenAmount, AmmError> {
        self.deposits.check_available(&provider, Token::A, amount_a)?;
        self.deposits.check_available(&provider, Token::B, amount_b)?;

        let minted = self.pool.add_liquidity(provider, amount_a, amount_b)?;

        self.deposits
            .deduct_from_token_balance(provider, Token::A, amount_a)?;
        self.deposits
            .deduct_from_token_balance(provider, Token::B, amount_b)?;
        Ok(minted)
    }

    /// Burns `shares` of `provider`.
    ///
    /// ### Returns
    ///
    /// The reclaimed amounts, to be paid out to `provider`.
    pub fn remove_liquidity(
        &mut self,
        provider: Address,
        shares: TokenAmount,
    ) -> Result<[Payout; 2], AmmError> {
        let (a_output, b_output) = self.pool.remove_liquidity(provider, shares)?;
        Ok([
            Payout {
                token: Token::A,
                amount: a_output,
            },
            Payout {
                token: Token::B,
                amount: b_output,
            },
        ])
    }

    /// Spends `amount_in` from `trader`'s deposit of the input token on a swap.
    ///
    /// ### Returns
    ///
    /// The output of the swap, to be paid out to `trader`.
    pub fn swap(
        &mut self,
        trader: Address,
        a_to_b: bool,
        amount_in: TokenAmount,
        amount_out_minimum: Option<TokenAmount>,
    ) -> Result<Payout, AmmError> {
        let tokens = TokensInOut::for_direction(a_to_b);
        self.deposits
            .check_available(&trader, tokens.token_in, amount_in)?;

        let amount_out = self
            .pool
            .swap(trader, tokens, amount_in, amount_out_minimum)?;

        self.deposits
            .deduct_from_token_balance(trader, tokens.token_in, amount_in)?;
        Ok(Payout {
            token: tokens.token_out,
            amount: amount_out,
        })
    }
}

/// Panics with the message of a rejected operation, reverting the transaction.
fn or_reject<T, E: Display>(result: Result<T, E>) -> T {
    result.unwrap_or_else(|err| {
        tracing::debug!(error = %err, "operation rejected");
        panic!("{}", err)
    })
}

/// Initialize the contract.
///
/// # Parameters
///
///   * `context`: [`ContractContext`] - The contract context containing sender and chain information.
///
///   * `token_a_address`: [`Address`] - The address of token A.
///
///   * `token_b_address`: [`Address`] - The address of token B.
///
///   * `fee_rate_bps`: [`u16`] - The fee for swapping in basis points, i.e. a fee of 30 corresponds to 0.3%.
///
/// # Returns
///
/// The new state object of type [`AmmContractState`] with empty reserves.
#[init]
pub fn initialize(
    context: ContractContext,
    token_a_address: Address,
    token_b_address: Address,
    fee_rate_bps: u16,
) -> (AmmContractState, Vec<EventGroup>) {
    let state = or_reject(AmmContractState::new(
        context.contract_address,
        token_a_address,
        token_b_address,
        fee_rate_bps,
    ));
    (state, vec![])
}

/// Deposit token {A, B} into the calling user's balance on the contract.
///
/// Requires that the pool contract has been approved at `token_address` by the sender.
/// The balance is credited in a callback, once the transfer is complete.
///
/// ### Parameters:
///
///  * `token_address`: [`Address`] - The address of the deposited token contract.
///
///  * `amount`: [`TokenAmount`] - The amount to deposit.
#[action(shortname = 0x01)]
pub fn deposit(
    context: ContractContext,
    state: AmmContractState,
    token_address: Address,
    amount: TokenAmount,
) -> (AmmContractState, Vec<EventGroup>) {
    let token = or_reject(state.check_deposit(token_address, amount));

    let mut event_group_builder = EventGroup::builder();
    MPC20Contract::at_address(token_address).transfer_from(
        &mut event_group_builder,
        &context.sender,
        &state.pool_address,
        amount,
    );

    event_group_builder
        .with_callback(SHORTNAME_DEPOSIT_CALLBACK)
        .argument(token)
        .argument(amount)
        .done();

    (state, vec![event_group_builder.build()])
}

/// Handles callback from [`deposit`]. <br>
/// If the transfer succeeded, `amount` is added to the depositing user's balance of `token`.
#[callback(shortname = 0x10)]
pub fn deposit_callback(
    context: ContractContext,
    callback_context: CallbackContext,
    mut state: AmmContractState,
    token: Token,
    amount: TokenAmount,
) -> (AmmContractState, Vec<EventGroup>) {
    assert!(callback_context.success, "Transfer did not succeed");

    state
        .deposits
        .add_to_token_balance(context.sender, token, amount);
    tracing::info!(user = ?context.sender, token = ?token, amount, "deposit credited");

    (state, vec![])
}

/// Swap `amount_in` of token A for token B at the rate dictated by the constant product formula.
///
/// The input is taken from the sender's deposit of token A, and the output is transferred to
/// the sender.
///
/// The action will fail when:
///
/// - The pools do not have any liquidity.
/// - The caller has not deposited `amount_in` of token A.
/// - The output is less than `amount_out_minimum`, when given.
#[action(shortname = 0x02)]
pub fn swap_a_for_b(
    context: ContractContext,
    state: AmmContractState,
    amount_in: TokenAmount,
    amount_out_minimum: Option<TokenAmount>,
) -> (AmmContractState, Vec<EventGroup>) {
    swap_internal(context, state, true, amount_in, amount_out_minimum)
}

/// Withdraw `amount` of token {A, B} from the calling user's deposits.
///
/// The balance is deducted before the transfer is made.
#[action(shortname = 0x03)]
pub fn withdraw(
    context: ContractContext,
    mut state: AmmContractState,
    token_address: Address,
    amount: TokenAmount,
) -> (AmmContractState, Vec<EventGroup>) {
    let token = or_reject(state.deposits.token_at(token_address));
    or_reject(
        state
            .deposits
            .deduct_from_token_balance(context.sender, token, amount),
    );
    tracing::info!(user = ?context.sender, token = ?token, amount, "deposit withdrawn");

    let mut event_group_builder = EventGroup::builder();
    pay_out(
        &state,
        &mut event_group_builder,
        &context.sender,
        &[Payout { token, amount }],
    );

    (state, vec![event_group_builder.build()])
}

/// Become a liquidity provider by adding `amount_a` of token A and `amount_b` of token B from
/// the caller's deposits. <br>
/// The first deposit sets the price; later deposits must match the ratio of the pools. <br>
/// This is the inverse of [`remove_liquidity`].
#[action(shortname = 0x04)]
pub fn add_liquidity(
    context: ContractContext,
    mut state: AmmContractState,
    amount_a: TokenAmount,
    amount_b: TokenAmount,
) -> (AmmContractState, Vec<EventGroup>) {
    or_reject(state.add_liquidity(context.sender, amount_a, amount_b));
    (state, vec![])
}

/// Burn `shares` of the caller's liquidity shares and transfer their proportion of both
/// reserves to the caller. <br>
/// This is the inverse of [`add_liquidity`].
#[action(shortname = 0x05)]
pub fn remove_liquidity(
    context: ContractContext,
    mut state: AmmContractState,
    shares: TokenAmount,
) -> (AmmContractState, Vec<EventGroup>) {
    let payouts = or_reject(state.remove_liquidity(context.sender, shares));

    let mut event_group_builder = EventGroup::builder();
    pay_out(&state, &mut event_group_builder, &context.sender, &payouts);

    (state, vec![event_group_builder.build()])
}

/// Swap `amount_in` of token B for token A. See [`swap_a_for_b`].
#[action(shortname = 0x06)]
pub fn swap_b_for_a(
    context: ContractContext,
    state: AmmContractState,
    amount_in: TokenAmount,
    amount_out_minimum: Option<TokenAmount>,
) -> (AmmContractState, Vec<EventGroup>) {
    swap_internal(context, state, false, amount_in, amount_out_minimum)
}

/// Quote the output of swapping `amount_in`, with token A as input if `a_to_b` is true.
///
/// Leaves the state unchanged; the quote is returned to any callbacks.
#[action(shortname = 0x07)]
pub fn get_amount_out(
    _context: ContractContext,
    state: AmmContractState,
    amount_in: TokenAmount,
    a_to_b: bool,
) -> (AmmContractState, Vec<EventGroup>) {
    let amount_out = or_reject(state.pool.get_amount_out(amount_in, a_to_b));
    tracing::debug!(amount_in, a_to_b, amount_out, "quote");

    let mut event_group_builder = EventGroup::builder();
    event_group_builder.return_data(amount_out);

    (state, vec![event_group_builder.build()])
}

fn swap_internal(
    context: ContractContext,
    mut state: AmmContractState,
    a_to_b: bool,
    amount_in: TokenAmount,
    amount_out_minimum: Option<TokenAmount>,
) -> (AmmContractState, Vec<EventGroup>) {
    let payout = or_reject(state.swap(context.sender, a_to_b, amount_in, amount_out_minimum));

    let mut event_group_builder = EventGroup::builder();
    pay_out(&state, &mut event_group_builder, &context.sender, &[payout]);

    // The swapped output is also returned to any callbacks.
    event_group_builder.return_data(payout.amount);

    (state, vec![event_group_builder.build()])
}

/// Adds MPC20 transfers of `payouts` from the pool to `receiver`. Zero amounts are skipped.
fn pay_out(
    state: &AmmContractState,
    event_group_builder: &mut EventGroupBuilder,
    receiver: &Address,
    payouts: &[Payout],
) {
    for payout in payouts.iter().filter(|payout| payout.amount > 0) {
        MPC20Contract::at_address(state.deposits.address_of(payout.token)).transfer(
            event_group_builder,
            receiver,
            payout.amount,
        );
    }
}
