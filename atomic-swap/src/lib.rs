#![doc = include_str!("../README.md")]


pub mod escrow;

use pbc_contract_codegen::*;

use std::fmt::Display;

use defi_common::{interact_mpc20::MPC20Contract, token_balances::TokenAmount};
use pbc_contract_common::{
    address::Address,
    context::{CallbackContext, ContractContext},
    events::EventGroup,
};

use crate::escrow::{EscrowState, Release, SecretHash, SwapId, SwapTerms, Timestamp};

/// This is the state of the contract which is persisted on the chain.
///
/// The #\[state\] macro generates serialization logic for the struct.
#[state]
pub struct AtomicSwapContractState {
    /// The address of this contract, which holds the locked funds.
    pub escrow_address: Address,
    /// Every swap created so far.
    pub escrow: EscrowState,
}

/// Panics with the message of a rejected operation, reverting the transaction.
fn or_reject<T, E: Display>(result: Result<T, E>) -> T {
    result.unwrap_or_else(|err| {
        tracing::debug!(error = %err, "operation rejected");
        panic!("{}", err)
    })
}

/// Initialize the contract with no swaps.
#[init]
pub fn initialize(context: ContractContext) -> (AtomicSwapContractState, Vec<EventGroup>) {
    let state = AtomicSwapContractState {
        escrow_address: context.contract_address,
        escrow: EscrowState::new(),
    };
    (state, vec![])
}

/// Lock `amount` of the token at `asset` for `counterparty`.
///
/// Requires that the escrow contract has been approved at `asset` by the sender. The swap is
/// recorded in a callback once the tokens have been transferred, and its id is returned to any
/// callbacks.
///
/// ### Parameters:
///
///  * `counterparty`: [`Address`] - The only account able to claim the tokens.
///
///  * `asset`: [`Address`] - The token contract.
///
///  * `amount`: [`TokenAmount`] - The amount to lock.
///
///  * `secret_hash`: [`SecretHash`] - SHA-256 hash of the secret that unlocks the tokens.
///
///  * `expiry`: [`Timestamp`] - UTC millis after which the sender may reclaim the tokens.
#[action(shortname = 0x01)]
pub fn create_swap(
    context: ContractContext,
    state: AtomicSwapContractState,
    counterparty: Address,
    asset: Address,
    amount: TokenAmount,
    secret_hash: SecretHash,
    expiry: Timestamp,
) -> (AtomicSwapContractState, Vec<EventGroup>) {
    let terms = SwapTerms {
        counterparty,
        asset,
        amount,
        secret_hash,
        expiry,
    };
    let requested_at = context.block_production_time;
    or_reject(state.escrow.check_create(&terms, requested_at));

    let mut event_group_builder = EventGroup::builder();
    MPC20Contract::at_address(asset).transfer_from(
        &mut event_group_builder,
        &context.sender,
        &state.escrow_address,
        amount,
    );

    event_group_builder
        .with_callback(SHORTNAME_CREATE_SWAP_CALLBACK)
        .argument(terms)
        .argument(requested_at)
        .done();

    (state, vec![event_group_builder.build()])
}

/// Handles callback from [`create_swap`]. <br>
/// If the transfer succeeded, the swap is recorded as of the time it was requested.
#[callback(shortname = 0x10)]
pub fn create_swap_callback(
    context: ContractContext,
    callback_context: CallbackContext,
    mut state: AtomicSwapContractState,
    terms: SwapTerms,
    requested_at: Timestamp,
) -> (AtomicSwapContractState, Vec<EventGroup>) {
    assert!(callback_context.success, "Transfer did not succeed");

    let swap_id = or_reject(state.escrow.create(context.sender, terms, requested_at));

    let mut event_group_builder = EventGroup::builder();
    event_group_builder.return_data(swap_id);

    (state, vec![event_group_builder.build()])
}

/// Claim the tokens of swap `swap_id` by revealing its `secret`.
///
/// The action will fail when:
///
/// - The swap does not exist or has been settled.
/// - The swap has expired.
/// - `secret` does not hash to the swap's secret hash.
/// - The sender is not the counterparty of the swap.
#[action(shortname = 0x02)]
pub fn claim(
    context: ContractContext,
    mut state: AtomicSwapContractState,
    swap_id: SwapId,
    secret: Vec<u8>,
) -> (AtomicSwapContractState, Vec<EventGroup>) {
    let release = or_reject(state.escrow.claim(
        &swap_id,
        &secret,
        context.sender,
        context.block_production_time,
    ));
    (state, vec![release_event(release)])
}

/// Return the tokens of an expired swap to its initiator, who must be the sender.
#[action(shortname = 0x03)]
pub fn refund(
    context: ContractContext,
    mut state: AtomicSwapContractState,
    swap_id: SwapId,
) -> (AtomicSwapContractState, Vec<EventGroup>) {
    let release = or_reject(state.escrow.refund(
        &swap_id,
        context.sender,
        context.block_production_time,
    ));
    (state, vec![release_event(release)])
}

fn release_event(release: Release) -> EventGroup {
    let mut event_group_builder = EventGroup::builder();
    MPC20Contract::at_address(release.asset).transfer(
        &mut event_group_builder,
        &release.receiver,
        release.amount,
    );
    event_group_builder.build()
}
