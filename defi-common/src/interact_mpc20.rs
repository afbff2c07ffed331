//! # MPC20 invocation helper
//!
//! Builds the token-ledger interactions that move custody in and out of the pool and escrow
//! contracts. The ledger is an [MPC20
//! contract](https://partisiablockchain.gitlab.io/documentation/smart-contracts/integration/mpc-20-token-contract.html),
//! the Partisia counterpart of ERC-20.
//!
//! Assumes that the target contract possesses actions where the shortname and arguments match
//! the following:
//!
//! ```ignore
//! #[action(shortname=0x01)] transfer(to: Address, amount: u128);
//! #[action(shortname=0x03)] transfer_from(from: Address, to: Address, amount: u128);
//! ```

use pbc_contract_common::{
    address::Address,
    events::{EventGroupBuilder, GasCost},
    shortname::Shortname,
};

use crate::token_balances::TokenAmount;

/// A token contract on the blockchain.
pub struct MPC20Contract {
    contract_address: Address,
}

impl MPC20Contract {
    const SHORTNAME_TRANSFER: Shortname = Shortname::from_u32(0x01);

    const SHORTNAME_TRANSFER_FROM: Shortname = Shortname::from_u32(0x03);

    /// Gas amount sufficient for a [`MPC20Contract::transfer`] invocation.
    pub const GAS_COST_TRANSFER: GasCost = 15500;

    /// Gas amount sufficient for a [`MPC20Contract::transfer_from`] invocation.
    pub const GAS_COST_TRANSFER_FROM: GasCost = 15500;

    /// Token contract representation for the given `contract_address`.
    pub fn at_address(contract_address: Address) -> Self {
        Self { contract_address }
    }

    /// Pays `amount` out of the calling contract's custody to `receiver`.
    pub fn transfer(
        &self,
        event_group_builder: &mut EventGroupBuilder,
        receiver: &Address,
        amount: TokenAmount,
    ) {
        event_group_builder
            .call(self.contract_address, Self::SHORTNAME_TRANSFER)
            .argument(*receiver)
            .argument(amount)
            .with_cost(Self::GAS_COST_TRANSFER)
            .done();
    }

    /// Pulls `amount` from `owner` to `receiver`.
    ///
    /// Succeeds only if `owner` has approved the calling contract for at least `amount`; the
    /// caller learns the outcome in a callback.
    pub fn transfer_from(
        &self,
        event_group_builder: &mut EventGroupBuilder,
        owner: &Address,
        receiver: &Address,
        amount: TokenAmount,
    ) {
        event_group_builder
            .call(self.contract_address, Self::SHORTNAME_TRANSFER_FROM)
            .argument(*owner)
            .argument(*receiver)
            .argument(amount)
            .with_cost(Self::GAS_COST_TRANSFER_FROM)
            .done();
    }
}
