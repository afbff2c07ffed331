//! Custody ledger of deposited pool tokens.
//!
//! Tokens pulled into a pool contract through a token-ledger `transfer_from` are credited here,
//! and pool operations consume them. A user's deposit is therefore the explicit grant a pool
//! operation is allowed to spend.

use create_type_spec_derive::CreateTypeSpec;
use pbc_contract_common::{
    address::{Address, AddressType},
    sorted_vec_map::SortedVecMap,
};
use read_write_rpc_derive::ReadWriteRPC;
use read_write_state_derive::ReadWriteState;
use thiserror::Error;

/// Type used to represent token amounts.
pub type TokenAmount = u128;

/// One of the two tokens held by a pool.
#[derive(PartialEq, Eq, ReadWriteRPC, ReadWriteState, CreateTypeSpec, Clone, Copy, Debug)]
#[repr(u8)]
pub enum Token {
    /// The value representing token A.
    #[discriminant(0)]
    TokenA {},
    /// The value representing token B.
    #[discriminant(1)]
    TokenB {},
}

/// Make reference to tokens more readable
impl Token {
    /// The value representing token A.
    pub const A: Token = Token::TokenA {};

    /// The value representing token B.
    pub const B: Token = Token::TokenB {};
}

/// Errors raised by the deposit ledger.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BalanceError {
    #[error("Insufficient {token:?} deposit: {available}/{requested}")]
    InsufficientDeposit {
        token: Token,
        available: TokenAmount,
        requested: TokenAmount,
    },

    #[error("Address {0:?} is neither token A nor token B of this pool")]
    UnknownToken(Address),

    #[error("Tokens A and B must not be the same contract")]
    IdenticalTokens,

    #[error("Token address {0:?} must be a contract address")]
    NotAContract(Address),
}

/// Deposited amounts of a single user.
#[derive(ReadWriteState, CreateTypeSpec, Debug, PartialEq, Eq, Clone, Copy, Default)]
pub struct TokenBalance {
    /// The amount of token A that the user can spend or withdraw.
    pub a_tokens: TokenAmount,
    /// The amount of token B that the user can spend or withdraw.
    pub b_tokens: TokenAmount,
}

impl TokenBalance {
    /// Retrieves a copy of the amount that matches `token`.
    pub fn get_amount_of(&self, token: Token) -> TokenAmount {
        match token {
            Token::TokenA {} => self.a_tokens,
            Token::TokenB {} => self.b_tokens,
        }
    }

    fn get_mut_amount_of(&mut self, token: Token) -> &mut TokenAmount {
        match token {
            Token::TokenA {} => &mut self.a_tokens,
            Token::TokenB {} => &mut self.b_tokens,
        }
    }

    fn is_empty(&self) -> bool {
        self.a_tokens == 0 && self.b_tokens == 0
    }
}

/// Deposit ledger for the token pair of a pool.
#[derive(ReadWriteState, CreateTypeSpec, Debug)]
pub struct TokenBalances {
    /// The address of the first token.
    pub token_a_address: Address,
    /// The address of the second token.
    pub token_b_address: Address,
    /// Deposits per user. Users without any deposit have no entry.
    balances: SortedVecMap<Address, TokenBalance>,
}

impl TokenBalances {
    /// Creates an empty ledger for the given token pair.
    ///
    /// Both addresses must be contracts, and they must differ.
    pub fn new(token_a_address: Address, token_b_address: Address) -> Result<Self, BalanceError> {
        for address in [token_a_address, token_b_address] {
            if address.address_type == AddressType::Account {
                return Err(BalanceError::NotAContract(address));
            }
        }
        if token_a_address == token_b_address {
            return Err(BalanceError::IdenticalTokens);
        }
        Ok(Self {
            token_a_address,
            token_b_address,
            balances: SortedVecMap::new(),
        })
    }

    /// Determines which of the pool's tokens lives at `token_address`.
    pub fn token_at(&self, token_address: Address) -> Result<Token, BalanceError> {
        if token_address == self.token_a_address {
            Ok(Token::A)
        } else if token_address == self.token_b_address {
            Ok(Token::B)
        } else {
            Err(BalanceError::UnknownToken(token_address))
        }
    }

    /// The contract address of `token`.
    pub fn address_of(&self, token: Token) -> Address {
        match token {
            Token::TokenA {} => self.token_a_address,
            Token::TokenB {} => self.token_b_address,
        }
    }

    /// Retrieves a copy of the deposits of `user`.
    pub fn get_balance_for(&self, user: &Address) -> TokenBalance {
        self.balances.get(user).copied().unwrap_or_default()
    }

    /// Credits `amount` of `token` to `user`.
    pub fn add_to_token_balance(&mut self, user: Address, token: Token, amount: TokenAmount) {
        let mut balance = self.get_balance_for(&user);
        *balance.get_mut_amount_of(token) += amount;
        if !balance.is_empty() {
            self.balances.insert(user, balance);
        }
    }

    /// Fails unless `user` has at least `amount` of `token` deposited. Never mutates.
    pub fn check_available(
        &self,
        user: &Address,
        token: Token,
        amount: TokenAmount,
    ) -> Result<(), BalanceError> {
        let available = self.get_balance_for(user).get_amount_of(token);
        if available < amount {
            return Err(BalanceError::InsufficientDeposit {
                token,
                available,
                requested: amount,
            });
        }
        Ok(())
    }

    /// Debits `amount` of `token` from `user`, removing the entry once it is empty.
    pub fn deduct_from_token_balance(
        &mut self,
        user: Address,
        token: Token,
        amount: TokenAmount,
    ) -> Result<(), BalanceError> {
        self.check_available(&user, token, amount)?;

        let mut balance = self.get_balance_for(&user);
        *balance.get_mut_amount_of(token) -= amount;

        if balance.is_empty() {
            self.balances.remove(&user);
        } else {
            self.balances.insert(user, balance);
        }
        Ok(())
    }
}

/// Tracks the from-to pairs for swaps.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokensInOut {
    /// The input token.
    pub token_in: Token,
    /// The output token.
    pub token_out: Token,
}

impl TokensInOut {
    /// Swapping [`Token::TokenA`] in for [`Token::TokenB`].
    pub const A_IN_B_OUT: Self = TokensInOut {
        token_in: Token::A,
        token_out: Token::B,
    };

    /// Swapping [`Token::TokenB`] in for [`Token::TokenA`].
    pub const B_IN_A_OUT: Self = TokensInOut {
        token_in: Token::B,
        token_out: Token::A,
    };

    /// Direction of a swap, given whether A is the input token.
    pub fn for_direction(a_to_b: bool) -> Self {
        if a_to_b {
            Self::A_IN_B_OUT
        } else {
            Self::B_IN_A_OUT
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn contract(id: u8) -> Address {
        Address {
            address_type: AddressType::PublicContract,
            identifier: [id; 20],
        }
    }

    fn account(id: u8) -> Address {
        Address {
            address_type: AddressType::Account,
            identifier: [id; 20],
        }
    }

    #[test]
    fn token_pair_is_validated() {
        assert_eq!(
            TokenBalances::new(account(1), contract(2)).unwrap_err(),
            BalanceError::NotAContract(account(1))
        );
        assert_eq!(
            TokenBalances::new(contract(1), contract(1)).unwrap_err(),
            BalanceError::IdenticalTokens
        );
        assert!(TokenBalances::new(contract(1), contract(2)).is_ok());
    }

    #[test]
    fn token_lookup_by_address() {
        let balances = TokenBalances::new(contract(1), contract(2)).unwrap();
        assert_eq!(balances.token_at(contract(1)), Ok(Token::A));
        assert_eq!(balances.token_at(contract(2)), Ok(Token::B));
        assert_eq!(
            balances.token_at(contract(3)),
            Err(BalanceError::UnknownToken(contract(3)))
        );
        assert_eq!(balances.address_of(Token::B), contract(2));
    }

    #[test]
    fn deposits_are_credited_and_debited() {
        let mut balances = TokenBalances::new(contract(1), contract(2)).unwrap();
        let user = account(7);

        balances.add_to_token_balance(user, Token::A, 100);
        balances.add_to_token_balance(user, Token::B, 40);
        balances.deduct_from_token_balance(user, Token::A, 60).unwrap();

        assert_eq!(
            balances.get_balance_for(&user),
            TokenBalance {
                a_tokens: 40,
                b_tokens: 40
            }
        );
    }

    #[test]
    fn overdraft_is_rejected_without_effect() {
        let mut balances = TokenBalances::new(contract(1), contract(2)).unwrap();
        let user = account(7);
        balances.add_to_token_balance(user, Token::B, 10);

        assert_eq!(
            balances.deduct_from_token_balance(user, Token::B, 11),
            Err(BalanceError::InsufficientDeposit {
                token: Token::B,
                available: 10,
                requested: 11,
            })
        );
        assert_eq!(balances.get_balance_for(&user).b_tokens, 10);
    }

    #[test]
    fn emptied_users_are_removed() {
        let mut balances = TokenBalances::new(contract(1), contract(2)).unwrap();
        let user = account(7);
        balances.add_to_token_balance(user, Token::A, 5);
        balances.deduct_from_token_balance(user, Token::A, 5).unwrap();

        assert_eq!(balances.get_balance_for(&user), TokenBalance::default());
        assert!(balances.balances.is_empty());
    }
}
