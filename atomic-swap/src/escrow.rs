//! Hash time-locked escrow records.
//!
//! A record locks `amount` of `asset` from an initiator until either the counterparty reveals
//! the secret behind `secret_hash` before `expiry`, or the initiator reclaims it at or after
//! `expiry`. Settled records are kept with their terminal status.

use create_type_spec_derive::CreateTypeSpec;
use defi_common::token_balances::TokenAmount;
use pbc_contract_common::{address::Address, sorted_vec_map::SortedVecMap};
use read_write_rpc_derive::ReadWriteRPC;
use read_write_state_derive::ReadWriteState;
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Block production time in UTC millis.
pub type Timestamp = i64;

/// Errors raised by the escrow.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EscrowError {
    #[error("Amounts must be greater than zero")]
    ZeroAmount,

    #[error("Expiry {expiry} must be after the current time {now}")]
    ExpiryInPast { expiry: Timestamp, now: Timestamp },

    #[error("No swap with id {0}")]
    NotFound(SwapId),

    #[error("Swap has already been settled as {0:?}")]
    AlreadySettled(SwapStatus),

    #[error("Swap expired at {expiry}")]
    Expired { expiry: Timestamp },

    #[error("Swap cannot be refunded before {expiry}")]
    NotYetExpired { expiry: Timestamp },

    #[error("Secret does not match the hash of the swap")]
    SecretMismatch,

    #[error("Caller {0:?} is not allowed to settle this swap")]
    Unauthorized(Address),
}

/// Identifier of a swap record.
#[derive(
    ReadWriteRPC, ReadWriteState, CreateTypeSpec, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Debug,
)]
pub struct SwapId {
    pub bytes: [u8; 32],
}

impl SwapId {
    fn derive(initiator: &Address, terms: &SwapTerms, nonce: u64) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(initiator.identifier);
        hasher.update(terms.counterparty.identifier);
        hasher.update(terms.asset.identifier);
        hasher.update(terms.amount.to_be_bytes());
        hasher.update(terms.secret_hash.bytes);
        hasher.update(nonce.to_be_bytes());
        Self {
            bytes: hasher.finalize().into(),
        }
    }
}

impl std::fmt::Display for SwapId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.bytes.iter().try_for_each(|byte| write!(f, "{byte:02x}"))
    }
}

/// SHA-256 commitment to a secret.
#[derive(ReadWriteRPC, ReadWriteState, CreateTypeSpec, Clone, Copy, PartialEq, Eq, Debug)]
pub struct SecretHash {
    pub bytes: [u8; 32],
}

impl SecretHash {
    pub fn of_secret(secret: &[u8]) -> Self {
        Self {
            bytes: Sha256::digest(secret).into(),
        }
    }

    /// True if `secret` hashes to this commitment.
    pub fn opens_with(&self, secret: &[u8]) -> bool {
        Self::of_secret(secret) == *self
    }
}

#[derive(ReadWriteState, CreateTypeSpec, Clone, Copy, PartialEq, Eq, Debug)]
#[repr(u8)]
pub enum SwapStatus {
    /// Funds are locked.
    #[discriminant(0)]
    Created {},
    /// Funds went to the counterparty.
    #[discriminant(1)]
    Claimed {},
    /// Funds went back to the initiator.
    #[discriminant(2)]
    Refunded {},
}

/// What an initiator offers when creating a swap.
#[derive(ReadWriteRPC, CreateTypeSpec, Clone, Copy, PartialEq, Eq, Debug)]
pub struct SwapTerms {
    /// The only party able to claim.
    pub counterparty: Address,
    /// Token contract of the locked funds.
    pub asset: Address,
    pub amount: TokenAmount,
    pub secret_hash: SecretHash,
    /// Claims must happen strictly before, refunds at or after.
    pub expiry: Timestamp,
}

/// A swap record.
#[derive(ReadWriteState, CreateTypeSpec, Clone, PartialEq, Eq, Debug)]
pub struct AtomicSwap {
    pub initiator: Address,
    pub counterparty: Address,
    pub asset: Address,
    pub amount: TokenAmount,
    pub secret_hash: SecretHash,
    pub expiry: Timestamp,
    pub status: SwapStatus,
}

/// Funds leaving escrow custody after a settlement.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Release {
    pub receiver: Address,
    pub asset: Address,
    pub amount: TokenAmount,
}

/// All swap records of the escrow.
#[derive(ReadWriteState, CreateTypeSpec, Debug)]
pub struct EscrowState {
    next_nonce: u64,
    swaps: SortedVecMap<SwapId, AtomicSwap>,
}

impl Default for EscrowState {
    fn default() -> Self {
        Self::new()
    }
}

impl EscrowState {
    pub fn new() -> Self {
        Self {
            next_nonce: 0,
            swaps: SortedVecMap::new(),
        }
    }

    /// The record with the given `id`, settled or not.
    pub fn get(&self, id: &SwapId) -> Option<&AtomicSwap> {
        self.swaps.get(id)
    }

    /// Number of records ever created.
    pub fn len(&self) -> usize {
        self.swaps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.swaps.is_empty()
    }

    /// Validates `terms` at time `now` without creating anything.
    pub fn check_create(&self, terms: &SwapTerms, now: Timestamp) -> Result<(), EscrowError> {
        if terms.amount == 0 {
            return Err(EscrowError::ZeroAmount);
        }
        if terms.expiry <= now {
            return Err(EscrowError::ExpiryInPast {
                expiry: terms.expiry,
                now,
            });
        }
        Ok(())
    }

    /// Records funds locked by `initiator` under `terms`.
    ///
    /// The funds must already be in escrow custody.
    pub fn create(
        &mut self,
        initiator: Address,
        terms: SwapTerms,
        now: Timestamp,
    ) -> Result<SwapId, EscrowError> {
        self.check_create(&terms, now)?;

        let id = SwapId::derive(&initiator, &terms, self.next_nonce);
        self.next_nonce += 1;
        self.swaps.insert(
            id,
            AtomicSwap {
                initiator,
                counterparty: terms.counterparty,
                asset: terms.asset,
                amount: terms.amount,
                secret_hash: terms.secret_hash,
                expiry: terms.expiry,
                status: SwapStatus::Created {},
            },
        );

        tracing::info!(
            %id,
            initiator = ?initiator,
            counterparty = ?terms.counterparty,
            amount = terms.amount,
            expiry = terms.expiry,
            "swap created"
        );
        Ok(id)
    }

    /// Releases the funds of swap `id` to `claimant`, who must present the secret before expiry.
    pub fn claim(
        &mut self,
        id: &SwapId,
        secret: &[u8],
        claimant: Address,
        now: Timestamp,
    ) -> Result<Release, EscrowError> {
        let swap = self.pending(id)?;
        if now >= swap.expiry {
            return Err(EscrowError::Expired {
                expiry: swap.expiry,
            });
        }
        if !swap.secret_hash.opens_with(secret) {
            return Err(EscrowError::SecretMismatch);
        }
        if claimant != swap.counterparty {
            return Err(EscrowError::Unauthorized(claimant));
        }

        let release = self.settle(*id, swap, SwapStatus::Claimed {});
        tracing::info!(%id, claimant = ?claimant, amount = release.amount, "swap claimed");
        Ok(release)
    }

    /// Returns the funds of swap `id` to its initiator once it has expired.
    pub fn refund(
        &mut self,
        id: &SwapId,
        caller: Address,
        now: Timestamp,
    ) -> Result<Release, EscrowError> {
        let swap = self.pending(id)?;
        if now < swap.expiry {
            return Err(EscrowError::NotYetExpired {
                expiry: swap.expiry,
            });
        }
        if caller != swap.initiator {
            return Err(EscrowError::Unauthorized(caller));
        }

        let release = self.settle(*id, swap, SwapStatus::Refunded {});
        tracing::info!(%id, initiator = ?caller, amount = release.amount, "swap refunded");
        Ok(release)
    }

    /// A copy of record `id`, if it is still awaiting settlement.
    fn pending(&self, id: &SwapId) -> Result<AtomicSwap, EscrowError> {
        let swap = self.swaps.get(id).ok_or(EscrowError::NotFound(*id))?;
        match swap.status {
            SwapStatus::Created {} => Ok(swap.clone()),
            status => Err(EscrowError::AlreadySettled(status)),
        }
    }

    fn settle(&mut self, id: SwapId, mut swap: AtomicSwap, status: SwapStatus) -> Release {
        swap.status = status;
        let receiver = match status {
            SwapStatus::Refunded {} => swap.initiator,
            _ => swap.counterparty,
        };
        let release = Release {
            receiver,
            asset: swap.asset,
            amount: swap.amount,
        };
        self.swaps.insert(id, swap);
        release
    }
}
