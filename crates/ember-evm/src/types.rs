//! Core value types shared across the processor.

use alloy_primitives::{Address, Bytes, B256, U256};
use serde::{Deserialize, Serialize};

use crate::Revision;

pub use alloy_primitives::{Log, LogData};

/// A 32-byte word of storage data.
pub type Word = B256;
/// A 32-byte storage key.
pub type Key = B256;
/// A 32-byte hash.
pub type Hash = B256;

/// An amount of gas.
///
/// Gas is signed because accounting may dip below zero transiently, for
/// instance while the deployment cost of an oversized contract is charged
/// before the result is discarded.
pub type Gas = i64;

/// An opaque savepoint issued by a transaction context.
///
/// Snapshots are ordered: restoring one discards every snapshot taken after
/// it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Snapshot(pub usize);

/// The kind of a call frame.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CallKind {
    /// A plain message call.
    #[default]
    Call,
    /// A call that forbids any state modification.
    StaticCall,
    /// A call executing foreign code with the caller's storage, sender, and
    /// value.
    DelegateCall,
    /// A call executing foreign code with the caller's storage.
    CallCode,
    /// A contract creation with a nonce-derived address.
    Create,
    /// A contract creation with a salt-derived address.
    Create2,
}

impl CallKind {
    /// True for the two contract-creation kinds.
    pub const fn is_create(self) -> bool {
        matches!(self, Self::Create | Self::Create2)
    }
}

/// Warm or cold classification of an account or storage access (EIP-2929).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AccessStatus {
    /// First access within the transaction.
    Cold,
    /// The account or slot has been accessed before.
    Warm,
}

impl AccessStatus {
    /// True when the access is warm.
    pub const fn is_warm(self) -> bool {
        matches!(self, Self::Warm)
    }
}

impl From<AccessStatus> for bool {
    fn from(status: AccessStatus) -> Self {
        status.is_warm()
    }
}

impl From<bool> for AccessStatus {
    fn from(warm: bool) -> Self {
        if warm {
            Self::Warm
        } else {
            Self::Cold
        }
    }
}

/// An account and the storage keys a transaction expects to access.
///
/// Access lists are hints. Transactions are not required to provide them, nor
/// can completeness or correctness be assumed.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessTuple {
    /// The account expected to be accessed.
    pub address: Address,
    /// The storage keys of the account expected to be accessed.
    pub keys: Vec<Key>,
}

/// An EIP-7702 authorization allowing an externally owned account to reference
/// code and execute within its own context.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetCodeAuthorization {
    /// The chain id for which this authorization is valid.
    pub chain_id: Word,
    /// The target address of the delegation.
    pub address: Address,
    /// The nonce of the signer, used to prevent replay.
    pub nonce: u64,
    /// The recovery id of the signature.
    pub v: u8,
    /// The first value of the signature.
    pub r: Word,
    /// The second value of the signature.
    pub s: Word,
}

/// The parameters of a transaction to be executed on the chain.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    /// The sender of the transaction, paying for its execution.
    pub sender: Address,
    /// The receiver of the transaction. `None` deploys a new contract.
    pub recipient: Option<Address>,
    /// The nonce of the sender account, used to prevent replay.
    pub nonce: u64,
    /// The input data of the transaction.
    pub input: Bytes,
    /// The amount of network currency to transfer to the recipient.
    pub value: U256,
    /// The maximum amount of gas the transaction may use.
    pub gas_limit: Gas,
    /// The maximum price the sender is willing to pay per gas unit.
    pub gas_fee_cap: U256,
    /// The maximum priority fee the sender is willing to pay per gas unit.
    pub gas_tip_cap: U256,
    /// The maximum price the sender is willing to pay per blob gas unit.
    pub blob_gas_fee_cap: U256,
    /// The versioned hashes of the blobs of this transaction.
    ///
    /// An absent list and an empty list are admitted differently, so the
    /// distinction is kept.
    pub blob_hashes: Option<Vec<Hash>>,
    /// The accounts and storage slots the transaction expects to access.
    pub access_list: Option<Vec<AccessTuple>>,
    /// The EIP-7702 set-code authorizations of the transaction.
    pub authorization_list: Vec<SetCodeAuthorization>,
}

impl Transaction {
    /// True when the transaction deploys a new contract.
    pub const fn is_create(&self) -> bool {
        self.recipient.is_none()
    }
}

/// Block-level execution environment.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockParameters {
    /// The chain id.
    pub chain_id: u64,
    /// The block number.
    pub number: u64,
    /// The block timestamp in seconds.
    pub timestamp: u64,
    /// The address receiving block rewards and, under the Ethereum profile,
    /// transaction tips.
    pub coinbase: Address,
    /// The block gas limit.
    pub gas_limit: Gas,
    /// The randomness beacon of the block.
    pub prev_randao: B256,
    /// The base fee per gas unit (EIP-1559).
    pub base_fee: U256,
    /// The base fee per blob gas unit (EIP-4844).
    pub blob_base_fee: U256,
    /// The protocol revision the block is executed under.
    pub revision: Revision,
}

/// Transaction-level parameters forwarded to every call frame.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionParameters {
    /// The sender of the top-level transaction.
    pub origin: Address,
    /// The effective gas price of the transaction.
    pub gas_price: U256,
    /// The versioned blob hashes of the transaction.
    pub blob_hashes: Vec<Hash>,
}

/// Parameters of a single call or create frame.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CallParameters {
    /// The account initiating the frame.
    pub sender: Address,
    /// The account whose state the frame executes against.
    pub recipient: Address,
    /// The account the executed code is loaded from. Differs from the
    /// recipient for delegate and code calls.
    pub code_address: Address,
    /// The gas budget of the frame.
    pub gas: Gas,
    /// The amount of network currency transferred with the frame.
    pub value: U256,
    /// The input data of the frame.
    pub input: Bytes,
    /// The Create2 salt. Ignored by every other kind.
    pub salt: B256,
}

/// Number of 32-byte words required to hold `len` bytes.
pub const fn size_in_words(len: usize) -> u64 {
    (len as u64 + 31) / 32
}
