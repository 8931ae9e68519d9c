//! World-state surface consumed by the processor.

use alloy_primitives::{Address, Bytes, U256};
use auto_impl::auto_impl;
use delegate::delegate;

use crate::{AccessStatus, Hash, Key, Log, Snapshot, Word};

/// Mutable view of the world state, scoped to a single transaction.
///
/// The processor holds an exclusive borrow of the context for the duration of
/// a transaction and mutates it exclusively through these operations. Every
/// mutation made between [`create_snapshot`](Self::create_snapshot) and a
/// matching [`restore_snapshot`](Self::restore_snapshot) is reverted.
#[auto_impl(&mut, Box)]
pub trait TransactionContext {
    /// Creates a savepoint covering every mutation made so far.
    fn create_snapshot(&mut self) -> Snapshot;
    /// Reverts every mutation made after `snapshot` was taken and discards
    /// every snapshot taken after it.
    fn restore_snapshot(&mut self, snapshot: Snapshot);

    /// True when an account exists at `address`.
    fn account_exists(&self, address: Address) -> bool;
    /// Materializes an empty account at `address`.
    fn create_account(&mut self, address: Address);
    /// The nonce of the account, zero for absent accounts.
    fn get_nonce(&self, address: Address) -> u64;
    /// Sets the nonce of the account.
    fn set_nonce(&mut self, address: Address, nonce: u64);
    /// The balance of the account, zero for absent accounts.
    fn get_balance(&self, address: Address) -> U256;
    /// Sets the balance of the account.
    fn set_balance(&mut self, address: Address, balance: U256);
    /// The code deployed at `address`, empty for absent accounts.
    fn get_code(&self, address: Address) -> Bytes;
    /// Deploys `code` at `address`.
    fn set_code(&mut self, address: Address, code: Bytes);
    /// The hash of the code deployed at `address`. Zero for absent accounts.
    fn get_code_hash(&self, address: Address) -> Hash;
    /// The size of the code deployed at `address`.
    fn get_code_size(&self, address: Address) -> usize;
    /// True when every storage slot of the account is zero.
    fn has_empty_storage(&self, address: Address) -> bool;

    /// The current value of the storage slot.
    fn get_storage(&self, address: Address, key: Key) -> Word;
    /// Sets the storage slot.
    fn set_storage(&mut self, address: Address, key: Key, value: Word);
    /// The value the storage slot held at the start of the transaction.
    fn get_committed_storage(&self, address: Address, key: Key) -> Word;
    /// The current value of the transient storage slot (EIP-1153).
    fn get_transient_storage(&self, address: Address, key: Key) -> Word;
    /// Sets the transient storage slot.
    fn set_transient_storage(&mut self, address: Address, key: Key, value: Word);

    /// True when the account is warm.
    fn is_address_in_access_list(&self, address: Address) -> bool;
    /// True when the storage slot is warm.
    fn is_slot_in_access_list(&self, address: Address, key: Key) -> bool;
    /// Marks the account warm, reporting its previous status.
    fn access_account(&mut self, address: Address) -> AccessStatus;
    /// Marks the storage slot warm, reporting its previous status.
    fn access_storage(&mut self, address: Address, key: Key) -> AccessStatus;
    /// Marks the account warm.
    fn add_address_to_access_list(&mut self, address: Address);
    /// Marks the storage slot warm.
    fn add_slot_to_access_list(&mut self, address: Address, key: Key);

    /// Appends a log record.
    fn emit_log(&mut self, log: Log);
    /// The logs emitted so far, in emission order.
    fn get_logs(&self) -> Vec<Log>;

    /// Flags `address` as selfdestructed in favor of `beneficiary`.
    ///
    /// Returns true when this is the first selfdestruct of `address` within
    /// the transaction. The balance movement is not part of this operation,
    /// see [`EmberContext`].
    fn self_destruct(&mut self, address: Address, beneficiary: Address) -> bool;
    /// True when `address` has selfdestructed within the transaction.
    fn has_self_destructed(&self, address: Address) -> bool;

    /// The hash of the block with the given number.
    fn get_block_hash(&self, number: u64) -> Hash;
}

/// Context wrapper that settles selfdestruct balances.
///
/// Some world-state implementations move the balance of a selfdestructing
/// account inside the interpreter. Here the movement is managed next to the
/// value transfers of calls and creates instead: the wrapper drains the
/// account, credits the beneficiary, and only then delegates to the underlying
/// context, which tracks the selfdestruct flag itself.
#[derive(Debug)]
pub struct EmberContext<C> {
    inner: C,
}

impl<C: TransactionContext> EmberContext<C> {
    /// Wraps `inner`.
    pub fn new(inner: C) -> Self {
        Self { inner }
    }

    /// Returns the wrapped context.
    pub fn into_inner(self) -> C {
        self.inner
    }
}

impl<C: TransactionContext> TransactionContext for EmberContext<C> {
    delegate! {
        to self.inner {
            fn create_snapshot(&mut self) -> Snapshot;
            fn restore_snapshot(&mut self, snapshot: Snapshot);
            fn account_exists(&self, address: Address) -> bool;
            fn create_account(&mut self, address: Address);
            fn get_nonce(&self, address: Address) -> u64;
            fn set_nonce(&mut self, address: Address, nonce: u64);
            fn get_balance(&self, address: Address) -> U256;
            fn set_balance(&mut self, address: Address, balance: U256);
            fn get_code(&self, address: Address) -> Bytes;
            fn set_code(&mut self, address: Address, code: Bytes);
            fn get_code_hash(&self, address: Address) -> Hash;
            fn get_code_size(&self, address: Address) -> usize;
            fn has_empty_storage(&self, address: Address) -> bool;
            fn get_storage(&self, address: Address, key: Key) -> Word;
            fn set_storage(&mut self, address: Address, key: Key, value: Word);
            fn get_committed_storage(&self, address: Address, key: Key) -> Word;
            fn get_transient_storage(&self, address: Address, key: Key) -> Word;
            fn set_transient_storage(&mut self, address: Address, key: Key, value: Word);
            fn is_address_in_access_list(&self, address: Address) -> bool;
            fn is_slot_in_access_list(&self, address: Address, key: Key) -> bool;
            fn access_account(&mut self, address: Address) -> AccessStatus;
            fn access_storage(&mut self, address: Address, key: Key) -> AccessStatus;
            fn add_address_to_access_list(&mut self, address: Address);
            fn add_slot_to_access_list(&mut self, address: Address, key: Key);
            fn emit_log(&mut self, log: Log);
            fn get_logs(&self) -> Vec<Log>;
            fn has_self_destructed(&self, address: Address) -> bool;
            fn get_block_hash(&self, number: u64) -> Hash;
        }
    }

    fn self_destruct(&mut self, address: Address, beneficiary: Address) -> bool {
        let balance = self.inner.get_balance(address);
        self.inner.set_balance(address, U256::ZERO);
        let credited = self.inner.get_balance(beneficiary).saturating_add(balance);
        self.inner.set_balance(beneficiary, credited);
        self.inner.self_destruct(address, beneficiary)
    }
}
