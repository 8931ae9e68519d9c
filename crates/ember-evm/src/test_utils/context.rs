use std::collections::{BTreeMap, BTreeSet};

use alloy_primitives::{keccak256, Address, Bytes, U256};

use crate::{
    constants::EMPTY_CODE_HASH, AccessStatus, Hash, Key, Log, Snapshot, TransactionContext, Word,
};

/// A single account of the in-memory world state.
#[derive(Clone, Debug, Default)]
struct Account {
    balance: U256,
    nonce: u64,
    code: Bytes,
    storage: BTreeMap<Key, Word>,
    transient_storage: BTreeMap<Key, Word>,
}

/// The observable world state. Snapshots clone it wholesale.
#[derive(Clone, Debug, Default)]
struct World {
    accounts: BTreeMap<Address, Account>,
    warm_accounts: BTreeSet<Address>,
    warm_slots: BTreeSet<(Address, Key)>,
    logs: Vec<Log>,
    self_destructed: BTreeSet<Address>,
}

/// An in-memory [`TransactionContext`] with full snapshot support, for
/// testing purposes.
#[derive(Clone, Debug, Default)]
pub struct MemoryContext {
    world: World,
    committed_storage: BTreeMap<(Address, Key), Word>,
    snapshots: Vec<World>,
    block_hashes: BTreeMap<u64, Hash>,
}

impl MemoryContext {
    /// An empty world.
    pub fn new() -> Self {
        Self::default()
    }

    /// Gives `address` the given balance.
    pub fn with_balance(mut self, address: Address, balance: U256) -> Self {
        self.account_mut(address).balance = balance;
        self
    }

    /// Gives `address` the given nonce.
    pub fn with_nonce(mut self, address: Address, nonce: u64) -> Self {
        self.account_mut(address).nonce = nonce;
        self
    }

    /// Installs `code` at `address`.
    pub fn with_code(mut self, address: Address, code: Bytes) -> Self {
        self.account_mut(address).code = code;
        self
    }

    /// Sets a storage slot, both live and committed.
    pub fn with_storage(mut self, address: Address, key: Key, value: Word) -> Self {
        self.committed_storage.insert((address, key), value);
        self.account_mut(address).storage.insert(key, value);
        self
    }

    /// Records a historical block hash.
    pub fn with_block_hash(mut self, number: u64, hash: Hash) -> Self {
        self.block_hashes.insert(number, hash);
        self
    }

    /// The number of snapshots currently held.
    pub fn snapshot_count(&self) -> usize {
        self.snapshots.len()
    }

    fn account(&self, address: Address) -> Option<&Account> {
        self.world.accounts.get(&address)
    }

    fn account_mut(&mut self, address: Address) -> &mut Account {
        self.world.accounts.entry(address).or_default()
    }
}

impl TransactionContext for MemoryContext {
    fn create_snapshot(&mut self) -> Snapshot {
        self.snapshots.push(self.world.clone());
        Snapshot(self.snapshots.len() - 1)
    }

    fn restore_snapshot(&mut self, snapshot: Snapshot) {
        self.world = self.snapshots[snapshot.0].clone();
        self.snapshots.truncate(snapshot.0);
    }

    fn account_exists(&self, address: Address) -> bool {
        self.account(address).is_some()
    }

    fn create_account(&mut self, address: Address) {
        self.account_mut(address);
    }

    fn get_nonce(&self, address: Address) -> u64 {
        self.account(address).map_or(0, |account| account.nonce)
    }

    fn set_nonce(&mut self, address: Address, nonce: u64) {
        self.account_mut(address).nonce = nonce;
    }

    fn get_balance(&self, address: Address) -> U256 {
        self.account(address).map_or(U256::ZERO, |account| account.balance)
    }

    fn set_balance(&mut self, address: Address, balance: U256) {
        self.account_mut(address).balance = balance;
    }

    fn get_code(&self, address: Address) -> Bytes {
        self.account(address).map_or_else(Bytes::new, |account| account.code.clone())
    }

    fn set_code(&mut self, address: Address, code: Bytes) {
        self.account_mut(address).code = code;
    }

    fn get_code_hash(&self, address: Address) -> Hash {
        match self.account(address) {
            None => Hash::ZERO,
            Some(account) if account.code.is_empty() => EMPTY_CODE_HASH,
            Some(account) => keccak256(&account.code),
        }
    }

    fn get_code_size(&self, address: Address) -> usize {
        self.account(address).map_or(0, |account| account.code.len())
    }

    fn has_empty_storage(&self, address: Address) -> bool {
        self.account(address)
            .map_or(true, |account| account.storage.values().all(|value| value.is_zero()))
    }

    fn get_storage(&self, address: Address, key: Key) -> Word {
        self.account(address)
            .and_then(|account| account.storage.get(&key))
            .copied()
            .unwrap_or_default()
    }

    fn set_storage(&mut self, address: Address, key: Key, value: Word) {
        self.account_mut(address).storage.insert(key, value);
    }

    fn get_committed_storage(&self, address: Address, key: Key) -> Word {
        self.committed_storage.get(&(address, key)).copied().unwrap_or_default()
    }

    fn get_transient_storage(&self, address: Address, key: Key) -> Word {
        self.account(address)
            .and_then(|account| account.transient_storage.get(&key))
            .copied()
            .unwrap_or_default()
    }

    fn set_transient_storage(&mut self, address: Address, key: Key, value: Word) {
        self.account_mut(address).transient_storage.insert(key, value);
    }

    fn is_address_in_access_list(&self, address: Address) -> bool {
        self.world.warm_accounts.contains(&address)
    }

    fn is_slot_in_access_list(&self, address: Address, key: Key) -> bool {
        self.world.warm_slots.contains(&(address, key))
    }

    fn access_account(&mut self, address: Address) -> AccessStatus {
        if self.world.warm_accounts.insert(address) {
            AccessStatus::Cold
        } else {
            AccessStatus::Warm
        }
    }

    fn access_storage(&mut self, address: Address, key: Key) -> AccessStatus {
        if self.world.warm_slots.insert((address, key)) {
            AccessStatus::Cold
        } else {
            AccessStatus::Warm
        }
    }

    fn add_address_to_access_list(&mut self, address: Address) {
        self.world.warm_accounts.insert(address);
    }

    fn add_slot_to_access_list(&mut self, address: Address, key: Key) {
        self.world.warm_slots.insert((address, key));
    }

    fn emit_log(&mut self, log: Log) {
        self.world.logs.push(log);
    }

    fn get_logs(&self) -> Vec<Log> {
        self.world.logs.clone()
    }

    fn self_destruct(&mut self, address: Address, _beneficiary: Address) -> bool {
        self.world.self_destructed.insert(address)
    }

    fn has_self_destructed(&self, address: Address) -> bool {
        self.world.self_destructed.contains(&address)
    }

    fn get_block_hash(&self, number: u64) -> Hash {
        self.block_hashes.get(&number).copied().unwrap_or_default()
    }
}
