//! Protocol constants of the Ember transaction processor.

use alloy_primitives::{b256, B256};

use crate::types::Gas;

/// Base gas charged for a transaction that calls an existing account.
pub const TX_GAS: Gas = 21_000;
/// Base gas charged for a contract-creation transaction.
pub const TX_GAS_CONTRACT_CREATION: Gas = 53_000;
/// Gas charged per non-zero byte of transaction input data.
pub const TX_DATA_NON_ZERO_GAS: Gas = 16;
/// Gas charged per zero byte of transaction input data.
pub const TX_DATA_ZERO_GAS: Gas = 4;
/// Gas charged per address tuple of the transaction access list.
pub const TX_ACCESS_LIST_ADDRESS_GAS: Gas = 2_400;
/// Gas charged per storage key of the transaction access list.
pub const TX_ACCESS_LIST_STORAGE_KEY_GAS: Gas = 1_900;
/// Gas charged per 32-byte word of init code for creation transactions.
pub const INIT_CODE_WORD_GAS: Gas = 2;

/// Gas charged per byte of code deployed by a create frame.
pub const CREATE_GAS_COST_PER_BYTE: Gas = 200;
/// Maximum size of deployed contract code in bytes.
pub const MAX_CODE_SIZE: usize = 24_576;
/// Maximum size of the init code of a creation transaction.
pub const MAX_INIT_CODE_SIZE: usize = 2 * MAX_CODE_SIZE;

/// Gas consumed by a single blob (EIP-4844).
pub const BLOB_GAS_PER_BLOB: u64 = 1 << 17;

/// Maximum depth of the call/create stack.
pub const MAX_RECURSIVE_DEPTH: usize = 1024;

/// Keccak-256 hash of the empty byte string.
pub const EMPTY_CODE_HASH: B256 =
    b256!("0xc5d2460186f7233c927e7db2dcc703c0e500b653ca82273b7bfad8045d85a470");
