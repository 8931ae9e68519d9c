//! Execution results and the processor error taxonomy.

use alloy_primitives::{Address, Bytes, U256};

use crate::{Gas, Log, Revision};

/// Outcome of a single interpreter run.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct InterpreterResult {
    /// False if the execution reverted or ran out of gas.
    pub success: bool,
    /// The data returned by the executed code.
    pub output: Bytes,
    /// The remaining gas budget of the frame.
    pub gas_left: Gas,
    /// The accumulated refund delta of the frame.
    pub gas_refund: Gas,
}

/// Outcome of a call or create frame.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CallResult {
    /// False if the execution reverted or ran out of gas.
    pub success: bool,
    /// The data returned by the frame.
    pub output: Bytes,
    /// The remaining gas budget of the frame.
    pub gas_left: Gas,
    /// The accumulated refund delta of the frame.
    pub gas_refund: Gas,
    /// The address derived for a create frame. Present even when the init
    /// code reverted, since the address was consumed.
    pub created_address: Option<Address>,
}

impl CallResult {
    /// An unsuccessful result that leaves the caller's gas budget untouched.
    pub(crate) fn aborted(gas: Gas) -> Self {
        Self { gas_left: gas, ..Self::default() }
    }
}

impl From<InterpreterResult> for CallResult {
    fn from(result: InterpreterResult) -> Self {
        Self {
            success: result.success,
            output: result.output,
            gas_left: result.gas_left,
            gas_refund: result.gas_refund,
            created_address: None,
        }
    }
}

/// Summary of an executed transaction.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Receipt {
    /// False if the execution ended in a revert, true otherwise.
    pub success: bool,
    /// The output produced by the transaction.
    pub output: Bytes,
    /// The address of the deployed contract, filled only for a successful
    /// creation transaction.
    pub contract_address: Option<Address>,
    /// The gas consumed by the transaction.
    pub gas_used: Gas,
    /// The blob gas consumed by the transaction.
    pub blob_gas_used: Gas,
    /// The logs produced by the transaction.
    pub logs: Vec<Log>,
}

/// Rejection reasons detected before any gas is bought.
///
/// None of these leave any trace in the world state.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum AdmissionError {
    /// The transaction nonce does not match the sender's account nonce.
    #[error("nonce mismatch: transaction nonce {transaction} != state nonce {state}")]
    NonceMismatch {
        /// The nonce carried by the transaction.
        transaction: u64,
        /// The nonce of the sender account.
        state: u64,
    },
    /// Accepting the transaction would overflow the sender nonce.
    #[error("sender nonce overflow")]
    NonceOverflow,
    /// The sender has deployed code. Transactions from contracts are not
    /// allowed.
    #[error("sender is not an externally owned account")]
    SenderNotEoa,
    /// A blob transaction must name a recipient.
    #[error("blob transaction without recipient")]
    BlobWithoutRecipient,
    /// A blob transaction must carry at least one blob hash.
    #[error("blob transaction without blob hashes")]
    MissingBlobHashes,
    /// A blob hash does not carry the KZG version byte.
    #[error("blob hash with invalid version byte")]
    InvalidBlobHashVersion,
    /// The blob fee cap cannot cover the current blob base fee.
    #[error("blob gas fee cap {fee_cap} is lower than blob base fee {base_fee}")]
    BlobFeeCapTooLow {
        /// The blob fee cap of the transaction.
        fee_cap: U256,
        /// The blob base fee of the block.
        base_fee: U256,
    },
    /// The init code of a creation transaction exceeds the size limit.
    #[error("init code of {size} bytes exceeds the size limit")]
    OversizedInitCode {
        /// The size of the init code in bytes.
        size: usize,
    },
    /// The fee cap cannot cover the block base fee.
    #[error("gas fee cap {fee_cap} is lower than base fee {base_fee}")]
    FeeCapBelowBaseFee {
        /// The fee cap of the transaction.
        fee_cap: U256,
        /// The base fee of the block.
        base_fee: U256,
    },
    /// The fee cap is below the declared tip cap.
    #[error("gas fee cap {fee_cap} is lower than tip cap {tip_cap}")]
    FeeCapBelowTipCap {
        /// The fee cap of the transaction.
        fee_cap: U256,
        /// The tip cap of the transaction.
        tip_cap: U256,
    },
    /// The sender cannot cover the worst-case transaction cost.
    #[error("insufficient balance: {balance} < {required}")]
    InsufficientBalance {
        /// The balance of the sender.
        balance: U256,
        /// The worst-case cost of the transaction.
        required: U256,
    },
    /// The worst-case transaction cost overflows 256 bits.
    #[error("transaction cost overflows 256 bits")]
    BalanceOverflow,
    /// The gas limit cannot cover the setup cost of the transaction.
    #[error("gas limit {gas_limit} is below the setup cost {setup_gas}")]
    InsufficientSetupGas {
        /// The gas limit of the transaction.
        gas_limit: Gas,
        /// The setup cost of the transaction.
        setup_gas: Gas,
    },
}

/// Failure reported by the bytecode interpreter.
///
/// Interpreter errors indicate an implementation fault or an unsupported
/// environment, not a revert. Reverts are successful protocol executions and
/// are reported through [`InterpreterResult::success`].
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum InterpreterError {
    /// The interpreter refuses to execute the requested revision.
    #[error("interpreter does not support revision {0}")]
    UnsupportedRevision(Revision),
    /// Any other interpreter fault.
    #[error("interpreter failure: {0}")]
    Internal(String),
}

/// Failure while dispatching a precompiled contract.
///
/// These never escape the run context. They are converted into unsuccessful
/// call results that consume the frame's gas.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum PrecompileError {
    /// No implementation is registered for the address.
    #[error("precompiled contract not found")]
    NotFound,
    /// The required gas does not fit the signed gas domain.
    #[error("gas cost exceeds maximum limit")]
    GasCostOverflow,
    /// The frame's gas budget cannot cover the required gas.
    #[error("insufficient gas")]
    InsufficientGas,
    /// The contract itself failed.
    #[error("error executing precompiled contract: {0}")]
    Execution(String),
}

/// Top-level failure of a processor run.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ProcessorError {
    /// The transaction is inadmissible. No gas was bought and the world state
    /// is untouched.
    #[error("transaction rejected: {0}")]
    Admission(#[from] AdmissionError),
    /// The interpreter failed after gas was bought. The entire gas limit
    /// counts as used and any partial state must be discarded by the caller.
    #[error("execution failed after {gas_used} gas: {source}")]
    Interpreter {
        /// The underlying interpreter fault.
        source: InterpreterError,
        /// The gas charged for the failed transaction, equal to its gas
        /// limit.
        gas_used: Gas,
    },
}
