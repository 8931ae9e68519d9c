//! Top-level transaction processing.

use core::fmt;
use std::{
    collections::BTreeMap,
    sync::{PoisonError, RwLock},
};

use alloy_primitives::{Address, B256, U256};
use auto_impl::auto_impl;
use once_cell::sync::Lazy;
use tracing::debug;

use crate::{
    constants::{
        BLOB_GAS_PER_BLOB, EMPTY_CODE_HASH, INIT_CODE_WORD_GAS, MAX_INIT_CODE_SIZE,
        TX_ACCESS_LIST_ADDRESS_GAS, TX_ACCESS_LIST_STORAGE_KEY_GAS, TX_DATA_NON_ZERO_GAS,
        TX_DATA_ZERO_GAS, TX_GAS, TX_GAS_CONTRACT_CREATION,
    },
    precompiled_addresses, size_in_words, AdmissionError, BlockParameters, CallKind,
    CallParameters, CallResult, Gas, Hash, Interpreter, InterpreterError, PrecompileRegistry,
    ProcessorError, Receipt, Revision, RunContext, StateContractRegistry, Transaction,
    TransactionContext, TransactionParameters, TransactionRunContext,
};

/// A component capable of executing transactions.
///
/// Implementations execute individual transactions to progress the world
/// state of a chain: they charge gas fees, check nonces, execute the
/// transaction through potentially recursive contract calls, integrate
/// precompiled contracts, and create new contracts.
#[auto_impl(&, Box, Arc)]
pub trait Processor: Send + Sync {
    /// Checks whether the transaction can be executed and applies it if
    /// possible.
    ///
    /// Returns a receipt with the result of the transaction, or an error when
    /// the transaction cannot be executed. A receipt with
    /// [`success`](Receipt::success) set to false is a successful protocol
    /// execution that reverted.
    fn run(
        &self,
        block: &BlockParameters,
        transaction: &Transaction,
        context: &mut dyn TransactionContext,
    ) -> Result<Receipt, ProcessorError>;
}

/// The Ember transaction processor.
///
/// The processor exists in two profiles. The chain-native profile differs
/// from the Ethereum-compatible one in the way transactions are settled:
/// - the transaction value is not part of the upfront balance check, so an
///   uncoverable top-level transfer reverts and consumes gas instead of being
///   rejected,
/// - 10% of the remaining gas is retained for transactions sent by regular
///   accounts,
/// - no tip is paid to the coinbase.
pub struct EmberProcessor {
    interpreter: Box<dyn Interpreter>,
    eth_compatible: bool,
    precompiles: PrecompileRegistry,
    state_contracts: StateContractRegistry,
}

impl EmberProcessor {
    /// Creates a chain-native processor around `interpreter`.
    pub fn new(interpreter: Box<dyn Interpreter>) -> Self {
        Self {
            interpreter,
            eth_compatible: false,
            precompiles: PrecompileRegistry::default(),
            state_contracts: StateContractRegistry::default(),
        }
    }

    /// Creates an Ethereum-compatible processor around `interpreter`.
    pub fn new_eth_compatible(interpreter: Box<dyn Interpreter>) -> Self {
        Self { eth_compatible: true, ..Self::new(interpreter) }
    }

    /// Replaces the precompile registry.
    pub fn with_precompiles(mut self, precompiles: PrecompileRegistry) -> Self {
        self.precompiles = precompiles;
        self
    }

    /// Replaces the state-contract registry.
    pub fn with_state_contracts(mut self, state_contracts: StateContractRegistry) -> Self {
        self.state_contracts = state_contracts;
        self
    }

    /// Executes the admitted transaction. Non-executable transactions return
    /// an unsuccessful result; errors indicate an engine fault.
    fn run_transaction(
        &self,
        block: &BlockParameters,
        transaction: &Transaction,
        context: &mut dyn TransactionContext,
        gas_price: U256,
        gas: Gas,
    ) -> Result<CallResult, InterpreterError> {
        if block.revision.is_at_least(Revision::Berlin) {
            seed_access_list(transaction, context, block.revision, block.coinbase);
        }

        let kind = if transaction.is_create() { CallKind::Create } else { CallKind::Call };
        if kind == CallKind::Call {
            // Creations consume the nonce during their setup instead.
            let nonce = context.get_nonce(transaction.sender);
            context.set_nonce(transaction.sender, nonce + 1);
        }

        let transaction_parameters = TransactionParameters {
            origin: transaction.sender,
            gas_price,
            blob_hashes: transaction.blob_hashes.clone().unwrap_or_default(),
        };
        let mut run_context = TransactionRunContext::new(
            context,
            self.interpreter.as_ref(),
            &self.precompiles,
            &self.state_contracts,
            *block,
            transaction_parameters,
        );
        run_context.call(kind, call_parameters(transaction, gas))
    }
}

impl Processor for EmberProcessor {
    fn run(
        &self,
        block: &BlockParameters,
        transaction: &Transaction,
        context: &mut dyn TransactionContext,
    ) -> Result<Receipt, ProcessorError> {
        check_transaction(block, transaction, context)?;
        let (gas_price, gas) =
            calculate_available_gas(block, transaction, context, self.eth_compatible)?;

        debug!(
            sender = %transaction.sender,
            nonce = transaction.nonce,
            gas_limit = transaction.gas_limit,
            %gas_price,
            "transaction admitted"
        );

        let result = self
            .run_transaction(block, transaction, context, gas_price, gas)
            .map_err(|source| ProcessorError::Interpreter {
                source,
                // The state has already been modified; the caller discards it
                // and the whole limit counts as used.
                gas_used: transaction.gas_limit,
            })?;

        let gas_used =
            return_excess_gas(block, transaction, context, gas_price, &result, self.eth_compatible);
        debug!(success = result.success, gas_used, "transaction executed");

        let contract_address = if transaction.is_create() && result.success {
            result.created_address
        } else {
            None
        };

        Ok(Receipt {
            success: result.success,
            output: result.output,
            contract_address,
            gas_used,
            blob_gas_used: blob_gas_used(transaction),
            logs: context.get_logs(),
        })
    }
}

impl fmt::Debug for EmberProcessor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EmberProcessor")
            .field("eth_compatible", &self.eth_compatible)
            .field("precompiles", &self.precompiles)
            .field("state_contracts", &self.state_contracts)
            .finish_non_exhaustive()
    }
}

/// Performs the basic admission checks: the nonce is correct, the sender is
/// an externally owned account, blobs are valid, and the init code is not too
/// large.
fn check_transaction(
    block: &BlockParameters,
    transaction: &Transaction,
    context: &dyn TransactionContext,
) -> Result<(), AdmissionError> {
    check_nonce(transaction.nonce, context.get_nonce(transaction.sender))?;
    check_sender_is_eoa(context.get_code_hash(transaction.sender))?;
    check_blobs(block, transaction)?;
    check_init_code_size(block.revision, transaction)?;
    Ok(())
}

fn check_nonce(transaction_nonce: u64, state_nonce: u64) -> Result<(), AdmissionError> {
    if transaction_nonce != state_nonce {
        return Err(AdmissionError::NonceMismatch {
            transaction: transaction_nonce,
            state: state_nonce,
        });
    }
    if state_nonce.checked_add(1).is_none() {
        return Err(AdmissionError::NonceOverflow);
    }
    Ok(())
}

/// Transactions from accounts with deployed code are rejected.
fn check_sender_is_eoa(code_hash: Hash) -> Result<(), AdmissionError> {
    if code_hash != Hash::ZERO && code_hash != EMPTY_CODE_HASH {
        return Err(AdmissionError::SenderNotEoa);
    }
    Ok(())
}

fn check_blobs(block: &BlockParameters, transaction: &Transaction) -> Result<(), AdmissionError> {
    if let Some(hashes) = &transaction.blob_hashes {
        if transaction.recipient.is_none() {
            return Err(AdmissionError::BlobWithoutRecipient);
        }
        if hashes.is_empty() {
            return Err(AdmissionError::MissingBlobHashes);
        }
        // The hash length is fixed by the type; only the KZG version byte
        // needs checking.
        if hashes.iter().any(|hash| hash[0] != 0x01) {
            return Err(AdmissionError::InvalidBlobHashVersion);
        }
        if block.revision.is_at_least(Revision::Cancun)
            && transaction.blob_gas_fee_cap < block.blob_base_fee
        {
            return Err(AdmissionError::BlobFeeCapTooLow {
                fee_cap: transaction.blob_gas_fee_cap,
                base_fee: block.blob_base_fee,
            });
        }
    }
    Ok(())
}

fn check_init_code_size(
    revision: Revision,
    transaction: &Transaction,
) -> Result<(), AdmissionError> {
    if revision.is_at_least(Revision::Shanghai)
        && transaction.is_create()
        && transaction.input.len() > MAX_INIT_CODE_SIZE
    {
        return Err(AdmissionError::OversizedInitCode { size: transaction.input.len() });
    }
    Ok(())
}

/// Calculates the effective gas price and the gas available for execution,
/// and buys the gas from the sender.
///
/// Fails when the gas price cannot be derived, the sender cannot cover the
/// worst-case cost, or the gas limit is below the setup cost. Nothing is
/// charged in those cases.
fn calculate_available_gas(
    block: &BlockParameters,
    transaction: &Transaction,
    context: &mut dyn TransactionContext,
    eth_compatible: bool,
) -> Result<(U256, Gas), AdmissionError> {
    let gas_price =
        calculate_gas_price(block.base_fee, transaction.gas_fee_cap, transaction.gas_tip_cap)?;
    check_balance(gas_price, transaction, context.get_balance(transaction.sender), eth_compatible)?;

    let setup_gas = calculate_setup_gas(transaction, block.revision);
    if transaction.gas_limit < setup_gas {
        return Err(AdmissionError::InsufficientSetupGas {
            gas_limit: transaction.gas_limit,
            setup_gas,
        });
    }

    buy_gas(transaction, gas_price, block.blob_base_fee, context);
    Ok((gas_price, transaction.gas_limit - setup_gas))
}

/// The effective gas price: the base fee plus the capped priority tip.
fn calculate_gas_price(
    base_fee: U256,
    fee_cap: U256,
    tip_cap: U256,
) -> Result<U256, AdmissionError> {
    if fee_cap < base_fee {
        return Err(AdmissionError::FeeCapBelowBaseFee { fee_cap, base_fee });
    }
    if fee_cap < tip_cap {
        return Err(AdmissionError::FeeCapBelowTipCap { fee_cap, tip_cap });
    }
    Ok(base_fee + tip_cap.min(fee_cap - base_fee))
}

/// Checks that the sender can cover the worst-case cost of the transaction.
fn check_balance(
    gas_price: U256,
    transaction: &Transaction,
    balance: U256,
    eth_compatible: bool,
) -> Result<(), AdmissionError> {
    let unit_price = if eth_compatible && !transaction.gas_fee_cap.is_zero() {
        transaction.gas_fee_cap
    } else {
        gas_price
    };
    let mut required = unit_price
        .checked_mul(U256::from(transaction.gas_limit as u64))
        .ok_or(AdmissionError::BalanceOverflow)?;

    if eth_compatible {
        // An uncoverable top-level transfer is not a consensus error on the
        // native chain. Such a transaction reverts and consumes the sender's
        // gas.
        required =
            required.checked_add(transaction.value).ok_or(AdmissionError::BalanceOverflow)?;
    }

    if let Some(hashes) = &transaction.blob_hashes {
        if !hashes.is_empty() {
            let blob_fee = transaction
                .blob_gas_fee_cap
                .checked_mul(U256::from(hashes.len() as u64 * BLOB_GAS_PER_BLOB))
                .ok_or(AdmissionError::BalanceOverflow)?;
            required = required.checked_add(blob_fee).ok_or(AdmissionError::BalanceOverflow)?;
        }
    }

    if balance < required {
        return Err(AdmissionError::InsufficientBalance { balance, required });
    }
    Ok(())
}

/// The gas charged before execution starts: the base transaction cost plus
/// the input data and access list costs.
fn calculate_setup_gas(transaction: &Transaction, revision: Revision) -> Gas {
    let mut gas = if transaction.is_create() { TX_GAS_CONTRACT_CREATION } else { TX_GAS };

    if !transaction.input.is_empty() {
        let non_zero_bytes = transaction.input.iter().filter(|byte| **byte != 0).count() as Gas;
        let zero_bytes = transaction.input.len() as Gas - non_zero_bytes;

        // No overflow check is required here. The input size needed to
        // overflow this sum is around 10^18 bytes, which no real hardware can
        // deliver.
        gas += zero_bytes * TX_DATA_ZERO_GAS + non_zero_bytes * TX_DATA_NON_ZERO_GAS;

        if transaction.is_create() && revision.is_at_least(Revision::Shanghai) {
            gas += size_in_words(transaction.input.len()) as Gas * INIT_CODE_WORD_GAS;
        }
    }

    if let Some(access_list) = &transaction.access_list {
        gas += access_list.len() as Gas * TX_ACCESS_LIST_ADDRESS_GAS;
        let total_keys: usize = access_list.iter().map(|tuple| tuple.keys.len()).sum();
        gas += total_keys as Gas * TX_ACCESS_LIST_STORAGE_KEY_GAS;
    }

    gas
}

/// Debits the sender for the full gas limit and the blob fee. The balance was
/// checked beforehand.
fn buy_gas(
    transaction: &Transaction,
    gas_price: U256,
    blob_base_fee: U256,
    context: &mut dyn TransactionContext,
) {
    let mut cost = gas_price.saturating_mul(U256::from(transaction.gas_limit as u64));

    if let Some(hashes) = &transaction.blob_hashes {
        if !hashes.is_empty() {
            let blob_fee =
                blob_base_fee.saturating_mul(U256::from(hashes.len() as u64 * BLOB_GAS_PER_BLOB));
            cost = cost.saturating_add(blob_fee);
        }
    }

    let balance = context.get_balance(transaction.sender).saturating_sub(cost);
    context.set_balance(transaction.sender, balance);
}

/// Warms the accounts and storage keys the transaction declares, together
/// with the sender, the recipient, the active precompiles, and (from
/// Shanghai) the coinbase. Transactions without an access list skip this
/// entirely.
fn seed_access_list(
    transaction: &Transaction,
    context: &mut dyn TransactionContext,
    revision: Revision,
    coinbase: Address,
) {
    let Some(access_list) = &transaction.access_list else {
        return;
    };

    context.access_account(transaction.sender);
    if let Some(recipient) = transaction.recipient {
        context.access_account(recipient);
    }
    for address in precompiled_addresses(revision) {
        context.access_account(*address);
    }

    for tuple in access_list {
        context.access_account(tuple.address);
        for key in &tuple.keys {
            context.access_storage(tuple.address, *key);
        }
    }

    if revision.is_at_least(Revision::Shanghai) {
        context.access_account(coinbase);
    }
}

/// Extracts the top-level call parameters from the transaction.
fn call_parameters(transaction: &Transaction, gas: Gas) -> CallParameters {
    CallParameters {
        sender: transaction.sender,
        recipient: transaction.recipient.unwrap_or_default(),
        code_address: transaction.recipient.unwrap_or_default(),
        gas,
        value: transaction.value,
        input: transaction.input.clone(),
        salt: B256::ZERO,
    }
}

/// Returns the excess gas to the sender and, under the Ethereum profile,
/// pays the tip to the coinbase. Reports the gas used by the transaction.
fn return_excess_gas(
    block: &BlockParameters,
    transaction: &Transaction,
    context: &mut dyn TransactionContext,
    gas_price: U256,
    result: &CallResult,
    eth_compatible: bool,
) -> Gas {
    let gas_left = calculate_gas_left(transaction, result, block.revision, eth_compatible);
    refund_gas(context, transaction.sender, gas_price, gas_left);

    let gas_used = transaction.gas_limit - gas_left;
    if eth_compatible {
        pay_coinbase(gas_price, gas_used, block, context);
    }
    gas_used
}

/// The remaining gas after execution, including the capped refund.
///
/// The native profile retains 10% of the remaining gas of every transaction
/// sent by a regular account, successful or not. Transactions from the zero
/// address are internal and keep their full remainder.
fn calculate_gas_left(
    transaction: &Transaction,
    result: &CallResult,
    revision: Revision,
    eth_compatible: bool,
) -> Gas {
    let mut gas_left = result.gas_left;

    if !eth_compatible && transaction.sender != Address::ZERO {
        gas_left -= gas_left / 10;
    }

    if result.success {
        let gas_used = transaction.gas_limit - gas_left;
        // Refunds are capped to a fraction of the gas used: one half before
        // London, one fifth afterwards (EIP-3529).
        let max_refund = if revision.is_at_least(Revision::London) {
            gas_used / 5
        } else {
            gas_used / 2
        };
        gas_left += result.gas_refund.min(max_refund);
    }

    gas_left
}

/// Credits the sender for the gas it did not use.
fn refund_gas(
    context: &mut dyn TransactionContext,
    sender: Address,
    gas_price: U256,
    gas_left: Gas,
) {
    let refund = gas_price.saturating_mul(U256::from(gas_left as u64));
    let balance = context.get_balance(sender).saturating_add(refund);
    context.set_balance(sender, balance);
}

/// Pays the priority fee to the coinbase. Only the Ethereum profile does
/// this.
fn pay_coinbase(
    gas_price: U256,
    gas_used: Gas,
    block: &BlockParameters,
    context: &mut dyn TransactionContext,
) {
    let tip = if block.revision.is_at_least(Revision::London) {
        gas_price.saturating_sub(block.base_fee)
    } else {
        gas_price
    };
    let fee = tip.saturating_mul(U256::from(gas_used as u64));
    let balance = context.get_balance(block.coinbase).saturating_add(fee);
    context.set_balance(block.coinbase, balance);
}

/// The blob gas consumed by the transaction.
fn blob_gas_used(transaction: &Transaction) -> Gas {
    transaction
        .blob_hashes
        .as_ref()
        .map_or(0, |hashes| (hashes.len() as u64 * BLOB_GAS_PER_BLOB) as Gas)
}

/// Constructs a processor around an interpreter implementation.
pub type ProcessorFactory = fn(Box<dyn Interpreter>) -> Box<dyn Processor>;

/// Name of the chain-native processor factory.
pub const EMBER_FACTORY: &str = "ember";
/// Name of the Ethereum-compatible processor factory.
pub const EMBER_ETH_FACTORY: &str = "ember-eth";

fn new_ember_processor(interpreter: Box<dyn Interpreter>) -> Box<dyn Processor> {
    Box::new(EmberProcessor::new(interpreter))
}

fn new_ember_eth_processor(interpreter: Box<dyn Interpreter>) -> Box<dyn Processor> {
    Box::new(EmberProcessor::new_eth_compatible(interpreter))
}

static FACTORIES: Lazy<RwLock<BTreeMap<&'static str, ProcessorFactory>>> = Lazy::new(|| {
    let mut factories = BTreeMap::new();
    factories.insert(EMBER_FACTORY, new_ember_processor as ProcessorFactory);
    factories.insert(EMBER_ETH_FACTORY, new_ember_eth_processor as ProcessorFactory);
    RwLock::new(factories)
});

/// Registers `factory` under `name`.
///
/// The first registration of a name wins; registering the same name again is
/// a no-op, so initialization code may run repeatedly.
pub fn register_processor_factory(name: &'static str, factory: ProcessorFactory) {
    let mut factories = FACTORIES.write().unwrap_or_else(PoisonError::into_inner);
    factories.entry(name).or_insert(factory);
}

/// The processor factory registered under `name`.
pub fn processor_factory(name: &str) -> Option<ProcessorFactory> {
    FACTORIES.read().unwrap_or_else(PoisonError::into_inner).get(name).copied()
}
