//! Precompiled and state contract dispatch.
//!
//! The canonical precompile address sets are compiled in per revision. The
//! implementations behind those addresses are collaborators registered by the
//! embedding host, as are the chain-native state contracts.

use core::fmt;
use std::{collections::BTreeMap, sync::Arc};

use alloy_primitives::{Address, Bytes};
use auto_impl::auto_impl;

use crate::{CallResult, Gas, PrecompileError, Revision, TransactionContext};

/// A precompiled contract.
///
/// Precompiles are pure functions of their input. Gas metering happens in the
/// [`PrecompileRegistry`], not in the contract itself.
#[auto_impl(&, Box, Arc)]
pub trait Precompile: Send + Sync {
    /// The gas required to process `input`.
    fn required_gas(&self, input: &[u8]) -> u64;
    /// Executes the contract.
    fn run(&self, input: &[u8]) -> Result<Bytes, String>;
}

/// A chain-native contract backed by processor logic rather than bytecode.
#[auto_impl(&, Box, Arc)]
pub trait StateContract: Send + Sync {
    /// Executes the contract against the transaction context.
    fn run(
        &self,
        context: &mut dyn TransactionContext,
        sender: Address,
        input: &[u8],
        gas: Gas,
    ) -> CallResult;
}

const fn precompile_range<const N: usize>() -> [Address; N] {
    let mut addresses = [Address::ZERO; N];
    let mut i = 0;
    while i < N {
        addresses[i] = Address::with_last_byte(i as u8 + 1);
        i += 1;
    }
    addresses
}

/// Precompiled contract addresses active since Istanbul (0x01 through 0x09).
static ISTANBUL_PRECOMPILES: [Address; 9] = precompile_range();
/// Cancun adds the KZG point evaluation contract at 0x0a.
static CANCUN_PRECOMPILES: [Address; 10] = precompile_range();
/// Prague adds the BLS12-381 operations at 0x0b through 0x11.
static PRAGUE_PRECOMPILES: [Address; 17] = precompile_range();

/// The addresses of the precompiled contracts active in `revision`.
pub fn precompiled_addresses(revision: Revision) -> &'static [Address] {
    if revision.is_at_least(Revision::Prague) {
        &PRAGUE_PRECOMPILES
    } else if revision.is_at_least(Revision::Cancun) {
        &CANCUN_PRECOMPILES
    } else {
        &ISTANBUL_PRECOMPILES
    }
}

/// True when `address` hosts a precompiled contract in `revision`.
pub fn is_precompile(address: Address, revision: Revision) -> bool {
    precompiled_addresses(revision).contains(&address)
}

/// Implementations of the precompiled contracts, keyed by address.
///
/// Dispatch and access-list seeding are driven by the compiled-in address
/// sets. Running an address from the active set without a registered
/// implementation fails with [`PrecompileError::NotFound`], which the run
/// context surfaces as an unsuccessful call.
#[derive(Clone, Default)]
pub struct PrecompileRegistry {
    contracts: BTreeMap<Address, Arc<dyn Precompile>>,
}

impl PrecompileRegistry {
    /// A registry without any registered implementations.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `contract` at `address`, replacing any previous
    /// registration.
    pub fn register(&mut self, address: Address, contract: Arc<dyn Precompile>) {
        self.contracts.insert(address, contract);
    }

    /// Builder-style [`register`](Self::register).
    pub fn with_contract(mut self, address: Address, contract: Arc<dyn Precompile>) -> Self {
        self.register(address, contract);
        self
    }

    /// Runs the precompiled contract at `address` against `input`.
    ///
    /// The required gas is computed first and checked against the signed gas
    /// domain before it is deducted. Adversarial inputs can otherwise drive
    /// the cost computation past `i64::MAX` and corrupt the accounting.
    pub fn run(
        &self,
        revision: Revision,
        input: &[u8],
        address: Address,
        gas: Gas,
    ) -> Result<CallResult, PrecompileError> {
        if !is_precompile(address, revision) {
            return Err(PrecompileError::NotFound);
        }
        let contract = self.contracts.get(&address).ok_or(PrecompileError::NotFound)?;

        let cost = contract.required_gas(input);
        if cost > i64::MAX as u64 {
            return Err(PrecompileError::GasCostOverflow);
        }
        if gas < cost as Gas {
            return Err(PrecompileError::InsufficientGas);
        }
        let gas_left = gas - cost as Gas;

        let output = contract.run(input).map_err(PrecompileError::Execution)?;
        Ok(CallResult { success: true, output, gas_left, gas_refund: 0, created_address: None })
    }
}

impl fmt::Debug for PrecompileRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PrecompileRegistry")
            .field("contracts", &self.contracts.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// State contracts keyed by address. Empty unless the embedding chain
/// registers any.
#[derive(Clone, Default)]
pub struct StateContractRegistry {
    contracts: BTreeMap<Address, Arc<dyn StateContract>>,
}

impl StateContractRegistry {
    /// A registry without any registered contracts.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `contract` at `address`, replacing any previous
    /// registration.
    pub fn register(&mut self, address: Address, contract: Arc<dyn StateContract>) {
        self.contracts.insert(address, contract);
    }

    /// Builder-style [`register`](Self::register).
    pub fn with_contract(mut self, address: Address, contract: Arc<dyn StateContract>) -> Self {
        self.register(address, contract);
        self
    }

    /// The contract registered at `address`, if any.
    pub fn get(&self, address: Address) -> Option<&Arc<dyn StateContract>> {
        self.contracts.get(&address)
    }

    /// True when a state contract is registered at `address`.
    pub fn is_state_contract(&self, address: Address) -> bool {
        self.contracts.contains_key(&address)
    }
}

impl fmt::Debug for StateContractRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateContractRegistry")
            .field("contracts", &self.contracts.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use alloy_primitives::{address, bytes};

    use super::*;
    use crate::test_utils::{FailingPrecompile, StaticPrecompile};

    #[test]
    fn address_sets_grow_with_the_revision() {
        assert_eq!(precompiled_addresses(Revision::Istanbul).len(), 9);
        assert_eq!(precompiled_addresses(Revision::Berlin).len(), 9);
        assert_eq!(precompiled_addresses(Revision::Shanghai).len(), 9);
        assert_eq!(precompiled_addresses(Revision::Cancun).len(), 10);
        assert_eq!(precompiled_addresses(Revision::Prague).len(), 17);
    }

    #[test]
    fn membership_depends_on_the_revision() {
        let kzg_point_evaluation = Address::with_last_byte(0x0a);
        assert!(!is_precompile(kzg_point_evaluation, Revision::Shanghai));
        assert!(is_precompile(kzg_point_evaluation, Revision::Cancun));

        let bls_g1_add = Address::with_last_byte(0x0b);
        assert!(!is_precompile(bls_g1_add, Revision::Cancun));
        assert!(is_precompile(bls_g1_add, Revision::Prague));

        assert!(!is_precompile(Address::ZERO, Revision::Prague));
        assert!(!is_precompile(
            address!("0x1200000000000000000000000000000000000000"),
            Revision::Prague
        ));
    }

    #[test]
    fn metering_deducts_the_required_gas() {
        let sha256 = Address::with_last_byte(0x02);
        let registry = PrecompileRegistry::new()
            .with_contract(sha256, Arc::new(StaticPrecompile::new(60, bytes!("0xbeef"))));

        let result = registry.run(Revision::Cancun, &[], sha256, 100).unwrap();
        assert!(result.success);
        assert_eq!(result.gas_left, 40);
        assert_eq!(result.output, bytes!("0xbeef"));
    }

    #[test]
    fn metering_rejects_insufficient_gas() {
        let sha256 = Address::with_last_byte(0x02);
        let registry = PrecompileRegistry::new()
            .with_contract(sha256, Arc::new(StaticPrecompile::new(60, Bytes::new())));

        let result = registry.run(Revision::Cancun, &[], sha256, 59);
        assert_eq!(result, Err(PrecompileError::InsufficientGas));
    }

    #[test]
    fn metering_detects_gas_cost_overflow() {
        let modexp = Address::with_last_byte(0x05);
        let registry = PrecompileRegistry::new()
            .with_contract(modexp, Arc::new(StaticPrecompile::new(u64::MAX, Bytes::new())));

        let result = registry.run(Revision::Cancun, &[], modexp, i64::MAX);
        assert_eq!(result, Err(PrecompileError::GasCostOverflow));
    }

    #[test]
    fn execution_failures_are_reported() {
        let blake2f = Address::with_last_byte(0x09);
        let registry = PrecompileRegistry::new()
            .with_contract(blake2f, Arc::new(FailingPrecompile::new(10)));

        let result = registry.run(Revision::Cancun, &[], blake2f, 100);
        assert!(matches!(result, Err(PrecompileError::Execution(_))));
    }

    #[test]
    fn unregistered_addresses_are_not_found() {
        let registry = PrecompileRegistry::new();

        let in_set = registry.run(Revision::Cancun, &[], Address::with_last_byte(0x01), 100);
        assert_eq!(in_set, Err(PrecompileError::NotFound));

        let outside_set = registry.run(Revision::Shanghai, &[], Address::with_last_byte(0x0a), 100);
        assert_eq!(outside_set, Err(PrecompileError::NotFound));
    }
}
