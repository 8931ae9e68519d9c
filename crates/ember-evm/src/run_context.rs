//! Recursive call and create execution for a single transaction.

use alloy_primitives::{keccak256, Address, Bytes, U256};
use delegate::delegate;
use tracing::trace;

use crate::{
    constants::{CREATE_GAS_COST_PER_BYTE, EMPTY_CODE_HASH, MAX_CODE_SIZE, MAX_RECURSIVE_DEPTH},
    is_precompile, AccessStatus, BlockParameters, CallKind, CallParameters, CallResult,
    EmberContext, Hash, Interpreter, InterpreterError, InterpreterParameters, InterpreterResult,
    Key, Log, PrecompileRegistry, Revision, RunContext, Snapshot, StateContractRegistry,
    TransactionContext, TransactionParameters, Word,
};

/// Executes the calls and creates of one transaction.
///
/// The run context tracks the call depth and the static flag across the
/// recursion and enforces the snapshot discipline: a snapshot is taken when a
/// frame is entered and restored on every exit that is not a success. Depth
/// and static flag are saved and restored around each recursive call, so a
/// parent frame never observes the mutations of its children.
///
/// The run context doubles as the world-state handle of the interpreter. It
/// is created at the start of a transaction and discarded at its end.
pub struct TransactionRunContext<'a> {
    context: EmberContext<&'a mut dyn TransactionContext>,
    interpreter: &'a dyn Interpreter,
    precompiles: &'a PrecompileRegistry,
    state_contracts: &'a StateContractRegistry,
    block: BlockParameters,
    transaction: TransactionParameters,
    depth: usize,
    static_mode: bool,
}

impl<'a> TransactionRunContext<'a> {
    /// Creates the run context for a fresh transaction.
    pub fn new(
        context: &'a mut dyn TransactionContext,
        interpreter: &'a dyn Interpreter,
        precompiles: &'a PrecompileRegistry,
        state_contracts: &'a StateContractRegistry,
        block: BlockParameters,
        transaction: TransactionParameters,
    ) -> Self {
        Self {
            context: EmberContext::new(context),
            interpreter,
            precompiles,
            state_contracts,
            block,
            transaction,
            depth: 0,
            static_mode: false,
        }
    }

    fn execute_call(
        &mut self,
        kind: CallKind,
        parameters: CallParameters,
    ) -> Result<CallResult, InterpreterError> {
        if self.depth > MAX_RECURSIVE_DEPTH {
            return Ok(CallResult::aborted(parameters.gas));
        }
        self.depth += 1;
        let parent_static = self.static_mode;
        self.static_mode = self.static_mode || kind == CallKind::StaticCall;

        let snapshot = self.context.create_snapshot();
        let result = self.dispatch_call(kind, parameters);
        if !matches!(&result, Ok(outcome) if outcome.success) {
            self.context.restore_snapshot(snapshot);
        }

        self.static_mode = parent_static;
        self.depth -= 1;
        result
    }

    fn dispatch_call(
        &mut self,
        kind: CallKind,
        parameters: CallParameters,
    ) -> Result<CallResult, InterpreterError> {
        if matches!(kind, CallKind::Call | CallKind::CallCode) {
            if !can_transfer_value(
                &self.context,
                parameters.value,
                parameters.sender,
                Some(&parameters.recipient),
            ) {
                return Ok(CallResult::aborted(parameters.gas));
            }
            transfer_value(&mut self.context, parameters.value, parameters.sender, parameters.recipient);
        }

        if kind == CallKind::Call {
            let state_contracts = self.state_contracts;
            if let Some(contract) = state_contracts.get(parameters.code_address) {
                return Ok(contract.run(
                    &mut self.context,
                    parameters.sender,
                    &parameters.input,
                    parameters.gas,
                ));
            }
        }

        if is_precompile(parameters.code_address, self.block.revision) {
            let outcome = self.precompiles.run(
                self.block.revision,
                &parameters.input,
                parameters.code_address,
                parameters.gas,
            );
            // Metering and execution failures consume the frame's gas.
            return Ok(outcome.unwrap_or_default());
        }

        let result = self.run_interpreter(kind, parameters)?;
        Ok(CallResult::from(result))
    }

    fn execute_create(
        &mut self,
        kind: CallKind,
        parameters: CallParameters,
    ) -> Result<CallResult, InterpreterError> {
        if self.depth > MAX_RECURSIVE_DEPTH {
            return Ok(CallResult::aborted(parameters.gas));
        }
        self.depth += 1;
        let result = self.dispatch_create(kind, parameters);
        self.depth -= 1;
        result
    }

    fn dispatch_create(
        &mut self,
        kind: CallKind,
        parameters: CallParameters,
    ) -> Result<CallResult, InterpreterError> {
        // A failing setup leaves the caller's gas untouched.
        if !self.sender_create_setup(&parameters) {
            return Ok(CallResult::aborted(parameters.gas));
        }

        let created_address = if kind == CallKind::Create2 {
            parameters.sender.create2(parameters.salt, keccak256(&parameters.input))
        } else {
            // The sender nonce was consumed during setup. The derivation uses
            // the value before the bump.
            parameters.sender.create(self.context.get_nonce(parameters.sender) - 1)
        };

        if self.block.revision.is_at_least(Revision::Berlin) {
            self.context.access_account(created_address);
        }

        if !self.is_empty_account(created_address) {
            // The nonce is already consumed, so the frame's gas is too.
            return Ok(CallResult::default());
        }

        // Everything from here on touches the created account. The snapshot
        // reverts those changes on failure; the sender nonce stays consumed.
        let snapshot = self.context.create_snapshot();
        let result = self.instantiate_and_run(kind, parameters, created_address);
        if !matches!(&result, Ok(outcome) if outcome.success) {
            self.context.restore_snapshot(snapshot);
        }
        result
    }

    /// Checks the value transfer and consumes the sender nonce. False when
    /// the create cannot be executed in the current state.
    fn sender_create_setup(&mut self, parameters: &CallParameters) -> bool {
        if !can_transfer_value(
            &self.context,
            parameters.value,
            parameters.sender,
            Some(&parameters.recipient),
        ) {
            return false;
        }
        increment_nonce(&mut self.context, parameters.sender)
    }

    /// An account is instantiable when it has no consumed nonce, no code, and
    /// empty storage.
    fn is_empty_account(&self, address: Address) -> bool {
        let code_hash = self.context.get_code_hash(address);
        self.context.get_nonce(address) == 0
            && self.context.has_empty_storage(address)
            && (code_hash == Hash::ZERO || code_hash == EMPTY_CODE_HASH)
    }

    fn instantiate_and_run(
        &mut self,
        kind: CallKind,
        mut parameters: CallParameters,
        created_address: Address,
    ) -> Result<CallResult, InterpreterError> {
        self.context.create_account(created_address);
        self.context.set_nonce(created_address, 1);
        transfer_value(&mut self.context, parameters.value, parameters.sender, created_address);

        parameters.recipient = created_address;
        let result = self.run_interpreter(kind, parameters)?;
        if !result.success {
            return Ok(CallResult {
                success: false,
                output: result.output,
                gas_left: result.gas_left,
                gas_refund: result.gas_refund,
                created_address: Some(created_address),
            });
        }

        let result = self.check_and_deploy_code(result, created_address);
        Ok(CallResult {
            success: result.success,
            output: result.output,
            gas_left: result.gas_left,
            gas_refund: result.gas_refund,
            created_address: Some(created_address),
        })
    }

    /// Validates the code produced by the init frame and charges the
    /// deployment cost. A failed check zeroes the remaining gas and the
    /// output.
    fn check_and_deploy_code(
        &mut self,
        mut result: InterpreterResult,
        created_address: Address,
    ) -> InterpreterResult {
        if result.output.len() > MAX_CODE_SIZE {
            result.success = false;
        }

        // Code starting with 0xEF is reserved since London (EIP-3541).
        if self.block.revision.is_at_least(Revision::London) && result.output.first() == Some(&0xEF)
        {
            result.success = false;
        }

        let deployment_cost = result.output.len() as i64 * CREATE_GAS_COST_PER_BYTE;
        if result.gas_left < deployment_cost {
            result.success = false;
        }
        result.gas_left -= deployment_cost;

        if result.success {
            self.context.set_code(created_address, result.output.clone());
        } else {
            result.gas_left = 0;
            result.output = Bytes::new();
        }
        result
    }

    fn run_interpreter(
        &mut self,
        kind: CallKind,
        mut parameters: CallParameters,
    ) -> Result<InterpreterResult, InterpreterError> {
        let (code, code_hash) = match kind {
            CallKind::Call | CallKind::StaticCall => (
                self.context.get_code(parameters.recipient),
                self.context.get_code_hash(parameters.recipient),
            ),
            CallKind::CallCode | CallKind::DelegateCall => (
                self.context.get_code(parameters.code_address),
                self.context.get_code_hash(parameters.code_address),
            ),
            CallKind::Create | CallKind::Create2 => {
                // A create frame executes its payload as code.
                let code = core::mem::take(&mut parameters.input);
                let code_hash = keccak256(&code);
                (code, code_hash)
            }
        };

        let interpreter_parameters = InterpreterParameters {
            block: self.block,
            transaction: self.transaction.clone(),
            kind,
            is_static: self.static_mode,
            // The frame counter was already advanced for this frame.
            depth: self.depth - 1,
            gas: parameters.gas,
            recipient: parameters.recipient,
            sender: parameters.sender,
            input: parameters.input,
            value: parameters.value,
            code_hash,
            code,
        };

        let interpreter = self.interpreter;
        interpreter.run(interpreter_parameters, self)
    }
}

impl RunContext for TransactionRunContext<'_> {
    fn call(
        &mut self,
        kind: CallKind,
        parameters: CallParameters,
    ) -> Result<CallResult, InterpreterError> {
        trace!(?kind, depth = self.depth, gas = parameters.gas, "executing frame");
        if kind.is_create() {
            self.execute_create(kind, parameters)
        } else {
            self.execute_call(kind, parameters)
        }
    }
}

impl TransactionContext for TransactionRunContext<'_> {
    delegate! {
        to self.context {
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
            fn self_destruct(&mut self, address: Address, beneficiary: Address) -> bool;
            fn has_self_destructed(&self, address: Address) -> bool;
            fn get_block_hash(&self, number: u64) -> Hash;
        }
    }
}

/// Checks that `value` can move from `sender` to `recipient` without
/// underflowing the sender or overflowing the recipient.
fn can_transfer_value<C: TransactionContext>(
    context: &C,
    value: U256,
    sender: Address,
    recipient: Option<&Address>,
) -> bool {
    if value.is_zero() {
        return true;
    }
    if context.get_balance(sender) < value {
        return false;
    }
    let Some(recipient) = recipient else {
        return true;
    };
    if sender == *recipient {
        return true;
    }
    context.get_balance(*recipient).checked_add(value).is_some()
}

/// Moves `value` from `sender` to `recipient`. Only to be called after
/// [`can_transfer_value`].
fn transfer_value<C: TransactionContext>(
    context: &mut C,
    value: U256,
    sender: Address,
    recipient: Address,
) {
    if value.is_zero() || sender == recipient {
        return;
    }
    let sender_balance = context.get_balance(sender).saturating_sub(value);
    let recipient_balance = context.get_balance(recipient).saturating_add(value);
    context.set_balance(sender, sender_balance);
    context.set_balance(recipient, recipient_balance);
}

/// Advances the account nonce. False on overflow.
fn increment_nonce<C: TransactionContext>(context: &mut C, address: Address) -> bool {
    let nonce = context.get_nonce(address);
    let Some(next) = nonce.checked_add(1) else {
        return false;
    };
    context.set_nonce(address, next);
    true
}
