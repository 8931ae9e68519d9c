//! Contract between the processor and the bytecode interpreter.

use alloy_primitives::{Address, Bytes, B256, U256};
use auto_impl::auto_impl;

use crate::{
    BlockParameters, CallKind, CallParameters, CallResult, Gas, InterpreterError,
    InterpreterResult, TransactionContext, TransactionParameters,
};

/// Everything an interpreter needs to execute one frame of code.
///
/// The world state and the ability to spawn nested frames are passed alongside
/// as a [`RunContext`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct InterpreterParameters {
    /// The block-level execution environment.
    pub block: BlockParameters,
    /// The transaction-level execution environment.
    pub transaction: TransactionParameters,
    /// The kind of the frame.
    pub kind: CallKind,
    /// True when state-mutating instructions must be rejected.
    pub is_static: bool,
    /// The call depth of the frame. The top-level frame runs at depth zero.
    pub depth: usize,
    /// The gas budget of the frame.
    pub gas: Gas,
    /// The account whose state the frame executes against.
    pub recipient: Address,
    /// The account that initiated the frame.
    pub sender: Address,
    /// The input data of the frame. Empty for create frames, whose payload is
    /// the code itself.
    pub input: Bytes,
    /// The amount of network currency transferred with the frame.
    pub value: U256,
    /// The code to execute.
    pub code: Bytes,
    /// The Keccak-256 hash of the code to execute.
    pub code_hash: B256,
}

/// The world as seen by a running interpreter: the full transaction context
/// plus the ability to execute nested frames.
pub trait RunContext: TransactionContext {
    /// Executes a nested call or create frame.
    ///
    /// Depth tracking, static propagation, value transfer, and snapshot
    /// rollback are handled here. A frame that cannot make progress (depth
    /// exhausted, value not coverable) reports failure through
    /// [`CallResult::success`]; an `Err` indicates an engine fault.
    fn call(
        &mut self,
        kind: CallKind,
        parameters: CallParameters,
    ) -> Result<CallResult, InterpreterError>;
}

/// A bytecode interpreter.
///
/// Implementations must honor [`InterpreterParameters::is_static`] by
/// rejecting state-mutating instructions, and must respect the gas budget:
/// gas only ever decreases, which bounds execution to a finite number of
/// steps.
#[auto_impl(&, Box, Arc)]
pub trait Interpreter: Send + Sync {
    /// Runs one frame of code to completion.
    ///
    /// A revert is a successful run with
    /// [`InterpreterResult::success`] set to false. An `Err` is reserved for
    /// engine faults and unsupported revisions.
    fn run(
        &self,
        parameters: InterpreterParameters,
        context: &mut dyn RunContext,
    ) -> Result<InterpreterResult, InterpreterError>;
}
