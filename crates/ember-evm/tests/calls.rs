//! Tests of call dispatch: kind handling, depth and static propagation,
//! snapshot rollback, and precompile interception.

use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc, Mutex,
};

use alloy_primitives::{address, b256, keccak256, Address, Bytes, U256};
use ember_evm::{
    test_utils::{FnInterpreter, MemoryContext, MockInterpreter, StaticPrecompile},
    BlockParameters, CallKind, CallParameters, CallResult, InterpreterError,
    InterpreterParameters, InterpreterResult, PrecompileRegistry, Revision, RunContext,
    StateContract, StateContractRegistry, TransactionContext, TransactionParameters,
    TransactionRunContext,
};

const CALLER: Address = address!("0x1000000000000000000000000000000000000001");
const CALLEE: Address = address!("0x2000000000000000000000000000000000000002");
const CODE_SOURCE: Address = address!("0x3000000000000000000000000000000000000003");

fn block() -> BlockParameters {
    BlockParameters { revision: Revision::Cancun, ..BlockParameters::default() }
}

fn call_parameters(kind_gas: i64) -> CallParameters {
    CallParameters {
        sender: CALLER,
        recipient: CALLEE,
        code_address: CALLEE,
        gas: kind_gas,
        ..CallParameters::default()
    }
}

#[test]
fn call_kinds_select_the_executed_code() {
    let callee_code = Bytes::from_static(&[0x11]);
    let source_code = Bytes::from_static(&[0x22]);

    let cases = [
        (CallKind::Call, callee_code.clone()),
        (CallKind::StaticCall, callee_code.clone()),
        (CallKind::CallCode, source_code.clone()),
        (CallKind::DelegateCall, source_code.clone()),
    ];

    for (kind, expected_code) in cases {
        let mut context = MemoryContext::new()
            .with_code(CALLEE, callee_code.clone())
            .with_code(CODE_SOURCE, source_code.clone());
        let interpreter = MockInterpreter::succeeding();
        let precompiles = PrecompileRegistry::new();
        let state_contracts = StateContractRegistry::new();
        let mut run_context = TransactionRunContext::new(
            &mut context,
            &interpreter,
            &precompiles,
            &state_contracts,
            block(),
            TransactionParameters::default(),
        );

        let parameters =
            CallParameters { code_address: CODE_SOURCE, ..call_parameters(10_000) };
        run_context.call(kind, parameters).unwrap();
        drop(run_context);

        let calls = interpreter.calls();
        assert_eq!(calls.len(), 1, "{kind:?}");
        assert_eq!(calls[0].code, expected_code, "{kind:?}");
        assert_eq!(calls[0].code_hash, keccak256(&expected_code), "{kind:?}");
        assert_eq!(calls[0].recipient, CALLEE, "{kind:?}");
        assert_eq!(calls[0].depth, 0, "{kind:?}");
    }
}

#[test]
fn value_moves_for_call_and_call_code_only() {
    for (kind, moved) in [
        (CallKind::Call, true),
        (CallKind::CallCode, true),
        (CallKind::DelegateCall, false),
        (CallKind::StaticCall, false),
    ] {
        let mut context = MemoryContext::new().with_balance(CALLER, U256::from(100));
        let interpreter = MockInterpreter::succeeding();
        let precompiles = PrecompileRegistry::new();
        let state_contracts = StateContractRegistry::new();
        let mut run_context = TransactionRunContext::new(
            &mut context,
            &interpreter,
            &precompiles,
            &state_contracts,
            block(),
            TransactionParameters::default(),
        );

        let parameters = CallParameters { value: U256::from(40), ..call_parameters(10_000) };
        let result = run_context.call(kind, parameters).unwrap();
        drop(run_context);

        assert!(result.success, "{kind:?}");
        let expected = if moved { U256::from(40) } else { U256::ZERO };
        assert_eq!(context.get_balance(CALLEE), expected, "{kind:?}");
    }
}

#[test]
fn an_uncoverable_value_fails_the_call_without_consuming_gas() {
    let mut context = MemoryContext::new().with_balance(CALLER, U256::from(10));
    let interpreter = MockInterpreter::succeeding();
    let precompiles = PrecompileRegistry::new();
    let state_contracts = StateContractRegistry::new();
    let mut run_context = TransactionRunContext::new(
        &mut context,
        &interpreter,
        &precompiles,
        &state_contracts,
        block(),
        TransactionParameters::default(),
    );

    let parameters = CallParameters { value: U256::from(11), ..call_parameters(10_000) };
    let result = run_context.call(CallKind::Call, parameters).unwrap();
    drop(run_context);

    assert!(!result.success);
    assert_eq!(result.gas_left, 10_000);
    assert_eq!(interpreter.call_count(), 0);
    assert_eq!(context.get_balance(CALLER), U256::from(10));
}

#[test]
fn recursion_stops_at_the_depth_limit() {
    // Deep recursion needs more stack than the default test thread offers.
    std::thread::Builder::new()
        .stack_size(64 * 1024 * 1024)
        .spawn(|| {
            let frames = Arc::new(AtomicUsize::new(0));
            let observed = Arc::clone(&frames);
            let deepest_failure = Arc::new(Mutex::new(None));
            let failure_probe = Arc::clone(&deepest_failure);

            let interpreter = FnInterpreter(
                move |parameters: InterpreterParameters,
                      context: &mut dyn RunContext|
                      -> Result<InterpreterResult, InterpreterError> {
                    observed.fetch_add(1, Ordering::Relaxed);
                    let nested = context.call(CallKind::Call, CallParameters {
                        sender: parameters.recipient,
                        recipient: parameters.recipient,
                        code_address: parameters.recipient,
                        gas: parameters.gas,
                        ..CallParameters::default()
                    })?;
                    if !nested.success {
                        *failure_probe.lock().unwrap() =
                            Some((parameters.depth, nested.gas_left));
                    }
                    Ok(InterpreterResult {
                        success: true,
                        gas_left: parameters.gas,
                        ..InterpreterResult::default()
                    })
                },
            );

            let mut context = MemoryContext::new();
            let precompiles = PrecompileRegistry::new();
            let state_contracts = StateContractRegistry::new();
            let mut run_context = TransactionRunContext::new(
                &mut context,
                &interpreter,
                &precompiles,
                &state_contracts,
                block(),
                TransactionParameters::default(),
            );

            let result = run_context.call(CallKind::Call, call_parameters(5_000)).unwrap();

            assert!(result.success);
            // Frames run at depths 0 through 1024; the next call is refused.
            assert_eq!(frames.load(Ordering::Relaxed), 1025);
            // The refused call failed without touching its gas budget.
            assert_eq!(*deepest_failure.lock().unwrap(), Some((1024, 5_000)));
        })
        .unwrap()
        .join()
        .unwrap();
}

#[test]
fn the_static_flag_sticks_for_nested_frames() {
    let observations = Arc::new(Mutex::new(Vec::new()));
    let recorder = Arc::clone(&observations);

    let interpreter = FnInterpreter(
        move |parameters: InterpreterParameters,
              context: &mut dyn RunContext|
              -> Result<InterpreterResult, InterpreterError> {
            recorder.lock().unwrap().push((parameters.depth, parameters.is_static));
            let next_kind = match parameters.depth {
                0 => Some(CallKind::StaticCall),
                // A plain call below a static one stays static.
                1 => Some(CallKind::Call),
                _ => None,
            };
            if let Some(kind) = next_kind {
                context.call(kind, CallParameters {
                    sender: parameters.recipient,
                    recipient: parameters.recipient,
                    code_address: parameters.recipient,
                    gas: parameters.gas,
                    ..CallParameters::default()
                })?;
            }
            Ok(InterpreterResult {
                success: true,
                gas_left: parameters.gas,
                ..InterpreterResult::default()
            })
        },
    );

    let mut context = MemoryContext::new();
    let precompiles = PrecompileRegistry::new();
    let state_contracts = StateContractRegistry::new();
    let mut run_context = TransactionRunContext::new(
        &mut context,
        &interpreter,
        &precompiles,
        &state_contracts,
        block(),
        TransactionParameters::default(),
    );

    let result = run_context.call(CallKind::Call, call_parameters(10_000)).unwrap();

    assert!(result.success);
    assert_eq!(*observations.lock().unwrap(), vec![(0, false), (1, true), (2, true)]);
}

#[test]
fn failed_sub_calls_are_rolled_back() {
    let key_kept = b256!("0x0000000000000000000000000000000000000000000000000000000000000001");
    let key_dropped = b256!("0x0000000000000000000000000000000000000000000000000000000000000002");
    let value = b256!("0x00000000000000000000000000000000000000000000000000000000000000ff");

    let interpreter = FnInterpreter(
        move |parameters: InterpreterParameters,
              context: &mut dyn RunContext|
              -> Result<InterpreterResult, InterpreterError> {
            if parameters.depth == 0 {
                context.set_storage(parameters.recipient, key_kept, value);
                let nested = context.call(CallKind::Call, CallParameters {
                    sender: parameters.recipient,
                    recipient: parameters.recipient,
                    code_address: parameters.recipient,
                    gas: parameters.gas,
                    ..CallParameters::default()
                })?;
                assert!(!nested.success);
                // The nested mutation is gone as soon as the frame reverts.
                assert_eq!(context.get_storage(parameters.recipient, key_dropped), alloy_primitives::B256::default());
                Ok(InterpreterResult {
                    success: true,
                    gas_left: parameters.gas,
                    ..InterpreterResult::default()
                })
            } else {
                context.set_storage(parameters.recipient, key_dropped, value);
                Ok(InterpreterResult::default())
            }
        },
    );

    let mut context = MemoryContext::new();
    let precompiles = PrecompileRegistry::new();
    let state_contracts = StateContractRegistry::new();
    let mut run_context = TransactionRunContext::new(
        &mut context,
        &interpreter,
        &precompiles,
        &state_contracts,
        block(),
        TransactionParameters::default(),
    );

    let result = run_context.call(CallKind::Call, call_parameters(10_000)).unwrap();
    drop(run_context);

    assert!(result.success);
    assert_eq!(context.get_storage(CALLEE, key_kept), value);
    assert_eq!(context.get_storage(CALLEE, key_dropped), alloy_primitives::B256::default());
}

#[test]
fn interpreter_errors_propagate_and_roll_back() {
    let interpreter = FnInterpreter(
        |parameters: InterpreterParameters,
         context: &mut dyn RunContext|
         -> Result<InterpreterResult, InterpreterError> {
            context.set_nonce(parameters.recipient, 77);
            Err(InterpreterError::Internal("stack corruption".to_string()))
        },
    );

    let mut context = MemoryContext::new();
    let precompiles = PrecompileRegistry::new();
    let state_contracts = StateContractRegistry::new();
    let mut run_context = TransactionRunContext::new(
        &mut context,
        &interpreter,
        &precompiles,
        &state_contracts,
        block(),
        TransactionParameters::default(),
    );

    let result = run_context.call(CallKind::Call, call_parameters(10_000));
    drop(run_context);

    assert_eq!(result, Err(InterpreterError::Internal("stack corruption".to_string())));
    assert_eq!(context.get_nonce(CALLEE), 0);
    assert_eq!(context.snapshot_count(), 0);
}

#[test]
fn precompiles_intercept_calls_by_code_address() {
    let identity = Address::with_last_byte(0x04);
    let precompiles = PrecompileRegistry::new()
        .with_contract(identity, Arc::new(StaticPrecompile::new(15, Bytes::from_static(&[0xdd]))));

    let mut context = MemoryContext::new();
    let interpreter = MockInterpreter::succeeding();
    let state_contracts = StateContractRegistry::new();
    let mut run_context = TransactionRunContext::new(
        &mut context,
        &interpreter,
        &precompiles,
        &state_contracts,
        block(),
        TransactionParameters::default(),
    );

    let parameters = CallParameters { code_address: identity, ..call_parameters(100) };
    let result = run_context.call(CallKind::Call, parameters).unwrap();

    assert!(result.success);
    assert_eq!(result.gas_left, 85);
    assert_eq!(result.output, Bytes::from_static(&[0xdd]));
    assert_eq!(interpreter.call_count(), 0);
}

#[test]
fn unimplemented_precompiles_fail_and_consume_the_gas() {
    let ecrecover = Address::with_last_byte(0x01);

    let mut context = MemoryContext::new().with_balance(CALLER, U256::from(100));
    let interpreter = MockInterpreter::succeeding();
    let precompiles = PrecompileRegistry::new();
    let state_contracts = StateContractRegistry::new();
    let mut run_context = TransactionRunContext::new(
        &mut context,
        &interpreter,
        &precompiles,
        &state_contracts,
        block(),
        TransactionParameters::default(),
    );

    let parameters = CallParameters {
        code_address: ecrecover,
        value: U256::from(40),
        ..call_parameters(10_000)
    };
    let result = run_context.call(CallKind::Call, parameters).unwrap();
    drop(run_context);

    assert!(!result.success);
    assert_eq!(result.gas_left, 0);
    assert_eq!(interpreter.call_count(), 0);
    // The value transfer was rolled back with the failing frame.
    assert_eq!(context.get_balance(CALLER), U256::from(100));
    assert_eq!(context.get_balance(CALLEE), U256::ZERO);
}

#[test]
fn precompile_dispatch_respects_the_revision() {
    let kzg_point_evaluation = Address::with_last_byte(0x0a);
    let precompiles = PrecompileRegistry::new().with_contract(
        kzg_point_evaluation,
        Arc::new(StaticPrecompile::new(50_000, Bytes::new())),
    );

    // Before Cancun the address is plain code space, so the interpreter runs.
    let mut context = MemoryContext::new();
    let interpreter = MockInterpreter::succeeding();
    let state_contracts = StateContractRegistry::new();
    let mut run_context = TransactionRunContext::new(
        &mut context,
        &interpreter,
        &precompiles,
        &state_contracts,
        BlockParameters { revision: Revision::London, ..BlockParameters::default() },
        TransactionParameters::default(),
    );

    let parameters =
        CallParameters { code_address: kzg_point_evaluation, ..call_parameters(100_000) };
    let result = run_context.call(CallKind::Call, parameters).unwrap();

    assert!(result.success);
    assert_eq!(interpreter.call_count(), 1);
}

struct EchoStateContract;

impl StateContract for EchoStateContract {
    fn run(
        &self,
        context: &mut dyn TransactionContext,
        sender: Address,
        input: &[u8],
        gas: i64,
    ) -> CallResult {
        context.set_nonce(sender, 99);
        CallResult {
            success: true,
            output: Bytes::copy_from_slice(input),
            gas_left: gas - 7,
            gas_refund: 0,
            created_address: None,
        }
    }
}

#[test]
fn state_contracts_intercept_plain_calls_only() {
    let native = address!("0xfc00000000000000000000000000000000000000");
    let state_contracts =
        StateContractRegistry::new().with_contract(native, Arc::new(EchoStateContract));
    let precompiles = PrecompileRegistry::new();

    // A plain call is handled by the state contract.
    let mut context = MemoryContext::new();
    let interpreter = MockInterpreter::succeeding();
    let mut run_context = TransactionRunContext::new(
        &mut context,
        &interpreter,
        &precompiles,
        &state_contracts,
        block(),
        TransactionParameters::default(),
    );
    let parameters = CallParameters {
        code_address: native,
        input: Bytes::from_static(&[0x01, 0x02]),
        ..call_parameters(1_000)
    };
    let result = run_context.call(CallKind::Call, parameters.clone()).unwrap();
    drop(run_context);

    assert!(result.success);
    assert_eq!(result.gas_left, 993);
    assert_eq!(result.output, Bytes::from_static(&[0x01, 0x02]));
    assert_eq!(context.get_nonce(CALLER), 99);
    assert_eq!(interpreter.call_count(), 0);

    // A static call to the same address goes to the interpreter instead.
    let mut context = MemoryContext::new();
    let interpreter = MockInterpreter::succeeding();
    let mut run_context = TransactionRunContext::new(
        &mut context,
        &interpreter,
        &precompiles,
        &state_contracts,
        block(),
        TransactionParameters::default(),
    );
    run_context.call(CallKind::StaticCall, parameters).unwrap();
    assert_eq!(interpreter.call_count(), 1);
}
