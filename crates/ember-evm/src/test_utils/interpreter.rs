use std::sync::Mutex;

use crate::{Interpreter, InterpreterError, InterpreterParameters, InterpreterResult, RunContext};

/// An interpreter that answers every run with a fixed result and records the
/// parameters it received.
#[derive(Debug)]
pub struct MockInterpreter {
    result: Result<InterpreterResult, InterpreterError>,
    calls: Mutex<Vec<InterpreterParameters>>,
}

impl MockInterpreter {
    /// An interpreter answering every run with `result`.
    pub fn returning(result: InterpreterResult) -> Self {
        Self { result: Ok(result), calls: Mutex::new(Vec::new()) }
    }

    /// An interpreter answering every run with a successful result that
    /// consumes the whole gas budget.
    pub fn succeeding() -> Self {
        Self::returning(InterpreterResult { success: true, ..InterpreterResult::default() })
    }

    /// An interpreter failing every run with `error`.
    pub fn failing(error: InterpreterError) -> Self {
        Self { result: Err(error), calls: Mutex::new(Vec::new()) }
    }

    /// The parameters of every run so far, in invocation order.
    pub fn calls(&self) -> Vec<InterpreterParameters> {
        self.calls.lock().unwrap().clone()
    }

    /// The number of runs so far.
    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

impl Interpreter for MockInterpreter {
    fn run(
        &self,
        parameters: InterpreterParameters,
        _context: &mut dyn RunContext,
    ) -> Result<InterpreterResult, InterpreterError> {
        self.calls.lock().unwrap().push(parameters);
        self.result.clone()
    }
}

/// An interpreter driven by a closure, for tests that re-enter the run
/// context.
pub struct FnInterpreter<F>(pub F);

impl<F> Interpreter for FnInterpreter<F>
where
    F: Fn(InterpreterParameters, &mut dyn RunContext) -> Result<InterpreterResult, InterpreterError>
        + Send
        + Sync,
{
    fn run(
        &self,
        parameters: InterpreterParameters,
        context: &mut dyn RunContext,
    ) -> Result<InterpreterResult, InterpreterError> {
        (self.0)(parameters, context)
    }
}
