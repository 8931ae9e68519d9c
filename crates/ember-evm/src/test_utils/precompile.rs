use alloy_primitives::Bytes;

use crate::Precompile;

/// A precompiled contract with a fixed gas cost and output.
#[derive(Clone, Debug)]
pub struct StaticPrecompile {
    gas: u64,
    output: Bytes,
}

impl StaticPrecompile {
    /// A contract charging `gas` and returning `output` for every input.
    pub fn new(gas: u64, output: Bytes) -> Self {
        Self { gas, output }
    }
}

impl Precompile for StaticPrecompile {
    fn required_gas(&self, _input: &[u8]) -> u64 {
        self.gas
    }

    fn run(&self, _input: &[u8]) -> Result<Bytes, String> {
        Ok(self.output.clone())
    }
}

/// A precompiled contract whose execution always fails.
#[derive(Clone, Debug)]
pub struct FailingPrecompile {
    gas: u64,
}

impl FailingPrecompile {
    /// A contract charging `gas` and then failing.
    pub fn new(gas: u64) -> Self {
        Self { gas }
    }
}

impl Precompile for FailingPrecompile {
    fn required_gas(&self, _input: &[u8]) -> u64 {
        self.gas
    }

    fn run(&self, _input: &[u8]) -> Result<Bytes, String> {
        Err("contract failure".to_string())
    }
}
