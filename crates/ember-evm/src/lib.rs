//! Transaction processor core of the Ember execution engine.
//!
//! Given a block context, a transaction, and a transactional world state, the
//! processor validates the transaction, charges gas, recursively executes calls
//! and contract creations through an abstract bytecode interpreter, handles
//! reverts via snapshot rollback, applies refunds, and produces a receipt.
//!
//! The interpreter, the world state, and the precompiled contract
//! implementations are collaborators defined only by the traits in this crate.

pub mod constants;

mod context;
pub use context::*;

mod interpreter;
pub use interpreter::*;

mod precompiles;
pub use precompiles::*;

mod processor;
pub use processor::*;

mod result;
pub use result::*;

mod revision;
pub use revision::*;

mod run_context;
pub use run_context::*;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

mod types;
pub use types::*;
