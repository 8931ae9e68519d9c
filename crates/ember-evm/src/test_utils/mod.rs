//! Test utilities for the Ember processor.

mod context;
pub use context::*;

mod interpreter;
pub use interpreter::*;

mod precompile;
pub use precompile::*;
