//! regwasm reference interpreter.
//!
//! Executes the register bytecode produced by `regwasm-codegen` with
//! WebAssembly MVP semantics. It is the executable reference the generator
//! is tested against: a module run here must behave like the same module
//! run by any conforming WebAssembly engine.
//!
//! Instantiation is deliberately minimal. Host functions are closures,
//! imported tables and memories are created from their declared limits,
//! and there is no host object model.

pub mod error;
pub mod instance;
mod interpreter;
pub mod memory;
pub mod numeric;
pub mod value;

pub use error::{EvalError, EvalResult};
pub use instance::{HostFunc, Imports, Instance, DEFAULT_MAX_CALL_DEPTH};
pub use memory::{LinearMemory, PAGE_SIZE};
pub use value::Value;
