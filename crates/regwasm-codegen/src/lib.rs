//! regwasm bytecode generator: WebAssembly function bodies to register
//! bytecode.
//!
//! # Architecture
//!
//! The generator makes a single pass over each function body, pulling one
//! operator at a time from an [`regwasm_reader::ExprReader`]:
//!
//! - [`eval_stack`] mirrors the validation stack symbolically, one register
//!   per value, with scope limits per block.
//! - [`registers`] hands out virtual registers from four per-type spaces.
//!   Register 0 holds return values, locals come next, temporaries last.
//! - [`emitter`] appends instructions and resolves labels.
//! - [`generator`] and [`expr`] lower control flow and operators.
//! - [`header`] computes display names and argument layouts for every
//!   function before any body is generated.
//! - [`module`] runs the section loop and drives everything else.
//!
//! Generated code reaches the module environment through fixed slots: slot
//! 0 is the linear memory, then one slot per function, the table, then one
//! slot per global.

pub mod compiled;
pub mod emitter;
pub mod eval_stack;
pub mod expr;
pub mod generator;
pub mod header;
pub mod module;
pub mod registers;

pub use compiled::{CompiledFunction, CompiledModule};
pub use generator::FunctionGenerator;
pub use header::{build_headers, display_name, FunctionHeader};
pub use module::{generate_module, prepare_module, PreparedModule};
pub use registers::FrameLayout;
