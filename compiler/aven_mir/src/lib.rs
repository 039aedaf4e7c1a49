//! Aven MIR - the typed intermediate representation of the Aven compiler.
//!
//! This crate turns a resolved module (`SourceModule` + `TypedModule`) into
//! a graph of basic blocks over virtual registers, one [`IrUnit`] per
//! method, closure or module body. Exception handling is explicit: guarded
//! ranges are delimited by `CatchStart`/`CatchEnd` markers and dispatched
//! through a per-unit catch table ordered innermost-first.
//!
//! # Pipeline position
//!
//! ```text
//! AST → typecheck → **lower** → cleanup passes → codegen → bytecode
//! ```
//!
//! After lowering, [`hoist_literal_globals`] moves literal module-global
//! initializations to the front of the module body and
//! [`eliminate_dead_blocks`] prunes unreachable blocks while keeping live
//! catch handlers alive.

mod builder;
mod ir;
mod passes;
mod pool;

pub use builder::{lower_module, LoweredModule};
pub use ir::{Block, BlockId, Capture, CatchEntry, Ins, IrArena, IrUnit, Op, Register, UnitId};
pub use passes::{eliminate_dead_blocks, hoist_literal_globals};
pub use pool::{Literal, LiteralId, LiteralPool};
