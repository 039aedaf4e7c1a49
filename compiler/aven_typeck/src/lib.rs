//! Aven Typeck - the type resolution pass of the Aven compiler.
//!
//! Resolution of one module happens in two phases:
//!
//! 1. **Declare** ([`declare_module`]): classes, traits, attributes, method
//!    signatures and type parameters are registered in the type database
//!    before any body is looked at, so definitions can reference each other
//!    regardless of source order.
//! 2. **Resolve** ([`resolve_module`]): every expression's type is inferred
//!    into a `NodeId`-indexed side table. Name and type errors are recorded
//!    and recovered from by degrading to `Dynamic`; only structural errors
//!    are fatal for the run.
//!
//! The import graph lives in [`imports`]: it yields the level order the
//! driver schedules modules in and enforces the lazy-boundary cycle policy.

mod declare;
mod env;
pub mod imports;
mod resolve;

pub use declare::declare_module;
pub use env::{ModuleEnv, ModuleExports};
pub use imports::{DependencyGraph, GraphError};
pub use resolve::{resolve_module, TypedModule};
