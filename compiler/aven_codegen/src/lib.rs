//! Aven Codegen - bytecode generation and serialization.
//!
//! Lowers IR units ([`aven_mir::IrUnit`]) into flat [`CompiledCode`]
//! records with absolute instruction offsets, deduplicated literal pools
//! and resolved catch tables, then serializes whole modules to the
//! versioned `.avc` binary image via [`image`].
//!
//! The produced bytes are deterministic: the same module compiles to
//! byte-identical output across runs, which the content-addressed output
//! cache relies on.

mod code;
mod gen;
pub mod image;

pub use code::{CaptureSource, CatchRange, CompiledCode, CompiledModule, Constant, Instruction};
pub use gen::{generate_module, generate_unit, InternalError};
