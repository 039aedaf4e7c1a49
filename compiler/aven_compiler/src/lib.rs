//! Aven Compiler - the pipeline driver of the Aven compiler.
//!
//! This crate ties the passes together: it orders parsed modules by their
//! import graph, resolves each dependency level in parallel, lowers every
//! module to IR, runs the cleanup passes, generates bytecode and writes
//! the serialized images under a content-addressed output tree.
//!
//! The embedding (CLI, language server, test harness) supplies parsed
//! [`aven_ir::SourceModule`]s and reads back a [`RunOutcome`]; all file
//! output goes through [`output_path`].

mod config;
mod paths;
mod pipeline;

pub use config::Config;
pub use paths::{output_path, BYTECODE_EXTENSION};
pub use pipeline::{CompileError, Compiler, ModuleOutcome, RunOutcome};
