//! Aven IR - shared front-end types for the Aven compiler.
//!
//! This crate is the dependency root of the compiler workspace. It defines:
//!
//! - [`Location`]: line/column source positions carried by every node,
//!   instruction and diagnostic.
//! - [`Name`] and [`StringInterner`]: interned identifiers shared across
//!   compilation threads.
//! - [`AstArena`] and [`NodeId`]: the arena-allocated syntax tree this core
//!   consumes. Parsing is out of scope; an external loader supplies one
//!   arena per source file.

pub mod ast;
mod interner;
mod location;
mod module;
mod name;

pub use ast::{AstArena, Node, NodeId, Param, TypeParamDef, TypeRef};
pub use module::SourceModule;
pub use interner::{SharedInterner, StringInterner};
pub use location::Location;
pub use name::Name;
