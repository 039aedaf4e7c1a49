//! Aven Types - the type model of the Aven compiler.
//!
//! Everything else in the compiler depends on this crate. It provides:
//!
//! - [`TypeId`]: the canonical 32-bit type handle with pre-interned
//!   primitives.
//! - [`TypeKind`] and per-type data: objects, traits, blocks, type
//!   parameters, optionals and the `Dynamic` escape hatch.
//! - [`TypeDatabase`]: the insert-only, name-unique store of all type
//!   entities for one compilation run, including prototype-chain attribute
//!   resolution, assignability and generic instantiation.
//! - [`Symbol`] and [`SymbolTable`]: append-only, ordered name → symbol
//!   mappings used both for lexical scopes and per-type attribute tables.

mod database;
mod entity;
mod symbol;
mod type_id;

pub use database::{SharedTypeDatabase, TypeDatabase};
pub use entity::{BlockSignature, Primitive, TypeKind};
pub use symbol::{DuplicateSymbol, Symbol, SymbolTable};
pub use type_id::TypeId;

use std::fmt;

/// Errors produced by type model operations.
///
/// Every variant corresponds to a user-facing diagnostic; the caller decides
/// where to record it. The type model itself never aborts.
#[derive(Clone, Eq, PartialEq, Debug)]
pub enum TypeError {
    /// A type with this qualified name is already defined.
    DuplicateType(String),
    /// The attribute is already defined on this exact type.
    DuplicateAttribute { owner: String, name: String },
    /// Assigning this prototype would make the chain cyclic.
    PrototypeCycle(String),
    /// Wrong number of type arguments for a generic type.
    TypeArgumentCount { owner: String, expected: usize, found: usize },
    /// A type argument does not satisfy a parameter's required trait.
    UnsatisfiedBound {
        argument: String,
        parameter: String,
        missing: String,
    },
}

impl fmt::Display for TypeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeError::DuplicateType(name) => {
                write!(f, "the type `{name}` is already defined")
            }
            TypeError::DuplicateAttribute { owner, name } => {
                write!(f, "the attribute `{name}` is already defined on `{owner}`")
            }
            TypeError::PrototypeCycle(name) => {
                write!(f, "the prototype chain of `{name}` would be cyclic")
            }
            TypeError::TypeArgumentCount {
                owner,
                expected,
                found,
            } => write!(
                f,
                "`{owner}` takes {expected} type argument(s), but {found} were supplied"
            ),
            TypeError::UnsatisfiedBound {
                argument,
                parameter,
                missing,
            } => write!(
                f,
                "`{argument}` does not implement `{missing}`, required by `{parameter}`"
            ),
        }
    }
}

impl std::error::Error for TypeError {}
