//! The per-file compilation input.

use std::path::PathBuf;

use crate::{AstArena, Node, NodeId};

/// One parsed source file, as supplied by the external module loader.
///
/// The compiler core never touches the file system for inputs; the loader
/// resolves import paths and hands over one `SourceModule` per file.
pub struct SourceModule {
    /// Module name, e.g. `std::string`.
    pub name: String,
    /// Absolute source path; also the seed for the bytecode output path.
    pub path: PathBuf,
    pub arena: AstArena,
    /// Top-level nodes, in source order.
    pub body: Vec<NodeId>,
}

impl SourceModule {
    /// The modules this module imports, in declaration order, with their
    /// lazy flags.
    pub fn imports(&self) -> Vec<(String, bool)> {
        self.body
            .iter()
            .filter_map(|&id| match self.arena.node(id) {
                Node::Import { module, lazy } => Some((module.clone(), *lazy)),
                _ => None,
            })
            .collect()
    }
}
