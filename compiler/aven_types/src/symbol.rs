//! Symbols and ordered symbol tables.

use aven_ir::Name;
use rustc_hash::FxHashMap;
use std::fmt;

use crate::TypeId;

/// A named, typed binding: a variable, attribute or type parameter.
///
/// The `index` is stable within the owning table and is how later passes
/// address the binding (local slots, attribute layout positions).
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub struct Symbol {
    pub name: Name,
    pub type_id: TypeId,
    pub mutable: bool,
    pub index: u32,
}

/// Error when defining a name that already exists in a table.
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct DuplicateSymbol {
    pub name: Name,
    /// Index of the existing definition.
    pub existing: u32,
}

impl fmt::Display for DuplicateSymbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "a symbol with name id {} is already defined at index {}",
            self.name.raw(),
            self.existing
        )
    }
}

impl std::error::Error for DuplicateSymbol {}

/// Append-only, insertion-ordered, name-unique symbol table.
///
/// Used both for lexical scopes (locals of a method or closure) and for the
/// attribute tables of type entities. Scoping (walking outward through
/// enclosing tables) is the caller's concern; one table is one scope.
#[derive(Clone, Default, Debug)]
pub struct SymbolTable {
    symbols: Vec<Symbol>,
    by_name: FxHashMap<Name, u32>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Define a new symbol, returning it with its stable index.
    ///
    /// Fails if the name already exists in this table; shadowing a name from
    /// an *enclosing* table is expressed by defining it in a fresher table.
    pub fn define(
        &mut self,
        name: Name,
        type_id: TypeId,
        mutable: bool,
    ) -> Result<Symbol, DuplicateSymbol> {
        if let Some(&existing) = self.by_name.get(&name) {
            return Err(DuplicateSymbol { name, existing });
        }

        let symbol = Symbol {
            name,
            type_id,
            mutable,
            index: self.symbols.len() as u32,
        };
        self.by_name.insert(name, symbol.index);
        self.symbols.push(symbol);
        Ok(symbol)
    }

    /// Look up a symbol by name in this table only.
    pub fn lookup(&self, name: Name) -> Option<Symbol> {
        self.by_name
            .get(&name)
            .map(|&idx| self.symbols[idx as usize])
    }

    pub fn contains(&self, name: Name) -> bool {
        self.by_name.contains_key(&name)
    }

    /// Get a symbol by its stable index.
    pub fn get(&self, index: u32) -> Option<Symbol> {
        self.symbols.get(index as usize).copied()
    }

    /// Symbols in definition order.
    pub fn iter(&self) -> impl Iterator<Item = &Symbol> {
        self.symbols.iter()
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn name(raw: u32) -> Name {
        Name::from_raw(raw)
    }

    #[test]
    fn test_define_assigns_dense_indices() {
        let mut table = SymbolTable::new();
        let a = table.define(name(1), TypeId::INT, false).map(|s| s.index);
        let b = table.define(name(2), TypeId::STRING, true).map(|s| s.index);

        assert_eq!(a, Ok(0));
        assert_eq!(b, Ok(1));
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_duplicate_name_is_rejected() {
        let mut table = SymbolTable::new();
        let _ = table.define(name(1), TypeId::INT, false);
        let err = table.define(name(1), TypeId::FLOAT, false);

        assert_eq!(
            err,
            Err(DuplicateSymbol {
                name: name(1),
                existing: 0
            })
        );
        // The original definition is untouched.
        assert_eq!(table.lookup(name(1)).map(|s| s.type_id), Some(TypeId::INT));
    }

    #[test]
    fn test_iteration_preserves_definition_order() {
        let mut table = SymbolTable::new();
        for raw in [5, 3, 9] {
            let _ = table.define(name(raw), TypeId::INT, false);
        }
        let order: Vec<u32> = table.iter().map(|s| s.name.raw()).collect();
        assert_eq!(order, vec![5, 3, 9]);
    }

    #[test]
    fn test_get_by_stable_index() {
        let mut table = SymbolTable::new();
        let _ = table.define(name(7), TypeId::BOOLEAN, true);
        let sym = table.get(0);
        assert_eq!(sym.map(|s| (s.name, s.mutable)), Some((name(7), true)));
        assert_eq!(table.get(1), None);
    }
}
