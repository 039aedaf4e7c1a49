//! Deduplicating literal pool.
//!
//! Insertion-ordered: the first occurrence of a value fixes its index, and
//! structurally equal values inserted later map to the same index. Floats
//! dedup by bit pattern so `0.0` and `-0.0` stay distinct.

use rustc_hash::FxHashMap;

use crate::ir::UnitId;

/// Index into a unit's literal pool.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
#[repr(transparent)]
pub struct LiteralId(u32);

impl LiteralId {
    #[inline]
    pub const fn from_raw(raw: u32) -> Self {
        LiteralId(raw)
    }

    #[inline]
    pub const fn raw(self) -> u32 {
        self.0
    }

    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

/// A constant value referenced by index from instructions.
#[derive(Clone, PartialEq, Debug)]
pub enum Literal {
    Int(i64),
    Float(f64),
    String(String),
    /// A nested compiled unit (closure or method body).
    Unit(UnitId),
}

/// Hashable identity of a literal. Floats are keyed by bit pattern.
#[derive(Clone, Eq, PartialEq, Hash)]
enum LiteralKey {
    Int(i64),
    Float(u64),
    String(String),
    Unit(u32),
}

impl LiteralKey {
    fn of(literal: &Literal) -> LiteralKey {
        match literal {
            Literal::Int(value) => LiteralKey::Int(*value),
            Literal::Float(value) => LiteralKey::Float(value.to_bits()),
            Literal::String(value) => LiteralKey::String(value.clone()),
            Literal::Unit(id) => LiteralKey::Unit(id.raw()),
        }
    }
}

#[derive(Default, Clone)]
pub struct LiteralPool {
    entries: Vec<Literal>,
    index: FxHashMap<LiteralKey, u32>,
}

impl PartialEq for LiteralPool {
    fn eq(&self, other: &Self) -> bool {
        self.entries == other.entries
    }
}

impl std::fmt::Debug for LiteralPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(&self.entries).finish()
    }
}

impl LiteralPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a literal, returning the index of its first occurrence.
    pub fn insert(&mut self, literal: Literal) -> LiteralId {
        let key = LiteralKey::of(&literal);
        if let Some(&existing) = self.index.get(&key) {
            return LiteralId(existing);
        }
        let id = self.entries.len() as u32;
        self.entries.push(literal);
        self.index.insert(key, id);
        LiteralId(id)
    }

    pub fn get(&self, id: LiteralId) -> &Literal {
        &self.entries[id.index()]
    }

    /// Entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &Literal> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_equal_literals_share_one_index() {
        let mut pool = LiteralPool::new();
        let first = pool.insert(Literal::Int(42));
        let other = pool.insert(Literal::String("a".to_string()));
        let second = pool.insert(Literal::Int(42));

        assert_eq!(first, second);
        assert_ne!(first, other);
        assert_eq!(pool.len(), 2);
    }

    #[test]
    fn test_insertion_order_is_preserved() {
        let mut pool = LiteralPool::new();
        pool.insert(Literal::Int(1));
        pool.insert(Literal::String("s".to_string()));
        pool.insert(Literal::Int(2));

        let entries: Vec<&Literal> = pool.iter().collect();
        assert_eq!(
            entries,
            vec![
                &Literal::Int(1),
                &Literal::String("s".to_string()),
                &Literal::Int(2),
            ]
        );
    }

    #[test]
    fn test_floats_dedup_by_bit_pattern() {
        let mut pool = LiteralPool::new();
        let positive = pool.insert(Literal::Float(0.0));
        let negative = pool.insert(Literal::Float(-0.0));
        let again = pool.insert(Literal::Float(0.0));

        assert_ne!(positive, negative);
        assert_eq!(positive, again);
    }

    #[test]
    fn test_nested_units_are_distinct_entries() {
        let mut pool = LiteralPool::new();
        let a = pool.insert(Literal::Unit(UnitId::from_raw(1)));
        let b = pool.insert(Literal::Unit(UnitId::from_raw(2)));
        assert_ne!(a, b);
    }
}
