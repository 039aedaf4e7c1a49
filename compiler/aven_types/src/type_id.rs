//! Unified type index handle.
//!
//! `TypeId` is the canonical type representation. All type entities live in
//! the [`TypeDatabase`](crate::TypeDatabase) and are referenced by their
//! 32-bit index; equality is an O(1) index comparison.

use std::fmt;

/// A 32-bit index into the type database.
///
/// Primitive types have fixed indices, pre-interned at database creation.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[repr(transparent)]
pub struct TypeId(u32);

impl TypeId {
    // Primitive types, pre-interned at database creation for O(1) access.

    /// The `Int` type (64-bit signed integer).
    pub const INT: Self = Self(0);
    /// The `Float` type (64-bit floating point).
    pub const FLOAT: Self = Self(1);
    /// The `String` type.
    pub const STRING: Self = Self(2);
    /// The `Boolean` type.
    pub const BOOLEAN: Self = Self(3);
    /// The `Nil` type.
    pub const NIL: Self = Self(4);
    /// The `Dynamic` type: compatible in both directions, produced when
    /// resolution fails so inference can continue without cascading errors.
    pub const DYNAMIC: Self = Self(5);

    /// Number of pre-interned primitive entities (including `Dynamic`).
    pub const PRIMITIVE_COUNT: u32 = 6;

    /// Sentinel value indicating no type / invalid index.
    pub const NONE: Self = Self(u32::MAX);

    /// Create an index from a raw u32 value.
    ///
    /// The caller must ensure the index is valid in the database.
    #[inline]
    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    /// Get the raw u32 value.
    #[inline]
    pub const fn raw(self) -> u32 {
        self.0
    }

    /// Index into database-parallel tables.
    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }

    /// Check if this is a pre-interned primitive.
    #[inline]
    pub const fn is_primitive(self) -> bool {
        self.0 < Self::PRIMITIVE_COUNT
    }

    /// Check if this is the NONE sentinel.
    #[inline]
    pub const fn is_none(self) -> bool {
        self.0 == u32::MAX
    }

    /// Check if this is the `Dynamic` type.
    #[inline]
    pub const fn is_dynamic(self) -> bool {
        self.0 == Self::DYNAMIC.0
    }
}

impl fmt::Debug for TypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::INT => write!(f, "TypeId(Int)"),
            Self::FLOAT => write!(f, "TypeId(Float)"),
            Self::STRING => write!(f, "TypeId(String)"),
            Self::BOOLEAN => write!(f, "TypeId(Boolean)"),
            Self::NIL => write!(f, "TypeId(Nil)"),
            Self::DYNAMIC => write!(f, "TypeId(Dynamic)"),
            Self::NONE => write!(f, "TypeId(NONE)"),
            Self(raw) => write!(f, "TypeId({raw})"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_primitive_predicates() {
        assert!(TypeId::INT.is_primitive());
        assert!(TypeId::DYNAMIC.is_primitive());
        assert!(TypeId::DYNAMIC.is_dynamic());
        assert!(!TypeId::from_raw(100).is_primitive());
        assert!(TypeId::NONE.is_none());
    }

    #[test]
    fn test_debug_names() {
        assert_eq!(format!("{:?}", TypeId::NIL), "TypeId(Nil)");
        assert_eq!(format!("{:?}", TypeId::from_raw(9)), "TypeId(9)");
    }
}
