//! Type entities.

use aven_ir::Name;

use crate::{SymbolTable, TypeId};

/// The primitive value kinds of the language.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub enum Primitive {
    Int,
    Float,
    String,
    Boolean,
    Nil,
}

/// The signature of a block (a method or closure type).
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct BlockSignature {
    /// Parameter types, in declaration order.
    pub params: Vec<TypeId>,
    /// Number of leading parameters without a default value.
    pub required: usize,
    /// Whether the last parameter is a rest (variadic) parameter.
    pub rest: bool,
    /// Return type; `TypeId::NIL` for bodies with no explicit return type.
    pub returns: TypeId,
}

/// What kind of entity a [`TypeId`] refers to.
#[derive(Clone, Eq, PartialEq, Debug)]
pub enum TypeKind {
    /// A class-like object type.
    Object,
    /// A trait; used as a capability bound and as a value type.
    Trait,
    /// A method or closure type.
    Block(BlockSignature),
    /// A generic placeholder owned by the definition that declares it.
    TypeParameter,
    /// One of the built-in value types.
    Primitive(Primitive),
    /// `?T`: either a `T` or `Nil`.
    Optional(TypeId),
    /// The untyped escape hatch produced by error recovery.
    Dynamic,
}

impl TypeKind {
    pub fn is_block(&self) -> bool {
        matches!(self, TypeKind::Block(_))
    }

    pub fn is_trait(&self) -> bool {
        matches!(self, TypeKind::Trait)
    }
}

/// One entry in the type database.
///
/// The prototype is an optional back-reference to a parent type; attribute
/// resolution walks this singly-linked chain, which is cycle-checked when
/// the prototype is assigned.
#[derive(Clone, Debug)]
pub(crate) struct TypeEntity {
    /// Qualified name, unique within the database.
    pub(crate) name: String,
    pub(crate) kind: TypeKind,
    pub(crate) prototype: Option<TypeId>,
    /// Ordered attribute name → symbol mapping; methods are attributes
    /// whose type is a `Block`.
    pub(crate) attributes: SymbolTable,
    /// Traits this type declares it implements, in declaration order.
    pub(crate) implemented_traits: Vec<TypeId>,
    /// Declared type parameters (entities of kind `TypeParameter`).
    pub(crate) type_params: Vec<TypeId>,
    /// For `TypeParameter` entities: traits a substituted argument must
    /// implement. For `Trait` entities: traits an implementor must also
    /// implement.
    pub(crate) required_traits: Vec<TypeId>,
}

impl TypeEntity {
    pub(crate) fn new(name: String, kind: TypeKind) -> Self {
        TypeEntity {
            name,
            kind,
            prototype: None,
            attributes: SymbolTable::new(),
            implemented_traits: Vec::new(),
            type_params: Vec::new(),
            required_traits: Vec::new(),
        }
    }

    pub(crate) fn attribute(&self, name: Name) -> Option<crate::Symbol> {
        self.attributes.lookup(name)
    }
}
