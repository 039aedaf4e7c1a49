//! Arena-allocated syntax tree.
//!
//! The compiler core consumes one [`AstArena`] per source file, produced by
//! an external parser. Nodes are addressed by [`NodeId`] and reference their
//! children by id, so passes can annotate expressions through plain
//! `NodeId`-indexed side tables instead of mutating the tree.

use crate::{Location, Name};

/// Index of a node within an [`AstArena`].
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
#[repr(transparent)]
pub struct NodeId(u32);

impl NodeId {
    /// Create from a raw u32 value.
    #[inline]
    pub const fn from_raw(raw: u32) -> Self {
        NodeId(raw)
    }

    /// Get the raw u32 value.
    #[inline]
    pub const fn raw(self) -> u32 {
        self.0
    }

    /// Index into arena-parallel side tables.
    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

/// A reference to a type in source position, e.g. `Array!(Int)` or `?String`.
#[derive(Clone, PartialEq, Debug)]
pub struct TypeRef {
    pub name: Name,
    pub type_args: Vec<TypeRef>,
    /// `?T` sugar for an optional type.
    pub optional: bool,
    pub location: Location,
}

impl TypeRef {
    /// A bare, non-optional reference to a named type.
    pub fn named(name: Name, location: Location) -> Self {
        TypeRef {
            name,
            type_args: Vec::new(),
            optional: false,
            location,
        }
    }
}

/// A declared type parameter with its required traits.
#[derive(Clone, PartialEq, Debug)]
pub struct TypeParamDef {
    pub name: Name,
    pub required: Vec<TypeRef>,
    pub location: Location,
}

/// A method or closure parameter.
#[derive(Clone, PartialEq, Debug)]
pub struct Param {
    pub name: Name,
    pub value_type: Option<TypeRef>,
    /// Default value expression; parameters with one are not required.
    pub default: Option<NodeId>,
    /// Rest (variadic) parameter; at most one, in last position.
    pub rest: bool,
    pub location: Location,
}

/// A syntax tree node.
///
/// Definitions and expressions share one enum: a module body, method body or
/// closure body is an ordered `Vec<NodeId>` of either kind.
#[derive(Clone, PartialEq, Debug)]
pub enum Node {
    // Definitions.
    ClassDef {
        name: Name,
        type_params: Vec<TypeParamDef>,
        /// Prototype (parent) type this class falls back to for lookups.
        prototype: Option<TypeRef>,
        /// Traits this class declares it implements.
        traits: Vec<TypeRef>,
        body: Vec<NodeId>,
    },
    TraitDef {
        name: Name,
        type_params: Vec<TypeParamDef>,
        /// Traits that must also be implemented by any implementor.
        required: Vec<TypeRef>,
        body: Vec<NodeId>,
    },
    MethodDef {
        name: Name,
        type_params: Vec<TypeParamDef>,
        params: Vec<Param>,
        returns: Option<TypeRef>,
        body: Vec<NodeId>,
    },
    /// An `@attribute` slot definition inside a class body.
    AttributeDef {
        name: Name,
        value_type: Option<TypeRef>,
        value: Option<NodeId>,
        mutable: bool,
    },
    Import {
        /// Full module name, e.g. `std::string`.
        module: String,
        /// Lazy imports break cycles in the module graph.
        lazy: bool,
    },

    // Literals.
    Int(i64),
    Float(f64),
    Str(String),
    True,
    False,
    Nil,
    SelfRef,
    Array(Vec<NodeId>),
    Map(Vec<(NodeId, NodeId)>),

    // Bindings and names.
    DefineVar {
        name: Name,
        mutable: bool,
        value_type: Option<TypeRef>,
        value: NodeId,
    },
    AssignVar {
        name: Name,
        value: NodeId,
    },
    Identifier(Name),
    Constant(Name),
    GetAttribute(Name),
    SetAttribute {
        name: Name,
        value: NodeId,
    },

    // Messages and control flow.
    Send {
        receiver: Option<NodeId>,
        name: Name,
        args: Vec<NodeId>,
        type_args: Vec<TypeRef>,
    },
    Closure {
        params: Vec<Param>,
        body: Vec<NodeId>,
    },
    If {
        condition: NodeId,
        then_body: Vec<NodeId>,
        else_body: Vec<NodeId>,
    },
    And {
        left: NodeId,
        right: NodeId,
    },
    Or {
        left: NodeId,
        right: NodeId,
    },
    Try {
        body: Vec<NodeId>,
        /// Name the thrown value is bound to inside the handler.
        error_name: Option<Name>,
        handler: Vec<NodeId>,
    },
    Throw {
        value: NodeId,
    },
    Return {
        value: Option<NodeId>,
    },
}

/// Arena owning all nodes of one source file.
#[derive(Default)]
pub struct AstArena {
    nodes: Vec<Node>,
    locations: Vec<Location>,
}

impl AstArena {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a node, returning its id.
    pub fn alloc(&mut self, node: Node, location: Location) -> NodeId {
        let id = NodeId::from_raw(self.nodes.len() as u32);
        self.nodes.push(node);
        self.locations.push(location);
        id
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.index()]
    }

    pub fn location(&self, id: NodeId) -> Location {
        self.locations[id.index()]
    }

    /// Number of allocated nodes; side tables are sized to this.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_arena_alloc_and_lookup() {
        let mut arena = AstArena::new();
        let loc = Location::new(1, 1);
        let value = arena.alloc(Node::Int(42), loc);
        let define = arena.alloc(
            Node::DefineVar {
                name: Name::from_raw(1),
                mutable: false,
                value_type: None,
                value,
            },
            Location::new(1, 5),
        );

        assert_eq!(arena.len(), 2);
        assert_eq!(arena.node(value), &Node::Int(42));
        assert_eq!(arena.location(value), loc);
        assert!(matches!(arena.node(define), Node::DefineVar { .. }));
    }

    #[test]
    fn test_node_ids_are_dense() {
        let mut arena = AstArena::new();
        let a = arena.alloc(Node::Nil, Location::DUMMY);
        let b = arena.alloc(Node::True, Location::DUMMY);
        assert_eq!(a.index(), 0);
        assert_eq!(b.index(), 1);
    }
}
