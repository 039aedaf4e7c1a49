//! The global type database.
//!
//! One database exists per compilation run. It is insert-only: entities are
//! defined during a module's resolution and never mutated after that module's
//! resolution returns, which is what makes sharing it across worker threads
//! sound. All locking lives inside this type; callers hold no guards.

use aven_ir::{Name, SharedInterner};
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use std::sync::Arc;

use crate::entity::TypeEntity;
use crate::{BlockSignature, Primitive, Symbol, TypeError, TypeId, TypeKind};

struct DbInner {
    entities: Vec<TypeEntity>,
    by_name: FxHashMap<String, TypeId>,
}

impl DbInner {
    fn entity(&self, id: TypeId) -> &TypeEntity {
        &self.entities[id.index()]
    }

    /// Walk the prototype chain starting at `receiver`, returning the first
    /// attribute named `name`. O(chain depth); chains are cycle-checked at
    /// definition time, so this terminates.
    fn lookup_attribute(&self, receiver: TypeId, name: Name) -> Option<Symbol> {
        let mut current = Some(receiver);
        while let Some(id) = current {
            let entity = self.entity(id);
            if let Some(symbol) = entity.attribute(name) {
                return Some(symbol);
            }
            current = entity.prototype;
        }
        None
    }

    /// Whether `id` (or a prototype ancestor) declares it implements
    /// `trait_id`. A trait satisfies itself and any trait it requires.
    fn implements_trait(&self, id: TypeId, trait_id: TypeId) -> bool {
        if id == trait_id {
            return true;
        }

        // A trait grants every trait it requires, since implementors are
        // obliged to implement those too.
        if self.entity(id).kind.is_trait() {
            return self
                .entity(id)
                .required_traits
                .iter()
                .any(|&req| self.implements_trait(req, trait_id));
        }

        let mut current = Some(id);
        while let Some(type_id) = current {
            let entity = self.entity(type_id);
            if entity
                .implemented_traits
                .iter()
                .any(|&imp| self.implements_trait(imp, trait_id))
            {
                return true;
            }
            current = entity.prototype;
        }
        false
    }

    fn assignable(&self, a: TypeId, b: TypeId) -> bool {
        if a == b || b.is_dynamic() || a.is_dynamic() {
            return true;
        }

        // `?T` accepts Nil, a T, or another optional of an assignable inner.
        if let TypeKind::Optional(inner) = self.entity(b).kind {
            if a == TypeId::NIL {
                return true;
            }
            if let TypeKind::Optional(a_inner) = self.entity(a).kind {
                return self.assignable(a_inner, inner);
            }
            return self.assignable(a, inner);
        }

        match &self.entity(b).kind {
            TypeKind::Trait => self.implements_trait(a, b),
            TypeKind::TypeParameter => self
                .entity(b)
                .required_traits
                .iter()
                .all(|&req| self.implements_trait(a, req)),
            TypeKind::Block(b_sig) => match &self.entity(a).kind {
                TypeKind::Block(a_sig) => {
                    a_sig.params.len() == b_sig.params.len()
                        && a_sig.rest == b_sig.rest
                        && a_sig
                            .params
                            .iter()
                            .zip(&b_sig.params)
                            .all(|(&ap, &bp)| self.assignable(ap, bp))
                        && self.assignable(a_sig.returns, b_sig.returns)
                }
                _ => false,
            },
            _ => {
                // Prototype-chain membership: a value is assignable to any
                // of its ancestors.
                let mut current = self.entity(a).prototype;
                while let Some(id) = current {
                    if id == b {
                        return true;
                    }
                    current = self.entity(id).prototype;
                }
                false
            }
        }
    }

    /// Substitute type parameters for concrete arguments inside `ty`.
    fn substitute(&mut self, ty: TypeId, map: &FxHashMap<TypeId, TypeId>) -> TypeId {
        if let Some(&replacement) = map.get(&ty) {
            return replacement;
        }

        match self.entity(ty).kind.clone() {
            TypeKind::Optional(inner) => {
                let new_inner = self.substitute(inner, map);
                if new_inner == inner {
                    ty
                } else {
                    self.intern_optional(new_inner)
                }
            }
            TypeKind::Block(sig) => {
                let params: Vec<TypeId> =
                    sig.params.iter().map(|&p| self.substitute(p, map)).collect();
                let returns = self.substitute(sig.returns, map);
                if params == sig.params && returns == sig.returns {
                    return ty;
                }
                let name = format!("{}'", self.entity(ty).name);
                self.insert(TypeEntity::new(
                    name,
                    TypeKind::Block(BlockSignature {
                        params,
                        required: sig.required,
                        rest: sig.rest,
                        returns,
                    }),
                ))
            }
            _ => ty,
        }
    }

    fn intern_optional(&mut self, inner: TypeId) -> TypeId {
        let name = format!("?{}", self.entity(inner).name);
        if let Some(&existing) = self.by_name.get(&name) {
            return existing;
        }
        self.insert(TypeEntity::new(name, TypeKind::Optional(inner)))
    }

    /// Insert an entity, registering its name. Blocks and generated entities
    /// may collide on name; the first wins and later inserts reuse storage
    /// under a fresh id without stealing the name entry.
    fn insert(&mut self, entity: TypeEntity) -> TypeId {
        let id = TypeId::from_raw(self.entities.len() as u32);
        self.by_name.entry(entity.name.clone()).or_insert(id);
        self.entities.push(entity);
        id
    }
}

/// The insert-only store of all type entities for one compilation run.
pub struct TypeDatabase {
    inner: RwLock<DbInner>,
    interner: SharedInterner,
}

impl TypeDatabase {
    /// Create a database with the primitive types pre-interned at their
    /// fixed [`TypeId`] indices.
    pub fn new(interner: SharedInterner) -> Self {
        let primitives = [
            ("Int", TypeKind::Primitive(Primitive::Int)),
            ("Float", TypeKind::Primitive(Primitive::Float)),
            ("String", TypeKind::Primitive(Primitive::String)),
            ("Boolean", TypeKind::Primitive(Primitive::Boolean)),
            ("Nil", TypeKind::Primitive(Primitive::Nil)),
            ("Dynamic", TypeKind::Dynamic),
        ];

        let mut inner = DbInner {
            entities: Vec::with_capacity(64),
            by_name: FxHashMap::default(),
        };
        for (name, kind) in primitives {
            inner.insert(TypeEntity::new(name.to_string(), kind));
        }
        debug_assert_eq!(inner.entities.len() as u32, TypeId::PRIMITIVE_COUNT);

        TypeDatabase {
            inner: RwLock::new(inner),
            interner,
        }
    }

    /// The interner used to render attribute names in errors.
    pub fn interner(&self) -> &SharedInterner {
        &self.interner
    }

    /// Define a new named type entity.
    ///
    /// Fails if the qualified name is already taken (a structural error for
    /// the caller to record).
    pub fn define(&self, name: impl Into<String>, kind: TypeKind) -> Result<TypeId, TypeError> {
        let name = name.into();
        let mut inner = self.inner.write();
        if inner.by_name.contains_key(&name) {
            return Err(TypeError::DuplicateType(name));
        }
        Ok(inner.insert(TypeEntity::new(name, kind)))
    }

    /// Look up a type entity by qualified name.
    pub fn get(&self, name: &str) -> Option<TypeId> {
        self.inner.read().by_name.get(name).copied()
    }

    /// Intern the optional form `?T` of a type.
    pub fn intern_optional(&self, inner: TypeId) -> TypeId {
        self.inner.write().intern_optional(inner)
    }

    pub fn name_of(&self, id: TypeId) -> String {
        self.inner.read().entity(id).name.clone()
    }

    pub fn kind_of(&self, id: TypeId) -> TypeKind {
        self.inner.read().entity(id).kind.clone()
    }

    pub fn prototype_of(&self, id: TypeId) -> Option<TypeId> {
        self.inner.read().entity(id).prototype
    }

    /// Assign the prototype of a type, rejecting chains that would cycle.
    pub fn set_prototype(&self, id: TypeId, prototype: TypeId) -> Result<(), TypeError> {
        let mut inner = self.inner.write();

        let mut current = Some(prototype);
        while let Some(ancestor) = current {
            if ancestor == id {
                return Err(TypeError::PrototypeCycle(inner.entity(id).name.clone()));
            }
            current = inner.entity(ancestor).prototype;
        }

        inner.entities[id.index()].prototype = Some(prototype);
        Ok(())
    }

    /// Register an attribute on `owner`.
    ///
    /// Fails (for the caller to record as a diagnostic) if the name already
    /// exists on that exact type; shadowing a prototype's attribute is
    /// allowed and intentional.
    pub fn define_attribute(
        &self,
        owner: TypeId,
        name: Name,
        type_id: TypeId,
        mutable: bool,
    ) -> Result<Symbol, TypeError> {
        let mut inner = self.inner.write();
        let owner_name = inner.entity(owner).name.clone();
        inner.entities[owner.index()]
            .attributes
            .define(name, type_id, mutable)
            .map_err(|_| TypeError::DuplicateAttribute {
                owner: owner_name,
                name: self.interner.lookup(name),
            })
    }

    /// Walk the prototype chain of `receiver` for an attribute.
    pub fn lookup_attribute(&self, receiver: TypeId, name: Name) -> Option<Symbol> {
        self.inner.read().lookup_attribute(receiver, name)
    }

    /// [`lookup_attribute`](Self::lookup_attribute) restricted to attributes
    /// whose type is a block.
    pub fn lookup_method(&self, receiver: TypeId, name: Name) -> Option<Symbol> {
        let inner = self.inner.read();
        inner
            .lookup_attribute(receiver, name)
            .filter(|symbol| inner.entity(symbol.type_id).kind.is_block())
    }

    /// Whether resolving `name` on `receiver` yields a block-typed attribute.
    pub fn responds_to(&self, receiver: TypeId, name: Name) -> bool {
        self.lookup_method(receiver, name).is_some()
    }

    /// Attributes of `id` itself (not its prototypes), in definition order.
    pub fn own_attributes(&self, id: TypeId) -> Vec<Symbol> {
        self.inner
            .read()
            .entity(id)
            .attributes
            .iter()
            .copied()
            .collect()
    }

    pub fn add_type_param(&self, owner: TypeId, param: TypeId) {
        self.inner.write().entities[owner.index()]
            .type_params
            .push(param);
    }

    pub fn type_params_of(&self, id: TypeId) -> Vec<TypeId> {
        self.inner.read().entity(id).type_params.clone()
    }

    pub fn add_required_trait(&self, id: TypeId, required: TypeId) {
        self.inner.write().entities[id.index()]
            .required_traits
            .push(required);
    }

    pub fn required_traits_of(&self, id: TypeId) -> Vec<TypeId> {
        self.inner.read().entity(id).required_traits.clone()
    }

    pub fn add_implemented_trait(&self, id: TypeId, implemented: TypeId) {
        self.inner.write().entities[id.index()]
            .implemented_traits
            .push(implemented);
    }

    /// Whether `id` implements `trait_id`, via its own declarations or its
    /// prototype chain.
    pub fn implements_trait(&self, id: TypeId, trait_id: TypeId) -> bool {
        self.inner.read().implements_trait(id, trait_id)
    }

    /// Type compatibility: whether a value of type `a` is assignable to a
    /// binding or parameter of type `b`.
    pub fn assignable(&self, a: TypeId, b: TypeId) -> bool {
        self.inner.read().assignable(a, b)
    }

    /// Instantiate a generic type with concrete arguments.
    ///
    /// Checks arity and every parameter's required traits; failures are
    /// returned for the caller to record, never panicked on. The
    /// instantiation is interned by name, so repeated instantiation with
    /// the same arguments yields the same id.
    pub fn instantiate(&self, generic: TypeId, args: &[TypeId]) -> Result<TypeId, TypeError> {
        let mut inner = self.inner.write();

        let params = inner.entity(generic).type_params.clone();
        if params.len() != args.len() {
            return Err(TypeError::TypeArgumentCount {
                owner: inner.entity(generic).name.clone(),
                expected: params.len(),
                found: args.len(),
            });
        }

        for (&param, &arg) in params.iter().zip(args) {
            if arg.is_dynamic() {
                continue;
            }
            for &required in &inner.entity(param).required_traits.clone() {
                if !inner.implements_trait(arg, required) {
                    return Err(TypeError::UnsatisfiedBound {
                        argument: inner.entity(arg).name.clone(),
                        parameter: inner.entity(param).name.clone(),
                        missing: inner.entity(required).name.clone(),
                    });
                }
            }
        }

        if params.is_empty() {
            return Ok(generic);
        }

        let arg_names: Vec<String> = args
            .iter()
            .map(|&arg| inner.entity(arg).name.clone())
            .collect();
        let name = format!("{}!({})", inner.entity(generic).name, arg_names.join(", "));
        if let Some(&existing) = inner.by_name.get(&name) {
            return Ok(existing);
        }

        let map: FxHashMap<TypeId, TypeId> =
            params.iter().copied().zip(args.iter().copied()).collect();

        let mut entity = TypeEntity::new(name, inner.entity(generic).kind.clone());
        entity.prototype = inner.entity(generic).prototype;
        entity.implemented_traits = inner.entity(generic).implemented_traits.clone();

        let attributes: Vec<Symbol> = inner.entity(generic).attributes.iter().copied().collect();
        for symbol in attributes {
            let substituted = inner.substitute(symbol.type_id, &map);
            // The source table is name-unique, so re-defining cannot fail.
            let _ = entity
                .attributes
                .define(symbol.name, substituted, symbol.mutable);
        }

        Ok(inner.insert(entity))
    }

    /// Number of defined entities, including primitives.
    pub fn len(&self) -> usize {
        self.inner.read().entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Shared handle to a [`TypeDatabase`].
#[derive(Clone)]
pub struct SharedTypeDatabase(Arc<TypeDatabase>);

impl SharedTypeDatabase {
    pub fn new(interner: SharedInterner) -> Self {
        SharedTypeDatabase(Arc::new(TypeDatabase::new(interner)))
    }
}

impl std::ops::Deref for SharedTypeDatabase {
    type Target = TypeDatabase;

    fn deref(&self) -> &TypeDatabase {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn db() -> (TypeDatabase, SharedInterner) {
        let interner = SharedInterner::new();
        (TypeDatabase::new(interner.clone()), interner)
    }

    fn object(db: &TypeDatabase, name: &str) -> TypeId {
        db.define(name, TypeKind::Object).unwrap_or(TypeId::NONE)
    }

    fn block(db: &TypeDatabase, name: &str, returns: TypeId) -> TypeId {
        db.define(
            name,
            TypeKind::Block(BlockSignature {
                params: Vec::new(),
                required: 0,
                rest: false,
                returns,
            }),
        )
        .unwrap_or(TypeId::NONE)
    }

    #[test]
    fn test_primitives_pre_interned() {
        let (db, _) = db();
        assert_eq!(db.get("Int"), Some(TypeId::INT));
        assert_eq!(db.get("Dynamic"), Some(TypeId::DYNAMIC));
        assert_eq!(db.name_of(TypeId::NIL), "Nil");
    }

    #[test]
    fn test_duplicate_definition_rejected() {
        let (db, _) = db();
        let first = db.define("app.Person", TypeKind::Object);
        let second = db.define("app.Person", TypeKind::Object);
        assert!(first.is_ok());
        assert_eq!(
            second,
            Err(TypeError::DuplicateType("app.Person".to_string()))
        );
    }

    #[test]
    fn test_attribute_lookup_walks_prototype_chain() {
        let (db, interner) = db();
        let base = object(&db, "app.Base");
        let middle = object(&db, "app.Middle");
        let leaf = object(&db, "app.Leaf");
        let _ = db.set_prototype(middle, base);
        let _ = db.set_prototype(leaf, middle);

        let attr = interner.intern("count");
        let _ = db.define_attribute(base, attr, TypeId::INT, false);

        // Resolution from the leaf reaches the base definition.
        let found = db.lookup_attribute(leaf, attr);
        assert_eq!(found.map(|s| s.type_id), Some(TypeId::INT));

        // A closer redefinition shadows it.
        let _ = db.define_attribute(middle, attr, TypeId::STRING, false);
        let found = db.lookup_attribute(leaf, attr);
        assert_eq!(found.map(|s| s.type_id), Some(TypeId::STRING));
    }

    #[test]
    fn test_duplicate_attribute_on_same_type_rejected() {
        let (db, interner) = db();
        let person = object(&db, "app.Person");
        let attr = interner.intern("name");
        assert!(db.define_attribute(person, attr, TypeId::STRING, false).is_ok());
        let second = db.define_attribute(person, attr, TypeId::INT, false);
        assert_eq!(
            second,
            Err(TypeError::DuplicateAttribute {
                owner: "app.Person".to_string(),
                name: "name".to_string()
            })
        );
    }

    #[test]
    fn test_prototype_cycle_rejected() {
        let (db, _) = db();
        let a = object(&db, "app.A");
        let b = object(&db, "app.B");
        assert!(db.set_prototype(b, a).is_ok());
        assert_eq!(
            db.set_prototype(a, b),
            Err(TypeError::PrototypeCycle("app.A".to_string()))
        );
    }

    #[test]
    fn test_lookup_method_skips_plain_attributes() {
        let (db, interner) = db();
        let person = object(&db, "app.Person");
        let field = interner.intern("age");
        let method = interner.intern("greet");
        let greet_ty = block(&db, "app.Person.greet", TypeId::STRING);

        let _ = db.define_attribute(person, field, TypeId::INT, false);
        let _ = db.define_attribute(person, method, greet_ty, false);

        assert!(db.lookup_method(person, field).is_none());
        assert!(db.responds_to(person, method));
        assert!(!db.responds_to(person, interner.intern("missing")));
    }

    #[test]
    fn test_assignability_transitive_over_chain() {
        let (db, _) = db();
        let a = object(&db, "app.A");
        let b = object(&db, "app.B");
        let c = object(&db, "app.C");
        let _ = db.set_prototype(a, b);
        let _ = db.set_prototype(b, c);

        assert!(db.assignable(a, b));
        assert!(db.assignable(b, c));
        // Transitivity.
        assert!(db.assignable(a, c));
        assert!(!db.assignable(c, a));
    }

    #[test]
    fn test_assignability_dynamic_and_optional() {
        let (db, _) = db();
        let person = object(&db, "app.Person");
        let opt = db.intern_optional(person);

        assert!(db.assignable(person, TypeId::DYNAMIC));
        assert!(db.assignable(TypeId::DYNAMIC, person));
        assert!(db.assignable(TypeId::NIL, opt));
        assert!(db.assignable(person, opt));
        assert!(!db.assignable(TypeId::INT, opt));
        // Optionals intern to one entity per inner type.
        assert_eq!(opt, db.intern_optional(person));
    }

    #[test]
    fn test_assignability_via_trait() {
        let (db, _) = db();
        let to_s = db.define("core.ToString", TypeKind::Trait).unwrap_or(TypeId::NONE);
        let base = object(&db, "app.Base");
        let leaf = object(&db, "app.Leaf");
        db.add_implemented_trait(base, to_s);
        let _ = db.set_prototype(leaf, base);

        // Implemented traits are inherited through the chain.
        assert!(db.implements_trait(leaf, to_s));
        assert!(db.assignable(leaf, to_s));
        assert!(!db.assignable(TypeId::INT, to_s));
    }

    #[test]
    fn test_type_parameter_bound_subset_rule() {
        let (db, _) = db();
        let to_s = db.define("core.ToString", TypeKind::Trait).unwrap_or(TypeId::NONE);
        let param = db
            .define("app.Box.T", TypeKind::TypeParameter)
            .unwrap_or(TypeId::NONE);
        db.add_required_trait(param, to_s);

        let good = object(&db, "app.Good");
        db.add_implemented_trait(good, to_s);
        let bad = object(&db, "app.Bad");

        assert!(db.assignable(good, param));
        assert!(!db.assignable(bad, param));
    }

    #[test]
    fn test_instantiate_checks_bounds() {
        let (db, interner) = db();
        let to_s = db.define("core.ToString", TypeKind::Trait).unwrap_or(TypeId::NONE);
        let generic = object(&db, "app.Box");
        let param = db
            .define("app.Box.T", TypeKind::TypeParameter)
            .unwrap_or(TypeId::NONE);
        db.add_required_trait(param, to_s);
        db.add_type_param(generic, param);

        let value = interner.intern("value");
        let _ = db.define_attribute(generic, value, param, true);

        let good = object(&db, "app.Good");
        db.add_implemented_trait(good, to_s);

        let inst = db.instantiate(generic, &[good]);
        let Ok(inst) = inst else {
            panic!("expected successful instantiation");
        };
        assert_eq!(db.name_of(inst), "app.Box!(app.Good)");
        // The attribute's parameter type was substituted.
        assert_eq!(db.lookup_attribute(inst, value).map(|s| s.type_id), Some(good));
        // Repeat instantiation reuses the interned entity.
        assert_eq!(db.instantiate(generic, &[good]), Ok(inst));

        let bad = object(&db, "app.Bad");
        assert_eq!(
            db.instantiate(generic, &[bad]),
            Err(TypeError::UnsatisfiedBound {
                argument: "app.Bad".to_string(),
                parameter: "app.Box.T".to_string(),
                missing: "core.ToString".to_string(),
            })
        );

        assert_eq!(
            db.instantiate(generic, &[]),
            Err(TypeError::TypeArgumentCount {
                owner: "app.Box".to_string(),
                expected: 1,
                found: 0
            })
        );
    }
}
