//! Resolution phase.
//!
//! Infers a type for every expression of a module, writing results into a
//! `NodeId`-indexed side table. Name and type errors are recorded and
//! recovered from by degrading the offending expression to `Dynamic`, so a
//! single mistake never cascades through the rest of the module.

use aven_diagnostic::{self as diag, Diagnostic, ErrorCode};
use aven_ir::{Location, Name, Node, NodeId, Param, SourceModule};
use aven_types::{BlockSignature, Symbol, SymbolTable, TypeDatabase, TypeId, TypeKind};

use crate::ModuleEnv;

/// The typed output of resolving one module.
pub struct TypedModule {
    /// The module's own object type.
    pub module_type: TypeId,
    /// Inferred type per AST node, indexed by `NodeId`.
    pub expr_types: Vec<TypeId>,
    /// Module-level globals, in definition order.
    pub globals: SymbolTable,
}

impl TypedModule {
    pub fn expr_type(&self, id: NodeId) -> TypeId {
        self.expr_types
            .get(id.index())
            .copied()
            .unwrap_or(TypeId::NONE)
    }
}

/// Resolve a module's bodies against its declared types.
#[tracing::instrument(level = "debug", skip_all, fields(module = env.module_name))]
pub fn resolve_module(
    db: &TypeDatabase,
    env: &ModuleEnv<'_>,
    module: &SourceModule,
    module_type: TypeId,
) -> (TypedModule, Vec<Diagnostic>) {
    let mut resolver = Resolver {
        db,
        env,
        module,
        expr_types: vec![TypeId::NONE; module.arena.len()],
        globals: SymbolTable::new(),
        scopes: Vec::new(),
        self_types: vec![module_type],
        diagnostics: Vec::new(),
        closure_counter: 0,
    };

    for &id in &module.body {
        resolver.resolve(id);
    }

    let typed = TypedModule {
        module_type,
        expr_types: resolver.expr_types,
        globals: resolver.globals,
    };
    (typed, resolver.diagnostics)
}

/// One lexical scope. A `boundary` scope is a method body: lookups walk
/// outward through closures but stop after the enclosing method.
struct Scope {
    table: SymbolTable,
    boundary: bool,
}

struct Resolver<'a> {
    db: &'a TypeDatabase,
    env: &'a ModuleEnv<'a>,
    module: &'a SourceModule,
    expr_types: Vec<TypeId>,
    globals: SymbolTable,
    scopes: Vec<Scope>,
    self_types: Vec<TypeId>,
    diagnostics: Vec<Diagnostic>,
    closure_counter: u32,
}

impl<'a> Resolver<'a> {
    fn self_type(&self) -> TypeId {
        *self.self_types.last().unwrap_or(&TypeId::DYNAMIC)
    }

    fn location(&self, id: NodeId) -> Location {
        self.module.arena.location(id)
    }

    fn error(&mut self, code: ErrorCode, message: String, location: Location) {
        self.diagnostics
            .push(Diagnostic::error(code, message, self.env.file, location));
    }

    /// Resolve a node, record and return its type.
    fn resolve(&mut self, id: NodeId) -> TypeId {
        let ty = self.resolve_uncached(id);
        self.expr_types[id.index()] = ty;
        ty
    }

    fn resolve_uncached(&mut self, id: NodeId) -> TypeId {
        // Clone is cheap relative to resolution and keeps the borrow of the
        // arena out of the mutable traversal below.
        let node = self.module.arena.node(id).clone();
        match node {
            Node::Int(_) => TypeId::INT,
            Node::Float(_) => TypeId::FLOAT,
            Node::Str(_) => TypeId::STRING,
            Node::True | Node::False => TypeId::BOOLEAN,
            Node::Nil => TypeId::NIL,
            Node::SelfRef => self.self_type(),
            Node::Import { .. } => TypeId::NIL,

            Node::Array(items) => {
                for item in items {
                    self.resolve(item);
                }
                self.env
                    .lookup_type(self.db, "Array")
                    .unwrap_or(TypeId::DYNAMIC)
            }
            Node::Map(entries) => {
                for (key, value) in entries {
                    self.resolve(key);
                    self.resolve(value);
                }
                self.env
                    .lookup_type(self.db, "Map")
                    .unwrap_or(TypeId::DYNAMIC)
            }

            Node::Identifier(name) => self.resolve_identifier(name, id),
            Node::Constant(name) => self.resolve_constant(name, id),

            Node::DefineVar {
                name,
                mutable,
                value_type,
                value,
            } => {
                let value_ty = self.resolve(value);
                let declared = value_type
                    .as_ref()
                    .map(|tr| {
                        self.env
                            .resolve_type_ref(self.db, tr, &mut self.diagnostics)
                    })
                    .unwrap_or(value_ty);

                if !self.db.assignable(value_ty, declared) {
                    self.diagnostics.push(diag::type_mismatch(
                        &self.db.name_of(declared),
                        &self.db.name_of(value_ty),
                        self.env.file,
                        self.location(id),
                    ));
                }

                self.define_binding(name, declared, mutable, self.location(id));
                TypeId::NIL
            }

            Node::AssignVar { name, value } => {
                let value_ty = self.resolve(value);
                match self.lookup_binding(name) {
                    Some(symbol) => {
                        if !symbol.mutable {
                            let text = self.db.interner().lookup(name);
                            self.error(
                                ErrorCode::E2006,
                                format!("the binding `{text}` is immutable"),
                                self.location(id),
                            );
                        }
                        if !self.db.assignable(value_ty, symbol.type_id) {
                            self.diagnostics.push(diag::type_mismatch(
                                &self.db.name_of(symbol.type_id),
                                &self.db.name_of(value_ty),
                                self.env.file,
                                self.location(id),
                            ));
                        }
                        symbol.type_id
                    }
                    None => {
                        self.undefined_identifier(name, id);
                        TypeId::DYNAMIC
                    }
                }
            }

            Node::GetAttribute(name) => {
                match self.db.lookup_attribute(self.self_type(), name) {
                    Some(symbol) => symbol.type_id,
                    None => {
                        let text = self.db.interner().lookup(name);
                        let owner = self.db.name_of(self.self_type());
                        self.error(
                            ErrorCode::E1004,
                            format!("the attribute `{text}` is undefined on `{owner}`"),
                            self.location(id),
                        );
                        TypeId::DYNAMIC
                    }
                }
            }

            Node::SetAttribute { name, value } => {
                let value_ty = self.resolve(value);
                match self.db.lookup_attribute(self.self_type(), name) {
                    Some(symbol) => {
                        if !self.db.assignable(value_ty, symbol.type_id) {
                            self.diagnostics.push(diag::type_mismatch(
                                &self.db.name_of(symbol.type_id),
                                &self.db.name_of(value_ty),
                                self.env.file,
                                self.location(id),
                            ));
                        }
                        symbol.type_id
                    }
                    None => {
                        let text = self.db.interner().lookup(name);
                        let owner = self.db.name_of(self.self_type());
                        self.error(
                            ErrorCode::E1004,
                            format!("the attribute `{text}` is undefined on `{owner}`"),
                            self.location(id),
                        );
                        TypeId::DYNAMIC
                    }
                }
            }

            Node::Send {
                receiver,
                name,
                args,
                type_args,
            } => self.resolve_send(id, receiver, name, &args, &type_args),

            Node::Closure { params, body } => self.resolve_closure(&params, &body),

            Node::If {
                condition,
                then_body,
                else_body,
            } => {
                let cond_ty = self.resolve(condition);
                if !self.db.assignable(cond_ty, TypeId::BOOLEAN) {
                    self.diagnostics.push(diag::type_mismatch(
                        "Boolean",
                        &self.db.name_of(cond_ty),
                        self.env.file,
                        self.location(condition),
                    ));
                }
                let then_ty = self.resolve_body(&then_body);
                let else_ty = self.resolve_body(&else_body);
                if then_ty == else_ty {
                    then_ty
                } else {
                    TypeId::DYNAMIC
                }
            }

            Node::And { left, right } | Node::Or { left, right } => {
                for operand in [left, right] {
                    let ty = self.resolve(operand);
                    if !self.db.assignable(ty, TypeId::BOOLEAN) {
                        self.diagnostics.push(diag::type_mismatch(
                            "Boolean",
                            &self.db.name_of(ty),
                            self.env.file,
                            self.location(operand),
                        ));
                    }
                }
                TypeId::BOOLEAN
            }

            Node::Try {
                body,
                error_name,
                handler,
            } => {
                let body_ty = self.resolve_body(&body);

                self.scopes.push(Scope {
                    table: SymbolTable::new(),
                    boundary: false,
                });
                if let Some(error_name) = error_name {
                    // Thrown values are untyped at the handler boundary.
                    self.define_binding(
                        error_name,
                        TypeId::DYNAMIC,
                        false,
                        self.location(id),
                    );
                }
                let handler_ty = self.resolve_body(&handler);
                self.scopes.pop();

                if handler_ty == body_ty {
                    body_ty
                } else {
                    TypeId::DYNAMIC
                }
            }

            Node::Throw { value } => {
                self.resolve(value);
                TypeId::DYNAMIC
            }

            Node::Return { value } => {
                if let Some(value) = value {
                    self.resolve(value);
                }
                TypeId::DYNAMIC
            }

            Node::MethodDef { name, params, body, .. } => {
                self.resolve_method(id, name, &params, &body);
                TypeId::NIL
            }

            Node::ClassDef { name, body, .. } | Node::TraitDef { name, body, .. } => {
                let qualified =
                    format!("{}.{}", self.env.module_name, self.db.interner().lookup(name));
                let owner = self.db.get(&qualified).unwrap_or(TypeId::DYNAMIC);
                self.self_types.push(owner);
                for member in body {
                    self.resolve(member);
                }
                self.self_types.pop();
                TypeId::NIL
            }

            Node::AttributeDef { name, value, .. } => {
                if let Some(value) = value {
                    let value_ty = self.resolve(value);
                    if let Some(symbol) = self.db.lookup_attribute(self.self_type(), name) {
                        if !self.db.assignable(value_ty, symbol.type_id) {
                            self.diagnostics.push(diag::type_mismatch(
                                &self.db.name_of(symbol.type_id),
                                &self.db.name_of(value_ty),
                                self.env.file,
                                self.location(id),
                            ));
                        }
                    }
                }
                TypeId::NIL
            }
        }
    }

    /// Resolve a body, returning the type of its last expression.
    fn resolve_body(&mut self, body: &[NodeId]) -> TypeId {
        let mut last = TypeId::NIL;
        for &id in body {
            last = self.resolve(id);
        }
        last
    }

    fn resolve_identifier(&mut self, name: Name, id: NodeId) -> TypeId {
        match self.lookup_binding(name) {
            Some(symbol) => symbol.type_id,
            None => {
                self.undefined_identifier(name, id);
                TypeId::DYNAMIC
            }
        }
    }

    /// Name resolution order: innermost local scope outward to the method
    /// boundary, then module globals, then imported module globals, then
    /// prelude globals.
    fn lookup_binding(&self, name: Name) -> Option<Symbol> {
        for scope in self.scopes.iter().rev() {
            if let Some(symbol) = scope.table.lookup(name) {
                return Some(symbol);
            }
            if scope.boundary {
                break;
            }
        }
        if let Some(symbol) = self.globals.lookup(name) {
            return Some(symbol);
        }
        for import in self.env.import_names {
            if let Some(exports) = (self.env.exports)(import) {
                if let Some(symbol) = exports.globals.lookup(name) {
                    return Some(symbol);
                }
            }
        }
        if let Some(prelude) = self.env.prelude {
            if let Some(exports) = (self.env.exports)(prelude) {
                if let Some(symbol) = exports.globals.lookup(name) {
                    return Some(symbol);
                }
            }
        }
        None
    }

    fn undefined_identifier(&mut self, name: Name, id: NodeId) {
        if !self.env.lazy_pending.is_empty() {
            // The name may live in a module behind a pending lazy import.
            return;
        }
        let text = self.db.interner().lookup(name);
        self.diagnostics.push(diag::undefined_identifier(
            &text,
            self.env.file,
            self.location(id),
        ));
    }

    fn resolve_constant(&mut self, name: Name, id: NodeId) -> TypeId {
        let text = self.db.interner().lookup(name);
        match self.env.lookup_type(self.db, &text) {
            Some(type_id) => type_id,
            None => {
                if self.env.lazy_pending.is_empty() {
                    self.error(
                        ErrorCode::E1002,
                        format!("the constant `{text}` is undefined"),
                        self.location(id),
                    );
                }
                TypeId::DYNAMIC
            }
        }
    }

    /// Define a binding in the current scope, or in module globals when no
    /// scope is active (module body).
    fn define_binding(&mut self, name: Name, type_id: TypeId, mutable: bool, location: Location) {
        let table = match self.scopes.last_mut() {
            Some(scope) => &mut scope.table,
            None => &mut self.globals,
        };
        if table.define(name, type_id, mutable).is_err() {
            let text = self.db.interner().lookup(name);
            self.diagnostics.push(Diagnostic::error(
                ErrorCode::E1005,
                format!("the binding `{text}` is already defined in this scope"),
                self.env.file,
                location,
            ));
        }
    }

    fn resolve_send(
        &mut self,
        id: NodeId,
        receiver: Option<NodeId>,
        name: Name,
        args: &[NodeId],
        type_args: &[aven_ir::TypeRef],
    ) -> TypeId {
        let receiver_ty = match receiver {
            Some(node) => self.resolve(node),
            None => self.self_type(),
        };
        let arg_types: Vec<TypeId> = args.iter().map(|&arg| self.resolve(arg)).collect();

        // Sends to `Dynamic` always succeed with a `Dynamic` result; this is
        // the recovery path that stops one unknown name from cascading.
        if receiver_ty.is_dynamic() {
            return TypeId::DYNAMIC;
        }

        // Generic type arguments instantiate the receiver type first.
        let receiver_ty = if type_args.is_empty() {
            receiver_ty
        } else {
            let resolved: Vec<TypeId> = type_args
                .iter()
                .map(|tr| {
                    self.env
                        .resolve_type_ref(self.db, tr, &mut self.diagnostics)
                })
                .collect();
            match self.db.instantiate(receiver_ty, &resolved) {
                Ok(instantiated) => instantiated,
                Err(error) => {
                    let located = self.env.type_error(self.db, &error, self.location(id));
                    self.diagnostics.push(located);
                    return TypeId::DYNAMIC;
                }
            }
        };

        let text = self.db.interner().lookup(name);

        // `Type.new` allocates an instance; argument checking runs against
        // the type's `init` method when it declares one.
        let is_constant_receiver =
            matches!(receiver.map(|r| self.module.arena.node(r)), Some(Node::Constant(_)));
        if text == "new" && is_constant_receiver {
            if let TypeKind::Object = self.db.kind_of(receiver_ty) {
                let init = self.db.interner().intern("init");
                if let Some(symbol) = self.db.lookup_method(receiver_ty, init) {
                    if let TypeKind::Block(sig) = self.db.kind_of(symbol.type_id) {
                        self.check_arguments(id, args, &arg_types, &sig);
                    }
                }
                return receiver_ty;
            }
        }

        match self.db.lookup_method(receiver_ty, name) {
            Some(symbol) => match self.db.kind_of(symbol.type_id) {
                TypeKind::Block(sig) => {
                    self.check_arguments(id, args, &arg_types, &sig);
                    sig.returns
                }
                _ => TypeId::DYNAMIC,
            },
            None => {
                self.diagnostics.push(diag::unknown_message(
                    &self.db.name_of(receiver_ty),
                    &text,
                    self.env.file,
                    self.location(id),
                ));
                TypeId::DYNAMIC
            }
        }
    }

    fn check_arguments(
        &mut self,
        id: NodeId,
        args: &[NodeId],
        arg_types: &[TypeId],
        sig: &BlockSignature,
    ) {
        let count_ok =
            args.len() >= sig.required && (args.len() <= sig.params.len() || sig.rest);
        if !count_ok {
            self.error(
                ErrorCode::E2004,
                format!(
                    "this message takes {} argument(s), but {} were supplied",
                    sig.params.len(),
                    args.len()
                ),
                self.location(id),
            );
            return;
        }

        for (position, (&arg, &arg_ty)) in args.iter().zip(arg_types).enumerate() {
            let expected = if position < sig.params.len() {
                sig.params[position]
            } else if let Some(&last) = sig.params.last() {
                // Extra arguments bind to the rest parameter.
                last
            } else {
                continue;
            };
            if !self.db.assignable(arg_ty, expected) {
                self.diagnostics.push(diag::type_mismatch(
                    &self.db.name_of(expected),
                    &self.db.name_of(arg_ty),
                    self.env.file,
                    self.location(arg),
                ));
            }
        }
    }

    fn resolve_closure(&mut self, params: &[Param], body: &[NodeId]) -> TypeId {
        self.scopes.push(Scope {
            table: SymbolTable::new(),
            boundary: false,
        });

        let mut param_types = Vec::with_capacity(params.len());
        for param in params {
            let ty = param
                .value_type
                .as_ref()
                .map(|tr| {
                    self.env
                        .resolve_type_ref(self.db, tr, &mut self.diagnostics)
                })
                .unwrap_or(TypeId::DYNAMIC);
            param_types.push(ty);
            self.define_binding(param.name, ty, false, param.location);
        }

        let returns = self.resolve_body(body);
        self.scopes.pop();

        self.closure_counter += 1;
        let name = format!("{}.closure#{}", self.env.module_name, self.closure_counter);
        let required = params
            .iter()
            .take_while(|param| param.default.is_none() && !param.rest)
            .count();
        let rest = params.last().map(|param| param.rest).unwrap_or(false);
        self.db
            .define(
                name,
                TypeKind::Block(BlockSignature {
                    params: param_types,
                    required,
                    rest,
                    returns,
                }),
            )
            .unwrap_or(TypeId::DYNAMIC)
    }

    fn resolve_method(&mut self, id: NodeId, name: Name, params: &[Param], body: &[NodeId]) {
        let Some(symbol) = self.db.lookup_attribute(self.self_type(), name) else {
            // Declaration failed earlier; a diagnostic already exists.
            return;
        };
        let TypeKind::Block(sig) = self.db.kind_of(symbol.type_id) else {
            return;
        };

        self.scopes.push(Scope {
            table: SymbolTable::new(),
            boundary: true,
        });
        for (param, &ty) in params.iter().zip(&sig.params) {
            self.define_binding(param.name, ty, false, param.location);
        }

        let body_ty = self.resolve_body(body);
        self.scopes.pop();

        if sig.returns != TypeId::NIL && !self.db.assignable(body_ty, sig.returns) {
            self.diagnostics.push(diag::type_mismatch(
                &self.db.name_of(sig.returns),
                &self.db.name_of(body_ty),
                self.env.file,
                self.location(id),
            ));
        }
    }
}

#[cfg(test)]
mod tests {
    use std::path::{Path, PathBuf};

    use aven_ir::{AstArena, Location, Param, SharedInterner, TypeRef};
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::declare_module;

    struct TestModule {
        db: TypeDatabase,
        module: SourceModule,
    }

    impl TestModule {
        fn new(build: impl FnOnce(&SharedInterner, &mut AstArena) -> Vec<NodeId>) -> Self {
            let interner = SharedInterner::new();
            let db = TypeDatabase::new(interner.clone());
            let mut arena = AstArena::new();
            let body = build(&interner, &mut arena);
            let module = SourceModule {
                name: "main".to_string(),
                path: PathBuf::from("main.av"),
                arena,
                body,
            };
            TestModule { db, module }
        }

        fn run(&self) -> (TypedModule, Vec<Diagnostic>) {
            let env = ModuleEnv {
                module_name: "main",
                file: Path::new("main.av"),
                import_names: &[],
                exports: &|_| None,
                prelude: None,
                lazy_pending: &[],
            };
            let (module_type, mut diagnostics) = declare_module(&self.db, &env, &self.module);
            let (typed, resolution) = resolve_module(&self.db, &env, &self.module, module_type);
            diagnostics.extend(resolution);
            (typed, diagnostics)
        }
    }

    #[test]
    fn test_literal_types() {
        let tm = TestModule::new(|_, arena| {
            vec![
                arena.alloc(Node::Int(1), Location::new(1, 1)),
                arena.alloc(Node::Float(1.5), Location::new(2, 1)),
                arena.alloc(Node::Str("x".to_string()), Location::new(3, 1)),
                arena.alloc(Node::True, Location::new(4, 1)),
                arena.alloc(Node::Nil, Location::new(5, 1)),
            ]
        });
        let (typed, diagnostics) = tm.run();

        assert!(diagnostics.is_empty());
        assert_eq!(typed.expr_type(tm.module.body[0]), TypeId::INT);
        assert_eq!(typed.expr_type(tm.module.body[1]), TypeId::FLOAT);
        assert_eq!(typed.expr_type(tm.module.body[2]), TypeId::STRING);
        assert_eq!(typed.expr_type(tm.module.body[3]), TypeId::BOOLEAN);
        assert_eq!(typed.expr_type(tm.module.body[4]), TypeId::NIL);
    }

    #[test]
    fn test_unknown_message_recovers_to_dynamic() {
        let tm = TestModule::new(|interner, arena| {
            let receiver = arena.alloc(Node::Int(10), Location::new(1, 1));
            let send = arena.alloc(
                Node::Send {
                    receiver: Some(receiver),
                    name: interner.intern("frobnicate"),
                    args: Vec::new(),
                    type_args: Vec::new(),
                },
                Location::new(1, 4),
            );
            // A second send on top of the failed one must not re-report.
            let outer = arena.alloc(
                Node::Send {
                    receiver: Some(send),
                    name: interner.intern("again"),
                    args: Vec::new(),
                    type_args: Vec::new(),
                },
                Location::new(1, 16),
            );
            vec![outer]
        });
        let (typed, diagnostics) = tm.run();

        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].code, ErrorCode::E1003);
        assert_eq!(typed.expr_type(tm.module.body[0]), TypeId::DYNAMIC);
    }

    #[test]
    fn test_immutable_reassignment_is_an_error() {
        let tm = TestModule::new(|interner, arena| {
            let one = arena.alloc(Node::Int(1), Location::new(1, 9));
            let define = arena.alloc(
                Node::DefineVar {
                    name: interner.intern("x"),
                    mutable: false,
                    value_type: None,
                    value: one,
                },
                Location::new(1, 1),
            );
            let two = arena.alloc(Node::Int(2), Location::new(2, 5));
            let assign = arena.alloc(
                Node::AssignVar {
                    name: interner.intern("x"),
                    value: two,
                },
                Location::new(2, 1),
            );
            vec![define, assign]
        });
        let (_, diagnostics) = tm.run();

        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].code, ErrorCode::E2006);
        assert_eq!(diagnostics[0].location, Location::new(2, 1));
    }

    #[test]
    fn test_annotated_definition_checks_the_value() {
        let tm = TestModule::new(|interner, arena| {
            let value = arena.alloc(Node::Str("nope".to_string()), Location::new(1, 14));
            let define = arena.alloc(
                Node::DefineVar {
                    name: interner.intern("n"),
                    mutable: false,
                    value_type: Some(TypeRef::named(
                        interner.intern("Int"),
                        Location::new(1, 8),
                    )),
                    value,
                },
                Location::new(1, 1),
            );
            vec![define]
        });
        let (typed, diagnostics) = tm.run();

        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].code, ErrorCode::E2001);
        // The binding keeps its declared type for later uses.
        let symbol = typed.globals.iter().next().copied();
        assert_eq!(symbol.map(|s| s.type_id), Some(TypeId::INT));
    }

    #[test]
    fn test_undefined_identifier_degrades_to_dynamic() {
        let tm = TestModule::new(|interner, arena| {
            let ident = arena.alloc(
                Node::Identifier(interner.intern("ghost")),
                Location::new(1, 1),
            );
            vec![ident]
        });
        let (typed, diagnostics) = tm.run();

        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].code, ErrorCode::E1001);
        assert_eq!(typed.expr_type(tm.module.body[0]), TypeId::DYNAMIC);
    }

    #[test]
    fn test_if_with_mismatched_branches_is_dynamic() {
        let tm = TestModule::new(|_, arena| {
            let cond = arena.alloc(Node::True, Location::new(1, 4));
            let then_value = arena.alloc(Node::Int(1), Location::new(1, 10));
            let else_value = arena.alloc(Node::Str("s".to_string()), Location::new(1, 18));
            let branch = arena.alloc(
                Node::If {
                    condition: cond,
                    then_body: vec![then_value],
                    else_body: vec![else_value],
                },
                Location::new(1, 1),
            );
            vec![branch]
        });
        let (typed, diagnostics) = tm.run();

        assert!(diagnostics.is_empty());
        assert_eq!(typed.expr_type(tm.module.body[0]), TypeId::DYNAMIC);
    }

    #[test]
    fn test_new_returns_the_class_type() {
        let tm = TestModule::new(|interner, arena| {
            let class = arena.alloc(
                Node::ClassDef {
                    name: interner.intern("Point"),
                    type_params: Vec::new(),
                    prototype: None,
                    traits: Vec::new(),
                    body: Vec::new(),
                },
                Location::new(1, 1),
            );
            let constant = arena.alloc(
                Node::Constant(interner.intern("Point")),
                Location::new(3, 1),
            );
            let send = arena.alloc(
                Node::Send {
                    receiver: Some(constant),
                    name: interner.intern("new"),
                    args: Vec::new(),
                    type_args: Vec::new(),
                },
                Location::new(3, 7),
            );
            vec![class, send]
        });
        let (typed, diagnostics) = tm.run();

        assert!(diagnostics.is_empty());
        let point = tm.db.get("main.Point");
        assert_eq!(Some(typed.expr_type(tm.module.body[1])), point);
    }

    #[test]
    fn test_method_body_sees_params_and_checks_returns() {
        let tm = TestModule::new(|interner, arena| {
            let value = arena.alloc(
                Node::Identifier(interner.intern("n")),
                Location::new(2, 3),
            );
            let method = arena.alloc(
                Node::MethodDef {
                    name: interner.intern("double"),
                    type_params: Vec::new(),
                    params: vec![Param {
                        name: interner.intern("n"),
                        value_type: Some(TypeRef::named(
                            interner.intern("Int"),
                            Location::new(1, 12),
                        )),
                        default: None,
                        rest: false,
                        location: Location::new(1, 11),
                    }],
                    returns: Some(TypeRef::named(
                        interner.intern("Int"),
                        Location::new(1, 18),
                    )),
                    body: vec![value],
                },
                Location::new(1, 1),
            );
            vec![method]
        });
        let (_, diagnostics) = tm.run();

        assert!(diagnostics.is_empty());
    }

    #[test]
    fn test_closure_captures_enclosing_locals() {
        let tm = TestModule::new(|interner, arena| {
            let one = arena.alloc(Node::Int(1), Location::new(1, 9));
            let define = arena.alloc(
                Node::DefineVar {
                    name: interner.intern("captured"),
                    mutable: false,
                    value_type: None,
                    value: one,
                },
                Location::new(1, 1),
            );
            let use_site = arena.alloc(
                Node::Identifier(interner.intern("captured")),
                Location::new(2, 10),
            );
            let closure = arena.alloc(
                Node::Closure {
                    params: Vec::new(),
                    body: vec![use_site],
                },
                Location::new(2, 1),
            );
            vec![define, closure]
        });
        let (typed, diagnostics) = tm.run();

        assert!(diagnostics.is_empty());
        let closure_ty = typed.expr_type(tm.module.body[1]);
        match tm.db.kind_of(closure_ty) {
            TypeKind::Block(sig) => assert_eq!(sig.returns, TypeId::INT),
            other => panic!("expected a block type, found {other:?}"),
        }
    }
}
