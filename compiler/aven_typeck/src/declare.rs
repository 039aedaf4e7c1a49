//! Declaration phase.
//!
//! Populates the type database with every type-level fact of a module
//! before any body is resolved: class and trait entities first (so they
//! can reference each other regardless of order), then prototypes,
//! implemented traits, type parameters, attributes and method signatures.

use aven_diagnostic::{Diagnostic, ErrorCode};
use aven_ir::{Node, NodeId, Param, SourceModule, TypeParamDef};
use aven_types::{BlockSignature, TypeDatabase, TypeId, TypeKind};

use crate::ModuleEnv;

/// Declare a module's types, returning the module's own object type and the
/// diagnostics the declaration produced.
#[tracing::instrument(level = "debug", skip_all, fields(module = env.module_name))]
pub fn declare_module(
    db: &TypeDatabase,
    env: &ModuleEnv<'_>,
    module: &SourceModule,
) -> (TypeId, Vec<Diagnostic>) {
    let mut diagnostics = Vec::new();

    let module_type = match db.define(env.module_name, TypeKind::Object) {
        Ok(id) => id,
        Err(error) => {
            diagnostics.push(Diagnostic::error(
                ErrorCode::E3004,
                error.to_string(),
                env.file,
                aven_ir::Location::DUMMY,
            ));
            // Reuse the existing entity so the rest of the run can continue;
            // the structural diagnostic already dooms code generation.
            db.get(env.module_name).unwrap_or(TypeId::DYNAMIC)
        }
    };

    // First sweep: create the named entities.
    for &id in &module.body {
        match module.arena.node(id) {
            Node::ClassDef { name, .. } => {
                let qualified = format!("{}.{}", env.module_name, db.interner().lookup(*name));
                if let Err(error) = db.define(qualified, TypeKind::Object) {
                    diagnostics.push(env.type_error(db, &error, module.arena.location(id)));
                }
            }
            Node::TraitDef { name, .. } => {
                let qualified = format!("{}.{}", env.module_name, db.interner().lookup(*name));
                if let Err(error) = db.define(qualified, TypeKind::Trait) {
                    diagnostics.push(env.type_error(db, &error, module.arena.location(id)));
                }
            }
            _ => {}
        }
    }

    // Second sweep: prototypes, traits, type parameters and signatures.
    for &id in &module.body {
        match module.arena.node(id) {
            Node::ClassDef {
                name,
                type_params,
                prototype,
                traits,
                body,
            } => {
                let qualified = format!("{}.{}", env.module_name, db.interner().lookup(*name));
                let Some(owner) = db.get(&qualified) else {
                    continue;
                };

                declare_type_params(db, env, owner, &qualified, type_params, &mut diagnostics);

                if let Some(proto_ref) = prototype {
                    let proto = env.resolve_type_ref(db, proto_ref, &mut diagnostics);
                    if !proto.is_dynamic() {
                        if let Err(error) = db.set_prototype(owner, proto) {
                            diagnostics.push(env.type_error(db, &error, proto_ref.location));
                        }
                    }
                }

                for trait_ref in traits {
                    let implemented = env.resolve_type_ref(db, trait_ref, &mut diagnostics);
                    if !implemented.is_dynamic() {
                        db.add_implemented_trait(owner, implemented);
                    }
                }

                declare_members(db, env, module, owner, &qualified, body, &mut diagnostics);
            }
            Node::TraitDef {
                name,
                type_params,
                required,
                body,
            } => {
                let qualified = format!("{}.{}", env.module_name, db.interner().lookup(*name));
                let Some(owner) = db.get(&qualified) else {
                    continue;
                };

                declare_type_params(db, env, owner, &qualified, type_params, &mut diagnostics);

                for required_ref in required {
                    let req = env.resolve_type_ref(db, required_ref, &mut diagnostics);
                    if !req.is_dynamic() {
                        db.add_required_trait(owner, req);
                    }
                }

                declare_members(db, env, module, owner, &qualified, body, &mut diagnostics);
            }
            Node::MethodDef { .. } => {
                declare_method(
                    db,
                    env,
                    module,
                    module_type,
                    env.module_name,
                    id,
                    &mut diagnostics,
                );
            }
            _ => {}
        }
    }

    (module_type, diagnostics)
}

/// Declare the type parameters of a generic type or method.
fn declare_type_params(
    db: &TypeDatabase,
    env: &ModuleEnv<'_>,
    owner: TypeId,
    owner_name: &str,
    params: &[TypeParamDef],
    diagnostics: &mut Vec<Diagnostic>,
) {
    for param in params {
        let qualified = format!("{owner_name}.{}", db.interner().lookup(param.name));
        let param_id = match db.define(qualified, TypeKind::TypeParameter) {
            Ok(id) => id,
            Err(error) => {
                diagnostics.push(env.type_error(db, &error, param.location));
                continue;
            }
        };
        for bound in &param.required {
            let required = env.resolve_type_ref(db, bound, diagnostics);
            if !required.is_dynamic() {
                db.add_required_trait(param_id, required);
            }
        }
        db.add_type_param(owner, param_id);
    }
}

/// Declare the attributes and method signatures inside a class or trait body.
fn declare_members(
    db: &TypeDatabase,
    env: &ModuleEnv<'_>,
    module: &SourceModule,
    owner: TypeId,
    owner_name: &str,
    body: &[NodeId],
    diagnostics: &mut Vec<Diagnostic>,
) {
    for &member in body {
        match module.arena.node(member) {
            Node::AttributeDef {
                name,
                value_type,
                mutable,
                ..
            } => {
                let attr_type = value_type
                    .as_ref()
                    .map(|tr| env.resolve_type_ref(db, tr, diagnostics))
                    .unwrap_or(TypeId::DYNAMIC);
                if let Err(error) = db.define_attribute(owner, *name, attr_type, *mutable) {
                    diagnostics.push(env.type_error(db, &error, module.arena.location(member)));
                }
            }
            Node::MethodDef { .. } => {
                declare_method(db, env, module, owner, owner_name, member, diagnostics);
            }
            _ => {}
        }
    }
}

/// Declare one method: a block type entity plus an attribute on the owner.
fn declare_method(
    db: &TypeDatabase,
    env: &ModuleEnv<'_>,
    module: &SourceModule,
    owner: TypeId,
    owner_name: &str,
    id: NodeId,
    diagnostics: &mut Vec<Diagnostic>,
) {
    let Node::MethodDef {
        name,
        type_params,
        params,
        returns,
        ..
    } = module.arena.node(id)
    else {
        return;
    };

    let signature = block_signature(db, env, params, returns.as_ref(), diagnostics);
    let qualified = format!("{owner_name}.{}", db.interner().lookup(*name));
    let block = match db.define(qualified.clone(), TypeKind::Block(signature)) {
        Ok(block) => block,
        Err(error) => {
            diagnostics.push(env.type_error(db, &error, module.arena.location(id)));
            return;
        }
    };

    declare_type_params(db, env, block, &qualified, type_params, diagnostics);

    if let Err(error) = db.define_attribute(owner, *name, block, false) {
        diagnostics.push(env.type_error(db, &error, module.arena.location(id)));
    }
}

/// Build a block signature from source parameters and return annotation.
fn block_signature(
    db: &TypeDatabase,
    env: &ModuleEnv<'_>,
    params: &[Param],
    returns: Option<&aven_ir::TypeRef>,
    diagnostics: &mut Vec<Diagnostic>,
) -> BlockSignature {
    let param_types: Vec<TypeId> = params
        .iter()
        .map(|param| {
            param
                .value_type
                .as_ref()
                .map(|tr| env.resolve_type_ref(db, tr, diagnostics))
                .unwrap_or(TypeId::DYNAMIC)
        })
        .collect();
    let required = params
        .iter()
        .take_while(|param| param.default.is_none() && !param.rest)
        .count();
    let rest = params.last().map(|param| param.rest).unwrap_or(false);
    let return_type = returns
        .map(|tr| env.resolve_type_ref(db, tr, diagnostics))
        .unwrap_or(TypeId::NIL);

    BlockSignature {
        params: param_types,
        required,
        rest,
        returns: return_type,
    }
}
