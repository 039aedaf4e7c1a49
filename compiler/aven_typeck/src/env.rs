//! Shared resolution context for one module.

use std::path::Path;

use aven_diagnostic::{Diagnostic, ErrorCode};
use aven_ir::{Location, TypeRef};
use aven_types::{SymbolTable, TypeDatabase, TypeId};

/// The resolved surface another module sees when importing this one.
#[derive(Clone)]
pub struct ModuleExports {
    /// The module's own object type.
    pub module_type: TypeId,
    /// Module-level globals, in definition order.
    pub globals: SymbolTable,
}

/// Name environment of the module being resolved: its own name, the modules
/// it imports (eager ones resolved, lazy ones possibly not yet), and the
/// prelude module terminating the search chain.
pub struct ModuleEnv<'a> {
    pub module_name: &'a str,
    pub file: &'a Path,
    /// Imported module names, in import order.
    pub import_names: &'a [String],
    /// Exports of resolved modules, including imports and the prelude.
    pub exports: &'a dyn Fn(&str) -> Option<ModuleExports>,
    /// Name of the prelude module, if one is configured.
    pub prelude: Option<&'a str>,
    /// Lazy imports whose modules have not completed resolution yet. While
    /// any are pending, names that cannot be found degrade to `Dynamic`
    /// silently instead of producing a diagnostic, since they may live in
    /// the pending module.
    pub lazy_pending: &'a [String],
}

impl<'a> ModuleEnv<'a> {
    /// Resolve a source type reference to a type id.
    ///
    /// Search order: this module's types, imported modules' types, bare
    /// (builtin) names, prelude types. Unresolvable references and failed
    /// generic instantiations produce one diagnostic and degrade to
    /// `Dynamic`.
    pub fn resolve_type_ref(
        &self,
        db: &TypeDatabase,
        type_ref: &TypeRef,
        diagnostics: &mut Vec<Diagnostic>,
    ) -> TypeId {
        let text = db.interner().lookup(type_ref.name);
        let Some(base) = self.lookup_type(db, &text) else {
            if self.lazy_pending.is_empty() {
                diagnostics.push(Diagnostic::error(
                    ErrorCode::E1002,
                    format!("the type `{text}` is undefined"),
                    self.file,
                    type_ref.location,
                ));
            }
            return TypeId::DYNAMIC;
        };

        let resolved = if type_ref.type_args.is_empty() {
            base
        } else {
            let args: Vec<TypeId> = type_ref
                .type_args
                .iter()
                .map(|arg| self.resolve_type_ref(db, arg, diagnostics))
                .collect();
            match db.instantiate(base, &args) {
                Ok(id) => id,
                Err(error) => {
                    diagnostics.push(self.type_error(db, &error, type_ref.location));
                    return TypeId::DYNAMIC;
                }
            }
        };

        if type_ref.optional {
            db.intern_optional(resolved)
        } else {
            resolved
        }
    }

    /// Look up a type by bare name through the module's search chain.
    pub fn lookup_type(&self, db: &TypeDatabase, name: &str) -> Option<TypeId> {
        if let Some(id) = db.get(&format!("{}.{name}", self.module_name)) {
            return Some(id);
        }
        for import in self.import_names {
            if let Some(id) = db.get(&format!("{import}.{name}")) {
                return Some(id);
            }
        }
        if let Some(id) = db.get(name) {
            return Some(id);
        }
        if let Some(prelude) = self.prelude {
            if let Some(id) = db.get(&format!("{prelude}.{name}")) {
                return Some(id);
            }
        }
        None
    }

    /// Convert a type model error into a located diagnostic.
    pub fn type_error(
        &self,
        _db: &TypeDatabase,
        error: &aven_types::TypeError,
        location: Location,
    ) -> Diagnostic {
        let code = match error {
            aven_types::TypeError::DuplicateType(_) => ErrorCode::E3002,
            aven_types::TypeError::DuplicateAttribute { .. } => ErrorCode::E2005,
            aven_types::TypeError::PrototypeCycle(_) => ErrorCode::E3003,
            aven_types::TypeError::TypeArgumentCount { .. } => ErrorCode::E2003,
            aven_types::TypeError::UnsatisfiedBound { .. } => ErrorCode::E2002,
        };
        Diagnostic::error(code, error.to_string(), self.file, location)
    }
}
