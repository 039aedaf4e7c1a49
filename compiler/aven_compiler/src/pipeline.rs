//! The compilation pipeline.
//!
//! Modules are scheduled in dependency levels derived from the import
//! graph: every module in a level is resolved after all its eager imports,
//! and modules within one level share no edge, so they can run on separate
//! worker threads. The only shared state across workers is the type
//! database, the string interner and the diagnostics sink, all insert-only.
//!
//! After a barrier at the end of resolution the whole program's type model
//! is complete; each module is then lowered to IR, cleaned up, generated
//! and serialized independently. A structural error anywhere aborts the
//! run before any code generation.

use std::fs;
use std::path::PathBuf;

use aven_codegen::{generate_module, image, CompiledModule, InternalError};
use aven_diagnostic::{self as diag, Diagnostic, Diagnostics, ErrorCode};
use aven_ir::{Location, SharedInterner, SourceModule};
use aven_mir::{eliminate_dead_blocks, hoist_literal_globals, lower_module, LoweredModule, UnitId};
use aven_typeck::{
    declare_module, resolve_module, DependencyGraph, GraphError, ModuleEnv, ModuleExports,
    TypedModule,
};
use aven_types::TypeDatabase;
use parking_lot::Mutex;
use rayon::prelude::*;
use rustc_hash::{FxHashMap, FxHashSet};

use crate::config::Config;
use crate::paths::output_path;

/// A non-diagnostic failure of the run: an environment problem or a
/// compiler defect. User-facing errors travel as diagnostics instead.
#[derive(Debug)]
pub enum CompileError {
    Io(std::io::Error),
    Internal(InternalError),
    Encode(image::EncodeError),
}

impl std::fmt::Display for CompileError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CompileError::Io(error) => write!(f, "i/o error: {error}"),
            CompileError::Internal(error) => error.fmt(f),
            CompileError::Encode(error) => error.fmt(f),
        }
    }
}

impl std::error::Error for CompileError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CompileError::Io(error) => Some(error),
            CompileError::Internal(error) => Some(error),
            CompileError::Encode(error) => Some(error),
        }
    }
}

impl From<std::io::Error> for CompileError {
    fn from(error: std::io::Error) -> Self {
        CompileError::Io(error)
    }
}

impl From<InternalError> for CompileError {
    fn from(error: InternalError) -> Self {
        CompileError::Internal(error)
    }
}

impl From<image::EncodeError> for CompileError {
    fn from(error: image::EncodeError) -> Self {
        CompileError::Encode(error)
    }
}

/// One module's result: the generated code, and the output path when the
/// module resolved cleanly enough for its bytecode to be written.
pub struct ModuleOutcome {
    pub name: String,
    pub code: CompiledModule,
    /// `None` when the module carries error diagnostics; generation still
    /// runs (errors recover to `Dynamic`), but broken bytecode never lands
    /// in the content-addressed cache.
    pub path: Option<PathBuf>,
}

/// The result of a whole run.
pub struct RunOutcome {
    /// All diagnostics, ordered by file and position for batch reporting.
    pub diagnostics: Vec<Diagnostic>,
    pub modules: Vec<ModuleOutcome>,
}

impl RunOutcome {
    /// Whether the CLI layer should exit nonzero.
    pub fn has_errors(&self) -> bool {
        self.diagnostics.iter().any(Diagnostic::is_error)
    }
}

/// A compiler instance: the configuration plus the string interner the
/// external loader interns source names through.
pub struct Compiler {
    config: Config,
    interner: SharedInterner,
}

impl Compiler {
    pub fn new(config: Config) -> Self {
        Compiler {
            config,
            interner: SharedInterner::new(),
        }
    }

    /// The interner module loaders must intern AST names through.
    pub fn interner(&self) -> &SharedInterner {
        &self.interner
    }

    /// Compile a set of parsed modules.
    #[tracing::instrument(level = "debug", skip_all, fields(modules = modules.len()))]
    pub fn compile(&self, modules: &[SourceModule]) -> Result<RunOutcome, CompileError> {
        let db = TypeDatabase::new(self.interner.clone());
        let sink = Diagnostics::new();

        let mut seen = FxHashSet::default();
        for module in modules {
            if !seen.insert(module.name.as_str()) {
                sink.record(Diagnostic::error(
                    ErrorCode::E3004,
                    format!("the module `{}` appears more than once in this run", module.name),
                    &module.path,
                    Location::DUMMY,
                ));
            }
        }
        if sink.has_structural_errors() {
            return Ok(finish(&sink, Vec::new()));
        }

        let by_name: FxHashMap<&str, &SourceModule> = modules
            .iter()
            .map(|module| (module.name.as_str(), module))
            .collect();

        let levels = match self.build_levels(modules) {
            Ok(levels) => levels,
            Err(error) => {
                sink.record(self.graph_diagnostic(&error, &by_name));
                return Ok(finish(&sink, Vec::new()));
            }
        };

        let exports: Mutex<FxHashMap<String, ModuleExports>> = Mutex::new(FxHashMap::default());
        let typed: Mutex<FxHashMap<String, TypedModule>> = Mutex::new(FxHashMap::default());

        for level in &levels {
            // Lazy imports of modules resolved in an earlier level are
            // settled; the rest stay pending, and name misses against them
            // degrade silently instead of diagnosing.
            let done: FxHashSet<String> = exports.lock().keys().cloned().collect();
            let resolve_one = |name: &String| {
                let Some(&module) = by_name.get(name.as_str()) else {
                    return;
                };
                let imports = module.imports();
                let import_names: Vec<String> =
                    imports.iter().map(|(to, _)| to.clone()).collect();
                let lazy_pending: Vec<String> = imports
                    .iter()
                    .filter(|(to, lazy)| *lazy && !done.contains(to))
                    .map(|(to, _)| to.clone())
                    .collect();
                let lookup = |name: &str| exports.lock().get(name).cloned();
                let env = ModuleEnv {
                    module_name: &module.name,
                    file: &module.path,
                    import_names: &import_names,
                    exports: &lookup,
                    prelude: self.config.prelude.as_deref(),
                    lazy_pending: &lazy_pending,
                };

                let (module_type, declared) = declare_module(&db, &env, module);
                sink.record_all(declared);
                let (resolved, resolution) = resolve_module(&db, &env, module, module_type);
                sink.record_all(resolution);

                exports.lock().insert(
                    module.name.clone(),
                    ModuleExports {
                        module_type,
                        globals: resolved.globals.clone(),
                    },
                );
                typed.lock().insert(module.name.clone(), resolved);
            };

            if self.config.parallel {
                level.par_iter().for_each(resolve_one);
            } else {
                level.iter().for_each(resolve_one);
            }
        }

        // Barrier: the type model is complete. Structural errors abort the
        // run before any module generates code.
        if sink.has_structural_errors() {
            return Ok(finish(&sink, Vec::new()));
        }

        let typed = typed.into_inner();
        let generate_one = |module: &SourceModule| -> Result<Option<ModuleOutcome>, CompileError> {
            let Some(resolved) = typed.get(&module.name) else {
                return Ok(None);
            };
            Ok(Some(self.generate(module, resolved, &sink)?))
        };
        let generated: Result<Vec<Option<ModuleOutcome>>, CompileError> = if self.config.parallel {
            modules.par_iter().map(generate_one).collect()
        } else {
            modules.iter().map(generate_one).collect()
        };
        let outcomes = generated?.into_iter().flatten().collect();

        Ok(finish(&sink, outcomes))
    }

    /// Build the dependency levels. The prelude, when configured, becomes
    /// an implicit eager import of every other module so it always lands
    /// in an earlier level than its users.
    fn build_levels(&self, modules: &[SourceModule]) -> Result<Vec<Vec<String>>, GraphError> {
        let mut graph = DependencyGraph::new();
        for module in modules {
            graph.add_module(&module.name);
        }
        for module in modules {
            for (to, lazy) in module.imports() {
                graph.add_import(&module.name, to, lazy);
            }
            if let Some(prelude) = &self.config.prelude {
                if module.name != *prelude {
                    graph.add_import(&module.name, prelude, false);
                }
            }
        }
        graph.levels()
    }

    fn graph_diagnostic(
        &self,
        error: &GraphError,
        by_name: &FxHashMap<&str, &SourceModule>,
    ) -> Diagnostic {
        match error {
            GraphError::Cycle(cycle) => {
                let file = cycle
                    .first()
                    .and_then(|name| by_name.get(name.as_str()))
                    .map(|module| module.path.clone())
                    .unwrap_or_default();
                diag::import_cycle(cycle, &file, Location::DUMMY)
            }
            GraphError::UnknownModule { from, to } => {
                let file = by_name
                    .get(from.as_str())
                    .map(|module| module.path.clone())
                    .unwrap_or_default();
                Diagnostic::error(
                    ErrorCode::E3005,
                    format!("the module `{from}` imports `{to}`, which the loader did not supply"),
                    file,
                    Location::DUMMY,
                )
            }
        }
    }

    /// Lower, clean up, generate and (when error-free) serialize one module.
    fn generate(
        &self,
        module: &SourceModule,
        resolved: &TypedModule,
        sink: &Diagnostics,
    ) -> Result<ModuleOutcome, CompileError> {
        let (lowered, lowering) = lower_module(module, resolved, &self.interner);
        sink.record_all(lowering);

        let LoweredModule { mut arena, root } = lowered;
        hoist_literal_globals(arena.get_mut(root));
        for index in 0..arena.len() {
            eliminate_dead_blocks(arena.get_mut(UnitId::from_raw(index as u32)));
        }

        let imports: Vec<String> = module.imports().into_iter().map(|(to, _)| to).collect();
        let code = generate_module(&module.name, &imports, &arena, root, &self.interner)?;

        let path = if sink.has_errors_for(&module.path) {
            None
        } else {
            let path = output_path(&self.config.output_root, &module.path);
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(&path, image::to_bytes(&code)?)?;
            Some(path)
        };

        Ok(ModuleOutcome {
            name: module.name.clone(),
            code,
            path,
        })
    }
}

fn finish(sink: &Diagnostics, modules: Vec<ModuleOutcome>) -> RunOutcome {
    let mut diagnostics = sink.take_all();
    diagnostics.sort_by(|a, b| {
        (&a.file, a.location.line, a.location.column)
            .cmp(&(&b.file, b.location.line, b.location.column))
    });
    RunOutcome {
        diagnostics,
        modules,
    }
}
