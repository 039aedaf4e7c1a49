//! Import dependency graph.
//!
//! Modules are compiled in levels: a module's imports must finish type
//! resolution before the module itself resolves, and modules within one
//! level are independent, so the driver runs them in parallel. Cycles are
//! permitted only when at least one edge of the cycle is a lazy import;
//! lazy edges do not order compilation.

use rustc_hash::{FxHashMap, FxHashSet};
use std::fmt;

/// An import edge.
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct Edge {
    pub from: String,
    pub to: String,
    pub lazy: bool,
}

/// Error building a compile order.
#[derive(Clone, Eq, PartialEq, Debug)]
pub enum GraphError {
    /// A cycle with no lazy boundary; the run must abort.
    Cycle(Vec<String>),
    /// An import of a module that was not supplied to the run.
    UnknownModule { from: String, to: String },
}

impl fmt::Display for GraphError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GraphError::Cycle(cycle) => write!(
                f,
                "modules {} import each other without a lazy boundary",
                cycle.join(" -> ")
            ),
            GraphError::UnknownModule { from, to } => {
                write!(f, "module `{from}` imports unknown module `{to}`")
            }
        }
    }
}

impl std::error::Error for GraphError {}

/// The import graph of one compilation run.
#[derive(Default)]
pub struct DependencyGraph {
    modules: Vec<String>,
    edges: Vec<Edge>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_module(&mut self, name: impl Into<String>) {
        self.modules.push(name.into());
    }

    pub fn add_import(&mut self, from: impl Into<String>, to: impl Into<String>, lazy: bool) {
        self.edges.push(Edge {
            from: from.into(),
            to: to.into(),
            lazy,
        });
    }

    /// Compute the compile order as levels of independent modules.
    ///
    /// Only eager edges order compilation. A cycle among eager edges is a
    /// structural error; a cycle broken by at least one lazy edge is fine
    /// because that edge never enters the ordering.
    pub fn levels(&self) -> Result<Vec<Vec<String>>, GraphError> {
        let known: FxHashSet<&str> = self.modules.iter().map(String::as_str).collect();
        for edge in &self.edges {
            if !known.contains(edge.to.as_str()) {
                return Err(GraphError::UnknownModule {
                    from: edge.from.clone(),
                    to: edge.to.clone(),
                });
            }
        }

        // Eager in-degrees, iterated in insertion order for determinism.
        let mut deps: FxHashMap<&str, Vec<&str>> = FxHashMap::default();
        for edge in &self.edges {
            if !edge.lazy {
                deps.entry(edge.from.as_str())
                    .or_default()
                    .push(edge.to.as_str());
            }
        }

        let mut placed: FxHashSet<&str> = FxHashSet::default();
        let mut remaining: Vec<&str> = self.modules.iter().map(String::as_str).collect();
        let mut levels = Vec::new();

        while !remaining.is_empty() {
            let ready: Vec<&str> = remaining
                .iter()
                .copied()
                .filter(|name| {
                    deps.get(name)
                        .map(|targets| targets.iter().all(|t| placed.contains(t)))
                        .unwrap_or(true)
                })
                .collect();

            if ready.is_empty() {
                return Err(GraphError::Cycle(self.find_cycle(&remaining)));
            }

            remaining.retain(|name| !ready.contains(name));
            for name in &ready {
                placed.insert(name);
            }
            levels.push(ready.into_iter().map(String::from).collect());
        }

        Ok(levels)
    }

    /// Recover one eager cycle among the stuck modules, for the diagnostic.
    fn find_cycle(&self, stuck: &[&str]) -> Vec<String> {
        let stuck_set: FxHashSet<&str> = stuck.iter().copied().collect();
        let eager_out = |from: &str| -> Vec<&str> {
            self.edges
                .iter()
                .filter(|e| !e.lazy && e.from == from && stuck_set.contains(e.to.as_str()))
                .map(|e| e.to.as_str())
                .collect()
        };

        let Some(&start) = stuck.first() else {
            return Vec::new();
        };

        let mut path: Vec<&str> = vec![start];
        let mut current = start;

        loop {
            let Some(&next) = eager_out(current).first() else {
                return path.iter().map(|s| s.to_string()).collect();
            };
            if let Some(pos) = path.iter().position(|&p| p == next) {
                let mut cycle: Vec<String> = path[pos..].iter().map(|s| s.to_string()).collect();
                cycle.push(next.to_string());
                return cycle;
            }
            path.push(next);
            current = next;
        }
    }
}
