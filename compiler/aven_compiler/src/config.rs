//! Compilation run configuration.

use std::path::PathBuf;

/// Settings for one compilation run.
#[derive(Clone, Debug)]
pub struct Config {
    /// Root directory bytecode files are written under, sharded by the
    /// source-path hash.
    pub output_root: PathBuf,
    /// Module whose globals terminate the name-resolution chain. Every
    /// other module implicitly depends on it.
    pub prelude: Option<String>,
    /// Compile independent modules on separate worker threads.
    pub parallel: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            output_root: PathBuf::from("build"),
            prelude: None,
            parallel: true,
        }
    }
}

impl Config {
    pub fn new(output_root: impl Into<PathBuf>) -> Self {
        Config {
            output_root: output_root.into(),
            ..Config::default()
        }
    }

    pub fn with_prelude(mut self, module: impl Into<String>) -> Self {
        self.prelude = Some(module.into());
        self
    }

    pub fn sequential(mut self) -> Self {
        self.parallel = false;
        self
    }
}
