//! Run configuration, built once at startup and passed by reference into the
//! pipeline.

use std::path::PathBuf;

/// Default package-metadata query command.
pub const DEFAULT_PKG_CONFIG: &str = "pkg-config";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Echo every command and removal to the log.
    pub verbose: bool,
    /// Keep the processed copies, objects and executable.
    pub save_temps: bool,
    /// Explicit compiler command (may contain a launcher such as `ccache g++`).
    pub cxx: Option<String>,
    /// Debugger or wrapper used to launch the program.
    pub debugger: Option<String>,
    /// Write the executable here and exit without running it.
    pub executable: Option<PathBuf>,
    /// Optimization level passed as `-O<level>`.
    pub optimization: Option<String>,
    /// Per-user root for relocated artifacts and the toolchain record.
    pub cache_root: PathBuf,
    /// Package-metadata query command (flag-split before use).
    pub pkg_config: String,
}

impl Config {
    pub fn new(cache_root: impl Into<PathBuf>) -> Self {
        Self {
            verbose: false,
            save_temps: false,
            cxx: None,
            debugger: None,
            executable: None,
            optimization: None,
            cache_root: cache_root.into(),
            pkg_config: DEFAULT_PKG_CONFIG.to_string(),
        }
    }

    pub fn with_pkg_config(mut self, command: impl Into<String>) -> Self {
        self.pkg_config = command.into();
        self
    }

    pub fn with_cxx(mut self, cxx: impl Into<String>) -> Self {
        self.cxx = Some(cxx.into());
        self
    }

    pub fn with_executable(mut self, executable: impl Into<PathBuf>) -> Self {
        self.executable = Some(executable.into());
        self
    }

    /// True when the executable is the requested product rather than a temporary.
    pub fn builds_only(&self) -> bool {
        self.executable.is_some()
    }
}
