use std::fs;
use std::path::{Path, PathBuf};

use cache::{ToolchainCache, ToolchainRecord};
use common::{Config, push_unique, shlex};
use process::{CommandLine, ProcessError, ProcessResult, run, run_capturing_output};
use thiserror::Error;
use tracing::{debug, warn};
use unit::processor::CXX_OVERRIDE_FLAG;
use unit::{CompilationUnit, UnitError};

/// Compilers probed, in order, when nothing else names one.
const CANDIDATE_COMPILERS: &[&str] = &["g++", "clang++", "c++"];

const LANGUAGE_STANDARD: &str = "-std=c++11";

const PROBE_FILE: &str = "cxx11check.cpp";

/// Small enough to check quickly, but needs `auto`, `unique_ptr` and lambdas.
const PROBE_PROGRAM: &str = "#include <memory>
int main()
{
    auto p = std::unique_ptr<int>{new int{0}};
    auto deref = [&](){ return *p; };
    return deref();
}
";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlagPosition {
    /// Before every other flag
    Early,
    Normal,
    /// Compile only, after the unit's private flags
    Late,
}

#[derive(Debug, Error)]
pub enum BuildToolError {
    #[error("cannot auto-detect a C++11 compiler (tried {})", CANDIDATE_COMPILERS.join(", "))]
    NoCompiler,
    #[error("compiler command is empty")]
    EmptyCompiler,
    #[error("`{command}` failed ({result})")]
    Failed {
        command: String,
        result: ProcessResult,
    },
    #[error("nothing to link")]
    NothingToLink,
    #[error(transparent)]
    Process(#[from] ProcessError),
    #[error(transparent)]
    Unit(#[from] UnitError),
}

/// The compiler plus the flags shared by every compile and the link.
pub struct Toolset<'a> {
    config: &'a Config,
    cache: ToolchainCache,
    directive_cxx: Option<String>,
    compiler: Option<Vec<String>>,
    flags: Vec<String>,
    late_flags: Vec<String>,
}

impl<'a> Toolset<'a> {
    pub fn new(config: &'a Config) -> Self {
        let mut toolset = Self {
            config,
            cache: ToolchainCache::new(&config.cache_root),
            directive_cxx: None,
            compiler: None,
            flags: Vec::new(),
            late_flags: Vec::new(),
        };

        if config.debugger.is_some() {
            toolset.push_flag("-g", FlagPosition::Early);
        }
        if let Some(level) = &config.optimization {
            toolset.push_flag(format!("-O{level}"), FlagPosition::Late);
        }
        toolset
    }

    pub fn flags(&self) -> &[String] {
        &self.flags
    }

    pub fn late_flags(&self) -> &[String] {
        &self.late_flags
    }

    /// Handle `--hbcxx-cxx=` here; returns whether `flag` was consumed.
    fn intercept(&mut self, flag: &str) -> bool {
        let Some(cxx) = flag.strip_prefix(CXX_OVERRIDE_FLAG) else {
            return false;
        };

        if self.config.cxx.is_some() {
            debug!("ignoring cxx: {cxx} (compiler set explicitly)");
        } else if self.compiler.is_some() {
            warn!("cxx: {cxx} seen after the compiler was already chosen; ignored");
        } else {
            self.directive_cxx = Some(cxx.to_string());
        }
        true
    }

    pub fn push_flag(&mut self, flag: impl Into<String>, position: FlagPosition) {
        let flag = flag.into();
        if self.intercept(&flag) {
            return;
        }
        match position {
            FlagPosition::Early => self.flags.insert(0, flag),
            FlagPosition::Normal => self.flags.push(flag),
            FlagPosition::Late => self.late_flags.push(flag),
        }
    }

    /// Push a run of flags, skipping it if the same run is already present.
    pub fn push_flags(&mut self, flags: &[String], position: FlagPosition) {
        let mut run = Vec::with_capacity(flags.len());
        for flag in flags {
            if !self.intercept(flag) {
                run.push(flag.clone());
            }
        }

        match position {
            FlagPosition::Early => {
                if !self.flags.windows(run.len().max(1)).any(|window| window == run) {
                    self.flags.splice(0..0, run);
                }
            }
            FlagPosition::Normal => {
                push_unique(&mut self.flags, &run);
            }
            FlagPosition::Late => {
                push_unique(&mut self.late_flags, &run);
            }
        }
    }

    /// The compiler command words, choosing them on first use.
    pub fn compiler(&mut self) -> Result<&[String], BuildToolError> {
        if self.compiler.is_none() {
            let words = self.resolve_compiler()?;
            debug!("using compiler: {}", shlex::join(&words));
            self.compiler = Some(words);
        }
        Ok(self.compiler.as_deref().unwrap_or_default())
    }

    fn resolve_compiler(&self) -> Result<Vec<String>, BuildToolError> {
        if let Some(explicit) = &self.config.cxx {
            return non_empty(shlex::split(explicit));
        }

        if let Some(directive) = &self.directive_cxx {
            let mut words = ccache_prefix();
            words.extend(shlex::split(directive));
            return non_empty(words);
        }

        if let Some(record) = self.cache.lookup() {
            return non_empty(record.command_words());
        }

        let ccache = !ccache_prefix().is_empty();
        let compiler = CANDIDATE_COMPILERS
            .iter()
            .copied()
            .find(|candidate| self.cxx11_check(candidate))
            .ok_or(BuildToolError::NoCompiler)?;

        let record = ToolchainRecord::new(compiler, ccache);
        if let Err(err) = self.cache.store(&record) {
            warn!("could not remember toolchain choice: {err:#}");
        }
        Ok(record.command_words())
    }

    /// Whether `cxx` compiles the probe program.
    fn cxx11_check(&self, cxx: &str) -> bool {
        let root = &self.config.cache_root;
        if let Err(err) = fs::create_dir_all(root) {
            warn!("cannot create {}: {}", root.display(), err);
            return false;
        }

        let probe = root.join(PROBE_FILE);
        if let Err(err) = fs::write(&probe, PROBE_PROGRAM) {
            warn!("cannot write {}: {}", probe.display(), err);
            return false;
        }
        let object = probe.with_extension("o");

        let command = CommandLine::new(cxx)
            .arg(LANGUAGE_STANDARD)
            .arg("-c")
            .arg(path_arg(&probe))
            .arg("-o")
            .arg(path_arg(&object))
            .discard_stderr();
        let usable = matches!(run_capturing_output(&command), Ok((result, _)) if result.success());
        let _ = fs::remove_file(&object);

        debug!("probing {cxx}: {}", if usable { "usable" } else { "unusable" });
        usable
    }

    pub fn compile_command(
        &mut self,
        unit: &mut CompilationUnit,
    ) -> Result<CommandLine, BuildToolError> {
        let object = unit.object_file_name(self.config)?;
        let source = path_arg(unit.processed_file_name());
        let private = unit.private_flags().to_vec();

        let command = self
            .base_command()?
            .arg("-c")
            .arg(source)
            .arg("-o")
            .arg(path_arg(&object))
            .args(self.flags.iter().cloned())
            .args(private)
            .args(self.late_flags.iter().cloned());
        Ok(command)
    }

    pub fn link_command(
        &mut self,
        units: &mut [CompilationUnit],
    ) -> Result<(CommandLine, PathBuf), BuildToolError> {
        let config = self.config;
        let mut sources = units.iter_mut().filter(|unit| !unit.is_header());
        let primary = sources.next().ok_or(BuildToolError::NothingToLink)?;
        let executable = primary.executable_file_name(config)?;

        let mut objects = vec![path_arg(&primary.object_file_name(config)?)];
        for unit in sources {
            objects.push(path_arg(&unit.object_file_name(config)?));
        }

        let command = self
            .base_command()?
            .arg("-o")
            .arg(path_arg(&executable))
            .args(objects)
            .args(self.flags.iter().cloned());
        Ok((command, executable))
    }

    pub fn compile(&mut self, unit: &mut CompilationUnit) -> Result<(), BuildToolError> {
        let command = self.compile_command(unit)?;
        execute(&command)
    }

    /// Link every source unit, in order, into the first one's executable.
    pub fn link(&mut self, units: &mut [CompilationUnit]) -> Result<PathBuf, BuildToolError> {
        let (command, executable) = self.link_command(units)?;
        execute(&command)?;
        Ok(executable)
    }

    fn base_command(&mut self) -> Result<CommandLine, BuildToolError> {
        let words = self.compiler()?.to_vec();
        let command = CommandLine::from_words(words).ok_or(BuildToolError::EmptyCompiler)?;
        Ok(command.arg(LANGUAGE_STANDARD))
    }
}

fn execute(command: &CommandLine) -> Result<(), BuildToolError> {
    let result = run(command)?;
    if !result.success() {
        return Err(BuildToolError::Failed {
            command: command.to_string(),
            result,
        });
    }
    Ok(())
}

fn non_empty(words: Vec<String>) -> Result<Vec<String>, BuildToolError> {
    if words.is_empty() {
        return Err(BuildToolError::EmptyCompiler);
    }
    Ok(words)
}

/// `["ccache"]` when ccache runs, otherwise empty (with a warning).
fn ccache_prefix() -> Vec<String> {
    let probe = CommandLine::new("ccache").arg("--version").discard_stderr();
    match run_capturing_output(&probe) {
        Ok((result, _)) if result.success() => vec!["ccache".to_string()],
        _ => {
            warn!("cannot auto-detect ccache (build will be slow)");
            Vec::new()
        }
    }
}

fn path_arg(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}
