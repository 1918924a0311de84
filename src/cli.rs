use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use common::{Config, PACKAGE_NAME};
use process::{ProcessResult, SignalMask, discard_pending_interrupts, propagate_status};
use tracing::{debug, warn};

use crate::errors::{HbcxxError, exit_code};
use crate::launcher::Launcher;
use crate::logger;
use crate::orchestrator::BuildOrchestrator;
use crate::toolset::{FlagPosition, Toolset};
use crate::version::VERSION;

/// Prefix shared by every option the tool keeps for itself.
pub const OPTION_PREFIX: &str = "--hbcxx-";

/// Environment variable naming an alternative rc file.
pub const RC_FILE_ENV: &str = "HBCXXRC";

const RC_FILE_NAME: &str = ".hbcxxrc";

const USAGE: &str = "\
USAGE: hbcxx [TOOLSET OPTION]... [SOURCE FILE] [PROGRAM OPTION]...
Compile, link and execute the supplied source file. Run C++ source
code as a script.

The following arguments control hbcxx and can be included anywhere on
the command line.

  --hbcxx-cxx=COMPILER    Use COMPILER to compile and link the program
  --hbcxx-debugger=DBG    Use DBG to debug the program
  --hbcxx-executable=EXE  Write executable file to EXE, then exit
  --hbcxx-help            Show this help, then exit
  --hbcxx-save-temps      Do not delete temporary files
  --hbcxx-Ox              Override the optimization level, set to x
  --hbcxx-verbose         Show commands as they are executed
  --hbcxx-version         Show hbcxx version information, then exit

Options may also be given one per line in ~/.hbcxxrc (or $HBCXXRC).
";

/// The options hbcxx keeps for itself. Everything else on the command line
/// belongs to the toolset or to the program.
#[derive(Parser, Debug, Default, Clone, PartialEq, Eq)]
#[command(
    name = "hbcxx",
    no_binary_name = true,
    disable_help_flag = true,
    disable_version_flag = true,
    args_override_self = true
)]
pub struct HbcxxOptions {
    #[arg(long = "hbcxx-cxx", value_name = "COMPILER", require_equals = true)]
    /// Compiler used to compile and link the program.
    pub cxx: Option<String>,

    #[arg(long = "hbcxx-debugger", value_name = "DBG", require_equals = true)]
    /// Debugger (or wrapper such as valgrind) used to run the program.
    pub debugger: Option<String>,

    #[arg(long = "hbcxx-executable", value_name = "EXE", require_equals = true)]
    /// Write the executable here and exit without running it.
    pub executable: Option<PathBuf>,

    #[arg(long = "hbcxx-help")]
    pub help: bool,

    #[arg(long = "hbcxx-save-temps")]
    /// Keep processed copies, objects and the executable.
    pub save_temps: bool,

    #[arg(long = "hbcxx-O", value_name = "LEVEL", require_equals = true)]
    /// Optimization level.
    pub optimization: Option<String>,

    #[arg(long = "hbcxx-verbose")]
    /// Show commands as they are executed.
    pub verbose: bool,

    #[arg(long = "hbcxx-version")]
    pub version: bool,
}

/// `--hbcxx-O2` is spelled without `=`; clap needs one.
fn normalize_option(arg: &str) -> String {
    match arg.strip_prefix("--hbcxx-O") {
        Some(level) if !level.starts_with('=') => format!("--hbcxx-O={level}"),
        _ => arg.to_string(),
    }
}

/// Turn an rc file line into a long option (`verbose`, `hbcxx-verbose` and
/// `--hbcxx-verbose` are all accepted).
fn rc_line_to_option(line: &str) -> String {
    let option = if line.starts_with(OPTION_PREFIX) {
        line.to_string()
    } else if line.starts_with("hbcxx-") {
        format!("--{line}")
    } else {
        format!("{OPTION_PREFIX}{line}")
    };
    normalize_option(&option)
}

/// Options read from an rc file, plus complaints about lines that were not.
#[derive(Debug, Default)]
pub struct RcFile {
    pub options: Vec<String>,
    pub warnings: Vec<String>,
}

impl RcFile {
    pub fn parse(path: &Path, text: &str) -> Self {
        let mut rc = RcFile::default();
        for (index, raw) in text.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let option = rc_line_to_option(line);
            if HbcxxOptions::try_parse_from([option.as_str()]).is_ok() {
                rc.options.push(option);
            } else {
                rc.warnings.push(format!(
                    "{}:{}: bad option: {}",
                    path.display(),
                    index + 1,
                    line
                ));
            }
        }
        rc
    }

    /// Read `path`; a missing file is simply empty.
    pub fn load(path: &Path) -> Result<Self> {
        match fs::read_to_string(path) {
            Ok(text) => Ok(Self::parse(path, &text)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(err) => Err(err).with_context(|| format!("failed to read {}", path.display())),
        }
    }
}

pub fn rc_file_path() -> Option<PathBuf> {
    if let Some(path) = std::env::var_os(RC_FILE_ENV).filter(|path| !path.is_empty()) {
        return Some(PathBuf::from(path));
    }
    directories::BaseDirs::new().map(|dirs| dirs.home_dir().join(RC_FILE_NAME))
}

/// A command line split into its three audiences.
#[derive(Debug, Default)]
pub struct Invocation {
    pub options: HbcxxOptions,
    pub toolset_flags: Vec<String>,
    pub script: Option<PathBuf>,
    pub program_args: Vec<String>,
    /// `-h` or `--help` was seen before any script.
    pub wants_help: bool,
}

impl Invocation {
    /// `rc_options` come first so the command line overrides them.
    pub fn parse(args: Vec<String>, rc_options: &[String]) -> Result<Self, clap::Error> {
        let mut own = rc_options.to_vec();
        let mut invocation = Invocation::default();

        for arg in args {
            if arg.starts_with(OPTION_PREFIX) {
                own.push(normalize_option(&arg));
                continue;
            }

            if invocation.script.is_some() {
                invocation.program_args.push(arg);
            } else if Path::new(&arg).is_file() {
                invocation.script = Some(PathBuf::from(arg));
            } else {
                if arg == "-h" || arg == "--help" {
                    invocation.wants_help = true;
                }
                invocation.toolset_flags.push(arg);
            }
        }

        invocation.options = HbcxxOptions::try_parse_from(own)?;
        Ok(invocation)
    }

    /// Build the run configuration; `env` looks up environment variables.
    pub fn config(&self, env: impl Fn(&str) -> Option<String>) -> Result<Config> {
        let lookup = |name: &str| env(name).filter(|value| !value.is_empty());

        let cache_root = match lookup(cache::path::CACHE_DIR_ENV) {
            Some(dir) => PathBuf::from(dir),
            None => cache::cache_root().context("cannot locate a cache directory")?,
        };

        let mut config = Config::new(cache_root);
        config.verbose = self.options.verbose;
        config.save_temps = self.options.save_temps;
        config.cxx = non_empty(&self.options.cxx).or_else(|| lookup("CXX"));
        config.debugger = non_empty(&self.options.debugger);
        config.executable = self.options.executable.clone();
        config.optimization = non_empty(&self.options.optimization);
        if let Some(pkg_config) = lookup("PKG_CONFIG") {
            config.pkg_config = pkg_config;
        }
        Ok(config)
    }
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value.clone().filter(|value| !value.is_empty())
}

fn print_usage() {
    print!("{USAGE}");
}

fn report(err: &HbcxxError) {
    if err.already_reported() {
        return;
    }
    eprintln!("{PACKAGE_NAME}: {err}");
    if matches!(err, HbcxxError::NoInputFile) {
        eprintln!("Try '{PACKAGE_NAME} --hbcxx-help' for more information.");
    }
}

/// Entry point: returns the process exit status. May not return at all if
/// the program was killed by a signal, which is then re-raised.
pub fn run() -> i32 {
    let args: Vec<String> = std::env::args_os()
        .skip(1)
        .map(|arg| arg.to_string_lossy().into_owned())
        .collect();

    let rc = match rc_file_path().map(|path| RcFile::load(&path)).transpose() {
        Ok(rc) => rc.unwrap_or_default(),
        Err(err) => {
            eprintln!("{PACKAGE_NAME}: warning: {err:#}");
            RcFile::default()
        }
    };

    let invocation = match Invocation::parse(args, &rc.options) {
        Ok(invocation) => invocation,
        Err(err) => {
            let _ = err.print();
            eprintln!("Try '{PACKAGE_NAME} --hbcxx-help' for more information.");
            return exit_code::NO_INPUT;
        }
    };

    if invocation.options.help {
        print_usage();
        return exit_code::SUCCESS;
    }
    if invocation.options.version {
        println!("{PACKAGE_NAME} {VERSION}");
        return exit_code::SUCCESS;
    }

    logger::init_logging(invocation.options.verbose);
    for warning in &rc.warnings {
        warn!("{warning}");
    }

    let Some(script) = invocation.script.clone() else {
        if invocation.wants_help {
            print_usage();
            return exit_code::SUCCESS;
        }
        let err = HbcxxError::NoInputFile;
        report(&err);
        return err.exit_code();
    };

    let config = match invocation.config(|name| std::env::var(name).ok()) {
        Ok(config) => config,
        Err(err) => {
            let err = HbcxxError::Internal(err);
            report(&err);
            return err.exit_code();
        }
    };

    execute(&config, &script, &invocation)
}

/// Build and launch `script`. Interrupts stay pending (not lost) until the
/// temporaries are gone.
fn execute(config: &Config, script: &Path, invocation: &Invocation) -> i32 {
    let mask = match SignalMask::block() {
        Ok(mask) => mask,
        Err(err) => {
            let err = HbcxxError::from(err);
            report(&err);
            return err.exit_code();
        }
    };

    let mut toolset = Toolset::new(config);
    toolset.push_flags(&invocation.toolset_flags, FlagPosition::Normal);

    let mut orchestrator = BuildOrchestrator::new(config, script);
    let executable = match orchestrator.build(&mut toolset) {
        Ok(executable) => executable,
        Err(err) => {
            // delivers any pending interrupt now that cleanup is done
            drop(mask);
            report(&err);
            return err.exit_code();
        }
    };

    if config.builds_only() {
        debug!("executable written to {}", executable.display());
        return exit_code::SUCCESS;
    }

    let launcher = Launcher::from_config(config);
    debug!("launching {} with {:?}", executable.display(), launcher);
    let launched = launcher.launch(orchestrator.primary_mut(), config, &invocation.program_args);
    orchestrator.primary_mut().remove_executable(config);

    match launched {
        Ok(result @ ProcessResult::Signaled { .. }) => propagate_status(result),
        Ok(result) => {
            // the program had its chance to handle the interrupt
            discard_pending_interrupts();
            drop(mask);
            propagate_status(result)
        }
        Err(err) => {
            drop(mask);
            report(&err);
            err.exit_code()
        }
    }
}
