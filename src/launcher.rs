use std::path::Path;

use common::{Config, shlex};
use process::{CommandLine, ProcessResult, run, run_exec_args};
use tracing::debug;
use unit::CompilationUnit;

use crate::errors::{HbcxxError, Result};

/// How the linked program gets started.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Launcher {
    /// Exec the program directly, presenting the script path as `argv[0]`.
    Plain,
    /// `gdb <exe>`, stopping at `main` with the program arguments preset.
    DebuggerWrapped,
    /// `<command> <exe> [args]`
    GenericWrapper { command: String, forward_args: bool },
}

impl Launcher {
    pub fn from_config(config: &Config) -> Self {
        match config.debugger.as_deref() {
            None | Some("") => Launcher::Plain,
            Some("gdb") => Launcher::DebuggerWrapped,
            Some(debugger) => Launcher::GenericWrapper {
                command: debugger.to_string(),
                forward_args: debugger == "valgrind" || debugger.starts_with("valgrind "),
            },
        }
    }

    /// The wrapper command line, or `None` for a plain launch.
    pub fn wrapper_command(&self, executable: &Path, args: &[String]) -> Option<CommandLine> {
        let exe = executable.to_string_lossy().into_owned();
        match self {
            Launcher::Plain => None,
            Launcher::DebuggerWrapped => {
                let mut command = CommandLine::new("gdb").arg(exe);
                if !args.is_empty() {
                    command = command
                        .args(["-ex", "break main", "-ex"])
                        .arg(format!("run {}", shlex::join(args)));
                }
                Some(command)
            }
            Launcher::GenericWrapper {
                command,
                forward_args,
            } => {
                let wrapper = CommandLine::from_shell_words(command)?.arg(exe);
                Some(if *forward_args {
                    wrapper.args(args.iter().cloned())
                } else {
                    wrapper
                })
            }
        }
    }

    pub fn launch(
        &self,
        unit: &mut CompilationUnit,
        config: &Config,
        args: &[String],
    ) -> Result<ProcessResult> {
        let executable = unit.executable_file_name(config)?;

        let result = match self.wrapper_command(&executable, args) {
            Some(command) => run(&command),
            None => {
                let mut argv = Vec::with_capacity(args.len() + 1);
                argv.push(unit.input_file_name().to_string_lossy().into_owned());
                argv.extend(args.iter().cloned());
                run_exec_args(&executable, &argv)
            }
        };

        let result = result.map_err(HbcxxError::Launch)?;
        debug!("program finished: {result}");
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|arg| arg.to_string()).collect()
    }

    fn launcher_for(debugger: Option<&str>) -> Launcher {
        let mut config = Config::new("/tmp");
        config.debugger = debugger.map(str::to_string);
        Launcher::from_config(&config)
    }

    #[test]
    fn chooses_launcher_from_debugger() {
        assert_eq!(launcher_for(None), Launcher::Plain);
        assert_eq!(launcher_for(Some("gdb")), Launcher::DebuggerWrapped);
        assert_eq!(
            launcher_for(Some("valgrind --leak-check=full")),
            Launcher::GenericWrapper {
                command: "valgrind --leak-check=full".into(),
                forward_args: true
            }
        );
        assert_eq!(
            launcher_for(Some("lldb")),
            Launcher::GenericWrapper {
                command: "lldb".into(),
                forward_args: false
            }
        );
    }

    #[test]
    fn gdb_presets_arguments() {
        let exe = Path::new("/tmp/prog");
        let command = Launcher::DebuggerWrapped
            .wrapper_command(exe, &args(&["a b", "c"]))
            .unwrap();
        assert_eq!(command.program(), "gdb");
        assert_eq!(
            command.arguments(),
            args(&["/tmp/prog", "-ex", "break main", "-ex", "run 'a b' c"]).as_slice()
        );

        let bare = Launcher::DebuggerWrapped.wrapper_command(exe, &[]).unwrap();
        assert_eq!(bare.arguments(), args(&["/tmp/prog"]).as_slice());
    }

    #[test]
    fn wrappers_forward_arguments_only_for_valgrind() {
        let exe = Path::new("/tmp/prog");
        let valgrind = launcher_for(Some("valgrind -q"))
            .wrapper_command(exe, &args(&["x"]))
            .unwrap();
        assert_eq!(valgrind.to_string(), "valgrind -q /tmp/prog x");

        let other = launcher_for(Some("strace"))
            .wrapper_command(exe, &args(&["x"]))
            .unwrap();
        assert_eq!(other.to_string(), "strace /tmp/prog");

        assert!(Launcher::Plain.wrapper_command(exe, &args(&["x"])).is_none());
    }
}
