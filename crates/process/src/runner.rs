use std::fmt;
use std::io::Read;
use std::os::unix::process::{CommandExt, ExitStatusExt};
use std::path::Path;
use std::process::{Command, ExitStatus, Stdio};

use tracing::debug;

use crate::command::CommandLine;
use crate::signals::{self, SignalMask};
use crate::{ProcessError, Result};

/// How a child process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessResult {
    /// Normal exit with a status in `0..=255`.
    Exited(i32),
    /// Killed by `signal`.
    Signaled { signal: i32, core_dumped: bool },
}

impl ProcessResult {
    pub fn success(&self) -> bool {
        matches!(self, ProcessResult::Exited(0))
    }

    pub fn code(&self) -> Option<i32> {
        match self {
            ProcessResult::Exited(code) => Some(*code),
            ProcessResult::Signaled { .. } => None,
        }
    }

    pub fn signal(&self) -> Option<i32> {
        match self {
            ProcessResult::Exited(_) => None,
            ProcessResult::Signaled { signal, .. } => Some(*signal),
        }
    }
}

impl From<ExitStatus> for ProcessResult {
    fn from(status: ExitStatus) -> Self {
        match status.signal() {
            Some(signal) => ProcessResult::Signaled {
                signal,
                core_dumped: status.core_dumped(),
            },
            None => ProcessResult::Exited(status.code().unwrap_or(-1)),
        }
    }
}

impl fmt::Display for ProcessResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProcessResult::Exited(code) => write!(f, "exit status {code}"),
            ProcessResult::Signaled {
                signal,
                core_dumped,
            } => {
                write!(f, "terminated by {}", signals::signal_name(*signal))?;
                if *core_dumped {
                    f.write_str(" (core dumped)")?;
                }
                Ok(())
            }
        }
    }
}

/// Spawn `command` with inherited standard streams and wait for it.
pub fn run(command: &CommandLine) -> Result<ProcessResult> {
    debug!("running: {command}");
    spawn_and_wait(command.to_command(), &command.to_string())
}

/// Spawn `path` with an explicit argument vector; `args[0]` becomes the
/// child's `argv[0]`. No shell is involved, so arguments are passed through
/// byte for byte.
pub fn run_exec_args(path: &Path, args: &[String]) -> Result<ProcessResult> {
    let mut command = Command::new(path);
    if let Some((arg0, rest)) = args.split_first() {
        command.arg0(arg0).args(rest);
    }

    let shown = common::shlex::join(args);
    debug!("running {} as: {shown}", path.display());
    spawn_and_wait(command, &shown)
}

/// Spawn `command` and collect its standard output.
///
/// Standard error is inherited (unless discarded). The signal mask is left
/// alone, so this is meant for short queries rather than interactive or
/// long-running programs.
pub fn run_capturing_output(command: &CommandLine) -> Result<(ProcessResult, String)> {
    debug!("running: {command}");
    let display = command.to_string();

    let mut cmd = command.to_command();
    cmd.stdin(Stdio::null()).stdout(Stdio::piped());

    let mut child = cmd.spawn().map_err(|source| ProcessError::Spawn {
        command: display.clone(),
        source,
    })?;

    let mut bytes = Vec::new();
    if let Some(mut stdout) = child.stdout.take() {
        stdout
            .read_to_end(&mut bytes)
            .map_err(|source| ProcessError::Wait {
                command: display.clone(),
                source,
            })?;
    }

    let status = child.wait().map_err(|source| ProcessError::Wait {
        command: display,
        source,
    })?;

    Ok((status.into(), String::from_utf8_lossy(&bytes).into_owned()))
}

fn spawn_and_wait(mut command: Command, display: &str) -> Result<ProcessResult> {
    let _mask = SignalMask::block()?;

    // SAFETY: the hook only calls pthread_sigmask, which is async-signal-safe.
    unsafe {
        command.pre_exec(signals::restore_child_signals);
    }

    let mut child = command.spawn().map_err(|source| ProcessError::Spawn {
        command: display.to_string(),
        source,
    })?;

    let status = child.wait().map_err(|source| ProcessError::Wait {
        command: display.to_string(),
        source,
    })?;

    Ok(status.into())
}

/// Turn a child's termination into our own.
///
/// A normal exit yields its code for the caller to return. Death by signal
/// never returns: the same signal is raised against this process so the
/// invoking shell observes exactly what it would have seen running the
/// program directly.
pub fn propagate_status(result: ProcessResult) -> i32 {
    match result {
        ProcessResult::Exited(code) => code,
        ProcessResult::Signaled { signal, .. } => signals::reraise(signal),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reports_exit_codes() {
        assert!(run(&CommandLine::new("true")).unwrap().success());
        assert_eq!(
            run(&CommandLine::shell("exit 3")).unwrap(),
            ProcessResult::Exited(3)
        );
    }

    #[test]
    fn reports_signal_death() {
        let result = run(&CommandLine::shell("kill -KILL $$")).unwrap();
        assert_eq!(result.signal(), Some(libc::SIGKILL));
        assert_eq!(result.code(), None);
        assert_eq!(result.to_string(), "terminated by SIGKILL");
    }

    #[test]
    fn missing_program_is_a_spawn_error() {
        let err = run(&CommandLine::new("/definitely/not/a/program")).unwrap_err();
        assert!(matches!(err, ProcessError::Spawn { .. }));
    }

    #[test]
    fn captures_standard_output_verbatim() {
        let (result, output) =
            run_capturing_output(&CommandLine::shell("printf '%s\\n' '-I/x -lfoo'")).unwrap();
        assert!(result.success());
        assert_eq!(output, "-I/x -lfoo\n");
    }

    #[test]
    fn captured_failure_keeps_status() {
        let (result, output) = run_capturing_output(
            &CommandLine::shell("echo oops >&2; exit 1").discard_stderr(),
        )
        .unwrap();
        assert_eq!(result, ProcessResult::Exited(1));
        assert!(output.is_empty());
    }

    #[test]
    fn exec_args_sets_argv0_without_shell_quoting() {
        let args = vec![
            "visible-name".to_string(),
            "-c".to_string(),
            "test \"$0\" = visible-name".to_string(),
        ];
        let result = run_exec_args(Path::new("/bin/sh"), &args).unwrap();
        assert_eq!(result, ProcessResult::Exited(0));
    }

    #[test]
    fn normal_exit_propagates_code() {
        assert_eq!(propagate_status(ProcessResult::Exited(0)), 0);
        assert_eq!(propagate_status(ProcessResult::Exited(42)), 42);
    }
}
