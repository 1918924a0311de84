//! Subprocess execution with faithful signal semantics.
//!
//! Every spawn that can run for a while masks SIGINT and SIGQUIT in the
//! caller until the child has been reaped, so a keyboard interrupt aimed at
//! the foreground process group is never lost in the window between fork and
//! the child installing its own handlers. The child gets normal delivery back
//! before it execs.

pub mod command;
pub mod runner;
pub mod signals;

pub use command::CommandLine;
pub use runner::{ProcessResult, propagate_status, run, run_capturing_output, run_exec_args};
pub use signals::{SignalMask, discard_pending_interrupts, poll_pending_signals};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("failed to run `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to wait for `{command}`: {source}")]
    Wait {
        command: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to update the signal mask: {0}")]
    Mask(#[from] nix::Error),
    #[error("interrupted by signal {signal}")]
    Interrupted { signal: i32 },
}

pub type Result<T, E = ProcessError> = std::result::Result<T, E>;
