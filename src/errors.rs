use process::ProcessError;
use thiserror::Error;
use unit::{DirectiveError, UnitError};

use crate::toolset::BuildToolError;

/// Exit statuses of the tool itself (a launched program's status is passed
/// through untouched).
pub mod exit_code {
    pub const SUCCESS: i32 = 0;
    pub const DIRECTIVE: i32 = 127;
    pub const BUILD_TOOL: i32 = 126;
    pub const NO_INPUT: i32 = 125;
    pub const INTERNAL: i32 = 124;
    pub const INTERRUPTED: i32 = 130;
}

#[derive(Debug, Error)]
pub enum HbcxxError {
    #[error(transparent)]
    Directive(#[from] DirectiveError),
    #[error(transparent)]
    BuildTool(#[from] BuildToolError),
    #[error("cannot find file to execute")]
    NoInputFile,
    #[error("failed to launch program: {0}")]
    Launch(#[source] ProcessError),
    #[error(transparent)]
    Unit(#[from] UnitError),
    #[error(transparent)]
    Process(#[from] ProcessError),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl HbcxxError {
    pub fn exit_code(&self) -> i32 {
        match self {
            _ if self.interrupt_signal().is_some() => exit_code::INTERRUPTED,
            HbcxxError::Directive(DirectiveError::Unit(UnitError::HeaderRewrite { .. })) => {
                exit_code::DIRECTIVE
            }
            HbcxxError::Directive(
                DirectiveError::ProcessingFailed { .. } | DirectiveError::Read { .. },
            ) => exit_code::DIRECTIVE,
            HbcxxError::BuildTool(_) | HbcxxError::Launch(_) => exit_code::BUILD_TOOL,
            HbcxxError::NoInputFile => exit_code::NO_INPUT,
            HbcxxError::Directive(_)
            | HbcxxError::Unit(_)
            | HbcxxError::Process(_)
            | HbcxxError::Internal(_) => exit_code::INTERNAL,
        }
    }

    /// SIGINT/SIGQUIT that stopped the pipeline, if any.
    pub fn interrupt_signal(&self) -> Option<i32> {
        match self {
            HbcxxError::Directive(err) => err.interrupt_signal(),
            HbcxxError::Process(ProcessError::Interrupted { signal }) => Some(*signal),
            _ => None,
        }
    }

    /// Directive failures have already been printed as diagnostics.
    pub fn already_reported(&self) -> bool {
        matches!(
            self,
            HbcxxError::Directive(DirectiveError::ProcessingFailed { .. })
        )
    }
}

pub type Result<T, E = HbcxxError> = std::result::Result<T, E>;
