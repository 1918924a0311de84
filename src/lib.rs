//! hbcxx: compile, link and run a C++ source file as if it were a script.
//!
//! Directives in `//#!` comments add compiler flags, package requirements
//! and extra sources; `#include "x.h"` pulls in `x.cpp` automatically.

pub mod cli;
pub mod errors;
pub mod launcher;
pub mod logger;
pub mod orchestrator;
pub mod toolset;
pub mod version;

pub use errors::{HbcxxError, exit_code};
pub use launcher::Launcher;
pub use orchestrator::BuildOrchestrator;
pub use toolset::{BuildToolError, FlagPosition, Toolset};
