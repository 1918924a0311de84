//! Shared building blocks for the hbcxx crates: shell-style word handling,
//! source locations, compiler-style diagnostics and the run configuration.

pub mod config;
pub mod diagnostics;
pub mod location;
pub mod shlex;

pub use config::Config;
pub use diagnostics::{Diagnostic, DiagnosticSeverity, emit_diagnostics};
pub use location::SourceLocation;

/// Name used as the prefix of verbose output and of generated file names.
pub const PACKAGE_NAME: &str = "hbcxx";

/// Source extensions understood by the toolchain, in discovery precedence order.
pub const SOURCE_EXTENSIONS: &[&str] = &["cpp", "c++", "C", "cc", "c"];

/// Append `tokens` to `list` unless that exact run of tokens is already
/// present somewhere in `list`. Order is never changed, which keeps library
/// flags valid for single-pass linkers.
///
/// Returns whether anything was appended.
pub fn push_unique(list: &mut Vec<String>, tokens: &[String]) -> bool {
    if tokens.is_empty() || list.windows(tokens.len()).any(|window| window == tokens) {
        return false;
    }
    list.extend_from_slice(tokens);
    true
}
