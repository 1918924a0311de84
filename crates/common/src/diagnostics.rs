//! Compiler-style diagnostics (`path:line:col: error: message`).

use std::fmt;
use std::path::{Path, PathBuf};

use crate::location::SourceLocation;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosticSeverity {
    Error,
    InternalError,
}

impl fmt::Display for DiagnosticSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            DiagnosticSeverity::Error => "error",
            DiagnosticSeverity::InternalError => "internal error",
        };
        f.write_str(label)
    }
}

/// A single report about a source file, rendered the way native compilers do
/// so editors can jump to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub severity: DiagnosticSeverity,
    pub path: PathBuf,
    pub location: SourceLocation,
    pub message: String,
    pub notes: Vec<String>,
}

impl Diagnostic {
    pub fn new(
        severity: DiagnosticSeverity,
        path: impl AsRef<Path>,
        location: SourceLocation,
        message: impl Into<String>,
    ) -> Self {
        Self {
            severity,
            path: path.as_ref().to_path_buf(),
            location,
            message: message.into(),
            notes: Vec::new(),
        }
    }

    pub fn error(path: impl AsRef<Path>, location: SourceLocation, message: impl Into<String>) -> Self {
        Self::new(DiagnosticSeverity::Error, path, location, message)
    }

    pub fn internal_error(
        path: impl AsRef<Path>,
        location: SourceLocation,
        message: impl Into<String>,
    ) -> Self {
        Self::new(DiagnosticSeverity::InternalError, path, location, message)
    }

    /// Attach an indented follow-up line (tool output, the offending value...).
    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        let note = note.into();
        let trimmed = note.trim_end();
        if !trimmed.is_empty() {
            self.notes.push(trimmed.to_string());
        }
        self
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}: {}: {}",
            self.path.display(),
            self.location,
            self.severity,
            self.message
        )?;
        for note in &self.notes {
            for line in note.lines() {
                write!(f, "\n     {line}")?;
            }
        }
        Ok(())
    }
}

/// Print diagnostics to standard error in the order they were produced.
pub fn emit_diagnostics(diagnostics: &[Diagnostic]) {
    for diagnostic in diagnostics {
        eprintln!("{diagnostic}");
    }
}
