use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use common::{Config, Diagnostic, SourceLocation, emit_diagnostics, shlex};
use once_cell::sync::Lazy;
use process::{ProcessError, poll_pending_signals};
use regex::{Regex, bytes};
use thiserror::Error;
use tracing::{debug, warn};

use crate::magic::{self, MagicInclude};
use crate::requires::{PackageQuery, RequirementError};
use crate::resolver::{IncludePath, SourceResolver};
use crate::unit::{CompilationUnit, UnitError};

/// Introduces a directive. Being a comment, it is invisible to the compiler.
pub const MARKER: &str = "//#!";

/// Pseudo-flag carrying a `cxx:` compiler override to the toolset.
pub const CXX_OVERRIDE_FLAG: &str = "--hbcxx-cxx=";

static RAW_HASH_BANG: Lazy<bytes::Regex> =
    Lazy::new(|| bytes::Regex::new(r"^([ \t]*)#!").expect("hash-bang pattern is valid"));

static KEY_VALUE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^([A-Za-z_]*)[ \t]*:[ \t]*(.*)$").expect("key/value pattern is valid")
});

#[derive(Debug, Error)]
pub enum DirectiveError {
    #[error("{}: {count} directive error(s)", .path.display())]
    ProcessingFailed { path: PathBuf, count: usize },
    #[error(transparent)]
    Unit(#[from] UnitError),
    #[error("failed to read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Interrupted(ProcessError),
}

impl DirectiveError {
    /// The signal that cut the scan short, if that is what happened.
    pub fn interrupt_signal(&self) -> Option<i32> {
        match self {
            DirectiveError::Interrupted(ProcessError::Interrupted { signal }) => Some(*signal),
            _ => None,
        }
    }
}

/// What follows the marker on a line.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Directive<'l> {
    /// `//#! -lfoo -DBAR`
    Flags(&'l str),
    /// `//#! name: value`
    KeyValue { name: &'l str, value: &'l str },
    /// `//#!/usr/bin/env hbcxx`, left behind by a defused interpreter line
    Interpreter,
    Unknown(&'l str),
}

impl<'l> Directive<'l> {
    fn parse(rest: &'l str) -> Self {
        let text = rest.trim_start_matches([' ', '\t']);
        if text.starts_with('-') {
            return Directive::Flags(text);
        }
        if let Some(captures) = KEY_VALUE.captures(text)
            && let (Some(name), Some(value)) = (captures.get(1), captures.get(2))
        {
            return Directive::KeyValue {
                name: name.as_str(),
                value: value.as_str().trim_end(),
            };
        }
        if text.starts_with('/') {
            return Directive::Interpreter;
        }
        Directive::Unknown(text.trim_end())
    }
}

/// Byte offset of the first marker that is not inside a string literal.
///
/// A marker preceded by an odd number of unescaped `"` is taken to be inside
/// a literal. Raw strings, character literals and multi-line constructs are
/// not understood.
fn find_marker(line: &str) -> Option<usize> {
    line.match_indices(MARKER)
        .map(|(offset, _)| offset)
        .find(|&offset| unescaped_quotes(&line[..offset]) % 2 == 0)
}

fn unescaped_quotes(text: &str) -> usize {
    let mut count = 0;
    let mut escaped = false;
    for c in text.chars() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' => escaped = true,
            '"' => count += 1,
            _ => {}
        }
    }
    count
}

fn line_directive(path: &Path) -> String {
    let name = path
        .display()
        .to_string()
        .replace('\\', "\\\\")
        .replace('"', "\\\"");
    format!("#line 1 \"{name}\"\n")
}

/// Scans one unit for directives and includes.
pub struct DirectiveProcessor<'a> {
    config: &'a Config,
    packages: PackageQuery,
}

/// Per-scan state.
struct Scan<'u> {
    unit: &'u mut CompilationUnit,
    resolver: SourceResolver,
    discovered: Vec<CompilationUnit>,
    diagnostics: Vec<Diagnostic>,
}

impl<'a> DirectiveProcessor<'a> {
    pub fn new(config: &'a Config) -> Self {
        Self {
            config,
            packages: PackageQuery::new(config.pkg_config.as_str()),
        }
    }

    /// Scan `unit`, updating its flags, and return the units it refers to.
    ///
    /// Every directive error in the file is reported before failing. The
    /// processed copy is only written when a line had to be changed.
    pub fn process(
        &self,
        unit: &mut CompilationUnit,
    ) -> Result<Vec<CompilationUnit>, DirectiveError> {
        let path = unit.input_file_name().to_path_buf();
        debug!("scanning {}", path.display());

        let source = fs::read(&path).map_err(|source| DirectiveError::Read {
            path: path.clone(),
            source,
        })?;

        let mut scan = Scan {
            resolver: SourceResolver::for_unit(&path),
            unit,
            discovered: Vec::new(),
            diagnostics: Vec::new(),
        };

        let mut output = Vec::with_capacity(source.len() + 64);
        output.extend_from_slice(line_directive(&path).as_bytes());
        let mut dirty = false;

        // Lines are copied byte for byte; only the matching runs on a
        // lossily decoded view.
        for (index, chunk) in source.split_inclusive(|byte| *byte == b'\n').enumerate() {
            if let Err(err) = poll_pending_signals() {
                emit_diagnostics(&scan.diagnostics);
                return Err(DirectiveError::Interrupted(err));
            }

            let line = RAW_HASH_BANG.replace(chunk, &b"${1}//#!"[..]);
            if line.as_ref() != chunk {
                dirty = true;
            }

            let body = line.strip_suffix(b"\n").unwrap_or(line.as_ref());
            self.scan_line(&mut scan, &path, index, &String::from_utf8_lossy(body));

            output.extend_from_slice(&line);
        }

        scan.unit.mark_scanned();
        emit_diagnostics(&scan.diagnostics);
        if !scan.diagnostics.is_empty() {
            return Err(DirectiveError::ProcessingFailed {
                path,
                count: scan.diagnostics.len(),
            });
        }

        if dirty {
            self.write_processed(scan.unit, &output)?;
        }

        Ok(scan.discovered)
    }

    fn scan_line(&self, scan: &mut Scan<'_>, path: &Path, index: usize, line: &str) {
        if let Some(offset) = find_marker(line) {
            let location = SourceLocation::from_offset(index, line, offset);
            let rest = &line[offset + MARKER.len()..];
            self.apply_directive(scan, path, location, Directive::parse(rest));
        }

        match IncludePath::from_line(line) {
            Some(IncludePath::Local(target)) => {
                let header = scan.resolver.resolve(&target);
                if header.is_file() {
                    push_discovered(scan, CompilationUnit::header(&header));
                }
                if let Some(source) = scan.resolver.find_source_file(&header) {
                    push_discovered(scan, CompilationUnit::source(source));
                }
            }
            Some(IncludePath::System(header)) => match magic::lookup(&header) {
                Some(MagicInclude::Flags(flags)) => {
                    scan.unit.push_flag_string(flags);
                }
                Some(MagicInclude::Package(package)) => match self.packages.flags_for(package) {
                    Ok(flags) => {
                        scan.unit.push_flags(&flags);
                    }
                    Err(err) => warn!(
                        "{}:{}: <{}> implies package {} but it is unavailable: {}",
                        path.display(),
                        index + 1,
                        header,
                        package,
                        err
                    ),
                },
                None => {}
            },
            None => {}
        }
    }

    fn apply_directive(
        &self,
        scan: &mut Scan<'_>,
        path: &Path,
        location: SourceLocation,
        directive: Directive<'_>,
    ) {
        match directive {
            Directive::Flags(flags) => {
                scan.unit.push_flag_string(flags);
            }
            Directive::Interpreter => {}
            Directive::KeyValue { name: "cxx", value } => {
                scan.unit
                    .push_flags(&[format!("{CXX_OVERRIDE_FLAG}{value}")]);
            }
            Directive::KeyValue {
                name: "private",
                value,
            } => {
                scan.unit.push_private_flag_string(value);
            }
            Directive::KeyValue {
                name: "requires",
                value,
            } => match self.packages.flags_for(value) {
                Ok(flags) => {
                    scan.unit.push_flags(&flags);
                }
                Err(err) => scan.diagnostics.push(requirement_diagnostic(path, location, value, &err)),
            },
            Directive::KeyValue {
                name: "source",
                value,
            } => match shlex::split(value).as_slice() {
                [target] => {
                    let source = scan.resolver.resolve(target);
                    debug!("sourcing {}", source.display());
                    push_discovered(scan, CompilationUnit::source(source));
                }
                _ => scan.diagnostics.push(Diagnostic::error(
                    path,
                    location,
                    format!("source: expected one path, got '{value}'"),
                )),
            },
            Directive::KeyValue { name, value } => scan.diagnostics.push(Diagnostic::error(
                path,
                location,
                format!("unknown directive: {name}: {value}"),
            )),
            Directive::Unknown(text) => scan.diagnostics.push(Diagnostic::error(
                path,
                location,
                format!("unknown directive: {text}"),
            )),
        }
    }

    fn write_processed(
        &self,
        unit: &mut CompilationUnit,
        output: &[u8],
    ) -> Result<(), DirectiveError> {
        let file = unit.open_for_write(self.config)?;
        let target = unit.processed_file_name().to_path_buf();
        debug!(
            "rewriting {} -> {}",
            unit.input_file_name().display(),
            target.display()
        );

        let mut writer = BufWriter::new(file);
        writer
            .write_all(output)
            .and_then(|()| writer.flush())
            .map_err(|source| DirectiveError::Write {
                path: target,
                source,
            })
    }
}

fn push_discovered(scan: &mut Scan<'_>, unit: CompilationUnit) {
    if !scan.discovered.contains(&unit) {
        scan.discovered.push(unit);
    }
}

fn requirement_diagnostic(
    path: &Path,
    location: SourceLocation,
    requirement: &str,
    err: &RequirementError,
) -> Diagnostic {
    let diagnostic = match err {
        RequirementError::Missing { .. } => {
            Diagnostic::error(path, location, "package requirement not met")
        }
        // the requirement exists but its flags could not be fetched
        RequirementError::QueryFailed { .. } => {
            Diagnostic::internal_error(path, location, err.to_string())
        }
        other => Diagnostic::error(path, location, other.to_string()),
    }
    .with_note(format!("requires: {requirement}"));
    match err.output() {
        Some(output) => diagnostic.with_note(output),
        None => diagnostic,
    }
}
