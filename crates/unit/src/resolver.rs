use std::fs;
use std::path::{Component, Path, PathBuf};

use common::SOURCE_EXTENSIONS;
use once_cell::sync::Lazy;
use regex::Regex;

static INCLUDE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"^[ \t]*#[ \t]*include[ \t]*(?:"([^"]+)"|<([^>]+)>)"#)
        .expect("include pattern is valid")
});

/// Target of an `#include` line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IncludePath {
    /// `#include "header.h"`, looked up next to the including file
    Local(String),
    /// `#include <header.h>`, only interesting through the magic table
    System(String),
}

impl IncludePath {
    /// Parse the include target from a source line, if it has one.
    pub fn from_line(line: &str) -> Option<Self> {
        let captures = INCLUDE.captures(line)?;
        if let Some(local) = captures.get(1) {
            return Some(IncludePath::Local(local.as_str().to_string()));
        }
        captures
            .get(2)
            .map(|system| IncludePath::System(system.as_str().to_string()))
    }
}

/// Drop `.` components so `./a/./b.cpp` and `a/b.cpp` display the same.
///
/// `..` is kept; see [`identity_key`] for comparing files.
pub fn normalize(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            other => normalized.push(other.as_os_str()),
        }
    }
    if normalized.as_os_str().is_empty() {
        normalized.push(".");
    }
    normalized
}

/// Key under which two spellings of the same file compare equal.
///
/// Existing files are canonicalized, which also sees through symlinks.
/// Anything else is made absolute and has `..` collapsed lexically.
pub fn identity_key(path: &Path) -> PathBuf {
    if let Ok(canonical) = fs::canonicalize(path) {
        return canonical;
    }

    let absolute = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());
    let mut key = PathBuf::new();
    for component in absolute.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match key.file_name() {
                Some(_) => {
                    key.pop();
                }
                None if key.has_root() => {}
                None => key.push(component.as_os_str()),
            },
            other => key.push(other.as_os_str()),
        }
    }
    key
}

/// Resolves paths named inside one unit.
#[derive(Debug, Clone)]
pub struct SourceResolver {
    unit_dir: PathBuf,
}

impl SourceResolver {
    pub fn for_unit(unit_path: &Path) -> Self {
        let unit_dir = unit_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        Self { unit_dir }
    }

    /// `target` as-is when absolute, otherwise relative to the unit's directory.
    pub fn resolve(&self, target: &str) -> PathBuf {
        let target = Path::new(target);
        if target.is_absolute() {
            normalize(target)
        } else {
            normalize(&self.unit_dir.join(target))
        }
    }

    /// First existing `<stem>.<ext>` beside `header`, in extension precedence
    /// order.
    pub fn find_source_file(&self, header: &Path) -> Option<PathBuf> {
        SOURCE_EXTENSIONS
            .iter()
            .map(|ext| header.with_extension(ext))
            .find(|candidate| candidate.is_file())
    }
}
