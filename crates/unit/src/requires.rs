use common::shlex;
use once_cell::sync::Lazy;
use process::{CommandLine, ProcessError, ProcessResult, run_capturing_output};
use regex::Regex;
use thiserror::Error;

static VERSION_CONSTRAINT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[ \t]+(?:[<>=!]=|[<>])[ \t]+[^ \t]+").expect("constraint pattern is valid")
});

#[derive(Debug, Error)]
pub enum RequirementError {
    #[error("package requirement not met: {requirement}")]
    Missing { requirement: String, output: String },
    #[error("package query failed unexpectedly for: {requirement}")]
    QueryFailed { requirement: String, output: String },
    #[error("package query command is empty")]
    NoCommand,
    #[error(transparent)]
    Process(#[from] ProcessError),
}

impl RequirementError {
    /// Whatever the query tool printed on standard output, if anything.
    pub fn output(&self) -> Option<&str> {
        match self {
            RequirementError::Missing { output, .. }
            | RequirementError::QueryFailed { output, .. } => {
                Some(output.as_str()).filter(|out| !out.trim().is_empty())
            }
            _ => None,
        }
    }
}

/// `requirement` with `op version` constraints removed, e.g.
/// `gtk+-3.0 >= 3.10 zlib` becomes `gtk+-3.0 zlib`.
pub fn strip_version_constraints(requirement: &str) -> String {
    VERSION_CONSTRAINT.replace_all(requirement, "").into_owned()
}

/// Front end to the package-metadata tool (`pkg-config` unless overridden).
#[derive(Debug, Clone)]
pub struct PackageQuery {
    command: String,
}

impl PackageQuery {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
        }
    }

    fn base(&self) -> Result<CommandLine, RequirementError> {
        CommandLine::from_shell_words(&self.command).ok_or(RequirementError::NoCommand)
    }

    /// Check `requirement` is satisfiable, then return the compile and link
    /// flags it needs, flag-split.
    pub fn flags_for(&self, requirement: &str) -> Result<Vec<String>, RequirementError> {
        let exists = self
            .base()?
            .args(["--print-errors", "--exists"])
            .arg(requirement);
        let (result, output) = query(&exists)?;
        if !result.success() {
            return Err(RequirementError::Missing {
                requirement: requirement.to_string(),
                output,
            });
        }

        let flags = self
            .base()?
            .args(["--cflags", "--libs"])
            .args(shlex::split(&strip_version_constraints(requirement)));
        let (result, output) = query(&flags)?;
        if !result.success() {
            return Err(RequirementError::QueryFailed {
                requirement: requirement.to_string(),
                output,
            });
        }

        Ok(shlex::split(&output))
    }
}

fn query(command: &CommandLine) -> Result<(ProcessResult, String), RequirementError> {
    match run_capturing_output(command) {
        Ok(outcome) => Ok(outcome),
        // a missing tool is just an unmet requirement
        Err(ProcessError::Spawn { command, source }) => Ok((
            ProcessResult::Exited(127),
            format!("failed to run `{command}`: {source}\n"),
        )),
        Err(err) => Err(err.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    /// A stand-in tool: knows `zlib`, fails on anything else.
    fn fake_pkg_config(dir: &TempDir) -> PackageQuery {
        let script = dir.path().join("fake-pkg-config");
        fs::write(
            &script,
            r#"case "$*" in
  "--print-errors --exists zlib"*) exit 0 ;;
  "--cflags --libs zlib") echo "-I/opt/zlib/include -lz" ; exit 0 ;;
  *) echo "Package '$3' was not found" >&2 ; exit 1 ;;
esac
"#,
        )
        .unwrap();
        PackageQuery::new(format!("sh {}", script.display()))
    }

    #[test]
    fn strips_version_constraints() {
        assert_eq!(strip_version_constraints("zlib >= 1.2"), "zlib");
        assert_eq!(
            strip_version_constraints("gtk+-3.0 >= 3.10 glib-2.0 < 3"),
            "gtk+-3.0 glib-2.0"
        );
        assert_eq!(strip_version_constraints("libcurl"), "libcurl");
    }

    #[test]
    fn known_package_yields_split_flags() {
        let dir = TempDir::new().unwrap();
        let query = fake_pkg_config(&dir);
        assert_eq!(
            query.flags_for("zlib >= 1.2").unwrap(),
            vec!["-I/opt/zlib/include".to_string(), "-lz".to_string()]
        );
    }

    #[test]
    fn unknown_package_is_missing() {
        let dir = TempDir::new().unwrap();
        let query = fake_pkg_config(&dir);
        let err = query.flags_for("nonexistent-package").unwrap_err();
        assert!(matches!(
            err,
            RequirementError::Missing { ref requirement, .. } if requirement == "nonexistent-package"
        ));
    }

    #[test]
    fn absent_tool_is_missing() {
        let query = PackageQuery::new("/definitely/not/pkg-config");
        let err = query.flags_for("zlib").unwrap_err();
        assert!(matches!(err, RequirementError::Missing { .. }));
        assert!(err.output().is_some());
    }
}
