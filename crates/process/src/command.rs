use std::fmt;
use std::process::{Command, Stdio};

use common::shlex;

/// A program plus its argument vector. Nothing here is ever handed to a
/// shell unless the caller builds one explicitly with [`CommandLine::shell`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandLine {
    program: String,
    args: Vec<String>,
    discard_stderr: bool,
}

impl CommandLine {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            discard_stderr: false,
        }
    }

    /// Build from already-split words; the first word is the program.
    pub fn from_words<I, S>(words: I) -> Option<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut words = words.into_iter().map(Into::into);
        let program = words.next()?;
        Some(Self::new(program).args(words))
    }

    /// Build from a flag string such as `ccache g++ -m32`.
    pub fn from_shell_words(text: &str) -> Option<Self> {
        Self::from_words(shlex::split(text))
    }

    /// Run `script` through `/bin/sh -c`.
    pub fn shell(script: impl Into<String>) -> Self {
        Self::new("/bin/sh").arg("-c").arg(script)
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Send the child's standard error to `/dev/null`.
    pub fn discard_stderr(mut self) -> Self {
        self.discard_stderr = true;
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn arguments(&self) -> &[String] {
        &self.args
    }

    pub(crate) fn to_command(&self) -> Command {
        let mut command = Command::new(&self.program);
        command.args(&self.args);
        if self.discard_stderr {
            command.stderr(Stdio::null());
        }
        command
    }
}

impl fmt::Display for CommandLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&shlex::join(
            std::iter::once(&self.program).chain(self.args.iter()),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shell_words_keep_quoted_groups() {
        let cmd = CommandLine::from_shell_words("ccache 'my g++' -m32").unwrap();
        assert_eq!(cmd.program(), "ccache");
        assert_eq!(cmd.arguments(), &["my g++".to_string(), "-m32".to_string()]);
        assert_eq!(cmd.to_string(), "ccache 'my g++' -m32");
    }

    #[test]
    fn empty_words_have_no_program() {
        assert!(CommandLine::from_shell_words("   ").is_none());
    }
}
