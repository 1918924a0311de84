//! Line/column positions inside a source file.

use std::fmt;

/// A 1-based line and column inside a source file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SourceLocation {
    line: usize,
    column: usize,
}

// constructors

impl SourceLocation {
    /// Creates a new instance of `SourceLocation`
    #[inline]
    #[must_use]
    pub const fn new(line: usize, column: usize) -> Self {
        Self { line, column }
    }

    /// Location of the byte offset `offset` within `line` (both counted from zero).
    #[inline]
    #[must_use]
    pub fn from_offset(line: usize, text: &str, offset: usize) -> Self {
        let column = text
            .get(..offset)
            .map(|prefix| prefix.chars().count())
            .unwrap_or(offset);
        Self::new(line + 1, column + 1)
    }
}

// methods

impl SourceLocation {
    /// The line, starting at one
    #[inline]
    #[must_use]
    pub const fn line(&self) -> usize {
        self.line
    }

    /// The column, starting at one
    #[inline]
    #[must_use]
    pub const fn column(&self) -> usize {
        self.column
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}
