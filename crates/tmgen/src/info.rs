//! source positions
//!
//! hcl-edit reports byte spans. Diagnostics want `file:line,column`, so every parsed item that can
//! end up in an error message carries a [Range] computed from its span.
use std::path::{Path, PathBuf};

/// A position inside a source file
///
/// `line` and `column` are 1-based, `byte` is the 0-based offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct Pos {
    pub line: usize,
    pub column: usize,
    pub byte: usize,
}

impl Pos {
    /// Compute the position of `byte` inside `source`
    pub fn from_offset(source: &str, byte: usize) -> Self {
        let byte = byte.min(source.len());
        let before = &source.as_bytes()[..byte];
        let line = before.iter().filter(|b| **b == b'\n').count() + 1;
        let line_start = before
            .iter()
            .rposition(|b| *b == b'\n')
            .map(|idx| idx + 1)
            .unwrap_or(0);
        let column = String::from_utf8_lossy(&before[line_start..]).chars().count() + 1;

        Self { line, column, byte }
    }
}

/// A range inside a source file
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Range {
    /// host path of the file, empty for in-memory documents
    pub path: PathBuf,
    pub start: Pos,
    pub end: Pos,
}

impl Range {
    pub fn new(path: impl Into<PathBuf>, start: Pos, end: Pos) -> Self {
        Self {
            path: path.into(),
            start,
            end,
        }
    }

    /// Build a range from an optional hcl-edit span
    ///
    /// Items created programmatically have no span; they point at the start of the file.
    pub fn from_span(path: &Path, source: &str, span: Option<std::ops::Range<usize>>) -> Self {
        let span = span.unwrap_or(0..0);
        Self {
            path: path.to_path_buf(),
            start: Pos::from_offset(source, span.start),
            end: Pos::from_offset(source, span.end),
        }
    }

    pub fn host_path(&self) -> &Path {
        &self.path
    }
}

impl std::fmt::Display for Range {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}:{},{}-{},{}",
            self.path.display(),
            self.start.line,
            self.start.column,
            self.end.line,
            self.end.column
        )
    }
}
