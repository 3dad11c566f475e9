//! Source location metadata attached to every constructed value.

use std::path::Path;
use std::sync::Arc;

/// A location in a source document: a file path plus a 1-based line/column span.
///
/// Cheap to clone (the file path is shared via `Arc`). Absent for values that
/// have no associated source text (e.g. synthetic defaults).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Origin {
    pub file: Option<Arc<Path>>,
    pub start_line: usize,
    pub start_col: usize,
    pub end_line: usize,
    pub end_col: usize,
}

impl Origin {
    pub fn new(file: Option<Arc<Path>>, start_line: usize, start_col: usize) -> Self {
        Origin {
            file,
            start_line,
            start_col,
            end_line: start_line,
            end_col: start_col,
        }
    }

    pub fn with_end(mut self, end_line: usize, end_col: usize) -> Self {
        self.end_line = end_line;
        self.end_col = end_col;
        self
    }

    /// Extends `self`'s end position by walking `text`, accounting for embedded newlines.
    pub fn extended_over(mut self, text: &str) -> Self {
        let (mut line, mut col) = (self.start_line, self.start_col);
        for ch in text.chars() {
            if ch == '\n' {
                line += 1;
                col = 1;
            } else {
                col += 1;
            }
        }
        self.end_line = line;
        self.end_col = col;
        self
    }

    pub fn synthetic() -> Self {
        Origin::default()
    }
}

impl std::fmt::Display for Origin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.file {
            Some(path) => write!(f, "{}:{}:{}", path.display(), self.start_line, self.start_col),
            None => write!(f, "{}:{}", self.start_line, self.start_col),
        }
    }
}

pub(crate) fn file_arc(path: &Path) -> Arc<Path> {
    Arc::from(path.to_path_buf().into_boxed_path())
}
