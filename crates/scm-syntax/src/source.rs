//! Source files and locations.

use std::path::{Path, PathBuf};
use std::sync::Arc;

/// A position inside a source file. Lines and columns are 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Loc {
    pub line: u32,
    pub col: u32,
}

impl Loc {
    pub fn new(line: u32, col: u32) -> Self {
        Self { line, col }
    }
}

/// An in-memory source file, owned by the job compiling it.
#[derive(Debug)]
pub struct SourceFile {
    pub path: PathBuf,
    pub text: String,
}

impl SourceFile {
    pub fn new(path: impl Into<PathBuf>, text: impl Into<String>) -> Arc<Self> {
        Arc::new(Self { path: path.into(), text: text.into() })
    }

    /// The script name derived from the file stem, uppercased.
    pub fn script_name(&self) -> String {
        self.path
            .file_stem()
            .map(|s| s.to_string_lossy().to_ascii_uppercase())
            .unwrap_or_else(|| "SCRIPT".into())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the text of the 1-based line `n`, without its terminator.
    pub fn line(&self, n: u32) -> Option<&str> {
        self.text.lines().nth(n.checked_sub(1)? as usize)
    }
}
