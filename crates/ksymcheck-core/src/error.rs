//! Error types shared by the core and harness crates.

use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;

/// Everything that can abort an audit run.
///
/// Missing symbols are never errors; they are reported as data.
#[derive(Debug, Error)]
pub enum AuditError {
    #[error("no kernel image (vmlinux) found under {}", root.display())]
    ImageNotFound { root: PathBuf },
    #[error("more than one kernel image found: {} and {}", first.display(), second.display())]
    DuplicateImage { first: PathBuf, second: PathBuf },
    #[error("{tool} failed on {}: {reason}", binary.display())]
    ToolInvocation {
        tool: String,
        binary: PathBuf,
        reason: String,
    },
    #[error("{tool} timed out after {:.3}s on {}", timeout.as_secs_f64(), binary.display())]
    ToolTimeout {
        tool: String,
        binary: PathBuf,
        timeout: Duration,
    },
    #[error("interrupted")]
    Interrupted,
    #[error("{}:{line_number}: malformed symbol line {line:?}", source_path.display())]
    MalformedSymbolLine {
        source_path: PathBuf,
        line_number: usize,
        line: String,
    },
    #[error("io: {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("worker pool: {reason}")]
    WorkerPool { reason: String },
}

impl AuditError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Path of the binary (or file) the error is about, when there is one.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        match self {
            Self::ImageNotFound { root } => Some(root),
            Self::DuplicateImage { second, .. } => Some(second),
            Self::ToolInvocation { binary, .. } | Self::ToolTimeout { binary, .. } => Some(binary),
            Self::MalformedSymbolLine { source_path, .. } => Some(source_path),
            Self::Io { path, .. } => Some(path),
            Self::WorkerPool { .. } | Self::Interrupted => None,
        }
    }
}

/// A line that looked like it carried a symbol but did not yield a valid name.
///
/// Context-free on purpose: the caller knows which file the lines came from.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("line {line_number}: malformed symbol line {line:?}")]
pub struct MalformedLine {
    /// 1-based line number within the input.
    pub line_number: usize,
    pub line: String,
}

impl MalformedLine {
    /// Attach the originating path.
    #[must_use]
    pub fn at(self, path: impl Into<PathBuf>) -> AuditError {
        AuditError::MalformedSymbolLine {
            source_path: path.into(),
            line_number: self.line_number,
            line: self.line,
        }
    }
}
