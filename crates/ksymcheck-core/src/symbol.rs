//! Symbol and binary data model.

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

use serde::Serialize;

/// A linker/export symbol identifier. Case-sensitive, no embedded whitespace.
pub type SymbolName = String;

/// Deduplicated, unordered symbol names. Order only at presentation time.
pub type SymbolSet = HashSet<SymbolName>;

/// Undefined (required) symbols per module.
pub type ModuleRequirements = BTreeMap<Binary, SymbolSet>;

/// Exported symbols per binary.
pub type ExportTable = BTreeMap<Binary, SymbolSet>;

/// Role a binary plays in a scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BinaryRole {
    Image,
    Module,
}

impl BinaryRole {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Module => "module",
        }
    }
}

/// A binary found during a scan.
///
/// Ordered by path, so maps keyed by `Binary` iterate deterministically.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct Binary {
    pub path: PathBuf,
    pub role: BinaryRole,
}

impl Binary {
    #[must_use]
    pub fn image(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            role: BinaryRole::Image,
        }
    }

    #[must_use]
    pub fn module(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            role: BinaryRole::Module,
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// File name used in reports (`foo.ko`), falling back to the full path.
    #[must_use]
    pub fn display_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.path.display().to_string())
    }
}

/// Union of the given export sets.
#[must_use]
pub fn union_exports<'a>(sets: impl IntoIterator<Item = &'a SymbolSet>) -> SymbolSet {
    let mut out = SymbolSet::new();
    for set in sets {
        out.extend(set.iter().cloned());
    }
    out
}
