//! Persisted symbol allowlist.
//!
//! On-disk format, consumed by the downstream ABI comparison tool:
//!
//! ```text
//! [abi_whitelist]
//!   alpha
//!   beta
//! ```
//!
//! One header line, then one symbol per line indented by two spaces, in
//! canonical order, with a trailing newline. The file is semantically a set.

use std::collections::BTreeSet;
use std::io::Write;
use std::path::Path;

use tempfile::NamedTempFile;

use crate::error::{AuditError, MalformedLine};
use crate::sort::canonical_sort;
use crate::symbol::{SymbolName, SymbolSet};

/// Section header written as the first line.
pub const ALLOWLIST_HEADER: &str = "[abi_whitelist]";

const ENTRY_INDENT: &str = "  ";

/// An allowlist held in canonical order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Allowlist {
    symbols: Vec<SymbolName>,
}

/// Result of merging new findings into an allowlist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeOutcome {
    pub allowlist: Allowlist,
    /// Symbols that were not in the baseline, canonical order.
    pub added: Vec<SymbolName>,
}

impl Allowlist {
    #[must_use]
    pub fn from_symbols<I, S>(symbols: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            symbols: canonical_sort(symbols),
        }
    }

    /// Parse file contents. Section headers (`[...]`), blank lines and `#`
    /// comments are not data and are dropped.
    pub fn parse(text: &str) -> Result<Self, MalformedLine> {
        let mut symbols = Vec::new();
        for (idx, raw) in text.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') || line.starts_with('[') {
                continue;
            }
            if line.contains(char::is_whitespace) {
                return Err(MalformedLine {
                    line_number: idx + 1,
                    line: raw.to_string(),
                });
            }
            symbols.push(line);
        }
        Ok(Self::from_symbols(symbols))
    }

    /// Read `path`. A missing file is `Ok(None)`, the empty baseline.
    pub fn load(path: &Path) -> Result<Option<Self>, AuditError> {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(AuditError::io(path, err)),
        };
        Self::parse(&text).map(Some).map_err(|e| e.at(path))
    }

    #[must_use]
    pub fn symbols(&self) -> &[SymbolName] {
        &self.symbols
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    #[must_use]
    pub fn contains(&self, symbol: &str) -> bool {
        self.symbols.iter().any(|s| s == symbol)
    }

    /// Lines as written to disk, header first, without line terminators.
    #[must_use]
    pub fn lines(&self) -> Vec<String> {
        std::iter::once(ALLOWLIST_HEADER.to_string())
            .chain(self.symbols.iter().map(|s| format!("{ENTRY_INDENT}{s}")))
            .collect()
    }

    #[must_use]
    pub fn render(&self) -> String {
        let mut out = String::new();
        for line in self.lines() {
            out.push_str(&line);
            out.push('\n');
        }
        out
    }

    /// Replace `path` with the rendered allowlist.
    ///
    /// Contents go to a temporary file in the same directory which is then
    /// renamed over the target, so readers see either the old or the new file.
    pub fn write_atomic(&self, path: &Path) -> Result<(), AuditError> {
        let dir = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        let previous = std::fs::metadata(path).ok().map(|m| m.permissions());

        let mut tmp = NamedTempFile::new_in(dir).map_err(|e| AuditError::io(dir, e))?;
        tmp.write_all(self.render().as_bytes())
            .and_then(|()| tmp.as_file().sync_all())
            .map_err(|e| AuditError::io(tmp.path(), e))?;

        let permissions = match previous {
            Some(p) => Some(p),
            None => default_permissions(),
        };
        if let Some(permissions) = permissions {
            tmp.as_file()
                .set_permissions(permissions)
                .map_err(|e| AuditError::io(tmp.path(), e))?;
        }

        tmp.persist(path)
            .map_err(|e| AuditError::io(path, e.error))?;
        Ok(())
    }
}

#[cfg(unix)]
fn default_permissions() -> Option<std::fs::Permissions> {
    use std::os::unix::fs::PermissionsExt;
    Some(std::fs::Permissions::from_mode(0o644))
}

#[cfg(not(unix))]
fn default_permissions() -> Option<std::fs::Permissions> {
    None
}

/// Union `baseline` with the symbols that are both required and exported by
/// the reference set. Required-but-unexported symbols never enter the list.
#[must_use]
pub fn merge(
    baseline: Option<&Allowlist>,
    newly_required: &SymbolSet,
    reference_exports: &SymbolSet,
) -> MergeOutcome {
    let existing: BTreeSet<&str> = baseline
        .map(|b| b.symbols.iter().map(String::as_str).collect())
        .unwrap_or_default();

    let candidates = newly_required
        .iter()
        .filter(|s| reference_exports.contains(*s))
        .map(String::as_str);

    let added = canonical_sort(candidates.clone().filter(|s| !existing.contains(s)));
    let allowlist = Allowlist::from_symbols(existing.iter().copied().chain(candidates));

    MergeOutcome { allowlist, added }
}

/// Load `path` (absent means empty), merge, and atomically rewrite it.
pub fn update_file(
    path: &Path,
    newly_required: &SymbolSet,
    reference_exports: &SymbolSet,
) -> Result<MergeOutcome, AuditError> {
    let baseline = Allowlist::load(path)?;
    let outcome = merge(baseline.as_ref(), newly_required, reference_exports);
    outcome.allowlist.write_atomic(path)?;
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(names: &[&str]) -> SymbolSet {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn render_matches_file_format() {
        let list = Allowlist::from_symbols(["beta", "alpha", "_alpha"]);
        assert_eq!(list.render(), "[abi_whitelist]\n  alpha\n  _alpha\n  beta\n");
        assert_eq!(Allowlist::default().render(), "[abi_whitelist]\n");
    }

    #[test]
    fn parse_drops_header_comments_and_duplicates() {
        let text = "[abi_whitelist]\n  beta\n\n# vendor additions\n  alpha\n  beta\n";
        let list = Allowlist::parse(text).unwrap();
        assert_eq!(list.symbols(), ["alpha", "beta"]);
    }

    #[test]
    fn parse_rejects_entries_with_whitespace() {
        let err = Allowlist::parse("[abi_whitelist]\n  ok\n  not ok\n").unwrap_err();
        assert_eq!(err.line_number, 3);
    }

    #[test]
    fn merge_only_adds_exported_requirements() {
        let out = merge(None, &set(&["alpha", "gamma"]), &set(&["alpha", "beta"]));
        assert_eq!(out.allowlist.symbols(), ["alpha"]);
        assert_eq!(out.added, vec!["alpha"]);
        assert!(!out.allowlist.contains("gamma"));
        assert!(!out.allowlist.contains("beta"));
    }

    #[test]
    fn merge_keeps_baseline_entries() {
        let baseline = Allowlist::from_symbols(["legacy", "zeta"]);
        let out = merge(Some(&baseline), &set(&["alpha", "zeta"]), &set(&["alpha", "zeta"]));
        assert_eq!(out.allowlist.symbols(), ["alpha", "legacy", "zeta"]);
        assert_eq!(out.added, vec!["alpha"]);
    }

    #[test]
    fn merge_twice_is_stable() {
        let required = set(&["b", "_a", "a", "c"]);
        let exports = set(&["a", "_a", "b"]);
        let first = merge(None, &required, &exports);
        let second = merge(Some(&first.allowlist), &required, &exports);
        assert_eq!(first.allowlist, second.allowlist);
        assert!(second.added.is_empty());
    }

    #[test]
    fn update_file_is_byte_identical_on_rerun() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("abi_whitelist");
        std::fs::write(&path, "[abi_whitelist]\n  zeta\n").unwrap();

        let required = set(&["alpha", "gamma", "__alpha"]);
        let exports = set(&["alpha", "__alpha", "beta"]);

        let first = update_file(&path, &required, &exports).unwrap();
        let after_first = std::fs::read(&path).unwrap();
        assert_eq!(first.added, vec!["alpha", "__alpha"]);

        let second = update_file(&path, &required, &exports).unwrap();
        let after_second = std::fs::read(&path).unwrap();
        assert!(second.added.is_empty());
        assert_eq!(after_first, after_second);
        assert_eq!(
            String::from_utf8(after_second).unwrap(),
            "[abi_whitelist]\n  alpha\n  __alpha\n  zeta\n"
        );
    }

    #[test]
    fn update_file_creates_missing_file_without_leftovers() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.txt");
        update_file(&path, &set(&["alpha"]), &set(&["alpha"])).unwrap();
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "[abi_whitelist]\n  alpha\n"
        );
        let entries = std::fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(entries, 1, "temporary file left behind");
    }

    #[test]
    fn load_missing_file_is_empty_baseline() {
        let dir = tempfile::tempdir().unwrap();
        assert!(Allowlist::load(&dir.path().join("absent")).unwrap().is_none());
    }

    #[test]
    fn load_reports_malformed_line_with_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad");
        std::fs::write(&path, "[abi_whitelist]\n  two words\n").unwrap();
        match Allowlist::load(&path) {
            Err(AuditError::MalformedSymbolLine {
                source_path,
                line_number,
                ..
            }) => {
                assert_eq!(source_path, path);
                assert_eq!(line_number, 2);
            }
            other => panic!("expected malformed line error, got {other:?}"),
        }
    }
}
