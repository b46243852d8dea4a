//! Raw symbol-table output to symbol sets.
//!
//! Input is the line-oriented text printed by an `nm`-compatible tool:
//!
//! ```text
//!                  U printk                      (--undefined-only)
//! ffffffff82a0c2d8 r __ksymtab_printk            (--defined-only)
//! ```

use crate::error::MalformedLine;
use crate::symbol::SymbolSet;

/// Marker that identifies an export-table entry in defined-symbol output.
pub const EXPORT_MARKER: &str = " __ksymtab_";

/// Type codes `nm --undefined-only` prints for unresolved references.
const UNDEFINED_TYPES: &[&str] = &["U", "w", "v"];

/// Extract required symbols from undefined-only output.
///
/// A line qualifies when its first field is an undefined type code; the
/// symbol is the second field. Anything else (blank lines, per-object
/// headers such as `foo.o:`) is ignored. A qualifying line without exactly
/// one name after the type code is malformed.
pub fn extract_undefined<I, S>(lines: I) -> Result<SymbolSet, MalformedLine>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut out = SymbolSet::new();
    for (idx, line) in lines.into_iter().enumerate() {
        let line = line.as_ref();
        let mut fields = line.split_whitespace();
        let Some(kind) = fields.next() else {
            continue;
        };
        if !UNDEFINED_TYPES.contains(&kind) {
            continue;
        }
        match (fields.next(), fields.next()) {
            (Some(name), None) => {
                out.insert(name.to_string());
            }
            _ => return Err(malformed(idx, line)),
        }
    }
    Ok(out)
}

/// Extract exported symbols from defined-only output.
///
/// Only lines containing [`EXPORT_MARKER`] qualify; the symbol is the rest of
/// the line after the marker. Other defined symbols are skipped. A marker
/// with nothing (or whitespace-separated junk) after it is malformed.
pub fn extract_exported<I, S>(lines: I) -> Result<SymbolSet, MalformedLine>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut out = SymbolSet::new();
    for (idx, line) in lines.into_iter().enumerate() {
        let line = line.as_ref();
        let Some(pos) = line.find(EXPORT_MARKER) else {
            continue;
        };
        let name = line[pos + EXPORT_MARKER.len()..].trim_end();
        if name.is_empty() || name.contains(char::is_whitespace) {
            return Err(malformed(idx, line));
        }
        out.insert(name.to_string());
    }
    Ok(out)
}

fn malformed(idx: usize, line: &str) -> MalformedLine {
    MalformedLine {
        line_number: idx + 1,
        line: line.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(names: &[&str]) -> SymbolSet {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn undefined_takes_name_after_type_code() {
        let got = extract_undefined(["                 U my_symbol"]).unwrap();
        assert_eq!(got, set(&["my_symbol"]));
    }

    #[test]
    fn undefined_accepts_weak_references_and_skips_noise() {
        let raw = "\nfoo.o:\n                 U printk\n                 w __weak_hook\n                 U printk\n";
        let got = extract_undefined(raw.lines()).unwrap();
        assert_eq!(got, set(&["printk", "__weak_hook"]));
    }

    #[test]
    fn undefined_rejects_extra_fields() {
        let err = extract_undefined(["                 U", "                 U a b"]).unwrap_err();
        assert_eq!(err.line_number, 1);

        let err = extract_undefined(["                 U a b"]).unwrap_err();
        assert_eq!(err.line, "                 U a b");
    }

    #[test]
    fn exported_strips_marker() {
        let got = extract_exported(["ffffffff82a0c2d8 r __ksymtab_bar"]).unwrap();
        assert_eq!(got, set(&["bar"]));
    }

    #[test]
    fn exported_skips_lines_without_marker() {
        let raw = [
            "ffffffff81000000 T _text",
            "ffffffff82a0c2d8 r __ksymtab_bar",
            "ffffffff82b00000 r __kstrtab_bar",
            "ffffffff82a0c2e0 r __ksymtab_gpl_only\r",
        ];
        let got = extract_exported(raw).unwrap();
        assert_eq!(got, set(&["bar", "gpl_only"]));
        assert!(extract_exported(["ffffffff81000000 T _text"]).unwrap().is_empty());
    }

    #[test]
    fn exported_rejects_empty_name() {
        let raw = ["ffffffff82a0c2d8 r __ksymtab_ok", "ffffffff82a0c2d8 r __ksymtab_   "];
        let err = extract_exported(raw).unwrap_err();
        assert_eq!(err.line_number, 2);
    }

    #[test]
    fn exported_rejects_embedded_whitespace() {
        assert!(extract_exported(["0 r __ksymtab_a b"]).is_err());
    }

    #[test]
    fn marker_requires_leading_space() {
        // Part of a longer identifier, not an export-table entry.
        let got = extract_exported(["0 t my__ksymtab_thing"]).unwrap();
        assert!(got.is_empty());
    }
}
