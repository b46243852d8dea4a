//! Canonical symbol ordering.
//!
//! Symbols compare case-insensitively with every underscore removed, so
//! `__foo`, `_foo` and `foo` land next to each other. Within such a group
//! fewer leading underscores sort first:
//!
//! ```text
//! blk_mq_end_request
//! _blk_mq_end_request
//! __blk_mq_end_request
//! ```
//!
//! Remaining ties (`Foo` vs `foo`, `foo_bar` vs `foobar`) fall back to plain
//! byte order of the original name, which makes the order total.

use crate::symbol::SymbolName;

/// Sort key for one symbol. Field order is comparison order.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CanonicalKey {
    folded: String,
    leading_underscores: usize,
    raw: String,
}

impl CanonicalKey {
    /// Lowercased name with all underscores stripped.
    #[must_use]
    pub fn folded(&self) -> &str {
        &self.folded
    }

    #[must_use]
    pub fn leading_underscores(&self) -> usize {
        self.leading_underscores
    }
}

/// Build the canonical sort key for `name`.
#[must_use]
pub fn canonical_key(name: &str) -> CanonicalKey {
    let leading = name.bytes().take_while(|&b| b == b'_').count();
    let folded: String = name
        .chars()
        .filter(|&c| c != '_')
        .flat_map(char::to_lowercase)
        .collect();
    CanonicalKey {
        folded,
        leading_underscores: leading,
        raw: name.to_string(),
    }
}

/// `sort(deduplicate(symbols), key = canonical_key)`.
#[must_use]
pub fn canonical_sort<I, S>(symbols: I) -> Vec<SymbolName>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut out: Vec<SymbolName> = symbols
        .into_iter()
        .map(|s| s.as_ref().to_string())
        .collect();
    out.sort_by_cached_key(|s| canonical_key(s));
    // Equal names have equal keys, so duplicates are adjacent.
    out.dedup();
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn leading_underscores_sort_ascending() {
        let sorted = canonical_sort([
            "__blk_mq_end_request",
            "blk_mq_end_request",
            "_blk_mq_end_request",
        ]);
        assert_eq!(
            sorted,
            vec![
                "blk_mq_end_request",
                "_blk_mq_end_request",
                "__blk_mq_end_request"
            ]
        );
    }

    #[test]
    fn underscore_variants_group_adjacently() {
        let sorted = canonical_sort(["foo", "bar", "__foo", "_bar", "baz", "_foo"]);
        assert_eq!(sorted, vec!["bar", "_bar", "baz", "foo", "_foo", "__foo"]);
    }

    #[test]
    fn comparison_ignores_case_and_inner_underscores() {
        let sorted = canonical_sort(["Zeta", "alpha", "al_pha_beta", "ALPHAA"]);
        assert_eq!(sorted, vec!["alpha", "ALPHAA", "al_pha_beta", "Zeta"]);
    }

    #[test]
    fn ties_resolve_by_original_bytes() {
        let sorted = canonical_sort(["foobar", "foo_bar", "FooBar"]);
        assert_eq!(sorted, vec!["FooBar", "foo_bar", "foobar"]);
    }

    #[test]
    fn sort_deduplicates() {
        let sorted = canonical_sort(["b", "a", "b", "a", "_a"]);
        assert_eq!(sorted, vec!["a", "_a", "b"]);
    }

    #[test]
    fn sort_is_idempotent() {
        let input = [
            "printk", "_printk", "__printk", "Kfree", "kfree", "k_free", "__kmalloc",
            "kmalloc", "____x", "______x", "x", "_", "",
        ];
        let once = canonical_sort(input);
        let twice = canonical_sort(&once);
        assert_eq!(once, twice);
    }

    #[test]
    fn key_pins_underscore_tier() {
        let k = canonical_key("__Foo_Bar");
        assert_eq!(k.folded(), "foobar");
        assert_eq!(k.leading_underscores(), 2);
        assert_eq!(canonical_key("________deep").leading_underscores(), 8);
    }

    #[test]
    fn deep_underscore_runs_stay_ascending() {
        let sorted = canonical_sort(["______x", "_____x", "x", "_x", "_______x"]);
        assert_eq!(sorted, vec!["x", "_x", "_____x", "______x", "_______x"]);
    }

    #[test]
    fn underscore_count_outranks_case() {
        // Same folded form: the tier decides before the raw bytes do.
        let sorted = canonical_sort(["__A", "_a", "a", "A"]);
        assert_eq!(sorted, vec!["A", "a", "_a", "__A"]);
    }
}
