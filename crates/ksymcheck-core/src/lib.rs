//! Symbol reconciliation core for kernel image/module ABI audits.
//!
//! This crate provides:
//! - Data model: [`SymbolName`], [`SymbolSet`], [`Binary`] and its [`BinaryRole`]
//! - Canonical ordering: the deterministic sort used for display and persistence
//! - Normalization: turning raw symbol-table tool output into symbol sets
//! - Reconciliation: required-vs-exported differences per module
//! - Allowlist merging: union with qualifying new symbols, atomic rewrite
//!
//! Nothing here spawns processes or walks directories; that lives in the
//! harness crate.

pub mod allowlist;
pub mod error;
pub mod normalize;
pub mod reconcile;
pub mod sort;
pub mod symbol;

pub use allowlist::{ALLOWLIST_HEADER, Allowlist, MergeOutcome};
pub use error::{AuditError, MalformedLine};
pub use reconcile::{MissingSymbol, find_missing};
pub use sort::{canonical_key, canonical_sort};
pub use symbol::{
    Binary, BinaryRole, ExportTable, ModuleRequirements, SymbolName, SymbolSet, union_exports,
};
