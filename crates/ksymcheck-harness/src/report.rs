//! Audit report generation.

use std::path::Path;

use ksymcheck_core::{MergeOutcome, MissingSymbol, SymbolName};
use serde::Serialize;

use crate::audit::{AuditOutcome, SkippedBinary};
use crate::config::AuditConfig;

/// One unresolved requirement, flattened for JSON consumers.
#[derive(Debug, Clone, Serialize)]
pub struct MissingEntry {
    pub module: String,
    pub path: String,
    pub symbol: SymbolName,
}

/// What happened to the allowlist during this run.
#[derive(Debug, Clone, Serialize)]
pub struct AllowlistSummary {
    pub path: String,
    pub total: usize,
    pub added: Vec<SymbolName>,
}

impl AllowlistSummary {
    #[must_use]
    pub fn new(path: &Path, merged: &MergeOutcome) -> Self {
        Self {
            path: path.display().to_string(),
            total: merged.allowlist.len(),
            added: merged.added.clone(),
        }
    }
}

/// Machine-readable summary of one audit run.
#[derive(Debug, Clone, Serialize)]
pub struct AuditReport {
    pub root: String,
    pub image: String,
    pub modules_scanned: usize,
    pub report_scope: &'static str,
    pub allowlist_scope: &'static str,
    pub symbols_required: usize,
    pub image_exports: usize,
    pub reference_exports: usize,
    /// `false` when reporting was suppressed; `missing` is then empty.
    pub reported: bool,
    pub missing: Vec<MissingEntry>,
    pub skipped: Vec<SkippedBinary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allowlist: Option<AllowlistSummary>,
}

impl AuditReport {
    /// `missing` is `None` when reporting was suppressed.
    #[must_use]
    pub fn new(
        outcome: &AuditOutcome,
        config: &AuditConfig,
        missing: Option<&[MissingSymbol]>,
        allowlist: Option<AllowlistSummary>,
    ) -> Self {
        Self {
            root: outcome.root.display().to_string(),
            image: outcome.image.path.display().to_string(),
            modules_scanned: outcome.modules.len(),
            report_scope: config.report_scope.as_str(),
            allowlist_scope: config.allowlist_scope.as_str(),
            symbols_required: outcome.all_required().len(),
            image_exports: outcome.image_exports().len(),
            reference_exports: outcome.reference_exports(config.report_scope).len(),
            reported: missing.is_some(),
            missing: missing
                .unwrap_or_default()
                .iter()
                .map(|m| MissingEntry {
                    module: m.module.display_name(),
                    path: m.module.path.display().to_string(),
                    symbol: m.symbol.clone(),
                })
                .collect(),
            skipped: outcome.skipped.clone(),
            allowlist,
        }
    }

    /// Serialize to pretty JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}
