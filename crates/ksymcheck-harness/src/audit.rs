//! Audit orchestration.
//!
//! Per-binary extraction is independent, so it runs on a bounded worker pool:
//! the image's exports are read alongside the module scans, and every worker
//! returns a plain value. Results are folded into maps after the join.

use std::path::PathBuf;
use std::time::Instant;

use ksymcheck_core::normalize::{extract_exported, extract_undefined};
use ksymcheck_core::{
    AuditError, Binary, ExportTable, MissingSymbol, ModuleRequirements, SymbolSet, find_missing,
    union_exports,
};
use rayon::prelude::*;
use serde::Serialize;

use crate::config::{AuditConfig, ReferenceScope};
use crate::locator::BinaryLayout;
use crate::reader::SymbolTableReader;
use crate::structured_log::{LogEntry, LogLevel, Outcome, SharedEmitter};

/// A module left out of the audit in best-effort mode.
#[derive(Debug, Clone, Serialize)]
pub struct SkippedBinary {
    pub binary: Binary,
    pub reason: String,
}

/// Everything extracted from one scan.
#[derive(Debug, Clone)]
pub struct AuditOutcome {
    pub root: PathBuf,
    pub image: Binary,
    /// Modules that were scanned successfully, in path order.
    pub modules: Vec<Binary>,
    pub requirements: ModuleRequirements,
    /// Image exports, plus module exports when some reference scope needs them.
    pub exports: ExportTable,
    pub skipped: Vec<SkippedBinary>,
}

impl AuditOutcome {
    #[must_use]
    pub fn image_exports(&self) -> SymbolSet {
        self.exports.get(&self.image).cloned().unwrap_or_default()
    }

    /// The global export set for `scope`.
    #[must_use]
    pub fn reference_exports(&self, scope: ReferenceScope) -> SymbolSet {
        match scope {
            ReferenceScope::ImageOnly => self.image_exports(),
            ReferenceScope::ImageAndModules => union_exports(self.exports.values()),
        }
    }

    /// Union of every module's undefined symbols.
    #[must_use]
    pub fn all_required(&self) -> SymbolSet {
        union_exports(self.requirements.values())
    }

    #[must_use]
    pub fn missing(&self, scope: ReferenceScope) -> Vec<MissingSymbol> {
        find_missing(&self.requirements, &self.reference_exports(scope))
    }
}

struct ModuleScan {
    required: SymbolSet,
    exported: Option<SymbolSet>,
}

/// Extract symbol sets for every binary in `layout`.
///
/// Fails fast without an image. A module that cannot be read aborts the run
/// unless `config.best_effort` is set, in which case it is recorded in
/// [`AuditOutcome::skipped`]. The image is never skipped, and neither is an
/// interrupted module.
pub fn run_audit<R: SymbolTableReader>(
    layout: &BinaryLayout,
    reader: &R,
    config: &AuditConfig,
    log: &SharedEmitter,
) -> Result<AuditOutcome, AuditError> {
    let image = layout.require_image()?.clone();
    let read_module_exports = config.needs_module_exports();

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(config.jobs.max(1))
        .thread_name(|i| format!("ksymcheck-{i}"))
        .build()
        .map_err(|e| AuditError::WorkerPool {
            reason: e.to_string(),
        })?;

    let (image_exports, module_scans) = pool.install(|| {
        rayon::join(
            || scan_image(&image, reader, log),
            || {
                layout
                    .modules
                    .par_iter()
                    .map(|module| scan_module(module, reader, read_module_exports, log))
                    .collect::<Vec<_>>()
            },
        )
    });

    let mut exports = ExportTable::new();
    exports.insert(image.clone(), image_exports?);

    let mut requirements = ModuleRequirements::new();
    let mut skipped = Vec::new();
    for (module, scan) in layout.modules.iter().zip(module_scans) {
        match scan {
            Ok(scan) => {
                requirements.insert(module.clone(), scan.required);
                if let Some(exported) = scan.exported {
                    exports.insert(module.clone(), exported);
                }
            }
            Err(err) if config.best_effort && !matches!(err, AuditError::Interrupted) => {
                eprintln!("warning: skipping {}: {err}", module.path.display());
                log.record(
                    LogEntry::new("", LogLevel::Warn, "binary.skipped")
                        .with_binary(module)
                        .with_outcome(Outcome::Skip)
                        .with_details(serde_json::json!({
                            "reason": err.to_string(),
                            "cause": outcome_for(&err),
                        })),
                );
                skipped.push(SkippedBinary {
                    binary: module.clone(),
                    reason: err.to_string(),
                });
            }
            Err(err) => return Err(err),
        }
    }
    skipped.sort_by(|a, b| a.binary.cmp(&b.binary));

    Ok(AuditOutcome {
        root: layout.root.clone(),
        image,
        modules: requirements.keys().cloned().collect(),
        requirements,
        exports,
        skipped,
    })
}

fn scan_image<R: SymbolTableReader>(
    image: &Binary,
    reader: &R,
    log: &SharedEmitter,
) -> Result<SymbolSet, AuditError> {
    let started = Instant::now();
    let result = read_exports(image, reader);
    match &result {
        Ok(exported) => log.record(
            scanned_entry(image, started)
                .with_counts(None, Some(exported.len()))
                .with_outcome(Outcome::Pass),
        ),
        Err(err) => log.record(
            LogEntry::new("", LogLevel::Error, "binary.failed")
                .with_binary(image)
                .with_outcome(outcome_for(err))
                .with_details(serde_json::json!({ "reason": err.to_string() })),
        ),
    }
    result
}

fn scan_module<R: SymbolTableReader>(
    module: &Binary,
    reader: &R,
    read_exports_too: bool,
    log: &SharedEmitter,
) -> Result<ModuleScan, AuditError> {
    let started = Instant::now();
    let raw = reader.read_undefined(&module.path)?;
    let required = extract_undefined(&raw).map_err(|e| e.at(&module.path))?;
    let exported = if read_exports_too {
        Some(read_exports(module, reader)?)
    } else {
        None
    };
    log.record(
        scanned_entry(module, started)
            .with_counts(Some(required.len()), exported.as_ref().map(SymbolSet::len))
            .with_outcome(Outcome::Pass),
    );
    Ok(ModuleScan { required, exported })
}

fn read_exports<R: SymbolTableReader>(
    binary: &Binary,
    reader: &R,
) -> Result<SymbolSet, AuditError> {
    let raw = reader.read_defined(&binary.path)?;
    extract_exported(&raw).map_err(|e| e.at(&binary.path))
}

fn scanned_entry(binary: &Binary, started: Instant) -> LogEntry {
    LogEntry::new("", LogLevel::Debug, "binary.scanned")
        .with_binary(binary)
        .with_duration_ms(started.elapsed().as_millis() as u64)
}

fn outcome_for(err: &AuditError) -> Outcome {
    match err {
        AuditError::ToolTimeout { .. } => Outcome::Timeout,
        _ => Outcome::Error,
    }
}
