//! CLI entrypoint for the kernel module symbol audit.

use std::path::{Path, PathBuf};
use std::time::Instant;

use clap::Parser;
use ksymcheck_core::allowlist;
use ksymcheck_core::AuditError;
use ksymcheck_harness::config::ReferenceScope;
use ksymcheck_harness::process;
use ksymcheck_harness::report::AllowlistSummary;
use ksymcheck_harness::structured_log::{
    ArtifactIndex, LogEmitter, LogEntry, LogLevel, Outcome, SharedEmitter,
};
use ksymcheck_harness::{AuditConfig, AuditReport, NmReader, locate_binaries, run_audit};

/// Audit symbols required by kernel modules against those the kernel provides.
#[derive(Debug, Parser)]
#[command(name = "ksymcheck")]
#[command(about = "Report unresolved module symbols and maintain the ABI symbol allowlist")]
struct Cli {
    /// Directory containing vmlinux and the *.ko modules.
    #[arg(default_value = ".")]
    directory: PathBuf,
    /// Do not report symbols that are required but not provided.
    #[arg(long)]
    skip_report: bool,
    /// Count symbols exported by modules as provided when updating the allowlist.
    #[arg(long)]
    include_module_exports: bool,
    /// Report against vmlinux exports only (default: vmlinux + module exports).
    #[arg(long)]
    report_image_only: bool,
    /// Allowlist to create or update.
    #[arg(long)]
    whitelist: Option<PathBuf>,
    /// Exit non-zero when any missing symbol is reported.
    #[arg(long)]
    strict: bool,
    /// Skip modules whose symbol table cannot be read instead of failing.
    #[arg(long)]
    best_effort: bool,
    /// Worker threads (default: KSYMCHECK_JOBS or available parallelism).
    #[arg(long)]
    jobs: Option<usize>,
    /// Per-invocation timeout for the symbol-table tool; 0 disables.
    #[arg(long)]
    timeout_secs: Option<u64>,
    /// Symbol-table tool (default: KSYMCHECK_NM or llvm-nm).
    #[arg(long)]
    nm: Option<String>,
    /// Write the machine-readable audit report (JSON) here.
    #[arg(long)]
    report_json: Option<PathBuf>,
    /// Structured JSONL log output path.
    #[arg(long)]
    log: Option<PathBuf>,
}

impl Cli {
    fn config(&self) -> AuditConfig {
        let mut config = AuditConfig::from_env();
        if let Some(nm) = &self.nm {
            config.tool = nm.clone();
        }
        if let Some(jobs) = self.jobs {
            config.jobs = jobs.max(1);
        }
        if let Some(secs) = self.timeout_secs {
            config.set_timeout_secs(secs);
        }
        if self.report_image_only {
            config.report_scope = ReferenceScope::ImageOnly;
        }
        if self.include_module_exports {
            config.allowlist_scope = ReferenceScope::ImageAndModules;
        }
        config.best_effort |= self.best_effort;
        config.skip_report = self.skip_report;
        config
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = cli.config();
    process::install_interrupt_handler();
    let run_id = run_id();

    let log = match &cli.log {
        Some(path) => {
            ensure_parent(path)?;
            SharedEmitter::new(LogEmitter::to_file(path, "ksymcheck", &run_id)?)
        }
        None => SharedEmitter::disabled(),
    };

    let started = Instant::now();
    let result = run(&cli, &config, &log, &run_id);

    let (level, outcome) = match &result {
        Ok(false) => (LogLevel::Info, Outcome::Pass),
        Ok(true) => (LogLevel::Warn, Outcome::Fail),
        Err(_) => (LogLevel::Error, Outcome::Error),
    };
    let mut done = LogEntry::new("", level, "audit.complete")
        .with_outcome(outcome)
        .with_exit_code(i32::from(!matches!(result, Ok(false))))
        .with_duration_ms(started.elapsed().as_millis() as u64);
    if let Err(err) = &result {
        done = done.with_details(serde_json::json!({ "error": err.to_string() }));
    }
    log.record(done);
    log.flush()?;

    if result? {
        return Err("missing symbols reported in strict mode".into());
    }
    Ok(())
}

/// Returns whether the run should fail (strict mode with missing symbols).
fn run(
    cli: &Cli,
    config: &AuditConfig,
    log: &SharedEmitter,
    run_id: &str,
) -> Result<bool, Box<dyn std::error::Error>> {
    log.record(
        LogEntry::new("", LogLevel::Info, "audit.start").with_details(serde_json::json!({
            "directory": cli.directory,
            "tool": config.tool,
            "jobs": config.jobs,
            "timeout_ms": config.timeout.map(|t| t.as_millis() as u64),
            "report_scope": config.report_scope.as_str(),
            "allowlist_scope": config.allowlist_scope.as_str(),
            "best_effort": config.best_effort,
        })),
    );

    let layout = locate_binaries(&cli.directory)?;
    eprintln!(
        "Scanning {} module(s) under {} with {}",
        layout.modules.len(),
        cli.directory.display(),
        config.tool
    );

    let reader = NmReader::new(&config.tool, config.timeout);
    let outcome = run_audit(&layout, &reader, config, log)?;
    // Leave the allowlist untouched once an interrupt arrived.
    if process::interrupted() {
        return Err(AuditError::Interrupted.into());
    }

    let missing = if config.skip_report {
        None
    } else {
        Some(outcome.missing(config.report_scope))
    };
    for m in missing.iter().flatten() {
        println!("{}", m.describe());
        log.record(
            LogEntry::new("", LogLevel::Warn, "missing_symbol")
                .with_binary(&m.module)
                .with_symbol(&m.symbol),
        );
    }

    let mut artifacts = ArtifactIndex::new(run_id);

    let allowlist_summary = match &cli.whitelist {
        Some(path) => {
            let merged = allowlist::update_file(
                path,
                &outcome.all_required(),
                &outcome.reference_exports(config.allowlist_scope),
            )?;
            eprintln!(
                "Wrote {} ({} symbols, {} added)",
                path.display(),
                merged.allowlist.len(),
                merged.added.len()
            );
            artifacts.add_file(path, "allowlist")?;
            log.record(
                LogEntry::new("", LogLevel::Info, "allowlist.written")
                    .with_outcome(Outcome::Pass)
                    .with_artifacts(vec![path.display().to_string()])
                    .with_details(serde_json::json!({
                        "total": merged.allowlist.len(),
                        "added": merged.added,
                    })),
            );
            Some(AllowlistSummary::new(path, &merged))
        }
        None => None,
    };

    if let Some(path) = &cli.report_json {
        let report = AuditReport::new(&outcome, config, missing.as_deref(), allowlist_summary);
        ensure_parent(path)?;
        std::fs::write(path, report.to_json()?)?;
        artifacts.add_file(path, "report")?;
        eprintln!("Wrote report to {}", path.display());
    }

    if let Some(log_path) = &cli.log
        && !artifacts.is_empty()
    {
        let index_path = log_path.with_extension("artifacts.json");
        std::fs::write(&index_path, artifacts.to_json()?)?;
    }

    let missing_count = missing.as_ref().map_or(0, Vec::len);
    if missing_count > 0 {
        eprintln!("{missing_count} missing symbol(s)");
    }
    Ok(cli.strict && missing_count > 0)
}

fn ensure_parent(path: &Path) -> std::io::Result<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => std::fs::create_dir_all(parent),
        _ => Ok(()),
    }
}

fn run_id() -> String {
    let secs = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();
    format!("run-{secs}-{}", std::process::id())
}
