//! Audit configuration.
//!
//! Defaults can be overridden from the environment, and CLI flags override
//! both:
//! - `KSYMCHECK_NM`: symbol-table tool program (default `llvm-nm`)
//! - `KSYMCHECK_JOBS`: worker count (default: available parallelism)
//! - `KSYMCHECK_TIMEOUT_SECS`: per-invocation timeout, `0` disables (default 120)
//! - `KSYMCHECK_REPORT_SCOPE`: `image` or `image+modules` (default `image+modules`)

use std::time::Duration;

use serde::Serialize;

pub const DEFAULT_TOOL: &str = "llvm-nm";
pub const DEFAULT_TIMEOUT_SECS: u64 = 120;

/// Which binaries' exports count as "provided".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceScope {
    /// Only symbols exported by the kernel image.
    ImageOnly,
    /// Image exports plus exports of every scanned module.
    ImageAndModules,
}

impl ReferenceScope {
    /// Parse from string (case-insensitive).
    #[must_use]
    pub fn from_str_loose(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "image" | "image-only" | "image_only" | "vmlinux" => Some(Self::ImageOnly),
            "image+modules" | "image-and-modules" | "image_and_modules" | "all" => {
                Some(Self::ImageAndModules)
            }
            _ => None,
        }
    }

    #[must_use]
    pub const fn includes_modules(self) -> bool {
        matches!(self, Self::ImageAndModules)
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ImageOnly => "image",
            Self::ImageAndModules => "image+modules",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditConfig {
    /// Program invoked as `<tool> --undefined-only|--defined-only <binary>`.
    pub tool: String,
    /// Worker threads for per-binary extraction.
    pub jobs: usize,
    /// Kill a tool invocation after this long. `None` waits forever.
    pub timeout: Option<Duration>,
    /// Reference set for missing-symbol reporting.
    pub report_scope: ReferenceScope,
    /// Reference set for allowlist additions.
    pub allowlist_scope: ReferenceScope,
    /// Skip modules whose symbol tables cannot be read instead of aborting.
    pub best_effort: bool,
    /// No missing-symbol report is produced, so `report_scope` is unused.
    pub skip_report: bool,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            tool: DEFAULT_TOOL.to_string(),
            jobs: default_jobs(),
            timeout: Some(Duration::from_secs(DEFAULT_TIMEOUT_SECS)),
            report_scope: ReferenceScope::ImageAndModules,
            allowlist_scope: ReferenceScope::ImageOnly,
            best_effort: false,
            skip_report: false,
        }
    }
}

impl AuditConfig {
    /// Defaults overlaid with `KSYMCHECK_*` environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overlaid with values from `lookup`. Unparseable values are ignored.
    #[must_use]
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut cfg = Self::default();
        if let Some(tool) = lookup("KSYMCHECK_NM").filter(|v| !v.trim().is_empty()) {
            cfg.tool = tool.trim().to_string();
        }
        if let Some(jobs) = lookup("KSYMCHECK_JOBS").and_then(|v| v.trim().parse::<usize>().ok())
            && jobs > 0
        {
            cfg.jobs = jobs;
        }
        if let Some(secs) =
            lookup("KSYMCHECK_TIMEOUT_SECS").and_then(|v| v.trim().parse::<u64>().ok())
        {
            cfg.set_timeout_secs(secs);
        }
        if let Some(scope) =
            lookup("KSYMCHECK_REPORT_SCOPE").and_then(|v| ReferenceScope::from_str_loose(&v))
        {
            cfg.report_scope = scope;
        }
        cfg
    }

    /// `0` disables the timeout.
    pub fn set_timeout_secs(&mut self, secs: u64) {
        self.timeout = (secs > 0).then(|| Duration::from_secs(secs));
    }

    /// Module exports only need to be read when some reference set in use needs them.
    #[must_use]
    pub fn needs_module_exports(&self) -> bool {
        (!self.skip_report && self.report_scope.includes_modules())
            || self.allowlist_scope.includes_modules()
    }
}

fn default_jobs() -> usize {
    std::thread::available_parallelism()
        .map(std::num::NonZeroUsize::get)
        .unwrap_or(1)
}
