//! Audit tooling for kernel image and module symbol usage.
//!
//! This crate provides:
//! - Binary location: find the kernel image and loadable modules under a tree
//! - Symbol reading: run an `nm`-compatible tool per binary
//! - Process control: per-tool process groups, timeout and interrupt teardown
//! - Audit orchestration: parallel extraction folded into pure maps
//! - Report generation: plain missing-symbol lines + machine-readable JSON
//! - Structured logging: JSONL events with an artifact index

#![deny(unsafe_code)]

pub mod audit;
pub mod config;
pub mod locator;
pub mod process;
pub mod reader;
pub mod report;
pub mod structured_log;

pub use audit::{AuditOutcome, SkippedBinary, run_audit};
pub use config::{AuditConfig, ReferenceScope};
pub use locator::{BinaryLayout, locate_binaries};
pub use reader::{NmReader, SymbolTableReader};
pub use report::AuditReport;
