//! # seal-cli: The `seal` Command-Line Interface
//!
//! Argument parsing and output formatting only. Every handler delegates to
//! the domain crates and returns the process exit code.
//!
//! ## Subcommands
//!
//! - `seal seal`: seal one decision into a run artifact.
//! - `seal prove`: the full seal-and-prove pipeline.
//! - `seal replay`, `seal audit`: verify a sealed run.
//! - `seal ledger`, `seal log`: authority ledger and transparency log.
//! - `seal abp`: build, compose and verify Authority Boundary Primitives.
//! - `seal sign`: sign, co-sign and verify artifacts.
//! - `seal rekey`: contract-gated record re-encryption.
//! - `seal pack`: assemble and verify evidence packs.
//!
//! ## Exit codes
//!
//! Verification commands exit with the report's worst severity: 0 pass,
//! 1 other failure, 2 structural, 3 hash mismatch, 4 missing file. Any
//! other error exits 1.

pub mod abp;
pub mod keys;
pub mod ledger;
pub mod log;
pub mod pack;
pub mod rekey;
pub mod replay;
pub mod seal;
pub mod sign;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;

use seal_core::{Timestamp, VerificationReport};
use seal_run::SealConfig;

/// Config file looked up from the current directory upward.
pub const CONFIG_FILE: &str = "seal.yaml";

/// Settings shared by every handler.
#[derive(Debug, Clone)]
pub struct CliContext {
    pub config: SealConfig,
}

impl CliContext {
    /// Load `--config`, else the nearest `seal.yaml`, else defaults rooted
    /// at the current directory. `--output-dir` overrides the config.
    pub fn load(config: Option<&Path>, output_dir: Option<&Path>) -> Result<Self> {
        let cwd = std::env::current_dir().context("cannot read current directory")?;
        let config_path = config
            .map(|p| cwd.join(p))
            .or_else(|| find_config(&cwd));
        let mut config = match config_path {
            Some(path) => {
                tracing::debug!(config = %path.display(), "loading config");
                SealConfig::from_yaml_file(&path)?
            }
            None => SealConfig::rooted(&cwd),
        };
        if let Some(dir) = output_dir {
            config.out_dir = cwd.join(dir);
        }
        Ok(Self { config })
    }
}

fn find_config(start: &Path) -> Option<PathBuf> {
    let mut dir = start;
    loop {
        let candidate = dir.join(CONFIG_FILE);
        if candidate.is_file() {
            return Some(candidate);
        }
        dir = dir.parent()?;
    }
}

/// Parse an optional `--clock` value.
pub fn parse_clock(clock: Option<&str>) -> Result<Option<Timestamp>> {
    clock
        .map(|c| Timestamp::parse(c).with_context(|| format!("invalid --clock {c:?}")))
        .transpose()
}

pub fn print_json(value: &impl Serialize) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Print a report and map it to the exit code.
pub fn finish_report(report: &VerificationReport, json: bool) -> Result<u8> {
    if json {
        print_json(report)?;
    } else {
        println!("{report}");
    }
    Ok(report.exit_code())
}
