//! # seal CLI entry point
//!
//! Parses command-line arguments, loads the workspace config and dispatches
//! to the subcommand handlers.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use seal_cli::abp::{run_abp, AbpArgs};
use seal_cli::ledger::{run_ledger, LedgerArgs};
use seal_cli::log::{run_log, LogArgs};
use seal_cli::pack::{run_pack, PackArgs};
use seal_cli::rekey::{run_rekey, RekeyArgs};
use seal_cli::replay::{run_audit, run_replay, AuditArgs, ReplayArgs};
use seal_cli::seal::{run_prove, run_seal, ProveArgs, SealArgs};
use seal_cli::sign::{run_sign, SignArgs};
use seal_cli::CliContext;

/// Sealed decision runs with replayable proofs.
///
/// Seals a decision and the inputs it was made from into a tamper-evident
/// artifact bound to a ledger of authority grants, then signs, logs and
/// replays it.
#[derive(Parser, Debug)]
#[command(name = "seal", version, about, long_about = None)]
struct Cli {
    /// Enable verbose output. Repeat for more verbosity (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Path to the seal.yaml config file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Output directory for sealed runs and ABPs.
    #[arg(long, global = true)]
    output_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Seal one decision into a sealed run and manifest.
    Seal(SealArgs),

    /// Seal, sign, log, audit and replay a decision in one pass.
    Prove(ProveArgs),

    /// Verify a sealed run: structure, hashes, signatures, log and authority.
    Replay(ReplayArgs),

    /// Check a sealed run for nondeterminism.
    Audit(AuditArgs),

    /// Authority ledger: append, revoke, status and verify.
    Ledger(LedgerArgs),

    /// Transparency log: append, verify and head.
    Log(LogArgs),

    /// Authority Boundary Primitives: build, compose and verify.
    Abp(AbpArgs),

    /// Detached signature envelopes.
    Sign(SignArgs),

    /// Contract-gated record re-encryption.
    Rekey(RekeyArgs),

    /// Evidence packs.
    Pack(PackArgs),
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => EnvFilter::new("warn"),
        1 => EnvFilter::new("info"),
        2 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let ctx = match CliContext::load(cli.config.as_deref(), cli.output_dir.as_deref()) {
        Ok(ctx) => ctx,
        Err(e) => {
            tracing::error!("{e:#}");
            return ExitCode::from(1);
        }
    };
    tracing::debug!(root = %ctx.config.root.display(), "config loaded");

    let result = match cli.command {
        Commands::Seal(args) => run_seal(&args, &ctx),
        Commands::Prove(args) => run_prove(&args, &ctx),
        Commands::Replay(args) => run_replay(&args, &ctx),
        Commands::Audit(args) => run_audit(&args, &ctx),
        Commands::Ledger(args) => run_ledger(&args, &ctx),
        Commands::Log(args) => run_log(&args, &ctx),
        Commands::Abp(args) => run_abp(&args, &ctx),
        Commands::Sign(args) => run_sign(&args, &ctx),
        Commands::Rekey(args) => run_rekey(&args, &ctx),
        Commands::Pack(args) => run_pack(&args, &ctx),
    };

    match result {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            tracing::error!("{e:#}");
            ExitCode::from(1)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn command_definitions_are_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn global_flags_follow_subcommands() {
        let cli = Cli::try_parse_from(["seal", "log", "verify", "-vv", "--config", "alt.yaml"]).unwrap();
        assert_eq!(cli.verbose, 2);
        assert_eq!(cli.config, Some(PathBuf::from("alt.yaml")));
        assert!(matches!(cli.command, Commands::Log(_)));
    }
}
