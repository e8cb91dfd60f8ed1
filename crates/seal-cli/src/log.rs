//! `seal log`: the append-only transparency log.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Subcommand};

use seal_ledger::{LogAppend, TransparencyLog};
use seal_run::SealedRun;

use crate::{finish_report, print_json, CliContext};

#[derive(Args, Debug)]
pub struct LogArgs {
    /// Log file. Defaults to the configured transparency log.
    #[arg(long, global = true)]
    pub log: Option<PathBuf>,

    #[command(subcommand)]
    pub command: LogCommand,
}

#[derive(Subcommand, Debug)]
pub enum LogCommand {
    /// Record a sealed run in the log.
    Append {
        #[arg(value_name = "SEALED")]
        sealed: PathBuf,
        #[arg(long)]
        signing_key_id: Option<String>,
        #[arg(long)]
        witness_key_id: Option<String>,
    },

    /// Verify the log's hash chain.
    Verify {
        #[arg(long)]
        json: bool,
    },

    /// Write the head snapshot.
    Head {
        /// Defaults to LOG_HEAD.json beside the log.
        #[arg(long)]
        out: Option<PathBuf>,
    },
}

pub fn run_log(args: &LogArgs, ctx: &CliContext) -> Result<u8> {
    let log = TransparencyLog::open(
        args.log
            .clone()
            .unwrap_or_else(|| ctx.config.transparency_log()),
    );
    match &args.command {
        LogCommand::Append {
            sealed,
            signing_key_id,
            witness_key_id,
        } => {
            let run: SealedRun = seal_core::fsio::read_json(sealed)
                .with_context(|| format!("cannot read sealed run {}", sealed.display()))?;
            let entry = log.append(LogAppend {
                run_id: run.run_id().to_string(),
                commit_hash: run.commit_hash.clone(),
                sealed_hash: run.hash.clone(),
                signing_key_id: signing_key_id.clone(),
                witness_key_id: witness_key_id.clone(),
                artifact_path: Some(ctx.config.display_path(sealed)),
            })?;
            println!("OK: logged {}", entry.body.run_id);
            println!("  Entry: {}", entry.body.entry_id);
            Ok(0)
        }
        LogCommand::Verify { json } => finish_report(&log.verify(), *json),
        LogCommand::Head { out } => {
            let (path, head) = log.write_head(out.as_deref())?;
            tracing::info!(path = %path.display(), "log head written");
            print_json(&head)?;
            Ok(0)
        }
    }
}
