//! # Rekey Subcommand
//!
//! Contract-gated re-encryption of a tenant's record files from the
//! previous master key to the current one, resumable from its checkpoint.
//!
//! Keys come from `--previous-key`/`--current-key` or from
//! `$SEAL_PREVIOUS_MASTER_KEY`/`$SEAL_MASTER_KEY`. The action contract is
//! signed and validated with `$SEAL_CONTRACT_KEY`.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Subcommand};

use seal_core::Timestamp;
use seal_ledger::{ActionContract, ActionLedger, AuthorityTier, ContractRequest};
use seal_rekey::{
    rotate, RecordKey, RekeyJob, RekeySummary, Rotation, RotationAuthority, DEFAULT_BATCH_SIZE,
    DEFAULT_CHECKPOINT, REENCRYPT_ACTION,
};

use crate::keys::{contract_key, env_key};
use crate::{print_json, CliContext};

pub const MASTER_KEY_ENV: &str = "SEAL_MASTER_KEY";
pub const PREVIOUS_MASTER_KEY_ENV: &str = "SEAL_PREVIOUS_MASTER_KEY";

#[derive(Args, Debug)]
pub struct RekeyArgs {
    #[command(subcommand)]
    pub command: RekeyCommand,
}

#[derive(Subcommand, Debug)]
pub enum RekeyCommand {
    /// Re-encrypt, or resume re-encrypting, a tenant's records.
    Run(RunArgs),

    /// Issue a signed action contract.
    Contract {
        #[arg(long, default_value = REENCRYPT_ACTION)]
        action_type: String,
        #[arg(long)]
        requested_by: String,
        #[arg(long)]
        dri: String,
        #[arg(long)]
        approver: String,
        /// Lifetime in seconds.
        #[arg(long)]
        ttl: Option<i64>,
        /// Write the contract here instead of stdout.
        #[arg(long)]
        out: Option<PathBuf>,
    },
}

#[derive(Args, Debug)]
pub struct RunArgs {
    #[arg(long)]
    pub tenant: String,

    /// Directory of `*.ndjson` record files. Defaults to the configured data directory.
    #[arg(long)]
    pub data_dir: Option<PathBuf>,

    #[arg(long)]
    pub checkpoint: Option<PathBuf>,

    /// Ties a resumed run to the run that wrote the checkpoint.
    #[arg(long)]
    pub idempotency_key: String,

    #[arg(long, default_value_t = DEFAULT_BATCH_SIZE)]
    pub batch_size: usize,

    /// Count what would be re-encrypted without changing anything.
    #[arg(long)]
    pub dry_run: bool,

    /// Signed action contract (JSON).
    #[arg(long, required_unless_present = "dry_run")]
    pub contract: Option<PathBuf>,

    /// Who is running the rotation.
    #[arg(long, required_unless_present = "dry_run")]
    pub signer: Option<String>,

    /// dri or approver.
    #[arg(long, default_value = "dri")]
    pub tier: String,

    #[arg(long, default_value = "scheduled key rotation")]
    pub reason: String,

    /// Action ledger. Defaults to the configured one.
    #[arg(long)]
    pub action_ledger: Option<PathBuf>,

    #[arg(long)]
    pub previous_key: Option<String>,
    #[arg(long)]
    pub previous_key_id: Option<String>,
    #[arg(long)]
    pub current_key: Option<String>,
    #[arg(long)]
    pub current_key_id: Option<String>,
}

fn record_key(flag: &Option<String>, env: &str, key_id: &Option<String>) -> Result<RecordKey> {
    let b64 = flag
        .clone()
        .or_else(|| env_key(env))
        .with_context(|| format!("missing key: pass it as a flag or set ${env}"))?;
    Ok(RecordKey::from_base64(key_id.as_deref(), &b64)?)
}

fn print_summary(summary: &RekeySummary) {
    if summary.dry_run {
        println!(
            "OK: {} would re-encrypt {} records in {} files",
            summary.tenant_id, summary.records_targeted, summary.files_targeted
        );
    } else {
        println!(
            "OK: {} re-encrypted {} of {} records in {} files ({})",
            summary.tenant_id,
            summary.records_reencrypted,
            summary.records_targeted,
            summary.files_targeted,
            summary.status.as_str(),
        );
    }
    if summary.resumed {
        println!("  Resumed from {}", summary.checkpoint_path.display());
    }
}

pub fn run_rekey(args: &RekeyArgs, ctx: &CliContext) -> Result<u8> {
    match &args.command {
        RekeyCommand::Run(run) => cmd_run(run, ctx),
        RekeyCommand::Contract {
            action_type,
            requested_by,
            dri,
            approver,
            ttl,
            out,
        } => {
            let mut request = ContractRequest::new(action_type, requested_by, dri, approver);
            if let Some(ttl) = ttl {
                request = request.ttl(*ttl);
            }
            let contract = ActionContract::create(request, &contract_key()?, Timestamp::now())?;
            match out {
                Some(path) => {
                    seal_core::fsio::write_json_atomic(path, &contract)?;
                    println!("OK: contract {} written to {}", contract.action_id, path.display());
                    println!("  Expires: {}", contract.expires_at()?);
                }
                None => print_json(&contract)?,
            }
            Ok(0)
        }
    }
}

fn cmd_run(args: &RunArgs, ctx: &CliContext) -> Result<u8> {
    let data_dir = args.data_dir.clone().unwrap_or_else(|| ctx.config.data_dir());
    let checkpoint = args
        .checkpoint
        .clone()
        .unwrap_or_else(|| ctx.config.resolve(std::path::Path::new(DEFAULT_CHECKPOINT)));
    let job = RekeyJob::new(&args.tenant, data_dir, checkpoint, &args.idempotency_key)
        .batch_size(args.batch_size);

    if args.dry_run {
        let summary = job.dry_run()?;
        print_summary(&summary);
        return Ok(0);
    }

    let rotation = Rotation {
        previous: record_key(&args.previous_key, PREVIOUS_MASTER_KEY_ENV, &args.previous_key_id)?,
        current: record_key(&args.current_key, MASTER_KEY_ENV, &args.current_key_id)?,
    };
    let contract_path = args
        .contract
        .as_ref()
        .context("--contract is required unless --dry-run")?;
    let raw: serde_json::Value = seal_core::fsio::read_json(contract_path)
        .with_context(|| format!("cannot read contract {}", contract_path.display()))?;
    let contract = ActionContract::from_value(&raw)?;
    let hmac = contract_key()?;
    let ledger = ActionLedger::open(
        args.action_ledger
            .clone()
            .unwrap_or_else(|| ctx.config.action_ledger()),
    );
    let authority = RotationAuthority {
        contract: &contract,
        contract_key: &hmac,
        signer_id: args.signer.as_deref().unwrap_or_default(),
        signer_tier: AuthorityTier::parse(&args.tier)?,
        reason: &args.reason,
        ledger: &ledger,
    };
    let outcome = rotate(&job, &rotation, &authority, Timestamp::now())?;
    print_summary(&outcome.summary);
    println!("  Authorized by ledger entry {}", outcome.authorized.body.entry_id);
    if let Some(done) = &outcome.completed {
        println!("  Completion entry {}", done.body.entry_id);
    }
    Ok(0)
}
