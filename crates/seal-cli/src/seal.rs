//! # Seal Subcommands
//!
//! `seal seal` writes one sealed run and its manifest. `seal prove` runs
//! the whole pipeline: authority, optional ABP, seal, sign, transparency
//! log, audit, self-replay and an optional evidence pack.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;

use seal_core::Timestamp;
use seal_crypto::SignerIdentity;
use seal_ledger::AuthorityLedger;
use seal_run::{seal_and_prove, AbpConfig, AbpSource, Assembler, PipelineOptions, SealRequest, Witness};

use crate::keys::{KeyArgs, NamedKey};
use crate::{parse_clock, print_json, CliContext};

#[derive(Args, Debug)]
pub struct SealArgs {
    /// Decision to seal.
    #[arg(long)]
    pub decision_id: String,

    /// Logical clock (ISO-8601 UTC). Without it the seal is not reproducible.
    #[arg(long)]
    pub clock: Option<String>,

    /// Authority ledger entry to seal under.
    #[arg(long)]
    pub authority_entry: Option<String>,

    /// Print the outcome as JSON.
    #[arg(long)]
    pub json: bool,
}

pub fn run_seal(args: &SealArgs, ctx: &CliContext) -> Result<u8> {
    let clock = parse_clock(args.clock.as_deref())?;
    if clock.is_none() {
        tracing::warn!("no --clock given; sealing against wall-clock time");
    }
    let ledger = AuthorityLedger::open(ctx.config.authority_ledger());
    let mut request = SealRequest::new(&args.decision_id).observed_at(Timestamp::now());
    if let Some(clock) = clock {
        request = request.clock(clock);
    }
    if let Some(entry_id) = &args.authority_entry {
        request = request.authority(&ledger, entry_id);
    }
    let outcome = Assembler::new(&ctx.config)
        .seal(&request)
        .with_context(|| format!("failed to seal {}", args.decision_id))?;

    if args.json {
        print_json(&serde_json::json!({
            "run_id": outcome.sealed.run_id(),
            "commit_hash": outcome.sealed.commit_hash,
            "hash": outcome.sealed.hash,
            "sealed_path": outcome.sealed_path,
            "manifest_path": outcome.manifest_path,
        }))?;
    } else {
        println!("OK: sealed {}", outcome.sealed.run_id());
        println!("  Commit hash: {}", outcome.sealed.commit_hash);
        println!("  Sealed run:  {}", outcome.sealed_path.display());
        println!("  Manifest:    {}", outcome.manifest_path.display());
    }
    Ok(0)
}

#[derive(Args, Debug)]
pub struct ProveArgs {
    #[arg(long)]
    pub decision_id: String,

    /// Logical clock (ISO-8601 UTC). Required for a reproducible proof.
    #[arg(long)]
    pub clock: String,

    #[command(flatten)]
    pub keys: KeyArgs,

    /// Signer id recorded with the primary signature.
    #[arg(long)]
    pub signer_id: Option<String>,

    /// Role recorded with the primary signature.
    #[arg(long)]
    pub role: Option<String>,

    /// Additional witness signer, as KEY_ID=BASE64. Repeatable.
    #[arg(long = "witness", value_name = "KEY_ID=BASE64")]
    pub witnesses: Vec<NamedKey>,

    /// Authority ledger entry to seal under.
    #[arg(long, conflicts_with = "auto_authority")]
    pub authority_entry: Option<String>,

    /// Reuse or create an AUTO-<decision> grant for this decision.
    #[arg(long)]
    pub auto_authority: bool,

    /// Build an ABP from this YAML or JSON config.
    #[arg(long, conflicts_with = "abp")]
    pub abp_config: Option<PathBuf>,

    /// Attach an existing ABP file.
    #[arg(long)]
    pub abp: Option<PathBuf>,

    /// Assemble an evidence pack into this directory.
    #[arg(long)]
    pub pack_dir: Option<PathBuf>,

    #[arg(long)]
    pub no_transparency: bool,

    #[arg(long)]
    pub no_audit: bool,

    #[arg(long)]
    pub no_replay: bool,

    #[arg(long)]
    pub json: bool,
}

pub fn run_prove(args: &ProveArgs, ctx: &CliContext) -> Result<u8> {
    let clock = Timestamp::parse(&args.clock)
        .with_context(|| format!("invalid --clock {:?}", args.clock))?;
    let signer = args.keys.signer()?;
    let verify_keys = args.keys.keyring(&args.witnesses)?;

    let mut options = PipelineOptions::new(&args.decision_id, clock, signer, verify_keys);
    options.identity = SignerIdentity {
        signer_id: args.signer_id.clone(),
        role: args.role.clone(),
        signer_type: None,
    };
    for witness in &args.witnesses {
        options.witnesses.push(Witness {
            signer: args.keys.witness_signer(witness)?,
            identity: SignerIdentity::new(&witness.key_id, "witness"),
        });
    }
    options.authority_entry_id = args.authority_entry.clone();
    options.auto_authority = args.auto_authority;
    options.abp = match (&args.abp_config, &args.abp) {
        (Some(config), _) => AbpSource::Build(AbpConfig::from_file(config)?),
        (None, Some(path)) => AbpSource::Load(path.clone()),
        (None, None) => AbpSource::None,
    };
    options.transparency = !args.no_transparency;
    options.audit = !args.no_audit;
    options.replay_check = !args.no_replay;
    options.pack_dir = args.pack_dir.clone();

    let summary = seal_and_prove(&ctx.config, &options)?;

    if args.json {
        print_json(&summary)?;
    } else {
        println!("Run:         {}", summary.run_id);
        println!("Commit hash: {}", summary.commit_hash);
        println!("Sealed run:  {}", summary.sealed_path.display());
        for sig in &summary.sig_paths {
            println!("Signature:   {}", sig.display());
        }
        if let Some(entry) = &summary.transparency_entry {
            println!("Log entry:   {entry}");
        }
        if let Some(entry) = &summary.authority_entry_id {
            println!("Authority:   {entry}");
        }
        if let Some(abp) = &summary.abp_path {
            println!("ABP:         {}", abp.display());
        }
        if let Some(pack) = &summary.pack_dir {
            println!("Pack:        {}", pack.display());
        }
        for err in &summary.errors {
            println!("ERROR: {err}");
        }
        if summary.ok() {
            println!("OK: {} sealed and proven", summary.decision_id);
        }
    }
    Ok(if summary.ok() { 0 } else { 1 })
}
