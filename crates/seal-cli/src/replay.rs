//! `seal replay` and `seal audit`.

use std::path::PathBuf;

use anyhow::Result;
use clap::Args;

use seal_run::{audit_file, replay_file, ReplayOptions, SignatureCheck};

use crate::keys::{KeyArgs, NamedKey};
use crate::{finish_report, parse_clock, print_json, CliContext};

#[derive(Args, Debug)]
pub struct ReplayArgs {
    /// Sealed run to verify.
    #[arg(value_name = "SEALED")]
    pub sealed: PathBuf,

    /// Referenced inputs and emitted artifacts must exist on disk.
    #[arg(long)]
    pub strict: bool,

    /// Re-hash inputs relative to this directory. Defaults to the config root.
    #[arg(long)]
    pub root: Option<PathBuf>,

    /// Skip on-disk re-hashing of inputs.
    #[arg(long, conflicts_with = "root")]
    pub no_disk: bool,

    /// Verify signatures. Implied by --key or --public-key.
    #[arg(long)]
    pub verify_sig: bool,

    #[command(flatten)]
    pub keys: KeyArgs,

    /// Witness verification key, as KEY_ID=BASE64. Repeatable.
    #[arg(long = "witness", value_name = "KEY_ID=BASE64")]
    pub witnesses: Vec<NamedKey>,

    /// Override the envelope's signature threshold.
    #[arg(long)]
    pub threshold: Option<usize>,

    /// Signature envelope. Defaults to `<SEALED>.sig.json`.
    #[arg(long)]
    pub sig: Option<PathBuf>,

    /// Transparency log to check the commit hash against.
    #[arg(long)]
    pub transparency_log: Option<PathBuf>,

    /// Authority ledger to check the bound grant against.
    #[arg(long)]
    pub authority_ledger: Option<PathBuf>,

    /// Judge current revocation at this time instead of now.
    #[arg(long)]
    pub at: Option<String>,

    #[arg(long)]
    pub json: bool,
}

impl ReplayArgs {
    fn wants_signature(&self) -> bool {
        self.verify_sig || self.keys.key.is_some() || self.keys.public_key.is_some()
    }
}

pub fn run_replay(args: &ReplayArgs, ctx: &CliContext) -> Result<u8> {
    let signature = if args.wants_signature() {
        Some(SignatureCheck {
            keys: args.keys.keyring(&args.witnesses)?,
            threshold: args.threshold,
            sig_path: args.sig.clone(),
        })
    } else {
        None
    };
    let root = if args.no_disk {
        None
    } else {
        Some(args.root.clone().unwrap_or_else(|| ctx.config.root.clone()))
    };
    let options = ReplayOptions {
        strict: args.strict,
        root,
        signature,
        transparency_log: args.transparency_log.clone(),
        authority_ledger: args.authority_ledger.clone(),
        verify_at: parse_clock(args.at.as_deref())?,
    };
    tracing::info!(sealed = %args.sealed.display(), "replaying");
    let report = replay_file(&args.sealed, &options);
    finish_report(&report, args.json)
}

#[derive(Args, Debug)]
pub struct AuditArgs {
    #[arg(value_name = "SEALED")]
    pub sealed: PathBuf,

    /// Treat warnings as violations.
    #[arg(long)]
    pub strict: bool,

    #[arg(long)]
    pub json: bool,
}

/// Exit 0 when clean, 1 with warnings, 2 with violations.
pub fn run_audit(args: &AuditArgs, _ctx: &CliContext) -> Result<u8> {
    let result = audit_file(&args.sealed, args.strict)?;
    if args.json {
        print_json(&result)?;
    } else {
        println!("{result}");
    }
    Ok(result.exit_code())
}
