//! # Ledger Subcommand
//!
//! Appends, revokes and inspects grants in the authority ledger, and
//! verifies the hash chains of both the authority and action ledgers.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Subcommand};

use seal_core::Timestamp;
use seal_ledger::{ActionLedger, AuthorityLedger, GrantRequest, GrantType, ScopeBound};

use crate::{finish_report, parse_clock, print_json, CliContext};

#[derive(Args, Debug)]
pub struct LedgerArgs {
    /// Ledger file. Defaults to the configured authority ledger.
    #[arg(long, global = true)]
    pub ledger: Option<PathBuf>,

    #[command(subcommand)]
    pub command: LedgerCommand,
}

#[derive(Subcommand, Debug)]
pub enum LedgerCommand {
    /// Append an authority grant.
    Append(AppendArgs),

    /// Revoke a grant, effective at the given time.
    Revoke {
        #[arg(long)]
        authority_id: String,
        #[arg(long)]
        reason: String,
        /// Revocation time. Defaults to now.
        #[arg(long)]
        at: Option<String>,
    },

    /// Report whether a grant is active at a point in time.
    Status {
        #[arg(long)]
        authority_id: String,
        /// Defaults to now.
        #[arg(long)]
        at: Option<String>,
    },

    /// Verify the authority ledger's hash chain.
    Verify {
        #[arg(long)]
        json: bool,
    },

    /// Verify the action ledger's hash chain.
    VerifyActions {
        /// Defaults to the configured action ledger.
        #[arg(long)]
        actions: Option<PathBuf>,
        #[arg(long)]
        json: bool,
    },
}

#[derive(Args, Debug)]
pub struct AppendArgs {
    #[arg(long)]
    pub authority_id: String,

    #[arg(long)]
    pub actor_id: String,

    #[arg(long, default_value = "Operator")]
    pub actor_role: String,

    /// direct, delegated or emergency.
    #[arg(long, default_value = "direct")]
    pub grant_type: String,

    #[arg(long)]
    pub effective_at: String,

    #[arg(long)]
    pub expires_at: Option<String>,

    /// Decision id in scope, or `*`. Repeatable.
    #[arg(long = "decision")]
    pub decisions: Vec<String>,

    #[arg(long = "claim")]
    pub claims: Vec<String>,

    #[arg(long = "patch")]
    pub patches: Vec<String>,

    #[arg(long = "prompt")]
    pub prompts: Vec<String>,

    #[arg(long = "dataset")]
    pub datasets: Vec<String>,

    /// Policy version. Defaults to the configured version file.
    #[arg(long)]
    pub policy_version: Option<String>,

    /// Policy hash. Defaults to the sha256 of the policy baseline.
    #[arg(long)]
    pub policy_hash: Option<String>,

    /// Require a witness with this role.
    #[arg(long)]
    pub witness_role: Option<String>,

    #[arg(long)]
    pub signing_key_id: Option<String>,

    #[arg(long, default_value = "")]
    pub notes: String,
}

pub fn run_ledger(args: &LedgerArgs, ctx: &CliContext) -> Result<u8> {
    let path = args
        .ledger
        .clone()
        .unwrap_or_else(|| ctx.config.authority_ledger());
    let ledger = AuthorityLedger::open(&path);
    match &args.command {
        LedgerCommand::Append(append) => cmd_append(&ledger, append, ctx),
        LedgerCommand::Revoke {
            authority_id,
            reason,
            at,
        } => {
            let at = parse_clock(at.as_deref())?.unwrap_or_else(Timestamp::now);
            let entry = ledger.revoke(authority_id, reason, at)?;
            println!("OK: revoked {authority_id} at {at}");
            println!("  Entry: {}", entry.body.entry_id);
            Ok(0)
        }
        LedgerCommand::Status { authority_id, at } => {
            let at = parse_clock(at.as_deref())?.unwrap_or_else(Timestamp::now);
            let status = ledger.status(authority_id, at)?;
            println!("{authority_id} at {at}: {status}");
            Ok(if status.is_active() { 0 } else { 1 })
        }
        LedgerCommand::Verify { json } => finish_report(&ledger.verify(), *json),
        LedgerCommand::VerifyActions { actions, json } => {
            let path = actions.clone().unwrap_or_else(|| ctx.config.action_ledger());
            finish_report(&ActionLedger::open(path).verify(), *json)
        }
    }
}

fn cmd_append(ledger: &AuthorityLedger, args: &AppendArgs, ctx: &CliContext) -> Result<u8> {
    let effective_at = Timestamp::parse(&args.effective_at)
        .with_context(|| format!("invalid --effective-at {:?}", args.effective_at))?;
    let policy_version = args
        .policy_version
        .clone()
        .unwrap_or_else(|| ctx.config.policy_version());
    let policy_hash = match &args.policy_hash {
        Some(hash) => hash.clone(),
        None => {
            let baseline = ctx.config.policy_baseline();
            seal_core::sha256_file(&baseline)
                .with_context(|| format!("cannot hash policy baseline {}", baseline.display()))?
                .to_string()
        }
    };
    let mut request = GrantRequest::new(
        &args.authority_id,
        &args.actor_id,
        &args.actor_role,
        effective_at,
    )
    .grant_type(GrantType::parse(&args.grant_type)?)
    .scope(ScopeBound {
        decisions: args.decisions.clone(),
        claims: args.claims.clone(),
        patches: args.patches.clone(),
        prompts: args.prompts.clone(),
        datasets: args.datasets.clone(),
    })
    .policy(policy_version, policy_hash)
    .notes(&args.notes);
    if let Some(expires) = parse_clock(args.expires_at.as_deref())? {
        request = request.expires_at(expires);
    }
    if let Some(role) = &args.witness_role {
        request = request.witness(role);
    }
    if let Some(key_id) = &args.signing_key_id {
        request = request.signing_key_id(key_id);
    }

    let entry = ledger.append(request)?;
    print_json(&entry)?;
    Ok(0)
}
