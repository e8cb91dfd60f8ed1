//! # ABP Subcommand
//!
//! Build, compose and verify Authority Boundary Primitives. Every ABP is
//! bound to an authority ledger entry, which must exist when it is built.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Args, Subcommand};

use seal_abp::{
    compose, load_abp, resolve_authority_ref, verify_abp_file, write_abp, AbpBuilder, AbpScope,
    ComposeRequest,
};
use seal_core::Timestamp;
use seal_ledger::AuthorityLedger;
use seal_run::AbpConfig;

use crate::{finish_report, parse_clock, CliContext};

#[derive(Args, Debug)]
pub struct AbpArgs {
    /// Authority ledger. Defaults to the configured one.
    #[arg(long, global = true)]
    pub ledger: Option<PathBuf>,

    #[command(subcommand)]
    pub command: AbpCommand,
}

/// Scope flags shared by `build` and `compose`.
#[derive(Args, Debug)]
pub struct ScopeArgs {
    #[arg(long)]
    pub contract_id: Option<String>,

    #[arg(long)]
    pub program: Option<String>,

    /// Module in scope. Repeatable.
    #[arg(long = "module")]
    pub modules: Vec<String>,
}

impl ScopeArgs {
    fn resolve(&self, from_config: Option<AbpScope>) -> Result<AbpScope> {
        match (from_config, &self.contract_id, &self.program) {
            (_, Some(contract_id), Some(program)) => Ok(AbpScope {
                contract_id: contract_id.clone(),
                program: program.clone(),
                modules: self.modules.clone(),
            }),
            (Some(scope), None, None) => Ok(scope),
            _ => bail!("give both --contract-id and --program, or a config with a scope"),
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum AbpCommand {
    /// Build an ABP from a config document.
    Build {
        /// Ledger entry the ABP is bound to.
        #[arg(long)]
        authority_entry: String,
        /// YAML or JSON document with the scope and ABP sections.
        #[arg(long)]
        abp_config: Option<PathBuf>,
        #[command(flatten)]
        scope: ScopeArgs,
        #[arg(long)]
        clock: String,
        #[arg(long)]
        effective_at: Option<String>,
        #[arg(long)]
        expires_at: Option<String>,
        /// Output directory. Defaults to the configured output directory.
        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// Compose child ABPs into a parent.
    Compose {
        #[arg(long)]
        authority_entry: String,
        #[command(flatten)]
        scope: ScopeArgs,
        #[arg(long)]
        clock: String,
        #[arg(long)]
        effective_at: Option<String>,
        #[arg(long)]
        expires_at: Option<String>,
        #[arg(long)]
        out: Option<PathBuf>,
        /// Child ABP files. None yields an empty parent.
        #[arg(value_name = "CHILD")]
        children: Vec<PathBuf>,
    },

    /// Verify an ABP file.
    Verify {
        #[arg(value_name = "ABP")]
        abp: PathBuf,
        /// Skip the authority ledger checks.
        #[arg(long)]
        no_ledger: bool,
        /// Judge authority at this time. Defaults to now.
        #[arg(long)]
        at: Option<String>,
        #[arg(long)]
        json: bool,
    },
}

fn clock(value: &str) -> Result<Timestamp> {
    Timestamp::parse(value).with_context(|| format!("invalid timestamp {value:?}"))
}

pub fn run_abp(args: &AbpArgs, ctx: &CliContext) -> Result<u8> {
    let ledger = AuthorityLedger::open(
        args.ledger
            .clone()
            .unwrap_or_else(|| ctx.config.authority_ledger()),
    );
    match &args.command {
        AbpCommand::Build {
            authority_entry,
            abp_config,
            scope,
            clock: at,
            effective_at,
            expires_at,
            out,
        } => {
            let abp_config = match abp_config {
                Some(path) => AbpConfig::from_file(path)?,
                None => AbpConfig::default(),
            };
            let scope = scope.resolve(abp_config.scope.clone())?;
            let authority_ref = resolve_authority_ref(authority_entry, &ledger)?;
            let mut builder = AbpBuilder::new(scope, authority_ref, clock(at)?)
                .sections(&abp_config.sections)
                .expires_at(parse_clock(expires_at.as_deref())?);
            if let Some(effective) = parse_clock(effective_at.as_deref())? {
                builder = builder.effective_at(effective);
            }
            let abp = builder.build()?;
            let path = write_abp(&abp, &out.clone().unwrap_or_else(|| ctx.config.out_dir()))?;
            println!("OK: built {}", abp.abp_id);
            println!("  Hash: {}", abp.hash);
            println!("  File: {}", path.display());
            Ok(0)
        }
        AbpCommand::Compose {
            authority_entry,
            scope,
            clock: at,
            effective_at,
            expires_at,
            out,
            children,
        } => {
            let children = children
                .iter()
                .map(|p| load_abp(p).with_context(|| format!("cannot load {}", p.display())))
                .collect::<Result<Vec<_>>>()?;
            let request = ComposeRequest {
                scope: scope.resolve(None)?,
                authority_ref: resolve_authority_ref(authority_entry, &ledger)?,
                clock: clock(at)?,
                effective_at: parse_clock(effective_at.as_deref())?,
                expires_at: parse_clock(expires_at.as_deref())?,
            };
            let parent = compose(request, &children)?;
            let path = write_abp(&parent, &out.clone().unwrap_or_else(|| ctx.config.out_dir()))?;
            println!("OK: composed {} from {} children", parent.abp_id, children.len());
            println!("  File: {}", path.display());
            Ok(0)
        }
        AbpCommand::Verify {
            abp,
            no_ledger,
            at,
            json,
        } => {
            let at = parse_clock(at.as_deref())?.unwrap_or_else(Timestamp::now);
            let ledger = (!no_ledger).then_some(&ledger);
            finish_report(&verify_abp_file(abp, ledger, at), *json)
        }
    }
}
