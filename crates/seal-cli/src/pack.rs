//! `seal pack`: evidence packs for outside verification.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Args, Subcommand};

use seal_crypto::sig_path_for;
use seal_run::{assemble_pack, verify_pack, PackContents, PackVerifyOptions, SealedRun};

use crate::keys::{KeyArgs, NamedKey};
use crate::{finish_report, parse_clock, CliContext};

#[derive(Args, Debug)]
pub struct PackArgs {
    #[command(subcommand)]
    pub command: PackCommand,
}

#[derive(Subcommand, Debug)]
pub enum PackCommand {
    /// Copy a sealed run and its evidence into a pack directory.
    Assemble {
        #[arg(value_name = "SEALED")]
        sealed: PathBuf,
        /// Pack directory.
        #[arg(long)]
        out: PathBuf,
        /// ABP to include.
        #[arg(long)]
        abp: Option<PathBuf>,
        /// Leave out the transparency log.
        #[arg(long)]
        no_log: bool,
        /// Leave out the authority ledger.
        #[arg(long)]
        no_ledger: bool,
    },

    /// Verify every artifact in a pack directory.
    Verify {
        #[arg(long, default_value = ".")]
        pack: PathBuf,
        /// Verify signatures. Implied by --key or --public-key.
        #[arg(long)]
        verify_sig: bool,
        #[command(flatten)]
        keys: KeyArgs,
        #[arg(long = "witness", value_name = "KEY_ID=BASE64")]
        witnesses: Vec<NamedKey>,
        #[arg(long)]
        threshold: Option<usize>,
        /// Treat determinism warnings as failures.
        #[arg(long)]
        strict: bool,
        /// Fail when the pack has no ABP.
        #[arg(long)]
        require_abp: bool,
        #[arg(long)]
        at: Option<String>,
        #[arg(long)]
        json: bool,
    },
}

fn manifest_path_for(sealed: &Path) -> Result<PathBuf> {
    let Some(stem) = sealed.file_stem() else {
        bail!("no file name in {}", sealed.display());
    };
    Ok(sealed.with_file_name(format!("{}.manifest.json", stem.to_string_lossy())))
}

fn existing(path: PathBuf) -> Option<PathBuf> {
    path.is_file().then_some(path)
}

pub fn run_pack(args: &PackArgs, ctx: &CliContext) -> Result<u8> {
    match &args.command {
        PackCommand::Assemble {
            sealed,
            out,
            abp,
            no_log,
            no_ledger,
        } => {
            let run: SealedRun = seal_core::fsio::read_json(sealed)
                .with_context(|| format!("cannot read sealed run {}", sealed.display()))?;
            let contents = PackContents {
                sealed: sealed.clone(),
                manifest: manifest_path_for(sealed)?,
                signatures: existing(sig_path_for(sealed)).into_iter().collect(),
                transparency_log: (!no_log)
                    .then(|| existing(ctx.config.transparency_log()))
                    .flatten(),
                authority_ledger: (!no_ledger)
                    .then(|| existing(ctx.config.authority_ledger()))
                    .flatten(),
                abp: abp.clone(),
            };
            let manifest = assemble_pack(out, &contents, run.run_id(), &run.commit_hash)?;
            println!("OK: pack for {} in {}", manifest.run_id, out.display());
            for (name, hash) in &manifest.files {
                println!("  {name}  {hash}");
            }
            Ok(0)
        }
        PackCommand::Verify {
            pack,
            verify_sig,
            keys,
            witnesses,
            threshold,
            strict,
            require_abp,
            at,
            json,
        } => {
            let wants_sig = *verify_sig || keys.key.is_some() || keys.public_key.is_some();
            let options = PackVerifyOptions {
                keys: if wants_sig {
                    Some(keys.keyring(witnesses)?)
                } else {
                    None
                },
                threshold: *threshold,
                strict: *strict,
                require_abp: *require_abp,
                verify_at: parse_clock(at.as_deref())?,
            };
            finish_report(&verify_pack(pack, &options), *json)
        }
    }
}
