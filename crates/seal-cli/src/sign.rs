//! `seal sign`: detached signature envelopes for JSON artifacts.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, Subcommand};

use seal_core::Timestamp;
use seal_crypto::{append_signature, sign_artifact, verify_artifact_file, SignerIdentity};

use crate::keys::{KeyArgs, NamedKey};
use crate::{finish_report, parse_clock, CliContext};

#[derive(Args, Debug)]
pub struct SignArgs {
    #[command(subcommand)]
    pub command: SignCommand,
}

/// Identity recorded with a signature.
#[derive(Args, Debug)]
pub struct IdentityArgs {
    #[arg(long)]
    pub signer_id: Option<String>,
    #[arg(long)]
    pub role: Option<String>,
    #[arg(long)]
    pub signer_type: Option<String>,
    /// Signing time. Defaults to now.
    #[arg(long)]
    pub signed_at: Option<String>,
}

impl IdentityArgs {
    fn identity(&self) -> SignerIdentity {
        SignerIdentity {
            signer_id: self.signer_id.clone(),
            role: self.role.clone(),
            signer_type: self.signer_type.clone(),
        }
    }

    fn signed_at(&self) -> Result<Timestamp> {
        Ok(parse_clock(self.signed_at.as_deref())?.unwrap_or_else(Timestamp::now))
    }
}

#[derive(Subcommand, Debug)]
pub enum SignCommand {
    /// Write a single-signature envelope, replacing any existing one.
    Sign {
        #[arg(value_name = "FILE")]
        file: PathBuf,
        #[command(flatten)]
        keys: KeyArgs,
        #[command(flatten)]
        identity: IdentityArgs,
    },

    /// Add a signature to the artifact's envelope.
    Append {
        #[arg(value_name = "FILE")]
        file: PathBuf,
        #[command(flatten)]
        keys: KeyArgs,
        #[command(flatten)]
        identity: IdentityArgs,
    },

    /// Verify the envelope next to an artifact.
    Verify {
        #[arg(value_name = "FILE")]
        file: PathBuf,
        #[command(flatten)]
        keys: KeyArgs,
        /// Witness key, as KEY_ID=BASE64. Repeatable.
        #[arg(long = "witness", value_name = "KEY_ID=BASE64")]
        witnesses: Vec<NamedKey>,
        /// Override the envelope's threshold.
        #[arg(long)]
        threshold: Option<usize>,
        #[arg(long)]
        json: bool,
    },
}

pub fn run_sign(args: &SignArgs, _ctx: &CliContext) -> Result<u8> {
    match &args.command {
        SignCommand::Sign {
            file,
            keys,
            identity,
        } => {
            let signer = keys.signer()?;
            let path = sign_artifact(file, signer.as_ref(), &identity.identity(), identity.signed_at()?)?;
            println!("OK: signed {} with {}", file.display(), signer.key_id());
            println!("  Envelope: {}", path.display());
            Ok(0)
        }
        SignCommand::Append {
            file,
            keys,
            identity,
        } => {
            let signer = keys.signer()?;
            let path =
                append_signature(file, signer.as_ref(), &identity.identity(), identity.signed_at()?)?;
            println!("OK: appended signature by {}", signer.key_id());
            println!("  Envelope: {}", path.display());
            Ok(0)
        }
        SignCommand::Verify {
            file,
            keys,
            witnesses,
            threshold,
            json,
        } => {
            let ring = keys.keyring(witnesses)?;
            let outcome = verify_artifact_file(file, *threshold, &ring)?;
            tracing::info!(
                valid = outcome.valid_count,
                required = outcome.required,
                "signatures checked"
            );
            finish_report(&outcome.report, *json)
        }
    }
}
