//! Key material from flags and the environment.

use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Args;

use seal_crypto::{
    select_signer, ArtifactSigner, Ed25519KeyPair, Ed25519PublicKey, HmacKey, KeyRing,
    SignatureAlgorithm, SignerConfig, VerifyKey,
};

/// Base64 signing key used when `--key` is absent.
pub const SIGNING_KEY_ENV: &str = "SEAL_SIGNING_KEY";
/// Base64 HMAC key that signs and validates action contracts.
pub const CONTRACT_KEY_ENV: &str = "SEAL_CONTRACT_KEY";

#[derive(Args, Debug, Clone)]
pub struct KeyArgs {
    /// Signature algorithm: hmac or ed25519.
    #[arg(long, default_value = "hmac")]
    pub algorithm: String,

    /// Base64 HMAC key or Ed25519 seed. Defaults to $SEAL_SIGNING_KEY.
    #[arg(long)]
    pub key: Option<String>,

    /// Key id recorded in signatures.
    #[arg(long, default_value = "ds-dev")]
    pub key_id: String,

    /// Base64 Ed25519 public key to verify against.
    #[arg(long)]
    pub public_key: Option<String>,

    /// External signer command line, used instead of an in-process key.
    #[arg(long)]
    pub external_signer: Option<String>,

    /// Seconds to wait for the external signer.
    #[arg(long, default_value_t = 30)]
    pub signer_timeout: u64,
}

/// A `KEY_ID=BASE64` pair.
#[derive(Debug, Clone)]
pub struct NamedKey {
    pub key_id: String,
    pub key_b64: String,
}

impl std::str::FromStr for NamedKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once('=') {
            Some((id, key)) if !id.is_empty() && !key.is_empty() => Ok(Self {
                key_id: id.to_string(),
                key_b64: key.to_string(),
            }),
            _ => Err(format!("expected KEY_ID=BASE64, got {s:?}")),
        }
    }
}

pub fn env_key(var: &str) -> Option<String> {
    std::env::var(var).ok().filter(|k| !k.trim().is_empty())
}

/// The action-contract HMAC key from the environment.
pub fn contract_key() -> Result<HmacKey> {
    let b64 = env_key(CONTRACT_KEY_ENV)
        .with_context(|| format!("set ${CONTRACT_KEY_ENV} to the base64 contract key"))?;
    Ok(HmacKey::from_base64(&b64)?)
}

/// Verification key for one base64 secret under `algorithm`.
pub fn verify_key(algorithm: SignatureAlgorithm, key_b64: &str) -> Result<VerifyKey> {
    Ok(match algorithm {
        SignatureAlgorithm::HmacSha256 => VerifyKey::Hmac(HmacKey::from_base64(key_b64)?),
        SignatureAlgorithm::Ed25519 => {
            VerifyKey::Ed25519(Ed25519KeyPair::from_base64_seed(key_b64)?.public_key())
        }
    })
}

impl KeyArgs {
    pub fn algorithm(&self) -> Result<SignatureAlgorithm> {
        Ok(SignatureAlgorithm::parse(&self.algorithm)?)
    }

    fn key_b64(&self) -> Option<String> {
        self.key.clone().or_else(|| env_key(SIGNING_KEY_ENV))
    }

    pub fn signer(&self) -> Result<Box<dyn ArtifactSigner>> {
        self.named_signer(&self.key_id, self.key_b64())
    }

    pub fn witness_signer(&self, witness: &NamedKey) -> Result<Box<dyn ArtifactSigner>> {
        self.named_signer(&witness.key_id, Some(witness.key_b64.clone()))
    }

    fn named_signer(&self, key_id: &str, key_b64: Option<String>) -> Result<Box<dyn ArtifactSigner>> {
        let external_command = self
            .external_signer
            .as_ref()
            .map(|c| c.split_whitespace().map(str::to_string).collect::<Vec<_>>());
        if external_command.is_none() && key_b64.is_none() {
            bail!("no signing key: pass --key or set ${SIGNING_KEY_ENV}");
        }
        let config = SignerConfig {
            key_id: key_id.to_string(),
            key_b64,
            external_command,
            external_timeout: Some(Duration::from_secs(self.signer_timeout)),
        };
        Ok(select_signer(self.algorithm()?, &config)?)
    }

    /// Keys for verification. HMAC needs the shared secret. Ed25519 uses
    /// `--public-key`, else the public half of the seed, else only the
    /// per-witness keys.
    pub fn keyring(&self, witnesses: &[NamedKey]) -> Result<KeyRing> {
        let algorithm = self.algorithm()?;
        let mut ring = KeyRing::new();
        match algorithm {
            SignatureAlgorithm::HmacSha256 => {
                let key = self
                    .key_b64()
                    .with_context(|| format!("HMAC verification needs --key or ${SIGNING_KEY_ENV}"))?;
                ring = ring.with_shared_hmac(HmacKey::from_base64(&key)?);
            }
            SignatureAlgorithm::Ed25519 => {
                if let Some(public) = &self.public_key {
                    ring = ring.with_shared_public(Ed25519PublicKey::from_base64(public)?);
                } else if let Some(seed) = self.key_b64() {
                    ring = ring.with_shared_public(Ed25519KeyPair::from_base64_seed(&seed)?.public_key());
                } else if witnesses.is_empty() {
                    bail!("Ed25519 verification needs --public-key, --key or --witness");
                }
            }
        }
        for witness in witnesses {
            ring = ring.with_key(witness.key_id.clone(), verify_key(algorithm, &witness.key_b64)?);
        }
        Ok(ring)
    }
}
