//! # Signing Backends
//!
//! A signer is chosen once, at startup, from the configured algorithm and key
//! material. An algorithm whose key material is absent yields
//! [`SignatureError::BackendUnavailable`]; nothing falls back silently to a
//! different algorithm.
//!
//! The external backend runs an out-of-process command. The artifact's
//! canonical bytes go to its stdin and a base64 signature is read from its
//! stdout. The call blocks up to a caller-supplied timeout, after which the
//! child is killed and reaped.

use std::io::{Read, Write};
use std::process::{Command, ExitStatus, Stdio};
use std::time::{Duration, Instant};

use base64::engine::general_purpose::STANDARD as B64;
use base64::Engine;
use seal_core::CanonicalBytes;
use serde::{Deserialize, Serialize};

use crate::ed25519::Ed25519KeyPair;
use crate::error::SignatureError;
use crate::hmac::HmacKey;

const MAX_SIGNER_OUTPUT_BYTES: u64 = 64 * 1024;
const REAP_TIMEOUT: Duration = Duration::from_secs(2);

/// Signature algorithm recorded in envelopes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SignatureAlgorithm {
    #[serde(rename = "hmac-sha256")]
    HmacSha256,
    #[serde(rename = "ed25519")]
    Ed25519,
}

impl SignatureAlgorithm {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::HmacSha256 => "hmac-sha256",
            Self::Ed25519 => "ed25519",
        }
    }

    /// Accepts `hmac`, `hmac-sha256` and `ed25519`.
    pub fn parse(s: &str) -> Result<Self, SignatureError> {
        match s {
            "hmac" | "hmac-sha256" => Ok(Self::HmacSha256),
            "ed25519" => Ok(Self::Ed25519),
            other => Err(SignatureError::BackendUnavailable(format!(
                "unknown algorithm {other:?}"
            ))),
        }
    }
}

impl std::fmt::Display for SignatureAlgorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Output of one signing call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureOutput {
    /// Base64 signature.
    pub signature: String,
    /// Base64 Ed25519 public key, when the algorithm has one.
    pub public_key: Option<String>,
}

/// A configured signing backend.
pub trait ArtifactSigner: std::fmt::Debug + Send + Sync {
    fn algorithm(&self) -> SignatureAlgorithm;

    fn key_id(&self) -> &str;

    fn sign(&self, data: &CanonicalBytes) -> Result<SignatureOutput, SignatureError>;
}

// ---------------------------------------------------------------------------
// In-process backends
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct HmacSigner {
    key_id: String,
    key: HmacKey,
}

impl HmacSigner {
    pub fn new(key_id: impl Into<String>, key: HmacKey) -> Self {
        Self {
            key_id: key_id.into(),
            key,
        }
    }
}

impl ArtifactSigner for HmacSigner {
    fn algorithm(&self) -> SignatureAlgorithm {
        SignatureAlgorithm::HmacSha256
    }

    fn key_id(&self) -> &str {
        &self.key_id
    }

    fn sign(&self, data: &CanonicalBytes) -> Result<SignatureOutput, SignatureError> {
        Ok(SignatureOutput {
            signature: self.key.sign_base64(data),
            public_key: None,
        })
    }
}

#[derive(Debug)]
pub struct Ed25519Signer {
    key_id: String,
    keypair: Ed25519KeyPair,
}

impl Ed25519Signer {
    pub fn new(key_id: impl Into<String>, keypair: Ed25519KeyPair) -> Self {
        Self {
            key_id: key_id.into(),
            keypair,
        }
    }
}

impl ArtifactSigner for Ed25519Signer {
    fn algorithm(&self) -> SignatureAlgorithm {
        SignatureAlgorithm::Ed25519
    }

    fn key_id(&self) -> &str {
        &self.key_id
    }

    fn sign(&self, data: &CanonicalBytes) -> Result<SignatureOutput, SignatureError> {
        Ok(SignatureOutput {
            signature: self.keypair.sign(data).to_base64(),
            public_key: Some(self.keypair.public_key().to_base64()),
        })
    }
}

// ---------------------------------------------------------------------------
// External backend
// ---------------------------------------------------------------------------

/// Out-of-process signer.
#[derive(Debug, Clone)]
pub struct ExternalSigner {
    key_id: String,
    algorithm: SignatureAlgorithm,
    program: String,
    args: Vec<String>,
    timeout: Duration,
    public_key: Option<String>,
}

impl ExternalSigner {
    pub fn new(
        key_id: impl Into<String>,
        algorithm: SignatureAlgorithm,
        program: impl Into<String>,
        args: Vec<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            key_id: key_id.into(),
            algorithm,
            program: program.into(),
            args,
            timeout,
            public_key: None,
        }
    }

    /// Public key to record alongside Ed25519 signatures.
    pub fn with_public_key(mut self, public_key_b64: impl Into<String>) -> Self {
        self.public_key = Some(public_key_b64.into());
        self
    }

    fn run(&self, input: &[u8]) -> Result<Vec<u8>, SignatureError> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => SignatureError::BackendUnavailable(format!(
                    "external signer {:?} not found",
                    self.program
                )),
                _ => SignatureError::SignerFailed(format!("spawn {:?}: {e}", self.program)),
            })?;

        // Stdout and stdin are pumped on their own threads; only the
        // deadline loop below waits on the child.
        let Some(stdout) = child.stdout.take() else {
            let _ = child.kill();
            let _ = bounded_reap(&mut child);
            return Err(SignatureError::SignerFailed("no stdout pipe".into()));
        };
        let reader = std::thread::spawn(move || {
            let mut out = Vec::new();
            stdout
                .take(MAX_SIGNER_OUTPUT_BYTES)
                .read_to_end(&mut out)
                .map(|_| out)
        });
        let writer = child.stdin.take().map(|mut stdin| {
            let input = input.to_vec();
            std::thread::spawn(move || stdin.write_all(&input))
        });

        let deadline = Instant::now() + self.timeout;
        let status = loop {
            match child.try_wait() {
                Ok(Some(status)) => break status,
                Ok(None) => {}
                Err(e) => return Err(SignatureError::SignerFailed(format!("wait: {e}"))),
            }
            if Instant::now() >= deadline {
                let _ = child.kill();
                let _ = bounded_reap(&mut child);
                tracing::warn!(program = %self.program, "external signer timed out");
                return Err(SignatureError::SignerTimeout {
                    secs: self.timeout.as_secs(),
                });
            }
            std::thread::sleep(Duration::from_millis(10));
        };

        if let Some(writer) = writer {
            match writer.join() {
                Ok(Ok(())) => {}
                // The child exited without draining stdin.
                Ok(Err(e)) if e.kind() == std::io::ErrorKind::BrokenPipe => {}
                Ok(Err(e)) => return Err(SignatureError::SignerFailed(format!("write stdin: {e}"))),
                Err(_) => return Err(SignatureError::SignerFailed("stdin writer panicked".into())),
            }
        }
        let output = reader
            .join()
            .map_err(|_| SignatureError::SignerFailed("stdout reader panicked".into()))?
            .map_err(|e| SignatureError::SignerFailed(format!("read stdout: {e}")))?;

        if !status.success() {
            return Err(SignatureError::SignerFailed(format!(
                "{:?} exited with {status}",
                self.program
            )));
        }
        Ok(output)
    }
}

impl ArtifactSigner for ExternalSigner {
    fn algorithm(&self) -> SignatureAlgorithm {
        self.algorithm
    }

    fn key_id(&self) -> &str {
        &self.key_id
    }

    fn sign(&self, data: &CanonicalBytes) -> Result<SignatureOutput, SignatureError> {
        let out = self.run(data.as_bytes())?;
        let text = String::from_utf8_lossy(&out).trim().to_string();
        if text.is_empty() || B64.decode(&text).is_err() {
            return Err(SignatureError::SignerFailed(
                "signer output is not base64".into(),
            ));
        }
        Ok(SignatureOutput {
            signature: text,
            public_key: self.public_key.clone(),
        })
    }
}

fn bounded_reap(child: &mut std::process::Child) -> Option<ExitStatus> {
    let deadline = Instant::now() + REAP_TIMEOUT;
    loop {
        match child.try_wait() {
            Ok(Some(status)) => return Some(status),
            Ok(None) => {}
            Err(_) => return None,
        }
        if Instant::now() >= deadline {
            return None;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
}

// ---------------------------------------------------------------------------
// Selection
// ---------------------------------------------------------------------------

/// Key material available at startup.
#[derive(Debug, Clone, Default)]
pub struct SignerConfig {
    pub key_id: String,
    /// Base64 HMAC key or Ed25519 seed.
    pub key_b64: Option<String>,
    /// External command and its arguments.
    pub external_command: Option<Vec<String>>,
    pub external_timeout: Option<Duration>,
}

/// Choose a backend for `algorithm`. The external command wins when
/// configured; otherwise the in-process key must be present.
pub fn select_signer(
    algorithm: SignatureAlgorithm,
    config: &SignerConfig,
) -> Result<Box<dyn ArtifactSigner>, SignatureError> {
    if let Some(cmd) = config.external_command.as_ref().filter(|c| !c.is_empty()) {
        let timeout = config.external_timeout.unwrap_or(Duration::from_secs(30));
        return Ok(Box::new(ExternalSigner::new(
            config.key_id.clone(),
            algorithm,
            cmd[0].clone(),
            cmd[1..].to_vec(),
            timeout,
        )));
    }
    let key = config.key_b64.as_deref().ok_or_else(|| {
        SignatureError::BackendUnavailable(format!("no {algorithm} key material configured"))
    })?;
    match algorithm {
        SignatureAlgorithm::HmacSha256 => Ok(Box::new(HmacSigner::new(
            config.key_id.clone(),
            HmacKey::from_base64(key)?,
        ))),
        SignatureAlgorithm::Ed25519 => Ok(Box::new(Ed25519Signer::new(
            config.key_id.clone(),
            Ed25519KeyPair::from_base64_seed(key)?,
        ))),
    }
}
