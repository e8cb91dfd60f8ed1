//! # Hash Scope
//!
//! The declared, hash-relevant subset of the world for one sealed run:
//! file hashes of the inputs, prompts, schemas and policy baseline, plus the
//! logical clock. `commit_hash = sha256(canonical(hash_scope))`.
//!
//! Files are listed in sorted path order. Paths are relative to the config
//! root with `/` separators.
//!
//! | category | files |
//! |----------|-------|
//! | inputs   | `*.csv` directly under `data_dir` |
//! | prompts  | `*.md`, `*.txt`, `*.yaml`, `*.yml` anywhere under `prompts_dir` |
//! | schemas  | `*.json` anywhere under `schemas_dir` |
//! | policies | the policy baseline, when present |

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use walkdir::WalkDir;

use seal_core::{content_digest, sha256_file, ContentDigest, Timestamp};

use crate::config::SealConfig;
use crate::error::RunError;

pub const SCOPE_VERSION: &str = "1.0";

/// Fields that never contribute to `commit_hash`.
pub const EXCLUSIONS: [&str; 2] = ["observed_at", "artifacts_emitted"];

const PROMPT_EXTENSIONS: [&str; 4] = ["md", "txt", "yaml", "yml"];

/// One hashed file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScopeFile {
    pub path: String,
    pub sha256: String,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScopeParameters {
    /// `None` when the run was sealed against the wall clock.
    pub clock: Option<Timestamp>,
    pub deterministic: bool,
}

/// Input categories committed to separately.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    Inputs,
    Prompts,
    Schemas,
    Policies,
}

impl Category {
    pub const ALL: [Category; 4] = [
        Category::Inputs,
        Category::Prompts,
        Category::Schemas,
        Category::Policies,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Inputs => "inputs",
            Self::Prompts => "prompts",
            Self::Schemas => "schemas",
            Self::Policies => "policies",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HashScope {
    pub scope_version: String,
    pub inputs: Vec<ScopeFile>,
    pub prompts: Vec<ScopeFile>,
    pub policies: Vec<ScopeFile>,
    pub schemas: Vec<ScopeFile>,
    pub parameters: ScopeParameters,
    pub exclusions: Vec<String>,
}

/// Files under `dir` matching `keep`, sorted by path. A missing directory
/// yields nothing. Symlinks are followed; any entry that cannot be read
/// fails the whole scan.
fn collect_files(
    dir: &Path,
    max_depth: usize,
    keep: impl Fn(&Path) -> bool,
) -> Result<Vec<PathBuf>, RunError> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut files = Vec::new();
    for entry in WalkDir::new(dir).max_depth(max_depth).follow_links(true) {
        let entry = entry.map_err(|e| RunError::Scan {
            path: e
                .path()
                .unwrap_or(dir)
                .display()
                .to_string(),
            reason: e.to_string(),
        })?;
        if entry.file_type().is_file() && keep(entry.path()) {
            files.push(entry.into_path());
        }
    }
    files.sort();
    Ok(files)
}

fn has_extension(path: &Path, allowed: &[&str]) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| allowed.contains(&e))
}

/// The CSV inputs under `data_dir`.
pub fn input_files(config: &SealConfig) -> Result<Vec<PathBuf>, RunError> {
    collect_files(&config.data_dir(), 1, |p| has_extension(p, &["csv"]))
}

pub fn prompt_files(config: &SealConfig) -> Result<Vec<PathBuf>, RunError> {
    collect_files(&config.prompts_dir(), usize::MAX, |p| {
        has_extension(p, &PROMPT_EXTENSIONS)
    })
}

pub fn schema_files(config: &SealConfig) -> Result<Vec<PathBuf>, RunError> {
    collect_files(&config.schemas_dir(), usize::MAX, |p| has_extension(p, &["json"]))
}

fn scope_file(config: &SealConfig, path: &Path) -> Result<ScopeFile, RunError> {
    Ok(ScopeFile {
        path: config.display_path(path),
        sha256: sha256_file(path)?.to_string(),
        kind: None,
        version: None,
    })
}

impl HashScope {
    /// Hash every declared file. A missing data directory is fatal; other
    /// categories may be empty.
    pub fn collect(
        config: &SealConfig,
        policy_version: &str,
        clock: Option<Timestamp>,
        deterministic: bool,
    ) -> Result<Self, RunError> {
        let data_dir = config.data_dir();
        if !data_dir.is_dir() {
            return Err(RunError::MissingInput(format!(
                "data directory {}",
                data_dir.display()
            )));
        }

        let inputs = input_files(config)?
            .iter()
            .map(|p| {
                let mut f = scope_file(config, p)?;
                f.kind = Some("csv".into());
                Ok(f)
            })
            .collect::<Result<Vec<_>, RunError>>()?;
        let prompts = prompt_files(config)?
            .iter()
            .map(|p| scope_file(config, p))
            .collect::<Result<Vec<_>, _>>()?;
        let schemas = schema_files(config)?
            .iter()
            .map(|p| scope_file(config, p))
            .collect::<Result<Vec<_>, _>>()?;

        let baseline = config.policy_baseline();
        let policies = if baseline.is_file() {
            let mut f = scope_file(config, &baseline)?;
            f.version = Some(policy_version.to_string());
            vec![f]
        } else {
            Vec::new()
        };

        tracing::debug!(
            inputs = inputs.len(),
            prompts = prompts.len(),
            schemas = schemas.len(),
            policies = policies.len(),
            "hash scope collected"
        );

        Ok(Self {
            scope_version: SCOPE_VERSION.to_string(),
            inputs,
            prompts,
            policies,
            schemas,
            parameters: ScopeParameters {
                clock,
                deterministic,
            },
            exclusions: EXCLUSIONS.iter().map(|s| s.to_string()).collect(),
        })
    }

    pub fn commit_hash(&self) -> Result<ContentDigest, RunError> {
        Ok(content_digest(self)?)
    }

    pub fn files(&self, category: Category) -> &[ScopeFile] {
        match category {
            Category::Inputs => &self.inputs,
            Category::Prompts => &self.prompts,
            Category::Schemas => &self.schemas,
            Category::Policies => &self.policies,
        }
    }

    /// Every hashed file across all categories.
    pub fn all_files(&self) -> impl Iterator<Item = &ScopeFile> {
        Category::ALL.into_iter().flat_map(move |c| self.files(c).iter())
    }

    /// Leaf digests of one category, in listed order.
    pub fn leaves(&self, category: Category) -> Result<Vec<ContentDigest>, RunError> {
        self.files(category)
            .iter()
            .map(|f| ContentDigest::parse(&f.sha256).map_err(RunError::from))
            .collect()
    }
}
