//! # Sealing Configuration
//!
//! Paths to the inputs of a sealed run and to the ledgers it is recorded in.
//! Relative paths resolve against `root`, and every path written into a
//! hashed structure is made relative to `root` again, so two checkouts of
//! the same inputs seal to the same bytes.
//!
//! ```yaml
//! root: .
//! data_dir: artifacts/sample_data
//! prompts_dir: prompts
//! schemas_dir: schemas
//! policy_baseline: docs/governance/POLICY_BASELINE.md
//! policy_version_file: docs/governance/POLICY_VERSION.txt
//! out_dir: artifacts/sealed_runs
//! operator: Boss
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::RunError;

/// Policy version recorded when no version file exists.
pub const UNKNOWN_POLICY_VERSION: &str = "GOV-UNKNOWN";

pub const DECISION_LOG_FILE: &str = "decision_log.csv";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SealConfig {
    pub root: PathBuf,
    pub data_dir: PathBuf,
    pub prompts_dir: PathBuf,
    pub schemas_dir: PathBuf,
    pub policy_baseline: PathBuf,
    pub policy_version_file: PathBuf,
    pub out_dir: PathBuf,
    pub authority_ledger: PathBuf,
    pub action_ledger: PathBuf,
    pub transparency_log: PathBuf,
    /// Actor recorded in the authority envelope when no ledger grant is bound.
    pub operator: String,
    pub operator_role: String,
}

impl Default for SealConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
            data_dir: PathBuf::from("artifacts/sample_data"),
            prompts_dir: PathBuf::from("prompts"),
            schemas_dir: PathBuf::from("schemas"),
            policy_baseline: PathBuf::from("docs/governance/POLICY_BASELINE.md"),
            policy_version_file: PathBuf::from("docs/governance/POLICY_VERSION.txt"),
            out_dir: PathBuf::from("artifacts/sealed_runs"),
            authority_ledger: PathBuf::from("artifacts/authority_ledger/ledger.ndjson"),
            action_ledger: PathBuf::from("artifacts/authority_ledger/actions.ndjson"),
            transparency_log: PathBuf::from("artifacts/transparency_log/log.ndjson"),
            operator: "Boss".to_string(),
            operator_role: "Operator".to_string(),
        }
    }
}

impl SealConfig {
    /// Defaults rooted at `root`.
    pub fn rooted(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            ..Self::default()
        }
    }

    /// Parse a YAML config. A relative `root` is taken relative to the
    /// config file's directory.
    pub fn from_yaml_file(path: &Path) -> Result<Self, RunError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| RunError::Config(format!("{}: {e}", path.display())))?;
        let mut config: Self = serde_yaml::from_str(&text)
            .map_err(|e| RunError::Config(format!("{}: {e}", path.display())))?;
        if config.root.is_relative() {
            let base = path.parent().unwrap_or_else(|| Path::new("."));
            config.root = base.join(&config.root);
        }
        Ok(config)
    }

    pub fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }

    /// `path` relative to `root` with `/` separators, or the full path when it
    /// lies outside `root`.
    pub fn display_path(&self, path: &Path) -> String {
        let rel = path.strip_prefix(&self.root).unwrap_or(path);
        rel.to_string_lossy().replace('\\', "/")
    }

    pub fn data_dir(&self) -> PathBuf {
        self.resolve(&self.data_dir)
    }

    pub fn prompts_dir(&self) -> PathBuf {
        self.resolve(&self.prompts_dir)
    }

    pub fn schemas_dir(&self) -> PathBuf {
        self.resolve(&self.schemas_dir)
    }

    pub fn policy_baseline(&self) -> PathBuf {
        self.resolve(&self.policy_baseline)
    }

    pub fn out_dir(&self) -> PathBuf {
        self.resolve(&self.out_dir)
    }

    pub fn authority_ledger(&self) -> PathBuf {
        self.resolve(&self.authority_ledger)
    }

    pub fn action_ledger(&self) -> PathBuf {
        self.resolve(&self.action_ledger)
    }

    pub fn transparency_log(&self) -> PathBuf {
        self.resolve(&self.transparency_log)
    }

    pub fn decision_log(&self) -> PathBuf {
        self.data_dir().join(DECISION_LOG_FILE)
    }

    /// Trimmed contents of the policy version file, or
    /// [`UNKNOWN_POLICY_VERSION`].
    pub fn policy_version(&self) -> String {
        std::fs::read_to_string(self.resolve(&self.policy_version_file))
            .map(|s| s.trim().to_string())
            .ok()
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| UNKNOWN_POLICY_VERSION.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn yaml_overrides_and_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let cfg_path = dir.path().join("seal.yaml");
        std::fs::write(&cfg_path, "data_dir: data\noperator: alice\n").unwrap();
        let cfg = SealConfig::from_yaml_file(&cfg_path).unwrap();
        assert_eq!(cfg.operator, "alice");
        assert_eq!(cfg.data_dir(), dir.path().join(".").join("data"));
        assert_eq!(cfg.prompts_dir, PathBuf::from("prompts"));
        assert_eq!(cfg.operator_role, "Operator");
    }

    #[test]
    fn bad_yaml_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let cfg_path = dir.path().join("seal.yaml");
        std::fs::write(&cfg_path, "operator: [unterminated").unwrap();
        assert!(matches!(
            SealConfig::from_yaml_file(&cfg_path),
            Err(RunError::Config(_))
        ));
    }

    #[test]
    fn policy_version_fallback() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = SealConfig::rooted(dir.path());
        assert_eq!(cfg.policy_version(), UNKNOWN_POLICY_VERSION);
        let file = cfg.resolve(&cfg.policy_version_file);
        std::fs::create_dir_all(file.parent().unwrap()).unwrap();
        std::fs::write(&file, "GOV-2.1\n").unwrap();
        assert_eq!(cfg.policy_version(), "GOV-2.1");
    }

    #[test]
    fn display_path_is_root_relative() {
        let cfg = SealConfig::rooted("/work");
        assert_eq!(
            cfg.display_path(Path::new("/work/artifacts/a.csv")),
            "artifacts/a.csv"
        );
        assert_eq!(cfg.display_path(Path::new("/elsewhere/b.csv")), "/elsewhere/b.csv");
    }
}
