//! Per-category merkle commitments derived from a [`HashScope`].

use serde::{Deserialize, Serialize};

use seal_crypto::{merkle_root, MERKLE_ALGORITHM};

use crate::error::RunError;
use crate::scope::{Category, HashScope};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputsCommitments {
    pub inputs_root: String,
    pub prompts_root: String,
    pub schemas_root: String,
    pub policies_root: String,
    pub leaf_count: usize,
    pub algorithm: String,
}

impl InputsCommitments {
    pub fn from_scope(scope: &HashScope) -> Result<Self, RunError> {
        let root = |c: Category| -> Result<String, RunError> {
            Ok(merkle_root(&scope.leaves(c)?).to_string())
        };
        Ok(Self {
            inputs_root: root(Category::Inputs)?,
            prompts_root: root(Category::Prompts)?,
            schemas_root: root(Category::Schemas)?,
            policies_root: root(Category::Policies)?,
            leaf_count: scope.all_files().count(),
            algorithm: MERKLE_ALGORITHM.to_string(),
        })
    }

    pub fn root(&self, category: Category) -> &str {
        match category {
            Category::Inputs => &self.inputs_root,
            Category::Prompts => &self.prompts_root,
            Category::Schemas => &self.schemas_root,
            Category::Policies => &self.policies_root,
        }
    }
}
