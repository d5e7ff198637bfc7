//! Code-change executor: asks the oracle for file contents and writes them.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde_json::json;
use tracing::{info, instrument};

use crate::core::conversation::Conversation;
use crate::core::paths::validate_relative_path;
use crate::core::types::FileChanges;
use crate::io::directory::directory_tree;
use crate::io::oracle::{Oracle, ask_typed};
use crate::io::prompt::PromptId;

pub trait CodeChangeExecutor {
    /// Apply the change described by `description`.
    ///
    /// Returns the conversation to continue with. The caller adopts its
    /// history through [`Conversation::continue_with`], so checkpoints the
    /// caller saved survive even if the returned value lacks them.
    fn apply(
        &self,
        conversation: &Conversation,
        description: &str,
        step_index: usize,
    ) -> Result<Conversation>;
}

/// Executor that lets the oracle write whole files under the project root.
pub struct OracleCodeMonkey<'a> {
    root: PathBuf,
    oracle: &'a dyn Oracle,
    directory_limit: usize,
}

impl<'a> OracleCodeMonkey<'a> {
    pub fn new(root: &Path, oracle: &'a dyn Oracle, directory_limit: usize) -> Self {
        Self {
            root: root.to_path_buf(),
            oracle,
            directory_limit,
        }
    }
}

impl CodeChangeExecutor for OracleCodeMonkey<'_> {
    #[instrument(skip_all, fields(step_index = step_index))]
    fn apply(
        &self,
        conversation: &Conversation,
        description: &str,
        step_index: usize,
    ) -> Result<Conversation> {
        let mut convo = conversation.clone();
        let tree = directory_tree(&self.root, self.directory_limit)?;
        let changes: FileChanges = ask_typed(
            self.oracle,
            &mut convo,
            PromptId::ImplementChanges,
            json!({
                "step_description": description,
                "step_index": step_index,
                "directory_tree": tree,
            }),
        )?;

        // Validate every path before touching the filesystem.
        let targets = changes
            .files
            .iter()
            .map(|change| validate_relative_path(&change.path).map(|rel| self.root.join(rel)))
            .collect::<Result<Vec<_>, _>>()?;

        for (change, target) in changes.files.iter().zip(&targets) {
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("create directory {}", parent.display()))?;
            }
            fs::write(target, &change.content)
                .with_context(|| format!("write {}", target.display()))?;
            info!(path = %change.path, bytes = change.content.len(), "wrote file");
        }
        Ok(convo)
    }
}
