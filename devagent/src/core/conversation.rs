//! Dialogue history with labelled checkpoints.
//!
//! Messages are only ever appended. A checkpoint stores a full snapshot of the
//! history at the time it was taken, so rewinding to it discards anything
//! appended afterwards. Checkpoints are immutable: saving an existing label
//! again keeps the first snapshot, which lets a task rewind to the same
//! baseline before every step.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::DevError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Conversation {
    messages: Vec<Message>,
    branches: BTreeMap<String, Vec<Message>>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a conversation seeded with a system message.
    pub fn with_system(content: impl Into<String>) -> Self {
        let mut conversation = Self::new();
        conversation.push(Role::System, content);
        conversation
    }

    pub fn push(&mut self, role: Role, content: impl Into<String>) {
        self.messages.push(Message {
            role,
            content: content.into(),
        });
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn has_branch(&self, label: &str) -> bool {
        self.branches.contains_key(label)
    }

    /// Checkpoint the current history under `label`.
    ///
    /// Returns `false` (and keeps the existing snapshot) if `label` was
    /// already saved.
    pub fn save_branch(&mut self, label: impl Into<String>) -> bool {
        let label = label.into();
        if self.branches.contains_key(&label) {
            return false;
        }
        self.branches.insert(label, self.messages.clone());
        true
    }

    /// Rewind the history to the snapshot stored under `label`.
    ///
    /// The checkpoint itself is kept, so the same label can be loaded again.
    pub fn load_branch(&mut self, label: &str) -> Result<(), DevError> {
        let snapshot = self
            .branches
            .get(label)
            .ok_or_else(|| DevError::UnknownBranch(label.to_string()))?;
        self.messages.clone_from(snapshot);
        Ok(())
    }

    /// Continue with the history of `updated`, keeping every checkpoint.
    ///
    /// Checkpoints already saved here win over same-label ones in `updated`;
    /// labels only `updated` knows are added.
    pub fn continue_with(&mut self, updated: Conversation) {
        self.messages = updated.messages;
        for (label, snapshot) in updated.branches {
            self.branches.entry(label).or_insert(snapshot);
        }
    }
}
