//! Scripted collaborators and sample projects for tests.

use std::cell::RefCell;
use std::collections::{BTreeMap, VecDeque};
use std::path::PathBuf;

use anyhow::{Result, anyhow};
use chrono::Utc;
use serde_json::Value;
use tempfile::TempDir;

use crate::core::conversation::{Conversation, Message, Role};
use crate::core::types::{CheckVerdict, CommandSpec, Task};
use crate::io::code_monkey::CodeChangeExecutor;
use crate::io::command::CommandRunner;
use crate::io::human::HumanIntervention;
use crate::io::oracle::{Oracle, OracleRequest};
use crate::io::progress::{ProgressRecord, ProgressStore};
use crate::io::prompt::PromptId;
use crate::project::{PipelineStep, ProjectContext};

/// Project with two plan entries and no current step, rooted nowhere.
pub fn sample_project() -> ProjectContext {
    ProjectContext {
        app_id: "app-1".to_string(),
        name: "todo".to_string(),
        app_type: Some("web app".to_string()),
        high_level_summary: "A small todo list app.".to_string(),
        user_stories: vec!["As a user I can add a todo".to_string()],
        user_tasks: vec!["Add a todo".to_string()],
        architecture: vec!["Node.js".to_string(), "MongoDB".to_string()],
        development_plan: vec![
            Task::new("Set up the Express server"),
            Task::new("Add the todo routes"),
        ],
        current_step: None,
        redo_step: None,
        root: PathBuf::new(),
    }
}

/// [`sample_project`] rooted in a fresh temporary directory.
pub struct TempProject {
    pub dir: TempDir,
    pub context: ProjectContext,
}

impl TempProject {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let context = sample_project().with_root(dir.path());
        Self { dir, context }
    }
}

impl Default for TempProject {
    fn default() -> Self {
        Self::new()
    }
}

/// Oracle that replays `(prompt, reply)` pairs in order.
///
/// Asking a different prompt than the next scripted one is an error. Every
/// request and the conversation it was asked in are recorded.
pub struct ScriptedOracle {
    replies: RefCell<VecDeque<(PromptId, Value)>>,
    requests: RefCell<Vec<OracleRequest>>,
    conversations: RefCell<Vec<Vec<Message>>>,
}

impl ScriptedOracle {
    pub fn new(replies: Vec<(PromptId, Value)>) -> Self {
        Self {
            replies: RefCell::new(replies.into()),
            requests: RefCell::new(Vec::new()),
            conversations: RefCell::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<OracleRequest> {
        self.requests.borrow().clone()
    }

    /// Conversation history at the time of each request.
    pub fn conversations(&self) -> Vec<Vec<Message>> {
        self.conversations.borrow().clone()
    }

    pub fn is_exhausted(&self) -> bool {
        self.replies.borrow().is_empty()
    }
}

impl Oracle for ScriptedOracle {
    fn ask(&self, conversation: &mut Conversation, request: &OracleRequest) -> Result<Value> {
        self.requests.borrow_mut().push(request.clone());
        self.conversations
            .borrow_mut()
            .push(conversation.messages().to_vec());

        let (prompt, reply) = self
            .replies
            .borrow_mut()
            .pop_front()
            .ok_or_else(|| anyhow!("no scripted reply for {}", request.prompt))?;
        if prompt != request.prompt {
            return Err(anyhow!(
                "expected prompt {prompt}, got {}",
                request.prompt
            ));
        }

        conversation.push(Role::User, format!("{}: {}", request.prompt, request.context));
        conversation.push(Role::Assistant, reply.to_string());
        Ok(reply)
    }
}

/// Command runner that never spawns anything.
///
/// `run_until_success` always succeeds; `run_and_check` replays verdicts.
pub struct ScriptedCommandRunner {
    verdicts: RefCell<VecDeque<CheckVerdict>>,
    until_success: RefCell<Vec<CommandSpec>>,
    checked: RefCell<Vec<CommandSpec>>,
    conversations: RefCell<Vec<Vec<Message>>>,
}

impl ScriptedCommandRunner {
    pub fn new(verdicts: Vec<CheckVerdict>) -> Self {
        Self {
            verdicts: RefCell::new(verdicts.into()),
            until_success: RefCell::new(Vec::new()),
            checked: RefCell::new(Vec::new()),
            conversations: RefCell::new(Vec::new()),
        }
    }

    pub fn until_success_commands(&self) -> Vec<CommandSpec> {
        self.until_success.borrow().clone()
    }

    pub fn checked_commands(&self) -> Vec<CommandSpec> {
        self.checked.borrow().clone()
    }

    /// Conversation history at the start of each call, in call order.
    pub fn conversations(&self) -> Vec<Vec<Message>> {
        self.conversations.borrow().clone()
    }

    fn record(&self, conversation: &mut Conversation, command: &CommandSpec) {
        self.conversations
            .borrow_mut()
            .push(conversation.messages().to_vec());
        conversation.push(Role::User, format!("ran `{}`", command.command));
    }
}

impl CommandRunner for ScriptedCommandRunner {
    fn run_until_success(
        &self,
        command: &CommandSpec,
        conversation: &mut Conversation,
    ) -> Result<()> {
        self.record(conversation, command);
        self.until_success.borrow_mut().push(command.clone());
        Ok(())
    }

    fn run_and_check(
        &self,
        command: &CommandSpec,
        conversation: &mut Conversation,
    ) -> Result<CheckVerdict> {
        self.record(conversation, command);
        self.checked.borrow_mut().push(command.clone());
        self.verdicts
            .borrow_mut()
            .pop_front()
            .ok_or_else(|| anyhow!("no scripted verdict for `{}`", command.command))
    }
}

/// Code monkey that records each change and appends one assistant message.
#[derive(Default)]
pub struct ScriptedCodeMonkey {
    applied: RefCell<Vec<(String, usize)>>,
    conversations: RefCell<Vec<Vec<Message>>>,
}

impl ScriptedCodeMonkey {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn applied(&self) -> Vec<(String, usize)> {
        self.applied.borrow().clone()
    }

    pub fn conversations(&self) -> Vec<Vec<Message>> {
        self.conversations.borrow().clone()
    }
}

impl CodeChangeExecutor for ScriptedCodeMonkey {
    fn apply(
        &self,
        conversation: &Conversation,
        description: &str,
        step_index: usize,
    ) -> Result<Conversation> {
        self.conversations
            .borrow_mut()
            .push(conversation.messages().to_vec());
        self.applied
            .borrow_mut()
            .push((description.to_string(), step_index));
        let mut updated = conversation.clone();
        updated.push(Role::Assistant, format!("applied: {description}"));
        Ok(updated)
    }
}

/// Human that replays answers; an empty queue answers `None`.
pub struct ScriptedHuman {
    answers: RefCell<VecDeque<Option<String>>>,
    asked: RefCell<Vec<(String, String)>>,
}

impl ScriptedHuman {
    pub fn new(answers: Vec<Option<String>>) -> Self {
        Self {
            answers: RefCell::new(answers.into()),
            asked: RefCell::new(Vec::new()),
        }
    }

    /// `(message, details)` of every question, in order.
    pub fn asked(&self) -> Vec<(String, String)> {
        self.asked.borrow().clone()
    }
}

impl HumanIntervention for ScriptedHuman {
    fn ask(&self, message: &str, details: &str) -> Result<Option<String>> {
        self.asked
            .borrow_mut()
            .push((message.to_string(), details.to_string()));
        Ok(self.answers.borrow_mut().pop_front().flatten())
    }
}

#[derive(Default)]
pub struct MemoryProgressStore {
    records: RefCell<BTreeMap<(String, String), ProgressRecord>>,
}

impl ProgressStore for MemoryProgressStore {
    fn get(&self, app_id: &str, step: PipelineStep) -> Result<Option<ProgressRecord>> {
        let key = (app_id.to_string(), step.as_str().to_string());
        Ok(self.records.borrow().get(&key).cloned())
    }

    fn save(&self, app_id: &str, step: PipelineStep, data: &Value) -> Result<()> {
        let key = (app_id.to_string(), step.as_str().to_string());
        let record = ProgressRecord {
            app_id: app_id.to_string(),
            step,
            saved_at: Utc::now().to_rfc3339(),
            data: data.clone(),
        };
        self.records.borrow_mut().insert(key, record);
        Ok(())
    }
}
