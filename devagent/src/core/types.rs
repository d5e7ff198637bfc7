//! Shared types for the developer agent core.
//!
//! Every oracle reply is decoded into one of the closed types below before it
//! reaches the state machine, so orchestration code never inspects raw JSON.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::DevError;

/// A shell command and the number of seconds it may run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandSpec {
    pub command: String,
    pub timeout: u64,
}

impl CommandSpec {
    pub fn new(command: impl Into<String>, timeout: u64) -> Self {
        Self {
            command: command.into(),
            timeout,
        }
    }

    pub fn timeout_duration(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }
}

/// One entry of a development plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub description: String,
    /// Description of the task this one was split from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
}

impl Task {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            parent: None,
        }
    }
}

/// A single unit of work inside a task breakdown.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Step {
    #[serde(flatten)]
    pub kind: StepKind,
    /// Ask whether the task's test command should be rerun after this step.
    #[serde(default)]
    pub check_if_fixed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StepKind {
    Command {
        command: CommandSpec,
    },
    CodeChange {
        #[serde(rename = "code_change_description")]
        description: String,
    },
    HumanIntervention {
        #[serde(rename = "human_intervention_description")]
        description: String,
    },
}

impl Step {
    pub fn command(command: impl Into<String>, timeout: u64) -> Self {
        Self {
            kind: StepKind::Command {
                command: CommandSpec::new(command, timeout),
            },
            check_if_fixed: false,
        }
    }

    pub fn code_change(description: impl Into<String>) -> Self {
        Self {
            kind: StepKind::CodeChange {
                description: description.into(),
            },
            check_if_fixed: false,
        }
    }

    pub fn human_intervention(description: impl Into<String>) -> Self {
        Self {
            kind: StepKind::HumanIntervention {
                description: description.into(),
            },
            check_if_fixed: false,
        }
    }

    pub fn checking_if_fixed(mut self) -> Self {
        self.check_if_fixed = true;
        self
    }

    pub fn kind_name(&self) -> &'static str {
        match self.kind {
            StepKind::Command { .. } => "command",
            StepKind::CodeChange { .. } => "code_change",
            StepKind::HumanIntervention { .. } => "human_intervention",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskBreakdown {
    pub steps: Vec<Step>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RerunDecision {
    Yes,
    No,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RerunReply {
    pub decision: RerunDecision,
}

/// Terminal classification of a command's output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CheckVerdict {
    Done,
    NeedsDebugging,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckReply {
    pub verdict: CheckVerdict,
}

/// Raw verification-strategy reply.
///
/// `test_type` stays a string here so an unexpected value surfaces as
/// [`DevError::UnknownTestType`] instead of a generic decode failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestTypeReply {
    #[serde(rename = "type")]
    pub test_type: String,
    #[serde(default)]
    pub command: Option<CommandSpec>,
    #[serde(default)]
    pub automated_test_description: Option<String>,
    #[serde(default)]
    pub manual_test_description: Option<String>,
}

/// How a code change gets verified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerificationPlan {
    Command(CommandSpec),
    Automated { description: String },
    Manual { description: String },
}

impl TryFrom<TestTypeReply> for VerificationPlan {
    type Error = DevError;

    fn try_from(reply: TestTypeReply) -> Result<Self, Self::Error> {
        match reply.test_type.as_str() {
            "command_test" => reply
                .command
                .map(VerificationPlan::Command)
                .ok_or(DevError::MissingTestCommand),
            "automated_test" => Ok(VerificationPlan::Automated {
                description: reply.automated_test_description.unwrap_or_default(),
            }),
            "manual_test" => Ok(VerificationPlan::Manual {
                description: reply.manual_test_description.unwrap_or_default(),
            }),
            other => Err(DevError::UnknownTestType(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TechnologyFilter {
    pub technologies: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandList {
    pub commands: Vec<CommandSpec>,
}

/// One turn of the installation-check dialogue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum InstallCheckReply {
    /// Run a command that checks whether the technology is installed.
    ExecuteCommand { command: String, timeout: u64 },
    Done,
    NotInstalled,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileChange {
    pub path: String,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileChanges {
    pub files: Vec<FileChange>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TechnologyStatus {
    /// Loaded from a saved progress record; not re-checked.
    Unknown,
    Installed,
    /// Was missing and installation commands were run.
    InstalledNow,
    /// Was missing and the oracle offered no installation commands.
    Missing,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Technology {
    pub name: String,
    pub status: TechnologyStatus,
}
