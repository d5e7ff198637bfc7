//! Prompt identifiers, response schemas and prompt rendering for the oracle.

use std::fmt;

use anyhow::{Context, Result};
use minijinja::{Environment, context};
use serde_json::Value;
use tracing::debug;

use crate::core::conversation::Message;

const ORACLE_TEMPLATE: &str = include_str!("prompts/oracle.md");

const TASK_BREAKDOWN_SCHEMA: &str = include_str!("../../schemas/task_breakdown.schema.json");
const RERUN_DECISION_SCHEMA: &str = include_str!("../../schemas/rerun_decision.schema.json");
const CHECK_VERDICT_SCHEMA: &str = include_str!("../../schemas/check_verdict.schema.json");
const TEST_TYPE_SCHEMA: &str = include_str!("../../schemas/test_type.schema.json");
const TECHNOLOGY_FILTER_SCHEMA: &str = include_str!("../../schemas/technology_filter.schema.json");
const COMMAND_LIST_SCHEMA: &str = include_str!("../../schemas/command_list.schema.json");
const INSTALL_CHECK_SCHEMA: &str = include_str!("../../schemas/install_check.schema.json");
const FILE_CHANGES_SCHEMA: &str = include_str!("../../schemas/file_changes.schema.json");

/// Every request the developer agent can make of the oracle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PromptId {
    TaskBreakdown,
    StepCheck,
    ImplementChanges,
    ShouldRerunCommand,
    RanCommand,
    DebugCommand,
    EnvSetupSpecs,
    InstallNextTechnology,
    InstallCheckResult,
    UnsuccessfulInstallation,
}

impl PromptId {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::TaskBreakdown => "development/task/breakdown",
            Self::StepCheck => "development/task/step_check",
            Self::ImplementChanges => "development/task/implement_changes",
            Self::ShouldRerunCommand => "dev_ops/should_rerun_command",
            Self::RanCommand => "dev_ops/ran_command",
            Self::DebugCommand => "dev_ops/debug_command",
            Self::EnvSetupSpecs => "development/env_setup/specs",
            Self::InstallNextTechnology => "development/env_setup/install_next_technology",
            Self::InstallCheckResult => "development/env_setup/check_result",
            Self::UnsuccessfulInstallation => "development/env_setup/unsuccessful_installation",
        }
    }

    /// JSON Schema (Draft 2020-12) the reply must satisfy.
    pub fn schema(self) -> &'static str {
        match self {
            Self::TaskBreakdown => TASK_BREAKDOWN_SCHEMA,
            Self::StepCheck => TEST_TYPE_SCHEMA,
            Self::ImplementChanges => FILE_CHANGES_SCHEMA,
            Self::ShouldRerunCommand => RERUN_DECISION_SCHEMA,
            Self::RanCommand => CHECK_VERDICT_SCHEMA,
            Self::DebugCommand | Self::UnsuccessfulInstallation => COMMAND_LIST_SCHEMA,
            Self::EnvSetupSpecs => TECHNOLOGY_FILTER_SCHEMA,
            Self::InstallNextTechnology | Self::InstallCheckResult => INSTALL_CHECK_SCHEMA,
        }
    }

    /// File name used when the schema is handed to an external process.
    pub fn schema_file_name(self) -> String {
        format!("{}.schema.json", self.as_str().replace('/', "."))
    }

    pub fn instruction(self) -> &'static str {
        match self {
            Self::TaskBreakdown => {
                "Break the task at `current_task_index` of `sibling_tasks` into an ordered list \
                 of steps. Each step is a shell command, a code change, or a request for human \
                 intervention. Set `check_if_fixed` on steps after which the task's test should \
                 be reconsidered."
            }
            Self::StepCheck => {
                "Decide how the code change just made should be verified: `command_test` with a \
                 command to run, `automated_test` with a description of the test to write, or \
                 `manual_test` with instructions for a human tester."
            }
            Self::ImplementChanges => {
                "Implement the described step. Reply with the full new content of every file \
                 that must be created or changed, using paths relative to the project root."
            }
            Self::ShouldRerunCommand => {
                "Given the changes made so far, should the test command in the context be run \
                 again to confirm the issue is fixed? Answer YES or NO."
            }
            Self::RanCommand => {
                "The command in the context was executed. Based on its output, is it DONE or \
                 is it NEEDS_DEBUGGING?"
            }
            Self::DebugCommand => {
                "The command in the context did not succeed. List the commands that should be \
                 run to fix the problem before it is retried."
            }
            Self::EnvSetupSpecs => {
                "From the architecture technologies, list the ones that must be installed on \
                 this operating system for development."
            }
            Self::InstallNextTechnology => {
                "Check whether the technology in the context is installed. Reply with \
                 `execute_command` to run a check command, `done` if it is installed, or \
                 `not_installed` if it is missing."
            }
            Self::InstallCheckResult => {
                "Here is the result of your check command. Reply with another \
                 `execute_command`, `done`, or `not_installed`."
            }
            Self::UnsuccessfulInstallation => {
                "The technology in the context is not installed. List the commands that install \
                 it on this operating system."
            }
        }
    }
}

impl fmt::Display for PromptId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Render the request part of a prompt: the instruction plus its JSON context.
///
/// This is also what gets appended to the conversation as the user turn.
pub fn render_request(prompt: PromptId, context: &Value) -> Result<String> {
    let context = serde_json::to_string_pretty(context).context("serialize prompt context")?;
    Ok(format!("{}\n\nContext:\n{}", prompt.instruction(), context))
}

/// Template engine wrapper around minijinja.
struct PromptEngine {
    env: Environment<'static>,
}

impl PromptEngine {
    fn new() -> Result<Self> {
        let mut env = Environment::new();
        env.add_template("oracle", ORACLE_TEMPLATE)
            .context("load oracle template")?;
        Ok(Self { env })
    }

    fn render(&self, history: &[Message], prompt: PromptId, request: &str) -> Result<String> {
        let template = self.env.get_template("oracle")?;
        let rendered = template.render(context! {
            history => history,
            prompt_id => prompt.as_str(),
            request => request.trim(),
        })?;
        Ok(rendered)
    }
}

/// Builds oracle prompts within a byte budget, dropping the oldest history first.
#[derive(Debug, Clone)]
pub struct PromptBuilder {
    budget_bytes: usize,
}

impl PromptBuilder {
    pub fn new(budget_bytes: usize) -> Self {
        Self { budget_bytes }
    }

    /// Render a full prompt. The contract and request are never dropped, so the
    /// result may still exceed the budget once all history is gone.
    pub fn build(&self, history: &[Message], prompt: PromptId, request: &str) -> Result<String> {
        let engine = PromptEngine::new()?;
        let mut skip = 0;
        loop {
            let rendered = engine.render(&history[skip..], prompt, request)?;
            if rendered.len() <= self.budget_bytes || skip == history.len() {
                if skip > 0 {
                    debug!(
                        dropped_messages = skip,
                        bytes = rendered.len(),
                        "dropped history for budget"
                    );
                }
                return Ok(rendered);
            }
            skip += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::conversation::Role;
    use serde_json::json;

    fn message(role: Role, content: &str) -> Message {
        Message {
            role,
            content: content.to_string(),
        }
    }

    const ALL: [PromptId; 10] = [
        PromptId::TaskBreakdown,
        PromptId::StepCheck,
        PromptId::ImplementChanges,
        PromptId::ShouldRerunCommand,
        PromptId::RanCommand,
        PromptId::DebugCommand,
        PromptId::EnvSetupSpecs,
        PromptId::InstallNextTechnology,
        PromptId::InstallCheckResult,
        PromptId::UnsuccessfulInstallation,
    ];

    #[test]
    fn every_schema_is_valid_json() {
        for prompt in ALL {
            let schema: Value = serde_json::from_str(prompt.schema()).expect("schema json");
            assert_eq!(schema["type"], "object", "{prompt} schema must be an object");
        }
    }

    #[test]
    fn schema_file_names_are_flat() {
        assert_eq!(
            PromptId::ShouldRerunCommand.schema_file_name(),
            "dev_ops.should_rerun_command.schema.json"
        );
    }

    #[test]
    fn request_includes_instruction_and_context() {
        let request =
            render_request(PromptId::RanCommand, &json!({"command": "npm test"})).expect("render");
        assert!(request.contains("DONE"));
        assert!(request.contains("\"command\": \"npm test\""));
    }

    #[test]
    fn prompt_orders_contract_history_request() {
        let history = vec![
            message(Role::System, "be helpful"),
            message(Role::User, "earlier question"),
        ];
        let prompt = PromptBuilder::new(10_000)
            .build(&history, PromptId::StepCheck, "verify it")
            .expect("build");

        let contract = prompt.find("### Developer Contract").expect("contract");
        let convo = prompt.find("earlier question").expect("history");
        let request = prompt
            .find("### Request `development/task/step_check`")
            .expect("request");
        assert!(contract < convo && convo < request);
        assert!(prompt.contains("[user]"));
    }

    #[test]
    fn budget_drops_oldest_history_first() {
        let history = vec![
            message(Role::User, &"old ".repeat(200)),
            message(Role::Assistant, "recent answer"),
        ];
        let prompt = PromptBuilder::new(800)
            .build(&history, PromptId::RanCommand, "check")
            .expect("build");

        assert!(!prompt.contains("old old"));
        assert!(prompt.contains("recent answer"));
        assert!(prompt.contains("<request>"));
    }

    #[test]
    fn history_section_omitted_when_empty() {
        let prompt = PromptBuilder::new(10_000)
            .build(&[], PromptId::RanCommand, "check")
            .expect("build");
        assert!(!prompt.contains("### Conversation So Far"));
    }
}
