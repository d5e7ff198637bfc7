//! Task execution: breaking tasks into steps and walking them in order.

use anyhow::{Context, Result};
use serde_json::json;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::core::conversation::Conversation;
use crate::core::invariants::validate_steps;
use crate::core::types::{
    CheckVerdict, CommandSpec, RerunDecision, RerunReply, Step, StepKind, Task, TaskBreakdown,
};
use crate::error::DevError;
use crate::io::code_monkey::CodeChangeExecutor;
use crate::io::command::CommandRunner;
use crate::io::config::DevConfig;
use crate::io::directory::directory_tree;
use crate::io::human::HumanIntervention;
use crate::io::oracle::{Oracle, ask_typed};
use crate::io::progress::ProgressStore;
use crate::io::prompt::PromptId;
use crate::project::{PipelineStep, ProjectContext};
use crate::verify::{TestVerifier, VerificationOutcome};

pub const DEBUGGING_HELP_MESSAGE: &str = "I need your help! Can you try debugging this yourself and let me take over afterwards? Here are the details about the issue:";

/// Borrowed collaborators shared by every operation of a run.
#[derive(Clone, Copy)]
pub struct Collaborators<'a> {
    pub oracle: &'a dyn Oracle,
    pub commands: &'a dyn CommandRunner,
    pub code_monkey: &'a dyn CodeChangeExecutor,
    pub human: &'a dyn HumanIntervention,
    pub progress: &'a dyn ProgressStore,
}

#[derive(Debug, Clone)]
pub struct DeveloperSettings {
    pub max_manual_test_rounds: u32,
    pub max_install_check_rounds: u32,
    pub directory_tree_limit: usize,
}

impl Default for DeveloperSettings {
    fn default() -> Self {
        Self::from(&DevConfig::default())
    }
}

impl From<&DevConfig> for DeveloperSettings {
    fn from(cfg: &DevConfig) -> Self {
        Self {
            max_manual_test_rounds: cfg.max_manual_test_rounds,
            max_install_check_rounds: cfg.max_install_check_rounds,
            directory_tree_limit: cfg.directory_tree_limit,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecuteOptions {
    /// Rewind to the task checkpoint before every step.
    pub reset_conversation_each_step: bool,
    /// Run the verifier after each code change.
    pub verify_after_code_change: bool,
}

impl Default for ExecuteOptions {
    fn default() -> Self {
        Self {
            reset_conversation_each_step: true,
            verify_after_code_change: true,
        }
    }
}

/// How a task's step list ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskOutcome {
    /// The test command was confirmed (or declared) fixed after `step_index`.
    Resolved { step_index: usize },
    /// Every step ran without an early resolution.
    Exhausted { steps: usize },
}

impl TaskOutcome {
    pub fn is_resolved(self) -> bool {
        matches!(self, Self::Resolved { .. })
    }
}

#[derive(Debug, Clone)]
pub struct CodingReport {
    /// Project context with `current_step` set to coding.
    pub project: ProjectContext,
    pub outcomes: Vec<TaskOutcome>,
}

impl CodingReport {
    /// Tasks resolved early by their test command.
    pub fn resolved(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_resolved()).count()
    }
}

pub struct Developer<'a> {
    collab: Collaborators<'a>,
    settings: DeveloperSettings,
}

impl<'a> Developer<'a> {
    pub fn new(collab: Collaborators<'a>, settings: DeveloperSettings) -> Self {
        Self { collab, settings }
    }

    pub fn collaborators(&self) -> Collaborators<'a> {
        self.collab
    }

    pub fn settings(&self) -> &DeveloperSettings {
        &self.settings
    }

    /// Implement every task of the development plan, in order.
    #[instrument(
        skip_all,
        fields(app_id = %project.app_id, tasks = project.development_plan.len())
    )]
    pub fn start_coding(&self, project: &ProjectContext) -> Result<CodingReport> {
        let project = project.with_step(PipelineStep::Coding);
        info!("starting development");

        let mut outcomes = Vec::with_capacity(project.development_plan.len());
        for index in 0..project.development_plan.len() {
            let outcome = self
                .implement_task(&project, &project.development_plan, index, None)
                .with_context(|| format!("implement task {}", index + 1))?;
            outcomes.push(outcome);
        }

        let report = CodingReport { project, outcomes };
        info!(resolved = report.resolved(), "the app is done");
        Ok(report)
    }

    /// Break the task at `current_index` into steps and execute them.
    #[instrument(skip_all, fields(task = current_index + 1))]
    pub fn implement_task(
        &self,
        project: &ProjectContext,
        sibling_tasks: &[Task],
        current_index: usize,
        parent_task: Option<&Task>,
    ) -> Result<TaskOutcome> {
        let task = sibling_tasks
            .get(current_index)
            .ok_or(DevError::InvalidTaskIndex {
                index: current_index,
                len: sibling_tasks.len(),
            })?;
        info!(description = %task.description, "implementing task {}", current_index + 1);

        let tree = directory_tree(&project.root, self.settings.directory_tree_limit)?;
        let mut conversation = Conversation::new();
        let breakdown: TaskBreakdown = ask_typed(
            self.collab.oracle,
            &mut conversation,
            PromptId::TaskBreakdown,
            json!({
                "name": project.name,
                "app_summary": project.high_level_summary,
                "clarification": [],
                "user_stories": project.user_stories,
                "user_tasks": project.user_tasks,
                "technologies": project.architecture,
                "directory_tree": tree,
                "current_task_index": current_index,
                "sibling_tasks": sibling_tasks,
                "parent_task": parent_task,
            }),
        )?;

        let errors = validate_steps(&breakdown.steps);
        if !errors.is_empty() {
            return Err(DevError::InvalidSteps(errors).into());
        }

        self.execute_task(
            &mut conversation,
            &breakdown.steps,
            None,
            ExecuteOptions::default(),
        )
    }

    /// Walk `steps` in order, dispatching each by kind.
    ///
    /// With a `test_command`, every step flagged `check_if_fixed` asks the
    /// oracle whether the test should run again; `NO`, or a rerun judged
    /// `DONE`, resolves the task and skips the remaining steps.
    #[instrument(skip_all, fields(steps = steps.len(), has_test = test_command.is_some()))]
    pub fn execute_task(
        &self,
        conversation: &mut Conversation,
        steps: &[Step],
        test_command: Option<&CommandSpec>,
        options: ExecuteOptions,
    ) -> Result<TaskOutcome> {
        let task_branch = Uuid::new_v4().to_string();
        conversation.save_branch(task_branch.as_str());

        for (index, step) in steps.iter().enumerate() {
            if options.reset_conversation_each_step {
                conversation.load_branch(&task_branch)?;
            }
            info!(step = index, kind = step.kind_name(), "executing step");

            match &step.kind {
                StepKind::Command { command } => {
                    self.collab
                        .commands
                        .run_until_success(command, conversation)
                        .with_context(|| format!("step {index}: run `{}`", command.command))?;
                }
                StepKind::CodeChange { description } => {
                    let updated = self
                        .collab
                        .code_monkey
                        .apply(conversation, description, index)
                        .with_context(|| format!("step {index}: apply code change"))?;
                    conversation.continue_with(updated);
                    if options.verify_after_code_change {
                        self.test_code_changes(conversation)?;
                    }
                }
                StepKind::HumanIntervention { description } => {
                    self.request_debugging_help(description)?;
                }
            }

            let Some(test) = test_command else {
                continue;
            };
            if !step.check_if_fixed {
                continue;
            }
            let rerun: RerunReply = ask_typed(
                self.collab.oracle,
                conversation,
                PromptId::ShouldRerunCommand,
                json!({ "command": test.command, "timeout": test.timeout }),
            )?;
            match rerun.decision {
                RerunDecision::No => {
                    info!(step = index, "no rerun needed, task resolved");
                    return Ok(TaskOutcome::Resolved { step_index: index });
                }
                RerunDecision::Yes => {
                    match self.collab.commands.run_and_check(test, conversation)? {
                        CheckVerdict::Done => {
                            info!(step = index, "test command passed, task resolved");
                            return Ok(TaskOutcome::Resolved { step_index: index });
                        }
                        CheckVerdict::NeedsDebugging => {
                            warn!(
                                step = index,
                                command = %test.command,
                                "got incorrect CLI response"
                            );
                        }
                    }
                }
            }
        }

        Ok(TaskOutcome::Exhausted { steps: steps.len() })
    }

    /// Hand a problem to the human and carry on; the answer is not used.
    pub fn request_debugging_help(&self, details: &str) -> Result<()> {
        let answer = self.collab.human.ask(DEBUGGING_HELP_MESSAGE, details)?;
        info!(answered = answer.is_some(), "human intervention finished");
        Ok(())
    }

    fn test_code_changes(&self, conversation: &mut Conversation) -> Result<VerificationOutcome> {
        let verifier = TestVerifier::new(
            self.collab.oracle,
            self.collab.commands,
            self.collab.human,
            self.settings.max_manual_test_rounds,
        );
        let outcome = verifier.verify(self.collab.code_monkey, conversation)?;
        if outcome != VerificationOutcome::Verified {
            warn!(outcome = ?outcome, "code change not verified");
        }
        Ok(outcome)
    }
}
