//! Command runner used for command steps, test commands and install checks.

use std::path::{Path, PathBuf};

use anyhow::Result;
use serde_json::json;
use tracing::{debug, info, instrument, warn};

use crate::core::conversation::{Conversation, Role};
use crate::core::types::{CheckReply, CheckVerdict, CommandList, CommandSpec};
use crate::io::human::HumanIntervention;
use crate::io::oracle::{Oracle, ask_typed};
use crate::io::process::{CommandOutput, run_shell};
use crate::io::prompt::PromptId;

const ESCALATION_MESSAGE: &str =
    "I couldn't get this command to succeed. Can you fix it and let me know when I can continue?";

pub trait CommandRunner {
    /// Run `command` until it succeeds. Retry and escalation policy belongs to
    /// the implementation; an `Err` means the runner itself could not operate.
    fn run_until_success(&self, command: &CommandSpec, conversation: &mut Conversation)
    -> Result<()>;

    /// Run `command` once and classify the result.
    fn run_and_check(
        &self,
        command: &CommandSpec,
        conversation: &mut Conversation,
    ) -> Result<CheckVerdict>;
}

/// Runs commands through `sh -c` and asks the oracle to judge their output.
pub struct ShellCommandRunner<'a> {
    workdir: PathBuf,
    oracle: &'a dyn Oracle,
    human: &'a dyn HumanIntervention,
    max_attempts: u32,
    output_limit_bytes: usize,
}

impl<'a> ShellCommandRunner<'a> {
    pub fn new(
        workdir: &Path,
        oracle: &'a dyn Oracle,
        human: &'a dyn HumanIntervention,
        max_attempts: u32,
        output_limit_bytes: usize,
    ) -> Self {
        Self {
            workdir: workdir.to_path_buf(),
            oracle,
            human,
            max_attempts: max_attempts.max(1),
            output_limit_bytes,
        }
    }

    fn run_once(&self, command: &CommandSpec) -> Result<CommandOutput> {
        info!(command = %command.command, timeout_secs = command.timeout, "running command");
        let output = run_shell(
            &command.command,
            &self.workdir,
            command.timeout_duration(),
            self.output_limit_bytes,
        )?;
        debug!(success = output.success(), timed_out = output.timed_out, "command ran");
        Ok(output)
    }

    fn run_fixes(
        &self,
        command: &CommandSpec,
        attempt: u32,
        conversation: &mut Conversation,
    ) -> Result<()> {
        let fixes: CommandList = ask_typed(
            self.oracle,
            conversation,
            PromptId::DebugCommand,
            json!({ "command": command.command, "attempt": attempt }),
        )?;
        for fix in &fixes.commands {
            let output = self.run_once(fix)?;
            conversation.push(
                Role::User,
                format!(
                    "Ran fix `{}` (exit code {:?}):\n{}",
                    fix.command,
                    output.status.code(),
                    output.render()
                ),
            );
        }
        Ok(())
    }
}

impl CommandRunner for ShellCommandRunner<'_> {
    #[instrument(skip_all, fields(command = %command.command))]
    fn run_until_success(
        &self,
        command: &CommandSpec,
        conversation: &mut Conversation,
    ) -> Result<()> {
        for attempt in 1..=self.max_attempts {
            match self.run_and_check(command, conversation)? {
                CheckVerdict::Done => return Ok(()),
                CheckVerdict::NeedsDebugging if attempt < self.max_attempts => {
                    warn!(attempt, "command needs debugging");
                    self.run_fixes(command, attempt, conversation)?;
                }
                CheckVerdict::NeedsDebugging => {}
            }
        }

        warn!(attempts = self.max_attempts, "command still failing, escalating to human");
        self.human.ask(ESCALATION_MESSAGE, &format!("`{}`", command.command))?;
        Ok(())
    }

    #[instrument(skip_all, fields(command = %command.command))]
    fn run_and_check(
        &self,
        command: &CommandSpec,
        conversation: &mut Conversation,
    ) -> Result<CheckVerdict> {
        let output = self.run_once(command)?;
        let reply: CheckReply = ask_typed(
            self.oracle,
            conversation,
            PromptId::RanCommand,
            json!({
                "command": command.command,
                "timeout": command.timeout,
                "exit_code": output.status.code(),
                "timed_out": output.timed_out,
                "cli_response": output.render(),
            }),
        )?;
        info!(verdict = ?reply.verdict, "command checked");
        Ok(reply.verdict)
    }
}
