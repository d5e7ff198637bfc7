//! Verification of a code change right after it was applied.

use anyhow::Result;
use serde_json::json;
use tracing::{info, instrument, warn};

use crate::core::conversation::Conversation;
use crate::core::types::{TestTypeReply, VerificationPlan};
use crate::io::code_monkey::CodeChangeExecutor;
use crate::io::command::CommandRunner;
use crate::io::human::HumanIntervention;
use crate::io::oracle::{Oracle, ask_typed};
use crate::io::prompt::PromptId;

pub const MANUAL_TEST_MESSAGE: &str = "I need your help. Can you please test if this was successful?";

/// Human reply that confirms a manual test passed.
pub const MANUAL_TEST_DONE: &str = "DONE";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerificationOutcome {
    Verified,
    /// The human gave no answer to a manual test.
    Declined,
    /// Every manual-test round came back unresolved.
    Exhausted { rounds: u32 },
}

pub struct TestVerifier<'a> {
    oracle: &'a dyn Oracle,
    commands: &'a dyn CommandRunner,
    human: &'a dyn HumanIntervention,
    max_manual_rounds: u32,
}

impl<'a> TestVerifier<'a> {
    pub fn new(
        oracle: &'a dyn Oracle,
        commands: &'a dyn CommandRunner,
        human: &'a dyn HumanIntervention,
        max_manual_rounds: u32,
    ) -> Self {
        Self {
            oracle,
            commands,
            human,
            max_manual_rounds: max_manual_rounds.max(1),
        }
    }

    /// Ask the oracle how to verify the last change and carry the plan out.
    ///
    /// A manual test that the human reports as unresolved starts a new round on
    /// the same conversation, up to `max_manual_rounds`.
    #[instrument(skip_all, fields(max_rounds = self.max_manual_rounds))]
    pub fn verify(
        &self,
        code_monkey: &dyn CodeChangeExecutor,
        conversation: &mut Conversation,
    ) -> Result<VerificationOutcome> {
        for round in 1..=self.max_manual_rounds {
            let reply: TestTypeReply =
                ask_typed(self.oracle, conversation, PromptId::StepCheck, json!({}))?;
            let plan = VerificationPlan::try_from(reply)?;
            info!(round, plan = ?plan, "verifying change");

            match plan {
                VerificationPlan::Command(command) => {
                    self.commands.run_until_success(&command, conversation)?;
                    return Ok(VerificationOutcome::Verified);
                }
                VerificationPlan::Automated { description } => {
                    let updated = code_monkey.apply(conversation, &description, 0)?;
                    conversation.continue_with(updated);
                    return Ok(VerificationOutcome::Verified);
                }
                VerificationPlan::Manual { description } => {
                    match self.human.ask(MANUAL_TEST_MESSAGE, &description)? {
                        None => {
                            info!(round, "manual test declined");
                            return Ok(VerificationOutcome::Declined);
                        }
                        Some(answer) if answer == MANUAL_TEST_DONE => {
                            return Ok(VerificationOutcome::Verified);
                        }
                        Some(answer) => {
                            warn!(round, answer = %answer, "manual test not resolved");
                        }
                    }
                }
            }
        }

        warn!(rounds = self.max_manual_rounds, "manual testing gave up");
        Ok(VerificationOutcome::Exhausted {
            rounds: self.max_manual_rounds,
        })
    }
}
