//! Oracle abstraction for the planner the developer agent consults.
//!
//! The [`Oracle`] trait decouples the state machine from the actual model
//! backend (currently `codex exec`). Replies are validated against the
//! prompt's JSON Schema and decoded into a closed Rust type by [`ask_typed`]
//! before any orchestration code sees them. Tests use scripted oracles that
//! return predetermined replies without spawning processes.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use jsonschema::Draft;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use crate::core::conversation::{Conversation, Role};
use crate::error::DevError;
use crate::io::process::run_command_with_timeout;
use crate::io::prompt::{PromptBuilder, PromptId, render_request};

/// A single question for the oracle.
#[derive(Debug, Clone, PartialEq)]
pub struct OracleRequest {
    pub prompt: PromptId,
    pub context: Value,
}

/// Abstraction over planner backends.
pub trait Oracle {
    /// Ask `request` in the context of `conversation`.
    ///
    /// Implementations append the request and the reply to `conversation`.
    fn ask(&self, conversation: &mut Conversation, request: &OracleRequest) -> Result<Value>;
}

/// Ask the oracle and decode the reply into `T`.
///
/// A reply that violates the prompt's schema, or that cannot be decoded, fails
/// with [`DevError::InvalidOracleResponse`].
#[instrument(skip_all, fields(prompt = %prompt))]
pub fn ask_typed<T: DeserializeOwned>(
    oracle: &dyn Oracle,
    conversation: &mut Conversation,
    prompt: PromptId,
    context: Value,
) -> Result<T> {
    let request = OracleRequest { prompt, context };
    let reply = oracle.ask(conversation, &request)?;
    validate_reply(prompt, &reply)?;
    let decoded = serde_json::from_value(reply).map_err(|err| DevError::InvalidOracleResponse {
        prompt: prompt.as_str().to_string(),
        errors: vec![err.to_string()],
    })?;
    debug!("oracle reply decoded");
    Ok(decoded)
}

/// Validate a reply against the prompt's JSON Schema (Draft 2020-12).
pub fn validate_reply(prompt: PromptId, reply: &Value) -> Result<()> {
    let schema: Value =
        serde_json::from_str(prompt.schema()).with_context(|| format!("parse {prompt} schema"))?;
    let compiled = jsonschema::options()
        .with_draft(Draft::Draft202012)
        .build(&schema)
        .with_context(|| format!("compile {prompt} schema"))?;
    let errors: Vec<String> = compiled
        .iter_errors(reply)
        .map(|err| err.to_string())
        .collect();
    if !errors.is_empty() {
        warn!(prompt = %prompt, error_count = errors.len(), "oracle reply failed schema");
        return Err(DevError::InvalidOracleResponse {
            prompt: prompt.as_str().to_string(),
            errors,
        }
        .into());
    }
    Ok(())
}

/// Oracle that spawns a `codex exec`-style command per question.
///
/// The prompt is written to stdin; the command must write its final JSON
/// message to the path passed via `--output-last-message`.
pub struct CodexOracle {
    workdir: PathBuf,
    scratch_dir: PathBuf,
    command: Vec<String>,
    timeout: Duration,
    output_limit_bytes: usize,
    prompts: PromptBuilder,
}

impl CodexOracle {
    pub fn new(
        workdir: &Path,
        scratch_dir: &Path,
        command: Vec<String>,
        timeout: Duration,
        output_limit_bytes: usize,
        prompt_budget_bytes: usize,
    ) -> Self {
        Self {
            workdir: workdir.to_path_buf(),
            scratch_dir: scratch_dir.to_path_buf(),
            command,
            timeout,
            output_limit_bytes,
            prompts: PromptBuilder::new(prompt_budget_bytes),
        }
    }

    fn write_schema(&self, prompt: PromptId) -> Result<PathBuf> {
        let path = self.scratch_dir.join("schemas").join(prompt.schema_file_name());
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("create schema dir {}", parent.display()))?;
        }
        fs::write(&path, prompt.schema())
            .with_context(|| format!("write schema {}", path.display()))?;
        Ok(path)
    }
}

impl Oracle for CodexOracle {
    #[instrument(skip_all, fields(prompt = %request.prompt, timeout_secs = self.timeout.as_secs()))]
    fn ask(&self, conversation: &mut Conversation, request: &OracleRequest) -> Result<Value> {
        let (program, args) = self
            .command
            .split_first()
            .ok_or_else(|| anyhow!("oracle command is empty"))?;

        let user_turn = render_request(request.prompt, &request.context)?;
        let prompt = self
            .prompts
            .build(conversation.messages(), request.prompt, &user_turn)?;
        let schema_path = self.write_schema(request.prompt)?;
        let output_path = self.scratch_dir.join("last_message.json");
        if output_path.exists() {
            fs::remove_file(&output_path)
                .with_context(|| format!("remove stale {}", output_path.display()))?;
        }

        let mut cmd = Command::new(program);
        cmd.args(args)
            .arg("--output-schema")
            .arg(&schema_path)
            .arg("--output-last-message")
            .arg(&output_path)
            .arg("-")
            .current_dir(&self.workdir);

        info!(program = %program, "asking oracle");
        let output = run_command_with_timeout(
            cmd,
            Some(prompt.as_bytes()),
            self.timeout,
            self.output_limit_bytes,
        )
        .with_context(|| format!("run oracle `{program}`"))?;

        if output.timed_out {
            return Err(anyhow!("oracle timed out after {:?}", self.timeout));
        }
        if !output.success() {
            warn!(exit_code = ?output.status.code(), "oracle command failed");
            return Err(anyhow!(
                "oracle failed with status {:?}:\n{}",
                output.status.code(),
                output.render()
            ));
        }
        if !output_path.exists() {
            return Err(anyhow!("missing oracle output {}", output_path.display()));
        }

        let raw = fs::read_to_string(&output_path)
            .with_context(|| format!("read oracle output {}", output_path.display()))?;
        let reply: Value = serde_json::from_str(raw.trim()).map_err(|err| {
            DevError::InvalidOracleResponse {
                prompt: request.prompt.as_str().to_string(),
                errors: vec![format!("reply is not JSON: {err}")],
            }
        })?;

        conversation.push(Role::User, user_turn);
        conversation.push(Role::Assistant, raw.trim());
        debug!(messages = conversation.len(), "oracle replied");
        Ok(reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{CheckReply, CheckVerdict};
    use crate::test_support::ScriptedOracle;
    use serde_json::json;

    #[test]
    fn ask_typed_decodes_scripted_reply() {
        let oracle = ScriptedOracle::new(vec![(
            PromptId::RanCommand,
            json!({"verdict": "DONE"}),
        )]);
        let mut convo = Conversation::new();

        let reply: CheckReply =
            ask_typed(&oracle, &mut convo, PromptId::RanCommand, json!({})).expect("ask");
        assert_eq!(reply.verdict, CheckVerdict::Done);
        assert_eq!(convo.len(), 2);
    }

    #[test]
    fn ask_typed_rejects_schema_violations() {
        let oracle = ScriptedOracle::new(vec![(
            PromptId::RanCommand,
            json!({"verdict": "MAYBE"}),
        )]);
        let mut convo = Conversation::new();

        let err = ask_typed::<CheckReply>(&oracle, &mut convo, PromptId::RanCommand, json!({}))
            .unwrap_err();
        match err.downcast_ref::<DevError>() {
            Some(DevError::InvalidOracleResponse { prompt, errors }) => {
                assert_eq!(prompt, "dev_ops/ran_command");
                assert!(!errors.is_empty());
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn codex_oracle_reads_last_message() {
        let temp = tempfile::tempdir().expect("tempdir");
        // Stand-in for codex: the output path follows `--output-last-message`.
        let script = temp.path().join("fake-oracle.sh");
        fs::write(
            &script,
            "#!/bin/sh\ncat > /dev/null\nwhile [ \"$1\" != \"--output-last-message\" ]; do shift; done\nprintf '{\"verdict\":\"NEEDS_DEBUGGING\"}' > \"$2\"\n",
        )
        .expect("write script");

        let oracle = CodexOracle::new(
            temp.path(),
            &temp.path().join(".devagent/oracle"),
            vec!["sh".to_string(), script.display().to_string()],
            Duration::from_secs(10),
            10_000,
            10_000,
        );
        let mut convo = Conversation::with_system("dev");

        let reply: CheckReply = ask_typed(
            &oracle,
            &mut convo,
            PromptId::RanCommand,
            json!({"command": "npm test"}),
        )
        .expect("ask");

        assert_eq!(reply.verdict, CheckVerdict::NeedsDebugging);
        assert_eq!(convo.len(), 3);
        assert_eq!(convo.messages()[1].role, Role::User);
        assert!(convo.messages()[1].content.contains("npm test"));
        assert!(
            temp.path()
                .join(".devagent/oracle/schemas/dev_ops.ran_command.schema.json")
                .is_file()
        );
    }

    #[test]
    fn codex_oracle_reports_failed_command() {
        let temp = tempfile::tempdir().expect("tempdir");
        let oracle = CodexOracle::new(
            temp.path(),
            &temp.path().join("scratch"),
            vec![
                "sh".to_string(),
                "-c".to_string(),
                "cat > /dev/null; echo nope >&2; exit 4".to_string(),
            ],
            Duration::from_secs(10),
            10_000,
            10_000,
        );
        let mut convo = Conversation::new();

        let err = oracle
            .ask(
                &mut convo,
                &OracleRequest {
                    prompt: PromptId::RanCommand,
                    context: json!({}),
                },
            )
            .unwrap_err();
        assert!(err.to_string().contains("oracle failed"));
        assert!(convo.is_empty());
    }
}
