//! Agent configuration stored under `.devagent/config.toml`.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

/// Developer agent configuration (TOML).
///
/// Intended to be edited by humans. Missing fields fall back to defaults.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct DevConfig {
    /// Wall-clock budget for a single oracle call, in seconds.
    pub oracle_timeout_secs: u64,

    /// Rendered prompts larger than this drop the oldest history first.
    pub prompt_budget_bytes: usize,

    /// Truncate captured command stdout/stderr beyond this many bytes.
    pub command_output_limit_bytes: usize,

    /// Runs of a failing command before escalating to a human.
    pub max_command_attempts: u32,

    /// Manual-test rounds before verification gives up.
    pub max_manual_test_rounds: u32,

    /// Check commands the oracle may issue per technology.
    pub max_install_check_rounds: u32,

    /// Entries listed in directory snapshots sent to the oracle.
    pub directory_tree_limit: usize,

    pub oracle: OracleConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct OracleConfig {
    /// Program and leading arguments; schema and output flags are appended.
    pub command: Vec<String>,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            command: vec![
                "codex".to_string(),
                "exec".to_string(),
                "--skip-git-repo-check".to_string(),
            ],
        }
    }
}

impl Default for DevConfig {
    fn default() -> Self {
        Self {
            oracle_timeout_secs: 10 * 60,
            prompt_budget_bytes: 40_000,
            command_output_limit_bytes: 100_000,
            max_command_attempts: 3,
            max_manual_test_rounds: 5,
            max_install_check_rounds: 5,
            directory_tree_limit: 500,
            oracle: OracleConfig::default(),
        }
    }
}

impl DevConfig {
    pub fn validate(&self) -> Result<()> {
        if self.oracle_timeout_secs == 0 {
            return Err(anyhow!("oracle_timeout_secs must be > 0"));
        }
        if self.prompt_budget_bytes == 0 {
            return Err(anyhow!("prompt_budget_bytes must be > 0"));
        }
        if self.command_output_limit_bytes == 0 {
            return Err(anyhow!("command_output_limit_bytes must be > 0"));
        }
        if self.max_command_attempts == 0 {
            return Err(anyhow!("max_command_attempts must be > 0"));
        }
        if self.max_manual_test_rounds == 0 {
            return Err(anyhow!("max_manual_test_rounds must be > 0"));
        }
        if self.max_install_check_rounds == 0 {
            return Err(anyhow!("max_install_check_rounds must be > 0"));
        }
        if self.oracle.command.is_empty() || self.oracle.command[0].trim().is_empty() {
            return Err(anyhow!("oracle.command must be a non-empty array"));
        }
        Ok(())
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `DevConfig::default()`.
pub fn load_config(path: &Path) -> Result<DevConfig> {
    if !path.exists() {
        let cfg = DevConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: DevConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &DevConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    let parent = path
        .parent()
        .with_context(|| format!("config path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let tmp_path = path.with_extension("toml.tmp");
    fs::write(&tmp_path, buf)
        .with_context(|| format!("write temp config {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace config {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_missing_returns_default() {
        let temp = tempfile::tempdir().expect("tempdir");
        let cfg = load_config(&temp.path().join("missing.toml")).expect("load");
        assert_eq!(cfg, DevConfig::default());
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("config.toml");
        fs::write(&path, "max_manual_test_rounds = 2\n[oracle]\ncommand = [\"my-llm\"]\n")
            .expect("write");

        let cfg = load_config(&path).expect("load");
        assert_eq!(cfg.max_manual_test_rounds, 2);
        assert_eq!(cfg.oracle.command, vec!["my-llm"]);
        assert_eq!(cfg.max_command_attempts, DevConfig::default().max_command_attempts);
    }

    #[test]
    fn rejects_zero_limits() {
        let cfg = DevConfig {
            max_command_attempts: 0,
            ..DevConfig::default()
        };
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("max_command_attempts"));
    }

    #[test]
    fn write_then_load_round_trips() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join(".devagent/config.toml");
        let cfg = DevConfig {
            prompt_budget_bytes: 1234,
            ..DevConfig::default()
        };
        write_config(&path, &cfg).expect("write");
        assert_eq!(load_config(&path).expect("load"), cfg);
    }
}
