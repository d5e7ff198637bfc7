//! Typed failures that callers may want to downcast out of `anyhow::Error`.

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DevError {
    /// Oracle reply did not match the response schema of its prompt.
    #[error("invalid oracle response for '{prompt}':\n- {}", .errors.join("\n- "))]
    InvalidOracleResponse { prompt: String, errors: Vec<String> },

    /// Verification strategy outside `command_test`/`automated_test`/`manual_test`.
    #[error("unknown test type '{0}'")]
    UnknownTestType(String),

    #[error("command_test verification is missing its command")]
    MissingTestCommand,

    #[error("task index {index} out of range for {len} sibling tasks")]
    InvalidTaskIndex { index: usize, len: usize },

    #[error("invalid task steps:\n- {}", .0.join("\n- "))]
    InvalidSteps(Vec<String>),

    #[error("no conversation branch labelled '{0}'")]
    UnknownBranch(String),

    #[error("refusing to write outside the project root: {0}")]
    UnsafePath(String),
}
