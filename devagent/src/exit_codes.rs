//! Stable exit codes for devagent CLI commands.

/// Command succeeded.
pub const OK: i32 = 0;
/// Command failed due to invalid layout/config/project, an oracle fault or other errors.
pub const INVALID: i32 = 1;
