//! Developer agent that turns a development plan into executed steps.
//!
//! Each task of the plan is broken into shell commands, code changes and
//! requests for human help by a conversational planner (the oracle), then
//! walked in order by a small state machine. The layout follows a strict
//! split:
//!
//! - **[`core`]**: Pure, deterministic logic (conversation checkpoints, step
//!   and reply types, validation). No I/O.
//! - **[`io`]**: Side-effecting collaborators (oracle process, shell commands,
//!   file writes, progress records, the human at the terminal). Each sits
//!   behind a trait so tests can script it.
//!
//! Orchestration modules ([`developer`], [`verify`], [`env_setup`]) coordinate
//! core logic with the collaborators to implement CLI commands.

pub mod core;
pub mod developer;
pub mod env_setup;
pub mod error;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod project;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
pub mod verify;
