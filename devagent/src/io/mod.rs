//! I/O collaborators for the developer agent.

pub mod code_monkey;
pub mod command;
pub mod config;
pub mod directory;
pub mod human;
pub mod init;
pub mod oracle;
pub mod process;
pub mod progress;
pub mod prompt;
pub mod system;
