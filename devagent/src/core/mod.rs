//! Deterministic, pure logic shared by the developer agent.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! data structures and return deterministic outputs suitable for tests.

pub mod conversation;
pub mod invariants;
pub mod paths;
pub mod types;
