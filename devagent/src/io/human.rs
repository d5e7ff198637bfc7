//! Human-in-the-loop collaborator.

use std::cell::RefCell;
use std::io::{self, BufRead, StdinLock};

use anyhow::{Context, Result};
use tracing::info;

pub trait HumanIntervention {
    /// Show `message` and `details` to a human and wait for their answer.
    ///
    /// `None` means no answer is available (input closed).
    fn ask(&self, message: &str, details: &str) -> Result<Option<String>>;
}

/// Prompts on stderr and reads one line per question.
pub struct ConsoleHuman<R: BufRead> {
    input: RefCell<R>,
}

impl ConsoleHuman<StdinLock<'static>> {
    pub fn stdin() -> Self {
        Self::new(io::stdin().lock())
    }
}

impl<R: BufRead> ConsoleHuman<R> {
    pub fn new(input: R) -> Self {
        Self {
            input: RefCell::new(input),
        }
    }
}

impl<R: BufRead> HumanIntervention for ConsoleHuman<R> {
    fn ask(&self, message: &str, details: &str) -> Result<Option<String>> {
        info!("waiting for human input");
        eprintln!("\n{message}");
        if !details.is_empty() {
            eprintln!("{details}");
        }
        eprint!("> ");

        let mut line = String::new();
        let read = self
            .input
            .borrow_mut()
            .read_line(&mut line)
            .context("read human response")?;
        if read == 0 {
            return Ok(None);
        }
        Ok(Some(line.trim().to_string()))
    }
}
