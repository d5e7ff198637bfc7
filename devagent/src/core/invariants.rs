//! Semantic checks on task breakdowns not expressible via JSON Schema.

use crate::core::types::{CommandSpec, Step, StepKind};

/// Check a breakdown before it is executed:
/// - command steps carry a non-blank command and a timeout > 0
/// - code-change and human-intervention steps carry a non-blank description
pub fn validate_steps(steps: &[Step]) -> Vec<String> {
    let mut errors = Vec::new();
    for (index, step) in steps.iter().enumerate() {
        let at = format!("step {} ({})", index + 1, step.kind_name());
        match &step.kind {
            StepKind::Command { command } => {
                errors.extend(validate_command(command).into_iter().map(|e| format!("{at}: {e}")));
            }
            StepKind::CodeChange { description } | StepKind::HumanIntervention { description } => {
                if description.trim().is_empty() {
                    errors.push(format!("{at}: description must not be empty"));
                }
            }
        }
    }
    errors
}

pub fn validate_command(command: &CommandSpec) -> Vec<String> {
    let mut errors = Vec::new();
    if command.command.trim().is_empty() {
        errors.push("command must not be empty".to_string());
    }
    if command.timeout == 0 {
        errors.push(format!("`{}`: timeout must be > 0", command.command));
    }
    errors
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn well_formed_steps_pass() {
        let steps = vec![
            Step::command("cargo build", 120),
            Step::code_change("add the handler").checking_if_fixed(),
            Step::human_intervention("create the database"),
        ];
        assert!(validate_steps(&steps).is_empty());
    }

    #[test]
    fn reports_every_violation_with_position() {
        let steps = vec![
            Step::command("  ", 0),
            Step::code_change(""),
            Step::human_intervention("fine"),
        ];
        let errors = validate_steps(&steps);
        assert_eq!(errors.len(), 3);
        assert!(errors[0].starts_with("step 1 (command)"));
        assert!(errors.iter().any(|e| e.contains("timeout must be > 0")));
        assert!(errors[2].starts_with("step 2 (code_change)"));
    }
}
