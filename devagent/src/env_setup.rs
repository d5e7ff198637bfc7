//! Environment setup: making sure the technologies of the architecture are installed.

use anyhow::{Context, Result};
use serde_json::{Value, json};
use tracing::{info, instrument, warn};

use crate::core::conversation::Conversation;
use crate::core::types::{
    CommandList, CommandSpec, InstallCheckReply, Technology, TechnologyFilter, TechnologyStatus,
};
use crate::developer::Developer;
use crate::io::oracle::ask_typed;
use crate::io::prompt::PromptId;
use crate::project::{PipelineStep, ProjectContext, should_execute};

#[derive(Debug, Clone)]
pub struct EnvironmentReport {
    /// Project context with `current_step` set to environment setup.
    pub project: ProjectContext,
    pub technologies: Vec<Technology>,
    /// True when a saved progress record was reused.
    pub resumed: bool,
}

impl Developer<'_> {
    /// Check and install every technology needed on this machine.
    ///
    /// Finished setups are recorded in the progress store and skipped on later
    /// runs unless the project asks to redo this step.
    #[instrument(skip_all, fields(app_id = %project.app_id))]
    pub fn set_up_environment(
        &self,
        project: &ProjectContext,
        os_info: &Value,
    ) -> Result<EnvironmentReport> {
        let step = PipelineStep::EnvironmentSetup;
        let project = project.with_step(step);
        let collab = self.collaborators();

        let saved = collab
            .progress
            .get(&project.app_id, step)?
            .filter(|_| !should_execute(project.redo_step, step));
        if let Some(record) = saved {
            info!(saved_at = %record.saved_at, "environment setup already finished");
            let technologies = saved_technologies(&record.data)?;
            return Ok(EnvironmentReport {
                project,
                technologies,
                resumed: true,
            });
        }

        info!("setting up the environment");
        let mut conversation = Conversation::new();
        let filter: TechnologyFilter = ask_typed(
            collab.oracle,
            &mut conversation,
            PromptId::EnvSetupSpecs,
            json!({
                "name": project.name,
                "os_info": os_info,
                "technologies": project.architecture,
            }),
        )?;

        let mut technologies = Vec::with_capacity(filter.technologies.len());
        for name in &filter.technologies {
            let status = self
                .install_technology(name, &mut conversation)
                .with_context(|| format!("set up {name}"))?;
            technologies.push(Technology {
                name: name.clone(),
                status,
            });
        }
        info!(count = technologies.len(), "tech stack installed");

        collab.progress.save(
            &project.app_id,
            step,
            &json!({
                "os_specific_technologies": filter.technologies,
                "newly_installed_technologies": [],
                "app_data": project.app_data(),
            }),
        )?;

        Ok(EnvironmentReport {
            project,
            technologies,
            resumed: false,
        })
    }

    fn install_technology(
        &self,
        technology: &str,
        conversation: &mut Conversation,
    ) -> Result<TechnologyStatus> {
        if self.is_installed(technology, conversation)? {
            info!(technology, "already installed");
            return Ok(TechnologyStatus::Installed);
        }

        let install: CommandList = ask_typed(
            self.collaborators().oracle,
            conversation,
            PromptId::UnsuccessfulInstallation,
            json!({ "technology": technology }),
        )?;
        if install.commands.is_empty() {
            warn!(technology, "no installation commands offered");
            return Ok(TechnologyStatus::Missing);
        }
        for command in &install.commands {
            self.collaborators()
                .commands
                .run_until_success(command, conversation)?;
        }
        info!(technology, commands = install.commands.len(), "installed");
        Ok(TechnologyStatus::InstalledNow)
    }

    /// Let the oracle run check commands until it decides either way.
    fn is_installed(&self, technology: &str, conversation: &mut Conversation) -> Result<bool> {
        let collab = self.collaborators();
        let max_rounds = self.settings().max_install_check_rounds;
        let mut reply: InstallCheckReply = ask_typed(
            collab.oracle,
            conversation,
            PromptId::InstallNextTechnology,
            json!({ "technology": technology }),
        )?;

        let mut rounds = 0;
        loop {
            match reply {
                InstallCheckReply::Done => return Ok(true),
                InstallCheckReply::NotInstalled => return Ok(false),
                InstallCheckReply::ExecuteCommand { command, timeout } => {
                    if rounds == max_rounds {
                        warn!(technology, rounds, "no decision after check commands");
                        return Ok(false);
                    }
                    rounds += 1;
                    let check = CommandSpec::new(command, timeout);
                    let verdict = collab.commands.run_and_check(&check, conversation)?;
                    reply = ask_typed(
                        collab.oracle,
                        conversation,
                        PromptId::InstallCheckResult,
                        json!({
                            "technology": technology,
                            "command": check.command,
                            "verdict": verdict,
                        }),
                    )?;
                }
            }
        }
    }
}

fn saved_technologies(data: &Value) -> Result<Vec<Technology>> {
    let names: Vec<String> = serde_json::from_value(
        data.get("os_specific_technologies")
            .cloned()
            .unwrap_or_else(|| json!([])),
    )
    .context("parse saved technologies")?;
    Ok(names
        .into_iter()
        .map(|name| Technology {
            name,
            status: TechnologyStatus::Unknown,
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::CheckVerdict;
    use crate::developer::{Collaborators, DeveloperSettings};
    use crate::io::progress::ProgressStore;
    use crate::test_support::{
        MemoryProgressStore, ScriptedCodeMonkey, ScriptedCommandRunner, ScriptedHuman,
        ScriptedOracle, sample_project,
    };

    fn developer<'a>(
        oracle: &'a ScriptedOracle,
        commands: &'a ScriptedCommandRunner,
        monkey: &'a ScriptedCodeMonkey,
        human: &'a ScriptedHuman,
        progress: &'a MemoryProgressStore,
    ) -> Developer<'a> {
        Developer::new(
            Collaborators {
                oracle,
                commands,
                code_monkey: monkey,
                human,
                progress,
            },
            DeveloperSettings {
                max_install_check_rounds: 2,
                ..DeveloperSettings::default()
            },
        )
    }

    #[test]
    fn checks_and_installs_each_technology() {
        let oracle = ScriptedOracle::new(vec![
            (PromptId::EnvSetupSpecs, json!({"technologies": ["Node.js", "MongoDB"]})),
            (
                PromptId::InstallNextTechnology,
                json!({"action": "execute_command", "command": "node --version", "timeout": 10}),
            ),
            (PromptId::InstallCheckResult, json!({"action": "done"})),
            (PromptId::InstallNextTechnology, json!({"action": "not_installed"})),
            (
                PromptId::UnsuccessfulInstallation,
                json!({"commands": [{"command": "apt-get install -y mongodb", "timeout": 300}]}),
            ),
        ]);
        let commands = ScriptedCommandRunner::new(vec![CheckVerdict::Done]);
        let (monkey, human, progress) = (
            ScriptedCodeMonkey::new(),
            ScriptedHuman::new(Vec::new()),
            MemoryProgressStore::default(),
        );
        let dev = developer(&oracle, &commands, &monkey, &human, &progress);
        let project = sample_project();

        let report = dev
            .set_up_environment(&project, &json!({"os": "linux"}))
            .expect("setup");

        assert!(!report.resumed);
        assert_eq!(report.project.current_step, Some(PipelineStep::EnvironmentSetup));
        assert_eq!(
            report.technologies,
            vec![
                Technology {
                    name: "Node.js".to_string(),
                    status: TechnologyStatus::Installed
                },
                Technology {
                    name: "MongoDB".to_string(),
                    status: TechnologyStatus::InstalledNow
                },
            ]
        );
        assert_eq!(commands.checked_commands(), vec![CommandSpec::new("node --version", 10)]);
        assert_eq!(
            commands.until_success_commands(),
            vec![CommandSpec::new("apt-get install -y mongodb", 300)]
        );
        assert!(oracle.is_exhausted());

        let record = progress
            .get(&project.app_id, PipelineStep::EnvironmentSetup)
            .expect("get")
            .expect("saved");
        assert_eq!(record.data["os_specific_technologies"], json!(["Node.js", "MongoDB"]));
        assert_eq!(record.data["newly_installed_technologies"], json!([]));
        assert_eq!(record.data["app_data"]["app_id"], project.app_id.as_str());
    }

    #[test]
    fn saved_progress_short_circuits_without_oracle() {
        let oracle = ScriptedOracle::new(Vec::new());
        let commands = ScriptedCommandRunner::new(Vec::new());
        let (monkey, human, progress) = (
            ScriptedCodeMonkey::new(),
            ScriptedHuman::new(Vec::new()),
            MemoryProgressStore::default(),
        );
        let project = sample_project();
        progress
            .save(
                &project.app_id,
                PipelineStep::EnvironmentSetup,
                &json!({"os_specific_technologies": ["Python"]}),
            )
            .expect("seed");
        let dev = developer(&oracle, &commands, &monkey, &human, &progress);

        let report = dev
            .set_up_environment(&project, &json!({}))
            .expect("setup");

        assert!(report.resumed);
        assert_eq!(report.technologies[0].name, "Python");
        assert_eq!(report.technologies[0].status, TechnologyStatus::Unknown);
        assert!(oracle.requests().is_empty());
    }

    #[test]
    fn redo_from_earlier_step_runs_setup_again() {
        let oracle = ScriptedOracle::new(vec![(
            PromptId::EnvSetupSpecs,
            json!({"technologies": []}),
        )]);
        let commands = ScriptedCommandRunner::new(Vec::new());
        let (monkey, human, progress) = (
            ScriptedCodeMonkey::new(),
            ScriptedHuman::new(Vec::new()),
            MemoryProgressStore::default(),
        );
        let project = ProjectContext {
            redo_step: Some(PipelineStep::Architecture),
            ..sample_project()
        };
        progress
            .save(&project.app_id, PipelineStep::EnvironmentSetup, &json!({}))
            .expect("seed");
        let dev = developer(&oracle, &commands, &monkey, &human, &progress);

        let report = dev
            .set_up_environment(&project, &json!({}))
            .expect("setup");

        assert!(!report.resumed);
        assert!(oracle.is_exhausted());
    }

    #[test]
    fn endless_check_commands_count_as_not_installed() {
        let check = json!({"action": "execute_command", "command": "which go", "timeout": 5});
        let oracle = ScriptedOracle::new(vec![
            (PromptId::EnvSetupSpecs, json!({"technologies": ["Go"]})),
            (PromptId::InstallNextTechnology, check.clone()),
            (PromptId::InstallCheckResult, check.clone()),
            (PromptId::InstallCheckResult, check),
            (PromptId::UnsuccessfulInstallation, json!({"commands": []})),
        ]);
        let commands = ScriptedCommandRunner::new(vec![
            CheckVerdict::NeedsDebugging,
            CheckVerdict::NeedsDebugging,
        ]);
        let (monkey, human, progress) = (
            ScriptedCodeMonkey::new(),
            ScriptedHuman::new(Vec::new()),
            MemoryProgressStore::default(),
        );
        let dev = developer(&oracle, &commands, &monkey, &human, &progress);

        let report = dev
            .set_up_environment(&sample_project(), &json!({}))
            .expect("setup");

        assert_eq!(commands.checked_commands().len(), 2);
        assert!(commands.until_success_commands().is_empty());
        assert_eq!(report.technologies[0].status, TechnologyStatus::Missing);
        assert!(oracle.is_exhausted());
    }
}
