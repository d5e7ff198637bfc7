//! Developer agent CLI.
//!
//! Reads `.devagent/project.json` and `.devagent/config.toml` under the project
//! root, sets up the development environment and implements the development
//! plan task by task.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::debug;

use devagent::developer::{Collaborators, Developer, DeveloperSettings};
use devagent::exit_codes;
use devagent::io::code_monkey::OracleCodeMonkey;
use devagent::io::command::ShellCommandRunner;
use devagent::io::config::load_config;
use devagent::io::human::ConsoleHuman;
use devagent::io::init::{DevPaths, InitOptions, init_workspace};
use devagent::io::oracle::CodexOracle;
use devagent::io::progress::FileProgressStore;
use devagent::io::system::os_info;
use devagent::logging;
use devagent::project::{ProjectContext, load_project};

#[derive(Parser)]
#[command(
    name = "devagent",
    version,
    about = "Developer agent that implements a development plan step by step"
)]
struct Cli {
    /// Project root containing `.devagent/`.
    #[arg(long, global = true, default_value = ".")]
    root: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create `.devagent/` with a default config and project file.
    Init {
        /// Overwrite existing files.
        #[arg(short, long)]
        force: bool,
    },
    /// Check and install the technologies the architecture needs.
    Setup,
    /// Implement every task of the development plan.
    Code,
    /// Environment setup followed by coding.
    Run,
}

fn main() {
    logging::init();
    match run() {
        Ok(()) => std::process::exit(exit_codes::OK),
        Err(err) => {
            eprintln!("{:#}", err);
            std::process::exit(exit_codes::INVALID);
        }
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Command::Init { force } => cmd_init(&cli.root, force),
        Command::Setup => with_developer(&cli.root, |dev, project| {
            cmd_setup(dev, project)?;
            Ok(())
        }),
        Command::Code => with_developer(&cli.root, cmd_code),
        Command::Run => with_developer(&cli.root, |dev, project| {
            let project = cmd_setup(dev, project)?;
            cmd_code(dev, &project)
        }),
    }
}

fn cmd_init(root: &Path, force: bool) -> Result<()> {
    let paths = init_workspace(root, &InitOptions { force })?;
    println!("initialized {}", paths.state_dir.display());
    println!("edit {} to describe the app", paths.project_path.display());
    Ok(())
}

fn cmd_setup(dev: &Developer<'_>, project: &ProjectContext) -> Result<ProjectContext> {
    let report = dev.set_up_environment(project, &os_info())?;
    if report.resumed {
        println!("environment setup already finished");
    }
    for technology in &report.technologies {
        println!("{}: {:?}", technology.name, technology.status);
    }
    Ok(report.project)
}

fn cmd_code(dev: &Developer<'_>, project: &ProjectContext) -> Result<()> {
    let report = dev.start_coding(project)?;
    println!(
        "implemented {} tasks ({} resolved by their test command)",
        report.outcomes.len(),
        report.resolved()
    );
    Ok(())
}

/// Build the concrete collaborators for `root` and hand a developer to `f`.
fn with_developer<F>(root: &Path, f: F) -> Result<()>
where
    F: FnOnce(&Developer<'_>, &ProjectContext) -> Result<()>,
{
    let paths = DevPaths::new(root);
    let cfg = load_config(&paths.config_path)?;
    let project = load_project(&paths.project_path, &paths.root)?;
    debug!(app_id = %project.app_id, root = %paths.root.display(), "loaded project");

    let oracle = CodexOracle::new(
        &paths.root,
        &paths.oracle_dir,
        cfg.oracle.command.clone(),
        Duration::from_secs(cfg.oracle_timeout_secs),
        cfg.command_output_limit_bytes,
        cfg.prompt_budget_bytes,
    );
    let human = ConsoleHuman::stdin();
    let commands = ShellCommandRunner::new(
        &paths.root,
        &oracle,
        &human,
        cfg.max_command_attempts,
        cfg.command_output_limit_bytes,
    );
    let code_monkey = OracleCodeMonkey::new(&paths.root, &oracle, cfg.directory_tree_limit);
    let progress = FileProgressStore::new(&paths.progress_dir);

    let dev = Developer::new(
        Collaborators {
            oracle: &oracle,
            commands: &commands,
            code_monkey: &code_monkey,
            human: &human,
            progress: &progress,
        },
        DeveloperSettings::from(&cfg),
    );
    f(&dev, &project)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_init_force() {
        let cli = Cli::parse_from(["devagent", "init", "--force"]);
        assert!(matches!(cli.command, Command::Init { force: true }));
        assert_eq!(cli.root, PathBuf::from("."));
    }

    #[test]
    fn parse_root_after_subcommand() {
        let cli = Cli::parse_from(["devagent", "run", "--root", "/tmp/app"]);
        assert!(matches!(cli.command, Command::Run));
        assert_eq!(cli.root, PathBuf::from("/tmp/app"));
    }
}
