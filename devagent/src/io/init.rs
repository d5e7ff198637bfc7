//! Initialization helpers for `.devagent/` scaffolding.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use uuid::Uuid;

use super::config::{DevConfig, write_config};
use crate::project::{ProjectContext, write_project};

/// All canonical paths within `.devagent/` for a project root.
#[derive(Debug, Clone)]
pub struct DevPaths {
    pub root: PathBuf,
    pub state_dir: PathBuf,
    pub gitignore_path: PathBuf,
    pub config_path: PathBuf,
    pub project_path: PathBuf,
    pub progress_dir: PathBuf,
    /// Scratch space for oracle schemas and replies.
    pub oracle_dir: PathBuf,
}

impl DevPaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let state_dir = root.join(".devagent");
        Self {
            root: root.clone(),
            state_dir: state_dir.clone(),
            gitignore_path: state_dir.join(".gitignore"),
            config_path: state_dir.join("config.toml"),
            project_path: state_dir.join("project.json"),
            progress_dir: state_dir.join("progress"),
            oracle_dir: state_dir.join("oracle"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct InitOptions {
    /// If true, overwrite existing agent-owned files.
    pub force: bool,
}

/// Create `.devagent/` scaffolding in `root`.
///
/// The project file gets a fresh app id and is named after the root
/// directory. Fails if `.devagent/` already exists unless `options.force`
/// is set.
pub fn init_workspace(root: &Path, options: &InitOptions) -> Result<DevPaths> {
    let paths = DevPaths::new(root);
    if paths.state_dir.exists() && !options.force {
        return Err(anyhow!(
            "devagent init: .devagent already exists (use --force to overwrite)"
        ));
    }
    if paths.state_dir.exists() && !paths.state_dir.is_dir() {
        return Err(anyhow!(
            "devagent init: .devagent exists but is not a directory"
        ));
    }

    create_dir(&paths.state_dir)?;
    create_dir(&paths.progress_dir)?;
    create_dir(&paths.oracle_dir)?;
    fs::write(&paths.gitignore_path, DEVAGENT_GITIGNORE)
        .with_context(|| format!("write file {}", paths.gitignore_path.display()))?;
    write_config(&paths.config_path, &DevConfig::default())?;
    write_project(&paths.project_path, &placeholder_project(root))?;

    Ok(paths)
}

fn create_dir(path: &Path) -> Result<()> {
    fs::create_dir_all(path).with_context(|| format!("create directory {}", path.display()))
}

fn placeholder_project(root: &Path) -> ProjectContext {
    let name = root
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "app".to_string());
    ProjectContext {
        app_id: Uuid::new_v4().to_string(),
        name,
        app_type: None,
        high_level_summary: String::new(),
        user_stories: Vec::new(),
        user_tasks: Vec::new(),
        architecture: Vec::new(),
        development_plan: Vec::new(),
        current_step: None,
        redo_step: None,
        root: root.to_path_buf(),
    }
}

const DEVAGENT_GITIGNORE: &str = "oracle/\n";

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::config::load_config;
    use crate::project::load_project;

    #[test]
    fn init_creates_expected_layout() {
        let temp = tempfile::tempdir().expect("tempdir");
        let root = temp.path();

        let paths = init_workspace(root, &InitOptions { force: false }).expect("init");

        assert!(paths.state_dir.is_dir());
        assert!(paths.progress_dir.is_dir());
        assert!(paths.oracle_dir.is_dir());
        assert!(paths.gitignore_path.is_file());
        assert_eq!(load_config(&paths.config_path).expect("config"), DevConfig::default());

        let project = load_project(&paths.project_path, root).expect("project");
        assert!(Uuid::parse_str(&project.app_id).is_ok());
        assert!(project.development_plan.is_empty());
    }

    #[test]
    fn init_refuses_existing_without_force() {
        let temp = tempfile::tempdir().expect("tempdir");
        init_workspace(temp.path(), &InitOptions { force: false }).expect("first init");

        let err = init_workspace(temp.path(), &InitOptions { force: false }).unwrap_err();
        assert!(err.to_string().contains("already exists"));

        init_workspace(temp.path(), &InitOptions { force: true }).expect("forced init");
    }
}
