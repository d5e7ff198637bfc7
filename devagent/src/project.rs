//! Immutable project context threaded through every operation.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::debug;

use crate::core::types::Task;

/// Stages of the app-building pipeline, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStep {
    ProjectDescription,
    UserStories,
    UserTasks,
    Architecture,
    DevelopmentPlanning,
    EnvironmentSetup,
    Coding,
}

impl PipelineStep {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ProjectDescription => "project_description",
            Self::UserStories => "user_stories",
            Self::UserTasks => "user_tasks",
            Self::Architecture => "architecture",
            Self::DevelopmentPlanning => "development_planning",
            Self::EnvironmentSetup => "environment_setup",
            Self::Coding => "coding",
        }
    }
}

/// True if a previously finished `current` step must run again because the
/// user asked to redo the pipeline from `redo` onward.
pub fn should_execute(redo: Option<PipelineStep>, current: PipelineStep) -> bool {
    redo.is_some_and(|redo| redo <= current)
}

/// Everything the developer agent knows about the app it is building.
///
/// Loaded from `.devagent/project.json`; operations that change the current
/// step return an updated copy via [`ProjectContext::with_step`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectContext {
    pub app_id: String,
    pub name: String,
    #[serde(default)]
    pub app_type: Option<String>,
    #[serde(default)]
    pub high_level_summary: String,
    #[serde(default)]
    pub user_stories: Vec<String>,
    #[serde(default)]
    pub user_tasks: Vec<String>,
    /// Technologies chosen for the architecture.
    #[serde(default)]
    pub architecture: Vec<String>,
    #[serde(default)]
    pub development_plan: Vec<Task>,
    #[serde(default)]
    pub current_step: Option<PipelineStep>,
    /// Re-run the pipeline from this step even if progress was saved.
    #[serde(default)]
    pub redo_step: Option<PipelineStep>,
    /// Directory the app's source tree lives in.
    #[serde(skip)]
    pub root: PathBuf,
}

impl ProjectContext {
    pub fn with_step(&self, step: PipelineStep) -> Self {
        Self {
            current_step: Some(step),
            ..self.clone()
        }
    }

    pub fn with_root(self, root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            ..self
        }
    }

    /// Identity record stored alongside saved progress.
    pub fn app_data(&self) -> Value {
        json!({
            "app_id": self.app_id,
            "name": self.name,
            "app_type": self.app_type,
        })
    }
}

/// Load a project definition and bind it to `root`.
pub fn load_project(path: &Path, root: &Path) -> Result<ProjectContext> {
    debug!(path = %path.display(), "loading project");
    let contents =
        fs::read_to_string(path).with_context(|| format!("read project {}", path.display()))?;
    let project: ProjectContext = serde_json::from_str(&contents)
        .with_context(|| format!("parse project {}", path.display()))?;
    Ok(project.with_root(root))
}

/// Atomically write a project definition (temp file + rename).
pub fn write_project(path: &Path, project: &ProjectContext) -> Result<()> {
    let mut buf = serde_json::to_string_pretty(project).context("serialize project")?;
    buf.push('\n');
    let parent = path
        .parent()
        .with_context(|| format!("project path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let tmp_path = path.with_extension("json.tmp");
    fs::write(&tmp_path, buf)
        .with_context(|| format!("write temp project {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace project {}", path.display()))
}
