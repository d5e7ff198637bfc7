//! Saved pipeline progress, one JSON record per app and step.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::core::paths::is_plain_name;
use crate::project::PipelineStep;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressRecord {
    pub app_id: String,
    pub step: PipelineStep,
    /// RFC 3339 timestamp.
    pub saved_at: String,
    pub data: Value,
}

pub trait ProgressStore {
    fn get(&self, app_id: &str, step: PipelineStep) -> Result<Option<ProgressRecord>>;

    /// Save `data` for `step`, replacing any earlier record.
    fn save(&self, app_id: &str, step: PipelineStep, data: &Value) -> Result<()>;
}

/// Stores records as `<dir>/<app_id>/<step>.json`.
pub struct FileProgressStore {
    dir: PathBuf,
}

impl FileProgressStore {
    pub fn new(dir: &Path) -> Self {
        Self {
            dir: dir.to_path_buf(),
        }
    }

    fn record_path(&self, app_id: &str, step: PipelineStep) -> Result<PathBuf> {
        if !is_plain_name(app_id) {
            return Err(anyhow!("invalid app id '{app_id}'"));
        }
        Ok(self
            .dir
            .join(app_id)
            .join(format!("{}.json", step.as_str())))
    }
}

impl ProgressStore for FileProgressStore {
    fn get(&self, app_id: &str, step: PipelineStep) -> Result<Option<ProgressRecord>> {
        let path = self.record_path(app_id, step)?;
        if !path.exists() {
            return Ok(None);
        }
        let contents =
            fs::read_to_string(&path).with_context(|| format!("read {}", path.display()))?;
        let record: ProgressRecord = serde_json::from_str(&contents)
            .with_context(|| format!("parse progress {}", path.display()))?;
        debug!(app_id, step = step.as_str(), "loaded progress");
        Ok(Some(record))
    }

    fn save(&self, app_id: &str, step: PipelineStep, data: &Value) -> Result<()> {
        let path = self.record_path(app_id, step)?;
        let record = ProgressRecord {
            app_id: app_id.to_string(),
            step,
            saved_at: Utc::now().to_rfc3339(),
            data: data.clone(),
        };
        let mut buf = serde_json::to_string_pretty(&record).context("serialize progress")?;
        buf.push('\n');
        let parent = path
            .parent()
            .with_context(|| format!("progress path missing parent {}", path.display()))?;
        fs::create_dir_all(parent)
            .with_context(|| format!("create directory {}", parent.display()))?;
        let tmp_path = path.with_extension("json.tmp");
        fs::write(&tmp_path, buf)
            .with_context(|| format!("write temp progress {}", tmp_path.display()))?;
        fs::rename(&tmp_path, &path)
            .with_context(|| format!("replace progress {}", path.display()))?;
        debug!(app_id, step = step.as_str(), "saved progress");
        Ok(())
    }
}
