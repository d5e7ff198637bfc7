//! Directory snapshots sent to the oracle with code-change requests.

use std::path::Path;

use anyhow::{Context, Result};
use walkdir::{DirEntry, WalkDir};

const SKIPPED_DIRS: [&str; 2] = ["target", "node_modules"];

/// List files and directories under `root`, one relative path per line.
///
/// Hidden entries and build output directories are skipped. Listing stops
/// after `max_entries` lines and a marker line is appended.
pub fn directory_tree(root: &Path, max_entries: usize) -> Result<String> {
    let mut lines = Vec::new();
    let walker = WalkDir::new(root)
        .min_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| !is_skipped(entry));

    for entry in walker {
        let entry = entry.with_context(|| format!("walk {}", root.display()))?;
        if lines.len() >= max_entries {
            lines.push(format!("... (listing truncated at {max_entries} entries)"));
            break;
        }
        let rel = entry.path().strip_prefix(root).unwrap_or(entry.path());
        if entry.file_type().is_dir() {
            lines.push(format!("{}/", rel.display()));
        } else {
            lines.push(rel.display().to_string());
        }
    }
    Ok(lines.join("\n"))
}

// `filter_entry` also sees the root, which may itself be hidden (temp dirs are).
fn is_skipped(entry: &DirEntry) -> bool {
    if entry.depth() == 0 {
        return false;
    }
    let name = entry.file_name().to_string_lossy();
    name.starts_with('.')
        || (entry.file_type().is_dir() && SKIPPED_DIRS.contains(&name.as_ref()))
}
