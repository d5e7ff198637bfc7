//! Validation for paths proposed by the oracle.

use std::path::{Component, Path, PathBuf};

use crate::error::DevError;

/// Accept only relative paths that stay inside the project root.
///
/// `.` components are dropped; absolute paths, drive prefixes and `..` are
/// rejected.
pub fn validate_relative_path(raw: &str) -> Result<PathBuf, DevError> {
    let mut clean = PathBuf::new();
    for component in Path::new(raw).components() {
        match component {
            Component::Normal(part) => clean.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(DevError::UnsafePath(raw.to_string()));
            }
        }
    }
    if clean.as_os_str().is_empty() {
        return Err(DevError::UnsafePath(raw.to_string()));
    }
    Ok(clean)
}

/// True if `name` can be used as a single file or directory name.
pub fn is_plain_name(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains(['/', '\\'])
}
