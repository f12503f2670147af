//! Target directory inspection

use crate::backup::existing_artifacts;
use serde::Serialize;
use std::io;
use std::path::Path;

/// Which required artifacts a directory holds
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DirectoryState {
    /// Required artifacts found, by on-disk name
    pub present: Vec<String>,
    /// Required artifacts not found
    pub missing: Vec<String>,
    /// Other `.dll` files in the directory
    pub extra: Vec<String>,
}

impl DirectoryState {
    pub fn is_complete(&self) -> bool {
        self.missing.is_empty()
    }
}

/// Compare the contents of `target_dir` against the `required` file names
pub fn inspect(target_dir: &Path, required: &[String]) -> io::Result<DirectoryState> {
    let mut existing = existing_artifacts(target_dir)?;
    let mut state = DirectoryState::default();

    for name in required {
        match existing.remove(&name.to_lowercase()) {
            Some(path) => state.present.push(
                path.file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| name.clone()),
            ),
            None => state.missing.push(name.clone()),
        }
    }

    state.extra = existing
        .into_iter()
        .filter(|(lower, _)| lower.ends_with(".dll"))
        .filter_map(|(_, path)| path.file_name().map(|n| n.to_string_lossy().into_owned()))
        .collect();
    state.extra.sort();
    Ok(state)
}
