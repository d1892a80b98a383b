/// cgroup v1 parent groups used by nsjail
///
/// nsjail creates one child group per run under a fixed parent in the
/// `memory` and `pids` hierarchies, but does not create the parent itself.
/// Both parents are created here once, before the first execution.
use crate::config::profile::CgroupLayout;
use crate::config::types::{Result, SnekboxError};
use std::fs;
use std::path::PathBuf;

/// Parent directories that do not exist yet.
pub fn missing_cgroup_parents(layout: &CgroupLayout) -> Vec<PathBuf> {
    layout
        .parent_dirs()
        .into_iter()
        .filter(|dir| !dir.is_dir())
        .collect()
}

/// Create the parent groups. Idempotent; returns the directories created
/// by this call.
pub fn prepare_cgroup_parents(layout: &CgroupLayout) -> Result<Vec<PathBuf>> {
    let mut created = Vec::new();
    let mut creation_errors = Vec::new();

    for dir in missing_cgroup_parents(layout) {
        match fs::create_dir_all(&dir) {
            Ok(()) => {
                log::info!("Created cgroup parent {}", dir.display());
                created.push(dir);
            }
            Err(e) => creation_errors.push(format!("{}: {}", dir.display(), e)),
        }
    }

    if !creation_errors.is_empty() {
        return Err(SnekboxError::Filesystem(format!(
            "Failed to create cgroup parents: {}",
            creation_errors.join("; ")
        )));
    }

    Ok(created)
}
