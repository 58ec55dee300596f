use serde::Serialize;
use std::fs;
use std::io::ErrorKind;
use std::path::Path;

/// What happened to the local artifact at the end of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "error", rename_all = "snake_case")]
pub enum CleanupOutcome {
    Removed,
    NotPresent,
    Failed(String),
}

/// Delete the local artifact if it exists.
///
/// Never fails the run. A removal error is logged and reported.
pub fn remove_artifact(path: &Path) -> CleanupOutcome {
    match fs::remove_file(path) {
        Ok(()) => {
            log_status!("cleanup", "Removed {}", path.display());
            CleanupOutcome::Removed
        }
        Err(e) if e.kind() == ErrorKind::NotFound => CleanupOutcome::NotPresent,
        Err(e) => {
            log_warn!("cleanup", "could not remove {}: {}", path.display(), e);
            CleanupOutcome::Failed(e.to_string())
        }
    }
}
