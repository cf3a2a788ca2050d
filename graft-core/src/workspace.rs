use std::fs::File;
use std::path::{Path, PathBuf};

use log::debug;
use miette::Diagnostic;
use tempfile::TempDir;
use thiserror::Error;

use crate::paths;

#[derive(Debug, Error, Diagnostic)]
#[error("workspace error: {message}")]
#[diagnostic(code(graft::workspace))]
pub struct WorkspaceError {
    pub message: String,
}

/// Ephemeral per-run directory holding the generated IR artifacts.
///
/// Exactly one workspace exists per pipeline run and no other run touches
/// it; concurrent runs (one per translation unit, spawned by the build
/// system) each get an independently named directory. The directory is
/// removed when the workspace is dropped, whichever stage the run died in,
/// unless it was created with `retain` for inspection.
pub struct Workspace {
    root: PathBuf,
    // None when the directory is intentionally leaked.
    _dir: Option<TempDir>,
}

impl Workspace {
    pub fn create(retain: bool) -> Result<Self, WorkspaceError> {
        let dir = tempfile::Builder::new()
            .prefix("graft")
            .tempdir()
            .map_err(|err| WorkspaceError {
                message: format!("failed to create temp dir: {err}"),
            })?;
        debug!("created workspace {}", dir.path().display());

        if retain {
            let root = dir.into_path();
            debug!("retaining workspace {} for inspection", root.display());
            Ok(Workspace { root, _dir: None })
        } else {
            Ok(Workspace {
                root: dir.path().to_path_buf(),
                _dir: Some(dir),
            })
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Creates an empty file in the workspace and returns its absolute path.
    pub fn create_file(&self, name: &str) -> Result<String, WorkspaceError> {
        let path = self.root.join(name);
        File::create(&path).map_err(|err| WorkspaceError {
            message: format!("failed to create {}: {err}", path.display()),
        })?;
        let absolute =
            paths::expand_path(&path.to_string_lossy(), true).map_err(|err| WorkspaceError {
                message: err.to_string(),
            })?;
        Ok(absolute.to_string_lossy().into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn removes_directory_on_drop() {
        let root;
        {
            let ws = Workspace::create(false).unwrap();
            root = ws.root().to_path_buf();
            assert!(root.is_dir());
            ws.create_file("unit.bc").unwrap();
        }
        assert!(!root.exists());
    }

    #[test]
    fn retained_directory_survives_drop() {
        let root;
        {
            let ws = Workspace::create(true).unwrap();
            root = ws.root().to_path_buf();
        }
        assert!(root.is_dir());
        std::fs::remove_dir_all(&root).unwrap();
    }

    #[test]
    fn create_file_returns_an_absolute_path() {
        let ws = Workspace::create(false).unwrap();
        let path = ws.create_file("unit.bc").unwrap();
        assert!(Path::new(&path).is_absolute());
        assert!(Path::new(&path).exists());
    }
}
