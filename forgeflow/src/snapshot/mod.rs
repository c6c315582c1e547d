//! Stage filesystems: mutable workspaces and sealed snapshots.
//!
//! A stage builds inside a [`StageWorkspace`]; sealing converts it into a
//! [`StageSnapshot`], the immutable form later stages may read artifacts
//! from. The type split is what enforces the ordering contract: transfer
//! only accepts snapshots, and snapshots only exist for completed stages.

use crate::core::Artifact;
use crate::errors::{BuildError, PipelineValidationError};
use crate::utils::fsops::normalize_image_path;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// The mutable filesystem of a stage that is currently executing.
#[derive(Debug)]
pub struct StageWorkspace {
    stage: String,
    root: PathBuf,
    workdir: PathBuf,
    default_command: Option<Vec<String>>,
}

impl StageWorkspace {
    /// Creates a workspace under `stage_root`, with the stage filesystem
    /// at `<stage_root>/fs`.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the directories cannot be created.
    pub fn create(stage: impl Into<String>, stage_root: &Path) -> std::io::Result<Self> {
        let root = stage_root.join("fs");
        std::fs::create_dir_all(&root)?;

        Ok(Self {
            stage: stage.into(),
            root,
            workdir: PathBuf::new(),
            default_command: None,
        })
    }

    /// Returns the stage name.
    #[must_use]
    pub fn stage(&self) -> &str {
        &self.stage
    }

    /// Returns the filesystem root.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Returns the current working directory, relative to the root.
    #[must_use]
    pub fn workdir(&self) -> &Path {
        &self.workdir
    }

    /// Returns the working directory as a host path, creating it if
    /// needed.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the directory cannot be created.
    pub fn workdir_host(&self) -> std::io::Result<PathBuf> {
        let path = self.root.join(&self.workdir);
        std::fs::create_dir_all(&path)?;
        Ok(path)
    }

    /// Re-roots the working directory for subsequent steps.
    ///
    /// # Errors
    ///
    /// Returns a validation error if the path escapes the root.
    pub fn set_workdir(&mut self, path: impl AsRef<Path>) -> Result<(), PipelineValidationError> {
        self.workdir = normalize_image_path(path.as_ref())?;
        Ok(())
    }

    /// Declares the image's default command.
    pub fn set_default_command(&mut self, argv: Vec<String>) {
        self.default_command = Some(argv);
    }

    /// Resolves an image-internal path to a host path under the root.
    ///
    /// Absolute paths resolve against the image root; relative paths
    /// resolve against the current working directory.
    ///
    /// # Errors
    ///
    /// Returns a validation error if the path escapes the root.
    pub fn resolve(&self, path: impl AsRef<Path>) -> Result<PathBuf, PipelineValidationError> {
        let path = path.as_ref();
        let normalized = normalize_image_path(path)?;
        if path.is_absolute() {
            Ok(self.root.join(normalized))
        } else {
            Ok(self.root.join(&self.workdir).join(normalized))
        }
    }

    /// Seals the workspace into an immutable snapshot.
    #[must_use]
    pub fn seal(self) -> StageSnapshot {
        StageSnapshot {
            stage: self.stage,
            root: self.root,
            workdir: self.workdir,
            default_command: self.default_command,
            sealed_at: crate::utils::iso_timestamp(),
        }
    }
}

/// The immutable filesystem of a completed stage.
///
/// Only sealed snapshots can act as artifact sources; nothing else from
/// the stage is reachable once it completes.
#[derive(Debug, Clone)]
pub struct StageSnapshot {
    stage: String,
    root: PathBuf,
    workdir: PathBuf,
    default_command: Option<Vec<String>>,
    sealed_at: String,
}

impl StageSnapshot {
    /// Returns the stage name.
    #[must_use]
    pub fn stage(&self) -> &str {
        &self.stage
    }

    /// Returns the filesystem root.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Returns the working directory the stage ended with.
    #[must_use]
    pub fn workdir(&self) -> &Path {
        &self.workdir
    }

    /// Returns the declared default command, if any.
    #[must_use]
    pub fn default_command(&self) -> Option<&[String]> {
        self.default_command.as_deref()
    }

    /// Returns when the snapshot was sealed (ISO 8601).
    #[must_use]
    pub fn sealed_at(&self) -> &str {
        &self.sealed_at
    }

    /// Resolves an image-internal path to a host path under the root.
    ///
    /// # Errors
    ///
    /// Returns a validation error if the path escapes the root.
    pub fn resolve(&self, path: impl AsRef<Path>) -> Result<PathBuf, PipelineValidationError> {
        let path = path.as_ref();
        let normalized = normalize_image_path(path)?;
        if path.is_absolute() {
            Ok(self.root.join(normalized))
        } else {
            Ok(self.root.join(&self.workdir).join(normalized))
        }
    }

    /// Returns true if a file exists at the image-internal path.
    #[must_use]
    pub fn contains(&self, path: impl AsRef<Path>) -> bool {
        self.resolve(path).map(|p| p.is_file()).unwrap_or(false)
    }

    /// Describes the file at the image-internal path as an artifact.
    ///
    /// # Errors
    ///
    /// Returns `ArtifactMissing` if no file exists there.
    pub fn artifact(&self, path: impl AsRef<Path>) -> Result<Artifact, BuildError> {
        let path = path.as_ref();
        let host = self.resolve(path).map_err(BuildError::Validation)?;

        if !host.is_file() {
            return Err(BuildError::ArtifactMissing {
                stage: self.stage.clone(),
                path: path.to_path_buf(),
            });
        }

        Artifact::describe(&host, path, &self.stage).map_err(BuildError::Io)
    }

    /// Lists every regular file in the snapshot, relative to the root,
    /// sorted.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the tree cannot be walked.
    pub fn entries(&self) -> std::io::Result<Vec<PathBuf>> {
        let mut entries = Vec::new();

        for entry in WalkDir::new(&self.root).follow_links(false) {
            let entry = entry.map_err(std::io::Error::other)?;
            if entry.file_type().is_file() {
                let rel = entry
                    .path()
                    .strip_prefix(&self.root)
                    .map_err(std::io::Error::other)?;
                entries.push(rel.to_path_buf());
            }
        }

        entries.sort();
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn workspace() -> (tempfile::TempDir, StageWorkspace) {
        let dir = tempfile::tempdir().unwrap();
        let ws = StageWorkspace::create("builder", dir.path()).unwrap();
        (dir, ws)
    }

    #[test]
    fn test_create_makes_fs_root() {
        let (_dir, ws) = workspace();
        assert!(ws.root().is_dir());
        assert!(ws.root().ends_with("fs"));
    }

    #[test]
    fn test_resolve_relative_uses_workdir() {
        let (_dir, mut ws) = workspace();
        ws.set_workdir("/build").unwrap();

        let resolved = ws.resolve("src/lib.rs").unwrap();
        assert_eq!(resolved, ws.root().join("build/src/lib.rs"));
    }

    #[test]
    fn test_resolve_absolute_ignores_workdir() {
        let (_dir, mut ws) = workspace();
        ws.set_workdir("/build").unwrap();

        let resolved = ws.resolve("/opt/engine/lib.so").unwrap();
        assert_eq!(resolved, ws.root().join("opt/engine/lib.so"));
    }

    #[test]
    fn test_resolve_rejects_escape() {
        let (_dir, ws) = workspace();
        assert!(ws.resolve("../outside").is_err());
    }

    #[test]
    fn test_seal_then_artifact() {
        let (_dir, mut ws) = workspace();
        ws.set_workdir("/out").unwrap();
        let host = ws.resolve("libengine.so").unwrap();
        std::fs::create_dir_all(host.parent().unwrap()).unwrap();
        std::fs::write(&host, b"binary").unwrap();

        let snapshot = ws.seal();
        assert!(snapshot.contains("libengine.so"));
        assert!(snapshot.contains("/out/libengine.so"));

        let artifact = snapshot.artifact("libengine.so").unwrap();
        assert_eq!(artifact.from_stage, "builder");
        assert_eq!(artifact.size_bytes, 6);
    }

    #[test]
    fn test_artifact_missing() {
        let (_dir, ws) = workspace();
        let snapshot = ws.seal();

        let err = snapshot.artifact("/nope.so").unwrap_err();
        assert!(matches!(err, BuildError::ArtifactMissing { .. }));
    }

    #[test]
    fn test_entries_sorted_relative() {
        let (_dir, ws) = workspace();
        std::fs::create_dir_all(ws.root().join("b")).unwrap();
        std::fs::write(ws.root().join("b/two"), b"2").unwrap();
        std::fs::write(ws.root().join("a-one"), b"1").unwrap();

        let snapshot = ws.seal();
        let entries = snapshot.entries().unwrap();
        assert_eq!(entries, vec![PathBuf::from("a-one"), PathBuf::from("b/two")]);
    }
}
