//! The final deliverable image.
//!
//! The terminal stage's snapshot, plus its declared working directory
//! and default command, is the output of a pipeline run. The image hosts
//! artifacts; its default command is diagnostic introspection, not a
//! service entry point, and the engine records it without spawning it.

use crate::context::ScratchRoot;
use crate::snapshot::StageSnapshot;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// One file in the image manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageEntry {
    /// Path relative to the image root.
    pub path: PathBuf,
    /// Size in bytes.
    pub size_bytes: u64,
}

/// The filesystem produced by the terminal stage.
///
/// Holds the run's scratch root alive, so the image stays readable for
/// as long as the value exists even when the scratch is a temp
/// directory.
#[derive(Debug, Clone)]
pub struct OutputImage {
    stage: String,
    root: PathBuf,
    workdir: PathBuf,
    default_command: Option<Vec<String>>,
    _scratch: ScratchRoot,
}

impl OutputImage {
    /// Builds the image view over a terminal stage's snapshot.
    #[must_use]
    pub fn from_snapshot(snapshot: &StageSnapshot, scratch: ScratchRoot) -> Self {
        Self {
            stage: snapshot.stage().to_string(),
            root: snapshot.root().to_path_buf(),
            workdir: snapshot.workdir().to_path_buf(),
            default_command: snapshot.default_command().map(<[String]>::to_vec),
            _scratch: scratch,
        }
    }

    /// Returns the stage the image came from.
    #[must_use]
    pub fn stage(&self) -> &str {
        &self.stage
    }

    /// Returns the image filesystem root on the host.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Returns the declared working directory, relative to the root.
    #[must_use]
    pub fn workdir(&self) -> &Path {
        &self.workdir
    }

    /// Returns the declared default command, if any.
    #[must_use]
    pub fn default_command(&self) -> Option<&[String]> {
        self.default_command.as_deref()
    }

    /// Returns true if a file exists at the path relative to the image
    /// root.
    #[must_use]
    pub fn contains(&self, path: impl AsRef<Path>) -> bool {
        self.root.join(path.as_ref()).is_file()
    }

    /// Lists every file in the image, sorted, with sizes.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the tree cannot be walked.
    pub fn manifest(&self) -> std::io::Result<Vec<ImageEntry>> {
        self.list_dir(&self.root)
    }

    /// Lists the files under the declared working directory - what the
    /// diagnostic default command would show.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the tree cannot be walked.
    pub fn workdir_listing(&self) -> std::io::Result<Vec<ImageEntry>> {
        let dir = self.root.join(&self.workdir);
        if !dir.is_dir() {
            return Ok(Vec::new());
        }
        self.list_dir(&dir)
    }

    fn list_dir(&self, dir: &Path) -> std::io::Result<Vec<ImageEntry>> {
        let mut entries = Vec::new();

        for entry in WalkDir::new(dir).follow_links(false) {
            let entry = entry.map_err(std::io::Error::other)?;
            if !entry.file_type().is_file() {
                continue;
            }
            let rel = entry
                .path()
                .strip_prefix(dir)
                .map_err(std::io::Error::other)?;
            entries.push(ImageEntry {
                path: rel.to_path_buf(),
                size_bytes: entry.metadata().map_err(std::io::Error::other)?.len(),
            });
        }

        entries.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::StageWorkspace;
    use pretty_assertions::assert_eq;

    fn image_with_artifact() -> (tempfile::TempDir, OutputImage) {
        let dir = tempfile::tempdir().unwrap();
        let mut ws = StageWorkspace::create("assembler", dir.path()).unwrap();
        ws.set_workdir("/opt/engine").unwrap();
        ws.set_default_command(vec!["ls".into(), "-lah".into(), "/opt/engine".into()]);

        let lib = ws.resolve("libengine.so").unwrap();
        std::fs::create_dir_all(lib.parent().unwrap()).unwrap();
        std::fs::write(&lib, b"shared-object-bytes").unwrap();

        let snapshot = ws.seal();
        let scratch = ScratchRoot::External(dir.path().to_path_buf());
        let image = OutputImage::from_snapshot(&snapshot, scratch);
        (dir, image)
    }

    #[test]
    fn test_image_reflects_snapshot() {
        let (_dir, image) = image_with_artifact();
        assert_eq!(image.stage(), "assembler");
        assert_eq!(image.workdir(), Path::new("opt/engine"));
        assert_eq!(
            image.default_command(),
            Some(&["ls".to_string(), "-lah".to_string(), "/opt/engine".to_string()][..])
        );
        assert!(image.contains("opt/engine/libengine.so"));
    }

    #[test]
    fn test_workdir_listing_shows_exactly_the_artifact() {
        let (_dir, image) = image_with_artifact();
        let listing = image.workdir_listing().unwrap();

        assert_eq!(listing.len(), 1);
        assert_eq!(listing[0].path, PathBuf::from("libengine.so"));
        assert!(listing[0].size_bytes > 0);
    }

    #[test]
    fn test_manifest_is_sorted() {
        let (_dir, image) = image_with_artifact();
        std::fs::write(image.root().join("aaa-first"), b"x").unwrap();

        let manifest = image.manifest().unwrap();
        assert_eq!(manifest[0].path, PathBuf::from("aaa-first"));
        assert_eq!(manifest.len(), 2);
    }
}
