//! Test fixtures for pipeline testing.

use crate::context::{BuildContext, RunIdentity};
use crate::events::CollectingEventSink;
use crate::provision::ProvisionerRegistry;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// A temporary bases root with named template environments.
#[derive(Debug)]
pub struct TestBases {
    root: tempfile::TempDir,
}

impl TestBases {
    /// Creates an empty bases root.
    ///
    /// # Panics
    ///
    /// Panics if the temp directory cannot be created (test-only code).
    #[must_use]
    pub fn new() -> Self {
        Self {
            root: tempfile::tempdir().expect("create bases root"),
        }
    }

    /// Adds a template environment with the given files.
    ///
    /// # Panics
    ///
    /// Panics on I/O errors (test-only code).
    pub fn add_base(&self, name: &str, files: &[(&str, &[u8])]) {
        let base = self.root.path().join(name);
        for (path, contents) in files {
            let target = base.join(path);
            if let Some(parent) = target.parent() {
                std::fs::create_dir_all(parent).expect("create base dirs");
            }
            std::fs::write(target, contents).expect("write base file");
        }
        std::fs::create_dir_all(&base).expect("create base root");
    }

    /// Returns the bases root path.
    #[must_use]
    pub fn path(&self) -> &Path {
        self.root.path()
    }

    /// Builds a registry with the stock providers over this root.
    #[must_use]
    pub fn registry(&self) -> Arc<ProvisionerRegistry> {
        Arc::new(ProvisionerRegistry::with_default_providers(self.path()))
    }
}

impl Default for TestBases {
    fn default() -> Self {
        Self::new()
    }
}

/// A temporary host project: a manifest, an optional lockfile, and a
/// source tree.
#[derive(Debug)]
pub struct TestProject {
    root: tempfile::TempDir,
}

impl TestProject {
    /// Creates a project with a manifest and one source file, no
    /// lockfile.
    ///
    /// # Panics
    ///
    /// Panics on I/O errors (test-only code).
    #[must_use]
    pub fn new() -> Self {
        let root = tempfile::tempdir().expect("create project root");
        std::fs::write(root.path().join("manifest.toml"), b"[deps]\n").expect("write manifest");
        std::fs::create_dir_all(root.path().join("src")).expect("create src");
        std::fs::write(root.path().join("src/lib.c"), b"int engine(void);\n")
            .expect("write source");
        Self { root }
    }

    /// Returns the manifest path.
    #[must_use]
    pub fn manifest(&self) -> PathBuf {
        self.root.path().join("manifest.toml")
    }

    /// Returns the (possibly absent) lockfile path.
    #[must_use]
    pub fn lockfile(&self) -> PathBuf {
        self.root.path().join("manifest.lock")
    }

    /// Returns the source tree path.
    #[must_use]
    pub fn src(&self) -> PathBuf {
        self.root.path().join("src")
    }

    /// Overwrites the manifest.
    ///
    /// # Panics
    ///
    /// Panics on I/O errors (test-only code).
    pub fn set_manifest(&self, contents: &[u8]) {
        std::fs::write(self.manifest(), contents).expect("write manifest");
    }

    /// Overwrites a source file.
    ///
    /// # Panics
    ///
    /// Panics on I/O errors (test-only code).
    pub fn set_source(&self, name: &str, contents: &[u8]) {
        std::fs::write(self.src().join(name), contents).expect("write source");
    }
}

impl Default for TestProject {
    fn default() -> Self {
        Self::new()
    }
}

/// A build context wired to a collecting sink, for event assertions.
#[derive(Debug)]
pub struct TestHarness {
    /// The collecting sink receiving the run's events.
    pub sink: Arc<CollectingEventSink>,
    /// The build context.
    pub ctx: BuildContext,
}

impl TestHarness {
    /// Creates a harness with a fresh run identity.
    ///
    /// # Panics
    ///
    /// Panics if the scratch directory cannot be created (test-only
    /// code).
    #[must_use]
    pub fn new() -> Self {
        let sink = Arc::new(CollectingEventSink::new());
        let ctx = BuildContext::new(RunIdentity::new())
            .expect("create build context")
            .with_event_sink(sink.clone());
        Self { sink, ctx }
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bases_fixture_registers_providers() {
        let bases = TestBases::new();
        bases.add_base("toolchain", &[("usr/bin/cc", b"#!".as_slice())]);

        assert!(bases.path().join("toolchain/usr/bin/cc").is_file());
        assert!(bases.registry().get("dir").is_some());
    }

    #[test]
    fn test_project_fixture_shape() {
        let project = TestProject::new();
        assert!(project.manifest().is_file());
        assert!(project.src().is_dir());
        assert!(!project.lockfile().exists());
    }

    #[test]
    fn test_harness_collects_events() {
        let harness = TestHarness::new();
        harness
            .ctx
            .emit(crate::core::BuildEvent::pipeline_started("engine"));
        assert_eq!(harness.sink.len(), 1);
    }
}
