//! Mock provisioners for testing.

use crate::errors::BuildError;
use crate::pipeline::ImageRef;
use crate::provision::Provisionable;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::path::{Path, PathBuf};

/// A provisioner that records calls and writes a fixed set of files.
#[derive(Debug)]
pub struct MockProvisioner {
    scheme: String,
    files: Vec<(PathBuf, Vec<u8>)>,
    calls: Mutex<Vec<String>>,
}

impl MockProvisioner {
    /// Creates a mock serving the given scheme.
    #[must_use]
    pub fn new(scheme: impl Into<String>) -> Self {
        Self {
            scheme: scheme.into(),
            files: Vec::new(),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Adds a file the mock will materialize on provision.
    #[must_use]
    pub fn with_file(mut self, path: impl Into<PathBuf>, contents: &[u8]) -> Self {
        self.files.push((path.into(), contents.to_vec()));
        self
    }

    /// Returns the references provisioned so far.
    #[must_use]
    pub fn provisioned(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    /// Returns the number of provision calls.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }
}

#[async_trait]
impl Provisionable for MockProvisioner {
    fn scheme(&self) -> &str {
        &self.scheme
    }

    async fn provision(&self, reference: &ImageRef, dest: &Path) -> Result<(), BuildError> {
        self.calls.lock().push(reference.to_string());

        for (path, contents) in &self.files {
            let target = dest.join(path);
            if let Some(parent) = target.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(target, contents)?;
        }

        Ok(())
    }
}

/// A provisioner that always fails with `EnvironmentUnavailable`.
#[derive(Debug)]
pub struct FailingProvisioner {
    scheme: String,
    reason: String,
}

impl FailingProvisioner {
    /// Creates a failing provisioner for a scheme.
    #[must_use]
    pub fn new(scheme: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            scheme: scheme.into(),
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl Provisionable for FailingProvisioner {
    fn scheme(&self) -> &str {
        &self.scheme
    }

    async fn provision(&self, reference: &ImageRef, _dest: &Path) -> Result<(), BuildError> {
        Err(BuildError::EnvironmentUnavailable {
            reference: reference.to_string(),
            reason: self.reason.clone(),
        })
    }
}
