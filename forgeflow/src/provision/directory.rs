//! Directory-template base environment provider.

use super::Provisionable;
use crate::errors::BuildError;
use crate::pipeline::ImageRef;
use crate::utils::copy_tree;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Provisions `dir://<name>` references by copying a template directory
/// from a configured bases root.
///
/// This is the workhorse provider for local development and tests: a
/// "base image" is simply a directory tree whose name is the locator.
#[derive(Debug, Clone)]
pub struct DirectoryProvisioner {
    bases_root: PathBuf,
}

impl DirectoryProvisioner {
    /// Creates a provider over the given bases root.
    #[must_use]
    pub fn new(bases_root: impl Into<PathBuf>) -> Self {
        Self {
            bases_root: bases_root.into(),
        }
    }

    /// Returns the bases root.
    #[must_use]
    pub fn bases_root(&self) -> &Path {
        &self.bases_root
    }
}

#[async_trait]
impl Provisionable for DirectoryProvisioner {
    fn scheme(&self) -> &str {
        "dir"
    }

    async fn provision(&self, reference: &ImageRef, dest: &Path) -> Result<(), BuildError> {
        let template = self.bases_root.join(&reference.locator);

        if !template.is_dir() {
            return Err(BuildError::EnvironmentUnavailable {
                reference: reference.to_string(),
                reason: format!("template directory '{}' not found", template.display()),
            });
        }

        let files = copy_tree(&template, dest).map_err(|err| BuildError::EnvironmentUnavailable {
            reference: reference.to_string(),
            reason: format!("failed to copy template: {err}"),
        })?;

        debug!(
            base = %reference,
            files,
            "Provisioned base environment from template"
        );
        Ok(())
    }
}
