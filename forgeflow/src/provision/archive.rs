//! Gzipped-tarball base environment provider.

use super::Provisionable;
use crate::errors::BuildError;
use crate::pipeline::ImageRef;
use async_trait::async_trait;
use flate2::read::GzDecoder;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Provisions `tar://<path>` references by unpacking a gzipped tarball.
///
/// Relative locators resolve under the configured bases root; absolute
/// locators are used as-is. This is how versioned base environments are
/// shipped around in practice.
#[derive(Debug, Clone)]
pub struct ArchiveProvisioner {
    bases_root: PathBuf,
}

impl ArchiveProvisioner {
    /// Creates a provider over the given bases root.
    #[must_use]
    pub fn new(bases_root: impl Into<PathBuf>) -> Self {
        Self {
            bases_root: bases_root.into(),
        }
    }

    fn locate(&self, reference: &ImageRef) -> PathBuf {
        let locator = Path::new(&reference.locator);
        if locator.is_absolute() {
            locator.to_path_buf()
        } else {
            self.bases_root.join(locator)
        }
    }
}

#[async_trait]
impl Provisionable for ArchiveProvisioner {
    fn scheme(&self) -> &str {
        "tar"
    }

    async fn provision(&self, reference: &ImageRef, dest: &Path) -> Result<(), BuildError> {
        let archive_path = self.locate(reference);

        let file = std::fs::File::open(&archive_path).map_err(|err| {
            BuildError::EnvironmentUnavailable {
                reference: reference.to_string(),
                reason: format!("cannot open '{}': {err}", archive_path.display()),
            }
        })?;

        let mut archive = tar::Archive::new(GzDecoder::new(file));
        archive
            .unpack(dest)
            .map_err(|err| BuildError::EnvironmentUnavailable {
                reference: reference.to_string(),
                reason: format!("failed to unpack '{}': {err}", archive_path.display()),
            })?;

        debug!(base = %reference, "Provisioned base environment from archive");
        Ok(())
    }
}
