//! Remote tarball base environment provider.
//!
//! Network-bound and potentially slow on a cold cache; enabled via the
//! `remote` cargo feature.

use super::Provisionable;
use crate::errors::BuildError;
use crate::pipeline::ImageRef;
use async_trait::async_trait;
use flate2::read::GzDecoder;
use std::path::Path;
use tracing::debug;

/// Provisions `https://<host>/<path>` references by fetching a gzipped
/// tarball and unpacking it.
#[derive(Debug, Clone, Default)]
pub struct RemoteProvisioner {
    client: reqwest::Client,
}

impl RemoteProvisioner {
    /// Creates a provider with a default HTTP client.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a provider with a custom HTTP client.
    #[must_use]
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Provisionable for RemoteProvisioner {
    fn scheme(&self) -> &str {
        "https"
    }

    async fn provision(&self, reference: &ImageRef, dest: &Path) -> Result<(), BuildError> {
        let url = reference.to_string();

        let response = self.client.get(&url).send().await.map_err(|err| {
            BuildError::EnvironmentUnavailable {
                reference: url.clone(),
                reason: format!("fetch failed: {err}"),
            }
        })?;

        let response =
            response
                .error_for_status()
                .map_err(|err| BuildError::EnvironmentUnavailable {
                    reference: url.clone(),
                    reason: format!("fetch failed: {err}"),
                })?;

        let bytes = response
            .bytes()
            .await
            .map_err(|err| BuildError::EnvironmentUnavailable {
                reference: url.clone(),
                reason: format!("read failed: {err}"),
            })?;

        let mut archive = tar::Archive::new(GzDecoder::new(bytes.as_ref()));
        archive
            .unpack(dest)
            .map_err(|err| BuildError::EnvironmentUnavailable {
                reference: url.clone(),
                reason: format!("failed to unpack fetched archive: {err}"),
            })?;

        debug!(base = %url, bytes = bytes.len(), "Provisioned base environment from remote archive");
        Ok(())
    }
}
