//! Base environment provisioning.
//!
//! The engine never hard-codes environment names: anything that can
//! materialize a filesystem from an [`ImageRef`] implements
//! [`Provisionable`], and a registry resolves references by scheme. The
//! engine trusts providers to deliver a working filesystem; it does not
//! inspect their contents.

mod directory;

#[cfg(feature = "remote")]
mod remote;

mod archive;

pub use archive::ArchiveProvisioner;
pub use directory::DirectoryProvisioner;
#[cfg(feature = "remote")]
pub use remote::RemoteProvisioner;

use crate::errors::BuildError;
use crate::pipeline::ImageRef;
use async_trait::async_trait;
use dashmap::DashMap;
use std::path::Path;
use std::sync::Arc;

/// Capability interface for base environment providers.
#[async_trait]
pub trait Provisionable: Send + Sync {
    /// The reference scheme this provider serves (e.g. "dir").
    fn scheme(&self) -> &str;

    /// Materializes the referenced base environment into `dest`.
    ///
    /// # Errors
    ///
    /// Returns `EnvironmentUnavailable` if the reference cannot be
    /// resolved or materialized.
    async fn provision(&self, reference: &ImageRef, dest: &Path) -> Result<(), BuildError>;
}

/// Registry resolving image references to providers by scheme.
#[derive(Default)]
pub struct ProvisionerRegistry {
    providers: DashMap<String, Arc<dyn Provisionable>>,
}

impl ProvisionerRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry with the stock filesystem providers rooted at
    /// `bases_root`.
    #[must_use]
    pub fn with_default_providers(bases_root: impl Into<std::path::PathBuf>) -> Self {
        let bases_root = bases_root.into();
        let registry = Self::new();
        registry.register(Arc::new(DirectoryProvisioner::new(bases_root.clone())));
        registry.register(Arc::new(ArchiveProvisioner::new(bases_root)));
        registry
    }

    /// Registers a provider under its scheme. A later registration for
    /// the same scheme replaces the earlier one.
    pub fn register(&self, provider: Arc<dyn Provisionable>) {
        self.providers
            .insert(provider.scheme().to_string(), provider);
    }

    /// Looks up the provider for a scheme.
    #[must_use]
    pub fn get(&self, scheme: &str) -> Option<Arc<dyn Provisionable>> {
        self.providers.get(scheme).map(|p| p.value().clone())
    }

    /// Resolves and runs the provider for a reference.
    ///
    /// # Errors
    ///
    /// Returns `EnvironmentUnavailable` if no provider serves the scheme
    /// or the provider itself fails.
    pub async fn provision(&self, reference: &ImageRef, dest: &Path) -> Result<(), BuildError> {
        let provider =
            self.get(&reference.scheme)
                .ok_or_else(|| BuildError::EnvironmentUnavailable {
                    reference: reference.to_string(),
                    reason: format!("no provider registered for scheme '{}'", reference.scheme),
                })?;

        provider.provision(reference, dest).await
    }
}

impl std::fmt::Debug for ProvisionerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let schemes: Vec<String> = self.providers.iter().map(|e| e.key().clone()).collect();
        f.debug_struct("ProvisionerRegistry")
            .field("schemes", &schemes)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unknown_scheme_is_environment_unavailable() {
        let registry = ProvisionerRegistry::new();
        let reference = ImageRef::parse("oci://ubuntu:latest").unwrap();
        let dest = tempfile::tempdir().unwrap();

        let err = registry
            .provision(&reference, dest.path())
            .await
            .unwrap_err();
        assert!(matches!(err, BuildError::EnvironmentUnavailable { .. }));
    }

    #[tokio::test]
    async fn test_default_providers_cover_dir_and_tar() {
        let bases = tempfile::tempdir().unwrap();
        let registry = ProvisionerRegistry::with_default_providers(bases.path());

        assert!(registry.get("dir").is_some());
        assert!(registry.get("tar").is_some());
        assert!(registry.get("oci").is_none());
    }
}
