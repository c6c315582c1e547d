//! Artifact transfer between stages.
//!
//! Transfer is the only mechanism by which data crosses a stage
//! boundary: a single named file, copied from a sealed snapshot into a
//! destination workspace. Nothing else - no tooling, no intermediate
//! objects, no cache - ever crosses. This is what keeps the final image
//! free of the builder's toolchain.

use crate::core::Artifact;
use crate::errors::BuildError;
use crate::snapshot::{StageSnapshot, StageWorkspace};
use crate::utils::copy_file_into;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

/// Registry of sealed snapshots, keyed by stage name.
///
/// Only the orchestrator inserts; a lookup for a stage that has not
/// sealed yet is an ordering violation.
#[derive(Debug, Default)]
pub struct SnapshotStore {
    snapshots: HashMap<String, Arc<StageSnapshot>>,
}

impl SnapshotStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a sealed snapshot.
    pub fn insert(&mut self, snapshot: Arc<StageSnapshot>) {
        self.snapshots
            .insert(snapshot.stage().to_string(), snapshot);
    }

    /// Looks up a sealed snapshot.
    ///
    /// # Errors
    ///
    /// Returns `StageNotYetBuilt` if the stage has not sealed.
    pub fn get(&self, stage: &str) -> Result<&Arc<StageSnapshot>, BuildError> {
        self.snapshots
            .get(stage)
            .ok_or_else(|| BuildError::StageNotYetBuilt {
                stage: stage.to_string(),
            })
    }

    /// Returns the number of sealed snapshots.
    #[must_use]
    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    /// Returns true if no snapshot has sealed yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }
}

/// Copies one named artifact from a sealed snapshot into a destination
/// workspace.
///
/// If `dest_path` resolves to an existing directory the artifact keeps
/// its file name inside it; otherwise `dest_path` names the target file.
///
/// # Errors
///
/// - `ArtifactMissing` if `source_path` is not a file in the snapshot.
/// - `Validation` if either path escapes its root.
/// - `Io` if the copy itself fails.
pub fn transfer(
    source: &StageSnapshot,
    source_path: impl AsRef<Path>,
    dest: &StageWorkspace,
    dest_path: impl AsRef<Path>,
) -> Result<Artifact, BuildError> {
    let artifact = source.artifact(source_path.as_ref())?;

    let source_host = source
        .resolve(source_path.as_ref())
        .map_err(BuildError::Validation)?;
    let dest_host = dest
        .resolve(dest_path.as_ref())
        .map_err(BuildError::Validation)?;

    copy_file_into(&source_host, &dest_host)?;

    Ok(artifact)
}
