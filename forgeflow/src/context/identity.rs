//! Run identity for tracking pipeline invocations.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifies a single pipeline invocation.
///
/// Independent invocations are fully isolated; the identity is what ties
/// a run's events, scratch directories, and report together.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunIdentity {
    /// The unique ID for this run.
    pub run_id: Uuid,

    /// When the run was created (ISO 8601).
    pub started_at: String,

    /// Source revision being built, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub commit: Option<String>,

    /// Who or what started the run (user, CI job id).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub initiator: Option<String>,
}

impl Default for RunIdentity {
    fn default() -> Self {
        Self::new()
    }
}

impl RunIdentity {
    /// Creates a new run identity with a generated run ID.
    #[must_use]
    pub fn new() -> Self {
        Self {
            run_id: crate::utils::generate_uuid(),
            started_at: crate::utils::iso_timestamp(),
            commit: None,
            initiator: None,
        }
    }

    /// Creates a run identity with a specific run ID.
    #[must_use]
    pub fn with_run_id(run_id: Uuid) -> Self {
        Self {
            run_id,
            ..Self::new()
        }
    }

    /// Sets the source commit.
    #[must_use]
    pub fn with_commit(mut self, commit: impl Into<String>) -> Self {
        self.commit = Some(commit.into());
        self
    }

    /// Sets the initiator.
    #[must_use]
    pub fn with_initiator(mut self, initiator: impl Into<String>) -> Self {
        self.initiator = Some(initiator.into());
        self
    }

    /// Returns the first 8 hex characters of the run ID, for scratch
    /// directory names and log prefixes.
    #[must_use]
    pub fn short(&self) -> String {
        self.run_id.simple().to_string()[..8].to_string()
    }
}
