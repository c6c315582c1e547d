//! Stage and pipeline run reports.

use super::{Artifact, PipelineState, StageStatus};
use crate::image::OutputImage;

/// The outcome of executing a single stage.
#[derive(Debug, Clone)]
pub struct StageReport {
    /// The stage name.
    pub stage: String,
    /// Final status of the stage.
    pub status: StageStatus,
    /// Wall-clock duration in milliseconds.
    pub duration_ms: f64,
    /// Number of steps that actually executed.
    pub steps_run: usize,
    /// Number of steps satisfied from the dependency-layer cache.
    pub steps_from_cache: usize,
    /// Whether the stage's dependency layer was a cache hit.
    pub cache_hit: bool,
}

impl StageReport {
    /// Creates a pending report for a named stage.
    #[must_use]
    pub fn pending(stage: impl Into<String>) -> Self {
        Self {
            stage: stage.into(),
            status: StageStatus::Pending,
            duration_ms: 0.0,
            steps_run: 0,
            steps_from_cache: 0,
            cache_hit: false,
        }
    }
}

/// The outcome of a full pipeline invocation.
///
/// Produced only on success; failures surface as [`crate::errors::BuildError`]
/// with the state history still readable from the run's
/// [`crate::pipeline::StateTracker`].
#[derive(Debug)]
pub struct PipelineReport {
    /// The pipeline name.
    pub pipeline: String,
    /// The run identifier.
    pub run_id: String,
    /// Total wall-clock duration in milliseconds.
    pub duration_ms: f64,
    /// Per-stage outcomes, in execution order.
    pub stages: Vec<StageReport>,
    /// The observed state transitions, in order.
    pub transitions: Vec<PipelineState>,
    /// Artifacts that crossed stage boundaries during the run.
    pub artifacts: Vec<Artifact>,
    /// The final deliverable image.
    pub image: Option<OutputImage>,
}

impl PipelineReport {
    /// Returns the report for a named stage, if present.
    #[must_use]
    pub fn stage(&self, name: &str) -> Option<&StageReport> {
        self.stages.iter().find(|s| s.stage == name)
    }

    /// Returns true if every stage sealed successfully.
    #[must_use]
    pub fn all_sealed(&self) -> bool {
        self.stages.iter().all(|s| s.status == StageStatus::Sealed)
    }
}
