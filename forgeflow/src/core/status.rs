//! Stage status, step kind, and pipeline state enums.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The kind of step a stage performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    /// Re-roots the working directory for subsequent steps.
    Workdir,
    /// Copies host inputs into the stage filesystem.
    CopyIn,
    /// Executes a command inside the provisioned environment.
    Run,
    /// Transfers an artifact from an earlier stage's snapshot.
    CopyFrom,
    /// Declares the image's default command.
    DefaultCommand,
}

impl fmt::Display for StepKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Workdir => write!(f, "workdir"),
            Self::CopyIn => write!(f, "copy_in"),
            Self::Run => write!(f, "run"),
            Self::CopyFrom => write!(f, "copy_from"),
            Self::DefaultCommand => write!(f, "default_command"),
        }
    }
}

/// The execution status of a stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    /// Stage is waiting to execute.
    Pending,
    /// Stage is currently executing.
    Running,
    /// Stage completed and its filesystem is sealed.
    Sealed,
    /// Stage failed; the pipeline is terminal.
    Failed,
}

impl Default for StageStatus {
    fn default() -> Self {
        Self::Pending
    }
}

impl fmt::Display for StageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Running => write!(f, "running"),
            Self::Sealed => write!(f, "sealed"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

impl StageStatus {
    /// Returns true if the status represents a terminal state.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Sealed | Self::Failed)
    }
}

/// Observable states of a pipeline invocation.
///
/// A run walks `Start` through per-stage provisioned/copied-in/executed
/// states, records artifact transfers, finalizes the terminal stage, and
/// ends at `Done`. Any failure transitions directly to `Failed`, which is
/// terminal: there is no partial success and no resume.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum PipelineState {
    /// The invocation has begun; nothing is provisioned yet.
    Start,
    /// A stage's base environment has been materialized.
    StageProvisioned {
        /// The stage name.
        stage: String,
    },
    /// A stage has received its host inputs.
    StageCopiedIn {
        /// The stage name.
        stage: String,
    },
    /// A stage's build commands have completed.
    StageExecuted {
        /// The stage name.
        stage: String,
    },
    /// An artifact crossed a stage boundary.
    ArtifactTransferred {
        /// The producing stage.
        from: String,
        /// The consuming stage.
        to: String,
    },
    /// The terminal stage has been finalized into the output image.
    StageFinalized {
        /// The stage name.
        stage: String,
    },
    /// The pipeline completed successfully.
    Done,
    /// The pipeline failed; terminal.
    Failed {
        /// Why the pipeline failed.
        reason: String,
    },
}

impl PipelineState {
    /// Returns true if the state is terminal.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed { .. })
    }

    /// Returns a short label for events and logs.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::StageProvisioned { .. } => "stage_provisioned",
            Self::StageCopiedIn { .. } => "stage_copied_in",
            Self::StageExecuted { .. } => "stage_executed",
            Self::ArtifactTransferred { .. } => "artifact_transferred",
            Self::StageFinalized { .. } => "stage_finalized",
            Self::Done => "done",
            Self::Failed { .. } => "failed",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_kind_display() {
        assert_eq!(StepKind::CopyIn.to_string(), "copy_in");
        assert_eq!(StepKind::Run.to_string(), "run");
        assert_eq!(StepKind::DefaultCommand.to_string(), "default_command");
    }

    #[test]
    fn test_stage_status_terminal() {
        assert!(StageStatus::Sealed.is_terminal());
        assert!(StageStatus::Failed.is_terminal());
        assert!(!StageStatus::Pending.is_terminal());
        assert!(!StageStatus::Running.is_terminal());
    }

    #[test]
    fn test_pipeline_state_terminal() {
        assert!(PipelineState::Done.is_terminal());
        assert!(PipelineState::Failed {
            reason: "boom".to_string()
        }
        .is_terminal());
        assert!(!PipelineState::Start.is_terminal());
    }

    #[test]
    fn test_pipeline_state_serialize() {
        let state = PipelineState::StageProvisioned {
            stage: "builder".to_string(),
        };
        let json = serde_json::to_string(&state).unwrap();
        assert!(json.contains("stage_provisioned"));
        assert!(json.contains("builder"));

        let back: PipelineState = serde_json::from_str(&json).unwrap();
        assert_eq!(back, state);
    }
}
