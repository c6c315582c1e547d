//! Error types for the forgeflow engine.
//!
//! Every error is fatal to the pipeline invocation: nothing is recovered
//! locally, and each variant carries the stage and step context needed to
//! diagnose the failure without re-running the build.

use crate::exec::CapturedOutput;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use thiserror::Error;

/// The main error type for forgeflow operations.
#[derive(Debug, Error)]
pub enum BuildError {
    /// A base environment reference could not be resolved or materialized.
    #[error("Environment unavailable for '{reference}': {reason}")]
    EnvironmentUnavailable {
        /// The base image reference that failed to resolve.
        reference: String,
        /// Why provisioning failed.
        reason: String,
    },

    /// A declared host input is missing.
    #[error("Source not found for stage '{stage}': {}", path.display())]
    SourceNotFound {
        /// The stage declaring the input.
        stage: String,
        /// The missing host path.
        path: PathBuf,
    },

    /// A build command exited non-zero. Terminal; never retried.
    #[error("Build failed in stage '{stage}': `{}` exited with {}", argv.join(" "), exit_code.map_or_else(|| "signal".to_string(), |c| format!("code {c}")))]
    BuildFailed {
        /// The stage whose command failed.
        stage: String,
        /// The command argv.
        argv: Vec<String>,
        /// The exit code, if the process exited normally.
        exit_code: Option<i32>,
        /// Captured stdout/stderr, surfaced verbatim to the invoker.
        output: Box<CapturedOutput>,
    },

    /// A build command outlived the configured execution policy.
    #[error("Execution timeout in stage '{stage}': `{}` exceeded {timeout_ms}ms", argv.join(" "))]
    ExecutionTimeout {
        /// The stage whose command timed out.
        stage: String,
        /// The command argv.
        argv: Vec<String>,
        /// The configured timeout in milliseconds.
        timeout_ms: u64,
    },

    /// An expected artifact is absent from a sealed stage snapshot.
    #[error("Artifact missing from stage '{stage}': {}", path.display())]
    ArtifactMissing {
        /// The stage whose snapshot was searched.
        stage: String,
        /// The artifact path inside the snapshot.
        path: PathBuf,
    },

    /// An artifact transfer referenced a stage that has not completed.
    #[error("Stage '{stage}' has not been built yet")]
    StageNotYetBuilt {
        /// The referenced stage.
        stage: String,
    },

    /// A recipe validation error occurred.
    #[error("{0}")]
    Validation(#[from] PipelineValidationError),

    /// The pipeline was cancelled.
    #[error("Pipeline cancelled: {reason}")]
    Cancelled {
        /// Why the run was cancelled.
        reason: String,
    },

    /// A generic internal error.
    #[error("Internal error: {0}")]
    Internal(String),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl BuildError {
    /// Returns the stage this error is attributed to, when known.
    #[must_use]
    pub fn stage(&self) -> Option<&str> {
        match self {
            Self::SourceNotFound { stage, .. }
            | Self::BuildFailed { stage, .. }
            | Self::ExecutionTimeout { stage, .. }
            | Self::ArtifactMissing { stage, .. }
            | Self::StageNotYetBuilt { stage } => Some(stage),
            _ => None,
        }
    }

    /// Returns true if this error came from the recipe itself rather than
    /// from executing it.
    #[must_use]
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }
}

/// Metadata about a recipe error for better diagnostics.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct DiagnosticInfo {
    /// Error code (e.g., "RECIPE-002-FORWARD_REF").
    pub code: String,
    /// Short summary of the error.
    pub summary: String,
    /// Hint for fixing the error.
    pub fix_hint: Option<String>,
    /// Additional context key-value pairs.
    #[serde(default)]
    pub context: HashMap<String, String>,
}

impl DiagnosticInfo {
    /// Creates a new diagnostic info.
    #[must_use]
    pub fn new(code: impl Into<String>, summary: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            summary: summary.into(),
            fix_hint: None,
            context: HashMap::new(),
        }
    }

    /// Sets the fix hint.
    #[must_use]
    pub fn with_fix_hint(mut self, hint: impl Into<String>) -> Self {
        self.fix_hint = Some(hint.into());
        self
    }

    /// Adds a single context entry.
    #[must_use]
    pub fn with_context_entry(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }
}

/// Error raised when recipe validation fails.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct PipelineValidationError {
    /// The error message.
    pub message: String,
    /// The stages involved in the error.
    pub stages: Vec<String>,
    /// Optional diagnostic info.
    pub error_info: Option<DiagnosticInfo>,
}

impl PipelineValidationError {
    /// Creates a new pipeline validation error.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            stages: Vec::new(),
            error_info: None,
        }
    }

    /// Sets the stages involved.
    #[must_use]
    pub fn with_stages(mut self, stages: Vec<String>) -> Self {
        self.stages = stages;
        self
    }

    /// Sets the diagnostic info.
    #[must_use]
    pub fn with_error_info(mut self, info: DiagnosticInfo) -> Self {
        self.error_info = Some(info);
        self
    }
}

impl From<crate::utils::InvalidNameError> for PipelineValidationError {
    fn from(err: crate::utils::InvalidNameError) -> Self {
        PipelineValidationError::new(err.to_string())
            .with_stages(vec![err.name.clone()])
            .with_error_info(
                DiagnosticInfo::new("RECIPE-004-BAD_NAME", err.reason)
                    .with_fix_hint("Use 1-63 lowercase alphanumerics, dashes, or underscores."),
            )
    }
}

impl From<crate::utils::fsops::PathEscapeError> for PipelineValidationError {
    fn from(err: crate::utils::fsops::PathEscapeError) -> Self {
        PipelineValidationError::new(err.to_string()).with_error_info(
            DiagnosticInfo::new("RECIPE-006-PATH_ESCAPE", "Path escapes the stage filesystem")
                .with_fix_hint("Image paths must stay inside the image root; remove '..' components."),
        )
    }
}

/// Provides default suggestions for common recipe error codes.
pub struct RecipeSuggestions;

impl RecipeSuggestions {
    /// Gets a suggestion for a given error code.
    #[must_use]
    pub fn get(code: &str) -> Option<&'static str> {
        match code {
            "RECIPE-001-EMPTY" => Some("Add at least one stage to the pipeline before building."),
            "RECIPE-002-FORWARD_REF" => Some(
                "Artifacts may only be copied from stages declared strictly earlier. \
                 Reorder the stages so producers come before consumers.",
            ),
            "RECIPE-003-DUP_STAGE" => Some(
                "Every stage name must be unique within a pipeline. Rename one of the stages.",
            ),
            "RECIPE-004-BAD_NAME" => Some(
                "Stage and pipeline names are 1-63 chars of [a-z0-9_-], starting alphanumeric.",
            ),
            "RECIPE-005-BAD_REF" => Some(
                "Base image references look like 'scheme://locator', e.g. 'dir://rust-toolchain'.",
            ),
            "RECIPE-006-PATH_ESCAPE" => Some(
                "Image-internal paths may not contain '..'; they are resolved under the stage root.",
            ),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_diagnostic_info_creation() {
        let info = DiagnosticInfo::new("TEST-001", "Test error")
            .with_fix_hint("Fix this by doing that")
            .with_context_entry("stage", "builder");

        assert_eq!(info.code, "TEST-001");
        assert_eq!(info.summary, "Test error");
        assert_eq!(info.fix_hint, Some("Fix this by doing that".to_string()));
        assert_eq!(info.context.get("stage"), Some(&"builder".to_string()));
    }

    #[test]
    fn test_build_failed_display() {
        let err = BuildError::BuildFailed {
            stage: "builder".to_string(),
            argv: vec!["cargo".to_string(), "build".to_string()],
            exit_code: Some(101),
            output: Box::default(),
        };
        let msg = err.to_string();
        assert!(msg.contains("builder"));
        assert!(msg.contains("cargo build"));
        assert!(msg.contains("101"));
    }

    #[test]
    fn test_error_stage_attribution() {
        let err = BuildError::StageNotYetBuilt {
            stage: "builder".to_string(),
        };
        assert_eq!(err.stage(), Some("builder"));

        let err = BuildError::Internal("boom".to_string());
        assert_eq!(err.stage(), None);
    }

    #[test]
    fn test_validation_error_from_bad_name() {
        let name_err = crate::utils::validate_stage_name("Bad Name").unwrap_err();
        let err: PipelineValidationError = name_err.into();
        assert_eq!(err.error_info.unwrap().code, "RECIPE-004-BAD_NAME");
    }

    #[test]
    fn test_recipe_suggestions() {
        assert!(RecipeSuggestions::get("RECIPE-002-FORWARD_REF").is_some());
        assert!(RecipeSuggestions::get("UNKNOWN").is_none());
    }
}
