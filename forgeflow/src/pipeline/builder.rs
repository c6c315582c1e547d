//! Fluent builders for stage and pipeline specifications.
//!
//! Builders validate as they go, so a recipe that constructs is a recipe
//! the orchestrator will accept.

use super::spec::{CopyLayer, CopySpec, ImageRef, PipelineSpec, StageSpec, Step};
use crate::errors::{DiagnosticInfo, PipelineValidationError};
use std::collections::HashSet;
use std::path::PathBuf;

/// Fluent builder for a single stage.
#[derive(Debug, Clone)]
pub struct StageBuilder {
    spec: StageSpec,
}

impl StageBuilder {
    /// Starts a stage over a base environment reference.
    ///
    /// # Errors
    ///
    /// Returns an error for an invalid name or malformed reference.
    pub fn new(name: impl Into<String>, base: &str) -> Result<Self, PipelineValidationError> {
        let base = ImageRef::parse(base)?;
        Ok(Self {
            spec: StageSpec::new(name, base)?,
        })
    }

    /// Re-roots the working directory for subsequent steps.
    #[must_use]
    pub fn working_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.spec.steps.push(Step::Workdir { path: path.into() });
        self
    }

    /// Copies dependency manifests into `dest`.
    ///
    /// Manifests go in before source so the dependency layer caches
    /// independently of source edits. Use [`CopySpec::optional`] for
    /// inputs that may legitimately be absent (a lockfile).
    #[must_use]
    pub fn copy_manifests(mut self, sources: Vec<CopySpec>, dest: impl Into<PathBuf>) -> Self {
        self.spec.steps.push(Step::CopyIn {
            sources,
            dest: dest.into(),
            layer: CopyLayer::Manifest,
        });
        self
    }

    /// Copies a required source tree or file into `dest`.
    #[must_use]
    pub fn copy_source(mut self, source: impl Into<PathBuf>, dest: impl Into<PathBuf>) -> Self {
        self.spec.steps.push(Step::CopyIn {
            sources: vec![CopySpec::required(source)],
            dest: dest.into(),
            layer: CopyLayer::Source,
        });
        self
    }

    /// Executes a command.
    #[must_use]
    pub fn run<I, S>(mut self, argv: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.spec.steps.push(Step::Run {
            argv: argv.into_iter().map(Into::into).collect(),
            cached: false,
        });
        self
    }

    /// Executes a command that belongs to the cacheable dependency
    /// layer (a dependency fetch).
    #[must_use]
    pub fn run_cached<I, S>(mut self, argv: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.spec.steps.push(Step::Run {
            argv: argv.into_iter().map(Into::into).collect(),
            cached: true,
        });
        self
    }

    /// Transfers an artifact from an earlier stage.
    #[must_use]
    pub fn copy_artifact(
        mut self,
        stage: impl Into<String>,
        source: impl Into<PathBuf>,
        dest: impl Into<PathBuf>,
    ) -> Self {
        self.spec.steps.push(Step::CopyFrom {
            stage: stage.into(),
            source: source.into(),
            dest: dest.into(),
        });
        self
    }

    /// Declares the image's default command.
    #[must_use]
    pub fn default_command<I, S>(mut self, argv: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.spec.steps.push(Step::DefaultCommand {
            argv: argv.into_iter().map(Into::into).collect(),
        });
        self
    }

    /// Validates and returns the immutable stage spec.
    ///
    /// # Errors
    ///
    /// Returns the first stage-local violation.
    pub fn build(self) -> Result<StageSpec, PipelineValidationError> {
        self.spec.validate()?;
        Ok(self.spec)
    }
}

/// Builder for creating validated pipelines.
#[derive(Debug, Clone)]
pub struct PipelineBuilder {
    name: String,
    stages: Vec<StageSpec>,
}

impl PipelineBuilder {
    /// Creates a new pipeline builder.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            stages: Vec::new(),
        }
    }

    /// Adds a stage to the pipeline.
    ///
    /// # Errors
    ///
    /// Returns an error on duplicate names or references to stages not
    /// declared strictly earlier.
    pub fn stage(mut self, spec: StageSpec) -> Result<Self, PipelineValidationError> {
        spec.validate()?;

        let seen: HashSet<&str> = self.stages.iter().map(|s| s.name.as_str()).collect();

        if seen.contains(spec.name.as_str()) {
            return Err(PipelineValidationError::new(format!(
                "Duplicate stage name '{}'",
                spec.name
            ))
            .with_stages(vec![spec.name.clone()])
            .with_error_info(DiagnosticInfo::new(
                "RECIPE-003-DUP_STAGE",
                "Every stage name must be unique within a pipeline",
            )));
        }

        for step in &spec.steps {
            if let Step::CopyFrom { stage, .. } = step {
                if !seen.contains(stage.as_str()) {
                    return Err(PipelineValidationError::new(format!(
                        "Stage '{}' copies from '{}', which is not declared strictly earlier",
                        spec.name, stage
                    ))
                    .with_stages(vec![spec.name.clone(), stage.clone()])
                    .with_error_info(
                        DiagnosticInfo::new(
                            "RECIPE-002-FORWARD_REF",
                            "Artifacts may only be copied from earlier stages",
                        )
                        .with_fix_hint("Add the producing stage before this one."),
                    ));
                }
            }
        }

        self.stages.push(spec);
        Ok(self)
    }

    /// Returns the pipeline name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the number of stages added so far.
    #[must_use]
    pub fn stage_count(&self) -> usize {
        self.stages.len()
    }

    /// Builds the validated pipeline spec.
    ///
    /// # Errors
    ///
    /// Returns an error for an empty pipeline or invalid name.
    pub fn build(self) -> Result<PipelineSpec, PipelineValidationError> {
        let mut spec = PipelineSpec::new(self.name)?;
        spec.stages = self.stages;
        spec.validate()?;
        Ok(spec)
    }
}

/// Wires the canonical two-stage flow: a builder stage that compiles,
/// and an assembler stage that receives only the named artifacts.
///
/// # Errors
///
/// Returns an error if either stage (or the combination) is invalid.
pub fn staged_build(
    name: impl Into<String>,
    builder: StageSpec,
    assembler: StageSpec,
) -> Result<PipelineSpec, PipelineValidationError> {
    PipelineBuilder::new(name)
        .stage(builder)?
        .stage(assembler)?
        .build()
}
