//! Pipeline and stage specifications.
//!
//! Specs are immutable value objects: constructed once (via the builder
//! or deserialized from a JSON recipe), validated, then executed by the
//! orchestrator. Nothing mutates a spec after construction.

use crate::core::StepKind;
use crate::errors::{DiagnosticInfo, PipelineValidationError};
use crate::utils::{validate_pipeline_name, validate_stage_name};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::path::PathBuf;

/// A parsed base environment reference, `scheme://locator`.
///
/// Each stage exclusively owns its reference; the engine never validates
/// the environment's internal contents, only that a provider can
/// materialize it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ImageRef {
    /// The provider scheme (e.g. "dir", "tar", "https").
    pub scheme: String,
    /// The provider-interpreted locator.
    pub locator: String,
}

impl ImageRef {
    /// Parses a reference of the form `scheme://locator`.
    ///
    /// # Errors
    ///
    /// Returns a validation error for malformed references.
    pub fn parse(reference: &str) -> Result<Self, PipelineValidationError> {
        let mut parts = reference.splitn(2, "://");
        let scheme = parts.next().unwrap_or_default();
        let locator = parts.next().unwrap_or_default();

        if scheme.is_empty() || locator.is_empty() {
            return Err(PipelineValidationError::new(format!(
                "Malformed base image reference '{reference}'"
            ))
            .with_error_info(
                DiagnosticInfo::new(
                    "RECIPE-005-BAD_REF",
                    "Base image references look like 'scheme://locator'",
                )
                .with_fix_hint("Example: 'dir://rust-toolchain' or 'tar://bases/slim.tar.gz'."),
            ));
        }

        Ok(Self {
            scheme: scheme.to_string(),
            locator: locator.to_string(),
        })
    }
}

impl fmt::Display for ImageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}", self.scheme, self.locator)
    }
}

impl TryFrom<String> for ImageRef {
    type Error = PipelineValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<ImageRef> for String {
    fn from(reference: ImageRef) -> Self {
        reference.to_string()
    }
}

/// Which cache layer a copy-in contributes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CopyLayer {
    /// Dependency manifests; copied first, feed the layer cache key.
    Manifest,
    /// Source tree; never contributes to the cache key.
    Source,
}

/// A single host input of a copy-in step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CopySpec {
    /// The host path (file or directory).
    pub source: PathBuf,
    /// If true, a missing path is skipped rather than an error.
    #[serde(default)]
    pub optional: bool,
}

impl CopySpec {
    /// A required host input.
    #[must_use]
    pub fn required(source: impl Into<PathBuf>) -> Self {
        Self {
            source: source.into(),
            optional: false,
        }
    }

    /// An optional host input (the lockfile case).
    #[must_use]
    pub fn optional(source: impl Into<PathBuf>) -> Self {
        Self {
            source: source.into(),
            optional: true,
        }
    }
}

/// One step of a stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Step {
    /// Re-roots the working directory for subsequent steps.
    Workdir {
        /// The image-internal directory.
        path: PathBuf,
    },
    /// Copies host inputs into the working directory.
    CopyIn {
        /// The host inputs.
        sources: Vec<CopySpec>,
        /// Destination, relative to the working directory (or absolute
        /// in the image).
        dest: PathBuf,
        /// Which cache layer the copy belongs to.
        layer: CopyLayer,
    },
    /// Executes a command inside the provisioned environment.
    Run {
        /// The command argv.
        argv: Vec<String>,
        /// Whether the run belongs to the cacheable dependency layer.
        #[serde(default)]
        cached: bool,
    },
    /// Transfers an artifact from an earlier stage's snapshot.
    CopyFrom {
        /// The producing stage.
        stage: String,
        /// The artifact path inside the producing snapshot.
        source: PathBuf,
        /// Destination in this stage.
        dest: PathBuf,
    },
    /// Declares the image's default command.
    DefaultCommand {
        /// The argv run when the image is invoked without a command.
        argv: Vec<String>,
    },
}

impl Step {
    /// Returns the step's kind.
    #[must_use]
    pub fn kind(&self) -> StepKind {
        match self {
            Self::Workdir { .. } => StepKind::Workdir,
            Self::CopyIn { .. } => StepKind::CopyIn,
            Self::Run { .. } => StepKind::Run,
            Self::CopyFrom { .. } => StepKind::CopyFrom,
            Self::DefaultCommand { .. } => StepKind::DefaultCommand,
        }
    }

    /// Returns true if the step may participate in the dependency layer.
    #[must_use]
    pub fn is_layer_eligible(&self) -> bool {
        match self {
            Self::Workdir { .. } => true,
            Self::CopyIn { layer, .. } => *layer == CopyLayer::Manifest,
            Self::Run { cached, .. } => *cached,
            _ => false,
        }
    }
}

/// Specification for a single stage: a name, a base environment, and an
/// ordered sequence of steps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageSpec {
    /// The unique name of the stage.
    pub name: String,
    /// The base environment reference.
    pub base: ImageRef,
    /// The ordered steps.
    #[serde(default)]
    pub steps: Vec<Step>,
}

impl StageSpec {
    /// Creates a new stage specification.
    ///
    /// # Errors
    ///
    /// Returns an error if the name is invalid.
    pub fn new(name: impl Into<String>, base: ImageRef) -> Result<Self, PipelineValidationError> {
        let name = name.into();
        validate_stage_name(&name)?;

        Ok(Self {
            name,
            base,
            steps: Vec::new(),
        })
    }

    /// Appends a step.
    #[must_use]
    pub fn with_step(mut self, step: Step) -> Self {
        self.steps.push(step);
        self
    }

    /// Returns the longest prefix of steps eligible for the dependency
    /// layer.
    ///
    /// The prefix is cacheable only if it contains at least one manifest
    /// copy or cached run; a bare `Workdir` prefix is not a layer.
    #[must_use]
    pub fn layer_prefix(&self) -> &[Step] {
        let end = self
            .steps
            .iter()
            .position(|s| !s.is_layer_eligible())
            .unwrap_or(self.steps.len());
        &self.steps[..end]
    }

    /// Returns true if the stage has a cacheable dependency layer.
    #[must_use]
    pub fn has_dependency_layer(&self) -> bool {
        self.layer_prefix()
            .iter()
            .any(|s| !matches!(s, Step::Workdir { .. }))
    }

    /// Validates the stage in isolation.
    ///
    /// # Errors
    ///
    /// Returns an error for empty commands or empty copy lists.
    pub fn validate(&self) -> Result<(), PipelineValidationError> {
        for step in &self.steps {
            match step {
                Step::Run { argv, .. } | Step::DefaultCommand { argv } if argv.is_empty() => {
                    return Err(PipelineValidationError::new(format!(
                        "Stage '{}' has an empty command",
                        self.name
                    ))
                    .with_stages(vec![self.name.clone()]));
                }
                Step::CopyIn { sources, .. } if sources.is_empty() => {
                    return Err(PipelineValidationError::new(format!(
                        "Stage '{}' has a copy step with no sources",
                        self.name
                    ))
                    .with_stages(vec![self.name.clone()]));
                }
                Step::CopyFrom { stage, .. } if stage == &self.name => {
                    return Err(PipelineValidationError::new(format!(
                        "Stage '{}' cannot copy from itself",
                        self.name
                    ))
                    .with_stages(vec![self.name.clone()])
                    .with_error_info(DiagnosticInfo::new(
                        "RECIPE-002-FORWARD_REF",
                        "A stage may only reference stages declared strictly earlier",
                    )));
                }
                _ => {}
            }
        }
        Ok(())
    }
}

/// Specification for an entire pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineSpec {
    /// The pipeline name.
    pub name: String,
    /// The stages, in execution order.
    #[serde(default)]
    pub stages: Vec<StageSpec>,
}

impl PipelineSpec {
    /// Creates a new pipeline specification.
    ///
    /// # Errors
    ///
    /// Returns an error if the name is invalid.
    pub fn new(name: impl Into<String>) -> Result<Self, PipelineValidationError> {
        let name = name.into();
        validate_pipeline_name(&name)?;

        Ok(Self {
            name,
            stages: Vec::new(),
        })
    }

    /// Returns the stages in execution order.
    #[must_use]
    pub fn stages(&self) -> &[StageSpec] {
        &self.stages
    }

    /// Returns the terminal stage, whose snapshot becomes the output
    /// image.
    #[must_use]
    pub fn terminal_stage(&self) -> Option<&StageSpec> {
        self.stages.last()
    }

    /// Validates the whole pipeline.
    ///
    /// Checks stage-local invariants plus the ordering contract: a
    /// `CopyFrom` may only name a stage declared strictly earlier, which
    /// also rules out cycles.
    ///
    /// # Errors
    ///
    /// Returns the first violation found.
    pub fn validate(&self) -> Result<(), PipelineValidationError> {
        validate_pipeline_name(&self.name)?;

        if self.stages.is_empty() {
            return Err(PipelineValidationError::new("Pipeline has no stages")
                .with_error_info(
                    DiagnosticInfo::new("RECIPE-001-EMPTY", "Cannot run an empty pipeline")
                        .with_fix_hint("Add at least one stage before building."),
                ));
        }

        let mut seen: HashSet<&str> = HashSet::new();

        for spec in &self.stages {
            validate_stage_name(&spec.name)?;
            spec.validate()?;

            if !seen.insert(&spec.name) {
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
                    if !seen.contains(stage.as_str()) || stage == &spec.name {
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
                            .with_fix_hint(
                                "Reorder the stages so producers come before consumers.",
                            ),
                        ));
                    }
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn base(scheme: &str, locator: &str) -> ImageRef {
        ImageRef {
            scheme: scheme.to_string(),
            locator: locator.to_string(),
        }
    }

    #[test]
    fn test_image_ref_parse() {
        let reference = ImageRef::parse("dir://rust-toolchain").unwrap();
        assert_eq!(reference.scheme, "dir");
        assert_eq!(reference.locator, "rust-toolchain");
        assert_eq!(reference.to_string(), "dir://rust-toolchain");
    }

    #[test]
    fn test_image_ref_rejects_malformed() {
        for bad in ["", "no-scheme", "dir://", "://locator"] {
            assert!(ImageRef::parse(bad).is_err(), "{bad} should be rejected");
        }
    }

    #[test]
    fn test_image_ref_serde_as_string() {
        let reference = base("tar", "bases/slim.tar.gz");
        let json = serde_json::to_string(&reference).unwrap();
        assert_eq!(json, "\"tar://bases/slim.tar.gz\"");

        let back: ImageRef = serde_json::from_str(&json).unwrap();
        assert_eq!(back, reference);
    }

    #[test]
    fn test_layer_prefix_stops_at_source_copy() {
        let stage = StageSpec::new("builder", base("dir", "toolchain"))
            .unwrap()
            .with_step(Step::Workdir {
                path: "/build".into(),
            })
            .with_step(Step::CopyIn {
                sources: vec![
                    CopySpec::required("Cargo.toml"),
                    CopySpec::optional("Cargo.lock"),
                ],
                dest: ".".into(),
                layer: CopyLayer::Manifest,
            })
            .with_step(Step::Run {
                argv: vec!["cargo".into(), "fetch".into()],
                cached: true,
            })
            .with_step(Step::CopyIn {
                sources: vec![CopySpec::required("src")],
                dest: "src".into(),
                layer: CopyLayer::Source,
            })
            .with_step(Step::Run {
                argv: vec!["cargo".into(), "build".into(), "--release".into()],
                cached: false,
            });

        assert_eq!(stage.layer_prefix().len(), 3);
        assert!(stage.has_dependency_layer());
    }

    #[test]
    fn test_workdir_only_prefix_is_not_a_layer() {
        let stage = StageSpec::new("builder", base("dir", "toolchain"))
            .unwrap()
            .with_step(Step::Workdir {
                path: "/build".into(),
            })
            .with_step(Step::CopyIn {
                sources: vec![CopySpec::required("src")],
                dest: "src".into(),
                layer: CopyLayer::Source,
            });

        assert!(!stage.has_dependency_layer());
    }

    #[test]
    fn test_pipeline_rejects_forward_reference() {
        let mut pipeline = PipelineSpec::new("engine").unwrap();
        pipeline.stages.push(
            StageSpec::new("assembler", base("dir", "slim"))
                .unwrap()
                .with_step(Step::CopyFrom {
                    stage: "builder".into(),
                    source: "lib.so".into(),
                    dest: "lib.so".into(),
                }),
        );
        pipeline
            .stages
            .push(StageSpec::new("builder", base("dir", "toolchain")).unwrap());

        let err = pipeline.validate().unwrap_err();
        assert_eq!(err.error_info.unwrap().code, "RECIPE-002-FORWARD_REF");
    }

    #[test]
    fn test_pipeline_rejects_duplicates_and_empty() {
        let empty = PipelineSpec::new("engine").unwrap();
        assert_eq!(
            empty.validate().unwrap_err().error_info.unwrap().code,
            "RECIPE-001-EMPTY"
        );

        let mut dup = PipelineSpec::new("engine").unwrap();
        dup.stages
            .push(StageSpec::new("builder", base("dir", "a")).unwrap());
        dup.stages
            .push(StageSpec::new("builder", base("dir", "b")).unwrap());
        assert_eq!(
            dup.validate().unwrap_err().error_info.unwrap().code,
            "RECIPE-003-DUP_STAGE"
        );
    }

    #[test]
    fn test_self_copy_rejected() {
        let stage = StageSpec::new("builder", base("dir", "toolchain"))
            .unwrap()
            .with_step(Step::CopyFrom {
                stage: "builder".into(),
                source: "a".into(),
                dest: "b".into(),
            });

        assert!(stage.validate().is_err());
    }

    #[test]
    fn test_spec_round_trips_as_json() {
        let mut pipeline = PipelineSpec::new("engine").unwrap();
        pipeline.stages.push(
            StageSpec::new("builder", base("dir", "toolchain"))
                .unwrap()
                .with_step(Step::Run {
                    argv: vec!["make".into()],
                    cached: false,
                }),
        );

        let json = serde_json::to_string_pretty(&pipeline).unwrap();
        let back: PipelineSpec = serde_json::from_str(&json).unwrap();
        assert_eq!(back, pipeline);
        assert!(back.validate().is_ok());
    }
}
