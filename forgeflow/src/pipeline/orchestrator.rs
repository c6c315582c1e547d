//! Sequential pipeline execution.
//!
//! The orchestrator walks the stages of a validated spec strictly in
//! order: preflight host inputs, provision, run steps, seal. Each stage
//! fully completes before the next begins; the first failure is terminal
//! for the invocation and no partial image is produced.

use super::spec::{PipelineSpec, StageSpec, Step};
use super::state::StateTracker;
use crate::cache::LayerCache;
use crate::context::BuildContext;
use crate::core::{Artifact, BuildEvent, PipelineReport, PipelineState, StageReport, StageStatus};
use crate::errors::BuildError;
use crate::exec::{CommandRunner, ExecutionPolicy};
use crate::image::OutputImage;
use crate::observability::SpanTimer;
use crate::provision::ProvisionerRegistry;
use crate::snapshot::StageWorkspace;
use crate::transfer::{transfer, SnapshotStore};
use crate::utils::{copy_file_into, copy_tree};
use serde_json::json;
use std::sync::Arc;
use tracing::{info, warn};

/// Seconds granted to teardown callbacks on the failure path.
const TEARDOWN_TIMEOUT_SECS: f64 = 30.0;

/// Configuration for a pipeline run.
#[derive(Debug)]
pub struct EngineConfig {
    /// Resolves base image references.
    pub provisioners: Arc<ProvisionerRegistry>,
    /// Optional dependency-layer cache, shared across invocations.
    pub cache: Option<Arc<LayerCache>>,
    /// Execution policy for build commands.
    pub policy: ExecutionPolicy,
}

impl EngineConfig {
    /// Creates a config over a provisioner registry, with no cache and
    /// the default execution policy.
    #[must_use]
    pub fn new(provisioners: Arc<ProvisionerRegistry>) -> Self {
        Self {
            provisioners,
            cache: None,
            policy: ExecutionPolicy::default(),
        }
    }

    /// Attaches a dependency-layer cache.
    #[must_use]
    pub fn with_cache(mut self, cache: Arc<LayerCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Sets the execution policy.
    #[must_use]
    pub fn with_policy(mut self, policy: ExecutionPolicy) -> Self {
        self.policy = policy;
        self
    }
}

/// Executes one pipeline invocation.
///
/// Create one orchestrator per run; the state tracker stays readable
/// after a failure so callers can inspect where the run stopped.
#[derive(Debug)]
pub struct Orchestrator {
    config: EngineConfig,
    state: Arc<StateTracker>,
}

impl Orchestrator {
    /// Creates an orchestrator for one invocation.
    #[must_use]
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            state: Arc::new(StateTracker::new()),
        }
    }

    /// Returns the run's state tracker.
    #[must_use]
    pub fn state(&self) -> Arc<StateTracker> {
        self.state.clone()
    }

    /// Runs the pipeline to completion.
    ///
    /// # Errors
    ///
    /// Returns the first failure; the pipeline halts there, teardown
    /// runs, and no image is produced.
    pub async fn run(
        &self,
        spec: &PipelineSpec,
        ctx: &BuildContext,
    ) -> Result<PipelineReport, BuildError> {
        let timer = SpanTimer::new();

        ctx.emit(BuildEvent::pipeline_started(&spec.name));
        info!(pipeline = %spec.name, run_id = %ctx.identity().run_id, "Pipeline started");

        match self.run_inner(spec, ctx).await {
            Ok(mut report) => {
                self.state.record(PipelineState::Done);
                report.duration_ms = timer.elapsed_ms();
                report.transitions = self.state.history();
                ctx.emit(BuildEvent::pipeline_completed(&spec.name, report.duration_ms));
                info!(pipeline = %spec.name, duration_ms = report.duration_ms, "Pipeline completed");
                Ok(report)
            }
            Err(err) => {
                self.state.fail(err.to_string());
                ctx.emit(BuildEvent::pipeline_failed(&spec.name, &err.to_string()));
                warn!(pipeline = %spec.name, error = %err, "Pipeline failed");

                let failures = ctx.cleanup().run_all(TEARDOWN_TIMEOUT_SECS).await;
                for (name, reason) in failures {
                    warn!(callback = %name, %reason, "Teardown failure");
                }

                Err(err)
            }
        }
    }

    async fn run_inner(
        &self,
        spec: &PipelineSpec,
        ctx: &BuildContext,
    ) -> Result<PipelineReport, BuildError> {
        spec.validate()?;
        self.preflight(spec).await?;

        let runner = CommandRunner::new(self.config.policy.clone());
        let mut store = SnapshotStore::new();
        let mut stage_reports = Vec::new();
        let mut artifacts = Vec::new();

        let terminal_name = spec.terminal_stage().map(|s| s.name.clone());

        for stage_spec in spec.stages() {
            self.check_cancelled(ctx)?;

            let is_terminal = terminal_name.as_deref() == Some(stage_spec.name.as_str());
            let report = self
                .run_stage(stage_spec, ctx, &runner, &mut store, &mut artifacts, is_terminal)
                .await?;
            stage_reports.push(report);
        }

        let image = match terminal_name {
            Some(name) => {
                let snapshot = store.get(&name)?;
                Some(OutputImage::from_snapshot(snapshot, ctx.scratch().clone()))
            }
            None => None,
        };

        Ok(PipelineReport {
            pipeline: spec.name.clone(),
            run_id: ctx.identity().run_id.to_string(),
            duration_ms: 0.0,
            stages: stage_reports,
            transitions: Vec::new(),
            artifacts,
            image,
        })
    }

    /// Verifies every required host input of every stage before anything
    /// executes, so a missing source fails the run before any
    /// compilation step.
    async fn preflight(&self, spec: &PipelineSpec) -> Result<(), BuildError> {
        let mut checks = Vec::new();

        for stage in spec.stages() {
            for step in &stage.steps {
                if let Step::CopyIn { sources, .. } = step {
                    for copy in sources {
                        if !copy.optional {
                            checks.push((stage.name.clone(), copy.source.clone()));
                        }
                    }
                }
            }
        }

        let lookups = checks.into_iter().map(|(stage, path)| async move {
            match tokio::fs::metadata(&path).await {
                Ok(_) => Ok(()),
                Err(_) => Err(BuildError::SourceNotFound { stage, path }),
            }
        });

        futures::future::try_join_all(lookups).await?;
        Ok(())
    }

    fn check_cancelled(&self, ctx: &BuildContext) -> Result<(), BuildError> {
        if ctx.is_cancelled() {
            return Err(BuildError::Cancelled {
                reason: ctx
                    .cancel_reason()
                    .unwrap_or_else(|| "cancelled".to_string()),
            });
        }
        Ok(())
    }

    #[allow(clippy::too_many_lines)]
    async fn run_stage(
        &self,
        stage: &StageSpec,
        ctx: &BuildContext,
        runner: &CommandRunner,
        store: &mut SnapshotStore,
        artifacts: &mut Vec<Artifact>,
        is_terminal: bool,
    ) -> Result<StageReport, BuildError> {
        let timer = SpanTimer::new();
        let stage_root = ctx.stage_root(&stage.name);
        let mut workspace = StageWorkspace::create(&stage.name, &stage_root)?;

        // Teardown for the failure path; success keeps the tree for the
        // output image and reclaims it with the scratch root.
        {
            let root = stage_root.clone();
            ctx.cleanup().register(
                move || {
                    let _ = std::fs::remove_dir_all(&root);
                },
                Some(&format!("stage-{}", stage.name)),
            );
        }

        // Dependency layer: a hit restores base + manifests + cached
        // runs in one copy, so provisioning is skipped entirely.
        let prefix_len = stage.layer_prefix().len();
        let layer_key = match &self.config.cache {
            Some(_) => LayerCache::key_for(stage)?,
            None => None,
        };

        let mut cache_hit = false;
        if let (Some(cache), Some(key)) = (&self.config.cache, &layer_key) {
            if cache.restore(key, workspace.root())? {
                cache_hit = true;
                ctx.emit(
                    BuildEvent::new("cache.hit")
                        .add_data("stage", json!(stage.name))
                        .add_data("key", json!(key)),
                );
            } else {
                ctx.emit(
                    BuildEvent::new("cache.miss")
                        .add_data("stage", json!(stage.name))
                        .add_data("key", json!(key)),
                );
            }
        }

        if !cache_hit {
            self.config
                .provisioners
                .provision(&stage.base, workspace.root())
                .await?;
        }

        self.state.record(PipelineState::StageProvisioned {
            stage: stage.name.clone(),
        });
        ctx.emit(BuildEvent::stage_provisioned(
            &stage.name,
            &stage.base.to_string(),
        ));

        let mut steps_run = 0;
        let mut steps_from_cache = 0;
        // Observable per-stage states record once: a stage is "copied
        // in" when its first host input lands, "executed" when its first
        // command completes.
        let mut recorded_copied_in = false;
        let mut recorded_executed = false;

        for (idx, step) in stage.steps.iter().enumerate() {
            self.check_cancelled(ctx)?;

            if cache_hit && idx < prefix_len {
                // The filesystem effect is already restored; only the
                // working-directory bookkeeping needs replaying.
                if let Step::Workdir { path } = step {
                    workspace.set_workdir(path).map_err(BuildError::Validation)?;
                }
                steps_from_cache += 1;
                continue;
            }

            match step {
                Step::Workdir { path } => {
                    workspace.set_workdir(path).map_err(BuildError::Validation)?;
                }
                Step::CopyIn { sources, dest, .. } => {
                    let files = copy_in(stage, &workspace, sources, dest)?;
                    if !recorded_copied_in {
                        recorded_copied_in = true;
                        self.state.record(PipelineState::StageCopiedIn {
                            stage: stage.name.clone(),
                        });
                    }
                    ctx.emit(BuildEvent::stage_copied_in(&stage.name, files));
                }
                Step::Run { argv, .. } => {
                    let cwd = workspace.workdir_host()?;
                    let step_timer = SpanTimer::new();
                    let output = runner.run(&stage.name, argv, &cwd).await?;
                    ctx.emit(
                        BuildEvent::new("step.completed")
                            .add_data("stage", json!(stage.name))
                            .add_data("command", json!(argv.join(" ")))
                            .add_data("duration_ms", json!(step_timer.elapsed_ms()))
                            .add_data("stdout_bytes", json!(output.stdout.text.len())),
                    );
                    if !recorded_executed {
                        recorded_executed = true;
                        self.state.record(PipelineState::StageExecuted {
                            stage: stage.name.clone(),
                        });
                    }
                }
                Step::CopyFrom {
                    stage: from,
                    source,
                    dest,
                } => {
                    let snapshot = store.get(from)?.clone();
                    let artifact = transfer(&snapshot, source, &workspace, dest)?;
                    self.state.record(PipelineState::ArtifactTransferred {
                        from: from.clone(),
                        to: stage.name.clone(),
                    });
                    ctx.emit(BuildEvent::artifact_transferred(
                        from,
                        &stage.name,
                        &source.to_string_lossy(),
                    ));
                    artifacts.push(artifact);
                }
                Step::DefaultCommand { argv } => {
                    workspace.set_default_command(argv.clone());
                }
            }

            steps_run += 1;

            // The layer is complete; store it for future invocations.
            if !cache_hit && idx + 1 == prefix_len && stage.has_dependency_layer() {
                if let (Some(cache), Some(key)) = (&self.config.cache, &layer_key) {
                    cache.store(key, &stage.base.to_string(), workspace.root())?;
                }
            }
        }

        let duration_ms = timer.elapsed_ms();
        ctx.emit(BuildEvent::stage_executed(&stage.name, duration_ms));

        let snapshot = Arc::new(workspace.seal());
        if is_terminal {
            self.state.record(PipelineState::StageFinalized {
                stage: stage.name.clone(),
            });
            ctx.emit(BuildEvent::stage_finalized(&stage.name));
        }
        store.insert(snapshot);

        Ok(StageReport {
            stage: stage.name.clone(),
            status: StageStatus::Sealed,
            duration_ms,
            steps_run,
            steps_from_cache,
            cache_hit,
        })
    }
}

/// Copies one copy-in step's sources into the workspace. Directories
/// copy their contents; files land inside the destination directory. A
/// missing optional source is skipped.
fn copy_in(
    stage: &StageSpec,
    workspace: &StageWorkspace,
    sources: &[super::spec::CopySpec],
    dest: &std::path::Path,
) -> Result<u64, BuildError> {
    let dest_host = workspace.resolve(dest).map_err(BuildError::Validation)?;
    let mut files = 0;

    for copy in sources {
        match std::fs::metadata(&copy.source) {
            Err(_) if copy.optional => continue,
            Err(_) => {
                return Err(BuildError::SourceNotFound {
                    stage: stage.name.clone(),
                    path: copy.source.clone(),
                })
            }
            Ok(meta) => {
                if meta.is_dir() {
                    files += copy_tree(&copy.source, &dest_host)?;
                } else {
                    std::fs::create_dir_all(&dest_host)?;
                    copy_file_into(&copy.source, &dest_host)?;
                    files += 1;
                }
            }
        }
    }

    Ok(files)
}
