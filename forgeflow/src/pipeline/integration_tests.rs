//! End-to-end pipeline tests over real filesystems and processes.

use super::{staged_build, EngineConfig, Orchestrator, PipelineBuilder, StageBuilder};
use crate::cache::LayerCache;
use crate::context::{BuildContext, RunIdentity};
use crate::core::PipelineState;
use crate::errors::BuildError;
use crate::pipeline::{CopySpec, PipelineSpec};
use crate::testing::{
    assert_event_emitted, assert_image_workdir_lists, assert_report_sealed, TestBases,
    TestHarness, TestProject,
};
use pretty_assertions::assert_eq;
use std::sync::Arc;

fn bases_with_toolchain_and_slim() -> TestBases {
    let bases = TestBases::new();
    bases.add_base(
        "rust-toolchain",
        &[("usr/bin/toolchain-cc", b"#!/bin/sh\n".as_slice())],
    );
    bases.add_base("slim", &[("etc-release", b"slim\n".as_slice())]);
    bases
}

fn orchestrator_for(bases: &TestBases) -> Orchestrator {
    Orchestrator::new(EngineConfig::new(bases.registry()))
}

/// The canonical recipe: compile in a toolchain environment, assemble a
/// minimal image holding only the compiled library.
fn engine_pipeline(project: &TestProject) -> PipelineSpec {
    let builder = StageBuilder::new("builder", "dir://rust-toolchain")
        .unwrap()
        .working_dir("/build")
        .copy_manifests(
            vec![
                CopySpec::required(project.manifest()),
                CopySpec::optional(project.lockfile()),
            ],
            ".",
        )
        .run_cached(["sh", "-c", "cat manifest.toml > deps.fetched"])
        .copy_source(project.src(), "src")
        .run(["sh", "-c", "cat src/lib.c deps.fetched > libengine.so"])
        .build()
        .unwrap();

    let assembler = StageBuilder::new("assembler", "dir://slim")
        .unwrap()
        .working_dir("/opt/engine")
        .copy_artifact("builder", "/build/libengine.so", "libengine.so")
        .default_command(["ls", "-lah", "/opt/engine"])
        .build()
        .unwrap();

    staged_build("engine", builder, assembler).unwrap()
}

#[tokio::test]
async fn test_end_to_end_staged_build() {
    let bases = bases_with_toolchain_and_slim();
    let project = TestProject::new();
    let spec = engine_pipeline(&project);
    let harness = TestHarness::new();

    let report = orchestrator_for(&bases)
        .run(&spec, &harness.ctx)
        .await
        .unwrap();

    assert_report_sealed(&report);
    assert_eq!(report.artifacts.len(), 1);
    assert_eq!(report.artifacts[0].from_stage, "builder");
    assert_event_emitted(&harness.sink, "pipeline.completed");

    // The declared default command would list a directory containing
    // exactly the one artifact, with non-zero size.
    let image = report.image.as_ref().unwrap();
    assert_eq!(
        image.default_command(),
        Some(&["ls".to_string(), "-lah".to_string(), "/opt/engine".to_string()][..])
    );
    assert_image_workdir_lists(image, &["libengine.so"]);
}

#[tokio::test]
async fn test_final_image_excludes_builder_state() {
    let bases = bases_with_toolchain_and_slim();
    let project = TestProject::new();
    let spec = engine_pipeline(&project);
    let harness = TestHarness::new();

    let report = orchestrator_for(&bases)
        .run(&spec, &harness.ctx)
        .await
        .unwrap();
    let image = report.image.as_ref().unwrap();

    // Only the transferred artifact crossed the boundary: no toolchain,
    // no manifests, no intermediate build state.
    assert!(image.contains("opt/engine/libengine.so"));
    assert!(!image.contains("usr/bin/toolchain-cc"));
    assert!(!image.contains("build/manifest.toml"));
    assert!(!image.contains("build/deps.fetched"));
    assert!(!image.contains("build/src/lib.c"));
    assert!(image.contains("etc-release"));
}

#[tokio::test]
async fn test_state_trace_for_canonical_pipeline() {
    let bases = bases_with_toolchain_and_slim();
    let project = TestProject::new();
    let spec = engine_pipeline(&project);
    let harness = TestHarness::new();

    let report = orchestrator_for(&bases)
        .run(&spec, &harness.ctx)
        .await
        .unwrap();

    let labels: Vec<&str> = report
        .transitions
        .iter()
        .map(PipelineState::label)
        .collect();
    assert_eq!(
        labels,
        vec![
            "start",
            "stage_provisioned", // builder
            "stage_copied_in",   // manifests + source
            "stage_executed",    // fetch + compile
            "stage_provisioned", // assembler
            "artifact_transferred",
            "stage_finalized",
            "done",
        ]
    );
}

#[tokio::test]
async fn test_failing_build_produces_no_image() {
    let bases = bases_with_toolchain_and_slim();
    let project = TestProject::new();

    let builder = StageBuilder::new("builder", "dir://rust-toolchain")
        .unwrap()
        .working_dir("/build")
        .copy_source(project.src(), "src")
        .run(["sh", "-c", "echo 'src/lib.c:1: syntax error' >&2; exit 1"])
        .build()
        .unwrap();
    let assembler = StageBuilder::new("assembler", "dir://slim")
        .unwrap()
        .copy_artifact("builder", "/build/libengine.so", "libengine.so")
        .build()
        .unwrap();
    let spec = staged_build("engine", builder, assembler).unwrap();

    let harness = TestHarness::new();
    let orchestrator = orchestrator_for(&bases);
    let err = orchestrator.run(&spec, &harness.ctx).await.unwrap_err();

    match &err {
        BuildError::BuildFailed {
            stage,
            exit_code,
            output,
            ..
        } => {
            assert_eq!(stage, "builder");
            assert_eq!(*exit_code, Some(1));
            assert!(output.stderr.text.contains("syntax error"));
        }
        other => panic!("expected BuildFailed, got {other:?}"),
    }

    // The assembler never provisioned.
    let provisioned = harness.sink.events_of_type("stage.provisioned");
    assert_eq!(provisioned.len(), 1);
    assert_eq!(
        provisioned[0].data.get("stage"),
        Some(&serde_json::json!("builder"))
    );

    assert!(orchestrator.state().is_failed());
}

#[tokio::test]
async fn test_missing_source_fails_before_any_execution() {
    let bases = bases_with_toolchain_and_slim();

    let builder = StageBuilder::new("builder", "dir://rust-toolchain")
        .unwrap()
        .copy_source("/definitely/not/a/real/source/tree", "src")
        .run(["sh", "-c", "echo should-never-run"])
        .build()
        .unwrap();
    let spec = PipelineBuilder::new("engine")
        .stage(builder)
        .unwrap()
        .build()
        .unwrap();

    let harness = TestHarness::new();
    let err = orchestrator_for(&bases)
        .run(&spec, &harness.ctx)
        .await
        .unwrap_err();

    assert!(matches!(err, BuildError::SourceNotFound { .. }));
    // Preflight rejected the run before anything provisioned or ran.
    assert!(harness.sink.events_of_type("stage.").is_empty());
    assert!(harness.sink.events_of_type("step.").is_empty());
}

#[tokio::test]
async fn test_unresolvable_base_is_environment_unavailable() {
    let bases = bases_with_toolchain_and_slim();

    let builder = StageBuilder::new("builder", "dir://no-such-base")
        .unwrap()
        .run(["sh", "-c", "true"])
        .build()
        .unwrap();
    let spec = PipelineBuilder::new("engine")
        .stage(builder)
        .unwrap()
        .build()
        .unwrap();

    let harness = TestHarness::new();
    let err = orchestrator_for(&bases)
        .run(&spec, &harness.ctx)
        .await
        .unwrap_err();

    assert!(matches!(err, BuildError::EnvironmentUnavailable { .. }));
}

#[tokio::test]
async fn test_missing_artifact_after_build() {
    let bases = bases_with_toolchain_and_slim();
    let project = TestProject::new();

    // The build "succeeds" but produces nothing at the contracted path.
    let builder = StageBuilder::new("builder", "dir://rust-toolchain")
        .unwrap()
        .working_dir("/build")
        .copy_source(project.src(), "src")
        .run(["sh", "-c", "true"])
        .build()
        .unwrap();
    let assembler = StageBuilder::new("assembler", "dir://slim")
        .unwrap()
        .copy_artifact("builder", "/build/libengine.so", "libengine.so")
        .build()
        .unwrap();
    let spec = staged_build("engine", builder, assembler).unwrap();

    let harness = TestHarness::new();
    let err = orchestrator_for(&bases)
        .run(&spec, &harness.ctx)
        .await
        .unwrap_err();

    match err {
        BuildError::ArtifactMissing { stage, path } => {
            assert_eq!(stage, "builder");
            assert!(path.ends_with("libengine.so"));
        }
        other => panic!("expected ArtifactMissing, got {other:?}"),
    }
}

#[tokio::test]
async fn test_reproducible_artifact_digest() {
    let bases = bases_with_toolchain_and_slim();
    let project = TestProject::new();
    let spec = engine_pipeline(&project);

    let run1 = TestHarness::new();
    let report1 = orchestrator_for(&bases)
        .run(&spec, &run1.ctx)
        .await
        .unwrap();

    let run2 = TestHarness::new();
    let report2 = orchestrator_for(&bases)
        .run(&spec, &run2.ctx)
        .await
        .unwrap();

    assert_eq!(report1.artifacts[0].sha256, report2.artifacts[0].sha256);
}

#[tokio::test]
async fn test_dependency_layer_cache_skips_fetch() {
    let bases = bases_with_toolchain_and_slim();
    let project = TestProject::new();
    let counter_dir = tempfile::tempdir().unwrap();
    let counter = counter_dir.path().join("fetch-count");

    let fetch_cmd = format!("echo fetched >> {}", counter.display());
    let make_spec = |project: &TestProject| {
        let builder = StageBuilder::new("builder", "dir://rust-toolchain")
            .unwrap()
            .working_dir("/build")
            .copy_manifests(vec![CopySpec::required(project.manifest())], ".")
            .run_cached(["sh", "-c", fetch_cmd.as_str()])
            .copy_source(project.src(), "src")
            .run(["sh", "-c", "cat src/lib.c > libengine.so"])
            .build()
            .unwrap();
        PipelineBuilder::new("engine")
            .stage(builder)
            .unwrap()
            .build()
            .unwrap()
    };

    let cache_dir = tempfile::tempdir().unwrap();
    let cache = Arc::new(LayerCache::open(cache_dir.path()).unwrap());
    let registry = bases.registry();

    let run = |spec: PipelineSpec| {
        let registry = registry.clone();
        let cache = cache.clone();
        async move {
            let ctx = BuildContext::new(RunIdentity::new()).unwrap();
            let orchestrator = Orchestrator::new(EngineConfig::new(registry).with_cache(cache));
            orchestrator.run(&spec, &ctx).await
        }
    };

    // Cold run: the fetch executes and the layer is stored.
    let report = run(make_spec(&project)).await.unwrap();
    assert!(!report.stages[0].cache_hit);
    assert_eq!(std::fs::read_to_string(&counter).unwrap().lines().count(), 1);

    // Source-only change: the key is stable, the fetch is skipped.
    project.set_source("lib.c", b"int engine(void) { return 7; }\n");
    let report = run(make_spec(&project)).await.unwrap();
    assert!(report.stages[0].cache_hit);
    assert!(report.stages[0].steps_from_cache > 0);
    assert_eq!(std::fs::read_to_string(&counter).unwrap().lines().count(), 1);

    // Manifest change: the key rotates, the fetch runs again.
    project.set_manifest(b"[deps]\nlibc = \"2\"\n");
    let report = run(make_spec(&project)).await.unwrap();
    assert!(!report.stages[0].cache_hit);
    assert_eq!(std::fs::read_to_string(&counter).unwrap().lines().count(), 2);
}

#[tokio::test]
async fn test_optional_lockfile_absence_is_not_an_error() {
    let bases = bases_with_toolchain_and_slim();
    let project = TestProject::new();
    // No lockfile on disk; the recipe marks it optional.
    assert!(!project.lockfile().exists());

    let spec = engine_pipeline(&project);
    let harness = TestHarness::new();

    let report = orchestrator_for(&bases)
        .run(&spec, &harness.ctx)
        .await
        .unwrap();
    assert_report_sealed(&report);
}
