//! Command-line front end for the forgeflow staged build engine.
//!
//! Recipes are JSON-serialized [`PipelineSpec`]s; `validate` checks one
//! without running it, `run` executes it and prints the run report.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use forgeflow::prelude::*;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "forgeflow", version, about = "Staged artifact build engine")]
struct Cli {
    /// Enable debug logging.
    #[arg(long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a recipe without running it.
    Validate {
        /// Path to the JSON recipe.
        #[arg(long)]
        recipe: PathBuf,
    },
    /// Run a recipe.
    Run {
        /// Path to the JSON recipe.
        #[arg(long)]
        recipe: PathBuf,

        /// Root directory holding base environment templates/archives.
        #[arg(long, default_value = "bases")]
        bases: PathBuf,

        /// Directory for the dependency-layer cache; omit to disable
        /// caching.
        #[arg(long)]
        cache: Option<PathBuf>,

        /// Per-command timeout in seconds; omit for no timeout.
        #[arg(long)]
        timeout_secs: Option<u64>,
    },
}

fn load_recipe(path: &Path) -> Result<PipelineSpec> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading recipe '{}'", path.display()))?;
    let spec: PipelineSpec = serde_json::from_str(&raw)
        .with_context(|| format!("parsing recipe '{}'", path.display()))?;
    Ok(spec)
}

async fn run_recipe(
    recipe: &Path,
    bases: &Path,
    cache: Option<&Path>,
    timeout_secs: Option<u64>,
) -> Result<()> {
    let spec = load_recipe(recipe)?;

    let registry = Arc::new(ProvisionerRegistry::with_default_providers(bases));
    registry.register(Arc::new(RemoteProvisioner::new()));

    let mut config = EngineConfig::new(registry);
    if let Some(cache_root) = cache {
        let cache = LayerCache::open(cache_root)
            .with_context(|| format!("opening layer cache '{}'", cache_root.display()))?;
        config = config.with_cache(Arc::new(cache));
    }
    if let Some(secs) = timeout_secs {
        config = config
            .with_policy(ExecutionPolicy::default().with_step_timeout(Duration::from_secs(secs)));
    }

    forgeflow::events::set_event_sink(Arc::new(LoggingEventSink::default()));

    let ctx = BuildContext::new(RunIdentity::new()).context("creating build context")?;
    let orchestrator = Orchestrator::new(config);

    let report = orchestrator
        .run(&spec, &ctx)
        .await
        .with_context(|| format!("running pipeline '{}'", spec.name))?;

    print_report(&report)?;
    Ok(())
}

fn print_report(report: &PipelineReport) -> Result<()> {
    println!("pipeline '{}' completed in {:.1}ms", report.pipeline, report.duration_ms);

    for stage in &report.stages {
        let cache_note = if stage.cache_hit { " (layer cache hit)" } else { "" };
        println!(
            "  stage {:<12} {} in {:.1}ms, {} steps{}",
            stage.stage, stage.status, stage.duration_ms, stage.steps_run, cache_note
        );
    }

    for artifact in &report.artifacts {
        println!(
            "  artifact {} ({} bytes, sha256 {})",
            artifact.path.display(),
            artifact.size_bytes,
            &artifact.sha256[..12]
        );
    }

    if let Some(image) = &report.image {
        println!(
            "  image from stage '{}', workdir /{}",
            image.stage(),
            image.workdir().display()
        );
        if let Some(argv) = image.default_command() {
            println!("  default command: {}", argv.join(" "));
        }
        for entry in image.workdir_listing().context("listing image workdir")? {
            println!("    {:>10}  {}", entry.size_bytes, entry.path.display());
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    forgeflow::observability::init_tracing(if cli.verbose { "debug" } else { "info" });

    match cli.command {
        Commands::Validate { recipe } => {
            let spec = load_recipe(&recipe)?;
            spec.validate()
                .with_context(|| format!("recipe '{}' is invalid", recipe.display()))?;
            println!(
                "recipe '{}' is valid: {} stage(s)",
                spec.name,
                spec.stages().len()
            );
            Ok(())
        }
        Commands::Run {
            recipe,
            bases,
            cache,
            timeout_secs,
        } => run_recipe(&recipe, &bases, cache.as_deref(), timeout_secs).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_recipe() -> PipelineSpec {
        let builder = StageBuilder::new("builder", "dir://toolchain")
            .unwrap()
            .working_dir("/build")
            .run(["sh", "-c", "echo lib > libengine.so"])
            .build()
            .unwrap();
        let assembler = StageBuilder::new("assembler", "dir://slim")
            .unwrap()
            .working_dir("/opt/engine")
            .copy_artifact("builder", "/build/libengine.so", "libengine.so")
            .default_command(["ls", "/opt/engine"])
            .build()
            .unwrap();
        staged_build("engine", builder, assembler).unwrap()
    }

    #[test]
    fn test_load_recipe_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("recipe.json");
        std::fs::write(
            &path,
            serde_json::to_string_pretty(&sample_recipe()).unwrap(),
        )
        .unwrap();

        let spec = load_recipe(&path).unwrap();
        assert_eq!(spec.name, "engine");
        assert_eq!(spec.stages().len(), 2);
        assert!(spec.validate().is_ok());
    }

    #[test]
    fn test_load_recipe_missing_file() {
        let err = load_recipe(Path::new("/no/such/recipe.json")).unwrap_err();
        assert!(err.to_string().contains("reading recipe"));
    }

    #[tokio::test]
    async fn test_run_recipe_end_to_end() {
        let dir = tempfile::tempdir().unwrap();
        let bases = dir.path().join("bases");
        std::fs::create_dir_all(bases.join("toolchain")).unwrap();
        std::fs::write(bases.join("toolchain/marker"), b"t").unwrap();
        std::fs::create_dir_all(bases.join("slim")).unwrap();
        std::fs::write(bases.join("slim/marker"), b"s").unwrap();

        let recipe = dir.path().join("recipe.json");
        std::fs::write(
            &recipe,
            serde_json::to_string_pretty(&sample_recipe()).unwrap(),
        )
        .unwrap();

        run_recipe(&recipe, &bases, None, Some(60)).await.unwrap();
    }
}
