use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use pipewright_config::PipelineDef;
use pipewright_runtime::{
  FsCheckpointer, LocalWorker, PipelineReport, RuntimeConfig, build_pipeline, path_component,
  stage_graph,
};

/// Pipewright - resumable pipelines of scripts on a worker
#[derive(Parser)]
#[command(name = "pipewright")]
#[command(version, about, long_about = None)]
struct Cli {
  /// Path to the data directory (default: ~/.pipewright)
  #[arg(long, global = true)]
  data_dir: Option<PathBuf>,

  #[command(subcommand)]
  command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
  /// Run a pipeline, skipping executables that already have a checkpoint
  Run {
    /// Path to the pipeline definition (JSON)
    definition: PathBuf,

    /// Checkpoint root (default: <data-dir>/checkpoints)
    #[arg(long)]
    checkpoint_dir: Option<PathBuf>,

    /// Where downloaded output files are written (default: <data-dir>/outputs/<id>)
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Working directory of the local worker (default: <data-dir>/workers/<id>)
    #[arg(long)]
    worker_root: Option<PathBuf>,

    /// Attempts per file transfer
    #[arg(long)]
    transfer_attempts: Option<u32>,
  },

  /// Print the dependency graph of a pipeline as Graphviz DOT
  Graph {
    /// Path to the pipeline definition (JSON)
    definition: PathBuf,

    /// Show executables instead of stages
    #[arg(long)]
    executables: bool,
  },
}

fn main() -> Result<()> {
  let cli = Cli::parse();
  init_logging()?;

  let data_dir = match cli.data_dir {
    Some(dir) => dir,
    None => dirs::home_dir()
      .context("could not determine home directory")?
      .join(".pipewright"),
  };

  match cli.command {
    Some(Commands::Run {
      definition,
      checkpoint_dir,
      output_dir,
      worker_root,
      transfer_attempts,
    }) => {
      let def = load_definition(&definition)?;
      let mut config = RuntimeConfig {
        output_dir: output_dir
          .unwrap_or_else(|| data_dir.join("outputs").join(path_component(&def.id))),
        ..Default::default()
      };
      if let Some(attempts) = transfer_attempts {
        config.transfer_attempts = attempts;
      }
      let checkpoint_dir = checkpoint_dir.unwrap_or_else(|| data_dir.join("checkpoints"));
      let worker_root = worker_root
        .unwrap_or_else(|| data_dir.join("workers").join(path_component(&def.id)));

      let rt = tokio::runtime::Runtime::new()?;
      let report = rt.block_on(run_pipeline(
        &def,
        &definition,
        checkpoint_dir,
        worker_root,
        config,
      ))?;
      print_report(&report);
    }
    Some(Commands::Graph {
      definition,
      executables,
    }) => {
      let def = load_definition(&definition)?;
      let graph = if executables {
        let pipeline = build_pipeline(
          &def,
          base_dir(&definition),
          Arc::new(FsCheckpointer::new(data_dir.join("checkpoints"))),
          Arc::new(LocalWorker::new(
            data_dir.join("workers").join(path_component(&def.id)),
          )),
          RuntimeConfig::default(),
        )
        .context("invalid pipeline definition")?;
        pipeline.graph()?
      } else {
        stage_graph(&def).context("invalid pipeline definition")?
      };
      print!("{}", graph.to_dot(&def.id));
    }
    None => {
      println!("pipewright - use --help to see available commands");
    }
  }

  Ok(())
}

fn init_logging() -> Result<()> {
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_writer(std::io::stderr)
    .try_init()
    .map_err(|e| anyhow::anyhow!("failed to initialise logging: {}", e))
}

fn load_definition(path: &Path) -> Result<PipelineDef> {
  let content = std::fs::read_to_string(path)
    .with_context(|| format!("failed to read pipeline definition: {}", path.display()))?;
  serde_json::from_str(&content)
    .with_context(|| format!("failed to parse pipeline definition: {}", path.display()))
}

/// Relative file inputs resolve against the definition's directory.
fn base_dir(definition: &Path) -> &Path {
  definition.parent().unwrap_or(Path::new("."))
}

async fn run_pipeline(
  def: &PipelineDef,
  definition: &Path,
  checkpoint_dir: PathBuf,
  worker_root: PathBuf,
  config: RuntimeConfig,
) -> Result<PipelineReport> {
  eprintln!("Loaded pipeline: {}", def.id);
  eprintln!("Checkpoints: {}", checkpoint_dir.display());
  eprintln!("Worker root: {}", worker_root.display());

  let pipeline = build_pipeline(
    def,
    base_dir(definition),
    Arc::new(FsCheckpointer::new(checkpoint_dir)),
    Arc::new(LocalWorker::new(worker_root)),
    config,
  )
  .context("invalid pipeline definition")?;

  pipeline
    .run()
    .await
    .with_context(|| format!("pipeline '{}' failed", def.id))
}

fn print_report(report: &PipelineReport) {
  eprintln!(
    "Pipeline {} completed in {}ms",
    report.pipeline_id,
    report.duration.as_millis()
  );
  for stage in &report.stages {
    eprintln!(
      "  {}: {} executed, {} restored",
      stage.stage,
      stage.executed.len(),
      stage.restored.len()
    );
  }
}
