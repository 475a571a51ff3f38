//! Pipelines: checkpoint-scoped collections of stages.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::StreamExt;
use futures::stream::FuturesUnordered;
use pipewright_checkpoint::Checkpointer;
use tracing::{error, info, instrument};

use crate::config::RuntimeConfig;
use crate::error::RuntimeError;
use crate::graph::DependencyGraph;
use crate::stage::{Stage, StageReport};

/// Summary of a completed pipeline run.
#[derive(Debug, Clone)]
pub struct PipelineReport {
  pub pipeline_id: String,
  /// One report per stage, in declaration order.
  pub stages: Vec<StageReport>,
  /// Total wall-clock duration.
  pub duration: Duration,
}

impl PipelineReport {
  /// Qualified names that ran on a worker during this run.
  pub fn executed(&self) -> impl Iterator<Item = &str> {
    self
      .stages
      .iter()
      .flat_map(|s| s.executed.iter().map(String::as_str))
  }

  /// Qualified names replayed from checkpoints.
  pub fn restored(&self) -> impl Iterator<Item = &str> {
    self
      .stages
      .iter()
      .flat_map(|s| s.restored.iter().map(String::as_str))
  }
}

/// A named set of stages run against one checkpoint namespace.
///
/// Stages have no declared order. They all start together, and an executable
/// whose input references another executable's output simply waits for it.
pub struct Pipeline {
  id: String,
  checkpointer: Arc<dyn Checkpointer>,
  stages: Vec<Stage>,
  config: RuntimeConfig,
}

impl Pipeline {
  /// Create a pipeline with the default [`RuntimeConfig`].
  pub fn new(
    id: impl Into<String>,
    checkpointer: Arc<dyn Checkpointer>,
    stages: Vec<Stage>,
  ) -> Result<Self, RuntimeError> {
    Self::with_config(id, checkpointer, stages, RuntimeConfig::default())
  }

  /// Create a pipeline, validating how its stages are wired.
  ///
  /// Fails if two executables share a qualified name, if an input waits on
  /// an output no stage of this pipeline produces, or if output references
  /// form a cycle. A relative `output_dir` is made absolute against the
  /// current directory.
  pub fn with_config(
    id: impl Into<String>,
    checkpointer: Arc<dyn Checkpointer>,
    stages: Vec<Stage>,
    mut config: RuntimeConfig,
  ) -> Result<Self, RuntimeError> {
    dependency_graph(&stages)?.topological_order()?;

    // Download paths end up in checkpoint records and must survive a resume
    // from another working directory.
    config.output_dir = std::path::absolute(&config.output_dir).map_err(|e| {
      RuntimeError::configuration(format!(
        "cannot resolve output directory '{}': {}",
        config.output_dir.display(),
        e
      ))
    })?;

    Ok(Self {
      id: id.into(),
      checkpointer,
      stages,
      config,
    })
  }

  pub fn id(&self) -> &str {
    &self.id
  }

  pub fn stages(&self) -> &[Stage] {
    &self.stages
  }

  pub fn stage(&self, name: &str) -> Option<&Stage> {
    self.stages.iter().find(|s| s.name() == name)
  }

  pub fn config(&self) -> &RuntimeConfig {
    &self.config
  }

  /// Executable-level dependency graph.
  pub fn graph(&self) -> Result<DependencyGraph, RuntimeError> {
    dependency_graph(&self.stages)
  }

  /// Initialise the checkpoint namespace and run all stages concurrently.
  ///
  /// Every stage is driven to completion. If any failed, the first failure
  /// observed is returned; checkpoints written by the others are kept.
  #[instrument(name = "pipeline_run", skip_all, fields(pipeline_id = %self.id))]
  pub async fn run(&self) -> Result<PipelineReport, RuntimeError> {
    info!(stages = self.stages.len(), "pipeline_started");

    self
      .checkpointer
      .init(&self.id)
      .await
      .map_err(|source| RuntimeError::Checkpoint {
        name: self.id.clone(),
        source,
      })?;

    let start = Instant::now();
    let checkpointer = self.checkpointer.as_ref();

    let mut pending: FuturesUnordered<_> = self
      .stages
      .iter()
      .enumerate()
      .map(|(index, stage)| async move { (index, stage.run(checkpointer, &self.config).await) })
      .collect();

    let mut reports = Vec::with_capacity(self.stages.len());
    let mut first_error = None;
    while let Some((index, result)) = pending.next().await {
      match result {
        Ok(report) => reports.push((index, report)),
        Err(e) => {
          first_error.get_or_insert(e);
        }
      }
    }

    let duration = start.elapsed();
    let duration_ms = duration.as_millis() as u64;

    if let Some(e) = first_error {
      error!(error = %e, duration_ms, "pipeline_failed");
      return Err(e);
    }

    reports.sort_by_key(|(index, _)| *index);
    info!(duration_ms, "pipeline_completed");

    Ok(PipelineReport {
      pipeline_id: self.id.clone(),
      stages: reports.into_iter().map(|(_, report)| report).collect(),
      duration,
    })
  }
}

impl std::fmt::Debug for Pipeline {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Pipeline")
      .field("id", &self.id)
      .field("stages", &self.stages)
      .field("config", &self.config)
      .finish()
  }
}

/// Build the executable graph, rejecting duplicate and dangling names.
fn dependency_graph(stages: &[Stage]) -> Result<DependencyGraph, RuntimeError> {
  let mut names = Vec::new();
  let mut seen = HashSet::new();
  let mut producers: HashMap<usize, String> = HashMap::new();

  for stage in stages {
    for (executable, output) in stage.executables().iter().zip(stage.outputs()) {
      let qualified_name = executable.qualified_name();
      if !seen.insert(qualified_name.clone()) {
        return Err(RuntimeError::configuration(format!(
          "duplicate qualified name '{}'",
          qualified_name
        )));
      }
      producers.insert(output.slot_key(), qualified_name.clone());
      names.push(qualified_name);
    }
  }

  let mut edges = Vec::new();
  for stage in stages {
    for executable in stage.executables() {
      for upstream in executable.inputs().filter_map(|i| i.upstream()) {
        let producer = producers.get(&upstream.slot_key()).ok_or_else(|| {
          RuntimeError::configuration(format!(
            "'{}' waits on the output of '{}', which is not produced by this pipeline",
            executable.qualified_name(),
            upstream.producer()
          ))
        })?;
        edges.push((producer.clone(), executable.qualified_name()));
      }
    }
  }

  Ok(DependencyGraph::new(names, &edges))
}
