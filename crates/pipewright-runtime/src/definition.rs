//! Building runtime pipelines from definitions.

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;

use pipewright_checkpoint::Checkpointer;
use pipewright_config::{ExecutableDef, ExecutableKind, InputDef, PipelineDef, StageDef};
use pipewright_worker::Worker;

use crate::config::RuntimeConfig;
use crate::error::RuntimeError;
use crate::executable::Executable;
use crate::graph::DependencyGraph;
use crate::input::Input;
use crate::pipeline::Pipeline;
use crate::stage::Stage;

/// Stage-level dependency graph of a definition.
///
/// Fails on duplicate stage or executable names, on references to unknown
/// stages or executables, and on executables that consume their own stage.
pub fn stage_graph(def: &PipelineDef) -> Result<DependencyGraph, RuntimeError> {
  let mut executables: HashMap<&str, HashSet<&str>> = HashMap::new();
  for stage in &def.stages {
    let mut names = HashSet::new();
    for executable in &stage.executables {
      if !names.insert(executable.name.as_str()) {
        return Err(RuntimeError::configuration(format!(
          "stage '{}' declares '{}' more than once",
          stage.name, executable.name
        )));
      }
    }
    if executables.insert(stage.name.as_str(), names).is_some() {
      return Err(RuntimeError::configuration(format!(
        "stage '{}' is declared more than once",
        stage.name
      )));
    }
  }

  let mut edges = Vec::new();
  for stage in &def.stages {
    for executable in &stage.executables {
      for (producer_stage, producer) in executable.inputs().filter_map(InputDef::producer) {
        let known = executables
          .get(producer_stage)
          .is_some_and(|names| names.contains(producer));
        if !known {
          return Err(RuntimeError::configuration(format!(
            "'{}::{}' references unknown output '{}::{}'",
            stage.name, executable.name, producer_stage, producer
          )));
        }
        if producer_stage == stage.name {
          return Err(RuntimeError::configuration(format!(
            "'{}::{}' cannot consume an output of its own stage",
            stage.name, executable.name
          )));
        }
        edges.push((producer_stage.to_string(), stage.name.clone()));
      }
    }
  }

  let nodes = def.stages.iter().map(|s| s.name.clone()).collect();
  Ok(DependencyGraph::new(nodes, &edges))
}

/// Build a [`Pipeline`] from a definition.
///
/// Relative file paths resolve against `base_dir`. Every stage runs on
/// `worker`. Stages are constructed producers-first so output references can
/// be captured, then kept in declaration order.
pub fn build_pipeline(
  def: &PipelineDef,
  base_dir: &Path,
  checkpointer: Arc<dyn Checkpointer>,
  worker: Arc<dyn Worker>,
  config: RuntimeConfig,
) -> Result<Pipeline, RuntimeError> {
  let graph = stage_graph(def)?;
  let order = graph.topological_order()?;

  let mut built: HashMap<&str, Stage> = HashMap::new();
  for stage_name in order {
    let Some(stage_def) = def.stages.iter().find(|s| s.name == stage_name) else {
      continue;
    };
    let stage = build_stage(stage_def, base_dir, worker.clone(), &built)?;
    built.insert(stage_def.name.as_str(), stage);
  }

  let stages = def
    .stages
    .iter()
    .filter_map(|s| built.remove(s.name.as_str()))
    .collect();

  Pipeline::with_config(def.id.clone(), checkpointer, stages, config)
}

fn build_stage(
  def: &StageDef,
  base_dir: &Path,
  worker: Arc<dyn Worker>,
  built: &HashMap<&str, Stage>,
) -> Result<Stage, RuntimeError> {
  let executables = def
    .executables
    .iter()
    .map(|e| build_executable(e, base_dir, built))
    .collect::<Result<Vec<_>, _>>()?;

  Ok(Stage::new(def.name.clone(), worker, executables))
}

fn build_executable(
  def: &ExecutableDef,
  base_dir: &Path,
  built: &HashMap<&str, Stage>,
) -> Result<Executable, RuntimeError> {
  let program = build_input(&def.program, base_dir, built)?;
  let args = def
    .args
    .iter()
    .map(|a| build_input(a, base_dir, built))
    .collect::<Result<Vec<_>, _>>()?;

  let executable = match def.kind {
    ExecutableKind::Stdout => Executable::stdout(def.name.clone(), program, args),
    ExecutableKind::Files => Executable::files(def.name.clone(), program, args),
  };

  Ok(match &def.interpreter {
    Some(interpreter) => executable.with_interpreter(interpreter.clone()),
    None => executable,
  })
}

fn build_input(
  def: &InputDef,
  base_dir: &Path,
  built: &HashMap<&str, Stage>,
) -> Result<Input, RuntimeError> {
  match def {
    InputDef::Literal { values } => Ok(Input::Literal(values.clone())),
    InputDef::File { path } => Ok(Input::file(base_dir.join(path))),
    InputDef::Output {
      stage,
      executable,
      item,
    } => {
      let output = built
        .get(stage.as_str())
        .and_then(|s| {
          s.executables()
            .iter()
            .position(|e| e.name() == executable)
            .and_then(|index| s.output(index))
        })
        .ok_or_else(|| {
          RuntimeError::configuration(format!(
            "output '{}::{}' is not available",
            stage, executable
          ))
        })?;
      Ok(output.file(*item))
    }
  }
}
