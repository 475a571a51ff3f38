//! Stages: concurrently executed groups of executables.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use futures::StreamExt;
use futures::stream::FuturesUnordered;
use pipewright_checkpoint::{Checkpointer, path_component};
use pipewright_worker::Worker;
use tracing::{error, info, instrument};

use crate::config::RuntimeConfig;
use crate::error::RuntimeError;
use crate::executable::Executable;
use crate::output::{OutputResolver, StageOutput, slot};

/// How an executable's output was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
  Executed,
  Restored,
}

/// Summary of a completed stage run.
#[derive(Debug, Clone)]
pub struct StageReport {
  pub stage: String,
  /// Qualified names that ran on the worker.
  pub executed: Vec<String>,
  /// Qualified names replayed from an existing checkpoint.
  pub restored: Vec<String>,
  pub duration: Duration,
}

/// A named group of executables sharing one worker.
///
/// Each executable runs in its own [`Worker::scoped`] view of the worker.
///
/// Construction allocates one unresolved output per executable. Running the
/// stage settles each output exactly once: resolved when the executable's
/// result is checkpointed, rejected when it fails.
pub struct Stage {
  name: String,
  worker: Arc<dyn Worker>,
  executables: Vec<Executable>,
  outputs: Vec<StageOutput>,
  resolvers: Mutex<Vec<Option<OutputResolver>>>,
}

impl Stage {
  /// Create a stage, prefixing every executable's name with `name`.
  pub fn new(
    name: impl Into<String>,
    worker: Arc<dyn Worker>,
    mut executables: Vec<Executable>,
  ) -> Self {
    let name = name.into();

    let mut resolvers = Vec::with_capacity(executables.len());
    let mut outputs = Vec::with_capacity(executables.len());
    for executable in &mut executables {
      executable.set_prefix(&name);
      let (resolver, output) = slot(&executable.qualified_name());
      resolvers.push(Some(resolver));
      outputs.push(output);
    }

    Self {
      name,
      worker,
      executables,
      outputs,
      resolvers: Mutex::new(resolvers),
    }
  }

  pub fn name(&self) -> &str {
    &self.name
  }

  pub fn executables(&self) -> &[Executable] {
    &self.executables
  }

  /// The output of the executable at `index`.
  pub fn output(&self, index: usize) -> Option<&StageOutput> {
    self.outputs.get(index)
  }

  /// Outputs, indexed like the executables.
  pub fn outputs(&self) -> &[StageOutput] {
    &self.outputs
  }

  /// Run every executable concurrently.
  ///
  /// Executables with an existing checkpoint are not run; their recorded
  /// paths settle the output instead. A failure does not stop siblings that
  /// are already in flight; once all have finished, the first failure is
  /// returned.
  #[instrument(name = "stage_run", skip_all, fields(stage = %self.name))]
  pub async fn run(
    &self,
    checkpointer: &dyn Checkpointer,
    config: &RuntimeConfig,
  ) -> Result<StageReport, RuntimeError> {
    info!(executables = self.executables.len(), "stage_started");
    let start = Instant::now();

    let mut pending: FuturesUnordered<_> = self
      .executables
      .iter()
      .enumerate()
      .map(|(index, executable)| async move {
        let qualified_name = executable.qualified_name();
        let outcome = self
          .run_executable(index, executable, checkpointer, config)
          .await;
        (qualified_name, outcome)
      })
      .collect();

    let mut executed = Vec::new();
    let mut restored = Vec::new();
    let mut first_error = None;

    while let Some((qualified_name, outcome)) = pending.next().await {
      match outcome {
        Ok(Outcome::Executed) => executed.push(qualified_name),
        Ok(Outcome::Restored) => restored.push(qualified_name),
        Err(e) => {
          error!(qualified_name = %qualified_name, error = %e, "executable_failed");
          first_error.get_or_insert(e);
        }
      }
    }

    let duration = start.elapsed();
    if let Some(e) = first_error {
      error!(duration_ms = duration.as_millis() as u64, "stage_failed");
      return Err(e);
    }

    info!(
      executed = executed.len(),
      restored = restored.len(),
      duration_ms = duration.as_millis() as u64,
      "stage_completed"
    );

    Ok(StageReport {
      stage: self.name.clone(),
      executed,
      restored,
      duration,
    })
  }

  /// Run or restore one executable and settle its output.
  async fn run_executable(
    &self,
    index: usize,
    executable: &Executable,
    checkpointer: &dyn Checkpointer,
    config: &RuntimeConfig,
  ) -> Result<Outcome, RuntimeError> {
    let resolver = self.take_resolver(index, executable)?;

    match self
      .execute_or_restore(executable, checkpointer, config)
      .await
    {
      Ok((paths, outcome)) => {
        resolver.resolve(paths);
        Ok(outcome)
      }
      Err(e) => {
        resolver.reject(e.to_string());
        Err(e)
      }
    }
  }

  async fn execute_or_restore(
    &self,
    executable: &Executable,
    checkpointer: &dyn Checkpointer,
    config: &RuntimeConfig,
  ) -> Result<(Vec<PathBuf>, Outcome), RuntimeError> {
    let qualified_name = executable.qualified_name();
    let checkpoint_error = |source| RuntimeError::Checkpoint {
      name: qualified_name.clone(),
      source,
    };

    if checkpointer
      .exists(&qualified_name)
      .await
      .map_err(checkpoint_error)?
    {
      info!(qualified_name = %qualified_name, "checkpoint_found");
      let paths = checkpointer
        .read(&qualified_name)
        .await
        .map_err(checkpoint_error)?;
      return Ok((paths, Outcome::Restored));
    }

    let worker = self.worker.scoped(&path_component(&qualified_name));
    let result = executable.resolve_and_run(worker.as_ref(), config).await?;
    let paths = checkpointer
      .write(&qualified_name, &result)
      .await
      .map_err(checkpoint_error)?;

    Ok((paths, Outcome::Executed))
  }

  /// Take the resolver for `index`; a stage settles each output only once.
  fn take_resolver(
    &self,
    index: usize,
    executable: &Executable,
  ) -> Result<OutputResolver, RuntimeError> {
    self
      .resolvers
      .lock()
      .unwrap_or_else(|e| e.into_inner())
      .get_mut(index)
      .and_then(Option::take)
      .ok_or_else(|| RuntimeError::AlreadyResolved {
        qualified_name: executable.qualified_name(),
      })
  }
}

impl std::fmt::Debug for Stage {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Stage")
      .field("name", &self.name)
      .field("executables", &self.executables)
      .finish()
  }
}
