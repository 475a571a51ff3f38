//! Executables: units of remote work.
//!
//! A [`StdoutExecutable`] uploads its program and inputs, runs one command
//! line on the worker, and yields the captured stdout. A [`FilesExecutable`]
//! wraps one, reads the stdout as a manifest of worker paths, and fetches
//! each file back before it is considered complete.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Instant;

use pipewright_checkpoint::{ExecutableResult, path_component};
use pipewright_worker::Worker;
use tracing::{info, instrument};

use crate::config::RuntimeConfig;
use crate::error::{RuntimeError, TransferOp};
use crate::input::Input;
use crate::transfer::with_attempts;

/// Separator between the stage prefix and the executable name.
pub const QUALIFIED_SEPARATOR: &str = "::";

/// Runs a program on a worker and captures its standard output.
#[derive(Debug, Clone)]
pub struct StdoutExecutable {
  name: String,
  prefix: String,
  program: Input,
  args: Vec<Input>,
  interpreter: Option<String>,
}

impl StdoutExecutable {
  pub fn new(name: impl Into<String>, program: Input, args: Vec<Input>) -> Self {
    Self {
      name: name.into(),
      prefix: String::new(),
      program,
      args,
      interpreter: None,
    }
  }

  /// Run the program through `interpreter` instead of executing it directly.
  pub fn with_interpreter(mut self, interpreter: impl Into<String>) -> Self {
    self.interpreter = Some(interpreter.into());
    self
  }

  pub fn name(&self) -> &str {
    &self.name
  }

  /// `{prefix}::{name}`, where the prefix is assigned by the owning stage.
  pub fn qualified_name(&self) -> String {
    format!("{}{}{}", self.prefix, QUALIFIED_SEPARATOR, self.name)
  }

  pub(crate) fn set_prefix(&mut self, prefix: &str) {
    self.prefix = prefix.to_string();
  }

  pub fn program(&self) -> &Input {
    &self.program
  }

  pub fn args(&self) -> &[Input] {
    &self.args
  }

  pub fn interpreter(&self) -> Option<&str> {
    self.interpreter.as_deref()
  }

  /// Build the command line run on the worker.
  pub fn command_line(&self, program_path: &str, args: &[String]) -> String {
    let invocation = match &self.interpreter {
      Some(interpreter) => format!("{} {}", interpreter, program_path),
      None => format!("chmod +x {0} && {0}", program_path),
    };

    if args.is_empty() {
      invocation
    } else {
      format!("{} {}", invocation, args.join(" "))
    }
  }

  /// Upload the program, resolve arguments in order, run, and return stdout.
  ///
  /// Arguments are resolved one at a time: later inputs may rely on earlier
  /// uploads, and worker upload channels are not assumed to be concurrent.
  pub async fn run(
    &self,
    worker: &dyn Worker,
    config: &RuntimeConfig,
  ) -> Result<String, RuntimeError> {
    let qualified_name = self.qualified_name();

    let program_path = self.program.resolve(worker, config).await?;
    let mut args = Vec::with_capacity(self.args.len());
    for input in &self.args {
      args.push(input.resolve(worker, config).await?);
    }

    let command = self.command_line(&program_path, &args);
    info!(qualified_name = %qualified_name, command = %command, "executable_started");

    let start = Instant::now();
    let output = worker
      .execute(&command)
      .await
      .map_err(|e| RuntimeError::Execution {
        qualified_name: qualified_name.clone(),
        message: e.to_string(),
        stdout: String::new(),
        stderr: String::new(),
        duration_ms: start.elapsed().as_millis() as u64,
      })?;
    let duration_ms = start.elapsed().as_millis() as u64;

    info!(qualified_name = %qualified_name, stderr = %output.stderr, "executable stderr");

    if !output.success() {
      let message = match output.exit_code {
        Some(code) => format!("command exited with status {}", code),
        None => "command terminated by signal".to_string(),
      };
      return Err(RuntimeError::Execution {
        qualified_name,
        message,
        stdout: output.stdout,
        stderr: output.stderr,
        duration_ms,
      });
    }

    info!(qualified_name = %qualified_name, duration_ms, "executable_completed");
    Ok(output.stdout)
  }
}

/// Runs a program whose stdout lists files to fetch back from the worker.
#[derive(Debug, Clone)]
pub struct FilesExecutable {
  inner: StdoutExecutable,
}

impl FilesExecutable {
  pub fn new(name: impl Into<String>, program: Input, args: Vec<Input>) -> Self {
    Self {
      inner: StdoutExecutable::new(name, program, args),
    }
  }

  pub fn with_interpreter(self, interpreter: impl Into<String>) -> Self {
    Self {
      inner: self.inner.with_interpreter(interpreter),
    }
  }

  /// The wrapped stdout-producing step.
  pub fn command(&self) -> &StdoutExecutable {
    &self.inner
  }

  /// Local destination of a downloaded manifest entry.
  pub fn local_path(&self, config: &RuntimeConfig, file_name: &str) -> PathBuf {
    config
      .output_dir
      .join(path_component(&self.inner.qualified_name()))
      .join(file_name)
  }

  /// Pair every manifest entry with its local destination.
  ///
  /// Fails if an entry names no file, or if two entries share a file name
  /// and would land on the same local path.
  fn plan_downloads<'a>(
    &self,
    config: &RuntimeConfig,
    stdout: &'a str,
  ) -> Result<Vec<(&'a str, PathBuf)>, RuntimeError> {
    let mut seen = HashSet::new();
    parse_manifest(stdout)
      .into_iter()
      .map(|remote| {
        let invalid = |reason: &str| RuntimeError::InvalidManifest {
          qualified_name: self.inner.qualified_name(),
          entry: remote.to_string(),
          reason: reason.to_string(),
        };
        let file_name = Path::new(remote)
          .file_name()
          .map(|n| n.to_string_lossy().into_owned())
          .ok_or_else(|| invalid("has no file name"))?;
        if !seen.insert(file_name.clone()) {
          return Err(invalid("repeats the file name of an earlier entry"));
        }
        Ok((remote, self.local_path(config, &file_name)))
      })
      .collect()
  }

  /// Run the wrapped step, then download every manifest entry in order.
  ///
  /// The whole manifest is validated before any download. Downloads are
  /// strictly sequential; the first failure aborts the run and nothing is
  /// returned for the partial manifest.
  pub async fn run(
    &self,
    worker: &dyn Worker,
    config: &RuntimeConfig,
  ) -> Result<Vec<PathBuf>, RuntimeError> {
    let stdout = self.inner.run(worker, config).await?;
    let qualified_name = self.inner.qualified_name();
    let downloads = self.plan_downloads(config, &stdout)?;

    let mut local_paths = Vec::with_capacity(downloads.len());
    for (remote, local) in downloads {
      let to = local.display().to_string();
      with_attempts(
        TransferOp::Download,
        remote,
        &to,
        config.transfer_attempts,
        || worker.download(remote, &local),
      )
      .await?;

      info!(qualified_name = %qualified_name, from = %remote, to = %to, "downloaded output");
      local_paths.push(local);
    }

    Ok(local_paths)
  }
}

/// Split stdout into manifest entries, skipping blank lines.
pub fn parse_manifest(stdout: &str) -> Vec<&str> {
  stdout
    .split('\n')
    .map(|line| line.strip_suffix('\r').unwrap_or(line))
    .filter(|line| !line.is_empty())
    .collect()
}

/// A unit of remote work owned by a stage.
#[derive(Debug, Clone)]
pub enum Executable {
  Stdout(StdoutExecutable),
  Files(FilesExecutable),
}

impl Executable {
  /// An executable whose result is its captured stdout.
  pub fn stdout(name: impl Into<String>, program: Input, args: Vec<Input>) -> Self {
    Executable::Stdout(StdoutExecutable::new(name, program, args))
  }

  /// An executable whose stdout lists files to fetch back.
  pub fn files(name: impl Into<String>, program: Input, args: Vec<Input>) -> Self {
    Executable::Files(FilesExecutable::new(name, program, args))
  }

  pub fn with_interpreter(self, interpreter: impl Into<String>) -> Self {
    match self {
      Executable::Stdout(e) => Executable::Stdout(e.with_interpreter(interpreter)),
      Executable::Files(e) => Executable::Files(e.with_interpreter(interpreter)),
    }
  }

  fn command(&self) -> &StdoutExecutable {
    match self {
      Executable::Stdout(e) => e,
      Executable::Files(e) => e.command(),
    }
  }

  pub fn name(&self) -> &str {
    self.command().name()
  }

  pub fn qualified_name(&self) -> String {
    self.command().qualified_name()
  }

  pub(crate) fn set_prefix(&mut self, prefix: &str) {
    match self {
      Executable::Stdout(e) => e.set_prefix(prefix),
      Executable::Files(e) => e.inner.set_prefix(prefix),
    }
  }

  /// The program input followed by the arguments, in declared order.
  pub fn inputs(&self) -> impl Iterator<Item = &Input> {
    let command = self.command();
    std::iter::once(command.program()).chain(command.args().iter())
  }

  /// Run on `worker` and classify the result.
  #[instrument(
    name = "executable_run",
    skip_all,
    fields(qualified_name = %self.qualified_name())
  )]
  pub async fn resolve_and_run(
    &self,
    worker: &dyn Worker,
    config: &RuntimeConfig,
  ) -> Result<ExecutableResult, RuntimeError> {
    match self {
      Executable::Stdout(e) => {
        let text = e.run(worker, config).await?;
        Ok(ExecutableResult::Stdout { text })
      }
      Executable::Files(e) => {
        let paths = e.run(worker, config).await?;
        Ok(ExecutableResult::Urls { paths })
      }
    }
  }
}

impl From<StdoutExecutable> for Executable {
  fn from(e: StdoutExecutable) -> Self {
    Executable::Stdout(e)
  }
}

impl From<FilesExecutable> for Executable {
  fn from(e: FilesExecutable) -> Self {
    Executable::Files(e)
  }
}
