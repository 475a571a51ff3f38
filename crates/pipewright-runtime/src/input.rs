//! Executable inputs.
//!
//! An [`Input`] is resolved when its executable runs. Literal inputs become
//! command-line text. File inputs are uploaded to the worker and resolve to
//! the remote path; a file input may point at another executable's output,
//! in which case resolving it waits for that output to settle.

use std::path::{Path, PathBuf};

use pipewright_worker::Worker;
use tracing::info;

use crate::config::RuntimeConfig;
use crate::error::{RuntimeError, TransferOp};
use crate::output::StageOutput;
use crate::transfer::with_attempts;

/// Where a file input comes from.
#[derive(Debug, Clone)]
pub enum FileSource {
  /// A file that already exists locally.
  Path(PathBuf),
  /// The `item`-th path recorded by another executable.
  Output { output: StageOutput, item: usize },
}

/// A value source for an executable.
#[derive(Debug, Clone)]
pub enum Input {
  /// Literal values, joined by single spaces.
  Literal(Vec<String>),
  /// A file uploaded to the worker.
  File(FileSource),
}

impl Input {
  pub fn literal<I, S>(values: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    Input::Literal(values.into_iter().map(Into::into).collect())
  }

  pub fn file(path: impl Into<PathBuf>) -> Self {
    Input::File(FileSource::Path(path.into()))
  }

  pub fn output(output: &StageOutput, item: usize) -> Self {
    Input::File(FileSource::Output {
      output: output.clone(),
      item,
    })
  }

  /// The output this input waits on, if any.
  pub fn upstream(&self) -> Option<&StageOutput> {
    match self {
      Input::File(FileSource::Output { output, .. }) => Some(output),
      _ => None,
    }
  }

  /// The local path of a static file input.
  pub fn local_path(&self) -> Option<&Path> {
    match self {
      Input::File(FileSource::Path(path)) => Some(path),
      _ => None,
    }
  }

  /// Resolve to the text placed on the command line.
  ///
  /// File inputs are uploaded to `{remote_input_dir}/{file_name}`, retrying
  /// up to `transfer_attempts` times.
  pub async fn resolve(
    &self,
    worker: &dyn Worker,
    config: &RuntimeConfig,
  ) -> Result<String, RuntimeError> {
    match self {
      Input::Literal(values) => Ok(values.join(" ")),
      Input::File(source) => {
        let local = source.local_path().await?;
        upload(worker, config, &local).await
      }
    }
  }
}

impl FileSource {
  async fn local_path(&self) -> Result<PathBuf, RuntimeError> {
    match self {
      FileSource::Path(path) => Ok(path.clone()),
      FileSource::Output { output, item } => {
        let paths = output.paths().await?;
        paths
          .get(*item)
          .cloned()
          .ok_or_else(|| RuntimeError::MissingOutput {
            producer: output.producer().to_string(),
            item: *item,
            len: paths.len(),
          })
      }
    }
  }
}

async fn upload(
  worker: &dyn Worker,
  config: &RuntimeConfig,
  local: &Path,
) -> Result<String, RuntimeError> {
  let file_name = local.file_name().ok_or_else(|| {
    RuntimeError::configuration(format!(
      "file input '{}' has no file name",
      local.display()
    ))
  })?;
  let remote = format!(
    "{}/{}",
    config.remote_input_dir.trim_end_matches('/'),
    file_name.to_string_lossy()
  );

  let from = local.display().to_string();
  with_attempts(
    TransferOp::Upload,
    &from,
    &remote,
    config.transfer_attempts,
    || worker.upload(local, &remote),
  )
  .await?;

  info!(from = %from, to = %remote, "uploaded input");
  Ok(remote)
}
