use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use tokio::fs;
use tokio::process::Command;
use tracing::debug;

use crate::{CommandOutput, Worker, WorkerError};

/// A worker backed by a directory on the local machine.
///
/// Relative remote paths are resolved against `root`, which is also the
/// working directory of every command. Absolute remote paths are used as-is.
pub struct LocalWorker {
  root: PathBuf,
}

impl LocalWorker {
  /// Create a new local worker rooted at `root`.
  pub fn new(root: impl Into<PathBuf>) -> Self {
    Self { root: root.into() }
  }

  /// The worker's working directory.
  pub fn root(&self) -> &Path {
    &self.root
  }

  /// Map a remote path to its location on this machine.
  pub fn remote_path(&self, remote: &str) -> PathBuf {
    let path = Path::new(remote);
    if path.is_absolute() {
      path.to_path_buf()
    } else {
      self.root.join(path)
    }
  }
}

#[async_trait]
impl Worker for LocalWorker {
  /// A worker rooted at `{root}/{scope}`.
  fn scoped(&self, scope: &str) -> Arc<dyn Worker> {
    Arc::new(LocalWorker::new(self.root.join(scope)))
  }

  async fn upload(&self, local: &Path, remote: &str) -> Result<(), WorkerError> {
    let dest = self.remote_path(remote);
    copy_file(local, &dest).await?;
    debug!(from = %local.display(), to = %dest.display(), "uploaded");
    Ok(())
  }

  async fn execute(&self, command: &str) -> Result<CommandOutput, WorkerError> {
    fs::create_dir_all(&self.root).await?;

    let output = Command::new("sh")
      .arg("-c")
      .arg(command)
      .current_dir(&self.root)
      .stdin(Stdio::null())
      .output()
      .await?;

    Ok(CommandOutput {
      stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
      stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
      exit_code: output.status.code(),
    })
  }

  async fn download(&self, remote: &str, local: &Path) -> Result<(), WorkerError> {
    let src = self.remote_path(remote);
    copy_file(&src, local).await?;
    debug!(from = %src.display(), to = %local.display(), "downloaded");
    Ok(())
  }
}

static COPY_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Copy through a temporary sibling renamed into place; readers of `to` never
/// see a partial file.
async fn copy_file(from: &Path, to: &Path) -> Result<(), WorkerError> {
  if let Some(parent) = to.parent() {
    fs::create_dir_all(parent).await?;
  }

  let file_name = to
    .file_name()
    .map(|n| n.to_string_lossy().into_owned())
    .unwrap_or_default();
  let tmp = to.with_file_name(format!(
    ".~{}.{}.tmp",
    file_name,
    COPY_COUNTER.fetch_add(1, Ordering::Relaxed)
  ));

  if let Err(e) = fs::copy(from, &tmp).await {
    let _ = fs::remove_file(&tmp).await;
    return Err(e.into());
  }
  fs::rename(&tmp, to).await?;
  Ok(())
}
