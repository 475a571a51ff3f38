//! Pipewright Worker
//!
//! This crate defines the capability a stage needs from the machine that runs
//! its executables: move files to and from it, and run a command line on it.
//! The substrate behind a [`Worker`] owns worker acquisition, capacity, and
//! any network retries below the file-transfer level.
//!
//! [`LocalWorker`] implements the trait against a directory on the local
//! machine, which is enough to run pipelines without a remote substrate.

mod local;

pub use local::LocalWorker;

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;

/// Error type for worker operations.
#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
  /// The substrate reported a failure.
  #[error("worker failure: {message}")]
  Failed { message: String },

  /// An I/O error occurred.
  #[error("io error: {0}")]
  Io(#[from] std::io::Error),
}

/// Captured result of a command line run on a worker.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
  pub stdout: String,
  pub stderr: String,
  /// Exit status, or `None` if the process was terminated by a signal.
  pub exit_code: Option<i32>,
}

impl CommandOutput {
  /// Whether the command exited with status zero.
  pub fn success(&self) -> bool {
    self.exit_code == Some(0)
  }
}

/// A remote execution capability.
///
/// Each executable works through its own [`Worker::scoped`] view. `upload`
/// and `execute` may be invoked concurrently on different scopes.
/// `download` is only ever called sequentially per executable, since not
/// every substrate supports concurrent downloads.
#[async_trait]
pub trait Worker: Send + Sync {
  /// A view of this worker private to one executable.
  ///
  /// Relative remote paths and the working directory of commands resolve
  /// inside `scope`, so concurrent executables never see each other's
  /// uploads or outputs. `scope` is a single path component.
  fn scoped(&self, scope: &str) -> Arc<dyn Worker>;

  /// Copy a local file to `remote` on the worker.
  async fn upload(&self, local: &Path, remote: &str) -> Result<(), WorkerError>;

  /// Run a command line on the worker and capture its output.
  async fn execute(&self, command: &str) -> Result<CommandOutput, WorkerError>;

  /// Copy `remote` on the worker to a local file.
  async fn download(&self, remote: &str, local: &Path) -> Result<(), WorkerError>;
}
