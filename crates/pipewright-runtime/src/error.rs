//! Runtime error types.

use std::fmt;

use pipewright_worker::WorkerError;

use crate::output::OutputRejected;

/// Direction of a file transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferOp {
  Upload,
  Download,
}

impl fmt::Display for TransferOp {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      TransferOp::Upload => f.write_str("upload"),
      TransferOp::Download => f.write_str("download"),
    }
  }
}

/// Errors that can occur while building or running a pipeline.
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
  /// The pipeline is wired incorrectly (duplicate names, dangling or cyclic
  /// references, malformed inputs).
  #[error("invalid pipeline configuration: {message}")]
  Configuration { message: String },

  /// A file transfer kept failing until the attempt budget ran out.
  #[error("{operation} from '{from}' to '{to}' failed after {attempts} attempt(s): {source}")]
  Transfer {
    operation: TransferOp,
    from: String,
    to: String,
    attempts: u32,
    #[source]
    source: WorkerError,
  },

  /// The command failed on the worker.
  #[error("execution of '{qualified_name}' failed after {duration_ms}ms: {message}")]
  Execution {
    qualified_name: String,
    message: String,
    stdout: String,
    stderr: String,
    duration_ms: u64,
  },

  /// A manifest line cannot be mapped to its own local file.
  #[error("invalid manifest from '{qualified_name}': entry '{entry}' {reason}")]
  InvalidManifest {
    qualified_name: String,
    entry: String,
    reason: String,
  },

  /// Checkpoint storage failed.
  #[error("checkpoint '{name}' failed: {source}")]
  Checkpoint {
    name: String,
    #[source]
    source: pipewright_checkpoint::Error,
  },

  /// An output this executable depends on was rejected.
  #[error(transparent)]
  Upstream(#[from] OutputRejected),

  /// An input asked for a path the producer did not record.
  #[error("output of '{producer}' has {len} path(s), item {item} requested")]
  MissingOutput {
    producer: String,
    item: usize,
    len: usize,
  },

  /// An output was settled twice.
  #[error("output of '{qualified_name}' was already settled")]
  AlreadyResolved { qualified_name: String },
}

impl RuntimeError {
  pub(crate) fn configuration(message: impl Into<String>) -> Self {
    RuntimeError::Configuration {
      message: message.into(),
    }
  }
}
