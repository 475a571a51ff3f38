//! Pipewright Checkpoint
//!
//! This crate provides durable checkpoint storage for pipeline runs. A
//! checkpoint maps an executable's qualified name to the list of local paths
//! its downstream consumers read. Once a record exists it is the truth for
//! that name, both for the rest of the run and for every resumed run in the
//! same namespace.
//!
//! The [`Checkpointer`] trait defines the storage contract. [`FsCheckpointer`]
//! stores one JSON record per qualified name under `{base_path}/{namespace}`,
//! plus a `.data` sidecar holding the captured text of stdout results.

mod fs;

pub use fs::FsCheckpointer;

use std::path::PathBuf;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// The outcome of running an executable, before it is checkpointed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExecutableResult {
  /// Raw captured standard output.
  Stdout { text: String },
  /// Local paths of files fetched back from the worker, in manifest order.
  Urls { paths: Vec<PathBuf> },
}

/// Error type for checkpoint storage operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
  /// The checkpointer was used before `init` assigned a namespace.
  #[error("checkpointer used before init")]
  NotInitialized,

  /// No record exists for the requested name.
  #[error("checkpoint not found: {0}")]
  NotFound(String),

  /// A record exists but cannot be parsed.
  #[error("corrupt checkpoint '{name}': {message}")]
  Corrupt { name: String, message: String },

  /// An I/O error occurred.
  #[error("io error: {0}")]
  Io(#[from] std::io::Error),

  /// A record could not be serialized.
  #[error("failed to serialize checkpoint: {0}")]
  Serialize(#[from] serde_json::Error),
}

/// Encode a qualified name as a single path component.
///
/// `%`, `/` and `\` are percent-encoded, so distinct names always map to
/// distinct file names.
pub fn path_component(name: &str) -> String {
  let mut out = String::with_capacity(name.len());
  for c in name.chars() {
    match c {
      '%' => out.push_str("%25"),
      '/' => out.push_str("%2F"),
      '\\' => out.push_str("%5C"),
      c => out.push(c),
    }
  }
  out
}

/// Checkpoint storage trait.
///
/// One checkpointer serves one pipeline run. The engine guarantees at most
/// one writer per qualified name, so implementations do not lock records.
#[async_trait]
pub trait Checkpointer: Send + Sync {
  /// Bind the checkpointer to a namespace, creating it if absent.
  ///
  /// Idempotent: existing records in the namespace are left untouched.
  async fn init(&self, namespace: &str) -> Result<(), Error>;

  /// Check whether a record exists for `name`.
  async fn exists(&self, name: &str) -> Result<bool, Error>;

  /// Read the path list recorded for `name`.
  async fn read(&self, name: &str) -> Result<Vec<PathBuf>, Error>;

  /// Persist `result` under `name` and return the path list consumers use.
  async fn write(&self, name: &str, result: &ExecutableResult) -> Result<Vec<PathBuf>, Error>;
}
