//! Shared test fixtures: a scripted in-memory worker.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use pipewright_runtime::{CommandOutput, FsCheckpointer, Worker, WorkerError};

/// One recorded worker call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
  Upload { local: PathBuf, remote: String },
  Execute(String),
  Download { remote: String, local: PathBuf },
}

type UploadHook = Box<dyn Fn(&Path) + Send + Sync>;

enum Response {
  Output(CommandOutput),
  Fail(String),
}

/// A worker that records calls and answers commands from a script.
///
/// Commands are matched by substring against registered patterns, first
/// match wins; unmatched commands succeed with empty stdout. Downloads write
/// the remote path as the file content.
///
/// Scoped views share the script and the call log with their parent.
#[derive(Default)]
pub struct MockWorker {
  state: Arc<State>,
}

#[derive(Default)]
struct State {
  calls: Mutex<Vec<Call>>,
  scopes: Mutex<Vec<String>>,
  responses: Mutex<Vec<(String, Response)>>,
  upload_failures: Mutex<Vec<(String, u32)>>,
  download_failures: Mutex<Vec<(String, u32)>>,
  upload_hook: Mutex<Option<UploadHook>>,
}

impl MockWorker {
  pub fn new() -> Arc<Self> {
    Arc::new(Self::default())
  }

  /// Succeed with `stdout` for commands containing `pattern`.
  pub fn respond(&self, pattern: &str, stdout: &str) {
    self.respond_with(
      pattern,
      CommandOutput {
        stdout: stdout.to_string(),
        stderr: String::new(),
        exit_code: Some(0),
      },
    );
  }

  pub fn respond_with(&self, pattern: &str, output: CommandOutput) {
    self
      .state
      .responses
      .lock()
      .unwrap()
      .push((pattern.to_string(), Response::Output(output)));
  }

  /// Report a substrate failure for commands containing `pattern`.
  pub fn fail_execute(&self, pattern: &str, message: &str) {
    self
      .state
      .responses
      .lock()
      .unwrap()
      .push((pattern.to_string(), Response::Fail(message.to_string())));
  }

  /// Fail the next `times` uploads whose remote path contains `pattern`.
  pub fn fail_uploads(&self, pattern: &str, times: u32) {
    self
      .state
      .upload_failures
      .lock()
      .unwrap()
      .push((pattern.to_string(), times));
  }

  /// Fail the next `times` downloads whose remote path contains `pattern`.
  pub fn fail_downloads(&self, pattern: &str, times: u32) {
    self
      .state
      .download_failures
      .lock()
      .unwrap()
      .push((pattern.to_string(), times));
  }

  /// Called with the local path of every upload, before it is recorded.
  pub fn on_upload(&self, hook: impl Fn(&Path) + Send + Sync + 'static) {
    *self.state.upload_hook.lock().unwrap() = Some(Box::new(hook));
  }

  /// Scopes handed out, in request order.
  pub fn scopes(&self) -> Vec<String> {
    self.state.scopes.lock().unwrap().clone()
  }

  pub fn calls(&self) -> Vec<Call> {
    self.state.calls.lock().unwrap().clone()
  }

  pub fn executes(&self) -> Vec<String> {
    self
      .calls()
      .into_iter()
      .filter_map(|c| match c {
        Call::Execute(command) => Some(command),
        _ => None,
      })
      .collect()
  }

  pub fn uploads(&self) -> Vec<(PathBuf, String)> {
    self
      .calls()
      .into_iter()
      .filter_map(|c| match c {
        Call::Upload { local, remote } => Some((local, remote)),
        _ => None,
      })
      .collect()
  }

  pub fn downloads(&self) -> Vec<(String, PathBuf)> {
    self
      .calls()
      .into_iter()
      .filter_map(|c| match c {
        Call::Download { remote, local } => Some((remote, local)),
        _ => None,
      })
      .collect()
  }

  fn record(&self, call: Call) {
    self.state.calls.lock().unwrap().push(call);
  }

  fn take_failure(failures: &Mutex<Vec<(String, u32)>>, path: &str) -> bool {
    let mut failures = failures.lock().unwrap();
    match failures
      .iter_mut()
      .find(|(pattern, remaining)| *remaining > 0 && path.contains(pattern.as_str()))
    {
      Some((_, remaining)) => {
        *remaining -= 1;
        true
      }
      None => false,
    }
  }
}

#[async_trait]
impl Worker for MockWorker {
  fn scoped(&self, scope: &str) -> Arc<dyn Worker> {
    self.state.scopes.lock().unwrap().push(scope.to_string());
    Arc::new(MockWorker {
      state: self.state.clone(),
    })
  }

  async fn upload(&self, local: &Path, remote: &str) -> Result<(), WorkerError> {
    tokio::task::yield_now().await;
    if let Some(hook) = self.state.upload_hook.lock().unwrap().as_ref() {
      hook(local);
    }
    self.record(Call::Upload {
      local: local.to_path_buf(),
      remote: remote.to_string(),
    });

    if Self::take_failure(&self.state.upload_failures, remote) {
      return Err(WorkerError::Failed {
        message: format!("upload of {} refused", remote),
      });
    }
    Ok(())
  }

  async fn execute(&self, command: &str) -> Result<CommandOutput, WorkerError> {
    tokio::task::yield_now().await;
    self.record(Call::Execute(command.to_string()));

    let responses = self.state.responses.lock().unwrap();
    match responses
      .iter()
      .find(|(pattern, _)| command.contains(pattern.as_str()))
    {
      Some((_, Response::Output(output))) => Ok(output.clone()),
      Some((_, Response::Fail(message))) => Err(WorkerError::Failed {
        message: message.clone(),
      }),
      None => Ok(CommandOutput {
        exit_code: Some(0),
        ..Default::default()
      }),
    }
  }

  async fn download(&self, remote: &str, local: &Path) -> Result<(), WorkerError> {
    tokio::task::yield_now().await;
    self.record(Call::Download {
      remote: remote.to_string(),
      local: local.to_path_buf(),
    });

    if Self::take_failure(&self.state.download_failures, remote) {
      return Err(WorkerError::Failed {
        message: format!("download of {} refused", remote),
      });
    }

    if let Some(parent) = local.parent() {
      std::fs::create_dir_all(parent)?;
    }
    std::fs::write(local, remote)?;
    Ok(())
  }
}

/// A checkpointer rooted in `dir`, ready for `Pipeline::run` to initialise.
pub fn checkpointer(dir: &Path) -> Arc<FsCheckpointer> {
  Arc::new(FsCheckpointer::new(dir.join("checkpoints")))
}

/// Runtime config writing downloads under `dir`.
pub fn config(dir: &Path) -> pipewright_runtime::RuntimeConfig {
  pipewright_runtime::RuntimeConfig {
    output_dir: dir.join("outputs"),
    ..Default::default()
  }
}
