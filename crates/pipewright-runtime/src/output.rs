//! Single-assignment stage outputs.
//!
//! Each executable owns one output slot. The [`OutputResolver`] half stays
//! with the stage and settles the slot exactly once; it is consumed by value,
//! so a second settlement cannot be expressed. The [`StageOutput`] half is a
//! cloneable handle that any number of downstream inputs can await.

use std::path::PathBuf;
use std::sync::Arc;

use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use tokio::sync::oneshot;

use crate::input::Input;

type Settled = Result<Arc<[PathBuf]>, OutputRejected>;

/// The producer of an awaited output failed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("upstream '{producer}' failed: {message}")]
pub struct OutputRejected {
  /// Qualified name of the failed producer.
  pub producer: String,
  pub message: String,
}

/// Settles one output slot.
pub struct OutputResolver {
  producer: Arc<str>,
  sender: oneshot::Sender<Settled>,
}

impl OutputResolver {
  /// Fulfil the slot with the producer's recorded paths.
  pub fn resolve(self, paths: Vec<PathBuf>) {
    // The stage keeps a handle alive, so the receiver is never gone early.
    let _ = self.sender.send(Ok(paths.into()));
  }

  /// Reject the slot; every consumer fails with [`OutputRejected`].
  pub fn reject(self, message: impl Into<String>) {
    let rejected = OutputRejected {
      producer: self.producer.to_string(),
      message: message.into(),
    };
    let _ = self.sender.send(Err(rejected));
  }
}

/// A handle to the eventual path list of one executable.
#[derive(Clone)]
pub struct StageOutput {
  producer: Arc<str>,
  settled: Shared<BoxFuture<'static, Settled>>,
}

impl StageOutput {
  /// Qualified name of the executable that produces this output.
  pub fn producer(&self) -> &str {
    &self.producer
  }

  /// Wait for the producer and return its recorded paths.
  pub async fn paths(&self) -> Result<Vec<PathBuf>, OutputRejected> {
    self.settled.clone().await.map(|paths| paths.to_vec())
  }

  /// Whether the slot has been resolved or rejected.
  pub fn is_settled(&self) -> bool {
    self.settled.peek().is_some()
  }

  /// An input that uploads the `item`-th path of this output.
  pub fn file(&self, item: usize) -> Input {
    Input::output(self, item)
  }

  /// Identity of the underlying slot, shared by all clones.
  pub(crate) fn slot_key(&self) -> usize {
    Arc::as_ptr(&self.producer) as *const u8 as usize
  }
}

impl std::fmt::Debug for StageOutput {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("StageOutput")
      .field("producer", &self.producer)
      .field("settled", &self.is_settled())
      .finish()
  }
}

/// Allocate an unresolved output slot for `producer`.
pub(crate) fn slot(producer: &str) -> (OutputResolver, StageOutput) {
  let (sender, receiver) = oneshot::channel::<Settled>();
  let producer: Arc<str> = Arc::from(producer);

  let dropped_producer = producer.clone();
  let settled = async move {
    match receiver.await {
      Ok(settled) => settled,
      Err(_) => Err(OutputRejected {
        producer: dropped_producer.to_string(),
        message: "output dropped before it was settled".to_string(),
      }),
    }
  }
  .boxed()
  .shared();

  (
    OutputResolver {
      producer: producer.clone(),
      sender,
    },
    StageOutput { producer, settled },
  )
}
