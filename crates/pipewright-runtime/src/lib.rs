//! Pipewright Runtime
//!
//! This crate provides the pipeline runtime for pipewright: resumable,
//! checkpointed execution of stages whose executables run on workers.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                         Pipeline                            │
//! │  - init(checkpoint namespace)                               │
//! │  - runs every stage concurrently                            │
//! └─────────────────────────────────────────────────────────────┘
//!                               │
//!                               ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                          Stage                              │
//! │  - one StageOutput per executable                           │
//! │  - checkpoint hit → restore, miss → run + write             │
//! └─────────────────────────────────────────────────────────────┘
//!                               │
//!                               ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        Executable                           │
//! │  - resolve inputs (may await other StageOutputs)            │
//! │  - execute on the Worker, fetch manifest files              │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! There is no scheduler. An input that references another executable's
//! [`StageOutput`] blocks on it, so ordering follows data availability.
//!
//! # Usage
//!
//! ```ignore
//! let worker: Arc<dyn Worker> = Arc::new(LocalWorker::new("/tmp/worker"));
//!
//! let split = Stage::new("split", worker.clone(), vec![
//!   Executable::files("part", Input::file("tasks/split.sh"), vec![Input::file("text.txt")])
//!     .with_interpreter("sh"),
//! ]);
//! let count = Stage::new("count", worker, vec![
//!   Executable::stdout("words", Input::file("tasks/count.sh"), vec![split.outputs()[0].file(0)])
//!     .with_interpreter("sh"),
//! ]);
//!
//! let pipeline = Pipeline::new("run-1", Arc::new(FsCheckpointer::new("checkpoints")), vec![split, count])?;
//! let report = pipeline.run().await?;
//! ```

mod config;
mod definition;
mod error;
mod executable;
mod graph;
mod input;
mod output;
mod pipeline;
mod stage;
mod transfer;

pub use config::{DEFAULT_TRANSFER_ATTEMPTS, RuntimeConfig};
pub use definition::{build_pipeline, stage_graph};
pub use error::{RuntimeError, TransferOp};
pub use executable::{
  Executable, FilesExecutable, QUALIFIED_SEPARATOR, StdoutExecutable, parse_manifest,
};
pub use graph::DependencyGraph;
pub use input::{FileSource, Input};
pub use output::{OutputRejected, OutputResolver, StageOutput};
pub use pipeline::{Pipeline, PipelineReport};
pub use stage::{Stage, StageReport};

pub use pipewright_checkpoint::{Checkpointer, ExecutableResult, FsCheckpointer, path_component};
pub use pipewright_worker::{CommandOutput, LocalWorker, Worker, WorkerError};
