use serde::{Deserialize, Serialize};

use crate::executable::ExecutableDef;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageDef {
  pub name: String,
  pub executables: Vec<ExecutableDef>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineDef {
  /// Pipeline id, also the checkpoint namespace.
  pub id: String,
  pub stages: Vec<StageDef>,
}
