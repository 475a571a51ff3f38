use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// A value source for an executable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InputDef {
  /// Literal arguments, joined by spaces on the command line.
  Literal { values: Vec<String> },
  /// A local file, uploaded before the executable runs.
  File { path: PathBuf },
  /// One path from another executable's recorded output.
  Output {
    stage: String,
    executable: String,
    /// Position in the producer's path list.
    #[serde(default)]
    item: usize,
  },
}

impl InputDef {
  /// The `(stage, executable)` this input waits on, if any.
  pub fn producer(&self) -> Option<(&str, &str)> {
    match self {
      InputDef::Output {
        stage, executable, ..
      } => Some((stage, executable)),
      _ => None,
    }
  }
}
