use serde::{Deserialize, Serialize};

use crate::input::InputDef;

/// How the captured output of an executable is interpreted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutableKind {
  /// The captured stdout text is the result.
  #[default]
  Stdout,
  /// Stdout is a newline-separated manifest of files to fetch back.
  Files,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutableDef {
  pub name: String,
  #[serde(default)]
  pub kind: ExecutableKind,
  pub program: InputDef,
  #[serde(default)]
  pub args: Vec<InputDef>,
  /// Interpreter used to run the program, e.g. `node`. Without one the
  /// program is made executable and run directly.
  #[serde(skip_serializing_if = "Option::is_none")]
  pub interpreter: Option<String>,
}

impl ExecutableDef {
  /// The program input followed by the arguments, in declared order.
  pub fn inputs(&self) -> impl Iterator<Item = &InputDef> {
    std::iter::once(&self.program).chain(self.args.iter())
  }
}
