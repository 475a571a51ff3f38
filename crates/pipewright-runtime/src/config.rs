//! Runtime configuration.

use std::path::PathBuf;

/// Number of attempts for each upload or download: one try plus three retries.
pub const DEFAULT_TRANSFER_ATTEMPTS: u32 = 4;

/// Configuration shared by every stage of a pipeline run.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
  /// Local directory that files fetched back from workers are written under,
  /// as `{output_dir}/{qualified_name}/{file_name}`.
  pub output_dir: PathBuf,
  /// Worker directory that file inputs are uploaded to.
  pub remote_input_dir: String,
  /// Attempts per transfer before giving up. Retries happen immediately.
  pub transfer_attempts: u32,
}

impl Default for RuntimeConfig {
  fn default() -> Self {
    Self {
      output_dir: PathBuf::from("outputs"),
      remote_input_dir: "input".to_string(),
      transfer_attempts: DEFAULT_TRANSFER_ATTEMPTS,
    }
  }
}
