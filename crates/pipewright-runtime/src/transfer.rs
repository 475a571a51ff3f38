//! Bounded retries for file transfers.

use std::future::Future;

use pipewright_worker::WorkerError;
use tracing::warn;

use crate::error::{RuntimeError, TransferOp};

/// Run `op` up to `attempts` times, with no delay between tries.
///
/// The last worker error is kept as the source of the returned
/// [`RuntimeError::Transfer`].
pub(crate) async fn with_attempts<F, Fut>(
  operation: TransferOp,
  from: &str,
  to: &str,
  attempts: u32,
  mut op: F,
) -> Result<(), RuntimeError>
where
  F: FnMut() -> Fut,
  Fut: Future<Output = Result<(), WorkerError>>,
{
  let attempts = attempts.max(1);
  let mut attempt = 1;

  loop {
    match op().await {
      Ok(()) => return Ok(()),
      Err(e) if attempt < attempts => {
        warn!(
          operation = %operation,
          from = %from,
          to = %to,
          attempt,
          error = %e,
          "transfer failed, retrying"
        );
        attempt += 1;
      }
      Err(e) => {
        return Err(RuntimeError::Transfer {
          operation,
          from: from.to_string(),
          to: to.to_string(),
          attempts,
          source: e,
        });
      }
    }
  }
}
