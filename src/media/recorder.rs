//! Bounded-duration capture: buffers chunks in arrival order and resolves
//! once with the concatenated blob.

use std::time::Duration;

use futures::{Stream, StreamExt};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::debug;

#[derive(Debug, Error)]
pub enum RecorderError {
    #[error("capture failed: {0}")]
    Capture(String),
}

/// Captures everything from stream start until the first of: `duration`
/// elapsed, `stop` cancelled (resolves immediately), or the stream ending
/// on its own. A timer firing after capture already ended is a no-op.
/// Rejects once on the first capture error.
pub async fn record_stream<S>(
    mut stream: S,
    duration: Duration,
    stop: CancellationToken,
) -> Result<Vec<u8>, RecorderError>
where
    S: Stream<Item = Result<Vec<u8>, RecorderError>> + Unpin,
{
    let timer = tokio::time::sleep(duration);
    tokio::pin!(timer);

    let mut chunks: Vec<Vec<u8>> = Vec::new();
    loop {
        tokio::select! {
            _ = &mut timer => {
                debug!("recording window elapsed after {} chunks", chunks.len());
                break;
            }
            _ = stop.cancelled() => {
                debug!("recording stopped early after {} chunks", chunks.len());
                break;
            }
            chunk = stream.next() => match chunk {
                Some(Ok(chunk)) => chunks.push(chunk),
                Some(Err(err)) => return Err(err),
                None => {
                    debug!("capture source ended after {} chunks", chunks.len());
                    break;
                }
            }
        }
    }

    Ok(chunks.concat())
}
