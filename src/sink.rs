use crate::push::PushBatch;
use async_trait::async_trait;

/// Asynchronous destination for [`PushBatch`]es assembled by the shipper.
///
/// Implementations are responsible for transporting a batch to a concrete
/// backend (Loki, a test double, etc). The shipper calls `push` from its
/// single background task, so at most one push per shipper is in flight.
#[async_trait]
pub trait LogSink: Send + Sync {
    /// Deliver one batch to the underlying backend.
    ///
    /// **Returns**
    /// - `Ok(())` if the backend accepted the batch.
    /// - `Err(..)` on serialization, transport or status failure. The
    ///   shipper reports the error on stderr and discards the batch; it
    ///   never retries.
    async fn push(&self, batch: &PushBatch) -> Result<(), SinkError>;
}

/// Failure modes of a single push.
#[derive(thiserror::Error, Debug)]
pub enum SinkError {
    #[error("failed to encode push request: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("failed to send push request: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("push rejected with status {status}: {body}")]
    Status { status: u16, body: String },
}
