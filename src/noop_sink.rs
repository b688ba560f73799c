use crate::push::PushBatch;
use crate::sink::{LogSink, SinkError};
use async_trait::async_trait;

/// A sink that simply drops all batches.
///
/// Useful for measuring the overhead of the shipper itself without any
/// network I/O.
#[derive(Clone, Default)]
pub struct NoopSink;

#[async_trait]
impl LogSink for NoopSink {
    async fn push(&self, _batch: &PushBatch) -> Result<(), SinkError> {
        Ok(())
    }
}
