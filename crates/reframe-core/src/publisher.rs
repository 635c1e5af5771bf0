//! Hands finished records to the downstream consumer.

use crate::types::Record;
use eyre::{Result, WrapErr, eyre};
use tokio::sync::mpsc;
use tracing::debug;

/// The downstream consumer of finished records.
pub trait Sink: Send + Sync {
    fn send(&self, record: Record) -> Result<()>;
}

impl Sink for mpsc::UnboundedSender<Record> {
    fn send(&self, record: Record) -> Result<()> {
        mpsc::UnboundedSender::send(self, record).map_err(|_| eyre!("record channel closed"))
    }
}

impl Sink for mpsc::Sender<Record> {
    fn send(&self, record: Record) -> Result<()> {
        self.try_send(record).map_err(|err| match err {
            mpsc::error::TrySendError::Full(_) => eyre!("record channel full"),
            mpsc::error::TrySendError::Closed(_) => eyre!("record channel closed"),
        })
    }
}

impl Sink for flume::Sender<Record> {
    fn send(&self, record: Record) -> Result<()> {
        self.try_send(record).map_err(|err| match err {
            flume::TrySendError::Full(_) => eyre!("record channel full"),
            flume::TrySendError::Disconnected(_) => eyre!("record channel closed"),
        })
    }
}

/// Publishes every record to one sink, without retries.
#[derive(Debug)]
pub struct Publisher<S> {
    sink: S,
    published: u64,
}

impl<S> Publisher<S>
where
    S: Sink,
{
    pub fn new(sink: S) -> Self {
        Self { sink, published: 0 }
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Number of records the sink accepted.
    pub fn published(&self) -> u64 {
        self.published
    }

    pub fn publish(&mut self, record: Record) -> Result<()> {
        let stamp = record.stamp();
        let frame_id = record.header.frame_id.clone();
        let num_points = record.len();

        self.sink.send(record).wrap_err_with(|| {
            format!("Failed to publish record at {stamp:?} in frame '{frame_id}'")
        })?;
        self.published += 1;

        debug!(
            stamp = ?stamp,
            frame_id = %frame_id,
            num_points,
            "Published record"
        );
        Ok(())
    }
}
