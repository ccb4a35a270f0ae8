use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::{error::Result, packet::Packet};

/// One producer's live packet stream into a pipeline.
///
/// The pipeline's ingest task owns the publisher exclusively and calls
/// [`Publisher::close`] exactly once, after its last read.
#[async_trait]
pub trait Publisher: Send {
    /// Read the next packet. `Ok(None)` marks the end of the stream.
    async fn read(&mut self) -> Result<Option<Packet>>;

    async fn close(&mut self);
}

/// Publisher fed through an mpsc channel, for transports that push packets.
pub struct ChannelPublisher {
    rx: mpsc::Receiver<Packet>,
}

impl ChannelPublisher {
    pub fn channel(buffer_size: usize) -> (mpsc::Sender<Packet>, Self) {
        let (tx, rx) = mpsc::channel(buffer_size.max(1));
        (tx, Self { rx })
    }
}

#[async_trait]
impl Publisher for ChannelPublisher {
    async fn read(&mut self) -> Result<Option<Packet>> {
        Ok(self.rx.recv().await)
    }

    async fn close(&mut self) {
        self.rx.close();
    }
}
