//! Durable packet log with a forwarding queue.
//!
//! Every packet written is queued for a downstream reader and appended to
//! `<out_dir>/<id>.avplog`. Records are framed as a 4 byte big-endian length
//! followed by the JSON encoded packet.

use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use async_trait::async_trait;
use futures::Stream;
use tokio::{
    fs::File,
    io::{AsyncRead, AsyncReadExt, AsyncWriteExt, BufReader},
    sync::Mutex,
};

use crate::{
    config::PacketLogConfig,
    error::{Error, Result},
    packet::Packet,
    publisher::Publisher,
    queue::BoundedQueue,
};

pub const PACKET_LOG_EXTENSION: &str = "avplog";

/// Upper bound for a single record, anything larger is treated as corruption.
pub const MAX_RECORD_SIZE: usize = 16 * 1024 * 1024;

const RECORD_LENGTH_SIZE: usize = 4;

pub fn encode_record(packet: &Packet) -> Result<Vec<u8>> {
    let body = serde_json::to_vec(packet)?;
    if body.len() > MAX_RECORD_SIZE {
        return Err(Error::RecordTooLarge(body.len()));
    }
    let mut record = Vec::with_capacity(RECORD_LENGTH_SIZE + body.len());
    record.extend_from_slice(&(body.len() as u32).to_be_bytes());
    record.extend_from_slice(&body);
    Ok(record)
}

/// Read the next record. `Ok(None)` at a clean end of input.
pub async fn read_record<R>(reader: &mut R) -> Result<Option<Packet>>
where
    R: AsyncRead + Unpin,
{
    let mut len_buf = [0u8; RECORD_LENGTH_SIZE];
    let mut filled = 0;
    while filled < RECORD_LENGTH_SIZE {
        let n = reader.read(&mut len_buf[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    match filled {
        0 => return Ok(None),
        RECORD_LENGTH_SIZE => {}
        _ => return Err(Error::Decode("truncated record length".to_string())),
    }

    let len = u32::from_be_bytes(len_buf) as usize;
    if len > MAX_RECORD_SIZE {
        return Err(Error::RecordTooLarge(len));
    }
    let mut body = vec![0u8; len];
    reader.read_exact(&mut body).await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::UnexpectedEof {
            Error::Decode(format!("truncated record, expected {} bytes", len))
        } else {
            Error::Io(e)
        }
    })?;
    let packet = serde_json::from_slice(&body).map_err(|e| Error::Decode(e.to_string()))?;
    Ok(Some(packet))
}

pub struct PacketLogWriter {
    id: String,
    path: PathBuf,
    file: Mutex<Option<File>>,
    queue: Arc<BoundedQueue<Packet>>,
}

impl PacketLogWriter {
    /// Create (or truncate) the log file for `config.id`.
    pub async fn create(config: &PacketLogConfig) -> Result<Self> {
        tokio::fs::create_dir_all(&config.out_dir).await?;
        let path = config.path();
        log::info!("PacketLogWriter: id {} path {}", config.id, path.display());
        let file = File::create(&path).await?;

        Ok(Self {
            id: config.id.clone(),
            path,
            file: Mutex::new(Some(file)),
            queue: Arc::new(BoundedQueue::new(config.queue_capacity, config.overflow)),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Forward the packet and append it to the log.
    ///
    /// Waits while the forward queue is full under the blocking policy.
    /// Concurrent writers are serialized, so queue order and file order match.
    pub async fn write(&self, packet: Packet) -> Result<()> {
        let mut file = self.file.lock().await;
        let Some(out) = file.as_mut() else {
            return Err(Error::Closed);
        };

        let record = encode_record(&packet)?;
        match self.queue.push(packet).await {
            Ok(outcome) if outcome.is_drop() => {
                log::debug!("PacketLogWriter {}: forward queue full, {:?}", self.id, outcome);
            }
            Ok(_) => {}
            Err(_) => return Err(Error::Closed),
        }

        out.write_all(&record).await?;
        out.flush().await?;
        Ok(())
    }

    /// Pull side of the forward queue.
    pub fn reader(&self) -> PacketLogReader {
        PacketLogReader {
            queue: Arc::clone(&self.queue),
        }
    }

    /// Close the forward queue, then flush and close the file.
    ///
    /// Readers drain what was already queued and then see the end of the
    /// stream; writers blocked on a full queue return [`Error::Closed`].
    pub async fn stop(&self) {
        self.queue.close();
        let Some(mut file) = self.file.lock().await.take() else {
            return;
        };
        if let Err(e) = file.flush().await {
            log::error!("PacketLogWriter {}: flush error: {:#}", self.id, e);
        }
        if let Err(e) = file.sync_all().await {
            log::error!("PacketLogWriter {}: sync error: {:#}", self.id, e);
        }
        log::info!("PacketLogWriter {}: stopped", self.id);
    }
}

/// Forwarding side of a [`PacketLogWriter`], usable as a pipeline publisher.
#[derive(Clone)]
pub struct PacketLogReader {
    queue: Arc<BoundedQueue<Packet>>,
}

impl PacketLogReader {
    pub async fn recv(&self) -> Option<Packet> {
        self.queue.pop().await
    }

    pub fn into_stream(self) -> impl Stream<Item = Packet> + Send {
        futures::stream::unfold(self, |reader| async move {
            reader.recv().await.map(|packet| (packet, reader))
        })
    }
}

#[async_trait]
impl Publisher for PacketLogReader {
    async fn read(&mut self) -> Result<Option<Packet>> {
        Ok(self.recv().await)
    }

    async fn close(&mut self) {
        self.queue.close();
    }
}

/// Replays a persisted packet log.
pub struct PacketLogFile {
    path: PathBuf,
    reader: BufReader<File>,
    records: u64,
}

impl PacketLogFile {
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path).await?;
        Ok(Self {
            path,
            reader: BufReader::new(file),
            records: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn records(&self) -> u64 {
        self.records
    }

    /// Whether a writer built from `config` would truncate this file.
    pub async fn is_written_by(&self, config: &PacketLogConfig) -> bool {
        let Ok(output) = tokio::fs::canonicalize(config.path()).await else {
            return false;
        };
        match tokio::fs::canonicalize(&self.path).await {
            Ok(input) => input == output,
            Err(_) => false,
        }
    }

    pub async fn next_packet(&mut self) -> Result<Option<Packet>> {
        let packet = read_record(&mut self.reader).await?;
        if packet.is_some() {
            self.records += 1;
        }
        Ok(packet)
    }

    /// Decode a whole log into memory.
    pub async fn read_all(path: impl AsRef<Path>) -> Result<Vec<Packet>> {
        let mut log = Self::open(path).await?;
        let mut packets = Vec::new();
        while let Some(packet) = log.next_packet().await? {
            packets.push(packet);
        }
        Ok(packets)
    }
}

#[async_trait]
impl Publisher for PacketLogFile {
    async fn read(&mut self) -> Result<Option<Packet>> {
        self.next_packet().await
    }

    async fn close(&mut self) {
        log::debug!(
            "PacketLogFile: {} closed after {} records",
            self.path.display(),
            self.records
        );
    }
}

#[cfg(test)]
#[path = "packet_log_test.rs"]
mod packet_log_test;
