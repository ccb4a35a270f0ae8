//! Minimal IVF container writer.
//!
//! Layout: a 32 byte file header followed by frames, each prefixed with a
//! 12 byte header (4 byte little-endian size, 8 byte little-endian pts).

use std::io::SeekFrom;

use tokio::io::{AsyncSeek, AsyncSeekExt, AsyncWrite, AsyncWriteExt};

use crate::error::Result;

pub const IVF_SIGNATURE: &[u8; 4] = b"DKIF";
pub const IVF_HEADER_SIZE: u16 = 32;
pub const IVF_FRAME_HEADER_SIZE: usize = 12;

/// Byte offset of the frame count field in the file header.
const IVF_FRAME_COUNT_OFFSET: u64 = 24;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IvfHeader {
    pub fourcc: [u8; 4],
    pub width: u16,
    pub height: u16,
    pub timebase_numerator: u32,
    pub timebase_denominator: u32,
}

impl IvfHeader {
    /// VP8 on a 90kHz media clock.
    pub fn vp8(width: u16, height: u16) -> Self {
        Self {
            fourcc: *b"VP80",
            width,
            height,
            timebase_numerator: 1,
            timebase_denominator: 90_000,
        }
    }

    fn to_bytes(&self, frame_count: u32) -> [u8; IVF_HEADER_SIZE as usize] {
        let mut buf = [0u8; IVF_HEADER_SIZE as usize];
        buf[0..4].copy_from_slice(IVF_SIGNATURE);
        buf[4..6].copy_from_slice(&0u16.to_le_bytes());
        buf[6..8].copy_from_slice(&IVF_HEADER_SIZE.to_le_bytes());
        buf[8..12].copy_from_slice(&self.fourcc);
        buf[12..14].copy_from_slice(&self.width.to_le_bytes());
        buf[14..16].copy_from_slice(&self.height.to_le_bytes());
        // IVF stores the rate (denominator) before the scale (numerator)
        buf[16..20].copy_from_slice(&self.timebase_denominator.to_le_bytes());
        buf[20..24].copy_from_slice(&self.timebase_numerator.to_le_bytes());
        buf[24..28].copy_from_slice(&frame_count.to_le_bytes());
        buf
    }
}

pub struct IvfWriter<W> {
    inner: W,
    frame_count: u32,
    finished: bool,
}

impl<W> IvfWriter<W>
where
    W: AsyncWrite + AsyncSeek + Unpin,
{
    pub async fn new(mut inner: W, header: &IvfHeader) -> Result<Self> {
        inner.write_all(&header.to_bytes(0)).await?;
        Ok(Self {
            inner,
            frame_count: 0,
            finished: false,
        })
    }

    pub fn frame_count(&self) -> u32 {
        self.frame_count
    }

    pub async fn write_frame(&mut self, pts: u64, data: &[u8]) -> Result<()> {
        let mut frame_header = [0u8; IVF_FRAME_HEADER_SIZE];
        frame_header[0..4].copy_from_slice(&(data.len() as u32).to_le_bytes());
        frame_header[4..12].copy_from_slice(&pts.to_le_bytes());
        self.inner.write_all(&frame_header).await?;
        self.inner.write_all(data).await?;
        self.frame_count += 1;
        Ok(())
    }

    /// Patch the frame count into the header and flush.
    pub async fn finish(&mut self) -> Result<()> {
        if self.finished {
            return Ok(());
        }
        self.finished = true;
        self.inner.flush().await?;
        let end = self.inner.stream_position().await?;
        self.inner.seek(SeekFrom::Start(IVF_FRAME_COUNT_OFFSET)).await?;
        self.inner.write_all(&self.frame_count.to_le_bytes()).await?;
        self.inner.seek(SeekFrom::Start(end)).await?;
        self.inner.flush().await?;
        Ok(())
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

#[cfg(test)]
#[path = "ivf_test.rs"]
mod ivf_test;
