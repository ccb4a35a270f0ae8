use std::fmt::{Display, Formatter};

use bytes::Bytes;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SampleKind {
    Audio,
    Video,
}

/// A fully reassembled media unit built from one or more packets.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Sample {
    pub kind: SampleKind,
    pub payload_type: u8,
    pub ssrc: u32,
    // media clock of the source packets
    pub timestamp: u32,
    // sequence number of the last packet in the sample
    pub sequence_number: u16,
    pub data: Bytes,
    pub prev_dropped_packets: u16,
}

impl Sample {
    pub fn is_audio(&self) -> bool {
        self.kind == SampleKind::Audio
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl Display for Sample {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), std::fmt::Error> {
        write!(
            f,
            "Sample {{ kind: {:?}, pt: {}, ts: {}, data: {} }}",
            self.kind,
            self.payload_type,
            self.timestamp,
            self.data.len()
        )
    }
}
