use std::{
    collections::HashMap,
    sync::{Mutex, PoisonError},
};

use async_trait::async_trait;
use bytes::BytesMut;

use crate::{
    config::SampleBuilderConfig,
    packet::Packet,
    queue::BoundedQueue,
    sample::{Sample, SampleKind},
};

/// Turns a packet stream into a stream of reassembled samples.
#[async_trait]
pub trait Reconstructor: Send + Sync {
    async fn push(&self, packet: Packet);

    /// Wait for the next sample. `None` once stopped.
    async fn read(&self) -> Option<Sample>;

    /// Stop accepting packets and release any blocked reader.
    fn stop(&self);
}

/// Marker-bit sample assembler.
///
/// Audio payload types produce one sample per packet. Video packets are
/// collected per timestamp and emitted when the marker bit is seen or the
/// timestamp moves on. There is no reordering: a packet behind the newest
/// sequence number is discarded, unless it is more than `max_late` behind,
/// in which case the track is treated as restarted.
///
/// A video frame is given up when a sequence gap interrupts it or when it
/// grows past `video_max_late` packets. Its received packets, and any later
/// packets with the same timestamp, are counted in the next sample's
/// `prev_dropped_packets`.
pub struct SampleBuilder {
    config: SampleBuilderConfig,
    tracks: Mutex<HashMap<u32, TrackState>>,
    output: BoundedQueue<Sample>,
}

#[derive(Default)]
struct TrackState {
    last_seq: Option<u16>,
    dropped: u16,
    partial: Option<PartialSample>,
    // timestamp of a damaged video frame, its remaining packets are skipped
    discard_ts: Option<u32>,
}

impl TrackState {
    fn discard_partial(&mut self, ssrc: u32) {
        if let Some(partial) = self.partial.take() {
            log::debug!(
                "SampleBuilder: ssrc={} discard partial sample ts={} ({} packets)",
                ssrc,
                partial.timestamp,
                partial.packets
            );
            self.dropped = self.dropped.saturating_add(partial.packets);
            self.discard_ts = Some(partial.timestamp);
        }
    }
}

struct PartialSample {
    payload_type: u8,
    timestamp: u32,
    last_seq: u16,
    packets: u16,
    data: BytesMut,
}

impl SampleBuilder {
    pub fn new(config: SampleBuilderConfig) -> Self {
        let output = BoundedQueue::new(config.output_capacity, config.output_overflow);
        Self {
            config,
            tracks: Mutex::new(HashMap::new()),
            output,
        }
    }

    fn kind_of(&self, payload_type: u8) -> SampleKind {
        if self.config.audio_payload_types.contains(&payload_type) {
            SampleKind::Audio
        } else {
            SampleKind::Video
        }
    }

    fn max_late(&self, kind: SampleKind) -> u16 {
        match kind {
            SampleKind::Audio => self.config.audio_max_late,
            SampleKind::Video => self.config.video_max_late,
        }
    }

    /// Feed one packet, returning the samples it completed.
    fn assemble(&self, packet: Packet) -> Vec<Sample> {
        let kind = self.kind_of(packet.payload_type());
        let ssrc = packet.ssrc();
        let seq = packet.sequence_number();
        let mut completed = Vec::new();

        let mut tracks = self.tracks.lock().unwrap_or_else(PoisonError::into_inner);
        let track = tracks.entry(ssrc).or_default();

        if let Some(last) = track.last_seq {
            let gap = seq.wrapping_sub(last.wrapping_add(1));
            if gap >= 0x8000 {
                let behind = last.wrapping_sub(seq);
                if behind <= self.max_late(kind) {
                    log::trace!("SampleBuilder: late packet ssrc={} seq={} dropped", ssrc, seq);
                    return completed;
                }
                log::debug!("SampleBuilder: ssrc={} restarted at seq={}", ssrc, seq);
                track.partial = None;
                track.discard_ts = None;
            } else if gap > 0 {
                track.dropped = track.dropped.saturating_add(gap);
                // the frame in progress lost packets, it cannot be completed
                track.discard_partial(ssrc);
            }
        }
        track.last_seq = Some(seq);

        match kind {
            SampleKind::Audio => {
                completed.push(Sample {
                    kind,
                    payload_type: packet.payload_type(),
                    ssrc,
                    timestamp: packet.timestamp(),
                    sequence_number: seq,
                    data: packet.payload,
                    prev_dropped_packets: std::mem::take(&mut track.dropped),
                });
            }
            SampleKind::Video => {
                if let Some(ts) = track.discard_ts {
                    if ts == packet.timestamp() {
                        track.dropped = track.dropped.saturating_add(1);
                        return completed;
                    }
                    track.discard_ts = None;
                }

                if let Some(partial) = track.partial.take_if(|p| p.timestamp != packet.timestamp()) {
                    completed.push(Self::finish(ssrc, partial, &mut track.dropped));
                }
                let partial = track.partial.get_or_insert_with(|| PartialSample {
                    payload_type: packet.payload_type(),
                    timestamp: packet.timestamp(),
                    last_seq: seq,
                    packets: 0,
                    data: BytesMut::new(),
                });
                partial.last_seq = seq;
                partial.packets = partial.packets.saturating_add(1);
                partial.data.extend_from_slice(&packet.payload);

                if partial.packets > self.max_late(kind) {
                    track.discard_partial(ssrc);
                    return completed;
                }

                if packet.marker() {
                    if let Some(partial) = track.partial.take() {
                        completed.push(Self::finish(ssrc, partial, &mut track.dropped));
                    }
                }
            }
        }

        completed
    }

    fn finish(ssrc: u32, partial: PartialSample, dropped: &mut u16) -> Sample {
        Sample {
            kind: SampleKind::Video,
            payload_type: partial.payload_type,
            ssrc,
            timestamp: partial.timestamp,
            sequence_number: partial.last_seq,
            data: partial.data.freeze(),
            prev_dropped_packets: std::mem::take(dropped),
        }
    }
}

#[async_trait]
impl Reconstructor for SampleBuilder {
    async fn push(&self, packet: Packet) {
        if self.output.is_closed() {
            return;
        }
        for sample in self.assemble(packet) {
            log::trace!("SampleBuilder: emit {}", sample);
            match self.output.push(sample).await {
                Ok(outcome) if outcome.is_drop() => {
                    log::debug!("SampleBuilder: output full, {:?}", outcome);
                }
                Ok(_) => {}
                Err(_) => return,
            }
        }
    }

    async fn read(&self) -> Option<Sample> {
        self.output.pop().await
    }

    fn stop(&self) {
        if self.output.close() {
            log::debug!("SampleBuilder: stopped");
        }
    }
}

#[cfg(test)]
#[path = "reconstructor_test.rs"]
mod reconstructor_test;
