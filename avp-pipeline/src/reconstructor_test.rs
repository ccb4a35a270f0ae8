use std::{sync::Arc, time::Duration};

use super::{Reconstructor, SampleBuilder};
use crate::{
    config::SampleBuilderConfig,
    packet::{Packet, PacketHeader},
    sample::SampleKind,
};

fn packet(pt: u8, seq: u16, ts: u32, marker: bool, payload: &'static [u8]) -> Packet {
    Packet::new(
        PacketHeader {
            marker,
            payload_type: pt,
            sequence_number: seq,
            timestamp: ts,
            ssrc: 1000 + pt as u32,
        },
        payload,
    )
}

#[tokio::test]
async fn test_video_frame_completes_on_marker() {
    let builder = SampleBuilder::new(SampleBuilderConfig::default());
    builder.push(packet(96, 1, 3000, false, b"ab")).await;
    builder.push(packet(96, 2, 3000, false, b"cd")).await;
    builder.push(packet(96, 3, 3000, true, b"ef")).await;

    let sample = builder.read().await.unwrap();
    assert_eq!(sample.kind, SampleKind::Video);
    assert_eq!(sample.timestamp, 3000);
    assert_eq!(sample.sequence_number, 3);
    assert_eq!(&sample.data[..], b"abcdef");
    assert_eq!(sample.prev_dropped_packets, 0);
}

#[tokio::test]
async fn test_timestamp_change_flushes_previous_frame() {
    let builder = SampleBuilder::new(SampleBuilderConfig::default());
    builder.push(packet(96, 10, 3000, false, b"a")).await;
    builder.push(packet(96, 11, 6000, false, b"b")).await;

    let sample = builder.read().await.unwrap();
    assert_eq!(sample.timestamp, 3000);
    assert_eq!(&sample.data[..], b"a");
}

#[tokio::test]
async fn test_audio_is_one_sample_per_packet() {
    let builder = SampleBuilder::new(SampleBuilderConfig::default());
    builder.push(packet(111, 1, 960, false, b"x")).await;
    builder.push(packet(111, 2, 1920, false, b"y")).await;

    let first = builder.read().await.unwrap();
    let second = builder.read().await.unwrap();
    assert!(first.is_audio());
    assert_eq!(&first.data[..], b"x");
    assert_eq!(&second.data[..], b"y");
}

#[tokio::test]
async fn test_loss_is_reported_and_partial_discarded() {
    let builder = SampleBuilder::new(SampleBuilderConfig::default());
    builder.push(packet(96, 1, 3000, false, b"a")).await;
    // seq 2 and 3 lost
    builder.push(packet(96, 4, 6000, true, b"b")).await;

    let sample = builder.read().await.unwrap();
    assert_eq!(sample.timestamp, 6000);
    assert_eq!(&sample.data[..], b"b");
    // two lost plus the discarded partial
    assert_eq!(sample.prev_dropped_packets, 3);
}

#[tokio::test]
async fn test_gap_inside_frame_skips_rest_of_frame() {
    let builder = SampleBuilder::new(SampleBuilderConfig::default());
    builder.push(packet(96, 1, 3000, false, b"head")).await;
    // seq 2 lost
    builder.push(packet(96, 3, 3000, true, b"tail")).await;
    builder.push(packet(96, 4, 6000, true, b"next")).await;

    let sample = builder.read().await.unwrap();
    assert_eq!(sample.timestamp, 6000);
    assert_eq!(&sample.data[..], b"next");
    assert_eq!(sample.prev_dropped_packets, 3);
    assert!(builder.output.is_empty());
}

#[tokio::test]
async fn test_oversized_partial_is_discarded() {
    let builder = SampleBuilder::new(SampleBuilderConfig {
        video_max_late: 5,
        ..Default::default()
    });
    for seq in 1..=51u16 {
        builder.push(packet(96, seq, 3000, seq == 51, b"x")).await;
    }
    builder.push(packet(96, 52, 6000, true, b"next")).await;

    let sample = builder.read().await.unwrap();
    assert_eq!(sample.timestamp, 6000);
    assert_eq!(&sample.data[..], b"next");
    assert_eq!(sample.prev_dropped_packets, 51);
    assert!(builder.output.is_empty());
}

#[tokio::test]
async fn test_frame_at_packet_limit_is_kept() {
    let builder = SampleBuilder::new(SampleBuilderConfig {
        video_max_late: 3,
        ..Default::default()
    });
    builder.push(packet(96, 1, 3000, false, b"a")).await;
    builder.push(packet(96, 2, 3000, false, b"b")).await;
    builder.push(packet(96, 3, 3000, true, b"c")).await;

    let sample = builder.read().await.unwrap();
    assert_eq!(&sample.data[..], b"abc");
    assert_eq!(sample.prev_dropped_packets, 0);
}

#[tokio::test]
async fn test_late_packet_is_discarded() {
    let builder = SampleBuilder::new(SampleBuilderConfig::default());
    builder.push(packet(111, 5, 100, false, b"new")).await;
    builder.push(packet(111, 4, 90, false, b"late")).await;
    builder.push(packet(111, 6, 110, false, b"next")).await;

    assert_eq!(&builder.read().await.unwrap().data[..], b"new");
    assert_eq!(&builder.read().await.unwrap().data[..], b"next");
}

#[tokio::test]
async fn test_stop_releases_blocked_reader() -> anyhow::Result<()> {
    let builder = Arc::new(SampleBuilder::new(SampleBuilderConfig::default()));
    let reader = {
        let builder = builder.clone();
        tokio::spawn(async move { builder.read().await })
    };

    tokio::time::sleep(Duration::from_millis(20)).await;
    builder.stop();

    let sample = tokio::time::timeout(Duration::from_secs(1), reader).await??;
    assert!(sample.is_none());

    // pushes after stop are ignored
    builder.push(packet(111, 1, 0, false, b"x")).await;
    assert!(builder.read().await.is_none());
    Ok(())
}
