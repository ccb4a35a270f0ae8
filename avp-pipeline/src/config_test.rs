use std::{path::PathBuf, time::Duration};

use super::{Config, PipelineConfig};
use crate::queue::OverflowPolicy;

#[test]
fn test_defaults() {
    let config = Config::default();
    assert_eq!(config.pipeline.element_queue_capacity, 100);
    assert_eq!(config.pipeline.element_overflow, OverflowPolicy::Block);
    assert!(!config.recorder.default_on);
    assert!(!config.packet_log.on);
    assert_eq!(config.packet_log.id, "packets");
    assert_eq!(config.sample_builder.audio_payload_types, vec![111]);
}

#[test]
fn test_partial_json_keeps_defaults() -> anyhow::Result<()> {
    let config = Config::from_json(
        r#"{
            "recorder": { "default_on": true, "out_dir": "/tmp/rec" },
            "packet_log": { "overflow": "drop_oldest", "queue_capacity": 8 }
        }"#,
    )?;

    assert!(config.recorder.default_on);
    assert_eq!(config.recorder.out_dir, PathBuf::from("/tmp/rec"));
    assert_eq!(config.packet_log.overflow, OverflowPolicy::DropOldest);
    assert_eq!(config.packet_log.queue_capacity, 8);
    assert_eq!(config.packet_log.id, "packets");
    assert_eq!(config.pipeline.element_queue_capacity, 100);
    Ok(())
}

#[test]
fn test_invalid_json_is_config_error() {
    let err = Config::from_json("{ not json").unwrap_err();
    assert!(matches!(err, crate::Error::Config(_)));
}

#[test]
fn test_from_file() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("avp.json");
    std::fs::write(&path, r#"{ "pipeline": { "element_queue_capacity": 7 } }"#)?;
    let config = Config::from_file(&path)?;
    assert_eq!(config.pipeline.element_queue_capacity, 7);
    assert!(Config::from_file(dir.path().join("missing.json")).is_err());
    Ok(())
}

#[test]
fn test_read_retry_delay_backs_off_and_caps() {
    let config = PipelineConfig {
        read_retry_base_ms: 10,
        read_retry_max_ms: 100,
        ..Default::default()
    };
    assert_eq!(config.read_retry_delay(1), Duration::from_millis(10));
    assert_eq!(config.read_retry_delay(2), Duration::from_millis(20));
    assert_eq!(config.read_retry_delay(4), Duration::from_millis(80));
    assert_eq!(config.read_retry_delay(5), Duration::from_millis(100));
    assert_eq!(config.read_retry_delay(60), Duration::from_millis(100));
}
