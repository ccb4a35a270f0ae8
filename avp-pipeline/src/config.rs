use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use serde::{Deserialize, Serialize};

use crate::{
    error::{Error, Result},
    queue::OverflowPolicy,
};

/// Node configuration. Built once at startup and handed to every pipeline,
/// element and writer constructor.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub pipeline: PipelineConfig,
    pub sample_builder: SampleBuilderConfig,
    pub recorder: RecorderConfig,
    pub packet_log: PacketLogConfig,
}

impl Config {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)?;
        Self::from_json(&raw).map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        serde_json::from_str(raw).map_err(|e| Error::Config(e.to_string()))
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub element_queue_capacity: usize,
    pub element_overflow: OverflowPolicy,
    // backoff after a failed publisher read, doubled per consecutive failure
    pub read_retry_base_ms: u64,
    pub read_retry_max_ms: u64,
    // 0 = retry forever
    pub max_consecutive_read_errors: u32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            element_queue_capacity: 100,
            element_overflow: OverflowPolicy::Block,
            read_retry_base_ms: 10,
            read_retry_max_ms: 1000,
            max_consecutive_read_errors: 50,
        }
    }
}

impl PipelineConfig {
    /// Backoff before the next read after `failures` consecutive errors.
    pub fn read_retry_delay(&self, failures: u32) -> Duration {
        let shift = failures.saturating_sub(1).min(16);
        let ms = self
            .read_retry_base_ms
            .saturating_mul(1u64 << shift)
            .min(self.read_retry_max_ms);
        Duration::from_millis(ms)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct SampleBuilderConfig {
    // late-packet window in sequence numbers, for video also the packet
    // limit of a partial sample
    pub audio_max_late: u16,
    pub video_max_late: u16,
    pub audio_payload_types: Vec<u8>,
    pub output_capacity: usize,
    pub output_overflow: OverflowPolicy,
}

impl Default for SampleBuilderConfig {
    fn default() -> Self {
        Self {
            audio_max_late: 100,
            video_max_late: 200,
            audio_payload_types: vec![111],
            output_capacity: 256,
            output_overflow: OverflowPolicy::Block,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct RecorderConfig {
    pub default_on: bool,
    pub out_dir: PathBuf,
    // written to the container header, players take the real size from the bitstream
    pub width: u16,
    pub height: u16,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            default_on: false,
            out_dir: PathBuf::from("./out"),
            width: 640,
            height: 480,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct PacketLogConfig {
    pub on: bool,
    pub id: String,
    pub out_dir: PathBuf,
    pub queue_capacity: usize,
    pub overflow: OverflowPolicy,
}

impl PacketLogConfig {
    pub fn path(&self) -> PathBuf {
        self.out_dir
            .join(format!("{}.{}", self.id, crate::packet_log::PACKET_LOG_EXTENSION))
    }
}

impl Default for PacketLogConfig {
    fn default() -> Self {
        Self {
            on: false,
            id: "packets".to_string(),
            out_dir: PathBuf::from("./out"),
            queue_capacity: 1024,
            overflow: OverflowPolicy::Block,
        }
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod config_test;
