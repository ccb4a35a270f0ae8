//! Pluggable sample sinks attached to a pipeline.

pub mod ivf;
pub mod recorder;
pub mod registry;

use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::{error::Result, sample::Sample};

pub type SampleReceiver = broadcast::Receiver<Arc<Sample>>;

/// A consumer of reconstructed samples.
///
/// The pipeline delivers to each element from a dedicated task, so `write`
/// may take its time without holding up other elements. `close` is called
/// exactly once, after the last `write`.
#[async_trait]
pub trait Element: Send + Sync {
    async fn write(&self, sample: Arc<Sample>) -> Result<()>;

    /// Pull channel for external taps on what this element consumed.
    fn subscribe(&self) -> Option<SampleReceiver> {
        None
    }

    async fn close(&self);
}

/// Descriptor handed to element constructors.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ElementInfo {
    pub pipeline_id: String,
    pub element_type: String,
}

impl ElementInfo {
    pub fn new(pipeline_id: impl Into<String>, element_type: impl Into<String>) -> Self {
        Self {
            pipeline_id: pipeline_id.into(),
            element_type: element_type.into(),
        }
    }
}

/// Delivery counters for one registered element.
#[derive(Debug, Default)]
pub struct ElementStats {
    delivered: AtomicU64,
    dropped: AtomicU64,
    errors: AtomicU64,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ElementStatsSnapshot {
    pub delivered: u64,
    pub dropped: u64,
    pub errors: u64,
}

impl ElementStats {
    pub fn record_delivered(&self) {
        self.delivered.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dropped(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> ElementStatsSnapshot {
        ElementStatsSnapshot {
            delivered: self.delivered.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
        }
    }
}
