use std::{
    path::{Path, PathBuf},
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};

use async_trait::async_trait;
use tokio::{
    fs::File,
    io::BufWriter,
    sync::{Mutex, broadcast},
};

use crate::{
    config::RecorderConfig,
    element::{
        Element, SampleReceiver,
        ivf::{IvfHeader, IvfWriter},
    },
    error::{Error, Result},
    sample::Sample,
};

const TAP_CAPACITY: usize = 64;

/// Records video samples into `<out_dir>/<pipeline id>.ivf`.
///
/// IVF carries a single video track, so audio samples are counted and skipped.
/// The container header is finalized on close.
pub struct Recorder {
    path: PathBuf,
    state: Mutex<Option<RecorderState>>,
    tap: broadcast::Sender<Arc<Sample>>,
    skipped_audio: AtomicU64,
}

struct RecorderState {
    writer: IvfWriter<BufWriter<File>>,
    first_timestamp: Option<u32>,
}

impl Recorder {
    pub async fn create(pipeline_id: &str, config: &RecorderConfig) -> Result<Self> {
        tokio::fs::create_dir_all(&config.out_dir).await?;
        let path = config.out_dir.join(format!("{}.ivf", pipeline_id));
        let file = File::create(&path).await?;
        let header = IvfHeader::vp8(config.width, config.height);
        let writer = IvfWriter::new(BufWriter::new(file), &header).await?;
        log::info!("Recorder: writing {}", path.display());

        let (tap, _) = broadcast::channel(TAP_CAPACITY);
        Ok(Self {
            path,
            state: Mutex::new(Some(RecorderState {
                writer,
                first_timestamp: None,
            })),
            tap,
            skipped_audio: AtomicU64::new(0),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn skipped_audio(&self) -> u64 {
        self.skipped_audio.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl Element for Recorder {
    async fn write(&self, sample: Arc<Sample>) -> Result<()> {
        let mut guard = self.state.lock().await;
        let state = guard.as_mut().ok_or(Error::Closed)?;

        if sample.is_audio() {
            self.skipped_audio.fetch_add(1, Ordering::Relaxed);
            return Ok(());
        }

        let first = *state.first_timestamp.get_or_insert(sample.timestamp);
        let pts = sample.timestamp.wrapping_sub(first) as u64;
        state.writer.write_frame(pts, &sample.data).await?;
        drop(guard);

        // no subscribers is fine
        let _ = self.tap.send(sample);
        Ok(())
    }

    fn subscribe(&self) -> Option<SampleReceiver> {
        Some(self.tap.subscribe())
    }

    async fn close(&self) {
        let Some(mut state) = self.state.lock().await.take() else {
            return;
        };
        match state.writer.finish().await {
            Ok(()) => log::info!(
                "Recorder: closed {} ({} frames, {} audio samples skipped)",
                self.path.display(),
                state.writer.frame_count(),
                self.skipped_audio()
            ),
            Err(e) => log::error!("Recorder: finish {} error: {:#}", self.path.display(), e),
        }
    }
}

#[cfg(test)]
#[path = "recorder_test.rs"]
mod recorder_test;
