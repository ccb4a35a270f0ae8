use std::{
    collections::HashMap,
    sync::{
        Arc, Mutex, PoisonError,
        atomic::{AtomicBool, Ordering},
    },
};

use tokio::{sync::RwLock, task::JoinHandle};
use tokio_util::sync::CancellationToken;

use crate::{
    config::{Config, PipelineConfig},
    element::{
        Element, ElementInfo, ElementStats, ElementStatsSnapshot,
        recorder::Recorder,
        registry::{ElementRegistry, TYPE_RECORDER},
    },
    error::{Error, Result},
    publisher::Publisher,
    queue::BoundedQueue,
    reconstructor::{Reconstructor, SampleBuilder},
    sample::Sample,
};

type ElementMap = HashMap<String, ElementSlot>;

/// A registered element together with its delivery queue and task.
struct ElementSlot {
    element: Arc<dyn Element>,
    queue: Arc<BoundedQueue<Arc<Sample>>>,
    stats: Arc<ElementStats>,
    task: JoinHandle<()>,
}

impl ElementSlot {
    /// Drain the queue into the element, then close it.
    async fn release(self, id: &str) {
        self.queue.close();
        if let Err(e) = self.task.await {
            log::error!("Pipeline: element {} delivery task failed: {:#}", id, e);
        }
        self.element.close().await;
        log::info!("Pipeline: element {} released {:?}", id, self.stats.snapshot());
    }
}

/// Distributes one publisher's samples to a dynamic set of elements.
///
/// ```text
///                                                  +---> queue ---> element
///                                                  |
/// publisher --ingest--> reconstructor --dispatch---+---> queue ---> element
///                                                  |
///                                                  +---> queue ---> element
/// ```
pub struct Pipeline {
    id: String,
    config: Arc<Config>,
    elements: Arc<RwLock<ElementMap>>,
    reconstructor: Arc<dyn Reconstructor>,
    cancel: CancellationToken,
    drained: CancellationToken,
    closed: AtomicBool,
    loops: Mutex<Vec<JoinHandle<()>>>,
}

impl Pipeline {
    /// Build a pipeline with the configured sample builder and start it.
    pub async fn new(
        id: &str,
        publisher: Box<dyn Publisher>,
        config: Arc<Config>,
    ) -> Result<Self> {
        let reconstructor = Arc::new(SampleBuilder::new(config.sample_builder.clone()));
        Self::with_reconstructor(id, publisher, reconstructor, config).await
    }

    pub async fn with_reconstructor(
        id: &str,
        mut publisher: Box<dyn Publisher>,
        reconstructor: Arc<dyn Reconstructor>,
        config: Arc<Config>,
    ) -> Result<Self> {
        log::info!("Pipeline::new id={}", id);
        let recorder = if config.recorder.default_on {
            match Recorder::create(id, &config.recorder).await {
                Ok(recorder) => Some(recorder),
                Err(e) => {
                    publisher.close().await;
                    reconstructor.stop();
                    return Err(e);
                }
            }
        } else {
            None
        };

        let pipeline = Self {
            id: id.to_string(),
            config,
            elements: Arc::new(RwLock::new(HashMap::new())),
            reconstructor,
            cancel: CancellationToken::new(),
            drained: CancellationToken::new(),
            closed: AtomicBool::new(false),
            loops: Mutex::new(Vec::new()),
        };

        if let Some(recorder) = recorder {
            pipeline
                .add_element(TYPE_RECORDER, Arc::new(recorder))
                .await?;
        }

        pipeline.start(publisher);
        Ok(pipeline)
    }

    fn start(&self, publisher: Box<dyn Publisher>) {
        let ingest = tokio::spawn(ingest_loop(
            self.id.clone(),
            publisher,
            Arc::clone(&self.reconstructor),
            self.config.pipeline.clone(),
            self.cancel.clone(),
        ));
        let dispatch = tokio::spawn(dispatch_loop(
            self.id.clone(),
            Arc::clone(&self.reconstructor),
            Arc::clone(&self.elements),
            self.cancel.clone(),
            self.drained.clone(),
        ));
        self.lock_loops().extend([ingest, dispatch]);
    }

    fn lock_loops(&self) -> std::sync::MutexGuard<'_, Vec<JoinHandle<()>>> {
        self.loops.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Register an element under `id`.
    ///
    /// An existing registration is kept and [`Error::ElementExists`] returned;
    /// the rejected element is not adopted, so it is never closed by the pipeline.
    pub async fn add_element(&self, id: &str, element: Arc<dyn Element>) -> Result<()> {
        let mut elements = self.elements.write().await;
        // checked under the lock so close() cannot miss a late registration
        if self.is_closed() {
            return Err(Error::Closed);
        }
        if elements.contains_key(id) {
            log::error!("Pipeline.add_element element {} already exists", id);
            return Err(Error::ElementExists(id.to_string()));
        }

        let queue = Arc::new(BoundedQueue::new(
            self.config.pipeline.element_queue_capacity,
            self.config.pipeline.element_overflow,
        ));
        let stats = Arc::new(ElementStats::default());
        let task = tokio::spawn(deliver_loop(
            format!("{}/{}", self.id, id),
            Arc::clone(&element),
            Arc::clone(&queue),
            Arc::clone(&stats),
        ));
        elements.insert(
            id.to_string(),
            ElementSlot {
                element,
                queue,
                stats,
                task,
            },
        );
        log::info!("Pipeline.add_element id={} element={}", self.id, id);
        Ok(())
    }

    /// Build an element through the registry and register it under its type tag.
    pub async fn add_registered(
        &self,
        registry: &ElementRegistry,
        element_type: &str,
    ) -> Result<()> {
        // constructors may create files, do not build one that would be rejected
        if self.elements.read().await.contains_key(element_type) {
            return Err(Error::ElementExists(element_type.to_string()));
        }
        let info = ElementInfo::new(self.id.as_str(), element_type);
        let element = registry.resolve(&info, &self.config).await?;
        if let Err(e) = self.add_element(element_type, Arc::clone(&element)).await {
            element.close().await;
            return Err(e);
        }
        Ok(())
    }

    pub async fn get_element(&self, id: &str) -> Option<Arc<dyn Element>> {
        self.elements
            .read()
            .await
            .get(id)
            .map(|slot| Arc::clone(&slot.element))
    }

    pub async fn element_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.elements.read().await.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub async fn element_stats(&self, id: &str) -> Option<ElementStatsSnapshot> {
        self.elements
            .read()
            .await
            .get(id)
            .map(|slot| slot.stats.snapshot())
    }

    /// Unregister and release an element. Returns false if `id` is unknown.
    ///
    /// Samples already queued for the element are delivered before it is closed.
    pub async fn remove_element(&self, id: &str) -> bool {
        let slot = self.elements.write().await.remove(id);
        match slot {
            Some(slot) => {
                log::info!("Pipeline.remove_element id={} element={}", self.id, id);
                slot.release(id).await;
                true
            }
            None => false,
        }
    }

    /// Resolves once the dispatch loop has exited: the publisher ended (or was
    /// given up on) and every sample reached the element queues, or the
    /// pipeline was closed.
    pub async fn wait_drained(&self) {
        self.drained.cancelled().await;
    }

    /// Stop both loops, release the publisher and every element.
    ///
    /// Returns after both loops have exited. Calling it again is a no-op.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        log::info!("Pipeline.close id={}", self.id);

        self.cancel.cancel();
        self.reconstructor.stop();
        let loops = std::mem::take(&mut *self.lock_loops());
        for handle in loops {
            if let Err(e) = handle.await {
                log::error!("Pipeline {}: loop task failed: {:#}", self.id, e);
            }
        }

        let slots: Vec<(String, ElementSlot)> = self.elements.write().await.drain().collect();
        for (id, slot) in slots {
            slot.release(&id).await;
        }
        log::info!("Pipeline {} closed", self.id);
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        if !self.is_closed() {
            log::warn!("Pipeline {} dropped without close", self.id);
        }
        self.cancel.cancel();
        self.reconstructor.stop();

        // let the delivery tasks drain and close their elements
        let Ok(mut elements) = self.elements.try_write() else {
            log::warn!("Pipeline {}: elements busy on drop, not released", self.id);
            return;
        };
        let slots: Vec<(String, ElementSlot)> = elements.drain().collect();
        drop(elements);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                for (id, slot) in slots {
                    handle.spawn(async move { slot.release(&id).await });
                }
            }
            Err(_) => {
                for (_, slot) in slots {
                    slot.queue.close();
                }
            }
        }
    }
}

async fn ingest_loop(
    id: String,
    mut publisher: Box<dyn Publisher>,
    reconstructor: Arc<dyn Reconstructor>,
    config: PipelineConfig,
    cancel: CancellationToken,
) {
    let mut failures: u32 = 0;
    loop {
        let read = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            read = publisher.read() => read,
        };

        match read {
            Ok(Some(packet)) => {
                failures = 0;
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    _ = reconstructor.push(packet) => {}
                }
            }
            Ok(None) => {
                log::info!("Pipeline {}: publisher reached end of stream", id);
                reconstructor.stop();
                break;
            }
            Err(e) => {
                failures += 1;
                log::error!(
                    "Pipeline {}: publisher read error ({} in a row): {:#}",
                    id,
                    failures,
                    e
                );
                if config.max_consecutive_read_errors > 0
                    && failures >= config.max_consecutive_read_errors
                {
                    log::error!(
                        "Pipeline {}: giving up on publisher after {} errors",
                        id,
                        failures
                    );
                    reconstructor.stop();
                    break;
                }
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(config.read_retry_delay(failures)) => {}
                }
            }
        }
    }

    publisher.close().await;
    log::info!("Pipeline {}: ingest loop stopped", id);
}

async fn dispatch_loop(
    id: String,
    reconstructor: Arc<dyn Reconstructor>,
    elements: Arc<RwLock<ElementMap>>,
    cancel: CancellationToken,
    drained: CancellationToken,
) {
    loop {
        let sample = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            sample = reconstructor.read() => sample,
        };
        let Some(sample) = sample else {
            break;
        };

        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = broadcast(&elements, Arc::new(sample)) => {}
        }
    }

    drained.cancel();
    log::info!("Pipeline {}: dispatch loop stopped", id);
}

/// Hand one sample to every element queue under the shared lock.
async fn broadcast(elements: &RwLock<ElementMap>, sample: Arc<Sample>) {
    let elements = elements.read().await;
    for (id, slot) in elements.iter() {
        match slot.queue.push(Arc::clone(&sample)).await {
            Ok(outcome) if outcome.is_drop() => {
                slot.stats.record_dropped();
                log::debug!("Pipeline: element {} queue full, {:?}", id, outcome);
            }
            Ok(_) => {}
            Err(_) => log::debug!("Pipeline: element {} queue closed", id),
        }
    }
}

async fn deliver_loop(
    name: String,
    element: Arc<dyn Element>,
    queue: Arc<BoundedQueue<Arc<Sample>>>,
    stats: Arc<ElementStats>,
) {
    while let Some(sample) = queue.pop().await {
        match element.write(sample).await {
            Ok(()) => stats.record_delivered(),
            Err(e) => {
                stats.record_error();
                log::warn!("Pipeline: element {} write error: {:#}", name, e);
            }
        }
    }
}

#[cfg(test)]
#[path = "pipeline_test.rs"]
mod pipeline_test;
