use std::{
    collections::VecDeque,
    sync::{Mutex, MutexGuard, PoisonError},
};

use serde::{Deserialize, Serialize};
use tokio::sync::Notify;

use crate::error::{Error, Result};

/// What a full queue does with a new item.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// Producer waits until a consumer makes room (backpressure).
    #[default]
    Block,
    /// Evict the oldest queued item to make room.
    DropOldest,
    /// Discard the incoming item.
    DropNewest,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PushOutcome {
    Queued,
    DroppedOldest,
    DroppedNewest,
}

impl PushOutcome {
    pub fn is_drop(&self) -> bool {
        !matches!(self, PushOutcome::Queued)
    }
}

struct QueueState<T> {
    items: VecDeque<T>,
    closed: bool,
}

/// Multi-producer multi-consumer FIFO with a fixed capacity and an explicit
/// overflow policy. Closing releases every waiting producer and consumer;
/// consumers still drain whatever was queued before the close.
pub struct BoundedQueue<T> {
    state: Mutex<QueueState<T>>,
    capacity: usize,
    policy: OverflowPolicy,
    not_empty: Notify,
    not_full: Notify,
}

impl<T> BoundedQueue<T> {
    pub fn new(capacity: usize, policy: OverflowPolicy) -> Self {
        let capacity = capacity.max(1);
        Self {
            state: Mutex::new(QueueState {
                items: VecDeque::with_capacity(capacity),
                closed: false,
            }),
            capacity,
            policy,
            not_empty: Notify::new(),
            not_full: Notify::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, QueueState<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn policy(&self) -> OverflowPolicy {
        self.policy
    }

    pub fn len(&self) -> usize {
        self.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().items.is_empty()
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Enqueue an item, applying the overflow policy when full.
    ///
    /// Under [`OverflowPolicy::Block`] this waits for room; the wait ends with
    /// [`Error::QueueClosed`] if the queue is closed meanwhile.
    pub async fn push(&self, item: T) -> Result<PushOutcome> {
        loop {
            let notified = self.not_full.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut state = self.lock();
                if state.closed {
                    return Err(Error::QueueClosed);
                }
                if state.items.len() < self.capacity {
                    state.items.push_back(item);
                    drop(state);
                    self.not_empty.notify_one();
                    return Ok(PushOutcome::Queued);
                }
                match self.policy {
                    OverflowPolicy::DropNewest => return Ok(PushOutcome::DroppedNewest),
                    OverflowPolicy::DropOldest => {
                        state.items.pop_front();
                        state.items.push_back(item);
                        drop(state);
                        self.not_empty.notify_one();
                        return Ok(PushOutcome::DroppedOldest);
                    }
                    OverflowPolicy::Block => {}
                }
            }

            notified.await;
        }
    }

    /// Wait for the next item. Returns `None` once the queue is closed and drained.
    pub async fn pop(&self) -> Option<T> {
        loop {
            let notified = self.not_empty.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut state = self.lock();
                if let Some(item) = state.items.pop_front() {
                    drop(state);
                    self.not_full.notify_one();
                    return Some(item);
                }
                if state.closed {
                    return None;
                }
            }

            notified.await;
        }
    }

    /// Close the queue. Returns false if it was already closed.
    pub fn close(&self) -> bool {
        let first = {
            let mut state = self.lock();
            !std::mem::replace(&mut state.closed, true)
        };
        if first {
            self.not_empty.notify_waiters();
            self.not_full.notify_waiters();
        }
        first
    }
}

#[cfg(test)]
#[path = "queue_test.rs"]
mod queue_test;
