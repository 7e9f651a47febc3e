// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! pf-hub: process-local event fan-out, federated across processes.
//!
//! Subscribers get a bounded queue per subscription. Progress and
//! heartbeat events coalesce under backpressure; poster/job completion
//! and log events block the publisher briefly and are then logged and
//! dropped rather than stalling the worker. Federation rides a Redis
//! pub/sub channel: every publish goes out on the channel and one
//! background subscriber per process demultiplexes onto local queues.

mod federation;

use parking_lot::Mutex;
use pf_core::{EventRecord, HubEvent, JobId};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Bounded queue capacity per subscription.
const QUEUE_CAPACITY: usize = 256;

/// How long a publisher will wait for space before dropping a
/// non-coalescing event.
const CRITICAL_PUSH_WAIT: Duration = Duration::from_secs(2);

/// Internal receive timeout; a heartbeat is synthesized when a
/// subscription sees nothing for this long.
const RECEIVE_TIMEOUT: Duration = Duration::from_secs(30 * 60);

/// Hub errors (federation setup and transport).
#[derive(Debug, thiserror::Error)]
pub enum HubError {
    #[error("cache error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("malformed federated event: {0}")]
    Malformed(#[from] serde_json::Error),
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

struct SubQueue {
    id: u64,
    events: Mutex<VecDeque<EventRecord>>,
    notify: Notify,
    space: Notify,
    closed: AtomicBool,
}

impl SubQueue {
    fn new(id: u64) -> Self {
        Self {
            id,
            events: Mutex::new(VecDeque::new()),
            notify: Notify::new(),
            space: Notify::new(),
            closed: AtomicBool::new(false),
        }
    }

    /// Enqueue an event. Returns `false` when a non-coalescing event had
    /// to be dropped after the bounded wait.
    async fn push(&self, record: &EventRecord) -> bool {
        if record.body.is_coalescing() {
            let mut events = self.events.lock();
            if events.len() >= QUEUE_CAPACITY {
                // Evict the oldest coalescing entry; if the queue is all
                // critical events, the new snapshot loses instead.
                match events.iter().position(|e| e.body.is_coalescing()) {
                    Some(index) => {
                        events.remove(index);
                    }
                    None => return false,
                }
            }
            events.push_back(record.clone());
            drop(events);
            self.notify.notify_one();
            return true;
        }

        let deadline = Instant::now() + CRITICAL_PUSH_WAIT;
        loop {
            {
                let mut events = self.events.lock();
                if events.len() < QUEUE_CAPACITY {
                    events.push_back(record.clone());
                    drop(events);
                    self.notify.notify_one();
                    return true;
                }
            }
            match deadline.checked_duration_since(Instant::now()) {
                Some(remaining) => {
                    let _ = tokio::time::timeout(remaining, self.space.notified()).await;
                }
                None => return false,
            }
        }
    }

    fn pop(&self) -> Option<EventRecord> {
        let mut events = self.events.lock();
        let record = events.pop_front();
        drop(events);
        if record.is_some() {
            self.space.notify_one();
        }
        record
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }
}

#[derive(Default)]
struct HubInner {
    subs: Mutex<HashMap<String, Vec<Arc<SubQueue>>>>,
    next_id: AtomicU64,
}

impl HubInner {
    /// Fan an event out to local subscribers. The map lock is never held
    /// across the queue pushes.
    async fn dispatch_local(&self, record: &EventRecord) {
        let queues: Vec<Arc<SubQueue>> = {
            let subs = self.subs.lock();
            match subs.get(record.job_id.as_str()) {
                Some(queues) => queues.clone(),
                None => {
                    debug!(job_id = %record.job_id, event = record.body.name(), "no subscribers, event dropped");
                    return;
                }
            }
        };

        for queue in queues {
            if !queue.push(record).await {
                warn!(
                    job_id = %record.job_id,
                    event = record.body.name(),
                    "subscriber queue full, event discarded"
                );
            }
        }
    }

    fn remove(&self, job_id: &str, id: u64) {
        let mut subs = self.subs.lock();
        if let Some(queues) = subs.get_mut(job_id) {
            queues.retain(|q| q.id != id);
            if queues.is_empty() {
                subs.remove(job_id);
            }
        }
    }
}

/// Multi-subscriber event dispatch, optionally federated over Redis.
/// Cheap to clone; clones share subscriber state.
#[derive(Clone)]
pub struct EventHub {
    inner: Arc<HubInner>,
    federation: Option<federation::Federation>,
    subscriber_task: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl EventHub {
    /// Local-only hub: publishes dispatch directly to in-process
    /// subscribers. The fallback when no cache is configured.
    pub fn in_process() -> Self {
        Self {
            inner: Arc::new(HubInner::default()),
            federation: None,
            subscriber_task: Arc::new(Mutex::new(None)),
        }
    }

    /// Federated hub: publishes go out on the shared cache channel and a
    /// background subscriber feeds remote and local events back into the
    /// in-process queues.
    pub async fn federated(cache_url: &str) -> Result<Self, HubError> {
        let inner = Arc::new(HubInner::default());
        let (federation, task) = federation::Federation::connect(cache_url, inner.clone()).await?;
        Ok(Self {
            inner,
            federation: Some(federation),
            subscriber_task: Arc::new(Mutex::new(Some(task))),
        })
    }

    /// Publish an event. With federation, delivery to local subscribers
    /// happens via the cache round-trip so every process (this one
    /// included) sees the same stream; on cache failure the event falls
    /// back to direct local dispatch.
    pub async fn publish(&self, record: &EventRecord) {
        if let Some(federation) = &self.federation {
            match federation.publish(record).await {
                Ok(()) => return,
                Err(err) => {
                    warn!(job_id = %record.job_id, error = %err, "federated publish failed, dispatching locally");
                }
            }
        }
        self.inner.dispatch_local(record).await;
    }

    /// Convenience wrapper stamping the emission time.
    pub async fn emit(&self, job_id: JobId, body: HubEvent) {
        self.publish(&EventRecord::new(job_id, now_ms(), body)).await;
    }

    /// Allocate a bounded subscription for a job's events.
    pub fn subscribe(&self, job_id: &JobId) -> Subscription {
        let id = self.inner.next_id.fetch_add(1, Ordering::SeqCst);
        let queue = Arc::new(SubQueue::new(id));
        self.inner
            .subs
            .lock()
            .entry(job_id.as_str().to_string())
            .or_default()
            .push(queue.clone());
        debug!(job_id = %job_id, sub = id, "subscription added");
        Subscription { inner: self.inner.clone(), job_id: *job_id, queue }
    }

    /// Number of live subscriptions, optionally for one job.
    pub fn subscription_count(&self, job_id: Option<&JobId>) -> usize {
        let subs = self.inner.subs.lock();
        match job_id {
            Some(job_id) => subs.get(job_id.as_str()).map(|q| q.len()).unwrap_or(0),
            None => subs.values().map(|q| q.len()).sum(),
        }
    }

    /// Tear down the federation subscriber task.
    pub fn close(&self) {
        if let Some(task) = self.subscriber_task.lock().take() {
            task.abort();
        }
    }
}

/// A live subscription handle. Dropping it detaches the queue.
pub struct Subscription {
    inner: Arc<HubInner>,
    job_id: JobId,
    queue: Arc<SubQueue>,
}

impl Subscription {
    pub fn job_id(&self) -> JobId {
        self.job_id
    }

    /// Next event, or a synthesized heartbeat after the internal receive
    /// timeout. `None` once the subscription is closed and drained.
    pub async fn next(&self) -> Option<EventRecord> {
        loop {
            if let Some(record) = self.queue.pop() {
                return Some(record);
            }
            if self.queue.closed.load(Ordering::SeqCst) {
                return None;
            }
            let notified = self.queue.notify.notified();
            if let Some(record) = self.queue.pop() {
                return Some(record);
            }
            if tokio::time::timeout(RECEIVE_TIMEOUT, notified).await.is_err() {
                return Some(EventRecord::new(self.job_id, now_ms(), HubEvent::heartbeat()));
            }
        }
    }

    /// Stop the subscription; a pending `next()` returns queued events
    /// and then `None`.
    pub fn cancel(&self) {
        self.queue.close();
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.queue.close();
        self.inner.remove(self.job_id.as_str(), self.queue.id);
    }
}

#[cfg(test)]
#[path = "lib_tests.rs"]
mod tests;
