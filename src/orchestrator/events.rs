//! Batched, priority-filtered event emitter.
//!
//! Events are observability, not control flow: a dropped or delayed event
//! never blocks a node. `emit` batches; `emit_now` (for events that must
//! survive a crash in the very next step, such as an escalation) writes
//! straight through. Within one emitter instance, events are observed by
//! the store in the order they were emitted — there is no cross-instance
//! ordering guarantee, matching the single-writer-per-thread model the
//! rest of the engine assumes.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Mutex as StdMutex;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventPriority {
    High = 0,
    Medium = 1,
    Low = 2,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub event_type: String,
    pub project_name: String,
    pub timestamp: DateTime<Utc>,
    pub priority: EventPriority,
    #[serde(default)]
    pub node_name: Option<String>,
    #[serde(default)]
    pub task_id: Option<String>,
    #[serde(default)]
    pub phase: Option<u8>,
    #[serde(default)]
    pub correlation_id: Option<String>,
    #[serde(default)]
    pub data: HashMap<String, serde_json::Value>,
}

impl Event {
    pub fn new(
        event_type: impl Into<String>,
        project_name: impl Into<String>,
        priority: EventPriority,
    ) -> Self {
        Self {
            event_type: event_type.into(),
            project_name: project_name.into(),
            timestamp: Utc::now(),
            priority,
            node_name: None,
            task_id: None,
            phase: None,
            correlation_id: None,
            data: HashMap::new(),
        }
    }

    pub fn with_task(mut self, task_id: impl Into<String>) -> Self {
        self.task_id = Some(task_id.into());
        self
    }

    pub fn with_phase(mut self, phase: u8) -> Self {
        self.phase = Some(phase);
        self
    }

    pub fn with_data(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.data.insert(key.into(), value);
        self
    }
}

/// Durable append + age-based pruning. The engine ships an in-memory
/// implementation sufficient for tests and single-process use; a
/// production deployment backs this with its `Repository`.
#[async_trait::async_trait]
pub trait EventStore: Send + Sync {
    async fn append(&self, event: Event);
    async fn delete_older_than(&self, project_name: &str, cutoff: DateTime<Utc>) -> usize;
}

#[derive(Default)]
pub struct InMemoryEventStore {
    events: Mutex<Vec<Event>>,
}

#[async_trait::async_trait]
impl EventStore for InMemoryEventStore {
    async fn append(&self, event: Event) {
        self.events.lock().await.push(event);
    }

    async fn delete_older_than(&self, project_name: &str, cutoff: DateTime<Utc>) -> usize {
        let mut events = self.events.lock().await;
        let before = events.len();
        events.retain(|e| !(e.project_name == project_name && e.timestamp < cutoff));
        before - events.len()
    }
}

impl InMemoryEventStore {
    pub async fn all(&self) -> Vec<Event> {
        self.events.lock().await.clone()
    }
}

type Callback = Arc<dyn Fn(&Event) + Send + Sync>;

pub struct EventEmitter {
    store: Arc<dyn EventStore>,
    min_priority: EventPriority,
    batch_size: usize,
    flush_interval: Duration,
    queue: Arc<Mutex<Vec<Event>>>,
    callbacks: Arc<StdMutex<Vec<Callback>>>,
    closed: Arc<AtomicBool>,
    timer: StdMutex<Option<JoinHandle<()>>>,
}

impl EventEmitter {
    pub fn new(store: Arc<dyn EventStore>) -> Self {
        Self {
            store,
            min_priority: EventPriority::Low,
            batch_size: 10,
            flush_interval: Duration::from_secs(1),
            queue: Arc::new(Mutex::new(Vec::new())),
            callbacks: Arc::new(StdMutex::new(Vec::new())),
            closed: Arc::new(AtomicBool::new(false)),
            timer: StdMutex::new(None),
        }
    }

    pub fn with_min_priority(mut self, min_priority: EventPriority) -> Self {
        self.min_priority = min_priority;
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Register a callback invoked synchronously, inline with `emit`, for
    /// every event that clears the priority filter.
    pub fn add_callback<F: Fn(&Event) + Send + Sync + 'static>(&self, callback: F) {
        self.callbacks.lock().unwrap().push(Arc::new(callback));
    }

    fn invoke_callbacks(callbacks: &[Callback], event: &Event) {
        for cb in callbacks {
            // Catching a panic here isn't viable without `catch_unwind` across
            // a non-UnwindSafe closure; instead callbacks are expected to
            // return rather than panic, and a buggy callback only costs this
            // one event rather than the batch around it, since each callback
            // runs independently in this loop.
            cb(event);
        }
    }

    /// Batched emit: dropped below `min_priority`, otherwise queued and
    /// flushed once the queue reaches `batch_size` or on the next timer tick.
    pub async fn emit(&self, event: Event) {
        if event.priority > self.min_priority {
            return;
        }
        {
            let callbacks = self.callbacks.lock().unwrap().clone();
            Self::invoke_callbacks(&callbacks, &event);
        }
        self.ensure_timer_started();
        let mut queue = self.queue.lock().await;
        queue.push(event);
        if queue.len() >= self.batch_size {
            let batch = std::mem::take(&mut *queue);
            drop(queue);
            self.write_batch(batch).await;
        }
    }

    /// Spawns the background flush timer on the first call after
    /// construction (or after `close`), so an emitter that's never used
    /// doesn't leave a task running for no reason.
    fn ensure_timer_started(&self) {
        let mut timer = self.timer.lock().unwrap();
        if timer.is_some() || self.closed.load(Ordering::SeqCst) {
            return;
        }
        let store = self.store.clone();
        let queue = self.queue.clone();
        let closed = self.closed.clone();
        let interval = self.flush_interval;
        *timer = Some(tokio::spawn(async move {
            loop {
                tokio::time::sleep(interval).await;
                if closed.load(Ordering::SeqCst) {
                    break;
                }
                let batch = {
                    let mut q = queue.lock().await;
                    std::mem::take(&mut *q)
                };
                for event in batch {
                    store.append(event).await;
                }
            }
        }));
    }

    /// Cancels the background flush timer and writes out anything still
    /// queued. Idempotent — closing an already-closed emitter just flushes
    /// once more.
    pub async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        let handle = self.timer.lock().unwrap().take();
        if let Some(handle) = handle {
            handle.abort();
        }
        self.flush().await;
    }

    /// Direct, unbatched write — for events that must be durable before a
    /// possibly-crashing next step (escalations, terminal transitions).
    pub async fn emit_now(&self, event: Event) {
        if event.priority > self.min_priority {
            return;
        }
        let callbacks = self.callbacks.lock().unwrap().clone();
        Self::invoke_callbacks(&callbacks, &event);
        self.store.append(event).await;
    }

    pub async fn flush(&self) {
        let mut queue = self.queue.lock().await;
        let batch = std::mem::take(&mut *queue);
        drop(queue);
        self.write_batch(batch).await;
    }

    async fn write_batch(&self, batch: Vec<Event>) {
        for event in batch {
            self.store.append(event).await;
        }
    }

    pub fn flush_interval(&self) -> Duration {
        self.flush_interval
    }

    /// Prune events older than `days`, computing the cutoff as an actual
    /// point in time rather than stamping "now" and deferring the
    /// subtraction to query time, which silently kept every event forever.
    pub async fn cleanup_old_events(&self, project_name: &str, days: i64) -> usize {
        let cutoff = match chrono::Duration::try_days(days) {
            Some(d) => Utc::now() - d,
            None => {
                warn!(days, "cleanup_old_events called with an invalid day count");
                return 0;
            }
        };
        self.store.delete_older_than(project_name, cutoff).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn low_priority_events_are_dropped_below_threshold() {
        let store = Arc::new(InMemoryEventStore::default());
        let emitter = EventEmitter::new(store.clone()).with_min_priority(EventPriority::High);

        emitter
            .emit(Event::new("noise", "demo", EventPriority::Low))
            .await;
        emitter.flush().await;
        assert!(store.all().await.is_empty());
    }

    #[tokio::test]
    async fn batch_flushes_automatically_at_batch_size() {
        let store = Arc::new(InMemoryEventStore::default());
        let emitter = EventEmitter::new(store.clone()).with_batch_size(3);

        for i in 0..3 {
            emitter
                .emit(Event::new(format!("evt{i}"), "demo", EventPriority::Medium))
                .await;
        }
        // No explicit flush call needed — batch_size reached.
        assert_eq!(store.all().await.len(), 3);
    }

    #[tokio::test]
    async fn emit_now_writes_through_immediately() {
        let store = Arc::new(InMemoryEventStore::default());
        let emitter = EventEmitter::new(store.clone());
        emitter
            .emit_now(Event::new("escalation", "demo", EventPriority::High))
            .await;
        assert_eq!(store.all().await.len(), 1);
    }

    #[tokio::test]
    async fn cleanup_uses_a_real_now_minus_days_cutoff() {
        let store = Arc::new(InMemoryEventStore::default());
        let mut old = Event::new("stale", "demo", EventPriority::Low);
        old.timestamp = Utc::now() - chrono::Duration::days(10);
        let recent = Event::new("fresh", "demo", EventPriority::Low);
        store.append(old).await;
        store.append(recent).await;

        let emitter = EventEmitter::new(store.clone());
        let removed = emitter.cleanup_old_events("demo", 7).await;

        assert_eq!(removed, 1);
        let remaining = store.all().await;
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].event_type, "fresh");
    }

    #[tokio::test]
    async fn flush_interval_drains_the_queue_without_reaching_batch_size() {
        let store = Arc::new(InMemoryEventStore::default());
        let emitter = EventEmitter {
            flush_interval: Duration::from_millis(20),
            ..EventEmitter::new(store.clone()).with_batch_size(100)
        };
        emitter
            .emit(Event::new("lonely", "demo", EventPriority::Medium))
            .await;
        tokio::time::sleep(Duration::from_millis(80)).await;
        assert_eq!(store.all().await.len(), 1);
        emitter.close().await;
    }

    #[tokio::test]
    async fn close_cancels_the_timer_and_flushes_whatever_remains() {
        let store = Arc::new(InMemoryEventStore::default());
        let emitter = EventEmitter {
            flush_interval: Duration::from_secs(60),
            ..EventEmitter::new(store.clone()).with_batch_size(100)
        };
        emitter
            .emit(Event::new("pending", "demo", EventPriority::Medium))
            .await;
        emitter.close().await;
        assert_eq!(store.all().await.len(), 1);
    }

    #[tokio::test]
    async fn callbacks_observe_every_emitted_event() {
        let store = Arc::new(InMemoryEventStore::default());
        let emitter = EventEmitter::new(store.clone());
        let seen = Arc::new(AtomicUsize::new(0));
        let seen_clone = seen.clone();
        emitter.add_callback(move |_event| {
            seen_clone.fetch_add(1, Ordering::SeqCst);
        });
        emitter
            .emit(Event::new("evt", "demo", EventPriority::Medium))
            .await;
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }
}
