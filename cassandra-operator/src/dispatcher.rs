//! Per-key serialising event dispatcher.
//!
//! Events sharing a key are handled one at a time in dispatch order by a worker task owned by
//! that key. Events of different keys are handled concurrently.

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use futures::FutureExt;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

use crate::event::Event;

/// The capacity of each key's queue, beyond which dispatching blocks.
const QUEUE_CAPACITY: usize = 100;

const METRIC_EVENTS_DISPATCHED: &str = "cassandra_operator_events_dispatched";
const METRIC_HANDLER_PANICS: &str = "cassandra_operator_event_handler_panics";

/// A type which handles the events of the dispatcher.
///
/// Handlers own their failures: nothing is returned to the dispatcher.
#[async_trait]
pub trait EventHandler: Send + Sync + 'static {
    async fn handle(&self, event: Event);
}

/// A dispatcher of events to per-key workers.
pub struct Dispatcher {
    /// The handler invoked by every worker.
    handler: Arc<dyn EventHandler>,
    /// The queue of each key seen so far.
    queues: Mutex<HashMap<String, mpsc::Sender<Event>>>,
    /// Set once the dispatcher has been stopped.
    stopped: AtomicBool,
    /// A channel used to stop all workers.
    stop_tx: broadcast::Sender<()>,
}

impl Dispatcher {
    /// Create a new instance.
    pub fn new(handler: Arc<dyn EventHandler>) -> Arc<Self> {
        metrics::register_counter!(METRIC_EVENTS_DISPATCHED, metrics::Unit::Count, "events dispatched to cluster workers");
        metrics::register_counter!(METRIC_HANDLER_PANICS, metrics::Unit::Count, "event handler invocations which panicked");
        let (stop_tx, _) = broadcast::channel(1);
        Arc::new(Self {
            handler,
            queues: Mutex::new(HashMap::new()),
            stopped: AtomicBool::new(false),
            stop_tx,
        })
    }

    /// Dispatch an event to the worker of its key, creating the worker as needed.
    ///
    /// Waits while the key's queue is full, until the dispatcher is stopped. Events dispatched
    /// after stop, or still waiting for queue space when it happens, are discarded.
    pub async fn dispatch(&self, event: Event) {
        // Subscribed before checking the flag so that a concurrent stop is never missed.
        let mut stop_rx = self.stop_tx.subscribe();
        if self.stopped.load(Ordering::Acquire) {
            tracing::warn!(key = %event.key, kind = %event.kind(), "event dispatched after dispatcher stop, discarding");
            return;
        }
        let queue = match self.queue_for(&event.key) {
            Some(queue) => queue,
            None => {
                tracing::warn!(key = %event.key, kind = %event.kind(), "event dispatched after dispatcher stop, discarding");
                return;
            }
        };
        let (key, kind) = (event.key.clone(), event.kind());
        metrics::increment_counter!(METRIC_EVENTS_DISPATCHED, "kind" => kind.as_str());
        tokio::select! {
            res = queue.send(event) => if let Err(err) = res {
                tracing::warn!(key = %err.0.key, kind = %err.0.kind(), "worker has stopped, discarding event");
            },
            _ = stop_rx.recv() => {
                tracing::warn!(%key, %kind, "dispatcher stopped while waiting for queue space, discarding event");
            }
        }
    }

    /// Stop all workers. No further events will be accepted.
    ///
    /// Workers finish the event they are currently handling, and discard their queued events.
    pub fn stop(&self) {
        if self.stopped.swap(true, Ordering::AcqRel) {
            return;
        }
        let _res = self.stop_tx.send(());
        self.queues.lock().unwrap_or_else(PoisonError::into_inner).clear();
        tracing::debug!("event dispatcher stopped");
    }

    /// Get the queue of the given key, spawning its worker on first use.
    fn queue_for(&self, key: &str) -> Option<mpsc::Sender<Event>> {
        let mut queues = self.queues.lock().unwrap_or_else(PoisonError::into_inner);
        // Checked under the lock so that no worker is spawned after stop has cleared the table.
        if self.stopped.load(Ordering::Acquire) {
            return None;
        }
        if let Some(queue) = queues.get(key) {
            return Some(queue.clone());
        }
        let (tx, rx) = mpsc::channel(QUEUE_CAPACITY);
        Worker::new(key.to_string(), rx, self.stop_tx.subscribe(), self.handler.clone()).spawn();
        queues.insert(key.to_string(), tx.clone());
        Some(tx)
    }
}

/// A worker handling the events of a single key.
struct Worker {
    key: String,
    events: mpsc::Receiver<Event>,
    stop: broadcast::Receiver<()>,
    handler: Arc<dyn EventHandler>,
}

impl Worker {
    fn new(key: String, events: mpsc::Receiver<Event>, stop: broadcast::Receiver<()>, handler: Arc<dyn EventHandler>) -> Self {
        Self { key, events, stop, handler }
    }

    fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    #[tracing::instrument(level = "debug", skip(self), fields(key = %self.key))]
    async fn run(mut self) {
        tracing::debug!("event worker started");
        loop {
            tokio::select! {
                biased;
                _ = self.stop.recv() => break,
                event = self.events.recv() => match event {
                    Some(event) => self.handle(event).await,
                    None => break,
                },
            }
        }
        tracing::debug!("event worker stopped");
    }

    async fn handle(&self, event: Event) {
        let kind = event.kind();
        if AssertUnwindSafe(self.handler.handle(event)).catch_unwind().await.is_err() {
            metrics::increment_counter!(METRIC_HANDLER_PANICS);
            tracing::error!(key = %self.key, kind = %kind, "event handler panicked, worker will continue with the next event");
        }
    }
}
