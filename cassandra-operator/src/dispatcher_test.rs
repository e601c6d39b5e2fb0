use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::sync::{mpsc, Notify};
use tokio::time::timeout;

use crate::dispatcher::{Dispatcher, EventHandler};
use crate::event::{Event, EventData};
use crate::fixtures;
use cassandra_core::crd::RequiredMetadata;

/// A handler which reports `<key>/<cluster name>` for every handled event.
///
/// Clusters named `panic` make the handler panic, `wait` blocks until a `release` is handled,
/// and a name of the form `sleep-<ms>` sleeps before reporting.
struct RecordingHandler {
    handled: mpsc::UnboundedSender<String>,
    release: Notify,
}

#[async_trait]
impl EventHandler for RecordingHandler {
    async fn handle(&self, event: Event) {
        let name = match &event.data {
            EventData::AddCluster(cluster) => cluster.name().to_string(),
            _ => String::new(),
        };
        match name.as_str() {
            "panic" => panic!("handler failure"),
            "wait" => self.release.notified().await,
            "release" => self.release.notify_one(),
            other => {
                if let Some(ms) = other.strip_prefix("sleep-").and_then(|ms| ms.parse().ok()) {
                    tokio::time::sleep(Duration::from_millis(ms)).await;
                }
            }
        }
        let _ = self.handled.send(format!("{}/{}", event.key, name));
    }
}

fn new_dispatcher() -> (Arc<Dispatcher>, mpsc::UnboundedReceiver<String>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let handler = Arc::new(RecordingHandler {
        handled: tx,
        release: Notify::new(),
    });
    (Dispatcher::new(handler), rx)
}

fn add_event(key: &str, name: &str) -> Event {
    Event::new(key.into(), EventData::AddCluster(Arc::new(fixtures::cassandra(name))))
}

async fn next(rx: &mut mpsc::UnboundedReceiver<String>) -> Result<String> {
    timeout(Duration::from_secs(5), rx.recv())
        .await
        .context("timeout waiting for handled event")?
        .context("handler channel closed")
}

#[tokio::test]
async fn events_with_the_same_key_are_handled_in_order() -> Result<()> {
    let (dispatcher, mut rx) = new_dispatcher();
    let names: Vec<String> = (0..10).map(|idx| format!("sleep-{}", 20 - idx * 2)).collect();
    for name in names.iter() {
        dispatcher.dispatch(add_event("n.c", name)).await;
    }

    for name in names.iter() {
        let handled = next(&mut rx).await?;
        let expected = format!("n.c/{}", name);
        assert!(handled == expected, "unexpected event handled, got {}, expected {}", handled, expected);
    }
    dispatcher.stop();
    Ok(())
}

#[tokio::test]
async fn events_with_different_keys_are_handled_concurrently() -> Result<()> {
    let (dispatcher, mut rx) = new_dispatcher();
    dispatcher.dispatch(add_event("n.a", "wait")).await;
    dispatcher.dispatch(add_event("n.b", "release")).await;

    let first = next(&mut rx).await?;
    let second = next(&mut rx).await?;
    assert!(first == "n.b/release", "unexpected first event handled, got {}, expected {}", first, "n.b/release");
    assert!(second == "n.a/wait", "unexpected second event handled, got {}, expected {}", second, "n.a/wait");
    dispatcher.stop();
    Ok(())
}

#[tokio::test]
async fn panicking_handler_does_not_stop_the_worker() -> Result<()> {
    let (dispatcher, mut rx) = new_dispatcher();
    dispatcher.dispatch(add_event("n.c", "panic")).await;
    dispatcher.dispatch(add_event("n.c", "after")).await;

    let handled = next(&mut rx).await?;
    assert!(handled == "n.c/after", "unexpected event handled, got {}, expected {}", handled, "n.c/after");
    dispatcher.stop();
    Ok(())
}

#[tokio::test]
async fn events_dispatched_after_stop_are_discarded() -> Result<()> {
    let (dispatcher, mut rx) = new_dispatcher();
    dispatcher.dispatch(add_event("n.c", "before")).await;
    let handled = next(&mut rx).await?;
    assert!(handled == "n.c/before", "unexpected event handled, got {}, expected {}", handled, "n.c/before");

    dispatcher.stop();
    dispatcher.dispatch(add_event("n.c", "after")).await;
    dispatcher.dispatch(add_event("n.other", "after")).await;

    let res = timeout(Duration::from_millis(200), rx.recv()).await;
    assert!(
        !matches!(res, Ok(Some(_))),
        "expected no events to be handled after stop, got {:?}",
        res
    );
    Ok(())
}

#[tokio::test]
async fn full_queue_blocks_producers_until_stop() -> Result<()> {
    let (dispatcher, _rx) = new_dispatcher();
    dispatcher.dispatch(add_event("n.c", "wait")).await;
    // Let the worker take the blocking event off the queue.
    tokio::time::sleep(Duration::from_millis(50)).await;

    for idx in 0..100 {
        timeout(Duration::from_secs(1), dispatcher.dispatch(add_event("n.c", "queued")))
            .await
            .with_context(|| format!("dispatch {} blocked before the queue was full", idx))?;
    }
    let blocked = timeout(Duration::from_millis(100), dispatcher.dispatch(add_event("n.c", "overflow"))).await;
    assert!(blocked.is_err(), "expected dispatch to block once the queue holds 100 events");

    let pending = tokio::spawn({
        let dispatcher = dispatcher.clone();
        async move { dispatcher.dispatch(add_event("n.c", "overflow")).await }
    });
    tokio::time::sleep(Duration::from_millis(50)).await;
    dispatcher.stop();
    timeout(Duration::from_secs(1), pending)
        .await
        .context("blocked dispatch did not return after stop")?
        .context("error joining dispatch task")?;
    Ok(())
}
