//! Periodic triggering of metrics gathering for online clusters.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::cluster::ManagedClusters;
use crate::dispatcher::Dispatcher;
use crate::event::{Event, EventData};

/// A task dispatching a `GatherMetrics` event for every online cluster on each tick.
pub struct MetricTrigger {
    clusters: ManagedClusters,
    dispatcher: Arc<Dispatcher>,
    interval: Duration,
    shutdown_rx: broadcast::Receiver<()>,
}

impl MetricTrigger {
    /// Create a new instance.
    pub fn new(clusters: ManagedClusters, dispatcher: Arc<Dispatcher>, interval: Duration, shutdown_rx: broadcast::Receiver<()>) -> Self {
        Self {
            clusters,
            dispatcher,
            interval,
            shutdown_rx,
        }
    }

    pub fn spawn(self) -> JoinHandle<Result<()>> {
        tokio::spawn(self.run())
    }

    async fn run(mut self) -> Result<()> {
        tracing::debug!(interval = ?self.interval, "metric trigger started");
        'ticks: loop {
            for cluster in self.clusters.online() {
                let event = Event::new(cluster.qualified_name(), EventData::GatherMetrics(cluster));
                // Dispatch waits while the cluster's queue is full.
                tokio::select! {
                    _ = self.dispatcher.dispatch(event) => (),
                    _ = self.shutdown_rx.recv() => break 'ticks,
                }
            }
            tokio::select! {
                _ = tokio::time::sleep(self.interval) => continue,
                _ = self.shutdown_rx.recv() => break 'ticks,
            }
        }
        tracing::debug!("metric trigger shutdown");
        Ok(())
    }
}
