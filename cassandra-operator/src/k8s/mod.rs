//! Kubernetes controller.
//!
//! This controller watches Cassandra cluster definitions and their custom config maps, caches
//! the last observed version of each, and dispatches an event for every meaningful change.

pub mod accessor;
mod data;
pub mod events;
pub mod waiter;

use std::sync::Arc;
use std::time::Duration;

use futures::prelude::*;
use k8s_openapi::api::core::v1::ConfigMap;
use kube::api::{Api, ListParams};
use kube::client::Client;
use kube::runtime::watcher::{watcher, Event};
use kube::Resource;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::BroadcastStream;

use crate::cluster::ManagedClusters;
use crate::config::Config;
use crate::dispatcher::Dispatcher;
use crate::event::Event as ClusterEvent;
use crate::k8s::data::WatchState;
use crate::k8s::events::EventRecorder;
use cassandra_core::crd::Cassandra;

/// The timeout applied to every Kubernetes API call.
pub const API_TIMEOUT: Duration = Duration::from_secs(10);
/// The delay applied after a watcher error.
const WATCHER_ERROR_BACKOFF: Duration = Duration::from_secs(10);

const METRIC_WATCHER_ERRORS: &str = "cassandra_operator_watcher_errors";

/// Kubernetes controller for watching Cassandra CRs and their config maps.
pub struct Controller {
    /// K8s client.
    client: Client,
    /// Runtime config.
    config: Arc<Config>,
    /// The dispatcher of cluster events.
    dispatcher: Arc<Dispatcher>,
    /// A channel used for triggering graceful shutdown.
    shutdown_rx: BroadcastStream<()>,
    /// The last observed state of all watched objects.
    state: WatchState,
}

impl Controller {
    /// Create a new instance.
    pub fn new(
        client: Client, config: Arc<Config>, clusters: ManagedClusters, dispatcher: Arc<Dispatcher>, recorder: Arc<dyn EventRecorder>,
        shutdown_tx: &broadcast::Sender<()>,
    ) -> Self {
        metrics::register_counter!(METRIC_WATCHER_ERRORS, metrics::Unit::Count, "errors received from k8s watchers");
        let state = WatchState::new(config.allow_empty_dir, clusters, recorder);
        Self {
            client,
            config,
            dispatcher,
            shutdown_rx: BroadcastStream::new(shutdown_tx.subscribe()),
            state,
        }
    }

    pub fn spawn(self) -> JoinHandle<anyhow::Result<()>> {
        tokio::spawn(self.run())
    }

    async fn run(mut self) -> anyhow::Result<()> {
        // Build watcher streams.
        let params = ListParams::default();
        let cassandras_watcher = with_error_backoff("cassandra", watcher(self.api::<Cassandra>(), params.clone()), WATCHER_ERROR_BACKOFF);
        let config_maps_watcher = with_error_backoff("configmap", watcher(self.api::<ConfigMap>(), params), WATCHER_ERROR_BACKOFF);
        tokio::pin!(cassandras_watcher, config_maps_watcher);

        tracing::info!(namespace = %self.watched_namespace(), "k8s controller initialized");
        loop {
            let running = tokio::select! {
                Some(k8s_event) = cassandras_watcher.next() => self.handle_cassandra_event(k8s_event).await,
                Some(k8s_event) = config_maps_watcher.next() => self.handle_config_map_event(k8s_event).await,
                _ = self.shutdown_rx.next() => false,
            };
            if !running {
                break;
            }
        }

        tracing::debug!("k8s controller shutdown");
        Ok(())
    }

    /// Build an API for the watched namespace, or for all namespaces.
    fn api<K>(&self) -> Api<K>
    where
        K: Resource<DynamicType = ()>,
    {
        if self.config.operator_namespace.is_empty() {
            Api::all(self.client.clone())
        } else {
            Api::namespaced(self.client.clone(), &self.config.operator_namespace)
        }
    }

    fn watched_namespace(&self) -> &str {
        if self.config.operator_namespace.is_empty() {
            "*"
        } else {
            &self.config.operator_namespace
        }
    }

    /// Handle `Cassandra` watcher event, returning false if shutdown was signalled meanwhile.
    #[tracing::instrument(level = "debug", skip(self, event))]
    async fn handle_cassandra_event(&mut self, event: Event<Cassandra>) -> bool {
        let events: Vec<ClusterEvent> = match event {
            Event::Applied(obj) => self.state.cassandra_applied(obj).into_iter().collect(),
            Event::Deleted(obj) => self.state.cassandra_deleted(obj).into_iter().collect(),
            Event::Restarted(objs) => self.state.cassandra_restarted(objs),
        };
        self.dispatch_all(events).await
    }

    /// Handle `ConfigMap` watcher event, returning false if shutdown was signalled meanwhile.
    #[tracing::instrument(level = "debug", skip(self, event))]
    async fn handle_config_map_event(&mut self, event: Event<ConfigMap>) -> bool {
        let events: Vec<ClusterEvent> = match event {
            Event::Applied(obj) => self.state.config_map_applied(obj).into_iter().collect(),
            Event::Deleted(obj) => self.state.config_map_deleted(obj).into_iter().collect(),
            Event::Restarted(objs) => self.state.config_map_restarted(objs),
        };
        self.dispatch_all(events).await
    }

    /// Dispatch the given events in order, giving up on the rest once shutdown is signalled.
    async fn dispatch_all(&mut self, events: Vec<ClusterEvent>) -> bool {
        for event in events {
            tracing::debug!(key = %event.key, kind = %event.kind(), "dispatching event");
            tokio::select! {
                _ = self.dispatcher.dispatch(event) => (),
                _ = self.shutdown_rx.next() => return false,
            }
        }
        true
    }
}

/// Drop the errors of a watcher stream, pausing only that stream for the given backoff after each.
fn with_error_backoff<S, T, E>(kind: &'static str, stream: S, backoff: Duration) -> impl Stream<Item = Event<T>>
where
    S: Stream<Item = Result<Event<T>, E>>,
    E: std::fmt::Debug,
{
    stream.filter_map(move |res| async move {
        match res {
            Ok(event) => Some(event),
            Err(err) => {
                metrics::increment_counter!(METRIC_WATCHER_ERRORS, "kind" => kind);
                tracing::error!(error = ?err, "error from {} k8s watcher", kind);
                tokio::time::sleep(backoff).await;
                None
            }
        }
    })
}
