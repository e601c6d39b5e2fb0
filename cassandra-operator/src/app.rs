use std::sync::Arc;

use anyhow::{Context, Result};
use futures::stream::StreamExt;
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::{BroadcastStream, SignalStream};
use tokio_stream::StreamMap;

use crate::cluster::ManagedClusters;
use crate::config::Config;
use crate::dispatcher::Dispatcher;
use crate::get_metrics_recorder;
use crate::k8s::accessor::{ClusterAccessor, KubeAccessor};
use crate::k8s::events::{EventRecorder, KubeEventRecorder};
use crate::k8s::Controller;
use crate::metrics::gatherer::{JolokiaGatherer, RandomPodUrlProvider};
use crate::metrics::registry::ClusterMetrics;
use crate::metrics::trigger::MetricTrigger;
use crate::operations::receiver::Receiver;
use crate::operations::OperationContext;
use crate::server::HttpServer;

/// The application object for when the operator is running.
pub struct App {
    /// The application's runtime config.
    _config: Arc<Config>,

    /// A channel used for triggering graceful shutdown.
    shutdown_tx: broadcast::Sender<()>,
    /// A channel used for triggering graceful shutdown.
    shutdown_rx: BroadcastStream<()>,

    /// The dispatcher of cluster events, stopped on shutdown.
    dispatcher: Arc<Dispatcher>,

    /// The join handle of the HTTP server.
    server: JoinHandle<Result<()>>,
    /// The join handle of the K8s controller.
    controller: JoinHandle<Result<()>>,
    /// The join handle of the metric trigger.
    trigger: JoinHandle<Result<()>>,
}

impl App {
    /// Create a new instance.
    pub async fn new(config: Arc<Config>) -> Result<Self> {
        // App shutdown channel.
        let (shutdown_tx, shutdown_rx) = broadcast::channel(10);

        // Initialize K8s client.
        let client = kube::Client::try_default().await.context("error initializing K8s client")?;

        // Build the collaborators shared by all operations.
        let clusters = ManagedClusters::new();
        let accessor: Arc<dyn ClusterAccessor> = Arc::new(KubeAccessor::new(client.clone()));
        let recorder: Arc<dyn EventRecorder> = Arc::new(KubeEventRecorder::new(client.clone()));
        let urls = Arc::new(RandomPodUrlProvider::new(accessor.clone()));
        let gatherer = Arc::new(JolokiaGatherer::new(urls, config.metric_request_duration)?);
        let cluster_metrics = Arc::new(ClusterMetrics::new()?);
        let ctx = OperationContext::new(clusters.clone(), accessor, recorder.clone(), gatherer, cluster_metrics.clone());
        let dispatcher = Dispatcher::new(Arc::new(Receiver::new(ctx)));

        // Spawn various core tasks.
        let server = HttpServer::new(config.clone(), get_metrics_recorder().handle(), cluster_metrics, shutdown_tx.clone()).spawn();
        let controller = Controller::new(client, config.clone(), clusters.clone(), dispatcher.clone(), recorder, &shutdown_tx).spawn();
        let trigger = MetricTrigger::new(clusters, dispatcher.clone(), config.metric_poll_interval, shutdown_tx.subscribe()).spawn();

        Ok(Self {
            _config: config,
            shutdown_rx: BroadcastStream::new(shutdown_rx),
            shutdown_tx,
            dispatcher,
            server,
            controller,
            trigger,
        })
    }

    pub fn spawn(self) -> JoinHandle<Result<()>> {
        tokio::spawn(self.run())
    }

    async fn run(mut self) -> Result<()> {
        let mut signals = StreamMap::new();
        signals.insert("sigterm", SignalStream::new(signal(SignalKind::terminate()).context("error building signal stream")?));
        signals.insert("sigint", SignalStream::new(signal(SignalKind::interrupt()).context("error building signal stream")?));

        loop {
            tokio::select! {
                Some((_, sig)) = signals.next() => {
                    tracing::debug!(signal = ?sig, "signal received, beginning graceful shutdown");
                    let _ = self.shutdown_tx.send(());
                    break;
                }
                _ = self.shutdown_rx.next() => break,
            }
        }

        // Begin shutdown routine.
        tracing::debug!("Cassandra Operator is shutting down");
        // Stopped first so that no producer stays blocked on a full queue.
        self.dispatcher.stop();
        if let Err(err) = self.controller.await.context("error joining k8s controller handle").and_then(|res| res) {
            tracing::error!(error = ?err, "error shutting down k8s controller");
        }
        if let Err(err) = self.trigger.await.context("error joining metric trigger handle").and_then(|res| res) {
            tracing::error!(error = ?err, "error shutting down metric trigger");
        }
        if let Err(err) = self.server.await.context("error joining http server handle").and_then(|res| res) {
            tracing::error!(error = ?err, "error shutting down http server");
        }

        tracing::debug!("Cassandra Operator shutdown complete");
        Ok(())
    }
}
