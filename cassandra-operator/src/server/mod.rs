//! The operator's HTTP surface: health checks, status, metrics and the validating webhook.

mod webhook;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::handler::Handler;
use axum::http::{header::HeaderName, HeaderMap, HeaderValue, StatusCode};
use axum::routing::{get, post, Router};
use axum::{extract, AddExtensionLayer};
use metrics_exporter_prometheus::PrometheusHandle;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::config::Config;
use crate::metrics::registry::ClusterMetrics;
use cassandra_core::crd::CRD_VERSION;

/// The registries rendered by the metrics endpoint.
#[derive(Clone)]
struct MetricsState {
    /// The operator's own telemetry.
    operator: PrometheusHandle,
    /// The gauges describing managed clusters.
    clusters: Arc<ClusterMetrics>,
}

/// The HTTP server.
pub struct HttpServer {
    /// The application's runtime config.
    config: Arc<Config>,
    metrics: MetricsState,
    /// A channel used for triggering graceful shutdown.
    shutdown_tx: broadcast::Sender<()>,
}

impl HttpServer {
    /// Create a new instance.
    pub fn new(config: Arc<Config>, operator_metrics: PrometheusHandle, cluster_metrics: Arc<ClusterMetrics>, shutdown_tx: broadcast::Sender<()>) -> Self {
        Self {
            config,
            metrics: MetricsState {
                operator: operator_metrics,
                clusters: cluster_metrics,
            },
            shutdown_tx,
        }
    }

    pub fn spawn(self) -> JoinHandle<Result<()>> {
        tokio::spawn(self.run())
    }

    async fn run(self) -> Result<()> {
        let router = Router::new()
            .route("/live", get(|| async { StatusCode::NO_CONTENT }))
            .route("/ready", get(|| async { StatusCode::NO_CONTENT }))
            .route("/status", get(status))
            .route("/metrics", get(prom_metrics.layer(AddExtensionLayer::new(self.metrics.clone()))))
            .route("/k8s/admissions/vaw/cassandras", post(webhook::vaw_cassandras));

        let addr = SocketAddr::from(([0, 0, 0, 0], self.config.http_port));
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let server = axum::Server::try_bind(&addr)
            .context("error binding socket address for http server")?
            .serve(router.into_make_service())
            .with_graceful_shutdown(async move {
                let _res = shutdown_rx.recv().await;
            });
        tracing::info!(%addr, "http server listening");

        if let Err(err) = server.await {
            tracing::error!(error = ?err, "error from http server, shutting down");
            let _res = self.shutdown_tx.send(());
            return Err(err).context("error serving http");
        }
        tracing::debug!("http server shutdown");
        Ok(())
    }
}

/// Handler for the status page.
async fn status() -> axum::Json<serde_json::Value> {
    axum::Json(serde_json::json!({ "CassandraCrdVersion": CRD_VERSION }))
}

/// Handler for serving Prometheus metrics.
async fn prom_metrics(extract::Extension(state): extract::Extension<MetricsState>) -> (StatusCode, HeaderMap, String) {
    let mut headers = HeaderMap::new();
    headers.insert(HeaderName::from_static("content-type"), HeaderValue::from_static("text/plain; version=0.0.4"));
    let mut body = state.operator.render();
    match state.clusters.render() {
        Ok(clusters) => body.push_str(&clusters),
        Err(err) => tracing::error!(error = ?err, "error rendering cluster metrics"),
    }
    (StatusCode::OK, headers, body)
}
