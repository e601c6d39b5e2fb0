//! The Cassandra operator.

mod adjuster;
#[cfg(test)]
mod adjuster_test;
mod app;
mod cluster;
mod config;
#[cfg(test)]
mod config_test;
mod dispatcher;
#[cfg(test)]
mod dispatcher_test;
mod event;
#[cfg(test)]
mod fixtures;
mod k8s;
mod metrics;
mod operations;
mod server;

use std::io::Write;
use std::mem::MaybeUninit;
use std::sync::{Arc, Once};

use anyhow::{Context, Result};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusRecorder};
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

use crate::app::App;
use crate::config::Config;

#[tokio::main]
async fn main() -> Result<()> {
    let cfg = Arc::new(Config::new()?);

    // Filter spans based on the RUST_LOG env var, falling back to the configured log level.
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&cfg.log_level).with_context(|| format!("invalid log level '{}'", cfg.log_level))?,
    };
    tracing_subscriber::registry()
        .with(filter)
        // Send a copy of all spans to stdout in compact form.
        .with(tracing_subscriber::fmt::layer().with_target(true).with_level(true).with_ansi(true))
        // Install this registry as the global tracing registry.
        .try_init()
        .context("error initializing logging/tracing system")?;

    let recorder = get_metrics_recorder();
    ::metrics::set_recorder(recorder).context("error setting prometheus metrics recorder")?;

    tracing::info!(
        http_port = %cfg.http_port,
        namespace = %cfg.operator_namespace,
        allow_empty_dir = cfg.allow_empty_dir,
        "starting Cassandra Operator",
    );
    if let Err(err) = App::new(cfg).await?.spawn().await.context("error joining app task").and_then(|res| res) {
        tracing::error!(error = ?err);
    }

    // Ensure any pending output is flushed.
    let _ = std::io::stdout().flush();
    let _ = std::io::stderr().flush();

    Ok(())
}

/// Get a handle to the metrics recorder, initializing it as needed.
pub fn get_metrics_recorder() -> &'static PrometheusRecorder {
    static mut RECORDER: MaybeUninit<PrometheusRecorder> = MaybeUninit::uninit();
    static ONCE: Once = Once::new();
    unsafe {
        ONCE.call_once(|| {
            RECORDER.write(PrometheusBuilder::new().build());
        });
        RECORDER.assume_init_ref()
    }
}
