//! Waiting for changes to a rack's stateful set to roll out.

use std::time::Duration;

use anyhow::Result;
use k8s_openapi::api::apps::v1::StatefulSet;

use crate::cluster::Cluster;
use crate::k8s::accessor::ClusterAccessor;
use crate::k8s::events::{EventRecorder, EventType, WAITING_FOR_STATEFULSET_CHANGE};

/// The minimum interval between two checks of a stateful set.
const MIN_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Wait until the given stateful set, as returned by the API call which changed it, has fully
/// rolled out.
///
/// There is no overall timeout. An error fetching the stateful set fails the wait.
#[tracing::instrument(level = "debug", skip(accessor, recorder, cluster, applied), fields(cluster = %cluster.qualified_name()))]
pub async fn wait_until_rack_change_applied(
    accessor: &dyn ClusterAccessor, recorder: &dyn EventRecorder, cluster: &Cluster, applied: &StatefulSet,
) -> Result<()> {
    let namespace = applied.metadata.namespace.as_deref().unwrap_or_else(|| cluster.namespace());
    let name = applied.metadata.name.as_deref().unwrap_or_default();
    let generation = applied.metadata.generation.unwrap_or_default();
    let replicas = applied.spec.as_ref().and_then(|spec| spec.replicas).unwrap_or(1);

    let probe = cluster.definition().readiness_probe();
    let initial_delay = Duration::from_secs(probe.initial_delay_seconds.max(0) as u64) * replicas.max(1) as u32;
    let interval = Duration::from_secs(probe.period_seconds.max(0) as u64).max(MIN_POLL_INTERVAL);

    record_wait_event(recorder, cluster, namespace, name);
    tokio::time::sleep(initial_delay).await;
    loop {
        let sts = accessor.get_statefulset(namespace, name).await?;
        if is_rolled_out(&sts, generation) {
            tracing::info!(statefulset = name, "statefulset is ready");
            return Ok(());
        }
        record_wait_event(recorder, cluster, namespace, name);
        tokio::time::sleep(interval).await;
    }
}

fn record_wait_event(recorder: &dyn EventRecorder, cluster: &Cluster, namespace: &str, name: &str) {
    recorder.record(
        cluster.definition(),
        EventType::Normal,
        WAITING_FOR_STATEFULSET_CHANGE,
        format!("waiting for stateful set {}.{} to be ready", namespace, name),
    );
}

/// Check if the stateful set has observed the given generation and all of its replicas are
/// updated and ready.
pub fn is_rolled_out(sts: &StatefulSet, generation: i64) -> bool {
    let status = match sts.status.as_ref() {
        Some(status) => status,
        None => return false,
    };
    status.observed_generation.unwrap_or_default() >= generation
        && status.update_revision == status.current_revision
        && status.ready_replicas.unwrap_or_default() == status.replicas
}
