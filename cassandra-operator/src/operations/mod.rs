//! Operations reconciling Kubernetes with the cluster definitions, executed by the receiver.
//!
//! Operations own their failures: every error is logged, and some are surfaced as audit events
//! on the cluster definition. Nothing is retried.

mod cluster;
mod custom_config;
#[cfg(test)]
mod custom_config_test;
mod gather;
pub mod receiver;
mod snapshot;
#[cfg(test)]
mod snapshot_test;

use std::fmt;
use std::sync::Arc;

use anyhow::{Context, Result};
use k8s_openapi::api::core::v1::ConfigMap;

use crate::cluster::{Cluster, ManagedClusters};
use crate::event::ClusterUpdate;
use crate::k8s::accessor::ClusterAccessor;
use crate::k8s::events::EventRecorder;
use crate::k8s::waiter::wait_until_rack_change_applied;
use crate::metrics::gatherer::Gatherer;
use crate::metrics::registry::ClusterMetrics;
use cassandra_core::crd::{Cassandra, Rack};

const METRIC_OPERATIONS_EXECUTED: &str = "cassandra_operator_operations_executed";
const METRIC_OPERATIONS_FAILED: &str = "cassandra_operator_operations_failed";

/// The collaborators of every operation.
#[derive(Clone)]
pub struct OperationContext {
    pub clusters: ManagedClusters,
    pub accessor: Arc<dyn ClusterAccessor>,
    pub recorder: Arc<dyn EventRecorder>,
    pub gatherer: Arc<dyn Gatherer>,
    pub metrics: Arc<ClusterMetrics>,
}

impl OperationContext {
    pub fn new(
        clusters: ManagedClusters, accessor: Arc<dyn ClusterAccessor>, recorder: Arc<dyn EventRecorder>, gatherer: Arc<dyn Gatherer>,
        metrics: Arc<ClusterMetrics>,
    ) -> Self {
        metrics::register_counter!(METRIC_OPERATIONS_EXECUTED, metrics::Unit::Count, "operations executed against clusters");
        metrics::register_counter!(METRIC_OPERATIONS_FAILED, metrics::Unit::Count, "operations which failed");
        Self {
            clusters,
            accessor,
            recorder,
            gatherer,
            metrics,
        }
    }
}

/// A unit of reconciliation work for a single cluster.
#[derive(Clone, Debug)]
pub enum Operation {
    AddCluster(Arc<Cassandra>),
    DeleteCluster(Arc<Cassandra>),
    UpdateCluster(ClusterUpdate),
    GatherMetrics(Cluster),
    AddCustomConfig(Cluster, Arc<ConfigMap>),
    UpdateCustomConfig(Cluster, Arc<ConfigMap>),
    DeleteCustomConfig(Cluster, Arc<ConfigMap>),
    AddSnapshot(Arc<Cassandra>),
    UpdateSnapshot(Arc<Cassandra>),
    DeleteSnapshot(Arc<Cassandra>),
    AddSnapshotCleanup(Arc<Cassandra>),
    UpdateSnapshotCleanup(Arc<Cassandra>),
    DeleteSnapshotCleanup(Arc<Cassandra>),
}

impl Operation {
    /// A short, stable identifier of this kind of operation.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::AddCluster(_) => "add_cluster",
            Self::DeleteCluster(_) => "delete_cluster",
            Self::UpdateCluster(_) => "update_cluster",
            Self::GatherMetrics(_) => "gather_metrics",
            Self::AddCustomConfig(..) => "add_custom_config",
            Self::UpdateCustomConfig(..) => "update_custom_config",
            Self::DeleteCustomConfig(..) => "delete_custom_config",
            Self::AddSnapshot(_) => "add_snapshot",
            Self::UpdateSnapshot(_) => "update_snapshot",
            Self::DeleteSnapshot(_) => "delete_snapshot",
            Self::AddSnapshotCleanup(_) => "add_snapshot_cleanup",
            Self::UpdateSnapshotCleanup(_) => "update_snapshot_cleanup",
            Self::DeleteSnapshotCleanup(_) => "delete_snapshot_cleanup",
        }
    }

    /// The qualified name of the cluster this operation concerns.
    pub fn qualified_name(&self) -> String {
        match self {
            Self::AddCluster(def)
            | Self::DeleteCluster(def)
            | Self::AddSnapshot(def)
            | Self::UpdateSnapshot(def)
            | Self::DeleteSnapshot(def)
            | Self::AddSnapshotCleanup(def)
            | Self::UpdateSnapshotCleanup(def)
            | Self::DeleteSnapshotCleanup(def) => def.qualified_name(),
            Self::UpdateCluster(update) => update.new.qualified_name(),
            Self::GatherMetrics(cluster)
            | Self::AddCustomConfig(cluster, _)
            | Self::UpdateCustomConfig(cluster, _)
            | Self::DeleteCustomConfig(cluster, _) => cluster.qualified_name(),
        }
    }

    /// Execute this operation, logging any failure.
    pub async fn execute(self, ctx: &OperationContext) {
        let (kind, name) = (self.kind(), self.to_string());
        tracing::debug!(operation = %name, "executing operation");
        metrics::increment_counter!(METRIC_OPERATIONS_EXECUTED, "kind" => kind);
        let res = match self {
            Self::AddCluster(def) => cluster::add_cluster(ctx, &def).await,
            Self::DeleteCluster(def) => cluster::delete_cluster(ctx, &def).await,
            Self::UpdateCluster(update) => cluster::update_cluster(ctx, &update).await,
            Self::GatherMetrics(cluster) => gather::gather_metrics(ctx, &cluster).await,
            Self::AddCustomConfig(cluster, cm) => custom_config::add_custom_config(ctx, &cluster, &cm).await,
            Self::UpdateCustomConfig(cluster, cm) => custom_config::update_custom_config(ctx, &cluster, &cm).await,
            Self::DeleteCustomConfig(cluster, _) => custom_config::delete_custom_config(ctx, &cluster).await,
            Self::AddSnapshot(def) => snapshot::add_snapshot(ctx, &def).await,
            Self::UpdateSnapshot(def) => snapshot::update_snapshot(ctx, &def).await,
            Self::DeleteSnapshot(def) => snapshot::delete_snapshot(ctx, &def).await,
            Self::AddSnapshotCleanup(def) => snapshot::add_snapshot_cleanup(ctx, &def).await,
            Self::UpdateSnapshotCleanup(def) => snapshot::update_snapshot_cleanup(ctx, &def).await,
            Self::DeleteSnapshotCleanup(def) => snapshot::delete_snapshot_cleanup(ctx, &def).await,
        };
        if let Err(err) = res {
            metrics::increment_counter!(METRIC_OPERATIONS_FAILED, "kind" => kind);
            tracing::error!(error = ?err, operation = %name, "error executing operation");
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let qn = self.qualified_name();
        match self {
            Self::AddCluster(_) => write!(f, "add cluster {}", qn),
            Self::DeleteCluster(_) => write!(f, "delete cluster {}", qn),
            Self::UpdateCluster(_) => write!(f, "update cluster {}", qn),
            Self::GatherMetrics(_) => write!(f, "gather metrics for cluster {}", qn),
            Self::AddCustomConfig(..) => write!(f, "add custom config for cluster {}", qn),
            Self::UpdateCustomConfig(..) => write!(f, "update custom config for cluster {}", qn),
            Self::DeleteCustomConfig(..) => write!(f, "remove custom config for cluster {}", qn),
            Self::AddSnapshot(_) => write!(f, "add snapshot schedule for cluster {}", qn),
            Self::UpdateSnapshot(_) => write!(f, "update snapshot schedule for cluster {}", qn),
            Self::DeleteSnapshot(_) => write!(f, "delete snapshot schedule for cluster {}", qn),
            Self::AddSnapshotCleanup(_) => write!(f, "add snapshot cleanup schedule for cluster {}", qn),
            Self::UpdateSnapshotCleanup(_) => write!(f, "update snapshot cleanup schedule for cluster {}", qn),
            Self::DeleteSnapshotCleanup(_) => write!(f, "delete snapshot cleanup schedule for cluster {}", qn),
        }
    }
}

/// Create the stateful set of the given rack and wait for it to roll out.
///
/// A failed wait is only a warning: subsequent racks are still created.
async fn register_statefulset(ctx: &OperationContext, cluster: &Cluster, rack: &Rack, custom_config: Option<&ConfigMap>) -> Result<()> {
    let sts = ctx
        .accessor
        .create_statefulset(cluster.build_statefulset(rack, custom_config))
        .await
        .with_context(|| format!("error creating statefulset for rack {} of cluster {}", rack.name, cluster.qualified_name()))?;
    tracing::info!(cluster = %cluster.qualified_name(), rack = %rack.name, "statefulset created");
    if let Err(err) = wait_until_rack_change_applied(ctx.accessor.as_ref(), ctx.recorder.as_ref(), cluster, &sts).await {
        tracing::warn!(
            error = ?err, cluster = %cluster.qualified_name(), rack = %rack.name,
            "subsequent statefulsets will still be created but some pods may restart"
        );
    }
    Ok(())
}

/// Apply a patch to the stateful set of the given rack and wait for it to roll out.
async fn patch_statefulset(ctx: &OperationContext, cluster: &Cluster, rack: &Rack, patch: &serde_json::Value) -> Result<()> {
    tracing::info!(cluster = %cluster.qualified_name(), rack = %rack.name, %patch, "applying patch to rack");
    let sts_name = cluster.definition().rack_name(rack);
    let sts = ctx
        .accessor
        .patch_statefulset(cluster.namespace(), &sts_name, patch)
        .await
        .with_context(|| format!("unable to update rack {}, other racks will not be updated", rack.name))?;
    wait_until_rack_change_applied(ctx.accessor.as_ref(), ctx.recorder.as_ref(), cluster, &sts)
        .await
        .with_context(|| format!("error waiting for rack {} to be updated, other racks will not be updated", rack.name))
}
