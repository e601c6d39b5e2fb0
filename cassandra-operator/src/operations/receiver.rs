//! Translation of dispatched events into operations.

use std::sync::Arc;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::ConfigMap;

use super::{Operation, OperationContext};
use crate::cluster::{qualified_cluster_name_for, Cluster};
use crate::dispatcher::EventHandler;
use crate::event::{ClusterUpdate, Event, EventData};
use cassandra_core::crd::{snapshot_cleanup_properties_updated, snapshot_properties_updated, Cassandra};

/// The handler of dispatched events, executing the operations of each event in order.
pub struct Receiver {
    ctx: OperationContext,
}

impl Receiver {
    pub fn new(ctx: OperationContext) -> Self {
        Self { ctx }
    }

    /// The operations which reconcile the given event, in execution order.
    pub fn operations_for(&self, event: Event) -> Vec<Operation> {
        match event.data {
            EventData::AddCluster(def) => add_cluster_operations(def),
            EventData::DeleteCluster(def) => delete_cluster_operations(def),
            EventData::UpdateCluster(update) => {
                if self.ctx.clusters.get(&update.old.qualified_name()).is_none() {
                    tracing::warn!(
                        cluster = %update.old.qualified_name(),
                        "received an update for a cluster which is not being managed, treating it as an add"
                    );
                    return add_cluster_operations(update.new);
                }
                update_cluster_operations(update)
            }
            EventData::GatherMetrics(cluster) => vec![Operation::GatherMetrics(cluster)],
            EventData::AddCustomConfig(cm) => self.custom_config_operation(&cm, |cluster| Operation::AddCustomConfig(cluster, cm.clone())),
            EventData::UpdateCustomConfig(cm) => self.custom_config_operation(&cm, |cluster| Operation::UpdateCustomConfig(cluster, cm.clone())),
            EventData::DeleteCustomConfig(cm) => self.custom_config_operation(&cm, |cluster| Operation::DeleteCustomConfig(cluster, cm.clone())),
        }
    }

    /// Build a custom config operation for the managed cluster owning the given config map.
    fn custom_config_operation<F>(&self, cm: &ConfigMap, build: F) -> Vec<Operation>
    where
        F: FnOnce(Cluster) -> Operation,
    {
        let qn = match qualified_cluster_name_for(cm) {
            Ok(qn) => qn,
            Err(err) => {
                tracing::warn!(error = %err, "ignoring config map event");
                return vec![];
            }
        };
        match self.ctx.clusters.get(&qn) {
            Some(cluster) => vec![build(cluster)],
            None => {
                tracing::warn!(cluster = %qn, "no managed cluster found for config map event");
                vec![]
            }
        }
    }
}

#[async_trait]
impl EventHandler for Receiver {
    async fn handle(&self, event: Event) {
        let (key, kind) = (event.key.clone(), event.kind());
        let operations = self.operations_for(event);
        tracing::debug!(%key, %kind, operations = operations.len(), "received event");
        for operation in operations {
            operation.execute(&self.ctx).await;
        }
    }
}

fn add_cluster_operations(def: Arc<Cassandra>) -> Vec<Operation> {
    let mut ops = vec![Operation::AddCluster(def.clone())];
    if def.spec.snapshot.is_some() {
        ops.push(Operation::AddSnapshot(def.clone()));
        if def.has_snapshot_cleanup() {
            ops.push(Operation::AddSnapshotCleanup(def));
        }
    }
    ops
}

fn delete_cluster_operations(def: Arc<Cassandra>) -> Vec<Operation> {
    let mut ops = vec![Operation::DeleteCluster(def.clone())];
    if def.spec.snapshot.is_some() {
        ops.push(Operation::DeleteSnapshot(def.clone()));
        if def.has_snapshot_cleanup() {
            ops.push(Operation::DeleteSnapshotCleanup(def));
        }
    }
    ops
}

fn update_cluster_operations(update: ClusterUpdate) -> Vec<Operation> {
    let (old, new) = (update.old.clone(), update.new.clone());
    let mut ops = vec![Operation::UpdateCluster(update)];
    match (old.spec.snapshot.as_ref(), new.spec.snapshot.as_ref()) {
        (Some(old_snapshot), None) => {
            ops.push(Operation::DeleteSnapshot(new.clone()));
            if old_snapshot.has_retention_policy_enabled() {
                ops.push(Operation::DeleteSnapshotCleanup(new));
            }
        }
        (Some(old_snapshot), Some(new_snapshot)) => {
            if old_snapshot.has_retention_policy_enabled() && !new_snapshot.has_retention_policy_enabled() {
                ops.push(Operation::DeleteSnapshotCleanup(new.clone()));
            }
            if snapshot_properties_updated(old_snapshot, new_snapshot) {
                ops.push(Operation::UpdateSnapshot(new.clone()));
            }
            if snapshot_cleanup_properties_updated(old_snapshot, new_snapshot) {
                ops.push(Operation::UpdateSnapshotCleanup(new));
            }
        }
        (None, Some(new_snapshot)) => {
            ops.push(Operation::AddSnapshot(new.clone()));
            if new_snapshot.has_retention_policy_enabled() {
                ops.push(Operation::AddSnapshotCleanup(new));
            }
        }
        (None, None) => {}
    }
    ops
}
