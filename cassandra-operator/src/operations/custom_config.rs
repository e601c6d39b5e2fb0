use anyhow::{Context, Result};
use k8s_openapi::api::apps::v1::StatefulSet;
use k8s_openapi::api::core::v1::ConfigMap;

use super::{patch_statefulset, OperationContext};
use crate::adjuster::change_for_config_map;
use crate::cluster::Cluster;
use crate::k8s::events::{EventType, CLUSTER_UPDATE};
use crate::k8s::waiter::wait_until_rack_change_applied;
use cassandra_core::crd::Rack;

#[tracing::instrument(level = "debug", skip(ctx, cluster, cm), fields(cluster = %cluster.qualified_name()))]
pub(super) async fn add_custom_config(ctx: &OperationContext, cluster: &Cluster, cm: &ConfigMap) -> Result<()> {
    ctx.recorder.record(
        cluster.definition(),
        EventType::Normal,
        CLUSTER_UPDATE,
        format!("Custom config created for cluster {}", cluster.qualified_name()),
    );
    for rack in cluster.racks() {
        update_rack(ctx, cluster, rack, |sts| cluster.add_custom_config_volume(sts, cm))
            .await
            .with_context(|| format!("unable to add custom config map to statefulset of rack {}", rack.name))?;
    }
    Ok(())
}

#[tracing::instrument(level = "debug", skip(ctx, cluster, cm), fields(cluster = %cluster.qualified_name()))]
pub(super) async fn update_custom_config(ctx: &OperationContext, cluster: &Cluster, cm: &ConfigMap) -> Result<()> {
    ctx.recorder.record(
        cluster.definition(),
        EventType::Normal,
        CLUSTER_UPDATE,
        format!("Custom config updated for cluster {}", cluster.qualified_name()),
    );
    for rack in cluster.racks() {
        let change = change_for_config_map(rack, Some(cm));
        if let Some(patch) = change.patch.as_ref() {
            patch_statefulset(ctx, cluster, rack, patch)
                .await
                .with_context(|| format!("error updating rack {} after a custom config change", rack.name))?;
        }
    }
    Ok(())
}

#[tracing::instrument(level = "debug", skip(ctx, cluster), fields(cluster = %cluster.qualified_name()))]
pub(super) async fn delete_custom_config(ctx: &OperationContext, cluster: &Cluster) -> Result<()> {
    ctx.recorder.record(
        cluster.definition(),
        EventType::Normal,
        CLUSTER_UPDATE,
        format!("Custom config deleted for cluster {}", cluster.qualified_name()),
    );
    for rack in cluster.racks() {
        update_rack(ctx, cluster, rack, |sts| cluster.remove_custom_config_volume(sts))
            .await
            .with_context(|| format!("unable to remove custom config map from statefulset of rack {}", rack.name))?;
    }
    Ok(())
}

/// Fetch the stateful set of a rack, apply the given change to it, update it and wait for the
/// update to roll out.
async fn update_rack(ctx: &OperationContext, cluster: &Cluster, rack: &Rack, change: impl FnOnce(&mut StatefulSet)) -> Result<()> {
    tracing::info!(rack = %rack.name, "applying update to rack");
    let name = cluster.definition().rack_name(rack);
    let mut sts = ctx
        .accessor
        .get_statefulset(cluster.namespace(), &name)
        .await
        .context("unable to retrieve statefulset, other racks will not be updated")?;
    change(&mut sts);
    let updated = ctx
        .accessor
        .update_statefulset(sts)
        .await
        .context("unable to update statefulset, other racks will not be updated")?;
    wait_until_rack_change_applied(ctx.accessor.as_ref(), ctx.recorder.as_ref(), cluster, &updated)
        .await
        .context("other racks will not be updated")
}
