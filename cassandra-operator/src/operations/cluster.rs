use anyhow::{Context, Result};

use super::{patch_statefulset, register_statefulset, OperationContext};
use crate::adjuster::{changes_for_cluster, ChangeType};
use crate::cluster::Cluster;
use crate::event::ClusterUpdate;
use crate::k8s::events::{EventType, INVALID_CHANGE};
use cassandra_core::crd::{Cassandra, RequiredMetadata};

/// Start managing the given cluster, creating its service and a stateful set per rack unless
/// resources of the cluster already exist.
#[tracing::instrument(level = "debug", skip(ctx, def), fields(cluster = %def.qualified_name()))]
pub(super) async fn add_cluster(ctx: &OperationContext, def: &Cassandra) -> Result<()> {
    tracing::info!("new cassandra cluster definition added");
    let custom_config = ctx
        .accessor
        .find_custom_config_map(def.namespace(), &def.custom_config_map_name())
        .await
        .context("error looking up custom config map")?;
    if custom_config.is_some() {
        tracing::info!("found custom config map for cluster");
    }

    let mut cluster = Cluster::new(def).context("unable to create cluster")?;
    ctx.clusters.insert(cluster.clone());

    let found = ctx.accessor.find_existing_resources(&cluster).await;
    if !found.is_empty() {
        tracing::info!(resources = %found.join(","), "resources already found for cluster, not attempting to recreate");
    } else {
        ctx.accessor
            .create_service(cluster.build_service())
            .await
            .context("error creating headless service for cluster")?;
        tracing::info!("headless service created for cluster");
        for rack in cluster.racks() {
            register_statefulset(ctx, &cluster, rack, custom_config.as_ref()).await?;
        }
    }

    cluster.set_online(true);
    ctx.clusters.insert(cluster);
    Ok(())
}

/// Stop managing the given cluster, deleting its stateful sets and service.
///
/// Persistent volume claims are left in place.
#[tracing::instrument(level = "debug", skip(ctx, def), fields(cluster = %def.qualified_name()))]
pub(super) async fn delete_cluster(ctx: &OperationContext, def: &Cassandra) -> Result<()> {
    tracing::info!("cassandra cluster definition deleted");
    let mut cluster = match ctx.clusters.remove(&def.qualified_name()) {
        Some(cluster) => cluster,
        None => {
            tracing::warn!("no record found of deleted cluster");
            return Ok(());
        }
    };
    cluster.set_online(false);
    ctx.metrics.delete_metrics(&cluster);

    for rack in cluster.racks() {
        let name = cluster.definition().rack_name(rack);
        if let Err(err) = ctx.accessor.delete_statefulset(cluster.namespace(), &name).await {
            tracing::error!(error = ?err, statefulset = %name, "error deleting statefulset of cluster");
        }
    }
    tracing::info!("deleted statefulsets of cluster");
    if let Err(err) = ctx.accessor.delete_service(cluster.namespace(), cluster.name()).await {
        tracing::error!(error = ?err, "error deleting headless service of cluster");
    }
    tracing::info!("existing cassandra cluster removed");
    Ok(())
}

/// Apply the changes between two definitions of a managed cluster to its racks.
#[tracing::instrument(level = "debug", skip(ctx, update), fields(cluster = %update.new.qualified_name()))]
pub(super) async fn update_cluster(ctx: &OperationContext, update: &ClusterUpdate) -> Result<()> {
    let (old, new) = (update.old.as_ref(), update.new.as_ref());
    tracing::info!("cluster definition has been updated");
    let qn = new.qualified_name();
    let mut cluster = match ctx.clusters.get(&qn) {
        Some(cluster) => cluster,
        None => Cluster::new(new).context("cluster definition is invalid")?,
    };
    cluster.copy_from(new).context("cluster definition is invalid")?;
    ctx.clusters.insert(cluster.clone());

    let changes = match changes_for_cluster(old, new) {
        Ok(changes) => changes,
        Err(err) => {
            ctx.recorder.record(
                old,
                EventType::Warning,
                INVALID_CHANGE,
                format!("unable to generate patch for cluster {}: {}", qn, err),
            );
            return Ok(());
        }
    };

    for change in changes {
        match change.change_type {
            ChangeType::UpdateRack => {
                if let Some(patch) = change.patch.as_ref() {
                    patch_statefulset(ctx, &cluster, &change.rack, patch).await?;
                }
            }
            ChangeType::AddRack => {
                tracing::info!(rack = %change.rack.name, "adding new rack to cluster");
                let custom_config = ctx
                    .accessor
                    .find_custom_config_map(cluster.namespace(), &new.custom_config_map_name())
                    .await
                    .context("error looking up custom config map")?;
                register_statefulset(ctx, &cluster, &change.rack, custom_config.as_ref())
                    .await
                    .with_context(|| format!("error creating statefulset for added rack {}", change.rack.name))?;
            }
            ChangeType::DeleteRack | ChangeType::ScaleDownRack => {
                let message = format!("Change type '{}' isn't supported for cluster {}", change.change_type, qn);
                tracing::error!(rack = %change.rack.name, nodes_to_scale_down = change.nodes_to_scale_down, "{}", message);
                ctx.recorder.record(old, EventType::Warning, INVALID_CHANGE, message);
            }
        }
    }
    Ok(())
}
