use std::collections::HashMap;

use anyhow::{Context, Result};

use super::OperationContext;
use crate::cluster::Cluster;

/// Gather the node status of the given cluster and publish it as metrics.
#[tracing::instrument(level = "debug", skip(ctx, cluster), fields(cluster = %cluster.qualified_name()))]
pub(super) async fn gather_metrics(ctx: &OperationContext, cluster: &Cluster) -> Result<()> {
    let pods = ctx
        .accessor
        .list_pods(cluster.namespace(), cluster.name())
        .await
        .context("unable to retrieve pod list for cluster")?;
    let pod_names: HashMap<String, String> = pods
        .into_iter()
        .filter_map(|pod| {
            let ip = pod.status.and_then(|status| status.pod_ip)?;
            Some((ip, pod.metadata.name.unwrap_or_default()))
        })
        .collect();
    let status = ctx
        .gatherer
        .gather_metrics(cluster)
        .await
        .context("unable to gather metrics for cluster")?;
    ctx.metrics.update(cluster, &status, &pod_names);
    Ok(())
}
