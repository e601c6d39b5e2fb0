//! The gauges describing managed Cassandra clusters.

use std::collections::HashMap;

use anyhow::{Context, Result};
use dashmap::DashMap;
use prometheus::{Encoder, GaugeVec, Opts, Registry, TextEncoder};

use crate::cluster::Cluster;
use crate::metrics::gatherer::ClusterStatus;
use crate::metrics::node_status::{node_statuses, ALL_LABEL_PAIRS};

const NODE_STATUS_HELP: &str = "Records 1 if a node is in the given status, and 0 otherwise. Possible values for 'liveness' label are: 'up' and 'down'. \
                                Possible values for 'state' label are: 'normal', 'leaving', 'joining' and 'moving'.";

/// The rack reported for nodes whose rack is not known.
const UNKNOWN_RACK: &str = "unknown";

/// Per-cluster gauges, held in their own registry as their series are deleted along with the
/// clusters they describe.
pub struct ClusterMetrics {
    registry: Registry,
    node_status: GaugeVec,
    cluster_size: GaugeVec,
    /// The last observed `pod name -> rack` mapping of each cluster, by qualified name.
    topologies: DashMap<String, HashMap<String, String>>,
}

impl ClusterMetrics {
    /// Create a new instance.
    pub fn new() -> Result<Self> {
        let registry = Registry::new();
        let node_status = GaugeVec::new(
            Opts::new("cassandra_node_status", NODE_STATUS_HELP),
            &["cluster", "namespace", "rack", "pod", "liveness", "state"],
        )
        .context("error building node status gauge")?;
        let cluster_size = GaugeVec::new(
            Opts::new("cassandra_cluster_size", "Total number of nodes in the Cassandra cluster"),
            &["cluster", "namespace"],
        )
        .context("error building cluster size gauge")?;
        registry
            .register(Box::new(node_status.clone()))
            .context("error registering node status gauge")?;
        registry
            .register(Box::new(cluster_size.clone()))
            .context("error registering cluster size gauge")?;
        Ok(Self {
            registry,
            node_status,
            cluster_size,
            topologies: DashMap::new(),
        })
    }

    /// Update the gauges of the given cluster from a fresh status.
    ///
    /// `pod_names` maps pod IPs to pod names; nodes whose IP has no pod are skipped.
    #[tracing::instrument(level = "debug", skip(self, cluster, status, pod_names), fields(cluster = %cluster.qualified_name()))]
    pub fn update(&self, cluster: &Cluster, status: &ClusterStatus, pod_names: &HashMap<String, String>) {
        let (name, namespace) = (cluster.name(), cluster.namespace());
        let mut topology = HashMap::new();
        for (ip, node) in node_statuses(status) {
            let pod = match pod_names.get(&ip) {
                Some(pod) => pod.as_str(),
                None => {
                    tracing::warn!(pod_ip = %ip, "no pod found for node IP, skipping");
                    continue;
                }
            };
            let rack = status.node_racks.get(&ip).map(String::as_str).unwrap_or(UNKNOWN_RACK);
            self.node_status
                .with_label_values(&[name, namespace, rack, pod, node.liveness_label(), node.state_label()])
                .set(1.0);
            for (liveness, state) in node.inapplicable_label_pairs() {
                self.node_status
                    .with_label_values(&[name, namespace, rack, pod, liveness, state])
                    .set(0.0);
            }
            topology.insert(pod.to_string(), rack.to_string());
        }
        self.cluster_size.with_label_values(&[name, namespace]).set(topology.len() as f64);
        self.topologies.insert(cluster.qualified_name(), topology);
    }

    /// Delete every series of the given cluster.
    #[tracing::instrument(level = "debug", skip(self, cluster), fields(cluster = %cluster.qualified_name()))]
    pub fn delete_metrics(&self, cluster: &Cluster) {
        let (name, namespace) = (cluster.name(), cluster.namespace());
        if self.cluster_size.remove_label_values(&[name, namespace]).is_err() {
            tracing::warn!("unable to delete cluster size metrics");
        }
        let topology = match self.topologies.remove(&cluster.qualified_name()) {
            Some((_, topology)) => topology,
            None => {
                tracing::warn!("no last known topology for cluster, perhaps no metrics were ever collected");
                return;
            }
        };
        for (pod, rack) in topology.iter() {
            tracing::info!(%pod, %rack, "removing node from metrics");
            for (liveness, state) in ALL_LABEL_PAIRS {
                if self
                    .node_status
                    .remove_label_values(&[name, namespace, rack.as_str(), pod.as_str(), liveness, state])
                    .is_err()
                {
                    tracing::warn!(%pod, %rack, liveness, state, "unable to delete node status metrics");
                }
            }
        }
    }

    /// Render all gauges in the Prometheus text format.
    pub fn render(&self) -> Result<String> {
        let mut buf = Vec::new();
        TextEncoder::new()
            .encode(&self.registry.gather(), &mut buf)
            .context("error encoding cluster metrics")?;
        String::from_utf8(buf).context("error encoding cluster metrics as utf8")
    }
}
