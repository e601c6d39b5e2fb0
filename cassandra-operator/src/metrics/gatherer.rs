//! Gathering of a cluster's status through the jolokia agent of its nodes.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use rand::seq::SliceRandom;
use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::cluster::{Cluster, JOLOKIA_PORT};
use crate::k8s::accessor::ClusterAccessor;

pub(super) const STORAGE_SERVICE_MBEAN: &str = "org.apache.cassandra.db:type=StorageService";
pub(super) const ENDPOINT_SNITCH_MBEAN: &str = "org.apache.cassandra.db:type=EndpointSnitchInfo";

/// The live view of a cluster, as reported by one of its nodes.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ClusterStatus {
    /// The rack of each live or unreachable node, keyed by IP.
    pub node_racks: HashMap<String, String>,
    pub live_nodes: Vec<String>,
    pub unreachable_nodes: Vec<String>,
    pub joining_nodes: Vec<String>,
    pub leaving_nodes: Vec<String>,
    pub moving_nodes: Vec<String>,
}

/// A source of cluster statuses.
#[async_trait]
pub trait Gatherer: Send + Sync + 'static {
    async fn gather_metrics(&self, cluster: &Cluster) -> Result<ClusterStatus>;
}

/// A provider of the jolokia base URL to query for a cluster.
#[async_trait]
pub trait JolokiaUrlProvider: Send + Sync + 'static {
    async fn url_for(&self, cluster: &Cluster) -> String;
}

/// Picks one of the cluster's pods at random, falling back to the cluster's service.
pub struct RandomPodUrlProvider {
    accessor: Arc<dyn ClusterAccessor>,
}

impl RandomPodUrlProvider {
    pub fn new(accessor: Arc<dyn ClusterAccessor>) -> Self {
        Self { accessor }
    }
}

#[async_trait]
impl JolokiaUrlProvider for RandomPodUrlProvider {
    async fn url_for(&self, cluster: &Cluster) -> String {
        let pods_res = self.accessor.list_pods(cluster.namespace(), cluster.name()).await;
        let ips: Vec<String> = match pods_res {
            Ok(pods) => pods
                .into_iter()
                .filter_map(|pod| pod.status.and_then(|status| status.pod_ip))
                .filter(|ip| !ip.is_empty())
                .collect(),
            Err(err) => {
                tracing::info!(error = ?err, cluster = %cluster.qualified_name(), "error listing pods, falling back to the cluster service for jolokia");
                vec![]
            }
        };
        let host = ips.choose(&mut rand::thread_rng()).cloned().unwrap_or_else(|| {
            tracing::debug!(cluster = %cluster.qualified_name(), "no pods with IP addresses found, using the cluster service for jolokia");
            cluster.definition().service_name()
        });
        format!("http://{}:{}", host, JOLOKIA_PORT)
    }
}

/// The envelope of every jolokia response.
#[derive(Deserialize)]
struct JolokiaResponse<T> {
    status: u16,
    value: Option<T>,
}

/// A gatherer reading the `StorageService` and `EndpointSnitchInfo` MBeans over HTTP.
pub struct JolokiaGatherer {
    urls: Arc<dyn JolokiaUrlProvider>,
    client: reqwest::Client,
}

impl JolokiaGatherer {
    /// Create a new instance, applying the given timeout to each request.
    pub fn new(urls: Arc<dyn JolokiaUrlProvider>, request_timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .context("error building jolokia http client")?;
        Ok(Self { urls, client })
    }

    async fn read_node_set(&self, base: &str, attribute: &str) -> Result<Vec<String>> {
        let url = format!("{}/jolokia/read/{}/{}", base, STORAGE_SERVICE_MBEAN, attribute);
        Ok(self.get::<Vec<String>>(&url).await?.unwrap_or_default())
    }

    async fn rack_of(&self, base: &str, ip: &str) -> Result<String> {
        let url = format!("{}/jolokia/exec/{}/getRack/{}", base, ENDPOINT_SNITCH_MBEAN, ip);
        Ok(self.get::<String>(&url).await?.unwrap_or_default())
    }

    async fn get<T: DeserializeOwned>(&self, url: &str) -> Result<Option<T>> {
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .with_context(|| format!("error while retrieving MBean data from URL {}", url))?;
        let status = resp.status();
        let body = resp
            .text()
            .await
            .with_context(|| format!("error while reading response body from URL {}", url))?;
        if status != reqwest::StatusCode::OK {
            bail!("error while retrieving MBean data from URL {}, response body was: {}", url, body);
        }
        let parsed: JolokiaResponse<T> = serde_json::from_str(&body)
            .with_context(|| format!("error while unmarshalling jolokia response from URL {}, body: {}", url, body))?;
        if parsed.status != 200 {
            bail!("error response returned by jolokia from URL {}, body: {}", url, body);
        }
        Ok(parsed.value)
    }
}

#[async_trait]
impl Gatherer for JolokiaGatherer {
    #[tracing::instrument(level = "debug", skip(self, cluster), fields(cluster = %cluster.qualified_name()))]
    async fn gather_metrics(&self, cluster: &Cluster) -> Result<ClusterStatus> {
        let base = self.urls.url_for(cluster).await;
        let qualified_name = cluster.qualified_name();
        let mut status = ClusterStatus::default();
        for (attribute, nodes) in [
            ("LiveNodes", &mut status.live_nodes),
            ("UnreachableNodes", &mut status.unreachable_nodes),
            ("JoiningNodes", &mut status.joining_nodes),
            ("LeavingNodes", &mut status.leaving_nodes),
            ("MovingNodes", &mut status.moving_nodes),
        ] {
            *nodes = self
                .read_node_set(&base, attribute)
                .await
                .with_context(|| format!("unable to collect metrics for mbean {} for cluster {}", attribute, qualified_name))?;
        }

        for ip in status.live_nodes.iter().chain(status.unreachable_nodes.iter()) {
            let rack = self
                .rack_of(&base, ip)
                .await
                .with_context(|| format!("unable to find rack for node {} in cluster {}", ip, qualified_name))?;
            status.node_racks.insert(ip.clone(), rack);
        }
        Ok(status)
    }
}
