//! The model of a managed Cassandra cluster.

mod builder;

use std::sync::Arc;

use dashmap::DashMap;
use k8s_openapi::api::core::v1::ConfigMap;

use cassandra_core::crd::{Cassandra, Rack, RequiredMetadata};
use cassandra_core::{AppError, CUSTOM_CONFIG_SUFFIX};

pub use builder::{
    BOOTSTRAPPER_CONTAINER_NAME, CASSANDRA_CONTAINER_NAME, CUSTOM_CONFIG_MOUNT_PATH, INIT_CONFIG_CONTAINER_NAME, JOLOKIA_PORT, SIDECAR_CONTAINER_NAME,
};

/// A managed cluster: a validated, defaulted cluster definition.
///
/// Clusters are cheap to clone; the definition is shared.
#[derive(Clone, Debug)]
pub struct Cluster {
    definition: Arc<Cassandra>,
    /// Set once the cluster's resources exist, which enables metrics gathering.
    online: bool,
}

impl Cluster {
    /// Create a new instance from the given definition, applying defaults and validating it.
    pub fn new(definition: &Cassandra) -> Result<Self, AppError> {
        let definition = definition.with_defaults();
        definition.ensure_valid()?;
        Ok(Self {
            definition: Arc::new(definition),
            online: false,
        })
    }

    /// Replace the definition of this cluster, applying defaults and validating it.
    ///
    /// On error this cluster is left unchanged.
    pub fn copy_from(&mut self, definition: &Cassandra) -> Result<(), AppError> {
        let definition = definition.with_defaults();
        definition.ensure_valid()?;
        self.definition = Arc::new(definition);
        Ok(())
    }

    pub fn definition(&self) -> &Cassandra {
        &self.definition
    }

    pub fn name(&self) -> &str {
        self.definition.name()
    }

    pub fn namespace(&self) -> &str {
        self.definition.namespace()
    }

    pub fn qualified_name(&self) -> String {
        self.definition.qualified_name()
    }

    pub fn racks(&self) -> &[Rack] {
        &self.definition.spec.racks
    }

    pub fn is_online(&self) -> bool {
        self.online
    }

    pub fn set_online(&mut self, online: bool) {
        self.online = online;
    }
}

/// The table of managed clusters, keyed by qualified name.
///
/// Written only by operations; readers receive cloned snapshots of entries.
#[derive(Clone, Debug, Default)]
pub struct ManagedClusters(Arc<DashMap<String, Cluster>>);

impl ManagedClusters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, qualified_name: &str) -> Option<Cluster> {
        self.0.get(qualified_name).map(|entry| entry.value().clone())
    }

    pub fn insert(&self, cluster: Cluster) {
        self.0.insert(cluster.qualified_name(), cluster);
    }

    pub fn remove(&self, qualified_name: &str) -> Option<Cluster> {
        self.0.remove(qualified_name).map(|(_, cluster)| cluster)
    }

    /// Snapshots of all clusters which are online.
    pub fn online(&self) -> Vec<Cluster> {
        self.0.iter().filter(|entry| entry.is_online()).map(|entry| entry.value().clone()).collect()
    }

    /// Check if the given config map is the custom config of a managed cluster.
    pub fn owns_config_map(&self, cm: &ConfigMap) -> bool {
        match qualified_cluster_name_for(cm) {
            Ok(qualified_name) => self.0.contains_key(&qualified_name),
            Err(_) => false,
        }
    }
}

/// Check if the given config map follows the naming convention of a cluster's custom config.
pub fn looks_like_cassandra_config_map(cm: &ConfigMap) -> bool {
    cm.metadata.name.as_deref().map(|name| name.ends_with(CUSTOM_CONFIG_SUFFIX)).unwrap_or(false)
}

/// The qualified name of the cluster which the given config map configures.
pub fn qualified_cluster_name_for(cm: &ConfigMap) -> Result<String, AppError> {
    let name = cm.metadata.name.as_deref().unwrap_or_default();
    match name.strip_suffix(CUSTOM_CONFIG_SUFFIX) {
        Some(cluster_name) if !cluster_name.is_empty() => Ok(cassandra_core::qualified_name(
            cm.metadata.namespace.as_deref().unwrap_or_default(),
            cluster_name,
        )),
        _ => Err(AppError::InvalidConfigMapName(name.into())),
    }
}
