use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use k8s_openapi::api::core::v1::ConfigMap;

use crate::cluster::{looks_like_cassandra_config_map, qualified_cluster_name_for, ManagedClusters};
use crate::event::{ClusterUpdate, Event, EventData};
use crate::k8s::events::{EventRecorder, EventType, INVALID_CHANGE};
use cassandra_core::crd::Cassandra;

/// The last observed state of the watched objects, translating watcher events into dispatcher
/// events.
///
/// Kubernetes watchers report objects as applied without distinguishing additions from updates,
/// so the distinction is made against the objects cached here.
pub(super) struct WatchState {
    allow_empty_dir: bool,
    clusters: ManagedClusters,
    recorder: Arc<dyn EventRecorder>,
    /// All known cluster definitions, defaulted, by qualified name.
    cassandras: HashMap<String, Arc<Cassandra>>,
    /// All known cluster config maps, by `<namespace>.<name>`.
    config_maps: HashMap<String, Arc<ConfigMap>>,
}

fn config_map_key(cm: &ConfigMap) -> String {
    cassandra_core::qualified_name(
        cm.metadata.namespace.as_deref().unwrap_or_default(),
        cm.metadata.name.as_deref().unwrap_or_default(),
    )
}

impl WatchState {
    pub(super) fn new(allow_empty_dir: bool, clusters: ManagedClusters, recorder: Arc<dyn EventRecorder>) -> Self {
        Self {
            allow_empty_dir,
            clusters,
            recorder,
            cassandras: Default::default(),
            config_maps: Default::default(),
        }
    }

    //////////////////////////////////////////////////////////////////////////
    // Cassandra Events //////////////////////////////////////////////////////

    #[tracing::instrument(level = "debug", skip(self, obj), fields(cluster = %obj.qualified_name()))]
    pub(super) fn cassandra_applied(&mut self, obj: Cassandra) -> Option<Event> {
        let qn = obj.qualified_name();
        let new = obj.with_defaults();
        if new.use_empty_dir() && !self.allow_empty_dir {
            let message = format!(
                "Cluster {} uses emptyDir storage, which this operator does not allow; the cluster will not be reconciled",
                qn
            );
            tracing::error!("{}", message);
            self.recorder.record(&new, EventType::Warning, INVALID_CHANGE, message);
            return None;
        }

        let new = Arc::new(new);
        let data = match self.cassandras.insert(qn.clone(), new.clone()) {
            Some(old) if old.spec == new.spec => {
                tracing::debug!("cluster definition is unchanged, ignoring");
                return None;
            }
            Some(old) => EventData::UpdateCluster(ClusterUpdate { old, new }),
            None => EventData::AddCluster(new),
        };
        Some(Event::new(qn, data))
    }

    #[tracing::instrument(level = "debug", skip(self, obj), fields(cluster = %obj.qualified_name()))]
    pub(super) fn cassandra_deleted(&mut self, obj: Cassandra) -> Option<Event> {
        let qn = obj.qualified_name();
        let def = self.cassandras.remove(&qn).unwrap_or_else(|| Arc::new(obj.with_defaults()));
        Some(Event::new(qn, EventData::DeleteCluster(def)))
    }

    /// Re-apply the listed objects, and delete the cached objects which were not listed.
    #[tracing::instrument(level = "debug", skip(self, objs))]
    pub(super) fn cassandra_restarted(&mut self, objs: Vec<Cassandra>) -> Vec<Event> {
        let listed: HashSet<String> = objs.iter().map(Cassandra::qualified_name).collect();
        let mut missing: Vec<String> = self.cassandras.keys().filter(|qn| !listed.contains(*qn)).cloned().collect();
        missing.sort();

        let mut events = vec![];
        for qn in missing {
            if let Some(def) = self.cassandras.remove(&qn) {
                events.push(Event::new(qn, EventData::DeleteCluster(def)));
            }
        }
        events.extend(objs.into_iter().filter_map(|obj| self.cassandra_applied(obj)));
        events
    }

    //////////////////////////////////////////////////////////////////////////
    // ConfigMap Events //////////////////////////////////////////////////////

    #[tracing::instrument(level = "debug", skip(self, cm), fields(config_map = %config_map_key(&cm)))]
    pub(super) fn config_map_applied(&mut self, cm: ConfigMap) -> Option<Event> {
        if !looks_like_cassandra_config_map(&cm) {
            return None;
        }
        let cluster_qn = qualified_cluster_name_for(&cm).ok()?;
        let cm = Arc::new(cm);
        match self.config_maps.insert(config_map_key(&cm), cm.clone()) {
            None => Some(Event::new(cluster_qn, EventData::AddCustomConfig(cm))),
            Some(old) if old.data == cm.data && old.binary_data == cm.binary_data => {
                tracing::debug!("config map data is unchanged, ignoring");
                None
            }
            Some(_) if !self.clusters.owns_config_map(&cm) => None,
            Some(_) => Some(Event::new(cluster_qn, EventData::UpdateCustomConfig(cm))),
        }
    }

    #[tracing::instrument(level = "debug", skip(self, cm), fields(config_map = %config_map_key(&cm)))]
    pub(super) fn config_map_deleted(&mut self, cm: ConfigMap) -> Option<Event> {
        if !looks_like_cassandra_config_map(&cm) {
            return None;
        }
        self.config_maps.remove(&config_map_key(&cm));
        if !self.clusters.owns_config_map(&cm) {
            return None;
        }
        let cluster_qn = qualified_cluster_name_for(&cm).ok()?;
        Some(Event::new(cluster_qn, EventData::DeleteCustomConfig(Arc::new(cm))))
    }

    /// Re-apply the listed config maps, and delete the cached ones which were not listed.
    #[tracing::instrument(level = "debug", skip(self, cms))]
    pub(super) fn config_map_restarted(&mut self, cms: Vec<ConfigMap>) -> Vec<Event> {
        let listed: HashSet<String> = cms.iter().map(config_map_key).collect();
        let mut missing: Vec<String> = self.config_maps.keys().filter(|key| !listed.contains(*key)).cloned().collect();
        missing.sort();

        let mut events = vec![];
        for key in missing {
            if let Some(cm) = self.config_maps.get(&key).map(|cm| cm.as_ref().clone()) {
                events.extend(self.config_map_deleted(cm));
            }
        }
        events.extend(cms.into_iter().filter_map(|cm| self.config_map_applied(cm)));
        events
    }
}
