//! Events published by the watchers and the metric trigger, handled by the dispatcher.

use std::fmt;
use std::sync::Arc;

use k8s_openapi::api::core::v1::ConfigMap;

use crate::cluster::Cluster;
use cassandra_core::crd::Cassandra;

/// The kind of an event.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EventKind {
    AddCluster,
    DeleteCluster,
    UpdateCluster,
    GatherMetrics,
    AddCustomConfig,
    UpdateCustomConfig,
    DeleteCustomConfig,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AddCluster => "ADD_CLUSTER",
            Self::DeleteCluster => "DELETE_CLUSTER",
            Self::UpdateCluster => "UPDATE_CLUSTER",
            Self::GatherMetrics => "GATHER_METRICS",
            Self::AddCustomConfig => "ADD_CUSTOM_CONFIG",
            Self::UpdateCustomConfig => "UPDATE_CUSTOM_CONFIG",
            Self::DeleteCustomConfig => "DELETE_CUSTOM_CONFIG",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The old and new definitions of an updated cluster, both defaulted.
#[derive(Clone, Debug)]
pub struct ClusterUpdate {
    pub old: Arc<Cassandra>,
    pub new: Arc<Cassandra>,
}

/// The payload of an event.
#[derive(Clone, Debug)]
pub enum EventData {
    AddCluster(Arc<Cassandra>),
    DeleteCluster(Arc<Cassandra>),
    UpdateCluster(ClusterUpdate),
    GatherMetrics(Cluster),
    AddCustomConfig(Arc<ConfigMap>),
    UpdateCustomConfig(Arc<ConfigMap>),
    DeleteCustomConfig(Arc<ConfigMap>),
}

/// An event keyed by the qualified name of the cluster it concerns.
///
/// Events sharing a key are handled sequentially, in the order in which they were dispatched.
#[derive(Clone, Debug)]
pub struct Event {
    pub key: String,
    pub data: EventData,
}

impl Event {
    pub fn new(key: String, data: EventData) -> Self {
        Self { key, data }
    }

    pub fn kind(&self) -> EventKind {
        match &self.data {
            EventData::AddCluster(_) => EventKind::AddCluster,
            EventData::DeleteCluster(_) => EventKind::DeleteCluster,
            EventData::UpdateCluster(_) => EventKind::UpdateCluster,
            EventData::GatherMetrics(_) => EventKind::GatherMetrics,
            EventData::AddCustomConfig(_) => EventKind::AddCustomConfig,
            EventData::UpdateCustomConfig(_) => EventKind::UpdateCustomConfig,
            EventData::DeleteCustomConfig(_) => EventKind::DeleteCustomConfig,
        }
    }
}
