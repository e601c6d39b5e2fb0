//! Audit events attached to Cassandra CRs.

use std::fmt;

use k8s_openapi::api::core::v1::{Event, EventSource, ObjectReference};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use kube::api::{Api, ObjectMeta, PostParams};
use kube::client::Client;
use kube::Resource;

use crate::k8s::API_TIMEOUT;
use cassandra_core::crd::{Cassandra, RequiredMetadata};

/// The component reported as the source of all events.
pub const EVENT_SOURCE_COMPONENT: &str = "cassandra-operator";

pub const INVALID_CHANGE: &str = "InvalidChange";
pub const CLUSTER_UPDATE: &str = "ClusterUpdate";
pub const WAITING_FOR_STATEFULSET_CHANGE: &str = "WaitingForStatefulSetChange";
pub const SNAPSHOT_CREATION_SCHEDULE: &str = "ClusterSnapshotCreationScheduleEvent";
pub const SNAPSHOT_CREATION_UNSCHEDULE: &str = "ClusterSnapshotCreationUnscheduleEvent";
pub const SNAPSHOT_CREATION_MODIFICATION: &str = "ClusterSnapshotCreationModificationEvent";
pub const SNAPSHOT_CLEANUP_SCHEDULE: &str = "ClusterSnapshotCleanupScheduleEvent";
pub const SNAPSHOT_CLEANUP_UNSCHEDULE: &str = "ClusterSnapshotCleanupUnscheduleEvent";
pub const SNAPSHOT_CLEANUP_MODIFICATION: &str = "ClusterSnapshotCleanupModificationEvent";

/// The type of an audit event.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EventType {
    Normal,
    Warning,
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Normal => "Normal",
            Self::Warning => "Warning",
        })
    }
}

/// A sink of audit events about Cassandra clusters.
///
/// Recording never fails from the caller's point of view.
pub trait EventRecorder: Send + Sync + 'static {
    fn record(&self, cluster: &Cassandra, type_: EventType, reason: &str, message: String);
}

/// An event recorder posting `core/v1` events to the cluster's namespace.
pub struct KubeEventRecorder {
    client: Client,
}

impl KubeEventRecorder {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Build the event object describing the given occurrence.
    pub fn build_event(cluster: &Cassandra, type_: EventType, reason: &str, message: String) -> Event {
        let now = Time(chrono::Utc::now());
        Event {
            metadata: ObjectMeta {
                generate_name: Some(format!("{}.", cluster.name())),
                namespace: Some(cluster.namespace().into()),
                ..Default::default()
            },
            involved_object: ObjectReference {
                api_version: Some(Cassandra::api_version(&()).into_owned()),
                kind: Some(Cassandra::kind(&()).into_owned()),
                name: Some(cluster.name().into()),
                namespace: Some(cluster.namespace().into()),
                uid: cluster.meta().uid.clone(),
                resource_version: cluster.meta().resource_version.clone(),
                ..Default::default()
            },
            reason: Some(reason.into()),
            message: Some(message),
            type_: Some(type_.to_string()),
            source: Some(EventSource {
                component: Some(EVENT_SOURCE_COMPONENT.into()),
                ..Default::default()
            }),
            reporting_component: Some(EVENT_SOURCE_COMPONENT.into()),
            count: Some(1),
            first_timestamp: Some(now.clone()),
            last_timestamp: Some(now),
            ..Default::default()
        }
    }
}

impl EventRecorder for KubeEventRecorder {
    fn record(&self, cluster: &Cassandra, type_: EventType, reason: &str, message: String) {
        let event = Self::build_event(cluster, type_, reason, message);
        let api: Api<Event> = Api::namespaced(self.client.clone(), cluster.namespace());
        let (cluster, reason) = (cluster.qualified_name(), reason.to_string());
        tokio::spawn(async move {
            match tokio::time::timeout(API_TIMEOUT, api.create(&PostParams::default(), &event)).await {
                Ok(Ok(_)) => (),
                Ok(Err(err)) => tracing::error!(error = ?err, %cluster, %reason, "error posting cluster event"),
                Err(_) => tracing::error!(%cluster, %reason, "timeout while posting cluster event"),
            }
        });
    }
}
