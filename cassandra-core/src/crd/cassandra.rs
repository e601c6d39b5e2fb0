//! Cassandra CRD.
//!
//! The code here is used to generate the actual CRD used in K8s. See examples/crd.rs.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::RequiredMetadata;
use crate::CUSTOM_CONFIG_SUFFIX;

pub type Cassandra = CassandraCRD; // Mostly to resolve a Rust Analyzer issue.

/// The served version of the Cassandra CRD.
pub const CRD_VERSION: &str = "v1alpha1";

/// The datacenter used when none is specified.
pub const DEFAULT_DATACENTER: &str = "dc1";
/// The Cassandra image used when none is specified.
pub const DEFAULT_CASSANDRA_IMAGE: &str = "cassandra:3.11";
/// The bootstrapper init-container image used when none is specified.
pub const DEFAULT_BOOTSTRAPPER_IMAGE: &str = "skyuk/cassandra-bootstrapper:latest";
/// The health sidecar image used when none is specified.
pub const DEFAULT_SIDECAR_IMAGE: &str = "skyuk/cassandra-sidecar:latest";
/// The snapshot job image used when none is specified.
pub const DEFAULT_SNAPSHOT_IMAGE: &str = "skyuk/cassandra-snapshot:latest";

/// The service account under which Cassandra nodes run.
pub const NODE_SERVICE_ACCOUNT: &str = "cassandra-node";
/// The service account under which snapshot jobs run.
pub const SNAPSHOT_SERVICE_ACCOUNT: &str = "cassandra-snapshot";

/// CRD spec for the Cassandra resource.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, CustomResource, JsonSchema)]
#[kube(
    struct = "CassandraCRD",
    status = "CassandraStatus",
    group = "core.sky.uk",
    version = "v1alpha1",
    kind = "Cassandra",
    plural = "cassandras",
    namespaced,
    derive = "PartialEq",
    apiextensions = "v1",
    shortname = "cass",
    printcolumn = r#"{"name":"Datacenter","type":"string","jsonPath":".spec.datacenter"}"#,
    printcolumn = r#"{"name":"Memory","type":"string","jsonPath":".spec.pod.memory"}"#,
    printcolumn = r#"{"name":"CPU","type":"string","jsonPath":".spec.pod.cpu"}"#,
    printcolumn = r#"{"name":"Storage Size","type":"string","jsonPath":".spec.pod.storageSize"}"#,
    printcolumn = r#"{"name":"Use Empty Dir","type":"boolean","jsonPath":".spec.useEmptyDir"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct CassandraSpec {
    /// The datacenter name of the cluster, `dc1` when not set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub datacenter: Option<String>,
    /// The racks of the cluster, each pinned to a single zone.
    pub racks: Vec<Rack>,
    /// Use node-local emptyDir volumes for storage instead of persistent volume claims.
    ///
    /// Data does not survive a pod restart when set. Only meant for testing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub use_empty_dir: Option<bool>,
    /// The specification of the pods of the cluster.
    pub pod: Pod,
    /// Scheduled snapshots of the cluster's data.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snapshot: Option<Snapshot>,
}

/// CRD status object.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, JsonSchema)]
pub struct CassandraStatus {}

/// A failure-domain grouping of the cluster's nodes.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Rack {
    /// The name of the rack, unique within the cluster.
    pub name: String,
    /// The availability zone to which the rack's pods are pinned.
    #[serde(default)]
    pub zone: String,
    /// The storage class of the rack's persistent volume claims.
    #[serde(default)]
    pub storage_class: String,
    /// The number of Cassandra nodes in the rack.
    pub replicas: i32,
}

/// The pod specification shared by every rack of a cluster.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Pod {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bootstrapper_image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sidecar_image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    /// The storage size of each node, as a Kubernetes quantity. Must be zero or absent with `useEmptyDir`.
    #[serde(default)]
    pub storage_size: String,
    /// The memory of each node, as a Kubernetes quantity. Used as both request and limit.
    #[serde(default)]
    pub memory: String,
    /// The cpu of each node, as a Kubernetes quantity. Used as a request only.
    #[serde(default)]
    pub cpu: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub liveness_probe: Option<Probe>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub readiness_probe: Option<Probe>,
}

/// Probe settings of the Cassandra container. A zero field takes the default value.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Probe {
    #[serde(default)]
    pub failure_threshold: i32,
    #[serde(default)]
    pub initial_delay_seconds: i32,
    #[serde(default)]
    pub period_seconds: i32,
    #[serde(default)]
    pub success_threshold: i32,
    #[serde(default)]
    pub timeout_seconds: i32,
}

impl Probe {
    /// The default liveness probe.
    pub fn liveness_default() -> Self {
        Self {
            failure_threshold: 3,
            initial_delay_seconds: 30,
            period_seconds: 30,
            success_threshold: 1,
            timeout_seconds: 5,
        }
    }

    /// The default readiness probe.
    pub fn readiness_default() -> Self {
        Self {
            failure_threshold: 3,
            initial_delay_seconds: 30,
            period_seconds: 15,
            success_threshold: 1,
            timeout_seconds: 5,
        }
    }

    /// Fill every unset (zero) field of this probe from the given defaults.
    pub fn merge_defaults(&mut self, defaults: &Probe) {
        let fill = |field: &mut i32, default: i32| {
            if *field == 0 {
                *field = default;
            }
        };
        fill(&mut self.failure_threshold, defaults.failure_threshold);
        fill(&mut self.initial_delay_seconds, defaults.initial_delay_seconds);
        fill(&mut self.period_seconds, defaults.period_seconds);
        fill(&mut self.success_threshold, defaults.success_threshold);
        fill(&mut self.timeout_seconds, defaults.timeout_seconds);
    }
}

/// Scheduled snapshots of a cluster, executed as a cron job.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    /// The cron expression on which snapshots are taken.
    #[serde(default)]
    pub schedule: String,
    /// The keyspaces to snapshot, all of them when empty.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub keyspaces: Vec<String>,
    /// The time allowed for a snapshot to complete.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_seconds: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retention_policy: Option<RetentionPolicy>,
}

impl Snapshot {
    /// Check if this snapshot has an enabled retention policy.
    pub fn has_retention_policy_enabled(&self) -> bool {
        self.retention_policy.as_ref().map(|policy| policy.enabled).unwrap_or(false)
    }
}

/// The retention policy of snapshots, executed as a cleanup cron job.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RetentionPolicy {
    #[serde(default)]
    pub enabled: bool,
    /// Snapshots older than this number of days are removed by the cleanup job.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retention_period_days: Option<i32>,
    /// The cron expression on which the cleanup job runs.
    #[serde(default)]
    pub cleanup_schedule: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cleanup_timeout_seconds: Option<i32>,
}

impl CassandraCRD {
    /// Fill every optional field which has a default.
    ///
    /// Applying defaults is idempotent, and every accessor below returns the same value before
    /// and after defaults are applied.
    pub fn apply_defaults(&mut self) {
        let spec = &mut self.spec;
        spec.datacenter.get_or_insert_with(|| DEFAULT_DATACENTER.into());
        spec.use_empty_dir.get_or_insert(false);
        spec.pod.image.get_or_insert_with(|| DEFAULT_CASSANDRA_IMAGE.into());
        spec.pod.bootstrapper_image.get_or_insert_with(|| DEFAULT_BOOTSTRAPPER_IMAGE.into());
        spec.pod.sidecar_image.get_or_insert_with(|| DEFAULT_SIDECAR_IMAGE.into());
        spec.pod
            .liveness_probe
            .get_or_insert_with(Probe::liveness_default)
            .merge_defaults(&Probe::liveness_default());
        spec.pod
            .readiness_probe
            .get_or_insert_with(Probe::readiness_default)
            .merge_defaults(&Probe::readiness_default());
        if let Some(snapshot) = spec.snapshot.as_mut() {
            snapshot.image.get_or_insert_with(|| DEFAULT_SNAPSHOT_IMAGE.into());
        }
    }

    /// A copy of this object with defaults applied.
    pub fn with_defaults(&self) -> Self {
        let mut defaulted = self.clone();
        defaulted.apply_defaults();
        defaulted
    }

    pub fn datacenter(&self) -> &str {
        self.spec.datacenter.as_deref().unwrap_or(DEFAULT_DATACENTER)
    }

    pub fn use_empty_dir(&self) -> bool {
        self.spec.use_empty_dir.unwrap_or(false)
    }

    pub fn cassandra_image(&self) -> &str {
        self.spec.pod.image.as_deref().unwrap_or(DEFAULT_CASSANDRA_IMAGE)
    }

    pub fn bootstrapper_image(&self) -> &str {
        self.spec.pod.bootstrapper_image.as_deref().unwrap_or(DEFAULT_BOOTSTRAPPER_IMAGE)
    }

    pub fn sidecar_image(&self) -> &str {
        self.spec.pod.sidecar_image.as_deref().unwrap_or(DEFAULT_SIDECAR_IMAGE)
    }

    pub fn snapshot_image(&self) -> &str {
        self.spec
            .snapshot
            .as_ref()
            .and_then(|snapshot| snapshot.image.as_deref())
            .unwrap_or(DEFAULT_SNAPSHOT_IMAGE)
    }

    /// The liveness probe, merged with its defaults.
    pub fn liveness_probe(&self) -> Probe {
        let mut probe = self.spec.pod.liveness_probe.clone().unwrap_or_else(Probe::liveness_default);
        probe.merge_defaults(&Probe::liveness_default());
        probe
    }

    /// The readiness probe, merged with its defaults.
    pub fn readiness_probe(&self) -> Probe {
        let mut probe = self.spec.pod.readiness_probe.clone().unwrap_or_else(Probe::readiness_default);
        probe.merge_defaults(&Probe::readiness_default());
        probe
    }

    /// The `<namespace>.<name>` key of this cluster.
    pub fn qualified_name(&self) -> String {
        crate::qualified_name(self.namespace(), self.name())
    }

    /// The DNS name of the cluster's headless service.
    pub fn service_name(&self) -> String {
        format!("{}.{}", self.name(), self.namespace())
    }

    /// The name of the volume holding each node's data.
    pub fn storage_volume_name(&self) -> String {
        format!("cassandra-storage-{}", self.name())
    }

    /// The name of the stateful set backing the given rack.
    pub fn rack_name(&self, rack: &Rack) -> String {
        format!("{}-{}", self.name(), rack.name)
    }

    /// The name of the config map holding this cluster's custom configuration.
    pub fn custom_config_map_name(&self) -> String {
        format!("{}{}", self.name(), CUSTOM_CONFIG_SUFFIX)
    }

    /// The name of the pod volume mounting the custom config map.
    pub fn custom_config_volume_name(&self) -> String {
        format!("cassandra-custom-config-{}", self.name())
    }

    pub fn snapshot_job_name(&self) -> String {
        format!("{}-snapshot", self.name())
    }

    pub fn snapshot_cleanup_job_name(&self) -> String {
        format!("{}-snapshot-cleanup", self.name())
    }

    /// Check if a snapshot is configured with an enabled retention policy.
    pub fn has_snapshot_cleanup(&self) -> bool {
        self.spec.snapshot.as_ref().map(Snapshot::has_retention_policy_enabled).unwrap_or(false)
    }
}

/// Check if the properties of the snapshot job differ between the two snapshots.
pub fn snapshot_properties_updated(old: &Snapshot, new: &Snapshot) -> bool {
    old.schedule != new.schedule || old.timeout_seconds != new.timeout_seconds || old.keyspaces != new.keyspaces
}

/// Check if the properties of the cleanup job differ between the two snapshots.
///
/// Only applies when both snapshots carry a retention policy.
pub fn snapshot_cleanup_properties_updated(old: &Snapshot, new: &Snapshot) -> bool {
    match (&old.retention_policy, &new.retention_policy) {
        (Some(old), Some(new)) => {
            old.cleanup_schedule != new.cleanup_schedule
                || old.cleanup_timeout_seconds != new.cleanup_timeout_seconds
                || old.retention_period_days != new.retention_period_days
        }
        _ => false,
    }
}
